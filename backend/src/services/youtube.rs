use crate::error::{CollectorError, Result};
use crate::models::{DurationBucket, SearchQuery};
use async_trait::async_trait;
use chrono::SecondsFormat;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Largest page / id batch any YouTube Data API list call accepts.
pub const MAX_RESULTS: usize = 50;

/// Raw access to the YouTube Data API. Implementations return the response
/// body untouched; shaping happens in the stage fetchers and the normalizer.
#[async_trait]
pub trait YouTubeApi: Send + Sync {
    /// search.list, ordered by view count.
    async fn search(&self, query: &SearchQuery, page_token: Option<&str>) -> Result<Value>;

    /// videos.list with snippet, statistics and contentDetails.
    async fn videos(&self, ids: &[String]) -> Result<Value>;

    /// channels.list with snippet and statistics.
    async fn channels(&self, ids: &[String]) -> Result<Value>;

    /// channels.list looked up by `forHandle`.
    async fn channel_by_handle(&self, handle: &str) -> Result<Value>;
}

pub struct YouTubeClient {
    client: Client,
    base: Url,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(base: Url, api_key: String) -> Self {
        YouTubeClient {
            client: Client::new(),
            base,
            api_key,
        }
    }

    async fn get(&self, endpoint: &'static str, params: &[(&str, String)]) -> Result<Value> {
        // Documentation: https://developers.google.com/youtube/v3/docs
        let url = format!("{}/{endpoint}", self.base.as_str().trim_end_matches('/'));
        debug!("GET {url} {params:?}");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Api {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl YouTubeApi for YouTubeClient {
    async fn search(&self, query: &SearchQuery, page_token: Option<&str>) -> Result<Value> {
        self.get("search", &search_params(query, page_token)).await
    }

    async fn videos(&self, ids: &[String]) -> Result<Value> {
        let params = [
            ("part", "snippet,statistics,contentDetails".to_string()),
            ("id", ids.join(",")),
            ("maxResults", MAX_RESULTS.to_string()),
        ];
        self.get("videos", &params).await
    }

    async fn channels(&self, ids: &[String]) -> Result<Value> {
        let params = [
            ("part", "snippet,statistics".to_string()),
            ("id", ids.join(",")),
            ("maxResults", MAX_RESULTS.to_string()),
        ];
        self.get("channels", &params).await
    }

    async fn channel_by_handle(&self, handle: &str) -> Result<Value> {
        let params = [
            ("part", "snippet,statistics".to_string()),
            ("forHandle", handle.to_string()),
        ];
        self.get("channels", &params).await
    }
}

fn search_params(query: &SearchQuery, page_token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("part", "id".to_string()),
        ("type", "video".to_string()),
        ("order", "viewCount".to_string()),
        ("maxResults", MAX_RESULTS.to_string()),
    ];
    if let Some(keyword) = &query.keyword {
        params.push(("q", keyword.clone()));
    }
    if let Some(channel_id) = &query.channel_id {
        params.push(("channelId", channel_id.clone()));
    }
    if let Some(after) = query.published_after {
        params.push((
            "publishedAfter",
            after.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
    if query.duration != DurationBucket::Any {
        params.push(("videoDuration", query.duration.as_param().to_string()));
    }
    if let Some(token) = page_token {
        params.push(("pageToken", token.to_string()));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn param<'a>(params: &'a [(&str, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn keyword_search_orders_by_views() {
        let query = SearchQuery {
            keyword: Some("cats".to_string()),
            channel_id: None,
            published_after: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            duration: DurationBucket::Any,
        };
        let params = search_params(&query, Some("CDIQAA"));

        assert_eq!(param(&params, "order"), Some("viewCount"));
        assert_eq!(param(&params, "q"), Some("cats"));
        assert_eq!(param(&params, "maxResults"), Some("50"));
        assert_eq!(param(&params, "publishedAfter"), Some("2024-01-02T03:04:05Z"));
        assert_eq!(param(&params, "pageToken"), Some("CDIQAA"));
        assert_eq!(param(&params, "videoDuration"), None);
        assert_eq!(param(&params, "channelId"), None);
    }

    #[test]
    fn channel_search_forwards_duration_bucket() {
        let query = SearchQuery {
            keyword: None,
            channel_id: Some("UC123".to_string()),
            published_after: None,
            duration: DurationBucket::Long,
        };
        let params = search_params(&query, None);

        assert_eq!(param(&params, "channelId"), Some("UC123"));
        assert_eq!(param(&params, "videoDuration"), Some("long"));
        assert_eq!(param(&params, "pageToken"), None);
        assert_eq!(param(&params, "publishedAfter"), None);
    }
}
