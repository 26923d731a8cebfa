use crate::error::{CollectorError, Result};
use crate::models::{ChannelStats, SearchPage, SearchQuery, VideoDetail};
use crate::services::cancel::CancelToken;
use crate::services::normalizer::{parse_channels, parse_videos};
use crate::services::quota::QuotaLedger;
use crate::services::youtube::{YouTubeApi, MAX_RESULTS};
use log::info;
use serde_json::Value;
use std::sync::Arc;

// Quota units per call, independent of how many ids a call carries.
pub const SEARCH_COST: u64 = 100;
pub const DETAIL_COST: u64 = 1;
pub const CHANNEL_STATS_COST: u64 = 1;
pub const HANDLE_LOOKUP_COST: u64 = 1;

/// The three rate-limited stages (search, detail, channel stats) on top of a
/// raw `YouTubeApi`. Id sets are cut into batches of at most 50 and sent one
/// after another, so quota charges and log lines come in a fixed order. A
/// failing batch aborts the call; charges of batches already sent stand.
#[derive(Clone)]
pub struct StageFetchers {
    api: Arc<dyn YouTubeApi>,
    quota: Arc<QuotaLedger>,
}

impl StageFetchers {
    pub fn new(api: Arc<dyn YouTubeApi>, quota: Arc<QuotaLedger>) -> Self {
        StageFetchers { api, quota }
    }

    pub async fn search_page(
        &self,
        query: &SearchQuery,
        page_token: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<SearchPage> {
        let response = cancel.run(self.api.search(query, page_token)).await?;
        let used = self.quota.charge(SEARCH_COST).await;
        check_listing(&response, "search")?;

        let page = parse_search_page(&response);
        info!(
            "Search page: {} ids, more: {} (cost {SEARCH_COST}, {})",
            page.video_ids.len(),
            page.next_page_token.is_some(),
            quota_note(used)
        );
        Ok(page)
    }

    pub async fn video_details(
        &self,
        ids: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<VideoDetail>> {
        let mut details = Vec::with_capacity(ids.len());
        for (batch, chunk) in ids.chunks(MAX_RESULTS).enumerate() {
            let response = cancel.run(self.api.videos(chunk)).await?;
            let used = self.quota.charge(DETAIL_COST).await;
            check_listing(&response, "videos")?;

            let parsed = parse_videos(&response);
            info!(
                "Detail batch {}: {} of {} ids usable (cost {DETAIL_COST}, {})",
                batch + 1,
                parsed.len(),
                chunk.len(),
                quota_note(used)
            );
            details.extend(parsed);
        }
        Ok(details)
    }

    pub async fn channel_stats(
        &self,
        ids: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<ChannelStats>> {
        let mut stats = Vec::with_capacity(ids.len());
        for (batch, chunk) in ids.chunks(MAX_RESULTS).enumerate() {
            let response = cancel.run(self.api.channels(chunk)).await?;
            let used = self.quota.charge(CHANNEL_STATS_COST).await;
            check_listing(&response, "channels")?;

            let parsed = parse_channels(&response);
            info!(
                "Channel-stats batch {}: {} of {} channels (cost {CHANNEL_STATS_COST}, {})",
                batch + 1,
                parsed.len(),
                chunk.len(),
                quota_note(used)
            );
            stats.extend(parsed);
        }
        Ok(stats)
    }

    pub async fn channel_by_handle(
        &self,
        handle: &str,
        cancel: &CancelToken,
    ) -> Result<Option<ChannelStats>> {
        let response = cancel.run(self.api.channel_by_handle(handle)).await?;
        self.quota.charge(HANDLE_LOOKUP_COST).await;
        check_listing(&response, "channels")?;
        Ok(parse_channels(&response).into_iter().next())
    }
}

fn quota_note(used: Option<u64>) -> String {
    match used {
        Some(total) => format!("quota used {total}"),
        None => "quota total unknown".to_string(),
    }
}

// A listing with no matches may omit `items`; anything else shaped wrong is
// not a listing at all.
fn check_listing(response: &Value, endpoint: &str) -> Result<()> {
    if !response.is_object() {
        return Err(CollectorError::DataIntegrity(format!(
            "{endpoint} response is not a JSON object"
        )));
    }
    match response.get("items") {
        None | Some(Value::Array(_)) => Ok(()),
        Some(other) => Err(CollectorError::DataIntegrity(format!(
            "{endpoint} response has non-list items: {other}"
        ))),
    }
}

fn parse_search_page(response: &Value) -> SearchPage {
    let video_ids = response["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["id"]["videoId"].as_str())
                .take(MAX_RESULTS)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    SearchPage {
        video_ids,
        next_page_token: response["nextPageToken"]
            .as_str()
            .filter(|token| !token.is_empty())
            .map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quota_note_never_invents_a_total() {
        assert_eq!(quota_note(Some(101)), "quota used 101");
        assert_eq!(quota_note(None), "quota total unknown");
    }

    #[test]
    fn search_page_reads_ids_and_cursor() {
        let response = json!({
            "nextPageToken": "CDIQAA",
            "items": [
                { "id": { "kind": "youtube#video", "videoId": "a" } },
                { "id": { "kind": "youtube#channel", "channelId": "UC1" } },
                { "id": { "kind": "youtube#video", "videoId": "b" } }
            ]
        });
        let page = parse_search_page(&response);
        assert_eq!(page.video_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(page.next_page_token.as_deref(), Some("CDIQAA"));
    }

    #[test]
    fn listing_shape_is_checked() {
        assert!(check_listing(&json!({ "pageInfo": {} }), "channels").is_ok());
        assert!(check_listing(&json!({ "items": [] }), "videos").is_ok());
        assert!(matches!(
            check_listing(&json!({ "items": "nope" }), "videos"),
            Err(CollectorError::DataIntegrity(_))
        ));
        assert!(matches!(
            check_listing(&json!("oops"), "search"),
            Err(CollectorError::DataIntegrity(_))
        ));
    }

    #[test]
    fn empty_response_is_an_empty_last_page() {
        let page = parse_search_page(&json!({ "nextPageToken": "" }));
        assert!(page.video_ids.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
