#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use vidpulse::config::Config;
use vidpulse::error::{CollectorError, Result};
use vidpulse::models::SearchQuery;
use vidpulse::services::youtube::YouTubeApi;
use vidpulse::AppState;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Search { source: String, page: usize },
    Videos(usize),
    Channels(usize),
    Handle(String),
}

/// In-process stand-in for the YouTube Data API.
///
/// Search pages are registered per source (keyword or channel id) as lists
/// of video ids; page tokens are `page-<n>`. Every call is recorded.
#[derive(Default)]
pub struct MockApi {
    pages: Mutex<HashMap<String, Vec<Vec<String>>>>,
    videos: Mutex<HashMap<String, Value>>,
    channels: Mutex<HashMap<String, Value>>,
    handles: Mutex<HashMap<String, String>>,
    fail_videos: Mutex<bool>,
    fail_channels: Mutex<bool>,
    channel_delay: Mutex<Option<std::time::Duration>>,
    calls: Mutex<Vec<Call>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_pages(&self, source: &str, pages: Vec<Vec<String>>) {
        self.pages.lock().unwrap().insert(source.to_string(), pages);
    }

    pub fn add_video(&self, item: Value) {
        let id = item["id"].as_str().unwrap().to_string();
        self.videos.lock().unwrap().insert(id, item);
    }

    pub fn add_channel(&self, item: Value) {
        let id = item["id"].as_str().unwrap().to_string();
        self.channels.lock().unwrap().insert(id, item);
    }

    pub fn add_handle(&self, handle: &str, channel_id: &str) {
        self.handles
            .lock()
            .unwrap()
            .insert(handle.to_string(), channel_id.to_string());
    }

    pub fn fail_videos(&self) {
        *self.fail_videos.lock().unwrap() = true;
    }

    pub fn fail_channels(&self, fail: bool) {
        *self.fail_channels.lock().unwrap() = fail;
    }

    pub fn delay_channels(&self, delay: std::time::Duration) {
        *self.channel_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn search_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Search { .. }))
            .count()
    }

    pub fn channel_batches(&self) -> Vec<usize> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Channels(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn video_batches(&self) -> Vec<usize> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Videos(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn forbidden(endpoint: &'static str) -> CollectorError {
    CollectorError::Api {
        endpoint,
        status: 403,
        body: "quotaExceeded".to_string(),
    }
}

#[async_trait]
impl YouTubeApi for MockApi {
    async fn search(&self, query: &SearchQuery, page_token: Option<&str>) -> Result<Value> {
        let source = query
            .keyword
            .clone()
            .or_else(|| query.channel_id.clone())
            .unwrap_or_default();
        let page = page_token
            .and_then(|t| t.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        self.record(Call::Search {
            source: source.clone(),
            page,
        });

        let pages = self.pages.lock().unwrap();
        let Some(source_pages) = pages.get(&source) else {
            return Ok(json!({ "items": [] }));
        };
        let ids = source_pages.get(page).cloned().unwrap_or_default();
        let items: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "id": { "kind": "youtube#video", "videoId": id } }))
            .collect();

        let mut response = json!({ "items": items });
        if page + 1 < source_pages.len() {
            response["nextPageToken"] = json!(format!("page-{}", page + 1));
        }
        Ok(response)
    }

    async fn videos(&self, ids: &[String]) -> Result<Value> {
        self.record(Call::Videos(ids.len()));
        if *self.fail_videos.lock().unwrap() {
            return Err(forbidden("videos"));
        }
        let videos = self.videos.lock().unwrap();
        let items: Vec<Value> = ids.iter().filter_map(|id| videos.get(id).cloned()).collect();
        Ok(json!({ "items": items }))
    }

    async fn channels(&self, ids: &[String]) -> Result<Value> {
        self.record(Call::Channels(ids.len()));
        let delay = *self.channel_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_channels.lock().unwrap() {
            return Err(forbidden("channels"));
        }
        let channels = self.channels.lock().unwrap();
        let items: Vec<Value> = ids
            .iter()
            .filter_map(|id| channels.get(id).cloned())
            .collect();
        Ok(json!({ "items": items }))
    }

    async fn channel_by_handle(&self, handle: &str) -> Result<Value> {
        self.record(Call::Handle(handle.to_string()));
        let channel_id = self.handles.lock().unwrap().get(handle).cloned();
        let item = channel_id.and_then(|id| self.channels.lock().unwrap().get(&id).cloned());
        Ok(json!({ "items": item.into_iter().collect::<Vec<_>>() }))
    }
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn video(id: &str, channel_id: &str, views: u64, hours_old: i64) -> Value {
    let published = fixed_now() - Duration::hours(hours_old);
    json!({
        "id": id,
        "snippet": {
            "title": format!("Video {id}"),
            "channelId": channel_id,
            "channelTitle": format!("Channel {channel_id}"),
            "publishedAt": published.to_rfc3339(),
            "thumbnails": { "high": { "url": format!("https://i.ytimg.com/vi/{id}/hq.jpg") } }
        },
        "statistics": { "viewCount": views.to_string() },
        "contentDetails": { "duration": "PT4M5S" }
    })
}

pub fn channel(id: &str, subscribers: Option<u64>) -> Value {
    let mut statistics = json!({
        "viewCount": "1000000",
        "videoCount": "42",
        "hiddenSubscriberCount": subscribers.is_none()
    });
    if let Some(subscribers) = subscribers {
        statistics["subscriberCount"] = json!(subscribers.to_string());
    }
    json!({
        "id": id,
        "snippet": {
            "title": format!("Channel {id}"),
            "customUrl": format!("@{}", id.to_lowercase()),
            "thumbnails": { "default": { "url": format!("https://yt3.ggpht.com/{id}") } }
        },
        "statistics": statistics
    })
}

/// Registers `pages` pages of `per_page` videos for `source`, with view
/// counts strictly descending across pages. Returns the ids page by page.
pub fn seed_descending(
    api: &MockApi,
    source: &str,
    pages: usize,
    per_page: usize,
    top_views: u64,
    channel_id: &str,
) -> Vec<Vec<String>> {
    let mut all = Vec::new();
    let mut views = top_views;
    for p in 0..pages {
        let mut page = Vec::new();
        for i in 0..per_page {
            let id = format!("{source}-{p}-{i}");
            api.add_video(video(&id, channel_id, views, 10));
            views = views.saturating_sub(1);
            page.push(id);
        }
        all.push(page);
    }
    api.add_pages(source, all.clone());
    all
}

pub fn test_config(dir: &TempDir) -> Config {
    let data_dir = dir.path().to_string_lossy().into_owned();
    Config::from_lookup(|key| match key {
        "YOUTUBE_API_KEY" => Some("test-key".to_string()),
        "DATA_DIR" => Some(data_dir.clone()),
        _ => None,
    })
    .unwrap()
}

pub fn test_state(dir: &TempDir, api: Arc<MockApi>) -> AppState {
    AppState::build(test_config(dir), api)
}
