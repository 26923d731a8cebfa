use crate::error::{CollectorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One canonical row of a collection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub seq: usize,
    pub video_id: String,
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
    pub view_count: u64,
    pub views_per_hour: f64,
    pub views_per_subscriber: Option<f64>,
    pub duration: String,
    pub link: String,
    pub thumbnail: String,
    pub subscriber_count: Option<u64>,
}

/// Validated subset of a videos.list item. Only built when snippet,
/// statistics and contentDetails were all present.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDetail {
    pub video_id: String,
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
    pub view_count: u64,
    pub duration_seconds: i64,
    pub thumbnail: String,
}

/// One channels.list item. `subscriber_count` is `None` when the channel hides it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStats {
    pub channel_id: String,
    pub name: String,
    pub handle: Option<String>,
    pub subscriber_count: Option<u64>,
    pub view_count: u64,
    pub video_count: u64,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel_id: String,
    pub name: String,
    pub handle: Option<String>,
    pub subscriber_count: Option<u64>,
    pub view_count: u64,
    pub video_count: u64,
    pub icon: String,
    pub fetched_at: DateTime<Utc>,
}

impl ChannelRecord {
    pub fn from_stats(stats: &ChannelStats, fetched_at: DateTime<Utc>) -> Self {
        ChannelRecord {
            channel_id: stats.channel_id.clone(),
            name: stats.name.clone(),
            handle: stats.handle.clone(),
            subscriber_count: stats.subscriber_count,
            view_count: stats.view_count,
            video_count: stats.video_count,
            icon: stats.icon.clone(),
            fetched_at,
        }
    }

    pub fn apply_stats(&mut self, stats: &ChannelStats, fetched_at: DateTime<Utc>) {
        self.name = stats.name.clone();
        if stats.handle.is_some() {
            self.handle = stats.handle.clone();
        }
        self.subscriber_count = stats.subscriber_count;
        self.view_count = stats.view_count;
        self.video_count = stats.video_count;
        if !stats.icon.is_empty() {
            self.icon = stats.icon.clone();
        }
        self.fetched_at = fetched_at;
    }

    pub fn snapshot(&self) -> ChannelHistorySnapshot {
        ChannelHistorySnapshot {
            channel_id: self.channel_id.clone(),
            fetched_at: self.fetched_at,
            subscriber_count: self.subscriber_count,
            view_count: self.view_count,
            video_count: self.video_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelHistorySnapshot {
    pub channel_id: String,
    pub fetched_at: DateTime<Utc>,
    pub subscriber_count: Option<u64>,
    pub view_count: u64,
    pub video_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaState {
    pub used_quota: u64,
    pub cycle_started_at: DateTime<Utc>,
}

impl Default for QuotaState {
    fn default() -> Self {
        QuotaState {
            used_quota: 0,
            cycle_started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationBucket {
    #[default]
    Any,
    Short,  // < 4 minutes
    Medium, // 4 - 20 minutes
    Long,   // > 20 minutes
}

impl DurationBucket {
    pub fn as_param(&self) -> &'static str {
        match self {
            DurationBucket::Any => "any",
            DurationBucket::Short => "short",
            DurationBucket::Medium => "medium",
            DurationBucket::Long => "long",
        }
    }
}

/// Where search candidates come from.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoSource {
    Keyword(String),
    Channels(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectFilters {
    pub target_count: usize,
    #[serde(default)]
    pub recency_days: Option<u32>,
    #[serde(default)]
    pub min_views: u64,
    #[serde(default)]
    pub min_views_per_hour: f64,
    #[serde(default)]
    pub duration: DurationBucket,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub channel_ids: Vec<String>,
}

impl CollectFilters {
    pub fn keyword(keyword: &str, target_count: usize) -> Self {
        CollectFilters {
            target_count,
            recency_days: None,
            min_views: 0,
            min_views_per_hour: 0.0,
            duration: DurationBucket::Any,
            keyword: Some(keyword.to_string()),
            channel_ids: Vec::new(),
        }
    }

    /// A keyword wins over a channel set when both are given.
    pub fn source(&self) -> Result<VideoSource> {
        if let Some(keyword) = self.keyword.as_deref().map(str::trim) {
            if !keyword.is_empty() {
                return Ok(VideoSource::Keyword(keyword.to_string()));
            }
        }

        let channels: Vec<String> = self
            .channel_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if channels.is_empty() {
            return Err(CollectorError::InvalidRequest(
                "either a keyword or at least one channel id is required".to_string(),
            ));
        }
        Ok(VideoSource::Channels(channels))
    }
}

/// Query handed to the search stage for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub channel_id: Option<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub duration: DurationBucket,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub video_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
    pub filters: CollectFilters,
    #[serde(default)]
    pub save_as: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectResponse {
    pub success: bool,
    pub message: String,
    pub rows: Vec<ResultRow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub schedule: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewChannel {
    pub input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        ActionResponse {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ActionResponse {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub count: usize,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunNowResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub is_enabled: bool,
    pub schedule: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub used: u64,
    pub daily_limit: u64,
    pub cycle_started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_source_is_preferred_over_channels() {
        let mut filters = CollectFilters::keyword("  cats ", 10);
        filters.channel_ids = vec!["UC1".to_string()];
        assert_eq!(
            filters.source().unwrap(),
            VideoSource::Keyword("cats".to_string())
        );
    }

    #[test]
    fn blank_keyword_falls_back_to_channel_set() {
        let mut filters = CollectFilters::keyword(" ", 5);
        filters.channel_ids = vec!["UC1".to_string(), "".to_string(), "UC2".to_string()];
        assert_eq!(
            filters.source().unwrap(),
            VideoSource::Channels(vec!["UC1".to_string(), "UC2".to_string()])
        );
    }

    #[test]
    fn filters_without_any_source_are_rejected() {
        let mut filters = CollectFilters::keyword("", 5);
        filters.keyword = None;
        assert!(matches!(
            filters.source(),
            Err(CollectorError::InvalidRequest(_))
        ));
    }

    #[test]
    fn filters_deserialize_with_defaults() {
        let filters: CollectFilters =
            serde_json::from_str(r#"{"targetCount": 3, "keyword": "cats", "duration": "short"}"#)
                .unwrap();
        assert_eq!(filters.target_count, 3);
        assert_eq!(filters.min_views, 0);
        assert_eq!(filters.duration, DurationBucket::Short);
        assert!(filters.channel_ids.is_empty());
    }
}
