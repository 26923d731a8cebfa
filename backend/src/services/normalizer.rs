//! Shapes raw API items into canonical records.
//!
//! Items missing `snippet`, `statistics` or `contentDetails` (or the fields we
//! need inside them) are dropped instead of being defaulted to zero: a hole in
//! a response is an anomaly, not a video with no views.

use crate::models::{ChannelStats, ResultRow, VideoDetail};
use crate::utils::{format_duration, parse_iso8601_duration_to_seconds, parse_iso8601_timestamp};
use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value;

/// Hours since publication, never below one.
pub fn age_hours(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - published_at).num_seconds() as f64 / 3600.0;
    hours.max(1.0)
}

pub fn views_per_hour(detail: &VideoDetail, now: DateTime<Utc>) -> f64 {
    detail.view_count as f64 / age_hours(detail.published_at, now)
}

pub fn views_per_subscriber(view_count: u64, subscriber_count: Option<u64>) -> Option<f64> {
    match subscriber_count {
        Some(subscribers) if subscribers > 0 => Some(view_count as f64 / subscribers as f64),
        _ => None,
    }
}

// The API sends counts as decimal strings; tolerate plain numbers too.
fn count(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn thumbnail(snippet: &Value) -> String {
    ["high", "medium", "default"]
        .iter()
        .find_map(|size| snippet["thumbnails"][size]["url"].as_str())
        .unwrap_or_default()
        .to_string()
}

/// One videos.list item, or `None` if any required part is missing.
pub fn parse_video(item: &Value) -> Option<VideoDetail> {
    let video_id = item["id"].as_str()?;
    let snippet = item.get("snippet").filter(|v| v.is_object())?;
    let statistics = item.get("statistics").filter(|v| v.is_object())?;
    let content_details = item.get("contentDetails").filter(|v| v.is_object())?;

    Some(VideoDetail {
        video_id: video_id.to_string(),
        title: snippet["title"].as_str()?.to_string(),
        channel_id: snippet["channelId"].as_str()?.to_string(),
        channel_title: snippet["channelTitle"].as_str().unwrap_or_default().to_string(),
        published_at: parse_iso8601_timestamp(snippet["publishedAt"].as_str()?)?,
        view_count: count(&statistics["viewCount"])?,
        duration_seconds: parse_iso8601_duration_to_seconds(
            content_details["duration"].as_str()?,
        )?,
        thumbnail: thumbnail(snippet),
    })
}

/// All well-formed items of a videos.list response, in response order.
pub fn parse_videos(response: &Value) -> Vec<VideoDetail> {
    let Some(items) = response["items"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let detail = parse_video(item);
            if detail.is_none() {
                warn!("Dropping malformed video item: {}", item["id"]);
            }
            detail
        })
        .collect()
}

/// One channels.list item. A hidden subscriber count becomes `None`, never 0.
pub fn parse_channel(item: &Value) -> Option<ChannelStats> {
    let channel_id = item["id"].as_str()?;
    let snippet = item.get("snippet").filter(|v| v.is_object())?;
    let statistics = item.get("statistics").filter(|v| v.is_object())?;

    let hidden = statistics["hiddenSubscriberCount"]
        .as_bool()
        .unwrap_or(false);
    let subscriber_count = if hidden {
        None
    } else {
        count(&statistics["subscriberCount"])
    };

    Some(ChannelStats {
        channel_id: channel_id.to_string(),
        name: snippet["title"].as_str()?.to_string(),
        handle: snippet["customUrl"].as_str().map(String::from),
        subscriber_count,
        view_count: count(&statistics["viewCount"])?,
        video_count: count(&statistics["videoCount"])?,
        icon: thumbnail(snippet),
    })
}

pub fn parse_channels(response: &Value) -> Vec<ChannelStats> {
    let Some(items) = response["items"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let stats = parse_channel(item);
            if stats.is_none() {
                warn!("Dropping malformed channel item: {}", item["id"]);
            }
            stats
        })
        .collect()
}

pub fn to_row(
    seq: usize,
    detail: &VideoDetail,
    subscriber_count: Option<u64>,
    now: DateTime<Utc>,
) -> ResultRow {
    ResultRow {
        seq,
        video_id: detail.video_id.clone(),
        title: detail.title.clone(),
        channel_id: detail.channel_id.clone(),
        channel_title: detail.channel_title.clone(),
        published_at: detail.published_at,
        view_count: detail.view_count,
        views_per_hour: views_per_hour(detail, now),
        views_per_subscriber: views_per_subscriber(detail.view_count, subscriber_count),
        duration: format_duration(detail.duration_seconds),
        link: format!("https://www.youtube.com/watch?v={}", detail.video_id),
        thumbnail: detail.thumbnail.clone(),
        subscriber_count,
    }
}
