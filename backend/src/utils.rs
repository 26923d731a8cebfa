use chrono::{DateTime, Utc};
use url::Url;

/// Parse an RFC 3339 publish timestamp as returned by the YouTube API.
pub fn parse_iso8601_timestamp(date_str: &str) -> Option<DateTime<Utc>> {
    if date_str.is_empty() {
        return None;
    }
    date_str.parse::<DateTime<Utc>>().ok()
}

/// Parse ISO8601 duration string (P1DT2H3M4S) to total seconds.
/// Anything that is not a `P...` duration yields `None`.
pub fn parse_iso8601_duration_to_seconds(duration_str: &str) -> Option<i64> {
    let rest = duration_str.strip_prefix('P')?;

    let mut total_seconds = 0.0;
    let mut current_number = String::new();
    let mut in_time = false;

    for ch in rest.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            current_number.push(ch);
            continue;
        }
        if ch == 'T' {
            in_time = true;
            continue;
        }

        let num = current_number.parse::<f64>().ok()?;
        current_number.clear();
        total_seconds += match (ch, in_time) {
            ('W', false) => num * 604_800.0,
            ('D', false) => num * 86_400.0,
            ('H', true) => num * 3600.0,
            ('M', true) => num * 60.0,
            ('S', true) => num,
            _ => return None,
        };
    }

    if !current_number.is_empty() {
        return None;
    }
    Some(total_seconds as i64)
}

/// `mm:ss` below one hour, `hh:mm:ss` from one hour on.
pub fn format_duration(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelInput {
    Id(String),
    Handle(String),
}

/// Accepts a bare channel id, `@handle`, or a youtube.com
/// `/channel/<id>` or `/@handle` URL.
pub fn parse_channel_input(input: &str) -> Option<ChannelInput> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Some(handle) = input.strip_prefix('@') {
        return non_empty(handle).map(ChannelInput::Handle);
    }

    if let Ok(parsed_url) = Url::parse(input) {
        let host = parsed_url.host_str()?;
        if !matches!(host, "www.youtube.com" | "youtube.com" | "m.youtube.com") {
            return None;
        }

        let mut segments = parsed_url.path_segments()?;
        return match segments.next()? {
            "channel" => segments.next().and_then(non_empty).map(ChannelInput::Id),
            first => first
                .strip_prefix('@')
                .and_then(non_empty)
                .map(ChannelInput::Handle),
        };
    }

    if input.starts_with("UC") && !input.contains('/') {
        return Some(ChannelInput::Id(input.to_string()));
    }
    None
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
