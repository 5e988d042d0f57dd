use crate::error::{ExportError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

pub fn week_key(timestamp: &DateTime<Utc>) -> String {
    let week = timestamp.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Parses `YYYY-MM-DD`, RFC 3339, or a relative `"<duration> ago"` into a UTC day.
pub fn parse_date_input(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let input = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }

    // Relative duration (e.g., "90days ago", "2weeks ago")
    if let Some(ago) = input.to_lowercase().strip_suffix(" ago") {
        let duration = humantime::parse_duration(ago.trim())
            .map_err(|e| ExportError::InvalidDate(format!("'{input}': {e}")))?;
        let days = i64::try_from(duration.as_secs() / 86_400)
            .map_err(|_| ExportError::InvalidDate(format!("Duration overflow for '{input}'")))?;
        return today
            .checked_sub_signed(Duration::days(days))
            .ok_or_else(|| ExportError::InvalidDate(format!("Duration overflow for '{input}'")));
    }

    Err(ExportError::InvalidDate(format!(
        "'{input}' is not YYYY-MM-DD, RFC 3339, or '<duration> ago'"
    )))
}

/// Parses an API timestamp into UTC, accepting RFC 3339 with any offset.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// First line of a message, cut to `max` characters.
pub fn first_line(text: &str, max: usize) -> String {
    text.lines().next().unwrap_or("").trim().chars().take(max).collect()
}

/// `https://api.github.com/repos/owner/name` -> `owner/name`
pub fn repo_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let mut parts = trimmed.rsplit('/');
    let name = parts.next().filter(|s| !s.is_empty())?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    Some(format!("{owner}/{name}"))
}
