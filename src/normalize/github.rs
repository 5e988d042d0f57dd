use super::{str_at, MalformedItem, Mapped};
use crate::model::{ActivityRecord, DateWindow, Source};
use crate::util::{first_line, format_timestamp, parse_timestamp, repo_from_url};
use chrono::{DateTime, Utc};
use serde_json::Value;

const MAX_LABEL_CHARS: usize = 300;

/// Item from `/repos/{repo}/commits`.
pub fn map_commit(repo: &str, payload: &Value) -> Result<Mapped, MalformedItem> {
    let malformed = |reason: &str| MalformedItem::new(Source::Commit, reason);

    let sha = payload
        .get("sha")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing sha"))?;

    let raw_ts = str_at(payload, &["commit", "author", "date"])
        .or_else(|| str_at(payload, &["commit", "committer", "date"]))
        .ok_or_else(|| malformed("missing commit date"))?;
    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| malformed("unparseable commit date"))?;

    let actor = str_at(payload, &["committer", "login"])
        .or_else(|| str_at(payload, &["author", "login"]))
        .or_else(|| str_at(payload, &["commit", "author", "name"]))
        .unwrap_or_default();

    let url = payload
        .get("html_url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://github.com/{repo}/commit/{sha}"));

    Ok(Mapped::Record(ActivityRecord {
        source: Source::Commit,
        actor: actor.to_string(),
        timestamp,
        reference: sha.to_string(),
        label: first_line(str_at(payload, &["commit", "message"]).unwrap_or(""), MAX_LABEL_CHARS),
        scope: repo.to_string(),
        status: String::new(),
        detail: String::new(),
        url,
    }))
}

/// Pull request or issue from `/search/issues`. `details` is the
/// `/repos/{repo}/pulls/{number}` body when it could be fetched.
pub fn map_issue(
    source: Source,
    payload: &Value,
    details: Option<&Value>,
    window: &DateWindow,
) -> Result<Mapped, MalformedItem> {
    let malformed = |reason: &str| MalformedItem::new(source, reason);

    let id = payload
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing id"))?;

    let created = payload
        .get("created_at")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing created_at"))
        .and_then(|raw| parse_timestamp(raw).ok_or_else(|| malformed("unparseable created_at")))?;
    let updated = payload
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    let state = payload.get("state").and_then(Value::as_str).unwrap_or_default();
    let merged_at = details
        .and_then(|d| d.get("merged_at"))
        .or_else(|| payload.get("pull_request").and_then(|pr| pr.get("merged_at")))
        .filter(|v| !v.is_null());
    let state = details
        .and_then(|d| d.get("state"))
        .and_then(Value::as_str)
        .unwrap_or(state);

    Ok(Mapped::Record(ActivityRecord {
        source,
        actor: str_at(payload, &["user", "login"]).unwrap_or_default().to_string(),
        timestamp: activity_timestamp(created, updated, window),
        reference: id.to_string(),
        label: first_line(payload.get("title").and_then(Value::as_str).unwrap_or(""), MAX_LABEL_CHARS),
        scope: scope_of(payload),
        status: if merged_at.is_some() { "merged".to_string() } else { state.to_string() },
        detail: issue_detail(payload, details, merged_at),
        url: payload.get("html_url").and_then(Value::as_str).unwrap_or_default().to_string(),
    }))
}

/// Pull request the user reviewed; stamped with its last update.
pub fn map_review(reviewer: &str, payload: &Value) -> Result<Mapped, MalformedItem> {
    let malformed = |reason: &str| MalformedItem::new(Source::Review, reason);

    let id = payload
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing id"))?;
    let raw_ts = payload
        .get("updated_at")
        .or_else(|| payload.get("created_at"))
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing updated_at"))?;
    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| malformed("unparseable updated_at"))?;

    Ok(Mapped::Record(ActivityRecord {
        source: Source::Review,
        actor: reviewer.to_string(),
        timestamp,
        reference: format!("review-{id}"),
        label: first_line(payload.get("title").and_then(Value::as_str).unwrap_or(""), MAX_LABEL_CHARS),
        scope: scope_of(payload),
        status: payload.get("state").and_then(Value::as_str).unwrap_or_default().to_string(),
        detail: String::new(),
        url: payload.get("html_url").and_then(Value::as_str).unwrap_or_default().to_string(),
    }))
}

/// Size and merge time from the pull request details, then labels.
fn issue_detail(payload: &Value, details: Option<&Value>, merged_at: Option<&Value>) -> String {
    let mut parts = Vec::new();

    if let Some(d) = details {
        let count = |key: &str| d.get(key).and_then(Value::as_u64).unwrap_or(0);
        parts.push(format!(
            "+{} -{} in {} files",
            count("additions"),
            count("deletions"),
            count("changed_files")
        ));
    }
    if let Some(ts) = merged_at.and_then(Value::as_str).and_then(parse_timestamp) {
        parts.push(format!("merged: {}", format_timestamp(&ts)));
    }

    let labels: Vec<&str> = payload
        .get("labels")
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|l| l.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if !labels.is_empty() {
        parts.push(format!("labels: {}", labels.join(", ")));
    }

    parts.join("; ")
}

/// Creation time when it falls inside the window; for items opened earlier
/// and still active, the last update inside the window.
pub fn activity_timestamp(
    created: DateTime<Utc>,
    updated: Option<DateTime<Utc>>,
    window: &DateWindow,
) -> DateTime<Utc> {
    if window.contains(&created) {
        return created;
    }
    match updated {
        Some(updated) if created < window.start() && window.contains(&updated) => updated,
        _ => created,
    }
}

fn scope_of(payload: &Value) -> String {
    payload
        .get("repository_url")
        .and_then(Value::as_str)
        .and_then(repo_from_url)
        .unwrap_or_default()
}
