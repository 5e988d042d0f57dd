use super::{str_at, MalformedItem, Mapped};
use crate::model::{ActivityRecord, Source};
use crate::util::parse_timestamp;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

const ACTION_KINDS: &[&str] = &[
    "create",
    "edit",
    "comment",
    "rename",
    "move",
    "restore",
    "delete",
    "permissionChange",
];

/// Per-file event numbering. Repeats of the same (file, time, action) reuse
/// the ordinal of their first sighting, so they collapse into one reference.
#[derive(Debug, Default)]
pub struct DocOrdinals {
    next: HashMap<String, u32>,
    assigned: HashMap<(String, DateTime<Utc>, String), u32>,
}

impl DocOrdinals {
    pub fn assign(&mut self, file_id: &str, timestamp: DateTime<Utc>, action: &str) -> u32 {
        let key = (file_id.to_string(), timestamp, action.to_string());
        if let Some(ordinal) = self.assigned.get(&key) {
            return *ordinal;
        }
        let counter = self.next.entry(file_id.to_string()).or_insert(0);
        let ordinal = *counter;
        *counter += 1;
        self.assigned.insert(key, ordinal);
        ordinal
    }
}

pub fn doc_url(file_id: &str) -> String {
    format!("https://docs.google.com/document/d/{file_id}/edit")
}

/// Drive Activity v2 `activities[]` entry.
pub fn map_activity(payload: &Value, ordinals: &mut DocOrdinals) -> Result<Mapped, MalformedItem> {
    let malformed = |reason: &str| MalformedItem::new(Source::DocEdit, reason);

    let me = payload
        .get("actors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|actor| {
            actor
                .pointer("/user/knownUser/isCurrentUser")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        });
    let Some(me) = me else {
        return Ok(Mapped::Excluded("not by the current user"));
    };

    let action = action_label(payload.get("primaryActionDetail").unwrap_or(&Value::Null));
    if !matches!(action.as_str(), "CREATE" | "EDIT" | "COMMENT") {
        return Ok(Mapped::Excluded("action is not create, edit or comment"));
    }

    let target = payload
        .get("targets")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|t| t.get("driveItem").or_else(|| t.get("file")))
        .find(|item| item.get("name").and_then(Value::as_str).is_some_and(|n| !n.is_empty()));
    let Some(target) = target else {
        return Ok(Mapped::Excluded("no drive item target"));
    };
    if target.get("mimeType").and_then(Value::as_str) != Some(GOOGLE_DOC_MIME) {
        return Ok(Mapped::Excluded("target is not a Google Doc"));
    }

    let raw_ts = payload
        .get("timestamp")
        .and_then(Value::as_str)
        .or_else(|| str_at(payload, &["timeRange", "endTime"]))
        .or_else(|| str_at(payload, &["timeRange", "startTime"]))
        .ok_or_else(|| malformed("missing timestamp"))?;
    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| malformed("unparseable timestamp"))?;

    let name = target.get("name").and_then(Value::as_str).unwrap_or_default();
    let file_id = name.rsplit('/').next().unwrap_or(name);
    let title = target
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or("(no title)");
    let ordinal = ordinals.assign(file_id, timestamp, &action);

    Ok(Mapped::Record(ActivityRecord {
        source: Source::DocEdit,
        actor: str_at(me, &["user", "knownUser", "personName"])
            .unwrap_or("me")
            .to_string(),
        timestamp,
        reference: format!("{file_id}#{ordinal}"),
        label: title.to_string(),
        scope: file_id.to_string(),
        status: action,
        detail: String::new(),
        url: doc_url(file_id),
    }))
}

fn action_label(primary: &Value) -> String {
    ACTION_KINDS
        .iter()
        .find(|kind| primary.get(**kind).is_some())
        .map(|kind| kind.to_uppercase())
        .unwrap_or_else(|| "OTHER".to_string())
}
