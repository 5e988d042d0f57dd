use super::{str_at, MalformedItem, Mapped};
use crate::model::{ActivityRecord, Source};
use crate::util::{format_timestamp, parse_timestamp, week_key};
use serde_json::Value;

/// Event types that block time without being a meeting.
const PLACEHOLDER_EVENT_TYPES: &[&str] = &["outOfOffice", "focusTime", "workingLocation"];

/// Calendar v3 `items[]` event.
pub fn map_event(payload: &Value) -> Result<Mapped, MalformedItem> {
    let malformed = |reason: &str| MalformedItem::new(Source::CalendarEvent, reason);

    if payload.get("status").and_then(Value::as_str) == Some("cancelled") {
        return Ok(Mapped::Excluded("cancelled"));
    }
    if let Some(kind) = payload.get("eventType").and_then(Value::as_str) {
        if PLACEHOLDER_EVENT_TYPES.contains(&kind) {
            return Ok(Mapped::Excluded("placeholder event"));
        }
    }

    let self_attendee = payload
        .get("attendees")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|a| a.get("self").and_then(Value::as_bool).unwrap_or(false));
    let response = self_attendee
        .and_then(|a| a.get("responseStatus"))
        .and_then(Value::as_str);
    if response == Some("declined") {
        return Ok(Mapped::Excluded("declined"));
    }

    let start = match str_at(payload, &["start", "dateTime"]) {
        Some(raw) => raw,
        None if str_at(payload, &["start", "date"]).is_some() => {
            return Ok(Mapped::Excluded("all-day event"));
        }
        None => return Err(malformed("missing start time")),
    };
    let timestamp = parse_timestamp(start).ok_or_else(|| malformed("unparseable start time"))?;

    let id = payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed("missing id"))?;

    let organizer_is_me = payload
        .pointer("/organizer/self")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let actor = self_attendee
        .and_then(|a| a.get("email"))
        .and_then(Value::as_str)
        .or_else(|| {
            organizer_is_me
                .then(|| str_at(payload, &["organizer", "email"]))
                .flatten()
        })
        .unwrap_or("me");

    let label = payload
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("(No title)");

    Ok(Mapped::Record(ActivityRecord {
        source: Source::CalendarEvent,
        actor: actor.to_string(),
        timestamp,
        reference: id.to_string(),
        label: label.to_string(),
        scope: week_key(&timestamp),
        status: response.unwrap_or("accepted").to_string(),
        detail: event_detail(payload),
        url: payload.get("htmlLink").and_then(Value::as_str).unwrap_or_default().to_string(),
    }))
}

/// End time, attendee count, organizer and conference link.
fn event_detail(payload: &Value) -> String {
    let mut parts = Vec::new();

    if let Some(end) = str_at(payload, &["end", "dateTime"]).and_then(parse_timestamp) {
        parts.push(format!("ends: {}", format_timestamp(&end)));
    }
    let attendees = payload
        .get("attendees")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    if attendees > 0 {
        parts.push(format!("attendees: {attendees}"));
    }
    if let Some(organizer) = str_at(payload, &["organizer", "email"]).filter(|e| !e.is_empty()) {
        parts.push(format!("organizer: {organizer}"));
    }
    if let Some(link) = conference_link(payload) {
        parts.push(format!("meet: {link}"));
    }

    parts.join("; ")
}

/// The video entry point when there is one, otherwise the first entry point.
fn conference_link(payload: &Value) -> Option<&str> {
    let entries = payload
        .pointer("/conferenceData/entryPoints")
        .and_then(Value::as_array)?;
    let is_video = |e: &&Value| {
        e.get("entryPointType")
            .and_then(Value::as_str)
            .is_some_and(|t| t.eq_ignore_ascii_case("video"))
    };
    entries
        .iter()
        .find(is_video)
        .or_else(|| entries.first())
        .and_then(|e| e.get("uri"))
        .and_then(Value::as_str)
        .filter(|uri| !uri.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateWindow;
    use crate::normalize::{normalize, RawItem};
    use chrono::NaiveDate;
    use serde_json::json;

    fn meeting(id: &str, response: &str) -> Value {
        json!({
            "id": id,
            "status": "confirmed",
            "summary": format!("Sync {id}"),
            "htmlLink": format!("https://calendar.google.com/event?eid={id}"),
            "start": {"dateTime": "2025-03-03T15:00:00+01:00"},
            "end": {"dateTime": "2025-03-03T15:30:00+01:00"},
            "organizer": {"email": "lead@example.com"},
            "attendees": [
                {"email": "lead@example.com", "responseStatus": "accepted"},
                {"email": "me@example.com", "self": true, "responseStatus": response}
            ]
        })
    }

    #[test]
    fn declined_and_out_of_office_are_excluded() {
        let out_of_office = json!({
            "id": "ooo",
            "eventType": "outOfOffice",
            "summary": "Vacation",
            "start": {"date": "2025-03-04"},
            "end": {"date": "2025-03-05"}
        });
        let raw = vec![
            RawItem::CalendarEvent(meeting("declined", "declined")),
            RawItem::CalendarEvent(out_of_office),
            RawItem::CalendarEvent(meeting("tentative", "tentative")),
            RawItem::CalendarEvent(meeting("accepted", "accepted")),
        ];
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
        .unwrap();
        let out = normalize(raw, &window);

        let refs: Vec<&str> = out.records.iter().map(|r| r.reference.as_str()).collect();
        assert_eq!(refs, vec!["tentative", "accepted"]);
        assert_eq!(out.stats.excluded, 2);
        assert_eq!(out.records[0].actor, "me@example.com");
        assert_eq!(out.records[0].status, "tentative");
        assert_eq!(out.records[0].scope, "2025-W10");
        assert_eq!(
            out.records[0].detail,
            "ends: 2025-03-03T14:30:00Z; attendees: 2; organizer: lead@example.com"
        );
    }

    #[test]
    fn video_entry_point_wins_over_phone() {
        let mut event = meeting("standup", "accepted");
        event["conferenceData"] = json!({
            "entryPoints": [
                {"entryPointType": "phone", "uri": "tel:+1-555-0100"},
                {"entryPointType": "video", "uri": "https://meet.google.com/abc-defg-hij"}
            ]
        });
        assert_eq!(
            conference_link(&event),
            Some("https://meet.google.com/abc-defg-hij")
        );

        event["conferenceData"]["entryPoints"] = json!([{"entryPointType": "phone", "uri": "tel:+1-555-0100"}]);
        assert_eq!(conference_link(&event), Some("tel:+1-555-0100"));
    }

    #[test]
    fn all_day_event_is_excluded() {
        let event = json!({"id": "offsite", "summary": "Offsite", "start": {"date": "2025-03-04"}});
        assert_eq!(map_event(&event), Ok(Mapped::Excluded("all-day event")));
    }

    #[test]
    fn organizer_without_attendees_is_the_actor() {
        let event = json!({
            "id": "solo",
            "summary": "  ",
            "start": {"dateTime": "2025-03-03T09:00:00Z"},
            "organizer": {"email": "me@example.com", "self": true}
        });
        match map_event(&event) {
            Ok(Mapped::Record(r)) => {
                assert_eq!(r.actor, "me@example.com");
                assert_eq!(r.label, "(No title)");
                assert_eq!(r.status, "accepted");
                assert_eq!(r.detail, "organizer: me@example.com");
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn event_without_start_is_malformed() {
        let err = map_event(&json!({"id": "x"})).unwrap_err();
        assert_eq!(err.source, Source::CalendarEvent);
    }
}
