//! Google Drive Activity and Calendar listings (`nextPageToken` pagination).

use super::{fetch_all, Cursor, Page, PageSource, Pages, Session};
use crate::error::Result;
use crate::model::DateWindow;
use serde_json::{json, Value};
use tracing::info;

pub const DRIVE_ACTIVITY_API_BASE: &str = "https://driveactivity.googleapis.com/v2";
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

const ACTIVITY_PAGE_SIZE: u32 = 100;
const EVENTS_PAGE_SIZE: &str = "250";

enum Request {
    Get(Vec<(&'static str, String)>),
    Post(Value),
}

pub struct TokenPages<'a> {
    session: &'a Session,
    url: String,
    request: Request,
    items_key: &'static str,
}

impl PageSource for TokenPages<'_> {
    fn fetch_page(&mut self, cursor: Option<&Cursor>) -> Result<Page> {
        let response = match &self.request {
            Request::Get(query) => {
                let mut query = query.clone();
                if let Some(token) = cursor {
                    query.push(("pageToken", token.as_str().to_string()));
                }
                self.session.get(&self.url, &query)?
            }
            Request::Post(body) => {
                let mut body = body.clone();
                if let Some(token) = cursor {
                    body["pageToken"] = json!(token.as_str());
                }
                self.session.post_json(&self.url, &body)?
            }
        };

        let items = response
            .body
            .get(self.items_key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let next = Cursor::from_token(response.body.get("nextPageToken").and_then(Value::as_str));

        Ok(Page { items, next })
    }
}

/// Drive Activity v2 query restricted to the window.
pub fn drive_activities<'a>(
    session: &'a Session,
    base: &str,
    window: &DateWindow,
    max_pages: usize,
) -> Pages<TokenPages<'a>> {
    let filter = format!(
        "time >= \"{}\" AND time <= \"{}\"",
        window.start_rfc3339(),
        window.end_rfc3339()
    );
    info!("Querying Drive activity: {}", filter);

    let source = TokenPages {
        session,
        url: format!("{}/activity:query", base.trim_end_matches('/')),
        request: Request::Post(json!({ "filter": filter, "pageSize": ACTIVITY_PAGE_SIZE })),
        items_key: "activities",
    };
    fetch_all(source, max_pages)
}

/// Expanded (single) events on the primary calendar, ordered by start time.
pub fn calendar_events<'a>(
    session: &'a Session,
    base: &str,
    window: &DateWindow,
    max_pages: usize,
) -> Pages<TokenPages<'a>> {
    info!("Listing primary calendar events for {}", window);

    let source = TokenPages {
        session,
        url: format!("{}/calendars/primary/events", base.trim_end_matches('/')),
        request: Request::Get(vec![
            ("timeMin", window.start_rfc3339()),
            ("timeMax", window.end_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", EVENTS_PAGE_SIZE.to_string()),
        ]),
        items_key: "items",
    };
    fetch_all(source, max_pages)
}
