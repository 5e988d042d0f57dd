//! Cursor-driven pagination.
//!
//! A [`PageSource`] knows how to fetch one page for a given cursor; [`Pages`]
//! turns it into a lazy, finite iterator of raw items. A page is only yielded
//! after it has been retrieved in full, and at most `max_pages` requests are
//! issued per listing.

pub mod github;
pub mod google;
pub mod http;

use crate::error::{ExportError, Result};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::debug;

pub use http::{ApiResponse, HttpSettings, RetryPolicy, Session};

pub const DEFAULT_MAX_PAGES: usize = 50;

/// Opaque continuation token: a next-page URL for GitHub, a `nextPageToken` for Google.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    /// Empty tokens are treated as "no more pages".
    pub fn from_token(token: Option<&str>) -> Option<Self> {
        token.filter(|t| !t.is_empty()).map(|t| Cursor(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Option<Cursor>,
}

pub trait PageSource {
    fn fetch_page(&mut self, cursor: Option<&Cursor>) -> Result<Page>;
}

impl<F> PageSource for F
where
    F: FnMut(Option<&Cursor>) -> Result<Page>,
{
    fn fetch_page(&mut self, cursor: Option<&Cursor>) -> Result<Page> {
        self(cursor)
    }
}

enum State {
    Pending(Option<Cursor>),
    Done,
}

pub struct Pages<S> {
    source: S,
    state: State,
    buffer: VecDeque<Value>,
    fetched: usize,
    max_pages: usize,
}

/// Starts a listing. Nothing is requested until the iterator is polled.
pub fn fetch_all<S: PageSource>(source: S, max_pages: usize) -> Pages<S> {
    Pages {
        source,
        state: State::Pending(None),
        buffer: VecDeque::new(),
        fetched: 0,
        max_pages,
    }
}

impl<S> Pages<S> {
    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }
}

impl<S: PageSource> Iterator for Pages<S> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            let cursor = match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::Pending(cursor) => cursor,
            };

            if self.fetched >= self.max_pages {
                return Some(Err(ExportError::PaginationExhausted {
                    max_pages: self.max_pages,
                }));
            }

            let page = match self.source.fetch_page(cursor.as_ref()) {
                Ok(page) => page,
                Err(e) => return Some(Err(e)),
            };
            self.fetched += 1;
            debug!(
                "Fetched page {} with {} items (more: {})",
                self.fetched,
                page.items.len(),
                page.next.is_some()
            );

            self.buffer.extend(page.items);
            if let Some(next) = page.next {
                self.state = State::Pending(Some(next));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(items: Vec<Value>, next: Option<&str>) -> Page {
        Page {
            items,
            next: Cursor::from_token(next),
        }
    }

    #[test]
    fn follows_cursor_until_absent() {
        let mut seen = Vec::new();
        let source = |cursor: Option<&Cursor>| -> Result<Page> {
            seen.push(cursor.map(|c| c.as_str().to_string()));
            Ok(match cursor.map(Cursor::as_str) {
                None => page(vec![json!(1), json!(2)], Some("abc")),
                Some("abc") => page(vec![json!(3)], None),
                Some(other) => panic!("unexpected cursor {other}"),
            })
        };

        let items: Vec<Value> = fetch_all(source, 10).collect::<Result<_>>().unwrap();
        assert_eq!(items, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(seen, vec![None, Some("abc".to_string())]);
    }

    #[test]
    fn cyclic_cursor_trips_safety_valve() {
        let mut calls = 0;
        let source = |_: Option<&Cursor>| -> Result<Page> {
            calls += 1;
            Ok(page(vec![json!("x")], Some("same")))
        };

        let results: Vec<Result<Value>> = fetch_all(source, 4).collect();
        assert_eq!(calls, 4);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
        assert!(matches!(
            results.last(),
            Some(Err(ExportError::PaginationExhausted { max_pages: 4 }))
        ));
    }

    #[test]
    fn empty_token_ends_listing() {
        let source = |_: Option<&Cursor>| -> Result<Page> { Ok(page(vec![json!(1)], Some(""))) };
        let mut pages = fetch_all(source, 3);
        assert_eq!(pages.next().unwrap().unwrap(), json!(1));
        assert!(pages.next().is_none());
        assert_eq!(pages.pages_fetched(), 1);
    }

    #[test]
    fn nothing_is_fetched_until_polled() {
        let mut calls = 0;
        {
            let source = |_: Option<&Cursor>| -> Result<Page> {
                calls += 1;
                Ok(page(vec![], None))
            };
            let _pages = fetch_all(source, 3);
        }
        assert_eq!(calls, 0);
    }

    #[test]
    fn fetch_error_ends_iteration() {
        let source = |_: Option<&Cursor>| -> Result<Page> {
            Err(ExportError::RateLimit { attempts: 4 })
        };
        let mut pages = fetch_all(source, 3);
        assert!(matches!(pages.next(), Some(Err(ExportError::RateLimit { .. }))));
        assert!(pages.next().is_none());
    }
}
