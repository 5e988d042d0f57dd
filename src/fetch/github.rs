//! GitHub REST listings (Link-header pagination).

use super::{fetch_all, Cursor, Page, PageSource, Pages, Session};
use crate::error::Result;
use crate::model::DateWindow;
use serde_json::Value;
use tracing::info;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const PER_PAGE: &str = "100";

/// One GitHub listing. The first request uses `url` + `query`; later requests
/// follow the absolute `rel="next"` URL, which already carries the query.
pub struct LinkPages<'a> {
    session: &'a Session,
    url: String,
    query: Vec<(&'static str, String)>,
    items_key: Option<&'static str>,
}

impl PageSource for LinkPages<'_> {
    fn fetch_page(&mut self, cursor: Option<&Cursor>) -> Result<Page> {
        let response = match cursor {
            None => self.session.get(&self.url, &self.query)?,
            Some(next) => self.session.get(next.as_str(), &[])?,
        };

        let items = match self.items_key {
            Some(key) => response.body.get(key).and_then(Value::as_array),
            None => response.body.as_array(),
        }
        .cloned()
        .unwrap_or_default();

        Ok(Page {
            items,
            next: Cursor::from_token(response.next_link.as_deref()),
        })
    }
}

pub struct GitHubApi<'a> {
    session: &'a Session,
    base: String,
    max_pages: usize,
}

impl<'a> GitHubApi<'a> {
    pub fn new(session: &'a Session, base: &str, max_pages: usize) -> Self {
        Self {
            session,
            base: base.trim_end_matches('/').to_string(),
            max_pages,
        }
    }

    fn listing(
        &self,
        path: &str,
        query: Vec<(&'static str, String)>,
        items_key: Option<&'static str>,
    ) -> Pages<LinkPages<'a>> {
        let source = LinkPages {
            session: self.session,
            url: format!("{}{}", self.base, path),
            query,
            items_key,
        };
        fetch_all(source, self.max_pages)
    }

    /// Issue/PR search results (`/search/issues`).
    pub fn search_issues(&self, q: &str) -> Pages<LinkPages<'a>> {
        info!("Searching issues: {}", q);
        self.listing(
            "/search/issues",
            vec![("q", q.to_string()), ("per_page", PER_PAGE.to_string())],
            Some("items"),
        )
    }

    pub fn user_repos(&self, user: &str) -> Pages<LinkPages<'a>> {
        self.listing(
            &format!("/users/{user}/repos"),
            vec![
                ("per_page", PER_PAGE.to_string()),
                ("type", "all".to_string()),
                ("sort", "updated".to_string()),
            ],
            None,
        )
    }

    /// Single pull request, for the size and merge fields search results lack.
    pub fn pull_request(&self, repo: &str, number: u64) -> Result<Value> {
        let response = self
            .session
            .get(&format!("{}/repos/{repo}/pulls/{number}", self.base), &[])?;
        Ok(response.body)
    }

    pub fn repo_commits(&self, repo: &str, author: &str, window: &DateWindow) -> Pages<LinkPages<'a>> {
        self.listing(
            &format!("/repos/{repo}/commits"),
            vec![
                ("author", author.to_string()),
                ("since", window.start_rfc3339()),
                ("until", window.end_rfc3339()),
                ("per_page", PER_PAGE.to_string()),
            ],
            None,
        )
    }
}

/// Timestamp a search qualifier filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Created,
    Updated,
}

impl SearchField {
    pub const ALL: [SearchField; 2] = [SearchField::Created, SearchField::Updated];

    fn qualifier(self) -> &'static str {
        match self {
            SearchField::Created => "created",
            SearchField::Updated => "updated",
        }
    }
}

/// Authored items are searched twice: opened inside the window, and touched
/// inside it. Either search alone misses part of the activity.
pub fn pull_request_query(user: &str, window: &DateWindow, field: SearchField) -> String {
    format!(
        "is:pr author:{user} {}:{}..{}",
        field.qualifier(),
        window.since(),
        window.until()
    )
}

pub fn issue_query(user: &str, window: &DateWindow, field: SearchField) -> String {
    format!(
        "is:issue author:{user} {}:{}..{}",
        field.qualifier(),
        window.since(),
        window.until()
    )
}

pub fn review_query(user: &str, window: &DateWindow) -> String {
    format!("is:pr reviewed-by:{user} updated:{}..{}", window.since(), window.until())
}
