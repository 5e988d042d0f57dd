use crate::error::{ExportError, Result};
use crate::util::parse_date_input;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Days covered by the default window (about six months).
pub const DEFAULT_WINDOW_DAYS: i64 = 182;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Commit,
    PullRequest,
    Issue,
    Review,
    DocEdit,
    CalendarEvent,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Commit => "commit",
            Source::PullRequest => "pull_request",
            Source::Issue => "issue",
            Source::Review => "review",
            Source::DocEdit => "doc_edit",
            Source::CalendarEvent => "calendar_event",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Source::Commit => "Commits",
            Source::PullRequest => "Pull requests",
            Source::Issue => "Issues",
            Source::Review => "Reviews",
            Source::DocEdit => "Doc edits",
            Source::CalendarEvent => "Meetings",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized unit of activity.
///
/// `reference` is the identity used for deduplication; `scope` is the
/// source-specific grouping value (repository, document id or ISO week).
/// `detail` carries optional extras such as PR size or meeting attendees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub source: Source,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub reference: String,
    pub label: String,
    pub scope: String,
    pub status: String,
    pub detail: String,
    pub url: String,
}

/// Inclusive `[since, until]` range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    since: NaiveDate,
    until: NaiveDate,
}

impl DateWindow {
    pub fn new(since: NaiveDate, until: NaiveDate) -> Result<Self> {
        if since > until {
            return Err(ExportError::InvalidDate(format!(
                "Invalid range: since ({since}) is after until ({until})"
            )));
        }
        Ok(Self { since, until })
    }

    /// Builds the window from optional CLI input; each missing side falls back
    /// to its default relative to `today`.
    pub fn resolve(since: Option<&str>, until: Option<&str>, today: NaiveDate) -> Result<Self> {
        let until = match until {
            Some(u) => parse_date_input(u, today)?,
            None => today,
        };
        let since = match since {
            Some(s) => parse_date_input(s, today)?,
            None => today - Duration::days(DEFAULT_WINDOW_DAYS),
        };
        Self::new(since, until)
    }

    pub fn since(&self) -> NaiveDate {
        self.since
    }

    pub fn until(&self) -> NaiveDate {
        self.until
    }

    /// First instant of `since`.
    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.since.and_time(chrono::NaiveTime::MIN))
    }

    /// Last whole second of `until`.
    pub fn end(&self) -> DateTime<Utc> {
        let next_day = self.until.succ_opt().unwrap_or(self.until);
        Utc.from_utc_datetime(&next_day.and_time(chrono::NaiveTime::MIN)) - Duration::seconds(1)
    }

    pub fn start_rfc3339(&self) -> String {
        format!("{}T00:00:00Z", self.since)
    }

    pub fn end_rfc3339(&self) -> String {
        format!("{}T23:59:59Z", self.until)
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        let day = timestamp.date_naive();
        self.since <= day && day <= self.until
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.since, self.until)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Week,
    Repository,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryBucket {
    pub key: String,
    pub first: DateTime<Utc>,
    pub counts: BTreeMap<Source, usize>,
    pub records: Vec<ActivityRecord>,
}

impl SummaryBucket {
    pub fn new(key: String, first: DateTime<Utc>) -> Self {
        Self {
            key,
            first,
            counts: BTreeMap::new(),
            records: Vec::new(),
        }
    }

    pub fn add(&mut self, record: &ActivityRecord) {
        if record.timestamp < self.first {
            self.first = record.timestamp;
        }
        *self.counts.entry(record.source).or_insert(0) += 1;
        self.records.push(record.clone());
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }
}

/// Per-document rollup written to the docs summary CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub file_id: String,
    pub title: String,
    pub url: String,
    pub first_activity: String,
    pub last_activity: String,
    pub creates: u32,
    pub edits: u32,
    pub comments: u32,
    pub total_actions: u32,
    pub active_days: u32,
}
