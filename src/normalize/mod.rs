//! Maps raw API payloads into [`ActivityRecord`]s.
//!
//! Source-specific field names stop here: everything downstream only sees
//! the uniform record shape. Items outside the window are dropped, the first
//! occurrence of each `reference` wins, and malformed items are counted
//! rather than failing the run.

pub mod calendar;
pub mod docs;
pub mod github;

use crate::model::{ActivityRecord, DateWindow, Source};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// A raw listing item tagged with the listing it came from.
#[derive(Debug, Clone)]
pub enum RawItem {
    Commit { repo: String, payload: Value },
    PullRequest { payload: Value, details: Option<Value> },
    Issue(Value),
    Review { reviewer: String, payload: Value },
    DocActivity(Value),
    CalendarEvent(Value),
}

impl RawItem {
    pub fn source(&self) -> Source {
        match self {
            RawItem::Commit { .. } => Source::Commit,
            RawItem::PullRequest { .. } => Source::PullRequest,
            RawItem::Issue(_) => Source::Issue,
            RawItem::Review { .. } => Source::Review,
            RawItem::DocActivity(_) => Source::DocEdit,
            RawItem::CalendarEvent(_) => Source::CalendarEvent,
        }
    }
}

/// Outcome of mapping one payload that was well-formed.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    Record(ActivityRecord),
    /// Well-formed but not the user's activity (declined meeting, other people's edits, ...).
    Excluded(&'static str),
}

/// A payload missing a required field or carrying an unparseable timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedItem {
    pub source: Source,
    pub reason: String,
}

impl MalformedItem {
    pub fn new(source: Source, reason: impl Into<String>) -> Self {
        Self {
            source,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed {} item: {}", self.source, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub accepted: usize,
    pub skipped: usize,
    pub excluded: usize,
    pub out_of_window: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    /// Records in fetch order.
    pub records: Vec<ActivityRecord>,
    pub stats: NormalizeStats,
}

pub struct Normalizer {
    window: DateWindow,
    seen: HashSet<String>,
    doc_ordinals: docs::DocOrdinals,
    records: Vec<ActivityRecord>,
    stats: NormalizeStats,
}

impl Normalizer {
    pub fn new(window: DateWindow) -> Self {
        Self {
            window,
            seen: HashSet::new(),
            doc_ordinals: docs::DocOrdinals::default(),
            records: Vec::new(),
            stats: NormalizeStats::default(),
        }
    }

    pub fn push(&mut self, item: RawItem) {
        let mapped = match &item {
            RawItem::Commit { repo, payload } => github::map_commit(repo, payload),
            RawItem::PullRequest { payload, details } => {
                github::map_issue(Source::PullRequest, payload, details.as_ref(), &self.window)
            }
            RawItem::Issue(payload) => github::map_issue(Source::Issue, payload, None, &self.window),
            RawItem::Review { reviewer, payload } => github::map_review(reviewer, payload),
            RawItem::DocActivity(payload) => docs::map_activity(payload, &mut self.doc_ordinals),
            RawItem::CalendarEvent(payload) => calendar::map_event(payload),
        };

        match mapped {
            Err(malformed) => {
                warn!("Skipping {}", malformed);
                self.stats.skipped += 1;
            }
            Ok(Mapped::Excluded(reason)) => {
                debug!("Excluding {} item: {}", item.source(), reason);
                self.stats.excluded += 1;
            }
            Ok(Mapped::Record(record)) => self.accept(record),
        }
    }

    fn accept(&mut self, record: ActivityRecord) {
        if !self.window.contains(&record.timestamp) {
            self.stats.out_of_window += 1;
            return;
        }
        if !self.seen.insert(record.reference.clone()) {
            self.stats.duplicates += 1;
            return;
        }
        self.stats.accepted += 1;
        self.records.push(record);
    }

    pub fn finish(self) -> Normalized {
        Normalized {
            records: self.records,
            stats: self.stats,
        }
    }
}

pub fn normalize(raw_items: impl IntoIterator<Item = RawItem>, window: &DateWindow) -> Normalized {
    let mut normalizer = Normalizer::new(*window);
    for item in raw_items {
        normalizer.push(item);
    }
    normalizer.finish()
}

/// String field lookup along a path of object keys.
pub(crate) fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
}
