use crate::model::{ActivityRecord, FileSummary, Grouping, Source, SummaryBucket};
use crate::util::{format_timestamp, week_key};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};

const UNKNOWN_SCOPE: &str = "(unknown)";

/// Records in emission order: ascending timestamp, ties by reference.
pub fn sorted_records(records: &[ActivityRecord]) -> Vec<ActivityRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.reference.cmp(&b.reference))
    });
    sorted
}

fn bucket_key(record: &ActivityRecord, grouping: Grouping) -> String {
    let scope = if record.scope.is_empty() {
        UNKNOWN_SCOPE
    } else {
        record.scope.as_str()
    };
    match grouping {
        Grouping::Week => week_key(&record.timestamp),
        Grouping::Repository | Grouping::File => scope.to_string(),
    }
}

/// Groups records into buckets ordered by their earliest record, ties by key.
pub fn aggregate(records: &[ActivityRecord], grouping: Grouping) -> Vec<SummaryBucket> {
    let mut by_key: BTreeMap<String, SummaryBucket> = BTreeMap::new();

    for record in sorted_records(records) {
        let key = bucket_key(&record, grouping);
        by_key
            .entry(key.clone())
            .or_insert_with(|| SummaryBucket::new(key, record.timestamp))
            .add(&record);
    }

    let mut buckets: Vec<SummaryBucket> = by_key.into_values().collect();
    buckets.sort_by(|a, b| a.first.cmp(&b.first).then_with(|| a.key.cmp(&b.key)));
    buckets
}

struct FileAccum {
    title: String,
    url: String,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    creates: u32,
    edits: u32,
    comments: u32,
    days: BTreeSet<NaiveDate>,
}

/// Per-document rollup of doc edits, most recently active first.
pub fn summarize_files(records: &[ActivityRecord]) -> Vec<FileSummary> {
    let mut files: BTreeMap<String, FileAccum> = BTreeMap::new();

    for record in sorted_records(records) {
        if record.source != Source::DocEdit {
            continue;
        }
        let entry = files.entry(record.scope.clone()).or_insert_with(|| FileAccum {
            title: record.label.clone(),
            url: record.url.clone(),
            first: record.timestamp,
            last: record.timestamp,
            creates: 0,
            edits: 0,
            comments: 0,
            days: BTreeSet::new(),
        });

        // records arrive oldest first, so the latest title wins
        entry.title = record.label.clone();
        entry.last = record.timestamp;
        entry.days.insert(record.timestamp.date_naive());
        match record.status.as_str() {
            "CREATE" => entry.creates += 1,
            "EDIT" => entry.edits += 1,
            "COMMENT" => entry.comments += 1,
            _ => {}
        }
    }

    let mut rows: Vec<(DateTime<Utc>, FileSummary)> = files
        .into_iter()
        .map(|(file_id, acc)| {
            let summary = FileSummary {
                file_id,
                title: acc.title,
                url: acc.url,
                first_activity: format_timestamp(&acc.first),
                last_activity: format_timestamp(&acc.last),
                creates: acc.creates,
                edits: acc.edits,
                comments: acc.comments,
                total_actions: acc.creates + acc.edits + acc.comments,
                active_days: acc.days.len() as u32,
            };
            (acc.last, summary)
        })
        .collect();

    rows.sort_by(|(a_last, a), (b_last, b)| {
        b_last.cmp(a_last).then_with(|| a.file_id.cmp(&b.file_id))
    });
    rows.into_iter().map(|(_, summary)| summary).collect()
}
