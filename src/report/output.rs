use super::aggregate::sorted_records;
use crate::error::{ExportError, Result};
use crate::model::{ActivityRecord, DateWindow, FileSummary, Source, SummaryBucket};
use crate::normalize::NormalizeStats;
use crate::util::format_timestamp;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Serialize)]
struct CsvRow<'a> {
    source: &'static str,
    actor: &'a str,
    timestamp: String,
    reference: &'a str,
    label: &'a str,
    scope: &'a str,
    status: &'a str,
    detail: &'a str,
    url: &'a str,
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// One row per record, sorted so identical input renders identical bytes.
/// The header is written even when there are no records.
pub fn render_csv(records: &[ActivityRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record([
        "source", "actor", "timestamp", "reference", "label", "scope", "status", "detail", "url",
    ])?;

    for record in sorted_records(records) {
        writer.serialize(CsvRow {
            source: record.source.as_str(),
            actor: &record.actor,
            timestamp: format_timestamp(&record.timestamp),
            reference: &record.reference,
            label: &record.label,
            scope: &record.scope,
            status: &record.status,
            detail: &record.detail,
            url: &record.url,
        })?;
    }

    into_string(writer)
}

pub fn render_file_summary_csv(rows: &[FileSummary]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record([
        "file_id",
        "title",
        "url",
        "first_activity",
        "last_activity",
        "creates",
        "edits",
        "comments",
        "total_actions",
        "active_days",
    ])?;
    for row in rows {
        writer.serialize(row)?;
    }
    into_string(writer)
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub fn render_markdown(
    title: &str,
    window: &DateWindow,
    buckets: &[SummaryBucket],
    stats: &NormalizeStats,
) -> String {
    let mut totals: BTreeMap<Source, usize> = BTreeMap::new();
    for bucket in buckets {
        for (source, count) in &bucket.counts {
            *totals.entry(*source).or_insert(0) += count;
        }
    }
    let total: usize = buckets.iter().map(SummaryBucket::total).sum();

    let mut out = format!("# {title} ({}..{})\n\n", window.since(), window.until());
    out.push_str(&format!("- Total: {total}\n"));
    for (source, count) in &totals {
        out.push_str(&format!("- {}: {count}\n", source.plural()));
    }
    if stats.skipped > 0 {
        out.push_str(&format!("- Skipped (malformed): {}\n", stats.skipped));
    }

    if buckets.is_empty() {
        out.push_str("\n_No activity in this window._\n");
        return out;
    }

    for bucket in buckets {
        out.push_str(&format!("\n## {}\n\n", escape_cell(&bucket.key)));
        let breakdown: Vec<String> = bucket
            .counts
            .iter()
            .map(|(source, count)| format!("{} {count}", source.plural().to_lowercase()))
            .collect();
        out.push_str(&format!("{} items ({})\n\n", bucket.total(), breakdown.join(", ")));

        out.push_str("| When | Type | Title | Status | Details | Link |\n");
        out.push_str("|------|------|-------|--------|---------|------|\n");
        for record in &bucket.records {
            let link = if record.url.is_empty() {
                String::new()
            } else {
                format!("[open]({})", record.url)
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                record.timestamp.format("%Y-%m-%d %H:%M"),
                record.source,
                escape_cell(&record.label),
                escape_cell(&record.status),
                escape_cell(&record.detail),
                link
            ));
        }
    }

    out
}

/// Per-document section for the docs summary: files ordered by last
/// activity, each followed by its actions from the `Grouping::File` buckets.
pub fn render_file_sections(files: &[FileSummary], by_file: &[SummaryBucket]) -> String {
    let mut out = String::from("\n## Files (ordered by last activity)\n\n");
    if files.is_empty() {
        out.push_str("_No documents touched._\n");
        return out;
    }

    let actions: u32 = files.iter().map(|f| f.total_actions).sum();
    out.push_str(&format!("- Files touched: {}\n- Total actions: {actions}\n", files.len()));

    for file in files {
        out.push_str(&format!("\n### {}\n\n", escape_cell(&file.title)));
        out.push_str(&format!(
            "Last activity {} | Actions: {} (Create: {}, Edit: {}, Comment: {}) | Active days: {}\n",
            file.last_activity, file.total_actions, file.creates, file.edits, file.comments, file.active_days
        ));
        if !file.url.is_empty() {
            out.push_str(&format!("\n[open]({})\n", file.url));
        }
        if let Some(bucket) = by_file.iter().find(|b| b.key == file.file_id) {
            out.push('\n');
            for record in &bucket.records {
                out.push_str(&format!(
                    "- {} {}\n",
                    record.timestamp.format("%Y-%m-%d %H:%M"),
                    record.status
                ));
            }
        }
    }

    out
}

pub fn write_output(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    info!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Grouping;
    use crate::report::aggregate;
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn record(source: Source, reference: &str, day: u32, label: &str) -> ActivityRecord {
        ActivityRecord {
            source,
            actor: "octo".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, day, 12, 30, 0).unwrap(),
            reference: reference.into(),
            label: label.into(),
            scope: "octo/demo".into(),
            status: "open".into(),
            detail: String::new(),
            url: format!("https://github.com/octo/demo/issues/{reference}"),
        }
    }

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn csv_is_byte_stable_regardless_of_input_order() {
        let records = vec![
            record(Source::Issue, "2", 5, "Second, with comma"),
            record(Source::PullRequest, "1", 3, "First \"quoted\""),
            record(Source::Issue, "3", 5, "Same time"),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let a = render_csv(&records).unwrap();
        let b = render_csv(&reversed).unwrap();
        let c = render_csv(&records).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);

        let lines: Vec<&str> = a.lines().collect();
        assert_eq!(lines[0], "source,actor,timestamp,reference,label,scope,status,detail,url");
        assert_eq!(
            lines[1],
            "pull_request,octo,2025-03-03T12:30:00Z,1,\"First \"\"quoted\"\"\",octo/demo,open,,https://github.com/octo/demo/issues/1"
        );
        assert!(lines[2].contains(",2,\"Second, with comma\","));
        assert!(lines[3].contains(",3,Same time,"));
    }

    #[test]
    fn empty_csv_still_has_header() {
        assert_eq!(
            render_csv(&[]).unwrap(),
            "source,actor,timestamp,reference,label,scope,status,detail,url\n"
        );
    }

    #[test]
    fn markdown_layout() {
        let mut pr = record(Source::PullRequest, "1", 3, "Add | pipe");
        pr.detail = "+10 -2 in 1 files; labels: a|b".into();
        let records = vec![pr, record(Source::Issue, "2", 5, "Bug")];
        let buckets = aggregate(&records, Grouping::Repository);
        let stats = NormalizeStats {
            skipped: 2,
            ..Default::default()
        };
        let md = render_markdown("GitHub activity for octo", &window(), &buckets, &stats);

        let expected = "\
# GitHub activity for octo (2025-03-01..2025-03-31)

- Total: 2
- Pull requests: 1
- Issues: 1
- Skipped (malformed): 2

## octo/demo

2 items (pull requests 1, issues 1)

| When | Type | Title | Status | Details | Link |
|------|------|-------|--------|---------|------|
| 2025-03-03 12:30 | pull_request | Add \\| pipe | open | +10 -2 in 1 files; labels: a\\|b | [open](https://github.com/octo/demo/issues/1) |
| 2025-03-05 12:30 | issue | Bug | open |  | [open](https://github.com/octo/demo/issues/2) |
";
        assert_eq!(md, expected);
    }

    #[test]
    fn markdown_without_records() {
        let md = render_markdown("Meetings", &window(), &[], &NormalizeStats::default());
        assert!(md.starts_with("# Meetings (2025-03-01..2025-03-31)\n\n- Total: 0\n"));
        assert!(md.contains("_No activity in this window._"));
        assert!(!md.contains("Skipped"));
    }

    #[test]
    fn file_summary_csv_header() {
        let csv = render_file_summary_csv(&[]).unwrap();
        assert_eq!(
            csv,
            "file_id,title,url,first_activity,last_activity,creates,edits,comments,total_actions,active_days\n"
        );
    }

    #[test]
    fn file_sections_follow_summary_order() {
        let doc = |reference: &str, file: &str, day: u32, action: &str| ActivityRecord {
            source: Source::DocEdit,
            actor: "me".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap(),
            reference: reference.into(),
            label: format!("Doc {file}"),
            scope: file.into(),
            status: action.into(),
            detail: String::new(),
            url: format!("https://docs.google.com/document/d/{file}/edit"),
        };
        let records = vec![
            doc("A#0", "A", 2, "CREATE"),
            doc("A#1", "A", 3, "EDIT"),
            doc("B#0", "B", 10, "COMMENT"),
        ];
        let files = crate::report::summarize_files(&records);
        let by_file = aggregate(&records, Grouping::File);
        let md = render_file_sections(&files, &by_file);

        let expected = "
## Files (ordered by last activity)

- Files touched: 2
- Total actions: 3

### Doc B

Last activity 2025-03-10T09:00:00Z | Actions: 1 (Create: 0, Edit: 0, Comment: 1) | Active days: 1

[open](https://docs.google.com/document/d/B/edit)

- 2025-03-10 09:00 COMMENT

### Doc A

Last activity 2025-03-03T09:00:00Z | Actions: 2 (Create: 1, Edit: 1, Comment: 0) | Active days: 2

[open](https://docs.google.com/document/d/A/edit)

- 2025-03-02 09:00 CREATE
- 2025-03-03 09:00 EDIT
";
        assert_eq!(md, expected);
        assert!(render_file_sections(&[], &[]).contains("_No documents touched._"));
    }

    #[test]
    fn write_output_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_output(&path, "a,b\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a,b\n");
    }
}
