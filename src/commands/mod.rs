//! One exec function per subcommand: authenticate, drain each listing into
//! the normalizer, then render and write the reports.

pub mod calendar;
pub mod docs;
pub mod github;

use crate::error::Result;
use crate::fetch::{PageSource, Pages};
use crate::model::{DateWindow, Grouping, Source};
use crate::normalize::{Normalized, Normalizer, RawItem};
use crate::report::{aggregate, render_csv, render_markdown, write_output};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {pos}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb
}

/// Feeds every item of one listing to the normalizer. Returns the number of
/// raw items seen. An error from `wrap` aborts the listing like a fetch error.
pub(crate) fn drain<S: PageSource>(
    label: &str,
    mut pages: Pages<S>,
    normalizer: &mut Normalizer,
    mut wrap: impl FnMut(Value) -> Result<RawItem>,
) -> Result<u64> {
    let pb = spinner(format!("Fetching {label}..."));
    let mut seen = 0u64;

    for item in pages.by_ref() {
        let item = match item.and_then(&mut wrap) {
            Ok(item) => item,
            Err(e) => {
                pb.abandon_with_message(format!("Fetching {label} failed"));
                return Err(e);
            }
        };
        normalizer.push(item);
        seen += 1;
        pb.inc(1);
    }

    debug!("{}: {} items over {} pages", label, seen, pages.pages_fetched());
    pb.finish_and_clear();
    Ok(seen)
}

/// Writes the activity CSV and the grouped Markdown summary, with `appendix`
/// added after the buckets.
pub(crate) fn write_reports(
    normalized: &Normalized,
    window: &DateWindow,
    title: &str,
    grouping: Grouping,
    csv_path: &Path,
    md_path: &Path,
    appendix: Option<&str>,
) -> anyhow::Result<Vec<PathBuf>> {
    use anyhow::Context;

    let csv = render_csv(&normalized.records).context("Failed to render CSV")?;
    write_output(csv_path, &csv)
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    let buckets = aggregate(&normalized.records, grouping);
    let mut markdown = render_markdown(title, window, &buckets, &normalized.stats);
    if let Some(extra) = appendix {
        markdown.push_str(extra);
    }
    write_output(md_path, &markdown)
        .with_context(|| format!("Failed to write {}", md_path.display()))?;

    Ok(vec![csv_path.to_path_buf(), md_path.to_path_buf()])
}

pub(crate) fn print_summary(title: &str, window: &DateWindow, normalized: &Normalized, written: &[PathBuf]) {
    let stats = &normalized.stats;

    eprintln!("{} {}", style("✓").green().bold(), style(title).bold());
    eprintln!("  window:   {}", window);
    eprintln!("  records:  {}", style(stats.accepted).cyan());
    let mut per_source: BTreeMap<Source, usize> = BTreeMap::new();
    for record in &normalized.records {
        *per_source.entry(record.source).or_insert(0) += 1;
    }
    for (source, count) in &per_source {
        eprintln!("    {:<14} {}", source.plural(), count);
    }
    if stats.excluded > 0 {
        eprintln!("  excluded: {}", stats.excluded);
    }
    if stats.duplicates > 0 || stats.out_of_window > 0 {
        eprintln!(
            "  dropped:  {} duplicate, {} outside window",
            stats.duplicates, stats.out_of_window
        );
    }
    if stats.skipped > 0 {
        eprintln!(
            "  {} {} malformed item(s) skipped",
            style("!").yellow().bold(),
            stats.skipped
        );
    }
    for path in written {
        eprintln!("  wrote     {}", style(path.display()).underlined());
    }
}
