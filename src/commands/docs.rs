use super::{drain, print_summary, write_reports};
use crate::auth::{Authenticate, GoogleOAuth};
use crate::cli::{CommonArgs, DocsArgs};
use crate::fetch::google::drive_activities;
use crate::model::Grouping;
use crate::normalize::{Normalizer, RawItem};
use crate::report::{
    aggregate, render_file_sections, render_file_summary_csv, summarize_files, write_output,
};
use anyhow::Context;
use tracing::info;

pub fn exec(common: &CommonArgs, args: DocsArgs) -> anyhow::Result<()> {
    let window = common.window()?;
    let http = common.http_settings();

    let handle = GoogleOAuth::new(&args.auth.credentials, &args.auth.token_cache)
        .authenticate(&http)
        .context("Google authentication failed")?;
    info!("Exporting Google Docs activity over {}", window);

    let mut normalizer = Normalizer::new(window);
    drain(
        "Drive activity",
        drive_activities(&handle.session, &args.api_base, &window, common.max_pages),
        &mut normalizer,
        |payload| Ok(RawItem::DocActivity(payload)),
    )
    .context("Failed to query Drive activity")?;

    let normalized = normalizer.finish();
    let title = "Google Docs activity";
    let files = summarize_files(&normalized.records);
    let by_file = aggregate(&normalized.records, Grouping::File);
    let file_sections = render_file_sections(&files, &by_file);
    let mut written = write_reports(
        &normalized,
        &window,
        title,
        Grouping::Week,
        &args.out,
        &args.summary_md,
        Some(&file_sections),
    )?;

    let summary = render_file_summary_csv(&files).context("Failed to render file summary")?;
    write_output(&args.summary_csv, &summary)
        .with_context(|| format!("Failed to write {}", args.summary_csv.display()))?;
    written.push(args.summary_csv.clone());
    info!("{} documents touched", files.len());

    print_summary(title, &window, &normalized, &written);
    Ok(())
}
