use super::{drain, print_summary, write_reports};
use crate::auth::{Authenticate, GoogleOAuth};
use crate::cli::{CalendarArgs, CommonArgs};
use crate::fetch::google::calendar_events;
use crate::model::Grouping;
use crate::normalize::{Normalizer, RawItem};
use anyhow::Context;
use tracing::info;

pub fn exec(common: &CommonArgs, args: CalendarArgs) -> anyhow::Result<()> {
    let window = common.window()?;
    let http = common.http_settings();

    let handle = GoogleOAuth::new(&args.auth.credentials, &args.auth.token_cache)
        .authenticate(&http)
        .context("Google authentication failed")?;
    info!("Exporting meetings over {}", window);

    let mut normalizer = Normalizer::new(window);
    drain(
        "calendar events",
        calendar_events(&handle.session, &args.api_base, &window, common.max_pages),
        &mut normalizer,
        |payload| Ok(RawItem::CalendarEvent(payload)),
    )
    .context("Failed to list calendar events")?;

    let normalized = normalizer.finish();
    let title = "Meetings";
    let written = write_reports(
        &normalized,
        &window,
        title,
        Grouping::Week,
        &args.out,
        &args.summary_md,
        None,
    )?;
    print_summary(title, &window, &normalized, &written);
    Ok(())
}
