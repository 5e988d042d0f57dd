use crate::fetch::github::GITHUB_API_BASE;
use crate::fetch::google::{CALENDAR_API_BASE, DRIVE_ACTIVITY_API_BASE};
use crate::fetch::{HttpSettings, RetryPolicy, DEFAULT_MAX_PAGES};
use crate::model::DateWindow;
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_max_pages(raw: &str) -> std::result::Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[derive(Parser)]
#[command(name = "perfexport")]
#[command(about = "Export GitHub, Google Docs and Google Calendar activity to CSV and Markdown")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug)]
pub struct CommonArgs {
    #[arg(
        long,
        global = true,
        help = "Start of the window (YYYY-MM-DD, RFC3339, or '<duration> ago'); defaults to 182 days before today"
    )]
    pub since: Option<String>,

    #[arg(
        long,
        global = true,
        help = "End of the window, inclusive (YYYY-MM-DD, RFC3339, or '<duration> ago'); defaults to today"
    )]
    pub until: Option<String>,

    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_PAGES,
        value_parser = parse_max_pages,
        help = "Maximum pages fetched per listing"
    )]
    pub max_pages: usize,

    #[arg(long, global = true, default_value_t = 3, help = "Retries per request while rate limited")]
    pub max_retries: u32,

    #[arg(
        long,
        global = true,
        default_value = "60s",
        value_parser = humantime::parse_duration,
        help = "Longest single backoff sleep (e.g. 30s, 2m)"
    )]
    pub max_backoff: Duration,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "More log output (-v info, -vv debug)")]
    pub verbose: u8,
}

impl CommonArgs {
    pub fn window(&self) -> Result<DateWindow> {
        let today = chrono::Utc::now().date_naive();
        DateWindow::resolve(self.since.as_deref(), self.until.as_deref(), today)
            .context("Failed to resolve date window")
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            retry: RetryPolicy {
                max_retries: self.max_retries,
                max_backoff: self.max_backoff,
            },
            ..HttpSettings::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct GithubArgs {
    #[arg(long, help = "GitHub login to report on; defaults to the token's owner")]
    pub user: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "Personal access token")]
    pub token: Option<String>,

    #[arg(long, default_value = "github_activity.csv")]
    pub out: PathBuf,

    #[arg(long, alias = "summary_md", default_value = "github_activity_summary.md")]
    pub summary_md: PathBuf,

    #[arg(long, hide = true, default_value = GITHUB_API_BASE)]
    pub api_base: String,
}

#[derive(Args, Clone, Debug)]
pub struct GoogleAuthArgs {
    #[arg(long, default_value = "credentials.json", help = "OAuth client secret file")]
    pub credentials: PathBuf,

    #[arg(long, default_value = "token.json", help = "OAuth token cache, written after consent")]
    pub token_cache: PathBuf,
}

#[derive(Args, Clone, Debug)]
pub struct DocsArgs {
    #[arg(long, default_value = "google_docs_activity.csv")]
    pub out: PathBuf,

    #[arg(long, alias = "summary_csv", default_value = "google_docs_files_summary.csv")]
    pub summary_csv: PathBuf,

    #[arg(long, alias = "summary_md", default_value = "google_docs_files_summary.md")]
    pub summary_md: PathBuf,

    #[clap(flatten)]
    pub auth: GoogleAuthArgs,

    #[arg(long, hide = true, default_value = DRIVE_ACTIVITY_API_BASE)]
    pub api_base: String,
}

#[derive(Args, Clone, Debug)]
pub struct CalendarArgs {
    #[arg(long, default_value = "meetings_activity.csv")]
    pub out: PathBuf,

    #[arg(long, alias = "summary_md", default_value = "meetings_summary.md")]
    pub summary_md: PathBuf,

    #[clap(flatten)]
    pub auth: GoogleAuthArgs,

    #[arg(long, hide = true, default_value = CALENDAR_API_BASE)]
    pub api_base: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Commits, pull requests, issues and reviews by a GitHub user
    Github(GithubArgs),
    /// Google Docs you created, edited or commented on
    Docs(DocsArgs),
    /// Meetings on your primary Google Calendar
    Calendar(CalendarArgs),
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        crate::logging::init_logging(self.common.verbose)?;

        match self.command {
            Commands::Github(args) => crate::commands::github::exec(&self.common, args),
            Commands::Docs(args) => crate::commands::docs::exec(&self.common, args),
            Commands::Calendar(args) => crate::commands::calendar::exec(&self.common, args),
        }
    }
}
