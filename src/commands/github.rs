use super::{drain, print_summary, spinner, write_reports};
use crate::auth::{Authenticate, GitHubToken};
use crate::cli::{CommonArgs, GithubArgs};
use crate::error::{ExportError, Result};
use crate::fetch::github::{issue_query, pull_request_query, review_query, GitHubApi, SearchField};
use crate::model::Grouping;
use crate::normalize::{Normalizer, RawItem};
use crate::util::repo_from_url;
use anyhow::Context;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub fn exec(common: &CommonArgs, args: GithubArgs) -> anyhow::Result<()> {
    let window = common.window()?;
    let http = common.http_settings();

    let handle = GitHubToken::new(args.token.clone(), &args.api_base)
        .authenticate(&http)
        .context("GitHub authentication failed")?;

    let user = match args.user.clone().filter(|u| !u.trim().is_empty()) {
        Some(user) => user,
        None => handle.account.clone().ok_or_else(|| {
            ExportError::Config("no --user given and the token did not report a login".to_string())
        })?,
    };
    info!("Exporting GitHub activity for {} over {}", user, window);

    let api = GitHubApi::new(&handle.session, &args.api_base, common.max_pages);
    let mut normalizer = Normalizer::new(window);

    let mut fetched = HashSet::new();
    for field in SearchField::ALL {
        drain(
            "pull requests",
            api.search_issues(&pull_request_query(&user, &window, field)),
            &mut normalizer,
            |payload| {
                let details = pull_request_details(&api, &payload, &mut fetched)?;
                Ok(RawItem::PullRequest { payload, details })
            },
        )
        .context("Failed to search pull requests")?;

        drain(
            "issues",
            api.search_issues(&issue_query(&user, &window, field)),
            &mut normalizer,
            |payload| Ok(RawItem::Issue(payload)),
        )
        .context("Failed to search issues")?;
    }

    drain(
        "reviews",
        api.search_issues(&review_query(&user, &window)),
        &mut normalizer,
        |payload| {
            Ok(RawItem::Review {
                reviewer: user.clone(),
                payload,
            })
        },
    )
    .context("Failed to search reviewed pull requests")?;

    let repos = list_repos(&api, &user).context("Failed to list repositories")?;
    for repo in &repos {
        let listed = drain(
            &format!("commits in {repo}"),
            api.repo_commits(repo, &user, &window),
            &mut normalizer,
            |payload| {
                Ok(RawItem::Commit {
                    repo: repo.clone(),
                    payload,
                })
            },
        );
        match listed {
            Ok(_) => {}
            Err(e) if is_skippable(&e) => warn!("Skipping commits for {}: {}", repo, e),
            Err(e) => return Err(e).with_context(|| format!("Failed to list commits for {repo}")),
        }
    }

    let normalized = normalizer.finish();
    let title = format!("GitHub activity for {user}");
    let written = write_reports(
        &normalized,
        &window,
        &title,
        Grouping::Repository,
        &args.out,
        &args.summary_md,
        None,
    )?;
    print_summary(&title, &window, &normalized, &written);
    Ok(())
}

/// Size and merge fields for a pull request seen for the first time. A
/// failed lookup only loses the extras; rate limits and auth still abort.
fn pull_request_details(
    api: &GitHubApi<'_>,
    payload: &Value,
    fetched: &mut HashSet<u64>,
) -> Result<Option<Value>> {
    let repo = payload
        .get("repository_url")
        .and_then(Value::as_str)
        .and_then(repo_from_url);
    let number = payload.get("number").and_then(Value::as_u64);
    let (Some(repo), Some(number)) = (repo, number) else {
        return Ok(None);
    };
    let first_seen = payload
        .get("id")
        .and_then(Value::as_u64)
        .map_or(true, |id| fetched.insert(id));
    if !first_seen {
        debug!("{}#{} already fetched", repo, number);
        return Ok(None);
    }

    match api.pull_request(&repo, number) {
        Ok(details) => Ok(Some(details)),
        Err(e) if e.status().is_some() => {
            warn!("No details for {}#{}: {}", repo, number, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn list_repos(api: &GitHubApi<'_>, user: &str) -> Result<Vec<String>> {
    let pb = spinner("Listing repositories...".to_string());
    let mut repos = Vec::new();

    for item in api.user_repos(user) {
        let item = item?;
        match item.get("full_name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => repos.push(name.to_string()),
            _ => warn!("Repository listing entry without full_name"),
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Found {} repositories for {}", repos.len(), user);
    Ok(repos)
}

/// Missing, empty, or forbidden repositories do not abort the export.
/// Rate limiting surfaces as `RateLimit`, never as a plain 403.
fn is_skippable(err: &ExportError) -> bool {
    matches!(
        err.status().and_then(|s| StatusCode::from_u16(s).ok()),
        Some(StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::FORBIDDEN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_missing_repos_are_skipped() {
        let api = |status| ExportError::Api {
            status,
            message: "nope".into(),
        };
        assert!(is_skippable(&api(404)));
        assert!(is_skippable(&api(409)));
        assert!(is_skippable(&api(403)));
        assert!(!is_skippable(&api(500)));
        assert!(!is_skippable(&ExportError::RateLimit { attempts: 4 }));
        assert!(!is_skippable(&ExportError::Auth("bad".into())));
    }
}
