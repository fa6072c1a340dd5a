//! Issue listing command (`issue-pilot issues`).

use anyhow::{Context, Result};
use console::style;
use tracing::warn;

use issue_pilot::config::AppConfig;
use issue_pilot::github::{GitHubIssue, GitHubIssues, IssueSource};

use super::resolve_repo;

pub async fn cmd_issues(config: &AppConfig, repo: Option<&str>, json: bool) -> Result<()> {
    let repo = resolve_repo(config, repo)?;
    let lister = GitHubIssues::new(
        config.github.api_base_url.clone(),
        config.github.token.clone(),
    );
    if !lister.has_token() {
        warn!(repo = %repo, "no GitHub token configured; private repositories are not visible and rate limits are lower");
    }
    let issues = lister
        .try_list_issues(&repo)
        .await
        .with_context(|| format!("Failed to list issues for {}", repo))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }

    if issues.is_empty() {
        println!("No issues found in {}", repo);
        return Ok(());
    }

    println!();
    println!("{} ({} issues)", style(&repo).bold(), issues.len());
    println!();
    for issue in &issues {
        println!("{}", issue_line(issue));
    }
    println!();
    Ok(())
}

fn issue_line(issue: &GitHubIssue) -> String {
    let state = if issue.state == "open" {
        style(format!("{:<6}", issue.state)).green()
    } else {
        style(format!("{:<6}", issue.state)).dim()
    };
    let labels = if issue.labels.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        format!(" {}", style(format!("[{}]", names.join(", "))).yellow())
    };
    format!(
        "  {} {} {}{}",
        style(format!("#{:<5}", issue.number)).cyan(),
        state,
        issue.title,
        labels
    )
}
