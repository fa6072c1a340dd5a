//! Devin session commands: `scope`, `complete`, `poll` and `message`.
//!
//! All of them run the poll loop in the foreground behind a spinner. Ctrl-C
//! cancels the loop between attempts; the remote session keeps running.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use issue_pilot::config::AppConfig;
use issue_pilot::github::{GitHubIssue, GitHubIssues, IssueSource};
use issue_pilot::session::prompts::{follow_up_prompt, prompt_for, session_title};
use issue_pilot::session::{
    CredentialStore, DevinClient, FailureReason, PollExit, ScopeAnalysis, Session, SessionClient,
    SessionId, SessionMode, SessionPoller, extract_analysis,
};
use issue_pilot::ui::PollSpinner;

use super::super::IssueArgs;
use super::resolve_repo;

/// Fails before any network call when no Devin key is configured.
fn devin_client(config: &AppConfig) -> Result<DevinClient> {
    let credentials = CredentialStore::with_key(config.devin.api_key.clone());
    if !credentials.is_configured() {
        bail!(
            "Devin API key is not configured. Set DEVIN_API_KEY or [devin] api_key in config.toml"
        );
    }
    Ok(DevinClient::new(
        config.devin.api_base_url.clone(),
        credentials,
    ))
}

/// `scope` and `complete`: start (or follow up on) a session for one issue
/// and poll it to the end.
pub async fn cmd_issue_session(config: &AppConfig, mode: SessionMode, args: &IssueArgs) -> Result<()> {
    let client = Arc::new(devin_client(config)?);
    let repo = resolve_repo(config, args.repo.as_deref())?;

    let (session_id, url) = match &args.session {
        Some(id) => {
            let session_id = SessionId::new(id.as_str());
            client
                .send_message(&session_id, &follow_up_prompt(mode))
                .await
                .with_context(|| format!("Failed to send follow-up to session {}", session_id))?;
            (session_id, None)
        }
        None => {
            let issue = find_issue(config, &repo, args.number).await?;
            let created = client
                .create_session(&prompt_for(mode, &issue), Some(&session_title(&issue)))
                .await
                .context("Failed to create Devin session")?;
            (created.session_id, Some(created.url))
        }
    };

    info!(
        session_id = %session_id,
        issue = args.number,
        repo = %repo,
        mode = mode.as_str(),
        "started Devin session for issue"
    );

    let poller = SessionPoller::new(client, config.poll_config());
    let prefix = format!("#{}", args.number);
    let session = poll_to_end(&poller, &session_id, url.as_deref(), &prefix).await?;
    let analysis = match mode {
        SessionMode::Scope => extract_analysis(&session),
        SessionMode::Complete => None,
    };
    report(&session, url.as_deref(), analysis.as_ref(), args.json)
}

/// `poll`: attach to an existing session.
pub async fn cmd_poll(config: &AppConfig, session_id: &str, analyze: bool, json: bool) -> Result<()> {
    let client = Arc::new(devin_client(config)?);
    let session_id = SessionId::new(session_id);
    let poller = SessionPoller::new(client, config.poll_config());

    let session = poll_to_end(&poller, &session_id, None, session_id.as_str()).await?;
    let analysis = if analyze {
        extract_analysis(&session)
    } else {
        None
    };
    report(&session, None, analysis.as_ref(), json)
}

/// `message`: send one message and return.
pub async fn cmd_message(config: &AppConfig, session_id: &str, message: &str) -> Result<()> {
    let client = devin_client(config)?;
    let session_id = SessionId::new(session_id);
    client
        .send_message(&session_id, message)
        .await
        .with_context(|| format!("Failed to send message to session {}", session_id))?;
    println!("Message sent to session {}", style(&session_id).cyan());
    Ok(())
}

async fn find_issue(
    config: &AppConfig,
    repo: &issue_pilot::github::RepoCoordinate,
    number: u64,
) -> Result<GitHubIssue> {
    let lister = GitHubIssues::new(
        config.github.api_base_url.clone(),
        config.github.token.clone(),
    );
    let issues = lister
        .try_list_issues(repo)
        .await
        .with_context(|| format!("Failed to list issues for {}", repo))?;
    issues
        .into_iter()
        .find(|i| i.number == number)
        .with_context(|| format!("Issue #{} not found in {}", number, repo))
}

async fn poll_to_end(
    poller: &SessionPoller,
    session_id: &SessionId,
    url: Option<&str>,
    prefix: &str,
) -> Result<Session> {
    let spinner = PollSpinner::new(prefix, poller.config().max_attempts);
    if let Some(url) = url {
        spinner.show_session_url(url);
    }

    let cancel = cancel_on_ctrl_c();
    let exit = poller.run(session_id, &spinner, &cancel).await;
    cancel.cancel();

    match exit {
        PollExit::Complete(session) => {
            spinner.finish_complete(&format!("Session {} complete", session_id));
            Ok(session)
        }
        PollExit::Failed(FailureReason::Blocked) => {
            spinner.finish_blocked("Devin is blocked awaiting input");
            bail!(
                "Session {} is blocked awaiting input. Reply with 'issue-pilot message {} <text>'",
                session_id,
                session_id
            )
        }
        PollExit::Failed(reason) => {
            spinner.finish_failed(&reason.to_string());
            bail!("Session {} failed: {}", session_id, reason)
        }
        PollExit::Cancelled => {
            spinner.finish_cancelled();
            bail!("Stopped polling session {}", session_id)
        }
    }
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    on_signal.cancel();
                }
            }
            _ = on_signal.cancelled() => {}
        }
    });
    token
}

#[derive(Serialize)]
struct SessionReport<'a> {
    session_id: &'a SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a ScopeAnalysis>,
}

fn report(
    session: &Session,
    url: Option<&str>,
    analysis: Option<&ScopeAnalysis>,
    json: bool,
) -> Result<()> {
    if json {
        let report = SessionReport {
            session_id: session.id(),
            url,
            status: session.status.as_str(),
            analysis,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(analysis) = analysis {
        print_analysis(analysis);
    }
    Ok(())
}

fn print_analysis(analysis: &ScopeAnalysis) {
    println!();
    println!("{}", style("Scope analysis").bold().underlined());
    match analysis.confidence_score {
        Some(score) => {
            let score_text = format!("{}/10", score);
            let styled = match score {
                8..=10 => style(score_text).green(),
                5..=7 => style(score_text).yellow(),
                _ => style(score_text).red(),
            };
            println!("  Confidence: {}", styled.bold());
        }
        None => println!("  Confidence: {}", style("not reported").dim()),
    }
    println!();
    println!("{}", analysis.scope);
    if analysis.full_analysis != analysis.scope && !analysis.full_analysis.is_empty() {
        println!();
        println!("{}", style("Full analysis").bold());
        println!("{}", analysis.full_analysis);
    }
    println!();
}
