//! Poll loop that tracks a Devin session until it reaches a terminal state.
//!
//! ## State machine
//!
//! ```text
//!  Created ──► Polling ──┬──► Terminal(Complete)   finished, or the agent replied then yielded
//!               ▲   │    ├──► Terminal(Failed)     blocked (default policy), expired,
//!               └───┘    │                         timeout, fetch error
//!            non-terminal└──► Cancelled            token fired between attempts
//! ```
//!
//! Each call to [`SessionPoller::run`] owns its own attempt counter and clock;
//! the poller itself holds no per-session state, so one poller can drive any
//! number of concurrent loops and re-running on a finished session always
//! fetches afresh.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::SessionClient;
use super::models::{CreatedSession, MessageOrigin, Session, SessionId, SessionStatus};
use crate::errors::SessionError;

/// What to do when the session reports `blocked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockedPolicy {
    /// `blocked` ends the loop with [`FailureReason::Blocked`].
    Fail,
    /// Send `message` and keep polling, at most `max_continues` times per run.
    AutoContinue { message: String, max_continues: u32 },
}

/// Timing bounds and completion policy for one poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_duration: Duration,
    pub blocked_policy: BlockedPolicy,
    /// Treat "last message came from the user" as completion once the agent
    /// has replied during this run.
    pub complete_on_user_yield: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
            max_duration: Duration::from_secs(15 * 60),
            blocked_policy: BlockedPolicy::Fail,
            complete_on_user_yield: true,
        }
    }
}

/// Why a loop ended without completing.
#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("session is blocked awaiting input")]
    Blocked,

    #[error("session expired")]
    Expired,

    #[error("timeout")]
    Timeout { attempts: u32, elapsed: Duration },

    #[error(transparent)]
    Fetch(#[from] SessionError),
}

/// How a whole poll loop ended. `Cancelled` is neither success nor failure.
#[derive(Debug)]
pub enum PollExit {
    Complete(Session),
    Failed(FailureReason),
    Cancelled,
}

impl PollExit {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollExit::Cancelled)
    }
}

/// Snapshot-level verdict, before the blocked policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    InProgress,
    Complete,
    Blocked,
    Expired,
}

/// Classify one snapshot.
///
/// `user_yield_after` enables the user-yield heuristic: `Some(n)` completes
/// the session when the last message is from the user and the agent has
/// written at least one message at index `n` or later. `None` disables it.
pub fn classify(session: &Session, user_yield_after: Option<usize>) -> Verdict {
    if session.status.is_terminal_success() {
        return Verdict::Complete;
    }
    match session.status {
        SessionStatus::Expired => Verdict::Expired,
        SessionStatus::Blocked => Verdict::Blocked,
        _ if user_yield_after.is_some_and(|after| agent_yielded(session, after)) => {
            Verdict::Complete
        }
        _ => Verdict::InProgress,
    }
}

fn agent_yielded(session: &Session, after: usize) -> bool {
    let last_is_user = session
        .last_message()
        .is_some_and(|m| m.origin() == MessageOrigin::User);
    last_is_user
        && session
            .messages
            .iter()
            .skip(after)
            .any(|m| m.origin() == MessageOrigin::Agent)
}

/// One progress notification, emitted after every successful fetch.
#[derive(Debug, Clone)]
pub struct ProgressUpdate<'a> {
    pub session_id: &'a SessionId,
    pub status: &'a SessionStatus,
    pub attempt: u32,
    pub elapsed: Duration,
}

/// Receives progress from a running loop. Errors and panics are logged and
/// otherwise ignored; they never stop the loop.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: &ProgressUpdate<'_>) -> anyhow::Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressUpdate<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn report(&self, update: &ProgressUpdate<'_>) -> anyhow::Result<()> {
        self(update)
    }
}

/// Sink that drops every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _update: &ProgressUpdate<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

fn report_isolated(sink: &dyn ProgressSink, update: &ProgressUpdate<'_>) {
    match catch_unwind(AssertUnwindSafe(|| sink.report(update))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(session_id = %update.session_id, error = %e, "progress sink failed"),
        Err(_) => warn!(session_id = %update.session_id, "progress sink panicked"),
    }
}

/// Drives poll loops against a [`SessionClient`].
#[derive(Clone)]
pub struct SessionPoller {
    client: Arc<dyn SessionClient>,
    config: PollConfig,
}

impl SessionPoller {
    pub fn new(client: Arc<dyn SessionClient>, config: PollConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn SessionClient> {
        &self.client
    }

    /// Create a session and poll it to the end.
    pub async fn create_and_run(
        &self,
        prompt: &str,
        title: Option<&str>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(CreatedSession, PollExit), SessionError> {
        let created = self.client.create_session(prompt, title).await?;
        let exit = self.run(&created.session_id, progress, cancel).await;
        Ok((created, exit))
    }

    /// Poll `session_id` until it is terminal, a bound is hit, or `cancel` fires.
    ///
    /// Cancellation is observed between attempts and during the inter-poll
    /// sleep, never in the middle of a fetch; a fetch that was in flight when
    /// the token fired is discarded.
    pub async fn run(
        &self,
        session_id: &SessionId,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> PollExit {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut continues: u32 = 0;
        // Messages already present when the run starts (a follow-up prompt
        // the caller just sent, an earlier agent reply) never count as a
        // user yield.
        let mut yield_baseline: Option<usize> = None;

        info!(
            session_id = %session_id,
            interval_ms = self.config.interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "polling session"
        );

        loop {
            if cancel.is_cancelled() {
                info!(session_id = %session_id, attempts, "poll loop cancelled");
                return PollExit::Cancelled;
            }

            let elapsed = started.elapsed();
            if attempts >= self.config.max_attempts || elapsed >= self.config.max_duration {
                warn!(session_id = %session_id, attempts, elapsed_ms = elapsed.as_millis() as u64, "poll loop timed out");
                return PollExit::Failed(FailureReason::Timeout { attempts, elapsed });
            }

            attempts += 1;
            let fetched = self.client.fetch_status(session_id).await;

            if cancel.is_cancelled() {
                info!(session_id = %session_id, attempts, "poll loop cancelled");
                return PollExit::Cancelled;
            }

            let session = match fetched {
                Ok(session) => session,
                Err(e) => {
                    warn!(session_id = %session_id, attempt = attempts, error = %e, "status fetch failed");
                    return PollExit::Failed(FailureReason::Fetch(e));
                }
            };

            debug!(session_id = %session_id, attempt = attempts, status = %session.status, "polled session");
            report_isolated(
                progress,
                &ProgressUpdate {
                    session_id,
                    status: &session.status,
                    attempt: attempts,
                    elapsed: started.elapsed(),
                },
            );

            let baseline = *yield_baseline.get_or_insert(session.messages.len());
            let user_yield_after = self.config.complete_on_user_yield.then_some(baseline);

            match classify(&session, user_yield_after) {
                Verdict::Complete => {
                    info!(session_id = %session_id, attempts, status = %session.status, "session complete");
                    return PollExit::Complete(session);
                }
                Verdict::Expired => return PollExit::Failed(FailureReason::Expired),
                Verdict::Blocked => match &self.config.blocked_policy {
                    BlockedPolicy::AutoContinue {
                        message,
                        max_continues,
                    } if continues < *max_continues => {
                        continues += 1;
                        info!(session_id = %session_id, continues, "session blocked, sending continuation");
                        if let Err(e) = self.client.send_message(session_id, message).await {
                            return PollExit::Failed(FailureReason::Fetch(e));
                        }
                        // The continuation lands after the current messages.
                        yield_baseline = Some(session.messages.len() + 1);
                    }
                    _ => {
                        info!(session_id = %session_id, attempts, "session blocked awaiting input");
                        return PollExit::Failed(FailureReason::Blocked);
                    }
                },
                Verdict::InProgress => {}
            }

            let remaining = self
                .config
                .max_duration
                .saturating_sub(started.elapsed());
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(session_id = %session_id, attempts, "poll loop cancelled");
                    return PollExit::Cancelled;
                }
                _ = tokio::time::sleep(self.config.interval.min(remaining)) => {}
            }
        }
    }
}
