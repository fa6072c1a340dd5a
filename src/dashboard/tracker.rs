//! In-memory registry of poll loops started by the dashboard.
//!
//! Each tracked session owns one background task and one cancellation token.
//! Starting a session that is already tracked cancels the old loop and
//! replaces it; a generation counter keeps the late exit of the old loop from
//! overwriting the new entry.
//!
//! Running loops are never evicted. Settled entries (complete, failed,
//! cancelled) are kept for inspection up to [`MAX_SETTLED_SESSIONS`]; past
//! that the least recently updated ones are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ws::{WsMessage, broadcast_message};
use crate::session::{
    PollExit, ProgressSink, ProgressUpdate, ScopeAnalysis, SessionId, SessionMode, SessionPoller,
    extract_analysis,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedPhase {
    Polling,
    Complete,
    Failed,
    Cancelled,
}

/// The dashboard's view of one poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedSession {
    pub session_id: SessionId,
    pub url: Option<String>,
    pub issue_number: Option<u64>,
    pub repo: Option<String>,
    pub mode: SessionMode,
    pub phase: TrackedPhase,
    /// Last remote status seen.
    pub status: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
    pub analysis: Option<ScopeAnalysis>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedSession {
    pub fn new(
        session_id: SessionId,
        url: Option<String>,
        issue_number: Option<u64>,
        repo: Option<String>,
        mode: SessionMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            url,
            issue_number,
            repo,
            mode,
            phase: TrackedPhase::Polling,
            status: None,
            attempts: 0,
            error: None,
            analysis: None,
            started_at: now,
            updated_at: now,
        }
    }
}

struct Entry {
    view: TrackedSession,
    cancel: CancellationToken,
    generation: u64,
}

/// Settled sessions kept before the oldest are evicted.
pub const MAX_SETTLED_SESSIONS: usize = 200;

struct Registry {
    entries: HashMap<SessionId, Entry>,
    next_generation: u64,
    max_settled: usize,
}

impl Registry {
    fn evict_settled(&mut self) {
        let mut settled: Vec<(SessionId, DateTime<Utc>)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.view.phase != TrackedPhase::Polling)
            .map(|(id, e)| (id.clone(), e.view.updated_at))
            .collect();
        if settled.len() <= self.max_settled {
            return;
        }
        settled.sort_by(|a, b| a.1.cmp(&b.1));
        let excess = settled.len() - self.max_settled;
        for (id, _) in settled.into_iter().take(excess) {
            debug!(session_id = %id, "evicting settled session");
            self.entries.remove(&id);
        }
    }
}

#[derive(Clone)]
pub struct SessionTracker {
    inner: Arc<Mutex<Registry>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::with_max_settled(MAX_SETTLED_SESSIONS)
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_settled(max_settled: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                entries: HashMap::new(),
                next_generation: 0,
                max_settled,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `session` and spawn its poll loop.
    pub fn start(
        &self,
        poller: SessionPoller,
        mut session: TrackedSession,
        ws_tx: broadcast::Sender<String>,
    ) -> JoinHandle<()> {
        let cancel = CancellationToken::new();
        let generation = {
            let mut registry = self.lock();
            registry.next_generation += 1;
            let generation = registry.next_generation;
            if let Some(previous) = registry.entries.get(&session.session_id) {
                previous.cancel.cancel();
                if session.url.is_none() {
                    session.url = previous.view.url.clone();
                }
            }
            registry.entries.insert(
                session.session_id.clone(),
                Entry {
                    view: session.clone(),
                    cancel: cancel.clone(),
                    generation,
                },
            );
            generation
        };

        info!(session_id = %session.session_id, mode = session.mode.as_str(), "tracking session");
        broadcast_message(
            &ws_tx,
            &WsMessage::SessionStarted {
                session: session.clone(),
            },
        );

        let tracker = self.clone();
        tokio::spawn(async move {
            let sink = TrackerSink {
                tracker: tracker.clone(),
                generation,
                ws_tx: ws_tx.clone(),
            };
            let exit = poller.run(&session.session_id, &sink, &cancel).await;
            tracker.finish(&session.session_id, generation, session.mode, exit, &ws_tx);
        })
    }

    pub fn get(&self, session_id: &SessionId) -> Option<TrackedSession> {
        self.lock()
            .entries
            .get(session_id)
            .map(|e| e.view.clone())
    }

    /// All tracked sessions, newest first.
    pub fn list(&self) -> Vec<TrackedSession> {
        let mut sessions: Vec<TrackedSession> =
            self.lock().entries.values().map(|e| e.view.clone()).collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions
    }

    pub fn url_for(&self, session_id: &SessionId) -> Option<String> {
        self.lock()
            .entries
            .get(session_id)
            .and_then(|e| e.view.url.clone())
    }

    /// Fire the session's cancellation token. The loop notices between
    /// attempts; the returned view may still say `polling`.
    pub fn cancel(&self, session_id: &SessionId) -> Option<TrackedSession> {
        let registry = self.lock();
        let entry = registry.entries.get(session_id)?;
        entry.cancel.cancel();
        Some(entry.view.clone())
    }

    pub fn cancel_all(&self) {
        for entry in self.lock().entries.values() {
            entry.cancel.cancel();
        }
    }

    fn record_progress(&self, session_id: &SessionId, generation: u64, status: &str, attempt: u32) {
        let mut registry = self.lock();
        if let Some(entry) = registry
            .entries
            .get_mut(session_id)
            .filter(|e| e.generation == generation)
        {
            entry.view.status = Some(status.to_string());
            entry.view.attempts = attempt;
            entry.view.updated_at = Utc::now();
        }
    }

    fn finish(
        &self,
        session_id: &SessionId,
        generation: u64,
        mode: SessionMode,
        exit: PollExit,
        ws_tx: &broadcast::Sender<String>,
    ) {
        let msg = {
            let mut registry = self.lock();
            let Some(entry) = registry
                .entries
                .get_mut(session_id)
                .filter(|e| e.generation == generation)
            else {
                return;
            };
            let view = &mut entry.view;
            view.updated_at = Utc::now();
            let msg = match exit {
                PollExit::Complete(session) => {
                    view.phase = TrackedPhase::Complete;
                    view.status = Some(session.status.to_string());
                    if mode == SessionMode::Scope {
                        view.analysis = extract_analysis(&session);
                    }
                    info!(session_id = %session_id, attempts = view.attempts, "tracked session complete");
                    WsMessage::SessionCompleted {
                        session: view.clone(),
                    }
                }
                PollExit::Failed(reason) => {
                    view.phase = TrackedPhase::Failed;
                    view.error = Some(reason.to_string());
                    info!(session_id = %session_id, error = %reason, "tracked session failed");
                    WsMessage::SessionFailed {
                        session: view.clone(),
                    }
                }
                PollExit::Cancelled => {
                    view.phase = TrackedPhase::Cancelled;
                    info!(session_id = %session_id, "tracked session cancelled");
                    WsMessage::SessionCancelled {
                        session_id: session_id.clone(),
                    }
                }
            };
            registry.evict_settled();
            msg
        };
        broadcast_message(ws_tx, &msg);
    }
}

/// Mirrors poll progress into the registry and onto the WebSocket.
struct TrackerSink {
    tracker: SessionTracker,
    generation: u64,
    ws_tx: broadcast::Sender<String>,
}

impl ProgressSink for TrackerSink {
    fn report(&self, update: &ProgressUpdate<'_>) -> anyhow::Result<()> {
        let status = update.status.to_string();
        self.tracker
            .record_progress(update.session_id, self.generation, &status, update.attempt);
        broadcast_message(
            &self.ws_tx,
            &WsMessage::SessionStatus {
                session_id: update.session_id.clone(),
                status,
                attempt: update.attempt,
                elapsed_ms: update.elapsed.as_millis() as u64,
            },
        );
        Ok(())
    }
}
