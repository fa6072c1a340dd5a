//! Scripted in-memory `SessionClient` used by poller and dashboard tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::client::SessionClient;
use super::models::{CreatedSession, Session, SessionId, SessionStatus};
use crate::errors::SessionError;

pub(crate) enum Scripted {
    Snapshot(Session),
    Error(SessionError),
}

#[derive(Default)]
pub(crate) struct FakeSessionClient {
    script: Mutex<VecDeque<Scripted>>,
    /// Served again once the script runs dry.
    last: Mutex<Option<Session>>,
    fetches: Mutex<u32>,
    creates: Mutex<Vec<(String, Option<String>)>>,
    messages: Mutex<Vec<(SessionId, String)>>,
    cancel_on_fetch: Mutex<Option<(u32, CancellationToken)>>,
    fail_create: Mutex<Option<SessionError>>,
}

impl FakeSessionClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Script one snapshot per status, all for session `id`.
    pub(crate) fn with_statuses(id: &str, statuses: &[SessionStatus]) -> Self {
        let fake = Self::new();
        for status in statuses {
            fake.push(Session::new(SessionId::new(id), status.clone()));
        }
        fake
    }

    pub(crate) fn push(&self, session: Session) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Snapshot(session));
    }

    pub(crate) fn push_error(&self, err: SessionError) {
        self.script.lock().unwrap().push_back(Scripted::Error(err));
    }

    /// Cancel `token` while fetch number `n` (1-based) is in flight.
    pub(crate) fn cancel_during_fetch(&self, n: u32, token: CancellationToken) {
        *self.cancel_on_fetch.lock().unwrap() = Some((n, token));
    }

    pub(crate) fn fail_next_create(&self, err: SessionError) {
        *self.fail_create.lock().unwrap() = Some(err);
    }

    pub(crate) fn fetch_count(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }

    pub(crate) fn created(&self) -> Vec<(String, Option<String>)> {
        self.creates.lock().unwrap().clone()
    }

    pub(crate) fn sent_messages(&self) -> Vec<(SessionId, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionClient for FakeSessionClient {
    async fn create_session(
        &self,
        prompt: &str,
        title: Option<&str>,
    ) -> Result<CreatedSession, SessionError> {
        if let Some(err) = self.fail_create.lock().unwrap().take() {
            return Err(err);
        }
        let mut creates = self.creates.lock().unwrap();
        creates.push((prompt.to_string(), title.map(str::to_string)));
        let n = creates.len();
        Ok(CreatedSession {
            session_id: SessionId::new(format!("devin-{n}")),
            url: format!("https://app.devin.ai/sessions/devin-{n}"),
            is_new_session: true,
        })
    }

    async fn send_message(
        &self,
        session_id: &SessionId,
        message: &str,
    ) -> Result<(), SessionError> {
        self.messages
            .lock()
            .unwrap()
            .push((session_id.clone(), message.to_string()));
        Ok(())
    }

    async fn fetch_status(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        let n = {
            let mut fetches = self.fetches.lock().unwrap();
            *fetches += 1;
            *fetches
        };
        if let Some((at, token)) = self.cancel_on_fetch.lock().unwrap().as_ref() {
            if *at == n {
                token.cancel();
            }
        }
        tokio::task::yield_now().await;

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Snapshot(session)) => {
                *self.last.lock().unwrap() = Some(session.clone());
                Ok(session)
            }
            Some(Scripted::Error(err)) => Err(err),
            None => match self.last.lock().unwrap().clone() {
                Some(session) => Ok(session),
                None => Ok(Session::new(session_id.clone(), SessionStatus::Working)),
            },
        }
    }
}
