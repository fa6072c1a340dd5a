use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::credential::CredentialStore;
use super::models::{CreateSessionRequest, CreatedSession, SendMessageRequest, Session, SessionId};
use crate::errors::SessionError;

pub const DEFAULT_DEVIN_API_BASE_URL: &str = "https://api.devin.ai/v1";

/// The three remote operations the poller and the dashboard need.
///
/// Implementations hold no per-session state and attempt every call exactly once.
#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn create_session(
        &self,
        prompt: &str,
        title: Option<&str>,
    ) -> Result<CreatedSession, SessionError>;

    async fn send_message(&self, session_id: &SessionId, message: &str)
    -> Result<(), SessionError>;

    async fn fetch_status(&self, session_id: &SessionId) -> Result<Session, SessionError>;
}

/// `reqwest` client for the Devin v1 REST API.
#[derive(Debug, Clone)]
pub struct DevinClient {
    http: reqwest::Client,
    base_url: String,
    credentials: CredentialStore,
    api_key_override: Option<String>,
}

impl DevinClient {
    pub fn new(base_url: impl Into<String>, credentials: CredentialStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            api_key_override: None,
        }
    }

    /// Same client, but `key` (when non-blank) wins over the stored credential.
    /// Shares the underlying connection pool.
    pub fn with_api_key_override(&self, key: Option<&str>) -> Self {
        Self {
            api_key_override: key.map(str::to_string),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> Result<String, SessionError> {
        self.credentials
            .resolve(self.api_key_override.as_deref())
            .ok_or(SessionError::Auth)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, SessionError> {
        let resp = request.send().await.map_err(SessionError::Network)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, SessionError> {
        let bytes = resp.bytes().await.map_err(SessionError::Network)?;
        serde_json::from_slice(&bytes).map_err(|e| SessionError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SessionClient for DevinClient {
    async fn create_session(
        &self,
        prompt: &str,
        title: Option<&str>,
    ) -> Result<CreatedSession, SessionError> {
        let key = self.api_key()?;
        let body = CreateSessionRequest {
            prompt: prompt.to_string(),
            title: title.map(str::to_string),
            unlisted: true,
            idempotent: false,
        };
        let resp = self
            .send(
                self.http
                    .post(self.url("sessions"))
                    .header(AUTHORIZATION, format!("Bearer {}", key))
                    .header(CONTENT_TYPE, "application/json")
                    .json(&body),
            )
            .await?;
        let created: CreatedSession = Self::decode(resp).await?;
        debug!(session_id = %created.session_id, is_new = created.is_new_session, "created Devin session");
        Ok(created)
    }

    async fn send_message(
        &self,
        session_id: &SessionId,
        message: &str,
    ) -> Result<(), SessionError> {
        let key = self.api_key()?;
        let body = SendMessageRequest {
            message: message.to_string(),
        };
        self.send(
            self.http
                .post(self.url(&format!("session/{}/message", session_id)))
                .header(AUTHORIZATION, format!("Bearer {}", key))
                .header(CONTENT_TYPE, "application/json")
                .json(&body),
        )
        .await?;
        debug!(session_id = %session_id, "sent message to Devin session");
        Ok(())
    }

    async fn fetch_status(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        let key = self.api_key()?;
        let resp = self
            .send(
                self.http
                    .get(self.url(&format!("session/{}", session_id)))
                    .header(AUTHORIZATION, format!("Bearer {}", key)),
            )
            .await?;
        Self::decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::SessionStatus;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct StubState {
        hits: Mutex<u32>,
        last_auth: Mutex<Option<String>>,
        last_body: Mutex<Option<serde_json::Value>>,
    }

    impl StubState {
        fn record(&self, headers: &HeaderMap, body: Option<serde_json::Value>) {
            *self.hits.lock().unwrap() += 1;
            *self.last_auth.lock().unwrap() = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *self.last_body.lock().unwrap() = body;
        }
    }

    async fn stub_create(
        State(state): State<Arc<StubState>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        state.record(&headers, Some(body));
        Json(serde_json::json!({
            "session_id": "devin-42",
            "url": "https://app.devin.ai/sessions/42",
            "is_new_session": true
        }))
    }

    async fn stub_fetch(
        State(state): State<Arc<StubState>>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
        state.record(&headers, None);
        match id.as_str() {
            "devin-42" => Ok(Json(serde_json::json!({
                "session_id": "devin-42",
                "status": "working",
                "messages": [{"type": "devin_message", "message": "looking", "timestamp": "t"}]
            }))),
            "garbled" => Ok(Json(serde_json::json!({"unexpected": true}))),
            _ => Err((StatusCode::NOT_FOUND, "no such session".to_string())),
        }
    }

    async fn stub_message(
        State(state): State<Arc<StubState>>,
        headers: HeaderMap,
        Path(_id): Path<String>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        state.record(&headers, Some(body));
        Json(serde_json::json!({}))
    }

    async fn spawn_stub() -> (String, Arc<StubState>) {
        let state = Arc::new(StubState::default());
        let app = Router::new()
            .route("/v1/sessions", post(stub_create))
            .route("/v1/session/{id}", get(stub_fetch))
            .route("/v1/session/{id}/message", post(stub_message))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/v1", addr), state)
    }

    fn client(base: &str, key: Option<&str>) -> DevinClient {
        DevinClient::new(base, CredentialStore::with_key(key.map(str::to_string)))
    }

    #[tokio::test]
    async fn test_create_session_sends_bearer_and_fixed_flags() {
        let (base, stub) = spawn_stub().await;
        let created = client(&base, Some("apk_test"))
            .create_session("Scope issue #1", Some("GitHub Issue #1: Bug"))
            .await
            .unwrap();

        assert_eq!(created.session_id, SessionId::new("devin-42"));
        assert_eq!(created.url, "https://app.devin.ai/sessions/42");
        assert_eq!(stub.last_auth.lock().unwrap().as_deref(), Some("Bearer apk_test"));
        let body = stub.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["prompt"], "Scope issue #1");
        assert_eq!(body["title"], "GitHub Issue #1: Bug");
        assert_eq!(body["unlisted"], true);
        assert_eq!(body["idempotent"], false);
    }

    #[tokio::test]
    async fn test_create_session_without_credential_makes_no_request() {
        let (base, stub) = spawn_stub().await;
        let err = client(&base, None)
            .create_session("prompt", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Auth));
        assert_eq!(*stub.hits.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_override_key_wins_over_stored_key() {
        let (base, stub) = spawn_stub().await;
        client(&base, Some("apk_stored"))
            .with_api_key_override(Some("apk_header"))
            .create_session("prompt", None)
            .await
            .unwrap();
        assert_eq!(stub.last_auth.lock().unwrap().as_deref(), Some("Bearer apk_header"));
    }

    #[tokio::test]
    async fn test_fetch_status_decodes_snapshot() {
        let (base, _stub) = spawn_stub().await;
        let session = client(&base, Some("apk_test"))
            .fetch_status(&SessionId::new("devin-42"))
            .await
            .unwrap();
        assert_eq!(session.id().as_str(), "devin-42");
        assert_eq!(session.status, SessionStatus::Working);
        assert_eq!(session.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_status_non_success_is_remote_error() {
        let (base, _stub) = spawn_stub().await;
        let err = client(&base, Some("apk_test"))
            .fetch_status(&SessionId::new("missing"))
            .await
            .unwrap_err();
        match err {
            SessionError::Remote { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such session");
            }
            other => panic!("Expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_status_bad_body_is_decode_error() {
        let (base, _stub) = spawn_stub().await;
        let err = client(&base, Some("apk_test"))
            .fetch_status(&SessionId::new("garbled"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[tokio::test]
    async fn test_send_message_posts_body() {
        let (base, stub) = spawn_stub().await;
        client(&base, Some("apk_test"))
            .send_message(&SessionId::new("devin-42"), "please implement")
            .await
            .unwrap();
        let body = stub.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(body, serde_json::json!({"message": "please implement"}));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(&format!("http://{}/v1", addr), Some("apk_test"))
            .fetch_status(&SessionId::new("devin-42"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Network(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let c = client("https://api.devin.ai/v1/", None);
        assert_eq!(c.base_url(), "https://api.devin.ai/v1");
        assert_eq!(c.url("sessions"), "https://api.devin.ai/v1/sessions");
    }
}
