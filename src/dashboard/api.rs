use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use super::tracker::{SessionTracker, TrackedSession};
use crate::config::AppConfig;
use crate::errors::SessionError;
use crate::github::{GitHubIssues, IssueSource, RepoCoordinate};
use crate::session::prompts::{follow_up_prompt, prompt_for, session_title};
use crate::session::{
    CredentialStore, DevinClient, SessionClient, SessionId, SessionMode, SessionPoller,
};

/// Header that carries a per-request Devin API key.
pub const API_KEY_HEADER: &str = "x-devin-api-key";

/// Hands out a session client for one request, honoring the per-request key.
pub trait SessionClientFactory: Send + Sync {
    fn for_request(&self, api_key_override: Option<&str>) -> Arc<dyn SessionClient>;
}

impl SessionClientFactory for DevinClient {
    fn for_request(&self, api_key_override: Option<&str>) -> Arc<dyn SessionClient> {
        Arc::new(self.with_api_key_override(api_key_override))
    }
}

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: AppConfig,
    pub credentials: CredentialStore,
    pub sessions: Arc<dyn SessionClientFactory>,
    pub issues: Arc<dyn IssueSource>,
    pub tracker: SessionTracker,
    pub ws_tx: broadcast::Sender<String>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the real Devin and GitHub clients from configuration.
    pub fn from_config(config: AppConfig) -> Self {
        let credentials = CredentialStore::with_key(config.devin.api_key.clone());
        let devin = DevinClient::new(config.devin.api_base_url.clone(), credentials.clone());
        let issues = GitHubIssues::new(config.github.api_base_url.clone(), config.github.token.clone());
        let (ws_tx, _rx) = broadcast::channel::<String>(256);
        Self {
            config,
            credentials,
            sessions: Arc::new(devin),
            issues: Arc::new(issues),
            tracker: SessionTracker::new(),
            ws_tx,
        }
    }

    fn client(&self, headers: &HeaderMap) -> Arc<dyn SessionClient> {
        let override_key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        self.sessions.for_request(override_key)
    }

    fn repo(&self, repo: Option<&str>) -> Result<RepoCoordinate, ApiError> {
        let repo = repo
            .filter(|r| !r.trim().is_empty())
            .or(self.config.github.default_repo.as_deref())
            .ok_or_else(|| ApiError::BadRequest("repo is required".into()))?;
        RepoCoordinate::parse(repo).map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct IssuesQuery {
    pub repo: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateSessionBody {
    pub prompt: String,
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Deserialize)]
pub struct CredentialBody {
    pub api_key: String,
}

#[derive(Deserialize)]
pub struct StartIssueSessionBody {
    pub repo: Option<String>,
    pub mode: SessionMode,
    pub session_id: Option<SessionId>,
}

#[derive(Serialize)]
pub struct CredentialStatus {
    pub configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub url: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Session(SessionError),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Session(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Session(err) => (
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY),
                err.to_string(),
            ),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/issues", get(list_issues))
        .route("/api/issues/{number}/devin", post(start_issue_session))
        .route("/api/devin/sessions", post(create_session))
        .route("/api/devin/sessions/{id}", get(get_session))
        .route("/api/devin/sessions/{id}/message", post(send_message))
        .route(
            "/api/devin/credential",
            get(credential_status)
                .post(init_credential)
                .delete(clear_credential),
        )
        .route("/api/tracked", get(list_tracked))
        .route("/api/tracked/{id}", get(get_tracked))
        .route("/api/tracked/{id}/cancel", post(cancel_tracked))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_issues(
    State(state): State<SharedState>,
    Query(query): Query<IssuesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = state.repo(query.repo.as_deref())?;
    Ok(Json(state.issues.list_issues(&repo).await))
}

async fn create_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt is required".into()));
    }
    let created = state
        .client(&headers)
        .create_session(&body.prompt, body.title.as_deref())
        .await?;
    Ok(Json(created))
}

async fn get_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .client(&headers)
        .fetch_status(&SessionId::new(id))
        .await?;
    Ok(Json(session))
}

async fn send_message(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message is required".into()));
    }
    state
        .client(&headers)
        .send_message(&SessionId::new(id), &body.message)
        .await?;
    Ok(Json(serde_json::json!({"status": "sent"})))
}

async fn credential_status(State(state): State<SharedState>) -> Json<CredentialStatus> {
    Json(CredentialStatus {
        configured: state.credentials.is_configured(),
    })
}

async fn init_credential(
    State(state): State<SharedState>,
    Json(body): Json<CredentialBody>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.credentials.init(&body.api_key) {
        return Err(ApiError::BadRequest("api_key is required".into()));
    }
    info!("Devin API key configured");
    Ok(Json(CredentialStatus { configured: true }))
}

async fn clear_credential(State(state): State<SharedState>) -> Json<CredentialStatus> {
    state.credentials.clear();
    info!("Devin API key cleared");
    Json(CredentialStatus { configured: false })
}

/// Scope or complete an issue with Devin and track the session.
///
/// With `session_id`, the existing session gets the follow-up prompt instead
/// of a new session being created.
async fn start_issue_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(number): Path<u64>,
    Json(body): Json<StartIssueSessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = state.repo(body.repo.as_deref())?;
    let client = state.client(&headers);

    let tracked = match body.session_id {
        Some(session_id) => {
            client
                .send_message(&session_id, &follow_up_prompt(body.mode))
                .await?;
            let url = state.tracker.url_for(&session_id);
            TrackedSession::new(session_id, url, Some(number), Some(repo.to_string()), body.mode)
        }
        None => {
            let issue = state
                .issues
                .list_issues(&repo)
                .await
                .into_iter()
                .find(|i| i.number == number)
                .ok_or_else(|| ApiError::NotFound(format!("Issue #{} not found in {}", number, repo)))?;
            let created = client
                .create_session(&prompt_for(body.mode, &issue), Some(&session_title(&issue)))
                .await?;
            TrackedSession::new(
                created.session_id,
                Some(created.url),
                Some(number),
                Some(repo.to_string()),
                body.mode,
            )
        }
    };

    info!(
        session_id = %tracked.session_id,
        issue = number,
        repo = %repo,
        mode = body.mode.as_str(),
        "started Devin session for issue"
    );

    let response = StartedSession {
        session_id: tracked.session_id.clone(),
        url: tracked.url.clone(),
    };
    let poller = SessionPoller::new(client, state.config.poll_config());
    state.tracker.start(poller, tracked, state.ws_tx.clone());

    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn list_tracked(State(state): State<SharedState>) -> Json<Vec<TrackedSession>> {
    Json(state.tracker.list())
}

async fn get_tracked(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .tracker
        .get(&SessionId::new(id.clone()))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Session {} is not tracked", id)))
}

async fn cancel_tracked(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .tracker
        .cancel(&SessionId::new(id.clone()))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Session {} is not tracked", id)))
}

// ── Tests ─────────────────────────────────────────────────────────────
