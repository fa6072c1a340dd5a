//! Typed error hierarchy for issue-pilot.
//!
//! Two enums cover the two outbound integrations:
//! - `SessionError`: Devin session client failures (create / message / fetch)
//! - `IssueError`: GitHub issue listing failures (only surfaced by `try_list_issues`)
//!
//! Poll-loop outcomes live in `session::poller` (`FailureReason`, `PollExit`) since
//! cancellation and timeouts are loop states rather than I/O errors.

use thiserror::Error;

/// Errors from a single Devin session call.
///
/// The client attempts each call exactly once; none of these are retried
/// by the client itself.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Devin API key is not configured")]
    Auth,

    #[error("Devin API error: {status} {body}")]
    Remote { status: u16, body: String },

    #[error("Failed to reach Devin API: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Failed to decode Devin API response: {0}")]
    Decode(String),
}

impl SessionError {
    /// HTTP status a proxy should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            SessionError::Auth => 401,
            SessionError::Remote { status, .. } => *status,
            SessionError::Network(_) => 502,
            SessionError::Decode(_) => 502,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SessionError::Auth)
    }
}

/// Errors from the GitHub issue lister.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Invalid repository '{0}': expected owner/name")]
    InvalidRepo(String),

    #[error("GitHub API returned {status} for {repo}")]
    Status { repo: String, status: u16 },

    #[error("Failed to reach GitHub API: {0}")]
    Network(#[source] reqwest::Error),
}
