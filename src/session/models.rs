use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque session identifier assigned by the Devin API.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Remote session status as reported by `GET /session/{id}`.
///
/// Statuses this build does not know about are kept verbatim in `Unknown`
/// and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionStatus {
    Working,
    Blocked,
    Finished,
    Expired,
    SuspendRequested,
    SuspendRequestedFrontend,
    ResumeRequested,
    ResumeRequestedFrontend,
    Resumed,
    Unknown(String),
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Working => "working",
            Self::Blocked => "blocked",
            Self::Finished => "finished",
            Self::Expired => "expired",
            Self::SuspendRequested => "suspend_requested",
            Self::SuspendRequestedFrontend => "suspend_requested_frontend",
            Self::ResumeRequested => "resume_requested",
            Self::ResumeRequestedFrontend => "resume_requested_frontend",
            Self::Resumed => "resumed",
            Self::Unknown(raw) => raw,
        }
    }

    /// `finished` is the only status that means the agent completed its work.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl FromStr for SessionStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "working" => Self::Working,
            "blocked" => Self::Blocked,
            "finished" => Self::Finished,
            "expired" => Self::Expired,
            "suspend_requested" => Self::SuspendRequested,
            "suspend_requested_frontend" => Self::SuspendRequestedFrontend,
            "resume_requested" => Self::ResumeRequested,
            "resume_requested_frontend" => Self::ResumeRequestedFrontend,
            "resumed" => Self::Resumed,
            other => Self::Unknown(other.to_string()),
        })
    }
}

impl From<String> for SessionStatus {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<SessionStatus> for String {
    fn from(status: SessionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    Agent,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl SessionMessage {
    /// The explicit `origin` field wins when it names a side; otherwise the
    /// message type decides (`user_message`, `initial_user_message`).
    pub fn origin(&self) -> MessageOrigin {
        match self.origin.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("user") => MessageOrigin::User,
            Some("agent") | Some("devin") => MessageOrigin::Agent,
            _ if self.kind.ends_with("user_message") => MessageOrigin::User,
            _ => MessageOrigin::Agent,
        }
    }
}

/// Point-in-time snapshot of a remote session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    session_id: SessionId,
    pub status: SessionStatus,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Session {
    pub fn new(session_id: SessionId, status: SessionStatus) -> Self {
        Self {
            session_id,
            status,
            messages: Vec::new(),
            structured_output: None,
            title: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<SessionMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_structured_output(mut self, output: serde_json::Value) -> Self {
        self.structured_output = Some(output);
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn last_message(&self) -> Option<&SessionMessage> {
        self.messages.last()
    }

    /// Most recent agent-authored message, if the agent has said anything yet.
    pub fn last_agent_message(&self) -> Option<&SessionMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.origin() == MessageOrigin::Agent)
    }
}

/// Response body of `POST /sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
    pub url: String,
    #[serde(default)]
    pub is_new_session: bool,
}

/// Outbound body of `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub unlisted: bool,
    #[serde(default)]
    pub idempotent: bool,
}

/// Outbound body of `POST /session/{id}/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[cfg(test)]
pub(crate) fn agent_message(text: &str) -> SessionMessage {
    SessionMessage {
        kind: "devin_message".into(),
        message: text.into(),
        timestamp: "2024-05-01T12:00:00Z".into(),
        origin: None,
        username: None,
    }
}

#[cfg(test)]
pub(crate) fn user_message(text: &str) -> SessionMessage {
    SessionMessage {
        kind: "user_message".into(),
        message: text.into(),
        timestamp: "2024-05-01T12:00:00Z".into(),
        origin: Some("user".into()),
        username: Some("octocat".into()),
    }
}
