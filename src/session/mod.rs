//! Devin session lifecycle: the REST client, the poll loop that tracks a
//! session to completion, and the prompts and analysis decoding built on top.
//!
//! | Module       | Purpose                                                   |
//! |--------------|-----------------------------------------------------------|
//! | `models`     | Wire types: `SessionId`, `SessionStatus`, `Session`       |
//! | `credential` | Process-wide Devin API key slot                           |
//! | `client`     | `SessionClient` trait and the `reqwest` implementation    |
//! | `poller`     | Bounded, cancellable poll loop with progress reporting    |
//! | `prompts`    | Scoping / completing prompt text                          |
//! | `analysis`   | Scope + confidence extraction from a finished session     |

pub mod analysis;
pub mod client;
pub mod credential;
#[cfg(test)]
pub(crate) mod fake;
pub mod models;
pub mod poller;
pub mod prompts;

pub use analysis::{AnalysisSource, ScopeAnalysis, extract_analysis};
pub use client::{DEFAULT_DEVIN_API_BASE_URL, DevinClient, SessionClient};
pub use credential::CredentialStore;
pub use models::{CreatedSession, MessageOrigin, Session, SessionId, SessionMessage, SessionStatus};
pub use poller::{
    BlockedPolicy, FailureReason, NoProgress, PollConfig, PollExit, ProgressSink,
    ProgressUpdate, SessionPoller, Verdict, classify,
};
pub use prompts::SessionMode;
