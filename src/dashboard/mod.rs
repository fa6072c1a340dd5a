//! Web dashboard: JSON proxy routes over the Devin and GitHub clients, a
//! registry of tracked poll loops, and a WebSocket feed of their progress.

pub mod api;
pub mod server;
pub mod tracker;
pub mod ws;

pub use api::{AppState, SessionClientFactory, api_router};
pub use server::{build_router, start_server};
pub use tracker::{SessionTracker, TrackedPhase, TrackedSession};
pub use ws::WsMessage;
