pub mod config;
pub mod dashboard;
pub mod errors;
pub mod github;
pub mod logging;
pub mod session;
pub mod ui;
