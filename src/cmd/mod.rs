//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                      |
//! |-----------|---------------------------------------|
//! | `serve`   | `Serve`                               |
//! | `issues`  | `Issues`                              |
//! | `session` | `Scope`, `Complete`, `Poll`, `Message`|
//! | `config`  | `Config`                              |

pub mod config;
pub mod issues;
pub mod serve;
pub mod session;

pub use config::cmd_config;
pub use issues::cmd_issues;
pub use serve::cmd_serve;
pub use session::{cmd_issue_session, cmd_message, cmd_poll};

use anyhow::Result;
use issue_pilot::config::AppConfig;
use issue_pilot::github::RepoCoordinate;

/// `--repo`, else `[github] default_repo`.
pub(crate) fn resolve_repo(config: &AppConfig, repo: Option<&str>) -> Result<RepoCoordinate> {
    let repo = repo
        .or(config.github.default_repo.as_deref())
        .ok_or_else(|| {
            anyhow::anyhow!("No repository given: pass --repo owner/name or set [github] default_repo")
        })?;
    Ok(RepoCoordinate::parse(repo)?)
}
