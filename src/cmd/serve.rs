//! Dashboard server command (`issue-pilot serve`).

use anyhow::Result;
use tracing::warn;

use issue_pilot::config::AppConfig;
use issue_pilot::dashboard;

pub async fn cmd_serve(config: AppConfig) -> Result<()> {
    // Open the browser once the server has had a moment to bind.
    // Skipped in dev mode, where the frontend is served separately.
    if config.server.open_browser && !config.server.dev_mode {
        let url = format!("http://localhost:{}", config.server.port);
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                warn!(error = %e, "Failed to open browser");
            }
        });
    }

    dashboard::start_server(config).await
}
