//! Configuration view and validation commands (`issue-pilot config`).

use std::path::{Path, PathBuf};

use anyhow::Result;
use console::style;

use issue_pilot::config::{AppConfig, OnBlocked};
use issue_pilot::ui::icons::WARN;

use super::super::ConfigCommands;

pub fn cmd_config(explicit: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(explicit),
        Some(ConfigCommands::Validate) => validate(explicit),
        Some(ConfigCommands::Init) => init(explicit),
    }
}

fn show(explicit: Option<&Path>) -> Result<()> {
    println!();
    println!("issue-pilot Configuration");
    println!("=========================");
    println!();

    let (source, config) = effective(explicit)?;
    match source {
        Some(path) => println!("Config file: {}", path.display()),
        None => {
            println!("No config.toml found, using defaults.");
            println!("Run 'issue-pilot config init' to create one.");
        }
    }
    println!();

    println!("[devin]");
    println!("  api_key = {}", redacted(config.devin.api_key.as_deref()));
    println!("  api_base_url = \"{}\"", config.devin.api_base_url);
    println!();

    println!("[github]");
    println!("  token = {}", redacted(config.github.token.as_deref()));
    println!("  api_base_url = \"{}\"", config.github.api_base_url);
    if let Some(repo) = &config.github.default_repo {
        println!("  default_repo = \"{}\"", repo);
    }
    println!();

    println!("[poller]");
    println!("  interval_secs = {}", config.poller.interval_secs);
    println!("  max_attempts = {}", config.poller.max_attempts);
    println!("  max_duration_secs = {}", config.poller.max_duration_secs);
    match config.poller.on_blocked {
        OnBlocked::Fail => println!("  on_blocked = \"fail\""),
        OnBlocked::Continue => {
            println!("  on_blocked = \"continue\"");
            println!("  max_continues = {}", config.poller.max_continues);
            println!("  continue_message = \"{}\"", config.poller.continue_message);
        }
    }
    println!(
        "  complete_on_user_yield = {}",
        config.poller.complete_on_user_yield
    );
    println!();

    println!("[server]");
    println!("  host = \"{}\"", config.server.host);
    println!("  port = {}", config.server.port);
    println!("  open_browser = {}", config.server.open_browser);
    println!("  dev_mode = {}", config.server.dev_mode);
    println!();

    Ok(())
}

fn validate(explicit: Option<&Path>) -> Result<()> {
    println!();
    println!("Validating configuration...");
    println!();

    let (source, config) = effective(explicit)?;
    if source.is_none() {
        println!("No config.toml found. Checking defaults and environment.");
        println!();
    }
    let warnings = config.validate();

    if warnings.is_empty() {
        println!("Configuration is valid.");
    } else {
        println!("Configuration warnings:");
        for warning in warnings {
            println!("  {}{}", WARN, style(warning).yellow());
        }
    }
    println!();
    Ok(())
}

fn init(explicit: Option<&Path>) -> Result<()> {
    let config_path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_path);

    if config_path.exists() {
        println!("config.toml already exists at {}", config_path.display());
        println!("Delete it first if you want to recreate it.");
        return Ok(());
    }

    AppConfig::default().save(&config_path)?;

    println!("Created config.toml at {}", config_path.display());
    println!();
    println!("You can now customize:");
    println!("  - [devin] api_key, api_base_url");
    println!("  - [github] token, default_repo");
    println!("  - [poller] interval_secs, max_attempts, on_blocked");
    println!("  - [server] host, port");
    println!();
    Ok(())
}

/// File (when it exists) plus environment overrides.
fn effective(explicit: Option<&Path>) -> Result<(Option<PathBuf>, AppConfig)> {
    let source = AppConfig::source_path(explicit).filter(|p| p.exists());
    let mut config = match &source {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_env_overrides();
    Ok((source, config))
}

/// Show whether a secret is set without printing it.
fn redacted(secret: Option<&str>) -> String {
    match secret.filter(|s| !s.trim().is_empty()) {
        Some(s) if s.chars().count() > 4 => {
            let start = s.char_indices().rev().nth(3).map_or(0, |(i, _)| i);
            format!("\"****{}\"", &s[start..])
        }
        Some(_) => "\"****\"".to_string(),
        None => style("(not set)").dim().to_string(),
    }
}
