use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use issue_pilot::config::{AppConfig, LogFormat, OnBlocked};
use issue_pilot::logging::init_logging;
use issue_pilot::session::SessionMode;

mod cmd;

#[derive(Parser)]
#[command(name = "issue-pilot")]
#[command(version, about = "Scope and complete GitHub issues with Devin")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config.toml. Defaults to ./.issue-pilot/config.toml, then the user config dir
    #[arg(long, global = true, env = "ISSUE_PILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format (fmt or json). Overrides [logging] format
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the dashboard server
    Serve {
        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Open the dashboard in a browser once the server is up
        #[arg(long)]
        open: bool,

        /// Permissive CORS for a separately served frontend
        #[arg(long)]
        dev: bool,
    },
    /// List the issues of a repository
    Issues {
        /// Repository as owner/name or a GitHub URL
        #[arg(short, long)]
        repo: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Ask Devin to scope an issue and report its confidence
    Scope(IssueArgs),
    /// Ask Devin to implement an issue and open a pull request
    Complete(IssueArgs),
    /// Poll an existing Devin session until it finishes
    Poll {
        session_id: String,

        /// Extract a scope analysis from the finished session
        #[arg(long)]
        analyze: bool,

        #[arg(long)]
        json: bool,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// Send a message to a Devin session
    Message { session_id: String, message: String },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone)]
pub struct IssueArgs {
    /// Issue number
    pub number: u64,

    /// Repository as owner/name or a GitHub URL. Defaults to [github] default_repo
    #[arg(short, long)]
    pub repo: Option<String>,

    /// Reuse an existing Devin session instead of creating one
    #[arg(long)]
    pub session: Option<String>,

    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub poll: PollArgs,
}

/// Poll loop overrides for `[poller]`.
#[derive(Args, Clone)]
pub struct PollArgs {
    /// Seconds between status checks
    #[arg(long)]
    pub interval: Option<u64>,

    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Wall-clock limit in seconds
    #[arg(long)]
    pub max_duration: Option<u64>,

    /// Send a continue message when Devin blocks instead of failing
    #[arg(long)]
    pub auto_continue: bool,
}

impl PollArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(interval) = self.interval {
            config.poller.interval_secs = interval;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.poller.max_attempts = max_attempts;
        }
        if let Some(max_duration) = self.max_duration {
            config.poller.max_duration_secs = max_duration;
        }
        if self.auto_continue {
            config.poller.on_blocked = OnBlocked::Continue;
        }
    }
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Config commands must work even when the file on disk does not parse.
    if let Commands::Config { command } = &cli.command {
        init_logging(cli.verbose, cli.log_format.unwrap_or_default());
        return cmd::cmd_config(cli.config.as_deref(), command.clone());
    }

    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    init_logging(
        cli.verbose,
        cli.log_format.unwrap_or(config.logging.format),
    );

    match &cli.command {
        Commands::Serve {
            port,
            host,
            open,
            dev,
        } => {
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            config.server.open_browser |= *open;
            config.server.dev_mode |= *dev;
            cmd::cmd_serve(config).await?;
        }
        Commands::Issues { repo, json } => {
            cmd::cmd_issues(&config, repo.as_deref(), *json).await?;
        }
        Commands::Scope(args) => {
            args.poll.apply(&mut config);
            cmd::cmd_issue_session(&config, SessionMode::Scope, args).await?;
        }
        Commands::Complete(args) => {
            args.poll.apply(&mut config);
            cmd::cmd_issue_session(&config, SessionMode::Complete, args).await?;
        }
        Commands::Poll {
            session_id,
            analyze,
            json,
            poll,
        } => {
            poll.apply(&mut config);
            cmd::cmd_poll(&config, session_id, *analyze, *json).await?;
        }
        Commands::Message {
            session_id,
            message,
        } => cmd::cmd_message(&config, session_id, message).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
