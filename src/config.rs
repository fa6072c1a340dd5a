//! Layered configuration for issue-pilot.
//!
//! Reads `.issue-pilot/config.toml` (or the file passed with `--config`, or the
//! per-user `issue-pilot/config.toml`), then applies environment overrides,
//! then CLI flags. Every section is optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [devin]
//! api_key = "apk_..."
//! api_base_url = "https://api.devin.ai/v1"
//!
//! [github]
//! token = "ghp_..."
//! api_base_url = "https://api.github.com"
//! default_repo = "octo/repo"
//!
//! [poller]
//! interval_secs = 5
//! max_attempts = 120
//! max_duration_secs = 900
//! on_blocked = "fail"          # or "continue"
//! max_continues = 1
//! continue_message = "Please continue."
//! complete_on_user_yield = true
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! open_browser = false
//! dev_mode = false
//!
//! [logging]
//! format = "fmt"               # or "json"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::github::{DEFAULT_GITHUB_API_BASE_URL, RepoCoordinate, is_valid_github_token};
use crate::session::client::DEFAULT_DEVIN_API_BASE_URL;
use crate::session::poller::{BlockedPolicy, PollConfig};

pub const CONFIG_DIR: &str = ".issue-pilot";
pub const CONFIG_FILE: &str = "config.toml";

/// Per-user config directory, e.g. `~/.config/issue-pilot` on Linux.
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("issue-pilot"))
}

/// `[devin]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevinSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_devin_base_url")]
    pub api_base_url: String,
}

fn default_devin_base_url() -> String {
    DEFAULT_DEVIN_API_BASE_URL.to_string()
}

impl Default for DevinSection {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_devin_base_url(),
        }
    }
}

/// `[github]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_github_base_url")]
    pub api_base_url: String,
    /// Repository used when a command or request omits one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_repo: Option<String>,
}

fn default_github_base_url() -> String {
    DEFAULT_GITHUB_API_BASE_URL.to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            token: None,
            api_base_url: default_github_base_url(),
            default_repo: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnBlocked {
    #[default]
    Fail,
    Continue,
}

/// `[poller]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
    #[serde(default)]
    pub on_blocked: OnBlocked,
    /// Only read when `on_blocked = "continue"`.
    #[serde(default = "default_max_continues")]
    pub max_continues: u32,
    #[serde(default = "default_continue_message")]
    pub continue_message: String,
    #[serde(default = "default_true")]
    pub complete_on_user_yield: bool,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    120
}

fn default_max_duration_secs() -> u64 {
    15 * 60
}

fn default_max_continues() -> u32 {
    1
}

fn default_continue_message() -> String {
    "Please continue with the task.".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
            max_duration_secs: default_max_duration_secs(),
            on_blocked: OnBlocked::default(),
            max_continues: default_max_continues(),
            continue_message: default_continue_message(),
            complete_on_user_yield: default_true(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub open_browser: bool,
    /// Permissive CORS for a separately served frontend.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open_browser: false,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Fmt,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fmt" | "text" => Ok(LogFormat::Fmt),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: fmt, json", s),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
}

/// Parsed `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub devin: DevinSection,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub poller: PollerSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Load `config.toml` from `config_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// File then environment. Without an explicit path the first existing of
    /// `./.issue-pilot/config.toml` and the user config file is used.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::source_path(explicit) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// The file [`resolve`](Self::resolve) reads, if any. An explicit path is
    /// returned even when it does not exist so loading reports it.
    pub fn source_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        [Some(Self::default_path()), user_config_dir().map(|d| d.join(CONFIG_FILE))]
            .into_iter()
            .flatten()
            .find(|p| p.exists())
    }

    pub fn default_path() -> PathBuf {
        Path::new(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Save configuration to a TOML file, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; blank values are ignored.
    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("DEVIN_API_KEY") {
            self.devin.api_key = Some(key);
        }
        if let Some(url) = get("DEVIN_API_BASE_URL") {
            self.devin.api_base_url = url;
        }
        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(url) = get("GITHUB_API_BASE_URL") {
            self.github.api_base_url = url;
        }
    }

    /// Poll loop settings derived from `[poller]`.
    pub fn poll_config(&self) -> PollConfig {
        let blocked_policy = match self.poller.on_blocked {
            OnBlocked::Fail => BlockedPolicy::Fail,
            OnBlocked::Continue => BlockedPolicy::AutoContinue {
                message: self.poller.continue_message.clone(),
                max_continues: self.poller.max_continues,
            },
        };
        PollConfig {
            interval: Duration::from_secs(self.poller.interval_secs),
            max_attempts: self.poller.max_attempts,
            max_duration: Duration::from_secs(self.poller.max_duration_secs),
            blocked_policy,
            complete_on_user_yield: self.poller.complete_on_user_yield,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self
            .devin
            .api_key
            .as_deref()
            .is_none_or(|k| k.trim().is_empty())
        {
            warnings.push(
                "Devin API key is not configured: set DEVIN_API_KEY or [devin] api_key".to_string(),
            );
        }

        for (section, url) in [
            ("devin", &self.devin.api_base_url),
            ("github", &self.github.api_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                warnings.push(format!(
                    "Invalid api_base_url '{}' in [{}]: should start with http:// or https://",
                    url, section
                ));
            }
        }

        if let Some(ref token) = self.github.token
            && !is_valid_github_token(token)
        {
            warnings.push(
                "GitHub token does not look like a GitHub token (expected ghp_, github_pat_, gho_, ghu_, ghs_ or ghr_ prefix)"
                    .to_string(),
            );
        }

        if let Some(ref repo) = self.github.default_repo
            && RepoCoordinate::parse(repo).is_err()
        {
            warnings.push(format!(
                "Invalid default_repo '{}': expected owner/name",
                repo
            ));
        }

        if self.poller.interval_secs == 0 {
            warnings.push("poller.interval_secs is 0: Devin will be polled back-to-back".to_string());
        }
        if self.poller.max_attempts == 0 {
            warnings.push("poller.max_attempts is 0: every poll will time out immediately".to_string());
        }
        if self.poller.max_duration_secs < self.poller.interval_secs {
            warnings.push(format!(
                "poller.max_duration_secs ({}) is shorter than poller.interval_secs ({})",
                self.poller.max_duration_secs, self.poller.interval_secs
            ));
        }
        if self.poller.on_blocked == OnBlocked::Continue {
            if self.poller.max_continues == 0 {
                warnings.push(
                    "poller.on_blocked is \"continue\" but max_continues is 0: blocked sessions will still fail"
                        .to_string(),
                );
            }
            if self.poller.continue_message.trim().is_empty() {
                warnings.push("poller.continue_message is empty".to_string());
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.devin.api_base_url, "https://api.devin.ai/v1");
        assert_eq!(config.github.api_base_url, "https://api.github.com");
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.logging.format, LogFormat::Fmt);
    }

    #[test]
    fn test_parse_sections() {
        let content = r#"
[devin]
api_key = "apk_file"

[poller]
interval_secs = 2
max_attempts = 10
on_blocked = "continue"
max_continues = 3

[logging]
format = "json"
"#;
        let config = AppConfig::parse(content).unwrap();
        assert_eq!(config.devin.api_key.as_deref(), Some("apk_file"));
        assert_eq!(config.poller.interval_secs, 2);
        assert_eq!(config.poller.max_duration_secs, 900);
        assert_eq!(config.logging.format, LogFormat::Json);

        let poll = config.poll_config();
        assert_eq!(poll.interval, Duration::from_secs(2));
        assert_eq!(poll.max_attempts, 10);
        assert_eq!(poll.max_duration, Duration::from_secs(900));
        assert_eq!(
            poll.blocked_policy,
            BlockedPolicy::AutoContinue {
                message: "Please continue with the task.".into(),
                max_continues: 3
            }
        );
        assert!(poll.complete_on_user_yield);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(AppConfig::parse("[poller\ninterval_secs = ").is_err());
        assert!(AppConfig::parse("[poller]\non_blocked = \"retry\"").is_err());
    }

    #[test]
    fn test_default_poll_config_matches_poller_default() {
        let poll = AppConfig::default().poll_config();
        let expected = PollConfig::default();
        assert_eq!(poll.interval, expected.interval);
        assert_eq!(poll.max_attempts, expected.max_attempts);
        assert_eq!(poll.max_duration, expected.max_duration);
        assert_eq!(poll.blocked_policy, expected.blocked_policy);
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let mut config = AppConfig::parse("[devin]\napi_key = \"apk_file\"").unwrap();
        let env: HashMap<&str, &str> = [
            ("DEVIN_API_KEY", "apk_env"),
            ("GITHUB_TOKEN", "ghp_env"),
            ("GITHUB_API_BASE_URL", "http://localhost:9999"),
            ("DEVIN_API_BASE_URL", "   "),
        ]
        .into_iter()
        .collect();
        config.apply_env_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.devin.api_key.as_deref(), Some("apk_env"));
        assert_eq!(config.github.token.as_deref(), Some("ghp_env"));
        assert_eq!(config.github.api_base_url, "http://localhost:9999");
        // Blank values are ignored
        assert_eq!(config.devin.api_base_url, DEFAULT_DEVIN_API_BASE_URL);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_DIR).join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.github.default_repo = Some("octo/repo".into());
        config.poller.max_attempts = 7;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let from_dir = AppConfig::load_or_default(&dir.path().join(CONFIG_DIR)).unwrap();
        assert_eq!(from_dir.poller.max_attempts, 7);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_source_path_prefers_explicit() {
        let explicit = Path::new("/tmp/does-not-exist/config.toml");
        assert_eq!(
            AppConfig::source_path(Some(explicit)).as_deref(),
            Some(explicit)
        );
    }

    #[test]
    fn test_load_missing_explicit_file_is_error() {
        let dir = tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    // =========================================
    // Validation tests
    // =========================================

    #[test]
    fn test_validate_clean_config() {
        let mut config = AppConfig::default();
        config.devin.api_key = Some("apk_x".into());
        config.github.token = Some("ghp_x".into());
        config.github.default_repo = Some("https://github.com/octo/repo".into());
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn test_validate_missing_key() {
        let warnings = AppConfig::default().validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("DEVIN_API_KEY"));
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let mut config = AppConfig::default();
        config.devin.api_key = Some("apk_x".into());
        config.devin.api_base_url = "api.devin.ai".into();
        config.github.token = Some("not-a-token".into());
        config.github.default_repo = Some("just-owner".into());
        config.poller.interval_secs = 0;
        config.poller.max_attempts = 0;
        config.poller.on_blocked = OnBlocked::Continue;
        config.poller.max_continues = 0;

        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("[devin]")));
        assert!(warnings.iter().any(|w| w.contains("GitHub token")));
        assert!(warnings.iter().any(|w| w.contains("just-owner")));
        assert!(warnings.iter().any(|w| w.contains("interval_secs is 0")));
        assert!(warnings.iter().any(|w| w.contains("max_attempts is 0")));
        assert!(warnings.iter().any(|w| w.contains("max_continues is 0")));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("FMT".parse::<LogFormat>().unwrap(), LogFormat::Fmt);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
