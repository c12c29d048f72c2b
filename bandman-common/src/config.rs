//! Server configuration
//!
//! Bootstrap settings are read from a TOML file and overridden by command
//! line arguments. Resolution order for the file itself:
//! 1. Explicit path (command line or `BANDMAN_CONFIG`)
//! 2. `<config dir>/bandman/server.toml` if it exists
//! 3. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default listening port
pub const DEFAULT_PORT: u16 = 4444;

/// Who may stop the whole service with `quit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuitPolicy {
    /// Any session, guests included
    Anyone,
    /// Any authenticated band
    #[default]
    Authenticated,
    /// Only usernames listed in `operators`
    Operators,
    /// Nobody; `quit` behaves like `close`
    Disabled,
}

impl QuitPolicy {
    /// Whether a session bound to `identity` (`None` for guests) may shut down
    pub fn permits(&self, identity: Option<&str>, operators: &[String]) -> bool {
        match self {
            QuitPolicy::Anyone => true,
            QuitPolicy::Authenticated => identity.is_some(),
            QuitPolicy::Operators => {
                identity.is_some_and(|user| operators.iter().any(|op| op == user))
            }
            QuitPolicy::Disabled => false,
        }
    }
}

impl std::str::FromStr for QuitPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "anyone" => Ok(QuitPolicy::Anyone),
            "authenticated" => Ok(QuitPolicy::Authenticated),
            "operators" => Ok(QuitPolicy::Operators),
            "disabled" => Ok(QuitPolicy::Disabled),
            other => Err(format!(
                "unknown quit policy '{}' (expected anyone, authenticated, operators, disabled)",
                other
            )),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Bootstrap configuration for `bandman-server`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,

    /// SQLite catalog; the in-memory repository is used when absent
    pub database: Option<PathBuf>,

    /// `username password` per line
    pub accounts_file: Option<PathBuf>,

    /// Inline accounts, applied over `accounts_file`
    pub accounts: HashMap<String, String>,

    /// Per-connection read timeout in seconds, 0 disables it
    pub idle_timeout_secs: u64,

    pub max_line_length: usize,

    /// How long `quit` waits for other sessions to finish
    pub shutdown_grace_secs: u64,

    pub quit_policy: QuitPolicy,

    pub operators: Vec<String>,

    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            database: None,
            accounts_file: None,
            accounts: HashMap::new(),
            idle_timeout_secs: 300,
            max_line_length: crate::protocol::DEFAULT_MAX_LINE_LENGTH,
            shutdown_grace_secs: 5,
            quit_policy: QuitPolicy::default(),
            operators: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `explicit` if given (must exist), else the default file if present,
    /// else built-in defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `None` when idle timeouts are disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_line_length < 64 {
            return Err(Error::Config(format!(
                "max_line_length must be at least 64, got {}",
                self.max_line_length
            )));
        }
        if self.quit_policy == QuitPolicy::Operators && self.operators.is_empty() {
            return Err(Error::Config(
                "quit_policy = \"operators\" requires at least one entry in operators".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/bandman/server.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bandman").join("server.toml"))
}

fn default_log_level() -> String {
    "info".to_string()
}
