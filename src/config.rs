//! Agent configuration
//!
//! Values are resolved in this order, later sources winning:
//! - built-in defaults
//! - the shell-style config file (`~/.ccusage-agent.conf`)
//! - environment variables
//! - command line flags
//!
//! The config file holds `KEY="value"` lines whose keys are the environment
//! variable names below. `#` comments and blank lines are ignored.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const ENV_SERVER: &str = "CCUSAGE_SERVER";
pub const ENV_API_KEY: &str = "CCUSAGE_API_KEY";
pub const ENV_PROJECTS_DIR: &str = "CLAUDE_PROJECTS_DIR";
pub const ENV_REPORT_INTERVAL: &str = "REPORT_INTERVAL";
pub const ENV_INSECURE_TLS: &str = "CCUSAGE_INSECURE_TLS";
pub const ENV_STATE_FILE: &str = "CCUSAGE_STATE_FILE";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_LOG_OUTPUT: &str = "LOG_OUTPUT";
pub const ENV_LOG_DIR: &str = "CCUSAGE_LOG_DIR";

pub const DEFAULT_SERVER: &str = "http://localhost:3000";
pub const CONFIG_FILE_NAME: &str = ".ccusage-agent.conf";
pub const STATE_FILE_NAME: &str = ".ccusage-agent-state.json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key is required. Use --api-key or set {ENV_API_KEY}.")]
    MissingApiKey,
    #[error("server URL must start with http:// or https://, got `{0}`")]
    InvalidServer(String),
}

/// Minutes between collection cycles, always within 1..=1440.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportInterval(u32);

impl ReportInterval {
    pub const MIN_MINUTES: i64 = 1;
    pub const MAX_MINUTES: i64 = 1440;
    pub const DEFAULT_MINUTES: u32 = 5;

    pub fn new(minutes: i64) -> Option<Self> {
        (Self::MIN_MINUTES..=Self::MAX_MINUTES)
            .contains(&minutes)
            .then_some(Self(minutes as u32))
    }

    /// Parse a configured value. `None` when it is not an integer in range.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().and_then(Self::new)
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }
}

impl Default for ReportInterval {
    fn default() -> Self {
        Self(Self::DEFAULT_MINUTES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// EnvFilter directive, `RUST_LOG` takes precedence when set.
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
    /// `console`, `file` or `both`.
    pub output: String,
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
            directory: dirs::data_local_dir()
                .unwrap_or_else(|| home_dir().join(".local").join("share"))
                .join("ccusage-agent")
                .join("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: String,
    pub api_key: String,
    pub projects_dir: PathBuf,
    pub report_interval: ReportInterval,
    pub insecure_tls: bool,
    pub state_file: PathBuf,
    pub config_file: PathBuf,
    pub logging: LoggingConfig,
    /// Problems found while resolving sources, logged once logging is up.
    pub warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let home = home_dir();
        Self {
            server: DEFAULT_SERVER.to_string(),
            api_key: String::new(),
            projects_dir: home.join(".claude").join("projects"),
            report_interval: ReportInterval::default(),
            insecure_tls: false,
            state_file: home.join(STATE_FILE_NAME),
            config_file: home.join(CONFIG_FILE_NAME),
            logging: LoggingConfig::default(),
            warnings: Vec::new(),
        }
    }
}

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server: Option<String>,
    pub api_key: Option<String>,
    pub interval: Option<i64>,
    pub insecure: bool,
    pub projects_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
}

impl Config {
    /// Defaults, then `config_file` (or the default path), then the process
    /// environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(path) = config_file {
            config.config_file = path.to_path_buf();
        }

        let file_values = read_config_file(&config.config_file)?;
        config.apply_sources(&file_values, |key| env::var(key).ok());
        Ok(config)
    }

    /// Apply settings where `env_lookup` wins over `file_values`. Empty values
    /// count as unset.
    pub fn apply_sources<F>(&mut self, file_values: &HashMap<String, String>, env_lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            env_lookup(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file_values.get(key).cloned())
        };

        if let Some(val) = get(ENV_SERVER) {
            self.server = val;
        }
        if let Some(val) = get(ENV_API_KEY) {
            self.api_key = val;
        }
        if let Some(val) = get(ENV_PROJECTS_DIR) {
            self.projects_dir = PathBuf::from(val);
        }
        if let Some(val) = get(ENV_REPORT_INTERVAL) {
            match ReportInterval::parse(&val) {
                Some(interval) => self.report_interval = interval,
                None => {
                    self.warnings.push(format!(
                        "Invalid {ENV_REPORT_INTERVAL} value `{val}`, using default of {} minutes",
                        ReportInterval::DEFAULT_MINUTES
                    ));
                    self.report_interval = ReportInterval::default();
                }
            }
        }
        if let Some(val) = get(ENV_INSECURE_TLS) {
            self.insecure_tls = parse_bool(&val);
        }
        if let Some(val) = get(ENV_STATE_FILE) {
            self.state_file = PathBuf::from(val);
        }

        if let Some(val) = get(ENV_LOG_LEVEL) {
            self.logging.level = val;
        }
        if let Some(val) = get(ENV_LOG_FORMAT) {
            self.logging.format = val;
        }
        if let Some(val) = get(ENV_LOG_OUTPUT) {
            self.logging.output = val;
        }
        if let Some(val) = get(ENV_LOG_DIR) {
            self.logging.directory = PathBuf::from(val);
        }
    }

    /// Command line flags win over everything else. An out-of-range
    /// `--interval` is ignored.
    pub fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(server) = overrides.server.filter(|s| !s.is_empty()) {
            self.server = server;
        }
        if let Some(api_key) = overrides.api_key.filter(|s| !s.is_empty()) {
            self.api_key = api_key;
        }
        if let Some(minutes) = overrides.interval {
            match ReportInterval::new(minutes) {
                Some(interval) => self.report_interval = interval,
                None => warn!(
                    minutes,
                    kept = self.report_interval.minutes(),
                    "Ignoring --interval outside 1-1440 minutes"
                ),
            }
        }
        if overrides.insecure {
            self.insecure_tls = true;
        }
        if let Some(dir) = overrides.projects_dir {
            self.projects_dir = dir;
        }
        if let Some(path) = overrides.state_file {
            self.state_file = path;
        }
    }

    /// Emit the warnings collected by [`Config::apply_sources`].
    pub fn log_warnings(&self) {
        for message in &self.warnings {
            warn!("{message}");
        }
    }

    /// Fatal configuration problems. Checked before any cycle runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !(self.server.starts_with("http://") || self.server.starts_with("https://")) {
            return Err(ConfigError::InvalidServer(self.server.clone()));
        }
        Ok(())
    }
}

/// Read `path` as a shell-style config file. A missing file is empty.
pub fn read_config_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Ok(parse_config_file(&content))
}

/// Parse `KEY="value"` lines. Quotes and surrounding whitespace are stripped
/// and empty values dropped.
pub fn parse_config_file(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .filter_map(|(key, value)| {
            let key = key.trim();
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (!key.is_empty() && !value.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
