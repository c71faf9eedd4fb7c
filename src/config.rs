use crate::paths::PathStyle;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

const APP_DIR: &str = "claude-statusline";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else {
            match default_config_path() {
                Some(default_path) if default_path.exists() => Self::from_file(&default_path)?,
                _ => Self::default(),
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| "failed to parse configuration TOML")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("CLAUDE_STATUSLINE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("CLAUDE_STATUSLINE_USAGE_URL") {
            self.limits.endpoint = url;
        }
        if let Ok(path) = env::var("CLAUDE_STATUSLINE_CREDENTIALS") {
            self.limits.credentials_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("CLAUDE_STATUSLINE_LOG_FILE") {
            self.storage.log_file = PathBuf::from(path);
        }
        if env::var_os("NO_COLOR").is_some() {
            self.display.color = false;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
    #[serde(default = "default_period_file")]
    pub period_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ledger_file: default_ledger_file(),
            period_file: default_period_file(),
            log_file: default_log_file(),
        }
    }
}

impl StorageConfig {
    /// Relative file names resolve against `data_dir`; absolute ones are kept.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }

    pub fn period_path(&self) -> PathBuf {
        self.data_dir.join(&self.period_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_git_timeout")]
    pub timeout_ms: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_git_timeout(),
        }
    }
}

impl GitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_usage_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_limits_timeout")]
    pub timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_usage_endpoint(),
            credentials_path: default_credentials_path(),
            timeout_ms: default_limits_timeout(),
        }
    }
}

impl LimitsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_context_window")]
    pub context_window_tokens: u64,
    #[serde(default = "default_seven_day_threshold")]
    pub seven_day_threshold: f64,
    #[serde(default = "default_enabled")]
    pub color: bool,
    #[serde(default)]
    pub path_style: PathStyle,
    #[serde(default)]
    pub home_dir: Option<PathBuf>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            context_window_tokens: default_context_window(),
            seven_day_threshold: default_seven_day_threshold(),
            color: default_enabled(),
            path_style: PathStyle::default(),
            home_dir: None,
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn claude_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
}

fn default_data_dir() -> PathBuf {
    claude_home().join("statusline")
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from("sessions.json")
}

fn default_period_file() -> PathBuf {
    PathBuf::from("period-cost.json")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("statusline.log")
}

fn default_git_timeout() -> u64 {
    1500
}

fn default_enabled() -> bool {
    true
}

fn default_usage_endpoint() -> String {
    "https://api.anthropic.com/api/oauth/usage".to_string()
}

fn default_credentials_path() -> PathBuf {
    claude_home().join(".credentials.json")
}

fn default_limits_timeout() -> u64 {
    3000
}

fn default_context_window() -> u64 {
    200_000
}

fn default_seven_day_threshold() -> f64 {
    90.0
}
