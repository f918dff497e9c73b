use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Koios proposal listing endpoint
    #[serde(default = "default_api_url")]
    pub url: String,
    /// Request timeout. Unset means the HTTP client's default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token - loaded from env TELEGRAM_BOT_TOKEN
    #[serde(default)]
    pub bot_token: String,
    /// Destination chat - loaded from env TELEGRAM_CHAT_ID
    #[serde(default)]
    pub chat_id: String,
    /// Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// JSON file holding the IDs of proposals already announced.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Mark a proposal as notified even when its message failed to send.
    /// Turning this off makes the next run retry the failed proposal.
    #[serde(default = "default_true")]
    pub mark_failed_as_notified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Append log lines to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://api.koios.rest/api/v1/proposal_list".to_string()
}
fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_state_path() -> PathBuf {
    PathBuf::from("notified_proposals.json")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            timeout_secs: None,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_url: default_telegram_api_url(),
            timeout_secs: None,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mark_failed_as_notified: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl TelegramConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Load a default config with env-only secrets (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            api: ApiConfig::default(),
            telegram: TelegramConfig::default(),
            state: StateConfig::default(),
            delivery: DeliveryConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.apply_env();
        config
    }

    // Secrets never have to live in the config file.
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = chat_id;
        }
        if let Ok(url) = std::env::var("GOVRELAY_API_URL") {
            self.api.url = url;
        }
        if let Ok(path) = std::env::var("GOVRELAY_STATE_PATH") {
            self.state.path = PathBuf::from(path);
        }
    }

    /// Fails when a value the pipeline cannot run without is missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingEnv("TELEGRAM_BOT_TOKEN".to_string()));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(ConfigError::MissingEnv("TELEGRAM_CHAT_ID".to_string()));
        }
        Ok(())
    }
}
