// Configuration loading and parsing (wallet.toml, credentials.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use credits_core::api::{DEFAULT_STREAM_PATH, DEFAULT_WALLET_PATH};
use credits_core::backoff::{
    ReconnectPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
use credits_core::poller::DEFAULT_POLL_INTERVAL;
use credits_core::session::SessionOptions;
use serde::Deserialize;
use thiserror::Error;

const WALLET_FILE: &str = "wallet.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub poll: PollConfig,
    pub reconnect: ReconnectConfig,
    pub credentials: CredentialsConfig,
}

impl Config {
    /// Session token, if one is configured and non-empty.
    pub fn session_token(&self) -> Option<&str> {
        self.credentials
            .session_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                max_attempts: self.reconnect.max_attempts,
            },
            poll_interval: Duration::from_secs(self.poll.interval_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// wallet.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire wallet.toml file.
#[derive(Debug, Clone, Deserialize)]
struct WalletFile {
    api: ApiConfig,
    #[serde(default)]
    poll: PollConfig,
    #[serde(default)]
    reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_wallet_path")]
    pub wallet_path: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

fn default_wallet_path() -> String {
    DEFAULT_WALLET_PATH.to_string()
}

fn default_stream_path() -> String {
    DEFAULT_STREAM_PATH.to_string()
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub session_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/wallet.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` handles that.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- wallet.toml (required) ---
    let wallet_path = config_dir.join(WALLET_FILE);
    let wallet_text = read_file(&wallet_path)?;
    let wallet_file: WalletFile =
        toml::from_str(&wallet_text).map_err(|e| ConfigError::ParseError {
            path: wallet_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        api: wallet_file.api,
        poll: wallet_file.poll,
        reconnect: wallet_file.reconnect,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Copy `defaults/wallet.toml` into `config/` when it is missing. Returns
/// whether a copy was made. `credentials.toml` is left for the user to create.
pub fn ensure_config_files(base_dir: &Path, defaults_dir: &Path) -> Result<bool, ConfigError> {
    let config_dir = base_dir.join("config");
    let target = config_dir.join(WALLET_FILE);
    if target.exists() {
        return Ok(false);
    }

    let source = defaults_dir.join(WALLET_FILE);
    if !source.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither {} nor {} exists; create config/{WALLET_FILE}",
                target.display(),
                source.display()
            ),
        });
    }

    let copy_failed = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {} to {}: {e}", source.display(), target.display()),
    };
    std::fs::create_dir_all(&config_dir).map_err(copy_failed)?;
    std::fs::copy(&source, &target).map_err(copy_failed)?;
    Ok(true)
}

/// Loads config relative to the current working directory, first copying
/// any missing files from `./defaults`.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd, &cwd.join("defaults"))?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let base_url = config.api.base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "api.base_url".into(),
            message: "must not be empty".into(),
        });
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "api.base_url".into(),
            message: format!("must start with http:// or https://, got {base_url}"),
        });
    }

    for (name, path) in [
        ("api.wallet_path", &config.api.wallet_path),
        ("api.stream_path", &config.api.stream_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: format!("must start with '/', got {path:?}"),
            });
        }
    }

    if config.poll.interval_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "poll.interval_secs".into(),
            message: "must be > 0".into(),
        });
    }

    let r = &config.reconnect;
    if r.initial_delay_ms == 0 {
        return Err(ConfigError::ValidationError {
            field: "reconnect.initial_delay_ms".into(),
            message: "must be > 0".into(),
        });
    }
    if r.max_delay_ms < r.initial_delay_ms {
        return Err(ConfigError::ValidationError {
            field: "reconnect.max_delay_ms".into(),
            message: format!(
                "must be >= initial_delay_ms ({}), got {}",
                r.initial_delay_ms, r.max_delay_ms
            ),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
