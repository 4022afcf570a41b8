//! Dispatcher configuration, loadable from TOML.
//!
//! Every key is optional; missing keys take their defaults:
//!
//! ```toml
//! session_timeout_secs = 1800
//! upload_cache_threshold = 2097152
//! max_body_size = 16777216
//! views_root = "views"
//! template_extension = "jsp"
//! home_page = true
//!
//! [logging]
//! level = "info"
//! ```

use crate::session::DEFAULT_SESSION_TIMEOUT;
use crate::upload::DEFAULT_CACHE_THRESHOLD;
use crate::view::DEFAULT_TEMPLATE_EXTENSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

impl ConfigError {
    pub fn invalid<S: ToString>(str: S) -> Self {
        Self::Invalid { reason: str.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Idle time after which a session expires.
    pub session_timeout_secs: u64,
    /// Uploaded files up to this size stay in memory, larger ones are spooled to disk.
    pub upload_cache_threshold: usize,
    pub max_body_size: usize,
    pub views_root: PathBuf,
    pub template_extension: String,
    /// Serve the route listing at `/`.
    pub home_page: bool,
    pub logging: LoggingConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT.as_secs(),
            upload_cache_threshold: DEFAULT_CACHE_THRESHOLD,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            views_root: PathBuf::from("views"),
            template_extension: DEFAULT_TEMPLATE_EXTENSION.to_owned(),
            home_page: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session_timeout_secs == 0 {
            return Err(ConfigError::invalid("session_timeout_secs must be positive"));
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::invalid("max_body_size must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned() }
    }
}
