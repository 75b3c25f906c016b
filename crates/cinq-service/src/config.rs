//! Configuration for the offline client.

use crate::{Paths, ServiceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default API base URL (overridable at compile time via CINQ_API_URL).
pub const DEFAULT_API_URL: &str = match option_env!("CINQ_API_URL") {
    Some(url) => url,
    None => "https://api.cinq.app",
};

/// Default publishable API key (overridable at compile time via
/// CINQ_ANON_KEY; public, safe to expose).
pub const DEFAULT_ANON_KEY: &str = match option_env!("CINQ_ANON_KEY") {
    Some(key) => key,
    None => "cinq-anon-key",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Offline client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Publishable API key sent alongside the bearer token.
    #[serde(default = "default_anon_key")]
    pub anon_key: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_anon_key() -> String {
    DEFAULT_ANON_KEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            anon_key: DEFAULT_ANON_KEY.to_string(),
        }
    }
}

impl Config {
    /// Defaults, then environment overrides.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    ///
    /// `api_url` and `anon_key` are compile-time values and always use the
    /// built-in defaults regardless of the file's contents; only `log_level`
    /// is honored from file and environment.
    pub fn load(paths: &Paths) -> ServiceResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.api_url = DEFAULT_API_URL.to_string();
        config.anon_key = DEFAULT_ANON_KEY.to_string();
        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ServiceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> ServiceResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("CINQ_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }
}
