//! Server configuration.
//!
//! Values are layered, lowest precedence first: built-in defaults, an
//! optional YAML file, then `GITWEB_*` environment variables. Command line
//! flags are applied on top by the binary.
//!
//! ```yaml
//! repos_path: /srv/repos
//! disallowed_dirs: [private]
//! login_password: s3cret
//! exchange_timeout_secs: 300
//! ```

use crate::observability::LogFormat;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix of environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "GITWEB";

/// Configuration file used when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "gitweb.yaml";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was read but is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the gitweb server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Root directory holding `<dir>/<name>.git` repositories.
    pub repos_path: PathBuf,
    /// Whether the smart HTTP routes are served at all.
    pub http_git_enabled: bool,
    /// Directory names that never resolve to a repository.
    pub disallowed_dirs: Vec<String>,
    /// Username accepted by the auth gate.
    pub login_username: String,
    /// Password accepted by the auth gate. No password disables the gate.
    pub login_password: Option<String>,
    /// Git executable used for pack processes.
    pub git_binary: PathBuf,
    /// Upper bound on one pack exchange, in seconds.
    pub exchange_timeout_secs: u64,
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Log level.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos_path: PathBuf::from("./repos"),
            http_git_enabled: true,
            disallowed_dirs: Vec::new(),
            login_username: "git".to_string(),
            login_password: None,
            git_binary: PathBuf::from("git"),
            exchange_timeout_secs: 600,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Loads configuration from `file` (if it exists) and the environment.
    pub fn load(file: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(file, config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(file: &Path, env: config::Environment) -> Result<Self, ConfigError> {
        let loaded: Self = config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .add_source(
                env.try_parsing(true)
                    .ignore_empty(true)
                    .list_separator(",")
                    .with_list_parse_key("disallowed_dirs"),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks values that deserialize fine but cannot be served with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchange_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "exchange_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.login_username.contains(':') {
            return Err(ConfigError::Invalid(
                "login_username must not contain ':'".to_string(),
            ));
        }
        Ok(())
    }

    /// Upper bound on one pack exchange.
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }
}
