use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};

use crate::Error;

/// The prefix of environment variables that override values from the config file.
pub const ENV_PREFIX: &str = "ZETA_";

/// The replay harness configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Tracing configuration
    #[serde(default)]
    pub tracing: TracingConfig,
    /// Replay configuration
    pub replay: ReplayConfig,
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TracingConfig {
    /// Emit log lines as JSON
    #[serde(default)]
    pub json: bool,
    /// The filter directive to use when `RUST_LOG` is unset
    #[serde(default = "default_tracing_filter")]
    pub filter: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: default_tracing_filter(),
        }
    }
}

/// The set of recorded connections to replay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReplayConfig {
    /// The connections to replay, all sharing one channel cache.
    pub connections: Vec<ConnectionConfig>,
}

/// A single recorded connection.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// The connection id.
    pub id: u64,
    /// The nickname the connection registered with.
    pub nickname: String,
    /// Path to the recorded server lines of this connection.
    pub log: PathBuf,
    /// Whether to treat the end of the log as a disconnect.
    #[serde(default = "default_disconnect_at_end")]
    pub disconnect_at_end: bool,
}

impl Config {
    /// Loads the config file at `path`, with `ZETA_` environment variables taking precedence.
    ///
    /// Nested keys are separated by a double underscore, e.g. `ZETA_TRACING__JSON=true`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file can't be read or doesn't describe a valid config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

/// The tracing filter used when neither `RUST_LOG` nor the config file sets one.
#[must_use]
pub fn default_tracing_filter() -> String {
    "zeta=info,zeta_core=info".to_string()
}

/// Connections are disconnected at the end of their log unless configured otherwise.
#[must_use]
pub const fn default_disconnect_at_end() -> bool {
    true
}
