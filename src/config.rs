//! Layered configuration for the watcher.
//!
//! Sources, later ones winning:
//! - Built-in defaults
//! - TOML file given with `--config`
//! - Environment variables
//! - CLI flags (applied by the binary)
//!
//! # Environment Variables
//!
//! Variables are prefixed with `WATCHTAGS_` and use double underscores to
//! separate nested levels:
//! - `WATCHTAGS_WAIT_TIME=30` sets `wait_time`
//! - `WATCHTAGS_CMD="ctags -R -f -"` sets `cmd`
//! - `WATCHTAGS_LOGGING__DEFAULT=debug` sets `logging.default`
//!
//! Malformed values never fail loading; they fall back to the default.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::watcher::{DEFAULT_COMMAND, DEFAULT_OUTPUT_NAME, DEFAULT_WAIT_TIME};

/// Prefix of every environment variable read by [`Settings::load`].
pub const ENV_PREFIX: &str = "WATCHTAGS_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Seconds the dispatcher sleeps between cycles
    #[serde(default = "default_wait_time", deserialize_with = "lenient::wait_time")]
    pub wait_time: u64,

    /// Index command template; the root path is appended as its last argument
    #[serde(default = "default_cmd", deserialize_with = "lenient::cmd")]
    pub cmd: String,

    /// Seconds before a running command is killed; unset means no limit
    #[serde(
        default,
        deserialize_with = "lenient::timeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<u64>,

    /// Name of the index file written into each root
    #[serde(default = "default_output_name", deserialize_with = "lenient::output_name")]
    pub output_name: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Log filter settings, in `tracing` filter syntax.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for everything without a module override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `watchtags::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_wait_time() -> u64 {
    DEFAULT_WAIT_TIME.as_secs()
}
fn default_cmd() -> String {
    DEFAULT_COMMAND.to_string()
}
fn default_output_name() -> String {
    DEFAULT_OUTPUT_NAME.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wait_time: default_wait_time(),
            cmd: default_cmd(),
            timeout: None,
            output_name: default_output_name(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load defaults, the optional config file and `WATCHTAGS_*` variables.
    ///
    /// An explicitly named file must exist and parse.
    pub fn load(config_path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        Self::load_with_env(config_path, Env::prefixed(ENV_PREFIX))
    }

    fn load_with_env(config_path: Option<&Path>, env: Env) -> Result<Self, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        if let Some(path) = config_path {
            if !path.is_file() {
                return Err(Box::new(figment::Error::from(format!(
                    "config file not found: {}",
                    path.display()
                ))));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment
            // Double underscore separates nested levels
            .merge(env.map(|key| key.as_str().to_lowercase().replace("__", ".").into()))
            .extract()
            .map_err(Box::new)
    }

    pub fn wait_duration(&self) -> Duration {
        Duration::from_secs(self.wait_time)
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Effective settings as a TOML document.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Deserializers that replace malformed values with defaults.
mod lenient {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    /// Any scalar a provider may hand us.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Bool(bool),
        Text(String),
        /// Tables and arrays; always replaced by the default.
        Other(#[allow(dead_code)] IgnoredAny),
    }

    impl Raw {
        fn seconds(self) -> Option<u64> {
            match self {
                Raw::Unsigned(n) => Some(n),
                Raw::Float(f) if f.is_finite() && f >= 0.0 => Some(f.trunc() as u64),
                Raw::Text(s) => leading_seconds(&s),
                // Negative, boolean or structured
                _ => None,
            }
        }

        fn text(self) -> Option<String> {
            let text = match self {
                Raw::Text(s) => s,
                // A command such as `true` arrives from the environment as a bool
                Raw::Bool(b) => b.to_string(),
                Raw::Unsigned(n) => n.to_string(),
                Raw::Signed(n) => n.to_string(),
                Raw::Float(f) => f.to_string(),
                Raw::Other(_) => return None,
            };
            (!text.trim().is_empty()).then_some(text)
        }
    }

    /// Leading decimal digits of `s`, after optional whitespace and `+`.
    pub(super) fn leading_seconds(s: &str) -> Option<u64> {
        let s = s.trim_start();
        let s = s.strip_prefix('+').unwrap_or(s);
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        s[..end].parse().ok()
    }

    pub fn wait_time<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(Raw::deserialize(d)?
            .seconds()
            .unwrap_or_else(super::default_wait_time))
    }

    pub fn timeout<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(Raw::deserialize(d)?.seconds().filter(|&secs| secs > 0))
    }

    pub fn cmd<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Raw::deserialize(d)?.text().unwrap_or_else(super::default_cmd))
    }

    pub fn output_name<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Raw::deserialize(d)?
            .text()
            .filter(|name| !name.contains('/') && name != "." && name != "..")
            .unwrap_or_else(super::default_output_name))
    }
}
