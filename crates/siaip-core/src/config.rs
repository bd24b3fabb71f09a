//! Receiver configuration surface.
//!
//! Configuration is read from a YAML file and can be overridden through
//! environment variables prefixed with `SIAIP__` (for example
//! `SIAIP__SERVER__PORT=7001`). Command-line overrides are applied by the
//! binary on top of the loaded value.
//!
//! ```yaml
//! server:
//!   port: 7000
//!   key: "0123456789abcdef"
//!   verbose: 1
//!   drift:
//!     negative: -20
//!     positive: 40
//! sinks:
//!   - kind: storage
//!     database_url: "sqlite://events.db"
//!   - kind: diagnostic
//! ```

use crate::constants::{
    DEFAULT_DRIFT_NEGATIVE, DEFAULT_DRIFT_POSITIVE, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT,
    DEFAULT_VERBOSITY, DIAGNOSTIC_LOG_TARGET, INSTANCE_TAG_PREFIX,
};
use crate::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// Prefix of environment variable overrides.
const ENV_PREFIX: &str = "SIAIP";

/// Separator between nested keys in environment variable overrides.
const ENV_SEPARATOR: &str = "__";

/// How chatty the receiver is about errors it absorbs.
///
/// The level maps onto a default `tracing` filter: absorbed decrypt and
/// storage failures are logged at `warn` and only show from level 1, dropped
/// chunks are logged at `info` and only show from level 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct Verbosity(pub u8);

impl Verbosity {
    /// Default filter directive for this level.
    ///
    /// Diagnostic sink output stays enabled at every level.
    ///
    /// # Examples
    ///
    /// ```
    /// use siaip_core::Verbosity;
    ///
    /// assert_eq!(Verbosity(0).filter_directive(), "error,siaip::diagnostic=info");
    /// assert_eq!(Verbosity(1).filter_directive(), "warn,siaip::diagnostic=info");
    /// assert_eq!(Verbosity(5).filter_directive(), "debug,siaip::diagnostic=info");
    /// ```
    #[must_use]
    pub fn filter_directive(self) -> String {
        let level = match self.0 {
            0 => "error",
            1 => "warn",
            2 => "info",
            _ => "debug",
        };
        format!("{level},{DIAGNOSTIC_LOG_TARGET}=info")
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity(DEFAULT_VERBOSITY)
    }
}

/// Accepted range of `panel - received` drift, in seconds, bounds included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DriftWindow {
    #[serde(default = "default_drift_negative")]
    pub negative: i64,
    #[serde(default = "default_drift_positive")]
    pub positive: i64,
}

impl DriftWindow {
    /// Create a window, replacing invalid bounds with the defaults.
    #[must_use]
    pub fn new(negative: i64, positive: i64) -> Self {
        Self { negative, positive }.sanitized()
    }

    /// Replace a positive negative-bound with -20 and a negative
    /// positive-bound with +40. Zero is a valid value for either bound.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            negative: if self.negative > 0 {
                DEFAULT_DRIFT_NEGATIVE
            } else {
                self.negative
            },
            positive: if self.positive < 0 {
                DEFAULT_DRIFT_POSITIVE
            } else {
                self.positive
            },
        }
    }

    /// Returns `true` if `drift` lies inside the window.
    #[inline]
    #[must_use]
    pub fn contains(&self, drift: i64) -> bool {
        (self.negative..=self.positive).contains(&drift)
    }
}

impl Default for DriftWindow {
    fn default() -> Self {
        Self {
            negative: DEFAULT_DRIFT_NEGATIVE,
            positive: DEFAULT_DRIFT_POSITIVE,
        }
    }
}

/// Listener, decryption and timestamp settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,

    /// AES key as configured text; its byte length selects the cipher.
    pub key: String,

    #[serde(default)]
    pub verbose: Verbosity,

    /// Origin tag written into persisted records. Derived from the port when absent.
    #[serde(default)]
    pub instance_tag: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Fixed offset used as "local time" by the timestamp reconciler.
    /// The host's local zone is used when absent.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    #[serde(default, alias = "diff")]
    pub drift: DriftWindow,
}

impl ServerSettings {
    /// Raw key bytes handed to the cipher selector.
    #[must_use]
    pub fn key_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

/// One configured dispatch sink.
///
/// `kind` is kept as text so unknown kinds can be reported and skipped when
/// the dispatcher is built instead of failing the whole configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SinkSettings {
    #[serde(alias = "type")]
    pub kind: String,

    /// Storage sinks: database URL, e.g. `sqlite://events.db`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Storage sinks: pool size.
    #[serde(default)]
    pub max_connections: Option<u32>,

    /// Diagnostic sinks: `human` or `json`.
    #[serde(default)]
    pub format: Option<String>,
}

impl SinkSettings {
    /// Settings for a sink of the given kind with no parameters.
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            database_url: None,
            max_connections: None,
            format: None,
        }
    }
}

/// Complete receiver configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    pub server: ServerSettings,

    #[serde(default, alias = "dispatcher")]
    pub sinks: Vec<SinkSettings>,
}

impl ReceiverConfig {
    /// Load configuration from a YAML file plus `SIAIP__*` environment overrides.
    ///
    /// # Errors
    /// Returns `Error::Settings` if a source cannot be read or deserialized,
    /// or `Error::Config` if the result is not usable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env(path.as_ref(), environment())
    }

    fn load_with_env(path: &Path, env: Environment) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validated()
    }

    /// Parse configuration from YAML text (no environment overrides).
    ///
    /// # Errors
    /// Same as [`ReceiverConfig::load`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.server.key.is_empty() {
            return Err(Error::Config("server.key must not be empty".to_string()));
        }
        self.server.drift = self.server.drift.sanitized();
        Ok(self)
    }

    /// Origin tag distinguishing this receiver instance in shared storage.
    ///
    /// # Examples
    ///
    /// ```
    /// use siaip_core::ReceiverConfig;
    ///
    /// let config = ReceiverConfig::from_yaml_str("server:\n  port: 7001\n  key: abc\n").unwrap();
    /// assert_eq!(config.instance_tag(), "SiaIP_7001");
    /// ```
    #[must_use]
    pub fn instance_tag(&self) -> String {
        self.server
            .instance_tag
            .clone()
            .unwrap_or_else(|| format!("{INSTANCE_TAG_PREFIX}{}", self.server.port))
    }
}

/// `SIAIP__SERVER__PORT=7001` overrides `server.port`.
///
/// Values stay strings; numeric fields are converted on deserialization so a
/// key such as `0123...` keeps its leading zero.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_drift_negative() -> i64 {
    DEFAULT_DRIFT_NEGATIVE
}

fn default_drift_positive() -> i64 {
    DEFAULT_DRIFT_POSITIVE
}
