//! Application configuration management.
//!
//! Configuration is layered with the [`config`] crate:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `PROXTRACE__`, sections separated
//!    by `__` (e.g. `PROXTRACE__TIMING__FOREGROUND_INTERVAL_MS=5000`)
//!
//! Handles:
//! - Trace timing (rebroadcast period, scan intervals, attenuation exponent)
//! - Storage locations for persisted settings and log files
//! - Radio selection and scan tuning
//! - HTTP listen address, log mode and log level

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TraceMode;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "PROXTRACE";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration fields are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Trace timing profile.
    pub timing: TimingConfig,

    /// Where persisted settings live.
    pub storage: StorageConfig,

    /// Radio selection.
    pub radio: RadioConfig,

    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Advertising and scanning cadence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How often the advertisement is refreshed, in milliseconds.
    pub rebroadcast_period_ms: u64,

    /// Scan interval in background mode, in milliseconds.
    pub background_interval_ms: u64,

    /// Scan interval in foreground mode, in milliseconds.
    pub foreground_interval_ms: u64,

    /// Signal attenuation exponent used by the distance estimator.
    /// Typical values: 2.0 (free space) to 4.0 (crowded indoor).
    pub environmental_factor: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            rebroadcast_period_ms: 5 * 60 * 1000,
            background_interval_ms: 60 * 1000,
            foreground_interval_ms: 10 * 1000,
            environmental_factor: 2.0,
        }
    }
}

impl TimingConfig {
    /// Advertisement refresh period.
    #[must_use]
    pub const fn rebroadcast_period(&self) -> Duration {
        Duration::from_millis(self.rebroadcast_period_ms)
    }

    /// Scan interval for a mode.
    #[must_use]
    pub const fn scan_interval(&self, mode: TraceMode) -> Duration {
        match mode {
            TraceMode::Foreground => Duration::from_millis(self.foreground_interval_ms),
            TraceMode::Background => Duration::from_millis(self.background_interval_ms),
        }
    }

    fn validate_into(&self, errors: &mut Vec<ConfigError>) {
        let durations = [
            ("timing.rebroadcast_period_ms", self.rebroadcast_period_ms),
            ("timing.background_interval_ms", self.background_interval_ms),
            ("timing.foreground_interval_ms", self.foreground_interval_ms),
        ];
        for (field, value) in durations {
            if value == 0 {
                errors.push(invalid(field, "must be greater than zero"));
            }
        }
        if self.foreground_interval_ms > self.background_interval_ms {
            errors.push(invalid(
                "timing.foreground_interval_ms",
                "must not exceed timing.background_interval_ms",
            ));
        }
        if !self.environmental_factor.is_finite() || self.environmental_factor <= 0.0 {
            errors.push(invalid(
                "timing.environmental_factor",
                "must be a positive finite number",
            ));
        }
    }
}

/// Persisted settings location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `settings.json`. Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Directory for production log files. Defaults to [`default_log_dir`].
    pub log_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured directory, or the platform default.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(crate::settings::default_data_dir)
    }

    /// The configured log directory, or the platform default.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(default_log_dir)
    }
}

/// Radio selection and scan tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Use the simulated radio even when BlueZ support is compiled in.
    pub simulate: bool,

    /// Length of each discovery burst, in milliseconds.
    pub scan_window_ms: u64,

    /// How many recent sightings the device store keeps.
    pub max_sightings: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            scan_window_ms: 4000,
            max_sightings: 512,
        }
    }
}

impl RadioConfig {
    /// Discovery burst length.
    #[must_use]
    pub const fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    fn validate_into(&self, errors: &mut Vec<ConfigError>) {
        if self.scan_window_ms == 0 {
            errors.push(invalid("radio.scan_window_ms", "must be greater than zero"));
        }
        if self.max_sightings == 0 {
            errors.push(invalid("radio.max_sightings", "must be greater than zero"));
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen_addr: String,

    /// Use production logging (JSON files plus compact stdout).
    pub production: bool,

    /// Filter directives used when `RUST_LOG` is unset, e.g. `info` or
    /// `proxtrace_core=debug,info`.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            production: false,
            log_level: "info".to_string(),
        }
    }
}

impl TraceConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);

        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = layered.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::ValidationError`] for a single problem or
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        self.timing.validate_into(&mut errors);
        self.radio.validate_into(&mut errors);
        if self.server.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(invalid(
                "server.listen_addr",
                "must be a socket address such as 0.0.0.0:3000",
            ));
        }
        if self.server.log_level.trim().is_empty() {
            errors.push(invalid("server.log_level", "must not be empty"));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Get the default configuration file path.
///
/// On Linux: `/etc/proxtrace/config.toml`
/// Elsewhere: the platform configuration directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/proxtrace/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "proxtrace").map_or_else(
            || PathBuf::from("./config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

/// Get the default log directory.
///
/// On Linux: `/var/log/proxtrace`
/// Elsewhere: a `logs` folder in the platform data directory.
#[must_use]
pub fn default_log_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/proxtrace")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "proxtrace").map_or_else(
            || PathBuf::from("./logs"),
            |dirs| dirs.data_dir().join("logs"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TraceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.rebroadcast_period(), Duration::from_secs(300));
        assert_eq!(
            config.timing.scan_interval(TraceMode::Background),
            Duration::from_secs(60)
        );
        assert_eq!(
            config.timing.scan_interval(TraceMode::Foreground),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = TraceConfig::default();
        config.timing.environmental_factor = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError { ref field, .. } if field == "timing.environmental_factor"
        ));
    }

    #[test]
    fn test_multiple_validation_errors() {
        let mut config = TraceConfig::default();
        config.timing.rebroadcast_period_ms = 0;
        config.timing.environmental_factor = f64::NAN;
        config.server.listen_addr = "not an address".to_string();
        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_foreground_must_not_exceed_background() {
        let mut config = TraceConfig::default();
        config.timing.foreground_interval_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[timing]\nforeground_interval_ms = 2500\nenvironmental_factor = 3.0\n\n[radio]\nsimulate = true\n",
        )
        .unwrap();

        let config = TraceConfig::load(Some(&path)).unwrap();
        assert_eq!(config.timing.foreground_interval_ms, 2500);
        assert!((config.timing.environmental_factor - 3.0).abs() < f64::EPSILON);
        assert!(config.radio.simulate);
        // Untouched fields keep their defaults
        assert_eq!(config.timing.background_interval_ms, 60_000);
    }

    #[test]
    fn test_log_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[storage]\nlog_dir = \"/srv/proxtrace/logs\"\n\n[server]\nlog_level = \"proxtrace_core=debug,info\"\n",
        )
        .unwrap();

        let config = TraceConfig::load(Some(&path)).unwrap();
        assert_eq!(config.storage.log_dir(), PathBuf::from("/srv/proxtrace/logs"));
        assert_eq!(config.server.log_level, "proxtrace_core=debug,info");
        // The settings directory is independent of the log directory
        assert_eq!(config.storage.data_dir(), crate::settings::default_data_dir());
    }

    #[test]
    fn test_log_dir_defaults_to_platform_dir() {
        let config = TraceConfig::default();
        assert_eq!(config.storage.log_dir(), default_log_dir());
        assert_eq!(config.server.log_level, "info");
    }

    #[test]
    fn test_blank_log_level_rejected() {
        let mut config = TraceConfig::default();
        config.server.log_level = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "server.log_level"
        ));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TraceConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timing]\nrebroadcast_period_ms = 0\n").unwrap();
        assert!(matches!(
            TraceConfig::load(Some(&path)),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
