//! Configuration types for frpdeck

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the reconciliation core
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeckConfig {
    /// Log sink configuration
    #[serde(default)]
    pub logs: LogConfig,

    /// Download coordinator configuration
    #[serde(default)]
    pub downloads: DownloadConfig,

    /// Observer fan-out configuration
    #[serde(default)]
    pub events: EventConfig,

    /// Tracing subscriber configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Log sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Maximum number of retained entries; oldest entries are evicted first
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { capacity: 5000 }
    }
}

/// Download coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Delay between the 100% event and its side effects
    #[serde(with = "humantime_serde")]
    pub grace_delay: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_millis(500),
        }
    }
}

/// Observer fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Broadcast buffer for state updates; slow observers lag past this
    pub update_buffer: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { update_buffer: 256 }
    }
}

/// Tracing subscriber configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Directive used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Builder for creating configurations
pub struct ConfigBuilder {
    config: DeckConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: DeckConfig::default(),
        }
    }

    /// Set the log sink capacity
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.config.logs.capacity = capacity;
        self
    }

    /// Set the download completion grace delay
    pub fn grace_delay(mut self, delay: Duration) -> Self {
        self.config.downloads.grace_delay = delay;
        self
    }

    /// Set the observer broadcast buffer
    pub fn update_buffer(mut self, size: usize) -> Self {
        self.config.events.update_buffer = size;
        self
    }

    /// Set the default tracing directive
    pub fn telemetry_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.telemetry.filter = filter.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> DeckConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckConfig {
    /// Create a configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (frpdeck.toml, then the path in FRPDECK_CONFIG_PATH)
    /// 3. `FRPDECK_` environment overrides, nested keys split on `__`
    ///    (e.g. `FRPDECK_LOGS__CAPACITY=100`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid.
    pub fn load() -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(DeckConfig::default()))
            .merge(Toml::file("frpdeck.toml"));

        if let Ok(path) = std::env::var("FRPDECK_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: DeckConfig = figment
            .merge(Env::prefixed("FRPDECK_").split("__"))
            .extract()
            .map_err(|e| {
                crate::error::DeckError::Configuration(format!(
                    "Failed to load configuration: {}",
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: DeckConfig = Figment::from(Serialized::defaults(DeckConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                crate::error::DeckError::Configuration(format!(
                    "Failed to load configuration file: {}",
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound is zero.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.logs.capacity == 0 {
            return Err(crate::error::DeckError::Configuration(
                "logs.capacity must be greater than zero".to_string(),
            ));
        }
        if self.events.update_buffer == 0 {
            return Err(crate::error::DeckError::Configuration(
                "events.update_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DeckConfig::default();
        assert_eq!(config.logs.capacity, 5000);
        assert_eq!(config.downloads.grace_delay, Duration::from_millis(500));
        assert_eq!(config.events.update_buffer, 256);
        assert_eq!(config.telemetry.filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = DeckConfig::builder()
            .log_capacity(10)
            .grace_delay(Duration::from_millis(20))
            .telemetry_filter("debug")
            .build();

        assert_eq!(config.logs.capacity, 10);
        assert_eq!(config.downloads.grace_delay, Duration::from_millis(20));
        assert_eq!(config.telemetry.filter, "debug");
    }

    #[test]
    fn test_from_file_partial_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[logs]\ncapacity = 42\n\n[downloads]\ngrace_delay = \"1s\"\n"
        )
        .unwrap();

        let config = DeckConfig::from_file(file.path()).unwrap();
        assert_eq!(config.logs.capacity, 42);
        assert_eq!(config.downloads.grace_delay, Duration::from_secs(1));
        assert_eq!(config.events.update_buffer, 256);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logs]\ncapacity = 0\n").unwrap();

        let err = DeckConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::DeckError::Configuration(_)));
    }
}
