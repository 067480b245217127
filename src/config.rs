//! Configuration management module.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::fp::commands::COMPARISON_LEVEL_MAX;
use crate::fp::{AddMode, DEFAULT_BAUD_RATE, Timeouts};

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(AppConfig),
    /// Config file missing (first run).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    /// Baud rate (default: 19200).
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-read port timeout in milliseconds (default: 20).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_poll_interval_ms() -> u64 {
    20
}

/// Reply windows in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Configuration and status queries (default: 100).
    pub fast_ms: u64,
    /// Captures, comparisons and clearing the database (default: 6000).
    pub capture_ms: u64,
}

/// Module settings pushed by `apply`; unset values are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    pub comparison_level: Option<u8>,
    pub acquisition_timeout: Option<u8>,
    pub allow_repeat: Option<bool>,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Also write a daily log file into this directory.
    pub directory: Option<PathBuf>,
}

impl AppConfig {
    /// Get config file path (platform config directory, else next to the executable).
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "uart-fingerprint")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            })
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Validation("Serial port cannot be empty".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Validation("Baud rate must be greater than 0".to_string()));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Poll interval must be at least 1 ms".to_string(),
            ));
        }
        if self.timeouts.fast_ms < 10 {
            return Err(ConfigError::Validation(
                "Fast timeout must be at least 10 ms".to_string(),
            ));
        }
        if self.timeouts.capture_ms < self.timeouts.fast_ms {
            return Err(ConfigError::Validation(
                "Capture timeout cannot be shorter than fast timeout".to_string(),
            ));
        }
        if self.sensor.comparison_level.is_some_and(|level| level > COMPARISON_LEVEL_MAX) {
            return Err(ConfigError::Validation(format!(
                "Comparison level must be 0..={COMPARISON_LEVEL_MAX}"
            )));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TimeoutConfig {
    /// Session timeouts; database-wide work shares the capture window.
    pub fn to_timeouts(&self) -> Timeouts {
        Timeouts {
            fast: Duration::from_millis(self.fast_ms),
            slow: Duration::from_millis(self.capture_ms),
            capture: Duration::from_millis(self.capture_ms),
        }
    }
}

impl SensorConfig {
    pub fn add_mode(&self) -> Option<AddMode> {
        self.allow_repeat.map(|allow| {
            if allow {
                AddMode::AllowRepeat
            } else {
                AddMode::RejectRepeat
            }
        })
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: default_baud_rate(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_port() -> &'static str {
    if cfg!(windows) { "COM3" } else { "/dev/ttyUSB0" }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fast_ms: 100,
            capture_ms: 6000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_timeouts_match_session_defaults() {
        assert_eq!(TimeoutConfig::default().to_timeouts(), Timeouts::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str("[serial]\nport = \"/dev/ttyAMA0\"\n").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.timeouts.capture_ms, 6000);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_port() {
        let mut config = AppConfig::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_baud() {
        let mut config = AppConfig::default();
        config.serial.baud_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_timeout_bounds() {
        let mut config = AppConfig::default();

        config.timeouts.fast_ms = 5;
        assert!(config.validate().is_err());

        config.timeouts.fast_ms = 200;
        config.timeouts.capture_ms = 100;
        assert!(config.validate().is_err());

        config.timeouts.capture_ms = 5000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_comparison_level() {
        let mut config = AppConfig::default();
        config.sensor.comparison_level = Some(10);
        assert!(config.validate().is_err());

        config.sensor.comparison_level = Some(9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sensor_add_mode() {
        let mut sensor = SensorConfig::default();
        assert_eq!(sensor.add_mode(), None);
        sensor.allow_repeat = Some(false);
        assert_eq!(sensor.add_mode(), Some(AddMode::RejectRepeat));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("uart-fingerprint-test-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut config = AppConfig::default();
        config.serial.port = "/dev/ttyS1".to_string();
        config.sensor.acquisition_timeout = Some(40);
        config.save(&path).unwrap();

        match AppConfig::try_load(&path) {
            ConfigLoadResult::Loaded(loaded) => {
                assert_eq!(loaded.serial.port, "/dev/ttyS1");
                assert_eq!(loaded.sensor.acquisition_timeout, Some(40));
            }
            other => panic!("unexpected load result: {other:?}"),
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("uart-fingerprint-does-not-exist.toml");
        assert!(matches!(AppConfig::try_load(&path), ConfigLoadResult::Missing));
    }
}
