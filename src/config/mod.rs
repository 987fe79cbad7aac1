//! Configuration management for gridcast
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Allowed range for the compile-ahead horizon
pub const HORIZON_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=14;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Compiler configuration
    pub compiler: CompilerConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Compiler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Days compiled ahead by `horizon`
    pub horizon_days: u32,

    /// Per-run deadline in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    /// Slot limit per day
    pub max_slots_per_day: usize,

    /// Compile channels concurrently
    pub parallel_channels: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON library with channels, plans, catalog and rotation history
    pub library_path: PathBuf,

    /// Directory holding frozen schedule days
    pub schedule_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let horizon_days = env_parse("GRIDCAST_HORIZON_DAYS").unwrap_or(defaults.compiler.horizon_days);
        let deadline_ms = env_parse("GRIDCAST_DEADLINE_MS");
        let max_slots_per_day =
            env_parse("GRIDCAST_MAX_SLOTS_PER_DAY").unwrap_or(defaults.compiler.max_slots_per_day);
        let parallel_channels =
            env_parse("GRIDCAST_PARALLEL_CHANNELS").unwrap_or(defaults.compiler.parallel_channels);

        let library_path = std::env::var("GRIDCAST_LIBRARY_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.library_path);
        let schedule_dir = std::env::var("GRIDCAST_SCHEDULE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.schedule_dir);

        let level = std::env::var("GRIDCAST_LOG_LEVEL").unwrap_or(defaults.logging.level);
        let format = std::env::var("GRIDCAST_LOG_FORMAT").unwrap_or(defaults.logging.format);

        Ok(Self {
            compiler: CompilerConfig {
                horizon_days,
                deadline_ms,
                max_slots_per_day,
                parallel_channels,
            },
            storage: StorageConfig {
                library_path,
                schedule_dir,
            },
            logging: LoggingConfig { level, format },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !HORIZON_DAYS_RANGE.contains(&self.compiler.horizon_days) {
            anyhow::bail!(
                "horizon_days must be within {}..={}",
                HORIZON_DAYS_RANGE.start(),
                HORIZON_DAYS_RANGE.end()
            );
        }

        if self.compiler.max_slots_per_day == 0 {
            anyhow::bail!("max_slots_per_day must be greater than 0");
        }

        if self.compiler.deadline_ms == Some(0) {
            anyhow::bail!("deadline_ms must be positive when set");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Get the per-run deadline as Duration
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.compiler.deadline_ms.map(Duration::from_millis)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compiler: CompilerConfig {
                horizon_days: 3,
                deadline_ms: None,
                max_slots_per_day: crate::scheduler::compiler::DEFAULT_MAX_SLOTS_PER_DAY,
                parallel_channels: true,
            },
            storage: StorageConfig {
                library_path: PathBuf::from("data/library.json"),
                schedule_dir: PathBuf::from("data/schedules"),
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.compiler.horizon_days, 3);
    }

    #[test]
    fn test_invalid_horizon() {
        let mut config = Config::default();
        config.compiler.horizon_days = 0;
        assert!(config.validate().is_err());
        config.compiler.horizon_days = 15;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deadline_conversion() {
        let mut config = Config::default();
        assert_eq!(config.deadline(), None);
        config.compiler.deadline_ms = Some(250);
        assert_eq!(config.deadline(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[compiler]
horizon_days = 5
max_slots_per_day = 500
parallel_channels = false

[storage]
library_path = "lib.json"
schedule_dir = "days"

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.compiler.horizon_days, 5);
        assert!(!config.compiler.parallel_channels);
        assert_eq!(config.storage.schedule_dir, PathBuf::from("days"));
        assert!(config.validate().is_ok());
    }
}
