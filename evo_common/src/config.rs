//! Configuration loading traits and types.
//!
//! Any serde-deserializable struct can be read from a TOML file through the
//! blanket [`ConfigLoader`] implementation; [`load_master_config`] adds
//! semantic validation for the master's own file.
//!
//! # Usage
//!
//! ```rust,no_run
//! use evo_common::config::{load_master_config, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = load_master_config(Path::new("ecat.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::fieldbus::config::MasterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, includes every frame.
    Trace,
    /// Per-cycle diagnostics.
    Debug,
    /// Lifecycle transitions and supervisor messages.
    #[default]
    Info,
    /// Recoverable device problems.
    Warn,
    /// Device errors and fatal startup failures.
    Error,
}

impl LogLevel {
    /// Matching `tracing` level.
    pub const fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields shared by every EVO service.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "evo-ecat-line-2"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Service instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid or a key is unknown
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Load and validate the master configuration file.
pub fn load_master_config(path: &Path) -> Result<MasterConfig, ConfigError> {
    let config = MasterConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_maps_to_tracing() {
        assert_eq!(LogLevel::Trace.as_tracing_level(), tracing::Level::TRACE);
        assert_eq!(LogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        let parsed: TestWrapper = toml::from_str("level = \"debug\"").unwrap();
        assert_eq!(parsed.level, LogLevel::Debug);
        assert!(toml::from_str::<TestWrapper>("level = \"loud\"").is_err());
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: String::new(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = MasterConfig::load(Path::new("/nonexistent/path/ecat.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = MasterConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_master_config_validates() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[cycle]
cycle_count = 0
"#
        )
        .unwrap();
        file.flush().unwrap();

        let result = load_master_config(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
