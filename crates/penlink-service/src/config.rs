//! Daemon configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use penlink_core::AgentConfig;
use penlink_types::uuids::VENDOR_COMPANY_ID;

use crate::logging::LogConfig;
use crate::output::OutputFormat;

/// Daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent settings.
    pub agent: AgentSection,
    /// Logging settings.
    pub logging: LoggingSection,
    /// Drawing output settings.
    pub output: OutputSection,
}

impl Config {
    /// Load `path` if it exists, falling back to defaults.
    ///
    /// A file that exists but cannot be loaded also yields the defaults,
    /// together with the error so the caller can report it.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<ConfigError>) {
        if !path.as_ref().exists() {
            return (Self::default(), None);
        }
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - The event channel capacity is non-zero
    /// - The log level is a known level name
    ///
    /// # Example
    ///
    /// ```
    /// use penlink_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.agent.validate());
        errors.extend(self.logging.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Company identifier a pen must advertise.
    pub vendor_id: u16,
    /// Start discovery on every adapter at startup.
    pub listen: bool,
    /// Capacity of the agent event channel.
    pub event_capacity: usize,
    /// Placeholder page dimensions `[width, height]` for drawings.
    pub dimensions: [u32; 2],
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_COMPANY_ID,
            listen: false,
            event_capacity: 100,
            dimensions: [0, 0],
        }
    }
}

impl AgentSection {
    /// Validate agent configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.event_capacity == 0 {
            errors.push(ValidationError {
                field: "agent.event_capacity".to_string(),
                message: "event capacity must be at least 1".to_string(),
            });
        }
        errors
    }

    /// The core agent configuration for this section.
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig {
            vendor_id: self.vendor_id,
            listen: self.listen,
            event_capacity: self.event_capacity,
            dimensions: (self.dimensions[0], self.dimensions[1]),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default level for the penlink crates.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSection {
    /// Validate logging configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.level.parse::<tracing::Level>().is_err() {
            errors.push(ValidationError {
                field: "logging.level".to_string(),
                message: format!(
                    "unknown level '{}': expected trace, debug, info, warn or error",
                    self.level
                ),
            });
        }
        errors
    }

    /// The logging configuration for this section.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig::new(&self.level)
    }
}

/// Drawing output configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// How drawings are printed.
    pub format: OutputFormat,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `agent.event_capacity`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("penlink")
        .join("penlinkd.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.agent.vendor_id, 0x4755);
        assert!(!config.agent.listen);
        assert_eq!(config.agent.event_capacity, 100);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [agent]
            vendor_id = 18261
            listen = true
            event_capacity = 16
            dimensions = [21000, 14800]

            [logging]
            level = "debug"

            [output]
            format = "pretty"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.agent.vendor_id, 0x4755);
        assert!(config.agent.listen);
        assert_eq!(config.agent.dimensions, [21000, 14800]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.output.format, OutputFormat::Pretty);

        let agent = config.agent.to_agent_config();
        assert_eq!(agent.dimensions, (21000, 14800));
        assert_eq!(agent.event_capacity, 16);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[agent]\nlisten = true\n").unwrap();
        assert!(config.agent.listen);
        assert_eq!(config.agent.vendor_id, VENDOR_COMPANY_ID);
        assert_eq!(config.logging, LoggingSection::default());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("penlinkd.toml");

        let mut config = Config::default();
        config.agent.listen = true;
        config.agent.dimensions = [100, 200];
        config.output.format = OutputFormat::Pretty;

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/penlinkd.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_or_default_keeps_error() {
        let temp_dir = tempfile::tempdir().unwrap();

        let missing = temp_dir.path().join("missing.toml");
        let (config, error) = Config::load_or_default(&missing);
        assert_eq!(config, Config::default());
        assert!(error.is_none());

        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "[agent\nlisten = true").unwrap();
        let (config, error) = Config::load_or_default(&broken);
        assert_eq!(config, Config::default());
        assert!(matches!(error, Some(ConfigError::Parse { .. })));

        let valid = temp_dir.path().join("valid.toml");
        std::fs::write(&valid, "[agent]\nlisten = true\n").unwrap();
        let (config, error) = Config::load_or_default(&valid);
        assert!(config.agent.listen);
        assert!(error.is_none());
    }

    #[test]
    fn test_validation_errors_collected() {
        let mut config = Config::default();
        config.agent.event_capacity = 0;
        config.logging.level = "loud".to_string();

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "agent.event_capacity");
                assert_eq!(errors[1].field, "logging.level");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_validated_rejects_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        std::fs::write(&config_path, "[agent]\nevent_capacity = 0\n").unwrap();

        let result = Config::load_validated(&config_path);
        let message = result.unwrap_err().to_string();
        assert!(message.contains("agent.event_capacity"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("penlink/penlinkd.toml"));
    }
}
