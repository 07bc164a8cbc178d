//! TOML configuration for the engine.
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Durations are integer milliseconds.
//!
//! ```toml
//! [bus]
//! max_queue_size = 1000
//! handler_timeout_ms = 5000
//!
//! [orchestrator]
//! conflict_strategy = "weighted"
//!
//! [supervisor]
//! max_restart_attempts = 3
//! restart_delay_ms = 5000
//! health_check_interval_ms = 30000
//!
//! [model]
//! provider = "mock"
//! ```

use crate::orchestrator::ConflictStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "SPROUT_CONFIG";

const KNOWN_PROVIDERS: [&str; 3] = ["mock", "openai", "openai-compatible"];

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Message/event bus settings.
    pub bus: BusConfig,
    /// Learning orchestrator settings.
    pub orchestrator: OrchestratorConfig,
    /// Failure recovery supervisor settings.
    pub supervisor: SupervisorConfig,
    /// Completion service settings.
    pub model: ModelSettings,
}

/// Bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of each of the two queues.
    pub max_queue_size: usize,
    /// Deadline for a single handler invocation.
    pub handler_timeout_ms: u64,
    /// A drain pass slower than this is flagged as a bottleneck.
    pub bottleneck_threshold_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { max_queue_size: 1000, handler_timeout_ms: 5000, bottleneck_threshold_ms: 1000 }
    }
}

impl BusConfig {
    /// Handler deadline as a `Duration`.
    pub const fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Bottleneck threshold as a `Duration`.
    pub const fn bottleneck_threshold(&self) -> Duration {
        Duration::from_millis(self.bottleneck_threshold_ms)
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// One of "priority", "consensus", "weighted".
    pub conflict_strategy: String,
    /// Deadline for a synchronous agent request.
    pub request_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { conflict_strategy: "weighted".to_string(), request_timeout_ms: 10_000 }
    }
}

impl OrchestratorConfig {
    /// Parsed conflict-resolution strategy.
    ///
    /// # Errors
    /// Returns `Validation` if the name is not a known strategy.
    pub fn strategy(&self) -> Result<ConflictStrategy> {
        self.conflict_strategy.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "Invalid conflict strategy: {}. Valid options: priority, consensus, weighted",
                self.conflict_strategy
            ))
        })
    }

    /// Request deadline as a `Duration`.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Supervisor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Restarts attempted before an agent is degraded.
    pub max_restart_attempts: u32,
    /// Fixed wait before each restart.
    pub restart_delay_ms: u64,
    /// Period of the health poll.
    pub health_check_interval_ms: u64,
    /// Consecutive failures that raise a critical alert.
    pub alert_threshold: u32,
    /// Size of the failure ring buffer.
    pub failure_log_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restart_attempts: 3,
            restart_delay_ms: 5000,
            health_check_interval_ms: 30_000,
            alert_threshold: 5,
            failure_log_capacity: 1000,
        }
    }
}

impl SupervisorConfig {
    /// Restart delay as a `Duration`.
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Health poll period as a `Duration`.
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

/// Completion service selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// "mock", "openai" or "openai-compatible".
    pub provider: String,
    /// Model ID passed to the provider.
    pub model_id: String,
    /// Base URL for OpenAI-compatible servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { provider: "mock".to_string(), model_id: "sprout-mock".to_string(), base_url: None }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `SPROUT_CONFIG`, or defaults when unset.
    ///
    /// # Errors
    /// Returns error if the named file cannot be loaded.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.bus.max_queue_size == 0 {
            return Err(ConfigError::Validation("bus.max_queue_size must be greater than 0".into()));
        }
        if self.bus.handler_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "bus.handler_timeout_ms must be greater than 0".into(),
            ));
        }
        self.orchestrator.strategy()?;
        if self.orchestrator.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "orchestrator.request_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.supervisor.health_check_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "supervisor.health_check_interval_ms must be greater than 0".into(),
            ));
        }
        if self.supervisor.alert_threshold == 0 {
            return Err(ConfigError::Validation(
                "supervisor.alert_threshold must be greater than 0".into(),
            ));
        }
        if self.supervisor.failure_log_capacity == 0 {
            return Err(ConfigError::Validation(
                "supervisor.failure_log_capacity must be greater than 0".into(),
            ));
        }
        if !KNOWN_PROVIDERS.contains(&self.model.provider.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown model provider '{}'. Valid providers: {}",
                self.model.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.bus.max_queue_size, 1000);
        assert_eq!(config.bus.handler_timeout(), Duration::from_secs(5));
        assert_eq!(config.supervisor.max_restart_attempts, 3);
        assert_eq!(config.supervisor.restart_delay(), Duration::from_secs(5));
        assert_eq!(config.supervisor.health_check_interval(), Duration::from_secs(30));
        assert_eq!(config.supervisor.alert_threshold, 5);
        assert_eq!(config.orchestrator.strategy().unwrap(), ConflictStrategy::Weighted);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [orchestrator]
            conflict_strategy = "consensus"

            [supervisor]
            max_restart_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.strategy().unwrap(), ConflictStrategy::Consensus);
        assert_eq!(config.supervisor.max_restart_attempts, 5);
        assert_eq!(config.supervisor.restart_delay_ms, 5000);
        assert_eq!(config.bus.max_queue_size, 1000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let err = EngineConfig::from_toml_str("[bus]\nmax_queue_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("max_queue_size")));

        let err =
            EngineConfig::from_toml_str("[orchestrator]\nconflict_strategy = \"loudest\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("loudest")));

        let err = EngineConfig::from_toml_str("[model]\nprovider = \"carrier-pigeon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = EngineConfig::from_toml_str("[bus\nmax_queue_size = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[bus]\nhandler_timeout_ms = 250\n\n[model]\nprovider = \"openai\"").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.bus.handler_timeout(), Duration::from_millis(250));
        assert_eq!(config.model.provider, "openai");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = EngineConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_toml_round_trip_rendering() {
        let rendered = EngineConfig::default().to_toml_string().unwrap();
        assert!(rendered.contains("[supervisor]"));
        assert_eq!(EngineConfig::from_toml_str(&rendered).unwrap(), EngineConfig::default());
    }
}
