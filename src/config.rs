//! Configuration for the simulator and for assembling a run.
//!
//! Configuration is loaded from:
//! 1. `config/labmod.toml` (or a path given on the command line)
//! 2. Environment variables prefixed with `LABMOD_`
//!
//! Nested keys are separated by a double underscore so that field names
//! keep their own underscores:
//!
//! ```text
//! LABMOD_APPLICATION__LOG_LEVEL=debug
//! LABMOD_WAIT__POLL_INTERVAL_MS=50
//! LABMOD_PROTOCOL__API_VERSION=2.14
//! ```
//!
//! # Example
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [protocol]
//! api_version = "2.13"
//!
//! [[modules]]
//! id = "tc"
//! kind = "thermocycler"
//! model = "thermocyclerModuleV1"
//! slot = "7"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use labmod_core::model::{ModuleKind, ModuleModel};
use labmod_core::wait::WaitPolicy;
use labmod_core::ApiVersion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabmodConfig {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Modules to attach, in order
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    #[serde(default)]
    pub json_logs: bool,
}

/// Polling behaviour of every blocking wait
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Ceiling on any single wait before `HardwareTimeout`
    #[serde(default = "default_wait_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// API version the protocol declares, as "major.minor"
    #[serde(default = "default_api_version")]
    pub api_version: ApiVersion,
}

/// Module definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDefinition {
    /// Unique module identifier
    pub id: String,
    pub kind: ModuleKind,
    /// Physical model present on the deck
    pub model: ModuleModel,
    /// Model the protocol asked for, if different
    #[serde(default)]
    pub requested_as: Option<ModuleModel>,
    /// Deck slot
    pub slot: String,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> u64 {
    100
}

fn default_wait_timeout() -> u64 {
    30 * 60 * 1000
}

fn default_api_version() -> ApiVersion {
    ApiVersion::new(2, 13)
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            timeout_ms: default_wait_timeout(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
        }
    }
}

impl WaitConfig {
    pub fn policy(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.timeout_ms),
        )
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl LabmodConfig {
    /// Load configuration from `config/labmod.toml` and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/labmod.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// Precedence (highest first): `LABMOD_` environment variables, the
    /// file, built-in defaults. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LABMOD_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Poll interval is non-zero and not longer than the timeout
    /// - The declared API version is supported
    /// - Module ids and slots are unique
    /// - Each module's model (and requested model) matches its kind
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.wait.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "wait.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.wait.timeout_ms < self.wait.poll_interval_ms {
            return Err(ConfigError::ValidationError(format!(
                "wait.timeout_ms ({}) must not be shorter than wait.poll_interval_ms ({})",
                self.wait.timeout_ms, self.wait.poll_interval_ms
            )));
        }

        if !gate::is_supported(self.protocol.api_version) {
            return Err(ConfigError::ValidationError(format!(
                "Unsupported API version {}. Must be between {} and {}",
                self.protocol.api_version,
                gate::MIN_SUPPORTED,
                gate::MAX_SUPPORTED
            )));
        }

        let mut ids = HashSet::new();
        let mut slots = HashSet::new();
        for module in &self.modules {
            if !ids.insert(&module.id) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate module ID: '{}'",
                    module.id
                )));
            }
            if !slots.insert(&module.slot) {
                return Err(ConfigError::ValidationError(format!(
                    "Module '{}' uses slot {} which is already occupied",
                    module.id, module.slot
                )));
            }
            for model in std::iter::once(module.model).chain(module.requested_as) {
                if model.kind() != module.kind {
                    return Err(ConfigError::ValidationError(format!(
                        "Module '{}': model {} is not a {} module",
                        module.id, model, module.kind
                    )));
                }
            }
        }

        Ok(())
    }
}
