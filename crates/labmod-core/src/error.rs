//! Error types for the module orchestration layer.
//!
//! `ModuleError` is the single error type returned by every module operation.
//! Validation, version and interlock failures are always raised before any
//! command reaches a driver, so an `Err` from one of those variants means the
//! hardware was not touched.
//!
//! Hardware-reported error statuses (for example a thermocycler block status
//! of `error`) are *not* errors here: they are returned as ordinary status
//! values and the caller decides whether they are fatal.
//!
//! Nothing in this layer retries. Driver failures propagate through
//! [`ModuleError::Driver`] unchanged.

use std::time::Duration;

use thiserror::Error;

use crate::version::ApiVersion;

/// Convenience alias for results using the module error type.
pub type ModuleResult<T> = std::result::Result<T, ModuleError>;

#[derive(Error, Debug)]
pub enum ModuleError {
    /// An operation or parameter was used below its minimum API version.
    #[error("{operation} requires API version {required} or higher, but this protocol declares {declared}")]
    VersionIncompatible {
        operation: String,
        required: ApiVersion,
        declared: ApiVersion,
    },

    /// A numeric parameter was outside its device range, or a profile was malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A command would violate a safety interlock between module axes.
    #[error("Interlock violation: {0}")]
    InterlockViolation(String),

    /// A magnet engage was requested without a height and no labware default exists.
    #[error("Missing default: {0}")]
    MissingDefault(String),

    /// A wait was requested for a target that was never set.
    #[error("No target set: {0}")]
    NoTargetSet(String),

    /// A blocking wait never observed its terminal status.
    #[error("Timed out after {timeout:?} waiting for {what}")]
    HardwareTimeout { what: String, timeout: Duration },

    /// The driver collaborator reported a failure.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// The module set or run was assembled inconsistently.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModuleError {
    /// True for errors raised before any command could reach a driver.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ModuleError::VersionIncompatible { .. }
                | ModuleError::Validation(_)
                | ModuleError::InterlockViolation(_)
                | ModuleError::MissingDefault(_)
                | ModuleError::NoTargetSet(_)
        )
    }
}
