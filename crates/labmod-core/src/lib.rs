//! Core types and traits for rust-labmod.
//!
//! This crate holds everything the module orchestration layer needs that
//! carries no device-specific behavior of its own:
//!
//! - [`version`]: protocol API versions and the version gate primitive
//! - [`error`]: the [`ModuleError`](error::ModuleError) taxonomy
//! - [`status`]: observed-status enumerations reported by module firmware
//! - [`model`]: module kinds and hardware models
//! - [`limits`]: documented device ranges and parameter validation
//! - [`driver`]: driver and collaborator traits consumed by the module layer
//! - [`events`]: before/after command events and event sinks
//! - [`wait`]: the polling wait primitive used for every blocking call
//! - [`observable`]: watch-backed values for target state and progress

pub mod driver;
pub mod error;
pub mod events;
pub mod limits;
pub mod model;
pub mod observable;
pub mod status;
pub mod version;
pub mod wait;

pub use error::{ModuleError, ModuleResult};
pub use version::ApiVersion;
