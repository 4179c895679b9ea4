//! Hardware-module orchestration for laboratory automation protocols.
//!
//! This crate sits between a sequential protocol engine and the physical
//! modules on a robot deck (temperature module, magnetic module,
//! thermocycler, heater-shaker). Each module is a small state machine over
//! a driver collaborator from `labmod-core`:
//!
//! - every call is checked against the run's declared [`ApiVersion`]
//! - parameters are validated before anything reaches the driver
//! - mutating calls are bracketed by before/after command events
//! - blocking calls `.await` until the device reports completion
//!
//! # Example
//!
//! ```rust,ignore
//! let run = RunContext::builder(ApiVersion::new(2, 13))
//!     .pipette_motion(Arc::new(SimPipetteMotion::new()))
//!     .build()?;
//! let mut modules = ModuleSet::new(run.clone());
//! modules.attach(ModuleVariant::simulated(&run, "tc", ModuleModel::ThermocyclerV1, None, "7")?)?;
//!
//! let tc = modules.thermocycler("tc")?;
//! tc.close_lid().await?;
//! tc.execute_profile(&[ThermocyclerStep::new(95.0).seconds(10.0)], 30, Some(50.0)).await?;
//! modules.teardown().await?;
//! ```

pub mod config;
pub mod context;
pub mod gate;
pub mod interlock;
pub mod logging;
pub mod modules;
pub mod profile;

pub use context::{ModuleContext, RunContext};
pub use labmod_core::{ApiVersion, ModuleError, ModuleResult};
pub use modules::{HeaterShaker, MagneticModule, ModuleSet, ModuleVariant, TemperatureModule, Thermocycler};
pub use profile::{ProfileProgress, ThermocyclerStep};
