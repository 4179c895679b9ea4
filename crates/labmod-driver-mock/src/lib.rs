//! Simulated Module Drivers
//!
//! Provides simulated firmware for every module family so protocols can be
//! dry-run and the orchestration layer can be tested without hardware.
//!
//! # Available Simulators
//!
//! - [`SimTemperatureModule`] - temperature deck with a settling ramp
//! - [`SimMagneticModule`] - magnet engage/disengage
//! - [`SimThermocycler`] - lid motion, well block and heated lid
//! - [`SimHeaterShaker`] - plate heater, shaker and labware latch
//! - [`SimPipetteMotion`] - motion collaborator that records retractions
//! - [`SimLabwareDefaults`] - labware default engage heights
//!
//! # Behavior
//!
//! A simulated control loop reports a transitional status (heating,
//! speeding up, opening...) for a configurable number of status reads after
//! each command, then its terminal status. Every simulator records the
//! commands it received in a [`CommandLog`] and hands out a cloneable handle
//! so tests can inspect the log or force statuses after the driver itself has
//! been moved into a module.

mod axis;
mod heater_shaker;
mod labware;
mod magnetic;
mod motion;
mod temperature;
mod thermocycler;

use std::sync::Arc;

use parking_lot::Mutex;

pub use heater_shaker::{SimHeaterShaker, SimHeaterShakerHandle};
pub use labware::SimLabwareDefaults;
pub use magnetic::{SimMagneticModule, SimMagneticHandle};
pub use motion::SimPipetteMotion;
pub use temperature::{SimTemperatureHandle, SimTemperatureModule};
pub use thermocycler::{SimThermocycler, SimThermocyclerHandle};

/// Status reads a simulated control loop spends in its transitional state.
pub const DEFAULT_SETTLE_POLLS: u32 = 2;

/// Commands received by a simulator, in order, e.g. `set_temperature(40)`.
///
/// Status reads are not commands and are never recorded.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, call: impl Into<String>) {
        let call = call.into();
        tracing::trace!(%call, "simulated command");
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Number of recorded calls to the command named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.split('(').next() == Some(name))
            .count()
    }
}
