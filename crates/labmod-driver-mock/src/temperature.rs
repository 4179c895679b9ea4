//! Simulated temperature module.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use labmod_core::driver::TemperatureModuleDriver;
use labmod_core::status::TemperatureStatus;
use parking_lot::Mutex;

use crate::axis::TemperatureAxis;
use crate::{CommandLog, DEFAULT_SETTLE_POLLS};

/// Reads as the current temperature until a target has ever been set.
pub const SIMULATED_IDLE_TEMPERATURE: f64 = 0.0;

#[derive(Debug)]
struct State {
    axis: TemperatureAxis,
    stalled: bool,
    failing: bool,
}

/// Simulated temperature module.
///
/// # Example
///
/// ```rust,ignore
/// let driver = SimTemperatureModule::new();
/// let handle = driver.handle();
/// driver.set_temperature(40.0).await?;
/// assert_eq!(handle.log().calls(), vec!["set_temperature(40)"]);
/// ```
#[derive(Debug)]
pub struct SimTemperatureModule {
    state: Arc<Mutex<State>>,
    log: CommandLog,
}

/// Inspection and fault-injection handle for a [`SimTemperatureModule`].
#[derive(Debug, Clone)]
pub struct SimTemperatureHandle {
    state: Arc<Mutex<State>>,
    log: CommandLog,
}

impl SimTemperatureModule {
    pub fn new() -> Self {
        Self::with_settle_polls(DEFAULT_SETTLE_POLLS)
    }

    pub fn with_settle_polls(settle_polls: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                axis: TemperatureAxis::new(SIMULATED_IDLE_TEMPERATURE, settle_polls),
                stalled: false,
                failing: false,
            })),
            log: CommandLog::new(),
        }
    }

    pub fn handle(&self) -> SimTemperatureHandle {
        SimTemperatureHandle {
            state: Arc::clone(&self.state),
            log: self.log.clone(),
        }
    }

    fn check_link(&self) -> Result<()> {
        if self.state.lock().failing {
            bail!("SimTemperatureModule: no response from firmware");
        }
        Ok(())
    }
}

impl Default for SimTemperatureModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTemperatureHandle {
    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Keep the control loop in its transitional state forever.
    pub fn stall(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// Make every subsequent command fail as though the link dropped.
    pub fn fail_commands(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn firmware_target(&self) -> Option<f64> {
        self.state.lock().axis.target
    }
}

#[async_trait]
impl TemperatureModuleDriver for SimTemperatureModule {
    async fn set_temperature(&self, celsius: f64) -> Result<()> {
        self.check_link()?;
        self.log.record(format!("set_temperature({})", celsius));
        self.state.lock().axis.set_target(celsius);
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        self.check_link()?;
        self.log.record("deactivate()");
        self.state.lock().axis.deactivate();
        Ok(())
    }

    async fn read_status(&self) -> Result<TemperatureStatus> {
        let mut state = self.state.lock();
        let stalled = state.stalled;
        Ok(state.axis.poll(stalled))
    }

    async fn read_temperature(&self) -> Result<f64> {
        Ok(self.state.lock().axis.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_zero_until_a_target_is_reached() {
        let driver = SimTemperatureModule::with_settle_polls(1);
        assert_eq!(driver.read_temperature().await.unwrap(), 0.0);

        driver.set_temperature(40.0).await.unwrap();
        assert_eq!(driver.read_status().await.unwrap(), TemperatureStatus::Heating);
        assert_eq!(driver.read_status().await.unwrap(), TemperatureStatus::HoldingAtTarget);
        assert_eq!(driver.read_temperature().await.unwrap(), 40.0);
    }

    #[tokio::test]
    async fn failing_link_rejects_commands_without_logging() {
        let driver = SimTemperatureModule::new();
        let handle = driver.handle();
        handle.fail_commands(true);
        assert!(driver.set_temperature(40.0).await.is_err());
        assert!(handle.log().is_empty());
    }
}
