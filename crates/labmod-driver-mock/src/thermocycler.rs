//! Simulated thermocycler.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use labmod_core::driver::ThermocyclerDriver;
use labmod_core::status::{LidPosition, TemperatureStatus};
use parking_lot::Mutex;

use crate::axis::{Motion, TemperatureAxis};
use crate::{CommandLog, DEFAULT_SETTLE_POLLS};

const AMBIENT: f64 = 23.0;
/// Ramp rate reported while the block is moving between set points (°C/s).
const SIMULATED_RAMP_RATE: f64 = 4.4;

#[derive(Debug)]
struct State {
    lid: Motion<LidPosition>,
    block: TemperatureAxis,
    lid_heater: TemperatureAxis,
    block_volume: Option<f64>,
    stalled: bool,
}

/// Simulated thermocycler with independent lid motion, block and lid heater.
///
/// The lid position reads `unknown` until the first lid command.
#[derive(Debug)]
pub struct SimThermocycler {
    state: Arc<Mutex<State>>,
    log: CommandLog,
}

/// Inspection and fault-injection handle for a [`SimThermocycler`].
#[derive(Debug, Clone)]
pub struct SimThermocyclerHandle {
    state: Arc<Mutex<State>>,
    log: CommandLog,
}

impl SimThermocycler {
    pub fn new() -> Self {
        Self::with_settle_polls(DEFAULT_SETTLE_POLLS)
    }

    pub fn with_settle_polls(settle_polls: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                lid: Motion::new(LidPosition::Unknown, settle_polls),
                block: TemperatureAxis::new(AMBIENT, settle_polls),
                lid_heater: TemperatureAxis::new(AMBIENT, settle_polls),
                block_volume: None,
                stalled: false,
            })),
            log: CommandLog::new(),
        }
    }

    pub fn handle(&self) -> SimThermocyclerHandle {
        SimThermocyclerHandle {
            state: Arc::clone(&self.state),
            log: self.log.clone(),
        }
    }
}

impl Default for SimThermocycler {
    fn default() -> Self {
        Self::new()
    }
}

impl SimThermocyclerHandle {
    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Freeze every axis in its current state.
    pub fn stall(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// Force the block into the firmware's indeterminate status.
    pub fn force_block_error(&self) {
        self.state.lock().block.status = TemperatureStatus::Error;
    }

    pub fn block_volume(&self) -> Option<f64> {
        self.state.lock().block_volume
    }
}

#[async_trait]
impl ThermocyclerDriver for SimThermocycler {
    async fn open_lid(&self) -> Result<()> {
        self.log.record("open_lid()");
        self.state
            .lock()
            .lid
            .start(LidPosition::InBetween, LidPosition::Open);
        Ok(())
    }

    async fn close_lid(&self) -> Result<()> {
        self.log.record("close_lid()");
        self.state
            .lock()
            .lid
            .start(LidPosition::InBetween, LidPosition::Closed);
        Ok(())
    }

    async fn read_lid_position(&self) -> Result<LidPosition> {
        let mut state = self.state.lock();
        let stalled = state.stalled;
        Ok(state.lid.poll(stalled))
    }

    async fn set_block_temperature(&self, celsius: f64, volume_ul: f64) -> Result<()> {
        self.log
            .record(format!("set_block_temperature({}, {})", celsius, volume_ul));
        let mut state = self.state.lock();
        state.block_volume = Some(volume_ul);
        state.block.set_target(celsius);
        Ok(())
    }

    async fn set_lid_temperature(&self, celsius: f64) -> Result<()> {
        self.log.record(format!("set_lid_temperature({})", celsius));
        self.state.lock().lid_heater.set_target(celsius);
        Ok(())
    }

    async fn deactivate_block(&self) -> Result<()> {
        self.log.record("deactivate_block()");
        self.state.lock().block.deactivate();
        Ok(())
    }

    async fn deactivate_lid(&self) -> Result<()> {
        self.log.record("deactivate_lid()");
        self.state.lock().lid_heater.deactivate();
        Ok(())
    }

    async fn read_block_status(&self) -> Result<TemperatureStatus> {
        let mut state = self.state.lock();
        let stalled = state.stalled;
        Ok(state.block.poll(stalled))
    }

    async fn read_lid_status(&self) -> Result<TemperatureStatus> {
        let mut state = self.state.lock();
        let stalled = state.stalled;
        Ok(state.lid_heater.poll(stalled))
    }

    async fn read_block_temperature(&self) -> Result<Option<f64>> {
        Ok(Some(self.state.lock().block.current))
    }

    async fn read_lid_temperature(&self) -> Result<Option<f64>> {
        Ok(Some(self.state.lock().lid_heater.current))
    }

    async fn read_ramp_rate(&self) -> Result<Option<f64>> {
        let moving = matches!(
            self.state.lock().block.status,
            TemperatureStatus::Heating | TemperatureStatus::Cooling
        );
        Ok(moving.then_some(SIMULATED_RAMP_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lid_is_unknown_until_moved() {
        let driver = SimThermocycler::with_settle_polls(1);
        assert_eq!(driver.read_lid_position().await.unwrap(), LidPosition::Unknown);

        driver.open_lid().await.unwrap();
        assert_eq!(driver.read_lid_position().await.unwrap(), LidPosition::InBetween);
        assert_eq!(driver.read_lid_position().await.unwrap(), LidPosition::Open);
    }

    #[tokio::test]
    async fn block_and_lid_heat_independently() {
        let driver = SimThermocycler::with_settle_polls(0);
        driver.set_block_temperature(95.0, 50.0).await.unwrap();
        assert_eq!(driver.read_block_status().await.unwrap(), TemperatureStatus::HoldingAtTarget);
        assert_eq!(driver.read_lid_status().await.unwrap(), TemperatureStatus::Idle);
        assert_eq!(driver.handle().block_volume(), Some(50.0));
    }
}
