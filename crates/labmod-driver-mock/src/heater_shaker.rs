//! Simulated heater-shaker.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use labmod_core::driver::HeaterShakerDriver;
use labmod_core::status::{LatchStatus, SpeedStatus, TemperatureStatus};
use parking_lot::Mutex;

use crate::axis::{Motion, SpeedAxis, TemperatureAxis};
use crate::{CommandLog, DEFAULT_SETTLE_POLLS};

/// Reads as the current plate temperature until a target has been set.
pub const SIMULATED_AMBIENT: f64 = 23.0;

#[derive(Debug)]
struct State {
    plate: TemperatureAxis,
    shaker: SpeedAxis,
    latch: Motion<LatchStatus>,
    stalled: bool,
    shaker_pinned: bool,
}

/// Simulated heater-shaker.
///
/// The latch reads `idle_unknown` after power-up, like the real firmware,
/// regardless of whether it is physically closed.
#[derive(Debug)]
pub struct SimHeaterShaker {
    state: Arc<Mutex<State>>,
    log: CommandLog,
}

/// Inspection and fault-injection handle for a [`SimHeaterShaker`].
#[derive(Debug, Clone)]
pub struct SimHeaterShakerHandle {
    state: Arc<Mutex<State>>,
    log: CommandLog,
}

impl SimHeaterShaker {
    pub fn new() -> Self {
        Self::with_settle_polls(DEFAULT_SETTLE_POLLS)
    }

    pub fn with_settle_polls(settle_polls: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                plate: TemperatureAxis::new(SIMULATED_AMBIENT, settle_polls),
                shaker: SpeedAxis::new(settle_polls),
                latch: Motion::new(LatchStatus::IdleUnknown, settle_polls),
                stalled: false,
                shaker_pinned: false,
            })),
            log: CommandLog::new(),
        }
    }

    pub fn handle(&self) -> SimHeaterShakerHandle {
        SimHeaterShakerHandle {
            state: Arc::clone(&self.state),
            log: self.log.clone(),
        }
    }
}

impl Default for SimHeaterShaker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHeaterShakerHandle {
    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn stall(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// Pin the shake axis to `status`, as if the plate were spinning on its own.
    pub fn force_speed_status(&self, status: SpeedStatus) {
        let mut state = self.state.lock();
        state.shaker.status = status;
        state.shaker_pinned = true;
    }

    /// Pin the latch to `status`.
    pub fn force_latch_status(&self, status: LatchStatus) {
        self.state.lock().latch = Motion::new(status, 0);
    }
}

#[async_trait]
impl HeaterShakerDriver for SimHeaterShaker {
    async fn set_temperature(&self, celsius: f64) -> Result<()> {
        self.log.record(format!("set_temperature({})", celsius));
        self.state.lock().plate.set_target(celsius);
        Ok(())
    }

    async fn set_speed(&self, rpm: u32) -> Result<()> {
        self.log.record(format!("set_speed({})", rpm));
        self.state.lock().shaker.set_target(rpm);
        Ok(())
    }

    async fn deactivate_heater(&self) -> Result<()> {
        self.log.record("deactivate_heater()");
        self.state.lock().plate.deactivate();
        Ok(())
    }

    async fn deactivate_shaker(&self) -> Result<()> {
        self.log.record("deactivate_shaker()");
        self.state.lock().shaker.deactivate();
        Ok(())
    }

    async fn open_latch(&self) -> Result<()> {
        self.log.record("open_latch()");
        self.state
            .lock()
            .latch
            .start(LatchStatus::Opening, LatchStatus::IdleOpen);
        Ok(())
    }

    async fn close_latch(&self) -> Result<()> {
        self.log.record("close_latch()");
        self.state
            .lock()
            .latch
            .start(LatchStatus::Closing, LatchStatus::IdleClosed);
        Ok(())
    }

    async fn read_temperature_status(&self) -> Result<TemperatureStatus> {
        let mut state = self.state.lock();
        let stalled = state.stalled;
        Ok(state.plate.poll(stalled))
    }

    async fn read_speed_status(&self) -> Result<SpeedStatus> {
        let mut state = self.state.lock();
        let stalled = state.stalled || state.shaker_pinned;
        Ok(state.shaker.poll(stalled))
    }

    async fn read_latch_status(&self) -> Result<LatchStatus> {
        let mut state = self.state.lock();
        let stalled = state.stalled;
        Ok(state.latch.poll(stalled))
    }

    async fn read_temperature(&self) -> Result<f64> {
        Ok(self.state.lock().plate.current)
    }

    async fn read_speed(&self) -> Result<u32> {
        Ok(self.state.lock().shaker.current)
    }
}
