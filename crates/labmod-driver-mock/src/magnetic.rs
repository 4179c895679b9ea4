//! Simulated magnetic module.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use labmod_core::driver::MagneticModuleDriver;
use labmod_core::status::MagneticStatus;
use parking_lot::Mutex;

use crate::CommandLog;

#[derive(Debug)]
struct State {
    status: MagneticStatus,
    height: Option<f64>,
}

/// Simulated magnetic module. Engage and disengage complete immediately.
#[derive(Debug)]
pub struct SimMagneticModule {
    state: Arc<Mutex<State>>,
    log: CommandLog,
}

/// Inspection handle for a [`SimMagneticModule`].
#[derive(Debug, Clone)]
pub struct SimMagneticHandle {
    state: Arc<Mutex<State>>,
    log: CommandLog,
}

impl SimMagneticModule {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                status: MagneticStatus::Disengaged,
                height: None,
            })),
            log: CommandLog::new(),
        }
    }

    pub fn handle(&self) -> SimMagneticHandle {
        SimMagneticHandle {
            state: Arc::clone(&self.state),
            log: self.log.clone(),
        }
    }
}

impl Default for SimMagneticModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SimMagneticHandle {
    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Height last sent to the firmware, in the firmware's own unit.
    pub fn engaged_height(&self) -> Option<f64> {
        self.state.lock().height
    }
}

#[async_trait]
impl MagneticModuleDriver for SimMagneticModule {
    async fn engage(&self, height: f64) -> Result<()> {
        self.log.record(format!("engage({})", height));
        let mut state = self.state.lock();
        state.status = MagneticStatus::Engaged;
        state.height = Some(height);
        Ok(())
    }

    async fn disengage(&self) -> Result<()> {
        self.log.record("disengage()");
        let mut state = self.state.lock();
        state.status = MagneticStatus::Disengaged;
        state.height = None;
        Ok(())
    }

    async fn calibrate(&self) -> Result<()> {
        self.log.record("calibrate()");
        Ok(())
    }

    async fn read_status(&self) -> Result<MagneticStatus> {
        Ok(self.state.lock().status)
    }
}
