//! Simulated motion collaborator.

use anyhow::Result;
use async_trait::async_trait;
use labmod_core::driver::PipetteMotion;

use crate::CommandLog;

/// Records every retraction request; never moves anything.
#[derive(Debug, Clone, Default)]
pub struct SimPipetteMotion {
    log: CommandLog,
}

impl SimPipetteMotion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }
}

#[async_trait]
impl PipetteMotion for SimPipetteMotion {
    async fn retract_adjacent_pipettes(&self, slot: &str) -> Result<()> {
        self.log
            .record(format!("retract_adjacent_pipettes({})", slot));
        Ok(())
    }
}
