//! Heater-shaker safety interlocks.
//!
//! - The labware latch may only open while the shaker is idle.
//! - The plate may only shake while the latch reports closed.
//! - Pipettes parked next to the module are retracted before shaking and
//!   before opening the latch.
//!
//! The checks read status the caller has just taken from the driver; the
//! guard keeps no state of its own.

use std::sync::Arc;

use labmod_core::driver::PipetteMotion;
use labmod_core::status::{LatchStatus, SpeedStatus};
use labmod_core::{ModuleError, ModuleResult};
use tracing::debug;

pub struct InterlockGuard {
    motion: Arc<dyn PipetteMotion>,
    slot: String,
}

impl std::fmt::Debug for InterlockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterlockGuard").field("slot", &self.slot).finish()
    }
}

impl InterlockGuard {
    pub fn new(motion: Arc<dyn PipetteMotion>, slot: impl Into<String>) -> Self {
        Self {
            motion,
            slot: slot.into(),
        }
    }

    pub fn ensure_latch_may_open(&self, speed: SpeedStatus) -> ModuleResult<()> {
        if speed == SpeedStatus::Idle {
            return Ok(());
        }
        Err(ModuleError::InterlockViolation(format!(
            "cannot open the labware latch while the shaker is {} (slot {})",
            speed, self.slot
        )))
    }

    pub fn ensure_may_shake(&self, latch: LatchStatus) -> ModuleResult<()> {
        if latch == LatchStatus::IdleClosed {
            return Ok(());
        }
        Err(ModuleError::InterlockViolation(format!(
            "cannot shake while the labware latch is {}; close it first (slot {})",
            latch, self.slot
        )))
    }

    pub async fn clear_adjacent_pipettes(&self) -> ModuleResult<()> {
        debug!(slot = %self.slot, "retracting adjacent pipettes");
        self.motion.retract_adjacent_pipettes(&self.slot).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labmod_driver_mock::SimPipetteMotion;

    fn guard() -> (InterlockGuard, SimPipetteMotion) {
        let motion = SimPipetteMotion::new();
        (InterlockGuard::new(Arc::new(motion.clone()), "1"), motion)
    }

    #[test]
    fn latch_opens_only_when_idle() {
        let (guard, _) = guard();
        assert!(guard.ensure_latch_may_open(SpeedStatus::Idle).is_ok());
        for status in [
            SpeedStatus::SpeedingUp,
            SpeedStatus::HoldingAtTarget,
            SpeedStatus::SlowingDown,
            SpeedStatus::Error,
        ] {
            assert!(matches!(
                guard.ensure_latch_may_open(status),
                Err(ModuleError::InterlockViolation(_))
            ));
        }
    }

    #[test]
    fn shaking_needs_a_closed_latch() {
        let (guard, _) = guard();
        assert!(guard.ensure_may_shake(LatchStatus::IdleClosed).is_ok());
        assert!(guard.ensure_may_shake(LatchStatus::IdleUnknown).is_err());
        assert!(guard.ensure_may_shake(LatchStatus::IdleOpen).is_err());
    }

    #[tokio::test]
    async fn retracts_for_own_slot() {
        let (guard, motion) = guard();
        guard.clear_adjacent_pipettes().await.unwrap();
        assert_eq!(motion.log().calls(), vec!["retract_adjacent_pipettes(1)"]);
    }
}
