//! Heater-shaker: heated plate, orbital shaker and labware latch.
//!
//! Heater and shaker are independent; turning one off never touches the
//! other. Shake and latch commands go through the [`InterlockGuard`].

use labmod_core::driver::HeaterShakerDriver;
use labmod_core::events::Command;
use labmod_core::limits::{validate_heater_shaker_speed, validate_heater_shaker_temperature};
use labmod_core::model::ModuleKind;
use labmod_core::observable::Observable;
use labmod_core::status::{LatchStatus, SpeedStatus, TemperatureStatus};
use labmod_core::wait::poll_until;
use labmod_core::{ModuleError, ModuleResult};
use serde_json::json;
use tracing::info;

use crate::context::ModuleContext;
use crate::gate::Operation;
use crate::interlock::InterlockGuard;

pub struct HeaterShaker {
    ctx: ModuleContext,
    driver: Box<dyn HeaterShakerDriver>,
    interlock: InterlockGuard,
    target_temperature: Observable<Option<f64>>,
    target_speed: Observable<Option<u32>>,
}

impl std::fmt::Debug for HeaterShaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaterShaker")
            .field("ctx", &self.ctx)
            .field("target_temperature", &self.target_temperature.get())
            .field("target_speed", &self.target_speed.get())
            .finish()
    }
}

impl HeaterShaker {
    /// Requires API 2.13 and a pipette motion collaborator on the run.
    pub fn new(ctx: ModuleContext, driver: Box<dyn HeaterShakerDriver>) -> ModuleResult<Self> {
        super::ensure_kind(&ctx, ModuleKind::HeaterShaker)?;
        ctx.require(Operation::LoadModule(ModuleKind::HeaterShaker))?;
        let motion = ctx.run().pipette_motion().ok_or_else(|| {
            ModuleError::Config(format!(
                "heater-shaker '{}' needs a pipette motion collaborator",
                ctx.id()
            ))
        })?;
        Ok(Self {
            interlock: InterlockGuard::new(motion, ctx.slot()),
            ctx,
            driver,
            target_temperature: Observable::new("target_temperature", None).with_units("°C"),
            target_speed: Observable::new("target_speed", None).with_units("rpm"),
        })
    }

    pub fn context(&self) -> &ModuleContext {
        &self.ctx
    }

    // ========================================================================
    // Heater
    // ========================================================================

    /// Set the plate target and return. The value is truncated to 0.01 °C.
    pub async fn set_target_temperature(&self, celsius: f64) -> ModuleResult<()> {
        self.ctx.require(Operation::HeaterShakerSetTargetNonblocking)?;
        let celsius = validate_heater_shaker_temperature(celsius)?;

        let scope = self.ctx.envelope().begin(Command::new(
            "command.HEATER_SHAKER_SET_TARGET_TEMPERATURE",
            format!("Setting Target Temperature of Heater-Shaker to {} °C", celsius),
            json!({ "celsius": celsius }),
        ));
        let result = async {
            self.driver.set_temperature(celsius).await?;
            self.target_temperature.set(Some(celsius));
            info!(module = self.ctx.id(), celsius, "heater-shaker target set");
            Ok::<_, ModuleError>(())
        }
        .await;
        scope.finish(result)
    }

    /// Wait for the plate to hold at its target. Fails if no target was ever set.
    pub async fn wait_for_temperature(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::HeaterShakerWaitForTarget)?;
        let Some(target) = self.target_temperature.get() else {
            return Err(ModuleError::NoTargetSet(format!(
                "set a target temperature on {} before waiting for it",
                self.ctx.id()
            )));
        };

        let scope = self.ctx.envelope().begin(Command::new(
            "command.HEATER_SHAKER_WAIT_FOR_TEMPERATURE",
            "Waiting for Heater-Shaker to reach target temperature",
            json!({ "celsius": target }),
        ));
        let driver = self.driver.as_ref();
        let result = poll_until(
            &self.ctx.wait_policy(),
            "heater-shaker to reach target temperature",
            move || driver.read_temperature_status(),
            |status| *status == TemperatureStatus::HoldingAtTarget,
        )
        .await
        .map(|_| ());
        scope.finish(result)
    }

    /// Set the plate target, then wait for it. Emits both commands' events.
    pub async fn set_and_wait_for_temperature(&self, celsius: f64) -> ModuleResult<()> {
        self.ctx.require(Operation::HeaterShakerSetTargetAndBlock)?;
        self.set_target_temperature(celsius).await?;
        self.wait_for_temperature().await
    }

    pub async fn deactivate_heater(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::HeaterShakerDeactivateHeater)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.HEATER_SHAKER_DEACTIVATE_HEATER",
            "Deactivating heater",
            json!({}),
        ));
        let result = async {
            self.driver.deactivate_heater().await?;
            self.target_temperature.set(None);
            info!(module = self.ctx.id(), "heater off");
            Ok::<_, ModuleError>(())
        }
        .await;
        scope.finish(result)
    }

    // ========================================================================
    // Shaker and latch
    // ========================================================================

    /// Retract adjacent pipettes, set the shake speed and wait until it holds.
    pub async fn set_and_wait_for_shake_speed(&self, rpm: u32) -> ModuleResult<()> {
        self.ctx.require(Operation::HeaterShakerSetShakeSpeed)?;
        let rpm = validate_heater_shaker_speed(rpm)?;
        let latch = self.driver.read_latch_status().await?;
        self.interlock.ensure_may_shake(latch)?;

        let scope = self.ctx.envelope().begin(Command::new(
            "command.HEATER_SHAKER_SET_AND_WAIT_FOR_SHAKE_SPEED",
            format!("Setting Heater-Shaker to shake at {} rpm and waiting until reached", rpm),
            json!({ "rpm": rpm }),
        ));
        let result = async {
            self.interlock.clear_adjacent_pipettes().await?;
            self.driver.set_speed(rpm).await?;
            self.target_speed.set(Some(rpm));
            let driver = self.driver.as_ref();
            poll_until(
                &self.ctx.wait_policy(),
                "heater-shaker to reach shake speed",
                move || driver.read_speed_status(),
                |status| *status == SpeedStatus::HoldingAtTarget,
            )
            .await?;
            info!(module = self.ctx.id(), rpm, "shaking");
            Ok::<_, ModuleError>(())
        }
        .await;
        scope.finish(result)
    }

    /// Stop shaking and wait for the plate to come to rest.
    pub async fn deactivate_shaker(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::HeaterShakerDeactivateShaker)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.HEATER_SHAKER_DEACTIVATE_SHAKER",
            "Deactivating shaker",
            json!({}),
        ));
        let result = async {
            self.driver.deactivate_shaker().await?;
            self.target_speed.set(None);
            let driver = self.driver.as_ref();
            poll_until(
                &self.ctx.wait_policy(),
                "heater-shaker to stop shaking",
                move || driver.read_speed_status(),
                |status| *status == SpeedStatus::Idle,
            )
            .await?;
            info!(module = self.ctx.id(), "shaker off");
            Ok::<_, ModuleError>(())
        }
        .await;
        scope.finish(result)
    }

    /// Open the latch. Refused unless the shaker is idle.
    pub async fn open_labware_latch(&self) -> ModuleResult<LatchStatus> {
        self.ctx.require(Operation::HeaterShakerOpenLatch)?;
        let speed = self.driver.read_speed_status().await?;
        self.interlock.ensure_latch_may_open(speed)?;

        let scope = self.ctx.envelope().begin(Command::new(
            "command.HEATER_SHAKER_OPEN_LABWARE_LATCH",
            "Unlatching labware on Heater-Shaker",
            json!({}),
        ));
        let result = async {
            self.interlock.clear_adjacent_pipettes().await?;
            self.driver.open_latch().await?;
            self.wait_for_latch().await
        }
        .await;
        scope.finish(result)
    }

    /// Close the latch. Always sent, even if the latch already reads closed.
    pub async fn close_labware_latch(&self) -> ModuleResult<LatchStatus> {
        self.ctx.require(Operation::HeaterShakerCloseLatch)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.HEATER_SHAKER_CLOSE_LABWARE_LATCH",
            "Latching labware on Heater-Shaker",
            json!({}),
        ));
        let result = async {
            self.driver.close_latch().await?;
            self.wait_for_latch().await
        }
        .await;
        scope.finish(result)
    }

    async fn wait_for_latch(&self) -> ModuleResult<LatchStatus> {
        let driver = self.driver.as_ref();
        let status = poll_until(
            &self.ctx.wait_policy(),
            "heater-shaker latch to stop moving",
            move || driver.read_latch_status(),
            |status| !matches!(status, LatchStatus::Opening | LatchStatus::Closing),
        )
        .await?;
        info!(module = self.ctx.id(), %status, "latch settled");
        Ok(status)
    }

    // ========================================================================
    // State accessors
    // ========================================================================

    pub async fn current_temperature(&self) -> ModuleResult<f64> {
        self.ctx.require(Operation::HeaterShakerRead)?;
        Ok(self.driver.read_temperature().await?)
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.target_temperature.get()
    }

    pub async fn current_speed(&self) -> ModuleResult<u32> {
        self.ctx.require(Operation::HeaterShakerRead)?;
        Ok(self.driver.read_speed().await?)
    }

    pub fn target_speed(&self) -> Option<u32> {
        self.target_speed.get()
    }

    pub async fn temperature_status(&self) -> ModuleResult<TemperatureStatus> {
        self.ctx.require(Operation::HeaterShakerRead)?;
        Ok(self.driver.read_temperature_status().await?)
    }

    pub async fn speed_status(&self) -> ModuleResult<SpeedStatus> {
        self.ctx.require(Operation::HeaterShakerRead)?;
        Ok(self.driver.read_speed_status().await?)
    }

    pub async fn labware_latch_status(&self) -> ModuleResult<LatchStatus> {
        self.ctx.require(Operation::HeaterShakerRead)?;
        Ok(self.driver.read_latch_status().await?)
    }
}
