//! Temperature module.
//!
//! ```text
//! idle -> heating | cooling -> holding_at_target
//!   ^__________ deactivate() from any state __|
//! ```

use labmod_core::driver::TemperatureModuleDriver;
use labmod_core::events::Command;
use labmod_core::limits::validate_temperature_module_celsius;
use labmod_core::model::ModuleKind;
use labmod_core::observable::Observable;
use labmod_core::status::TemperatureStatus;
use labmod_core::wait::poll_until;
use labmod_core::{ModuleError, ModuleResult};
use serde_json::json;
use tracing::{info, warn};

use crate::context::ModuleContext;
use crate::gate::Operation;

pub struct TemperatureModule {
    ctx: ModuleContext,
    driver: Box<dyn TemperatureModuleDriver>,
    target: Observable<Option<f64>>,
}

impl std::fmt::Debug for TemperatureModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemperatureModule")
            .field("ctx", &self.ctx)
            .field("target", &self.target.get())
            .finish()
    }
}

impl TemperatureModule {
    pub fn new(ctx: ModuleContext, driver: Box<dyn TemperatureModuleDriver>) -> ModuleResult<Self> {
        super::ensure_kind(&ctx, ModuleKind::Temperature)?;
        ctx.require(Operation::LoadModule(ModuleKind::Temperature))?;
        Ok(Self {
            ctx,
            driver,
            target: Observable::new("target_temperature", None).with_units("°C"),
        })
    }

    pub fn context(&self) -> &ModuleContext {
        &self.ctx
    }

    /// Set the target and wait until the module is holding at it.
    pub async fn set_target_and_block(&self, celsius: f64) -> ModuleResult<()> {
        self.ctx.require(Operation::TemperatureSetTargetAndBlock)?;
        let celsius = validate_temperature_module_celsius(celsius)?;

        let scope = self.ctx.envelope().begin(set_temp_command(celsius));
        let result = async {
            self.start(celsius).await?;
            self.wait_for_hold().await
        }
        .await;
        scope.finish(result)
    }

    /// Set the target and return without waiting.
    pub async fn set_target_nonblocking(&self, celsius: f64) -> ModuleResult<()> {
        self.ctx.require(Operation::TemperatureSetTargetNonblocking)?;
        let celsius = validate_temperature_module_celsius(celsius)?;

        let scope = self.ctx.envelope().begin(set_temp_command(celsius));
        let result = self.start(celsius).await;
        scope.finish(result)
    }

    /// Wait until the module is holding at its current target.
    ///
    /// Does not set a target. If none was ever set this waits until the
    /// run's wait ceiling and then fails with `HardwareTimeout`.
    pub async fn await_target(&self, celsius: f64) -> ModuleResult<()> {
        self.ctx.require(Operation::TemperatureAwaitTarget)?;
        let celsius = validate_temperature_module_celsius(celsius)?;
        match self.target.get() {
            Some(target) if target != celsius => warn!(
                module = self.ctx.id(),
                requested = celsius,
                current_target = target,
                "awaiting a temperature other than the current target"
            ),
            None => warn!(module = self.ctx.id(), "awaiting temperature with no target set"),
            _ => {}
        }

        let scope = self.ctx.envelope().begin(Command::new(
            "command.TEMPDECK_AWAIT_TEMP",
            format!("Waiting for Temperature Module to reach temperature {} °C", celsius),
            json!({ "celsius": celsius }),
        ));
        let result = self.wait_for_hold().await;
        scope.finish(result)
    }

    pub async fn deactivate(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::TemperatureDeactivate)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.TEMPDECK_DEACTIVATE",
            "Deactivating Temperature Module",
            json!({}),
        ));
        let result = async {
            self.driver.deactivate().await?;
            self.target.set(None);
            info!(module = self.ctx.id(), "temperature module deactivated");
            Ok::<_, ModuleError>(())
        }
        .await;
        scope.finish(result)
    }

    /// Current temperature in °C.
    pub async fn temperature(&self) -> ModuleResult<f64> {
        self.ctx.require(Operation::TemperatureRead)?;
        Ok(self.driver.read_temperature().await?)
    }

    /// Most recent target, or `None` after deactivation.
    pub fn target(&self) -> Option<f64> {
        self.target.get()
    }

    pub fn target_observable(&self) -> &Observable<Option<f64>> {
        &self.target
    }

    pub async fn status(&self) -> ModuleResult<TemperatureStatus> {
        self.ctx.require(Operation::TemperatureStatus)?;
        Ok(self.driver.read_status().await?)
    }

    async fn start(&self, celsius: f64) -> ModuleResult<()> {
        self.driver.set_temperature(celsius).await?;
        self.target.set(Some(celsius));
        info!(module = self.ctx.id(), celsius, "temperature target set");
        Ok(())
    }

    async fn wait_for_hold(&self) -> ModuleResult<()> {
        let driver = self.driver.as_ref();
        poll_until(
            &self.ctx.wait_policy(),
            "temperature module to reach target",
            move || driver.read_status(),
            |status| *status == TemperatureStatus::HoldingAtTarget,
        )
        .await?;
        Ok(())
    }
}

fn set_temp_command(celsius: f64) -> Command {
    Command::new(
        "command.TEMPDECK_SET_TEMP",
        format!("Setting Temperature Module temperature to {} °C", celsius),
        json!({ "celsius": celsius }),
    )
}
