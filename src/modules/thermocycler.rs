//! Thermocycler: lid motion, well block and heated lid.
//!
//! The three axes are independent. Nothing here stops a caller from opening
//! the lid mid-profile.

use std::time::Duration;

use async_trait::async_trait;
use labmod_core::driver::ThermocyclerDriver;
use labmod_core::events::Command;
use labmod_core::limits::{
    ensure_hold_time_seconds, hold_duration, validate_block_max_volume, validate_block_temperature,
    validate_lid_temperature,
};
use labmod_core::model::ModuleKind;
use labmod_core::observable::Observable;
use labmod_core::status::{LidPosition, TemperatureStatus};
use labmod_core::wait::{self, poll_until};
use labmod_core::{ModuleError, ModuleResult};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;
use tracing::info;

use crate::context::ModuleContext;
use crate::gate::Operation;
use crate::profile::{
    validate_profile, BlockTemperatureControl, ProfileProgress, ProfileRunner, ProfileStep, ThermocyclerStep,
};

#[derive(Debug, Clone, Copy)]
struct Hold {
    until: Instant,
}

pub struct Thermocycler {
    ctx: ModuleContext,
    driver: Box<dyn ThermocyclerDriver>,
    block_target: Observable<Option<f64>>,
    lid_target: Observable<Option<f64>>,
    hold: Mutex<Option<Hold>>,
    progress: Observable<ProfileProgress>,
}

impl std::fmt::Debug for Thermocycler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thermocycler")
            .field("ctx", &self.ctx)
            .field("block_target", &self.block_target.get())
            .field("lid_target", &self.lid_target.get())
            .field("progress", &self.progress.get())
            .finish()
    }
}

impl Thermocycler {
    pub fn new(ctx: ModuleContext, driver: Box<dyn ThermocyclerDriver>) -> ModuleResult<Self> {
        super::ensure_kind(&ctx, ModuleKind::Thermocycler)?;
        ctx.require(Operation::LoadModule(ModuleKind::Thermocycler))?;
        Ok(Self {
            ctx,
            driver,
            block_target: Observable::new("block_target_temperature", None).with_units("°C"),
            lid_target: Observable::new("lid_target_temperature", None).with_units("°C"),
            hold: Mutex::new(None),
            progress: Observable::new("profile_progress", ProfileProgress::default()),
        })
    }

    pub fn context(&self) -> &ModuleContext {
        &self.ctx
    }

    // ========================================================================
    // Lid motion
    // ========================================================================

    pub async fn open_lid(&self) -> ModuleResult<LidPosition> {
        self.ctx.require(Operation::ThermocyclerOpenLid)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.THERMOCYCLER_OPEN",
            "Opening Thermocycler lid",
            json!({}),
        ));
        let result = async {
            self.driver.open_lid().await?;
            self.wait_for_lid().await
        }
        .await;
        scope.finish(result)
    }

    pub async fn close_lid(&self) -> ModuleResult<LidPosition> {
        self.ctx.require(Operation::ThermocyclerCloseLid)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.THERMOCYCLER_CLOSE",
            "Closing Thermocycler lid",
            json!({}),
        ));
        let result = async {
            self.driver.close_lid().await?;
            self.wait_for_lid().await
        }
        .await;
        scope.finish(result)
    }

    async fn wait_for_lid(&self) -> ModuleResult<LidPosition> {
        let driver = self.driver.as_ref();
        let position = poll_until(
            &self.ctx.wait_policy(),
            "thermocycler lid to stop moving",
            move || driver.read_lid_position(),
            |position| position.is_settled(),
        )
        .await?;
        info!(module = self.ctx.id(), %position, "lid settled");
        Ok(position)
    }

    // ========================================================================
    // Block and lid temperature
    // ========================================================================

    /// Reach `celsius` on the block, then hold for `seconds + 60 * minutes`.
    pub async fn set_block_temperature(
        &self,
        celsius: f64,
        hold_time_seconds: Option<f64>,
        hold_time_minutes: Option<f64>,
        block_max_volume: Option<f64>,
    ) -> ModuleResult<()> {
        self.ctx.require(Operation::ThermocyclerSetBlockTarget)?;
        let celsius = validate_block_temperature(celsius)?;
        let hold = ensure_hold_time_seconds(hold_time_seconds, hold_time_minutes)?;
        let volume = validate_block_max_volume(block_max_volume)?;

        let mut text = format!("Setting Thermocycler well block temperature to {} °C", celsius);
        if hold > 0.0 {
            text.push_str(&format!(" with a hold time of {} seconds", hold));
        }
        let scope = self.ctx.envelope().begin(Command::new(
            "command.THERMOCYCLER_SET_BLOCK_TEMP",
            text,
            json!({
                "temperature": celsius,
                "hold_time_seconds": hold,
                "block_max_volume": volume,
            }),
        ));
        let result = self.drive_block(celsius, hold, volume).await;
        scope.finish(result)
    }

    /// Reach `celsius` on the heated lid. There is no hold.
    pub async fn set_lid_temperature(&self, celsius: f64) -> ModuleResult<()> {
        self.ctx.require(Operation::ThermocyclerSetLidTarget)?;
        let celsius = validate_lid_temperature(celsius)?;

        let scope = self.ctx.envelope().begin(Command::new(
            "command.THERMOCYCLER_SET_LID_TEMP",
            format!("Setting Thermocycler lid temperature to {} °C", celsius),
            json!({ "temperature": celsius }),
        ));
        let result = async {
            self.driver.set_lid_temperature(celsius).await?;
            self.lid_target.set(Some(celsius));
            let driver = self.driver.as_ref();
            poll_until(
                &self.ctx.wait_policy(),
                "thermocycler lid to reach target",
                move || driver.read_lid_status(),
                |status| *status == TemperatureStatus::HoldingAtTarget,
            )
            .await?;
            info!(module = self.ctx.id(), celsius, "lid at temperature");
            Ok::<_, ModuleError>(())
        }
        .await;
        scope.finish(result)
    }

    /// Run `steps` `repetitions` times. Every step is validated before the first command.
    pub async fn execute_profile(
        &self,
        steps: &[ThermocyclerStep],
        repetitions: u32,
        block_max_volume: Option<f64>,
    ) -> ModuleResult<()> {
        self.ctx.require(Operation::ThermocyclerExecuteProfile)?;
        let validated = validate_profile(steps, repetitions)?;
        let volume = validate_block_max_volume(block_max_volume)?;

        let scope = self.ctx.envelope().begin(Command::new(
            "command.THERMOCYCLER_EXECUTE_PROFILE",
            format!(
                "Thermocycler starting {} repetitions of cycle composed of the following steps: {}",
                repetitions,
                describe_steps(&validated)
            ),
            json!({
                "steps": validated,
                "repetitions": repetitions,
                "block_max_volume": volume,
            }),
        ));
        let result = ProfileRunner::new(self, &self.progress)
            .run(&validated, repetitions, volume)
            .await;
        scope.finish(result)
    }

    pub async fn deactivate_lid(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::ThermocyclerDeactivateLid)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.THERMOCYCLER_DEACTIVATE_LID",
            "Deactivating Thermocycler lid heating",
            json!({}),
        ));
        let result = self.stop_lid().await;
        scope.finish(result)
    }

    pub async fn deactivate_block(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::ThermocyclerDeactivateBlock)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.THERMOCYCLER_DEACTIVATE_BLOCK",
            "Deactivating Thermocycler well block heating",
            json!({}),
        ));
        let result = self.stop_block().await;
        scope.finish(result)
    }

    /// Turn off both the block and the lid heater.
    pub async fn deactivate(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::ThermocyclerDeactivate)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.THERMOCYCLER_DEACTIVATE",
            "Deactivating Thermocycler",
            json!({}),
        ));
        let result = async {
            self.stop_lid().await?;
            self.stop_block().await
        }
        .await;
        scope.finish(result)
    }

    async fn stop_lid(&self) -> ModuleResult<()> {
        self.driver.deactivate_lid().await?;
        self.lid_target.set(None);
        info!(module = self.ctx.id(), "lid heater off");
        Ok(())
    }

    async fn stop_block(&self) -> ModuleResult<()> {
        self.driver.deactivate_block().await?;
        self.block_target.set(None);
        *self.hold.lock() = None;
        info!(module = self.ctx.id(), "block heater off");
        Ok(())
    }

    async fn drive_block(&self, celsius: f64, hold_seconds: f64, volume_ul: f64) -> ModuleResult<()> {
        let hold = hold_duration(hold_seconds)?;
        hold_deadline(hold)?;
        self.driver.set_block_temperature(celsius, volume_ul).await?;
        self.block_target.set(Some(celsius));
        *self.hold.lock() = None;

        let driver = self.driver.as_ref();
        poll_until(
            &self.ctx.wait_policy(),
            "thermocycler block to reach target",
            move || driver.read_block_status(),
            |status| *status == TemperatureStatus::HoldingAtTarget,
        )
        .await?;
        info!(module = self.ctx.id(), celsius, hold_seconds, "block at temperature");

        if hold_seconds > 0.0 {
            *self.hold.lock() = Some(Hold {
                until: hold_deadline(hold)?,
            });
            wait::hold(hold_seconds).await;
        }
        Ok(())
    }

    // ========================================================================
    // State accessors
    // ========================================================================

    pub async fn lid_position(&self) -> ModuleResult<LidPosition> {
        self.ctx.require(Operation::ThermocyclerRead)?;
        Ok(self.driver.read_lid_position().await?)
    }

    pub async fn block_temperature(&self) -> ModuleResult<Option<f64>> {
        self.ctx.require(Operation::ThermocyclerRead)?;
        Ok(self.driver.read_block_temperature().await?)
    }

    pub async fn block_temperature_status(&self) -> ModuleResult<TemperatureStatus> {
        self.ctx.require(Operation::ThermocyclerRead)?;
        Ok(self.driver.read_block_status().await?)
    }

    pub fn block_target_temperature(&self) -> Option<f64> {
        self.block_target.get()
    }

    pub async fn lid_temperature(&self) -> ModuleResult<Option<f64>> {
        self.ctx.require(Operation::ThermocyclerRead)?;
        Ok(self.driver.read_lid_temperature().await?)
    }

    pub async fn lid_temperature_status(&self) -> ModuleResult<TemperatureStatus> {
        self.ctx.require(Operation::ThermocyclerRead)?;
        Ok(self.driver.read_lid_status().await?)
    }

    pub fn lid_target_temperature(&self) -> Option<f64> {
        self.lid_target.get()
    }

    /// Block ramp rate in °C/s while the block is moving.
    pub async fn ramp_rate(&self) -> ModuleResult<Option<f64>> {
        self.ctx.require(Operation::ThermocyclerRead)?;
        Ok(self.driver.read_ramp_rate().await?)
    }

    /// Seconds left in the current block hold, `None` if no hold was started.
    pub fn hold_time(&self) -> Option<f64> {
        self.hold
            .lock()
            .map(|hold| hold.until.saturating_duration_since(Instant::now()).as_secs_f64())
    }

    pub fn progress(&self) -> ProfileProgress {
        self.progress.get()
    }

    pub fn progress_observable(&self) -> &Observable<ProfileProgress> {
        &self.progress
    }

    pub fn total_cycle_count(&self) -> Option<u32> {
        self.progress.get().total_cycle_count
    }

    pub fn current_cycle_index(&self) -> Option<u32> {
        self.progress.get().current_cycle_index
    }

    pub fn total_step_count(&self) -> Option<u32> {
        self.progress.get().total_step_count
    }

    pub fn current_step_index(&self) -> Option<u32> {
        self.progress.get().current_step_index
    }
}

#[async_trait]
impl BlockTemperatureControl for Thermocycler {
    async fn reach_and_hold(&self, celsius: f64, hold_seconds: f64, volume_ul: f64) -> ModuleResult<()> {
        self.drive_block(celsius, hold_seconds, volume_ul).await
    }
}

fn hold_deadline(hold: Duration) -> ModuleResult<Instant> {
    Instant::now().checked_add(hold).ok_or_else(|| {
        ModuleError::Validation(format!("hold time of {} seconds is too long", hold.as_secs_f64()))
    })
}

fn describe_steps(steps: &[ProfileStep]) -> String {
    steps
        .iter()
        .map(|s| format!("{} °C for {} s", s.temperature, s.hold_time_seconds))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::test_support::{context, TEST_VERSION};
    use labmod_core::events::RecordingSink;
    use labmod_core::model::ModuleModel;
    use labmod_driver_mock::{SimThermocycler, SimThermocyclerHandle};

    fn thermocycler(sink: &RecordingSink) -> (Thermocycler, SimThermocyclerHandle) {
        let driver = SimThermocycler::new();
        let handle = driver.handle();
        let ctx = context(TEST_VERSION, sink, ModuleModel::ThermocyclerV1);
        (Thermocycler::new(ctx, Box::new(driver)).unwrap(), handle)
    }

    #[tokio::test(start_paused = true)]
    async fn lid_reports_settled_position() {
        let (tc, _) = thermocycler(&RecordingSink::new());
        assert_eq!(tc.lid_position().await.unwrap(), LidPosition::Unknown);
        assert_eq!(tc.open_lid().await.unwrap(), LidPosition::Open);
        assert_eq!(tc.close_lid().await.unwrap(), LidPosition::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn block_hold_is_additive() {
        let (tc, handle) = thermocycler(&RecordingSink::new());
        let start = Instant::now();
        tc.set_block_temperature(10.0, Some(30.0), Some(1.0), Some(50.0))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(90));
        assert!(start.elapsed() < Duration::from_secs(91));
        assert_eq!(tc.hold_time(), Some(0.0));
        assert_eq!(handle.block_volume(), Some(50.0));
        assert_eq!(tc.block_target_temperature(), Some(10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn no_hold_returns_at_temperature() {
        let (tc, handle) = thermocycler(&RecordingSink::new());
        let start = Instant::now();
        tc.set_block_temperature(95.0, None, None, None).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(tc.hold_time(), None);
        assert_eq!(handle.block_volume(), Some(25.0));
    }

    #[tokio::test(start_paused = true)]
    async fn lid_heats_without_touching_block() {
        let (tc, handle) = thermocycler(&RecordingSink::new());
        tc.set_lid_temperature(105.0).await.unwrap();
        assert_eq!(tc.lid_target_temperature(), Some(105.0));
        assert_eq!(tc.block_target_temperature(), None);
        assert_eq!(handle.log().calls(), vec!["set_lid_temperature(105)"]);
    }

    #[tokio::test]
    async fn invalid_inputs_touch_nothing() {
        let sink = RecordingSink::new();
        let (tc, handle) = thermocycler(&sink);
        assert!(tc.set_block_temperature(100.0, None, None, None).await.is_err());
        assert!(tc.set_block_temperature(50.0, Some(-1.0), None, None).await.is_err());
        assert!(tc.set_block_temperature(50.0, None, None, Some(150.0)).await.is_err());
        assert!(tc.set_lid_temperature(30.0).await.is_err());
        assert!(handle.log().is_empty());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn oversized_hold_is_rejected_before_heating() {
        let sink = RecordingSink::new();
        let (tc, handle) = thermocycler(&sink);

        let err = tc.set_block_temperature(40.0, None, Some(1e300), None).await.unwrap_err();
        assert!(matches!(err, ModuleError::Validation(_)));
        let err = tc.set_block_temperature(40.0, Some(f64::MAX), None, None).await.unwrap_err();
        assert!(matches!(err, ModuleError::Validation(_)));
        let err = tc
            .execute_profile(&[ThermocyclerStep::new(95.0).seconds(f64::MAX)], 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::Validation(_)));

        assert!(handle.log().is_empty());
        assert!(sink.events().is_empty());
        assert_eq!(tc.block_target_temperature(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_text_uses_resolved_holds() {
        let sink = RecordingSink::new();
        let (tc, _) = thermocycler(&sink);
        let steps = [
            ThermocyclerStep::new(95.0).seconds(10.0),
            ThermocyclerStep::new(60.0).seconds(30.0).minutes(0.5),
        ];
        tc.execute_profile(&steps, 1, None).await.unwrap();

        let before = &sink.events()[0];
        assert_eq!(
            before.text,
            "Thermocycler starting 1 repetitions of cycle composed of the following steps: \
             95 °C for 10 s, 60 °C for 60 s"
        );
        assert_eq!(before.arguments["steps"][1]["hold_time_seconds"], 60.0);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_progress_is_one_based() {
        let sink = RecordingSink::new();
        let (tc, handle) = thermocycler(&sink);
        assert_eq!(tc.progress(), ProfileProgress::default());

        tc.execute_profile(&[ThermocyclerStep::new(10.0).seconds(5.0)], 3, None)
            .await
            .unwrap();

        assert_eq!(handle.log().count("set_block_temperature"), 3);
        assert_eq!(tc.current_cycle_index(), Some(3));
        assert_eq!(tc.current_step_index(), Some(1));
        assert_eq!(tc.total_cycle_count(), Some(3));
        assert_eq!(tc.total_step_count(), Some(1));
        // One event pair for the whole profile.
        assert_eq!(sink.events().len(), 2);
    }

    #[tokio::test]
    async fn profile_step_without_hold_issues_nothing() {
        let (tc, handle) = thermocycler(&RecordingSink::new());
        let steps = [ThermocyclerStep::new(95.0).seconds(10.0), ThermocyclerStep::new(55.0)];
        let err = tc.execute_profile(&steps, 3, None).await.unwrap_err();
        assert!(matches!(err, ModuleError::Validation(_)));
        assert!(handle.log().is_empty());
        assert_eq!(tc.progress(), ProfileProgress::default());
    }

    #[tokio::test]
    async fn error_status_is_a_value() {
        let (tc, handle) = thermocycler(&RecordingSink::new());
        handle.force_block_error();
        assert_eq!(tc.block_temperature_status().await.unwrap(), TemperatureStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_stops_both_heaters() {
        let (tc, handle) = thermocycler(&RecordingSink::new());
        tc.set_block_temperature(40.0, None, None, None).await.unwrap();
        tc.set_lid_temperature(100.0).await.unwrap();
        tc.deactivate().await.unwrap();

        assert_eq!(tc.block_target_temperature(), None);
        assert_eq!(tc.lid_target_temperature(), None);
        assert_eq!(tc.block_temperature_status().await.unwrap(), TemperatureStatus::Idle);
        assert_eq!(tc.lid_temperature_status().await.unwrap(), TemperatureStatus::Idle);
        assert_eq!(handle.log().count("deactivate_lid"), 1);
        assert_eq!(handle.log().count("deactivate_block"), 1);
    }
}
