//! Common fixtures for rust-labmod integration tests
//!
//! This module provides:
//! - A simulated deck that builds modules while keeping their driver handles
//! - Event timeline helpers over a [`RecordingSink`]
//! - Timing assertions for tests that run on paused tokio time

#![allow(dead_code)] // Not every test file uses every fixture

use std::sync::Arc;
use std::time::Duration;

use labmod_core::events::{CommandEvent, CommandPhase, RecordingSink};
use labmod_core::model::ModuleModel;
use labmod_core::wait::WaitPolicy;
use labmod_core::ApiVersion;
use labmod_driver_mock::{
    SimHeaterShaker, SimHeaterShakerHandle, SimLabwareDefaults, SimMagneticHandle, SimMagneticModule,
    SimPipetteMotion, SimTemperatureHandle, SimTemperatureModule, SimThermocycler, SimThermocyclerHandle,
};
use rust_labmod::{
    HeaterShaker, MagneticModule, ModuleContext, RunContext, TemperatureModule, Thermocycler,
};

/// Newest API version every module operation is available at.
pub const LATEST: ApiVersion = ApiVersion::new(2, 13);

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// One run's worth of collaborators, with the sinks kept for inspection.
pub struct Deck {
    pub run: RunContext,
    pub events: RecordingSink,
    pub motion: SimPipetteMotion,
}

impl Deck {
    pub fn new(version: ApiVersion) -> Self {
        Self::with_timeout(version, WAIT_TIMEOUT)
    }

    pub fn with_timeout(version: ApiVersion, timeout: Duration) -> Self {
        let events = RecordingSink::new();
        let motion = SimPipetteMotion::new();
        let run = RunContext::builder(version)
            .sink(Arc::new(events.clone()))
            .wait_policy(WaitPolicy::new(POLL_INTERVAL, timeout))
            .labware_defaults(Arc::new(SimLabwareDefaults::with_standard_definitions()))
            .pipette_motion(Arc::new(motion.clone()))
            .build()
            .expect("test run context");
        Self { run, events, motion }
    }

    fn context(&self, model: ModuleModel, slot: &str) -> ModuleContext {
        ModuleContext::new(&self.run, format!("{}-{}", model.kind(), slot), model, model, slot)
            .expect("test module context")
    }

    pub fn temperature_module(&self) -> (TemperatureModule, SimTemperatureHandle) {
        let driver = SimTemperatureModule::new();
        let handle = driver.handle();
        let ctx = self.context(ModuleModel::TemperatureV2, "1");
        (TemperatureModule::new(ctx, Box::new(driver)).expect("temperature module"), handle)
    }

    pub fn magnetic_module(&self, model: ModuleModel) -> (MagneticModule, SimMagneticHandle) {
        let driver = SimMagneticModule::new();
        let handle = driver.handle();
        let ctx = self.context(model, "3");
        (MagneticModule::new(ctx, Box::new(driver)).expect("magnetic module"), handle)
    }

    pub fn thermocycler(&self) -> (Thermocycler, SimThermocyclerHandle) {
        let driver = SimThermocycler::new();
        let handle = driver.handle();
        let ctx = self.context(ModuleModel::ThermocyclerV1, "7");
        (Thermocycler::new(ctx, Box::new(driver)).expect("thermocycler"), handle)
    }

    pub fn heater_shaker(&self) -> (HeaterShaker, SimHeaterShakerHandle) {
        let driver = SimHeaterShaker::new();
        let handle = driver.handle();
        let ctx = self.context(ModuleModel::HeaterShakerV1, "4");
        (HeaterShaker::new(ctx, Box::new(driver)).expect("heater-shaker"), handle)
    }

    /// Command names of every recorded event, in emission order.
    pub fn event_names(&self) -> Vec<String> {
        self.events.events().into_iter().map(|e| e.name).collect()
    }

    /// Events with the given command name.
    pub fn events_named(&self, name: &str) -> Vec<CommandEvent> {
        self.events
            .events()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }
}

/// Assert every `Before` event is followed by exactly one `After` with the
/// same id, and that pairs never interleave.
pub fn assert_well_bracketed(events: &[CommandEvent]) {
    assert!(
        events.len() % 2 == 0,
        "odd number of events: {:?}",
        events.iter().map(|e| (&e.name, e.phase)).collect::<Vec<_>>()
    );
    for pair in events.chunks(2) {
        let (before, after) = (&pair[0], &pair[1]);
        assert_eq!(before.phase, CommandPhase::Before, "{} opened with {:?}", before.name, before.phase);
        assert_eq!(after.phase, CommandPhase::After, "{} closed with {:?}", after.name, after.phase);
        assert_eq!(before.id, after.id, "{} before/after ids differ", before.name);
        assert_eq!(before.name, after.name);
    }
}

/// Assert that `actual` is no shorter than `expected` and no longer than
/// `expected + slack`.
///
/// With `start_paused = true` time only moves when every task is idle, so
/// holds are exact and the only slack is the polling interval.
pub fn assert_elapsed_at_least(actual: Duration, expected: Duration, slack: Duration, context: &str) {
    assert!(
        actual >= expected && actual <= expected + slack,
        "{}: expected {:?} (+{:?} slack), got {:?}",
        context,
        expected,
        slack,
        actual
    );
}
