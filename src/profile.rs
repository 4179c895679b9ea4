//! Thermocycler profile validation and execution.
//!
//! A profile is a list of [`ThermocyclerStep`]s replayed `repetitions` times.
//! The whole profile is validated up front; a single bad step rejects the
//! call before anything is sent to the block.
//!
//! Progress indices are 1-based and advance after a step's hold completes:
//! after a full run of 3 repetitions of a 2-step profile the progress reads
//! cycle 3, step 2.

use async_trait::async_trait;
use labmod_core::limits::{ensure_hold_time_seconds, validate_block_temperature};
use labmod_core::observable::Observable;
use labmod_core::{ModuleError, ModuleResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One step as supplied by a protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermocyclerStep {
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time_minutes: Option<f64>,
}

impl ThermocyclerStep {
    pub fn new(temperature: f64) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }

    pub fn seconds(mut self, seconds: f64) -> Self {
        self.hold_time_seconds = Some(seconds);
        self
    }

    pub fn minutes(mut self, minutes: f64) -> Self {
        self.hold_time_minutes = Some(minutes);
        self
    }
}

/// A validated step with its hold resolved to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileStep {
    pub temperature: f64,
    pub hold_time_seconds: f64,
}

/// Snapshot of profile progress. All fields are `None` before any profile ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileProgress {
    pub total_cycle_count: Option<u32>,
    pub current_cycle_index: Option<u32>,
    pub total_step_count: Option<u32>,
    pub current_step_index: Option<u32>,
}

/// Validate every step and the repetition count.
pub fn validate_profile(steps: &[ThermocyclerStep], repetitions: u32) -> ModuleResult<Vec<ProfileStep>> {
    if repetitions == 0 {
        return Err(ModuleError::Validation(
            "repetitions must be a positive integer".into(),
        ));
    }
    if steps.is_empty() {
        return Err(ModuleError::Validation("a profile needs at least one step".into()));
    }
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let temperature = validate_block_temperature(step.temperature)
                .map_err(|e| ModuleError::Validation(format!("step {}: {}", i + 1, e)))?;
            if step.hold_time_seconds.is_none() && step.hold_time_minutes.is_none() {
                return Err(ModuleError::Validation(format!(
                    "step {} must define hold_time_seconds or hold_time_minutes",
                    i + 1
                )));
            }
            let hold_time_seconds = ensure_hold_time_seconds(step.hold_time_seconds, step.hold_time_minutes)?;
            if hold_time_seconds <= 0.0 {
                return Err(ModuleError::Validation(format!(
                    "step {} must hold for longer than 0 seconds",
                    i + 1
                )));
            }
            Ok(ProfileStep {
                temperature,
                hold_time_seconds,
            })
        })
        .collect()
}

/// The primitive a profile is built from: reach a block temperature, then hold.
#[async_trait]
pub trait BlockTemperatureControl: Send + Sync {
    async fn reach_and_hold(&self, celsius: f64, hold_seconds: f64, volume_ul: f64) -> ModuleResult<()>;
}

/// Replays validated steps against a block and publishes progress.
pub struct ProfileRunner<'a> {
    block: &'a dyn BlockTemperatureControl,
    progress: &'a Observable<ProfileProgress>,
}

impl<'a> ProfileRunner<'a> {
    pub fn new(block: &'a dyn BlockTemperatureControl, progress: &'a Observable<ProfileProgress>) -> Self {
        Self { block, progress }
    }

    pub async fn run(&self, steps: &[ProfileStep], repetitions: u32, volume_ul: f64) -> ModuleResult<()> {
        let total_steps = u32::try_from(steps.len())
            .map_err(|_| ModuleError::Validation("too many profile steps".into()))?;
        self.progress.set(ProfileProgress {
            total_cycle_count: Some(repetitions),
            current_cycle_index: None,
            total_step_count: Some(total_steps),
            current_step_index: None,
        });
        info!(repetitions, steps = total_steps, "starting thermocycler profile");

        for cycle in 1..=repetitions {
            for (index, step) in (1..=total_steps).zip(steps) {
                debug!(cycle, step = index, temperature = step.temperature, "profile step");
                self.block
                    .reach_and_hold(step.temperature, step.hold_time_seconds, volume_ul)
                    .await?;
                self.progress.update(|p| {
                    p.current_cycle_index = Some(cycle);
                    p.current_step_index = Some(index);
                });
            }
        }
        Ok(())
    }
}
