//! Run-wide and per-module context.
//!
//! A [`RunContext`] is built once per protocol run and carries the declared
//! API version, the event sink, the wait policy and the external
//! collaborators. The declared version cannot change after `build()`.
//!
//! Every module variant owns a [`ModuleContext`]: the common envelope of id,
//! model, slot, loaded labware and the command envelope used for audit
//! events.

use std::sync::Arc;

use labmod_core::driver::{LabwareDefaults, PipetteMotion};
use labmod_core::events::{CommandEnvelope, EventSink, NullSink};
use labmod_core::model::ModuleModel;
use labmod_core::version::GateDecision;
use labmod_core::wait::WaitPolicy;
use labmod_core::{ApiVersion, ModuleError, ModuleResult};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::gate::{self, Operation, Parameter};

/// Labware lookup used when a run has no labware definitions at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLabwareDefaults;

impl LabwareDefaults for NoLabwareDefaults {
    fn default_engage_height(&self, _load_name: &str) -> Option<f64> {
        None
    }
}

/// Shared, immutable state for one protocol run.
#[derive(Clone)]
pub struct RunContext {
    api_version: ApiVersion,
    sink: Arc<dyn EventSink>,
    wait: WaitPolicy,
    labware_defaults: Arc<dyn LabwareDefaults>,
    motion: Option<Arc<dyn PipetteMotion>>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("api_version", &self.api_version)
            .field("wait", &self.wait)
            .field("has_motion", &self.motion.is_some())
            .finish()
    }
}

impl RunContext {
    pub fn builder(api_version: ApiVersion) -> RunContextBuilder {
        RunContextBuilder {
            api_version,
            sink: Arc::new(NullSink),
            wait: WaitPolicy::default(),
            labware_defaults: Arc::new(NoLabwareDefaults),
            motion: None,
        }
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink)
    }

    pub fn labware_defaults(&self) -> Arc<dyn LabwareDefaults> {
        Arc::clone(&self.labware_defaults)
    }

    pub fn pipette_motion(&self) -> Option<Arc<dyn PipetteMotion>> {
        self.motion.clone()
    }
}

pub struct RunContextBuilder {
    api_version: ApiVersion,
    sink: Arc<dyn EventSink>,
    wait: WaitPolicy,
    labware_defaults: Arc<dyn LabwareDefaults>,
    motion: Option<Arc<dyn PipetteMotion>>,
}

impl RunContextBuilder {
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    pub fn labware_defaults(mut self, defaults: Arc<dyn LabwareDefaults>) -> Self {
        self.labware_defaults = defaults;
        self
    }

    pub fn pipette_motion(mut self, motion: Arc<dyn PipetteMotion>) -> Self {
        self.motion = Some(motion);
        self
    }

    pub fn build(self) -> ModuleResult<RunContext> {
        if !gate::is_supported(self.api_version) {
            return Err(ModuleError::Config(format!(
                "API version {} is not supported (supported: {} to {})",
                self.api_version,
                gate::MIN_SUPPORTED,
                gate::MAX_SUPPORTED
            )));
        }
        if self.wait.poll_interval.is_zero() {
            return Err(ModuleError::Config("poll interval must be non-zero".into()));
        }
        Ok(RunContext {
            api_version: self.api_version,
            sink: self.sink,
            wait: self.wait,
            labware_defaults: self.labware_defaults,
            motion: self.motion,
        })
    }
}

/// Labware recorded as loaded on a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedLabware {
    pub load_name: String,
    pub label: Option<String>,
    pub namespace: Option<String>,
    pub version: u32,
}

/// Default definition version assumed when a protocol does not give one.
pub const DEFAULT_LABWARE_VERSION: u32 = 1;

/// Common envelope owned by every module variant.
#[derive(Debug)]
pub struct ModuleContext {
    id: String,
    model: ModuleModel,
    requested_as: ModuleModel,
    slot: String,
    labware: Mutex<Option<LoadedLabware>>,
    envelope: CommandEnvelope,
    run: RunContext,
}

impl ModuleContext {
    /// Create the envelope for a module of `model` the protocol asked for as
    /// `requested_as`.
    ///
    /// A newer model may satisfy a request for an older one of the same kind;
    /// a request for a different kind of module is a configuration error.
    pub fn new(
        run: &RunContext,
        id: impl Into<String>,
        model: ModuleModel,
        requested_as: ModuleModel,
        slot: impl Into<String>,
    ) -> ModuleResult<Self> {
        let id = id.into();
        if model.kind() != requested_as.kind() {
            return Err(ModuleError::Config(format!(
                "module '{}' is a {} but was requested as {}",
                id, model, requested_as
            )));
        }
        Ok(Self {
            envelope: CommandEnvelope::new(run.sink(), id.clone()),
            id,
            model,
            requested_as,
            slot: slot.into(),
            labware: Mutex::new(None),
            run: run.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> ModuleModel {
        self.model
    }

    /// Model the protocol asked for. Informational only.
    pub fn requested_as(&self) -> ModuleModel {
        self.requested_as
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn api_version(&self) -> ApiVersion {
        self.run.api_version()
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.run.wait_policy()
    }

    pub fn envelope(&self) -> &CommandEnvelope {
        &self.envelope
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    pub fn require(&self, operation: Operation) -> ModuleResult<()> {
        gate::require(operation, self.api_version())
    }

    /// Gate an optional parameter. Returns whether the caller's value may be used.
    ///
    /// Rejections become `VersionIncompatible`; silent drops are logged.
    pub fn accept_parameter(&self, operation: Operation, parameter: Parameter, supplied: bool) -> ModuleResult<bool> {
        match gate::evaluate(parameter, self.api_version(), supplied) {
            GateDecision::Allowed => Ok(supplied),
            GateDecision::Rejected { required } => Err(ModuleError::VersionIncompatible {
                operation: format!("{}({})", operation.name(), parameter.name()),
                required,
                declared: self.api_version(),
            }),
            GateDecision::SilentlyIgnored { required } => {
                warn!(
                    module = %self.id,
                    parameter = parameter.name(),
                    %required,
                    declared = %self.api_version(),
                    "ignoring {} on {}: requires API version {}",
                    parameter.name(),
                    operation.name(),
                    required
                );
                Ok(false)
            }
        }
    }

    /// Record labware as loaded on this module, replacing anything loaded before.
    pub fn load_labware(
        &self,
        load_name: impl Into<String>,
        label: Option<String>,
        namespace: Option<String>,
        version: Option<u32>,
    ) -> ModuleResult<LoadedLabware> {
        self.require(Operation::LoadLabware)?;
        let op = Operation::LoadLabware;
        let label = label.filter(|_| {
            matches!(self.accept_parameter(op, Parameter::LoadLabwareLabel, true), Ok(true))
        });
        let namespace = namespace.filter(|_| {
            matches!(self.accept_parameter(op, Parameter::LoadLabwareNamespace, true), Ok(true))
        });
        let version_supplied = version.is_some_and(|v| v != DEFAULT_LABWARE_VERSION);
        let version = if self.accept_parameter(op, Parameter::LoadLabwareVersion, version_supplied)? {
            version.unwrap_or(DEFAULT_LABWARE_VERSION)
        } else {
            DEFAULT_LABWARE_VERSION
        };

        let labware = LoadedLabware {
            load_name: load_name.into(),
            label,
            namespace,
            version,
        };
        info!(module = %self.id, labware = %labware.load_name, "labware loaded");
        *self.labware.lock() = Some(labware.clone());
        Ok(labware)
    }

    pub fn labware(&self) -> Option<LoadedLabware> {
        self.labware.lock().clone()
    }
}
