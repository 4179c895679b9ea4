//! Run-wide API version table.
//!
//! Every operation and every version-sensitive optional parameter the module
//! layer exposes is listed here with the first API version that accepts it.
//! Call sites ask [`require`] for operations and [`evaluate`] for parameters;
//! nothing else in the crate compares versions directly.
//!
//! Two parameters are silently dropped rather than rejected below their
//! minimum. Both are kept as named entries in [`Parameter::below_minimum`]:
//!
//! - `height_from_base` on magnetic engage (below 2.2). Older protocols that
//!   passed it got the labware-default engage instead of an error, and still do.
//! - `label` / `namespace` / `version` on `load_labware` (below 2.1).

use labmod_core::model::ModuleKind;
use labmod_core::version::{self, BelowMinimum, GateDecision};
use labmod_core::{ApiVersion, ModuleResult};

/// Lowest API version this layer accepts.
pub const MIN_SUPPORTED: ApiVersion = ApiVersion::new(2, 0);
/// Highest API version this layer knows about.
pub const MAX_SUPPORTED: ApiVersion = ApiVersion::new(2, 14);

/// From this version on, magnetic `calibrate()` performs no physical action.
pub const CALIBRATE_NOOP_SINCE: ApiVersion = ApiVersion::new(2, 14);
/// Below this version a labware-default engage height is rounded to 0.5 mm.
pub const FULL_PRECISION_ENGAGE_SINCE: ApiVersion = ApiVersion::new(2, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadModule(ModuleKind),
    LoadLabware,

    TemperatureSetTargetAndBlock,
    TemperatureSetTargetNonblocking,
    TemperatureAwaitTarget,
    TemperatureDeactivate,
    TemperatureRead,
    TemperatureStatus,

    MagneticEngage,
    MagneticDisengage,
    MagneticCalibrate,
    MagneticStatus,

    ThermocyclerOpenLid,
    ThermocyclerCloseLid,
    ThermocyclerSetBlockTarget,
    ThermocyclerSetLidTarget,
    ThermocyclerExecuteProfile,
    ThermocyclerDeactivateBlock,
    ThermocyclerDeactivateLid,
    ThermocyclerDeactivate,
    ThermocyclerRead,

    HeaterShakerSetTargetAndBlock,
    HeaterShakerSetTargetNonblocking,
    HeaterShakerWaitForTarget,
    HeaterShakerSetShakeSpeed,
    HeaterShakerOpenLatch,
    HeaterShakerCloseLatch,
    HeaterShakerDeactivateShaker,
    HeaterShakerDeactivateHeater,
    HeaterShakerRead,
}

impl Operation {
    /// Name used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::LoadModule(_) => "load_module",
            Operation::LoadLabware => "load_labware",
            Operation::TemperatureSetTargetAndBlock => "set_temperature",
            Operation::TemperatureSetTargetNonblocking => "start_set_temperature",
            Operation::TemperatureAwaitTarget => "await_temperature",
            Operation::TemperatureDeactivate => "deactivate",
            Operation::TemperatureRead => "temperature",
            Operation::TemperatureStatus => "status",
            Operation::MagneticEngage => "engage",
            Operation::MagneticDisengage => "disengage",
            Operation::MagneticCalibrate => "calibrate",
            Operation::MagneticStatus => "status",
            Operation::ThermocyclerOpenLid => "open_lid",
            Operation::ThermocyclerCloseLid => "close_lid",
            Operation::ThermocyclerSetBlockTarget => "set_block_temperature",
            Operation::ThermocyclerSetLidTarget => "set_lid_temperature",
            Operation::ThermocyclerExecuteProfile => "execute_profile",
            Operation::ThermocyclerDeactivateBlock => "deactivate_block",
            Operation::ThermocyclerDeactivateLid => "deactivate_lid",
            Operation::ThermocyclerDeactivate => "deactivate",
            Operation::ThermocyclerRead => "thermocycler state",
            Operation::HeaterShakerSetTargetAndBlock => "set_and_wait_for_temperature",
            Operation::HeaterShakerSetTargetNonblocking => "set_target_temperature",
            Operation::HeaterShakerWaitForTarget => "wait_for_temperature",
            Operation::HeaterShakerSetShakeSpeed => "set_and_wait_for_shake_speed",
            Operation::HeaterShakerOpenLatch => "open_labware_latch",
            Operation::HeaterShakerCloseLatch => "close_labware_latch",
            Operation::HeaterShakerDeactivateShaker => "deactivate_shaker",
            Operation::HeaterShakerDeactivateHeater => "deactivate_heater",
            Operation::HeaterShakerRead => "heater-shaker state",
        }
    }

    pub fn min_version(&self) -> ApiVersion {
        match self {
            Operation::TemperatureSetTargetNonblocking
            | Operation::TemperatureAwaitTarget
            | Operation::TemperatureStatus => ApiVersion::new(2, 3),

            Operation::LoadModule(ModuleKind::HeaterShaker)
            | Operation::HeaterShakerSetTargetAndBlock
            | Operation::HeaterShakerSetTargetNonblocking
            | Operation::HeaterShakerWaitForTarget
            | Operation::HeaterShakerSetShakeSpeed
            | Operation::HeaterShakerOpenLatch
            | Operation::HeaterShakerCloseLatch
            | Operation::HeaterShakerDeactivateShaker
            | Operation::HeaterShakerDeactivateHeater
            | Operation::HeaterShakerRead => ApiVersion::new(2, 13),

            _ => MIN_SUPPORTED,
        }
    }
}

/// Optional parameters whose legality depends on the declared version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    MagneticHeightFromBase,
    LoadLabwareLabel,
    LoadLabwareNamespace,
    LoadLabwareVersion,
}

impl Parameter {
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::MagneticHeightFromBase => "height_from_base",
            Parameter::LoadLabwareLabel => "label",
            Parameter::LoadLabwareNamespace => "namespace",
            Parameter::LoadLabwareVersion => "version",
        }
    }

    pub fn min_version(&self) -> ApiVersion {
        match self {
            Parameter::MagneticHeightFromBase => ApiVersion::new(2, 2),
            Parameter::LoadLabwareLabel
            | Parameter::LoadLabwareNamespace
            | Parameter::LoadLabwareVersion => ApiVersion::new(2, 1),
        }
    }

    /// What happens when the parameter is supplied below its minimum.
    pub fn below_minimum(&self) -> BelowMinimum {
        match self {
            // Published protocols rely on these being dropped; do not tighten.
            Parameter::MagneticHeightFromBase => BelowMinimum::SilentlyIgnore,
            Parameter::LoadLabwareLabel
            | Parameter::LoadLabwareNamespace
            | Parameter::LoadLabwareVersion => BelowMinimum::SilentlyIgnore,
        }
    }
}

/// Fail with `VersionIncompatible` if `operation` is newer than `declared`.
pub fn require(operation: Operation, declared: ApiVersion) -> ModuleResult<()> {
    version::require(operation.name(), operation.min_version(), declared)
}

/// Decide what to do with `parameter` when the caller `supplied` it.
pub fn evaluate(parameter: Parameter, declared: ApiVersion, supplied: bool) -> GateDecision {
    version::check(
        parameter.min_version(),
        declared,
        supplied,
        parameter.below_minimum(),
    )
}

/// True if `declared` is within the range this layer implements.
pub fn is_supported(declared: ApiVersion) -> bool {
    (MIN_SUPPORTED..=MAX_SUPPORTED).contains(&declared)
}
