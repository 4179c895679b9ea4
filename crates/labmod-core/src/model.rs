//! Module kinds and hardware models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModuleError;

/// Family of a module. Each family has its own command state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Temperature,
    Magnetic,
    Thermocycler,
    HeaterShaker,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Temperature => "temperature",
            ModuleKind::Magnetic => "magnetic",
            ModuleKind::Thermocycler => "thermocycler",
            ModuleKind::HeaterShaker => "heater_shaker",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware model of a module.
///
/// A protocol may request one model and be given a compatible newer one; the
/// requested model is kept alongside the physical one for information only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleModel {
    #[serde(rename = "temperatureModuleV1")]
    TemperatureV1,
    #[serde(rename = "temperatureModuleV2")]
    TemperatureV2,
    #[serde(rename = "magneticModuleV1")]
    MagneticV1,
    #[serde(rename = "magneticModuleV2")]
    MagneticV2,
    #[serde(rename = "thermocyclerModuleV1")]
    ThermocyclerV1,
    #[serde(rename = "thermocyclerModuleV2")]
    ThermocyclerV2,
    #[serde(rename = "heaterShakerModuleV1")]
    HeaterShakerV1,
}

impl ModuleModel {
    pub const ALL: [ModuleModel; 7] = [
        ModuleModel::TemperatureV1,
        ModuleModel::TemperatureV2,
        ModuleModel::MagneticV1,
        ModuleModel::MagneticV2,
        ModuleModel::ThermocyclerV1,
        ModuleModel::ThermocyclerV2,
        ModuleModel::HeaterShakerV1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleModel::TemperatureV1 => "temperatureModuleV1",
            ModuleModel::TemperatureV2 => "temperatureModuleV2",
            ModuleModel::MagneticV1 => "magneticModuleV1",
            ModuleModel::MagneticV2 => "magneticModuleV2",
            ModuleModel::ThermocyclerV1 => "thermocyclerModuleV1",
            ModuleModel::ThermocyclerV2 => "thermocyclerModuleV2",
            ModuleModel::HeaterShakerV1 => "heaterShakerModuleV1",
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            ModuleModel::TemperatureV1 | ModuleModel::TemperatureV2 => ModuleKind::Temperature,
            ModuleModel::MagneticV1 | ModuleModel::MagneticV2 => ModuleKind::Magnetic,
            ModuleModel::ThermocyclerV1 | ModuleModel::ThermocyclerV2 => ModuleKind::Thermocycler,
            ModuleModel::HeaterShakerV1 => ModuleKind::HeaterShaker,
        }
    }

    /// Human-readable name used in command event text.
    pub fn display_name(&self) -> &'static str {
        match self.kind() {
            ModuleKind::Temperature => "Temperature Module",
            ModuleKind::Magnetic => "Magnetic Module",
            ModuleKind::Thermocycler => "Thermocycler",
            ModuleKind::HeaterShaker => "Heater-Shaker",
        }
    }
}

impl fmt::Display for ModuleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleModel {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleModel::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| ModuleError::Config(format!("unknown module model '{}'", s)))
    }
}
