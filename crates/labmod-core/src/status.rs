//! Observed-status enumerations.
//!
//! These values are always read live from a driver. The module layer only
//! interprets them; it never caches or synthesizes a status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Temperature control loop status (temperature module, thermocycler block
/// and lid, heater-shaker plate).
///
/// `Error` is only ever reported by devices that can detect an indeterminate
/// state; the plain temperature module never reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureStatus {
    Idle,
    Heating,
    Cooling,
    HoldingAtTarget,
    Error,
}

impl TemperatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureStatus::Idle => "idle",
            TemperatureStatus::Heating => "heating",
            TemperatureStatus::Cooling => "cooling",
            TemperatureStatus::HoldingAtTarget => "holding at target",
            TemperatureStatus::Error => "error",
        }
    }
}

/// Magnet position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagneticStatus {
    Engaged,
    Disengaged,
}

impl MagneticStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MagneticStatus::Engaged => "engaged",
            MagneticStatus::Disengaged => "disengaged",
        }
    }
}

/// Thermocycler lid position. `Unknown` only before the first real read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LidPosition {
    Open,
    Closed,
    InBetween,
    Unknown,
}

impl LidPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            LidPosition::Open => "open",
            LidPosition::Closed => "closed",
            LidPosition::InBetween => "in_between",
            LidPosition::Unknown => "unknown",
        }
    }

    /// True once the lid has stopped moving.
    pub fn is_settled(&self) -> bool {
        !matches!(self, LidPosition::InBetween)
    }
}

/// Heater-shaker shake axis status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedStatus {
    Idle,
    SpeedingUp,
    SlowingDown,
    HoldingAtTarget,
    Error,
}

impl SpeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedStatus::Idle => "idle",
            SpeedStatus::SpeedingUp => "speeding up",
            SpeedStatus::SlowingDown => "slowing down",
            SpeedStatus::HoldingAtTarget => "holding at target",
            SpeedStatus::Error => "error",
        }
    }
}

/// Heater-shaker labware latch status.
///
/// `IdleUnknown` is the status after a reset regardless of the physical
/// latch position; `Unknown` means the status could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatchStatus {
    Opening,
    Closing,
    IdleOpen,
    IdleClosed,
    IdleUnknown,
    Unknown,
}

impl LatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LatchStatus::Opening => "opening",
            LatchStatus::Closing => "closing",
            LatchStatus::IdleOpen => "idle_open",
            LatchStatus::IdleClosed => "idle_closed",
            LatchStatus::IdleUnknown => "idle_unknown",
            LatchStatus::Unknown => "unknown",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(TemperatureStatus, MagneticStatus, LidPosition, SpeedStatus, LatchStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_protocol_strings() {
        assert_eq!(TemperatureStatus::HoldingAtTarget.to_string(), "holding at target");
        assert_eq!(SpeedStatus::SpeedingUp.to_string(), "speeding up");
        assert_eq!(LatchStatus::IdleClosed.to_string(), "idle_closed");
        assert_eq!(LidPosition::InBetween.to_string(), "in_between");
    }

    #[test]
    fn lid_settles_unless_moving() {
        assert!(LidPosition::Open.is_settled());
        assert!(LidPosition::Closed.is_settled());
        assert!(!LidPosition::InBetween.is_settled());
    }
}
