//! Protocol API versions and the version gate primitive.
//!
//! A protocol declares one [`ApiVersion`] for its whole run. Every call into
//! the module layer is checked against it. Operations (and some optional
//! parameters) declare the minimum version that may use them; the outcome of
//! a check is a [`GateDecision`].
//!
//! Most parameters are rejected below their minimum version. A small number
//! of historical parameters are instead silently dropped so that published
//! protocols keep behaving exactly as they always have. Those cases are named
//! explicitly at their call sites rather than handled by a general rule.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ModuleError, ModuleResult};

/// An ordered `(major, minor)` protocol API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| ModuleError::Config(format!("invalid API version '{}'", s)))?;
        let parse = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| ModuleError::Config(format!("invalid API version '{}'", s)))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

impl Serialize for ApiVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of checking an operation or parameter against the declared version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The declared version may use it.
    Allowed,
    /// The declared version is too old; the call must fail.
    Rejected { required: ApiVersion },
    /// The declared version is too old, but the call proceeds with legacy
    /// behavior as though the parameter had not been given.
    SilentlyIgnored { required: ApiVersion },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// What a call site does with a parameter used below its minimum version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BelowMinimum {
    Reject,
    SilentlyIgnore,
}

/// Core check: is `current` at least `min`, given an extra call-site condition?
///
/// When `condition` is false the check does not apply (for example the
/// optional parameter was not supplied) and the result is always `Allowed`.
pub fn check(
    min: ApiVersion,
    current: ApiVersion,
    condition: bool,
    below_minimum: BelowMinimum,
) -> GateDecision {
    if !condition || current >= min {
        return GateDecision::Allowed;
    }
    match below_minimum {
        BelowMinimum::Reject => GateDecision::Rejected { required: min },
        BelowMinimum::SilentlyIgnore => GateDecision::SilentlyIgnored { required: min },
    }
}

/// Fail with `VersionIncompatible` unless `current >= min`.
pub fn require(operation: &str, min: ApiVersion, current: ApiVersion) -> ModuleResult<()> {
    if current >= min {
        Ok(())
    } else {
        Err(ModuleError::VersionIncompatible {
            operation: operation.to_string(),
            required: min,
            declared: current,
        })
    }
}
