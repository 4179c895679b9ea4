//! Documented device ranges and parameter validation.
//!
//! Every validator here runs before a command is sent to a driver, so a
//! rejected value never produces a partial side effect.

use std::time::Duration;

use crate::error::{ModuleError, ModuleResult};
use crate::model::ModuleModel;

/// Temperature module set point range (°C).
pub const TEMPERATURE_MODULE_RANGE: (f64, f64) = (4.0, 95.0);
/// Thermocycler well block set point range (°C).
pub const THERMOCYCLER_BLOCK_RANGE: (f64, f64) = (4.0, 99.0);
/// Thermocycler heated lid set point range (°C).
pub const THERMOCYCLER_LID_RANGE: (f64, f64) = (37.0, 110.0);
/// Largest well volume the thermocycler block model accepts (µL).
pub const THERMOCYCLER_MAX_VOLUME_UL: f64 = 100.0;
/// Volume assumed when a protocol does not give one (µL).
pub const THERMOCYCLER_DEFAULT_VOLUME_UL: f64 = 25.0;
/// Heater-shaker plate set point range (°C).
pub const HEATER_SHAKER_TEMPERATURE_RANGE: (f64, f64) = (27.0, 95.0);
/// Heater-shaker shake speed range (rpm).
pub const HEATER_SHAKER_SPEED_RANGE: (u32, u32) = (200, 3000);
/// Legacy magnetic module heights are expressed in half-millimetres.
pub const ENGAGE_HEIGHT_UNIT_CNV: f64 = 2.0;

/// Maximum magnet travel above its home position (mm).
pub fn magnet_travel_mm(model: ModuleModel) -> f64 {
    match model {
        ModuleModel::MagneticV1 => 45.0 / ENGAGE_HEIGHT_UNIT_CNV,
        _ => 25.0,
    }
}

/// Distance from magnet home to the bottom of seated labware (mm).
pub fn magnet_labware_bottom_offset_mm(model: ModuleModel) -> f64 {
    match model {
        ModuleModel::MagneticV1 => 5.0,
        _ => 2.5,
    }
}

fn ensure_in_range(name: &str, value: f64, (min, max): (f64, f64), unit: &str) -> ModuleResult<f64> {
    if !value.is_finite() {
        return Err(ModuleError::Validation(format!("{} must be a finite number", name)));
    }
    if value < min || value > max {
        return Err(ModuleError::Validation(format!(
            "{} {} {} is outside the range {}-{} {}",
            name, value, unit, min, max, unit
        )));
    }
    Ok(value)
}

pub fn validate_temperature_module_celsius(celsius: f64) -> ModuleResult<f64> {
    ensure_in_range("temperature", celsius, TEMPERATURE_MODULE_RANGE, "°C")
}

pub fn validate_block_temperature(celsius: f64) -> ModuleResult<f64> {
    ensure_in_range("block temperature", celsius, THERMOCYCLER_BLOCK_RANGE, "°C")
}

pub fn validate_lid_temperature(celsius: f64) -> ModuleResult<f64> {
    ensure_in_range("lid temperature", celsius, THERMOCYCLER_LID_RANGE, "°C")
}

/// Validate a block max volume, substituting the default when absent.
pub fn validate_block_max_volume(volume: Option<f64>) -> ModuleResult<f64> {
    let Some(volume) = volume else {
        return Ok(THERMOCYCLER_DEFAULT_VOLUME_UL);
    };
    if !volume.is_finite() || volume <= 0.0 || volume > THERMOCYCLER_MAX_VOLUME_UL {
        return Err(ModuleError::Validation(format!(
            "block max volume {} µL must be greater than 0 and at most {} µL",
            volume, THERMOCYCLER_MAX_VOLUME_UL
        )));
    }
    Ok(volume)
}

/// Truncate (not round) to two decimal places.
///
/// The scaled value is snapped to 1e-9 first so inputs that already have two
/// decimals (32.3 scales to 3229.9999999999995) keep them.
pub fn truncate_two_decimals(value: f64) -> f64 {
    let scaled = (value * 100.0 * 1e9).round() / 1e9;
    scaled.trunc() / 100.0
}

/// Validate a heater-shaker target and truncate it to device precision.
pub fn validate_heater_shaker_temperature(celsius: f64) -> ModuleResult<f64> {
    let celsius = ensure_in_range("temperature", celsius, HEATER_SHAKER_TEMPERATURE_RANGE, "°C")?;
    Ok(truncate_two_decimals(celsius))
}

pub fn validate_heater_shaker_speed(rpm: u32) -> ModuleResult<u32> {
    let (min, max) = HEATER_SHAKER_SPEED_RANGE;
    if rpm < min || rpm > max {
        return Err(ModuleError::Validation(format!(
            "shake speed {} rpm is outside the range {}-{} rpm",
            rpm, min, max
        )));
    }
    Ok(rpm)
}

/// Combine hold time inputs additively: `seconds + 60 * minutes`.
///
/// Absent values count as zero. Negative or non-finite values are rejected,
/// and so is a total too long to express as a [`Duration`].
pub fn ensure_hold_time_seconds(seconds: Option<f64>, minutes: Option<f64>) -> ModuleResult<f64> {
    let seconds = seconds.unwrap_or(0.0);
    let minutes = minutes.unwrap_or(0.0);
    if !seconds.is_finite() || !minutes.is_finite() || seconds < 0.0 || minutes < 0.0 {
        return Err(ModuleError::Validation(format!(
            "hold time must be non-negative (got {} s, {} min)",
            seconds, minutes
        )));
    }
    let total = seconds + minutes * 60.0;
    hold_duration(total)?;
    Ok(total)
}

/// Convert a validated hold total to a [`Duration`].
pub fn hold_duration(seconds: f64) -> ModuleResult<Duration> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| ModuleError::Validation(format!("hold time of {} seconds is too long: {}", seconds, e)))
}

/// Validate an absolute magnet height measured from the magnet's home position.
pub fn validate_magnet_height(model: ModuleModel, height_from_home_mm: f64) -> ModuleResult<f64> {
    ensure_in_range(
        "magnet height",
        height_from_home_mm,
        (0.0, magnet_travel_mm(model)),
        "mm",
    )
}
