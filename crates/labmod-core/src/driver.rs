//! Driver and collaborator traits consumed by the module layer.
//!
//! Each module variant exclusively owns one driver handle. Drivers are the
//! boundary to firmware: they accept set points and motion commands and
//! report physical state on their own schedule. Nothing above this boundary
//! knows how bytes reach the board.
//!
//! ## Units
//! - Temperatures in °C, speeds in rpm, volumes in µL
//! - Magnet heights in the driver's native unit (see [`MagneticModuleDriver::engage`])

use anyhow::Result;
use async_trait::async_trait;

use crate::status::{LatchStatus, LidPosition, MagneticStatus, SpeedStatus, TemperatureStatus};

/// Temperature module firmware.
#[async_trait]
pub trait TemperatureModuleDriver: Send + Sync {
    /// Start driving towards `celsius`. Returns once the set point is accepted.
    async fn set_temperature(&self, celsius: f64) -> Result<()>;

    /// Stop heating or cooling and turn off the fan.
    async fn deactivate(&self) -> Result<()>;

    async fn read_status(&self) -> Result<TemperatureStatus>;

    async fn read_temperature(&self) -> Result<f64>;
}

/// Magnetic module firmware.
#[async_trait]
pub trait MagneticModuleDriver: Send + Sync {
    /// Raise the magnets to `height` above home.
    ///
    /// First-generation hardware takes half-millimetres; later hardware
    /// takes millimetres. The module layer performs the conversion.
    async fn engage(&self, height: f64) -> Result<()>;

    async fn disengage(&self) -> Result<()>;

    /// Legacy probe calibration.
    async fn calibrate(&self) -> Result<()>;

    async fn read_status(&self) -> Result<MagneticStatus>;
}

/// Thermocycler firmware: lid motion, well block and heated lid.
#[async_trait]
pub trait ThermocyclerDriver: Send + Sync {
    async fn open_lid(&self) -> Result<()>;

    async fn close_lid(&self) -> Result<()>;

    async fn read_lid_position(&self) -> Result<LidPosition>;

    /// Start driving the block towards `celsius` for the given well volume.
    async fn set_block_temperature(&self, celsius: f64, volume_ul: f64) -> Result<()>;

    async fn set_lid_temperature(&self, celsius: f64) -> Result<()>;

    async fn deactivate_block(&self) -> Result<()>;

    async fn deactivate_lid(&self) -> Result<()>;

    async fn read_block_status(&self) -> Result<TemperatureStatus>;

    async fn read_lid_status(&self) -> Result<TemperatureStatus>;

    async fn read_block_temperature(&self) -> Result<Option<f64>>;

    async fn read_lid_temperature(&self) -> Result<Option<f64>>;

    /// Current block ramp rate in °C/s, if the firmware reports one.
    async fn read_ramp_rate(&self) -> Result<Option<f64>>;
}

/// Heater-shaker firmware.
#[async_trait]
pub trait HeaterShakerDriver: Send + Sync {
    async fn set_temperature(&self, celsius: f64) -> Result<()>;

    async fn set_speed(&self, rpm: u32) -> Result<()>;

    async fn deactivate_heater(&self) -> Result<()>;

    async fn deactivate_shaker(&self) -> Result<()>;

    async fn open_latch(&self) -> Result<()>;

    async fn close_latch(&self) -> Result<()>;

    async fn read_temperature_status(&self) -> Result<TemperatureStatus>;

    async fn read_speed_status(&self) -> Result<SpeedStatus>;

    async fn read_latch_status(&self) -> Result<LatchStatus>;

    async fn read_temperature(&self) -> Result<f64>;

    async fn read_speed(&self) -> Result<u32>;
}

/// Motion collaborator owned by the liquid-handling side of the robot.
#[async_trait]
pub trait PipetteMotion: Send + Sync {
    /// Retract any pipettes parked next to the module in `slot`.
    ///
    /// A no-op when nothing is adjacent.
    async fn retract_adjacent_pipettes(&self, slot: &str) -> Result<()>;
}

/// Labware definition lookup used by the magnetic module's default engage.
pub trait LabwareDefaults: Send + Sync {
    /// Default magnet engage height for labware `load_name`, in millimetres
    /// above the labware bottom, if its definition declares one.
    fn default_engage_height(&self, load_name: &str) -> Option<f64>;
}
