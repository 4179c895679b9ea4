//! Magnetic module.
//!
//! Engage height resolution, in order:
//!
//! 1. `height`, measured from the magnet's home position
//! 2. `height_from_base`, measured from the bottom of the loaded labware
//!    (API 2.2+; below that it is dropped and resolution falls through)
//! 3. the loaded labware's default engage height plus `offset`
//!
//! Whichever wins, the absolute height from home must lie within the
//! model's magnet travel.

use labmod_core::driver::MagneticModuleDriver;
use labmod_core::events::Command;
use labmod_core::limits::{magnet_labware_bottom_offset_mm, validate_magnet_height, ENGAGE_HEIGHT_UNIT_CNV};
use labmod_core::model::{ModuleKind, ModuleModel};
use labmod_core::status::MagneticStatus;
use labmod_core::{ModuleError, ModuleResult};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::context::ModuleContext;
use crate::gate::{Operation, Parameter, CALIBRATE_NOOP_SINCE, FULL_PRECISION_ENGAGE_SINCE};

/// Optional arguments to [`MagneticModule::engage`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngageParams {
    pub height: Option<f64>,
    pub offset: Option<f64>,
    pub height_from_base: Option<f64>,
}

impl EngageParams {
    pub fn height(mut self, mm: f64) -> Self {
        self.height = Some(mm);
        self
    }

    pub fn offset(mut self, mm: f64) -> Self {
        self.offset = Some(mm);
        self
    }

    pub fn height_from_base(mut self, mm: f64) -> Self {
        self.height_from_base = Some(mm);
        self
    }
}

/// Which argument an engage height was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngageSource {
    Height,
    HeightFromBase,
    LabwareDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedEngage {
    /// Absolute magnet height above home (mm).
    pub height_from_home: f64,
    pub source: EngageSource,
}

pub struct MagneticModule {
    ctx: ModuleContext,
    driver: Box<dyn MagneticModuleDriver>,
}

impl std::fmt::Debug for MagneticModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MagneticModule").field("ctx", &self.ctx).finish()
    }
}

impl MagneticModule {
    pub fn new(ctx: ModuleContext, driver: Box<dyn MagneticModuleDriver>) -> ModuleResult<Self> {
        super::ensure_kind(&ctx, ModuleKind::Magnetic)?;
        ctx.require(Operation::LoadModule(ModuleKind::Magnetic))?;
        Ok(Self { ctx, driver })
    }

    pub fn context(&self) -> &ModuleContext {
        &self.ctx
    }

    /// Work out where the magnets would go for `params` without moving them.
    pub fn resolve(&self, params: EngageParams) -> ModuleResult<ResolvedEngage> {
        let model = self.ctx.model();
        let resolved = if let Some(height) = params.height {
            ResolvedEngage {
                height_from_home: height,
                source: EngageSource::Height,
            }
        } else if let Some(from_base) = params
            .height_from_base
            .filter(|_| self.height_from_base_allowed())
        {
            ResolvedEngage {
                height_from_home: magnet_labware_bottom_offset_mm(model) + from_base,
                source: EngageSource::HeightFromBase,
            }
        } else {
            ResolvedEngage {
                height_from_home: magnet_labware_bottom_offset_mm(model)
                    + self.labware_default_height()?
                    + params.offset.unwrap_or(0.0),
                source: EngageSource::LabwareDefault,
            }
        };
        validate_magnet_height(model, resolved.height_from_home)?;
        Ok(resolved)
    }

    /// Raise the magnets. Returns the absolute height above home that was commanded.
    pub async fn engage(&self, params: EngageParams) -> ModuleResult<f64> {
        self.ctx.require(Operation::MagneticEngage)?;
        let resolved = self.resolve(params)?;
        let height = resolved.height_from_home;

        let scope = self.ctx.envelope().begin(Command::new(
            "command.MAGDECK_ENGAGE",
            format!("Engaging Magnetic Module to {} mm", height),
            json!({ "height": height, "source": resolved.source }),
        ));
        let result = async {
            self.driver.engage(self.native_units(height)).await?;
            info!(module = self.ctx.id(), height, source = ?resolved.source, "magnets engaged");
            Ok::<_, ModuleError>(height)
        }
        .await;
        scope.finish(result)
    }

    /// Lower the magnets. Safe to call when already disengaged.
    pub async fn disengage(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::MagneticDisengage)?;
        let scope = self.ctx.envelope().begin(Command::new(
            "command.MAGDECK_DISENGAGE",
            "Disengaging Magnetic Module",
            json!({}),
        ));
        let result = async {
            self.driver.disengage().await?;
            info!(module = self.ctx.id(), "magnets disengaged");
            Ok::<_, ModuleError>(())
        }
        .await;
        scope.finish(result)
    }

    /// Deprecated probe calibration. Does nothing physical from API 2.14.
    pub async fn calibrate(&self) -> ModuleResult<()> {
        self.ctx.require(Operation::MagneticCalibrate)?;
        warn!(
            module = self.ctx.id(),
            "calibrate is deprecated and will be removed; magnetic modules do not need calibration"
        );
        let scope = self.ctx.envelope().begin(Command::new(
            "command.MAGDECK_CALIBRATE",
            "Calibrating Magnetic Module",
            json!({}),
        ));
        let result = async {
            if self.ctx.api_version() < CALIBRATE_NOOP_SINCE {
                self.driver.calibrate().await?;
            }
            Ok::<_, ModuleError>(())
        }
        .await;
        scope.finish(result)
    }

    pub async fn status(&self) -> ModuleResult<MagneticStatus> {
        self.ctx.require(Operation::MagneticStatus)?;
        Ok(self.driver.read_status().await?)
    }

    fn height_from_base_allowed(&self) -> bool {
        // The gate only ever drops this parameter, so an Err is unreachable here.
        matches!(
            self.ctx
                .accept_parameter(Operation::MagneticEngage, Parameter::MagneticHeightFromBase, true),
            Ok(true)
        )
    }

    fn labware_default_height(&self) -> ModuleResult<f64> {
        let labware = self.ctx.labware().ok_or_else(|| {
            ModuleError::MissingDefault(format!(
                "no height given and no labware loaded on {}",
                self.ctx.id()
            ))
        })?;
        let height = self
            .ctx
            .run()
            .labware_defaults()
            .default_engage_height(&labware.load_name)
            .ok_or_else(|| {
                ModuleError::MissingDefault(format!(
                    "no height given and labware {} has no default engage height",
                    labware.load_name
                ))
            })?;
        if self.ctx.api_version() < FULL_PRECISION_ENGAGE_SINCE {
            return Ok((height * 2.0).round() / 2.0);
        }
        Ok(height)
    }

    fn native_units(&self, height_mm: f64) -> f64 {
        match self.ctx.model() {
            ModuleModel::MagneticV1 => height_mm * ENGAGE_HEIGHT_UNIT_CNV,
            _ => height_mm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::test_support::{context, TEST_VERSION};
    use labmod_core::events::RecordingSink;
    use labmod_core::ApiVersion;
    use labmod_driver_mock::{SimMagneticHandle, SimMagneticModule};
    use tracing_test::traced_test;

    const PLATE: &str = "biorad_96_wellplate_200ul_pcr";

    fn magdeck(version: ApiVersion, model: ModuleModel) -> (MagneticModule, SimMagneticHandle) {
        let driver = SimMagneticModule::new();
        let handle = driver.handle();
        let ctx = context(version, &RecordingSink::new(), model);
        (MagneticModule::new(ctx, Box::new(driver)).unwrap(), handle)
    }

    #[test]
    fn height_beats_everything() {
        let (module, _) = magdeck(TEST_VERSION, ModuleModel::MagneticV2);
        module.context().load_labware(PLATE, None, None, None).unwrap();
        let params = EngageParams::default().offset(1.0).height_from_base(5.0).height(12.0);
        let resolved = module.resolve(params).unwrap();
        assert_eq!(resolved.source, EngageSource::Height);
        assert_eq!(resolved.height_from_home, 12.0);
    }

    #[test]
    fn height_from_base_beats_offset() {
        let (module, _) = magdeck(TEST_VERSION, ModuleModel::MagneticV2);
        module.context().load_labware(PLATE, None, None, None).unwrap();
        let resolved = module
            .resolve(EngageParams::default().offset(-3.0).height_from_base(5.0))
            .unwrap();
        assert_eq!(resolved.source, EngageSource::HeightFromBase);
        assert_eq!(resolved.height_from_home, 7.5);
    }

    #[test]
    fn offset_applies_to_labware_default() {
        let (module, _) = magdeck(TEST_VERSION, ModuleModel::MagneticV2);
        module.context().load_labware(PLATE, None, None, None).unwrap();
        let resolved = module.resolve(EngageParams::default().offset(-2.0)).unwrap();
        assert_eq!(resolved.source, EngageSource::LabwareDefault);
        assert_eq!(resolved.height_from_home, 2.5 + 18.0 - 2.0);
    }

    #[test]
    fn height_from_base_is_dropped_before_2_2() {
        let (module, _) = magdeck(ApiVersion::new(2, 1), ModuleModel::MagneticV2);
        module.context().load_labware(PLATE, None, None, None).unwrap();
        let resolved = module.resolve(EngageParams::default().height_from_base(5.0)).unwrap();
        assert_eq!(resolved.source, EngageSource::LabwareDefault);
    }

    #[test]
    fn legacy_versions_round_default_to_half_mm() {
        let (module, _) = magdeck(ApiVersion::new(2, 2), ModuleModel::MagneticV2);
        module
            .context()
            .load_labware("usascientific_96_wellplate_2.4ml_deep", None, None, None)
            .unwrap();
        let resolved = module.resolve(EngageParams::default()).unwrap();
        assert_eq!(resolved.height_from_home, 2.5 + 15.0);

        let (module, _) = magdeck(ApiVersion::new(2, 3), ModuleModel::MagneticV2);
        module
            .context()
            .load_labware("usascientific_96_wellplate_2.4ml_deep", None, None, None)
            .unwrap();
        let resolved = module.resolve(EngageParams::default()).unwrap();
        assert!((resolved.height_from_home - (2.5 + 14.94)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_default_touches_nothing() {
        let (module, handle) = magdeck(TEST_VERSION, ModuleModel::MagneticV2);
        let err = module.engage(EngageParams::default()).await.unwrap_err();
        assert!(matches!(err, ModuleError::MissingDefault(_)));

        module.context().load_labware("opentrons_96_tiprack_300ul", None, None, None).unwrap();
        let err = module.engage(EngageParams::default().offset(1.0)).await.unwrap_err();
        assert!(matches!(err, ModuleError::MissingDefault(_)));
        assert!(handle.log().is_empty());
    }

    #[tokio::test]
    async fn out_of_travel_is_rejected() {
        let (module, handle) = magdeck(TEST_VERSION, ModuleModel::MagneticV2);
        let err = module.engage(EngageParams::default().height(25.5)).await.unwrap_err();
        assert!(matches!(err, ModuleError::Validation(_)));

        module.context().load_labware(PLATE, None, None, None).unwrap();
        let err = module.engage(EngageParams::default().offset(10.0)).await.unwrap_err();
        assert!(matches!(err, ModuleError::Validation(_)));
        assert!(handle.log().is_empty());
    }

    #[tokio::test]
    async fn first_generation_takes_half_millimetres() {
        let (module, handle) = magdeck(TEST_VERSION, ModuleModel::MagneticV1);
        let height = module.engage(EngageParams::default().height(10.0)).await.unwrap();
        assert_eq!(height, 10.0);
        assert_eq!(handle.engaged_height(), Some(20.0));
        assert_eq!(module.status().await.unwrap(), MagneticStatus::Engaged);
    }

    #[tokio::test]
    async fn disengage_is_idempotent() {
        let (module, handle) = magdeck(TEST_VERSION, ModuleModel::MagneticV2);
        module.disengage().await.unwrap();
        module.disengage().await.unwrap();
        assert_eq!(module.status().await.unwrap(), MagneticStatus::Disengaged);
        assert_eq!(handle.log().count("disengage"), 2);
    }

    #[tokio::test]
    async fn calibrate_is_a_no_op_from_2_14() {
        let (module, handle) = magdeck(ApiVersion::new(2, 14), ModuleModel::MagneticV2);
        module.calibrate().await.unwrap();
        assert!(handle.log().is_empty());

        let (module, handle) = magdeck(ApiVersion::new(2, 13), ModuleModel::MagneticV2);
        module.calibrate().await.unwrap();
        assert_eq!(handle.log().calls(), vec!["calibrate()"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn calibrate_always_warns() {
        let (module, _) = magdeck(ApiVersion::new(2, 14), ModuleModel::MagneticV2);
        module.calibrate().await.unwrap();
        assert!(logs_contain("calibrate is deprecated"));
    }

    #[test]
    #[traced_test]
    fn dropped_height_from_base_is_logged() {
        let (module, _) = magdeck(ApiVersion::new(2, 1), ModuleModel::MagneticV2);
        module.context().load_labware(PLATE, None, None, None).unwrap();
        module.resolve(EngageParams::default().height_from_base(5.0)).unwrap();
        assert!(logs_contain("ignoring height_from_base"));
    }
}
