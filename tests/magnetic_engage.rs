//! Magnet engage height resolution.

mod common;

use common::{Deck, LATEST};
use labmod_core::model::ModuleModel;
use labmod_core::status::MagneticStatus;
use proptest::prelude::*;
use rust_labmod::modules::{EngageParams, EngageSource};
use rust_labmod::ModuleError;

const PLATE: &str = "biorad_96_wellplate_200ul_pcr";
const PLATE_DEFAULT: f64 = 18.0;
const V2_BOTTOM: f64 = 2.5;

proptest! {
    #[test]
    fn explicit_height_wins(
        height in 0.0f64..=25.0,
        offset in proptest::option::of(-5.0f64..5.0),
        from_base in proptest::option::of(0.0f64..20.0),
    ) {
        let deck = Deck::new(LATEST);
        let (magdeck, _) = deck.magnetic_module(ModuleModel::MagneticV2);
        magdeck.context().load_labware(PLATE, None, None, None).unwrap();

        let mut params = EngageParams::default().height(height);
        if let Some(offset) = offset {
            params = params.offset(offset);
        }
        if let Some(from_base) = from_base {
            params = params.height_from_base(from_base);
        }
        let resolved = magdeck.resolve(params).unwrap();
        prop_assert_eq!(resolved.source, EngageSource::Height);
        prop_assert_eq!(resolved.height_from_home, height);
    }

    #[test]
    fn height_from_base_ignores_offset(
        from_base in 0.0f64..=22.5,
        offset in -5.0f64..5.0,
    ) {
        let deck = Deck::new(LATEST);
        let (magdeck, _) = deck.magnetic_module(ModuleModel::MagneticV2);
        magdeck.context().load_labware(PLATE, None, None, None).unwrap();

        let resolved = magdeck
            .resolve(EngageParams::default().offset(offset).height_from_base(from_base))
            .unwrap();
        prop_assert_eq!(resolved.source, EngageSource::HeightFromBase);
        prop_assert!((resolved.height_from_home - (V2_BOTTOM + from_base)).abs() < 1e-9);
    }

    #[test]
    fn offset_shifts_labware_default(offset in -20.0f64..4.5) {
        let deck = Deck::new(LATEST);
        let (magdeck, _) = deck.magnetic_module(ModuleModel::MagneticV2);
        magdeck.context().load_labware(PLATE, None, None, None).unwrap();

        let resolved = magdeck.resolve(EngageParams::default().offset(offset)).unwrap();
        prop_assert_eq!(resolved.source, EngageSource::LabwareDefault);
        prop_assert!((resolved.height_from_home - (V2_BOTTOM + PLATE_DEFAULT + offset)).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_engage_and_disengage() {
    let deck = Deck::new(LATEST);
    let (magdeck, handle) = deck.magnetic_module(ModuleModel::MagneticV2);
    magdeck.context().load_labware(PLATE, None, None, None).unwrap();

    let height = magdeck.engage(EngageParams::default()).await.unwrap();
    assert_eq!(height, V2_BOTTOM + PLATE_DEFAULT);
    assert_eq!(magdeck.status().await.unwrap(), MagneticStatus::Engaged);

    let event = &deck.events_named("command.MAGDECK_ENGAGE")[0];
    assert_eq!(event.arguments["height"], V2_BOTTOM + PLATE_DEFAULT);
    assert_eq!(event.arguments["source"], "labware_default");

    magdeck.disengage().await.unwrap();
    magdeck.disengage().await.unwrap();
    assert_eq!(magdeck.status().await.unwrap(), MagneticStatus::Disengaged);
    assert_eq!(handle.engaged_height(), None);
    assert_eq!(deck.events_named("command.MAGDECK_DISENGAGE").len(), 4);
}

#[tokio::test]
async fn test_first_generation_model_uses_half_mm_units() {
    let deck = Deck::new(LATEST);
    let (magdeck, handle) = deck.magnetic_module(ModuleModel::MagneticV1);
    magdeck.context().load_labware(PLATE, None, None, None).unwrap();

    let height = magdeck
        .engage(EngageParams::default().height_from_base(10.0))
        .await
        .unwrap();
    // GEN1 labware bottom sits 5 mm above home.
    assert_eq!(height, 15.0);
    assert_eq!(handle.engaged_height(), Some(30.0));

    let err = magdeck
        .engage(EngageParams::default().height(23.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ModuleError::Validation(_)));
    assert_eq!(handle.log().count("engage"), 1);
}

#[tokio::test]
async fn test_replacing_labware_changes_default() {
    let deck = Deck::new(LATEST);
    let (magdeck, _) = deck.magnetic_module(ModuleModel::MagneticV2);

    magdeck.context().load_labware(PLATE, None, None, None).unwrap();
    let first = magdeck.engage(EngageParams::default()).await.unwrap();
    magdeck
        .context()
        .load_labware("nest_96_wellplate_2ml_deep", None, None, None)
        .unwrap();
    let second = magdeck.engage(EngageParams::default()).await.unwrap();

    assert_eq!(first, V2_BOTTOM + 18.0);
    assert!((second - (V2_BOTTOM + 6.8)).abs() < 1e-9);
}
