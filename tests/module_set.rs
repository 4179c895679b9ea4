//! A whole deck driven through `ModuleSet`: lookup, command events and teardown.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{assert_well_bracketed, Deck, LATEST};
use labmod_core::events::CommandPhase;
use labmod_core::model::{ModuleKind, ModuleModel};
use labmod_core::status::TemperatureStatus;
use rust_labmod::modules::EngageParams;
use rust_labmod::{ModuleError, ModuleSet, ModuleVariant, ThermocyclerStep};

fn full_deck(deck: &Deck) -> ModuleSet {
    let mut modules = ModuleSet::new(deck.run.clone());
    for (id, model, slot) in [
        ("tempdeck", ModuleModel::TemperatureV2, "1"),
        ("magdeck", ModuleModel::MagneticV2, "3"),
        ("hs", ModuleModel::HeaterShakerV1, "4"),
        ("tc", ModuleModel::ThermocyclerV1, "7"),
    ] {
        let module = ModuleVariant::simulated(&deck.run, id, model, None, slot).unwrap();
        modules.attach(module).unwrap();
    }
    modules
}

#[tokio::test(start_paused = true)]
async fn test_protocol_events_are_paired_and_ordered() {
    let deck = Deck::new(LATEST);
    let modules = full_deck(&deck);

    let tempdeck = modules.temperature("tempdeck").unwrap();
    tempdeck.set_target_and_block(4.0).await.unwrap();

    let magdeck = modules.magnetic("magdeck").unwrap();
    magdeck
        .context()
        .load_labware("nest_96_wellplate_100ul_pcr_full_skirt", None, None, None)
        .unwrap();
    magdeck.engage(EngageParams::default()).await.unwrap();

    let hs = modules.heater_shaker("hs").unwrap();
    hs.close_labware_latch().await.unwrap();
    hs.set_and_wait_for_temperature(37.0).await.unwrap();

    let tc = modules.thermocycler("tc").unwrap();
    tc.close_lid().await.unwrap();
    tc.execute_profile(&[ThermocyclerStep::new(95.0).seconds(1.0)], 2, None)
        .await
        .unwrap();

    let events = deck.events.events();
    assert_well_bracketed(&events);

    let ids: HashSet<_> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids.len(), events.len() / 2);

    let opened: Vec<_> = events
        .iter()
        .filter(|e| e.phase == CommandPhase::Before)
        .map(|e| (e.source.as_str(), e.name.as_str()))
        .collect();
    assert_eq!(
        opened,
        vec![
            ("tempdeck", "command.TEMPDECK_SET_TEMP"),
            ("magdeck", "command.MAGDECK_ENGAGE"),
            ("hs", "command.HEATER_SHAKER_CLOSE_LABWARE_LATCH"),
            ("hs", "command.HEATER_SHAKER_SET_TARGET_TEMPERATURE"),
            ("hs", "command.HEATER_SHAKER_WAIT_FOR_TEMPERATURE"),
            ("tc", "command.THERMOCYCLER_CLOSE"),
            ("tc", "command.THERMOCYCLER_EXECUTE_PROFILE"),
        ]
    );
    assert!(events.iter().all(|e| e.error.is_none()));
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_out_of_range_temperature_sends_nothing() {
    let deck = Deck::new(LATEST);
    let (tempdeck, tempdeck_sim) = deck.temperature_module();
    let (tc, tc_sim) = deck.thermocycler();
    let (hs, hs_sim) = deck.heater_shaker();

    for result in [
        tempdeck.set_target_and_block(200.0).await,
        tempdeck.set_target_nonblocking(200.0).await,
        tc.set_block_temperature(200.0, None, None, None).await,
        tc.set_lid_temperature(200.0).await,
        hs.set_target_temperature(200.0).await,
    ] {
        assert!(matches!(result, Err(ModuleError::Validation(_))), "{:?}", result);
    }

    assert!(tempdeck_sim.log().is_empty());
    assert!(tc_sim.log().is_empty());
    assert!(hs_sim.log().is_empty());
    assert!(deck.events.events().is_empty());
    assert_eq!(tempdeck.target(), None);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_deactivates_everything() {
    let deck = Deck::new(LATEST);
    let modules = full_deck(&deck);

    modules.temperature("tempdeck").unwrap().set_target_nonblocking(40.0).await.unwrap();
    modules.thermocycler("tc").unwrap().set_lid_temperature(100.0).await.unwrap();
    deck.events.clear();

    modules.teardown().await.unwrap();

    let closed: Vec<_> = deck
        .events
        .events()
        .into_iter()
        .filter(|e| e.phase == CommandPhase::After)
        .map(|e| e.name)
        .collect();
    assert_eq!(
        closed,
        vec![
            "command.TEMPDECK_DEACTIVATE",
            "command.MAGDECK_DISENGAGE",
            "command.HEATER_SHAKER_DEACTIVATE_SHAKER",
            "command.HEATER_SHAKER_DEACTIVATE_HEATER",
            "command.THERMOCYCLER_DEACTIVATE",
        ]
    );
}

#[test]
fn test_lookup_by_id_and_kind() {
    let deck = Deck::new(LATEST);
    let modules = full_deck(&deck);

    assert_eq!(modules.len(), 4);
    assert_eq!(modules.get("tc").map(|m| m.kind()), Some(ModuleKind::Thermocycler));
    assert!(modules.get("missing").is_none());
    assert!(matches!(modules.magnetic("tc"), Err(ModuleError::Config(_))));
    assert!(matches!(modules.temperature("missing"), Err(ModuleError::Config(_))));
}

#[test]
fn test_slots_and_ids_are_unique() {
    let deck = Deck::new(LATEST);
    let mut modules = full_deck(&deck);

    let same_slot = ModuleVariant::simulated(&deck.run, "tempdeck-2", ModuleModel::TemperatureV1, None, "1").unwrap();
    assert!(matches!(modules.attach(same_slot), Err(ModuleError::Config(_))));

    let same_id = ModuleVariant::simulated(&deck.run, "tc", ModuleModel::TemperatureV1, None, "2").unwrap();
    assert!(matches!(modules.attach(same_id), Err(ModuleError::Config(_))));
    assert_eq!(modules.len(), 4);
}

#[test]
fn test_newer_model_satisfies_older_request() {
    let deck = Deck::new(LATEST);
    let module = ModuleVariant::simulated(
        &deck.run,
        "magdeck",
        ModuleModel::MagneticV2,
        Some(ModuleModel::MagneticV1),
        "3",
    )
    .unwrap();
    assert_eq!(module.context().model(), ModuleModel::MagneticV2);
    assert_eq!(module.context().requested_as(), ModuleModel::MagneticV1);

    let err = ModuleVariant::simulated(
        &deck.run,
        "magdeck",
        ModuleModel::MagneticV2,
        Some(ModuleModel::TemperatureV2),
        "3",
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::Config(_)));
}

#[tokio::test(start_paused = true)]
async fn test_await_without_target_times_out() {
    let deck = Deck::with_timeout(LATEST, Duration::from_secs(30));
    let (tempdeck, handle) = deck.temperature_module();

    let err = tempdeck.await_target(25.0).await.unwrap_err();
    assert!(matches!(err, ModuleError::HardwareTimeout { .. }));
    assert!(handle.log().is_empty());
    assert_eq!(tempdeck.status().await.unwrap(), TemperatureStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_driver_failure_propagates() {
    let deck = Deck::new(LATEST);
    let (tempdeck, handle) = deck.temperature_module();
    handle.fail_commands(true);

    let err = tempdeck.set_target_and_block(40.0).await.unwrap_err();
    assert!(matches!(err, ModuleError::Driver(_)));
    assert!(!err.is_precondition());
    assert_eq!(tempdeck.target(), None);

    let events = deck.events.events();
    assert_well_bracketed(&events);
    assert!(events[1].error.is_some());
}
