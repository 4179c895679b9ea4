//! Simulated deck runner.
//!
//! Usage: `labmod-sim [--config FILE] [--api-version X.Y] [--log-level LEVEL] [--json]`
//!
//! Attaches the configured modules with simulated drivers, runs a short demo
//! protocol against each and prints every command event as it happens.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use labmod_core::events::{BroadcastSink, CommandPhase};
use labmod_core::model::ModuleModel;
use labmod_driver_mock::{SimLabwareDefaults, SimPipetteMotion};
use rust_labmod::config::{LabmodConfig, ModuleDefinition};
use rust_labmod::modules::EngageParams;
use rust_labmod::{logging, ApiVersion, ModuleSet, ModuleVariant, RunContext, ThermocyclerStep};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "labmod-sim")]
#[command(about = "Run a demo protocol against simulated lab modules")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "config/labmod.toml")]
    config: PathBuf,

    /// Override the declared protocol API version
    #[arg(long)]
    api_version: Option<ApiVersion>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = LabmodConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(version) = args.api_version {
        config.protocol.api_version = version;
    }
    if let Some(level) = args.log_level {
        config.application.log_level = level;
    }
    if config.modules.is_empty() {
        config.modules = default_deck();
    }
    config.validate()?;
    logging::init(&config.application.log_level, args.json || config.application.json_logs)?;

    let sink = BroadcastSink::new(256);
    let mut events = sink.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match (event.phase, &event.error) {
                (CommandPhase::Before, _) => println!("[{}] {}", event.source, event.text),
                (CommandPhase::After, Some(err)) => println!("[{}]   failed: {}", event.source, err),
                (CommandPhase::After, None) => {}
            }
        }
    });

    let run = RunContext::builder(config.protocol.api_version)
        .sink(Arc::new(sink.clone()))
        .wait_policy(config.wait.policy())
        .labware_defaults(Arc::new(SimLabwareDefaults::with_standard_definitions()))
        .pipette_motion(Arc::new(SimPipetteMotion::new()))
        .build()?;
    info!(api_version = %run.api_version(), modules = config.modules.len(), "starting simulated run");

    let mut modules = ModuleSet::new(run.clone());
    for def in &config.modules {
        let module = ModuleVariant::simulated(&run, &def.id, def.model, def.requested_as, &def.slot)?;
        modules.attach(module)?;
    }

    let outcome = run_demo(&modules).await;
    if let Err(e) = &outcome {
        error!(error = %e, "demo protocol failed");
    }
    let teardown = modules.teardown().await;

    // The printer exits once every sender is gone.
    drop(sink);
    drop(run);
    let _ = printer.await;

    outcome?;
    teardown?;
    Ok(())
}

async fn run_demo(modules: &ModuleSet) -> Result<()> {
    for module in modules.iter() {
        match module {
            ModuleVariant::Temperature(m) => {
                m.set_target_and_block(4.0).await?;
                info!(module = module.id(), temperature = m.temperature().await?, "cold block ready");
            }
            ModuleVariant::Magnetic(m) => {
                m.context()
                    .load_labware("nest_96_wellplate_100ul_pcr_full_skirt", None, None, None)?;
                m.engage(EngageParams::default().height_from_base(5.0)).await?;
                m.disengage().await?;
            }
            ModuleVariant::Thermocycler(m) => {
                m.close_lid().await?;
                m.set_lid_temperature(105.0).await?;
                let pcr = [
                    ThermocyclerStep::new(95.0).seconds(1.0),
                    ThermocyclerStep::new(57.0).seconds(1.0),
                    ThermocyclerStep::new(72.0).seconds(1.0),
                ];
                m.execute_profile(&pcr, 3, Some(50.0)).await?;
                m.set_block_temperature(4.0, None, None, Some(50.0)).await?;
                m.deactivate_lid().await?;
                m.open_lid().await?;
            }
            ModuleVariant::HeaterShaker(m) => {
                m.close_labware_latch().await?;
                m.set_and_wait_for_temperature(37.0).await?;
                m.set_and_wait_for_shake_speed(1000).await?;
                m.deactivate_shaker().await?;
                m.open_labware_latch().await?;
            }
        }
    }
    Ok(())
}

fn default_deck() -> Vec<ModuleDefinition> {
    [
        ("tempdeck", ModuleModel::TemperatureV2, "1"),
        ("magdeck", ModuleModel::MagneticV2, "3"),
        ("heater_shaker", ModuleModel::HeaterShakerV1, "4"),
        ("thermocycler", ModuleModel::ThermocyclerV1, "7"),
    ]
    .into_iter()
    .map(|(id, model, slot)| ModuleDefinition {
        id: id.to_string(),
        kind: model.kind(),
        model,
        requested_as: None,
        slot: slot.to_string(),
    })
    .collect()
}
