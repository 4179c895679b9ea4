//! Module variants and the per-run module set.
//!
//! [`ModuleVariant`] is the closed set of attachable modules. The enclosing
//! engine holds a [`ModuleSet`] for the run, looks modules up by id, and
//! tears the set down at the end, which deactivates every module.

pub mod heater_shaker;
pub mod magnetic;
pub mod temperature;
pub mod thermocycler;

use labmod_core::model::{ModuleKind, ModuleModel};
use labmod_core::{ModuleError, ModuleResult};
use labmod_driver_mock::{SimHeaterShaker, SimMagneticModule, SimTemperatureModule, SimThermocycler};
use tracing::{info, warn};

use crate::context::{ModuleContext, RunContext};

pub use heater_shaker::HeaterShaker;
pub use magnetic::{EngageParams, EngageSource, MagneticModule, ResolvedEngage};
pub use temperature::TemperatureModule;
pub use thermocycler::Thermocycler;

pub(crate) fn ensure_kind(ctx: &ModuleContext, kind: ModuleKind) -> ModuleResult<()> {
    if ctx.model().kind() == kind {
        Ok(())
    } else {
        Err(ModuleError::Config(format!(
            "module '{}' is a {} and cannot be driven as a {}",
            ctx.id(),
            ctx.model().kind(),
            kind
        )))
    }
}

#[derive(Debug)]
pub enum ModuleVariant {
    Temperature(TemperatureModule),
    Magnetic(MagneticModule),
    Thermocycler(Thermocycler),
    HeaterShaker(HeaterShaker),
}

impl ModuleVariant {
    /// Attach a module backed by the simulated driver for `model`.
    pub fn simulated(
        run: &RunContext,
        id: impl Into<String>,
        model: ModuleModel,
        requested_as: Option<ModuleModel>,
        slot: impl Into<String>,
    ) -> ModuleResult<Self> {
        let ctx = ModuleContext::new(run, id, model, requested_as.unwrap_or(model), slot)?;
        Ok(match model.kind() {
            ModuleKind::Temperature => {
                ModuleVariant::Temperature(TemperatureModule::new(ctx, Box::new(SimTemperatureModule::new()))?)
            }
            ModuleKind::Magnetic => {
                ModuleVariant::Magnetic(MagneticModule::new(ctx, Box::new(SimMagneticModule::new()))?)
            }
            ModuleKind::Thermocycler => {
                ModuleVariant::Thermocycler(Thermocycler::new(ctx, Box::new(SimThermocycler::new()))?)
            }
            ModuleKind::HeaterShaker => {
                ModuleVariant::HeaterShaker(HeaterShaker::new(ctx, Box::new(SimHeaterShaker::new()))?)
            }
        })
    }

    pub fn context(&self) -> &ModuleContext {
        match self {
            ModuleVariant::Temperature(m) => m.context(),
            ModuleVariant::Magnetic(m) => m.context(),
            ModuleVariant::Thermocycler(m) => m.context(),
            ModuleVariant::HeaterShaker(m) => m.context(),
        }
    }

    pub fn id(&self) -> &str {
        self.context().id()
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            ModuleVariant::Temperature(_) => ModuleKind::Temperature,
            ModuleVariant::Magnetic(_) => ModuleKind::Magnetic,
            ModuleVariant::Thermocycler(_) => ModuleKind::Thermocycler,
            ModuleVariant::HeaterShaker(_) => ModuleKind::HeaterShaker,
        }
    }

    /// Return the module to a safe resting state.
    ///
    /// Every sub-system is stopped even if an earlier one fails; the first
    /// failure is returned.
    pub async fn deactivate(&self) -> ModuleResult<()> {
        match self {
            ModuleVariant::Temperature(m) => m.deactivate().await,
            ModuleVariant::Magnetic(m) => m.disengage().await,
            ModuleVariant::Thermocycler(m) => m.deactivate().await,
            ModuleVariant::HeaterShaker(m) => {
                let shaker = m.deactivate_shaker().await;
                let heater = m.deactivate_heater().await;
                shaker.and(heater)
            }
        }
    }
}

impl From<TemperatureModule> for ModuleVariant {
    fn from(module: TemperatureModule) -> Self {
        ModuleVariant::Temperature(module)
    }
}

impl From<MagneticModule> for ModuleVariant {
    fn from(module: MagneticModule) -> Self {
        ModuleVariant::Magnetic(module)
    }
}

impl From<Thermocycler> for ModuleVariant {
    fn from(module: Thermocycler) -> Self {
        ModuleVariant::Thermocycler(module)
    }
}

impl From<HeaterShaker> for ModuleVariant {
    fn from(module: HeaterShaker) -> Self {
        ModuleVariant::HeaterShaker(module)
    }
}

/// All modules attached for one run.
#[derive(Debug)]
pub struct ModuleSet {
    run: RunContext,
    modules: Vec<ModuleVariant>,
}

impl ModuleSet {
    pub fn new(run: RunContext) -> Self {
        Self {
            run,
            modules: Vec::new(),
        }
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// Add a module. Ids and slots must be unique within the set.
    pub fn attach(&mut self, module: impl Into<ModuleVariant>) -> ModuleResult<&ModuleVariant> {
        let module = module.into();
        if let Some(existing) = self
            .modules
            .iter()
            .find(|m| m.id() == module.id() || m.context().slot() == module.context().slot())
        {
            return Err(ModuleError::Config(format!(
                "cannot attach '{}' in slot {}: '{}' already occupies id or slot",
                module.id(),
                module.context().slot(),
                existing.id()
            )));
        }
        info!(
            module = module.id(),
            model = %module.context().model(),
            slot = module.context().slot(),
            "module attached"
        );
        self.modules.push(module);
        let index = self.modules.len() - 1;
        Ok(&self.modules[index])
    }

    pub fn get(&self, id: &str) -> Option<&ModuleVariant> {
        self.modules.iter().find(|m| m.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleVariant> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn temperature(&self, id: &str) -> ModuleResult<&TemperatureModule> {
        match self.lookup(id)? {
            ModuleVariant::Temperature(m) => Ok(m),
            other => Err(wrong_kind(other, ModuleKind::Temperature)),
        }
    }

    pub fn magnetic(&self, id: &str) -> ModuleResult<&MagneticModule> {
        match self.lookup(id)? {
            ModuleVariant::Magnetic(m) => Ok(m),
            other => Err(wrong_kind(other, ModuleKind::Magnetic)),
        }
    }

    pub fn thermocycler(&self, id: &str) -> ModuleResult<&Thermocycler> {
        match self.lookup(id)? {
            ModuleVariant::Thermocycler(m) => Ok(m),
            other => Err(wrong_kind(other, ModuleKind::Thermocycler)),
        }
    }

    pub fn heater_shaker(&self, id: &str) -> ModuleResult<&HeaterShaker> {
        match self.lookup(id)? {
            ModuleVariant::HeaterShaker(m) => Ok(m),
            other => Err(wrong_kind(other, ModuleKind::HeaterShaker)),
        }
    }

    /// Deactivate every module and release the drivers.
    ///
    /// Keeps going past failures and returns the first one.
    pub async fn teardown(self) -> ModuleResult<()> {
        let mut first_error = None;
        for module in &self.modules {
            if let Err(e) = module.deactivate().await {
                warn!(module = module.id(), error = %e, "deactivate failed during teardown");
                first_error.get_or_insert(e);
            }
        }
        info!(modules = self.modules.len(), "module set torn down");
        first_error.map_or(Ok(()), Err)
    }

    fn lookup(&self, id: &str) -> ModuleResult<&ModuleVariant> {
        self.get(id)
            .ok_or_else(|| ModuleError::Config(format!("no module with id '{}'", id)))
    }
}

fn wrong_kind(module: &ModuleVariant, wanted: ModuleKind) -> ModuleError {
    ModuleError::Config(format!(
        "module '{}' is a {}, not a {}",
        module.id(),
        module.kind(),
        wanted
    ))
}
