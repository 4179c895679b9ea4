//! Simulated labware definition registry.

use std::collections::HashMap;

use labmod_core::driver::LabwareDefaults;

/// In-memory map from labware load name to default magnet engage height.
#[derive(Debug, Clone, Default)]
pub struct SimLabwareDefaults {
    heights: HashMap<String, f64>,
}

impl SimLabwareDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with a few common magnetic-module plates (mm above labware bottom).
    pub fn with_standard_definitions() -> Self {
        Self::new()
            .with("nest_96_wellplate_100ul_pcr_full_skirt", 20.0)
            .with("biorad_96_wellplate_200ul_pcr", 18.0)
            .with("nest_96_wellplate_2ml_deep", 6.8)
            .with("usascientific_96_wellplate_2.4ml_deep", 14.94)
    }

    pub fn with(mut self, load_name: impl Into<String>, height_mm: f64) -> Self {
        self.heights.insert(load_name.into(), height_mm);
        self
    }
}

impl LabwareDefaults for SimLabwareDefaults {
    fn default_engage_height(&self, load_name: &str) -> Option<f64> {
        self.heights.get(load_name).copied()
    }
}
