//! Hardware module detection by scanning protocol text.

use indexmap::{IndexMap, IndexSet};

/// Raw search string to the module name it identifies.
pub const MODULE_SEARCH_MAP: &[(&str, &str)] = &[
    ("NYI", "Absorbance Plate Reader Module"),
    ("thermocycler module gen2", "Thermocycler Module GEN 2"),
    ("thermocyclerModuleV2", "Thermocycler Module GEN 2"),
    ("flexStackerModuleV1", "Flex Stacker Module V1"),
    ("magneticBlockV1", "Magnetic Block V1"),
    ("heaterShakerModuleV1", "Heater-Shaker Module GEN 1"),
    ("temperature module gen2", "Temperature Module GEN 2"),
    ("temperatureModuleV2", "Temperature Module GEN 2"),
    (
        "opentrons_tough_pcr_auto_sealing_lid",
        "PCR Auto Sealing Lid",
    ),
];

/// Module names found in `source`, each at most once, in map order.
pub fn detect_modules(source: &str) -> Vec<&'static str> {
    let found: IndexSet<&'static str> = MODULE_SEARCH_MAP
        .iter()
        .filter(|(key, _)| source.contains(key))
        .map(|(_, name)| *name)
        .collect();
    found.into_iter().collect()
}

/// A usage counter with every known module name set to zero.
pub fn module_counter() -> IndexMap<String, usize> {
    MODULE_SEARCH_MAP
        .iter()
        .map(|(_, name)| (name.to_string(), 0))
        .collect()
}
