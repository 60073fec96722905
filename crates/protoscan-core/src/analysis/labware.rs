//! Deprecated / current labware classification from `load_labware` calls.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::syntax::literals::string_literal;
use crate::syntax::parser::ParsedProtocol;

const DEPRECATED_LABWARE: &[&str] = &[
    "nest_1_reservoir_195ml",
    "nest_12_reservoir_15ml",
    "nest_1_reservoir_290ml",
    "armadillo_96_wellplate_200ul_pcr_full_skirt",
    "nest_96_wellplate_2ml_deep",
    "No pre-existing Standard",
];

const CURRENT_LABWARE: &[&str] = &[
    "opentrons_96_wellplate_200ul_pcr_full_skirt",
    "opentrons_tough_12_reservoir_22ml",
    "opentrons_tough_1_reservoir_300ml",
    "opentrons_tough_4_reservoir_72ml",
    "opentrons_tough_universal_lid",
];

/// The two labware catalogs names are classified against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabwareCatalog {
    pub deprecated: IndexSet<String>,
    pub current: IndexSet<String>,
}

impl Default for LabwareCatalog {
    fn default() -> Self {
        Self {
            deprecated: DEPRECATED_LABWARE.iter().map(|s| s.to_string()).collect(),
            current: CURRENT_LABWARE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LabwareCatalog {
    pub fn status(&self, load_name: &str) -> Option<LabwareStatus> {
        if self.deprecated.contains(load_name) {
            Some(LabwareStatus::Deprecated)
        } else if self.current.contains(load_name) {
            Some(LabwareStatus::Current)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabwareStatus {
    Deprecated,
    Current,
}

/// First occurrence of a catalogued labware name in one file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabwareHit {
    pub name: String,
    pub line: usize,
    pub status: LabwareStatus,
}

/// Per-catalog usage counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LabwareUsage {
    pub deprecated: IndexMap<String, usize>,
    pub current: IndexMap<String, usize>,
    pub hits: Vec<LabwareHit>,
}

impl LabwareUsage {
    /// Zeroed counters for every catalogued name, in catalog order.
    pub fn zeroed(catalog: &LabwareCatalog) -> Self {
        Self {
            deprecated: catalog.deprecated.iter().map(|n| (n.clone(), 0)).collect(),
            current: catalog.current.iter().map(|n| (n.clone(), 0)).collect(),
            hits: Vec::new(),
        }
    }

    pub fn deprecated_total(&self) -> usize {
        self.deprecated.values().sum()
    }

    pub fn current_total(&self) -> usize {
        self.current.values().sum()
    }
}

/// Count each catalogued labware name at most once for this protocol.
pub fn classify_labware(parsed: &ParsedProtocol, catalog: &LabwareCatalog) -> LabwareUsage {
    let source = parsed.source();
    let mut usage = LabwareUsage::zeroed(catalog);
    let mut seen: HashSet<String> = HashSet::new();

    for call in parsed.method_calls("load_labware") {
        let Some(load_name) = call
            .first_positional()
            .and_then(|arg| string_literal(arg, source))
        else {
            continue;
        };
        let Some(status) = catalog.status(&load_name) else {
            continue;
        };
        if !seen.insert(load_name.clone()) {
            continue;
        }

        let counters = match status {
            LabwareStatus::Deprecated => &mut usage.deprecated,
            LabwareStatus::Current => &mut usage.current,
        };
        *counters.entry(load_name.clone()).or_insert(0) += 1;
        info!(
            file = parsed.file_name(),
            line = call.line(),
            "{} labware: {load_name}",
            match status {
                LabwareStatus::Deprecated => "Old",
                LabwareStatus::Current => "New",
            }
        );
        usage.hits.push(LabwareHit {
            name: load_name,
            line: call.line(),
            status,
        });
    }

    usage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(source: &str) -> LabwareUsage {
        let parsed = ParsedProtocol::parse("labware.py", source).unwrap();
        classify_labware(&parsed, &LabwareCatalog::default())
    }

    #[test]
    fn test_same_labware_counted_once_per_file() {
        let source = "\
res = ctx.load_labware('nest_1_reservoir_195ml', 1)
res2 = ctx.load_labware('nest_1_reservoir_195ml', 2)
res3 = ctx.load_labware(\"nest_1_reservoir_195ml\", 3)
";
        let usage = classify(source);
        assert_eq!(usage.deprecated["nest_1_reservoir_195ml"], 1);
        assert_eq!(usage.deprecated_total(), 1);
        assert_eq!(usage.hits.len(), 1);
        assert_eq!(usage.hits[0].line, 1);
    }

    #[test]
    fn test_current_and_unknown_labware() {
        let source = "\
a = ctx.load_labware('opentrons_tough_12_reservoir_22ml', 1)
b = ctx.load_labware('corning_96_wellplate_360ul_flat', 2)
c = ctx.load_labware(name_var, 3)
d = ctx.load_labware(load_name='nest_12_reservoir_15ml', location=4)
";
        let usage = classify(source);
        assert_eq!(usage.current_total(), 1);
        assert_eq!(usage.current["opentrons_tough_12_reservoir_22ml"], 1);
        assert_eq!(usage.deprecated_total(), 0);
        assert_eq!(usage.hits.len(), 1);
    }

    #[test]
    fn test_zeroed_counters_cover_catalog() {
        let usage = classify("x = 1\n");
        assert_eq!(usage.deprecated.len(), DEPRECATED_LABWARE.len());
        assert_eq!(usage.current.len(), CURRENT_LABWARE.len());
        assert!(usage.deprecated.values().all(|c| *c == 0));
    }
}
