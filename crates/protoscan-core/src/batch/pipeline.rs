//! Per-file analysis and batch accumulation.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::evaluator::SymbolTable;
use crate::analysis::heights::{audit_heights_with_symbols, HeightAudit, HeightThresholds};
use crate::analysis::labware::{classify_labware, LabwareCatalog, LabwareUsage};
use crate::analysis::metadata::{extract_metadata, ProtocolMetadata};
use crate::analysis::modules::{detect_modules, module_counter};
use crate::batch::discovery::{compute_content_hash, discover_protocols};
use crate::config::{
    env_f64, env_flag, ENV_BOTTOM_THRESHOLD, ENV_INSPECT_TOP_KEYWORD, ENV_TOP_THRESHOLD,
};
use crate::errors::{ScanError, ScanResult};
use crate::models::ParameterDeclaration;
use crate::params::extractor::{extract_parameters, UnresolvedField};
use crate::syntax::parser::ParsedProtocol;

/// Inputs shared by every file of a batch.
#[derive(Clone, Debug)]
pub struct AuditConfig {
    pub thresholds: HeightThresholds,
    pub catalog: LabwareCatalog,
    pub symbols: SymbolTable,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            thresholds: HeightThresholds::default(),
            catalog: LabwareCatalog::default(),
            symbols: SymbolTable::z_offsets(),
        }
    }
}

impl AuditConfig {
    /// Defaults with thresholds overridden from the environment.
    pub fn from_env() -> Self {
        let defaults = HeightThresholds::default();
        Self {
            thresholds: HeightThresholds {
                bottom: env_f64(ENV_BOTTOM_THRESHOLD, defaults.bottom),
                top: env_f64(ENV_TOP_THRESHOLD, defaults.top),
                inspect_top_keyword: env_flag(ENV_INSPECT_TOP_KEYWORD, defaults.inspect_top_keyword),
            },
            ..Self::default()
        }
    }
}

/// Declared parameters of one protocol.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub total: usize,
    /// Kind name to parameter names, kinds in first-seen order.
    pub types: IndexMap<String, Vec<String>>,
    pub declarations: Vec<ParameterDeclaration>,
    pub duplicates: Vec<String>,
    pub unresolved: Vec<UnresolvedField>,
}

/// Everything learned about one protocol file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolReport {
    pub file_name: String,
    /// File name without the extension.
    pub module_name: String,
    pub content_hash: Option<String>,
    pub metadata: ProtocolMetadata,
    pub parameters: Option<ParameterSummary>,
    pub parameters_error: Option<String>,
    pub modules: Vec<String>,
    pub heights: HeightAudit,
    pub labware: LabwareUsage,
    /// Set when the file could not be read or parsed.
    pub error: Option<String>,
}

impl ProtocolReport {
    fn new(file_name: &str) -> Self {
        let module_name = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());
        Self {
            file_name: file_name.to_string(),
            module_name,
            ..Self::default()
        }
    }

    fn failed(file_name: &str, message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::new(file_name)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The module name differs from the declared protocol name.
    pub fn name_mismatch(&self) -> bool {
        self.module_name != self.metadata.protocol_name_or_na()
    }

    pub fn total_parameters(&self) -> Option<usize> {
        self.parameters.as_ref().map(|p| p.total)
    }
}

/// Cross-file accumulator owned by the batch driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub module_usage: IndexMap<String, usize>,
    pub deprecated_labware: IndexMap<String, usize>,
    pub current_labware: IndexMap<String, usize>,
    pub reports: Vec<ProtocolReport>,
    pub failed_files: Vec<String>,
}

impl BatchReport {
    /// Zeroed counters for every known module and catalogued labware.
    pub fn new(catalog: &LabwareCatalog) -> Self {
        let labware = LabwareUsage::zeroed(catalog);
        Self {
            module_usage: module_counter(),
            deprecated_labware: labware.deprecated,
            current_labware: labware.current,
            reports: Vec::new(),
            failed_files: Vec::new(),
        }
    }

    /// Fold one file's report into the totals.
    pub fn record(&mut self, report: ProtocolReport) {
        if report.is_ok() {
            for module in &report.modules {
                *self.module_usage.entry(module.clone()).or_insert(0) += 1;
            }
            for (name, count) in &report.labware.deprecated {
                *self.deprecated_labware.entry(name.clone()).or_insert(0) += count;
            }
            for (name, count) in &report.labware.current {
                *self.current_labware.entry(name.clone()).or_insert(0) += count;
            }
        } else {
            self.failed_files.push(report.file_name.clone());
        }
        self.reports.push(report);
    }

    /// Files analysed without a read or parse failure.
    pub fn processed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_ok()).count()
    }

    pub fn total_height_violations(&self) -> usize {
        self.reports.iter().map(|r| r.heights.total_violations()).sum()
    }

    pub fn to_json(&self) -> ScanResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Analyse protocol text already in memory.
pub fn audit_source(file_name: &str, source: &str, config: &AuditConfig) -> ScanResult<ProtocolReport> {
    let parsed = ParsedProtocol::parse(file_name, source)?;
    let mut report = ProtocolReport::new(file_name);
    report.content_hash = Some(compute_content_hash(source.as_bytes()));
    report.metadata = extract_metadata(&parsed);

    match extract_parameters(&parsed) {
        Ok(extraction) => {
            report.parameters = Some(ParameterSummary {
                total: extraction.len(),
                types: extraction.types_summary(),
                declarations: extraction.declarations,
                duplicates: extraction.duplicates,
                unresolved: extraction.unresolved,
            });
        }
        Err(err) => report.parameters_error = Some(err.to_string()),
    }

    report.modules = detect_modules(source)
        .into_iter()
        .map(str::to_string)
        .collect();
    report.heights = audit_heights_with_symbols(&parsed, &config.thresholds, &config.symbols);
    report.labware = classify_labware(&parsed, &config.catalog);
    Ok(report)
}

/// Analyse one file. Read and parse failures land in the report's `error`.
pub fn audit_protocol(path: &Path, config: &AuditConfig) -> ProtocolReport {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    info!(file = file_name.as_str(), "processing protocol");

    let result = std::fs::read_to_string(path)
        .map_err(ScanError::from)
        .and_then(|source| audit_source(&file_name, &source, config));
    match result {
        Ok(report) => report,
        Err(err) => {
            warn!(file = file_name.as_str(), "protocol skipped: {err}");
            ProtocolReport::failed(&file_name, err.to_string())
        }
    }
}

/// Analyse every path in order, accumulating the totals.
pub fn audit_batch(paths: &[PathBuf], config: &AuditConfig) -> BatchReport {
    let mut batch = BatchReport::new(&config.catalog);
    for path in paths {
        batch.record(audit_protocol(path, config));
    }
    info!(
        processed = batch.processed(),
        failed = batch.failed_files.len(),
        "batch audit complete"
    );
    batch
}

/// Discover and analyse every protocol in `dir`.
pub fn audit_directory(dir: &Path, config: &AuditConfig) -> ScanResult<BatchReport> {
    let paths = discover_protocols(dir)?;
    Ok(audit_batch(&paths, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTOCOL: &str = r#"
metadata = {"protocolName": "pcr_setup", "author": "Automation Team"}
requirements = {"robotType": "Flex", "apiLevel": "2.20"}

def add_parameters(parameters):
    parameters.add_int(variable_name="columns", default=1, minimum=1, maximum=12)
    parameters.add_bool(variable_name="dry_run", default=False)

def run(ctx):
    tc = ctx.load_module("thermocyclerModuleV2")
    res = ctx.load_labware("nest_12_reservoir_15ml", "D1")
    again = ctx.load_labware("nest_12_reservoir_15ml", "D2")
    p = ctx.load_instrument("flex_1channel_50", "left")
    p.aspirate(10, res["A1"].bottom(z=-1))
    p.dispense(10, res["A2"].top(-12))
"#;

    #[test]
    fn test_audit_source_collects_everything() {
        let report = audit_source("pcr_setup.py", PROTOCOL, &AuditConfig::default()).unwrap();
        assert!(report.is_ok());
        assert_eq!(report.module_name, "pcr_setup");
        assert!(!report.name_mismatch());
        assert_eq!(report.metadata.robot_type_or_na(), "Flex");
        assert_eq!(report.total_parameters(), Some(2));
        assert_eq!(report.modules, vec!["Thermocycler Module GEN 2".to_string()]);
        assert_eq!(report.heights.bottom_violations, 1);
        assert_eq!(report.heights.top_violations, 1);
        assert_eq!(report.labware.deprecated["nest_12_reservoir_15ml"], 1);
        assert_eq!(report.content_hash.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_missing_entry_point_is_recorded() {
        let report = audit_source("plain.py", "def run(ctx):\n    pass\n", &AuditConfig::default())
            .unwrap();
        assert!(report.parameters.is_none());
        assert!(report
            .parameters_error
            .as_deref()
            .is_some_and(|e| e.contains("add_parameters")));
        assert!(report.name_mismatch());
    }

    #[test]
    fn test_batch_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_good.py"), PROTOCOL).unwrap();
        std::fs::write(dir.path().join("b_broken.py"), "def run(:\n").unwrap();
        std::fs::write(dir.path().join("c_good.py"), PROTOCOL).unwrap();

        let batch = audit_directory(dir.path(), &AuditConfig::default()).unwrap();
        assert_eq!(batch.reports.len(), 3);
        assert_eq!(batch.processed(), 2);
        assert_eq!(batch.failed_files, vec!["b_broken.py".to_string()]);
        assert_eq!(batch.module_usage["Thermocycler Module GEN 2"], 2);
        assert_eq!(batch.module_usage["Magnetic Block V1"], 0);
        assert_eq!(batch.deprecated_labware["nest_12_reservoir_15ml"], 2);
        assert_eq!(batch.current_labware.values().sum::<usize>(), 0);
        assert_eq!(batch.total_height_violations(), 4);
    }

    #[test]
    fn test_unreadable_file_is_captured() {
        let report = audit_protocol(Path::new("/no/such/file.py"), &AuditConfig::default());
        assert!(!report.is_ok());
        assert_eq!(report.file_name, "file.py");
    }

    #[test]
    fn test_batch_report_json() {
        let mut batch = BatchReport::new(&LabwareCatalog::default());
        batch.record(audit_source("pcr_setup.py", PROTOCOL, &AuditConfig::default()).unwrap());
        let json = batch.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["reports"][0]["module_name"], "pcr_setup");
        assert_eq!(value["module_usage"]["Thermocycler Module GEN 2"], 1);
    }
}
