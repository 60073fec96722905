//! Writers for audited files, protocol variants and the combination dump.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{AUDITED_DIR_NAME, AUDITED_FILE_PREFIX, COMBINATION_DUMP_FILE};
use crate::errors::ScanResult;
use crate::models::ParameterAssignment;
use crate::syntax::parser::ParsedProtocol;
use crate::transform::patcher::patch_parsed;

/// `<base>/Z_Test_Audited/AUDIT_<file_name>`.
pub fn audited_output_path(base_dir: &Path, file_name: &str) -> PathBuf {
    base_dir
        .join(AUDITED_DIR_NAME)
        .join(format!("{AUDITED_FILE_PREFIX}{file_name}"))
}

/// Write rewritten protocol text to its audited location.
pub fn write_audited(base_dir: &Path, file_name: &str, source: &str) -> ScanResult<PathBuf> {
    let path = audited_output_path(base_dir, file_name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, source)?;
    info!(path = %path.display(), "audited protocol written");
    Ok(path)
}

/// `{index}_{file_name}`, with `index` starting at 1.
pub fn variant_file_name(index: usize, file_name: &str) -> String {
    format!("{index}_{file_name}")
}

/// A variant that was not written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantOutput {
    pub written: Vec<PathBuf>,
    pub failures: Vec<VariantFailure>,
}

/// Patch `source` once per assignment and write each variant to `out_dir`.
///
/// A variant with any failed substitution is not written; the remaining
/// variants still are. Unparseable `source` is an error.
pub fn write_variants(
    out_dir: &Path,
    file_name: &str,
    source: &str,
    assignments: &[ParameterAssignment],
) -> ScanResult<VariantOutput> {
    let parsed = ParsedProtocol::parse(file_name, source)?;
    std::fs::create_dir_all(out_dir)?;
    let mut output = VariantOutput::default();

    for (offset, assignment) in assignments.iter().enumerate() {
        let index = offset + 1;
        let patched = match patch_parsed(&parsed, assignment) {
            Ok(patched) => patched,
            Err(err) => {
                output.failures.push(VariantFailure {
                    index,
                    message: err.to_string(),
                });
                continue;
            }
        };
        if !patched.is_complete() {
            let message = patched
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.parameter, f.message))
                .collect::<Vec<_>>()
                .join("; ");
            warn!(index, "variant skipped: {message}");
            output.failures.push(VariantFailure { index, message });
            continue;
        }
        let path = out_dir.join(variant_file_name(index, file_name));
        std::fs::write(&path, patched.source)?;
        info!(path = %path.display(), "generated variant");
        output.written.push(path);
    }
    Ok(output)
}

/// Every assignment as a numbered `Combination #N:` block.
pub fn render_combination_dump(assignments: &[ParameterAssignment]) -> String {
    let mut out = String::new();
    for (offset, assignment) in assignments.iter().enumerate() {
        out.push_str(&format!("\nCombination #{}:\n", offset + 1));
        out.push_str(&assignment.pretty());
    }
    out
}

/// Write the combination dump to `<out_dir>/output.txt`.
pub fn write_combination_dump(
    out_dir: &Path,
    assignments: &[ParameterAssignment],
) -> ScanResult<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(COMBINATION_DUMP_FILE);
    std::fs::write(&path, render_combination_dump(assignments))?;
    info!(path = %path.display(), count = assignments.len(), "combination dump written");
    Ok(path)
}
