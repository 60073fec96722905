//! Python entry points for the `_protoscan_core` extension module.

use std::path::Path;

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use serde::Serialize;

use crate::batch::discovery::{self, discover_protocols};
use crate::batch::output::{write_combination_dump, write_variants};
use crate::batch::pipeline::{self, AuditConfig};
use crate::batch::report::render_batch_report;
use crate::batch::rewrite::rewrite_batch;
use crate::batch::simulate::{simulate_batch, CommandSimulator};
use crate::config::{combination_limit_from_env, DEFAULT_VARIANT_DIR};
use crate::errors::ScanError;
use crate::models::ParameterAssignment;
use crate::params::combinations;
use crate::params::extractor::extract_parameters_from_path;
use crate::transform::{patcher, rewriter};

/// Round-trip a serializable value through Python's `json` module.
fn to_python<T: Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    let json_str =
        serde_json::to_string(value).map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    let json_module = py.import("json")?;
    json_module
        .call_method1("loads", (json_str,))
        .map(|o| o.into())
}

fn assignment_from_python(
    py: Python<'_>,
    assignment: &Bound<'_, PyAny>,
) -> PyResult<ParameterAssignment> {
    let json_module = py.import("json")?;
    let json_str: String = json_module.call_method1("dumps", (assignment,))?.extract()?;
    Ok(serde_json::from_str(&json_str).map_err(ScanError::from)?)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Batch report for every protocol in `directory`, as a dict.
#[pyfunction]
pub fn audit_directory(py: Python<'_>, directory: &str) -> PyResult<PyObject> {
    let batch = pipeline::audit_directory(Path::new(directory), &AuditConfig::from_env())?;
    to_python(py, &batch)
}

/// The plain-text comprehensive report for `directory`.
#[pyfunction]
pub fn audit_directory_text(directory: &str) -> PyResult<String> {
    let batch = pipeline::audit_directory(Path::new(directory), &AuditConfig::from_env())?;
    Ok(render_batch_report(&batch))
}

#[pyfunction]
#[pyo3(signature = (source, file_name="protocol.py", threshold=None, clamp_top=None))]
pub fn rewrite_source(
    py: Python<'_>,
    source: &str,
    file_name: &str,
    threshold: Option<f64>,
    clamp_top: Option<bool>,
) -> PyResult<PyObject> {
    let mut policy = rewriter::RewritePolicy::from_env();
    if let Some(threshold) = threshold {
        policy.threshold = threshold;
    }
    if let Some(clamp_top) = clamp_top {
        policy.clamp_top_values = clamp_top;
    }
    let outcome = rewriter::rewrite_source(file_name, source, &policy)?;
    to_python(py, &outcome)
}

/// Clamp every protocol in `directory` and write the audited copies.
/// Returns `{"written": [...], "failed": [[file, error], ...]}`.
#[pyfunction]
pub fn rewrite_directory(py: Python<'_>, directory: &str) -> PyResult<PyObject> {
    let dir = Path::new(directory);
    let paths = discover_protocols(dir)?;
    let report = rewrite_batch(&paths, &rewriter::RewritePolicy::from_env(), dir);
    to_python(py, &report)
}

#[pyfunction]
pub fn extract_parameters(py: Python<'_>, path: &str) -> PyResult<PyObject> {
    let extraction = extract_parameters_from_path(Path::new(path))?;
    to_python(py, &extraction)
}

/// Every assignment of the protocol's declared parameters.
#[pyfunction]
#[pyo3(signature = (path, limit=None))]
pub fn generate_combinations(
    py: Python<'_>,
    path: &str,
    limit: Option<usize>,
) -> PyResult<PyObject> {
    let extraction = extract_parameters_from_path(Path::new(path))?;
    let limit = limit.or_else(combination_limit_from_env);
    let assignments = combinations::generate_combinations(&extraction.declarations, limit)?;
    to_python(py, &assignments)
}

/// Write one patched variant per assignment plus the combination dump.
#[pyfunction]
#[pyo3(signature = (path, out_dir=DEFAULT_VARIANT_DIR, limit=None))]
pub fn generate_variants(
    py: Python<'_>,
    path: &str,
    out_dir: &str,
    limit: Option<usize>,
) -> PyResult<PyObject> {
    let path = Path::new(path);
    let out_dir = Path::new(out_dir);
    let source = std::fs::read_to_string(path).map_err(ScanError::from)?;
    let extraction = extract_parameters_from_path(path)?;
    let limit = limit.or_else(combination_limit_from_env);
    let assignments = combinations::generate_combinations(&extraction.declarations, limit)?;
    write_combination_dump(out_dir, &assignments)?;
    let output = write_variants(out_dir, &file_name_of(path), &source, &assignments)?;
    to_python(py, &output)
}

#[pyfunction]
#[pyo3(signature = (source, assignment, file_name="protocol.py"))]
pub fn patch_defaults(
    py: Python<'_>,
    source: &str,
    assignment: &Bound<'_, PyAny>,
    file_name: &str,
) -> PyResult<PyObject> {
    let assignment = assignment_from_python(py, assignment)?;
    let outcome = patcher::patch_defaults(file_name, source, &assignment)?;
    to_python(py, &outcome)
}

/// Run the simulator over every protocol in `directory`.
#[pyfunction]
#[pyo3(signature = (directory, program=None))]
pub fn simulate_directory(
    py: Python<'_>,
    directory: &str,
    program: Option<&str>,
) -> PyResult<PyObject> {
    let simulator = program.map(CommandSimulator::new).unwrap_or_default();
    let paths = discover_protocols(Path::new(directory))?;
    let summary = simulate_batch(&paths, &simulator)?;
    to_python(py, &summary)
}

#[pyfunction]
pub fn compute_content_hash(data: &[u8]) -> String {
    discovery::compute_content_hash(data)
}
