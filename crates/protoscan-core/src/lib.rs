//! protoscan core library: static auditing and variant generation for
//! liquid-handling robot protocols.
//!
//! Protocols are parsed with tree-sitter, never executed. The crate audits
//! well-height offsets and reservoir labware, clamps unsafe offsets, reads
//! runtime-parameter declarations, enumerates their combinations and writes
//! patched variants. With the `python` feature it builds as the
//! `_protoscan_core` extension module.

pub mod analysis;
pub mod batch;
pub mod config;
pub mod errors;
pub mod models;
pub mod params;
pub mod syntax;
pub mod transform;

#[cfg(feature = "python")]
mod bindings;

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::wrap_pyfunction;

// ---------------------------------------------------------------------------
// Top-level Python module: _protoscan_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _protoscan_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // -- Constants ------------------------------------------------------------
    m.add("DEFAULT_BOTTOM_THRESHOLD", config::DEFAULT_BOTTOM_THRESHOLD)?;
    m.add("DEFAULT_TOP_THRESHOLD", config::DEFAULT_TOP_THRESHOLD)?;
    m.add("AUDITED_DIR_NAME", config::AUDITED_DIR_NAME)?;
    m.add("SIMULATOR_COMMAND", config::SIMULATOR_COMMAND)?;

    // -- Auditing -------------------------------------------------------------
    m.add_function(wrap_pyfunction!(bindings::audit_directory, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::audit_directory_text, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::compute_content_hash, m)?)?;

    // -- Rewriting ------------------------------------------------------------
    m.add_function(wrap_pyfunction!(bindings::rewrite_source, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::rewrite_directory, m)?)?;

    // -- Parameters -----------------------------------------------------------
    m.add_function(wrap_pyfunction!(bindings::extract_parameters, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::generate_combinations, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::generate_variants, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::patch_defaults, m)?)?;

    // -- Simulation -----------------------------------------------------------
    m.add_function(wrap_pyfunction!(bindings::simulate_directory, m)?)?;

    Ok(())
}
