//! Batch simulation of generated protocol variants.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::SIMULATOR_COMMAND;
use crate::errors::{ScanError, ScanResult};

static INDEX_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)(?:_|$)").unwrap());

/// Result of simulating one file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub file_name: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Something that can run a protocol file and judge it.
pub trait Simulator {
    /// Only a missing simulator is an `Err`; a failing protocol is an
    /// unsuccessful outcome.
    fn simulate(&self, path: &Path) -> ScanResult<SimulationOutcome>;
}

/// Runs an external simulator binary with the file name as its argument,
/// from the file's own directory.
#[derive(Clone, Debug)]
pub struct CommandSimulator {
    program: String,
}

impl Default for CommandSimulator {
    fn default() -> Self {
        Self::new(SIMULATOR_COMMAND)
    }
}

impl CommandSimulator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Simulator for CommandSimulator {
    fn simulate(&self, path: &Path) -> ScanResult<SimulationOutcome> {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let mut command = Command::new(&self.program);
        command.arg(&file_name);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let output = match command.output() {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ScanError::SimulatorNotFound(self.program.clone()));
            }
            Err(err) => {
                return Ok(SimulationOutcome {
                    file_name,
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: err.to_string(),
                });
            }
        };
        Ok(SimulationOutcome {
            file_name,
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Aggregate over one simulation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub failures: usize,
    /// Sorted by numeric file-name prefix; names without one come first.
    pub failed_files: Vec<String>,
    pub outcomes: Vec<SimulationOutcome>,
}

impl SimulationSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.len() - self.failures
    }
}

/// Leading `N_` index of a variant file name, or -1.
pub fn numeric_prefix(file_name: &str) -> i64 {
    INDEX_PREFIX_RE
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(-1)
}

/// Stable sort by [`numeric_prefix`].
pub fn sort_failed_files(files: &mut [String]) {
    files.sort_by_key(|name| numeric_prefix(name));
}

/// Simulate every path in order. A missing simulator aborts the run.
pub fn simulate_batch(paths: &[PathBuf], simulator: &dyn Simulator) -> ScanResult<SimulationSummary> {
    let mut summary = SimulationSummary::default();
    for path in paths {
        let outcome = match simulator.simulate(path) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("simulation aborted: {err}");
                return Err(err);
            }
        };
        if outcome.success {
            info!(file = outcome.file_name.as_str(), "simulation successful");
        } else {
            warn!(
                file = outcome.file_name.as_str(),
                exit_code = ?outcome.exit_code,
                "simulation failed: {}",
                outcome.stderr.trim_end()
            );
            summary.failures += 1;
            summary.failed_files.push(outcome.file_name.clone());
        }
        summary.outcomes.push(outcome);
    }
    sort_failed_files(&mut summary.failed_files);
    info!(
        total = summary.outcomes.len(),
        failures = summary.failures,
        "simulation run complete"
    );
    Ok(summary)
}
