//! Error types for the protoscan core library.

use std::path::PathBuf;

/// Top-level error enum for the protoscan core library.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("{file}: add_parameters function not found")]
    MissingEntryPoint { file: String },

    #[error("Cannot represent value as a literal: {0}")]
    Literal(String),

    #[error("Combination count {count} exceeds the limit of {limit}")]
    TooManyCombinations { count: u128, limit: usize },

    #[error("Simulator command '{0}' not found; is it installed and on PATH?")]
    SimulatorNotFound(String),

    #[error("Protocol directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        ScanError::Parse {
            file: file.into(),
            message: message.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<ScanError> for pyo3::PyErr {
    fn from(err: ScanError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};

        match &err {
            ScanError::Io(_) | ScanError::Walk(_) | ScanError::DirectoryNotFound(_) => {
                PyIOError::new_err(err.to_string())
            }
            ScanError::Parse { .. }
            | ScanError::Literal(_)
            | ScanError::TooManyCombinations { .. }
            | ScanError::Json(_) => PyValueError::new_err(err.to_string()),
            ScanError::MissingEntryPoint { .. } | ScanError::SimulatorNotFound(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
