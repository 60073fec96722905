//! Protocol file discovery and content hashing.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::{INIT_FILE_NAME, PROTOCOL_EXTENSION};
use crate::errors::{ScanError, ScanResult};

/// A `.py` file other than the package initializer.
pub fn is_protocol_file(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    if name == INIT_FILE_NAME {
        return false;
    }
    path.extension()
        .map(|e| e == PROTOCOL_EXTENSION)
        .unwrap_or(false)
}

/// Protocol files directly inside `dir`, sorted by file name.
pub fn discover_protocols(dir: &Path) -> ScanResult<Vec<PathBuf>> {
    list_files(dir, is_protocol_file)
}

/// Every regular file directly inside `dir` accepted by `keep`, sorted.
pub fn list_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> ScanResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ScanError::DirectoryNotFound(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() && keep(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = files.len(), "discovered files");
    Ok(files)
}

/// SHA-256 of `data` as lowercase hex.
pub fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
