//! Batch height clamping into the audited output directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::batch::output::write_audited;
use crate::errors::ScanResult;
use crate::transform::rewriter::{rewrite_source, RewritePolicy};

/// Outcome of clamping a batch of protocols.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteBatchReport {
    pub written: Vec<PathBuf>,
    /// `(file name, error)` for each file that was not rewritten.
    pub failed: Vec<(String, String)>,
}

impl RewriteBatchReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

fn rewrite_one(
    path: &Path,
    file_name: &str,
    policy: &RewritePolicy,
    base_dir: &Path,
) -> ScanResult<PathBuf> {
    let source = std::fs::read_to_string(path)?;
    let outcome = rewrite_source(file_name, &source, policy)?;
    write_audited(base_dir, file_name, &outcome.source)
}

/// Clamp every path and write its audited copy under `base_dir`.
///
/// A file that cannot be read, parsed or written is recorded in `failed`;
/// later files are still processed.
pub fn rewrite_batch(
    paths: &[PathBuf],
    policy: &RewritePolicy,
    base_dir: &Path,
) -> RewriteBatchReport {
    let mut report = RewriteBatchReport::default();
    for path in paths {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        match rewrite_one(path, &file_name, policy, base_dir) {
            Ok(target) => report.written.push(target),
            Err(err) => {
                warn!(file = file_name.as_str(), "rewrite skipped: {err}");
                report.failed.push((file_name, err.to_string()));
            }
        }
    }
    info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "batch rewrite complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::discovery::discover_protocols;
    use crate::batch::output::audited_output_path;

    const PROTOCOL: &str = "def run(ctx):\n    p.aspirate(10, w.bottom(z=-1))\n";

    #[test]
    fn test_broken_file_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_good.py"), PROTOCOL).unwrap();
        std::fs::write(dir.path().join("b_broken.py"), "def run(:\n").unwrap();
        std::fs::write(dir.path().join("c_good.py"), PROTOCOL).unwrap();

        let paths = discover_protocols(dir.path()).unwrap();
        let report = rewrite_batch(&paths, &RewritePolicy::default(), dir.path());

        assert_eq!(report.written.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b_broken.py");
        assert!(!report.succeeded());
        assert!(!audited_output_path(dir.path(), "b_broken.py").exists());
        let last = std::fs::read_to_string(audited_output_path(dir.path(), "c_good.py")).unwrap();
        assert!(!last.contains("z=-1"));
    }

    #[test]
    fn test_missing_file_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("gone.py")];
        let report = rewrite_batch(&paths, &RewritePolicy::default(), dir.path());
        assert!(report.written.is_empty());
        assert_eq!(report.failed[0].0, "gone.py");
    }
}
