//! Append-only record of everything a run wrote, consumed by rollback.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Files and directories created during one run, in creation order.
///
/// Only the orchestrating task writes to it. `take` drains it so that a
/// path can be handed to rollback at most once.
#[derive(Debug, Default)]
pub struct RunLedger {
    files: Vec<PathBuf>,
    directories: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

/// Drained ledger contents.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LedgerEntries {
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_file(&mut self, path: &Path) {
        if self.seen.insert(path.to_path_buf()) {
            self.files.push(path.to_path_buf());
        }
    }

    pub fn record_directory(&mut self, path: &Path) {
        if self.seen.insert(path.to_path_buf()) {
            self.directories.push(path.to_path_buf());
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    pub fn take(&mut self) -> LedgerEntries {
        self.seen.clear();
        LedgerEntries {
            files: std::mem::take(&mut self.files),
            directories: std::mem::take(&mut self.directories),
        }
    }
}

/// Create `dir` and any missing ancestors top-down, recording each directory
/// this call actually created.
pub async fn create_dirs_recorded(
    ledger: &mut RunLedger,
    dir: &Path,
) -> std::io::Result<()> {
    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(path) = cursor {
        if path.as_os_str().is_empty() || tokio::fs::try_exists(path).await? {
            break;
        }
        missing.push(path.to_path_buf());
        cursor = path.parent();
    }

    for path in missing.into_iter().rev() {
        match tokio::fs::create_dir(&path).await {
            Ok(()) => ledger.record_directory(&path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
