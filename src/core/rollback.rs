use std::io::ErrorKind;
use tracing::{debug, info, warn};

use super::ledger::RunLedger;
use super::models::RollbackReport;

/// Undo everything the ledger recorded.
///
/// Files are removed best-effort. Directories are then removed newest first,
/// and only if empty at that moment; a directory holding anything else is
/// left alone.
pub async fn rollback(ledger: &mut RunLedger) -> RollbackReport {
    let entries = ledger.take();
    let mut report = RollbackReport::default();

    info!(
        files = entries.files.len(),
        directories = entries.directories.len(),
        "Rolling back run"
    );

    for file in &entries.files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => report.files_removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Failed to remove file during rollback");
                report.errors.push(format!("{}: {}", file.display(), e));
            }
        }
    }

    for dir in entries.directories.iter().rev() {
        // remove_dir refuses non-empty directories, which is exactly the guard needed.
        match tokio::fs::remove_dir(dir).await {
            Ok(()) => report.directories_removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => {
                debug!(path = %dir.display(), "Keeping non-empty directory");
                report.directories_kept += 1;
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to remove directory during rollback");
                report.directories_kept += 1;
                report.errors.push(format!("{}: {}", dir.display(), e));
            }
        }
    }

    info!(
        files_removed = report.files_removed,
        directories_removed = report.directories_removed,
        directories_kept = report.directories_kept,
        "Rollback complete"
    );

    report
}
