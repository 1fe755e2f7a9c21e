use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::OffloadError;

/// One discovered source file and where it goes. Immutable once built.
#[derive(Debug, Clone)]
pub struct CopyTask {
    pub source: PathBuf,
    pub size: u64,
    /// Path relative to the source root, reused under every destination root
    pub relative_path: PathBuf,
    pub destinations: Vec<Destination>,
}

#[derive(Debug, Clone)]
pub struct Destination {
    pub root: PathBuf,
    pub path: PathBuf,
}

impl CopyTask {
    pub fn new(source_root: &Path, source: PathBuf, size: u64, dest_roots: &[PathBuf]) -> Self {
        let relative_path = source
            .strip_prefix(source_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                PathBuf::from(source.file_name().unwrap_or(source.as_os_str()))
            });

        let destinations = dest_roots
            .iter()
            .map(|root| Destination {
                root: root.clone(),
                path: root.join(&relative_path),
            })
            .collect();

        Self {
            source,
            size,
            relative_path,
            destinations,
        }
    }
}

/// Outcome for one (file, destination) pair.
#[derive(Debug, Clone, Serialize)]
pub struct CopyResult {
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub dest_root: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    /// True only after the write survived and the read-back hash matched
    pub success: bool,
    pub source_hash: Option<u64>,
    pub dest_hash: Option<u64>,
    pub note: String,
    pub started_at: DateTime<Utc>,
    /// MB/s over combined copy and verify wall time
    pub average_throughput: f64,
    pub status: ResultStatus,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Where a result stands. Only `Verified` implies `success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Written,
    Verified,
    PermissionDenied,
    WriteFailed,
    SourceReadFailed,
    ChecksumMismatch,
    VerifyReadFailed,
}

impl ResultStatus {
    /// Short tag used in the text report.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Written => "UNVERIFIED",
            Self::Verified => "OK",
            Self::PermissionDenied => "NO-ACCESS",
            Self::WriteFailed => "WRITE-FAIL",
            Self::SourceReadFailed => "READ-FAIL",
            Self::ChecksumMismatch => "MISMATCH",
            Self::VerifyReadFailed => "VERIFY-FAIL",
        }
    }
}

impl CopyResult {
    pub fn pending(task: &CopyTask, dest: &Destination, started_at: DateTime<Utc>) -> Self {
        Self {
            source_path: task.source.clone(),
            dest_path: dest.path.clone(),
            dest_root: dest.root.clone(),
            relative_path: task.relative_path.clone(),
            size: task.size,
            success: false,
            source_hash: None,
            dest_hash: None,
            note: "pending".to_string(),
            started_at,
            average_throughput: 0.0,
            status: ResultStatus::Pending,
            verified_at: None,
        }
    }

    /// Record a failure. A failed result is never verified afterwards.
    pub fn fail(&mut self, error: &OffloadError) {
        self.success = false;
        self.note = error.note();
        self.status = match error {
            OffloadError::Permission { .. } => ResultStatus::PermissionDenied,
            OffloadError::SourceRead { .. } => ResultStatus::SourceReadFailed,
            OffloadError::VerificationMismatch { .. } => ResultStatus::ChecksumMismatch,
            OffloadError::VerificationIo { .. } => ResultStatus::VerifyReadFailed,
            _ => ResultStatus::WriteFailed,
        };
    }

    pub fn mark_written(&mut self) {
        if self.status == ResultStatus::Pending {
            self.status = ResultStatus::Written;
            self.note = "written, awaiting verification".to_string();
        }
    }

    pub fn mark_verified(&mut self) {
        self.status = ResultStatus::Verified;
        self.success = true;
        self.note = "verified".to_string();
        self.verified_at = Some(Utc::now());
    }

    /// Still eligible for writing or verification.
    pub fn is_live(&self) -> bool {
        matches!(self.status, ResultStatus::Pending | ResultStatus::Written)
    }

    pub fn source_hash_hex(&self) -> Option<String> {
        self.source_hash.map(hash_hex)
    }

    pub fn dest_hash_hex(&self) -> Option<String> {
        self.dest_hash.map(hash_hex)
    }
}

/// Lowercase big-endian hex of a 64-bit digest.
pub fn hash_hex(hash: u64) -> String {
    format!("{:016x}", hash)
}

/// Transient progress snapshot handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopyProgress {
    pub percent_complete: f64,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// MB/s since the run started
    pub throughput: f64,
    pub status: String,
}

/// One hash-list record, derived from a successful result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub relative_path: String,
    pub size_bytes: u64,
    pub hash_hex: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    pub files_removed: usize,
    pub directories_removed: usize,
    /// Directories left in place because they held content by then
    pub directories_kept: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub note: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_scanned: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_verified: u64,
    pub failures: Vec<FailedItem>,
}

impl RunSummary {
    pub fn from_results(files_scanned: usize, results: &[CopyResult]) -> Self {
        let mut summary = RunSummary {
            files_scanned,
            ..Default::default()
        };

        for r in results {
            if r.success {
                summary.succeeded += 1;
                summary.bytes_verified += r.size;
            } else {
                summary.failed += 1;
                summary.failures.push(FailedItem {
                    source_path: r.source_path.clone(),
                    dest_path: r.dest_path.clone(),
                    note: r.note.clone(),
                });
            }
        }

        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<CopyResult>,
    pub summary: RunSummary,
    /// Audit files written, per destination root
    pub audit_files: Vec<PathBuf>,
}

/// What a run hands back to its caller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunReport),
    Cancelled(RollbackReport),
}
