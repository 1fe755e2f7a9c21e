//! Error taxonomy for the offload engine.
//!
//! Per-destination failures (`Permission`, `Write`, `Verification*`) and
//! per-file `SourceRead` failures are captured on the affected `CopyResult`
//! and never abort sibling copies. Only `Cancelled` aborts the run and
//! triggers rollback.

use std::io::{self, ErrorKind};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = OffloadError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum OffloadError {
    /// Destination is not writable (pre-flight probe or directory creation failed).
    #[error("permission denied at {path}: {source}")]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Mid-copy write failure on one destination.
    #[error("write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Read-back hash differs from the source hash.
    #[error("checksum mismatch for {path}: source {expected}, destination {actual}")]
    VerificationMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Read-back itself failed; the file must be copied again.
    #[error("read-back failed for {path}: {source}")]
    VerificationIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("run cancelled")]
    Cancelled,

    /// Hash list or report could not be written. Never affects copy results.
    #[error("failed to write audit file {path}: {source}")]
    AuditWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading one source file failed, media errors included; that file's
    /// results are marked failed.
    #[error("failed to read source {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OffloadError {
    /// Short label used in the `note` of a failed result.
    pub fn note(&self) -> String {
        match self {
            Self::Permission { source, .. } => format!("permission denied: {}", source),
            Self::Write { source, .. } => {
                if is_device_removed_error(source) {
                    format!("write failed, destination device lost: {}", source)
                } else {
                    format!("write failed: {}", source)
                }
            }
            Self::VerificationMismatch { .. } => "checksum mismatch".to_string(),
            Self::VerificationIo { source, .. } => {
                format!("verification read failed, re-copy required: {}", source)
            }
            Self::SourceRead { source, .. } => {
                if is_device_removed_error(source) {
                    format!("source read failed, media error or card removed: {}", source)
                } else {
                    format!("source read failed: {}", source)
                }
            }
            other => other.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Check if an I/O error indicates the device has been removed
pub fn is_device_removed_error(error: &io::Error) -> bool {
    match error.kind() {
        ErrorKind::NotFound => true,
        ErrorKind::PermissionDenied => false,
        ErrorKind::BrokenPipe => true,
        ErrorKind::ConnectionReset => true,
        ErrorKind::ConnectionAborted => true,
        ErrorKind::NotConnected => true,
        _ => {
            if let Some(os_error) = error.raw_os_error() {
                matches!(
                    os_error,
                    libc::EIO
                    | libc::ENODEV
                    | libc::ENXIO
                    | libc::ENOMEDIUM
                    | libc::EMEDIUMTYPE
                )
            } else {
                false
            }
        }
    }
}

/// Whether an I/O error means the target refused writes.
pub fn is_permission_error(error: &io::Error) -> bool {
    matches!(error.kind(), ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem)
        || error.raw_os_error() == Some(libc::EROFS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_device_removed_error_eio() {
        let error = io::Error::from_raw_os_error(libc::EIO);
        assert!(is_device_removed_error(&error));
    }

    #[test]
    fn test_is_device_removed_error_enodev() {
        let error = io::Error::from_raw_os_error(libc::ENODEV);
        assert!(is_device_removed_error(&error));
    }

    #[test]
    fn test_is_device_removed_error_permission_denied() {
        let error = io::Error::new(ErrorKind::PermissionDenied, "permission denied");
        assert!(!is_device_removed_error(&error));
        assert!(is_permission_error(&error));
    }

    #[test]
    fn test_erofs_is_permission_error() {
        let error = io::Error::from_raw_os_error(libc::EROFS);
        assert!(is_permission_error(&error));
    }

    #[test]
    fn test_notes_distinguish_mismatch_from_read_failure() {
        let mismatch = OffloadError::VerificationMismatch {
            path: PathBuf::from("/dst/a.mov"),
            expected: "00".into(),
            actual: "11".into(),
        };
        let io_err = OffloadError::VerificationIo {
            path: PathBuf::from("/dst/a.mov"),
            source: io::Error::new(ErrorKind::Other, "boom"),
        };

        assert_eq!(mismatch.note(), "checksum mismatch");
        assert!(io_err.note().contains("re-copy"));
        assert!(!io_err.note().contains("mismatch"));
    }
}
