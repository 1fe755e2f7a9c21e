use std::path::PathBuf;
use tracing::{debug, error, warn};

use super::copier::FileCopy;
use super::hasher::hash_file;
use super::models::{CopyResult, hash_hex};
use crate::error::OffloadError;

/// Read every written destination back from disk and compare it to the
/// source hash.
///
/// Destinations of one file are re-read concurrently. The comparison always
/// uses a fresh read of the file on disk, never the buffers used while
/// writing, so a lying write cache is caught as well as a buffer bug.
pub async fn verify_file(copy: FileCopy, block_size: usize) -> Vec<CopyResult> {
    let FileCopy {
        source_hash,
        mut results,
        started,
        ..
    } = copy;

    let mut handles = Vec::new();
    for (i, result) in results.iter().enumerate() {
        if !result.is_live() {
            continue;
        }
        let path = result.dest_path.clone();
        let handle = tokio::spawn(async move { hash_file(&path, block_size).await });
        handles.push((i, handle));
    }

    for (i, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(std::io::Error::other(join_err)),
        };
        apply_outcome(&mut results[i], source_hash, outcome);
    }

    let elapsed = started.elapsed();
    for result in &mut results {
        result.average_throughput = throughput_mbps(result.size, elapsed.as_secs_f64());
    }

    results
}

fn apply_outcome(
    result: &mut CopyResult,
    source_hash: Option<u64>,
    outcome: std::io::Result<(u64, u64)>,
) {
    let path: PathBuf = result.dest_path.clone();
    match (outcome, source_hash) {
        (Ok((dest_hash, _)), Some(expected)) => {
            result.dest_hash = Some(dest_hash);
            if dest_hash == expected {
                debug!(dest = %path.display(), hash = %hash_hex(dest_hash), "Verified");
                result.mark_verified();
            } else {
                let err = OffloadError::VerificationMismatch {
                    path,
                    expected: hash_hex(expected),
                    actual: hash_hex(dest_hash),
                };
                error!(error = %err, "Verification failed");
                result.fail(&err);
            }
        }
        (Ok((dest_hash, _)), None) => {
            // Without a complete source hash nothing can be confirmed.
            result.dest_hash = Some(dest_hash);
            let err = OffloadError::VerificationMismatch {
                path,
                expected: "unknown".to_string(),
                actual: hash_hex(dest_hash),
            };
            result.fail(&err);
        }
        (Err(source), _) => {
            let err = OffloadError::VerificationIo { path, source };
            warn!(error = %err, "Read-back failed");
            result.fail(&err);
        }
    }
}

fn throughput_mbps(bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        bytes as f64 / (1024.0 * 1024.0) / elapsed_secs
    } else {
        0.0
    }
}
