//! Read-once, fan-out copy with inline source hashing.
//!
//! The source is read exactly once. Each block feeds the running hash and is
//! then written to every live destination concurrently. A destination that
//! fails drops out of the live set before the next block; the others carry on.

use chrono::Utc;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::hasher::FileHasher;
use super::ledger::{RunLedger, create_dirs_recorded};
use super::models::{CopyResult, CopyTask};
use super::progress::ProgressReporter;
use crate::error::{OffloadError, Result, is_permission_error};

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub block_size: usize,
    /// fsync each destination before it is handed to verification
    pub sync_files: bool,
    pub preserve_timestamps: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024 * 1024,
            sync_files: true,
            preserve_timestamps: true,
        }
    }
}

/// Write-phase outcome for one source file.
#[derive(Debug)]
pub struct FileCopy {
    pub task: CopyTask,
    /// Hash of the complete source, or None if it was not read to the end
    pub source_hash: Option<u64>,
    pub bytes_read: u64,
    /// One per destination, in task order
    pub results: Vec<CopyResult>,
    pub started: Instant,
}

/// An open destination still receiving blocks.
struct LiveDest {
    index: usize,
    file: File,
}

/// Copy one source file to all of its destinations.
///
/// Failures are recorded on the matching results, including a source that
/// cannot be read. Only cancellation returns `Err`; the caller is expected to
/// roll back in that case.
pub async fn copy_and_hash(
    task: &CopyTask,
    options: &CopyOptions,
    ledger: &mut RunLedger,
    cancel: &CancellationToken,
    progress: &mut ProgressReporter,
) -> Result<FileCopy> {
    let started = Instant::now();
    let started_at = Utc::now();
    let mut results: Vec<CopyResult> = task
        .destinations
        .iter()
        .map(|d| CopyResult::pending(task, d, started_at))
        .collect();

    if cancel.is_cancelled() {
        return Err(OffloadError::Cancelled);
    }

    // Opened before pre-flight so a vanished source leaves no directories.
    let mut source = match File::open(&task.source).await {
        Ok(f) => f,
        Err(e) => {
            let err = source_read_error(&task.source, e);
            warn!(error = %err, "Failed to open source");
            fail_live(&mut results, &err);
            return Ok(FileCopy {
                task: task.clone(),
                source_hash: None,
                bytes_read: 0,
                results,
                started,
            });
        }
    };

    // Pre-flight: each destination must accept a probe write.
    for (i, dest) in task.destinations.iter().enumerate() {
        if let Err(e) = preflight(ledger, &dest.path).await {
            warn!(dest = %dest.path.display(), error = %e, "Destination failed pre-flight");
            results[i].fail(&e);
        }
    }

    let mut copy = FileCopy {
        task: task.clone(),
        source_hash: None,
        bytes_read: 0,
        results,
        started,
    };

    if copy.results.iter().all(|r| !r.is_live()) {
        debug!(file = %task.relative_path.display(), "No reachable destinations");
        return Ok(copy);
    }

    let mut live: Vec<LiveDest> = Vec::with_capacity(task.destinations.len());
    for (i, dest) in task.destinations.iter().enumerate() {
        if !copy.results[i].is_live() {
            continue;
        }
        match open_destination(&dest.path).await {
            Ok(file) => {
                ledger.record_file(&dest.path);
                live.push(LiveDest { index: i, file });
            }
            Err(source) => {
                let err = classify_write_error(&dest.path, source);
                warn!(error = %err, "Failed to open destination");
                copy.results[i].fail(&err);
            }
        }
    }

    let mut hasher = FileHasher::new();
    let mut buffer = vec![0u8; options.block_size.max(1)];
    let mut reached_eof = false;

    while !live.is_empty() {
        if cancel.is_cancelled() {
            return Err(OffloadError::Cancelled);
        }

        let n = match source.read(&mut buffer).await {
            Ok(n) => n,
            Err(e) => {
                let err = source_read_error(&task.source, e);
                warn!(error = %err, "Source read failed");
                fail_live(&mut copy.results, &err);
                live.clear();
                break;
            }
        };

        if n == 0 {
            reached_eof = true;
            break;
        }

        hasher.update(&buffer[..n]);
        progress.advance(n as u64);

        live = fan_out(live, Arc::from(&buffer[..n]), task, &mut copy.results).await;
    }

    copy.bytes_read = hasher.bytes();
    // A hash of a partially read source would be meaningless.
    if reached_eof {
        copy.source_hash = Some(hasher.finish());
    }

    for mut dest in live {
        let path = &task.destinations[dest.index].path;
        let closed = async {
            dest.file.flush().await?;
            if options.sync_files {
                dest.file.sync_all().await?;
            }
            Ok::<(), io::Error>(())
        }
        .await;

        match closed {
            Ok(()) => copy.results[dest.index].mark_written(),
            Err(source) => {
                let err = classify_write_error(path, source);
                warn!(error = %err, "Failed to finalise destination");
                copy.results[dest.index].fail(&err);
            }
        }
    }

    if options.preserve_timestamps {
        for result in copy.results.iter().filter(|r| r.is_live()) {
            if let Err(e) = preserve_timestamps(&task.source, &result.dest_path).await {
                debug!(dest = %result.dest_path.display(), error = %e, "Failed to preserve timestamps");
            }
        }
    }

    for result in &mut copy.results {
        result.source_hash = copy.source_hash;
    }

    debug!(
        file = %task.relative_path.display(),
        bytes = copy.bytes_read,
        written = copy.results.iter().filter(|r| r.is_live()).count(),
        "Write phase complete"
    );

    Ok(copy)
}

/// Write one block to every live destination concurrently and return the
/// survivors in their original order.
async fn fan_out(
    live: Vec<LiveDest>,
    block: Arc<[u8]>,
    task: &CopyTask,
    results: &mut [CopyResult],
) -> Vec<LiveDest> {
    let handles: Vec<_> = live
        .into_iter()
        .map(|mut dest| {
            let block = Arc::clone(&block);
            let index = dest.index;
            let handle = tokio::spawn(async move {
                let res = dest.file.write_all(&block).await;
                (dest, res)
            });
            (index, handle)
        })
        .collect();

    let mut survivors = Vec::with_capacity(handles.len());
    for (index, handle) in handles {
        let path = &task.destinations[index].path;
        match handle.await {
            Ok((dest, Ok(()))) => survivors.push(dest),
            Ok((_closed, Err(source))) => {
                let err = classify_write_error(path, source);
                warn!(error = %err, "Destination dropped from copy");
                results[index].fail(&err);
            }
            Err(join_err) => {
                let err = OffloadError::Write {
                    path: path.clone(),
                    source: io::Error::other(join_err),
                };
                warn!(error = %err, "Destination writer aborted");
                results[index].fail(&err);
            }
        }
    }
    survivors
}

/// Create the destination's parent directories and prove the parent accepts
/// a new file.
async fn preflight(ledger: &mut RunLedger, dest: &Path) -> Result<()> {
    let parent = dest.parent().unwrap_or(Path::new("."));

    create_dirs_recorded(ledger, parent)
        .await
        .map_err(|source| OffloadError::Permission {
            path: parent.to_path_buf(),
            source,
        })?;

    let probe = parent.join(format!(".offload-probe-{}", Uuid::now_v7()));
    let created = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .await;

    match created {
        Ok(file) => {
            drop(file);
            tokio::fs::remove_file(&probe)
                .await
                .map_err(|source| OffloadError::Permission {
                    path: probe.clone(),
                    source,
                })
        }
        Err(source) => Err(OffloadError::Permission {
            path: parent.to_path_buf(),
            source,
        }),
    }
}

async fn open_destination(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
}

fn classify_write_error(path: &Path, source: io::Error) -> OffloadError {
    if is_permission_error(&source) {
        OffloadError::Permission {
            path: path.to_path_buf(),
            source,
        }
    } else {
        OffloadError::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Any source read failure, media errors included, stays local to this file.
fn source_read_error(path: &Path, source: io::Error) -> OffloadError {
    OffloadError::SourceRead {
        path: path.to_path_buf(),
        source,
    }
}

fn fail_live(results: &mut [CopyResult], err: &OffloadError) {
    for r in results.iter_mut().filter(|r| r.is_live()) {
        r.fail(err);
    }
}

/// Preserve access and modification timestamps from source to destination
async fn preserve_timestamps(source: &Path, dest: &Path) -> io::Result<()> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let metadata = std::fs::metadata(&source)?;
        let atime = filetime::FileTime::from_last_access_time(&metadata);
        let mtime = filetime::FileTime::from_last_modification_time(&metadata);
        filetime::set_file_times(&dest, atime, mtime)
    })
    .await
    .map_err(io::Error::other)?
}
