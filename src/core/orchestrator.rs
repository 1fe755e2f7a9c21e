use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};

use super::audit::{RunMetadata, write_audit_trail};
use super::copier::{CopyOptions, copy_and_hash};
use super::identity::current_creator;
use super::ledger::RunLedger;
use super::models::{CopyResult, CopyTask, RollbackReport, RunOutcome, RunReport, RunSummary};
use super::progress::{ProgressCallback, ProgressReporter};
use super::rollback::rollback;
use super::scanner::scan_directory;
use super::verifier::verify_file;
use crate::context::AppContext;
use crate::error::{OffloadError, Result};

/// What to offload and where.
#[derive(Debug, Clone)]
pub struct OffloadRequest {
    pub source: PathBuf,
    pub destinations: Vec<PathBuf>,
}

/// Drives one run: scan, then per file copy and verify, then audit files.
///
/// Failures stay on the affected results. Only cancellation rolls back
/// everything the run wrote.
pub struct OffloadEngine {
    ctx: AppContext,
}

impl OffloadEngine {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub async fn run(
        &self,
        request: &OffloadRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<RunOutcome> {
        if request.destinations.is_empty() {
            return Err(OffloadError::Config(
                "at least one destination is required".into(),
            ));
        }

        let span = info_span!(
            "offload_run",
            source = %request.source.display(),
            destinations = request.destinations.len()
        );

        self.run_inner(request, progress).instrument(span).await
    }

    async fn run_inner(
        &self,
        request: &OffloadRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<RunOutcome> {
        let config = &self.ctx.config;
        let cancel = &self.ctx.cancel;
        let started_at = Utc::now();

        let mut reporter = ProgressReporter::new(
            progress,
            Duration::from_millis(config.progress_interval_ms),
        );

        info!("Scanning source");
        let scan = scan_directory(&request.source, config.max_depth, &config.extra_skip_dirs).await?;
        info!(
            files = scan.files.len(),
            total_bytes = scan.total_bytes,
            skipped = scan.skipped_errors,
            "Scan complete"
        );

        let options = CopyOptions {
            block_size: config.block_size,
            sync_files: config.sync_files,
            preserve_timestamps: config.preserve_timestamps,
        };

        let mut ledger = RunLedger::new();
        let mut results: Vec<CopyResult> = Vec::with_capacity(scan.files.len() * request.destinations.len());
        reporter.start(scan.total_bytes);

        for file in &scan.files {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled(abort(&mut ledger, &mut reporter).await));
            }

            let task = CopyTask::new(&request.source, file.path.clone(), file.size, &request.destinations);
            reporter.set_status(format!("Copying {}", task.relative_path.display()));
            debug!(file = %task.relative_path.display(), size = task.size, "Copying file");

            let copy = match copy_and_hash(&task, &options, &mut ledger, cancel, &mut reporter).await {
                Ok(copy) => copy,
                Err(OffloadError::Cancelled) => {
                    return Ok(RunOutcome::Cancelled(abort(&mut ledger, &mut reporter).await));
                }
                Err(fatal) => {
                    warn!(error = %fatal, "Unexpected copy error, rolling back");
                    abort(&mut ledger, &mut reporter).await;
                    return Err(fatal);
                }
            };

            reporter.set_status(format!("Verifying {}", task.relative_path.display()));
            results.extend(verify_file(copy, config.block_size).await);
        }

        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled(abort(&mut ledger, &mut reporter).await));
        }

        reporter.finish("Complete");
        let finished_at = Utc::now();

        let audit_files = if config.write_reports {
            let meta = RunMetadata {
                creator: current_creator(),
                source_root: request.source.clone(),
                started_at,
                finished_at,
            };
            write_audit_trail(&request.destinations, &results, &meta).await
        } else {
            Vec::new()
        };

        let summary = RunSummary::from_results(scan.files.len(), &results);
        info!(
            files = summary.files_scanned,
            succeeded = summary.succeeded,
            failed = summary.failed,
            bytes_verified = summary.bytes_verified,
            "Run complete"
        );

        Ok(RunOutcome::Completed(RunReport {
            started_at,
            finished_at,
            results,
            summary,
            audit_files,
        }))
    }
}

async fn abort(ledger: &mut RunLedger, reporter: &mut ProgressReporter) -> RollbackReport {
    warn!("Run aborted, rolling back");
    let report = rollback(ledger).await;
    reporter.halt("Aborted, rolled back");
    report
}
