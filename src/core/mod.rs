pub mod audit;
pub mod copier;
pub mod hasher;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod rollback;
pub mod scanner;
pub mod verifier;

pub use copier::{CopyOptions, FileCopy, copy_and_hash};
pub use ledger::RunLedger;
pub use models::{
    AuditEntry, CopyProgress, CopyResult, CopyTask, ResultStatus, RollbackReport, RunOutcome,
    RunReport, RunSummary,
};
pub use orchestrator::{OffloadEngine, OffloadRequest};
pub use progress::{ProgressCallback, ProgressReporter, progress_channel};
pub use rollback::rollback;
pub use scanner::scan_directory;
pub use verifier::verify_file;
