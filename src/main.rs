use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use offload::config::AppConfig;
use offload::context::AppContext;
use offload::core::{OffloadEngine, OffloadRequest, RunOutcome, RunReport, progress_channel};
use offload::logging::{self, LogConfig};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "offload")]
#[command(about = "Copy camera and sound media to one or two destinations with read-back verification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./offload.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Offload a source directory
    Copy(CopyArgs),
}

#[derive(Args, Serialize)]
struct CopyArgs {
    #[serde(skip)]
    source: PathBuf,

    /// Destination directory; give once or twice
    #[serde(skip)]
    #[arg(long = "dest", required = true)]
    destinations: Vec<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    max_depth: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    block_size: Option<usize>,

    /// Skip the hash list and text report
    #[serde(skip)]
    #[arg(long)]
    no_reports: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,

    /// Print the run outcome as JSON
    #[serde(skip)]
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Copy(args) => {
            let mut config = AppConfig::new(cli.config.as_deref(), Some(args))
                .context("Failed to load configuration")?;
            if args.no_reports {
                config.write_reports = false;
            }
            logging::init(LogConfig::from(&config));
            run_copy(config, args).await
        }
    }
}

async fn run_copy(config: AppConfig, args: &CopyArgs) -> Result<()> {
    if args.destinations.is_empty() || args.destinations.len() > 2 {
        bail!("Give one or two --dest directories");
    }

    let ctx = AppContext::new(config);

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let (callback, mut rx) = progress_channel();
    let printer = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            info!(
                percent = format!("{:.1}", p.percent_complete),
                bytes = p.bytes_transferred,
                total = p.total_bytes,
                mbps = format!("{:.1}", p.throughput),
                "{}",
                p.status
            );
        }
    });

    let request = OffloadRequest {
        source: args.source.clone(),
        destinations: args.destinations.clone(),
    };

    let engine = OffloadEngine::new(ctx);
    let outcome = engine
        .run(&request, Some(callback))
        .await
        .context("Offload failed")?;
    let _ = printer.await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    match outcome {
        RunOutcome::Completed(report) if report.summary.failed == 0 => Ok(()),
        RunOutcome::Completed(report) => bail!("{} copy(ies) failed", report.summary.failed),
        RunOutcome::Cancelled(_) => bail!("Offload cancelled"),
    }
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(report) => print_report(report),
        RunOutcome::Cancelled(rollback) => {
            println!("Offload cancelled and rolled back.");
            println!(
                "  Removed {} file(s) and {} director(ies); kept {} non-empty director(ies).",
                rollback.files_removed, rollback.directories_removed, rollback.directories_kept
            );
            for e in &rollback.errors {
                println!("  - {}", e);
            }
        }
    }
}

fn print_report(report: &RunReport) {
    let s = &report.summary;
    println!("Files scanned:  {}", s.files_scanned);
    println!("Verified:       {}", s.succeeded);
    println!("Failed:         {}", s.failed);
    println!("Bytes verified: {}", s.bytes_verified);

    if !s.failures.is_empty() {
        println!("Failures:");
        for f in s.failures.iter().take(10) {
            println!("  - {}: {}", f.dest_path.display(), f.note);
        }
        if s.failures.len() > 10 {
            println!("  ... and {} more", s.failures.len() - 10);
        }
    }

    for path in &report.audit_files {
        println!("Wrote {}", path.display());
    }
}
