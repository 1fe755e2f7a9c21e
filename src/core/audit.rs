//! Hash list (MHL) and plain-text report writers.
//!
//! Both files land at the destination root under timestamped names. Failing
//! to write them is logged and otherwise ignored: an audit file never
//! changes a copy or verify outcome.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::identity::Creator;
use super::models::{AuditEntry, CopyResult, hash_hex};
use crate::error::{OffloadError, Result};

pub const TOOL_NAME: &str = env!("CARGO_PKG_NAME");
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

const MHL_VERSION: &str = "1.1";
const BANNER_WIDTH: usize = 78;

/// Run-level facts stamped into every audit file.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub creator: Creator,
    pub source_root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Hash-list entries for one destination root, from verified results only.
pub fn build_entries(root: &Path, results: &[CopyResult]) -> Vec<AuditEntry> {
    results
        .iter()
        .filter(|r| r.success && r.dest_root == root)
        .filter_map(|r| {
            Some(AuditEntry {
                relative_path: to_slash(&r.relative_path),
                size_bytes: r.size,
                hash_hex: hash_hex(r.dest_hash?),
                timestamp: r.verified_at.unwrap_or(r.started_at),
            })
        })
        .collect()
}

/// Write the hash list and the text report at every destination root.
///
/// Returns the paths that were written.
pub async fn write_audit_trail(
    roots: &[PathBuf],
    results: &[CopyResult],
    meta: &RunMetadata,
) -> Vec<PathBuf> {
    let mut written = Vec::new();

    for root in roots {
        let entries = build_entries(root, results);
        match write_hash_list(root, &entries, meta).await {
            Ok(path) => written.push(path),
            Err(e) => warn!(error = %e, "Hash list not written"),
        }

        let root_results: Vec<CopyResult> = results
            .iter()
            .filter(|r| r.dest_root == *root)
            .cloned()
            .collect();
        match write_text_report(root, &root_results, meta).await {
            Ok(path) => written.push(path),
            Err(e) => warn!(error = %e, "Text report not written"),
        }
    }

    written
}

pub async fn write_hash_list(
    root: &Path,
    entries: &[AuditEntry],
    meta: &RunMetadata,
) -> Result<PathBuf> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "offload".to_string());
    let stem = format!("{}_{}", root_name, file_stamp(meta.finished_at));

    let xml = render_hash_list(entries, meta);
    let path = write_unique(root, &stem, "mhl", xml.as_bytes()).await?;
    info!(path = %path.display(), entries = entries.len(), "Hash list written");
    Ok(path)
}

pub async fn write_text_report(
    root: &Path,
    results: &[CopyResult],
    meta: &RunMetadata,
) -> Result<PathBuf> {
    let stem = format!("offload_report_{}", file_stamp(meta.finished_at));
    let text = render_text_report(root, results, meta);
    let path = write_unique(root, &stem, "txt", text.as_bytes()).await?;
    info!(path = %path.display(), "Report written");
    Ok(path)
}

pub fn render_hash_list(entries: &[AuditEntry], meta: &RunMetadata) -> String {
    let mut xml = String::new();
    let _ = writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(xml, r#"<hashlist version="{}">"#, MHL_VERSION);
    let _ = writeln!(xml, "  <creatorinfo>");
    let _ = writeln!(xml, "    <name>{}</name>", escape(&meta.creator.user));
    let _ = writeln!(xml, "    <username>{}</username>", escape(&meta.creator.user));
    let _ = writeln!(xml, "    <hostname>{}</hostname>", escape(&meta.creator.host));
    let _ = writeln!(
        xml,
        r#"    <tool>{} {}</tool>"#,
        escape(TOOL_NAME),
        escape(TOOL_VERSION)
    );
    let _ = writeln!(xml, "    <startdate>{}</startdate>", xml_date(meta.started_at));
    let _ = writeln!(xml, "    <finishdate>{}</finishdate>", xml_date(meta.finished_at));
    let _ = writeln!(xml, "  </creatorinfo>");

    for entry in entries {
        let _ = writeln!(xml, "  <hash>");
        let _ = writeln!(xml, "    <file>{}</file>", escape(&entry.relative_path));
        let _ = writeln!(xml, "    <size>{}</size>", entry.size_bytes);
        let _ = writeln!(xml, "    <xxhash64be>{}</xxhash64be>", entry.hash_hex);
        let _ = writeln!(xml, "    <hashdate>{}</hashdate>", xml_date(entry.timestamp));
        let _ = writeln!(xml, "  </hash>");
    }

    let _ = writeln!(xml, "</hashlist>");
    xml
}

pub fn render_text_report(root: &Path, results: &[CopyResult], meta: &RunMetadata) -> String {
    let rule = "=".repeat(BANNER_WIDTH);
    let thin = "-".repeat(BANNER_WIDTH);
    let title = "OFFLOAD VERIFICATION REPORT";

    let verified = results.iter().filter(|r| r.success).count();
    let failed = results.len() - verified;
    let bytes: u64 = results.iter().filter(|r| r.success).map(|r| r.size).sum();

    let mut out = String::new();
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "{:^width$}", title, width = BANNER_WIDTH);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Tool:        {} {}", TOOL_NAME, TOOL_VERSION);
    let _ = writeln!(out, "Host:        {}", meta.creator.host);
    let _ = writeln!(out, "User:        {}", meta.creator.user);
    let _ = writeln!(out, "Source:      {}", meta.source_root.display());
    let _ = writeln!(out, "Destination: {}", root.display());
    let _ = writeln!(out, "Started:     {}", xml_date(meta.started_at));
    let _ = writeln!(out, "Finished:    {}", xml_date(meta.finished_at));
    let _ = writeln!(out, "{}", thin);
    let _ = writeln!(out, "SUMMARY");
    let _ = writeln!(out, "  Files:     {}", results.len());
    let _ = writeln!(out, "  Verified:  {}", verified);
    let _ = writeln!(out, "  Failed:    {}", failed);
    let _ = writeln!(out, "  Bytes:     {}", bytes);
    let _ = writeln!(out, "{}", thin);
    let _ = writeln!(out, "FILES");

    for r in results {
        let _ = writeln!(out, "[{}] {}", r.status.tag(), to_slash(&r.relative_path));
        let _ = writeln!(out, "    Source: {}", r.source_path.display());
        let _ = writeln!(out, "    Dest:   {}", r.dest_path.display());
        let hash = r
            .dest_hash_hex()
            .or_else(|| r.source_hash_hex())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "    Hash:   xxh64 {}", hash);
        if !r.success {
            let _ = writeln!(out, "    Error:  {}", r.note);
        }
    }

    let _ = writeln!(out, "{}", rule);
    out
}

/// Create `<stem>.<ext>` under `dir`, adding `_1`, `_2`... if the name is taken.
async fn write_unique(dir: &Path, stem: &str, ext: &str, contents: &[u8]) -> Result<PathBuf> {
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{}_{}.{}", stem, attempt, ext)
        };
        let path = dir.join(name);

        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        match opened {
            Ok(mut file) => {
                let written = async {
                    file.write_all(contents).await?;
                    file.flush().await?;
                    file.sync_all().await
                }
                .await;
                return match written {
                    Ok(()) => Ok(path),
                    Err(source) => Err(OffloadError::AuditWrite { path, source }),
                };
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 1000 => attempt += 1,
            Err(source) => return Err(OffloadError::AuditWrite { path, source }),
        }
    }
}

fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d_%H%M%S").to_string()
}

fn xml_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
