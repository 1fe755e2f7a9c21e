//! Bounded-depth source enumeration.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{OffloadError, Result};

/// Directory names never descended into, compared case-insensitively.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "$recycle.bin",
    "recycler",
    ".trash",
    ".trashes",
    ".spotlight-v100",
    ".fseventsd",
    ".temporaryitems",
    ".documentrevisions-v100",
    "system volume information",
    "node_modules",
    "__pycache__",
];

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    /// Depth-first order
    pub files: Vec<ScannedFile>,
    pub total_bytes: u64,
    /// Subtrees that could not be read and were left out
    pub skipped_errors: usize,
}

/// Walk `root` depth-first, descending at most `max_depth` levels below it.
///
/// Only an unreadable root is an error; failures further down drop that
/// subtree and are counted in `skipped_errors`.
pub async fn scan_directory(
    root: &Path,
    max_depth: usize,
    extra_skip: &[String],
) -> Result<ScanResult> {
    let root = root.to_path_buf();
    let skip: Vec<String> = DEFAULT_SKIP_DIRS
        .iter()
        .map(|s| s.to_string())
        .chain(extra_skip.iter().map(|s| s.to_lowercase()))
        .collect();

    tokio::task::spawn_blocking(move || {
        let entries = fs::read_dir(&root).map_err(|source| OffloadError::Scan {
            path: root.clone(),
            source,
        })?;

        let mut result = ScanResult::default();
        scan_entries(entries, 0, max_depth, &skip, &mut result);

        debug!(
            root = %root.display(),
            files = result.files.len(),
            total_bytes = result.total_bytes,
            "Scan complete"
        );
        Ok(result)
    })
    .await
    .map_err(|e| OffloadError::Scan {
        path: PathBuf::new(),
        source: std::io::Error::other(e),
    })?
}

fn scan_entries(
    entries: fs::ReadDir,
    depth: usize,
    max_depth: usize,
    skip: &[String],
    result: &mut ScanResult,
) {
    for entry in sorted_entries(entries, result) {
        let path = entry.path();

        // symlink_metadata so links are never followed
        let metadata = match path.symlink_metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                result.skipped_errors += 1;
                continue;
            }
        };

        if metadata.is_file() {
            result.total_bytes += metadata.len();
            result.files.push(ScannedFile {
                path,
                size: metadata.len(),
            });
        } else if metadata.is_dir() {
            if depth >= max_depth || is_skipped(&path, skip) {
                continue;
            }
            match fs::read_dir(&path) {
                Ok(children) => scan_entries(children, depth + 1, max_depth, skip, result),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable directory");
                    result.skipped_errors += 1;
                }
            }
        }
    }
}

/// Collect a directory listing in name order, counting entries that could
/// not be read.
fn sorted_entries<I>(entries: I, result: &mut ScanResult) -> Vec<fs::DirEntry>
where
    I: IntoIterator<Item = std::io::Result<fs::DirEntry>>,
{
    let mut readable = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => readable.push(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                result.skipped_errors += 1;
            }
        }
    }
    readable.sort_by_key(|e| e.file_name());
    readable
}

fn is_skipped(path: &Path, skip: &[String]) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .is_some_and(|name| skip.iter().any(|s| *s == name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn nested_tree(root: &Path) {
        fs::write(root.join("top.mov"), b"top").unwrap();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/mid.wav"), b"mid").unwrap();
        fs::write(root.join("a/b/deep.r3d"), b"deep").unwrap();
    }

    #[tokio::test]
    async fn test_scan_empty_directory() {
        let temp = tempdir().unwrap();
        let result = scan_directory(temp.path(), 5, &[]).await.unwrap();

        assert!(result.files.is_empty());
        assert_eq!(result.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_scan_finds_nested_files_within_depth() {
        let temp = tempdir().unwrap();
        nested_tree(temp.path());

        let result = scan_directory(temp.path(), 5, &[]).await.unwrap();

        assert_eq!(result.files.len(), 3);
        assert_eq!(result.total_bytes, 3 + 3 + 4);
    }

    #[tokio::test]
    async fn test_scan_depth_zero_is_root_only() {
        let temp = tempdir().unwrap();
        nested_tree(temp.path());

        let result = scan_directory(temp.path(), 0, &[]).await.unwrap();

        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].path.ends_with("top.mov"));
    }

    #[tokio::test]
    async fn test_scan_depth_one_stops_above_second_level() {
        let temp = tempdir().unwrap();
        nested_tree(temp.path());

        let result = scan_directory(temp.path(), 1, &[]).await.unwrap();
        assert_eq!(result.files.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_skips_noise_directories_case_insensitively() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("clip.mxf"), b"clip").unwrap();
        fs::create_dir(temp.path().join(".Trashes")).unwrap();
        fs::write(temp.path().join(".Trashes/old.mxf"), b"old").unwrap();
        fs::create_dir(temp.path().join("$RECYCLE.BIN")).unwrap();
        fs::write(temp.path().join("$RECYCLE.BIN/x"), b"x").unwrap();
        fs::create_dir(temp.path().join("Proxies")).unwrap();
        fs::write(temp.path().join("Proxies/p.mov"), b"p").unwrap();

        let result = scan_directory(temp.path(), 5, &["proxies".to_string()])
            .await
            .unwrap();

        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].path.ends_with("clip.mxf"));
    }

    #[tokio::test]
    async fn test_scan_missing_root_is_error() {
        let temp = tempdir().unwrap();
        let result = scan_directory(&temp.path().join("nope"), 5, &[]).await;
        assert!(matches!(result, Err(OffloadError::Scan { .. })));
    }

    #[test]
    fn test_unreadable_entries_are_counted_not_dropped() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("b.mov"), b"b").unwrap();
        fs::write(temp.path().join("a.mov"), b"a").unwrap();

        let listing = fs::read_dir(temp.path())
            .unwrap()
            .chain([Err(std::io::Error::other("stale handle"))]);

        let mut result = ScanResult::default();
        let entries = sorted_entries(listing, &mut result);

        let names: Vec<_> = entries.iter().map(|e| e.file_name()).collect();
        assert_eq!(names, vec!["a.mov", "b.mov"]);
        assert_eq!(result.skipped_errors, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_tolerates_unreadable_subtree() {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::Uid::effective().is_root() {
            return;
        }

        let temp = tempdir().unwrap();
        fs::write(temp.path().join("ok.mov"), b"ok").unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("hidden.mov"), b"hidden").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = scan_directory(temp.path(), 5, &[]).await;

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let result = result.unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.skipped_errors, 1);
    }
}
