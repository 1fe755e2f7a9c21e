use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::OffloadError;

const DEFAULT_CONFIG_FILE: &str = "offload.toml";

/// Runtime configuration, layered: defaults, `offload.toml`, `OFFLOAD_*` env, CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Read/write block size in bytes
    pub block_size: usize,
    /// Deepest directory level the scanner descends into (0 = root only)
    pub max_depth: usize,
    /// Minimum interval between progress events
    pub progress_interval_ms: u64,
    /// fsync each destination file before it is read back
    pub sync_files: bool,
    pub preserve_timestamps: bool,
    /// Emit the hash list and text report at each destination root
    pub write_reports: bool,
    /// Directory names skipped in addition to the built-in deny-list
    pub extra_skip_dirs: Vec<String>,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024 * 1024,
            max_depth: 32,
            progress_interval_ms: 50,
            sync_files: true,
            preserve_timestamps: true,
            write_reports: true,
            extra_skip_dirs: Vec::new(),
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Build the configuration, merging CLI overrides last.
    ///
    /// `overrides` should skip unset fields when serialized so they do not
    /// clobber lower layers.
    pub fn new<T: Serialize>(
        config_file: Option<&Path>,
        overrides: Option<&T>,
    ) -> Result<Self, OffloadError> {
        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("OFFLOAD_"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment
            .extract()
            .map_err(|e| OffloadError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OffloadError> {
        if self.block_size == 0 {
            return Err(OffloadError::Config("block_size must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Overrides {
        #[serde(skip_serializing_if = "Option::is_none")]
        max_depth: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        block_size: Option<usize>,
    }

    #[test]
    fn test_defaults_when_no_file() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("none.toml");
        let config = AppConfig::new(Some(&missing), None::<&Overrides>).unwrap();
        assert_eq!(config.block_size, 4 * 1024 * 1024);
        assert!(config.sync_files);
    }

    #[test]
    fn test_file_then_overrides() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("offload.toml");
        std::fs::write(&file, "max_depth = 3\nwrite_reports = false\n").unwrap();

        let overrides = Overrides {
            max_depth: Some(7),
            block_size: None,
        };
        let config = AppConfig::new(Some(&file), Some(&overrides)).unwrap();

        assert_eq!(config.max_depth, 7);
        assert!(!config.write_reports);
        assert_eq!(config.block_size, AppConfig::default().block_size);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("none.toml");
        let overrides = Overrides {
            max_depth: None,
            block_size: Some(0),
        };
        let err = AppConfig::new(Some(&missing), Some(&overrides)).unwrap_err();
        assert!(matches!(err, OffloadError::Config(_)));
    }
}
