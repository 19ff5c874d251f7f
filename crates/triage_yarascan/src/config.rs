//! Configuration for YARA scans

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the default rules directory
pub const RULES_PATH_ENV: &str = "SYSDIAGNOSE_YARA_RULES_PATH";

/// Rules directory used when neither config nor environment names one
pub const DEFAULT_RULES_DIR: &str = "yara";

/// File the CLI writes results to; never scanned
pub const DEFAULT_OUTPUT_FILE_NAME: &str = "yarascan.json";

/// Main configuration for a YARA scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YaraScanConfig {
    /// Directory holding `.yar` rule sources
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    /// Number of worker threads (0 = available parallelism)
    #[serde(default)]
    pub workers: usize,

    /// Result file name, also excluded from enumeration
    #[serde(default = "default_output_file_name")]
    pub output_file_name: String,

    /// Whether to follow symlinks inside the case folder
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_rules_path() -> PathBuf {
    std::env::var_os(RULES_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_DIR))
}

fn default_output_file_name() -> String {
    DEFAULT_OUTPUT_FILE_NAME.to_string()
}

/// Worker count for the current machine: available parallelism, or 4 if unknown
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

impl Default for YaraScanConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            workers: 0,
            output_file_name: default_output_file_name(),
            follow_symlinks: false,
        }
    }
}

impl YaraScanConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: YaraScanConfig = toml::from_str(&content)
            .map_err(|e| crate::YaraScanError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::YaraScanError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Worker threads to start; never less than one
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            default_workers().max(1)
        } else {
            self.workers
        }
    }
}
