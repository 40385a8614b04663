//! Configuration file support.
//!
//! Settings are loaded from TOML; every section and key is optional.

use crate::error::{AnalysisError, Result};
use crate::viz::ChartFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Complete application configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Chart output settings.
    #[serde(default)]
    pub chart: ChartSettings,
    /// Per-file processing settings.
    #[serde(default)]
    pub processing: ProcessingSettings,
}

/// Where inputs and artifacts live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory of the filesystem store.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Container that receives uploads.
    #[serde(default = "default_upload_container")]
    pub upload_container: String,
    /// Directory name for artifacts, created next to each input.
    #[serde(default = "default_results_prefix")]
    pub results_prefix: String,
}

fn default_root() -> PathBuf { PathBuf::from("data") }
fn default_upload_container() -> String { "filestore".to_string() }
fn default_results_prefix() -> String { "results".to_string() }

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            upload_container: default_upload_container(),
            results_prefix: default_results_prefix(),
        }
    }
}

/// Chart rendering settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSettings {
    /// Image format: "png" or "svg".
    #[serde(default)]
    pub format: ChartFormat,
}

/// Processing limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Wall-clock bound per file in seconds; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Process a container's files in parallel.
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Show a progress bar while processing a container.
    #[serde(default)]
    pub show_progress: bool,
}

fn default_timeout_secs() -> u64 { 30 }
fn default_true() -> bool { true }

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            parallel: true,
            show_progress: false,
        }
    }
}

impl ProcessingSettings {
    /// The per-file bound, if enabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| AnalysisError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check names used to build storage paths.
    pub fn validate(&self) -> Result<()> {
        let storage = &self.storage;
        if storage.upload_container.trim().is_empty() {
            return Err(AnalysisError::Config("upload_container must not be empty".into()));
        }
        if storage.upload_container.contains('/') {
            return Err(AnalysisError::Config(format!(
                "upload_container '{}' must be a single path segment",
                storage.upload_container
            )));
        }
        if storage.results_prefix.trim().is_empty() || storage.results_prefix.contains('/') {
            return Err(AnalysisError::Config(format!(
                "results_prefix '{}' must be a single non-empty path segment",
                storage.results_prefix
            )));
        }
        Ok(())
    }

    /// Generate an example configuration file.
    pub fn example() -> String {
        r#"# stock-insights configuration

[storage]
# Root directory of the local object store
root = "data"
# Container (top-level directory) receiving uploads
upload_container = "filestore"
# Artifacts are written to <input dir>/<results_prefix>/
results_prefix = "results"

[chart]
# "png" or "svg"
format = "png"

[processing]
# Wall-clock bound per file in seconds (0 = unbounded)
timeout_secs = 30
# Process a container's files in parallel
parallel = true
# Progress bar for batch runs
show_progress = false
"#
        .to_string()
    }
}
