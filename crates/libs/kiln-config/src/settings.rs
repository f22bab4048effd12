//! Non-secret worker settings loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::prelude::*;

/// Command run in the build directory when none is configured.
pub const DEFAULT_BUILD_COMMAND: &str = "npm install && npm run build";

/// Build output location, relative to the build directory.
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Bucket receiving build outputs when none is configured.
pub const DEFAULT_BUCKET: &str = "kiln-outputs";

/// Settings for the build step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Shell command that produces the build output.
    pub command: String,
    /// Project checkout. Defaults to `output/` next to the worker executable.
    pub dir: Option<PathBuf>,
    /// Build output directory, relative to `dir` unless absolute.
    pub output_dir: PathBuf,
    /// Kill the build after this many seconds.
    pub timeout_secs: Option<u64>,
    /// Upload whatever the build left behind even when it exits non-zero.
    pub upload_on_failure: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: String::from(DEFAULT_BUILD_COMMAND),
            dir: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            timeout_secs: None,
            upload_on_failure: true,
        }
    }
}

/// Settings for the upload step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Files uploaded at the same time. `1` uploads sequentially.
    pub concurrency: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Object storage location. Credentials never live in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub bucket: String,
    /// Custom S3-compatible endpoint.
    pub endpoint: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            bucket: String::from(DEFAULT_BUCKET),
            endpoint: None,
        }
    }
}

/// Settings file contents. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub build: BuildSettings,
    pub upload: UploadSettings,
    pub storage: StorageSettings,
}

impl WorkerSettings {
    /// Load settings from a TOML file.
    pub fn from_file(file_path: &Path) -> Result<Self> {
        debug!("Loading settings from {}", file_path.display());
        let contents = std::fs::read_to_string(file_path)?;
        Self::from_toml(&contents)
    }

    /// Parse settings from TOML string.
    pub fn from_toml(value: &str) -> Result<Self> {
        Ok(toml::from_str(value)?)
    }
}
