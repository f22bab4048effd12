//! Error types for artifact discovery.

use std::path::PathBuf;

/// Artifact discovery errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The output directory is missing, unreadable or not a directory.
    #[error("Output directory {} is unavailable: {source}", path.display())]
    OutputDirectoryMissing {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Walking below the output directory failed.
    #[error("Failed to read output directory {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}
