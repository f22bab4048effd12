use std::{process::ExitStatus, time::Duration};

use kiln_io::process::ProcessError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] kiln_config::error::Error),

    #[error(transparent)]
    OutputDirectory(#[from] kiln_storage::error::Error),

    #[error("Failed to start build: {0}")]
    Spawn(ProcessError),

    #[error("Skipping upload after failed build ({0})")]
    BuildFailed(ExitStatus),

    #[error("Build timed out after {0:?}")]
    BuildTimedOut(Duration),

    #[error("Build cancelled")]
    BuildCancelled,

    #[error("Lost track of the build process: {0}")]
    BuildMonitor(ProcessError),
}

impl From<ProcessError> for Error {
    /// Errors reported after the build process has started.
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Quit => Error::BuildCancelled,
            ProcessError::TimedOut(limit) => Error::BuildTimedOut(limit),
            other => Error::BuildMonitor(other),
        }
    }
}
