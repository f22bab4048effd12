//! The single build-and-upload run a worker process performs.

use std::{path::PathBuf, time::Duration};

use kiln_config::WorkerConfig;
use kiln_io::runner::Runner;

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Started,
    Running,
    Uploading,
    Done,
    Failed,
}

/// One project's build-and-deploy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    pub project_id: String,
    /// Checkout the build command runs in.
    pub build_dir: PathBuf,
    /// Directory uploaded once the build has exited.
    pub output_dir: PathBuf,
    /// Shell command producing `output_dir`.
    pub command: String,
    pub timeout: Option<Duration>,
    /// Upload even when the build exits non-zero.
    pub upload_on_failure: bool,
}

impl BuildJob {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            project_id: config.project_id.clone(),
            build_dir: config.build.build_dir.clone(),
            output_dir: config.build.output_dir.clone(),
            command: config.build.command.clone(),
            timeout: config.build.timeout,
            upload_on_failure: config.build.upload_on_failure,
        }
    }

    /// Runner for the build command, inside the build directory.
    pub fn runner(&self) -> Runner {
        let runner = Runner::shell(self.command.clone()).current_dir(&self.build_dir);
        match self.timeout {
            Some(timeout) => runner.timeout(timeout),
            None => runner,
        }
    }
}
