//! Drives one build-and-upload run from start to finish.
//!
//! The run walks through the job states in order:
//!
//! 1. **Started**: announces the build, then spawns the build command
//! 2. **Running**: forwards every stdout and stderr line as it arrives
//! 3. **Uploading**: once the process has exited, ships the output directory
//! 4. **Done**: every file was attempted, whatever the individual outcomes
//!
//! Any fatal error moves the job to **Failed**; the error is published as
//! the last log line and returned to the caller.

use std::{
    process::ExitStatus,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use kiln_io::{process::ProcessError, runner::ProcessHandle};
use kiln_logs::LogPublisher;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep},
};
use tracing::{debug, error, info, warn};

use crate::{
    job::{BuildJob, JobState},
    prelude::*,
    upload::{ArtifactUploader, UploadResult},
};

/// How long output may keep flowing after the build process has exited.
///
/// Background processes started by the build can hold the pipes open long
/// after the build itself is gone.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Outcome of a run that reached the end.
#[derive(Debug)]
pub struct JobReport {
    pub state: JobState,
    pub exit_status: ExitStatus,
    pub uploads: Vec<UploadResult>,
}

impl JobReport {
    pub fn failed_uploads(&self) -> usize {
        self.uploads.iter().filter(|u| !u.is_success()).count()
    }
}

pub struct BuildOrchestrator {
    job: BuildJob,
    publisher: LogPublisher,
    uploader: ArtifactUploader,
    state: JobState,
    drain_grace: Duration,
}

impl BuildOrchestrator {
    pub fn new(job: BuildJob, publisher: LogPublisher, uploader: ArtifactUploader) -> Self {
        Self {
            job,
            publisher,
            uploader,
            state: JobState::Started,
            drain_grace: DRAIN_GRACE,
        }
    }

    pub fn drain_grace(mut self, drain_grace: Duration) -> Self {
        self.drain_grace = drain_grace;
        self
    }

    /// Build, upload and flush every log line.
    ///
    /// `should_stop` cancels the build while it is running.
    pub async fn run(mut self, should_stop: Arc<AtomicBool>) -> Result<JobReport> {
        let result = self.execute(should_stop).await;
        if let Err(err) = &result {
            error!("Job for {} failed - {err}", self.job.project_id);
            self.transition(JobState::Failed);
            self.publisher.publish(err.to_string());
        }
        self.publisher.shutdown().await;
        result
    }

    async fn execute(&mut self, should_stop: Arc<AtomicBool>) -> Result<JobReport> {
        info!(
            "Building {} in {}",
            self.job.project_id,
            self.job.build_dir.display()
        );
        self.publisher.publish("Build Started...");

        let handle = self.job.runner().spawn(should_stop).map_err(Error::Spawn)?;
        self.transition(JobState::Running);

        let exit_status = self.stream_build(handle).await?;
        self.publisher.publish("Build Complete");

        if exit_status.success() {
            info!("Build exited with {exit_status}");
        } else {
            warn!("Build exited with {exit_status}");
            self.publisher.publish(format!("Build failed with {exit_status}"));
            if !self.job.upload_on_failure {
                return Err(Error::BuildFailed(exit_status));
            }
            info!("Uploading the output of the failed build anyway");
        }

        self.transition(JobState::Uploading);
        self.publisher.publish("Starting to upload");
        let uploads = self
            .uploader
            .upload(&self.job.output_dir, &self.job.project_id, &self.publisher)
            .await?;

        self.publisher.publish("Done");
        self.transition(JobState::Done);
        info!("Done...");

        Ok(JobReport {
            state: self.state,
            exit_status,
            uploads,
        })
    }

    /// Forward build output until the process has exited and both streams
    /// have closed, or the drain grace period after exit has run out.
    async fn stream_build(&self, handle: ProcessHandle) -> Result<ExitStatus> {
        let ProcessHandle {
            pid,
            mut stdout,
            mut stderr,
            mut exit,
        } = handle;
        debug!("Build running as pid {pid:?}");

        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit_status = None;
        let drain = sleep(self.drain_grace);
        tokio::pin!(drain);

        loop {
            tokio::select! {
                line = stdout.recv(), if stdout_open => match line {
                    Some(line) => self.forward_stdout(line),
                    None => stdout_open = false,
                },
                line = stderr.recv(), if stderr_open => match line {
                    Some(line) => self.forward_stderr(line),
                    None => stderr_open = false,
                },
                result = &mut exit, if exit_status.is_none() => {
                    let result = result
                        .map_err(|err| ProcessError::MonitorFail(err.to_string()))
                        .and_then(|status| status);
                    match result {
                        Ok(status) => {
                            exit_status = Some(status);
                            drain.as_mut().reset(Instant::now() + self.drain_grace);
                        }
                        Err(err) => {
                            self.forward_buffered(&mut stdout, &mut stderr);
                            return Err(err.into());
                        }
                    }
                },
                _ = &mut drain, if exit_status.is_some() && (stdout_open || stderr_open) => {
                    warn!("Build output still open {:?} after exit, moving on", self.drain_grace);
                    self.forward_buffered(&mut stdout, &mut stderr);
                    break;
                },
                else => break,
            }
        }

        exit_status.ok_or_else(|| {
            Error::BuildMonitor(ProcessError::MonitorFail(String::from(
                "build output closed without an exit status",
            )))
        })
    }

    fn forward_stdout(&self, line: String) {
        info!("{}", line.trim_end());
        self.publisher.publish(line);
    }

    fn forward_stderr(&self, line: String) {
        warn!("Error: {}", line.trim_end());
        self.publisher.publish(format!("error: {line}"));
    }

    /// Forward whatever the readers already queued without waiting for more.
    fn forward_buffered(
        &self,
        stdout: &mut mpsc::Receiver<String>,
        stderr: &mut mpsc::Receiver<String>,
    ) {
        while let Ok(line) = stdout.try_recv() {
            self.forward_stdout(line);
        }
        while let Ok(line) = stderr.try_recv() {
            self.forward_stderr(line);
        }
    }

    fn transition(&mut self, next: JobState) {
        debug!("Job {}: {:?} -> {:?}", self.job.project_id, self.state, next);
        self.state = next;
    }
}
