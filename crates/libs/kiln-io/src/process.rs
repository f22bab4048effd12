//! Low-level async process management utilities.

use std::{
    ffi::OsStr,
    io,
    path::Path,
    process::{ExitStatus, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    process::{Child, Command},
    time::Instant,
};
use tracing::warn;

/// Delay between two polls of a running child.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors that can occur during process operations.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// Failed to wait for child process.
    #[error("failed to wait for child process: {0}")]
    WaitChildFail(io::Error),
    /// Failed to spawn the process.
    #[error("failed to spawn process: {0}")]
    SpawnProcessFail(io::Error),
    /// Process was terminated on request.
    #[error("process was stopped")]
    Quit,
    /// Process ran past its deadline and was terminated.
    #[error("process timed out after {0:?}")]
    TimedOut(Duration),
    /// The task watching the process did not finish.
    #[error("process monitor failed: {0}")]
    MonitorFail(String),
}

/// Current status of a running process.
pub enum ProcessStatus {
    /// Process has completed with exit status.
    Done(ExitStatus),
    /// Process is still running.
    Running,
}

/// Spawn a new async process with piped stdout and stderr.
///
/// Stdin is closed so a build step waiting for input fails fast instead of
/// hanging, and the child is killed if its handle is dropped. On unix the
/// child leads its own process group so [`stop_child`] can reach everything
/// it started.
///
/// A missing working directory or executable surfaces here as an error.
pub fn spawn_process(
    cmd: &str,
    args: &[String],
    current_dir: Option<&Path>,
) -> Result<Child, io::Error> {
    let mut command = Command::new(OsStr::new(cmd));
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    if let Some(dir) = current_dir {
        command.current_dir(dir);
    }
    command.spawn()
}

/// Asynchronously check process status without blocking.
///
/// Sleeps for a short interval when the process is still running so it can be
/// called in a loop.
pub async fn get_process_status(child: &mut Child) -> Result<ProcessStatus, ProcessError> {
    match child.try_wait() {
        Ok(Some(exit_status)) => Ok(ProcessStatus::Done(exit_status)),
        Ok(None) => {
            tokio::time::sleep(POLL_INTERVAL).await;
            Ok(ProcessStatus::Running)
        }
        Err(err) => Err(ProcessError::WaitChildFail(err)),
    }
}

/// Kill a child process together with its process group, then reap it.
pub async fn stop_child(child: &mut Child) -> Result<(), io::Error> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_group(pid);
    }
    child.kill().await
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::{
        errno::Errno,
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    let Ok(raw) = i32::try_from(pid) else {
        warn!("Process id {pid} does not fit a pid_t");
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!("Failed to kill process group {pid} - {err}"),
    }
}

/// Wait for a child process with cancellation and deadline support.
///
/// The child is killed when `should_stop` is raised or when `timeout` has
/// elapsed since the call, and the matching error is returned.
pub async fn wait_child(
    child: &mut Child,
    should_stop: Arc<AtomicBool>,
    timeout: Option<Duration>,
) -> Result<ExitStatus, ProcessError> {
    let deadline = timeout.map(|limit| (limit, Instant::now() + limit));
    loop {
        if should_stop.load(Ordering::Relaxed) {
            terminate(child).await;
            return Err(ProcessError::Quit);
        }
        if let Some((limit, deadline)) = deadline {
            if Instant::now() >= deadline {
                terminate(child).await;
                return Err(ProcessError::TimedOut(limit));
            }
        }
        match get_process_status(child).await? {
            ProcessStatus::Done(exit_status) => return Ok(exit_status),
            ProcessStatus::Running => {}
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Err(err) = stop_child(child).await {
        warn!("Failed to kill child process {:?} - {err}", child.id());
    }
}
