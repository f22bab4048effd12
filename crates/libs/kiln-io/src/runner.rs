//! High-level process runner with live output capture.

use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    lines::LineBuffer,
    process::{ProcessError, spawn_process, wait_child},
};

/// Lines buffered per stream before the reader waits for the consumer.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 64;

const READ_BUFFER_SIZE: usize = 1024;

/// Live view of a spawned process.
///
/// `stdout` and `stderr` yield lines in the order the process wrote them and
/// close when the matching pipe closes. `exit` resolves once the process has
/// exited, was stopped, or ran out of time.
pub struct ProcessHandle {
    /// OS process id, when still known.
    pub pid: Option<u32>,
    /// Lines written to standard output.
    pub stdout: mpsc::Receiver<String>,
    /// Lines written to standard error.
    pub stderr: mpsc::Receiver<String>,
    /// Completion signal carrying the exit status.
    pub exit: JoinHandle<Result<ExitStatus, ProcessError>>,
}

/// Process runner that streams output while the process is alive.
#[derive(Debug, Clone)]
pub struct Runner {
    /// Command to execute.
    command: String,
    /// Command line arguments.
    args: Vec<String>,
    /// Directory the process starts in.
    current_dir: Option<PathBuf>,
    /// Longest the process may run before it is killed.
    timeout: Option<Duration>,
}

impl Runner {
    /// Create a new runner with command and arguments.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kiln_io::runner::Runner;
    ///
    /// let runner = Runner::new("ls", vec!["-la", "/tmp"]);
    /// assert_eq!(runner.get_full_command(), "ls -la /tmp");
    /// ```
    pub fn new(command: impl Into<String>, args: Vec<impl Into<String>>) -> Self {
        Self {
            command: command.into(),
            args: args.into_iter().map(|a| a.into()).collect(),
            current_dir: None,
            timeout: None,
        }
    }

    /// Create a new runner with just a command (no arguments).
    pub fn new_without_args(command: impl Into<String>) -> Self {
        Self::new(command, Vec::<String>::new())
    }

    /// Create a runner that hands `script` to `sh -c`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kiln_io::runner::Runner;
    ///
    /// let runner = Runner::shell("npm install && npm run build");
    /// assert_eq!(runner.get_full_command(), "sh -c npm install && npm run build");
    /// ```
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", vec![String::from("-c"), script.into()])
    }

    /// Start the process in `dir` instead of the worker's own directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Kill the process if it is still running after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the full command string with arguments.
    pub fn get_full_command(&self) -> String {
        if self.args.is_empty() {
            return self.command.clone();
        }
        format!("{} {}", &self.command, &self.args.join(" "))
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    async fn read_stream<T>(tx: mpsc::Sender<String>, mut stream: T)
    where
        T: AsyncRead + Unpin,
    {
        let mut buffer = [0; READ_BUFFER_SIZE];
        let mut lines = LineBuffer::new();
        loop {
            match stream.read(&mut buffer).await {
                Ok(0) => break, // EOF
                Ok(n) => {
                    for line in lines.push(&buffer[..n]) {
                        if tx.send(line).await.is_err() {
                            debug!("Output consumer went away, stopping reader");
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!("Failed to read process output - {err}");
                    break;
                }
            }
        }
        if let Some(line) = lines.finish() {
            let _ = tx.send(line).await;
        }
    }

    fn launch_stream_reader<T>(stream: Option<T>) -> mpsc::Receiver<String>
    where
        T: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        // Without a pipe the sender is dropped here and the receiver closes at once
        if let Some(stream) = stream {
            tokio::spawn(Runner::read_stream(tx, stream));
        }
        rx
    }

    /// Spawn the process and start capturing its output.
    ///
    /// Must be called from inside a tokio runtime. Failing to start the
    /// process is reported here; everything after that is reported through
    /// the returned handle.
    pub fn spawn(&self, should_stop: Arc<AtomicBool>) -> Result<ProcessHandle, ProcessError> {
        let mut child = spawn_process(&self.command, &self.args, self.working_dir())
            .map_err(ProcessError::SpawnProcessFail)?;

        let pid = child.id();
        debug!("Spawned `{}` as pid {:?}", self.get_full_command(), pid);

        // Take stdout and stderr and launch a stream reader for each
        let stdout = Runner::launch_stream_reader(child.stdout.take());
        let stderr = Runner::launch_stream_reader(child.stderr.take());

        let timeout = self.timeout;
        let exit = tokio::spawn(async move { wait_child(&mut child, should_stop, timeout).await });

        Ok(ProcessHandle {
            pid,
            stdout,
            stderr,
            exit,
        })
    }
}

#[cfg(test)]
mod test {
    use std::{future::Future, sync::atomic::Ordering};

    use ntest::timeout;

    use super::*;

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("Couldn't build runtime")
            .block_on(future)
    }

    async fn drain(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        lines
    }

    async fn collect(
        handle: ProcessHandle,
    ) -> (Vec<String>, Vec<String>, Result<ExitStatus, ProcessError>) {
        let ProcessHandle {
            stdout,
            stderr,
            exit,
            ..
        } = handle;
        let (stdout, stderr) = tokio::join!(drain(stdout), drain(stderr));
        let exit = exit.await.expect("Couldn't join exit task");
        (stdout, stderr, exit)
    }

    fn not_stopped() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    #[timeout(10000)]
    fn test_stdout_lines_in_order() {
        let (stdout, stderr, exit) = block_on(async {
            let runner = Runner::shell("for i in 1 2 3 4 5; do echo line $i; done");
            collect(runner.spawn(not_stopped()).expect("Couldn't spawn")).await
        });

        let expected: Vec<String> = (1..=5).map(|i| format!("line {i}\n")).collect();
        assert_eq!(stdout, expected);
        assert!(stderr.is_empty());
        assert!(exit.expect("Process failed").success());
    }

    #[test]
    #[timeout(10000)]
    fn test_stderr_is_a_separate_stream() {
        let (stdout, stderr, exit) = block_on(async {
            let runner = Runner::shell("echo out; echo oops >&2; echo out again; echo oops again >&2");
            collect(runner.spawn(not_stopped()).expect("Couldn't spawn")).await
        });

        assert_eq!(stdout, vec!["out\n", "out again\n"]);
        assert_eq!(stderr, vec!["oops\n", "oops again\n"]);
        assert!(exit.expect("Process failed").success());
    }

    #[test]
    #[timeout(10000)]
    fn test_trailing_partial_line_is_kept() {
        let (stdout, _, _) = block_on(async {
            let runner = Runner::shell("printf 'first\\nsecond'");
            collect(runner.spawn(not_stopped()).expect("Couldn't spawn")).await
        });

        assert_eq!(stdout, vec!["first\n", "second"]);
    }

    #[test]
    #[timeout(10000)]
    fn test_non_zero_exit_is_reported() {
        let (_, _, exit) = block_on(async {
            let runner = Runner::shell("echo failing; exit 3");
            collect(runner.spawn(not_stopped()).expect("Couldn't spawn")).await
        });

        assert_eq!(exit.expect("Process failed").code(), Some(3));
    }

    #[test]
    #[timeout(10000)]
    fn test_runs_in_working_directory() {
        let dir = std::env::temp_dir();
        let (stdout, _, _) = block_on(async {
            let runner = Runner::shell("pwd").current_dir(&dir);
            collect(runner.spawn(not_stopped()).expect("Couldn't spawn")).await
        });

        let reported = PathBuf::from(stdout[0].trim_end());
        assert_eq!(
            reported.canonicalize().expect("Couldn't canonicalize pwd"),
            dir.canonicalize().expect("Couldn't canonicalize temp dir")
        );
    }

    #[test]
    #[timeout(10000)]
    fn test_missing_working_directory_fails_to_spawn() {
        block_on(async {
            let runner = Runner::shell("true").current_dir("/nonexistent/kiln/build");
            let result = runner.spawn(not_stopped());
            assert!(matches!(result, Err(ProcessError::SpawnProcessFail(_))));
        });
    }

    #[test]
    #[timeout(10000)]
    fn test_missing_program_fails_to_spawn() {
        block_on(async {
            let runner = Runner::new_without_args("kiln-no-such-program");
            let result = runner.spawn(not_stopped());
            assert!(matches!(result, Err(ProcessError::SpawnProcessFail(_))));
        });
    }

    #[test]
    #[timeout(10000)]
    fn test_timeout_kills_process() {
        block_on(async {
            let runner = Runner::shell("exec sleep 30").timeout(Duration::from_millis(200));
            let handle = runner.spawn(not_stopped()).expect("Couldn't spawn");
            let exit = handle.exit.await.expect("Couldn't join exit task");
            assert!(matches!(exit, Err(ProcessError::TimedOut(_))));
        });
    }

    #[test]
    #[timeout(10000)]
    fn test_stop_kills_process() {
        block_on(async {
            let stop = not_stopped();
            let runner = Runner::shell("exec sleep 30");
            let handle = runner.spawn(Arc::clone(&stop)).expect("Couldn't spawn");

            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.store(true, Ordering::Relaxed);

            let exit = handle.exit.await.expect("Couldn't join exit task");
            assert!(matches!(exit, Err(ProcessError::Quit)));
        });
    }

    // `sleep` below is a grandchild holding stdout open, so the stream only
    // closes once the whole process group is gone.

    #[test]
    #[timeout(10000)]
    fn test_timeout_kills_processes_started_by_the_shell() {
        block_on(async {
            let runner = Runner::shell("echo started; sleep 30; true")
                .timeout(Duration::from_millis(300));
            let ProcessHandle { mut stdout, exit, .. } =
                runner.spawn(not_stopped()).expect("Couldn't spawn");

            let exit = exit.await.expect("Couldn't join exit task");
            assert!(matches!(exit, Err(ProcessError::TimedOut(_))));

            let closed = tokio::time::timeout(Duration::from_secs(3), async {
                while stdout.recv().await.is_some() {}
            })
            .await;
            assert!(closed.is_ok(), "sleep outlived the timed out build");
        });
    }

    #[test]
    #[timeout(10000)]
    fn test_stop_kills_processes_started_by_the_shell() {
        block_on(async {
            let stop = not_stopped();
            let runner = Runner::shell("sleep 30; true");
            let ProcessHandle { mut stderr, exit, .. } =
                runner.spawn(Arc::clone(&stop)).expect("Couldn't spawn");

            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.store(true, Ordering::Relaxed);

            let exit = exit.await.expect("Couldn't join exit task");
            assert!(matches!(exit, Err(ProcessError::Quit)));

            let closed = tokio::time::timeout(Duration::from_secs(3), async {
                while stderr.recv().await.is_some() {}
            })
            .await;
            assert!(closed.is_ok(), "sleep outlived the stopped build");
        });
    }
}
