//! Child process execution with captured output and a wall-clock deadline.
//!
//! Every child is started as the leader of a fresh process group. When the
//! deadline fires, or as soon as the leader exits, the whole group receives
//! `SIGKILL`, so programs that fork or ignore signals cannot outlive the
//! request.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to wait for pipe readers after the process group is gone
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Read buffer size for pipe draining
const CHUNK_SIZE: usize = 8 * 1024;

/// Process runner errors
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The program is not on the command search path
    #[error("command not found: {program}")]
    NotFound {
        /// Program that could not be resolved
        program: String,
    },

    /// Invocation with no program
    #[error("empty command line")]
    EmptyCommand,

    /// Any other spawn or wait failure
    #[error("failed to run {program}: {source}")]
    Io {
        /// Program being run
        program: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// A command line plus extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Create an invocation from a program and its arguments
    #[must_use]
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    /// Add environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The program name, if any
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

/// What a single child process did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; `None` when killed by a signal or by the deadline
    pub exit_code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    /// Captured stdout (partial on timeout)
    pub stdout: String,
    /// Captured stderr; absent when empty or when the deadline fired
    pub stderr: Option<String>,
    /// Whether the deadline fired
    pub timed_out: bool,
    /// Wall-clock time until exit or kill
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// Exited on its own with status 0
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Spawns children, captures their output, and enforces deadlines.
///
/// The runner holds no per-execution state and is shared by all concurrent
/// requests. It counts spawn attempts so callers can check that rejected
/// requests never reached the OS.
#[derive(Debug)]
pub struct ProcessRunner {
    max_output_bytes: usize,
    spawned: AtomicU64,
}

impl ProcessRunner {
    /// Create a runner keeping at most `max_output_bytes` per stream
    #[must_use]
    pub const fn new(max_output_bytes: usize) -> Self {
        Self {
            max_output_bytes,
            spawned: AtomicU64::new(0),
        }
    }

    /// Number of spawn attempts so far
    #[must_use]
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Run one child to completion or until `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::NotFound`] when the program is not installed, and
    /// [`SpawnError::Io`] when it cannot be started or waited on. A non-zero
    /// exit or a timeout is an `Ok` outcome.
    pub async fn run(
        &self,
        invocation: &Invocation,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutcome, SpawnError> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or(SpawnError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &invocation.env {
            command.env(key, value);
        }
        command.process_group(0);

        self.spawned.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SpawnError::NotFound {
                    program: program.clone(),
                }
            } else {
                SpawnError::Io {
                    program: program.clone(),
                    source,
                }
            }
        })?;

        // Captured now: tokio forgets the pid once the child is reaped.
        let pid = child.id();
        debug!(program = %program, pid = ?pid, "spawned child");

        let stdout = PipeReader::spawn(child.stdout.take(), self.max_output_bytes);
        let stderr = PipeReader::spawn(child.stderr.take(), self.max_output_bytes);

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(source)) => {
                kill_process_group(pid);
                return Err(SpawnError::Io {
                    program: program.clone(),
                    source,
                });
            }
            Err(_) => None,
        };
        let elapsed = start.elapsed();

        kill_process_group(pid);
        if status.is_none() {
            warn!(
                program = %program,
                timeout = ?timeout,
                "deadline exceeded, killed process group"
            );
            if let Err(e) = child.kill().await {
                debug!(program = %program, error = %e, "child already gone after group kill");
            }
        }

        let (stdout, stderr) = tokio::join!(
            stdout.collect(self.max_output_bytes),
            stderr.collect(self.max_output_bytes)
        );

        Ok(match status {
            Some(status) => ProcessOutcome {
                exit_code: status.code(),
                signal: exit_signal(status),
                stdout,
                stderr: Some(stderr).filter(|s| !s.is_empty()),
                timed_out: false,
                elapsed,
            },
            None => ProcessOutcome {
                exit_code: None,
                signal: None,
                stdout,
                stderr: None,
                timed_out: true,
                elapsed,
            },
        })
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

/// Bytes read so far, visible to both the reader task and the collector
type SharedCapture = Arc<Mutex<Captured>>;

/// A background task draining one child pipe.
///
/// The captured bytes live outside the task, so whatever was read stays
/// available even when the task has to be abandoned because a process that
/// left the group still holds the pipe open.
struct PipeReader {
    captured: SharedCapture,
    task: JoinHandle<io::Result<()>>,
}

impl PipeReader {
    fn spawn<R>(reader: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let captured = SharedCapture::default();
        let task = tokio::spawn(drain(reader, limit, Arc::clone(&captured)));
        Self { captured, task }
    }

    /// Wait briefly for EOF, then return what was captured
    async fn collect(self, limit: usize) -> String {
        let Self { captured, mut task } = self;
        match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "failed reading child output"),
            Ok(Err(e)) => warn!(error = %e, "output reader task failed"),
            Err(_) => {
                warn!("output pipe still open after process group kill, keeping partial output");
                task.abort();
            }
        }
        let captured = std::mem::take(&mut *lock(&captured));
        let mut text = String::from_utf8_lossy(&captured.bytes).into_owned();
        if captured.truncated {
            text.push_str(&format!("\n[output truncated after {limit} bytes]"));
        }
        text
    }
}

fn lock(captured: &SharedCapture) -> std::sync::MutexGuard<'_, Captured> {
    captured.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read a pipe to EOF, keeping at most `limit` bytes and discarding the rest
async fn drain<R>(reader: Option<R>, limit: usize, captured: SharedCapture) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        lock(&captured).push(&chunk[..n], limit);
    }
}

fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

/// SIGKILL every process in the group led by `pid`
fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => debug!(pgid, "killed process group"),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "failed to kill process group"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new(["sh", "-c", script])
    }

    fn tmp() -> std::path::PathBuf {
        std::env::temp_dir()
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let runner = ProcessRunner::new(1024);
        let outcome = runner
            .run(&sh("echo out; echo err >&2"), &tmp(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr.as_deref(), Some("err\n"));
        assert_eq!(runner.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_and_empty_stderr() {
        let runner = ProcessRunner::new(1024);
        let outcome = runner
            .run(&sh("exit 3"), &tmp(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.stderr.is_none());
    }

    #[tokio::test]
    async fn test_stdin_is_closed() {
        let runner = ProcessRunner::new(1024);
        let outcome = runner
            .run(&sh("cat; echo done"), &tmp(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(outcome.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_working_dir_and_env() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = ProcessRunner::new(1024);
        let invocation = sh("pwd; echo $GREETING").with_env("GREETING", "hello");
        let outcome = runner
            .run(&invocation, dir.path(), Duration::from_secs(5))
            .await
            .unwrap();

        let canonical = dir.path().canonicalize().unwrap();
        let mut lines = outcome.stdout.lines();
        assert_eq!(
            Path::new(lines.next().unwrap()).canonicalize().unwrap(),
            canonical
        );
        assert_eq!(lines.next(), Some("hello"));
    }

    #[tokio::test]
    async fn test_missing_program_is_distinct() {
        let runner = ProcessRunner::new(1024);
        let err = runner
            .run(
                &Invocation::new(["definitely-not-a-real-toolchain-binary"]),
                &tmp(),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_command_never_spawns() {
        let runner = ProcessRunner::new(1024);
        let err = runner
            .run(&Invocation::new(Vec::<String>::new()), &tmp(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnError::EmptyCommand));
        assert_eq!(runner.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_stdout() {
        let runner = ProcessRunner::new(1024);
        let start = Instant::now();
        let outcome = runner
            .run(&sh("echo started; sleep 30"), &tmp(), Duration::from_millis(500))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.stderr.is_none());
        assert_eq!(outcome.stdout, "started\n");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_ignores_sigterm_traps() {
        let runner = ProcessRunner::new(1024);
        let start = Instant::now();
        let outcome = runner
            .run(
                &sh("trap '' TERM INT; while true; do :; done"),
                &tmp(),
                Duration::from_millis(300),
            )
            .await
            .unwrap();
        assert!(outcome.timed_out);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(target_os = "linux")]
    fn is_dead(pid: i32) -> bool {
        // Gone, or a zombie waiting for its new parent to reap it.
        std::fs::read_to_string(format!("/proc/{pid}/stat")).map_or(true, |stat| {
            stat.rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                == Some("Z")
        })
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_forked_descendants() {
        let runner = ProcessRunner::new(1024);
        let outcome = runner
            .run(
                &sh("sleep 60 & echo $!; wait"),
                &tmp(),
                Duration::from_millis(500),
            )
            .await
            .unwrap();
        assert!(outcome.timed_out);

        let grandchild: i32 = outcome.stdout.trim().parse().unwrap();
        let mut dead = false;
        for _ in 0..40 {
            if is_dead(grandchild) {
                dead = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(dead, "background child {grandchild} survived the deadline");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_background_children_killed_after_normal_exit() {
        let runner = ProcessRunner::new(1024);
        let outcome = runner
            .run(
                &sh("sleep 60 >/dev/null 2>&1 & echo $!"),
                &tmp(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(outcome.success());

        let orphan: i32 = outcome.stdout.trim().parse().unwrap();
        let mut dead = false;
        for _ in 0..40 {
            if is_dead(orphan) {
                dead = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(dead, "background child {orphan} outlived its parent");
    }

    #[tokio::test]
    async fn test_output_is_bounded() {
        let runner = ProcessRunner::new(16);
        let outcome = runner
            .run(
                &sh("i=0; while [ $i -lt 1000 ]; do echo 0123456789; i=$((i+1)); done"),
                &tmp(),
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        assert!(outcome.success());
        assert!(outcome.stdout.starts_with("0123456789\n01234"));
        assert!(outcome.stdout.ends_with("[output truncated after 16 bytes]"));
    }

    #[tokio::test]
    async fn test_signal_reported() {
        let runner = ProcessRunner::new(1024);
        let outcome = runner
            .run(&sh("kill -SEGV $$"), &tmp(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.signal, Some(11));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_output_kept_when_detached_child_holds_pipe() {
        if std::process::Command::new("setsid")
            .arg("--version")
            .output()
            .is_err()
        {
            eprintln!("Skipping test: setsid not available");
            return;
        }
        // The detached sleeper escapes the group kill and keeps both pipes open.
        let runner = ProcessRunner::new(1024);
        let start = Instant::now();
        let outcome = runner
            .run(
                &sh("echo hello; echo warn >&2; setsid sleep 5 &"),
                &tmp(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.stdout, "hello\n");
        assert_eq!(outcome.stderr.as_deref(), Some("warn\n"));
        assert!(start.elapsed() < PIPE_DRAIN_GRACE * 2);
    }

    #[test]
    fn test_capture_counts_bytes_past_limit() {
        let mut captured = Captured::default();
        captured.push(b"0123", 6);
        assert!(!captured.truncated);
        captured.push(b"4567", 6);
        assert!(captured.truncated);
        assert_eq!(captured.bytes, b"012345");
    }
}
