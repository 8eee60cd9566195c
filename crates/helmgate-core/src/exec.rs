//! External command execution
//!
//! Runs a program with piped stdout/stderr, drains both streams concurrently
//! and bounds the whole exchange by a timeout. Draining both pipes at once is
//! required: a child that fills the stderr pipe while we block on stdout would
//! never exit.
//!
//! Drains are scheduled against a shared pool of permits. Each invocation
//! holds two permits (one per stream) while it runs, and a bounded number of
//! drains may wait for permits before new invocations are rejected.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{CoreError, Result};

/// Default timeout applied when a spec does not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain tasks needed per invocation
const DRAINS_PER_COMMAND: usize = 2;

/// Prefix the package-manager tool uses for non-fatal diagnostics
const WARNING_PREFIX: &str = "WARNING:";

/// A single invocation of an external program
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Output captured from a finished invocation
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Standard output with trailing newlines removed
    pub stdout: String,
    /// Standard error, verbatim
    pub stderr: String,
    pub exit_code: i32,
    pub elapsed: Duration,
}

impl CommandResult {
    /// Apply the success rule for exit-0 invocations: stderr must be empty or
    /// contain only tool warnings. Warnings are logged and tolerated.
    pub fn check_stderr(self, program: &str) -> Result<Self> {
        let mut errors = Vec::new();
        for line in self.stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.starts_with(WARNING_PREFIX) {
                tracing::warn!(program, "{}", line);
            } else {
                errors.push(line);
            }
        }

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(CoreError::StderrReported {
                program: program.to_string(),
                stderr: errors.join("\n"),
            })
        }
    }
}

/// Sizing of the shared drain pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// Concurrent stream drains
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Drains allowed to wait for a worker before invocations are rejected
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    20
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Runs external commands with bounded-time output capture
///
/// Cloning is cheap and clones share the same pool.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    queue_capacity: usize,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl CommandRunner {
    pub fn new(config: PoolConfig) -> Self {
        // Fewer than two workers could never host a single invocation
        let workers = config.workers.clamp(DRAINS_PER_COMMAND, 64);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            waiting: Arc::new(AtomicUsize::new(0)),
            queue_capacity: config.queue_capacity,
        }
    }

    /// Run `spec` to completion, returning its captured output
    ///
    /// Fails with `ExecutionFailed` when the program cannot be spawned or its
    /// pipes fail, `ExecutionTimedOut` when output is not fully drained within
    /// the command's timeout (the child is killed), and `NonZeroExit` when the
    /// program exits unsuccessfully.
    pub async fn execute(&self, spec: &CommandSpec) -> Result<CommandResult> {
        let _permits = self.acquire(spec.program()).await?;

        let started = Instant::now();
        let mut command = Command::new(spec.program());
        command
            .args(spec.get_args())
            .envs(spec.get_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = spec.get_current_dir() {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        tracing::debug!(
            program = spec.program(),
            args = spec.get_args().len(),
            timeout_ms = spec.get_timeout().as_millis() as u64,
            "spawning command"
        );

        let mut child = command.spawn().map_err(|e| failed(spec, e))?;
        // The child leads its own group (pgid == pid)
        let mut group = ProcessGroup(child.id());

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(CoreError::ExecutionFailed {
                program: spec.program().to_string(),
                message: "child pipes unavailable".to_string(),
            });
        };

        let stdout_task = tokio::spawn(drain(stdout));
        let stderr_task = tokio::spawn(drain(stderr));
        let abort_stdout = stdout_task.abort_handle();
        let abort_stderr = stderr_task.abort_handle();

        let completion = tokio::time::timeout(spec.get_timeout(), async {
            let (out, err) = tokio::join!(stdout_task, stderr_task);
            let out = out.map_err(std::io::Error::other)??;
            let err = err.map_err(std::io::Error::other)??;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((out, err, status))
        })
        .await;

        let (stdout, stderr, status) = match completion {
            Ok(Ok(captured)) => {
                group.disarm();
                captured
            }
            Ok(Err(e)) => {
                abort_stdout.abort();
                abort_stderr.abort();
                drop(group);
                let _ = child.kill().await;
                return Err(failed(spec, e));
            }
            Err(_) => {
                abort_stdout.abort();
                abort_stderr.abort();
                drop(group);
                if let Err(e) = child.kill().await {
                    tracing::warn!(program = spec.program(), "failed to kill timed out command: {}", e);
                }
                return Err(CoreError::ExecutionTimedOut {
                    program: spec.program().to_string(),
                    timeout: spec.get_timeout(),
                });
            }
        };

        let elapsed = started.elapsed();
        // Signal-terminated children have no exit code
        let exit_code = status.code().unwrap_or(-1);

        tracing::debug!(
            program = spec.program(),
            exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "command finished"
        );

        if !status.success() {
            return Err(CoreError::NonZeroExit {
                program: spec.program().to_string(),
                code: exit_code,
                stderr,
            });
        }

        Ok(CommandResult {
            stdout: strip_trailing_newlines(stdout),
            stderr,
            exit_code,
            elapsed,
        })
    }

    /// Reserve drain workers, queueing while the bounded backlog has room
    async fn acquire(&self, program: &str) -> Result<OwnedSemaphorePermit> {
        if let Ok(permit) = self
            .permits
            .clone()
            .try_acquire_many_owned(DRAINS_PER_COMMAND as u32)
        {
            return Ok(permit);
        }

        let queued = self.waiting.fetch_add(DRAINS_PER_COMMAND, Ordering::SeqCst);
        // Released on every exit path, including a caller dropping us mid-wait
        let _slot = QueueSlot(self.waiting.clone());
        if queued + DRAINS_PER_COMMAND > self.queue_capacity {
            return Err(CoreError::ExecutionFailed {
                program: program.to_string(),
                message: "command pool saturated".to_string(),
            });
        }

        let permit = self
            .permits
            .clone()
            .acquire_many_owned(DRAINS_PER_COMMAND as u32)
            .await;

        permit.map_err(|_| CoreError::ExecutionFailed {
            program: program.to_string(),
            message: "command pool closed".to_string(),
        })
    }
}

/// Queue reservation held while an invocation waits for drain workers
struct QueueSlot(Arc<AtomicUsize>);

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(DRAINS_PER_COMMAND, Ordering::SeqCst);
    }
}

/// Kills the child's process group when dropped, unless disarmed
///
/// The tool may be launched through a wrapper (e.g. a shell) whose own
/// children would otherwise outlive a timed-out or cancelled invocation.
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(pgid) = self.0.take() else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                tracing::debug!(pgid, "process group already gone: {}", e);
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn failed(spec: &CommandSpec, e: std::io::Error) -> CoreError {
    CoreError::ExecutionFailed {
        program: spec.program().to_string(),
        message: e.to_string(),
    }
}

fn strip_trailing_newlines(mut s: String) -> String {
    let len = s.trim_end_matches(['\n', '\r']).len();
    s.truncate(len);
    s
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_stdout_is_captured_without_trailing_newlines() {
        let runner = CommandRunner::default();
        let result = runner
            .execute(&sh("printf 'line one\\nline two\\n\\n'"))
            .await
            .unwrap();

        assert_eq!(result.stdout, "line one\nline two");
        assert_eq!(result.exit_code, 0);
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_large_output_on_both_streams_does_not_deadlock() {
        // Well past a pipe buffer on each stream
        let script = "i=0; while [ $i -lt 4000 ]; do \
                      echo 'stdout line padded to make the pipe fill up quickly'; \
                      echo 'stderr line padded to make the pipe fill up quickly' >&2; \
                      i=$((i+1)); done";
        let runner = CommandRunner::default();
        let result = runner
            .execute(&sh(script).timeout(Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(result.stdout.lines().count(), 4000);
        assert_eq!(result.stderr.lines().count(), 4000);
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let runner = CommandRunner::default();
        let err = runner
            .execute(&sh("echo 'Error: release not found' >&2; exit 3"))
            .await
            .unwrap_err();

        match err {
            CoreError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "Error: release not found\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = CommandRunner::default();
        let err = runner
            .execute(&CommandSpec::new("/nonexistent/helmgate-test-binary"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EXECUTION_FAILED");
    }

    #[tokio::test]
    async fn test_env_and_current_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = CommandRunner::default();
        let result = runner
            .execute(
                &sh("echo \"$HELMGATE_TEST_VALUE\"; pwd")
                    .env("HELMGATE_TEST_VALUE", "tenant-a")
                    .current_dir(dir.path()),
            )
            .await
            .unwrap();

        let mut lines = result.stdout.lines();
        assert_eq!(lines.next(), Some("tenant-a"));
        let pwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(pwd, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

        let runner = CommandRunner::default();
        let started = Instant::now();
        let err = runner
            .execute(&sh(&script).timeout(Duration::from_millis(300)))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ExecutionTimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));

        if cfg!(target_os = "linux") {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            let proc_path = format!("/proc/{}", pid.trim());
            assert!(!Path::new(&proc_path).exists(), "process still running");
        }
    }

    #[tokio::test]
    async fn test_saturated_pool_rejects() {
        let runner = CommandRunner::new(PoolConfig {
            workers: 2,
            queue_capacity: 0,
        });

        let busy = runner.clone();
        let holder = tokio::spawn(async move {
            busy.execute(&sh("sleep 1").timeout(Duration::from_secs(10)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = runner.execute(&sh("true")).await.unwrap_err();
        assert_eq!(err.code(), "EXECUTION_FAILED");
        assert!(err.to_string().contains("saturated"));

        holder.await.unwrap().unwrap();
        runner.execute(&sh("true")).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_its_queue_slot() {
        let runner = CommandRunner::new(PoolConfig {
            workers: 2,
            queue_capacity: 2,
        });

        let busy = runner.clone();
        let holder = tokio::spawn(async move {
            busy.execute(&sh("sleep 1").timeout(Duration::from_secs(10)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Dropped while still waiting for workers
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), runner.execute(&sh("echo abandoned")))
                .await;
        assert!(abandoned.is_err());
        assert_eq!(runner.waiting.load(Ordering::SeqCst), 0);
        holder.await.unwrap().unwrap();

        // The freed slot admits the next waiter
        let busy = runner.clone();
        let holder = tokio::spawn(async move {
            busy.execute(&sh("sleep 1").timeout(Duration::from_secs(10)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let queued = runner.execute(&sh("echo queued")).await.unwrap();
        assert_eq!(queued.stdout, "queued");
        holder.await.unwrap().unwrap();
        assert_eq!(runner.waiting.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_wrapped_grandchildren() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        // The shell forks instead of exec'ing, like a wrapper would
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let runner = CommandRunner::default();
        let err = runner
            .execute(&sh(&script).timeout(Duration::from_millis(300)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ExecutionTimedOut { .. }));

        if cfg!(target_os = "linux") {
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            let stat_path = format!("/proc/{}/stat", pid.trim());
            // Gone, or a zombie awaiting its new parent
            let mut alive = true;
            for _ in 0..50 {
                alive = match std::fs::read_to_string(&stat_path) {
                    Ok(stat) => !stat.contains(") Z"),
                    Err(_) => false,
                };
                if !alive {
                    break;
                }
                std::thread::sleep(Duration::from_millis(40));
            }
            assert!(!alive, "grandchild still running");
        }
    }

    #[tokio::test]
    async fn test_queued_invocations_complete() {
        let runner = CommandRunner::new(PoolConfig {
            workers: 2,
            queue_capacity: 20,
        });

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let runner = runner.clone();
                tokio::spawn(async move { runner.execute(&sh(&format!("echo {i}"))).await })
            })
            .collect();

        let mut outputs = Vec::new();
        for handle in handles {
            outputs.push(handle.await.unwrap().unwrap().stdout);
        }
        outputs.sort();
        assert_eq!(outputs, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_check_stderr_tolerates_warnings() {
        let result = CommandResult {
            stdout: String::new(),
            stderr: "WARNING: Kubernetes configuration file is group-readable\n".to_string(),
            exit_code: 0,
            elapsed: Duration::ZERO,
        };
        assert!(result.check_stderr("helm").is_ok());

        let result = CommandResult {
            stdout: String::new(),
            stderr: "WARNING: something\nError: boom\n".to_string(),
            exit_code: 0,
            elapsed: Duration::ZERO,
        };
        let err = result.check_stderr("helm").unwrap_err();
        match err {
            CoreError::StderrReported { stderr, .. } => assert_eq!(stderr, "Error: boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
