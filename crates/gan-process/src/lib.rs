//! Process Manager (§4.B): spawns the external code-analysis CLI as a subprocess with
//! bounded concurrency, a per-call timeout state machine, and a bounded output buffer.

use gan_core::{Diagnostic, GanError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::warn;

/// Default grace period between the graceful-stop signal and the unconditional kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
/// Default cap on each of stdout/stderr before the child is killed as a buffer overflow.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
const READ_BUF_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
    pub stdin_payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub timed_out: bool,
}

struct ChildRegistration {
    pid: i32,
}

/// Spawns subprocesses under a concurrency cap, with FIFO backpressure and a hard
/// RUNNING -> TERMINATING -> KILLED lifetime per child. Counters use atomics and the
/// semaphore's own synchronization rather than a global mutex, per the concurrency contract.
pub struct ProcessManager {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicU32>,
    shutting_down: Arc<AtomicBool>,
    grace_period: Duration,
    max_output_bytes: usize,
    registry: Arc<Mutex<HashMap<u64, ChildRegistration>>>,
    next_handle_id: Arc<AtomicU64>,
}

impl ProcessManager {
    pub fn new(max_concurrent: usize) -> Self {
        ProcessManager {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            active: Arc::new(AtomicU32::new(0)),
            shutting_down: Arc::new(AtomicBool::new(false)),
            grace_period: DEFAULT_GRACE_PERIOD,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_handle_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// Running children, not including FIFO-queued waiters.
    pub fn active_count(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawn `program args…` and wait for completion, respecting `opts.timeout` as the
    /// deadline for the whole call including any time spent queued on the semaphore.
    pub async fn execute(
        &self,
        program: &str,
        args: &[String],
        opts: ExecuteOptions,
    ) -> Result<ExecuteResult, Diagnostic> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(GanError::Process("shutting down".into()).into());
        }

        let deadline = Instant::now() + opts.timeout;

        let permit = match tokio::time::timeout_at(deadline.into(), self.semaphore.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(GanError::Process("process manager is shutting down".into()).into()),
            Err(_) => return Err(GanError::Timeout(opts.timeout.as_millis() as u64).into()),
        };

        if self.shutting_down.load(Ordering::SeqCst) {
            drop(permit);
            return Err(GanError::Process("shutting down".into()).into());
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        let result = self.run_child(program, args, opts, deadline).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
        result
    }

    async fn run_child(
        &self,
        program: &str,
        args: &[String],
        opts: ExecuteOptions,
        deadline: Instant,
    ) -> Result<ExecuteResult, Diagnostic> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.current_dir(&opts.working_dir);
        cmd.env_clear();
        cmd.envs(opts.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(if opts.stdin_payload.is_some() {
            std::process::Stdio::piped()
        } else {
            std::process::Stdio::null()
        });
        cmd.kill_on_drop(true);

        // SAFETY: setsid() is async-signal-safe and runs before exec; it isolates the
        // child in its own process group so grandchildren can be reaped by group signal.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| Diagnostic::from(GanError::Process(format!("spawn failed: {e}"))))?;

        let pid = child.id().map(|p| p as i32);
        let handle_id = self.next_handle_id.fetch_add(1, Ordering::SeqCst);
        if let Some(pid) = pid {
            self.registry.lock().unwrap().insert(handle_id, ChildRegistration { pid });
        }

        if let Some(data) = opts.stdin_payload {
            if let Some(mut stdin) = child.stdin.take() {
                tokio::spawn(async move {
                    if let Err(e) = stdin.write_all(&data).await {
                        warn!("stdin write error: {e}");
                    }
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let outcome = self.drain_and_wait(&mut child, deadline).await;
        self.registry.lock().unwrap().remove(&handle_id);

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            DrainOutcome::Exited { stdout, stderr, exit_code } => Ok(ExecuteResult {
                stdout,
                stderr,
                exit_code,
                duration_ms,
                timed_out: false,
            }),
            DrainOutcome::TimedOut { stdout, stderr, exit_code } => Ok(ExecuteResult {
                stdout,
                stderr,
                exit_code,
                duration_ms,
                timed_out: true,
            }),
            DrainOutcome::BufferOverflow => {
                Err(GanError::Process("stdout/stderr exceeded the configured buffer cap".into()).into())
            }
        }
    }

    async fn drain_and_wait(&self, child: &mut tokio::process::Child, deadline: Instant) -> DrainOutcome {
        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");
        let mut stdout_reader = BufReader::new(stdout);
        let mut stderr_reader = BufReader::new(stderr);

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut stdout_chunk = [0u8; READ_BUF_SIZE];
        let mut stderr_chunk = [0u8; READ_BUF_SIZE];
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut entered_terminating = false;

        loop {
            if stdout_done && stderr_done {
                break;
            }
            tokio::select! {
                result = stdout_reader.read(&mut stdout_chunk), if !stdout_done => {
                    match result {
                        Ok(0) => stdout_done = true,
                        Ok(n) => {
                            stdout_buf.extend_from_slice(&stdout_chunk[..n]);
                            if stdout_buf.len() > self.max_output_bytes {
                                self.kill_group_by_pid(child.id());
                                let _ = child.wait().await;
                                return DrainOutcome::BufferOverflow;
                            }
                        }
                        Err(_) => stdout_done = true,
                    }
                }
                result = stderr_reader.read(&mut stderr_chunk), if !stderr_done => {
                    match result {
                        Ok(0) => stderr_done = true,
                        Ok(n) => {
                            stderr_buf.extend_from_slice(&stderr_chunk[..n]);
                            if stderr_buf.len() > self.max_output_bytes {
                                self.kill_group_by_pid(child.id());
                                let _ = child.wait().await;
                                return DrainOutcome::BufferOverflow;
                            }
                        }
                        Err(_) => stderr_done = true,
                    }
                }
                _ = tokio::time::sleep_until(deadline.into()), if !entered_terminating => {
                    entered_terminating = true;
                    warn!("audit subprocess deadline hit, entering TERMINATING");
                    self.send_signal_by_pid(child.id(), libc::SIGTERM);
                }
            }
        }

        let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();

        if !entered_terminating {
            let status = child.wait().await;
            let exit_code = status.ok().and_then(|s| s.code()).unwrap_or(1);
            return DrainOutcome::Exited { stdout, stderr, exit_code };
        }

        // TERMINATING: wait up to the grace period for exit, then force-kill.
        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(status) => {
                let exit_code = status.ok().and_then(|s| s.code()).unwrap_or(1);
                DrainOutcome::TimedOut { stdout, stderr, exit_code }
            }
            Err(_) => {
                self.kill_group_by_pid(child.id());
                let status = child.wait().await;
                let exit_code = status.ok().and_then(|s| s.code()).unwrap_or(1);
                DrainOutcome::TimedOut { stdout, stderr, exit_code }
            }
        }
    }

    fn send_signal_by_pid(&self, pid: Option<u32>, signal: i32) {
        if let Some(pid) = pid {
            // SAFETY: kill() is async-signal-safe; negative pid targets the whole group.
            unsafe {
                libc::kill(-(pid as i32), signal);
            }
        }
    }

    fn kill_group_by_pid(&self, pid: Option<u32>) {
        self.send_signal_by_pid(pid, libc::SIGKILL);
    }

    /// Transitions every tracked RUNNING child to TERMINATING, waits up to the grace
    /// period, then force-kills stragglers. After this returns, `execute` fails
    /// immediately until a new `ProcessManager` is constructed.
    pub async fn terminate_all(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let pids: Vec<i32> = {
            let registry = self.registry.lock().unwrap();
            registry.values().map(|c| c.pid).collect()
        };
        for pid in &pids {
            unsafe {
                libc::kill(-(*pid), libc::SIGTERM);
            }
        }
        tokio::time::sleep(self.grace_period).await;
        for pid in &pids {
            unsafe {
                libc::kill(-(*pid), libc::SIGKILL);
            }
        }
        self.semaphore.close();
    }
}

enum DrainOutcome {
    Exited { stdout: String, stderr: String, exit_code: i32 },
    TimedOut { stdout: String, stderr: String, exit_code: i32 },
    BufferOverflow,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
