//! Real process supervision
//!
//! Children are spawned into their own process group so that signals reach
//! anything they fork. Stopping always follows the same ladder: SIGTERM,
//! a bounded wait, SIGKILL, then an unbounded wait for the reap.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{BenchError, BenchResult};
use crate::services::result_sink::ResultSink;
use crate::traits::{ExitKind, ExitOutcome, LaunchSpec, OutputTarget, ProcessSupervisor};
use shared::{process_debug, process_error, process_info, process_warn, ProcessId, ProcessKey};

/// Default wait between SIGTERM and SIGKILL
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// How long to wait for a failed process's stderr pipe to drain
const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Graceful,
    Force,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSignal::Graceful => write!(f, "SIGTERM"),
            StopSignal::Force => write!(f, "SIGKILL"),
        }
    }
}

/// Signal a whole process group, falling back to the leader alone.
/// A group that no longer exists counts as delivered.
#[cfg(unix)]
fn signal_group(pid: u32, signal: StopSignal) -> Result<(), nix::errno::Errno> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let sig = match signal {
        StopSignal::Graceful => Signal::SIGTERM,
        StopSignal::Force => Signal::SIGKILL,
    };
    let pid = Pid::from_raw(pid as i32);
    match killpg(pid, sig) {
        Err(Errno::ESRCH) => match kill(pid, sig) {
            Err(Errno::ESRCH) => Ok(()),
            other => other,
        },
        other => other,
    }
}

/// Bytes of captured output kept per stream; older output is dropped
pub(crate) const CAPTURE_LIMIT: usize = 64 * 1024;

pub(crate) const CAPTURE_TRUNCATED_MARKER: &str = "[earlier output dropped]";

/// Drain a child's pipe in the background, keeping only the last
/// `CAPTURE_LIMIT` bytes
pub(crate) fn capture_stream<R>(mut reader: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail: Vec<u8> = Vec::new();
        let mut chunk = vec![0u8; 8 * 1024];
        let mut truncated = false;
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > CAPTURE_LIMIT {
                        let excess = tail.len() - CAPTURE_LIMIT;
                        tail.drain(..excess);
                        truncated = true;
                    }
                }
            }
        }

        let text = String::from_utf8_lossy(&tail);
        if truncated {
            format!("{CAPTURE_TRUNCATED_MARKER}\n{text}")
        } else {
            text.into_owned()
        }
    })
}

/// A running child and everything the runner holds on its behalf
struct ManagedProcess {
    label: ProcessId,
    pid: Option<u32>,
    child: Child,
    started: Instant,
    outputs: Vec<ResultSink>,
    stdout_capture: Option<JoinHandle<String>>,
    stderr_capture: Option<JoinHandle<String>>,
    finished: bool,
}

impl ManagedProcess {
    fn outcome(&self, kind: ExitKind, status: ExitStatus) -> ExitOutcome {
        ExitOutcome {
            kind,
            code: status.code(),
            elapsed: self.started.elapsed(),
        }
    }

    fn signal(&mut self, signal: StopSignal) -> BenchResult<()> {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                match signal_group(pid, signal) {
                    Ok(()) => {
                        process_debug!(self.label, "Sent {} to process group {}", signal, pid);
                        return Ok(());
                    }
                    Err(errno) => {
                        process_warn!(self.label, "{} to process group {} failed: {}", signal, pid, errno);
                    }
                }
            }
        }

        // Only the direct child can be reached from here, and only by killing it
        self.child.start_kill().map_err(|e| BenchError::SignalFailed {
            label: self.label.to_string(),
            message: e.to_string(),
        })
    }
}

/// Registry entry; pid and label stay readable while the process is locked
#[derive(Clone)]
struct Tracked {
    label: ProcessId,
    pid: Option<u32>,
    process: Arc<Mutex<ManagedProcess>>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<ProcessKey, Tracked>,
    /// Set once shutdown starts; no new processes are started after that
    closed: bool,
}

/// Real process supervisor implementation
pub struct RealProcessSupervisor {
    registry: Mutex<Registry>,
    terminate_grace: Duration,
}

impl Default for RealProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl RealProcessSupervisor {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }

    /// Configure the SIGTERM to SIGKILL grace used after a wait times out
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    fn stdio_for(target: OutputTarget, sinks: &mut Vec<ResultSink>) -> BenchResult<Stdio> {
        Ok(match target {
            OutputTarget::Null => Stdio::null(),
            OutputTarget::Inherit => Stdio::inherit(),
            OutputTarget::Capture => Stdio::piped(),
            OutputTarget::Sink(sink) => {
                let stdio = sink.child_stdio()?;
                sinks.push(sink);
                stdio
            }
        })
    }

    async fn lookup(&self, key: ProcessKey) -> BenchResult<Tracked> {
        self.registry
            .lock()
            .await
            .slots
            .get(&key)
            .cloned()
            .ok_or(BenchError::ProcessNotFound { key })
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL and wait for the reap
    async fn escalate(&self, process: &mut ManagedProcess, grace: Duration) -> BenchResult<ExitOutcome> {
        if let Some(status) = process.child.try_wait()? {
            return Ok(process.outcome(ExitKind::Exited, status));
        }

        if let Err(e) = process.signal(StopSignal::Graceful) {
            process_warn!(process.label, "Could not request termination: {}", e);
        }

        match tokio::time::timeout(grace, process.child.wait()).await {
            Ok(status) => {
                let status = status?;
                Ok(process.outcome(ExitKind::Terminated, status))
            }
            Err(_) => {
                process_warn!(process.label, "Still running {:?} after SIGTERM, killing", grace);
                process.signal(StopSignal::Force)?;
                let status = process.child.wait().await?;
                Ok(process.outcome(ExitKind::Killed, status))
            }
        }
    }

    /// Log the outcome, surface stderr on failure, release output files and
    /// drop the registry entry
    async fn finish(&self, key: ProcessKey, process: &mut ManagedProcess, result: &BenchResult<ExitOutcome>) {
        process.finished = true;
        let label = process.label.clone();

        let failed = match result {
            Ok(outcome) => {
                match (outcome.kind, outcome.code) {
                    (ExitKind::Exited, Some(0)) => {
                        process_info!(label, "Exited cleanly after {:.1?}", outcome.elapsed);
                    }
                    (ExitKind::Exited, Some(code)) => {
                        process_warn!(label, "Exited with code {} after {:.1?}", code, outcome.elapsed);
                    }
                    (ExitKind::Exited, None) => {
                        process_warn!(label, "Exited by signal after {:.1?}", outcome.elapsed);
                    }
                    (ExitKind::Terminated, code) => {
                        process_info!(label, "Terminated after {:.1?} (code {:?})", outcome.elapsed, code);
                    }
                    (ExitKind::Killed, _) => {
                        process_warn!(label, "Killed after {:.1?}", outcome.elapsed);
                    }
                }
                outcome.failed()
            }
            Err(e) => {
                process_error!(label, "Lost track of process: {}", e);
                true
            }
        };

        if let Some(handle) = process.stdout_capture.take() {
            handle.abort();
        }
        if let Some(handle) = process.stderr_capture.take() {
            if failed {
                match tokio::time::timeout(CAPTURE_DRAIN_TIMEOUT, handle).await {
                    Ok(Ok(stderr)) if !stderr.trim().is_empty() => {
                        process_error!(label, "stderr:\n{}", stderr.trim_end());
                    }
                    Ok(Ok(_)) => {
                        process_error!(label, "Failed with empty stderr");
                    }
                    _ => {
                        process_warn!(label, "stderr could not be collected");
                    }
                }
            } else {
                handle.abort();
            }
        }

        for sink in process.outputs.drain(..) {
            let path = sink.path().to_path_buf();
            if let Err(e) = sink.close() {
                process_warn!(label, "Closing {} failed: {}", path.display(), e);
            }
        }

        self.registry.lock().await.slots.remove(&key);
    }
}

#[async_trait]
impl ProcessSupervisor for RealProcessSupervisor {
    async fn start(&self, launch: LaunchSpec) -> BenchResult<ProcessKey> {
        let command_line = launch.command_line();
        let LaunchSpec {
            label,
            program,
            args,
            working_dir,
            env,
            stdout,
            stderr,
        } = launch;

        let mut outputs = Vec::new();
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Self::stdio_for(stdout, &mut outputs)?)
            .stderr(Self::stdio_for(stderr, &mut outputs)?)
            .kill_on_drop(true);
        if let Some(dir) = &working_dir {
            cmd.current_dir(dir);
        }
        if let Some(env) = &env {
            cmd.env_clear().envs(env);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        // Spawn under the registry lock so a concurrent shutdown cannot miss it
        let mut registry = self.registry.lock().await;
        if registry.closed {
            return Err(BenchError::cancelled(format!("not starting {label} during shutdown")));
        }

        let mut child = cmd.spawn().map_err(|source| BenchError::ProcessSpawnFailed {
            label: label.to_string(),
            source,
        })?;
        let pid = child.id();
        let stdout_capture = child.stdout.take().map(capture_stream);
        let stderr_capture = child.stderr.take().map(capture_stream);

        let key = ProcessKey::new();
        process_info!(
            label,
            "Started (pid {}): {}",
            pid.map_or_else(|| "?".to_string(), |p| p.to_string()),
            command_line
        );

        let process = ManagedProcess {
            label: label.clone(),
            pid,
            child,
            started: Instant::now(),
            outputs,
            stdout_capture,
            stderr_capture,
            finished: false,
        };
        registry.slots.insert(
            key,
            Tracked {
                label,
                pid,
                process: Arc::new(Mutex::new(process)),
            },
        );
        Ok(key)
    }

    async fn wait_with_timeout(&self, key: ProcessKey, timeout: Duration) -> BenchResult<ExitOutcome> {
        let tracked = self.lookup(key).await?;
        let mut process = tracked.process.lock().await;
        if process.finished {
            return Err(BenchError::ProcessNotFound { key });
        }

        let result = match tokio::time::timeout(timeout, process.child.wait()).await {
            Ok(Ok(status)) => Ok(process.outcome(ExitKind::Exited, status)),
            Ok(Err(e)) => Err(BenchError::Io(e)),
            Err(_) => {
                process_warn!(tracked.label, "Did not finish within {:?}, terminating", timeout);
                self.escalate(&mut process, self.terminate_grace).await
            }
        };

        self.finish(key, &mut process, &result).await;
        result
    }

    async fn stop_gracefully(&self, key: ProcessKey, timeout: Duration) -> BenchResult<ExitOutcome> {
        let tracked = self.lookup(key).await?;
        let mut process = tracked.process.lock().await;
        if process.finished {
            return Err(BenchError::ProcessNotFound { key });
        }

        process_info!(tracked.label, "Stopping (grace {:?})", timeout);
        let result = self.escalate(&mut process, timeout).await;
        self.finish(key, &mut process, &result).await;
        result
    }

    async fn terminate_all_active(&self) -> usize {
        let mut registry = self.registry.lock().await;
        registry.closed = true;

        let mut signalled = 0;
        for tracked in registry.slots.values() {
            #[cfg(unix)]
            {
                let Some(pid) = tracked.pid else { continue };
                match signal_group(pid, StopSignal::Graceful) {
                    Ok(()) => {
                        process_info!(tracked.label, "Sent SIGTERM to process group {}", pid);
                        signalled += 1;
                    }
                    Err(errno) => {
                        process_warn!(tracked.label, "SIGTERM failed: {}", errno);
                    }
                }
            }
            #[cfg(not(unix))]
            {
                if let Ok(mut process) = tracked.process.try_lock() {
                    if process.child.start_kill().is_ok() {
                        signalled += 1;
                    }
                } else {
                    process_warn!(tracked.label, "Busy, will be stopped on exit");
                }
            }
        }
        signalled
    }

    async fn stop_all(&self, grace: Duration) -> usize {
        let tracked: Vec<(ProcessKey, Tracked)> = {
            let mut registry = self.registry.lock().await;
            registry.closed = true;
            registry.slots.iter().map(|(k, t)| (*k, t.clone())).collect()
        };

        let mut stopped = 0;
        for (key, tracked) in tracked {
            let mut process = tracked.process.lock().await;
            if process.finished {
                continue;
            }
            let result = self.escalate(&mut process, grace).await;
            self.finish(key, &mut process, &result).await;
            stopped += 1;
        }
        stopped
    }

    async fn active_count(&self) -> usize {
        self.registry.lock().await.slots.len()
    }
}
