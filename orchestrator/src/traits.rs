//! Trait definitions with mockall annotations for testing
//!
//! The phase orchestrator only talks to the outside world through these
//! traits: child processes, backend health endpoints and the run directory.

use shared::{process_warn, BackendAuth, BenchConfig, ProcessId, ProcessKey};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::RunMetadata;
use crate::error::BenchResult;
use crate::services::result_sink::ResultSink;

/// Where a child's stdout or stderr goes
#[derive(Debug)]
pub enum OutputTarget {
    Null,
    Inherit,
    /// Buffered in memory and logged if the process fails
    Capture,
    /// Written straight to a per-run output file
    Sink(ResultSink),
}

/// Everything needed to start one child process
#[derive(Debug)]
pub struct LaunchSpec {
    pub label: ProcessId,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Full child environment; `None` inherits the runner's
    pub env: Option<HashMap<String, String>>,
    pub stdout: OutputTarget,
    pub stderr: OutputTarget,
}

impl LaunchSpec {
    pub fn new(label: ProcessId, program: impl Into<String>) -> Self {
        Self {
            label,
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: None,
            stdout: OutputTarget::Inherit,
            stderr: OutputTarget::Inherit,
        }
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn stdout(mut self, target: OutputTarget) -> Self {
        self.stdout = target;
        self
    }

    pub fn stderr(mut self, target: OutputTarget) -> Self {
        self.stderr = target;
        self
    }

    /// Program and arguments joined for log output
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Finished on its own
    Exited,
    /// Stopped by the graceful terminate signal
    Terminated,
    /// Ignored the graceful signal and was force-killed
    Killed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitOutcome {
    pub kind: ExitKind,
    /// Exit code, `None` when ended by a signal
    pub code: Option<i32>,
    pub elapsed: Duration,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.kind == ExitKind::Exited && self.code == Some(0)
    }

    /// Exited with a non-zero code
    pub fn failed(&self) -> bool {
        matches!(self.code, Some(code) if code != 0)
    }
}

/// A backend health URL together with the credentials it needs
#[derive(Debug, Clone, PartialEq)]
pub struct HealthEndpoint {
    pub name: String,
    pub url: String,
    pub auth: Option<BackendAuth>,
}

impl HealthEndpoint {
    /// Endpoints of every backend that declares a health URL, in config order.
    /// A loaded config always has one per backend; anything else is warned about.
    pub fn from_config(config: &BenchConfig) -> Vec<HealthEndpoint> {
        config
            .backends
            .iter()
            .filter_map(|backend| match &backend.health_url {
                Some(url) => Some(HealthEndpoint {
                    name: backend.name.clone(),
                    url: url.clone(),
                    auth: backend.auth.clone(),
                }),
                None => {
                    process_warn!(ProcessId::Runner, "{} has no health URL and is not checked", backend.name);
                    None
                }
            })
            .collect()
    }
}

/// Result of one pass of the health gate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Number of endpoints queried
    pub checked: usize,
    /// Backends that did not answer successfully, in query order
    pub failed: Vec<String>,
}

impl HealthReport {
    /// An empty gate never passes
    pub fn is_healthy(&self) -> bool {
        self.checked > 0 && self.failed.is_empty()
    }
}

/// Child process supervision
///
/// Every started process is tracked until it has been waited for or
/// stopped; nothing the supervisor starts may outlive the run.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Spawn a child in its own process group and register it
    async fn start(&self, launch: LaunchSpec) -> BenchResult<ProcessKey>;

    /// Wait for a natural exit; past `timeout` the process is terminated
    /// with escalation and the outcome of that is returned instead
    async fn wait_with_timeout(&self, key: ProcessKey, timeout: Duration) -> BenchResult<ExitOutcome>;

    /// Send the graceful signal, wait up to `timeout`, then force-kill
    async fn stop_gracefully(&self, key: ProcessKey, timeout: Duration) -> BenchResult<ExitOutcome>;

    /// Send the graceful signal to every registered process without waiting
    /// and refuse further starts. Returns how many were signalled.
    async fn terminate_all_active(&self) -> usize;

    /// Stop every process still registered, escalating after `grace`, and
    /// refuse further starts. Returns how many were stopped.
    async fn stop_all(&self, grace: Duration) -> usize;

    async fn active_count(&self) -> usize;
}

/// Backend health gate
#[mockall::automock]
#[async_trait::async_trait]
pub trait HealthChecker: Send + Sync {
    /// Query every endpoint once. Each result is logged and no failure
    /// short-circuits the rest; the report is healthy only if at least one
    /// endpoint was checked and all of them answered.
    async fn check_services_healthy(&self, endpoints: &[HealthEndpoint]) -> HealthReport;
}

/// Per-run output directory
#[mockall::automock]
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    fn run_dir(&self) -> PathBuf;

    /// Create the append-only result file for one backend's probe
    async fn create_sink(&self, backend: &str) -> BenchResult<ResultSink>;

    async fn persist_metadata(&self, metadata: &RunMetadata) -> BenchResult<PathBuf>;

    /// Copy of the configuration the run used
    async fn persist_config_copy(&self, config: &BenchConfig) -> BenchResult<PathBuf>;

    /// Number of result records a backend's probe produced
    async fn count_records(&self, backend: &str) -> BenchResult<usize>;
}
