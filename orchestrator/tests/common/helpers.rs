//! Test helpers and builder patterns for orchestrator tests
//!
//! Mocks are built fresh per test; the builder only fills in the ones a test
//! did not supply.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use orchestrator::core::{Milestone, RunMetadata};
use orchestrator::services::ResultSink;
use orchestrator::traits::{
    ExitKind, ExitOutcome, HealthReport, LaunchSpec, MockHealthChecker, MockProcessSupervisor, MockRunStore, OutputTarget,
};
use orchestrator::{BenchError, PhaseOrchestrator, RunSettings, ShutdownHandle};
use shared::{BenchConfig, ProcessKey};

use super::fixtures::TestFixtures;

pub type TestOrchestrator = PhaseOrchestrator<MockProcessSupervisor, MockHealthChecker, MockRunStore>;

/// A built orchestrator plus what keeps its fixtures alive
pub struct TestRun {
    pub orchestrator: TestOrchestrator,
    pub shutdown: ShutdownHandle,
    pub dir: TempDir,
}

/// The parts of a LaunchSpec tests look at
#[derive(Debug, Clone)]
pub struct RecordedLaunch {
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
    pub stdout_is_sink: bool,
}

impl RecordedLaunch {
    fn from_launch(launch: &LaunchSpec) -> Self {
        Self {
            label: launch.label.to_string(),
            program: launch.program.clone(),
            args: launch.args.clone(),
            working_dir: launch.working_dir.clone(),
            env: launch.env.clone(),
            stdout_is_sink: matches!(launch.stdout, OutputTarget::Sink(_)),
        }
    }
}

/// Records every call a mocked supervisor receives
#[derive(Clone, Default)]
pub struct Recorder {
    launches: Arc<Mutex<Vec<RecordedLaunch>>>,
    waits: Arc<Mutex<Vec<Duration>>>,
    stops: Arc<Mutex<Vec<Duration>>>,
}

impl Recorder {
    pub fn launches(&self) -> Vec<RecordedLaunch> {
        self.launches.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.launches().into_iter().map(|l| l.label).collect()
    }

    pub fn launch(&self, label: &str) -> Option<RecordedLaunch> {
        self.launches().into_iter().find(|l| l.label == label)
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<Duration> {
        self.stops.lock().unwrap().clone()
    }

    /// Every start succeeds and every generator exits cleanly
    pub fn supervisor(&self) -> MockProcessSupervisor {
        self.supervisor_with(None, TestFixtures::outcome(ExitKind::Exited, Some(0)))
    }

    /// `fail_label` fails to spawn; generators end with `generator_outcome`
    pub fn supervisor_with(&self, fail_label: Option<&'static str>, generator_outcome: ExitOutcome) -> MockProcessSupervisor {
        let mut mock = MockProcessSupervisor::new();

        let launches = self.launches.clone();
        mock.expect_start().returning(move |launch: LaunchSpec| {
            let recorded = RecordedLaunch::from_launch(&launch);
            let label = recorded.label.clone();
            launches.lock().unwrap().push(recorded);
            if fail_label == Some(label.as_str()) {
                return Err(BenchError::ProcessSpawnFailed {
                    label,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
            Ok(ProcessKey::new())
        });

        let waits = self.waits.clone();
        mock.expect_wait_with_timeout().returning(move |_key, timeout| {
            waits.lock().unwrap().push(timeout);
            Ok(generator_outcome.clone())
        });

        let stops = self.stops.clone();
        mock.expect_stop_gracefully().returning(move |_key, timeout| {
            stops.lock().unwrap().push(timeout);
            Ok(TestFixtures::outcome(ExitKind::Terminated, None))
        });

        mock.expect_terminate_all_active().returning(|| 0);
        mock.expect_stop_all().returning(|_| 0);
        mock.expect_active_count().returning(|| 0);
        mock
    }
}

/// Builder pattern for creating test orchestrators with sensible defaults
pub struct OrchestratorBuilder {
    dir: TempDir,
    config: BenchConfig,
    settings: RunSettings,
    supervisor: Option<MockProcessSupervisor>,
    health_checker: Option<MockHealthChecker>,
    store: Option<MockRunStore>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = TestFixtures::config(dir.path());
        let settings = TestFixtures::settings(&config);
        Self {
            dir,
            config,
            settings,
            supervisor: None,
            health_checker: None,
            store: None,
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn skip_load(mut self) -> Self {
        self.settings.skip_load = true;
        self
    }

    pub fn with_config<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut BenchConfig),
    {
        setup(&mut self.config);
        self
    }

    pub fn with_settings<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut RunSettings),
    {
        setup(&mut self.settings);
        self
    }

    pub fn with_supervisor(mut self, supervisor: MockProcessSupervisor) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn with_health_checker(mut self, health_checker: MockHealthChecker) -> Self {
        self.health_checker = Some(health_checker);
        self
    }

    pub fn with_store(mut self, store: MockRunStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> TestRun {
        let supervisor = self.supervisor.unwrap_or_else(|| Recorder::default().supervisor());
        let health_checker = self.health_checker.unwrap_or_else(|| TestHelpers::health_checker(true));
        let store = self
            .store
            .unwrap_or_else(|| TestHelpers::store(&self.dir.path().join("results").join(TestFixtures::RUN_NAME)));

        let shutdown = ShutdownHandle::new();
        let orchestrator = PhaseOrchestrator::new(
            self.config,
            self.settings,
            Arc::new(supervisor),
            health_checker,
            store,
            shutdown.listener(),
        );

        TestRun {
            orchestrator,
            shutdown,
            dir: self.dir,
        }
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Common mock setups and assertions
pub struct TestHelpers;

impl TestHelpers {
    /// Reports every endpoint healthy, or elasticsearch as down
    pub fn health_checker(healthy: bool) -> MockHealthChecker {
        let mut mock = MockHealthChecker::new();
        mock.expect_check_services_healthy().returning(move |endpoints| HealthReport {
            checked: endpoints.len(),
            failed: if healthy {
                vec![]
            } else {
                vec!["elasticsearch".to_string()]
            },
        });
        mock
    }

    /// Store writing real sink files into `run_dir`; metadata is not written
    pub fn store(run_dir: &Path) -> MockRunStore {
        std::fs::create_dir_all(run_dir).unwrap();
        let mut mock = MockRunStore::new();

        let dir = run_dir.to_path_buf();
        mock.expect_run_dir().returning(move || dir.clone());

        let dir = run_dir.to_path_buf();
        mock.expect_create_sink()
            .returning(move |backend: &str| ResultSink::create(backend, dir.join(format!("{backend}.jsonl"))));

        let dir = run_dir.to_path_buf();
        mock.expect_persist_metadata()
            .returning(move |_| Ok(dir.join("metadata.json")));

        let dir = run_dir.to_path_buf();
        mock.expect_persist_config_copy()
            .returning(move |_| Ok(dir.join("bench_config.yaml")));

        mock.expect_count_records().returning(|_| Ok(0));
        mock
    }

    /// Every milestone stamped, in non-decreasing order
    pub fn assert_full_timeline(metadata: &RunMetadata) {
        for milestone in Milestone::ORDER {
            assert!(metadata.get(milestone).is_some(), "{milestone} was never stamped");
        }
        assert!(metadata.is_monotonic(), "timestamps out of order: {:?}", metadata.stamped());
    }
}
