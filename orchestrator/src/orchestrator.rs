//! Phase orchestrator
//!
//! Drives one benchmark run through its fixed phase sequence using injected
//! services. Child failures are logged and the run carries on; only an
//! unhealthy backend, an invalid configuration or cancellation end it early.

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shared::{logging, process_info, process_warn, BackendConfig, BenchConfig, Phase, ProcessId, ProcessKey};

use crate::core::{build_environment, plan_seed, HostFacts, Milestone, PhasePlan, RunMetadata, RunState, SeedPlan};
use crate::error::{BenchError, BenchResult};
use crate::shutdown::ShutdownListener;
use crate::traits::{HealthChecker, HealthEndpoint, LaunchSpec, OutputTarget, ProcessSupervisor, RunStore};

/// Log level forced on the generator unless the environment already sets one
const GENERATOR_LOG_LEVEL: &str = "info";

/// Inputs decided before the run starts
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub run_name: String,
    pub skip_load: bool,
    pub seed: SeedPlan,
    pub host: HostFacts,
    /// Complete environment handed to every child
    pub env: HashMap<String, String>,
}

impl RunSettings {
    /// Read the generator rate, host facts and child environment
    pub fn detect(config: &BenchConfig, run_name: impl Into<String>, skip_load: bool) -> Self {
        Self {
            run_name: run_name.into(),
            skip_load,
            seed: plan_seed(config),
            host: HostFacts::detect(),
            env: build_environment(&config.env_file),
        }
    }
}

/// What a finished run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub config_path: PathBuf,
    /// Result records per backend, in config order
    pub records: Vec<(String, usize)>,
}

/// The plan `--dry-run` prints; starts nothing
pub fn dry_run_plan(config: &BenchConfig, skip_load: bool) -> PhasePlan {
    PhasePlan::new(config, plan_seed(config), skip_load)
}

/// Race `work` against cancellation
async fn guarded<T, W>(shutdown: &ShutdownListener, work: W) -> BenchResult<T>
where
    W: Future<Output = T>,
{
    let mut shutdown = shutdown.clone();
    tokio::select! {
        biased;
        reason = shutdown.wait() => Err(BenchError::cancelled(reason)),
        out = work => Ok(out),
    }
}

/// Runs the benchmark phases in order against injected services
pub struct PhaseOrchestrator<S, H, F>
where
    S: ProcessSupervisor + 'static,
    H: HealthChecker,
    F: RunStore,
{
    config: BenchConfig,
    settings: RunSettings,

    supervisor: Arc<S>,
    health_checker: H,
    store: F,
    shutdown: ShutdownListener,

    state: RunState,
    metadata: RunMetadata,
    probes: Vec<(String, ProcessKey)>,
}

impl<S, H, F> PhaseOrchestrator<S, H, F>
where
    S: ProcessSupervisor + 'static,
    H: HealthChecker,
    F: RunStore,
{
    pub fn new(
        config: BenchConfig,
        settings: RunSettings,
        supervisor: Arc<S>,
        health_checker: H,
        store: F,
        shutdown: ShutdownListener,
    ) -> Self {
        let metadata = RunMetadata::new(
            settings.run_name.clone(),
            &config,
            settings.host.clone(),
            settings.seed,
            settings.skip_load,
        );

        Self {
            config,
            settings,
            supervisor,
            health_checker,
            store,
            shutdown,
            state: RunState::new(),
            metadata,
            probes: Vec::new(),
        }
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Execute every phase; returns once results and metadata are on disk
    pub async fn run(&mut self) -> BenchResult<RunSummary> {
        self.enter(Phase::Init, "validating configuration")?;
        self.metadata.stamp_now(Milestone::Start)?;
        self.config.validate_paths()?;

        self.health_gate().await?;
        self.seed().await?;
        self.probes_up().await?;

        self.enter(
            Phase::SteadyState,
            &format!("steady state ({}s), probes only", self.config.steady_state_secs),
        )?;
        self.pause(self.config.steady_state()).await?;
        self.metadata.stamp_now(Milestone::SteadyEnd)?;

        self.enter(
            Phase::HeavyWrite,
            &format!("heavy write ({}s), generator and probes", self.config.heavy_write_secs),
        )?;
        self.run_generator(Phase::HeavyWrite, self.config.heavy_write_secs)
            .await?;
        self.metadata.stamp_now(Milestone::HeavyEnd)?;

        self.enter(
            Phase::Recovery,
            &format!("recovery ({}s), probes only", self.config.recovery_secs),
        )?;
        self.pause(self.config.recovery()).await?;
        self.metadata.stamp_now(Milestone::RecoveryEnd)?;

        self.probes_down().await?;
        self.finalize().await
    }

    fn enter(&mut self, phase: Phase, details: &str) -> BenchResult<()> {
        self.state.advance(phase)?;
        logging::log_phase(phase, details);
        Ok(())
    }

    fn checkpoint(&self) -> BenchResult<()> {
        match self.shutdown.reason() {
            Some(reason) => Err(BenchError::cancelled(reason)),
            None => Ok(()),
        }
    }

    async fn pause(&self, duration: Duration) -> BenchResult<()> {
        guarded(&self.shutdown, tokio::time::sleep(duration)).await
    }

    async fn health_gate(&mut self) -> BenchResult<()> {
        self.enter(Phase::HealthGate, "checking service health")?;
        let endpoints = HealthEndpoint::from_config(&self.config);
        let report = guarded(
            &self.shutdown,
            self.health_checker.check_services_healthy(&endpoints),
        )
        .await?;

        if !report.is_healthy() {
            logging::log_error(
                &ProcessId::Runner,
                "Health gate",
                &"one or more backends are unreachable, are they running?",
            );
            return Err(BenchError::HealthCheckFailed { failed: report.failed });
        }
        Ok(())
    }

    async fn seed(&mut self) -> BenchResult<()> {
        if self.settings.skip_load {
            self.enter(Phase::Seed, "skipped (--skip-load)")?;
            let start = self.metadata.get(Milestone::Start).unwrap_or_else(Utc::now);
            self.metadata.stamp(Milestone::SeedDone, start)?;
            return Ok(());
        }

        let seed = self.settings.seed;
        let details = if seed.degraded {
            format!("pre-seeding for {}s (rate unknown)", seed.duration_secs)
        } else {
            format!(
                "pre-seeding ~{} logs ({}s at ~{:.0} logs/s)",
                self.config.pre_seed_logs, seed.duration_secs, seed.total_rate
            )
        };
        self.enter(Phase::Seed, &details)?;

        self.run_generator(Phase::Seed, seed.duration_secs).await?;
        self.metadata.stamp_now(Milestone::SeedDone)?;

        process_info!(ProcessId::Runner, "Waiting {}s for indexes to settle", self.config.settle_secs);
        self.pause(self.config.settle()).await
    }

    fn generator_launch(&self, phase: Phase, duration_secs: u64) -> LaunchSpec {
        let (program, mut args) = match self.config.generator_command.as_deref().and_then(<[String]>::split_first) {
            Some((program, prefix)) => (program.clone(), prefix.to_vec()),
            None => (
                "cargo".to_string(),
                vec![
                    "run".to_string(),
                    "--release".to_string(),
                    "--features".to_string(),
                    self.config.generator_features.clone(),
                    "--".to_string(),
                ],
            ),
        };
        args.push("--duration-secs".to_string());
        args.push(duration_secs.to_string());

        let mut env = self.settings.env.clone();
        env.entry("RUST_LOG".to_string())
            .or_insert_with(|| GENERATOR_LOG_LEVEL.to_string());

        LaunchSpec::new(ProcessId::Generator(phase), program)
            .args(args)
            .current_dir(&self.config.generator_dir)
            .env(env)
            .stdout(OutputTarget::Null)
            .stderr(OutputTarget::Capture)
    }

    /// Run the generator to completion, bounded by its duration plus slack.
    /// A generator that fails to start or exits non-zero does not end the run.
    async fn run_generator(&self, phase: Phase, duration_secs: u64) -> BenchResult<()> {
        self.checkpoint()?;
        let label = ProcessId::Generator(phase);

        let key = match self.supervisor.start(self.generator_launch(phase, duration_secs)).await {
            Ok(key) => key,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                logging::log_error(&label, "Generator start", &e);
                return Ok(());
            }
        };

        let limit = Duration::from_secs(duration_secs) + self.config.generator_slack();
        match guarded(&self.shutdown, self.supervisor.wait_with_timeout(key, limit)).await? {
            Ok(outcome) if !outcome.success() => {
                process_warn!(label, "Generator did not finish cleanly ({:?}), continuing", outcome.kind);
            }
            Ok(_) => {}
            Err(e) => logging::log_error(&label, "Generator wait", &e),
        }
        Ok(())
    }

    fn probe_launch(&self, backend: &BackendConfig, output: OutputTarget) -> LaunchSpec {
        let config_path = self.config.probe_config_path(backend);
        let queries_path = self.config.probe_queries_path(backend);

        LaunchSpec::new(ProcessId::probe(&backend.name), &self.config.probe_binary)
            .args([
                "-c".to_string(),
                config_path.display().to_string(),
                "-q".to_string(),
                queries_path.display().to_string(),
            ])
            .args(["--headless", "--output", "json", "--bursts", "0"])
            .env(self.settings.env.clone())
            .stdout(output)
            .stderr(OutputTarget::Capture)
    }

    async fn probes_up(&mut self) -> BenchResult<()> {
        self.enter(Phase::ProbesUp, "starting probes")?;

        let backends = self.config.backends.clone();
        for backend in &backends {
            self.checkpoint()?;
            let label = ProcessId::probe(&backend.name);

            let sink = match self.store.create_sink(&backend.name).await {
                Ok(sink) => sink,
                Err(e) => {
                    logging::log_error(&label, "Result file creation", &e);
                    continue;
                }
            };

            match self
                .supervisor
                .start(self.probe_launch(backend, OutputTarget::Sink(sink)))
                .await
            {
                Ok(key) => self.probes.push((backend.name.clone(), key)),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => logging::log_error(&label, "Probe start", &e),
            }
        }

        if self.probes.len() < backends.len() {
            process_warn!(
                ProcessId::Runner,
                "{} of {} probes running",
                self.probes.len(),
                backends.len()
            );
        }
        self.metadata.stamp_now(Milestone::ProbeStart)?;
        Ok(())
    }

    async fn probes_down(&mut self) -> BenchResult<()> {
        self.enter(Phase::ProbesDown, "stopping probes")?;

        let timeout = self.config.probe_stop_timeout();
        for (backend, key) in std::mem::take(&mut self.probes) {
            let stopped = guarded(&self.shutdown, self.supervisor.stop_gracefully(key, timeout)).await?;
            if let Err(e) = stopped {
                logging::log_error(&ProcessId::probe(&backend), "Probe stop", &e);
            }
        }

        self.metadata.stamp_now(Milestone::End)?;
        Ok(())
    }

    async fn finalize(&mut self) -> BenchResult<RunSummary> {
        self.enter(Phase::Finalize, "writing results")?;

        let metadata_path = self.store.persist_metadata(&self.metadata).await?;
        let config_path = self.store.persist_config_copy(&self.config).await?;

        let mut records = Vec::with_capacity(self.config.backends.len());
        for backend in self.config.backend_names() {
            let count = match self.store.count_records(backend).await {
                Ok(count) => count,
                Err(e) => {
                    process_warn!(ProcessId::Runner, "Cannot count {} results: {}", backend, e);
                    0
                }
            };
            process_info!(ProcessId::Runner, "  {}: {} records", backend, count);
            records.push((backend.to_string(), count));
        }

        let run_dir = self.store.run_dir();
        logging::log_success(
            &ProcessId::Runner,
            &format!("Results written to {}", run_dir.display()),
        );

        Ok(RunSummary {
            run_dir,
            metadata_path,
            config_path,
            records,
        })
    }
}
