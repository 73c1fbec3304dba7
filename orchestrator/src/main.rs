//! Main entry point for the benchmark runner binary

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use orchestrator::{
    dry_run_plan, install_signal_handler,
    services::{HttpHealthChecker, RealProcessSupervisor, RealRunStore},
    BenchResult, PhaseOrchestrator, ProcessSupervisor, RunSettings, ShutdownHandle,
};
use shared::{logging, process_debug, process_info, BenchConfig, ProcessId};

/// Phased write-load benchmark for log search backends
#[derive(Parser)]
#[command(name = "bench")]
#[command(about = "Runs a phased write-load benchmark against log search backends")]
pub struct Args {
    /// Benchmark configuration file
    #[arg(short, long, default_value = "bench_config.yaml")]
    pub config: PathBuf,

    /// Print the phase plan and exit without starting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the pre-seed phase
    #[arg(long)]
    pub skip_load: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Environment override file, replaces `env_file` from the config
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init_tracing(Some(&args.log_level));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::log_error(&ProcessId::Runner, "Benchmark", &e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: Args) -> BenchResult<()> {
    let mut config = BenchConfig::load(&args.config)?;
    if let Some(env_file) = args.env_file {
        config.env_file = env_file;
    }

    if args.dry_run {
        print!("{}", dry_run_plan(&config, args.skip_load).render());
        return Ok(());
    }

    let run_name = RealRunStore::run_name_now();
    logging::log_startup(&ProcessId::Runner, &format!("benchmark run {run_name}"));
    process_debug!(ProcessId::Runner, "Config: {}", args.config.display());

    let store = RealRunStore::create(&config.results_dir, &run_name).await?;
    let supervisor = Arc::new(RealProcessSupervisor::new().with_terminate_grace(config.terminate_grace()));
    let health_checker = HttpHealthChecker::new(config.health_timeout())?;

    let shutdown = ShutdownHandle::new();
    let _signals = install_signal_handler(supervisor.clone(), shutdown.clone());

    let settings = RunSettings::detect(&config, run_name, args.skip_load);
    let terminate_grace = config.terminate_grace();
    let mut orchestrator = PhaseOrchestrator::new(
        config,
        settings,
        supervisor.clone(),
        health_checker,
        store,
        shutdown.listener(),
    );

    let result = orchestrator.run().await;

    // Nothing started by this run may outlive it
    let leftover = supervisor.stop_all(terminate_grace).await;
    if leftover > 0 {
        process_info!(ProcessId::Runner, "Stopped {} leftover process(es)", leftover);
    }

    let summary = result?;
    logging::log_success(
        &ProcessId::Runner,
        &format!("Run complete, metadata at {}", summary.metadata_path.display()),
    );
    Ok(())
}
