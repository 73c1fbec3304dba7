//! Phased write-load benchmark runner
//!
//! Seeds the backends under test with a load generator, runs one query probe
//! per backend across a steady, heavy-write and recovery window, and records
//! phase timestamps so query latency can be lined up against write pressure.

pub mod core;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod shutdown;
pub mod traits;

// Re-export commonly used types
pub use core::{Milestone, PhasePlan, RunMetadata, RunState};
pub use error::{BenchError, BenchResult};
pub use orchestrator::{dry_run_plan, PhaseOrchestrator, RunSettings, RunSummary};
pub use shutdown::{install_shutdown_on, install_signal_handler, ShutdownHandle, ShutdownListener};
pub use traits::{HealthChecker, ProcessSupervisor, RunStore};
