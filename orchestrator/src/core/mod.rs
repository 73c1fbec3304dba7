//! Core run logic that does no process or network I/O
//!
//! Environment assembly, seed sizing, the metadata record and the phase
//! state machine bookkeeping.

pub mod environment;
pub mod metadata;
pub mod plan;
pub mod state;

pub use environment::{build_environment, build_environment_from, parse_overrides};
pub use metadata::{HostFacts, Milestone, RunMetadata};
pub use plan::{compute_seed_duration, plan_seed, PhasePlan, SeedPlan, DEGRADED_SEED_SECS};
pub use state::{PhaseTransition, RunState};
