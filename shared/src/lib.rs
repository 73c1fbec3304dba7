//! Shared types for the phased write-load benchmark runner
//!
//! Contains the run configuration, identifiers, the shared error type and
//! logging setup used by the orchestrator binary and its library.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::{BackendAuth, BackendConfig, BenchConfig};
pub use errors::*;
pub use types::*;

// Used by the process_* logging macros
#[doc(hidden)]
pub use tracing;
