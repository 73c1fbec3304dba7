//! Service implementations
//!
//! Real implementations of the service traits: child processes, HTTP health
//! checks and the per-run results directory.

pub mod health_checker;
pub mod process_supervisor;
pub mod result_sink;
pub mod run_store;

#[cfg(test)]
mod tests;

pub use health_checker::HttpHealthChecker;
pub use process_supervisor::RealProcessSupervisor;
pub use result_sink::ResultSink;
pub use run_store::RealRunStore;
