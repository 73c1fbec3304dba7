//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a supervised subprocess
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessKey(Uuid);

impl ProcessKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ProcessKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phases of a benchmark run, in the only order they may be entered
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    HealthGate,
    Seed,
    ProbesUp,
    SteadyState,
    HeavyWrite,
    Recovery,
    ProbesDown,
    Finalize,
}

impl Phase {
    pub const ORDER: [Phase; 9] = [
        Phase::Init,
        Phase::HealthGate,
        Phase::Seed,
        Phase::ProbesUp,
        Phase::SteadyState,
        Phase::HeavyWrite,
        Phase::Recovery,
        Phase::ProbesDown,
        Phase::Finalize,
    ];

    /// Position of this phase in the fixed run order
    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|p| *p == self).unwrap_or(0)
    }

    /// The phase that must follow this one, if any
    pub fn next(self) -> Option<Phase> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::HealthGate => "health_gate",
            Phase::Seed => "seed",
            Phase::ProbesUp => "probes_up",
            Phase::SteadyState => "steady_state",
            Phase::HeavyWrite => "heavy_write",
            Phase::Recovery => "recovery",
            Phase::ProbesDown => "probes_down",
            Phase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a log line is about: the runner itself or one of its children
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    Runner,
    Generator(Phase),
    Probe(String),
}

impl ProcessId {
    pub fn probe(backend: impl Into<String>) -> Self {
        ProcessId::Probe(backend.into())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Runner => write!(f, "runner"),
            ProcessId::Generator(phase) => write!(f, "generator[{phase}]"),
            ProcessId::Probe(backend) => write!(f, "probe[{backend}]"),
        }
    }
}
