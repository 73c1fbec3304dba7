//! Phase state tracking
//!
//! The run is a straight line through [`Phase::ORDER`]; any other transition
//! is a programming error and is rejected.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use shared::Phase;

use crate::error::{BenchError, BenchResult};

/// One entered phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTransition {
    pub phase: Phase,
    pub at: DateTime<Utc>,
    /// Time since the run state was created
    pub elapsed: Duration,
}

/// Current phase of a run and the history of how it got there
#[derive(Debug)]
pub struct RunState {
    current: Option<Phase>,
    transitions: Vec<PhaseTransition>,
    started: Instant,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            current: None,
            transitions: Vec::with_capacity(Phase::ORDER.len()),
            started: Instant::now(),
        }
    }

    pub fn current(&self) -> Option<Phase> {
        self.current
    }

    /// The only phase `advance` will accept next
    pub fn expected_next(&self) -> Option<Phase> {
        match self.current {
            None => Some(Phase::Init),
            Some(phase) => phase.next(),
        }
    }

    pub fn advance(&mut self, next: Phase) -> BenchResult<()> {
        if self.expected_next() != Some(next) {
            return Err(BenchError::PhaseOrder {
                from: self.current,
                to: next,
            });
        }

        self.current = Some(next);
        self.transitions.push(PhaseTransition {
            phase: next,
            at: Utc::now(),
            elapsed: self.started.elapsed(),
        });
        Ok(())
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn is_finished(&self) -> bool {
        self.current == Some(Phase::Finalize)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
