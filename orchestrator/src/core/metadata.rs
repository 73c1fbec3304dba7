//! Run metadata recorder
//!
//! Accumulates host facts, seed sizing and the phase-boundary timestamps of a
//! single run. Each milestone is stamped once, in phase order, and the stored
//! series never decreases even if the wall clock steps backwards.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use shared::BenchConfig;

use super::plan::SeedPlan;
use crate::error::{BenchError, BenchResult};

/// Phase boundaries recorded in [`RunMetadata`], in the order they occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Start,
    SeedDone,
    ProbeStart,
    SteadyEnd,
    HeavyEnd,
    RecoveryEnd,
    End,
}

impl Milestone {
    pub const ORDER: [Milestone; 7] = [
        Milestone::Start,
        Milestone::SeedDone,
        Milestone::ProbeStart,
        Milestone::SteadyEnd,
        Milestone::HeavyEnd,
        Milestone::RecoveryEnd,
        Milestone::End,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Milestone::Start => "start",
            Milestone::SeedDone => "seed_done",
            Milestone::ProbeStart => "probe_start",
            Milestone::SteadyEnd => "steady_end",
            Milestone::HeavyEnd => "heavy_end",
            Milestone::RecoveryEnd => "recovery_end",
            Milestone::End => "end",
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about the machine running the benchmark
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostFacts {
    pub hostname: String,
    pub platform_info: String,
    pub cpu_count: usize,
}

impl HostFacts {
    pub fn detect() -> Self {
        use sysinfo::System;

        let mut sys = System::new();
        sys.refresh_cpu();
        let cpu_count = match sys.cpus().len() {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(0),
            n => n,
        };

        let platform_info = format!(
            "{} {}",
            System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            System::kernel_version().unwrap_or_default()
        )
        .trim()
        .to_string();

        Self {
            hostname: System::host_name().unwrap_or_default(),
            platform_info,
            cpu_count,
        }
    }
}

/// Everything persisted to `metadata.json` for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_name: String,
    pub config: BenchConfig,
    #[serde(flatten)]
    pub host: HostFacts,
    /// Sum of the generator's per-service rates, 0 when unknown
    pub load_rate_per_sec: f64,
    pub seed_duration_secs: u64,
    pub seed_rate_degraded: bool,
    pub skip_load: bool,

    #[serde(with = "blank_timestamp")]
    pub t_start: Option<DateTime<Utc>>,
    #[serde(with = "blank_timestamp")]
    pub t_seed_done: Option<DateTime<Utc>>,
    #[serde(with = "blank_timestamp")]
    pub t_probe_start: Option<DateTime<Utc>>,
    #[serde(with = "blank_timestamp")]
    pub t_steady_end: Option<DateTime<Utc>>,
    #[serde(with = "blank_timestamp")]
    pub t_heavy_end: Option<DateTime<Utc>>,
    #[serde(with = "blank_timestamp")]
    pub t_recovery_end: Option<DateTime<Utc>>,
    #[serde(with = "blank_timestamp")]
    pub t_end: Option<DateTime<Utc>>,
}

impl RunMetadata {
    pub fn new(
        run_name: impl Into<String>,
        config: &BenchConfig,
        host: HostFacts,
        seed: SeedPlan,
        skip_load: bool,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            config: config.clone(),
            host,
            load_rate_per_sec: seed.total_rate,
            seed_duration_secs: seed.duration_secs,
            seed_rate_degraded: seed.degraded,
            skip_load,
            t_start: None,
            t_seed_done: None,
            t_probe_start: None,
            t_steady_end: None,
            t_heavy_end: None,
            t_recovery_end: None,
            t_end: None,
        }
    }

    pub fn get(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        match milestone {
            Milestone::Start => self.t_start,
            Milestone::SeedDone => self.t_seed_done,
            Milestone::ProbeStart => self.t_probe_start,
            Milestone::SteadyEnd => self.t_steady_end,
            Milestone::HeavyEnd => self.t_heavy_end,
            Milestone::RecoveryEnd => self.t_recovery_end,
            Milestone::End => self.t_end,
        }
    }

    fn slot_mut(&mut self, milestone: Milestone) -> &mut Option<DateTime<Utc>> {
        match milestone {
            Milestone::Start => &mut self.t_start,
            Milestone::SeedDone => &mut self.t_seed_done,
            Milestone::ProbeStart => &mut self.t_probe_start,
            Milestone::SteadyEnd => &mut self.t_steady_end,
            Milestone::HeavyEnd => &mut self.t_heavy_end,
            Milestone::RecoveryEnd => &mut self.t_recovery_end,
            Milestone::End => &mut self.t_end,
        }
    }

    /// Record `milestone` at `at`, raised to the latest earlier stamp if needed
    pub fn stamp(&mut self, milestone: Milestone, at: DateTime<Utc>) -> BenchResult<DateTime<Utc>> {
        if self.get(milestone).is_some() {
            return Err(BenchError::MilestoneOrder {
                milestone,
                reason: "already stamped".to_string(),
            });
        }
        if let Some(later) = Milestone::ORDER
            .iter()
            .copied()
            .filter(|m| *m > milestone)
            .find(|m| self.get(*m).is_some())
        {
            return Err(BenchError::MilestoneOrder {
                milestone,
                reason: format!("later milestone {later} already stamped"),
            });
        }

        let floor = Milestone::ORDER
            .iter()
            .copied()
            .filter(|m| *m < milestone)
            .filter_map(|m| self.get(m))
            .max();
        let at = match floor {
            Some(floor) if floor > at => floor,
            _ => at,
        };

        *self.slot_mut(milestone) = Some(at);
        Ok(at)
    }

    pub fn stamp_now(&mut self, milestone: Milestone) -> BenchResult<DateTime<Utc>> {
        self.stamp(milestone, Utc::now())
    }

    /// Stamped milestones, in phase order
    pub fn stamped(&self) -> Vec<(Milestone, DateTime<Utc>)> {
        Milestone::ORDER
            .iter()
            .filter_map(|m| self.get(*m).map(|t| (*m, t)))
            .collect()
    }

    /// True when the stamped milestones never decrease in phase order
    pub fn is_monotonic(&self) -> bool {
        self.stamped().windows(2).all(|pair| pair[0].1 <= pair[1].1)
    }

    pub fn to_json(&self) -> BenchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Empty timestamps are written as `""`, set ones as RFC 3339 UTC
mod blank_timestamp {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(de::Error::custom)
    }
}
