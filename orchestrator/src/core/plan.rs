//! Seed sizing and the printable phase plan

use serde::Deserialize;
use std::path::Path;

use shared::{process_debug, process_warn, BenchConfig, ProcessId};

/// Seed window used when the generator rate cannot be determined
pub const DEGRADED_SEED_SECS: u64 = 60;

/// Added to every computed seed window so the generator can flush
pub const SEED_FLUSH_BUFFER_SECS: u64 = 5;

/// How long the pre-seed generator runs, and how that was decided
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedPlan {
    pub duration_secs: u64,
    pub total_rate: f64,
    pub degraded: bool,
}

/// `ceil(target / total_rate) + 5`, or a fixed 60s when the rate is not positive
pub fn compute_seed_duration(target_logs: u64, total_rate: f64) -> SeedPlan {
    if total_rate.is_nan() || total_rate <= 0.0 {
        process_warn!(
            ProcessId::Runner,
            "Could not determine log rate (total {}/s), defaulting to {}s seed",
            total_rate,
            DEGRADED_SEED_SECS
        );
        return SeedPlan {
            duration_secs: DEGRADED_SEED_SECS,
            total_rate: 0.0,
            degraded: true,
        };
    }

    // `as` saturates, so absurd ratios clamp to u64::MAX instead of wrapping
    let secs = ((target_logs as f64 / total_rate).ceil() as u64).saturating_add(SEED_FLUSH_BUFFER_SECS);
    SeedPlan {
        duration_secs: secs,
        total_rate,
        degraded: false,
    }
}

#[derive(Debug, Deserialize)]
struct GeneratorRates {
    #[serde(default)]
    services: Vec<ServiceRate>,
}

#[derive(Debug, Deserialize)]
struct ServiceRate {
    rate_per_sec: f64,
}

/// Sum of `services[].rate_per_sec` in a generator config document
pub fn total_rate_from_yaml(contents: &str) -> Result<f64, serde_yaml::Error> {
    let rates: GeneratorRates = serde_yaml::from_str(contents)?;
    Ok(rates.services.iter().map(|s| s.rate_per_sec).sum())
}

/// Read the generator's configured emit rate; 0.0 when it cannot be read
pub fn read_generator_rate(path: &Path) -> f64 {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            process_warn!(
                ProcessId::Runner,
                "Cannot read generator config {}: {}",
                path.display(),
                e
            );
            return 0.0;
        }
    };

    match total_rate_from_yaml(&contents) {
        Ok(rate) => {
            process_debug!(ProcessId::Runner, "Generator emits ~{:.0} logs/s", rate);
            rate
        }
        Err(e) => {
            process_warn!(
                ProcessId::Runner,
                "Cannot parse generator config {}: {}",
                path.display(),
                e
            );
            0.0
        }
    }
}

/// Seed plan for a configuration, reading the generator's rate from disk
pub fn plan_seed(config: &BenchConfig) -> SeedPlan {
    let rate = read_generator_rate(&config.generator_config_path());
    compute_seed_duration(config.pre_seed_logs, rate)
}

/// Durations of every phase of a run, as printed by `--dry-run`
#[derive(Debug, Clone, PartialEq)]
pub struct PhasePlan {
    pub pre_seed_logs: u64,
    pub seed: SeedPlan,
    pub skip_load: bool,
    pub settle_secs: u64,
    pub steady_state_secs: u64,
    pub heavy_write_secs: u64,
    pub recovery_secs: u64,
    pub backends: Vec<String>,
}

impl PhasePlan {
    pub fn new(config: &BenchConfig, seed: SeedPlan, skip_load: bool) -> Self {
        Self {
            pre_seed_logs: config.pre_seed_logs,
            seed,
            skip_load,
            settle_secs: config.settle_secs,
            steady_state_secs: config.steady_state_secs,
            heavy_write_secs: config.heavy_write_secs,
            recovery_secs: config.recovery_secs,
            backends: config.backend_names().into_iter().map(String::from).collect(),
        }
    }

    /// Expected wall time, excluding process start-up and shutdown
    pub fn total_secs(&self) -> u64 {
        let seed = if self.skip_load {
            0
        } else {
            self.seed.duration_secs + self.settle_secs
        };
        seed + self.steady_state_secs + self.heavy_write_secs + self.recovery_secs
    }

    pub fn render(&self) -> String {
        let total = self.total_secs();
        let seed_line = if self.skip_load {
            format!("skipped (--skip-load; would be {}s)", self.seed.duration_secs)
        } else if self.seed.degraded {
            format!(
                "~{} logs ({}s, rate unknown)",
                group_thousands(self.pre_seed_logs),
                self.seed.duration_secs
            )
        } else {
            format!(
                "~{} logs ({}s at ~{:.0} logs/s)",
                group_thousands(self.pre_seed_logs),
                self.seed.duration_secs,
                self.seed.total_rate
            )
        };

        let mut out = String::new();
        out.push_str("=== DRY RUN ===\n");
        out.push_str(&format!("Pre-seed:      {seed_line}\n"));
        out.push_str(&format!("Steady state:  {}s\n", self.steady_state_secs));
        out.push_str(&format!("Heavy write:   {}s\n", self.heavy_write_secs));
        out.push_str(&format!("Recovery:      {}s\n", self.recovery_secs));
        out.push_str(&format!("Total:         ~{}s ({}m {}s)\n", total, total / 60, total % 60));
        out.push_str(&format!("Backends:      {}\n", self.backends.join(", ")));
        out
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_seed_duration_formula() {
        let plan = compute_seed_duration(100_000, 2_000.0);
        assert_eq!(plan.duration_secs, 55);
        assert!(!plan.degraded);

        // Rounds up before adding the flush buffer
        assert_eq!(compute_seed_duration(100_001, 2_000.0).duration_secs, 56);
        assert_eq!(compute_seed_duration(0, 220.0).duration_secs, 5);
    }

    #[test]
    fn test_seed_duration_is_deterministic() {
        let first = compute_seed_duration(12_345, 220.0);
        for _ in 0..10 {
            assert_eq!(compute_seed_duration(12_345, 220.0), first);
        }
    }

    #[test]
    fn test_seed_duration_degrades_on_non_positive_rate() {
        for rate in [0.0, -5.0, f64::NAN] {
            let plan = compute_seed_duration(100_000, rate);
            assert_eq!(plan.duration_secs, DEGRADED_SEED_SECS);
            assert!(plan.degraded);
        }
    }

    /// Log sink shared between a test and the subscriber it installs
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_degraded_seed_logs_a_warning() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(shared::tracing::Level::WARN)
            .finish();

        let plan = shared::tracing::subscriber::with_default(subscriber, || compute_seed_duration(100_000, 0.0));
        assert!(plan.degraded);

        let output = logs.contents();
        assert!(output.contains("WARN"), "no warning in: {output}");
        assert!(output.contains("defaulting to 60s seed"), "unexpected log output: {output}");
    }

    #[test]
    fn test_healthy_rate_logs_no_warning() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(shared::tracing::Level::WARN)
            .finish();

        shared::tracing::subscriber::with_default(subscriber, || compute_seed_duration(100_000, 2_000.0));
        assert_eq!(logs.contents(), "");
    }

    #[test]
    fn test_seed_duration_saturates_on_extreme_ratio() {
        let plan = compute_seed_duration(u64::MAX, f64::MIN_POSITIVE);
        assert_eq!(plan.duration_secs, u64::MAX);
        assert!(!plan.degraded);
    }

    #[test]
    fn test_total_rate_from_generator_config() {
        let yaml = r#"
buffer_size: 1000
flush_interval_ms: 5000
services:
  - name: api-gateway
    rate_per_sec: 100.0
    level_weights: { debug: 0.1, info: 0.7, warn: 0.15, error: 0.05 }
  - name: auth-service
    rate_per_sec: 50
sinks:
  - type: stdout
"#;
        assert_eq!(total_rate_from_yaml(yaml).unwrap(), 150.0);
        assert_eq!(total_rate_from_yaml("buffer_size: 10\n").unwrap(), 0.0);
        assert!(total_rate_from_yaml("services: [{ name: x }]").is_err());
    }

    #[test]
    fn test_missing_generator_config_reads_as_zero() {
        assert_eq!(read_generator_rate(Path::new("/no/such/config.yaml")), 0.0);
    }

    #[test]
    fn test_plan_total_and_render() {
        let mut config = BenchConfig::default();
        config.pre_seed_logs = 100_000;
        let plan = PhasePlan::new(&config, compute_seed_duration(100_000, 2_000.0), false);

        // 55 + 5 + 60 + 120 + 60
        assert_eq!(plan.total_secs(), 300);
        let text = plan.render();
        assert!(text.contains("~100,000 logs (55s at ~2000 logs/s)"));
        assert!(text.contains("Total:         ~300s (5m 0s)"));
        assert!(text.contains("Backends:      qdrant, elasticsearch"));

        let skipped = PhasePlan::new(&config, plan.seed, true);
        assert_eq!(skipped.total_secs(), 240);
        assert!(skipped.render().contains("skipped"));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
