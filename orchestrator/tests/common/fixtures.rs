//! Test fixtures and data for orchestrator tests
//!
//! Consistent configuration and run settings used across all test suites.

use std::collections::HashMap;
use std::path::Path;

use orchestrator::core::{compute_seed_duration, HostFacts};
use orchestrator::traits::{ExitKind, ExitOutcome};
use orchestrator::RunSettings;
use shared::BenchConfig;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const RUN_NAME: &'static str = "2026-10-17T09-30-00";

    /// Generator rate whose seed window for the default 100,000 logs is 55s
    pub const GENERATOR_RATE: f64 = 2_000.0;
    pub const SEED_SECS: u64 = 55;

    pub const GENERATOR_CONFIG: &'static str = "services:\n  - name: api-gateway\n    rate_per_sec: 1500\n  - name: auth-service\n    rate_per_sec: 500\n";

    /// Default configuration rooted in `dir`, with every probe file present
    pub fn config(dir: &Path) -> BenchConfig {
        let mut config = BenchConfig::default();
        config.probe_configs_dir = dir.join("qstorm_configs");
        config.generator_dir = dir.join("emitter");
        config.results_dir = dir.join("results");
        config.env_file = dir.join(".env");

        std::fs::create_dir_all(&config.probe_configs_dir).unwrap();
        std::fs::create_dir_all(&config.generator_dir).unwrap();
        for backend in &config.backends {
            std::fs::write(config.probe_config_path(backend), "mode: search\n").unwrap();
            std::fs::write(config.probe_queries_path(backend), "queries: []\n").unwrap();
        }
        std::fs::write(config.generator_config_path(), Self::GENERATOR_CONFIG).unwrap();
        config
    }

    pub fn host() -> HostFacts {
        HostFacts {
            hostname: "bench-host".to_string(),
            platform_info: "Linux 6.1.0".to_string(),
            cpu_count: 16,
        }
    }

    pub fn settings(config: &BenchConfig) -> RunSettings {
        RunSettings {
            run_name: Self::RUN_NAME.to_string(),
            skip_load: false,
            seed: compute_seed_duration(config.pre_seed_logs, Self::GENERATOR_RATE),
            host: Self::host(),
            env: HashMap::from([
                ("PATH".to_string(), "/usr/bin:/bin".to_string()),
                ("ELASTIC_PASSWORD".to_string(), "changeme".to_string()),
            ]),
        }
    }

    pub fn outcome(kind: ExitKind, code: Option<i32>) -> ExitOutcome {
        ExitOutcome {
            kind,
            code,
            elapsed: std::time::Duration::from_secs(1),
        }
    }
}
