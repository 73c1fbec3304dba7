//! Benchmark run configuration
//!
//! `BenchConfig` is read once from YAML at startup and is read-only afterwards.
//! Unknown keys are rejected; missing keys fall back to the defaults of the
//! reference deployment (two backends, qdrant and elasticsearch).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};

/// Written in place of credentials whenever a config is serialized
pub const REDACTED: &str = "<redacted>";

pub const QDRANT_HEALTH_URL: &str = "http://localhost:6333/healthz";
pub const ELASTICSEARCH_HEALTH_URL: &str = "http://localhost:9200/_cluster/health";

/// How a health check authenticates against a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendAuth {
    /// HTTP Basic credentials, encoded by the HTTP client
    Basic {
        username: String,
        #[serde(serialize_with = "redact")]
        password: String,
    },
    /// Raw `Authorization` header value
    Header {
        #[serde(serialize_with = "redact")]
        value: String,
    },
}

fn redact<S: serde::Serializer>(_secret: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(REDACTED)
}

/// One backend under measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Backend name, taken from its key in the `backends` mapping
    #[serde(skip)]
    pub name: String,

    /// Probe config file, relative to `probe_configs_dir`
    pub config: PathBuf,

    /// Query definition file, relative to `probe_configs_dir`
    pub queries: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<BackendAuth>,

    /// Presentation only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, config: impl Into<PathBuf>, queries: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            config: config.into(),
            queries: queries.into(),
            health_url: None,
            auth: None,
            color: None,
        }
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }

    pub fn with_auth(mut self, auth: BackendAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Fill in the health endpoint of a backend from the reference deployment
    /// when none was configured. Elasticsearch also gets its default
    /// credentials unless auth was given explicitly.
    pub fn with_well_known_health(mut self) -> Self {
        if self.health_url.is_some() {
            return self;
        }
        match self.name.as_str() {
            "qdrant" => {
                self.health_url = Some(QDRANT_HEALTH_URL.to_string());
            }
            "elasticsearch" => {
                self.health_url = Some(ELASTICSEARCH_HEALTH_URL.to_string());
                if self.auth.is_none() {
                    self.auth = Some(BackendAuth::Basic {
                        username: "elastic".to_string(),
                        password: "changeme".to_string(),
                    });
                }
            }
            _ => {}
        }
        self
    }
}

/// Immutable configuration for a benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Number of log records to pre-seed before measuring
    pub pre_seed_logs: u64,
    pub steady_state_secs: u64,
    pub heavy_write_secs: u64,
    pub recovery_secs: u64,

    /// Working directory of the load generator
    #[serde(alias = "emitter_dir")]
    pub generator_dir: PathBuf,

    /// Cargo feature set the generator is built with
    #[serde(alias = "emitter_features")]
    pub generator_features: String,

    /// Argv prefix used instead of `cargo run --release --features <features> --`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_command: Option<Vec<String>>,

    #[serde(alias = "qstorm_configs_dir")]
    pub probe_configs_dir: PathBuf,

    pub probe_binary: String,

    /// Root under which one directory per run is created
    pub results_dir: PathBuf,

    /// Pause after pre-seeding so backends finish indexing
    pub settle_secs: u64,

    /// Extra time granted to the generator beyond its requested duration
    pub generator_slack_secs: u64,

    pub probe_stop_timeout_secs: u64,

    /// Grace window between SIGTERM and SIGKILL when a wait times out
    pub terminate_grace_secs: u64,

    pub health_timeout_secs: u64,

    /// Optional KEY=VALUE overrides for child environments
    pub env_file: PathBuf,

    #[serde(with = "backend_map")]
    pub backends: Vec<BackendConfig>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            pre_seed_logs: 100_000,
            steady_state_secs: 60,
            heavy_write_secs: 120,
            recovery_secs: 60,
            generator_dir: PathBuf::from("./emitter"),
            generator_features: "qdrant,elasticsearch,dashboard".to_string(),
            generator_command: None,
            probe_configs_dir: PathBuf::from("./qstorm_configs"),
            probe_binary: "qstorm".to_string(),
            results_dir: PathBuf::from("./results"),
            settle_secs: 5,
            generator_slack_secs: 60,
            probe_stop_timeout_secs: 15,
            terminate_grace_secs: 10,
            health_timeout_secs: 5,
            env_file: PathBuf::from(".env"),
            backends: vec![
                BackendConfig::new("qdrant", "qdrant.yaml", "queries.yaml")
                    .with_well_known_health()
                    .with_color("#dc244c"),
                BackendConfig::new("elasticsearch", "elastic.yaml", "queries.yaml")
                    .with_well_known_health()
                    .with_color("#00bfb3"),
            ],
        }
    }
}

impl BenchConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> SharedResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| SharedError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents, path)
    }

    /// Parse and validate YAML; `origin` is only used in error messages
    pub fn from_yaml_str(contents: &str, origin: &Path) -> SharedResult<Self> {
        let config: BenchConfig = serde_yaml::from_str(contents).map_err(|e| SharedError::ConfigParse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to the operator-editable YAML form
    pub fn to_yaml(&self) -> SharedResult<String> {
        serde_yaml::to_string(self).map_err(|e| SharedError::ConfigParse {
            path: PathBuf::from("<memory>"),
            message: e.to_string(),
        })
    }

    /// Check values that can be verified without touching the file system
    pub fn validate(&self) -> SharedResult<()> {
        if self.heavy_write_secs == 0 {
            return Err(SharedError::invalid("heavy_write_secs", self.heavy_write_secs));
        }
        if self.probe_binary.trim().is_empty() {
            return Err(SharedError::invalid("probe_binary", "<empty>"));
        }
        if let Some(command) = &self.generator_command {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(SharedError::invalid("generator_command", "<empty>"));
            }
        }
        if self.backends.is_empty() {
            return Err(SharedError::invalid("backends", "<empty>"));
        }

        for (i, backend) in self.backends.iter().enumerate() {
            if backend.name.trim().is_empty() {
                return Err(SharedError::invalid("backends", "<unnamed backend>"));
            }
            if self.backends[..i].iter().any(|b| b.name == backend.name) {
                return Err(SharedError::DuplicateBackend {
                    name: backend.name.clone(),
                });
            }
            // Every backend must be covered by the health gate
            let field = format!("backends.{}.health_url", backend.name);
            let health_url = backend
                .health_url
                .as_deref()
                .ok_or_else(|| SharedError::invalid(&field, "<missing>"))?;
            url::Url::parse(health_url).map_err(|e| SharedError::invalid(&field, e))?;
        }

        Ok(())
    }

    /// Check that every referenced probe config and query file exists
    pub fn validate_paths(&self) -> SharedResult<()> {
        for backend in &self.backends {
            let checks = [
                ("config", self.probe_config_path(backend)),
                ("queries", self.probe_queries_path(backend)),
            ];
            for (field, path) in checks {
                if !path.is_file() {
                    return Err(SharedError::MissingFile {
                        field: format!("backends.{}.{}", backend.name, field),
                        path,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn probe_config_path(&self, backend: &BackendConfig) -> PathBuf {
        self.probe_configs_dir.join(&backend.config)
    }

    pub fn probe_queries_path(&self, backend: &BackendConfig) -> PathBuf {
        self.probe_configs_dir.join(&backend.queries)
    }

    /// The generator's own config, from which its emit rate is read
    pub fn generator_config_path(&self) -> PathBuf {
        self.generator_dir.join("config.yaml")
    }

    pub fn steady_state(&self) -> Duration {
        Duration::from_secs(self.steady_state_secs)
    }

    pub fn heavy_write(&self) -> Duration {
        Duration::from_secs(self.heavy_write_secs)
    }

    pub fn recovery(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn generator_slack(&self) -> Duration {
        Duration::from_secs(self.generator_slack_secs)
    }

    pub fn probe_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_stop_timeout_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// `backends` is a YAML mapping keyed by name; entry order is kept
mod backend_map {
    use super::BackendConfig;
    use serde::de::{self, MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(backends: &[BackendConfig], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(backends.iter().map(|b| (&b.name, b)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<BackendConfig>, D::Error> {
        struct BackendsVisitor;

        impl<'de> Visitor<'de> for BackendsVisitor {
            type Value = Vec<BackendConfig>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of backend name to probe config and queries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut backends: Vec<BackendConfig> = Vec::new();
                while let Some((name, mut backend)) = map.next_entry::<String, BackendConfig>()? {
                    if backends.iter().any(|b| b.name == name) {
                        return Err(de::Error::custom(format!("duplicate backend name: {name}")));
                    }
                    backend.name = name;
                    backends.push(backend.with_well_known_health());
                }
                Ok(backends)
            }
        }

        deserializer.deserialize_map(BackendsVisitor)
    }
}
