//! Per-run results directory
//!
//! Layout of one run:
//!
//! ```text
//! <results_dir>/<run_name>/
//!     <backend>.jsonl       probe output, one record per line
//!     metadata.json         run metadata
//!     bench_config.yaml     configuration the run used
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::core::RunMetadata;
use crate::error::{BenchError, BenchResult};
use crate::services::result_sink::ResultSink;
use crate::traits::RunStore;
use shared::{process_debug, BenchConfig, ProcessId};

pub const METADATA_FILE: &str = "metadata.json";
pub const CONFIG_COPY_FILE: &str = "bench_config.yaml";

/// Local filesystem run store
pub struct RealRunStore {
    run_dir: PathBuf,
}

impl RealRunStore {
    /// Run name derived from the local wall clock, e.g. `2026-10-17T09-30-00`
    pub fn run_name_now() -> String {
        chrono::Local::now().format("%Y-%m-%dT%H-%M-%S").to_string()
    }

    /// Create `<results_root>/<run_name>` and everything above it
    pub async fn create(results_root: &Path, run_name: &str) -> BenchResult<Self> {
        let run_dir = results_root.join(run_name);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(|e| BenchError::fs("create run directory", &run_dir, e))?;
        process_debug!(ProcessId::Runner, "Run directory {}", run_dir.display());
        Ok(Self { run_dir })
    }

    pub fn sink_path(&self, backend: &str) -> PathBuf {
        self.run_dir.join(format!("{backend}.jsonl"))
    }

    async fn write(&self, name: &str, contents: String) -> BenchResult<PathBuf> {
        let path = self.run_dir.join(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| BenchError::fs("write", &path, e))?;
        Ok(path)
    }
}

/// Lines in a result file; a final line without a newline still counts
pub fn count_lines(bytes: &[u8]) -> usize {
    let newlines = bytes.iter().filter(|b| **b == b'\n').count();
    match bytes.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

#[async_trait]
impl RunStore for RealRunStore {
    fn run_dir(&self) -> PathBuf {
        self.run_dir.clone()
    }

    async fn create_sink(&self, backend: &str) -> BenchResult<ResultSink> {
        ResultSink::create(backend, self.sink_path(backend))
    }

    async fn persist_metadata(&self, metadata: &RunMetadata) -> BenchResult<PathBuf> {
        self.write(METADATA_FILE, metadata.to_json()?).await
    }

    async fn persist_config_copy(&self, config: &BenchConfig) -> BenchResult<PathBuf> {
        self.write(CONFIG_COPY_FILE, config.to_yaml()?).await
    }

    async fn count_records(&self, backend: &str) -> BenchResult<usize> {
        let path = self.sink_path(backend);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(count_lines(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(BenchError::fs("read result file", &path, e)),
        }
    }
}
