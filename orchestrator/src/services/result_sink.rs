//! Per-backend result files written directly by probe processes

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{BenchError, BenchResult};

/// A freshly created, append-only output file
///
/// The probe receives a duplicate of the handle as its stdout; the runner's
/// own handle is closed by [`ResultSink::close`] once the probe has exited.
#[derive(Debug)]
pub struct ResultSink {
    backend: String,
    path: PathBuf,
    file: File,
}

impl ResultSink {
    /// Fails if `path` already exists
    pub fn create(backend: impl Into<String>, path: impl Into<PathBuf>) -> BenchResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| BenchError::fs("create result file", &path, e))?;

        Ok(Self {
            backend: backend.into(),
            path,
            file,
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A duplicate handle to hand to a child as stdout
    pub fn child_stdio(&self) -> BenchResult<Stdio> {
        let dup = self
            .file
            .try_clone()
            .map_err(|e| BenchError::fs("duplicate result file handle", &self.path, e))?;
        Ok(Stdio::from(dup))
    }

    /// Flush what the child wrote and release the runner's handle
    pub fn close(self) -> BenchResult<()> {
        self.file
            .sync_all()
            .map_err(|e| BenchError::fs("sync result file", &self.path, e))
    }
}
