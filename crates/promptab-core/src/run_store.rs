//! Persistence for completed comparison runs.
//!
//! Each run is one JSON file under `test-runs/`, named by its id. Records
//! are immutable once written.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cas::Digest;
use crate::error::{PromptabError, Result};
use crate::metrics::VersionResult;
use crate::stats::ComparisonStatistics;

/// The two versions' results, keyed by side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResults {
    pub a: VersionResult,
    pub b: VersionResult,
}

/// A completed A/B comparison between two committed prompt versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestRun {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub commit_a: Digest,
    pub commit_b: Digest,
    pub dataset: String,
    pub model: String,
    pub results: RunResults,
    pub statistics: ComparisonStatistics,
}

impl TestRun {
    /// Run id: `<shortA>-<shortB>-<unixMillis>`.
    pub fn make_id(commit_a: &Digest, commit_b: &Digest, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}-{}-{}",
            commit_a.short(),
            commit_b.short(),
            timestamp.timestamp_millis()
        )
    }
}

/// File-backed store for [`TestRun`] records.
pub struct TestRunStore {
    dir: PathBuf,
}

impl TestRunStore {
    /// Open (or create) a store at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn run_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Persist `run`. The record is written once and never updated.
    pub fn save(&self, run: &TestRun) -> Result<()> {
        let path = self.run_path(&run.id);
        fs::write(&path, serde_json::to_vec_pretty(run)?)?;
        info!(id = %run.id, "saved test run");
        Ok(())
    }

    /// Load one run by id.
    pub fn load(&self, id: &str) -> Result<TestRun> {
        let path = self.run_path(id);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PromptabError::NotFound(format!("test run: {id}"))
            } else {
                PromptabError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All stored runs, newest first, up to `limit`.
    pub fn list(&self, limit: usize) -> Result<Vec<TestRun>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let bytes = fs::read(&path)?;
                runs.push(serde_json::from_slice::<TestRun>(&bytes)?);
            }
        }
        runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        runs.truncate(limit);
        Ok(runs)
    }
}
