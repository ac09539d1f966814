use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

use super::{read_json, write_atomic};

/// Number of runs kept in the log.
pub const DEFAULT_RUN_LOG_CAPACITY: usize = 20;

/// Outcome of one sync pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    pub found_count: usize,
    #[serde(default)]
    pub unchanged_count: usize,
    pub new_ids: Vec<String>,
    pub changed_ids: Vec<String>,
    pub removed_ids: Vec<String>,
    pub failed_ids: Vec<String>,
    /// New or changed ids left for a later run by the fetch cap
    #[serde(default)]
    pub skipped_ids: Vec<String>,
    #[serde(default)]
    pub pages_fetched: u32,
    #[serde(default)]
    pub failed_pages: u32,
    #[serde(default)]
    pub credits_used: u64,
    /// Percentage of attempted detail fetches that were saved
    pub success_rate: f64,
    /// False when the run was cancelled before finishing
    #[serde(default = "default_completed")]
    pub completed: bool,
}

fn default_completed() -> bool {
    true
}

impl SyncRun {
    /// Empty summary for a run starting at `started_at`.
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            timestamp: started_at,
            found_count: 0,
            unchanged_count: 0,
            new_ids: Vec::new(),
            changed_ids: Vec::new(),
            removed_ids: Vec::new(),
            failed_ids: Vec::new(),
            skipped_ids: Vec::new(),
            pages_fetched: 0,
            failed_pages: 0,
            credits_used: 0,
            success_rate: 100.0,
            completed: true,
        }
    }

    /// Set `success_rate` from the detail-fetch tally.
    pub fn record_success_rate(&mut self, attempted: usize, saved: usize) {
        self.success_rate = if attempted == 0 {
            100.0
        } else {
            saved as f64 * 100.0 / attempted as f64
        };
    }
}

/// Append-only log of the most recent runs, stored as one JSON array
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    capacity: usize,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All retained runs, oldest first.
    ///
    /// A missing log is empty; a corrupt one is reported and read as empty so
    /// the next append starts it over.
    pub async fn entries(&self) -> StoreResult<Vec<SyncRun>> {
        match read_json::<Vec<SyncRun>>(&self.path).await {
            Ok(runs) => Ok(runs.unwrap_or_default()),
            Err(StoreError::Corrupt { path, source }) => {
                warn!("Run log {} is corrupt, starting fresh: {}", path.display(), source);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn latest(&self) -> StoreResult<Option<SyncRun>> {
        Ok(self.entries().await?.pop())
    }

    /// Append a run, dropping the oldest entries beyond capacity.
    pub async fn append(&self, run: &SyncRun) -> StoreResult<()> {
        let mut runs = self.entries().await?;
        runs.push(run.clone());
        if runs.len() > self.capacity {
            let excess = runs.len() - self.capacity;
            runs.drain(..excess);
        }

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::Write {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let json = serde_json::to_vec_pretty(&runs).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &json).await?;
        debug!("Sync run logged ({} retained)", runs.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn run(n: i64) -> SyncRun {
        let at = Utc.timestamp_opt(n * 3600, 0).unwrap();
        let mut run = SyncRun::started(at);
        run.found_count = n as usize;
        run
    }

    #[tokio::test]
    async fn missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::new(dir.path().join("logs/sync_log.json"), 5);

        assert!(log.entries().await.unwrap().is_empty());
        assert_eq!(log.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn append_trims_to_trailing_window() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::new(dir.path().join("logs/sync_log.json"), 3);

        for n in 1..=5 {
            log.append(&run(n)).await.unwrap();
        }

        let counts: Vec<usize> = log
            .entries()
            .await
            .unwrap()
            .iter()
            .map(|r| r.found_count)
            .collect();
        assert_eq!(counts, vec![3, 4, 5]);
        assert_eq!(log.latest().await.unwrap().unwrap().found_count, 5);
    }

    #[tokio::test]
    async fn corrupt_log_starts_over() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync_log.json");
        std::fs::write(&path, b"[{oops").unwrap();
        let log = RunLog::new(&path, DEFAULT_RUN_LOG_CAPACITY);

        log.append(&run(1)).await.unwrap();

        assert_eq!(log.entries().await.unwrap().len(), 1);
    }

    #[test]
    fn success_rate_from_tally() {
        let mut r = run(0);
        r.record_success_rate(0, 0);
        assert_eq!(r.success_rate, 100.0);
        r.record_success_rate(4, 3);
        assert_eq!(r.success_rate, 75.0);
    }

    #[test]
    fn older_entries_without_optional_members_still_decode() {
        let json = r#"{
            "started_at": "2026-10-01T00:00:00Z",
            "timestamp": "2026-10-01T00:05:00Z",
            "found_count": 12,
            "new_ids": ["1"],
            "changed_ids": [],
            "removed_ids": [],
            "failed_ids": [],
            "success_rate": 100.0
        }"#;
        let run: SyncRun = serde_json::from_str(json).unwrap();
        assert!(run.completed);
        assert!(run.skipped_ids.is_empty());
    }
}
