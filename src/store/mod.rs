pub mod run_log;

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::{ListingStatus, PropertyRecord};
use crate::sync::detector::IndexEntry;
use crate::sync::fingerprint::Fingerprint;

pub use run_log::{RunLog, SyncRun, DEFAULT_RUN_LOG_CAPACITY};

const PROPERTIES_DIR: &str = "properties";
const LOGS_DIR: &str = "logs";
const RUN_LOG_FILE: &str = "sync_log.json";

/// Write `bytes` to `path` so readers only ever see the old or the new file.
///
/// The data goes to a hidden temp file in the same directory, is flushed to
/// disk, then renamed over the target.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let write_err = |source: std::io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| write_err(std::io::Error::new(ErrorKind::InvalidInput, "no file name")))?;
    let tmp_path = dir.join(format!(".{file_name}.tmp"));

    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(write_err)?;
    file.write_all(bytes).await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    Ok(())
}

/// Read and decode a JSON document; `Ok(None)` if the file does not exist.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Only the members the change detector needs; field bodies are skipped.
#[derive(Debug, Deserialize)]
struct IndexProjection {
    id: String,
    fingerprint: Fingerprint,
    #[serde(default)]
    status: ListingStatus,
}

/// Record counts for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub total: usize,
    pub active: usize,
    pub removed: usize,
}

/// File-per-id JSON store of property records.
///
/// Sole mutator of stored records. Assumes a single writer.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    root: PathBuf,
    properties_dir: PathBuf,
}

impl PropertyStore {
    /// Handle on `<root>/properties` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let properties_dir = root.join(PROPERTIES_DIR);
        Self {
            root,
            properties_dir,
        }
    }

    /// Create the store directories. Fails if the location is unwritable.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::new(root);
        for dir in [&store.properties_dir, &store.logs_dir()] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::Write {
                    path: dir.clone(),
                    source,
                })?;
        }
        debug!("Opened property store at {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Default location of the run log for this store.
    pub fn run_log_path(&self) -> PathBuf {
        self.logs_dir().join(RUN_LOG_FILE)
    }

    fn record_path(&self, id: &str) -> StoreResult<PathBuf> {
        validate_id(id)?;
        Ok(self.properties_dir.join(format!("{id}.json")))
    }

    /// Paths of every stored record file, ignoring temp files.
    async fn record_files(&self) -> StoreResult<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.properties_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.properties_dir.clone(),
                    source,
                })
            }
        };

        let mut files = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| StoreError::Read {
                path: self.properties_dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };

            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if is_record {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load every stored record.
    ///
    /// A missing store is empty. Files that cannot be read or decoded are
    /// logged and skipped.
    pub async fn load_all(&self) -> StoreResult<BTreeMap<String, PropertyRecord>> {
        let mut records = BTreeMap::new();

        for path in self.record_files().await? {
            match read_json::<PropertyRecord>(&path).await {
                Ok(Some(record)) => {
                    records.insert(record.id.clone(), record);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable record: {}", e),
            }
        }

        debug!("Loaded {} records from {}", records.len(), self.properties_dir.display());
        Ok(records)
    }

    /// Load a single record.
    pub async fn get(&self, id: &str) -> StoreResult<Option<PropertyRecord>> {
        read_json(&self.record_path(id)?).await
    }

    /// Persist `record`, replacing any previous version for its id.
    pub async fn write(&self, record: &PropertyRecord) -> StoreResult<()> {
        let path = self.record_path(&record.id)?;
        let json = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &json).await?;
        debug!("Saved property {}", record.id);
        Ok(())
    }

    /// Mark a stored record as no longer listed.
    ///
    /// Already-removed records are returned untouched so their timestamps
    /// stay put.
    pub async fn mark_removed(&self, id: &str, now: DateTime<Utc>) -> StoreResult<PropertyRecord> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if record.status == ListingStatus::Removed {
            return Ok(record);
        }

        record.status = ListingStatus::Removed;
        record.refresh_fingerprint();
        record.last_updated_at = now.max(record.last_updated_at);
        self.write(&record).await?;

        info!("Updated status to 'removed' for property {}", id);
        Ok(record)
    }

    /// Fingerprints of the given ids; unknown ids are left out.
    pub async fn fingerprints_of<'a, I>(&self, ids: I) -> StoreResult<BTreeMap<String, Fingerprint>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = BTreeMap::new();
        for id in ids {
            let path = self.record_path(id)?;
            match read_json::<IndexProjection>(&path).await {
                Ok(Some(p)) => {
                    out.insert(p.id, p.fingerprint);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable record: {}", e),
            }
        }
        Ok(out)
    }

    /// Fingerprint and status of every stored record.
    pub async fn index(&self) -> StoreResult<BTreeMap<String, IndexEntry>> {
        let mut index = BTreeMap::new();
        for path in self.record_files().await? {
            match read_json::<IndexProjection>(&path).await {
                Ok(Some(p)) => {
                    index.insert(
                        p.id,
                        IndexEntry {
                            fingerprint: p.fingerprint,
                            status: p.status,
                        },
                    );
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable record: {}", e),
            }
        }
        Ok(index)
    }

    pub async fn summary(&self) -> StoreResult<StoreSummary> {
        let index = self.index().await?;
        let removed = index
            .values()
            .filter(|e| e.status == ListingStatus::Removed)
            .count();
        Ok(StoreSummary {
            total: index.len(),
            active: index.len() - removed,
            removed,
        })
    }
}

/// Ids become file names, so only a conservative character set is allowed.
fn validate_id(id: &str) -> StoreResult<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// Project stored records into the detector's view.
pub fn index_of(records: &BTreeMap<String, PropertyRecord>) -> BTreeMap<String, IndexEntry> {
    records
        .iter()
        .map(|(id, r)| {
            (
                id.clone(),
                IndexEntry {
                    fingerprint: r.fingerprint.clone(),
                    status: r.status,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BasicFields, PropertyFields};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(id: &str) -> PropertyRecord {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let listing = BasicFields {
            title: Some(format!("Listing {id}")),
            price: Some("$600,000".to_string()),
            ..Default::default()
        };
        let mut record = PropertyRecord {
            id: id.to_string(),
            url: format!("https://example.test/property-{id}"),
            fields: PropertyFields {
                title: Some(format!("Listing {id}")),
                ..Default::default()
            },
            listing,
            status: ListingStatus::Active,
            fingerprint: Fingerprint::from(""),
            first_seen_at: at,
            last_updated_at: at,
        };
        record.refresh_fingerprint();
        record
    }

    #[tokio::test]
    async fn missing_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = PropertyStore::new(dir.path().join("nowhere"));

        assert!(store.load_all().await.unwrap().is_empty());
        assert!(store.index().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_is_keyed_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = PropertyStore::open(dir.path()).await.unwrap();
        let r = record("100");

        store.write(&r).await.unwrap();
        let first = std::fs::read(dir.path().join("properties/100.json")).unwrap();
        store.write(&r).await.unwrap();
        let second = std::fs::read(dir.path().join("properties/100.json")).unwrap();

        assert_eq!(first, second);
        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["100"], r);
        assert_eq!(std::fs::read_dir(dir.path().join("properties")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn leftover_temp_and_corrupt_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = PropertyStore::open(dir.path()).await.unwrap();
        store.write(&record("1")).await.unwrap();

        let props = dir.path().join("properties");
        std::fs::write(props.join(".2.json.tmp"), b"{\"id\": \"2\"").unwrap();
        std::fs::write(props.join("3.json"), b"not json").unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["1"]);
    }

    #[tokio::test]
    async fn mark_removed_updates_status_once() {
        let dir = TempDir::new().unwrap();
        let store = PropertyStore::open(dir.path()).await.unwrap();
        let r = record("200");
        store.write(&r).await.unwrap();

        let later = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let removed = store.mark_removed("200", later).await.unwrap();
        assert_eq!(removed.status, ListingStatus::Removed);
        assert_eq!(removed.last_updated_at, later);
        assert_ne!(removed.fingerprint, r.fingerprint);

        let even_later = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let again = store.mark_removed("200", even_later).await.unwrap();
        assert_eq!(again.last_updated_at, later);
    }

    #[tokio::test]
    async fn mark_removed_unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = PropertyStore::open(dir.path()).await.unwrap();

        let err = store.mark_removed("404", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "404"));
    }

    #[tokio::test]
    async fn fingerprints_of_projects_requested_ids() {
        let dir = TempDir::new().unwrap();
        let store = PropertyStore::open(dir.path()).await.unwrap();
        let a = record("a");
        store.write(&a).await.unwrap();
        store.write(&record("b")).await.unwrap();

        let fps = store.fingerprints_of(["a", "missing"]).await.unwrap();
        assert_eq!(fps.len(), 1);
        assert_eq!(fps["a"], a.fingerprint);
    }

    #[tokio::test]
    async fn index_matches_loaded_records() {
        let dir = TempDir::new().unwrap();
        let store = PropertyStore::open(dir.path()).await.unwrap();
        store.write(&record("a")).await.unwrap();
        store.write(&record("b")).await.unwrap();
        store.mark_removed("b", Utc::now()).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(store.index().await.unwrap(), index_of(&loaded));

        let summary = store.summary().await.unwrap();
        assert_eq!(summary, StoreSummary { total: 2, active: 1, removed: 1 });
    }

    #[tokio::test]
    async fn unsafe_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = PropertyStore::open(dir.path()).await.unwrap();

        for id in ["", "../escape", ".hidden", "a/b"] {
            let err = store.write(&record_with_raw_id(id)).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidId(_)), "{id}");
        }
    }

    fn record_with_raw_id(id: &str) -> PropertyRecord {
        let mut r = record("x");
        r.id = id.to_string();
        r
    }
}
