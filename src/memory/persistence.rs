// src/memory/persistence.rs
// Persistence layer: save/load vector store snapshots to disk

use crate::memory::vector_store::{VectorRecord, VectorStore, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const SNAPSHOT_FILE: &str = "index.json";
pub const SNAPSHOT_VERSION: u32 = 2;

/// Everything the records depend on. A snapshot is reused only when its key
/// equals the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotKey {
    /// Fingerprint of the PDF corpus the records were built from.
    pub fingerprint: String,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

/// Serializable snapshot of vector store for persistence
#[derive(Debug, Serialize, Deserialize)]
pub struct VectorStoreSnapshot {
    pub version: u32,
    #[serde(flatten)]
    pub key: SnapshotKey,
    pub timestamp: i64,
    pub records: Vec<VectorRecord>,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot not found: {0}")]
    NotFound(String),
    #[error("Unsupported snapshot version {0}")]
    Version(u32),
    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Writes `{dir}/index.json`, creating `dir` on first use.
pub fn save_vector_store(
    store: &VectorStore,
    dir: &Path,
    key: &SnapshotKey,
) -> Result<PathBuf, PersistenceError> {
    std::fs::create_dir_all(dir)?;
    let path = snapshot_path(dir);
    debug!(path = ?path, "Saving vector store");

    let snapshot = VectorStoreSnapshot {
        version: SNAPSHOT_VERSION,
        key: key.clone(),
        timestamp: chrono::Utc::now().timestamp(),
        records: store.records().to_vec(),
    };
    let json = serde_json::to_string(&snapshot)?;

    // atomic replace
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    info!(path = ?path, records = snapshot.records.len(), "Vector store saved");
    Ok(path)
}

pub fn read_snapshot(dir: &Path) -> Result<VectorStoreSnapshot, PersistenceError> {
    let path = snapshot_path(dir);
    if !path.exists() {
        return Err(PersistenceError::NotFound(path.display().to_string()));
    }
    let json = std::fs::read_to_string(&path)?;
    let snapshot: VectorStoreSnapshot = serde_json::from_str(&json)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(PersistenceError::Version(snapshot.version));
    }
    Ok(snapshot)
}

/// Loads the snapshot only if it was built under `key`; `Ok(None)` means it
/// must be rebuilt.
pub fn load_matching_store(dir: &Path, key: &SnapshotKey) -> Result<Option<VectorStore>, PersistenceError> {
    let snapshot = match read_snapshot(dir) {
        Ok(snapshot) => snapshot,
        Err(PersistenceError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    if &snapshot.key != key {
        info!(stored = ?snapshot.key, current = ?key, "Vector store snapshot is stale");
        return Ok(None);
    }
    let records = snapshot.records.len();
    let store = VectorStore::from_records(snapshot.records)?;
    info!(dir = ?dir, records, "Vector store loaded");
    Ok(Some(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> VectorStore {
        VectorStore::from_records(vec![VectorRecord {
            chunk_id: "a.pdf#0".into(),
            content: "누리호".into(),
            source: "a.pdf".into(),
            page: 0,
            chunk_index: 0,
            embedding: vec![0.5, 0.5],
        }])
        .unwrap()
    }

    fn key(fingerprint: &str, model: &str) -> SnapshotKey {
        SnapshotKey {
            fingerprint: fingerprint.into(),
            embedding_model: model.into(),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }

    #[test]
    fn test_save_creates_directory_and_loads_back() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("vectorstore");
        save_vector_store(&store(), &target, &key("fp1", "ada")).unwrap();

        let loaded = load_matching_store(&target, &key("fp1", "ada")).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("a.pdf#0").unwrap().content, "누리호");
        assert_eq!(read_snapshot(&target).unwrap().key.chunk_size, 1000);
    }

    #[test]
    fn test_stale_or_missing_snapshot_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_matching_store(dir.path(), &key("fp1", "ada")).unwrap().is_none());

        save_vector_store(&store(), dir.path(), &key("fp1", "ada")).unwrap();
        assert!(load_matching_store(dir.path(), &key("fp2", "ada")).unwrap().is_none());
        assert!(load_matching_store(dir.path(), &key("fp1", "hash")).unwrap().is_none());
    }

    #[test]
    fn test_chunk_settings_are_part_of_the_key() {
        let dir = tempdir().unwrap();
        save_vector_store(&store(), dir.path(), &key("fp1", "ada")).unwrap();

        let resized = SnapshotKey { chunk_size: 500, ..key("fp1", "ada") };
        assert!(load_matching_store(dir.path(), &resized).unwrap().is_none());
        let overlapped = SnapshotKey { chunk_overlap: 50, ..key("fp1", "ada") };
        assert!(load_matching_store(dir.path(), &overlapped).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_error() {
        let dir = tempdir().unwrap();
        std::fs::write(snapshot_path(dir.path()), "{not json").unwrap();
        assert!(matches!(
            load_matching_store(dir.path(), &key("fp1", "ada")),
            Err(PersistenceError::Serialization(_))
        ));
    }
}
