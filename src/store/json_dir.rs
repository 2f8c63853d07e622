//! # Directory-backed JSON Store
//!
//! One pretty-printed JSON array per collection (`<root>/<collection>.json`),
//! unique index declarations in `_indexes.json` and the version ledger in
//! `_version.json`.
//!
//! Every write rewrites the whole file through a temp file and a rename, so a
//! crash leaves either the old or the new content on disk, never a torn file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::errors::{BulkWriteError, StoreError, StoreResult};
use super::{
    count_matching_in, insert_unordered, set_field_in, Document, DocumentStore, InsertReport,
    VersionStore,
};

const INDEXES_FILE: &str = "_indexes.json";
const LEDGER_FILE: &str = "_version.json";

/// Unique index declarations: collection -> unique fields
pub type IndexMap = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
pub struct JsonDirStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonDirStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::Write {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Open an existing store without creating anything
    pub fn open_existing(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::MissingDirectory { path: root });
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Declare a unique index. The engine itself never calls this.
    pub fn create_unique_index(&self, collection: &str, field: &str) -> StoreResult<()> {
        validate_collection_name(collection)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.root.join(INDEXES_FILE);
        let mut indexes: IndexMap = read_json(&path)?.unwrap_or_default();
        let fields = indexes.entry(collection.to_string()).or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
        write_json_atomic(&path, &indexes)
    }

    fn collection_path(&self, collection: &str) -> StoreResult<PathBuf> {
        validate_collection_name(collection)?;
        Ok(self.root.join(format!("{}.json", collection)))
    }

    fn load_collection(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let path = self.collection_path(collection)?;
        Ok(read_json(&path)?.unwrap_or_default())
    }

    fn save_collection(&self, collection: &str, docs: &[Document]) -> StoreResult<()> {
        let path = self.collection_path(collection)?;
        write_json_atomic(&path, &docs)
    }

    fn unique_fields(&self, collection: &str) -> StoreResult<Vec<String>> {
        let indexes: IndexMap = read_json(&self.root.join(INDEXES_FILE))?.unwrap_or_default();
        Ok(indexes.get(collection).cloned().unwrap_or_default())
    }
}

impl DocumentStore for JsonDirStore {
    fn scan(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.load_collection(collection)
    }

    fn set_field(&self, collection: &str, id: &str, field: &str, value: Value) -> StoreResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut docs = self.load_collection(collection)?;
        set_field_in(&mut docs, collection, id, field, value)?;
        self.save_collection(collection, &docs)
    }

    fn insert_many_unordered(
        &self,
        collection: &str,
        docs: &[Document],
    ) -> Result<InsertReport, BulkWriteError> {
        let failed = |e: StoreError| BulkWriteError::Failed {
            reason: e.to_string(),
        };

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let unique_fields = self.unique_fields(collection).map_err(failed)?;
        let mut existing = self.load_collection(collection).map_err(failed)?;

        let result = insert_unordered(&mut existing, &unique_fields, docs);
        let landed = match &result {
            Ok(report) => report.inserted,
            Err(BulkWriteError::Partial { inserted, .. }) => inserted.unwrap_or(0),
            Err(BulkWriteError::Failed { .. }) => 0,
        };
        if landed > 0 {
            self.save_collection(collection, &existing).map_err(failed)?;
        }
        result
    }

    fn count_matching(&self, collection: &str, field: &str, values: &[Value]) -> StoreResult<usize> {
        let docs = self.load_collection(collection)?;
        Ok(count_matching_in(&docs, field, values))
    }

    fn has_unique_index(&self, collection: &str, field: &str) -> StoreResult<bool> {
        Ok(self.unique_fields(collection)?.iter().any(|f| f == field))
    }
}

impl VersionStore for JsonDirStore {
    fn read_ledger(&self) -> StoreResult<Option<Document>> {
        read_json(&self.root.join(LEDGER_FILE))
    }

    fn write_ledger(&self, ledger: &Document) -> StoreResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        write_json_atomic(&self.root.join(LEDGER_FILE), ledger)
    }
}

/// Collection names map to file names, so keep them to a safe alphabet
fn validate_collection_name(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidCollection {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.starts_with('_') {
        return Err(invalid("names starting with '_' are reserved"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("only ASCII letters, digits, '_' and '-' are allowed"));
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| StoreError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        message: format!("Failed to serialize: {}", e),
    })?;

    let temp_file = path.with_extension("json.tmp");
    fs::write(&temp_file, &content).map_err(|e| StoreError::Write {
        path: temp_file.clone(),
        source: e,
    })?;

    fs::rename(&temp_file, path).map_err(|e| StoreError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_open_existing_never_creates() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("prod");

        assert!(matches!(
            JsonDirStore::open_existing(&missing),
            Err(StoreError::MissingDirectory { .. })
        ));
        assert!(!missing.exists());

        JsonDirStore::open(&missing).unwrap();
        let store = JsonDirStore::open_existing(&missing).unwrap();
        assert!(store.read_ledger().unwrap().is_none());
    }

    #[test]
    fn test_insert_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(temp_dir.path()).unwrap();
        store.create_unique_index("analytics_events", "event_id").unwrap();

        let docs = vec![json!({"event_id": "a"}), json!({"event_id": "b"})];
        let report = store.insert_many_unordered("analytics_events", &docs).unwrap();
        assert_eq!(report.inserted, 2);

        let reopened = JsonDirStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.scan("analytics_events").unwrap().len(), 2);
        assert!(reopened.has_unique_index("analytics_events", "event_id").unwrap());

        let result = reopened.insert_many_unordered("analytics_events", &docs);
        assert!(matches!(
            result,
            Err(BulkWriteError::Partial {
                inserted: Some(0),
                ..
            })
        ));
        assert_eq!(reopened.scan("analytics_events").unwrap().len(), 2);
    }

    #[test]
    fn test_set_field_rewrites_document() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(temp_dir.path()).unwrap();
        fs::write(
            temp_dir.path().join("orgs.json"),
            json!([{"_id": {"$oid": "abc"}, "positions": []}]).to_string(),
        )
        .unwrap();

        store
            .set_field("orgs", "abc", "positions", json!([{"name": "admin"}]))
            .unwrap();

        let docs = store.scan("orgs").unwrap();
        assert_eq!(docs[0]["positions"][0]["name"], "admin");
        assert!(!temp_dir.path().join("orgs.json.tmp").exists());
    }

    #[test]
    fn test_ledger_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(temp_dir.path()).unwrap();
        assert!(store.read_ledger().unwrap().is_none());

        store.write_ledger(&json!({"version": 1.22})).unwrap();
        assert_eq!(store.read_ledger().unwrap(), Some(json!({"version": 1.22})));
    }

    #[test]
    fn test_corrupt_collection_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("QR.json"), "{not json").unwrap();

        let err = store.scan("QR").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_rejects_path_like_collection_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonDirStore::open(temp_dir.path()).unwrap();
        assert!(store.scan("../etc").is_err());
        assert!(store.scan("_version").is_err());
        assert!(store.scan("").is_err());
    }
}
