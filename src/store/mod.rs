//! # Document Store Abstraction
//!
//! The engine never talks to a database driver directly. Everything it needs
//! from the datastore goes through [`DocumentStore`] and [`VersionStore`]:
//!
//! - full-collection snapshot scans
//! - single-document field overwrite (`$set`)
//! - unordered bulk insert honoring unique indexes
//! - a single ledger document per database
//!
//! Two implementations ship with the crate: [`InMemoryStore`] for tests and
//! [`JsonDirStore`], a directory of JSON files with atomic rewrites.

pub mod errors;
pub mod json_dir;
pub mod memory;

pub use errors::{BulkWriteError, StoreError, StoreResult, WriteError};
pub use json_dir::JsonDirStore;
pub use memory::InMemoryStore;

use serde_json::Value;

use errors::INVALID_DOCUMENT_CODE;

/// A schemaless document, always a JSON object in practice
pub type Document = Value;

/// Outcome of a fully successful bulk insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
}

/// Collection-level operations the migration engine relies on
pub trait DocumentStore: Send + Sync {
    /// Snapshot of every document in the collection at call time
    fn scan(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Overwrite one top-level field of the document with `_id == id`
    fn set_field(&self, collection: &str, id: &str, field: &str, value: Value) -> StoreResult<()>;

    /// Unordered bulk insert. Non-conflicting documents land even when others fail.
    fn insert_many_unordered(
        &self,
        collection: &str,
        docs: &[Document],
    ) -> Result<InsertReport, BulkWriteError>;

    /// Count documents whose `field` equals any of `values`
    fn count_matching(&self, collection: &str, field: &str, values: &[Value]) -> StoreResult<usize>;

    /// Whether a unique index exists on `collection.field`
    fn has_unique_index(&self, collection: &str, field: &str) -> StoreResult<bool>;
}

/// Storage for the single per-database version ledger document
pub trait VersionStore: Send + Sync {
    fn read_ledger(&self) -> StoreResult<Option<Document>>;

    fn write_ledger(&self, ledger: &Document) -> StoreResult<()>;
}

/// Render a document's `_id` as a string.
///
/// Accepts plain strings, numbers and extended-JSON `{"$oid": "..."}`.
pub fn document_id(doc: &Document) -> Option<String> {
    match doc.get("_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Unordered insert against an in-memory document list.
///
/// Shared by both store implementations so they agree on conflict semantics:
/// a missing unique field indexes as `null`, and conflicts are checked against
/// existing documents and earlier documents of the same batch.
pub(crate) fn insert_unordered(
    existing: &mut Vec<Document>,
    unique_fields: &[String],
    docs: &[Document],
) -> Result<InsertReport, BulkWriteError> {
    let mut write_errors = Vec::new();
    let mut inserted = 0;

    for (index, doc) in docs.iter().enumerate() {
        if !doc.is_object() {
            write_errors.push(WriteError {
                index,
                code: INVALID_DOCUMENT_CODE,
                message: "document must be an object".to_string(),
            });
            continue;
        }

        let conflict = unique_fields.iter().find_map(|field| {
            let key = doc.get(field).unwrap_or(&Value::Null);
            existing
                .iter()
                .any(|other| other.get(field).unwrap_or(&Value::Null) == key)
                .then(|| WriteError::duplicate_key(index, field, key))
        });

        match conflict {
            Some(err) => write_errors.push(err),
            None => {
                existing.push(doc.clone());
                inserted += 1;
            }
        }
    }

    if write_errors.is_empty() {
        Ok(InsertReport { inserted })
    } else {
        Err(BulkWriteError::Partial {
            inserted: Some(inserted),
            write_errors,
        })
    }
}

/// `$set` of one field on the document whose `_id` renders as `id`
pub(crate) fn set_field_in(
    docs: &mut [Document],
    collection: &str,
    id: &str,
    field: &str,
    value: Value,
) -> StoreResult<()> {
    let doc = docs
        .iter_mut()
        .find(|doc| document_id(doc).as_deref() == Some(id))
        .ok_or_else(|| StoreError::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

    let map = doc.as_object_mut().ok_or_else(|| StoreError::NotAnObject {
        collection: collection.to_string(),
    })?;
    map.insert(field.to_string(), value);
    Ok(())
}

pub(crate) fn count_matching_in(docs: &[Document], field: &str, values: &[Value]) -> usize {
    docs.iter()
        .filter(|doc| {
            let key = doc.get(field).unwrap_or(&Value::Null);
            values.contains(key)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id_forms() {
        assert_eq!(document_id(&json!({"_id": "abc"})).as_deref(), Some("abc"));
        assert_eq!(document_id(&json!({"_id": 42})).as_deref(), Some("42"));
        assert_eq!(
            document_id(&json!({"_id": {"$oid": "64b7f0c2a1"}})).as_deref(),
            Some("64b7f0c2a1")
        );
        assert_eq!(document_id(&json!({"name": "no id"})), None);
    }

    #[test]
    fn test_insert_unordered_skips_conflicts_but_lands_the_rest() {
        let mut existing = vec![json!({"event_id": "a"})];
        let unique = vec!["event_id".to_string()];
        let batch = vec![
            json!({"event_id": "a"}),
            json!({"event_id": "b"}),
            json!({"event_id": "b"}),
            json!({"event_id": "c"}),
        ];

        let err = insert_unordered(&mut existing, &unique, &batch).unwrap_err();
        match err {
            BulkWriteError::Partial {
                inserted,
                write_errors,
            } => {
                assert_eq!(inserted, Some(2));
                let indexes: Vec<_> = write_errors.iter().map(|e| e.index).collect();
                assert_eq!(indexes, vec![0, 2]);
                assert!(write_errors.iter().all(WriteError::is_duplicate_key));
            }
            other => panic!("Expected Partial, got {:?}", other),
        }
        assert_eq!(existing.len(), 3);
    }

    #[test]
    fn test_insert_unordered_rejects_non_objects() {
        let mut existing = Vec::new();
        let err = insert_unordered(&mut existing, &[], &[json!("text"), json!({})]).unwrap_err();
        match err {
            BulkWriteError::Partial { write_errors, .. } => {
                assert_eq!(write_errors.len(), 1);
                assert!(!write_errors[0].is_duplicate_key());
            }
            other => panic!("Expected Partial, got {:?}", other),
        }
    }

    #[test]
    fn test_set_field_in_missing_document() {
        let mut docs = vec![json!({"_id": "1"})];
        let err = set_field_in(&mut docs, "orgs", "2", "positions", json!([])).unwrap_err();
        assert!(err.to_string().contains("not found"));

        set_field_in(&mut docs, "orgs", "1", "positions", json!([])).unwrap();
        assert_eq!(docs[0]["positions"], json!([]));
    }
}
