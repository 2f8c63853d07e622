//! In-memory document store (for testing)

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use super::{
    count_matching_in, insert_unordered, set_field_in, BulkWriteError, Document, DocumentStore,
    InsertReport, StoreResult, VersionStore,
};

/// Thread-safe in-memory store with declared unique indexes and a ledger slot
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    unique_indexes: RwLock<HashMap<String, Vec<String>>>,
    ledger: RwLock<Option<Document>>,
    /// When set, every bulk insert fails as a whole with this reason
    insert_failure: RwLock<Option<String>>,
    /// When set, partial bulk failures hide the inserted count
    hide_inserted_count: RwLock<bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of a collection
    pub fn with_collection(self, name: &str, docs: Vec<Document>) -> Self {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), docs);
        self
    }

    pub fn create_unique_index(&self, collection: &str, field: &str) {
        let mut indexes = self
            .unique_indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let fields = indexes.entry(collection.to_string()).or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }

    /// Copy of a collection's documents
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Simulate a connectivity failure on every subsequent bulk insert
    pub fn fail_inserts_with(&self, reason: impl Into<String>) {
        *self
            .insert_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    /// Simulate a driver that omits `nInserted` from partial bulk failures
    pub fn hide_inserted_count(&self) {
        *self
            .hide_inserted_count
            .write()
            .unwrap_or_else(PoisonError::into_inner) = true;
    }
}

impl DocumentStore for InMemoryStore {
    fn scan(&self, collection: &str) -> StoreResult<Vec<Document>> {
        Ok(self.documents(collection))
    }

    fn set_field(&self, collection: &str, id: &str, field: &str, value: Value) -> StoreResult<()> {
        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let docs = collections.entry(collection.to_string()).or_default();
        set_field_in(docs, collection, id, field, value)
    }

    fn insert_many_unordered(
        &self,
        collection: &str,
        docs: &[Document],
    ) -> Result<InsertReport, BulkWriteError> {
        if let Some(reason) = self
            .insert_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(BulkWriteError::Failed { reason });
        }

        let unique_fields = self
            .unique_indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .cloned()
            .unwrap_or_default();

        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        let existing = collections.entry(collection.to_string()).or_default();
        let result = insert_unordered(existing, &unique_fields, docs);

        let hide = *self
            .hide_inserted_count
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match result {
            Err(BulkWriteError::Partial { write_errors, .. }) if hide => {
                Err(BulkWriteError::Partial {
                    inserted: None,
                    write_errors,
                })
            }
            other => other,
        }
    }

    fn count_matching(&self, collection: &str, field: &str, values: &[Value]) -> StoreResult<usize> {
        let collections = self.collections.read().unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get(collection)
            .map(|docs| count_matching_in(docs, field, values))
            .unwrap_or(0))
    }

    fn has_unique_index(&self, collection: &str, field: &str) -> StoreResult<bool> {
        let indexes = self
            .unique_indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(indexes
            .get(collection)
            .map(|fields| fields.iter().any(|f| f == field))
            .unwrap_or(false))
    }
}

impl VersionStore for InMemoryStore {
    fn read_ledger(&self) -> StoreResult<Option<Document>> {
        Ok(self.ledger.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn write_ledger(&self, ledger: &Document) -> StoreResult<()> {
        *self.ledger.write().unwrap_or_else(PoisonError::into_inner) = Some(ledger.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_unknown_collection_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.scan("orgs").unwrap().is_empty());
    }

    #[test]
    fn test_unique_index_enforced() {
        let store = InMemoryStore::new();
        store.create_unique_index("analytics_events", "event_id");
        assert!(store.has_unique_index("analytics_events", "event_id").unwrap());
        assert!(!store.has_unique_index("analytics_events", "ts").unwrap());

        let docs = vec![json!({"event_id": "a"})];
        let report = store.insert_many_unordered("analytics_events", &docs).unwrap();
        assert_eq!(report.inserted, 1);

        let result = store.insert_many_unordered("analytics_events", &docs);
        assert!(matches!(
            result,
            Err(BulkWriteError::Partial {
                inserted: Some(0),
                ..
            })
        ));
        assert_eq!(store.documents("analytics_events").len(), 1);
    }

    #[test]
    fn test_hidden_inserted_count() {
        let store = InMemoryStore::new();
        store.create_unique_index("events", "event_id");
        store.hide_inserted_count();

        let docs = vec![json!({"event_id": "a"}), json!({"event_id": "a"})];
        let result = store.insert_many_unordered("events", &docs);
        assert!(matches!(
            result,
            Err(BulkWriteError::Partial { inserted: None, .. })
        ));
    }

    #[test]
    fn test_injected_insert_failure() {
        let store = InMemoryStore::new();
        store.fail_inserts_with("network unreachable");
        let result = store.insert_many_unordered("events", &[json!({})]);
        assert!(matches!(result, Err(BulkWriteError::Failed { .. })));
        assert!(store.documents("events").is_empty());
    }

    #[test]
    fn test_ledger_slot() {
        let store = InMemoryStore::new();
        assert!(store.read_ledger().unwrap().is_none());
        store.write_ledger(&json!({"version": 1.21})).unwrap();
        assert_eq!(store.read_ledger().unwrap(), Some(json!({"version": 1.21})));
    }
}
