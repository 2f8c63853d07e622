//! # Batch Writer
//!
//! One unordered bulk insert per call, with the result split into inserted,
//! duplicate-skipped and failed. Duplicate-key rejections are the expected
//! outcome of re-running a backfill and are never reported as errors.

use serde_json::Value;
use tracing::debug;

use super::errors::{MigrationError, MigrationResult};
use crate::store::{BulkWriteError, Document, DocumentStore, WriteError};

/// Result of one batch insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Writes canonical documents into a sink with a unique key
pub struct BatchWriter<'a> {
    store: &'a dyn DocumentStore,
    collection: &'a str,
    key_field: &'a str,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn DocumentStore, collection: &'a str, key_field: &'a str) -> Self {
        Self {
            store,
            collection,
            key_field,
        }
    }

    /// Insert `docs` in one unordered call.
    ///
    /// Any failure other than duplicate keys fails the whole batch, even if
    /// the store accepted part of it.
    pub fn write(&self, docs: &[Document]) -> MigrationResult<BatchReport> {
        if docs.is_empty() {
            return Ok(BatchReport::default());
        }

        match self.store.insert_many_unordered(self.collection, docs) {
            Ok(report) => Ok(BatchReport {
                attempted: docs.len(),
                inserted: report.inserted,
                duplicates: 0,
            }),
            Err(BulkWriteError::Partial {
                inserted,
                write_errors,
            }) => {
                if let Some(other) = write_errors.iter().find(|e| !e.is_duplicate_key()) {
                    return Err(MigrationError::WriteFailed {
                        collection: self.collection.to_string(),
                        reason: format!(
                            "document {} rejected (code {}): {}",
                            other.index, other.code, other.message
                        ),
                    });
                }

                let inserted = match inserted {
                    Some(n) => n,
                    None => self.reconcile(docs, &write_errors)?,
                };
                Ok(BatchReport {
                    attempted: docs.len(),
                    inserted,
                    duplicates: docs.len().saturating_sub(inserted),
                })
            }
            Err(err @ BulkWriteError::Failed { .. }) => {
                Err(MigrationError::write_failed(self.collection, &err))
            }
        }
    }

    /// Read-after-write pass for drivers that omit the inserted count.
    ///
    /// Every key in the batch must be present afterwards, either freshly
    /// inserted or already there; then inserted = batch minus rejections.
    fn reconcile(&self, docs: &[Document], write_errors: &[WriteError]) -> MigrationResult<usize> {
        let mut keys: Vec<Value> = Vec::with_capacity(docs.len());
        for key in docs.iter().filter_map(|doc| doc.get(self.key_field)) {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        let keyed = docs
            .iter()
            .filter(|doc| doc.get(self.key_field).is_some())
            .count();
        let present = self
            .store
            .count_matching(self.collection, self.key_field, &keys)?;

        debug!(
            collection = self.collection,
            batch = docs.len(),
            present,
            rejected = write_errors.len(),
            "Reconciled bulk write without inserted count"
        );

        if present < keys.len() || keyed < docs.len() {
            return Err(MigrationError::WriteFailed {
                collection: self.collection.to_string(),
                reason: format!(
                    "only {} of {} keys present after bulk write",
                    present,
                    docs.len()
                ),
            });
        }
        Ok(docs.len().saturating_sub(write_errors.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn events(ids: &[&str]) -> Vec<Document> {
        ids.iter().map(|id| json!({"event_id": id})).collect()
    }

    fn sink() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.create_unique_index("analytics_events", "event_id");
        store
    }

    #[test]
    fn test_full_success() {
        let store = sink();
        let writer = BatchWriter::new(&store, "analytics_events", "event_id");

        let report = writer.write(&events(&["a", "b", "c"])).unwrap();
        assert_eq!(
            report,
            BatchReport {
                attempted: 3,
                inserted: 3,
                duplicates: 0
            }
        );
    }

    #[test]
    fn test_partial_duplicates_are_skipped_not_errors() {
        let store = sink();
        let writer = BatchWriter::new(&store, "analytics_events", "event_id");
        writer.write(&events(&["a", "b"])).unwrap();

        let report = writer.write(&events(&["a", "b", "c"])).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 2);
        assert_eq!(store.documents("analytics_events").len(), 3);
    }

    #[test]
    fn test_reconciles_when_count_is_hidden() {
        let store = sink();
        store.hide_inserted_count();
        let writer = BatchWriter::new(&store, "analytics_events", "event_id");
        writer.write(&events(&["a"])).unwrap();

        let report = writer.write(&events(&["a", "b"])).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn test_connectivity_failure_errors_whole_batch() {
        let store = sink();
        store.fail_inserts_with("server selection timeout");
        let writer = BatchWriter::new(&store, "analytics_events", "event_id");

        let err = writer.write(&events(&["a", "b"])).unwrap_err();
        assert!(matches!(err, MigrationError::WriteFailed { .. }));
        assert!(err.to_string().contains("server selection timeout"));
    }

    #[test]
    fn test_non_duplicate_rejection_errors_whole_batch() {
        let store = sink();
        let writer = BatchWriter::new(&store, "analytics_events", "event_id");

        let batch = vec![json!({"event_id": "a"}), json!("not a document")];
        let err = writer.write(&batch).unwrap_err();
        assert!(err.to_string().contains("document 1"));
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let store = sink();
        store.fail_inserts_with("must not be called");
        let writer = BatchWriter::new(&store, "analytics_events", "event_id");
        assert_eq!(writer.write(&[]).unwrap(), BatchReport::default());
    }
}
