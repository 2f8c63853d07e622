//! # Store Errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// MongoDB-compatible duplicate key error code.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Error code reported for documents that are not objects.
pub const INVALID_DOCUMENT_CODE: i32 = 2;

/// Errors raised by a document store outside of bulk inserts
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Store directory {path:?} does not exist")]
    MissingDirectory { path: PathBuf },

    #[error("Store file {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Invalid collection name '{name}': {reason}")]
    InvalidCollection { name: String, reason: String },

    #[error("Document '{id}' not found in '{collection}'")]
    DocumentNotFound { collection: String, id: String },

    #[error("Document in '{collection}' is not an object")]
    NotAnObject { collection: String },
}

/// A single per-document failure inside an unordered bulk insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Position of the failing document in the submitted batch
    pub index: usize,
    pub code: i32,
    pub message: String,
}

impl WriteError {
    pub fn duplicate_key(index: usize, field: &str, value: &serde_json::Value) -> Self {
        Self {
            index,
            code: DUPLICATE_KEY_CODE,
            message: format!("E11000 duplicate key error: {} = {}", field, value),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.code == DUPLICATE_KEY_CODE
    }
}

/// Failure of an unordered bulk insert.
///
/// Unordered semantics: documents without their own write error still land,
/// so `Partial` means "some of the batch was persisted".
#[derive(Debug, Clone, Error)]
pub enum BulkWriteError {
    /// Some documents were rejected individually.
    ///
    /// `inserted` is `None` when the driver does not report how many landed.
    #[error("Bulk write rejected {} document(s)", write_errors.len())]
    Partial {
        inserted: Option<usize>,
        write_errors: Vec<WriteError>,
    },

    /// The whole call failed (connectivity, serialization, ...)
    #[error("Bulk write failed: {reason}")]
    Failed { reason: String },
}
