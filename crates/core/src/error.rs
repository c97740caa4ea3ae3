use crate::store::CompositeHandle;
use crate::types::{AssetPath, DocumentCategory};

/// Errors raised by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(AssetPath),

    #[error("Document {path} is not a {expected}")]
    WrongCategory {
        path: AssetPath,
        expected: DocumentCategory,
    },

    #[error("Composite handle {0} is not open")]
    HandleClosed(CompositeHandle),

    #[error("Malformed document {path}: {reason}")]
    Malformed { path: AssetPath, reason: String },

    #[error("Rejected by store: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Engine-level error taxonomy.
///
/// Every per-document variant is recovered locally (logged, then the next
/// document is processed). Only the gate's outcome reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Failed to read {path}: {source}")]
    ScanIo {
        path: AssetPath,
        #[source]
        source: StoreError,
    },

    #[error("Failed to commit edits to {path}: {source}")]
    MutationCommit {
        path: AssetPath,
        #[source]
        source: StoreError,
    },

    #[error("Scheduled task '{label}' failed: {source}")]
    ScheduledTask {
        label: String,
        #[source]
        source: StoreError,
    },

    #[error("Deletion of {0} was declined")]
    ConfirmationDeclined(AssetPath),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
