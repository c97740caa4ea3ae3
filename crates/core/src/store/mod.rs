//! Boundary traits for the document store the engine runs against.
//!
//! The engine never owns documents. It reads them through [`AssetStore`],
//! commits whole-document edits back through it, and drives composites that
//! may be live in the host through [`CompositeLifecycle`].

use std::collections::BTreeSet;
use std::fmt;

use crate::document::{CompositeDocument, Document};
use crate::error::StoreError;
use crate::types::{AssetId, AssetKind, AssetPath, DocumentCategory};

pub mod memory;

pub use memory::MemoryStore;

/// Opaque token for a composite that is open in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeHandle(pub u64);

impl fmt::Display for CompositeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "composite#{}", self.0)
    }
}

/// Query and commit primitives over the document corpus.
pub trait AssetStore {
    /// Paths of every document of `category`.
    fn find_documents_by_category(
        &self,
        category: DocumentCategory,
    ) -> Result<Vec<AssetPath>, StoreError>;

    /// The document's serialized form, exactly as stored.
    fn load_document_raw_text(&self, path: &AssetPath) -> Result<String, StoreError>;

    fn resolve_asset_id(&self, path: &AssetPath) -> Result<AssetId, StoreError>;

    fn resolve_asset_kind(&self, id: &AssetId) -> Result<AssetKind, StoreError>;

    fn document_exists(&self, path: &AssetPath) -> bool;

    fn load_document(&self, path: &AssetPath) -> Result<Document, StoreError>;

    /// Replace the stored document in one write.
    fn commit_document(&mut self, path: &AssetPath, document: &Document) -> Result<(), StoreError>;

    fn delete_document(&mut self, path: &AssetPath) -> Result<(), StoreError>;

    /// Flag the asset's on-disk descriptor as changed so downstream tooling
    /// picks the edit up.
    fn mark_modified(&mut self, path: &AssetPath) -> Result<(), StoreError>;
}

/// Open/save/close primitives for composites.
pub trait CompositeLifecycle {
    fn is_composite_open(&self, path: &AssetPath) -> bool;

    /// Handle of an already open composite.
    fn open_handle(&self, path: &AssetPath) -> Option<CompositeHandle>;

    /// Open a composite alongside whatever is already open.
    fn open_additive(&mut self, path: &AssetPath) -> Result<CompositeHandle, StoreError>;

    fn is_handle_valid(&self, handle: CompositeHandle) -> bool;

    fn composite(&self, handle: CompositeHandle) -> Result<&CompositeDocument, StoreError>;

    fn composite_mut(&mut self, handle: CompositeHandle)
        -> Result<&mut CompositeDocument, StoreError>;

    fn open_composites(&self) -> Vec<CompositeHandle>;

    fn save(&mut self, handle: CompositeHandle) -> Result<(), StoreError>;

    fn save_as(&mut self, handle: CompositeHandle, path: &AssetPath) -> Result<(), StoreError>;

    fn close(&mut self, handle: CompositeHandle, save_first: bool) -> Result<(), StoreError>;
}

/// Everything the cleaner and gate need from a store.
pub trait Store: AssetStore + CompositeLifecycle {}

impl<T: AssetStore + CompositeLifecycle> Store for T {}

/// Composites that count as referenced no matter what their content says,
/// e.g. a fixed launch list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinnedMembership {
    paths: BTreeSet<AssetPath>,
}

impl PinnedMembership {
    pub fn new(paths: impl IntoIterator<Item = AssetPath>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn contains(&self, path: &AssetPath) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
