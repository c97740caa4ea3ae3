//! In-memory store for embedding hosts and tests.
//!
//! Keeps the stored state of every document separate from the in-memory
//! state of open composites, the same split a real editor has, and records
//! commits, saves and closes so callers can observe what the engine did.
//! Individual paths can be made to fail reads, commits or saves.

use std::collections::{BTreeMap, BTreeSet};

use crate::document::{CompositeDocument, Document};
use crate::error::StoreError;
use crate::store::{AssetStore, CompositeHandle, CompositeLifecycle};
use crate::types::{AssetId, AssetKind, AssetPath, DocumentCategory};

#[derive(Debug, Clone)]
struct OpenComposite {
    path: AssetPath,
    document: CompositeDocument,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    assets: BTreeMap<AssetPath, (AssetId, AssetKind)>,
    documents: BTreeMap<AssetPath, Document>,
    open: BTreeMap<CompositeHandle, OpenComposite>,
    next_handle: u64,

    unreadable: BTreeSet<AssetPath>,
    failing_commits: BTreeSet<AssetPath>,
    failing_saves: BTreeSet<AssetPath>,

    commit_counts: BTreeMap<AssetPath, usize>,
    saves: Vec<AssetPath>,
    closes: Vec<AssetPath>,
    modified: BTreeSet<AssetPath>,
    deleted: Vec<AssetPath>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset that has no document body (e.g. a type definition).
    pub fn insert_asset(&mut self, path: impl Into<AssetPath>, id: AssetId, kind: AssetKind) {
        self.assets.insert(path.into(), (id, kind));
    }

    /// Register an asset together with its stored document.
    pub fn insert_document(
        &mut self,
        path: impl Into<AssetPath>,
        id: AssetId,
        kind: AssetKind,
        document: Document,
    ) {
        let path = path.into();
        self.assets.insert(path.clone(), (id, kind));
        self.documents.insert(path, document);
    }

    /// Open a composite the way a user would, before any deletion starts.
    pub fn open_composite(&mut self, path: &AssetPath) -> Result<CompositeHandle, StoreError> {
        self.open_additive(path)
    }

    pub fn fail_reads(&mut self, path: impl Into<AssetPath>) {
        self.unreadable.insert(path.into());
    }

    pub fn fail_commits(&mut self, path: impl Into<AssetPath>) {
        self.failing_commits.insert(path.into());
    }

    pub fn fail_saves(&mut self, path: impl Into<AssetPath>) {
        self.failing_saves.insert(path.into());
    }

    /// Stored (committed) state of a document.
    pub fn document(&self, path: &AssetPath) -> Option<&Document> {
        self.documents.get(path)
    }

    pub fn commit_count(&self, path: &AssetPath) -> usize {
        self.commit_counts.get(path).copied().unwrap_or(0)
    }

    pub fn saves(&self) -> &[AssetPath] {
        &self.saves
    }

    pub fn closes(&self) -> &[AssetPath] {
        &self.closes
    }

    pub fn deleted(&self) -> &[AssetPath] {
        &self.deleted
    }

    pub fn is_modified(&self, path: &AssetPath) -> bool {
        self.modified.contains(path)
    }

    fn open_composite_mut(
        &mut self,
        handle: CompositeHandle,
    ) -> Result<&mut OpenComposite, StoreError> {
        self.open
            .get_mut(&handle)
            .ok_or(StoreError::HandleClosed(handle))
    }
}

impl AssetStore for MemoryStore {
    fn find_documents_by_category(
        &self,
        category: DocumentCategory,
    ) -> Result<Vec<AssetPath>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|(_, doc)| doc.category() == category)
            .map(|(path, _)| path.clone())
            .collect())
    }

    fn load_document_raw_text(&self, path: &AssetPath) -> Result<String, StoreError> {
        if self.unreadable.contains(path) {
            return Err(StoreError::Rejected(format!("{path} is locked")));
        }
        let document = self.load_document(path)?;
        document.to_raw_text().map_err(|e| StoreError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    fn resolve_asset_id(&self, path: &AssetPath) -> Result<AssetId, StoreError> {
        self.assets
            .get(path)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| StoreError::AssetNotFound(path.to_string()))
    }

    fn resolve_asset_kind(&self, id: &AssetId) -> Result<AssetKind, StoreError> {
        self.assets
            .values()
            .find(|(asset_id, _)| asset_id == id)
            .map(|(_, kind)| kind.clone())
            .ok_or_else(|| StoreError::AssetNotFound(id.to_string()))
    }

    fn document_exists(&self, path: &AssetPath) -> bool {
        self.documents.contains_key(path)
    }

    fn load_document(&self, path: &AssetPath) -> Result<Document, StoreError> {
        if self.unreadable.contains(path) {
            return Err(StoreError::Rejected(format!("{path} is locked")));
        }
        self.documents
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound(path.clone()))
    }

    fn commit_document(&mut self, path: &AssetPath, document: &Document) -> Result<(), StoreError> {
        if self.failing_commits.contains(path) {
            return Err(StoreError::Rejected(format!("{path} is read-only")));
        }
        if !self.documents.contains_key(path) {
            return Err(StoreError::DocumentNotFound(path.clone()));
        }
        self.documents.insert(path.clone(), document.clone());
        *self.commit_counts.entry(path.clone()).or_default() += 1;
        Ok(())
    }

    fn delete_document(&mut self, path: &AssetPath) -> Result<(), StoreError> {
        if self.documents.remove(path).is_none() {
            return Err(StoreError::DocumentNotFound(path.clone()));
        }
        self.assets.remove(path);
        self.deleted.push(path.clone());
        Ok(())
    }

    fn mark_modified(&mut self, path: &AssetPath) -> Result<(), StoreError> {
        if !self.assets.contains_key(path) {
            return Err(StoreError::AssetNotFound(path.to_string()));
        }
        self.modified.insert(path.clone());
        Ok(())
    }
}

impl CompositeLifecycle for MemoryStore {
    fn is_composite_open(&self, path: &AssetPath) -> bool {
        self.open_handle(path).is_some()
    }

    fn open_handle(&self, path: &AssetPath) -> Option<CompositeHandle> {
        self.open
            .iter()
            .find(|(_, open)| &open.path == path)
            .map(|(handle, _)| *handle)
    }

    fn open_additive(&mut self, path: &AssetPath) -> Result<CompositeHandle, StoreError> {
        if let Some(handle) = self.open_handle(path) {
            return Ok(handle);
        }
        let document = match self.load_document(path)? {
            Document::Composite(composite) => composite,
            _ => {
                return Err(StoreError::WrongCategory {
                    path: path.clone(),
                    expected: DocumentCategory::Composite,
                })
            }
        };
        self.next_handle += 1;
        let handle = CompositeHandle(self.next_handle);
        self.open.insert(
            handle,
            OpenComposite {
                path: path.clone(),
                document,
            },
        );
        Ok(handle)
    }

    fn is_handle_valid(&self, handle: CompositeHandle) -> bool {
        self.open.contains_key(&handle)
    }

    fn composite(&self, handle: CompositeHandle) -> Result<&CompositeDocument, StoreError> {
        self.open
            .get(&handle)
            .map(|open| &open.document)
            .ok_or(StoreError::HandleClosed(handle))
    }

    fn composite_mut(
        &mut self,
        handle: CompositeHandle,
    ) -> Result<&mut CompositeDocument, StoreError> {
        self.open_composite_mut(handle).map(|open| &mut open.document)
    }

    fn open_composites(&self) -> Vec<CompositeHandle> {
        self.open.keys().copied().collect()
    }

    fn save(&mut self, handle: CompositeHandle) -> Result<(), StoreError> {
        let path = self.open_composite_mut(handle)?.path.clone();
        self.save_as(handle, &path)
    }

    fn save_as(&mut self, handle: CompositeHandle, path: &AssetPath) -> Result<(), StoreError> {
        let document = self.open_composite_mut(handle)?.document.clone();
        if self.failing_saves.contains(path) {
            return Err(StoreError::Rejected(format!("{path} could not be saved")));
        }
        self.documents
            .insert(path.clone(), Document::Composite(document));
        self.saves.push(path.clone());
        Ok(())
    }

    fn close(&mut self, handle: CompositeHandle, save_first: bool) -> Result<(), StoreError> {
        if save_first {
            self.save(handle)?;
        }
        let open = self
            .open
            .remove(&handle)
            .ok_or(StoreError::HandleClosed(handle))?;
        self.closes.push(open.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{RecordDocument, SceneObject};

    fn composite_store() -> (MemoryStore, AssetPath) {
        let mut store = MemoryStore::new();
        let path = AssetPath::from("Levels/one.composite");
        store.insert_document(
            path.clone(),
            AssetId::new("lvl-1"),
            AssetKind::Composite,
            Document::Composite(CompositeDocument {
                roots: vec![SceneObject::new("camera")],
            }),
        );
        (store, path)
    }

    #[test]
    fn open_additive_reuses_existing_handle() {
        let (mut store, path) = composite_store();
        let first = store.open_additive(&path).unwrap();
        let second = store.open_additive(&path).unwrap();
        assert_eq!(first, second);
        assert!(store.is_composite_open(&path));
    }

    #[test]
    fn in_memory_edits_reach_storage_only_on_save() {
        let (mut store, path) = composite_store();
        let handle = store.open_additive(&path).unwrap();
        store.composite_mut(handle).unwrap().roots.clear();

        let stored = store.document(&path).unwrap();
        assert_matches::assert_matches!(stored, Document::Composite(c) if c.roots.len() == 1);

        store.save(handle).unwrap();
        let stored = store.document(&path).unwrap();
        assert_matches::assert_matches!(stored, Document::Composite(c) if c.roots.is_empty());
        assert_eq!(store.saves(), &[path]);
    }

    #[test]
    fn close_invalidates_handle() {
        let (mut store, path) = composite_store();
        let handle = store.open_additive(&path).unwrap();
        store.close(handle, false).unwrap();
        assert!(!store.is_handle_valid(handle));
        assert_matches::assert_matches!(store.save(handle), Err(StoreError::HandleClosed(_)));
        assert_eq!(store.closes(), &[path]);
    }

    #[test]
    fn open_additive_rejects_non_composites() {
        let mut store = MemoryStore::new();
        let path = AssetPath::from("Data/loot.record");
        store.insert_document(
            path.clone(),
            AssetId::new("loot"),
            AssetKind::Instance,
            Document::Record(RecordDocument {
                type_name: "LootTable".into(),
                script: None,
                fields: Default::default(),
            }),
        );
        assert_matches::assert_matches!(
            store.open_additive(&path),
            Err(StoreError::WrongCategory { .. })
        );
    }

    #[test]
    fn injected_failures_surface_as_errors() {
        let (mut store, path) = composite_store();
        store.fail_reads(path.clone());
        assert!(store.load_document_raw_text(&path).is_err());

        let (mut store, path) = composite_store();
        store.fail_commits(path.clone());
        let doc = store.document(&path).unwrap().clone();
        assert!(store.commit_document(&path, &doc).is_err());
        assert_eq!(store.commit_count(&path), 0);
    }
}
