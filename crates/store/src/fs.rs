//! Directory-backed store.
//!
//! Layout: every tracked asset `X` has a JSON sidecar `X.meta` holding its
//! id and kind. Documents are JSON files with a `.template`, `.record` or
//! `.composite` extension. Writes go to a temp file in the same directory
//! and are renamed over the target, so a crash never leaves half a document.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component as PathComponent, Path, PathBuf};

use refguard_core::store::{AssetStore, CompositeHandle, CompositeLifecycle, PinnedMembership};
use refguard_core::{
    Asset, AssetId, AssetKind, AssetPath, CompositeDocument, Document, DocumentCategory,
    StoreError,
};

use crate::meta::{self, AssetMeta, PINNED_FILE, SIDECAR_SUFFIX, TEMP_SUFFIX};

#[derive(Debug)]
struct OpenComposite {
    path: AssetPath,
    document: CompositeDocument,
}

pub struct FsStore {
    root: PathBuf,
    open: BTreeMap<CompositeHandle, OpenComposite>,
    next_handle: u64,
}

impl FsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::Rejected(format!(
                "store root {} is not a directory",
                root.display()
            )));
        }
        tracing::debug!(root = %root.display(), "Opened filesystem store");
        Ok(Self {
            root,
            open: BTreeMap::new(),
            next_handle: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // Asset bookkeeping
    // -----------------------------------------------------------------------

    /// Sidecar contents, or `None` when the asset is untracked.
    pub fn meta(&self, path: &AssetPath) -> Result<Option<AssetMeta>, StoreError> {
        let sidecar = self.resolve(&meta::sidecar_of(path))?;
        if !sidecar.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&sidecar)?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                path: meta::sidecar_of(path),
                reason: e.to_string(),
            })
    }

    pub fn asset(&self, path: &AssetPath) -> Result<Asset, StoreError> {
        let meta = self
            .meta(path)?
            .ok_or_else(|| StoreError::AssetNotFound(path.to_string()))?;
        Ok(Asset {
            id: meta.id,
            path: path.clone(),
            kind: meta.kind,
        })
    }

    /// Start tracking a file: write its sidecar with a fresh id. An asset
    /// that already has one keeps it.
    pub fn import(&mut self, path: &AssetPath) -> Result<Asset, StoreError> {
        if !self.resolve(path)?.is_file() {
            return Err(StoreError::AssetNotFound(path.to_string()));
        }
        if let Some(existing) = self.meta(path)? {
            tracing::debug!(path = %path, id = %existing.id, "Asset already tracked");
            return Ok(Asset {
                id: existing.id,
                path: path.clone(),
                kind: existing.kind,
            });
        }

        let meta = AssetMeta {
            id: AssetId::new(uuid::Uuid::new_v4().simple().to_string()),
            kind: meta::kind_for(path),
            modified_at: Some(chrono::Utc::now()),
        };
        self.write_meta(path, &meta)?;
        tracing::info!(path = %path, id = %meta.id, kind = meta.kind.as_str(), "Asset imported");

        Ok(Asset {
            id: meta.id,
            path: path.clone(),
            kind: meta.kind,
        })
    }

    /// Remove an asset file and its sidecar. Any open composite for it is
    /// dropped without saving.
    pub fn delete_asset(&mut self, path: &AssetPath) -> Result<(), StoreError> {
        let file = self.resolve(path)?;
        if !file.is_file() {
            return Err(StoreError::AssetNotFound(path.to_string()));
        }
        self.open.retain(|_, open| &open.path != path);

        fs::remove_file(&file)?;
        let sidecar = self.resolve(&meta::sidecar_of(path))?;
        if sidecar.is_file() {
            fs::remove_file(&sidecar)?;
        }
        tracing::info!(path = %path, "Asset deleted");
        Ok(())
    }

    /// Pinned composites listed in `pinned.json`. A missing file pins
    /// nothing.
    pub fn load_pinned(&self) -> Result<PinnedMembership, StoreError> {
        let file = self.root.join(PINNED_FILE);
        if !file.is_file() {
            return Ok(PinnedMembership::default());
        }
        let text = fs::read_to_string(&file)?;
        let paths: Vec<AssetPath> =
            serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
                path: AssetPath::new(PINNED_FILE),
                reason: e.to_string(),
            })?;
        let pinned = PinnedMembership::new(paths);
        tracing::debug!(count = pinned.len(), "Loaded pinned composites");
        Ok(pinned)
    }

    // -----------------------------------------------------------------------
    // Paths and files
    // -----------------------------------------------------------------------

    /// Map a store path onto the filesystem, refusing anything that would
    /// leave the root.
    fn resolve(&self, path: &AssetPath) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path.as_str());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, PathComponent::Normal(_) | PathComponent::CurDir));
        if path.as_str().is_empty() || escapes {
            return Err(StoreError::Rejected(format!("{path} is outside the store")));
        }
        Ok(self.root.join(relative))
    }

    fn write_atomic(&self, path: &AssetPath, contents: &[u8]) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::Rejected(format!("{path} has no file name")))?;
        let temp = target.with_file_name(format!(".{file_name}{TEMP_SUFFIX}"));

        let mut file = fs::File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    fn write_meta(&self, path: &AssetPath, meta: &AssetMeta) -> Result<(), StoreError> {
        let sidecar = meta::sidecar_of(path);
        let text = serde_json::to_string_pretty(meta).map_err(|e| StoreError::Malformed {
            path: sidecar.clone(),
            reason: e.to_string(),
        })?;
        self.write_atomic(&sidecar, text.as_bytes())
    }

    fn write_document(&self, path: &AssetPath, document: &Document) -> Result<(), StoreError> {
        let expected = meta::category_of(path);
        if expected != Some(document.category()) {
            return Err(StoreError::WrongCategory {
                path: path.clone(),
                expected: expected.unwrap_or(document.category()),
            });
        }
        let text = document.to_raw_text().map_err(|e| StoreError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.write_atomic(path, text.as_bytes())
    }

    /// Every asset file under the root, as store paths, sorted.
    fn walk(&self) -> Result<Vec<AssetPath>, StoreError> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let file_type = entry.file_type()?;
                let full = entry.path();
                if file_type.is_dir() {
                    pending.push(full);
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(SIDECAR_SUFFIX) || name.ends_with(TEMP_SUFFIX) {
                    continue;
                }
                if let Some(path) = self.to_asset_path(&full) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    fn to_asset_path(&self, full: &Path) -> Option<AssetPath> {
        let relative = full.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(AssetPath::new(parts.join("/")))
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

impl AssetStore for FsStore {
    fn find_documents_by_category(
        &self,
        category: DocumentCategory,
    ) -> Result<Vec<AssetPath>, StoreError> {
        Ok(self
            .walk()?
            .into_iter()
            .filter(|path| meta::category_of(path) == Some(category))
            .collect())
    }

    fn load_document_raw_text(&self, path: &AssetPath) -> Result<String, StoreError> {
        let file = self.resolve(path)?;
        if !file.is_file() {
            return Err(StoreError::DocumentNotFound(path.clone()));
        }
        Ok(fs::read_to_string(file)?)
    }

    fn resolve_asset_id(&self, path: &AssetPath) -> Result<AssetId, StoreError> {
        self.meta(path)?
            .map(|meta| meta.id)
            .ok_or_else(|| StoreError::AssetNotFound(path.to_string()))
    }

    fn resolve_asset_kind(&self, id: &AssetId) -> Result<AssetKind, StoreError> {
        for path in self.walk()? {
            match self.meta(&path) {
                Ok(Some(meta)) if &meta.id == id => return Ok(meta.kind),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path, error = %e, "Unreadable sidecar"),
            }
        }
        Err(StoreError::AssetNotFound(id.to_string()))
    }

    fn document_exists(&self, path: &AssetPath) -> bool {
        meta::category_of(path).is_some()
            && self.resolve(path).map(|file| file.is_file()).unwrap_or(false)
    }

    fn load_document(&self, path: &AssetPath) -> Result<Document, StoreError> {
        let text = self.load_document_raw_text(path)?;
        Document::from_raw_text(&text).map_err(|e| StoreError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    fn commit_document(&mut self, path: &AssetPath, document: &Document) -> Result<(), StoreError> {
        if !self.document_exists(path) {
            return Err(StoreError::DocumentNotFound(path.clone()));
        }
        self.write_document(path, document)?;
        tracing::debug!(path = %path, "Document committed");
        Ok(())
    }

    fn delete_document(&mut self, path: &AssetPath) -> Result<(), StoreError> {
        if !self.document_exists(path) {
            return Err(StoreError::DocumentNotFound(path.clone()));
        }
        self.delete_asset(path)
    }

    fn mark_modified(&mut self, path: &AssetPath) -> Result<(), StoreError> {
        let mut meta = self
            .meta(path)?
            .ok_or_else(|| StoreError::AssetNotFound(path.to_string()))?;
        meta.modified_at = Some(chrono::Utc::now());
        self.write_meta(path, &meta)
    }
}

impl CompositeLifecycle for FsStore {
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
        let Document::Composite(document) = self.load_document(path)? else {
            return Err(StoreError::WrongCategory {
                path: path.clone(),
                expected: DocumentCategory::Composite,
            });
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
        tracing::debug!(path = %path, handle = %handle, "Composite opened");
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
        let document = Document::Composite(self.composite(handle)?.clone());
        self.write_document(path, &document)?;
        tracing::debug!(path = %path, handle = %handle, "Composite written");
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
        tracing::debug!(path = %open.path, handle = %handle, "Composite closed");
        Ok(())
    }
}
