//! Reference discovery.
//!
//! A document references an asset when its serialized text contains the
//! asset's id. That is a superset of real structural references: it never
//! misses one, and the cleaner re-checks structurally before editing.

use crate::error::CoreError;
use crate::store::{AssetStore, PinnedMembership};
use crate::types::{Asset, AssetId, AssetPath, DocumentCategory};

/// Documents that mention a target id, bucketed by category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencingDocuments {
    pub templates: Vec<AssetPath>,
    pub records: Vec<AssetPath>,
    pub composites: Vec<AssetPath>,
}

impl ReferencingDocuments {
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty() && self.records.is_empty() && self.composites.is_empty()
    }

    pub fn total(&self) -> usize {
        self.templates.len() + self.records.len() + self.composites.len()
    }

    pub fn bucket(&self, category: DocumentCategory) -> &[AssetPath] {
        match category {
            DocumentCategory::Template => &self.templates,
            DocumentCategory::Record => &self.records,
            DocumentCategory::Composite => &self.composites,
        }
    }

    fn bucket_mut(&mut self, category: DocumentCategory) -> &mut Vec<AssetPath> {
        match category {
            DocumentCategory::Template => &mut self.templates,
            DocumentCategory::Record => &mut self.records,
            DocumentCategory::Composite => &mut self.composites,
        }
    }
}

/// Everything the gate needs to decide on a deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// The asset's path is on the pinned list.
    pub pinned: bool,
    pub documents: ReferencingDocuments,
}

impl ScanReport {
    pub fn has_references(&self) -> bool {
        self.pinned || !self.documents.is_empty()
    }
}

pub struct ReferenceScanner<'a, S: AssetStore + ?Sized> {
    store: &'a S,
    pinned: &'a PinnedMembership,
}

impl<'a, S: AssetStore + ?Sized> ReferenceScanner<'a, S> {
    pub fn new(store: &'a S, pinned: &'a PinnedMembership) -> Self {
        Self { store, pinned }
    }

    /// Whether anything references the asset. Stops at the first hit.
    pub fn has_references(&self, asset_id: &AssetId, path: &AssetPath) -> bool {
        if self.pinned.contains(path) {
            tracing::debug!(path = %path, "Asset is pinned");
            return true;
        }

        DocumentCategory::SCAN_ORDER.iter().any(|&category| {
            self.candidates(category)
                .iter()
                .any(|candidate| self.mentions(candidate, asset_id))
        })
    }

    /// Every document mentioning `asset_id`, by category.
    pub fn find_referencing_documents(&self, asset_id: &AssetId) -> ReferencingDocuments {
        let mut found = ReferencingDocuments::default();
        for category in DocumentCategory::SCAN_ORDER {
            for candidate in self.candidates(category) {
                if self.mentions(&candidate, asset_id) {
                    found.bucket_mut(category).push(candidate);
                }
            }
        }

        tracing::debug!(
            asset_id = %asset_id,
            templates = found.templates.len(),
            records = found.records.len(),
            composites = found.composites.len(),
            "Reference scan complete"
        );
        found
    }

    /// Pinned check plus full enumeration, in one pass over the corpus.
    pub fn scan(&self, asset: &Asset) -> ScanReport {
        ScanReport {
            pinned: self.pinned.contains(&asset.path),
            documents: self.find_referencing_documents(&asset.id),
        }
    }

    fn candidates(&self, category: DocumentCategory) -> Vec<AssetPath> {
        match self.store.find_documents_by_category(category) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(
                    category = %category,
                    error = %e,
                    "Document search failed, category skipped"
                );
                Vec::new()
            }
        }
    }

    fn mentions(&self, path: &AssetPath, asset_id: &AssetId) -> bool {
        match self.store.load_document_raw_text(path) {
            Ok(text) => text.contains(asset_id.as_str()),
            Err(source) => {
                let e = CoreError::ScanIo {
                    path: path.clone(),
                    source,
                };
                tracing::warn!(error = %e, "Skipping unreadable document");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{
        Component, CompositeDocument, Document, FieldValue, RecordDocument, SceneObject,
        TemplateDocument,
    };
    use crate::store::MemoryStore;
    use crate::types::AssetKind;

    fn record_pointing_at(target: &str) -> Document {
        Document::Record(RecordDocument {
            type_name: "LootTable".into(),
            script: None,
            fields: [("drop".to_string(), FieldValue::Reference(AssetId::new(target)))]
                .into_iter()
                .collect(),
        })
    }

    fn corpus() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_document(
            "Data/loot.record",
            AssetId::new("rec-1"),
            AssetKind::Instance,
            record_pointing_at("gem-42"),
        );
        store.insert_document(
            "Data/other.record",
            AssetId::new("rec-2"),
            AssetKind::Instance,
            record_pointing_at("coin-7"),
        );
        store.insert_document(
            "Prefabs/chest.template",
            AssetId::new("tpl-1"),
            AssetKind::Instance,
            Document::Template(TemplateDocument {
                root: SceneObject::new("chest").with_component(Component::new("Chest").with_field(
                    "content",
                    FieldValue::Reference(AssetId::new("gem-42")),
                )),
            }),
        );
        store.insert_document(
            "Levels/one.composite",
            AssetId::new("lvl-1"),
            AssetKind::Composite,
            Document::Composite(CompositeDocument {
                roots: vec![SceneObject::new("gem").instance_of(AssetId::new("gem-42"))],
            }),
        );
        store.insert_document(
            "Levels/two.composite",
            AssetId::new("lvl-2"),
            AssetKind::Composite,
            Document::Composite(CompositeDocument::default()),
        );
        store
    }

    #[test]
    fn finds_documents_in_every_category() {
        let store = corpus();
        let pinned = PinnedMembership::default();
        let scanner = ReferenceScanner::new(&store, &pinned);

        let found = scanner.find_referencing_documents(&AssetId::new("gem-42"));
        assert_eq!(found.records, vec![AssetPath::from("Data/loot.record")]);
        assert_eq!(found.templates, vec![AssetPath::from("Prefabs/chest.template")]);
        assert_eq!(found.composites, vec![AssetPath::from("Levels/one.composite")]);
        assert_eq!(found.total(), 3);
        assert!(scanner.has_references(
            &AssetId::new("gem-42"),
            &AssetPath::from("Items/gem.template")
        ));
    }

    #[test]
    fn unreferenced_asset_has_no_references() {
        let store = corpus();
        let pinned = PinnedMembership::default();
        let scanner = ReferenceScanner::new(&store, &pinned);

        let id = AssetId::new("nobody-uses-me");
        assert!(!scanner.has_references(&id, &AssetPath::from("Items/unused.template")));
        assert!(scanner.find_referencing_documents(&id).is_empty());
    }

    #[test]
    fn pinned_membership_is_a_hard_reference() {
        let store = corpus();
        let pinned = PinnedMembership::new([AssetPath::from("Levels/two.composite")]);
        let scanner = ReferenceScanner::new(&store, &pinned);

        // Nothing mentions lvl-2, but it is pinned.
        assert!(scanner.has_references(
            &AssetId::new("lvl-2"),
            &AssetPath::from("Levels/two.composite")
        ));

        let report = scanner.scan(&Asset {
            id: AssetId::new("lvl-2"),
            path: AssetPath::from("Levels/two.composite"),
            kind: AssetKind::Composite,
        });
        assert!(report.pinned);
        assert!(report.documents.is_empty());
        assert!(report.has_references());
    }

    #[test]
    fn unreadable_document_is_skipped_not_fatal() {
        let mut store = corpus();
        store.fail_reads("Data/loot.record");
        let pinned = PinnedMembership::default();
        let scanner = ReferenceScanner::new(&store, &pinned);

        let found = scanner.find_referencing_documents(&AssetId::new("gem-42"));
        assert!(found.records.is_empty());
        assert_eq!(found.templates.len(), 1);
        assert_eq!(found.composites.len(), 1);
    }
}
