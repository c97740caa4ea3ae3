//! Cascading removal of references to an asset that is about to be deleted.
//!
//! Strategy depends on the asset kind:
//!
//! - type assets: components declaring the class are destroyed; records
//!   declaring it are destroyed by a deferred task;
//! - instance assets: reference fields are nulled, and live instances in
//!   composites are unpacked from the template;
//! - composite assets: fields are nulled in records and templates, but
//!   composites referencing another composite are left alone.
//!
//! Records and templates are committed synchronously, one write per
//! document. Composites are edited in memory and saved later through the
//! scheduler (see [`OPEN_COMPOSITE_SAVE_DELAY`] and
//! [`CLOSED_COMPOSITE_SAVE_DELAY`]).

use std::time::Duration;

use crate::document::{clear_field_references, CompositeDocument, Document, SceneObject};
use crate::error::{CoreError, StoreError};
use crate::scanner::ReferencingDocuments;
use crate::scheduler::{Scheduler, TaskId};
use crate::store::{CompositeHandle, Store};
use crate::types::{Asset, AssetId, AssetKind, AssetPath};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Wait before saving a composite the host already had open. The host may
/// still be working on it, and it stays open afterwards.
pub const OPEN_COMPOSITE_SAVE_DELAY: Duration = Duration::from_secs(5);

/// Wait before saving and closing a composite opened only for cleanup.
pub const CLOSED_COMPOSITE_SAVE_DELAY: Duration = Duration::from_secs(3);

/// Wait before destroying a record whose declared type is being deleted.
pub const RECORD_DESTROY_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Destructive or document-closing work handed to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredStep {
    Save,
    SaveAndClose,
    DestroyRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledStep {
    pub task: TaskId,
    pub path: AssetPath,
    pub step: DeferredStep,
    pub delay: Duration,
}

/// What one cleanup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Records and templates written back during the call.
    pub documents_committed: Vec<AssetPath>,
    /// Composites edited in memory, awaiting a scheduled save.
    pub composites_edited: Vec<AssetPath>,
    pub components_removed: usize,
    pub fields_cleared: usize,
    pub instances_unpacked: usize,
    pub scheduled: Vec<ScheduledStep>,
    /// Documents deliberately left untouched.
    pub skipped: Vec<AssetPath>,
    /// Per-document failures. None of them stopped the pass.
    pub errors: Vec<String>,
}

impl CleanupReport {
    fn record_error(&mut self, error: CoreError) {
        tracing::warn!(error = %error, "Cleanup step failed, continuing");
        self.errors.push(error.to_string());
    }
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Edit<'t> {
    /// Destroy components of the class and clear fields naming the type asset.
    RemoveType {
        class_name: &'t str,
        id: &'t AssetId,
    },
    /// Clear fields naming the asset.
    ClearReferences(&'t AssetId),
    /// Clear fields naming the asset and unpack live instances of it.
    Detach(&'t AssetId),
}

impl Edit<'_> {
    fn target(&self) -> &AssetId {
        match self {
            Self::RemoveType { id, .. } => *id,
            Self::ClearReferences(id) | Self::Detach(id) => *id,
        }
    }
}

fn apply_to_object(root: &mut SceneObject, edit: Edit<'_>, report: &mut CleanupReport) -> usize {
    let mut changes = 0;

    if let Edit::RemoveType { class_name, .. } = edit {
        let removed = root.remove_components_of_type(class_name);
        report.components_removed += removed;
        changes += removed;
    }

    let cleared = root.clear_references_to(edit.target());
    report.fields_cleared += cleared;
    changes += cleared;

    if let Edit::Detach(source) = edit {
        let unpacked = root.unpack_instances_of(source);
        report.instances_unpacked += unpacked;
        changes += unpacked;
    }

    changes
}

fn apply_to_composite(
    composite: &mut CompositeDocument,
    edit: Edit<'_>,
    report: &mut CleanupReport,
) -> usize {
    composite
        .roots
        .iter_mut()
        .map(|root| apply_to_object(root, edit, report))
        .sum()
}

// ---------------------------------------------------------------------------
// Deferred actions
// ---------------------------------------------------------------------------

fn task_error(label: &str, source: StoreError) -> CoreError {
    CoreError::ScheduledTask {
        label: label.to_string(),
        source,
    }
}

fn save_composite<S: Store>(
    store: &mut S,
    handle: CompositeHandle,
    path: &AssetPath,
    label: &str,
) -> Result<(), CoreError> {
    store
        .save_as(handle, path)
        .map_err(|e| task_error(label, e))?;
    store.mark_modified(path).map_err(|e| task_error(label, e))?;
    tracing::info!(path = %path, "Composite saved");
    Ok(())
}

// ---------------------------------------------------------------------------
// ReferenceCleaner
// ---------------------------------------------------------------------------

pub struct ReferenceCleaner<'a, S> {
    store: &'a mut S,
    scheduler: &'a mut Scheduler<S>,
}

impl<'a, S: Store + 'static> ReferenceCleaner<'a, S> {
    pub fn new(store: &'a mut S, scheduler: &'a mut Scheduler<S>) -> Self {
        Self { store, scheduler }
    }

    /// Remove every reference to `target` from `documents`.
    ///
    /// Each document is fully processed before the next one starts. A
    /// document that fails to load, commit or open is recorded in the report
    /// and skipped.
    pub fn cleanup(&mut self, target: &Asset, documents: &ReferencingDocuments) -> CleanupReport {
        let mut report = CleanupReport::default();

        match &target.kind {
            AssetKind::Type { class_name } => {
                let edit = Edit::RemoveType {
                    class_name: class_name.as_str(),
                    id: &target.id,
                };
                for path in &documents.templates {
                    self.edit_document(path, edit, &mut report);
                }
                for path in &documents.records {
                    self.clean_record_of_type(path, class_name, &target.id, &mut report);
                }
                for path in &documents.composites {
                    self.edit_composite(path, edit, &mut report);
                }
            }
            AssetKind::Instance => {
                let edit = Edit::ClearReferences(&target.id);
                for path in documents.records.iter().chain(&documents.templates) {
                    self.edit_document(path, edit, &mut report);
                }
                for path in &documents.composites {
                    self.edit_composite(path, Edit::Detach(&target.id), &mut report);
                }
            }
            AssetKind::Composite => {
                let edit = Edit::ClearReferences(&target.id);
                for path in documents.records.iter().chain(&documents.templates) {
                    self.edit_document(path, edit, &mut report);
                }
                for path in &documents.composites {
                    tracing::warn!(
                        path = %path,
                        target = %target.path,
                        "Composite-to-composite references are not cleaned automatically"
                    );
                    report.skipped.push(path.clone());
                }
            }
        }

        tracing::info!(
            asset = %target.path,
            kind = target.kind.as_str(),
            committed = report.documents_committed.len(),
            composites = report.composites_edited.len(),
            components_removed = report.components_removed,
            fields_cleared = report.fields_cleared,
            instances_unpacked = report.instances_unpacked,
            scheduled = report.scheduled.len(),
            errors = report.errors.len(),
            "Reference cleanup finished"
        );
        report
    }

    /// Load, edit and commit a record or template in one write.
    fn edit_document(&mut self, path: &AssetPath, edit: Edit<'_>, report: &mut CleanupReport) {
        let mut document = match self.store.load_document(path) {
            Ok(document) => document,
            Err(source) => {
                report.record_error(CoreError::ScanIo {
                    path: path.clone(),
                    source,
                });
                return;
            }
        };

        let changes = match &mut document {
            Document::Template(template) => apply_to_object(&mut template.root, edit, report),
            Document::Record(record) => {
                let cleared = clear_field_references(&mut record.fields, edit.target());
                report.fields_cleared += cleared;
                cleared
            }
            Document::Composite(_) => {
                tracing::warn!(path = %path, "Expected a record or template, found a composite");
                report.skipped.push(path.clone());
                return;
            }
        };

        if changes == 0 {
            tracing::debug!(path = %path, "No structural reference found, nothing to commit");
            return;
        }

        match self.store.commit_document(path, &document) {
            Ok(()) => {
                tracing::debug!(path = %path, changes, "Document committed");
                report.documents_committed.push(path.clone());
            }
            Err(source) => report.record_error(CoreError::MutationCommit {
                path: path.clone(),
                source,
            }),
        }
    }

    /// A record declaring the deleted class is destroyed later; any other
    /// record only has its fields cleared.
    fn clean_record_of_type(
        &mut self,
        path: &AssetPath,
        class_name: &str,
        type_id: &AssetId,
        report: &mut CleanupReport,
    ) {
        let declares_class = match self.store.load_document(path) {
            Ok(Document::Record(record)) => record.type_name == class_name,
            Ok(_) => false,
            Err(source) => {
                report.record_error(CoreError::ScanIo {
                    path: path.clone(),
                    source,
                });
                return;
            }
        };

        if !declares_class {
            self.edit_document(path, Edit::ClearReferences(type_id), report);
            return;
        }

        let label = format!("destroy {path}");
        let target = path.clone();
        let class_name = class_name.to_string();
        let task = self
            .scheduler
            .schedule(label.clone(), RECORD_DESTROY_DELAY, move |store: &mut S| {
                if !store.document_exists(&target) {
                    tracing::debug!(path = %target, "Record already gone, nothing to destroy");
                    return Ok(());
                }
                match store.load_document(&target) {
                    Ok(Document::Record(record)) if record.type_name == class_name => {}
                    Ok(_) => {
                        tracing::debug!(
                            path = %target,
                            "Record no longer declares the class, keeping it"
                        );
                        return Ok(());
                    }
                    Err(e) => return Err(task_error(&label, e)),
                }
                store
                    .delete_document(&target)
                    .map_err(|e| task_error(&label, e))?;
                tracing::info!(path = %target, class = %class_name, "Record destroyed");
                Ok(())
            });

        report.scheduled.push(ScheduledStep {
            task,
            path: path.clone(),
            step: DeferredStep::DestroyRecord,
            delay: RECORD_DESTROY_DELAY,
        });
    }

    /// Edit a composite in memory, then defer the save.
    ///
    /// An already open composite is saved after [`OPEN_COMPOSITE_SAVE_DELAY`]
    /// and stays open. A closed one is opened additively and saved and
    /// closed after [`CLOSED_COMPOSITE_SAVE_DELAY`].
    fn edit_composite(&mut self, path: &AssetPath, edit: Edit<'_>, report: &mut CleanupReport) {
        let (handle, was_open) = match self.store.open_handle(path) {
            Some(handle) => (handle, true),
            None => match self.store.open_additive(path) {
                Ok(handle) => (handle, false),
                Err(source) => {
                    report.record_error(CoreError::ScanIo {
                        path: path.clone(),
                        source,
                    });
                    return;
                }
            },
        };

        let changes = match self.store.composite_mut(handle) {
            Ok(composite) => apply_to_composite(composite, edit, report),
            Err(source) => {
                report.record_error(CoreError::ScanIo {
                    path: path.clone(),
                    source,
                });
                return;
            }
        };

        if changes == 0 {
            tracing::debug!(path = %path, "No structural reference in composite");
            if !was_open {
                if let Err(source) = self.store.close(handle, false) {
                    report.record_error(CoreError::Store(source));
                }
            }
            return;
        }

        report.composites_edited.push(path.clone());
        if was_open {
            self.schedule_save(handle, path, report);
        } else {
            self.schedule_save_and_close(handle, path, report);
        }
    }

    fn schedule_save(
        &mut self,
        handle: CompositeHandle,
        path: &AssetPath,
        report: &mut CleanupReport,
    ) {
        let label = format!("save {path}");
        let target = path.clone();
        let task = self
            .scheduler
            .schedule(label.clone(), OPEN_COMPOSITE_SAVE_DELAY, move |store: &mut S| {
                if !store.is_handle_valid(handle) {
                    tracing::debug!(path = %target, "Composite closed before save, skipping");
                    return Ok(());
                }
                save_composite(store, handle, &target, &label)
            });

        report.scheduled.push(ScheduledStep {
            task,
            path: path.clone(),
            step: DeferredStep::Save,
            delay: OPEN_COMPOSITE_SAVE_DELAY,
        });
    }

    fn schedule_save_and_close(
        &mut self,
        handle: CompositeHandle,
        path: &AssetPath,
        report: &mut CleanupReport,
    ) {
        let label = format!("save and close {path}");
        let target = path.clone();
        let task = self
            .scheduler
            .schedule(label.clone(), CLOSED_COMPOSITE_SAVE_DELAY, move |store: &mut S| {
                if !store.is_handle_valid(handle) {
                    tracing::debug!(path = %target, "Composite closed before save, skipping");
                    return Ok(());
                }
                // Close even when the save failed; nothing else holds it open.
                let saved = save_composite(store, handle, &target, &label);
                let closed = store
                    .close(handle, false)
                    .map_err(|e| task_error(&label, e));
                saved.and(closed)
            });

        report.scheduled.push(ScheduledStep {
            task,
            path: path.clone(),
            step: DeferredStep::SaveAndClose,
            delay: CLOSED_COMPOSITE_SAVE_DELAY,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::{Component, FieldValue, RecordDocument, TemplateDocument};
    use crate::scheduler::ManualClock;
    use crate::store::{AssetStore, CompositeLifecycle, MemoryStore};

    fn id(s: &str) -> AssetId {
        AssetId::new(s)
    }

    fn setup() -> (MemoryStore, Scheduler<MemoryStore>, ManualClock) {
        let clock = ManualClock::new();
        let scheduler = Scheduler::new(Arc::new(clock.clone()));
        (MemoryStore::new(), scheduler, clock)
    }

    fn health_type() -> Asset {
        Asset {
            id: id("type-health"),
            path: AssetPath::from("Scripts/Health.type"),
            kind: AssetKind::Type {
                class_name: "Health".into(),
            },
        }
    }

    fn health() -> Component {
        Component::new("Health").with_script(id("type-health"))
    }

    #[test]
    fn type_removal_strips_components_from_templates() {
        let (mut store, mut scheduler, _) = setup();
        let path = AssetPath::from("Prefabs/orc.template");
        store.insert_document(
            path.clone(),
            id("orc"),
            AssetKind::Instance,
            Document::Template(TemplateDocument {
                root: SceneObject::new("orc")
                    .with_component(health())
                    .with_component(Component::new("Mover"))
                    .with_child(SceneObject::new("shield").with_component(health())),
            }),
        );

        let documents = ReferencingDocuments {
            templates: vec![path.clone()],
            ..Default::default()
        };
        let report =
            ReferenceCleaner::new(&mut store, &mut scheduler).cleanup(&health_type(), &documents);

        assert_eq!(report.components_removed, 2);
        assert_eq!(report.documents_committed, vec![path.clone()]);
        assert_matches::assert_matches!(
            store.document(&path),
            Some(Document::Template(t)) if t.root.count_components_of_type("Health") == 0
                && t.root.components.len() == 1
        );
        assert!(scheduler.is_idle());
    }

    #[test]
    fn record_of_deleted_type_is_destroyed_later() {
        let (mut store, mut scheduler, clock) = setup();
        let path = AssetPath::from("Data/boss.record");
        store.insert_document(
            path.clone(),
            id("boss-stats"),
            AssetKind::Instance,
            Document::Record(RecordDocument {
                type_name: "Health".into(),
                script: Some(id("type-health")),
                fields: Default::default(),
            }),
        );

        let documents = ReferencingDocuments {
            records: vec![path.clone()],
            ..Default::default()
        };
        let report =
            ReferenceCleaner::new(&mut store, &mut scheduler).cleanup(&health_type(), &documents);
        assert_eq!(report.scheduled.len(), 1);
        assert_eq!(report.scheduled[0].step, DeferredStep::DestroyRecord);
        assert!(store.document_exists(&path));

        clock.advance(RECORD_DESTROY_DELAY);
        scheduler.tick(&mut store);
        assert!(!store.document_exists(&path));
        assert_eq!(store.deleted(), &[path]);
    }

    #[test]
    fn record_destroy_is_a_no_op_once_the_record_is_gone() {
        let (mut store, mut scheduler, clock) = setup();
        let path = AssetPath::from("Data/boss.record");
        store.insert_document(
            path.clone(),
            id("boss-stats"),
            AssetKind::Instance,
            Document::Record(RecordDocument {
                type_name: "Health".into(),
                script: Some(id("type-health")),
                fields: Default::default(),
            }),
        );
        let documents = ReferencingDocuments {
            records: vec![path.clone()],
            ..Default::default()
        };
        ReferenceCleaner::new(&mut store, &mut scheduler).cleanup(&health_type(), &documents);

        store.delete_document(&path).unwrap();
        clock.advance(Duration::from_secs(2));
        let tick = scheduler.tick(&mut store);
        assert_eq!(tick.fired.len(), 1);
        assert!(tick.failed.is_empty());
        assert_eq!(store.deleted().len(), 1);
    }

    #[test]
    fn record_of_another_type_only_loses_fields() {
        let (mut store, mut scheduler, _) = setup();
        let path = AssetPath::from("Data/config.record");
        store.insert_document(
            path.clone(),
            id("config"),
            AssetKind::Instance,
            Document::Record(RecordDocument {
                type_name: "SpawnConfig".into(),
                script: None,
                fields: [(
                    "behaviour".to_string(),
                    FieldValue::Reference(id("type-health")),
                )]
                .into_iter()
                .collect(),
            }),
        );
        let documents = ReferencingDocuments {
            records: vec![path.clone()],
            ..Default::default()
        };
        let report =
            ReferenceCleaner::new(&mut store, &mut scheduler).cleanup(&health_type(), &documents);

        assert!(report.scheduled.is_empty());
        assert_eq!(report.fields_cleared, 1);
        assert!(store.document_exists(&path));
    }

    #[test]
    fn textual_false_positive_commits_nothing() {
        let (mut store, mut scheduler, _) = setup();
        let path = AssetPath::from("Data/notes.record");
        store.insert_document(
            path.clone(),
            id("notes"),
            AssetKind::Instance,
            Document::Record(RecordDocument {
                type_name: "Notes".into(),
                script: None,
                fields: [("text".to_string(), FieldValue::Text("see gem-42".into()))]
                    .into_iter()
                    .collect(),
            }),
        );
        let target = Asset {
            id: id("gem-42"),
            path: AssetPath::from("Items/gem.template"),
            kind: AssetKind::Instance,
        };
        let documents = ReferencingDocuments {
            records: vec![path.clone()],
            ..Default::default()
        };
        let report = ReferenceCleaner::new(&mut store, &mut scheduler).cleanup(&target, &documents);
        assert!(report.documents_committed.is_empty());
        assert_eq!(store.commit_count(&path), 0);
    }

    #[test]
    fn closed_composite_with_nothing_to_clean_is_closed_again() {
        let (mut store, mut scheduler, _) = setup();
        let path = AssetPath::from("Levels/one.composite");
        store.insert_document(
            path.clone(),
            id("lvl"),
            AssetKind::Composite,
            Document::Composite(CompositeDocument {
                roots: vec![SceneObject::new("camera")],
            }),
        );
        let target = Asset {
            id: id("gem-42"),
            path: AssetPath::from("Items/gem.template"),
            kind: AssetKind::Instance,
        };
        let documents = ReferencingDocuments {
            composites: vec![path.clone()],
            ..Default::default()
        };
        let report = ReferenceCleaner::new(&mut store, &mut scheduler).cleanup(&target, &documents);
        assert!(report.scheduled.is_empty());
        assert!(!store.is_composite_open(&path));
        assert_eq!(store.closes(), &[path]);
    }

    #[test]
    fn composite_targets_leave_composites_untouched() {
        let (mut store, mut scheduler, _) = setup();
        let target = Asset {
            id: id("lvl-2"),
            path: AssetPath::from("Levels/two.composite"),
            kind: AssetKind::Composite,
        };
        let documents = ReferencingDocuments {
            composites: vec![AssetPath::from("Levels/one.composite")],
            ..Default::default()
        };
        let report = ReferenceCleaner::new(&mut store, &mut scheduler).cleanup(&target, &documents);
        assert_eq!(report.skipped, vec![AssetPath::from("Levels/one.composite")]);
        assert!(report.errors.is_empty());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn commit_failure_is_reported_and_next_document_still_cleaned() {
        let (mut store, mut scheduler, _) = setup();
        let locked = AssetPath::from("Data/a.record");
        let fine = AssetPath::from("Data/b.record");
        for path in [&locked, &fine] {
            store.insert_document(
                path.clone(),
                id(path.stem()),
                AssetKind::Instance,
                Document::Record(RecordDocument {
                    type_name: "LootTable".into(),
                    script: None,
                    fields: [("drop".to_string(), FieldValue::Reference(id("gem-42")))]
                        .into_iter()
                        .collect(),
                }),
            );
        }
        store.fail_commits(locked.clone());

        let target = Asset {
            id: id("gem-42"),
            path: AssetPath::from("Items/gem.template"),
            kind: AssetKind::Instance,
        };
        let documents = ReferencingDocuments {
            records: vec![locked.clone(), fine.clone()],
            ..Default::default()
        };
        let report = ReferenceCleaner::new(&mut store, &mut scheduler).cleanup(&target, &documents);

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Data/a.record"));
        assert_eq!(report.documents_committed, vec![fine]);
    }
}
