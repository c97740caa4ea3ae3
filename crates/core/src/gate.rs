//! Deletion gate: the check a host runs right before removing an asset.
//!
//! ```text
//! Start -> Scanning -> NoReferences  -> Proceed
//!                   -> HasReferences -> AwaitConfirmation
//!
//! AwaitConfirmation -> ConfirmedCleanup -> RunCleanup -> Abort
//!                   -> Declined         -> Fail
//! ```
//!
//! The gate never deletes anything itself. `Abort` means references were
//! cleaned and the caller must issue the deletion again once the deferred
//! saves have run.

use std::fmt;

use crate::cleaner::{CleanupReport, ReferenceCleaner};
use crate::document::Document;
use crate::error::CoreError;
use crate::hooks::{DispatchReport, HookRegistry};
use crate::scanner::{ReferenceScanner, ScanReport};
use crate::scheduler::Scheduler;
use crate::store::{PinnedMembership, Store};
use crate::types::{Asset, AssetKind, AssetPath};

// ---------------------------------------------------------------------------
// Outcome and confirmation
// ---------------------------------------------------------------------------

/// Decision handed back to the caller, who owns the actual deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// Nothing references the asset; delete it.
    Proceed,
    /// References were cleaned; do not delete now, re-issue later.
    Abort,
    /// Deletion refused.
    Fail,
}

impl DeletionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::Abort => "abort",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmChoice {
    Cleanup,
    Decline,
}

/// Asks whoever is deleting whether references should be cleaned up.
pub trait Confirmation {
    fn confirm(&mut self, message: &str) -> ConfirmChoice;
}

impl<F: FnMut(&str) -> ConfirmChoice> Confirmation for F {
    fn confirm(&mut self, message: &str) -> ConfirmChoice {
        self(message)
    }
}

/// States visited during one deletion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Start,
    Scanning,
    NoReferences,
    HasReferences,
    AwaitConfirmation,
    ConfirmedCleanup,
    Declined,
    RunCleanup,
    Proceed,
    Abort,
    Fail,
}

/// Everything that happened during one deletion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    pub path: AssetPath,
    pub outcome: DeletionOutcome,
    pub phases: Vec<GatePhase>,
    /// `None` when the asset could not be resolved.
    pub asset: Option<Asset>,
    pub scan: Option<ScanReport>,
    pub cleanup: Option<CleanupReport>,
    pub hooks: DispatchReport,
    pub error: Option<String>,
}

impl DeletionReport {
    fn new(path: &AssetPath) -> Self {
        Self {
            path: path.clone(),
            outcome: DeletionOutcome::Fail,
            phases: vec![GatePhase::Start],
            asset: None,
            scan: None,
            cleanup: None,
            hooks: DispatchReport::default(),
            error: None,
        }
    }

    fn finish(mut self, outcome: DeletionOutcome) -> Self {
        self.phases.push(match outcome {
            DeletionOutcome::Proceed => GatePhase::Proceed,
            DeletionOutcome::Abort => GatePhase::Abort,
            DeletionOutcome::Fail => GatePhase::Fail,
        });
        self.outcome = outcome;
        tracing::info!(path = %self.path, outcome = %outcome, "Deletion gate decided");
        self
    }
}

/// Text shown to the user when references exist.
pub fn confirmation_message(asset: &Asset, scan: &ScanReport) -> String {
    let documents = &scan.documents;
    let mut message = format!(
        "Stopped the deletion of {}: referenced by {} template(s), {} record(s) \
         and {} composite(s).",
        asset.path,
        documents.templates.len(),
        documents.records.len(),
        documents.composites.len(),
    );
    if scan.pinned {
        message.push_str(" It is also on the pinned list and will stay referenced there.");
    }
    message.push_str(" Clean up the references? The deletion must be issued again afterwards.");
    message
}

// ---------------------------------------------------------------------------
// DeletionGate
// ---------------------------------------------------------------------------

pub struct DeletionGate<'a, S, C: ?Sized> {
    store: &'a mut S,
    scheduler: &'a mut Scheduler<S>,
    pinned: &'a PinnedMembership,
    hooks: &'a HookRegistry,
    confirmation: &'a mut C,
}

impl<'a, S, C> DeletionGate<'a, S, C>
where
    S: Store + 'static,
    C: Confirmation + ?Sized,
{
    pub fn new(
        store: &'a mut S,
        scheduler: &'a mut Scheduler<S>,
        pinned: &'a PinnedMembership,
        hooks: &'a HookRegistry,
        confirmation: &'a mut C,
    ) -> Self {
        Self {
            store,
            scheduler,
            pinned,
            hooks,
            confirmation,
        }
    }

    /// Decide whether the asset at `path` may be deleted now.
    pub fn on_will_delete(&mut self, path: &AssetPath) -> DeletionReport {
        let mut report = DeletionReport::new(path);

        let asset = match self.resolve(path) {
            Ok(asset) => asset,
            Err(e) => {
                tracing::error!(
                    path = %path,
                    error = %e,
                    "Cannot resolve asset, refusing deletion"
                );
                report.error = Some(e.to_string());
                return report.finish(DeletionOutcome::Fail);
            }
        };
        report.asset = Some(asset.clone());

        report.phases.push(GatePhase::Scanning);
        let scan = ReferenceScanner::new(&*self.store, self.pinned).scan(&asset);

        if !scan.has_references() {
            report.phases.push(GatePhase::NoReferences);
            report.hooks = self.notify_will_destroy(&asset);
            report.scan = Some(scan);
            return report.finish(DeletionOutcome::Proceed);
        }

        report.phases.push(GatePhase::HasReferences);
        report.phases.push(GatePhase::AwaitConfirmation);
        let message = confirmation_message(&asset, &scan);

        let outcome = match self.confirmation.confirm(&message) {
            ConfirmChoice::Decline => {
                report.phases.push(GatePhase::Declined);
                report.error = Some(CoreError::ConfirmationDeclined(path.clone()).to_string());
                DeletionOutcome::Fail
            }
            ConfirmChoice::Cleanup => {
                report.phases.push(GatePhase::ConfirmedCleanup);
                // Only components the cleaner destroys hear about it now; a
                // template's own tree is notified once the deletion proceeds.
                if let AssetKind::Type { .. } = asset.kind {
                    report.hooks = self.notify_will_destroy(&asset);
                }

                report.phases.push(GatePhase::RunCleanup);
                let cleanup = ReferenceCleaner::new(&mut *self.store, &mut *self.scheduler)
                    .cleanup(&asset, &scan.documents);
                report.cleanup = Some(cleanup);
                DeletionOutcome::Abort
            }
        };

        report.scan = Some(scan);
        report.finish(outcome)
    }

    fn resolve(&self, path: &AssetPath) -> Result<Asset, CoreError> {
        let id = self.store.resolve_asset_id(path)?;
        let kind = self.store.resolve_asset_kind(&id)?;
        Ok(Asset {
            id,
            path: path.clone(),
            kind,
        })
    }

    /// Tell live components they are about to lose their definition.
    ///
    /// For a type asset that is every instance of the class in open
    /// composites; for a template asset it is the template's own tree.
    fn notify_will_destroy(&self, asset: &Asset) -> DispatchReport {
        match &asset.kind {
            AssetKind::Type { class_name } => {
                let mut report = DispatchReport::default();
                for handle in self.store.open_composites() {
                    match self.store.composite(handle) {
                        Ok(composite) => report.merge(
                            self.hooks
                                .notify_will_destroy_type(&composite.roots, class_name),
                        ),
                        Err(e) => {
                            tracing::warn!(
                                handle = %handle,
                                error = %e,
                                "Open composite unavailable for hooks"
                            );
                        }
                    }
                }
                report
            }
            AssetKind::Instance => match self.store.load_document(&asset.path) {
                Ok(Document::Template(template)) => self.hooks.notify_will_destroy(&template.root),
                Ok(_) => DispatchReport::default(),
                Err(e) => {
                    tracing::warn!(
                        path = %asset.path,
                        error = %e,
                        "Template unavailable for hooks"
                    );
                    DispatchReport::default()
                }
            },
            AssetKind::Composite => DispatchReport::default(),
        }
    }
}
