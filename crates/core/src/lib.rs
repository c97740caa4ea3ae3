//! Deletion guard for assets that other documents reference.
//!
//! The building blocks, in the order a deletion runs through them:
//!
//! - [`DeletionGate`] - decides whether a deletion may go ahead.
//! - [`ReferenceScanner`] - finds every template, record and composite
//!   mentioning the asset, plus pinned-list membership.
//! - [`ReferenceCleaner`] - strips those references, committing records
//!   and templates at once and deferring composite saves.
//! - [`Scheduler`] - runs the deferred saves, closes and record deletions
//!   from a cooperative tick.
//! - [`HookRegistry`] - lets component types react to creation and removal.
//!
//! The engine talks to storage only through the [`store`] traits;
//! [`MemoryStore`] is the in-process implementation.

pub mod cleaner;
pub mod document;
pub mod error;
pub mod gate;
pub mod hooks;
pub mod scanner;
pub mod scheduler;
pub mod store;
pub mod types;

pub use cleaner::{CleanupReport, DeferredStep, ReferenceCleaner, ScheduledStep};
pub use document::{
    Component, CompositeDocument, Document, FieldValue, Fields, RecordDocument, SceneObject,
    TemplateDocument,
};
pub use error::{CoreError, StoreError};
pub use gate::{
    confirmation_message, ConfirmChoice, Confirmation, DeletionGate, DeletionOutcome,
    DeletionReport, GatePhase,
};
pub use hooks::{on_assets_imported, ComponentHooks, DispatchReport, HookError, HookRegistry};
pub use scanner::{ReferenceScanner, ReferencingDocuments, ScanReport};
pub use scheduler::{Clock, ManualClock, Scheduler, SystemClock, TaskId, TickReport};
pub use store::{
    AssetStore, CompositeHandle, CompositeLifecycle, MemoryStore, PinnedMembership, Store,
};
pub use types::{Asset, AssetId, AssetKind, AssetPath, DocumentCategory, Timestamp};
