//! The `scan`, `delete` and `import` commands, independent of argument
//! parsing and terminal output.

use std::sync::Arc;

use refguard_core::{
    on_assets_imported, Asset, AssetPath, CompositeLifecycle, ConfirmChoice, Confirmation,
    DeletionGate, DeletionOutcome, DeletionReport, DispatchReport, HookRegistry,
    ReferenceScanner, ScanReport, Scheduler, StoreError, SystemClock,
};
use refguard_store::FsStore;
use tokio_util::sync::CancellationToken;

use crate::config::GuardConfig;
use crate::drain::{drain, DrainOutcome};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Deletion of {path} refused: {reason}")]
    Refused { path: AssetPath, reason: String },

    #[error("Deferred cleanup for {path} did not finish: {outcome:?}")]
    Unfinished {
        path: AssetPath,
        outcome: DrainOutcome,
    },
}

/// How a successful `delete` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    /// The asset is gone. `attempts` is 2 when references had to be
    /// cleaned first.
    Deleted { attempts: usize },
    /// References were cleaned and saved; the asset is still there because
    /// re-issuing is turned off.
    CleanedUp { drain: DrainOutcome },
}

/// Open the store under the configured root, with the configured
/// composites already open as a host would have them.
pub fn open_store(config: &GuardConfig) -> Result<FsStore, StoreError> {
    let mut store = FsStore::open(&config.root)?;
    for path in &config.open_composites {
        let handle = store.open_additive(path)?;
        tracing::info!(path = %path, handle = %handle, "Composite open for session");
    }
    Ok(store)
}

pub fn scan(store: &FsStore, path: &AssetPath) -> Result<(Asset, ScanReport), StoreError> {
    let pinned = store.load_pinned()?;
    let asset = store.asset(path)?;
    let report = ReferenceScanner::new(store, &pinned).scan(&asset);
    Ok((asset, report))
}

pub fn import(
    store: &mut FsStore,
    hooks: &HookRegistry,
    path: &AssetPath,
) -> Result<(Asset, DispatchReport), StoreError> {
    let asset = store.import(path)?;
    let dispatched = on_assets_imported(&*store, hooks, std::slice::from_ref(path));
    Ok((asset, dispatched))
}

/// Run a deletion to completion: gate, deferred cleanup, and, when
/// configured, a second gate pass followed by the actual removal.
pub async fn delete<C: Confirmation>(
    store: &mut FsStore,
    config: &GuardConfig,
    hooks: &HookRegistry,
    confirmation: &mut C,
    path: &AssetPath,
    cancel: CancellationToken,
) -> Result<DeleteResult, CommandError> {
    let pinned = store.load_pinned()?;
    let mut scheduler = Scheduler::new(Arc::new(SystemClock::new()));

    let first = DeletionGate::new(&mut *store, &mut scheduler, &pinned, hooks, confirmation)
        .on_will_delete(path);
    match first.outcome {
        DeletionOutcome::Proceed => {
            store.delete_asset(path)?;
            return Ok(DeleteResult::Deleted { attempts: 1 });
        }
        DeletionOutcome::Fail => return Err(refused(path, &first)),
        DeletionOutcome::Abort => {}
    }

    let drained = drain(
        &mut scheduler,
        &mut *store,
        config.tick,
        config.drain_timeout,
        cancel,
    )
    .await;
    if !drained.is_idle() {
        return Err(CommandError::Unfinished {
            path: path.clone(),
            outcome: drained,
        });
    }
    if !config.reissue {
        return Ok(DeleteResult::CleanedUp { drain: drained });
    }

    // Whatever is still referenced now was left alone on purpose (pinned
    // list, other composites); never clean a second time.
    let mut decline = |_: &str| ConfirmChoice::Decline;
    let second = DeletionGate::new(&mut *store, &mut scheduler, &pinned, hooks, &mut decline)
        .on_will_delete(path);
    match second.outcome {
        DeletionOutcome::Proceed => {
            store.delete_asset(path)?;
            Ok(DeleteResult::Deleted { attempts: 2 })
        }
        _ => Err(CommandError::Refused {
            path: path.clone(),
            reason: "still referenced after cleanup".into(),
        }),
    }
}

fn refused(path: &AssetPath, report: &DeletionReport) -> CommandError {
    CommandError::Refused {
        path: path.clone(),
        reason: report
            .error
            .clone()
            .unwrap_or_else(|| "declined".into()),
    }
}
