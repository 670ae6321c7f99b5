use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scout_indexer::FileIndex;
use scout_protocol::{ExclusionRuleset, Findings, SessionBudgets};

use crate::controller::PhaseController;
use crate::error::Result;
use crate::reasoner::Reasoner;

/// Cooperative cancellation for one session. Cloning shares the flag;
/// a phase in flight finishes its current budget-bounded unit of work
/// before the controller honors the signal by jumping to synthesis.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Run one full reconnaissance session: build the index, drive the
/// four phases, return the accumulated findings.
///
/// The only failures that surface are an unreadable root and
/// controller reuse; everything else shows up as reduced confidence
/// or sparser findings.
pub async fn run_reconnaissance(
    root: impl AsRef<Path>,
    query: &str,
    rules: &ExclusionRuleset,
    budgets: SessionBudgets,
    reasoner: &dyn Reasoner,
) -> Result<Findings> {
    run_reconnaissance_with_cancel(root, query, rules, budgets, reasoner, CancelHandle::new())
        .await
}

/// Same as [`run_reconnaissance`] with an externally held cancellation
/// handle, for callers that may abort between phases.
pub async fn run_reconnaissance_with_cancel(
    root: impl AsRef<Path>,
    query: &str,
    rules: &ExclusionRuleset,
    budgets: SessionBudgets,
    reasoner: &dyn Reasoner,
    cancel: CancelHandle,
) -> Result<Findings> {
    let index = Arc::new(FileIndex::build(root, rules)?);
    log::debug!(
        "session start: {} files indexed for query '{query}'",
        index.total_files()
    );
    let mut controller = PhaseController::new(query, budgets, cancel);
    controller.run(index, reasoner).await
}
