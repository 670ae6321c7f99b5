use std::sync::Arc;
use std::time::Instant;

use scout_indexer::FileIndex;
use scout_protocol::{
    BudgetTracker, ExplorationBudget, Findings, SessionBudgets, TerminationReason,
};
use scout_speculation::SpeculativeResolver;

use crate::compress::ContextCompressor;
use crate::error::{EngineError, Result};
use crate::phases::{self, PhaseCtx};
use crate::reasoner::Reasoner;
use crate::session::CancelHandle;

/// The four exploration phases in their fixed order, plus the
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LightningScan,
    StructuralMapping,
    QueryDeepDive,
    Synthesis,
    Done,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LightningScan => "lightning_scan",
            Self::StructuralMapping => "structural_mapping",
            Self::QueryDeepDive => "query_deep_dive",
            Self::Synthesis => "synthesis",
            Self::Done => "done",
        }
    }

    fn next(self) -> Self {
        match self {
            Self::LightningScan => Self::StructuralMapping,
            Self::StructuralMapping => Self::QueryDeepDive,
            Self::QueryDeepDive => Self::Synthesis,
            Self::Synthesis | Self::Done => Self::Done,
        }
    }
}

/// Drives the phases in order against a built index.
///
/// A phase ends when its budget is exhausted or its own stopping
/// condition fires, whichever comes first. Cancellation and the
/// session hard ceiling both route directly to synthesis so the
/// caller always gets a usable, possibly partial, result. `Done` is
/// terminal: running a finished controller again is a caller error.
pub struct PhaseController {
    phase: Phase,
    budgets: SessionBudgets,
    findings: Option<Findings>,
    tracker: Arc<BudgetTracker>,
    cancel: CancelHandle,
}

impl PhaseController {
    pub fn new(query: impl Into<String>, budgets: SessionBudgets, cancel: CancelHandle) -> Self {
        Self {
            phase: Phase::LightningScan,
            budgets,
            findings: Some(Findings::new(query)),
            tracker: Arc::new(BudgetTracker::new()),
            cancel,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run all phases to completion and hand the findings out.
    pub async fn run(
        &mut self,
        index: Arc<FileIndex>,
        reasoner: &dyn Reasoner,
    ) -> Result<Findings> {
        let Some(mut findings) = self.findings.take() else {
            return Err(EngineError::ControllerReuse);
        };
        if self.phase != Phase::LightningScan {
            return Err(EngineError::ControllerReuse);
        }

        let ctx = PhaseCtx {
            index,
            tracker: Arc::clone(&self.tracker),
            resolver: SpeculativeResolver::default(),
            compressor: ContextCompressor::default(),
            cancel: self.cancel.clone(),
            summary_target_chars: 2048,
        };

        while self.phase != Phase::Done {
            // Both escape hatches land on synthesis, never past it:
            // a partial result beats none.
            if self.phase != Phase::Synthesis {
                if self.cancel.is_cancelled() {
                    log::info!("cancelled during {}, jumping to synthesis", self.phase.name());
                    findings.set_termination(TerminationReason::Cancelled);
                    self.phase = Phase::Synthesis;
                }
                if self.tracker.session_elapsed() > self.budgets.session_ceiling {
                    log::warn!(
                        "session ceiling passed during {}, jumping to synthesis",
                        self.phase.name()
                    );
                    findings.set_termination(TerminationReason::SessionCeilingReached);
                    self.phase = Phase::Synthesis;
                }
            }

            let phase = self.phase;
            self.tracker.start(self.phase_budget(phase));
            let started = Instant::now();
            let note = match phase {
                Phase::LightningScan => phases::lightning_scan(&ctx, &mut findings),
                Phase::StructuralMapping => {
                    phases::structural_mapping(&ctx, &mut findings, reasoner).await
                }
                Phase::QueryDeepDive => {
                    phases::query_deep_dive(&ctx, &mut findings, reasoner).await
                }
                Phase::Synthesis => phases::synthesis(&ctx, &mut findings),
                Phase::Done => unreachable!("loop exits before Done executes"),
            };
            findings.record_phase(phase.name(), started.elapsed().as_millis() as u64, note);
            self.phase = phase.next();
        }

        if findings.termination().is_none() {
            findings.set_termination(TerminationReason::Completed);
        }
        Ok(findings)
    }

    fn phase_budget(&self, phase: Phase) -> ExplorationBudget {
        match phase {
            Phase::LightningScan => self.budgets.lightning_scan,
            Phase::StructuralMapping => self.budgets.structural_mapping,
            Phase::QueryDeepDive => self.budgets.query_deep_dive,
            Phase::Synthesis | Phase::Done => self.budgets.synthesis,
        }
    }
}
