use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What a charge pays for. File reads and content scans consume the
/// phase read quota; Reasoner calls are counted but bounded by their
/// timeout, not by quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    FileRead,
    ContentScan,
    ReasonerCall,
}

/// Per-phase ceiling: wall clock plus a maximum file-read count.
/// Consumed monotonically, never replenished within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplorationBudget {
    pub wall_clock: Duration,
    pub max_file_reads: u32,
}

impl ExplorationBudget {
    pub const fn new(wall_clock: Duration, max_file_reads: u32) -> Self {
        Self {
            wall_clock,
            max_file_reads,
        }
    }
}

/// One budget per phase plus the session hard ceiling. The ceiling is
/// a safety valve distinct from per-phase budgets: once the cumulative
/// session clock passes it, remaining phases are skipped entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionBudgets {
    pub lightning_scan: ExplorationBudget,
    pub structural_mapping: ExplorationBudget,
    pub query_deep_dive: ExplorationBudget,
    pub synthesis: ExplorationBudget,
    pub session_ceiling: Duration,
}

impl Default for SessionBudgets {
    fn default() -> Self {
        Self {
            lightning_scan: ExplorationBudget::new(Duration::from_secs(2), 8),
            structural_mapping: ExplorationBudget::new(Duration::from_secs(3), 24),
            query_deep_dive: ExplorationBudget::new(Duration::from_secs(5), 48),
            synthesis: ExplorationBudget::new(Duration::from_secs(1), 0),
            session_ceiling: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetRemaining {
    pub file_reads: u32,
    pub wall_clock: Duration,
}

#[derive(Debug)]
struct Window {
    budget: ExplorationBudget,
    started: Instant,
}

/// Phase-scoped spend counter. All methods take `&self` so workers can
/// charge concurrently; reads saturate at zero instead of erroring, so
/// callers must check [`exhausted`](BudgetTracker::exhausted) before
/// issuing further costly operations.
#[derive(Debug)]
pub struct BudgetTracker {
    window: Mutex<Window>,
    reads_left: AtomicU32,
    reasoner_calls: AtomicU32,
    session_started: Instant,
}

impl BudgetTracker {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            window: Mutex::new(Window {
                budget: ExplorationBudget::new(Duration::ZERO, 0),
                started: now,
            }),
            reads_left: AtomicU32::new(0),
            reasoner_calls: AtomicU32::new(0),
            session_started: now,
        }
    }

    /// Reset the phase window. The session clock keeps running.
    pub fn start(&self, budget: ExplorationBudget) {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.budget = budget;
        window.started = Instant::now();
        self.reads_left
            .store(budget.max_file_reads, Ordering::SeqCst);
    }

    pub fn charge(&self, kind: OperationKind, cost: u32) {
        match kind {
            OperationKind::FileRead | OperationKind::ContentScan => {
                let _ = self
                    .reads_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                        Some(left.saturating_sub(cost))
                    });
            }
            OperationKind::ReasonerCall => {
                self.reasoner_calls.fetch_add(cost, Ordering::SeqCst);
            }
        }
    }

    pub fn remaining(&self) -> BudgetRemaining {
        let (budget, started) = {
            let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            (window.budget, window.started)
        };
        BudgetRemaining {
            file_reads: self.reads_left.load(Ordering::SeqCst),
            wall_clock: budget.wall_clock.saturating_sub(started.elapsed()),
        }
    }

    pub fn exhausted(&self) -> bool {
        let remaining = self.remaining();
        if remaining.wall_clock.is_zero() {
            return true;
        }
        // A phase that never had a read quota (synthesis) is not
        // exhausted just because its quota is zero.
        remaining.file_reads == 0 && self.phase_read_budget() > 0
    }

    /// Time spent in the current phase.
    pub fn phase_elapsed(&self) -> Duration {
        let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.started.elapsed()
    }

    /// Cumulative time since the tracker was created, across all phases.
    pub fn session_elapsed(&self) -> Duration {
        self.session_started.elapsed()
    }

    pub fn reasoner_calls(&self) -> u32 {
        self.reasoner_calls.load(Ordering::SeqCst)
    }

    fn phase_read_budget(&self) -> u32 {
        let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        window.budget.max_file_reads
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let tracker = BudgetTracker::new();
        tracker.start(ExplorationBudget::new(Duration::ZERO, 0));
        assert!(tracker.exhausted());
        // Charging past zero saturates instead of going negative.
        tracker.charge(OperationKind::FileRead, 5);
        assert_eq!(tracker.remaining().file_reads, 0);
        assert!(tracker.exhausted());
    }

    #[test]
    fn reads_saturate_at_zero() {
        let tracker = BudgetTracker::new();
        tracker.start(ExplorationBudget::new(Duration::from_secs(60), 3));
        tracker.charge(OperationKind::FileRead, 2);
        assert_eq!(tracker.remaining().file_reads, 1);
        tracker.charge(OperationKind::ContentScan, 10);
        assert_eq!(tracker.remaining().file_reads, 0);
        assert!(tracker.exhausted());
    }

    #[test]
    fn reasoner_calls_do_not_touch_read_quota() {
        let tracker = BudgetTracker::new();
        tracker.start(ExplorationBudget::new(Duration::from_secs(60), 2));
        tracker.charge(OperationKind::ReasonerCall, 1);
        assert_eq!(tracker.remaining().file_reads, 2);
        assert_eq!(tracker.reasoner_calls(), 1);
        assert!(!tracker.exhausted());
    }

    #[test]
    fn start_resets_phase_window_only() {
        let tracker = BudgetTracker::new();
        tracker.start(ExplorationBudget::new(Duration::from_secs(60), 1));
        tracker.charge(OperationKind::FileRead, 1);
        assert!(tracker.exhausted());
        tracker.start(ExplorationBudget::new(Duration::from_secs(60), 4));
        assert!(!tracker.exhausted());
        assert_eq!(tracker.remaining().file_reads, 4);
        // The session clock is cumulative and keeps running across starts.
        assert!(tracker.session_elapsed() >= tracker.phase_elapsed());
    }

    #[test]
    fn wall_clock_only_budget_is_not_exhausted_by_reads() {
        let tracker = BudgetTracker::new();
        // Zero read quota but plenty of wall clock: phases that never
        // read files (synthesis) run on this shape.
        tracker.start(ExplorationBudget::new(Duration::from_secs(60), 0));
        assert!(!tracker.exhausted());
    }
}
