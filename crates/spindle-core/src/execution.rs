use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of an execution unit. Forward units run the item's main work;
/// backward units let items publish results back to their predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Final status of one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Succeeded,
    Failed,
    /// Not run because a predecessor failed or was itself skipped.
    Skipped,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Succeeded => write!(f, "succeeded"),
            UnitStatus::Failed => write!(f, "failed"),
            UnitStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one unit, kept in the run summary in plan order.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub item: String,
    pub direction: Direction,
    pub filter_id: String,
    pub status: UnitStatus,
    pub elapsed_ms: u64,
    pub produced: usize,
    pub diagnostics: Vec<String>,
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub outcomes: Vec<UnitOutcome>,
    pub total_elapsed_ms: u64,
}

impl RunSummary {
    /// The run succeeds only when every unit succeeded.
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == UnitStatus::Succeeded)
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let mut ok = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for outcome in &self.outcomes {
            match outcome.status {
                UnitStatus::Succeeded => ok += 1,
                UnitStatus::Failed => failed += 1,
                UnitStatus::Skipped => skipped += 1,
            }
        }
        (ok, failed, skipped)
    }
}
