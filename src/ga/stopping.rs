//! Stopping conditions, checked between generations

use crate::config::StoppingConfiguration;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    MaxSearchTime,
    MaxIterations,
    MaxTestExecutions,
    AllGoalsCovered,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::MaxSearchTime => "search time budget exhausted",
            StopReason::MaxIterations => "iteration limit reached",
            StopReason::MaxTestExecutions => "test execution limit reached",
            StopReason::AllGoalsCovered => "all goals covered",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct StoppingCondition {
    budget: Option<Duration>,
    max_iterations: Option<usize>,
    max_executions: Option<usize>,
    started: Instant,
    cancelled: Arc<AtomicBool>,
}

impl StoppingCondition {
    pub fn new(config: &StoppingConfiguration, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            budget: config.search_time_budget(),
            max_iterations: config.maximum_iterations,
            max_executions: config.maximum_test_executions,
            started: Instant::now(),
            cancelled,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Reason to stop, if any; cancellation wins over every limit
    pub fn check(&self, iterations: usize, executions: usize, open_goals: usize) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }
        if open_goals == 0 {
            return Some(StopReason::AllGoalsCovered);
        }
        if self.budget.map_or(false, |budget| self.elapsed() >= budget) {
            return Some(StopReason::MaxSearchTime);
        }
        if self.max_iterations.map_or(false, |limit| iterations >= limit) {
            return Some(StopReason::MaxIterations);
        }
        if self.max_executions.map_or(false, |limit| executions >= limit) {
            return Some(StopReason::MaxTestExecutions);
        }
        None
    }
}
