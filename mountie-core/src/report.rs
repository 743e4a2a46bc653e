//! Convergence results and where they get reported.

use mountie_hal::Action;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Outcome of one convergence action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceResult {
    pub action: Action,
    /// Whether the system changed (or, under dry-run, would have changed).
    pub changed: bool,
    pub dry_run: bool,
    pub description: String,
    /// Backend primitives that ran (or would run), in order.
    pub steps: Vec<Action>,
}

impl ConvergenceResult {
    pub fn is_noop(&self) -> bool {
        !self.changed
    }
}

impl fmt::Display for ConvergenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match (self.changed, self.dry_run) {
            (false, _) => "ok",
            (true, false) => "changed",
            (true, true) => "would change",
        };
        write!(f, "[{tag}] {}", self.description)
    }
}

/// Receives every completed convergence result.
pub trait ChangeReporter: Send + Sync {
    fn report(&self, result: &ConvergenceResult);
}

/// Default reporter: changes at info, no-ops at debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ChangeReporter for LogReporter {
    fn report(&self, result: &ConvergenceResult) {
        match (result.changed, result.dry_run) {
            (false, _) => log::debug!("{}", result.description),
            (true, false) => log::info!("{}", result.description),
            (true, true) => log::info!("DRY RUN: would {}", result.description),
        }
    }
}

/// Keeps every result in memory, e.g. for an audit trail.
///
/// Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    results: Arc<Mutex<Vec<ConvergenceResult>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ConvergenceResult> {
        let results = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        results.clone()
    }

    pub fn changed_count(&self) -> usize {
        self.results().iter().filter(|r| r.changed).count()
    }
}

impl ChangeReporter for RecordingReporter {
    fn report(&self, result: &ConvergenceResult) {
        let mut results = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        results.push(result.clone());
    }
}
