use std::fmt;

use serde::Serialize;

use crate::types::{JobOutcome, OutcomeStatus};

/// Gathers exactly one outcome per row. Only the scheduling task appends.
#[derive(Debug, Default)]
pub struct ResultCollector {
    outcomes: Vec<JobOutcome>,
}

impl ResultCollector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            outcomes: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, outcome: JobOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn contains_row(&self, index: usize) -> bool {
        self.outcomes.iter().any(|o| o.index == index)
    }

    /// Outcomes ordered by source row position.
    pub fn into_table(mut self) -> Vec<JobOutcome> {
        self.outcomes.sort_by_key(|o| o.index);
        self.outcomes
    }
}

/// Everything a finished batch produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.outcomes.len(),
            ..BatchSummary::default()
        };
        for outcome in &self.outcomes {
            match outcome.status {
                OutcomeStatus::Success => summary.succeeded += 1,
                OutcomeStatus::Failed => summary.failed += 1,
                OutcomeStatus::Cancelled => summary.cancelled += 1,
                OutcomeStatus::Invalid => summary.invalid += 1,
                OutcomeStatus::Crashed => summary.crashed += 1,
            }
            summary.downloads += outcome.downloads_ok();
            summary.download_errors += outcome.download_errors().len();
        }
        summary
    }

    pub fn find(&self, label: &str) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.label == label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub invalid: usize,
    pub crashed: usize,
    pub downloads: usize,
    pub download_errors: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows: {} ok, {} failed, {} cancelled, {} invalid, {} crashed; {} files downloaded, {} download errors",
            self.total,
            self.succeeded,
            self.failed,
            self.cancelled,
            self.invalid,
            self.crashed,
            self.downloads,
            self.download_errors
        )
    }
}
