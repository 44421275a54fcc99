use crate::{ResultRow, RowStatus, SessionState};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub session: SessionState,
    pub total_rows: usize,
    pub selected_rows: usize,
    pub completed: usize,
    pub progress_total: usize,
    /// Whole percent, 0..=100.
    pub percent: u8,
    pub results: Vec<ResultRow>,
    pub summary: ResultSummary,
    pub cancelled: bool,
    pub notice: Option<String>,
    pub dirty: bool,
}

impl AppViewModel {
    pub fn can_start(&self) -> bool {
        self.selected_rows > 0
            && matches!(self.session, SessionState::Idle | SessionState::Finished)
    }

    pub fn can_cancel(&self) -> bool {
        self.session == SessionState::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub invalid: usize,
    pub crashed: usize,
    pub downloads: usize,
}

impl ResultSummary {
    pub fn from_rows(rows: &[ResultRow]) -> Self {
        let mut summary = Self::default();
        for row in rows {
            match row.status {
                RowStatus::Success => summary.succeeded += 1,
                RowStatus::Failed => summary.failed += 1,
                RowStatus::Cancelled => summary.cancelled += 1,
                RowStatus::Invalid => summary.invalid += 1,
                RowStatus::Crashed => summary.crashed += 1,
            }
            summary.downloads += row.downloads;
        }
        summary
    }
}
