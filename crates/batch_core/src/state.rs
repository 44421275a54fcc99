use crate::view_model::{AppViewModel, ResultSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Success,
    Failed,
    Cancelled,
    Invalid,
    Crashed,
}

/// One line of the results table, as the front-end shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub index: usize,
    pub label: String,
    pub status: RowStatus,
    pub attempts: u32,
    pub http_status: Option<u16>,
    pub downloads: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    session: SessionState,
    total_rows: usize,
    selected_rows: usize,
    completed: usize,
    progress_total: usize,
    results: Vec<ResultRow>,
    cancelled: bool,
    notice: Option<String>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn selected_rows(&self) -> usize {
        self.selected_rows
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            session: self.session,
            total_rows: self.total_rows,
            selected_rows: self.selected_rows,
            completed: self.completed,
            progress_total: self.progress_total,
            percent: percent(self.completed, self.progress_total),
            results: self.results.clone(),
            summary: ResultSummary::from_rows(&self.results),
            cancelled: self.cancelled,
            notice: self.notice.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn load_rows(&mut self, total: usize, selected: usize) {
        self.total_rows = total;
        self.selected_rows = selected.min(total);
        self.results.clear();
        self.completed = 0;
        self.progress_total = 0;
        self.cancelled = false;
        self.session = SessionState::Idle;
        self.notice = None;
        self.mark_dirty();
    }

    pub(crate) fn start_batch(&mut self) {
        self.session = SessionState::Running;
        self.results.clear();
        self.completed = 0;
        self.progress_total = self.selected_rows;
        self.cancelled = false;
        self.notice = None;
        self.mark_dirty();
    }

    pub(crate) fn request_cancel(&mut self) {
        self.session = SessionState::Cancelling;
        self.notice = Some("Cancelling: rows in flight will finish first.".to_string());
        self.mark_dirty();
    }

    pub(crate) fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
        self.mark_dirty();
    }

    /// The bar only moves forward; `completed` is clamped to `total`.
    pub(crate) fn apply_progress(&mut self, completed: usize, total: usize) {
        if total > 0 {
            self.progress_total = total;
        }
        let completed = completed.min(self.progress_total);
        if completed > self.completed {
            self.completed = completed;
            self.mark_dirty();
        }
    }

    pub(crate) fn apply_row(&mut self, row: ResultRow) {
        match self.results.iter_mut().find(|r| r.index == row.index) {
            Some(existing) => *existing = row,
            None => {
                let at = self.results.partition_point(|r| r.index < row.index);
                self.results.insert(at, row);
            }
        }
        self.mark_dirty();
    }

    pub(crate) fn finish(&mut self, cancelled: bool) {
        self.session = SessionState::Finished;
        self.cancelled = cancelled;
        self.notice = Some(if cancelled {
            "Batch cancelled.".to_string()
        } else {
            "Batch finished.".to_string()
        });
        self.mark_dirty();
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = completed.min(total) * 100 / total;
    pct as u8
}
