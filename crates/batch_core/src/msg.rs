#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// A row table was read; `selected` rows are flagged for processing.
    RowsLoaded { total: usize, selected: usize },
    /// User asked to run the selected rows.
    StartClicked,
    /// User asked to stop; rows already running drain to completion.
    CancelClicked,
    /// Engine progress for the running batch.
    Progress { completed: usize, total: usize },
    /// Engine recorded the outcome of one row.
    RowFinished(crate::ResultRow),
    /// Engine finished the batch.
    BatchFinished { cancelled: bool },
    /// Render tick to coalesce output.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
