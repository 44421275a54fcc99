#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Hand the selected rows to the engine.
    StartBatch,
    /// Signal cooperative cancellation to the running batch.
    RequestCancel,
}
