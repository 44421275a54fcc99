//! Batch core: pure state machine and view-model helpers for the front-end.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use state::{AppState, ResultRow, RowStatus, SessionState};
pub use update::update;
pub use view_model::{AppViewModel, ResultSummary};
