use crate::{AppState, Effect, Msg, SessionState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::RowsLoaded { total, selected } => {
            // A new table never replaces the one a running batch is using.
            match state.session() {
                SessionState::Running | SessionState::Cancelling => {}
                SessionState::Idle | SessionState::Finished => state.load_rows(total, selected),
            }
            Vec::new()
        }
        Msg::StartClicked => match state.session() {
            SessionState::Idle | SessionState::Finished => {
                if state.selected_rows() == 0 {
                    state.set_notice("No rows are marked for processing.");
                    Vec::new()
                } else {
                    state.start_batch();
                    vec![Effect::StartBatch]
                }
            }
            SessionState::Running | SessionState::Cancelling => Vec::new(),
        },
        Msg::CancelClicked => {
            if state.session() == SessionState::Running {
                state.request_cancel();
                vec![Effect::RequestCancel]
            } else {
                Vec::new()
            }
        }
        Msg::Progress { completed, total } => {
            if matches!(
                state.session(),
                SessionState::Running | SessionState::Cancelling
            ) {
                state.apply_progress(completed, total);
            }
            Vec::new()
        }
        Msg::RowFinished(row) => {
            if state.session() != SessionState::Idle {
                state.apply_row(row);
            }
            Vec::new()
        }
        Msg::BatchFinished { cancelled } => {
            if state.session() != SessionState::Idle {
                state.finish(cancelled);
            }
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}
