use std::sync::Arc;
use std::time::Duration;

use batch_core::{Effect, Msg, ResultRow, RowStatus};
use batch_engine::{
    EngineError, EngineEvent, EngineHandle, JobOutcome, JobRow, OutcomeStatus, RequestExecutor,
};
use engine_logging::{engine_info, engine_warn};

/// Executes core effects against the engine and turns engine events back
/// into core messages.
pub(crate) struct EffectRunner {
    engine: EngineHandle,
    rows: Vec<JobRow>,
    executor: Arc<dyn RequestExecutor>,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle, rows: Vec<JobRow>, executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            engine,
            rows,
            executor,
        }
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartBatch => {
                    engine_info!("StartBatch rows={}", self.rows.len());
                    if let Err(err) = self
                        .engine
                        .start_batch(self.rows.clone(), Arc::clone(&self.executor))
                    {
                        engine_warn!("Could not start batch: {}", err);
                    }
                }
                Effect::RequestCancel => {
                    engine_info!("RequestCancel");
                    self.engine.cancel();
                }
            }
        }
    }

    pub fn next_event(&self, timeout: Duration) -> Result<Option<EngineEvent>, EngineError> {
        self.engine.recv_timeout(timeout)
    }
}

pub(crate) fn to_msg(event: &EngineEvent) -> Msg {
    match event {
        EngineEvent::BatchStarted { total } => Msg::Progress {
            completed: 0,
            total: *total,
        },
        EngineEvent::Progress { completed, total } => Msg::Progress {
            completed: *completed,
            total: *total,
        },
        EngineEvent::RowFinished(outcome) => Msg::RowFinished(to_result_row(outcome)),
        EngineEvent::BatchFinished(report) => Msg::BatchFinished {
            cancelled: report.cancelled,
        },
    }
}

pub(crate) fn to_result_row(outcome: &JobOutcome) -> ResultRow {
    let mut errors = Vec::new();
    if let Some(err) = &outcome.error {
        errors.push(err.clone());
    }
    errors.extend(outcome.download_errors());

    ResultRow {
        index: outcome.index,
        label: outcome.label.clone(),
        status: map_status(outcome.status),
        attempts: outcome.attempts,
        http_status: outcome.http_status(),
        downloads: outcome.downloads_ok(),
        errors,
    }
}

fn map_status(status: OutcomeStatus) -> RowStatus {
    match status {
        OutcomeStatus::Success => RowStatus::Success,
        OutcomeStatus::Failed => RowStatus::Failed,
        OutcomeStatus::Cancelled => RowStatus::Cancelled,
        OutcomeStatus::Invalid => RowStatus::Invalid,
        OutcomeStatus::Crashed => RowStatus::Crashed,
    }
}
