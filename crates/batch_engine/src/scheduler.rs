use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use engine_logging::{engine_error, engine_info};
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::cancel::CancellationController;
use crate::config::EngineConfig;
use crate::download::DownloadManager;
use crate::error::{EngineError, RowError};
use crate::log_block::OrderedLogAggregator;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::request::RequestExecutor;
use crate::results::{BatchReport, ResultCollector};
use crate::retry::RetryExecutor;
use crate::rows::JobRow;
use crate::types::{JobOutcome, RowIndex};

/// Dispatches rows onto a pool of at most `max_workers` concurrent tasks.
#[derive(Clone)]
pub struct JobScheduler {
    config: Arc<EngineConfig>,
    logs: Arc<OrderedLogAggregator>,
    downloads: Arc<DownloadManager>,
    progress_sink: Option<Arc<dyn ProgressSink>>,
    cancel: CancellationController,
}

impl JobScheduler {
    pub fn new(
        config: EngineConfig,
        logs: Arc<OrderedLogAggregator>,
        downloads: Arc<DownloadManager>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            logs,
            downloads,
            progress_sink: None,
            cancel: CancellationController::new(),
        })
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationController) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationController {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn run(&self, rows: Vec<JobRow>, executor: Arc<dyn RequestExecutor>) -> BatchReport {
        self.run_with(rows, executor, |_| {}).await
    }

    /// Runs the batch, calling `on_outcome` from the scheduling task as each
    /// row's outcome is recorded.
    pub async fn run_with<F>(
        &self,
        rows: Vec<JobRow>,
        executor: Arc<dyn RequestExecutor>,
        mut on_outcome: F,
    ) -> BatchReport
    where
        F: FnMut(&JobOutcome),
    {
        let total = rows.len();
        let progress = Arc::new(ProgressTracker::new(self.progress_sink.clone()));
        progress.start(total);
        engine_info!(
            "Batch '{}' started: {} rows, {} workers",
            self.config.module_name,
            total,
            self.config.max_workers
        );

        let retry = Arc::new(RetryExecutor::new(
            Arc::clone(&self.config),
            self.cancel.clone(),
            Arc::clone(&self.downloads),
        ));
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut running: JoinSet<JobOutcome> = JoinSet::new();
        let mut claimed: HashMap<RowIndex, String> = HashMap::new();
        let mut collector = ResultCollector::with_capacity(total);
        let mut record = |outcome: JobOutcome, claimed: &mut HashMap<RowIndex, String>| {
            claimed.remove(&outcome.index);
            on_outcome(&outcome);
            collector.append(outcome);
        };

        let mut pending = rows.into_iter();
        while let Some(row) = pending.next() {
            if self.cancel.is_cancelled() {
                self.skip_unclaimed(row, &mut pending, &mut claimed, &mut record);
                break;
            }

            if let Some(field) = row.missing_field(&self.config.required_fields) {
                let err = RowError::MissingField {
                    label: row.label().to_string(),
                    field: field.to_string(),
                };
                let mut block = self.logs.begin(row.label());
                block.error(&err.to_string());
                block.end();
                progress.advance();
                record(JobOutcome::invalid(&row, &err), &mut claimed);
                continue;
            }

            // Wait for a free worker slot, recording rows that finish meanwhile.
            let permit = loop {
                tokio::select! {
                    biased;
                    Some(joined) = running.join_next(), if !running.is_empty() => {
                        if let Some(outcome) = joined_outcome(joined) {
                            record(outcome, &mut claimed);
                        }
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => break permit,
                }
            };
            let Ok(permit) = permit else {
                engine_error!("worker pool closed unexpectedly");
                progress.advance();
                let outcome = JobOutcome::crashed(row.index(), row.label(), "worker pool closed");
                record(outcome, &mut claimed);
                continue;
            };

            // The wait may have been long; check again before claiming the row.
            if self.cancel.is_cancelled() {
                drop(permit);
                self.skip_unclaimed(row, &mut pending, &mut claimed, &mut record);
                break;
            }

            claimed.insert(row.index(), row.label().to_string());
            let retry = Arc::clone(&retry);
            let logs = Arc::clone(&self.logs);
            let executor = Arc::clone(&executor);
            let progress = Arc::clone(&progress);
            running.spawn(async move {
                let _permit = permit;
                let index = row.index();
                let label = row.label().to_string();
                let work = async {
                    let mut block = logs.begin(row.label());
                    let outcome = retry.attempt(&row, executor.as_ref(), &mut block).await;
                    block.info(&format!("Result: {}", outcome.status));
                    block.end();
                    outcome
                };
                let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        engine_error!(task: label, "row task panicked: {}", message);
                        JobOutcome::crashed(index, label, format!("task panicked: {message}"))
                    }
                };
                progress.advance();
                outcome
            });
        }

        while let Some(joined) = running.join_next().await {
            if let Some(outcome) = joined_outcome(joined) {
                record(outcome, &mut claimed);
            }
        }

        // Tasks that vanished without an outcome still get exactly one.
        let mut lost: Vec<(RowIndex, String)> = claimed.drain().collect();
        lost.sort();
        for (index, label) in lost {
            progress.advance();
            record(
                JobOutcome::crashed(index, label, "task ended without a result"),
                &mut HashMap::new(),
            );
        }

        let cancelled = self.cancel.is_cancelled();
        let report = BatchReport {
            outcomes: collector.into_table(),
            cancelled,
        };
        engine_info!("Batch '{}' finished: {}", self.config.module_name, report.summary());
        report
    }

    fn skip_unclaimed<R>(
        &self,
        first: JobRow,
        rest: &mut std::vec::IntoIter<JobRow>,
        claimed: &mut HashMap<RowIndex, String>,
        record: &mut R,
    ) where
        R: FnMut(JobOutcome, &mut HashMap<RowIndex, String>),
    {
        let mut skipped = 0usize;
        for row in std::iter::once(first).chain(rest) {
            record(JobOutcome::not_started(&row), claimed);
            skipped += 1;
        }
        engine_info!("Cancellation requested; {} unclaimed rows skipped", skipped);
    }
}

fn joined_outcome(joined: Result<JobOutcome, JoinError>) -> Option<JobOutcome> {
    match joined {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            engine_error!("row task failed to complete: {}", err);
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
