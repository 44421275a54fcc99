use std::sync::Arc;

use chrono::Utc;
use engine_logging::{engine_debug, engine_warn};

use crate::cancel::CancellationController;
use crate::config::EngineConfig;
use crate::download::DownloadManager;
use crate::links::LinkCollector;
use crate::log_block::LogBlock;
use crate::request::RequestExecutor;
use crate::rows::{redact_value, JobRow};
use crate::types::{Attempt, JobOutcome, OutcomeStatus};

/// Runs the attempt loop for one row, then fetches the artifacts of a
/// successful response.
pub struct RetryExecutor {
    config: Arc<EngineConfig>,
    cancel: CancellationController,
    links: LinkCollector,
    downloads: Arc<DownloadManager>,
}

impl RetryExecutor {
    pub fn new(
        config: Arc<EngineConfig>,
        cancel: CancellationController,
        downloads: Arc<DownloadManager>,
    ) -> Self {
        Self {
            config,
            cancel,
            links: LinkCollector::new(),
            downloads,
        }
    }

    pub async fn attempt(
        &self,
        row: &JobRow,
        executor: &dyn RequestExecutor,
        block: &mut LogBlock<'_>,
    ) -> JobOutcome {
        let total = row.retry_count().max(1);
        let mut final_attempt: Option<Attempt> = None;
        let mut cancelled = false;

        for number in 1..=total {
            if number > 1 {
                if !self.config.retry_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                if self.cancel.is_cancelled() {
                    block.info("Cancellation requested; no further attempts.");
                    cancelled = true;
                    break;
                }
            }

            let body = redact_value(&executor.request_body(row), &self.config.redact_keys);
            block.request(number, total, &body);
            let started_at = Utc::now();
            let result = executor.execute(row).await;
            let attempt = Attempt::from_result(number, total, started_at, result);

            match (&attempt.http_status, &attempt.error) {
                (Some(status), _) => block.response(Some(*status), &attempt.payload),
                (None, Some(err)) => block.error(err),
                (None, None) => {}
            }
            if !attempt.is_success() {
                engine_warn!(
                    task: row.label(),
                    "attempt {}/{} failed: {}",
                    number,
                    total,
                    attempt.error.as_deref().unwrap_or("unknown error")
                );
            }

            let success = attempt.is_success();
            final_attempt = Some(attempt);
            if success {
                break;
            }
        }

        let attempts = final_attempt.as_ref().map_or(0, |a| a.number);
        let mut outcome = JobOutcome {
            index: row.index(),
            label: row.label().to_string(),
            status: OutcomeStatus::Failed,
            attempts,
            final_attempt: None,
            links: Vec::new(),
            download_dir: None,
            download_results: Vec::new(),
            directory_error: None,
            error: None,
        };

        match final_attempt {
            Some(attempt) if attempt.is_success() => {
                outcome.status = OutcomeStatus::Success;
                self.fetch_artifacts(row, &attempt, &mut outcome, block).await;
                outcome.final_attempt = Some(attempt);
            }
            Some(attempt) => {
                outcome.status = if cancelled {
                    OutcomeStatus::Cancelled
                } else {
                    OutcomeStatus::Failed
                };
                outcome.error = attempt.error.clone();
                outcome.final_attempt = Some(attempt);
            }
            None => {
                outcome.status = OutcomeStatus::Cancelled;
                outcome.error = Some("cancelled before the first attempt".to_string());
            }
        }
        outcome
    }

    async fn fetch_artifacts(
        &self,
        row: &JobRow,
        attempt: &Attempt,
        outcome: &mut JobOutcome,
        block: &mut LogBlock<'_>,
    ) {
        let links = self.links.collect(&attempt.payload, &self.config.link_prefix);
        if links.is_empty() {
            engine_debug!(task: row.label(), "no downloadable links in response");
            return;
        }

        let mut sub = block.child("downloads");
        sub.info(&format!("Links found: {}", links.len()));
        let desired = row
            .download_override_dir()
            .or(self.config.download_dir.as_deref())
            .unwrap_or_default();
        let prepared = self
            .downloads
            .prepare_dir(&self.config.module_name, desired, row.label());

        match prepared.into_result() {
            Ok((dir, messages)) => {
                for message in &messages {
                    sub.info(message);
                }
                let report = self.downloads.download(&links, &dir).await;
                for result in &report.results {
                    match (&result.path, &result.error) {
                        (Some(path), _) => sub.info(&format!(
                            "Downloaded {} ({} bytes)",
                            path.display(),
                            result.bytes_written
                        )),
                        (None, Some(err)) => {
                            sub.error(&format!("Download {}: {}", result.link.filename, err))
                        }
                        (None, None) => {}
                    }
                }
                sub.info(&format!(
                    "Downloads completed: {}/{}",
                    report.success_count(),
                    links.len()
                ));
                outcome.download_dir = Some(dir);
                outcome.download_results = report.results;
            }
            Err(err) => {
                for message in &err.messages {
                    sub.error(message);
                }
                sub.error("Downloads skipped for this row.");
                outcome.directory_error = Some(err.to_string());
            }
        }
        sub.end();
        outcome.links = links;
    }
}
