use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};

use crate::cancel::CancellationController;
use crate::config::EngineConfig;
use crate::download::{DownloadManager, Transport};
use crate::error::EngineError;
use crate::log_block::{LogSink, OrderedLogAggregator};
use crate::progress::ChannelProgressSink;
use crate::request::RequestExecutor;
use crate::rows::JobRow;
use crate::scheduler::JobScheduler;
use crate::EngineEvent;

enum EngineCommand {
    StartBatch {
        rows: Vec<JobRow>,
        executor: Arc<dyn RequestExecutor>,
        cancel: CancellationController,
    },
}

/// Owns a background thread with its own tokio runtime. Batches run one
/// after another; events come back over a channel the caller polls.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    current: Arc<Mutex<Option<CancellationController>>>,
}

impl EngineHandle {
    pub fn new(
        config: EngineConfig,
        log_sink: Arc<dyn LogSink>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let downloads = Arc::new(DownloadManager::new(config.downloads_root.clone(), transport));
        let logs = OrderedLogAggregator::new(log_sink);
        let scheduler = JobScheduler::new(config, logs, downloads)?
            .with_progress_sink(Arc::new(ChannelProgressSink::new(event_tx.clone())));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        thread::Builder::new()
            .name("batch-engine".to_string())
            .spawn(move || {
                while let Ok(command) = cmd_rx.recv() {
                    runtime.block_on(handle_command(&scheduler, command, &event_tx));
                }
                engine_debug!("engine command channel closed");
            })?;

        Ok(Self {
            cmd_tx,
            event_rx,
            current: Arc::new(Mutex::new(None)),
        })
    }

    /// Queues a batch. A cancel issued after this call applies to it even if
    /// it has not started yet.
    pub fn start_batch(
        &self,
        rows: Vec<JobRow>,
        executor: Arc<dyn RequestExecutor>,
    ) -> Result<(), EngineError> {
        let cancel = CancellationController::new();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(cancel.clone());
        }
        self.cmd_tx
            .send(EngineCommand::StartBatch {
                rows,
                executor,
                cancel,
            })
            .map_err(|_| EngineError::Stopped)
    }

    /// Cancels the most recently queued batch.
    pub fn cancel(&self) {
        match self.current.lock() {
            Ok(current) => match current.as_ref() {
                Some(cancel) => cancel.request_cancel(),
                None => engine_debug!("cancel requested with no batch queued"),
            },
            Err(_) => engine_warn!("cancellation state poisoned"),
        }
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event. Fails once the engine
    /// thread is gone and every event has been drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<EngineEvent>, EngineError> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineError::Stopped),
        }
    }
}

async fn handle_command(
    scheduler: &JobScheduler,
    command: EngineCommand,
    event_tx: &mpsc::Sender<EngineEvent>,
) {
    match command {
        EngineCommand::StartBatch {
            rows,
            executor,
            cancel,
        } => {
            let _ = event_tx.send(EngineEvent::BatchStarted { total: rows.len() });
            let scheduler = scheduler.clone().with_cancellation(cancel);
            let report = scheduler
                .run_with(rows, executor, |outcome| {
                    let _ = event_tx.send(EngineEvent::RowFinished(Box::new(outcome.clone())));
                })
                .await;
            let _ = event_tx.send(EngineEvent::BatchFinished(report));
        }
    }
}
