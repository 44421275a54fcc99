use std::sync::{mpsc, Arc, Mutex};

use crate::types::EngineEvent;

/// Receives every progress change, in order.
pub trait ProgressSink: Send + Sync {
    fn update(&self, completed: usize, total: usize);
}

/// Adapts a callback into a [`ProgressSink`].
pub struct FnProgressSink<F>(pub F);

impl<F> ProgressSink for FnProgressSink<F>
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn update(&self, completed: usize, total: usize) {
        (self.0)(completed, total);
    }
}

/// Forwards progress to the engine's event channel.
pub struct ChannelProgressSink {
    tx: Mutex<mpsc::Sender<EngineEvent>>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn update(&self, completed: usize, total: usize) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(EngineEvent::Progress { completed, total });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    snapshot: ProgressSnapshot,
    started: bool,
}

/// Completed/total counter shared by the workers of one batch.
///
/// `total` is fixed by the first [`ProgressTracker::start`]; `completed` never
/// decreases and never exceeds `total`. The sink is called while the state lock
/// is held, so it observes the same monotonic sequence.
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ProgressTracker {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            state: Mutex::new(ProgressState::default()),
            sink,
        }
    }

    /// Fixes `total` and reports `0/total`. Later calls are ignored and return false.
    pub fn start(&self, total: usize) -> bool {
        let mut state = self.lock();
        if state.started {
            return false;
        }
        state.started = true;
        state.snapshot = ProgressSnapshot {
            completed: 0,
            total,
        };
        self.notify(state.snapshot);
        true
    }

    /// Raises `completed` to `completed`, clamped to `total`. Lower values are ignored.
    pub fn set(&self, completed: usize) -> ProgressSnapshot {
        let mut state = self.lock();
        let clamped = completed.min(state.snapshot.total);
        if clamped > state.snapshot.completed {
            state.snapshot.completed = clamped;
            self.notify(state.snapshot);
        }
        state.snapshot
    }

    pub fn advance(&self) -> ProgressSnapshot {
        let mut state = self.lock();
        if state.snapshot.completed < state.snapshot.total {
            state.snapshot.completed += 1;
            self.notify(state.snapshot);
        }
        state.snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot
    }

    fn notify(&self, snapshot: ProgressSnapshot) {
        if let Some(sink) = &self.sink {
            sink.update(snapshot.completed, snapshot.total);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
