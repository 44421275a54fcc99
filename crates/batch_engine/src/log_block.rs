//! Per-row log blocks that reach the shared sink as one contiguous unit.
//!
//! Each row gets its own [`LogBlock`] from [`OrderedLogAggregator::begin`].
//! Lines are buffered in emission order; a nested block opened with
//! [`LogBlock::child`] lands in its parent's buffer when it ends. When the
//! outermost block ends (or is dropped, e.g. while unwinding from a panic) its
//! whole buffer is handed to the sink under the aggregator's lock, so lines of
//! two rows are never interleaved.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use serde_json::Value;

const SEPARATOR_WIDTH: usize = 60;
const CHILD_INDENT: &str = "  ";

/// Append-only destination of flushed blocks.
pub trait LogSink: Send + Sync {
    fn write_block(&self, lines: &[String]);
}

/// Adapts a line callback into a [`LogSink`].
pub struct LineSink<F>(pub F);

impl<F> LogSink for LineSink<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn write_block(&self, lines: &[String]) {
        for line in lines {
            (self.0)(line);
        }
    }
}

/// Forwards each block to the `log` facade as a single info record, so
/// records logged elsewhere cannot land between its lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacadeSink;

impl LogSink for LogFacadeSink {
    fn write_block(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        engine_logging::engine_info!("\n{}", lines.join("\n"));
    }
}

/// Keeps every flushed line in memory, in flush order.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl LogSink for MemorySink {
    fn write_block(&self, lines: &[String]) {
        lock(&self.lines).extend_from_slice(lines);
    }
}

/// Serializes block flushes onto one sink.
pub struct OrderedLogAggregator {
    sink: Arc<dyn LogSink>,
    flush_lock: Mutex<()>,
}

impl OrderedLogAggregator {
    pub fn new(sink: Arc<dyn LogSink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            flush_lock: Mutex::new(()),
        })
    }

    /// Opens the outermost block for one task, headed by a separator naming it.
    pub fn begin(self: &Arc<Self>, label: impl Into<String>) -> LogBlock<'static> {
        let label = label.into();
        let separator = "-".repeat(SEPARATOR_WIDTH);
        LogBlock {
            lines: vec![separator.clone(), block_header(&label), separator],
            label,
            target: Target::Sink(Arc::clone(self)),
            flushed: false,
        }
    }

    fn flush(&self, lines: &[String]) {
        let _guard = lock(&self.flush_lock);
        self.sink.write_block(lines);
    }
}

/// Header line written at the top of every outermost block.
pub fn block_header(label: &str) -> String {
    format!("ROW: {label}")
}

enum Target<'p> {
    Sink(Arc<OrderedLogAggregator>),
    Parent(&'p mut Vec<String>),
}

/// An ordered buffer of lines owned by one task.
pub struct LogBlock<'p> {
    label: String,
    lines: Vec<String>,
    target: Target<'p>,
    flushed: bool,
}

impl<'p> LogBlock<'p> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Appends a raw line.
    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn info(&mut self, message: &str) {
        self.push_prefixed("INFO: ", message);
    }

    pub fn error(&mut self, message: &str) {
        self.push_prefixed("ERROR: ", message);
    }

    pub fn request(&mut self, attempt: u32, total: u32, payload: &Value) {
        let serialized = serde_json::to_string(payload).unwrap_or_default();
        self.push_prefixed(&format!("REQUEST ({attempt}/{total}): "), &serialized);
    }

    pub fn response(&mut self, http_status: Option<u16>, payload: &Value) {
        let status = http_status.map_or_else(|| "-".to_string(), |s| s.to_string());
        let serialized = serde_json::to_string(payload).unwrap_or_default();
        self.push_prefixed("RESPONSE: ", &format!("HTTP {status} - {serialized}"));
    }

    /// Opens a nested block. Its lines join this block's buffer, indented,
    /// when it ends.
    pub fn child(&mut self, label: impl Into<String>) -> LogBlock<'_> {
        let label = label.into();
        LogBlock {
            lines: vec![format!("[{label}]")],
            label,
            target: Target::Parent(&mut self.lines),
            flushed: false,
        }
    }

    /// Ends the block, handing its buffer to the parent or the sink.
    pub fn end(mut self) {
        self.flush();
    }

    fn push_prefixed(&mut self, prefix: &str, message: &str) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut pushed = false;
        for line in message.lines() {
            self.lines.push(format!("[{stamp}] {prefix}{line}"));
            pushed = true;
        }
        if !pushed {
            self.lines.push(format!("[{stamp}] {}", prefix.trim_end()));
        }
    }

    fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;
        let lines = mem::take(&mut self.lines);
        match &mut self.target {
            Target::Sink(aggregator) => aggregator.flush(&lines),
            Target::Parent(parent) => {
                parent.extend(lines.into_iter().map(|line| format!("{CHILD_INDENT}{line}")))
            }
        }
    }
}

impl Drop for LogBlock<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
