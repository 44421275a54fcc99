//! Batch engine: concurrent row execution, retries, artifact downloads and
//! ordered per-row logging.
mod cancel;
mod config;
mod download;
mod engine;
mod error;
mod export;
mod filename;
mod links;
mod log_block;
mod persist;
mod progress;
mod request;
mod results;
mod retry;
mod rows;
mod scheduler;
mod types;

pub use cancel::CancellationController;
pub use config::{ensure_trailing_slash, EngineConfig, DEFAULT_BASE_URL};
pub use download::{
    ByteStream, DownloadManager, DownloadReport, PreparedDir, ReqwestTransport, Transport,
};
pub use engine::EngineHandle;
pub use error::{
    DirectoryError, DownloadError, EngineError, PersistError, RequestError, RowError,
};
pub use export::{report_filename, write_report, ExportError};
pub use filename::{
    basename_from_url, collision_candidates, ensure_extension, sanitize_identifier,
    COLLISION_TIMESTAMP_FORMAT,
};
pub use links::LinkCollector;
pub use log_block::{
    block_header, LineSink, LogBlock, LogFacadeSink, LogSink, MemorySink, OrderedLogAggregator,
};
pub use persist::{probe_writable_dir, AtomicFileWriter};
pub use progress::{
    ChannelProgressSink, FnProgressSink, ProgressSink, ProgressSnapshot, ProgressTracker,
};
pub use request::{fields_payload, HttpRequestExecutor, PayloadBuilder, RequestExecutor};
pub use results::{BatchReport, BatchSummary, ResultCollector};
pub use retry::RetryExecutor;
pub use rows::{
    parse_flag, parse_retry, redact_value, select_rows, JobRow, RowFields, RowSchema,
};
pub use scheduler::JobScheduler;
pub use types::{
    ApiResponse, Attempt, AttemptStatus, DownloadLink, DownloadResult, EngineEvent, JobOutcome,
    OutcomeStatus, RowIndex,
};
