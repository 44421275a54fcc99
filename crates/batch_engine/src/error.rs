use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A row that cannot be turned into a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("row '{label}' is missing required field '{field}'")]
    MissingField { label: String, field: String },
}

/// Failure of a single request attempt. Every variant is retryable within the
/// row's attempt budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("connection error: {0}")]
    Transport(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("api error: {0}")]
    Api(String),
}

impl RequestError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RequestError::Transport(_) | RequestError::Timeout(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("http status {status} for {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("timeout downloading {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("could not write {path:?}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Neither the requested nor the fallback download directory is writable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no writable download directory: {}", .messages.join("; "))]
pub struct DirectoryError {
    pub messages: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("directory missing or not writable: {0}")]
    Directory(String),
    #[error("no free filename for {0} after {1} candidates")]
    NameExhausted(String, usize),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid max_workers value {value}: must be at least 1")]
    InvalidWorkers { value: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to start engine runtime: {0}")]
    Runtime(#[from] io::Error),
    #[error("http client setup failed: {0}")]
    Client(String),
    #[error("engine thread is no longer running")]
    Stopped,
}
