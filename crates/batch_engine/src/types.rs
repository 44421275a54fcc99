use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::RequestError;
use crate::results::BatchReport;
use crate::rows::JobRow;

/// Position of a row in the source table (0-based).
pub type RowIndex = usize;

/// Keys inspected, in order, for a human readable failure message.
const MESSAGE_KEYS: &[&str] = &["error_message", "message", "error", "detail"];

/// Response handed back by a request executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub http_status: u16,
    pub payload: Value,
}

impl ApiResponse {
    pub fn new(http_status: u16, payload: Value) -> Self {
        Self {
            http_status,
            payload,
        }
    }

    /// 2xx status and no explicit `"success": false` in the payload.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status)
            && self.payload.get("success") != Some(&Value::Bool(false))
    }

    pub fn failure_message(&self) -> String {
        let detail = MESSAGE_KEYS
            .iter()
            .filter_map(|key| self.payload.get(*key))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|text| !text.is_empty());
        match detail {
            Some(text) => format!("HTTP {}: {}", self.http_status, text),
            None => format!("HTTP {}", self.http_status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    ApiError,
    TransportError,
}

/// One recorded invocation of the request executor for a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub number: u32,
    pub total: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub http_status: Option<u16>,
    pub payload: Value,
    pub error: Option<String>,
}

impl Attempt {
    pub(crate) fn from_result(
        number: u32,
        total: u32,
        started_at: DateTime<Utc>,
        result: Result<ApiResponse, RequestError>,
    ) -> Self {
        let finished_at = Utc::now();
        match result {
            Ok(response) => {
                let success = response.is_success();
                Self {
                    number,
                    total,
                    started_at,
                    finished_at,
                    status: if success {
                        AttemptStatus::Success
                    } else {
                        AttemptStatus::ApiError
                    },
                    http_status: Some(response.http_status),
                    error: (!success).then(|| response.failure_message()),
                    payload: response.payload,
                }
            }
            Err(err) => Self {
                number,
                total,
                started_at,
                finished_at,
                status: if err.is_transport() {
                    AttemptStatus::TransportError
                } else {
                    AttemptStatus::ApiError
                },
                http_status: None,
                payload: Value::Null,
                error: Some(err.to_string()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Success
    }
}

/// A downloadable artifact discovered in a response payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DownloadLink {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    pub link: DownloadLink,
    pub success: bool,
    pub bytes_written: u64,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Cancelled,
    Invalid,
    Crashed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Failed => write!(f, "failed"),
            OutcomeStatus::Cancelled => write!(f, "cancelled"),
            OutcomeStatus::Invalid => write!(f, "invalid"),
            OutcomeStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// The single recorded result for one row, whatever its attempt count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub index: RowIndex,
    pub label: String,
    pub status: OutcomeStatus,
    pub attempts: u32,
    pub final_attempt: Option<Attempt>,
    pub links: Vec<DownloadLink>,
    pub download_dir: Option<PathBuf>,
    pub download_results: Vec<DownloadResult>,
    pub directory_error: Option<String>,
    pub error: Option<String>,
}

impl JobOutcome {
    fn empty(index: RowIndex, label: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            index,
            label: label.into(),
            status,
            attempts: 0,
            final_attempt: None,
            links: Vec::new(),
            download_dir: None,
            download_results: Vec::new(),
            directory_error: None,
            error: None,
        }
    }

    pub fn invalid(row: &JobRow, error: impl fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(row.index(), row.label(), OutcomeStatus::Invalid)
        }
    }

    /// Outcome for a row that was never claimed because the batch was cancelled.
    pub fn not_started(row: &JobRow) -> Self {
        Self {
            error: Some("cancelled before start".to_string()),
            ..Self::empty(row.index(), row.label(), OutcomeStatus::Cancelled)
        }
    }

    pub fn crashed(index: RowIndex, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(index, label, OutcomeStatus::Crashed)
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        self.final_attempt.as_ref().and_then(|a| a.http_status)
    }

    pub fn downloads_ok(&self) -> usize {
        self.download_results.iter().filter(|r| r.success).count()
    }

    pub fn download_errors(&self) -> Vec<String> {
        let mut errors: Vec<String> = self
            .download_results
            .iter()
            .filter_map(|r| {
                r.error
                    .as_ref()
                    .map(|err| format!("{}: {}", r.link.filename, err))
            })
            .collect();
        if let Some(dir_err) = &self.directory_error {
            errors.push(dir_err.clone());
        }
        errors
    }
}

/// Events emitted by [`crate::EngineHandle`] to the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    BatchStarted { total: usize },
    Progress { completed: usize, total: usize },
    RowFinished(Box<JobOutcome>),
    BatchFinished(BatchReport),
}
