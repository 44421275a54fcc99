#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_engine::{
    ApiResponse, ByteStream, CancellationController, DownloadError, JobRow, RequestError,
    RequestExecutor, RowFields, RowSchema, Transport,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};

pub fn row(index: usize, pairs: &[(&str, &str)]) -> JobRow {
    let fields: RowFields = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    JobRow::from_fields(index, &fields, &RowSchema::default())
}

pub fn cuit_rows(count: usize) -> Vec<JobRow> {
    (0..count)
        .map(|i| row(i, &[("cuit", &format!("2000000000{i}")), ("procesar", "si")]))
        .collect()
}

pub fn ok(payload: Value) -> Result<ApiResponse, RequestError> {
    Ok(ApiResponse::new(200, payload))
}

pub fn http(status: u16, payload: Value) -> Result<ApiResponse, RequestError> {
    Ok(ApiResponse::new(status, payload))
}

pub fn transport_error() -> Result<ApiResponse, RequestError> {
    Err(RequestError::Transport("connection refused".to_string()))
}

/// Replays queued results per row label; rows without a script succeed.
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<HashMap<String, VecDeque<Result<ApiResponse, RequestError>>>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    panic_on: Option<String>,
    cancel_on_call: Option<CancellationController>,
    body: Option<Value>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(self, label: &str, results: Vec<Result<ApiResponse, RequestError>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(label.to_string(), results.into());
        self
    }

    pub fn panic_on(mut self, label: &str) -> Self {
        self.panic_on = Some(label.to_string());
        self
    }

    pub fn cancel_on_call(mut self, cancel: CancellationController) -> Self {
        self.cancel_on_call = Some(cancel);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, label: &str) -> usize {
        self.calls().iter().filter(|l| *l == label).count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RequestExecutor for ScriptedExecutor {
    fn request_body(&self, row: &JobRow) -> Value {
        self.body.clone().unwrap_or_else(|| row.to_json())
    }

    async fn execute(&self, row: &JobRow) -> Result<ApiResponse, RequestError> {
        self.calls.lock().unwrap().push(row.label().to_string());
        if let Some(cancel) = &self.cancel_on_call {
            cancel.request_cancel();
        }
        if self.panic_on.as_deref() == Some(row.label()) {
            panic!("executor blew up for {}", row.label());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .unwrap()
            .get_mut(row.label())
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| ok(json!({ "success": true })))
    }
}

/// Serves fixed bodies by URL; anything else is a 404.
#[derive(Default)]
pub struct StaticTransport {
    bodies: HashMap<String, Vec<u8>>,
}

impl StaticTransport {
    pub fn new(bodies: &[(&str, &[u8])]) -> Arc<Self> {
        Arc::new(Self {
            bodies: bodies
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_vec()))
                .collect(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for StaticTransport {
    async fn open(&self, url: &str) -> Result<ByteStream, DownloadError> {
        match self.bodies.get(url) {
            Some(body) => {
                let chunk: Result<Bytes, DownloadError> = Ok(Bytes::from(body.clone()));
                Ok(futures_util::stream::iter(vec![chunk]).boxed())
            }
            None => Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
