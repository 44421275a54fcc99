use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Map, Value};

use crate::config::EngineConfig;
use crate::error::{EngineError, RequestError};
use crate::rows::{JobRow, RowSchema};
use crate::types::ApiResponse;

/// Turns one row into one API call. Implemented per service.
#[async_trait::async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, row: &JobRow) -> Result<ApiResponse, RequestError>;

    /// The body `execute` sends for `row`, used for the request log line.
    fn request_body(&self, row: &JobRow) -> Value {
        row.to_json()
    }
}

/// Builds the JSON request body for a row.
pub type PayloadBuilder = Arc<dyn Fn(&JobRow) -> Value + Send + Sync>;

/// Body made of every row field except the shared glue columns.
pub fn fields_payload(schema: RowSchema) -> PayloadBuilder {
    Arc::new(move |row: &JobRow| {
        let body: Map<String, Value> = row
            .fields()
            .iter()
            .filter(|(key, _)| !schema.is_glue_column(key))
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        Value::Object(body)
    })
}

/// POSTs a JSON body per row to one endpoint of the API.
pub struct HttpRequestExecutor {
    client: reqwest::Client,
    url: String,
    payload: PayloadBuilder,
}

impl HttpRequestExecutor {
    pub fn new(config: &EngineConfig, endpoint: &str) -> Result<Self, EngineError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !config.api_key.is_empty() {
            headers.insert("x-api-key", header_value(&config.api_key)?);
        }
        if !config.email.is_empty() {
            headers.insert("email", header_value(&config.email)?);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.post_timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| EngineError::Client(err.to_string()))?;

        Ok(Self {
            client,
            url: config.endpoint_url(endpoint),
            payload: fields_payload(config.schema.clone()),
        })
    }

    pub fn with_payload(mut self, payload: PayloadBuilder) -> Self {
        self.payload = payload;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn header_value(value: &str) -> Result<HeaderValue, EngineError> {
    HeaderValue::from_str(value.trim())
        .map_err(|err| EngineError::InvalidConfig(format!("invalid header value: {err}")))
}

#[async_trait::async_trait]
impl RequestExecutor for HttpRequestExecutor {
    fn request_body(&self, row: &JobRow) -> Value {
        (self.payload)(row)
    }

    async fn execute(&self, row: &JobRow) -> Result<ApiResponse, RequestError> {
        let body = self.request_body(row);
        let bytes =
            serde_json::to_vec(&body).map_err(|err| RequestError::Api(err.to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .body(bytes)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_reqwest_error)?;
        let payload = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "raw_text": text }));
        Ok(ApiResponse::new(status, payload))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        return RequestError::Timeout(err.to_string());
    }
    RequestError::Transport(err.to_string())
}
