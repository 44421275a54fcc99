use std::path::PathBuf;
use std::time::Duration;

use crate::error::EngineError;
use crate::rows::RowSchema;

pub const DEFAULT_BASE_URL: &str = "https://api-bots.mrbot.com.ar/";

/// Everything the engine needs, passed explicitly into constructors.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub api_key: String,
    pub email: String,
    pub connect_timeout: Duration,
    /// Timeout of one request attempt.
    pub post_timeout: Duration,
    /// Timeout of one artifact download.
    pub get_timeout: Duration,
    pub max_workers: usize,
    pub downloads_root: PathBuf,
    /// Batch-wide download folder, overridden per row by the schema's column.
    pub download_dir: Option<String>,
    /// Service name; second path component of the fallback download folder.
    pub module_name: String,
    /// Prefix of generated filenames for links without a usable basename.
    pub link_prefix: String,
    pub redact_keys: Vec<String>,
    pub required_fields: Vec<String>,
    pub retry_delay: Duration,
    pub schema: RowSchema,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            email: String::new(),
            connect_timeout: Duration::from_secs(10),
            post_timeout: Duration::from_secs(120),
            get_timeout: Duration::from_secs(60),
            max_workers: 1,
            downloads_root: PathBuf::from("downloads"),
            download_dir: None,
            module_name: "batch".to_string(),
            link_prefix: "file".to_string(),
            redact_keys: vec![
                "clave".to_string(),
                "password".to_string(),
                "api_key".to_string(),
            ],
            required_fields: Vec::new(),
            retry_delay: Duration::ZERO,
            schema: RowSchema::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_workers == 0 {
            return Err(EngineError::InvalidWorkers {
                value: self.max_workers,
            });
        }
        if self.module_name.trim().is_empty() {
            return Err(EngineError::InvalidConfig("module name is empty".into()));
        }
        if self.post_timeout.is_zero() || self.get_timeout.is_zero() {
            return Err(EngineError::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// `base_url` joined with `endpoint`, with exactly one slash between them.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        let base = ensure_trailing_slash(self.base_url.trim());
        format!("{base}{}", endpoint.trim_start_matches('/'))
    }
}

pub fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
