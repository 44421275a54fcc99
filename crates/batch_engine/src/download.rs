use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use engine_logging::{engine_debug, engine_warn};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};

use crate::error::{DirectoryError, DownloadError, PersistError};
use crate::filename::sanitize_identifier;
use crate::persist::{probe_writable_dir, AtomicFileWriter};
use crate::types::{DownloadLink, DownloadResult};

pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

const DEFAULT_FILENAME: &str = "file";

/// Opens a URL as a stream of byte chunks.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<ByteStream, DownloadError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// `read_timeout` bounds each wait for data, not the whole transfer, so a
    /// large file that keeps flowing is never cut off.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|err| DownloadError::Network(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn open(&self, url: &str) -> Result<ByteStream, DownloadError> {
        let parsed = reqwest::Url::parse(url).map_err(|err| DownloadError::InvalidUrl {
            url: url.to_string(),
            message: err.to_string(),
        })?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|err| map_reqwest_error(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let owned_url = url.to_string();
        Ok(response
            .bytes_stream()
            .map_err(move |err| map_reqwest_error(&owned_url, err))
            .boxed())
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> DownloadError {
    if err.is_timeout() {
        return DownloadError::Timeout(url.to_string());
    }
    DownloadError::Network(err.to_string())
}

/// Result of resolving a row's download directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDir {
    pub dir: Option<PathBuf>,
    pub messages: Vec<String>,
}

impl PreparedDir {
    pub fn into_result(self) -> Result<(PathBuf, Vec<String>), DirectoryError> {
        match self.dir {
            Some(dir) => Ok((dir, self.messages)),
            None => Err(DirectoryError {
                messages: self.messages,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub results: Vec<DownloadResult>,
}

impl DownloadReport {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|r| {
                r.error
                    .as_ref()
                    .map(|err| format!("{}: {}", r.link.filename, err))
            })
            .collect()
    }
}

/// Resolves destination directories and streams links into them without
/// overwriting anything already on disk.
pub struct DownloadManager {
    downloads_root: PathBuf,
    transport: Arc<dyn Transport>,
}

impl DownloadManager {
    pub fn new(downloads_root: impl Into<PathBuf>, transport: Arc<dyn Transport>) -> Self {
        Self {
            downloads_root: downloads_root.into(),
            transport,
        }
    }

    /// Directory used when no requested path is writable:
    /// `<downloads_root>/<module_name>/<sanitized identifier>`.
    pub fn default_dir(&self, module_name: &str, identifier: &str) -> PathBuf {
        self.downloads_root
            .join(module_name)
            .join(sanitize_identifier(identifier))
    }

    pub fn prepare_dir(&self, module_name: &str, desired_path: &str, identifier: &str) -> PreparedDir {
        let mut messages = Vec::new();
        let desired = desired_path.trim();
        if !desired.is_empty() {
            let target = PathBuf::from(desired);
            match probe_writable_dir(&target) {
                Ok(()) => {
                    return PreparedDir {
                        dir: Some(target),
                        messages,
                    }
                }
                Err(err) => {
                    engine_warn!("Requested download dir {:?} unusable: {}", target, err);
                    messages.push(format!(
                        "Could not use requested folder '{desired}' ({err}); trying the default location."
                    ));
                }
            }
        }

        let fallback = self.default_dir(module_name, identifier);
        match probe_writable_dir(&fallback) {
            Ok(()) => {
                messages.push(format!("Using default folder: {}", fallback.display()));
                PreparedDir {
                    dir: Some(fallback),
                    messages,
                }
            }
            Err(err) => {
                messages.push(format!(
                    "Could not prepare default folder '{}' ({err}).",
                    fallback.display()
                ));
                PreparedDir {
                    dir: None,
                    messages,
                }
            }
        }
    }

    /// Download every link into `dir`. A failed link is recorded and the
    /// remaining links still run.
    pub async fn download(&self, links: &[DownloadLink], dir: &Path) -> DownloadReport {
        let mut results = Vec::with_capacity(links.len());
        for link in links {
            let result = match self.download_one(link, dir).await {
                Ok((path, bytes_written)) => DownloadResult {
                    link: link.clone(),
                    success: true,
                    bytes_written,
                    path: Some(path),
                    error: None,
                },
                Err(err) => DownloadResult {
                    link: link.clone(),
                    success: false,
                    bytes_written: 0,
                    path: None,
                    error: Some(err.to_string()),
                },
            };
            results.push(result);
        }
        DownloadReport { results }
    }

    async fn download_one(&self, link: &DownloadLink, dir: &Path) -> Result<(PathBuf, u64), DownloadError> {
        let url = link.url.trim();
        if url.is_empty() {
            return Err(DownloadError::InvalidUrl {
                url: String::new(),
                message: "empty url".into(),
            });
        }
        let filename = match link.filename.trim() {
            "" => DEFAULT_FILENAME,
            name => name,
        };

        let writer = AtomicFileWriter::new(dir.to_path_buf());
        let write_err = |err: PersistError| DownloadError::Write {
            path: dir.join(filename),
            message: err.to_string(),
        };
        let io_err = |err: std::io::Error| write_err(PersistError::Io(err));

        let mut stream = self.transport.open(url).await?;
        // Dropping the staging file on any error removes the partial download.
        let mut staged = writer.staging_file().map_err(write_err)?;
        let mut bytes_written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            staged.write_all(&chunk).map_err(io_err)?;
            bytes_written += chunk.len() as u64;
        }

        let path = writer.persist_new(staged, filename).map_err(write_err)?;
        engine_debug!("Downloaded {} ({} bytes) to {:?}", url, bytes_written, path);
        Ok((path, bytes_written))
    }
}
