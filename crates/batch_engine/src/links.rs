use std::collections::HashSet;

use engine_logging::engine_warn;
use serde_json::Value;

use crate::filename::{basename_from_url, ensure_extension};
use crate::types::DownloadLink;

const ARTIFACT_EXTENSIONS: &[&str] = &[".pdf", ".xls", ".xlsx", ".csv", ".zip"];

/// Finds downloadable artifact URLs anywhere inside a response payload.
///
/// A string is a candidate when it starts with `http` and either mentions
/// `minio`, sits under a key that mentions `minio` or ends in `url`/`link`, or
/// its path ends in a known artifact extension. Traversal is depth-first in
/// document order and results are unique by `(url, filename)`.
pub struct LinkCollector {
    max_links: usize,
}

impl Default for LinkCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkCollector {
    /// Collects every candidate link.
    pub fn new() -> Self {
        Self::with_max_links(usize::MAX)
    }

    /// Stops after `max_links` links; dropped candidates are logged.
    pub fn with_max_links(max_links: usize) -> Self {
        Self { max_links }
    }

    pub fn collect(&self, payload: &Value, fallback_prefix: &str) -> Vec<DownloadLink> {
        let mut ctx = CollectContext {
            fallback_prefix,
            max_links: self.max_links,
            links: Vec::new(),
            seen: HashSet::new(),
            truncated: false,
        };
        self.visit(payload, None, &mut ctx);
        if ctx.truncated {
            engine_warn!(
                "link limit of {} reached; remaining links in the response were not collected",
                self.max_links
            );
        }
        ctx.links
    }

    fn visit(&self, node: &Value, key: Option<&str>, ctx: &mut CollectContext<'_>) {
        if ctx.truncated {
            return;
        }
        match node {
            Value::Object(map) => {
                for (child_key, child) in map {
                    self.visit(child, Some(child_key), ctx);
                }
            }
            Value::Array(items) => {
                // Array elements have no key of their own.
                for item in items {
                    self.visit(item, None, ctx);
                }
            }
            Value::String(text) => {
                if !looks_like_download(text, key) {
                    return;
                }
                if ctx.is_full() {
                    ctx.truncated = true;
                } else {
                    ctx.add(text, key);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
}

struct CollectContext<'a> {
    fallback_prefix: &'a str,
    max_links: usize,
    links: Vec<DownloadLink>,
    seen: HashSet<(String, String)>,
    truncated: bool,
}

impl CollectContext<'_> {
    fn is_full(&self) -> bool {
        self.links.len() >= self.max_links
    }

    fn add(&mut self, raw_url: &str, key: Option<&str>) {
        let url = raw_url.trim().to_string();
        let mut filename = basename_from_url(&url);
        if filename.is_empty() {
            let hint = key
                .map(str::trim)
                .filter(|k| k.contains('.'))
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| format!("{}_{}", self.fallback_prefix, self.links.len() + 1));
            filename = ensure_extension(&hint, &url);
        }
        if self.seen.insert((url.clone(), filename.clone())) {
            self.links.push(DownloadLink { url, filename });
        }
    }
}

fn looks_like_download(value: &str, key: Option<&str>) -> bool {
    let lowered = value.trim().to_lowercase();
    if !lowered.starts_with("http") {
        return false;
    }
    if lowered.contains("minio") {
        return true;
    }
    if let Some(key) = key.map(str::to_lowercase) {
        if key.contains("minio") || key.ends_with("url") || key.ends_with("link") {
            return true;
        }
    }
    let path = lowered.split('?').next().unwrap_or_default();
    ARTIFACT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
