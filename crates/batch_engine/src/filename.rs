use std::path::Path;

use chrono::{DateTime, Local};
use url::Url;

/// Timestamp inserted before the extension when a filename is already taken.
pub const COLLISION_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H_%M_%S";

const FALLBACK_IDENTIFIER: &str = "unknown";

/// Directory-safe identifier: anything outside `[0-9A-Za-z._-]` becomes `_`,
/// leading/trailing underscores are dropped.
pub fn sanitize_identifier(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_IDENTIFIER.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Percent-decoded basename of the URL path, empty when the path ends in `/`.
pub fn basename_from_url(url: &str) -> String {
    let path = url_path(url);
    let last = path.rsplit('/').next().unwrap_or_default();
    let decoded = urlencoding::decode(last)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| last.to_string());
    // A decoded `%2F` must not smuggle a directory separator into the name.
    decoded.replace(['/', '\\'], "_").trim().to_string()
}

/// Extension of the URL path's last segment, including the dot.
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = url_path(url);
    let last = path.rsplit('/').next()?;
    Path::new(last)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
}

/// Appends the URL's extension to names that have none.
pub fn ensure_extension(name: &str, url: &str) -> String {
    if name.contains('.') {
        return name.to_string();
    }
    match extension_from_url(url) {
        Some(ext) => format!("{name}{ext}"),
        None => name.to_string(),
    }
}

fn url_path(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => {
            let without_query = url.split(['?', '#']).next().unwrap_or_default();
            let without_scheme = without_query
                .split_once("://")
                .map(|(_, rest)| rest)
                .unwrap_or(without_query);
            match without_scheme.find('/') {
                Some(pos) => without_scheme[pos..].to_string(),
                None => String::new(),
            }
        }
    }
}

/// Candidate names for `filename` in collision order: the name itself, then
/// `<base>_<timestamp><ext>`, then `<base>_<timestamp>_<n><ext>` for n = 1, 2, ...
pub fn collision_candidates(
    filename: &str,
    now: DateTime<Local>,
) -> impl Iterator<Item = String> {
    let (base, ext) = split_extension(filename);
    let stamp = now.format(COLLISION_TIMESTAMP_FORMAT).to_string();
    let original = filename.to_string();
    let stamped = format!("{base}_{stamp}{ext}");
    let counted = (1u64..).map(move |n| format!("{base}_{stamp}_{n}{ext}"));
    std::iter::once(original)
        .chain(std::iter::once(stamped))
        .chain(counted)
}

fn split_extension(filename: &str) -> (String, String) {
    let path = Path::new(filename);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|s| s.to_str()),
    ) {
        (Some(stem), Some(ext)) => (stem.to_string(), format!(".{ext}")),
        _ => (filename.to_string(), String::new()),
    }
}
