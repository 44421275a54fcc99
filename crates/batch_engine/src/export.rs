use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;

use crate::error::PersistError;
use crate::filename::sanitize_identifier;
use crate::persist::AtomicFileWriter;
use crate::results::BatchReport;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn report_filename(module_name: &str) -> String {
    format!("results-{}.json", sanitize_identifier(module_name))
}

/// Writes the ordered result table plus its summary as pretty JSON, replacing
/// any earlier report for the same module.
pub fn write_report(
    output_dir: &Path,
    module_name: &str,
    report: &BatchReport,
) -> Result<PathBuf, ExportError> {
    let document = json!({
        "module": module_name,
        "generated_utc": Utc::now().to_rfc3339(),
        "cancelled": report.cancelled,
        "summary": report.summary(),
        "rows": report.outcomes,
    });
    let content = serde_json::to_vec_pretty(&document)?;
    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    Ok(writer.write(&report_filename(module_name), &content)?)
}
