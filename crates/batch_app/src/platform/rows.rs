use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use batch_engine::RowFields;
use serde_json::Value;

/// Reads a row table from a JSON array of objects. Scalars become their
/// text form, `null` becomes empty, nested values stay as compact JSON.
pub(crate) fn load_table(path: &Path) -> Result<Vec<RowFields>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read rows from {path:?}"))?;
    parse_table(&content).with_context(|| format!("invalid row table in {path:?}"))
}

pub(crate) fn parse_table(content: &str) -> Result<Vec<RowFields>> {
    let value: Value = serde_json::from_str(content)?;
    let Value::Array(items) = value else {
        bail!("expected a JSON array of row objects");
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(key, value)| (key, cell_text(value)))
                .collect()),
            other => bail!("row {} is not an object: {}", index + 1, other),
        })
        .collect()
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => nested.to_string(),
    }
}
