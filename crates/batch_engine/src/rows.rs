use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::RowIndex;

/// Ordered string cells of one table row, keyed by column name.
pub type RowFields = IndexMap<String, String>;

const TRUTHY: &[&str] = &["si", "sí", "yes", "y", "1", "true"];

const REDACTED: &str = "***";

/// Names of the glue columns every service table shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSchema {
    pub process_column: String,
    pub retry_column: String,
    pub download_dir_column: String,
    /// Candidates for the row label, first non-empty wins.
    pub label_columns: Vec<String>,
}

impl Default for RowSchema {
    fn default() -> Self {
        Self {
            process_column: "procesar".to_string(),
            retry_column: "retry".to_string(),
            download_dir_column: "ubicacion_descarga".to_string(),
            label_columns: vec![
                "cuit_representado".to_string(),
                "cuit_login".to_string(),
                "cuit".to_string(),
            ],
        }
    }
}

impl RowSchema {
    pub fn is_glue_column(&self, name: &str) -> bool {
        name == self.process_column || name == self.retry_column || name == self.download_dir_column
    }
}

/// Immutable snapshot of one selected row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRow {
    index: RowIndex,
    fields: RowFields,
    should_process: bool,
    retry_count: u32,
    download_override_dir: Option<String>,
    label: String,
}

impl JobRow {
    /// Builds a row snapshot. Column names are trimmed and lower-cased.
    pub fn from_fields(index: RowIndex, fields: &RowFields, schema: &RowSchema) -> Self {
        let fields: RowFields = fields
            .iter()
            .map(|(key, value)| (key.trim().to_lowercase(), value.clone()))
            .collect();

        let should_process = fields
            .get(&schema.process_column)
            .is_some_and(|value| parse_flag(value));
        let retry_count = fields
            .get(&schema.retry_column)
            .map(|value| parse_retry(value))
            .unwrap_or(0);
        let download_override_dir = fields
            .get(&schema.download_dir_column)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        let label = schema
            .label_columns
            .iter()
            .filter_map(|column| fields.get(column))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("row {}", index + 1));

        Self {
            index,
            fields,
            should_process,
            retry_count,
            download_override_dir,
            label,
        }
    }

    pub fn index(&self) -> RowIndex {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn should_process(&self) -> bool {
        self.should_process
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn download_override_dir(&self) -> Option<&str> {
        self.download_override_dir.as_deref()
    }

    pub fn fields(&self) -> &RowFields {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// First required column that is absent or blank.
    pub fn missing_field<'a>(&self, required: &'a [String]) -> Option<&'a str> {
        required
            .iter()
            .find(|column| self.get(column).map_or(true, |value| value.trim().is_empty()))
            .map(String::as_str)
    }

    /// All fields as a JSON object, in column order.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        Value::Object(map)
    }
}

/// Copy of `value` with every object entry named in `keys` masked, at any
/// depth. Key matching ignores ASCII case.
pub fn redact_value(value: &Value, keys: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| {
                    let masked = keys.iter().any(|k| k.eq_ignore_ascii_case(key));
                    let child = if masked {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(child, keys)
                    };
                    (key.clone(), child)
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| redact_value(item, keys)).collect())
        }
        other => other.clone(),
    }
}

/// Accepts the usual spreadsheet spellings of "yes".
pub fn parse_flag(value: &str) -> bool {
    let normalized = value.trim().to_lowercase();
    TRUTHY.contains(&normalized.as_str())
}

/// Retry cells come from spreadsheets, so `"3.0"` counts as 3. Anything
/// unparseable or negative is 0.
pub fn parse_retry(value: &str) -> u32 {
    let trimmed = value.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return u32::try_from(n.max(0)).unwrap_or(u32::MAX);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 => f.trunc().min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

/// Materializes the ordered subset of rows to run.
///
/// When no row carries the process column at all, every row is selected.
pub fn select_rows(table: &[RowFields], schema: &RowSchema) -> Vec<JobRow> {
    let rows: Vec<JobRow> = table
        .iter()
        .enumerate()
        .map(|(index, fields)| JobRow::from_fields(index, fields, schema))
        .collect();

    let has_flag_column = rows
        .iter()
        .any(|row| row.fields.contains_key(&schema.process_column));
    if !has_flag_column {
        return rows
            .into_iter()
            .map(|mut row| {
                row.should_process = true;
                row
            })
            .collect();
    }

    rows.into_iter().filter(JobRow::should_process).collect()
}
