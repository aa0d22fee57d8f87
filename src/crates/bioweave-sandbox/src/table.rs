//! Tabular payloads for sandbox upload.
//!
//! Datasets enter the sandbox as raw bytes, text, or a [`Table`] that is
//! serialized by the target path's extension (`csv` or `json`; other
//! extensions are rejected with [`SandboxError::UnsupportedFormat`]).

use crate::error::{Result, SandboxError};
use serde_json::Value;

/// A small column-ordered table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Column names, in order
    pub columns: Vec<String>,
    /// Rows; each row aligns with `columns`
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create a table from columns and rows
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    fn cell_to_csv(value: &Value) -> String {
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
            format!("\"{}\"", raw.replace('"', "\"\""))
        } else {
            raw
        }
    }

    /// Serialize as CSV with a header row
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.columns.join(","));
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(Self::cell_to_csv).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    /// Serialize as a JSON array of row objects
    pub fn to_json(&self) -> Result<String> {
        let records: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (col, cell) in self.columns.iter().zip(row.iter()) {
                    obj.insert(col.clone(), cell.clone());
                }
                Value::Object(obj)
            })
            .collect();
        serde_json::to_string_pretty(&records)
            .map_err(|e| SandboxError::InvalidInput(e.to_string()))
    }
}

/// Data accepted by [`Sandbox::upload`](crate::Sandbox::upload).
#[derive(Debug, Clone)]
pub enum UploadPayload {
    /// Raw bytes written verbatim
    Bytes(Vec<u8>),
    /// UTF-8 text written verbatim
    Text(String),
    /// A table serialized by the target path's extension
    Table(Table),
}

impl UploadPayload {
    /// Serialize the payload for the given target path.
    pub fn into_bytes(self, target_path: &str) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Text(text) => Ok(text.into_bytes()),
            Self::Table(table) => {
                let extension = target_path.rsplit('.').next().unwrap_or("").to_lowercase();
                match extension.as_str() {
                    "csv" => Ok(table.to_csv().into_bytes()),
                    "json" => Ok(table.to_json()?.into_bytes()),
                    other => Err(SandboxError::UnsupportedFormat(format!(
                        "'{}' (use csv or json)",
                        other
                    ))),
                }
            }
        }
    }
}

impl From<Vec<u8>> for UploadPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for UploadPayload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for UploadPayload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Table> for UploadPayload {
    fn from(table: Table) -> Self {
        Self::Table(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::new(
            vec!["gene".to_string(), "score".to_string()],
            vec![
                vec![json!("BRCA1"), json!(0.9)],
                vec![json!("TP53, mutant"), json!(0.4)],
            ],
        )
    }

    #[test]
    fn test_csv_quotes_commas() {
        let csv = sample().to_csv();
        assert!(csv.starts_with("gene,score\n"));
        assert!(csv.contains("\"TP53, mutant\""));
    }

    #[test]
    fn test_json_records() {
        let json_text = sample().to_json().unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["gene"], "BRCA1");
    }

    #[test]
    fn test_parquet_rejected() {
        let err = UploadPayload::Table(sample())
            .into_bytes("/workdir/data.parquet")
            .unwrap_err();
        assert!(matches!(err, SandboxError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_bytes_pass_through() {
        let bytes = UploadPayload::Bytes(vec![1, 2, 3])
            .into_bytes("/workdir/blob.bin")
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
