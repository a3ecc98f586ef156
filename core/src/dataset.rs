//! dataset.rs
//! Typed tabular rows with a schema fixed once per batch.
//!
//! Source rows are JSON objects (or positional arrays). The first row fixes
//! the column list; the storage side only ever sees positional `col1..colN`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ShapePolicy;
use crate::constants::{MAX_COLUMNS, ROW_IDENTIFIER, ROW_IDENTIFIER_ALIAS};
use crate::types::PipelineError;

/// Storage column name for a zero-based position.
#[inline]
pub fn storage_column(index: usize) -> String {
    format!("col{}", index + 1)
}

/// Zero-based position of a `colN` storage column, if `name` is one.
pub fn parse_storage_column(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("col")?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: usize = digits.parse().ok()?;
    (1..=MAX_COLUMNS).contains(&n).then(|| n - 1)
}

fn is_identifier(key: &str) -> bool {
    let mut bytes = key.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Label for a source key: numeric or non-identifier keys become `col{idx+1}`.
pub fn normalize_key(index: usize, key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.parse::<f64>().is_ok() || !is_identifier(trimmed) {
        storage_column(index)
    } else {
        trimmed.to_string()
    }
}

/// Make labels unique. Names taken from the source are settled first, so a
/// positional `colN` that clashes with one gets the `_2`, `_3`.. suffix.
pub fn unique_labels(mut labels: Vec<String>, positional: &[bool]) -> Vec<String> {
    let is_positional = |i: usize| positional.get(i).copied().unwrap_or(false);
    let order: Vec<usize> = (0..labels.len())
        .filter(|&i| !is_positional(i))
        .chain((0..labels.len()).filter(|&i| is_positional(i)))
        .collect();

    let mut used: HashSet<String> = HashSet::with_capacity(labels.len());
    for i in order {
        if used.contains(&labels[i]) {
            let base = labels[i].clone();
            let renamed = (2..)
                .map(|n| format!("{base}_{n}"))
                .find(|candidate| !used.contains(candidate))
                .unwrap_or(base);
            log::warn!("[DATASET] label '{}' at column {} clashes, using '{}'", labels[i], i + 1, renamed);
            labels[i] = renamed;
        }
        used.insert(labels[i].clone());
    }
    labels
}

fn is_row_identifier(key: &str) -> bool {
    key == ROW_IDENTIFIER || key == ROW_IDENTIFIER_ALIAS
}

/// Stringify a JSON cell: strings as-is, scalars via display, null as "".
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Column list of a batch, in source order, identifier excluded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Source keys as they appeared in the first row.
    pub source_keys: Vec<String>,
    /// Normalized labels, one per source key.
    pub labels: Vec<String>,
}

impl Schema {
    pub fn from_keys<I, S>(keys: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source_keys: Vec<String> = keys
            .into_iter()
            .map(Into::into)
            .filter(|k| !is_row_identifier(k))
            .collect();
        if source_keys.len() > MAX_COLUMNS {
            return Err(PipelineError::parse(format!(
                "{} columns exceed the {} column limit",
                source_keys.len(),
                MAX_COLUMNS
            )));
        }
        let labels: Vec<String> = source_keys
            .iter()
            .enumerate()
            .map(|(i, k)| normalize_key(i, k))
            .collect();
        let positional: Vec<bool> = labels
            .iter()
            .zip(&source_keys)
            .map(|(label, key)| label != key.trim())
            .collect();
        Ok(Self {
            labels: unique_labels(labels, &positional),
            source_keys,
        })
    }

    /// `col1..colN` labels for a width with no source names (merged rows).
    pub fn positional(width: usize) -> Self {
        let labels: Vec<String> = (0..width).map(storage_column).collect();
        Self {
            source_keys: labels.clone(),
            labels,
        }
    }

    pub fn width(&self) -> usize {
        self.source_keys.len()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.source_keys.iter().position(|k| k == key)
    }
}

/// Input dataset: schema plus row-major string cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub schema: Schema,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(schema: Schema, rows: Vec<Vec<String>>) -> Result<Self, PipelineError> {
        let width = schema.width();
        if let Some((i, _)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(PipelineError::parse(format!("row {i} has wrong width (schema has {width})")));
        }
        Ok(Self { schema, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse a JSON document holding an array of row objects or row arrays.
    pub fn from_json_slice(bytes: &[u8], policy: ShapePolicy) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_slice(bytes)?;
        match value {
            Value::Array(rows) => Self::from_json_rows(rows, policy),
            _ => Err(PipelineError::parse("expected a JSON array of rows")),
        }
    }

    pub fn from_json_rows(rows: Vec<Value>, policy: ShapePolicy) -> Result<Self, PipelineError> {
        let Some(first) = rows.first() else {
            return Ok(Self::default());
        };
        let schema = match first {
            Value::Object(map) => Schema::from_keys(map.keys().cloned())?,
            Value::Array(cells) => Schema::from_keys((1..=cells.len()).map(|i| i.to_string()))?,
            _ => return Err(PipelineError::parse("row 0 is neither an object nor an array")),
        };

        let width = schema.width();
        let mut out = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let cells = match row {
                Value::Object(map) => {
                    let mut cells = vec![String::new(); width];
                    let mut seen = 0usize;
                    for (key, value) in map {
                        if is_row_identifier(key) {
                            continue;
                        }
                        match schema.position(key) {
                            Some(pos) => {
                                cells[pos] = stringify(value);
                                seen += 1;
                            }
                            None if policy == ShapePolicy::Reject => {
                                return Err(PipelineError::parse(format!("row {i}: unknown column '{key}'")));
                            }
                            None => log::warn!("[DATASET] row {}: dropping unknown column '{}'", i, key),
                        }
                    }
                    if seen < width && policy == ShapePolicy::Reject {
                        return Err(PipelineError::parse(format!(
                            "row {i}: {} of {width} columns missing",
                            width - seen
                        )));
                    }
                    cells
                }
                Value::Array(values) => {
                    if values.len() != width && policy == ShapePolicy::Reject {
                        return Err(PipelineError::parse(format!(
                            "row {i}: {} cells, schema has {width}",
                            values.len()
                        )));
                    }
                    if values.len() > width {
                        log::warn!("[DATASET] row {}: dropping {} extra cells", i, values.len() - width);
                    }
                    let mut cells: Vec<String> = values.iter().take(width).map(stringify).collect();
                    cells.resize(width, String::new());
                    cells
                }
                _ => return Err(PipelineError::parse(format!("row {i} is neither an object nor an array"))),
            };
            out.push(cells);
        }

        Ok(Self { schema, rows: out })
    }
}

/// A row as held by storage: identifier plus positional (possibly encrypted) cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    pub row_identifier: u64,
    pub cells: Vec<String>,
}

/// A decrypted row produced on the read path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedRow {
    pub row_identifier: u64,
    pub cells: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_odd_keys_are_positional() {
        assert_eq!(normalize_key(0, "name"), "name");
        assert_eq!(normalize_key(1, "2"), "col2");
        assert_eq!(normalize_key(2, "first name"), "col3");
        assert_eq!(normalize_key(3, "9lives"), "col4");
    }

    #[test]
    fn positional_label_never_shadows_a_source_key() {
        let schema = Schema::from_keys(["first name", "col1"]).unwrap();
        assert_eq!(schema.labels, vec!["col1_2", "col1"]);

        let schema = Schema::from_keys(["a b", "col1", "col1_2"]).unwrap();
        assert_eq!(schema.labels, vec!["col1_3", "col1", "col1_2"]);

        let schema = Schema::from_keys(["x", " x"]).unwrap();
        assert_eq!(schema.labels, vec!["x", "x_2"]);
    }

    #[test]
    fn storage_column_parsing() {
        assert_eq!(parse_storage_column("col1"), Some(0));
        assert_eq!(parse_storage_column("col60"), Some(59));
        assert_eq!(parse_storage_column("col61"), None);
        assert_eq!(parse_storage_column("col01"), None);
        assert_eq!(parse_storage_column("name"), None);
    }

    #[test]
    fn later_rows_are_padded() {
        let rows = vec![json!({"a": "1", "b": 2}), json!({"a": "x"}), json!({"b": null, "c": "z"})];
        let ds = Dataset::from_json_rows(rows, ShapePolicy::Pad).unwrap();
        assert_eq!(ds.schema.labels, vec!["a", "b"]);
        assert_eq!(ds.rows, vec![vec!["1", "2"], vec!["x", ""], vec!["", ""]]);
    }

    #[test]
    fn reject_policy_flags_disagreement() {
        let rows = vec![json!({"a": "1"}), json!({"a": "2", "b": "3"})];
        assert!(matches!(
            Dataset::from_json_rows(rows, ShapePolicy::Reject),
            Err(PipelineError::Parse(_))
        ));
    }

    #[test]
    fn identifier_column_is_excluded() {
        let rows = vec![json!({"id": 7, "a": "1"})];
        let ds = Dataset::from_json_rows(rows, ShapePolicy::Pad).unwrap();
        assert_eq!(ds.schema.width(), 1);
        assert_eq!(ds.rows[0], vec!["1"]);
    }
}
