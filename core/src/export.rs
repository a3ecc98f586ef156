//! export.rs
//! Write a merged, decrypted dataset to disk.
//!
//! `.csv` goes through the `csv` writer, anything else is a JSON array of
//! objects. `row_identifier` is always the first column.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::WriterBuilder;
use serde_json::{Map, Value};

use crate::constants::ROW_IDENTIFIER;
use crate::dataset::{unique_labels, DecryptedRow, Schema};
use crate::types::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

/// Header labels for `columns` cells: the schema's labels where it has them, `colN` past that.
fn labels(schema: Option<&Schema>, columns: usize) -> Vec<String> {
    let named = schema.map_or(0, |s| s.labels.len().min(columns));
    let mut headers: Vec<String> = schema.map_or_else(Vec::new, |s| s.labels[..named].to_vec());
    headers.extend(Schema::positional(columns).labels.into_iter().skip(named));
    let positional: Vec<bool> = (0..columns).map(|i| i >= named).collect();
    unique_labels(headers, &positional)
}

/// Export `rows` to `path`, format chosen by extension. Returns the number of rows written.
pub fn export_rows(
    path: &Path,
    rows: &[DecryptedRow],
    columns: usize,
    schema: Option<&Schema>,
) -> Result<usize, PipelineError> {
    let headers = labels(schema, columns);
    match ExportFormat::from_path(path) {
        ExportFormat::Csv => write_csv(path, rows, &headers)?,
        ExportFormat::Json => write_json(path, rows, &headers)?,
    }
    log::info!("[EXPORT] {} rows x {} cols -> {:?}", rows.len(), columns, path);
    Ok(rows.len())
}

fn write_csv(path: &Path, rows: &[DecryptedRow], headers: &[String]) -> Result<(), PipelineError> {
    let file = File::create(path)?;
    let mut w = WriterBuilder::new().from_writer(BufWriter::with_capacity(512 * 1024, file));

    let mut header = Vec::with_capacity(headers.len() + 1);
    header.push(ROW_IDENTIFIER.to_string());
    header.extend(headers.iter().cloned());
    w.write_record(&header)?;

    let mut record = Vec::with_capacity(headers.len() + 1);
    for row in rows {
        record.clear();
        record.push(row.row_identifier.to_string());
        for i in 0..headers.len() {
            record.push(row.cells.get(i).cloned().unwrap_or_default());
        }
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

fn write_json(path: &Path, rows: &[DecryptedRow], headers: &[String]) -> Result<(), PipelineError> {
    let objects: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut obj = Map::with_capacity(headers.len() + 1);
            obj.insert(ROW_IDENTIFIER.into(), Value::from(row.row_identifier));
            for (i, label) in headers.iter().enumerate() {
                obj.insert(label.clone(), Value::String(row.cells.get(i).cloned().unwrap_or_default()));
            }
            Value::Object(obj)
        })
        .collect();

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &objects)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("out.CSV")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out.json")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("out")), ExportFormat::Json);
    }

    #[test]
    fn labels_fall_back_to_positional() {
        let schema = Schema::from_keys(["name"]).unwrap();
        assert_eq!(labels(Some(&schema), 2), vec!["name", "col2"]);
        assert_eq!(labels(None, 1), vec!["col1"]);

        let schema = Schema::from_keys(["col2"]).unwrap();
        assert_eq!(labels(Some(&schema), 2), vec!["col2", "col2_2"]);
    }
}
