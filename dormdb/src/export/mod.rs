//! Table snapshot writers.
//!
//! A snapshot is the full current contents of one table, written as
//! `<table>.<ext>` with fields in declared schema order. The format set
//! is closed; anything else is [`DormDbError::UnsupportedFormat`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};

use crate::error::{DormDbError, Result};
use crate::record::{Row, Value};
use crate::schema::TableSchema;

/// Supported snapshot formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-delimited text.
    Csv,
    /// JSON array of row objects.
    Json,
    /// Tab-delimited text.
    Txt,
    /// XLSX workbook with one worksheet per exported table.
    #[serde(alias = "excel")]
    Xlsx,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Csv,
        ExportFormat::Json,
        ExportFormat::Txt,
        ExportFormat::Xlsx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for ExportFormat {
    type Err = DormDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "txt" => Ok(ExportFormat::Txt),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(DormDbError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write a table snapshot to `dir`, creating the directory if absent.
/// Returns the path of the written file.
pub fn write_snapshot(
    schema: &TableSchema,
    rows: &[Row],
    format: ExportFormat,
    dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", schema.name(), format.extension()));

    match format {
        ExportFormat::Csv => write_delimited(schema, rows, &path, b',')?,
        ExportFormat::Txt => write_delimited(schema, rows, &path, b'\t')?,
        ExportFormat::Json => write_json(schema, rows, &path)?,
        ExportFormat::Xlsx => write_xlsx(schema, rows, &path)?,
    }

    log::info!(
        "Exported {} row(s) from '{}' to {}",
        rows.len(),
        schema.name(),
        path.display()
    );
    Ok(path)
}

fn write_delimited(schema: &TableSchema, rows: &[Row], path: &Path, delimiter: u8) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;

    writer.write_record(schema.field_names())?;
    for row in rows {
        let cells: Vec<String> = schema
            .fields
            .iter()
            .map(|f| cell_text(row.get(f.name)))
            .collect();
        writer.write_record(&cells)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(schema: &TableSchema, rows: &[Row], path: &Path) -> Result<()> {
    let objects: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let mut obj = serde_json::Map::new();
            for f in schema.fields {
                obj.insert(
                    f.name.to_string(),
                    row.get(f.name).map(Value::to_json).unwrap_or_default(),
                );
            }
            serde_json::Value::Object(obj)
        })
        .collect();

    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &objects)?;
    Ok(())
}

fn write_xlsx(schema: &TableSchema, rows: &[Row], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(schema.name())?;

    for (col, name) in schema.field_names().iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (c, f) in schema.fields.iter().enumerate() {
            let c = c as u16;
            match row.get(f.name) {
                Some(Value::Int(n)) => {
                    sheet.write_number(r, c, *n as f64)?;
                }
                Some(Value::Text(s)) => {
                    sheet.write_string(r, c, s)?;
                }
                Some(Value::Timestamp(ts)) => {
                    sheet.write_string(r, c, &ts.to_rfc3339())?;
                }
                Some(Value::Null) | None => {}
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Int(i)) => i.to_string(),
        Some(Value::Text(s)) => s.clone(),
        Some(Value::Timestamp(ts)) => ts.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_rows(n: i64) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".to_string(), Value::Int(10000 + i));
                row.insert("room_number".to_string(), Value::Text(format!("10{i}")));
                row.insert("capacity".to_string(), Value::Int(2));
                row.insert("occupants".to_string(), Value::Int(0));
                row
            })
            .collect()
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("excel".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);

        let err = "parquet".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(err, DormDbError::UnsupportedFormat(f) if f == "parquet"));
    }

    #[test]
    fn test_csv_snapshot_has_header_and_declared_field_order() {
        let tmp = TempDir::new().unwrap();
        let schema = schema::schema_for("rooms").unwrap();

        let path = write_snapshot(schema, &sample_rows(7), ExportFormat::Csv, tmp.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "rooms.csv");

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8); // header + 7 data rows
        assert_eq!(lines[0], "id,room_number,capacity,occupants");
        assert_eq!(lines[1], "10000,100,2,0");
    }

    #[test]
    fn test_txt_snapshot_is_tab_delimited() {
        let tmp = TempDir::new().unwrap();
        let schema = schema::schema_for("rooms").unwrap();

        let path = write_snapshot(schema, &sample_rows(1), ExportFormat::Txt, tmp.path()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next().unwrap(), "id\troom_number\tcapacity\toccupants");
    }

    #[test]
    fn test_json_snapshot_is_an_array_of_objects() {
        let tmp = TempDir::new().unwrap();
        let schema = schema::schema_for("rooms").unwrap();

        let path = write_snapshot(schema, &sample_rows(2), ExportFormat::Json, tmp.path()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();

        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["id"], 10000);
        assert_eq!(array[0]["room_number"], "100");
    }

    #[test]
    fn test_xlsx_snapshot_writes_a_workbook() {
        let tmp = TempDir::new().unwrap();
        let schema = schema::schema_for("rooms").unwrap();

        let path = write_snapshot(schema, &sample_rows(3), ExportFormat::Xlsx, tmp.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "rooms.xlsx");
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_snapshot_creates_destination_directory() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("out").join("snapshots");
        let schema = schema::schema_for("admins").unwrap();

        let path = write_snapshot(schema, &[], ExportFormat::Csv, &nested).unwrap();
        assert!(path.exists());

        // Empty table still yields a header row
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), "id,name,email,password");
    }
}
