//! Stage 0: load CSV or multi-sheet workbook files into tabular frames.

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SheetFrame {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub fn read_csv(path: &Path) -> Result<SheetFrame, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| format!("failed to open csv {}: {e}", path.display()))?;
    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(String::from)
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        rows.push(record.iter().map(infer_scalar).collect());
    }
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("sheet").to_string();
    Ok(SheetFrame { name, columns, rows })
}

pub fn read_workbook(path: &Path) -> Result<Vec<SheetFrame>, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| format!("failed to open workbook: {e}"))?;
    let sheet_names = workbook.sheet_names().to_vec();
    let mut frames = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| format!("failed to read sheet '{name}': {e}"))?;
        let mut rows_iter = range.rows();
        let columns: Vec<String> = match rows_iter.next() {
            Some(header_row) => header_row.iter().map(data_to_header).collect(),
            None => continue,
        };
        let rows = rows_iter.map(|row| row.iter().map(data_to_json).collect()).collect();
        frames.push(SheetFrame { name, columns, rows });
    }
    Ok(frames)
}

fn data_to_header(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

fn data_to_json(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::Int(i) => Value::from(*i),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => Value::String(format!("{dt:?}")),
        Data::DateTimeIso(s) => Value::String(s.clone()),
        Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#ERROR:{e:?}")),
    }
}

/// CSV has no type information; sniff integer/float/bool before falling
/// back to a string. Empty fields become JSON null.
fn infer_scalar(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = field.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        return serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::String(field.to_string()));
    }
    if let Ok(b) = field.parse::<bool>() {
        return Value::Bool(b);
    }
    Value::String(field.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_csv_infers_scalar_types() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,age,active").unwrap();
        writeln!(file, "alice,30,true").unwrap();
        writeln!(file, "bob,,false").unwrap();
        let frame = read_csv(file.path()).unwrap();
        assert_eq!(frame.columns, vec!["name", "age", "active"]);
        assert_eq!(frame.rows[0][1], Value::from(30));
        assert_eq!(frame.rows[1][1], Value::Null);
    }
}
