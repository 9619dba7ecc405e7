//! Tabular feature data keyed by patient code.
//!
//! External tables are read verbatim: every non-empty cell is kept as text so
//! that writing the joined table back reproduces the input columns exactly.
//! Feature columns carry typed [`FeatureValue`]s.

use std::io::{Read, Write};
use std::path::Path;

use hashbrown::HashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FeatureError, FeatureResult};

/// Name of the join key column.
pub const KEY_COLUMN: &str = "Code";

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Integer(i64),
    Bool(bool),
    Point([f64; 3]),
    Text(String),
    Missing,
}

impl FeatureValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            FeatureValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FeatureValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<[f64; 3]> {
        match self {
            FeatureValue::Point(p) => Some(*p),
            _ => None,
        }
    }

    /// Parse a CSV cell. Empty cells are missing, everything else is text.
    fn from_cell(cell: &str) -> Self {
        if cell.is_empty() {
            FeatureValue::Missing
        } else {
            FeatureValue::Text(cell.to_string())
        }
    }
}

/// CSV rendering: booleans as `True`/`False`, points as `[x, y, z]`,
/// missing values as an empty string.
impl std::fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureValue::Number(v) => write!(f, "{v}"),
            FeatureValue::Integer(v) => write!(f, "{v}"),
            FeatureValue::Bool(true) => f.write_str("True"),
            FeatureValue::Bool(false) => f.write_str("False"),
            FeatureValue::Point([x, y, z]) => write!(f, "[{x}, {y}, {z}]"),
            FeatureValue::Text(s) => f.write_str(s),
            FeatureValue::Missing => Ok(()),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<usize> for FeatureValue {
    fn from(v: usize) -> Self {
        FeatureValue::Integer(v as i64)
    }
}

impl From<nalgebra::Point3<f64>> for FeatureValue {
    fn from(p: nalgebra::Point3<f64>) -> Self {
        FeatureValue::Point([p.x, p.y, p.z])
    }
}

/// Feature values of one patient, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub code: String,
    pub values: Vec<FeatureValue>,
}

/// Column names and rows of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<FeatureValue>>,
}

impl FeatureTable {
    /// Empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table with a leading `Code` column from per-patient rows.
    pub fn from_rows(feature_columns: &[String], rows: Vec<FeatureRow>) -> Self {
        let mut columns = Vec::with_capacity(feature_columns.len() + 1);
        columns.push(KEY_COLUMN.to_string());
        columns.extend(feature_columns.iter().cloned());

        let rows = rows
            .into_iter()
            .map(|row| {
                debug_assert_eq!(row.values.len(), feature_columns.len());
                let mut cells = Vec::with_capacity(columns.len());
                cells.push(FeatureValue::Text(row.code));
                cells.extend(row.values);
                cells
            })
            .collect();

        Self { columns, rows }
    }

    /// Append a row; short rows are padded with missing values.
    pub fn push_row(&mut self, mut cells: Vec<FeatureValue>) {
        cells.resize(self.columns.len(), FeatureValue::Missing);
        self.rows.push(cells);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<FeatureValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn key_index(&self) -> FeatureResult<usize> {
        self.column_index(KEY_COLUMN)
            .ok_or_else(|| FeatureError::MissingKeyColumn {
                column: KEY_COLUMN.to_string(),
            })
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&FeatureValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Key values in row order. Missing keys are empty strings.
    pub fn codes(&self) -> FeatureResult<Vec<String>> {
        let idx = self.key_index()?;
        Ok(self.rows.iter().map(|row| row[idx].to_string()).collect())
    }

    /// Cell of the first row with the given code.
    pub fn get(&self, code: &str, column: &str) -> Option<&FeatureValue> {
        let key = self.column_index(KEY_COLUMN)?;
        let idx = self.column_index(column)?;
        self.rows
            .iter()
            .find(|row| !row[key].is_missing() && row[key].to_string() == code)
            .map(|row| &row[idx])
    }

    /// Left join on `Code`.
    ///
    /// Every row of `self` is kept, in order, extended by the non-key columns
    /// of `right`. Rows without a match get missing values; rows of `right`
    /// without a match are dropped. When `right` holds a code more than once
    /// the first row is used.
    pub fn left_join(&self, right: &FeatureTable) -> FeatureResult<FeatureTable> {
        let left_key = self.key_index()?;
        let right_key = right.key_index()?;

        let added: Vec<usize> = (0..right.columns.len()).filter(|&i| i != right_key).collect();
        for &i in &added {
            if self.column_index(&right.columns[i]).is_some() {
                return Err(FeatureError::DuplicateColumn {
                    column: right.columns[i].clone(),
                });
            }
        }

        let mut lookup: HashMap<String, usize> = HashMap::with_capacity(right.rows.len());
        for (i, row) in right.rows.iter().enumerate() {
            if row[right_key].is_missing() {
                continue;
            }
            let code = row[right_key].to_string();
            if lookup.contains_key(&code) {
                warn!(code = %code, "Duplicate code in joined table, keeping the first row");
                continue;
            }
            lookup.insert(code, i);
        }

        let mut columns = self.columns.clone();
        columns.extend(added.iter().map(|&i| right.columns[i].clone()));

        let mut matched = 0usize;
        let rows: Vec<Vec<FeatureValue>> = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = row.clone();
                let hit = (!row[left_key].is_missing())
                    .then(|| lookup.get(&row[left_key].to_string()))
                    .flatten();
                match hit {
                    Some(&r) => {
                        matched += 1;
                        cells.extend(added.iter().map(|&i| right.rows[r][i].clone()));
                    }
                    None => cells.extend(added.iter().map(|_| FeatureValue::Missing)),
                }
                cells
            })
            .collect();

        debug!(
            rows = rows.len(),
            matched,
            added_columns = added.len(),
            "Joined feature columns"
        );

        Ok(FeatureTable { columns, rows })
    }

    /// Read a CSV file with a header row.
    pub fn read_csv(path: &Path) -> FeatureResult<Self> {
        let reader = csv::Reader::from_path(path).map_err(|e| FeatureError::csv(path, e))?;
        Self::from_csv_reader(reader, path)
    }

    /// Read CSV data with a header row from any reader.
    pub fn from_reader<R: Read>(reader: R) -> FeatureResult<Self> {
        Self::from_csv_reader(csv::Reader::from_reader(reader), Path::new("<reader>"))
    }

    fn from_csv_reader<R: Read>(mut reader: csv::Reader<R>, path: &Path) -> FeatureResult<Self> {
        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| FeatureError::csv(path, e))?
            .iter()
            .map(String::from)
            .collect();

        let mut table = FeatureTable::new(columns);
        for record in reader.records() {
            let record = record.map_err(|e| FeatureError::csv(path, e))?;
            table.push_row(record.iter().map(FeatureValue::from_cell).collect());
        }

        debug!(
            path = %path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "Read table"
        );
        Ok(table)
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv(&self, path: &Path) -> FeatureResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FeatureError::io_write(parent, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| FeatureError::io_write(path, e))?;
        self.write_to(file, path)?;
        debug!(path = %path.display(), rows = self.row_count(), "Wrote table");
        Ok(())
    }

    /// Write the table as CSV into any writer.
    pub fn to_writer<W: Write>(&self, writer: W) -> FeatureResult<()> {
        self.write_to(writer, Path::new("<writer>"))
    }

    fn write_to<W: Write>(&self, writer: W, path: &Path) -> FeatureResult<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(&self.columns)
            .map_err(|e| FeatureError::csv(path, e))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .map_err(|e| FeatureError::csv(path, e))?;
        }
        writer.flush().map_err(|e| FeatureError::io_write(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external() -> FeatureTable {
        let csv = "Code,Pressure\nA,1.5\nB,2.0\nC,\n";
        FeatureTable::from_reader(csv.as_bytes()).unwrap()
    }

    fn features() -> FeatureTable {
        FeatureTable::from_rows(
            &["gap".to_string(), "healthy".to_string()],
            vec![
                FeatureRow {
                    code: "B".into(),
                    values: vec![FeatureValue::Number(12.5), FeatureValue::Bool(true)],
                },
                FeatureRow {
                    code: "Z".into(),
                    values: vec![FeatureValue::Number(3.0), FeatureValue::Bool(false)],
                },
            ],
        )
    }

    #[test]
    fn test_read_keeps_cells_verbatim() {
        let table = external();
        assert_eq!(table.columns(), &["Code", "Pressure"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.get("B", "Pressure"), Some(&FeatureValue::Text("2.0".into())));
        assert_eq!(table.get("C", "Pressure"), Some(&FeatureValue::Missing));
    }

    #[test]
    fn test_left_join_preserves_left_rows() {
        let joined = external().left_join(&features()).unwrap();

        assert_eq!(joined.columns(), &["Code", "Pressure", "gap", "healthy"]);
        assert_eq!(joined.codes().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(joined.get("A", "gap"), Some(&FeatureValue::Missing));
        assert_eq!(joined.get("B", "gap"), Some(&FeatureValue::Number(12.5)));
        assert_eq!(joined.get("B", "healthy"), Some(&FeatureValue::Bool(true)));
        // Z exists only on the right side
        assert!(joined.get("Z", "gap").is_none());
    }

    #[test]
    fn test_duplicate_column_is_rejected() {
        let left = external().left_join(&features()).unwrap();
        let err = left.left_join(&features()).unwrap_err();
        assert!(matches!(err, FeatureError::DuplicateColumn { column } if column == "gap"));
    }

    #[test]
    fn test_missing_key_column() {
        let table = FeatureTable::from_reader("id,x\n1,2\n".as_bytes()).unwrap();
        let err = table.left_join(&features()).unwrap_err();
        assert!(matches!(err, FeatureError::MissingKeyColumn { .. }));
    }

    #[test]
    fn test_csv_rendering() {
        let joined = external().left_join(&features()).unwrap();
        let mut out = Vec::new();
        joined.to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Code,Pressure,gap,healthy\nA,1.5,,\nB,2.0,12.5,True\nC,,,\n"
        );
    }

    #[test]
    fn test_point_rendering() {
        assert_eq!(FeatureValue::Point([1.0, -2.5, 3.0]).to_string(), "[1, -2.5, 3]");
        assert_eq!(FeatureValue::Bool(false).to_string(), "False");
        assert_eq!(FeatureValue::Missing.to_string(), "");
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed").join("out.csv");
        let joined = external().left_join(&features()).unwrap();
        joined.write_csv(&path).unwrap();

        let back = FeatureTable::read_csv(&path).unwrap();
        assert_eq!(back.columns(), joined.columns());
        assert_eq!(back.get("B", "healthy"), Some(&FeatureValue::Text("True".into())));
    }
}
