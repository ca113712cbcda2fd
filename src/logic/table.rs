//! CSV table
//!
//! A header row plus text records, read with the `csv` crate. Numeric views
//! are built on demand.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use serde::Serialize;

use crate::logic::error::MonitorError;

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

/// Mean and sample standard deviation of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: f64,
    /// `None` with fewer than two values
    pub std: Option<f64>,
}

impl ColumnSummary {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.len() >= 2).then(|| {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        });

        Some(Self {
            count: values.len(),
            mean,
            std,
        })
    }
}

impl Table {
    pub fn read(path: &Path) -> Result<Self, MonitorError> {
        let file = File::open(path).map_err(|e| MonitorError::io(path, e))?;
        Self::from_reader(file).map_err(|e| MonitorError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    #[cfg(test)]
    pub fn parse(text: &str) -> Result<Self, csv::Error> {
        Self::from_reader(text.as_bytes())
    }

    /// First record is the header. Rows may be ragged; blank lines are skipped.
    fn from_reader<R: Read>(input: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let headers = reader.headers()?.clone();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { headers, rows })
    }

    /// Data rows, header excluded.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Parsed values of every numeric column.
    ///
    /// A column is numeric when every non-empty cell parses as a float and at
    /// least one does. Empty cells are skipped.
    pub fn numeric_columns(&self) -> BTreeMap<String, Vec<f64>> {
        let mut out = BTreeMap::new();

        'columns: for (idx, name) in self.headers.iter().enumerate() {
            let mut values = Vec::with_capacity(self.rows.len());
            for row in &self.rows {
                let cell = row.get(idx).map(str::trim).unwrap_or("");
                if cell.is_empty() {
                    continue;
                }
                match cell.parse::<f64>() {
                    Ok(v) if v.is_finite() => values.push(v),
                    _ => continue 'columns,
                }
            }
            if !values.is_empty() {
                out.insert(name.to_string(), values);
            }
        }
        out
    }

    pub fn summarize(&self) -> BTreeMap<String, ColumnSummary> {
        self.numeric_columns()
            .into_iter()
            .filter_map(|(name, values)| ColumnSummary::of(&values).map(|s| (name, s)))
            .collect()
    }
}
