use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use super::{PipelineError, PipelineResult};
use crate::util::atomic_write;

/// A headered table of string cells, the exchange format between stages.
/// Missing values are empty cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn read_csv(path: &Path) -> PipelineResult<Self> {
        let file = File::open(path).map_err(|e| PipelineError::InputMissing {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));

        let csv_err = |e| PipelineError::Csv {
            path: path.to_path_buf(),
            source: e,
        };

        let headers = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(csv_err)?;
            rows.push(record.iter().map(|s| s.to_string()).collect());
        }

        debug!("Read {} rows from {}", rows.len(), path.display());
        Ok(Self { headers, rows })
    }

    /// Write the table as CSV. The target is replaced atomically, so a failed
    /// write never leaves a partial file behind.
    pub fn write_csv(&self, path: &Path) -> PipelineResult<()> {
        atomic_write(path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()
        })
        .map_err(|e| PipelineError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> PipelineResult<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::SchemaMismatch(format!("column {:?} not found", name)))
    }

    /// Remove the named columns. Names that are not present are ignored.
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        let keep: Vec<bool> = self
            .headers
            .iter()
            .map(|h| !names.iter().any(|n| n.as_ref() == h))
            .collect();
        if keep.iter().all(|k| *k) {
            return;
        }

        let retain = |cells: &mut Vec<String>| {
            let mut i = 0;
            cells.retain(|_| {
                let k = keep.get(i).copied().unwrap_or(true);
                i += 1;
                k
            });
        };
        retain(&mut self.headers);
        for row in &mut self.rows {
            retain(row);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Format a number for a CSV cell. NaN is written as an empty cell.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}
