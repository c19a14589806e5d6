use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use ndarray::Array2;
use tracing::{debug, info};

use super::table::format_number;
use super::{PipelineError, PipelineResult, Table};
use crate::config::FillStrategy;

/// Wide user x movie matrix with explicit missing cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingsMatrix {
    pub index_name: String,
    pub row_keys: Vec<String>,
    pub columns: Vec<String>,
    pub cells: Array2<Option<f64>>,
}

/// Ratings matrix after sparse columns were dropped and gaps filled.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledMatrix {
    pub index_name: String,
    pub row_keys: Vec<String>,
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl RatingsMatrix {
    /// Number of present cells in every column.
    pub fn present_counts(&self) -> Vec<usize> {
        self.cells
            .columns()
            .into_iter()
            .map(|col| col.iter().filter(|c| c.is_some()).count())
            .collect()
    }

    pub fn missing_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }
}

impl From<FilledMatrix> for RatingsMatrix {
    fn from(m: FilledMatrix) -> Self {
        RatingsMatrix {
            index_name: m.index_name,
            row_keys: m.row_keys,
            columns: m.columns,
            cells: m.values.mapv(Some),
        }
    }
}

/// Reshape long-format facts into a `index` x `columns` matrix of `values`.
///
/// Rows and columns come out sorted. Several facts for the same cell are
/// averaged. Facts with an empty key or value are skipped.
pub fn pivot(table: &Table, index: &str, columns: &str, values: &str) -> PipelineResult<RatingsMatrix> {
    let ri = table.column_index(index)?;
    let ci = table.column_index(columns)?;
    let vi = table.column_index(values)?;

    let mut sums: HashMap<(&str, &str), (f64, usize)> = HashMap::new();
    let mut row_set = BTreeSet::new();
    let mut col_set = BTreeSet::new();

    for row in &table.rows {
        let (r, c, v) = (row[ri].as_str(), row[ci].as_str(), row[vi].trim());
        if r.is_empty() || c.is_empty() || is_missing(v) {
            continue;
        }
        let value = v
            .parse::<f64>()
            .ok()
            .filter(|value| !value.is_infinite())
            .ok_or_else(|| PipelineError::InvalidValue {
                row: r.to_string(),
                column: c.to_string(),
                value: v.to_string(),
            })?;
        if value.is_nan() {
            continue;
        }
        let entry = sums.entry((r, c)).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
        row_set.insert(r);
        col_set.insert(c);
    }

    let mut row_keys: Vec<&str> = row_set.into_iter().collect();
    sort_keys(&mut row_keys);
    let col_keys: Vec<&str> = col_set.into_iter().collect();

    let row_pos: HashMap<&str, usize> = row_keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let col_pos: HashMap<&str, usize> = col_keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    let mut cells = Array2::from_elem((row_keys.len(), col_keys.len()), None);
    let mut duplicates = 0;
    for ((r, c), (sum, count)) in sums {
        if count > 1 {
            duplicates += 1;
        }
        cells[[row_pos[r], col_pos[c]]] = Some(sum / count as f64);
    }
    if duplicates > 0 {
        info!("Averaged {} cells with more than one {} value", duplicates, values);
    }

    debug!(
        "Pivoted {} facts into {} x {} matrix",
        table.len(),
        row_keys.len(),
        col_keys.len()
    );

    Ok(RatingsMatrix {
        index_name: index.to_string(),
        row_keys: row_keys.into_iter().map(String::from).collect(),
        columns: col_keys.into_iter().map(String::from).collect(),
        cells,
    })
}

/// Empty cells and the usual NA spellings count as missing ratings.
fn is_missing(v: &str) -> bool {
    const NA: [&str; 7] = ["na", "n/a", "nan", "-nan", "null", "none", "<na>"];
    v.is_empty() || NA.iter().any(|na| v.eq_ignore_ascii_case(na))
}

/// Numeric keys sort by value, anything else lexically.
fn sort_keys(keys: &mut [&str]) {
    let numeric: Option<Vec<f64>> = keys.iter().map(|k| k.parse::<f64>().ok()).collect();
    if numeric.is_some() {
        keys.sort_by(|a, b| {
            let (x, y) = (a.parse::<f64>().unwrap_or(0.0), b.parse::<f64>().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b))
        });
    }
}

/// Turn the configured fill strategy into the value written into missing cells.
pub fn fill_value(strategy: &FillStrategy) -> PipelineResult<f64> {
    let value = match strategy {
        FillStrategy::Number(n) => *n,
        FillStrategy::Label(s) => s.trim().parse().map_err(|_| {
            PipelineError::ConfigInvalid(format!(
                "fill strategy {:?} is not numeric; the ratings matrix only holds numbers",
                s
            ))
        })?,
    };
    if !value.is_finite() {
        return Err(PipelineError::ConfigInvalid(format!(
            "fill strategy {} is not a finite number",
            strategy
        )));
    }
    Ok(value)
}

/// Drop columns with fewer than `thresh` present cells, then fill the gaps.
///
/// A `thresh` larger than the number of rows drops every column; the result
/// is an empty matrix, not an error.
pub fn fill(matrix: &RatingsMatrix, thresh: usize, value: f64) -> FilledMatrix {
    let kept: Vec<usize> = matrix
        .present_counts()
        .into_iter()
        .enumerate()
        .filter(|(_, n)| *n >= thresh)
        .map(|(j, _)| j)
        .collect();

    let values = Array2::from_shape_fn((matrix.row_keys.len(), kept.len()), |(i, j)| {
        matrix.cells[[i, kept[j]]].unwrap_or(value)
    });

    debug!(
        "Kept {} of {} columns with thresh={}",
        kept.len(),
        matrix.columns.len(),
        thresh
    );

    FilledMatrix {
        index_name: matrix.index_name.clone(),
        row_keys: matrix.row_keys.clone(),
        columns: kept.iter().map(|&j| matrix.columns[j].clone()).collect(),
        values,
    }
}

impl FilledMatrix {
    pub fn is_degenerate(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_table(&self) -> Table {
        let mut headers = Vec::with_capacity(self.columns.len() + 1);
        headers.push(self.index_name.clone());
        headers.extend(self.columns.iter().cloned());

        let mut table = Table::new(headers);
        for (key, row) in self.row_keys.iter().zip(self.values.rows()) {
            let mut cells = Vec::with_capacity(row.len() + 1);
            cells.push(key.clone());
            cells.extend(row.iter().map(|v| format_number(*v)));
            table.rows.push(cells);
        }
        table
    }

    /// Read a persisted matrix: first column is the row index, every other
    /// cell must hold a number.
    pub fn from_table(table: &Table) -> PipelineResult<Self> {
        let (index_name, columns) = table
            .headers
            .split_first()
            .ok_or_else(|| PipelineError::SchemaMismatch("ratings matrix has no header".to_string()))?;

        let mut values = Array2::zeros((table.len(), columns.len()));
        let mut row_keys = Vec::with_capacity(table.len());
        for (i, row) in table.rows.iter().enumerate() {
            if row.len() != table.headers.len() {
                return Err(PipelineError::SchemaMismatch(format!(
                    "row {} has {} cells, expected {}",
                    i + 1,
                    row.len(),
                    table.headers.len()
                )));
            }
            row_keys.push(row[0].clone());
            for (j, cell) in row[1..].iter().enumerate() {
                let v = cell
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| PipelineError::InvalidValue {
                        row: row[0].clone(),
                        column: columns[j].clone(),
                        value: cell.clone(),
                    })?;
                values[[i, j]] = v;
            }
        }

        Ok(FilledMatrix {
            index_name: index_name.clone(),
            row_keys,
            columns: columns.to_vec(),
            values,
        })
    }
}
