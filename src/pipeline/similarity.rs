use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::debug;

use super::table::format_number;
use super::{FilledMatrix, PipelineError, PipelineResult, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
    Kendall,
}

impl FromStr for CorrelationMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            "kendall" => Ok(CorrelationMethod::Kendall),
            _ => Err(PipelineError::ConfigInvalid(format!(
                "unrecognized correlation method {:?} (expected pearson, spearman or kendall)",
                s
            ))),
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
            CorrelationMethod::Kendall => "kendall",
        };
        f.write_str(s)
    }
}

/// Square movie x movie correlation table. This is the artifact the serving
/// side loads; it is never modified after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    titles: Vec<String>,
    values: Array2<f64>,
    index: HashMap<String, usize>,
}

impl SimilarityMatrix {
    pub fn new(titles: Vec<String>, values: Array2<f64>) -> PipelineResult<Self> {
        if values.dim() != (titles.len(), titles.len()) {
            return Err(PipelineError::SchemaMismatch(format!(
                "similarity matrix is {:?} but has {} titles",
                values.dim(),
                titles.len()
            )));
        }
        let mut index = HashMap::with_capacity(titles.len());
        for (i, t) in titles.iter().enumerate() {
            if index.insert(t.clone(), i).is_some() {
                return Err(PipelineError::SchemaMismatch(format!("duplicate title {:?}", t)));
            }
        }
        Ok(Self {
            titles,
            values,
            index,
        })
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn position(&self, title: &str) -> Option<usize> {
        self.index.get(title).copied()
    }

    pub fn column(&self, title: &str) -> Option<ArrayView1<'_, f64>> {
        self.position(title).map(|j| self.values.column(j))
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.values[[self.position(a)?, self.position(b)?]])
    }

    /// First header cell is empty (an unnamed index), NaN cells are empty.
    pub fn to_table(&self) -> Table {
        let mut headers = Vec::with_capacity(self.len() + 1);
        headers.push(String::new());
        headers.extend(self.titles.iter().cloned());

        let mut table = Table::new(headers);
        for (title, row) in self.titles.iter().zip(self.values.rows()) {
            let mut cells = Vec::with_capacity(row.len() + 1);
            cells.push(title.clone());
            cells.extend(row.iter().map(|v| format_number(*v)));
            table.rows.push(cells);
        }
        table
    }

    pub fn from_table(table: &Table) -> PipelineResult<Self> {
        let titles: Vec<String> = table.headers.iter().skip(1).cloned().collect();
        if table.headers.is_empty() || table.len() != titles.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "similarity table has {} columns but {} rows",
                titles.len(),
                table.len()
            )));
        }

        let mut values = Array2::<f64>::zeros((titles.len(), titles.len()));
        for (i, row) in table.rows.iter().enumerate() {
            if row.first() != Some(&titles[i]) || row.len() != titles.len() + 1 {
                return Err(PipelineError::SchemaMismatch(format!(
                    "row {} does not match column {:?}",
                    i + 1,
                    titles[i]
                )));
            }
            for (j, cell) in row[1..].iter().enumerate() {
                let cell = cell.trim();
                values[[i, j]] = if cell.is_empty() {
                    f64::NAN
                } else {
                    cell.parse().map_err(|_| PipelineError::InvalidValue {
                        row: titles[i].clone(),
                        column: titles[j].clone(),
                        value: cell.to_string(),
                    })?
                };
            }
        }

        Self::new(titles, values)
    }
}

/// Pairwise correlation between all columns of the filled matrix.
///
/// Pairs involving a constant column are NaN, including the diagonal entry
/// of that column. All other diagonal entries are exactly 1 and the result is
/// exactly symmetric.
pub fn correlate(matrix: &FilledMatrix, method: CorrelationMethod) -> PipelineResult<SimilarityMatrix> {
    let x = &matrix.values;
    let values = match method {
        CorrelationMethod::Pearson => pearson(x),
        CorrelationMethod::Spearman => pearson(&ranks(x)),
        CorrelationMethod::Kendall => kendall(x),
    };

    debug!(
        "Computed {} correlation over {} rows x {} columns",
        method,
        x.nrows(),
        x.ncols()
    );

    SimilarityMatrix::new(matrix.columns.clone(), values)
}

fn constant_columns(x: &Array2<f64>) -> Vec<bool> {
    x.columns()
        .into_iter()
        .map(|col| match col.iter().next() {
            Some(first) => col.iter().all(|v| v == first),
            None => true,
        })
        .collect()
}

/// Correlation of every column pair from one centred matrix product.
fn pearson(x: &Array2<f64>) -> Array2<f64> {
    let m = x.ncols();
    let mut out = Array2::from_elem((m, m), f64::NAN);
    let mean = match x.mean_axis(Axis(0)) {
        Some(mean) if x.nrows() >= 2 => mean,
        _ => return out,
    };

    let centered = x - &mean.insert_axis(Axis(0));
    let cov = centered.t().dot(&centered);
    let norms: Array1<f64> = cov.diag().mapv(f64::sqrt);
    let constant = constant_columns(x);

    for i in 0..m {
        if constant[i] {
            continue;
        }
        out[[i, i]] = 1.0;
        for j in (i + 1)..m {
            if constant[j] {
                continue;
            }
            let r = (cov[[i, j]] / (norms[i] * norms[j])).clamp(-1.0, 1.0);
            out[[i, j]] = r;
            out[[j, i]] = r;
        }
    }
    out
}

/// Replace every column by its 1-based ranks; ties share their average rank.
fn ranks(x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros(x.dim());
    for (col, mut dst) in x.columns().into_iter().zip(out.columns_mut()) {
        let mut order: Vec<usize> = (0..col.len()).collect();
        order.sort_by(|&a, &b| col[a].total_cmp(&col[b]));

        let mut start = 0;
        while start < order.len() {
            let mut end = start + 1;
            while end < order.len() && col[order[end]] == col[order[start]] {
                end += 1;
            }
            let rank = (start + end + 1) as f64 / 2.0;
            for &k in &order[start..end] {
                dst[k] = rank;
            }
            start = end;
        }
    }
    out
}

fn kendall(x: &Array2<f64>) -> Array2<f64> {
    let m = x.ncols();
    let mut out = Array2::from_elem((m, m), f64::NAN);
    let constant = constant_columns(x);

    for i in 0..m {
        if constant[i] {
            continue;
        }
        out[[i, i]] = 1.0;
        for j in (i + 1)..m {
            if constant[j] {
                continue;
            }
            let tau = tau_b(x.column(i), x.column(j));
            out[[i, j]] = tau;
            out[[j, i]] = tau;
        }
    }
    out
}

/// Kendall's tau-b, which corrects for ties in either column.
///
/// Knight's algorithm: sort the pairs by (x, y), then the discordant pairs are
/// the inversions left in y, counted while merge sorting it. O(n log n).
fn tau_b(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    let n = x.len() as u64;
    let total = n * n.saturating_sub(1) / 2;

    let mut order: Vec<usize> = (0..x.len()).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]).then(y[a].total_cmp(&y[b])));

    let tied_x = tied_pairs(&order, |a, b| x[a] == x[b]);
    let tied_xy = tied_pairs(&order, |a, b| x[a] == x[b] && y[a] == y[b]);

    let mut ys: Vec<f64> = order.iter().map(|&k| y[k]).collect();
    let mut scratch = vec![0.0; ys.len()];
    let discordant = merge_count(&mut ys, &mut scratch);

    // ys is sorted now, so equal values are adjacent
    let positions: Vec<usize> = (0..ys.len()).collect();
    let tied_y = tied_pairs(&positions, |a, b| ys[a] == ys[b]);

    let denom = (((total - tied_x) as f64) * ((total - tied_y) as f64)).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    let numer = total as f64 - tied_x as f64 - tied_y as f64 + tied_xy as f64 - 2.0 * discordant as f64;
    (numer / denom).clamp(-1.0, 1.0)
}

/// Pairs inside runs of adjacent equal items, sum of t * (t - 1) / 2.
fn tied_pairs(items: &[usize], equal: impl Fn(usize, usize) -> bool) -> u64 {
    let mut pairs = 0u64;
    let mut run = 1u64;
    for w in items.windows(2) {
        if equal(w[0], w[1]) {
            run += 1;
        } else {
            pairs += run * (run - 1) / 2;
            run = 1;
        }
    }
    pairs + run * (run - 1) / 2
}

/// Stable merge sort of `v`, returning the number of strict inversions.
fn merge_count(v: &mut [f64], scratch: &mut [f64]) -> u64 {
    let len = v.len();
    if len < 2 {
        return 0;
    }
    let mid = len / 2;
    let mut swaps = {
        let (left, right) = v.split_at_mut(mid);
        let (sl, sr) = scratch.split_at_mut(mid);
        merge_count(left, sl) + merge_count(right, sr)
    };

    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < len {
        if v[i] <= v[j] {
            scratch[k] = v[i];
            i += 1;
        } else {
            scratch[k] = v[j];
            swaps += (mid - i) as u64;
            j += 1;
        }
        k += 1;
    }
    scratch[k..k + mid - i].copy_from_slice(&v[i..mid]);
    k += mid - i;
    scratch[k..].copy_from_slice(&v[j..]);
    v.copy_from_slice(&scratch[..len]);
    swaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn filled(columns: &[&str], values: Array2<f64>) -> FilledMatrix {
        FilledMatrix {
            index_name: "userId".to_string(),
            row_keys: (1..=values.nrows()).map(|i| i.to_string()).collect(),
            columns: columns.iter().map(|s| s.to_string()).collect(),
            values,
        }
    }

    fn sample() -> FilledMatrix {
        filled(
            &["A", "B", "C", "D"],
            array![
                [5.0, 4.0, 1.0, 3.0],
                [4.0, 5.0, 2.0, 3.0],
                [1.0, 2.0, 5.0, 3.0],
                [0.0, 1.0, 4.5, 3.0],
                [3.0, 0.0, 3.0, 3.0],
            ],
        )
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_pearson_known_value() {
        let m = filled(&["x", "y"], array![[1.0, 2.0], [2.0, 4.0], [3.0, 7.0]]);
        let sim = correlate(&m, CorrelationMethod::Pearson).unwrap();
        // cov = 5, var_x = 2, var_y = 12.667 (unnormalised sums)
        let expected = 5.0 / (2.0f64 * (38.0 / 3.0)).sqrt();
        assert!(approx(sim.get("x", "y").unwrap(), expected));
    }

    #[test]
    fn test_symmetric_with_unit_diagonal() {
        for method in [
            CorrelationMethod::Pearson,
            CorrelationMethod::Spearman,
            CorrelationMethod::Kendall,
        ] {
            let sim = correlate(&sample(), method).unwrap();
            let v = sim.values();
            for i in 0..3 {
                assert_eq!(v[[i, i]], 1.0, "{} diagonal", method);
                for j in 0..3 {
                    assert_eq!(v[[i, j]], v[[j, i]], "{} symmetry", method);
                    assert!(v[[i, j]] >= -1.0 && v[[i, j]] <= 1.0);
                }
            }
        }
    }

    #[test]
    fn test_constant_column_is_nan() {
        let sim = correlate(&sample(), CorrelationMethod::Pearson).unwrap();
        assert!(sim.get("D", "D").unwrap().is_nan());
        assert!(sim.get("A", "D").unwrap().is_nan());
        assert!(sim.get("D", "C").unwrap().is_nan());
    }

    #[test]
    fn test_spearman_is_rank_based() {
        let m = filled(&["x", "y"], array![[1.0, 1.0], [2.0, 8.0], [3.0, 27.0], [4.0, 64.0]]);
        let sim = correlate(&m, CorrelationMethod::Spearman).unwrap();
        assert!(approx(sim.get("x", "y").unwrap(), 1.0));
        let sim = correlate(&m, CorrelationMethod::Pearson).unwrap();
        assert!(sim.get("x", "y").unwrap() < 1.0);
    }

    #[test]
    fn test_ranks_average_ties() {
        let r = ranks(&array![[3.0], [1.0], [3.0], [2.0]]);
        assert_eq!(r.column(0).to_vec(), vec![3.5, 1.0, 3.5, 2.0]);
    }

    #[test]
    fn test_kendall_tau_b_with_ties() {
        let x = array![1.0, 2.0, 2.0, 3.0];
        let y = array![1.0, 3.0, 2.0, 4.0];
        // 5 concordant, 0 discordant, 1 pair tied in x only
        let expected = 5.0 / (6.0f64 * 5.0).sqrt();
        assert!(approx(tau_b(x.view(), y.view()), expected));

        let m = filled(&["x", "y"], array![[1.0, 4.0], [2.0, 3.0], [3.0, 2.0], [4.0, 1.0]]);
        let sim = correlate(&m, CorrelationMethod::Kendall).unwrap();
        assert_eq!(sim.get("x", "y").unwrap(), -1.0);
    }

    fn tau_b_pairwise(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        let n = x.len();
        let (mut concordant, mut discordant) = (0i64, 0i64);
        let (mut only_x, mut only_y) = (0i64, 0i64);
        for i in 0..n {
            for j in (i + 1)..n {
                let (dx, dy) = (x[i] - x[j], y[i] - y[j]);
                if dx == 0.0 && dy == 0.0 {
                    continue;
                } else if dx == 0.0 {
                    only_x += 1;
                } else if dy == 0.0 {
                    only_y += 1;
                } else if (dx > 0.0) == (dy > 0.0) {
                    concordant += 1;
                } else {
                    discordant += 1;
                }
            }
        }
        let untied = (concordant + discordant) as f64;
        let denom = ((untied + only_x as f64) * (untied + only_y as f64)).sqrt();
        if denom == 0.0 {
            return f64::NAN;
        }
        (concordant - discordant) as f64 / denom
    }

    #[test]
    fn test_kendall_matches_pairwise_count() {
        // rating-like values with plenty of ties
        let x = Array2::from_shape_fn((37, 6), |(i, j)| {
            ((i * 7919 + j * j * 104_729 + i * j * 31) % 11) as f64 / 2.0
        });
        for a in 0..x.ncols() {
            for b in 0..x.ncols() {
                let fast = tau_b(x.column(a), x.column(b));
                let slow = tau_b_pairwise(x.column(a), x.column(b));
                assert!(
                    fast.is_nan() && slow.is_nan() || (fast - slow).abs() < 1e-12,
                    "columns {} and {}: {} vs {}",
                    a,
                    b,
                    fast,
                    slow
                );
            }
        }
    }

    #[test]
    fn test_merge_count_inversions() {
        let mut v = vec![3.0, 1.0, 2.0, 2.0, 0.0];
        let mut scratch = vec![0.0; v.len()];
        // (3,1) (3,2) (3,2) (3,0) (1,0) (2,0) (2,0)
        assert_eq!(merge_count(&mut v, &mut scratch), 7);
        assert_eq!(v, vec![0.0, 1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_single_row_is_all_nan() {
        let m = filled(&["x", "y"], array![[1.0, 2.0]]);
        let sim = correlate(&m, CorrelationMethod::Pearson).unwrap();
        assert!(sim.values().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_deterministic() {
        let a = correlate(&sample(), CorrelationMethod::Pearson).unwrap();
        let b = correlate(&sample(), CorrelationMethod::Pearson).unwrap();
        for (x, y) in a.values().iter().zip(b.values().iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(
            " Kendall ".parse::<CorrelationMethod>().unwrap(),
            CorrelationMethod::Kendall
        );
        assert!(matches!(
            "cosine".parse::<CorrelationMethod>(),
            Err(PipelineError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_table_roundtrip() {
        let sim = correlate(&sample(), CorrelationMethod::Pearson).unwrap();
        let table = sim.to_table();
        assert_eq!(table.headers[0], "");
        assert_eq!(table.rows[3][4], "");
        let back = SimilarityMatrix::from_table(&table).unwrap();
        assert_eq!(back.titles(), sim.titles());
        for (x, y) in back.values().iter().zip(sim.values().iter()) {
            assert!(x.is_nan() && y.is_nan() || x == y);
        }
    }

    #[test]
    fn test_from_table_rejects_non_square() {
        let mut table = correlate(&sample(), CorrelationMethod::Pearson).unwrap().to_table();
        table.rows.pop();
        assert!(matches!(
            SimilarityMatrix::from_table(&table),
            Err(PipelineError::SchemaMismatch(_))
        ));

        let mut table = correlate(&sample(), CorrelationMethod::Pearson).unwrap().to_table();
        table.rows[0][0] = "Z".to_string();
        assert!(matches!(
            SimilarityMatrix::from_table(&table),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }
}
