use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::{PipelineError, PipelineResult, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Outer,
    Left,
    Right,
}

impl FromStr for JoinKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinKind::Inner),
            "outer" => Ok(JoinKind::Outer),
            "left" => Ok(JoinKind::Left),
            "right" => Ok(JoinKind::Right),
            _ => Err(PipelineError::ConfigInvalid(format!(
                "unrecognized join kind {:?} (expected inner, outer, left or right)",
                s
            ))),
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinKind::Inner => "inner",
            JoinKind::Outer => "outer",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
        };
        f.write_str(s)
    }
}

/// Relational join of two tables on a shared key column.
///
/// The output has the left columns followed by the right columns without the
/// key. Cells with no counterpart on the other side are empty. Inner and left
/// joins keep the left row order (each left row expanded by its matches in
/// right order), a right join keeps the right row order, and an outer join is
/// the left join followed by the unmatched right rows.
pub fn join(left: &Table, right: &Table, on: &str, kind: JoinKind) -> PipelineResult<Table> {
    let lk = left.column_index(on)?;
    let rk = right.column_index(on)?;

    let left_names: HashSet<&str> = left.headers.iter().map(|h| h.as_str()).collect();
    if let Some(dup) = right
        .headers
        .iter()
        .enumerate()
        .find(|(i, h)| *i != rk && left_names.contains(h.as_str()))
        .map(|(_, h)| h)
    {
        return Err(PipelineError::SchemaMismatch(format!(
            "column {:?} exists on both sides of the join",
            dup
        )));
    }

    let mut headers = left.headers.clone();
    headers.extend(
        right
            .headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != rk)
            .map(|(_, h)| h.clone()),
    );

    let merge = |l: Option<&Vec<String>>, r: Option<&Vec<String>>| -> Vec<String> {
        let mut row = match l {
            Some(l) => l.clone(),
            None => {
                let mut blank = vec![String::new(); left.headers.len()];
                if let Some(r) = r {
                    blank[lk] = r[rk].clone();
                }
                blank
            }
        };
        for j in 0..right.headers.len() {
            if j != rk {
                row.push(r.map(|r| r[j].clone()).unwrap_or_default());
            }
        }
        row
    };

    let mut out = Table::new(headers);

    match kind {
        JoinKind::Inner | JoinKind::Left | JoinKind::Outer => {
            let right_index = index_rows(right, rk);
            for l in &left.rows {
                match right_index.get(l[lk].as_str()) {
                    Some(matches) => {
                        for &r in matches {
                            out.rows.push(merge(Some(l), Some(&right.rows[r])));
                        }
                    }
                    None if kind != JoinKind::Inner => out.rows.push(merge(Some(l), None)),
                    None => {}
                }
            }
            if kind == JoinKind::Outer {
                let left_keys: HashSet<&str> = left.rows.iter().map(|l| l[lk].as_str()).collect();
                for r in &right.rows {
                    if !left_keys.contains(r[rk].as_str()) {
                        out.rows.push(merge(None, Some(r)));
                    }
                }
            }
        }
        JoinKind::Right => {
            let left_index = index_rows(left, lk);
            for r in &right.rows {
                match left_index.get(r[rk].as_str()) {
                    Some(matches) => {
                        for &l in matches {
                            out.rows.push(merge(Some(&left.rows[l]), Some(r)));
                        }
                    }
                    None => out.rows.push(merge(None, Some(r))),
                }
            }
        }
    }

    debug!(
        "{} join on {}: {} x {} rows -> {} rows",
        kind,
        on,
        left.len(),
        right.len(),
        out.len()
    );
    Ok(out)
}

fn index_rows(table: &Table, key: usize) -> HashMap<&str, Vec<usize>> {
    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        index.entry(row[key].as_str()).or_default().push(i);
    }
    index
}
