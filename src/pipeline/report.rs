use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::atomic_write;

/// Parameters and output shape of one finished stage, written as
/// `<reports_dir>/<stage>.json` when run reports are enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub output: String,
    pub rows: usize,
    pub columns: usize,
    pub degenerate: bool,
    pub params: BTreeMap<String, String>,
    pub finished_at: DateTime<Utc>,
}

impl StageReport {
    pub fn new(stage: &str, output: &Path, rows: usize, columns: usize) -> Self {
        Self {
            stage: stage.to_string(),
            output: output.to_string_lossy().to_string(),
            rows,
            columns,
            degenerate: false,
            params: BTreeMap::new(),
            finished_at: Utc::now(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn write(&self, dir: &Path) -> io::Result<()> {
        let path = dir.join(format!("{}.json", self.stage));
        atomic_write(&path, |file| {
            serde_json::to_writer_pretty(file, self).map_err(io::Error::from)
        })
    }
}
