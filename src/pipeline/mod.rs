pub mod join;
pub mod matrix;
pub mod report;
pub mod similarity;
pub mod stages;
pub mod table;

use std::path::PathBuf;

pub use join::{join, JoinKind};
pub use matrix::{fill, fill_value, pivot, FilledMatrix, RatingsMatrix};
pub use report::StageReport;
pub use similarity::{correlate, CorrelationMethod, SimilarityMatrix};
pub use stages::{run_all, run_stage, Stage};
pub use table::Table;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Input missing: {}: {source}", .path.display())]
    InputMissing {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed CSV in {}: {source}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Invalid value {value:?} at row {row:?}, column {column:?}")]
    InvalidValue {
        row: String,
        column: String,
        value: String,
    },
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
