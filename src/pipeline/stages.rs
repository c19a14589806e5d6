use std::fmt;
use std::str::FromStr;

use tracing::{error, info, info_span, warn};

use super::{
    correlate, fill, fill_value, join, pivot, CorrelationMethod, FilledMatrix, JoinKind,
    PipelineError, PipelineResult, StageReport, Table,
};
use crate::config::Config;

/// Batch stages in execution order. Each reads the previous stage's output
/// file and writes its own; nothing else is shared between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Preprocess,
    Features,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Ingest, Stage::Preprocess, Stage::Features];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Preprocess => "preprocess",
            Stage::Features => "features",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| PipelineError::ConfigInvalid(format!("unknown stage {:?}", s)))
    }
}

/// Run one stage. Failures are logged and returned; the stage's output file
/// is only replaced when the stage succeeds.
pub fn run_stage(config: &Config, stage: Stage) -> PipelineResult<StageReport> {
    let span = info_span!("stage", name = stage.name());
    let _enter = span.enter();

    info!("Starting {} stage", stage);
    let result = match stage {
        Stage::Ingest => ingest(config),
        Stage::Preprocess => preprocess(config),
        Stage::Features => features(config),
    };

    match &result {
        Ok(report) => {
            if report.degenerate {
                warn!(
                    degenerate = true,
                    rows = report.rows,
                    "{} stage produced an empty matrix",
                    stage
                );
            }
            if let Some(dir) = config.reports_path() {
                if let Err(e) = report.write(&dir) {
                    warn!("Failed to write run report to {}: {}", dir.display(), e);
                }
            }
            info!(
                "Finished {} stage: {} rows x {} columns written to {}",
                stage, report.rows, report.columns, report.output
            );
        }
        Err(e) => error!("{} stage failed: {}", stage, e),
    }
    result
}

/// Run every stage in order, stopping at the first failure.
pub fn run_all(config: &Config) -> PipelineResult<Vec<StageReport>> {
    Stage::ALL
        .into_iter()
        .map(|stage| run_stage(config, stage))
        .collect()
}

fn ingest(config: &Config) -> PipelineResult<StageReport> {
    let c = &config.data_ingestion;
    let how: JoinKind = c.how.parse()?;

    let movies_path = config.resolve(&c.movies);
    let ratings_path = config.resolve(&c.ratings);
    info!("Reading {} and {}", movies_path.display(), ratings_path.display());
    let movies = Table::read_csv(&movies_path)?;
    let ratings = Table::read_csv(&ratings_path)?;

    info!("Merging on column {} with method {}", c.on, how);
    let merged = join(&movies, &ratings, &c.on, how)?;

    let output = config.resolve(&c.output);
    merged.write_csv(&output)?;

    Ok(StageReport::new(Stage::Ingest.name(), &output, merged.len(), merged.headers.len())
        .param("on", &c.on)
        .param("how", how)
        .param("movies", movies.len())
        .param("ratings", ratings.len()))
}

fn preprocess(config: &Config) -> PipelineResult<StageReport> {
    let c = &config.data_preprocessing;
    let value = fill_value(&c.strategy)?;

    let input = config.resolve(&c.input);
    let mut table = Table::read_csv(&input)?;
    table.drop_columns(&c.drop_columns);

    info!(
        "Creating pivot table with index={}, columns={}, values={}",
        c.index, c.columns, c.values
    );
    let matrix = pivot(&table, &c.index, &c.columns, &c.values)?;
    info!(
        "Ratings matrix is {} x {} with {} missing cells",
        matrix.row_keys.len(),
        matrix.columns.len(),
        matrix.missing_cells()
    );

    info!("Filling missing values with thresh={} and strategy={}", c.thresh, c.strategy);
    let filled = fill(&matrix, c.thresh, value);

    let output = config.resolve(&c.output);
    filled.to_table().write_csv(&output)?;

    let mut report = StageReport::new(
        Stage::Preprocess.name(),
        &output,
        filled.row_keys.len(),
        filled.columns.len(),
    )
    .param("thresh", c.thresh)
    .param("strategy", &c.strategy)
    .param("dropped_columns", matrix.columns.len() - filled.columns.len());
    report.degenerate = filled.is_degenerate();
    Ok(report)
}

fn features(config: &Config) -> PipelineResult<StageReport> {
    let c = &config.feature_engineering;
    let method: CorrelationMethod = c.method.parse()?;

    let input = config.resolve(&c.input);
    let filled = FilledMatrix::from_table(&Table::read_csv(&input)?)?;

    info!(
        "Calculating {} correlation between {} movies",
        method,
        filled.columns.len()
    );
    let similarity = correlate(&filled, method)?;

    let output = config.resolve(&c.output);
    similarity.to_table().write_csv(&output)?;

    let mut report = StageReport::new(
        Stage::Features.name(),
        &output,
        similarity.len(),
        similarity.len(),
    )
    .param("method", method);
    report.degenerate = similarity.is_empty();
    Ok(report)
}
