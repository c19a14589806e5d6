pub mod handlers;
pub mod ranker;
pub mod store;
pub mod types;

use std::path::Path;

pub use handlers::{health, predict, reload, ApiError};
pub use ranker::{recommend, RankOptions, Recommendation};
pub use store::{Artifact, SimilarityStore};

use crate::pipeline::{PipelineResult, Table};
use crate::pipeline::table::format_number;

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("Movie not found: {0}")]
    NotFound(String),
    #[error("Invalid rating: {0}")]
    InvalidRating(f64),
}

/// Save a ranked list as a two column `title,score` CSV.
pub fn save_recommendations(path: &Path, recommendations: &[Recommendation]) -> PipelineResult<()> {
    let mut table = Table::new(vec!["title".to_string(), "score".to_string()]);
    for r in recommendations {
        table.rows.push(vec![r.movie.clone(), format_number(r.score)]);
    }
    table.write_csv(path)
}
