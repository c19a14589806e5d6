use serde::{Deserialize, Serialize};

use super::Recommendation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMovie {
    pub movie: String,
    /// `None` when the correlation is undefined.
    pub score: Option<f64>,
}

impl From<Recommendation> for ScoredMovie {
    fn from(r: Recommendation) -> Self {
        Self {
            movie: r.movie,
            score: Some(r.score).filter(|s| !s.is_nan()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub status: String,
    pub movie_name: String,
    pub rating: i64,
    pub recommendations: Vec<ScoredMovie>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub status: String,
    pub artifact: String,
    pub movies: usize,
    #[serde(rename = "loadedAt")]
    pub loaded_at: String,
}
