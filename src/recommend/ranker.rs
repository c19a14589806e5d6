use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use super::RecommendError;
use crate::config::PredictionConfig;
use crate::pipeline::SimilarityMatrix;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub movie: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankOptions {
    /// Centre of the rating scale. Ratings above it favour positively
    /// correlated movies, ratings below it negatively correlated ones.
    pub midpoint: f64,
    pub k: usize,
    pub exclude_seed: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            midpoint: 2.5,
            k: 10,
            exclude_seed: false,
        }
    }
}

impl From<&PredictionConfig> for RankOptions {
    fn from(c: &PredictionConfig) -> Self {
        Self {
            midpoint: c.midpoint,
            k: c.top_k,
            exclude_seed: c.exclude_seed,
        }
    }
}

/// Rank every movie by its correlation with `seed_movie`, weighted by how far
/// `seed_rating` is from the midpoint, and return the best `k`.
///
/// Equal scores keep the matrix column order. Undefined (NaN) scores sort
/// after every defined score. The seed itself is part of the ranking unless
/// `exclude_seed` is set.
pub fn recommend(
    matrix: &SimilarityMatrix,
    seed_movie: &str,
    seed_rating: f64,
    options: &RankOptions,
) -> Result<Vec<Recommendation>, RecommendError> {
    if !seed_rating.is_finite() {
        return Err(RecommendError::InvalidRating(seed_rating));
    }
    let column = matrix
        .column(seed_movie)
        .ok_or_else(|| RecommendError::NotFound(seed_movie.to_string()))?;
    let weight = seed_rating - options.midpoint;
    let titles = matrix.titles();

    // + 0.0 turns the -0.0 of a negative correlation at the midpoint into 0
    let mut scored: Vec<(usize, f64)> = column
        .iter()
        .enumerate()
        .filter(|(j, _)| !(options.exclude_seed && titles[*j] == seed_movie))
        .map(|(j, sim)| (j, sim * weight + 0.0))
        .collect();

    // sort_by is stable, so ties stay in column order
    scored.sort_by(|a, b| by_score_desc(a.1, b.1));
    scored.truncate(options.k);

    debug!(
        "Ranked {} movies for {:?} with weight {}",
        matrix.len(),
        seed_movie,
        weight
    );

    Ok(scored
        .into_iter()
        .map(|(j, score)| Recommendation {
            movie: titles[j].clone(),
            score,
        })
        .collect())
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
