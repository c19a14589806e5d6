use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use super::types::*;
use super::{recommend, RankOptions, RecommendError};
use crate::server::AppState;
use crate::util::QueryParams;

/// Every failure leaves the handlers as a JSON error payload.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl From<RecommendError> for ApiError {
    fn from(e: RecommendError) -> Self {
        match e {
            RecommendError::NotFound(_) => ApiError::NotFound(e.to_string()),
            RecommendError::InvalidRating(_) => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            status: "error".to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn predict(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Path((movie_name, rating)) = path.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let Query(params) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let rating: i64 = rating
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("rating must be an integer, got {:?}", rating)))?;

    let mut options = RankOptions::from(&state.config.prediction);
    if let Some(k) = params
        .parse::<usize>("k")
        .map_err(|v| ApiError::BadRequest(format!("k must be a non-negative integer, got {:?}", v)))?
    {
        options.k = k;
    }
    if let Some(exclude) = params
        .flag("excludeSeed")
        .map_err(|v| ApiError::BadRequest(format!("excludeSeed must be true or false, got {:?}", v)))?
    {
        options.exclude_seed = exclude;
    }

    info!(movie = %movie_name, rating, "Getting recommendations");

    let artifact = state.store.snapshot();
    let recommendations = recommend(&artifact.matrix, &movie_name, rating as f64, &options)
        .map_err(|e| {
            warn!("Recommendation for {:?} failed: {}", movie_name, e);
            ApiError::from(e)
        })?;

    info!("Generated {} recommendations", recommendations.len());

    Ok(Json(PredictResponse {
        status: "success".to_string(),
        movie_name,
        rating,
        recommendations: recommendations.into_iter().map(ScoredMovie::from).collect(),
    }))
}

pub async fn reload(State(state): State<AppState>) -> Result<Json<ArtifactInfo>, ApiError> {
    let store = state.store.clone();
    let artifact = tokio::task::spawn_blocking(move || store.reload())
        .await
        .map_err(|e| ApiError::Internal(format!("reload task failed: {}", e)))?
        .map_err(|e| {
            warn!("Artifact reload failed: {}", e);
            ApiError::Internal(e.to_string())
        })?;

    Ok(Json(ArtifactInfo {
        status: "success".to_string(),
        artifact: state.store.path().to_string_lossy().to_string(),
        movies: artifact.matrix.len(),
        loaded_at: artifact.loaded_at.to_rfc3339(),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<ArtifactInfo> {
    let artifact = state.store.snapshot();
    Json(ArtifactInfo {
        status: "ok".to_string(),
        artifact: state.store.path().to_string_lossy().to_string(),
        movies: artifact.matrix.len(),
        loaded_at: artifact.loaded_at.to_rfc3339(),
    })
}
