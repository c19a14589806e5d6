pub mod config;
pub mod middleware;
pub mod pipeline;
pub mod recommend;
pub mod server;
pub mod util;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use config::Config;
use recommend::{RankOptions, Recommendation, SimilarityStore};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] pipeline::PipelineError),
    #[error("Recommendation error: {0}")]
    Recommend(#[from] recommend::RecommendError),
    #[error("Server error: {0}")]
    Server(String),
}

/// Load the similarity artifact and serve lookups until the process exits.
pub async fn serve(config: Config) -> Result<(), Error> {
    let artifact = config.artifact_path();
    info!("Loading similarity artifact from {}", artifact.display());
    let store = Arc::new(SimilarityStore::open(artifact)?);

    store
        .clone()
        .start_background_refresh(config.listen.refresh_interval);

    let address = config.listen.address.as_deref().unwrap_or("[::]");
    let addr: SocketAddr = format!("{}:{}", address, config.listen.port)
        .parse()
        .map_err(|e| Error::Server(format!("Invalid address: {}", e)))?;

    let state = server::AppState::new(config, store);
    let router = server::build_router(state);
    let app = tower::Layer::layer(
        &axum::middleware::from_fn(middleware::normalize_path),
        router,
    );

    info!("Serving HTTP on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("Failed to bind: {}", e)))?;

    axum::serve(
        listener,
        axum::ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .await
    .map_err(|e| Error::Server(format!("Server error: {}", e)))?;

    Ok(())
}

/// One-off lookup against the persisted artifact, optionally saved as CSV.
pub fn recommend_once(
    config: &Config,
    movie: &str,
    rating: f64,
    options: &RankOptions,
    output: Option<&Path>,
) -> Result<Vec<Recommendation>, Error> {
    let store = SimilarityStore::open(config.artifact_path())?;
    let recommendations = recommend::recommend(&store.snapshot().matrix, movie, rating, options)?;
    if let Some(path) = output {
        recommend::save_recommendations(path, &recommendations)?;
        info!("Saved {} recommendations to {}", recommendations.len(), path.display());
    }
    Ok(recommendations)
}
