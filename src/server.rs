use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use crate::config::Config;
use crate::recommend::{types::ErrorResponse, SimilarityStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SimilarityStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<SimilarityStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

/// Routes and per-request layers. Path normalisation has to run before
/// routing, so `lib::serve` wraps the returned router in it.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/predict/:movie_name/:rating",
            post(crate::recommend::predict),
        )
        .route("/admin/reload", post(crate::recommend::reload))
        .route("/health", get(crate::recommend::health))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(fallback_handler)
        .layer(axum::middleware::from_fn(crate::middleware::log_request))
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_body(status: StatusCode, message: String) -> Response {
    let body = ErrorResponse {
        status: "error".to_string(),
        message,
    };
    (status, Json(body)).into_response()
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Request handler panicked: {}", detail);
    error_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}

async fn fallback_handler(req: Request) -> Response {
    if req.method() == axum::http::Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    error_body(
        StatusCode::NOT_FOUND,
        format!("no route for {} {}", req.method(), req.uri().path()),
    )
}

async fn method_not_allowed(req: Request) -> Response {
    if req.method() == axum::http::Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    error_body(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("{} is not allowed on {}", req.method(), req.uri().path()),
    )
}
