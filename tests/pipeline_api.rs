use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use cinecorr::config::Config;
use cinecorr::pipeline::{self, SimilarityMatrix, Stage, Table};
use cinecorr::recommend::SimilarityStore;
use cinecorr::server::{build_router, AppState};

const TITLES: [&str; 12] = [
    "Matrix, The (1999)",
    "Alien (1979)",
    "Heat (1995)",
    "Up (2009)",
    "Cars (2006)",
    "Fargo (1996)",
    "Se7en (1995)",
    "Jaws (1975)",
    "Rocky (1976)",
    "Psycho (1960)",
    "Brazil (1985)",
    "Ran (1985)",
];

fn write_dataset(dir: &Path) {
    let mut movies = String::from("movieId,title,genres\n");
    for (i, title) in TITLES.iter().enumerate() {
        movies.push_str(&format!("{},\"{}\",Drama\n", i + 1, title));
    }
    fs::write(dir.join("movies.csv"), movies).unwrap();

    let mut ratings = String::from("userId,movieId,rating,timestamp\n");
    for u in 1..=8 {
        for m in 1..=TITLES.len() {
            if (u + m) % 5 == 0 {
                continue;
            }
            let rating = ((u * 7 + m * 3) % 10 + 1) as f64 / 2.0;
            ratings.push_str(&format!("{},{},{},{}\n", u, m, rating, 1000 + u * m));
        }
    }
    // a movie nobody rated and a rating for a movie missing from the catalog
    ratings.push_str("3,99,4.0,1\n");
    fs::write(dir.join("ratings.csv"), ratings).unwrap();
}

fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data_root = dir.to_string_lossy().to_string();
    config.data_preprocessing.thresh = 3;
    config
}

fn build_artifact(dir: &Path) -> Config {
    write_dataset(dir);
    let config = config_in(dir);
    pipeline::run_all(&config).unwrap();
    config
}

fn app(config: Config) -> axum::Router {
    let store = Arc::new(SimilarityStore::open(config.artifact_path()).unwrap());
    build_router(AppState::new(config, store))
}

async fn post(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::post(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[test]
fn test_pipeline_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_artifact(dir.path());

    let merged = Table::read_csv(&dir.path().join("data/raw/merged_data.csv")).unwrap();
    assert!(merged.rows.iter().all(|r| r[0] != "99"));

    let matrix = Table::read_csv(&dir.path().join("data/processed/user_movie_matrix.csv")).unwrap();
    assert_eq!(matrix.headers[0], "userId");
    assert_eq!(matrix.len(), 8);
    assert!(matrix.rows.iter().flatten().all(|c| !c.is_empty()));

    let table = Table::read_csv(&config.artifact_path()).unwrap();
    let sim = SimilarityMatrix::from_table(&table).unwrap();
    assert_eq!(sim.len(), TITLES.len());
    for a in sim.titles() {
        for b in sim.titles() {
            let (x, y) = (sim.get(a, b).unwrap(), sim.get(b, a).unwrap());
            assert!(x.is_nan() && y.is_nan() || (x - y).abs() < 1e-12);
        }
    }
}

#[test]
fn test_thresh_above_user_count() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let mut config = config_in(dir.path());
    config.data_preprocessing.thresh = 1000;

    pipeline::run_stage(&config, Stage::Ingest).unwrap();
    let report = pipeline::run_stage(&config, Stage::Preprocess).unwrap();
    assert!(report.degenerate);
    assert_eq!(report.columns, 0);
}

#[tokio::test]
async fn test_predict_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_artifact(dir.path());
    let sim = SimilarityMatrix::from_table(&Table::read_csv(&config.artifact_path()).unwrap()).unwrap();

    let (status, body) = post(app(config), "/predict/Matrix,%20The%20(1999)/5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["movie_name"], "Matrix, The (1999)");
    assert_eq!(body["rating"], 5);

    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 10);
    let scores: Vec<f64> = recs.iter().map(|r| r["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    let seed = "Matrix, The (1999)";
    let mut others: Vec<f64> = sim
        .titles()
        .iter()
        .filter(|t| t.as_str() != seed)
        .filter_map(|t| sim.get(seed, t))
        .filter(|v| !v.is_nan())
        .collect();
    others.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let floor = others[9] * 2.5;
    assert!(scores.iter().all(|s| *s >= floor - 1e-12));
}

#[tokio::test]
async fn test_predict_unknown_movie() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_artifact(dir.path());

    let (status, body) = post(app(config), "/predict/Solaris%20(1972)/4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("Solaris (1972)"));
    assert!(body.get("recommendations").is_none());
}

#[tokio::test]
async fn test_predict_bad_rating_and_query() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_artifact(dir.path());
    let app = app(config);

    let (status, body) = post(app.clone(), "/predict/Heat%20(1995)/great").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, body) = post(app.clone(), "/predict/Heat%20(1995)/4?k=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, body) = post(app, "/predict/Heat%20(1995)/4?k=3&excludeSeed=true").await;
    assert_eq!(status, StatusCode::OK);
    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 3);
    assert!(recs.iter().all(|r| r["movie"] != "Heat (1995)"));
}

#[tokio::test]
async fn test_midpoint_rating_keeps_column_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = build_artifact(dir.path());
    config.prediction.midpoint = 3.0;
    config.prediction.top_k = 20;
    let sim = SimilarityMatrix::from_table(&Table::read_csv(&config.artifact_path()).unwrap()).unwrap();

    let (status, body) = post(app(config), "/predict/Up%20(2009)/3").await;
    assert_eq!(status, StatusCode::OK);
    let recs = body["recommendations"].as_array().unwrap();
    let defined: Vec<&str> = sim
        .titles()
        .iter()
        .filter(|t| !sim.get("Up (2009)", t).unwrap().is_nan())
        .map(|t| t.as_str())
        .collect();
    let got: Vec<&str> = recs
        .iter()
        .take(defined.len())
        .map(|r| r["movie"].as_str().unwrap())
        .collect();
    assert_eq!(got, defined);
    assert!(recs.iter().take(defined.len()).all(|r| r["score"] == 0.0));
}

#[tokio::test]
async fn test_reload_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_artifact(dir.path());
    let app = app(config);

    let (status, body) = post(app.clone(), "/admin/reload").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movies"], TITLES.len());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_wrong_method_is_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_artifact(dir.path());

    let response = app(config)
        .oneshot(
            Request::get("/predict/Heat%20(1995)/4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("GET"));
}

#[test]
fn test_na_ratings_do_not_break_features() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let ratings = dir.path().join("ratings.csv");
    let mut text = fs::read_to_string(&ratings).unwrap();
    text.push_str("1,5,NaN,1\n2,5,nan,1\n4,6,NA,1\n");
    fs::write(&ratings, text).unwrap();

    let config = config_in(dir.path());
    pipeline::run_all(&config).unwrap();

    let matrix = Table::read_csv(&dir.path().join("data/processed/user_movie_matrix.csv")).unwrap();
    assert!(matrix.rows.iter().flatten().all(|c| !c.is_empty()));
    assert!(config.artifact_path().exists());
}
