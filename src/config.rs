use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_data_root")]
    pub data_root: String,
    #[serde(default)]
    pub data_ingestion: IngestionConfig,
    #[serde(default)]
    pub data_preprocessing: PreprocessingConfig,
    #[serde(default)]
    pub feature_engineering: FeatureConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default = "default_logfile")]
    pub logfile: String,
    #[serde(default)]
    pub logdir: Option<String>,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub reports_dir: Option<String>,
    #[serde(skip)]
    pub debug_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            data_ingestion: IngestionConfig::default(),
            data_preprocessing: PreprocessingConfig::default(),
            feature_engineering: FeatureConfig::default(),
            prediction: PredictionConfig::default(),
            listen: ListenConfig::default(),
            logfile: default_logfile(),
            logdir: None,
            log_json: false,
            reports_dir: None,
            debug_logs: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    #[serde(default = "default_movies")]
    pub movies: String,
    #[serde(default = "default_ratings")]
    pub ratings: String,
    #[serde(default = "default_merged")]
    pub output: String,
    #[serde(default = "default_join_key")]
    pub on: String,
    #[serde(default = "default_join_kind")]
    pub how: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            movies: default_movies(),
            ratings: default_ratings(),
            output: default_merged(),
            on: default_join_key(),
            how: default_join_kind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreprocessingConfig {
    #[serde(default = "default_merged")]
    pub input: String,
    #[serde(default = "default_matrix")]
    pub output: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_columns")]
    pub columns: String,
    #[serde(default = "default_values")]
    pub values: String,
    #[serde(default = "default_drop_columns")]
    pub drop_columns: Vec<String>,
    #[serde(default = "default_thresh")]
    pub thresh: usize,
    #[serde(default)]
    pub strategy: FillStrategy,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            input: default_merged(),
            output: default_matrix(),
            index: default_index(),
            columns: default_columns(),
            values: default_values(),
            drop_columns: default_drop_columns(),
            thresh: default_thresh(),
            strategy: FillStrategy::default(),
        }
    }
}

/// Value used for cells that are still missing after sparse columns are dropped.
///
/// The YAML may carry either a number (`strategy: 0`) or a string
/// (`strategy: "0"`). Strings are kept as written and checked when the
/// preprocessing stage starts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FillStrategy {
    Number(f64),
    Label(String),
}

impl Default for FillStrategy {
    fn default() -> Self {
        FillStrategy::Number(0.0)
    }
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillStrategy::Number(n) => write!(f, "{}", n),
            FillStrategy::Label(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureConfig {
    #[serde(default = "default_matrix")]
    pub input: String,
    #[serde(default = "default_artifact")]
    pub output: String,
    #[serde(default = "default_method")]
    pub method: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            input: default_matrix(),
            output: default_artifact(),
            method: default_method(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictionConfig {
    #[serde(default = "default_artifact")]
    pub artifact: String,
    #[serde(default = "default_midpoint")]
    pub midpoint: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub exclude_seed: bool,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            artifact: default_artifact(),
            midpoint: default_midpoint(),
            top_k: default_top_k(),
            exclude_seed: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_port")]
    pub port: String,
    /// Seconds between artifact modification checks. Zero disables the check.
    #[serde(default)]
    pub refresh_interval: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: default_port(),
            refresh_interval: 0,
        }
    }
}

fn default_data_root() -> String {
    ".".to_string()
}

fn default_movies() -> String {
    "movies.csv".to_string()
}

fn default_ratings() -> String {
    "ratings.csv".to_string()
}

fn default_merged() -> String {
    "data/raw/merged_data.csv".to_string()
}

fn default_matrix() -> String {
    "data/processed/user_movie_matrix.csv".to_string()
}

fn default_artifact() -> String {
    "data/features/movie_correlations.csv".to_string()
}

fn default_join_key() -> String {
    "movieId".to_string()
}

fn default_join_kind() -> String {
    "inner".to_string()
}

fn default_index() -> String {
    "userId".to_string()
}

fn default_columns() -> String {
    "title".to_string()
}

fn default_values() -> String {
    "rating".to_string()
}

fn default_drop_columns() -> Vec<String> {
    vec!["genres".to_string(), "timestamp".to_string()]
}

fn default_thresh() -> usize {
    10
}

fn default_method() -> String {
    "pearson".to_string()
}

fn default_midpoint() -> f64 {
    2.5
}

fn default_top_k() -> usize {
    10
}

fn default_port() -> String {
    "8000".to_string()
}

fn default_logfile() -> String {
    "stdout".to_string()
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_string(), e))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_string(), e))?;

        Ok(config)
    }

    /// Resolve a configured path against `data_root`. Absolute paths are kept.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            return p.to_path_buf();
        }
        PathBuf::from(&self.data_root).join(p)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.resolve(&self.prediction.artifact)
    }

    pub fn reports_path(&self) -> Option<PathBuf> {
        self.reports_dir.as_deref().map(|d| self.resolve(d))
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        if self.logfile != "stdout" {
            return Some(self.resolve(&self.logfile));
        }
        let dir = self.logdir.as_deref()?;
        let name = format!("{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        Some(self.resolve(dir).join(name))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(String, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(String, serde_yaml::Error),
}
