use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::pipeline::{PipelineResult, SimilarityMatrix, Table};

/// One loaded generation of the similarity artifact.
#[derive(Debug)]
pub struct Artifact {
    pub matrix: SimilarityMatrix,
    pub loaded_at: DateTime<Utc>,
    pub modified: Option<SystemTime>,
}

impl Artifact {
    fn load(path: &Path) -> PipelineResult<Self> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let matrix = SimilarityMatrix::from_table(&Table::read_csv(path)?)?;
        Ok(Self {
            matrix,
            loaded_at: Utc::now(),
            modified,
        })
    }
}

/// Read-mostly holder of the similarity artifact used by the serving side.
///
/// Requests take a snapshot and keep using it even if a reload happens
/// meanwhile. A reload parses the complete new file before swapping it in, so
/// a failed or half-written file never replaces a good artifact.
pub struct SimilarityStore {
    path: PathBuf,
    current: ArcSwap<Artifact>,
}

impl SimilarityStore {
    pub fn open(path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let path = path.into();
        let artifact = Artifact::load(&path)?;
        info!(
            "Loaded similarity matrix for {} movies from {}",
            artifact.matrix.len(),
            path.display()
        );
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(artifact),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Artifact> {
        self.current.load_full()
    }

    pub fn reload(&self) -> PipelineResult<Arc<Artifact>> {
        let artifact = Arc::new(Artifact::load(&self.path)?);
        self.current.store(artifact.clone());
        info!(
            "Reloaded similarity matrix for {} movies from {}",
            artifact.matrix.len(),
            self.path.display()
        );
        Ok(artifact)
    }

    /// Reload only when the file's modification time differs from the loaded one.
    pub fn reload_if_modified(&self) -> PipelineResult<bool> {
        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if modified.is_none() || modified == self.current.load().modified {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }

    pub fn start_background_refresh(self: Arc<Self>, interval_secs: u64) {
        if interval_secs == 0 {
            return;
        }
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let store = self.clone();
                match tokio::task::spawn_blocking(move || store.reload_if_modified()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!("Background artifact refresh failed: {}", e),
                    Err(e) => error!("Background artifact refresh panicked: {}", e),
                }
            }
        });
    }
}
