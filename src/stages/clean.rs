//! clean: remove intermediate locations, then write the completion marker
//!
//! The marker's existence means the whole pipeline finished for the dataset.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::artifact::ArtifactRef;
use crate::error::StageError;
use crate::task::{Task, TaskParams, TaskRef};

use super::{Project, Stage, StageContext};

pub const MARKER_CONTENT: &str = "Cleanup completed.";

#[derive(Debug, Clone)]
pub struct Clean {
    ctx: Arc<StageContext>,
}

impl Clean {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

impl Task for Clean {
    fn name(&self) -> &str {
        Stage::Clean.as_str()
    }

    fn params(&self) -> TaskParams {
        let config = &self.ctx.config;
        let cleanup = config
            .cleanup_dirs()
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        TaskParams::new()
            .with("dataset", &config.dataset)
            .with("cleanup_dirs", cleanup)
            .with("marker", config.marker().display())
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        vec![Arc::new(Project::new(Arc::clone(&self.ctx)))]
    }

    fn output(&self) -> ArtifactRef {
        ArtifactRef::file(self.ctx.config.marker())
    }

    fn execute(&self, _inputs: &[ArtifactRef]) -> Result<(), StageError> {
        for location in self.ctx.config.cleanup_dirs() {
            if remove_location(&location)? {
                info!(path = %location.display(), "Cleaned location");
            }
        }

        let marker = self.ctx.config.marker();
        if let Some(parent) = marker.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StageError::output(parent, e))?;
        }
        fs::write(&marker, MARKER_CONTENT).map_err(|e| StageError::output(&marker, e))
    }
}

/// Remove a directory tree or file; `Ok(false)` when nothing was there
fn remove_location(path: &Path) -> Result<bool, StageError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(StageError::output(path, e)),
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| StageError::output(path, e))?;
    Ok(true)
}
