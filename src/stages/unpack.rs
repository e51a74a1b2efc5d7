//! unpack: extract every member of the series archive

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::artifact::ArtifactRef;
use crate::error::StageError;
use crate::task::{Task, TaskParams, TaskRef};

use super::{build_dir, single_input, Acquire, Stage, StageContext};

#[derive(Debug, Clone)]
pub struct Unpack {
    ctx: Arc<StageContext>,
}

impl Unpack {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

impl Task for Unpack {
    fn name(&self) -> &str {
        Stage::Unpack.as_str()
    }

    fn params(&self) -> TaskParams {
        let config = &self.ctx.config;
        TaskParams::new()
            .with("dataset", &config.dataset)
            .with("download_dir", config.download_dir().display())
            .with("extract_dir", config.extract_dir().display())
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        vec![Arc::new(Acquire::new(Arc::clone(&self.ctx)))]
    }

    fn output(&self) -> ArtifactRef {
        ArtifactRef::dir(self.ctx.config.extract_dir())
    }

    fn execute(&self, inputs: &[ArtifactRef]) -> Result<(), StageError> {
        let archive = single_input(inputs, Stage::Unpack)?;
        let dest = self.ctx.config.extract_dir();

        build_dir(&dest, |staging| extract_all(archive, staging))?;

        info!(path = %dest.display(), "Files extracted");
        Ok(())
    }
}

/// Unpack every member of a tar archive into `dest`.
///
/// Members whose paths would land outside `dest` are skipped by the extractor.
pub fn extract_all(archive: &Path, dest: &Path) -> Result<(), StageError> {
    let file = File::open(archive).map_err(|e| StageError::Unpack {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut tar = tar::Archive::new(BufReader::new(file));
    tar.unpack(dest).map_err(|e| StageError::Unpack {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })
}
