//! acquire: fetch the series archive into the download directory

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::artifact::ArtifactRef;
use crate::error::StageError;
use crate::task::{Task, TaskParams};

use super::{partial_path, Stage, StageContext};

#[derive(Debug, Clone)]
pub struct Acquire {
    ctx: Arc<StageContext>,
}

impl Acquire {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    /// `<download_dir>/<dataset>_RAW.tar`
    pub fn archive_path(&self) -> PathBuf {
        let config = &self.ctx.config;
        config
            .download_dir()
            .join(format!("{}_RAW.tar", config.dataset))
    }
}

impl Task for Acquire {
    fn name(&self) -> &str {
        Stage::Acquire.as_str()
    }

    fn params(&self) -> TaskParams {
        let config = &self.ctx.config;
        TaskParams::new()
            .with("dataset", &config.dataset)
            .with("download_dir", config.download_dir().display())
            .with("source_url", config.source_url())
    }

    fn output(&self) -> ArtifactRef {
        ArtifactRef::file(self.archive_path())
    }

    fn execute(&self, _inputs: &[ArtifactRef]) -> Result<(), StageError> {
        let dest = self.archive_path();
        let url = self.ctx.config.source_url();
        let dir = self.ctx.config.download_dir();
        fs::create_dir_all(&dir).map_err(|e| StageError::output(&dir, e))?;

        info!(%url, "Downloading dataset");

        // Only a finished transfer appears at the output path
        let partial = partial_path(&dest);
        let bytes = match self.ctx.fetcher.fetch(&url, &partial) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };
        fs::rename(&partial, &dest).map_err(|e| StageError::output(&dest, e))?;

        info!(path = %dest.display(), bytes, "Dataset downloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::stages::fetch::Fetcher;
    use std::path::Path;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct Canned(Option<&'static [u8]>);

    impl Fetcher for Canned {
        fn fetch(&self, url: &str, dest: &Path) -> Result<u64, StageError> {
            match self.0 {
                Some(bytes) => {
                    fs::write(dest, bytes).unwrap();
                    Ok(bytes.len() as u64)
                }
                None => {
                    // Leave debris behind like an interrupted transfer
                    fs::write(dest, b"half").unwrap();
                    Err(StageError::Acquire {
                        url: url.to_string(),
                        reason: "connection reset".into(),
                    })
                }
            }
        }
    }

    fn acquire(tmp: &TempDir, fetcher: Canned) -> Acquire {
        let config = PipelineConfig {
            work_dir: Some(tmp.path().to_path_buf()),
            ..PipelineConfig::default()
        };
        Acquire::new(StageContext::new(config, Arc::new(fetcher)))
    }

    #[test]
    fn output_is_dataset_archive_in_download_dir() {
        let tmp = TempDir::new().unwrap();
        let task = acquire(&tmp, Canned(None));
        assert_eq!(
            task.output().locate(),
            tmp.path().join("data_downloads/GSE68849_RAW.tar")
        );
        assert!(task.dependencies().is_empty());
    }

    #[test]
    fn success_writes_archive() {
        let tmp = TempDir::new().unwrap();
        let task = acquire(&tmp, Canned(Some(b"tar bytes")));

        task.execute(&[]).unwrap();

        assert!(task.output().exists());
        assert!(!partial_path(&task.archive_path()).exists());
    }

    #[test]
    fn failed_fetch_leaves_no_output() {
        let tmp = TempDir::new().unwrap();
        let task = acquire(&tmp, Canned(None));

        let err = task.execute(&[]).unwrap_err();

        assert!(matches!(err, StageError::Acquire { .. }));
        assert!(!task.output().exists());
        assert!(!partial_path(&task.archive_path()).exists());
    }

    #[test]
    fn identity_includes_expanded_source() {
        let tmp = TempDir::new().unwrap();
        let id = acquire(&tmp, Canned(None)).id();
        assert_eq!(id.params().get("dataset"), Some("GSE68849"));
        assert!(id.params().get("source_url").unwrap().contains("GSE68nnn"));
    }
}
