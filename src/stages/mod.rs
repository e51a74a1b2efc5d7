//! The five dataset stages
//!
//! acquire -> unpack -> normalize -> project -> clean
//!
//! Each stage is a `Task` built from a shared `StageContext`. A stage declares
//! its upstream by constructing it from the same context, so every stage sees the
//! same dataset id and locations.

pub mod acquire;
pub mod clean;
pub mod fetch;
pub mod normalize;
pub mod project;
pub mod unpack;

use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, StageError};
use crate::task::TaskRef;

pub use acquire::Acquire;
pub use clean::Clean;
pub use fetch::{Fetcher, UrlFetcher};
pub use normalize::Normalize;
pub use project::Project;
pub use unpack::Unpack;

/// Immutable inputs shared by every stage of a run
#[derive(Debug)]
pub struct StageContext {
    pub config: PipelineConfig,
    pub fetcher: Arc<dyn Fetcher>,
}

impl StageContext {
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn Fetcher>) -> Arc<Self> {
        Arc::new(Self { config, fetcher })
    }
}

/// Stage names, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Acquire,
    Unpack,
    Normalize,
    Project,
    Clean,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Acquire,
        Stage::Unpack,
        Stage::Normalize,
        Stage::Project,
        Stage::Clean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Unpack => "unpack",
            Stage::Normalize => "normalize",
            Stage::Project => "project",
            Stage::Clean => "clean",
        }
    }

    /// Build the task for this stage (its upstream chain comes with it)
    pub fn task(&self, ctx: &Arc<StageContext>) -> TaskRef {
        let ctx = Arc::clone(ctx);
        match self {
            Stage::Acquire => Arc::new(Acquire::new(ctx)),
            Stage::Unpack => Arc::new(Unpack::new(ctx)),
            Stage::Normalize => Arc::new(Normalize::new(ctx)),
            Stage::Project => Arc::new(Project::new(ctx)),
            Stage::Clean => Arc::new(Clean::new(ctx)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PipelineError::UnknownStage {
                name: s.to_string(),
                expected: Stage::ALL.map(|s| s.as_str()).join(", "),
            })
    }
}

/// Fill `<dest>.partial`, then rename it to `dest`.
///
/// A failed fill leaves no directory at `dest` and removes the staging
/// directory, so the stage stays incomplete and nothing is left behind.
pub(crate) fn build_dir<F>(dest: &Path, fill: F) -> Result<(), StageError>
where
    F: FnOnce(&Path) -> Result<(), StageError>,
{
    let staging = partial_path(dest);
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| StageError::output(&staging, e))?;
    }
    fs::create_dir_all(&staging).map_err(|e| StageError::output(&staging, e))?;

    if let Err(e) = fill(&staging) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
        }
        return Err(e);
    }

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StageError::output(parent, e))?;
    }
    fs::rename(&staging, dest).map_err(|e| StageError::output(dest, e))
}

/// File names written to one flat output directory, with the input each came from
#[derive(Debug, Default)]
pub(crate) struct OutputNames(HashMap<String, PathBuf>);

impl OutputNames {
    /// Record `name` as produced from `source`. A second source for one name is an error.
    pub(crate) fn claim(&mut self, name: &str, source: &Path) -> Result<(), StageError> {
        match self.0.entry(name.to_string()) {
            Entry::Occupied(first) => Err(StageError::transform(
                source,
                format!(
                    "output '{}' is already produced from '{}'",
                    name,
                    first.get().display()
                ),
            )),
            Entry::Vacant(slot) => {
                slot.insert(source.to_path_buf());
                Ok(())
            }
        }
    }
}

/// `<path>.partial`
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// First input of a single-dependency stage
pub(crate) fn single_input<'a>(
    inputs: &'a [crate::artifact::ArtifactRef],
    stage: Stage,
) -> Result<&'a Path, StageError> {
    inputs
        .first()
        .map(|a| a.locate())
        .ok_or_else(|| StageError::transform(stage.as_str(), "stage requires one upstream input"))
}
