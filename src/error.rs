//! Error types with fix suggestions
//!
//! `StageError` is what a task body returns. `PipelineError` is what a run
//! returns: stage failures are tagged with the identity of the task that raised them.

use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskId;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Failure raised inside a task body, one variant per failure class
#[derive(Error, Debug)]
pub enum StageError {
    #[error("acquire failed for '{url}': {reason}")]
    Acquire { url: String, reason: String },

    #[error("unpack failed for '{}': {reason}", .archive.display())]
    Unpack { archive: PathBuf, reason: String },

    #[error("transform failed for '{}': {reason}", .path.display())]
    Transform { path: PathBuf, reason: String },

    #[error("cannot write '{}': {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }

    pub fn transform(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Transform {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum PipelineError {
    // ─────────────────────────────────────────────────────────────
    // Run errors (GEO-010 to GEO-013)
    // ─────────────────────────────────────────────────────────────

    #[error("GEO-010: Task {task} failed: {source}")]
    TaskFailed {
        task: TaskId,
        #[source]
        source: StageError,
    },

    #[error("GEO-011: Task {task} reported success but its output '{}' does not exist", .path.display())]
    ContractViolation { task: TaskId, path: PathBuf },

    #[error("GEO-012: Task {task} is missing its input '{}'", .path.display())]
    MissingInput { task: TaskId, path: PathBuf },

    #[error("GEO-013: Task {task} depends on itself")]
    DependencyCycle { task: TaskId },

    // ─────────────────────────────────────────────────────────────
    // Setup errors (GEO-020 to GEO-022)
    // ─────────────────────────────────────────────────────────────

    #[error("GEO-020: Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("GEO-021: Invalid dataset id '{dataset}'")]
    InvalidDataset { dataset: String },

    #[error("GEO-022: Unknown stage '{name}' (expected one of: {expected})")]
    UnknownStage { name: String, expected: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The single task a run failure names, if it names one
    pub fn failed_task(&self) -> Option<&TaskId> {
        match self {
            Self::TaskFailed { task, .. }
            | Self::ContractViolation { task, .. }
            | Self::MissingInput { task, .. }
            | Self::DependencyCycle { task } => Some(task),
            Self::Config { .. }
            | Self::InvalidDataset { .. }
            | Self::UnknownStage { .. }
            | Self::Io(_) => None,
        }
    }
}

impl FixSuggestion for PipelineError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            PipelineError::TaskFailed { source, .. } => match source {
                StageError::Acquire { .. } => {
                    Some("Check the source URL and network access, then re-run to resume")
                }
                StageError::Unpack { .. } => {
                    Some("Delete the downloaded archive so it is fetched again, then re-run")
                }
                StageError::Transform { .. } => {
                    Some("Inspect the named file for malformed records, then re-run")
                }
                StageError::Output { .. } => Some("Check permissions and free disk space"),
            },
            PipelineError::ContractViolation { .. } => {
                Some("The stage must create its declared output before returning success")
            }
            PipelineError::MissingInput { .. } => {
                Some("Remove the downstream output so its upstream stages run again")
            }
            PipelineError::DependencyCycle { .. } => {
                Some("Remove the circular dependency - tasks cannot depend on themselves")
            }
            PipelineError::Config { .. } => Some("Check geoflow.toml and GEOFLOW_* variables"),
            PipelineError::InvalidDataset { .. } => {
                Some("Use a GEO accession like GSE68849 (letters, digits, '.', '_', '-')")
            }
            PipelineError::UnknownStage { .. } => {
                Some("Run `geoflow status` to list the stage names")
            }
            PipelineError::Io(_) => Some("Check file path and permissions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskParams;

    fn task_id() -> TaskId {
        TaskId::new("unpack", TaskParams::new().with("dataset", "GSE1"))
    }

    #[test]
    fn task_failure_names_task_and_cause() {
        let err = PipelineError::TaskFailed {
            task: task_id(),
            source: StageError::Unpack {
                archive: "a.tar".into(),
                reason: "bad header".into(),
            },
        };

        let msg = err.to_string();
        assert!(msg.starts_with("GEO-010"));
        assert!(msg.contains("unpack(dataset=GSE1)"));
        assert!(msg.contains("bad header"));
        assert_eq!(err.failed_task(), Some(&task_id()));
    }

    #[test]
    fn setup_errors_name_no_task() {
        let err = PipelineError::InvalidDataset {
            dataset: "../x".into(),
        };
        assert!(err.failed_task().is_none());
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn every_stage_error_class_has_a_suggestion() {
        let sources = [
            StageError::Acquire {
                url: "u".into(),
                reason: "r".into(),
            },
            StageError::Unpack {
                archive: "a".into(),
                reason: "r".into(),
            },
            StageError::transform("p", "r"),
            StageError::output("p", std::io::Error::other("disk full")),
        ];

        for source in sources {
            let err = PipelineError::TaskFailed {
                task: task_id(),
                source,
            };
            assert!(err.fix_suggestion().is_some(), "no fix for {err}");
        }
    }
}
