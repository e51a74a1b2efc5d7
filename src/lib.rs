//! geoflow - resumable acquisition pipeline for GEO expression datasets

pub mod artifact;
pub mod config;
pub mod error;
pub mod event_log;
pub mod gate;
pub mod pipeline;
pub mod resolver;
pub mod runner;
pub mod stages;
pub mod task;

pub use artifact::{ArtifactKind, ArtifactRef};
pub use config::PipelineConfig;
pub use error::{FixSuggestion, PipelineError, StageError};
pub use event_log::{Event, EventKind, EventLog, EventSink, NullSink, SkipReason, TracingSink};
pub use gate::CompletionGate;
pub use pipeline::{Pipeline, StageStatus};
pub use resolver::{resolve, ExecutionPlan};
pub use runner::{RunReport, Runner, TaskOutcome, TaskState};
pub use stages::{Fetcher, Stage, UrlFetcher};
pub use task::{Task, TaskId, TaskParams, TaskRef};
