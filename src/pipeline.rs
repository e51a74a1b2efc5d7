//! Pipeline facade: validated config + fetcher -> stage tasks, plans and runs

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::event_log::EventSink;
use crate::gate::CompletionGate;
use crate::resolver::{self, ExecutionPlan};
use crate::runner::{RunReport, Runner};
use crate::stages::{Fetcher, Stage, StageContext, UrlFetcher};
use crate::task::TaskRef;

/// Completion of one stage as seen by the gate
#[derive(Debug, Clone)]
pub struct StageStatus {
    pub stage: Stage,
    pub output: String,
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    ctx: Arc<StageContext>,
}

impl Pipeline {
    /// Validate `config` and bind it to `fetcher`
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx: StageContext::new(config, fetcher),
        })
    }

    /// Pipeline fetching over http(s) or from `file://` URLs
    pub fn with_url_fetcher(config: PipelineConfig) -> Result<Self> {
        Self::new(config, Arc::new(UrlFetcher::new()))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    pub fn task(&self, stage: Stage) -> TaskRef {
        stage.task(&self.ctx)
    }

    /// Execution plan for `stage` and everything upstream of it
    pub fn plan(&self, stage: Stage) -> Result<ExecutionPlan> {
        resolver::resolve(self.task(stage))
    }

    /// Bring `stage` to completion, reporting through `sink`
    pub fn run<S: EventSink>(&self, stage: Stage, sink: S) -> Result<RunReport> {
        Runner::with_sink(sink).run(self.task(stage))
    }

    /// Output presence of every stage, in pipeline order
    pub fn status(&self) -> Vec<StageStatus> {
        let gate = CompletionGate;
        Stage::ALL
            .into_iter()
            .map(|stage| {
                let task = self.task(stage);
                StageStatus {
                    stage,
                    output: task.output().to_string(),
                    complete: gate.is_complete(task.as_ref()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::event_log::NullSink;
    use std::fs;
    use tempfile::TempDir;

    fn pipeline(tmp: &TempDir) -> Pipeline {
        let config = PipelineConfig {
            work_dir: Some(tmp.path().to_path_buf()),
            ..PipelineConfig::default()
        };
        Pipeline::with_url_fetcher(config).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = PipelineConfig {
            dataset: "../../etc".to_string(),
            ..PipelineConfig::default()
        };
        let err = Pipeline::with_url_fetcher(config).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDataset { .. }));
    }

    #[test]
    fn plan_lists_stages_in_pipeline_order() {
        let tmp = TempDir::new().unwrap();
        let plan = pipeline(&tmp).plan(Stage::Clean).unwrap();

        let names: Vec<_> = plan.ids().iter().map(|id| id.name().to_string()).collect();
        assert_eq!(names, ["acquire", "unpack", "normalize", "project", "clean"]);
    }

    #[test]
    fn plan_for_inner_stage_stops_there() {
        let tmp = TempDir::new().unwrap();
        let plan = pipeline(&tmp).plan(Stage::Unpack).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.target().unwrap().name(), "unpack");
    }

    #[test]
    fn status_follows_outputs() {
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&tmp);
        assert!(pipeline.status().iter().all(|s| !s.complete));

        fs::create_dir_all(tmp.path().join("data_trimmed")).unwrap();

        let status = pipeline.status();
        assert!(status.iter().find(|s| s.stage == Stage::Project).unwrap().complete);
        assert!(!status.iter().find(|s| s.stage == Stage::Clean).unwrap().complete);
    }

    #[test]
    fn finished_pipeline_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cleanup_status.done"), "Cleanup completed.").unwrap();

        let report = pipeline(&tmp).run(Stage::Clean, NullSink).unwrap();

        assert!(report.executed().is_empty());
        assert_eq!(report.skipped().len(), 5);
    }
}
