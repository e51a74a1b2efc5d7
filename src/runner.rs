//! Pipeline runner
//!
//! Resolves a target into an execution plan, then walks the plan strictly in
//! order, one task at a time. Each task is either skipped (already satisfied or
//! not required) or executed. The first failure aborts the run: nothing after it
//! executes, nothing before it is rolled back.
//!
//! Per-task state across a run:
//!
//! ```text
//! Pending ─┬─> Skipped
//!          └─> Running ─┬─> Succeeded
//!                       └─> Failed      (terminal for the run)
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::artifact::ArtifactRef;
use crate::error::PipelineError;
use crate::event_log::{EventKind, EventSink, SkipReason, TracingSink};
use crate::gate::CompletionGate;
use crate::resolver::{self, ExecutionPlan};
use crate::task::{TaskId, TaskRef};

/// Lifecycle of one task within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Skipped(SkipReason),
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub state: TaskState,
    /// Wall time of `execute` (None unless the task ran)
    pub duration: Option<Duration>,
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: TaskId,
    /// One entry per task of the plan, in execution order
    pub outcomes: Vec<TaskOutcome>,
    pub duration: Duration,
}

impl RunReport {
    /// Tasks whose body ran during this run
    pub fn executed(&self) -> Vec<&TaskId> {
        self.outcomes
            .iter()
            .filter(|o| o.state == TaskState::Succeeded)
            .map(|o| &o.id)
            .collect()
    }

    pub fn skipped(&self) -> Vec<&TaskId> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, TaskState::Skipped(_)))
            .map(|o| &o.id)
            .collect()
    }

    pub fn state_of(&self, id: &TaskId) -> Option<TaskState> {
        self.outcomes.iter().find(|o| &o.id == id).map(|o| o.state)
    }
}

/// Sequential runner reporting through an `EventSink`
pub struct Runner<S: EventSink = TracingSink> {
    sink: S,
    gate: CompletionGate,
}

impl Runner<TracingSink> {
    pub fn new() -> Self {
        Self::with_sink(TracingSink)
    }
}

impl Default for Runner<TracingSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSink> Runner<S> {
    pub fn with_sink(sink: S) -> Self {
        Self {
            sink,
            gate: CompletionGate,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Resolve `target` and run its plan
    pub fn run(&self, target: TaskRef) -> Result<RunReport, PipelineError> {
        let plan = match resolver::resolve(target) {
            Ok(plan) => plan,
            Err(e) => {
                self.sink.emit(EventKind::RunFailed {
                    error: e.to_string(),
                    failed_task: e.failed_task().map(|t| Arc::from(t.to_string())),
                });
                return Err(e);
            }
        };
        self.run_plan(&plan)
    }

    /// Run an already resolved plan
    pub fn run_plan(&self, plan: &ExecutionPlan) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let Some(target) = plan.target().cloned() else {
            return Err(PipelineError::Config {
                reason: "empty execution plan".to_string(),
            });
        };

        self.sink.emit(EventKind::RunStarted {
            target: Arc::from(target.to_string()),
            task_count: plan.len(),
        });

        let mut outcomes: Vec<TaskOutcome> = plan
            .ids()
            .iter()
            .map(|id| {
                self.sink.emit(EventKind::TaskScheduled {
                    task_id: Arc::from(id.to_string()),
                    dependencies: plan
                        .dependencies_of(id)
                        .iter()
                        .map(|d| Arc::from(d.to_string()))
                        .collect(),
                });
                TaskOutcome {
                    id: id.clone(),
                    state: TaskState::Pending,
                    duration: None,
                }
            })
            .collect();

        let demanded = plan.demanded(&self.gate);

        for (i, (id, task)) in plan.iter().enumerate() {
            let task_label: Arc<str> = Arc::from(id.to_string());

            if let Some(reason) = self.skip_reason(id, task, &demanded) {
                debug!(task = %task_label, ?reason, "Skipping");
                outcomes[i].state = TaskState::Skipped(reason);
                self.sink.emit(EventKind::TaskSkipped {
                    task_id: task_label,
                    reason,
                });
                continue;
            }

            outcomes[i].state = TaskState::Running;
            let task_start = Instant::now();
            let result = self.execute_one(plan, id, task, &task_label);
            let elapsed = task_start.elapsed();
            outcomes[i].duration = Some(elapsed);

            match result {
                Ok(output) => {
                    outcomes[i].state = TaskState::Succeeded;
                    self.sink.emit(EventKind::TaskSucceeded {
                        task_id: task_label,
                        output: output.to_string(),
                        duration_ms: elapsed.as_millis() as u64,
                    });
                }
                Err(e) => {
                    outcomes[i].state = TaskState::Failed;
                    self.sink.emit(EventKind::TaskFailed {
                        task_id: Arc::clone(&task_label),
                        error: e.to_string(),
                        duration_ms: elapsed.as_millis() as u64,
                    });
                    self.sink.emit(EventKind::RunFailed {
                        error: e.to_string(),
                        failed_task: Some(task_label),
                    });
                    return Err(e);
                }
            }
        }

        let report = RunReport {
            target,
            outcomes,
            duration: start.elapsed(),
        };
        self.sink.emit(EventKind::RunCompleted {
            executed: report.executed().len(),
            skipped: report.skipped().len(),
            total_duration_ms: report.duration.as_millis() as u64,
        });
        Ok(report)
    }

    fn skip_reason(
        &self,
        id: &TaskId,
        task: &TaskRef,
        demanded: &HashSet<TaskId>,
    ) -> Option<SkipReason> {
        if !demanded.contains(id) {
            Some(SkipReason::NotRequired)
        } else if self.gate.is_complete(task.as_ref()) {
            Some(SkipReason::AlreadySatisfied)
        } else {
            None
        }
    }

    /// Execute one incomplete task and verify it produced its output
    #[instrument(skip_all, fields(task = %label))]
    fn execute_one(
        &self,
        plan: &ExecutionPlan,
        id: &TaskId,
        task: &TaskRef,
        label: &Arc<str>,
    ) -> Result<ArtifactRef, PipelineError> {
        let inputs = plan.inputs_of(id);
        if let Some(missing) = inputs.iter().find(|input| !input.exists()) {
            return Err(PipelineError::MissingInput {
                task: id.clone(),
                path: missing.locate().to_path_buf(),
            });
        }

        self.sink.emit(EventKind::TaskStarted {
            task_id: Arc::clone(label),
            inputs: inputs.iter().map(|i| i.to_string()).collect(),
        });

        task.execute(&inputs)
            .map_err(|source| PipelineError::TaskFailed {
                task: id.clone(),
                source,
            })?;

        let output = task.output();
        if !output.exists() {
            return Err(PipelineError::ContractViolation {
                task: id.clone(),
                path: output.locate().to_path_buf(),
            });
        }
        Ok(output)
    }
}
