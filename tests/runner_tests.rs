//! # Runner Tests
//!
//! Scheduling behaviour with fake tasks that count their executions:
//! - idempotence: a second run executes nothing
//! - resumability: a run failing at stage k resumes at stage k
//! - ordering: dependencies always execute first
//! - identity: a shared dependency executes at most once per run
//! - abort: nothing downstream of a failure executes

use geoflow::{
    resolve, ArtifactRef, EventKind, EventLog, PipelineError, Runner, SkipReason, StageError, Task,
    TaskParams, TaskRef, TaskState,
};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Execution journal shared by every step of a graph
#[derive(Debug, Default)]
struct Journal {
    order: Mutex<Vec<String>>,
}

impl Journal {
    fn order(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    fn count(&self, name: &str) -> usize {
        self.order.lock().iter().filter(|n| *n == name).count()
    }
}

#[derive(Debug)]
struct Step {
    name: String,
    output: PathBuf,
    deps: Vec<TaskRef>,
    journal: Arc<Journal>,
    fail: Arc<AtomicBool>,
    /// Report success without writing the output
    lie: bool,
}

impl Step {
    fn new(name: &str, dir: &Path, deps: Vec<TaskRef>, journal: &Arc<Journal>) -> Self {
        Self {
            name: name.to_string(),
            output: dir.join(format!("{name}.out")),
            deps,
            journal: Arc::clone(journal),
            fail: Arc::new(AtomicBool::new(false)),
            lie: false,
        }
    }
}

impl Task for Step {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> TaskParams {
        TaskParams::new().with("output", self.output.display())
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        self.deps.clone()
    }

    fn output(&self) -> ArtifactRef {
        ArtifactRef::file(&self.output)
    }

    fn execute(&self, inputs: &[ArtifactRef]) -> Result<(), StageError> {
        self.journal.order.lock().push(self.name.clone());
        assert!(inputs.iter().all(|i| i.exists()), "inputs must exist");

        if self.fail.load(Ordering::SeqCst) {
            return Err(StageError::transform(&self.output, "injected failure"));
        }
        if self.lie {
            return Ok(());
        }
        fs::write(&self.output, &self.name).map_err(|e| StageError::output(&self.output, e))
    }
}

/// s1 -> s2 -> s3 -> s4 -> s5, with a failure switch on `fail_at`
fn chain(dir: &Path, journal: &Arc<Journal>, fail_at: &str) -> (TaskRef, Arc<AtomicBool>) {
    let switch = Arc::new(AtomicBool::new(true));
    let mut prev: Option<TaskRef> = None;
    for name in ["s1", "s2", "s3", "s4", "s5"] {
        let mut step = Step::new(name, dir, prev.take().into_iter().collect(), journal);
        if name == fail_at {
            step.fail = Arc::clone(&switch);
        }
        let step: TaskRef = Arc::new(step);
        prev = Some(step);
    }
    (prev.unwrap(), switch)
}

// ============================================================================
// IDEMPOTENCE + RESUMABILITY
// ============================================================================

#[test]
fn second_run_executes_nothing() {
    let tmp = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let (target, _) = chain(tmp.path(), &journal, "none");
    let runner = Runner::with_sink(EventLog::new());

    let first = runner.run(Arc::clone(&target)).unwrap();
    let second = runner.run(target).unwrap();

    assert_eq!(first.executed().len(), 5);
    assert!(second.executed().is_empty());
    assert_eq!(journal.order().len(), 5);
    // Only the target needs checking once it is complete
    assert_eq!(
        second.outcomes.last().unwrap().state,
        TaskState::Skipped(SkipReason::AlreadySatisfied)
    );
}

#[test]
fn failed_run_resumes_at_failed_stage() {
    let tmp = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let (target, switch) = chain(tmp.path(), &journal, "s3");
    let runner = Runner::with_sink(EventLog::new());

    let err = runner.run(Arc::clone(&target)).unwrap_err();
    assert_eq!(err.failed_task().unwrap().name(), "s3");

    switch.store(false, Ordering::SeqCst);
    let report = runner.run(target).unwrap();

    let executed: Vec<_> = report.executed().iter().map(|id| id.name().to_string()).collect();
    assert_eq!(executed, ["s3", "s4", "s5"]);
    assert_eq!(journal.count("s1"), 1);
    assert_eq!(journal.count("s2"), 1);
    assert_eq!(journal.count("s3"), 2);
}

#[test]
fn missing_target_reruns_only_what_it_needs() {
    let tmp = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let (target, _) = chain(tmp.path(), &journal, "none");
    let runner = Runner::with_sink(EventLog::new());
    runner.run(Arc::clone(&target)).unwrap();

    fs::remove_file(tmp.path().join("s5.out")).unwrap();
    let report = runner.run(target).unwrap();

    let executed: Vec<_> = report.executed().iter().map(|id| id.name().to_string()).collect();
    assert_eq!(executed, ["s5"]);
}

// ============================================================================
// ORDERING + IDENTITY
// ============================================================================

#[test]
fn dependencies_execute_first() {
    let tmp = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let (target, _) = chain(tmp.path(), &journal, "none");

    Runner::with_sink(EventLog::new()).run(target).unwrap();

    assert_eq!(journal.order(), ["s1", "s2", "s3", "s4", "s5"]);
}

#[test]
fn shared_dependency_executes_once() {
    let tmp = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    // Two distinct instances with one identity
    let base_a: TaskRef = Arc::new(Step::new("base", tmp.path(), vec![], &journal));
    let base_b: TaskRef = Arc::new(Step::new("base", tmp.path(), vec![], &journal));
    let left: TaskRef = Arc::new(Step::new("left", tmp.path(), vec![base_a], &journal));
    let right: TaskRef = Arc::new(Step::new("right", tmp.path(), vec![base_b], &journal));
    let top: TaskRef = Arc::new(Step::new("top", tmp.path(), vec![left, right], &journal));

    let plan = resolve(Arc::clone(&top)).unwrap();
    assert_eq!(plan.len(), 4);

    Runner::with_sink(EventLog::new()).run(top).unwrap();

    assert_eq!(journal.count("base"), 1);
    let order = journal.order();
    assert_eq!(order.first().map(String::as_str), Some("base"));
    assert_eq!(order.last().map(String::as_str), Some("top"));
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn failure_aborts_downstream() {
    let tmp = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let (target, _) = chain(tmp.path(), &journal, "s2");
    let log = EventLog::new();

    let err = Runner::with_sink(&log).run(target).unwrap_err();

    assert!(matches!(err, PipelineError::TaskFailed { .. }));
    assert_eq!(journal.order(), ["s1", "s2"]);
    assert!(tmp.path().join("s1.out").exists());
    assert!(!tmp.path().join("s2.out").exists());

    let kinds: Vec<_> = log.events().into_iter().map(|e| e.kind).collect();
    assert!(kinds.iter().all(|k| !matches!(k, EventKind::RunCompleted { .. })));
    match kinds.last() {
        Some(EventKind::RunFailed { failed_task, .. }) => {
            assert!(failed_task.as_deref().unwrap().starts_with("s2("));
        }
        other => panic!("expected RunFailed, got {other:?}"),
    }
}

#[test]
fn success_without_output_is_a_contract_violation() {
    let tmp = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let mut liar = Step::new("liar", tmp.path(), vec![], &journal);
    liar.lie = true;
    let downstream: TaskRef = Arc::new(Step::new("after", tmp.path(), vec![Arc::new(liar)], &journal));

    let err = Runner::with_sink(EventLog::new()).run(downstream).unwrap_err();

    assert!(matches!(err, PipelineError::ContractViolation { .. }));
    assert_eq!(err.failed_task().unwrap().name(), "liar");
    assert_eq!(journal.count("after"), 0);
}

#[test]
fn events_follow_task_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let (target, _) = chain(tmp.path(), &journal, "none");
    let log = EventLog::new();
    let runner = Runner::with_sink(&log);
    runner.run(target).unwrap();

    let s1 = log.events().iter().find_map(|e| match &e.kind {
        EventKind::TaskStarted { task_id, .. } if task_id.starts_with("s1(") => Some(task_id.clone()),
        _ => None,
    });
    let s1 = s1.expect("s1 started");
    let lifecycle: Vec<_> = log
        .filter_task(&s1)
        .into_iter()
        .map(|e| match e.kind {
            EventKind::TaskScheduled { .. } => "scheduled",
            EventKind::TaskStarted { .. } => "started",
            EventKind::TaskSucceeded { .. } => "succeeded",
            _ => "other",
        })
        .collect();
    assert_eq!(lifecycle, ["scheduled", "started", "succeeded"]);
    assert_eq!(log.run_events().len(), 2);
}
