//! Structured run events
//!
//! The runner reports through an `EventSink` instead of a global logger.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: run-level and task-level variants
//! - EventLog: thread-safe, append-only log
//! - TracingSink: forwards events to `tracing`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

/// Why a task was not executed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Its output already exists
    AlreadySatisfied,
    /// A complete downstream task makes it unnecessary
    NotRequired,
}

/// Single event in the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since log creation (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// Task ids are rendered identities (`name(k=v, ...)`), shared as Arc<str>.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // RUN LEVEL
    // ═══════════════════════════════════════════
    RunStarted {
        target: Arc<str>,
        task_count: usize,
    },
    RunCompleted {
        executed: usize,
        skipped: usize,
        total_duration_ms: u64,
    },
    RunFailed {
        error: String,
        failed_task: Option<Arc<str>>,
    },

    // ═══════════════════════════════════════════
    // TASK LEVEL
    // ═══════════════════════════════════════════
    TaskScheduled {
        task_id: Arc<str>,
        dependencies: Vec<Arc<str>>,
    },
    TaskSkipped {
        task_id: Arc<str>,
        reason: SkipReason,
    },
    /// Execution begins with the resolved dependency outputs
    TaskStarted {
        task_id: Arc<str>,
        inputs: Vec<String>,
    },
    TaskSucceeded {
        task_id: Arc<str>,
        output: String,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: Arc<str>,
        error: String,
        duration_ms: u64,
    },
}

impl EventKind {
    /// Extract task_id if event is task-related
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskScheduled { task_id, .. }
            | Self::TaskSkipped { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskSucceeded { task_id, .. }
            | Self::TaskFailed { task_id, .. } => Some(task_id),
            Self::RunStarted { .. } | Self::RunCompleted { .. } | Self::RunFailed { .. } => None,
        }
    }

    pub fn is_run_event(&self) -> bool {
        matches!(
            self,
            Self::RunStarted { .. } | Self::RunCompleted { .. } | Self::RunFailed { .. }
        )
    }
}

/// Receiver of run events
pub trait EventSink {
    fn emit(&self, kind: EventKind);
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, kind: EventKind) {
        (**self).emit(kind)
    }
}

/// Fan-out to two sinks
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&self, kind: EventKind) {
        self.0.emit(kind.clone());
        self.1.emit(kind);
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _kind: EventKind) {}
}

/// Forwards events to `tracing` (info for progress, error for failures)
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, kind: EventKind) {
        match kind {
            EventKind::RunStarted { target, task_count } => {
                info!(task = %target, task_count, "Run started")
            }
            EventKind::RunCompleted {
                executed,
                skipped,
                total_duration_ms,
            } => info!(executed, skipped, total_duration_ms, "Run completed"),
            EventKind::RunFailed { error, failed_task } => {
                error!(failed_task = failed_task.as_deref().unwrap_or("-"), %error, "Run failed")
            }
            EventKind::TaskScheduled { .. } => {}
            EventKind::TaskSkipped { task_id, reason } => {
                info!(%task_id, ?reason, "Task skipped")
            }
            EventKind::TaskStarted { task_id, .. } => info!(%task_id, "Task started"),
            EventKind::TaskSucceeded {
                task_id,
                output,
                duration_ms,
            } => info!(%task_id, %output, duration_ms, "Task succeeded"),
            EventKind::TaskFailed {
                task_id,
                error,
                duration_ms,
            } => error!(%task_id, %error, duration_ms, "Task failed"),
        }
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append an event (returns event ID)
    pub fn push(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Filter events by rendered task ID
    pub fn filter_task(&self, task_id: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.task_id() == Some(task_id))
            .collect()
    }

    pub fn run_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.is_run_event())
            .collect()
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventLog {
    fn emit(&self, kind: EventKind) {
        self.push(kind);
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
