//! Completion gate: the single skip-vs-run decision point

use crate::task::Task;

/// Existence-only completion check.
///
/// Consulted once per task, immediately before it would execute. Checking each
/// task independently is what lets a run resume at the first incomplete stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionGate;

impl CompletionGate {
    #[inline]
    pub fn is_complete(&self, task: &dyn Task) -> bool {
        task.output().exists()
    }
}
