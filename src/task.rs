//! Task model: identity, parameters, dependencies, output, body
//!
//! A task's identity is its name plus its parameter set. Two task values with the
//! same identity are the same logical unit of work, and a run executes it at most once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::artifact::ArtifactRef;
use crate::error::StageError;

/// Immutable, ordered parameter set (key order never affects identity)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskParams(BTreeMap<String, String>);

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Name + parameters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    name: Arc<str>,
    params: TaskParams,
}

impl TaskId {
    pub fn new(name: impl Into<Arc<str>>, params: TaskParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn params(&self) -> &TaskParams {
        &self.params
    }
}

/// Renders as `name(k1=v1, k2=v2)`
impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str(")")
    }
}

/// Shared handle to a task (dependencies are returned as these)
pub type TaskRef = Arc<dyn Task>;

/// A unit of pipeline work.
///
/// `dependencies` and `output` must be side-effect free and stable: the same
/// task value always reports the same list and the same reference. Side effects
/// happen only in `execute`, which on success must leave `output().exists()` true.
pub trait Task: Send + Sync + fmt::Debug {
    /// Stage name, shared by every parameterization of the task
    fn name(&self) -> &str;

    fn params(&self) -> TaskParams;

    fn id(&self) -> TaskId {
        TaskId::new(self.name(), self.params())
    }

    /// Upstream tasks, in declaration order (empty for a root task)
    fn dependencies(&self) -> Vec<TaskRef> {
        Vec::new()
    }

    fn output(&self) -> ArtifactRef;

    /// Run the body. `inputs` are the outputs of `dependencies()`, in the same order.
    fn execute(&self, inputs: &[ArtifactRef]) -> Result<(), StageError>;
}
