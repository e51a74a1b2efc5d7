//! Dependency resolution: target task -> execution plan
//!
//! Depth-first walk through `Task::dependencies()`, recording tasks in post-order.
//! Tasks are de-duplicated by identity, so a diamond-shaped graph still lists
//! each task once. The target is always last.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::artifact::ArtifactRef;
use crate::error::PipelineError;
use crate::gate::CompletionGate;
use crate::task::{TaskId, TaskRef};

/// Topologically ordered, de-duplicated closure of a target task
pub struct ExecutionPlan {
    /// Tasks in execution order (dependencies first)
    order: Vec<TaskRef>,
    /// Identity of order[i]
    ids: Vec<TaskId>,
    /// task -> position in `order`
    positions: HashMap<TaskId, usize>,
    /// task -> declared dependency identities (declaration order)
    predecessors: HashMap<TaskId, Vec<TaskId>>,
}

/// Resolve the execution order for `target`
pub fn resolve(target: TaskRef) -> Result<ExecutionPlan, PipelineError> {
    let mut walk = Walk::default();
    walk.visit(target)?;

    let positions = walk
        .ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    debug!(tasks = walk.order.len(), "Resolved execution plan");

    Ok(ExecutionPlan {
        order: walk.order,
        ids: walk.ids,
        positions,
        predecessors: walk.predecessors,
    })
}

#[derive(Default)]
struct Walk {
    order: Vec<TaskRef>,
    ids: Vec<TaskId>,
    predecessors: HashMap<TaskId, Vec<TaskId>>,
    visited: HashSet<TaskId>,
    on_stack: HashSet<TaskId>,
}

impl Walk {
    fn visit(&mut self, task: TaskRef) -> Result<(), PipelineError> {
        let id = task.id();
        if self.visited.contains(&id) {
            return Ok(());
        }
        if !self.on_stack.insert(id.clone()) {
            return Err(PipelineError::DependencyCycle { task: id });
        }

        let dependencies = task.dependencies();
        let dep_ids: Vec<TaskId> = dependencies.iter().map(|d| d.id()).collect();
        for dep in dependencies {
            self.visit(dep)?;
        }

        self.on_stack.remove(&id);
        self.visited.insert(id.clone());
        self.predecessors.insert(id.clone(), dep_ids);
        self.ids.push(id);
        self.order.push(task);
        Ok(())
    }
}

impl ExecutionPlan {
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tasks with their identities, dependencies first
    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &TaskRef)> {
        self.ids.iter().zip(self.order.iter())
    }

    pub fn ids(&self) -> &[TaskId] {
        &self.ids
    }

    /// The task the plan was resolved for
    pub fn target(&self) -> Option<&TaskId> {
        self.ids.last()
    }

    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Declared dependencies of a task in the plan
    pub fn dependencies_of(&self, id: &TaskId) -> &[TaskId] {
        self.predecessors
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Outputs of a task's dependencies, in declaration order
    pub fn inputs_of(&self, id: &TaskId) -> Vec<ArtifactRef> {
        self.dependencies_of(id)
            .iter()
            .filter_map(|dep| self.position(dep))
            .map(|i| self.order[i].output())
            .collect()
    }

    /// Tasks the target actually needs.
    ///
    /// The target is demanded. A demanded task that is not yet complete demands
    /// its dependencies. A complete task shields everything upstream of it, so a
    /// finished pipeline whose last stage removed upstream outputs stays finished.
    pub fn demanded(&self, gate: &CompletionGate) -> HashSet<TaskId> {
        let mut demanded = HashSet::with_capacity(self.len());
        let Some(target) = self.target() else {
            return demanded;
        };
        demanded.insert(target.clone());

        // Reverse topological order: every dependent is decided before its dependencies
        for (id, task) in self.ids.iter().zip(&self.order).rev() {
            if !demanded.contains(id) || gate.is_complete(task.as_ref()) {
                continue;
            }
            for dep in self.dependencies_of(id) {
                demanded.insert(dep.clone());
            }
        }

        demanded
    }
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("order", &self.ids)
            .finish()
    }
}
