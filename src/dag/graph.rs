// src/dag/graph.rs

//! Dependency graph construction.
//!
//! Built by BFS from a declared root over the analyzer's dependency sets.
//! Section references are resolved to their selected implementation during
//! the walk, so the graph itself only contains concrete tasks; the
//! section-to-choice mapping and the unselected candidates are kept
//! alongside for the executor.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::analyze::DependencyAnalyzer;
use crate::args::RunArgs;
use crate::errors::{Error, Result};
use crate::task::{Registry, TaskId, TaskNode};

/// Forward and reverse adjacency for every task reachable from the root.
#[derive(Debug, Clone)]
pub struct DepGraph {
    root: TaskId,
    /// Discovery order: root first, then BFS layers. Used everywhere a
    /// deterministic iteration order matters.
    order: Vec<TaskId>,
    deps: HashMap<TaskId, HashSet<TaskId>>,
    dependents: HashMap<TaskId, HashSet<TaskId>>,
    /// Section id -> selected implementation for this invocation.
    section_choices: HashMap<TaskId, TaskId>,
    /// Section candidates that were not selected and are not otherwise
    /// reachable; the scheduler marks these skipped at load.
    unselected_candidates: Vec<TaskId>,
}

impl DepGraph {
    /// Expand the transitive graph from `root`.
    ///
    /// `root` may name a section; it is resolved through the section's
    /// selection function first, like any other section reference.
    pub fn build(
        root: &TaskId,
        registry: &Registry,
        analyzer: &DependencyAnalyzer,
        args: &RunArgs,
    ) -> Result<Self> {
        let mut builder = GraphBuilder {
            registry,
            analyzer,
            args,
            section_choices: HashMap::new(),
            candidate_pool: Vec::new(),
        };

        let resolved_root = builder.resolve_node(root)?;

        let mut order = Vec::new();
        let mut deps: HashMap<TaskId, HashSet<TaskId>> = HashMap::new();
        let mut dependents: HashMap<TaskId, HashSet<TaskId>> = HashMap::new();
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut queue = VecDeque::from([resolved_root.clone()]);

        while let Some(task) = queue.pop_front() {
            if !visited.insert(task.clone()) {
                continue;
            }
            order.push(task.clone());

            let task_deps = builder.dependencies_of(&task)?;
            for dep in &task_deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(task.clone());
                queue.push_back(dep.clone());
            }
            deps.insert(task.clone(), task_deps);
        }

        let unselected_candidates: Vec<TaskId> = builder
            .candidate_pool
            .into_iter()
            .filter(|candidate| !visited.contains(candidate))
            .collect();

        debug!(
            root = %resolved_root,
            tasks = order.len(),
            unselected = unselected_candidates.len(),
            "dependency graph built"
        );

        Ok(Self {
            root: resolved_root,
            order,
            deps,
            dependents,
            section_choices: builder.section_choices,
            unselected_candidates,
        })
    }

    pub fn root(&self) -> &TaskId {
        &self.root
    }

    /// Tasks in discovery order (root first).
    pub fn tasks(&self) -> impl Iterator<Item = &TaskId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.deps.contains_key(task)
    }

    pub fn dependencies_of(&self, task: &str) -> Option<&HashSet<TaskId>> {
        self.deps.get(task)
    }

    pub fn dependents_of(&self, task: &str) -> Option<&HashSet<TaskId>> {
        self.dependents.get(task)
    }

    /// Tasks with an empty dependency set, in discovery order.
    pub fn leaves(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|task| self.deps.get(*task).is_none_or(HashSet::is_empty))
            .cloned()
            .collect()
    }

    pub fn section_choices(&self) -> &HashMap<TaskId, TaskId> {
        &self.section_choices
    }

    pub fn unselected_candidates(&self) -> &[TaskId] {
        &self.unselected_candidates
    }
}

struct GraphBuilder<'a> {
    registry: &'a Registry,
    analyzer: &'a DependencyAnalyzer,
    args: &'a RunArgs,
    section_choices: HashMap<TaskId, TaskId>,
    /// Every candidate of every section encountered, minus the choices.
    candidate_pool: Vec<TaskId>,
}

impl GraphBuilder<'_> {
    /// Resolve an id to a concrete task, applying section selection.
    fn resolve_node(&mut self, id: &TaskId) -> Result<TaskId> {
        match self.registry.get(id) {
            Some(TaskNode::Task(_)) => Ok(id.clone()),
            Some(TaskNode::Section(section)) => {
                if let Some(choice) = self.section_choices.get(id) {
                    return Ok(choice.clone());
                }
                let choice = section.select(self.args);
                if !matches!(self.registry.get(&choice), Some(TaskNode::Task(_))) {
                    return Err(Error::UnknownTask(choice));
                }
                debug!(section = %id, %choice, "section resolved");
                for candidate in section.candidates() {
                    if *candidate != choice {
                        self.candidate_pool.push(candidate.clone());
                    }
                }
                self.section_choices.insert(id.clone(), choice.clone());
                Ok(choice)
            }
            None => Err(Error::UnknownTask(id.clone())),
        }
    }

    /// The resolved, deterministic dependency set of one concrete task.
    fn dependencies_of(&mut self, task: &TaskId) -> Result<HashSet<TaskId>> {
        let descriptor = match self.registry.get(task) {
            Some(TaskNode::Task(descriptor)) => descriptor.clone(),
            Some(TaskNode::Section(_)) | None => return Err(Error::UnknownTask(task.clone())),
        };

        let mut raw: Vec<TaskId> = self
            .analyzer
            .dependencies_of(self.registry, &descriptor)?
            .into_iter()
            .collect();
        raw.sort();

        let mut resolved = HashSet::new();
        for dep in raw {
            resolved.insert(self.resolve_node(&dep)?);
        }
        Ok(resolved)
    }
}
