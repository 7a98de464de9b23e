// src/dag/scheduler.rs

//! Unified run/clean scheduling state.
//!
//! The scheduler owns one record per task with independent run and clean
//! state machines, computes ready sets, and propagates skips when a task
//! fails. It is never accessed concurrently: the executor's main loop is
//! its only caller, so no locking is needed here.
//!
//! Two sets drive readiness:
//! - run phase: `finished` contains completed *and* failed tasks, so a
//!   failed dependency unblocks its dependents into a skip instead of
//!   wedging them;
//! - clean phase: `clean_finished`, with readiness inverted (a task may
//!   clean once all its dependents have).

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::dag::DepGraph;
use crate::events::Phase;
use crate::task::{TaskId, TaskState};

#[derive(Debug)]
struct SchedRecord {
    deps: HashSet<TaskId>,
    dependents: HashSet<TaskId>,
    run: TaskState,
    clean: TaskState,
}

/// Run- and clean-phase state for every task in the current graph.
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Deterministic iteration order (graph discovery order).
    order: Vec<TaskId>,
    records: HashMap<TaskId, SchedRecord>,
    finished: HashSet<TaskId>,
    clean_finished: HashSet<TaskId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate pending records for every reachable task, plus pre-skipped
    /// records for unselected section candidates.
    pub fn load_graph(&mut self, graph: &DepGraph) {
        self.order = graph.tasks().cloned().collect();
        self.records.clear();
        self.finished.clear();
        self.clean_finished.clear();

        for task in graph.tasks() {
            self.records.insert(
                task.clone(),
                SchedRecord {
                    deps: graph.dependencies_of(task).cloned().unwrap_or_default(),
                    dependents: graph.dependents_of(task).cloned().unwrap_or_default(),
                    run: TaskState::Pending,
                    clean: TaskState::Pending,
                },
            );
        }

        for candidate in graph.unselected_candidates() {
            self.order.push(candidate.clone());
            self.records.insert(
                candidate.clone(),
                SchedRecord {
                    deps: HashSet::new(),
                    dependents: HashSet::new(),
                    run: TaskState::Skipped,
                    clean: TaskState::Pending,
                },
            );
        }

        debug!(tasks = self.order.len(), "scheduler loaded");
    }

    pub fn run_state(&self, task: &str) -> Option<TaskState> {
        self.records.get(task).map(|r| r.run)
    }

    pub fn clean_state(&self, task: &str) -> Option<TaskState> {
        self.records.get(task).map(|r| r.clean)
    }

    /// Pending tasks whose dependency set is a subset of the finished set,
    /// in deterministic order.
    pub fn next_ready_tasks(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|task| {
                self.records.get(*task).is_some_and(|record| {
                    record.run == TaskState::Pending
                        && record.deps.iter().all(|dep| self.finished.contains(dep))
                })
            })
            .cloned()
            .collect()
    }

    pub fn mark_running(&mut self, task: &str) -> bool {
        self.transition_run(task, TaskState::Running)
    }

    pub fn mark_completed(&mut self, task: &str) -> bool {
        let changed = self.transition_run(task, TaskState::Completed);
        if changed {
            self.finished.insert(task.to_string());
        }
        changed
    }

    /// Failed tasks join the finished set so their dependents' ready check
    /// passes and they can be skipped.
    pub fn mark_failed(&mut self, task: &str) -> bool {
        let changed = self.transition_run(task, TaskState::Failed);
        if changed {
            self.finished.insert(task.to_string());
        }
        changed
    }

    pub fn mark_skipped(&mut self, task: &str) -> bool {
        self.transition_run(task, TaskState::Skipped)
    }

    fn transition_run(&mut self, task: &str, next: TaskState) -> bool {
        match self.records.get_mut(task) {
            Some(record) if !record.run.is_terminal() => {
                record.run = next;
                true
            }
            _ => false,
        }
    }

    /// Transitively pending dependents of `task`, via BFS over the reverse
    /// graph. Traversal stops at non-pending nodes: a running dependent
    /// will fail (or finish) on its own and handle its subtree then.
    pub fn pending_dependents_of(&self, task: &str) -> Vec<TaskId> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        if let Some(record) = self.records.get(task) {
            queue.extend(record.dependents.iter().map(TaskId::as_str));
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(record) = self.records.get(current) else {
                continue;
            };
            if record.run == TaskState::Pending {
                result.push(current.to_string());
                queue.extend(record.dependents.iter().map(TaskId::as_str));
            }
        }

        result.sort();
        result
    }

    /// Tasks still pending after the main loop exited (never reached).
    pub fn skipped_task_classes(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|task| {
                self.records
                    .get(*task)
                    .is_some_and(|r| r.run == TaskState::Pending)
            })
            .cloned()
            .collect()
    }

    pub fn any_running(&self) -> bool {
        self.records
            .values()
            .any(|record| record.run == TaskState::Running)
    }

    pub fn all_run_terminal(&self) -> bool {
        self.records.values().all(|record| record.run.is_terminal())
    }

    // --- clean phase ---

    /// Reset clean states; readiness is dependents-first from here on.
    pub fn prepare_clean(&mut self) {
        self.clean_finished.clear();
        for record in self.records.values_mut() {
            record.clean = TaskState::Pending;
        }
    }

    /// Clean-pending tasks all of whose dependents are clean-finished.
    pub fn next_ready_clean_tasks(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|task| {
                self.records.get(*task).is_some_and(|record| {
                    record.clean == TaskState::Pending
                        && record
                            .dependents
                            .iter()
                            .all(|dependent| self.clean_finished.contains(dependent))
                })
            })
            .cloned()
            .collect()
    }

    pub fn mark_clean_running(&mut self, task: &str) -> bool {
        self.transition_clean(task, TaskState::Running)
    }

    pub fn mark_clean_completed(&mut self, task: &str) -> bool {
        let changed = self.transition_clean(task, TaskState::Completed);
        if changed {
            self.clean_finished.insert(task.to_string());
        }
        changed
    }

    /// A failed clean still joins the clean-finished set; cleaning one task
    /// never blocks the rest of the reverse order.
    pub fn mark_clean_failed(&mut self, task: &str) -> bool {
        let changed = self.transition_clean(task, TaskState::Failed);
        if changed {
            self.clean_finished.insert(task.to_string());
        }
        changed
    }

    fn transition_clean(&mut self, task: &str, next: TaskState) -> bool {
        match self.records.get_mut(task) {
            Some(record) if !record.clean.is_terminal() => {
                record.clean = next;
                true
            }
            _ => false,
        }
    }

    pub fn any_clean_running(&self) -> bool {
        self.records
            .values()
            .any(|record| record.clean == TaskState::Running)
    }

    pub fn all_clean_terminal(&self) -> bool {
        self.records
            .values()
            .all(|record| record.clean.is_terminal())
    }

    pub fn clean_pending_tasks(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|task| {
                self.records
                    .get(*task)
                    .is_some_and(|r| r.clean == TaskState::Pending)
            })
            .cloned()
            .collect()
    }

    /// Terminal check for the phase the main loop is driving.
    pub fn is_terminal(&self, task: &str, phase: Phase) -> bool {
        match phase {
            Phase::Run => self.run_state(task).is_some_and(TaskState::is_terminal),
            Phase::Clean => self.clean_state(task).is_some_and(TaskState::is_terminal),
        }
    }
}
