// src/events/log_observer.rs

//! Default observer that mirrors lifecycle events into `tracing`.

use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::dag::DepGraph;
use crate::events::{Observer, Phase, TaskTransition};
use crate::task::{TaskId, TaskState};

/// Logs every lifecycle event with structured fields. Attached by default
/// when the session is built with `with_log_observer`.
#[derive(Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_ready(&self, graph: &DepGraph) {
        info!(tasks = graph.len(), root = %graph.root(), "dependency graph ready");
    }

    fn on_start(&self) {
        debug!("execution started");
    }

    fn on_stop(&self) {
        debug!("execution stopped");
    }

    fn on_phase_started(&self, phase: Phase) {
        info!(%phase, "phase started");
    }

    fn on_phase_completed(&self, phase: Phase) {
        info!(%phase, "phase completed");
    }

    fn on_task_updated(&self, transition: &TaskTransition) {
        match transition.next {
            TaskState::Failed => {
                let error = transition
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                warn!(
                    task = %transition.task,
                    phase = %transition.phase,
                    %error,
                    "task failed"
                );
            }
            TaskState::Skipped => {
                info!(task = %transition.task, phase = %transition.phase, "task skipped");
            }
            next => {
                debug!(
                    task = %transition.task,
                    phase = %transition.phase,
                    prev = %transition.prev,
                    %next,
                    "task transition"
                );
            }
        }
    }

    fn on_group_started(&self, task: &TaskId, name: &str, phase: Phase, _timestamp: SystemTime) {
        debug!(%task, group = name, %phase, "group started");
    }

    fn on_group_completed(&self, task: &TaskId, name: &str, phase: Phase, _timestamp: SystemTime) {
        debug!(%task, group = name, %phase, "group completed");
    }
}
