//! An observer that records every event it sees, with query helpers for
//! assertions about ordering and concurrency.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use taskdag::dag::DepGraph;
use taskdag::events::OutputCapture;
use taskdag::{Observer, Phase, TaskId, TaskState, TaskTransition};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Ready { root: TaskId, tasks: usize },
    Start,
    Stop,
    PhaseStarted(Phase),
    PhaseCompleted(Phase),
    Transition {
        task: TaskId,
        prev: TaskState,
        next: TaskState,
        phase: Phase,
        has_error: bool,
    },
    GroupStarted {
        task: TaskId,
        name: String,
        phase: Phase,
    },
    GroupCompleted {
        task: TaskId,
        name: String,
        phase: Phase,
    },
    RootTask(TaskId),
    OutputCaptureSet,
}

/// Records the full event stream; safe to share across threads.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: RecordedEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// The (prev, next) transitions recorded for one task in one phase, in
    /// delivery order.
    pub fn transitions_for(&self, task: &str, phase: Phase) -> Vec<(TaskState, TaskState)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Transition {
                    task: t,
                    prev,
                    next,
                    phase: p,
                    ..
                } if t == task && p == phase => Some((prev, next)),
                _ => None,
            })
            .collect()
    }

    /// Index of the first transition of `task` into `state`, if any.
    pub fn index_of(&self, task: &str, state: TaskState, phase: Phase) -> Option<usize> {
        self.events().into_iter().position(|event| {
            matches!(
                event,
                RecordedEvent::Transition { task: ref t, next, phase: p, .. }
                    if t == task && next == state && p == phase
            )
        })
    }

    /// Highest number of tasks simultaneously in the running state, judged
    /// from the transition stream.
    pub fn max_concurrent_running(&self, phase: Phase) -> usize {
        let mut running: usize = 0;
        let mut peak = 0;
        for event in self.events() {
            if let RecordedEvent::Transition {
                prev, next, phase: p, ..
            } = event
            {
                if p != phase {
                    continue;
                }
                if next == TaskState::Running {
                    running += 1;
                    peak = peak.max(running);
                } else if prev == TaskState::Running {
                    running = running.saturating_sub(1);
                }
            }
        }
        peak
    }

    /// All tasks that ever entered `state` in the given phase.
    pub fn tasks_reaching(&self, state: TaskState, phase: Phase) -> Vec<TaskId> {
        let mut tasks = Vec::new();
        for event in self.events() {
            if let RecordedEvent::Transition { task, next, phase: p, .. } = event
                && next == state
                && p == phase
                && !tasks.contains(&task)
            {
                tasks.push(task);
            }
        }
        tasks
    }
}

impl Observer for RecordingObserver {
    fn on_ready(&self, graph: &DepGraph) {
        self.push(RecordedEvent::Ready {
            root: graph.root().clone(),
            tasks: graph.len(),
        });
    }

    fn on_start(&self) {
        self.push(RecordedEvent::Start);
    }

    fn on_stop(&self) {
        self.push(RecordedEvent::Stop);
    }

    fn on_phase_started(&self, phase: Phase) {
        self.push(RecordedEvent::PhaseStarted(phase));
    }

    fn on_phase_completed(&self, phase: Phase) {
        self.push(RecordedEvent::PhaseCompleted(phase));
    }

    fn on_task_updated(&self, transition: &TaskTransition) {
        self.push(RecordedEvent::Transition {
            task: transition.task.clone(),
            prev: transition.prev,
            next: transition.next,
            phase: transition.phase,
            has_error: transition.error.is_some(),
        });
    }

    fn on_group_started(&self, task: &TaskId, name: &str, phase: Phase, _timestamp: SystemTime) {
        self.push(RecordedEvent::GroupStarted {
            task: task.clone(),
            name: name.to_string(),
            phase,
        });
    }

    fn on_group_completed(&self, task: &TaskId, name: &str, phase: Phase, _timestamp: SystemTime) {
        self.push(RecordedEvent::GroupCompleted {
            task: task.clone(),
            name: name.to_string(),
            phase,
        });
    }

    fn set_root_task(&self, root: &TaskId) {
        self.push(RecordedEvent::RootTask(root.clone()));
    }

    fn set_output_capture(&self, _capture: &Arc<dyn OutputCapture>) {
        self.push(RecordedEvent::OutputCaptureSet);
    }
}
