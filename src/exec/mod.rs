// src/exec/mod.rs

//! Top-level orchestration.
//!
//! The [`Executor`] drives one invocation: it expands the dependency graph,
//! fails fast on cycles, starts the worker pool, seeds the leaf tasks and
//! then runs the completion event loop until the root is terminal. Each
//! completion marks the scheduler, propagates skips on failure and
//! dispatches newly ready tasks. Teardown shuts the pool down and folds
//! every failed wrapper into a single aggregate error.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::analyze::DependencyAnalyzer;
use crate::args::RunArgs;
use crate::dag::{DepGraph, Scheduler, ensure_acyclic};
use crate::errors::{
    AbortError, AggregateError, DependencyFailed, Error, Result, SharedCause, TaskFailure,
    unwrap_failure_chain,
};
use crate::events::{EventHub, OutputCapture, Phase};
use crate::pool::{AbortFlag, CompletionEvent, RunEnv, WorkerPool};
use crate::state::{SharedState, notify_failed};
use crate::task::{Outputs, Registry, TaskId, TaskState, WrapperStore};

/// Per-invocation options, resolved by the session.
#[derive(Clone)]
pub(crate) struct ExecOptions {
    pub workers: usize,
    pub args: RunArgs,
    pub capture: Option<Arc<dyn OutputCapture>>,
}

/// One top-level invocation over a fixed registry.
pub(crate) struct Executor {
    registry: Arc<Registry>,
    analyzer: Arc<DependencyAnalyzer>,
    wrappers: Arc<WrapperStore>,
    events: Arc<EventHub>,
    options: ExecOptions,
}

impl Executor {
    pub fn new(
        registry: Arc<Registry>,
        analyzer: Arc<DependencyAnalyzer>,
        wrappers: Arc<WrapperStore>,
        events: Arc<EventHub>,
        options: ExecOptions,
    ) -> Self {
        Self {
            registry,
            analyzer,
            wrappers,
            events,
            options,
        }
    }

    /// Execute `root` and its transitive dependencies; return the root's
    /// outputs.
    pub fn run(&self, root: &TaskId) -> Result<Outputs> {
        let (graph, mut scheduler) = self.prepare(root)?;
        self.run_phase(&graph, &mut scheduler)?;
        self.events.stop();
        self.run_result(&graph)
    }

    /// Execute the clean phase in reverse dependency order.
    pub fn clean(&self, root: &TaskId) -> Result<()> {
        let (graph, mut scheduler) = self.prepare(root)?;
        self.clean_phase(&graph, &mut scheduler)?;
        self.events.stop();
        self.clean_result(&graph)
    }

    /// Run, then clean. The clean phase always executes, even when the run
    /// failed; the run's outcome wins, and clean failures surface only when
    /// the run itself succeeded.
    pub fn run_and_clean(&self, root: &TaskId) -> Result<Outputs> {
        let (graph, mut scheduler) = self.prepare(root)?;
        self.run_phase(&graph, &mut scheduler)?;
        self.clean_phase(&graph, &mut scheduler)?;
        self.events.stop();

        let run_result = self.run_result(&graph);
        match run_result {
            Ok(outputs) => {
                self.clean_result(&graph)?;
                Ok(outputs)
            }
            Err(err) => {
                if let Err(clean_err) = self.clean_result(&graph) {
                    warn!(error = %clean_err, "clean failures after failed run");
                }
                Err(err)
            }
        }
    }

    /// Graph expansion, cycle check and observer setup, shared by every
    /// entry point. Fails before any worker starts.
    fn prepare(&self, root: &TaskId) -> Result<(DepGraph, Scheduler)> {
        let graph = DepGraph::build(root, &self.registry, &self.analyzer, &self.options.args)?;
        ensure_acyclic(&graph)?;

        let mut scheduler = Scheduler::new();
        scheduler.load_graph(&graph);

        self.events.set_root_task(graph.root());
        if let Some(capture) = &self.options.capture {
            self.events.set_output_capture(capture);
        }
        self.events.ready(&graph);
        self.events.start();

        info!(root = %graph.root(), tasks = graph.len(), "execution prepared");
        Ok((graph, scheduler))
    }

    // --- run phase ---

    fn run_phase(&self, graph: &DepGraph, scheduler: &mut Scheduler) -> Result<()> {
        let shared = Arc::new(SharedState::new());
        for task in graph.tasks() {
            let wrapper = self.wrappers.get_or_create(task)?;
            shared.register(task, wrapper);
        }

        // Unselected section candidates are terminal before anything runs.
        for candidate in graph.unselected_candidates() {
            let wrapper = self.wrappers.get_or_create(candidate)?;
            let cause: SharedCause =
                Arc::new(anyhow!("section candidate '{candidate}' was not selected"));
            wrapper.mark_run_skipped(cause.clone());
            self.events.task_updated(
                candidate,
                TaskState::Pending,
                TaskState::Skipped,
                Phase::Run,
                Some(cause),
            );
        }

        self.events.phase_started(Phase::Run);

        let (completions_tx, mut completions_rx) = mpsc::unbounded_channel::<CompletionEvent>();
        let abort = Arc::new(AbortFlag::default());
        let env = RunEnv {
            shared: Arc::clone(&shared),
            wrappers: Arc::clone(&self.wrappers),
            events: Arc::clone(&self.events),
            completions: completions_tx,
            args: self.options.args.clone(),
            abort: Arc::clone(&abort),
            sections: Arc::new(graph.section_choices().clone()),
        };
        let mut pool = WorkerPool::start(self.options.workers, env)?;

        // Seed the leaf tasks (the root among them when it has no
        // dependencies); everything else is dispatched by the ready-set
        // machinery as completions land. Dependencies the analyzer did not
        // see are started on demand from inside `need`.
        let root = graph.root().clone();
        for leaf in graph.leaves() {
            scheduler.mark_running(&leaf);
            pool.execute(leaf);
        }

        while !scheduler.is_terminal(&root, Phase::Run) {
            if abort.is_set() && !scheduler.any_running() {
                break;
            }
            let Some(event) = completions_rx.blocking_recv() else {
                break;
            };
            if event.phase != Phase::Run {
                continue;
            }

            if event.success {
                scheduler.mark_completed(&event.task);
            } else {
                scheduler.mark_failed(&event.task);
                let cause = self
                    .wrappers
                    .get(&event.task)
                    .and_then(|w| w.run_error())
                    .unwrap_or_else(|| Arc::new(anyhow!("task '{}' failed", event.task)));
                let dependents = scheduler.pending_dependents_of(&event.task);
                self.skip_tasks(&shared, scheduler, dependents, |_| {
                    Arc::new(anyhow::Error::new(DependencyFailed {
                        task: event.task.clone(),
                        cause: cause.clone(),
                    }))
                });
            }

            if !abort.is_set() {
                for task in scheduler.next_ready_tasks() {
                    scheduler.mark_running(&task);
                    pool.execute(task);
                }
            }
        }

        // Anything still pending was never reached.
        let unreached = scheduler.skipped_task_classes();
        if !unreached.is_empty() {
            debug!(count = unreached.len(), "skipping unreached tasks");
        }
        let aborted = abort.is_set();
        self.skip_tasks(&shared, scheduler, unreached, |task| {
            if aborted {
                Arc::new(anyhow::Error::new(AbortError))
            } else {
                Arc::new(anyhow!("task '{task}' was never reached"))
            }
        });

        pool.shutdown();
        self.events.phase_completed(Phase::Run);
        Ok(())
    }

    /// Mark a batch of pending tasks skipped: shared-state CAS first (a
    /// task that already started is left for its own completion), then
    /// wrapper, waiters, scheduler and observers.
    fn skip_tasks(
        &self,
        shared: &SharedState,
        scheduler: &mut Scheduler,
        tasks: Vec<TaskId>,
        cause_for: impl Fn(&TaskId) -> SharedCause,
    ) {
        for task in tasks {
            let cause = cause_for(&task);
            let Some(waiters) = shared.mark_skipped(&task, cause.clone()) else {
                continue;
            };
            if let Some(wrapper) = self.wrappers.get(&task) {
                wrapper.mark_run_skipped(cause.clone());
            }
            notify_failed(waiters, &cause);
            scheduler.mark_skipped(&task);
            self.events.task_updated(
                &task,
                TaskState::Pending,
                TaskState::Skipped,
                Phase::Run,
                Some(cause),
            );
        }
    }

    fn run_result(&self, graph: &DepGraph) -> Result<Outputs> {
        let failures = self.collect_run_failures(graph);
        if failures
            .iter()
            .any(|f| f.cause.downcast_ref::<AbortError>().is_some())
        {
            return Err(Error::Abort(AbortError));
        }
        if !failures.is_empty() {
            return Err(Error::Aggregate(AggregateError { failures }));
        }

        let outputs = self
            .wrappers
            .get(graph.root())
            .and_then(|wrapper| wrapper.run_outputs())
            .unwrap_or_default();
        Ok(outputs)
    }

    /// One failure per distinct underlying cause: dependency-failure chains
    /// are unwrapped to their producer, nested aggregates are flattened,
    /// and causes observed through several tasks are deduplicated by
    /// pointer identity.
    fn collect_run_failures(&self, graph: &DepGraph) -> Vec<TaskFailure> {
        let mut seen: Vec<SharedCause> = Vec::new();
        let mut failures = Vec::new();

        // Graph tasks first, in discovery order; then any wrapper created
        // outside the static graph (a demand-started dependency).
        let mut wrappers: Vec<_> = graph
            .tasks()
            .filter_map(|task| self.wrappers.get(task))
            .collect();
        wrappers.extend(
            self.wrappers
                .all()
                .into_iter()
                .filter(|wrapper| !graph.contains(wrapper.id())),
        );

        for wrapper in wrappers {
            if wrapper.run_state() != TaskState::Failed {
                continue;
            }
            let Some(cause) = wrapper.run_error() else {
                continue;
            };

            let (producer, root_cause) = unwrap_failure_chain(wrapper.id(), &cause);

            if let Some(nested) = root_cause.downcast_ref::<AggregateError>() {
                for inner in &nested.failures {
                    self.push_failure(&mut seen, &mut failures, inner.task.clone(), &inner.cause);
                }
            } else {
                self.push_failure(&mut seen, &mut failures, producer, &root_cause);
            }
        }

        failures
    }

    fn push_failure(
        &self,
        seen: &mut Vec<SharedCause>,
        failures: &mut Vec<TaskFailure>,
        task: TaskId,
        cause: &SharedCause,
    ) {
        if seen.iter().any(|known| Arc::ptr_eq(known, cause)) {
            return;
        }
        seen.push(cause.clone());
        let output = self
            .options
            .capture
            .as_ref()
            .map(|capture| capture.recent_lines(&task))
            .unwrap_or_default();
        failures.push(TaskFailure {
            task,
            cause: cause.clone(),
            output,
        });
    }

    // --- clean phase ---

    fn clean_phase(&self, graph: &DepGraph, scheduler: &mut Scheduler) -> Result<()> {
        scheduler.prepare_clean();
        self.events.phase_started(Phase::Clean);

        let (completions_tx, mut completions_rx) = mpsc::unbounded_channel::<CompletionEvent>();
        let abort = Arc::new(AbortFlag::default());
        let env = RunEnv {
            shared: Arc::new(SharedState::new()),
            wrappers: Arc::clone(&self.wrappers),
            events: Arc::clone(&self.events),
            completions: completions_tx,
            args: self.options.args.clone(),
            abort: Arc::clone(&abort),
            sections: Arc::new(HashMap::new()),
        };
        let mut pool = WorkerPool::start(self.options.workers, env)?;

        // Dependents first: the initial ready set is every task nothing
        // depends on.
        for task in scheduler.next_ready_clean_tasks() {
            scheduler.mark_clean_running(&task);
            pool.execute_clean(task);
        }

        while !scheduler.all_clean_terminal() {
            if abort.is_set() && !scheduler.any_clean_running() {
                break;
            }
            let Some(event) = completions_rx.blocking_recv() else {
                break;
            };
            if event.phase != Phase::Clean {
                continue;
            }

            if event.success {
                scheduler.mark_clean_completed(&event.task);
            } else {
                scheduler.mark_clean_failed(&event.task);
            }

            if !abort.is_set() {
                for task in scheduler.next_ready_clean_tasks() {
                    scheduler.mark_clean_running(&task);
                    pool.execute_clean(task);
                }
            }
        }

        // Abort can leave clean-pending tasks behind; fail them so the
        // phase ends in a fully terminal state.
        for task in scheduler.clean_pending_tasks() {
            let cause: SharedCause = Arc::new(anyhow::Error::new(AbortError));
            if let Some(wrapper) = self.wrappers.get(&task) {
                wrapper.mark_clean_failed(cause.clone());
            }
            scheduler.mark_clean_failed(&task);
            self.events.task_updated(
                &task,
                TaskState::Pending,
                TaskState::Failed,
                Phase::Clean,
                Some(cause),
            );
        }

        pool.shutdown();
        self.events.phase_completed(Phase::Clean);
        Ok(())
    }

    fn clean_result(&self, graph: &DepGraph) -> Result<()> {
        let mut seen: Vec<SharedCause> = Vec::new();
        let mut failures = Vec::new();

        for task in graph.tasks() {
            let Some(wrapper) = self.wrappers.get(task) else {
                continue;
            };
            if let Some(cause) = wrapper.clean_error() {
                self.push_failure(&mut seen, &mut failures, task.clone(), &cause);
            }
        }

        if failures
            .iter()
            .any(|f| f.cause.downcast_ref::<AbortError>().is_some())
        {
            return Err(Error::Abort(AbortError));
        }
        if !failures.is_empty() {
            return Err(Error::Aggregate(AggregateError { failures }));
        }
        Ok(())
    }
}
