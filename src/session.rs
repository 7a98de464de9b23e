// src/session.rs

//! The session: the explicit execution facade user code holds.
//!
//! A session owns the registry of task types, the analyzer and its cache,
//! the per-invocation wrapper store and the event hub. Top-level
//! invocations (`run`, `clean`, `run_and_clean`, `export`) go through it;
//! one invocation runs at a time.

use std::sync::{Arc, Mutex};

use crate::analyze::DependencyAnalyzer;
use crate::args::RunArgs;
use crate::errors::{Error, Result};
use crate::events::{EventHub, LogObserver, Observer, OutputCapture};
use crate::exec::{ExecOptions, Executor};
use crate::task::wrapper::ExportFetch;
use crate::task::{
    ExportValue, Outputs, RegisteredSection, RegisteredTask, Registry, TaskId, TaskNode, TaskRef,
    TaskState, WrapperStore,
};

/// Default worker count: the machine's parallelism, clamped to [2, 8].
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .clamp(2, 8)
}

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    registry: Registry,
    observers: Vec<Arc<dyn Observer>>,
    strict_analysis: bool,
    workers: Option<usize>,
    capture: Option<Arc<dyn OutputCapture>>,
}

impl SessionBuilder {
    /// Add a concrete task type to the session's universe.
    pub fn register<T: RegisteredTask>(mut self) -> Self {
        self.registry.insert(TaskNode::Task(T::descriptor()));
        self
    }

    /// Add a section (polymorphic task) to the session's universe.
    pub fn register_section<S: RegisteredSection>(mut self) -> Self {
        self.registry.insert(TaskNode::Section(S::descriptor()));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Attach the default tracing-backed observer.
    pub fn with_log_observer(self) -> Self {
        self.observer(Arc::new(LogObserver))
    }

    /// Surface analyzer failures as build errors instead of degrading to
    /// an empty dependency set.
    pub fn strict_analysis(mut self, strict: bool) -> Self {
        self.strict_analysis = strict;
        self
    }

    /// Default worker count for invocations that do not specify one.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn output_capture(mut self, capture: Arc<dyn OutputCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn build(self) -> Session {
        let registry = Arc::new(self.registry);
        let events = Arc::new(EventHub::new());
        for observer in self.observers {
            events.attach(observer);
        }
        Session {
            wrappers: Arc::new(WrapperStore::new(Arc::clone(&registry))),
            analyzer: Arc::new(DependencyAnalyzer::new(self.strict_analysis)),
            registry,
            events,
            default_workers: self.workers,
            capture: self.capture,
            invocation: Mutex::new(()),
        }
    }
}

/// The user-facing execution facade.
pub struct Session {
    registry: Arc<Registry>,
    analyzer: Arc<DependencyAnalyzer>,
    wrappers: Arc<WrapperStore>,
    events: Arc<EventHub>,
    default_workers: Option<usize>,
    capture: Option<Arc<dyn OutputCapture>>,
    /// Serializes top-level invocations; export reads from other threads
    /// block here until the running invocation finishes.
    invocation: Mutex<()>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Attach a further observer; it sees events from the next invocation.
    pub fn attach_observer(&self, observer: Arc<dyn Observer>) {
        self.events.attach(observer);
    }

    /// Execute `T` and its transitive dependencies with default arguments
    /// and workers; return `T`'s outputs.
    pub fn run<T: TaskRef>(&self) -> Result<Outputs> {
        self.run_with::<T>(RunArgs::new(), None)
    }

    pub fn run_with<T: TaskRef>(&self, args: RunArgs, workers: Option<usize>) -> Result<Outputs> {
        let _guard = self.invocation.lock().unwrap();
        let executor = self.executor(args, workers)?;
        self.wrappers.clear();
        executor.run(&T::task_id())
    }

    /// Run the clean phase over `T`'s graph, dependents first.
    pub fn clean<T: TaskRef>(&self) -> Result<()> {
        self.clean_with::<T>(RunArgs::new(), None)
    }

    pub fn clean_with<T: TaskRef>(&self, args: RunArgs, workers: Option<usize>) -> Result<()> {
        let _guard = self.invocation.lock().unwrap();
        let executor = self.executor(args, workers)?;
        executor.clean(&T::task_id())
    }

    /// Run, then clean; clean always runs even when the run fails.
    pub fn run_and_clean<T: TaskRef>(&self) -> Result<Outputs> {
        self.run_and_clean_with::<T>(RunArgs::new(), None)
    }

    pub fn run_and_clean_with<T: TaskRef>(
        &self,
        args: RunArgs,
        workers: Option<usize>,
    ) -> Result<Outputs> {
        let _guard = self.invocation.lock().unwrap();
        let executor = self.executor(args, workers)?;
        self.wrappers.clear();
        executor.run_and_clean(&T::task_id())
    }

    /// Read one exported value of `T`, forcing execution if it has not
    /// completed in the current invocation. Values are cached until the
    /// next `run` or `reset`.
    pub fn export<T: TaskRef>(&self, name: &str) -> Result<ExportValue> {
        let id = T::task_id();

        {
            let _guard = self.invocation.lock().unwrap();
            if let Some(wrapper) = self.wrappers.get(&id)
                && wrapper.run_state().is_terminal()
            {
                return self.read_export(&id, name);
            }
        }

        // Not computed yet: force a full run of T, then read.
        self.run::<T>()?;
        self.read_export(&id, name)
    }

    /// `export` with a typed downcast.
    pub fn export_as<T: TaskRef, V: std::any::Any + Send + Sync>(
        &self,
        name: &str,
    ) -> Result<Arc<V>> {
        let value = self.export::<T>(name)?;
        let id = T::task_id();
        value
            .downcast::<V>()
            .map_err(|_| Error::ExportUnavailable {
                task: id,
                export: name.to_string(),
                state: "of a different type",
            })
    }

    /// Clear cached wrappers and analysis results; the next invocation
    /// recomputes everything and observers see a fresh event stream.
    pub fn reset(&self) {
        let _guard = self.invocation.lock().unwrap();
        self.wrappers.clear();
        self.analyzer.invalidate();
    }

    fn read_export(&self, id: &TaskId, name: &str) -> Result<ExportValue> {
        let Some(wrapper) = self.wrappers.get(id) else {
            return Err(Error::UnknownTask(id.clone()));
        };
        match wrapper.export(name) {
            Ok(value) => Ok(value),
            Err(ExportFetch::TaskFailed(cause)) => Err(Error::Other(anyhow::anyhow!(
                "task '{id}' did not complete: {cause}"
            ))),
            Err(ExportFetch::Missing) => Err(Error::ExportUnavailable {
                task: id.clone(),
                export: name.to_string(),
                state: "not among its exports",
            }),
            Err(ExportFetch::NotStarted) => Err(Error::ExportUnavailable {
                task: id.clone(),
                export: name.to_string(),
                state: "pending",
            }),
            Err(ExportFetch::StillRunning) => Err(Error::ExportUnavailable {
                task: id.clone(),
                export: name.to_string(),
                state: "running",
            }),
        }
    }

    fn executor(&self, args: RunArgs, workers: Option<usize>) -> Result<Executor> {
        let workers = match workers.or(self.default_workers) {
            Some(0) => return Err(Error::InvalidWorkerCount(0)),
            Some(n) => n,
            None => default_worker_count(),
        };

        Ok(Executor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.analyzer),
            Arc::clone(&self.wrappers),
            Arc::clone(&self.events),
            ExecOptions {
                workers,
                args,
                capture: self.capture.clone(),
            },
        ))
    }

    /// The wrapper state of a task from the last invocation, if any.
    pub fn task_state<T: TaskRef>(&self) -> Option<TaskState> {
        self.wrappers.get(&T::task_id()).map(|w| w.run_state())
    }
}
