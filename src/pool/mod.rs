// src/pool/mod.rs

//! Worker pool.
//!
//! N OS threads, each owning a private command queue and a single-threaded
//! cooperative executor. Tasks are round-robined across workers on enqueue;
//! a task future never migrates: it is parked and resumed on the worker
//! that owns it. Completions from every worker funnel into one completion
//! queue consumed by the executor's main loop.

pub mod context;
pub mod driver;
pub mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::args::RunArgs;
use crate::events::{EventHub, Phase};
use crate::state::SharedState;
use crate::task::{TaskId, WrapperStore};

/// Commands a worker consumes from its private queue.
#[derive(Debug)]
pub enum WorkerCommand {
    Execute(TaskId),
    ExecuteClean(TaskId),
    Shutdown,
}

/// One task reaching a terminal state, reported to the executor loop.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub task: TaskId,
    pub phase: Phase,
    pub success: bool,
}

/// Cooperative abort flag: set by a task returning [`AbortError`]
/// (`crate::errors::AbortError`); checked before any new body starts.
#[derive(Debug, Default)]
pub struct AbortFlag(AtomicBool);

impl AbortFlag {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a driver needs, shared by all workers of one invocation.
#[derive(Clone)]
pub(crate) struct RunEnv {
    pub shared: Arc<SharedState>,
    pub wrappers: Arc<WrapperStore>,
    pub events: Arc<EventHub>,
    pub completions: mpsc::UnboundedSender<CompletionEvent>,
    pub args: RunArgs,
    pub abort: Arc<AbortFlag>,
    /// Section id -> selected implementation, fixed at graph build.
    pub sections: Arc<std::collections::HashMap<TaskId, TaskId>>,
}

/// Handle over the started workers. Owned by the executor; never shared.
pub struct WorkerPool {
    queues: Vec<mpsc::UnboundedSender<WorkerCommand>>,
    handles: Vec<JoinHandle<()>>,
    next: usize,
}

impl WorkerPool {
    /// Spawn `workers` threads, each with its own command queue.
    pub(crate) fn start(workers: usize, env: RunEnv) -> std::io::Result<Self> {
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker_env = env.clone();
            let handle = std::thread::Builder::new()
                .name(format!("taskdag-worker-{index}"))
                .spawn(move || worker::worker_main(index, worker_env, rx))?;
            queues.push(tx);
            handles.push(handle);
        }

        debug!(workers, "worker pool started");
        Ok(Self {
            queues,
            handles,
            next: 0,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    /// Round-robin a run command onto the next worker.
    pub fn execute(&mut self, task: TaskId) {
        self.send(WorkerCommand::Execute(task));
    }

    pub fn execute_clean(&mut self, task: TaskId) {
        self.send(WorkerCommand::ExecuteClean(task));
    }

    fn send(&mut self, command: WorkerCommand) {
        let queue = &self.queues[self.next];
        self.next = (self.next + 1) % self.queues.len();
        if queue.send(command).is_err() {
            warn!("worker queue closed; command dropped");
        }
    }

    /// Inject a shutdown command into every queue and join the threads.
    /// Workers finish their in-flight task futures before exiting.
    pub fn shutdown(self) {
        for queue in &self.queues {
            let _ = queue.send(WorkerCommand::Shutdown);
        }
        drop(self.queues);
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
        debug!("worker pool stopped");
    }
}
