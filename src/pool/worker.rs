// src/pool/worker.rs

//! Worker thread main loop.
//!
//! Each worker runs a current-thread tokio runtime with a `LocalSet`: the
//! command loop and every task future it spawns are polled by this one
//! thread. A parked task future therefore resumes on the worker that
//! parked it. On shutdown the command loop exits first, then the remaining
//! local futures are driven to completion, so in-flight bodies are never
//! interrupted.

use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, error};

use crate::pool::driver::{drive_clean, drive_run};
use crate::pool::{RunEnv, WorkerCommand};

pub(crate) fn worker_main(
    index: usize,
    env: RunEnv,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(worker = index, error = %err, "failed to build worker runtime");
            return;
        }
    };

    let local = LocalSet::new();

    debug!(worker = index, "worker started");

    local.block_on(&runtime, async {
        // Commands are driven one at a time: a worker executes at most one
        // body directly. Dependencies started from inside a body
        // (`need` on a pending task) are spawned onto this same LocalSet
        // and polled while the body is parked, so progress never stalls.
        while let Some(command) = commands.recv().await {
            match command {
                WorkerCommand::Execute(task) => {
                    debug!(worker = index, %task, "executing task");
                    drive_run(env.clone(), task).await;
                }
                WorkerCommand::ExecuteClean(task) => {
                    debug!(worker = index, %task, "executing clean");
                    drive_clean(env.clone(), task).await;
                }
                WorkerCommand::Shutdown => {
                    debug!(worker = index, "shutdown received");
                    break;
                }
            }
        }
    });

    // Drain any futures still owned by this worker (bodies that were
    // running or parked when shutdown arrived).
    runtime.block_on(local);

    debug!(worker = index, "worker stopped");
}
