// src/pool/driver.rs

//! Task body drivers.
//!
//! `drive_run` claims a task through the shared-state CAS (both the
//! executor's ready dispatch and a dependency's nested start race through
//! it; the loser does nothing), runs the body, records the outcome on the
//! wrapper and the shared state, resumes waiters, emits transition events
//! and reports to the completion queue. Exactly one completion event is
//! produced per claimed task.

use std::sync::Arc;

use tracing::debug;

use crate::errors::{AbortError, SharedCause};
use crate::events::Phase;
use crate::pool::RunEnv;
use crate::pool::context::{CURRENT_TASK, TaskContext};
use crate::state::{notify_completed, notify_failed};
use crate::task::{TaskId, TaskState};

/// Run one task to a terminal state on the current worker.
pub(crate) async fn drive_run(env: RunEnv, task: TaskId) {
    let wrapper = match env.wrappers.get_or_create(&task) {
        Ok(wrapper) => wrapper,
        Err(err) => {
            debug!(%task, error = %err, "cannot instantiate task");
            return;
        }
    };

    // Abort requested before this body started: it becomes a no-op that
    // fails with the propagated abort error.
    if env.abort.is_set() {
        if !env.shared.mark_running(&task) {
            return;
        }
        let cause: SharedCause = Arc::new(anyhow::Error::new(AbortError));
        wrapper.mark_run_failed(cause.clone());
        let waiters = env.shared.mark_failed(&task, cause.clone());
        notify_failed(waiters, &cause);
        env.events.task_updated(
            &task,
            TaskState::Pending,
            TaskState::Failed,
            Phase::Run,
            Some(cause),
        );
        report(&env, &task, Phase::Run, false);
        return;
    }

    // Claim the task; a false CAS means another worker (or a nested start)
    // already owns it.
    if !env.shared.mark_running(&task) {
        return;
    }

    wrapper.mark_run_running();
    env.events.task_updated(
        &task,
        TaskState::Pending,
        TaskState::Running,
        Phase::Run,
        None,
    );

    let ctx = TaskContext::new(env.clone(), task.clone(), Phase::Run);
    let instance = wrapper.instance();
    let result = CURRENT_TASK
        .scope(task.clone(), async { instance.run(&ctx).await })
        .await;

    match result {
        Ok(outputs) => {
            wrapper.mark_run_completed(outputs);
            let waiters = env.shared.mark_completed(&task);
            notify_completed(&wrapper, waiters);
            env.events.task_updated(
                &task,
                TaskState::Running,
                TaskState::Completed,
                Phase::Run,
                None,
            );
            report(&env, &task, Phase::Run, true);
        }
        Err(err) => {
            let cause: SharedCause = Arc::new(err);
            if cause.downcast_ref::<AbortError>().is_some() {
                debug!(%task, "abort requested");
                env.abort.set();
            }
            wrapper.mark_run_failed(cause.clone());
            let waiters = env.shared.mark_failed(&task, cause.clone());
            notify_failed(waiters, &cause);
            env.events.task_updated(
                &task,
                TaskState::Running,
                TaskState::Failed,
                Phase::Run,
                Some(cause),
            );
            report(&env, &task, Phase::Run, false);
        }
    }
}

/// Run one clean body. Clean bodies never call `need`, so there is no
/// claiming protocol and no waiter handling; the scheduler alone orders
/// them.
pub(crate) async fn drive_clean(env: RunEnv, task: TaskId) {
    let wrapper = match env.wrappers.get_or_create(&task) {
        Ok(wrapper) => wrapper,
        Err(err) => {
            debug!(%task, error = %err, "cannot instantiate task for clean");
            return;
        }
    };

    if env.abort.is_set() {
        let cause: SharedCause = Arc::new(anyhow::Error::new(AbortError));
        wrapper.mark_clean_failed(cause.clone());
        env.events.task_updated(
            &task,
            TaskState::Pending,
            TaskState::Failed,
            Phase::Clean,
            Some(cause),
        );
        report(&env, &task, Phase::Clean, false);
        return;
    }

    if !wrapper.mark_clean_running() {
        return;
    }
    env.events.task_updated(
        &task,
        TaskState::Pending,
        TaskState::Running,
        Phase::Clean,
        None,
    );

    let ctx = TaskContext::new(env.clone(), task.clone(), Phase::Clean);
    let instance = wrapper.instance();
    let result = CURRENT_TASK
        .scope(task.clone(), async { instance.clean(&ctx).await })
        .await;

    match result {
        Ok(()) => {
            wrapper.mark_clean_completed();
            env.events.task_updated(
                &task,
                TaskState::Running,
                TaskState::Completed,
                Phase::Clean,
                None,
            );
            report(&env, &task, Phase::Clean, true);
        }
        Err(err) => {
            let cause: SharedCause = Arc::new(err);
            if cause.downcast_ref::<AbortError>().is_some() {
                env.abort.set();
            }
            wrapper.mark_clean_failed(cause.clone());
            env.events.task_updated(
                &task,
                TaskState::Running,
                TaskState::Failed,
                Phase::Clean,
                Some(cause),
            );
            report(&env, &task, Phase::Clean, false);
        }
    }
}

fn report(env: &RunEnv, task: &TaskId, phase: Phase, success: bool) {
    // The receiver is gone once the executor loop exited; completions from
    // draining workers are intentionally dropped then.
    let _ = env.completions.send(crate::pool::CompletionEvent {
        task: task.clone(),
        phase,
        success,
    });
}
