// src/lib.rs

//! taskdag: a dependency-driven task execution engine.
//!
//! Tasks declare exported values and read other tasks' exports with
//! `ctx.need::<Dep>("export")`; the dependency graph is discovered by
//! static analysis of the task source, checked for cycles, and executed on
//! a bounded pool of worker threads with cooperative suspension at
//! dependency requests. Failures surface as one structured aggregate;
//! lifecycle events stream to pluggable observers.
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskdag::prelude::*;
//!
//! #[derive(Default)]
//! struct Fetch;
//!
//! #[async_trait(?Send)]
//! impl Task for Fetch {
//!     async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
//!         Ok(Outputs::new().with("payload", "hello".to_string()))
//!     }
//! }
//! register_task!(Fetch, exports = ["payload"]);
//!
//! #[derive(Default)]
//! struct Greet;
//!
//! #[async_trait(?Send)]
//! impl Task for Greet {
//!     async fn run(&self, ctx: &TaskContext) -> TaskResult<Outputs> {
//!         let payload: Arc<String> = ctx.need_as::<Fetch, String>("payload").await?;
//!         Ok(Outputs::new().with("greeting", format!("{payload}!")))
//!     }
//! }
//! register_task!(Greet, exports = ["greeting"]);
//!
//! let session = Session::builder().register::<Fetch>().register::<Greet>().build();
//! let outputs = session.run::<Greet>()?;
//! assert_eq!(outputs.get::<String>("greeting").map(String::as_str), Some("hello!"));
//! # taskdag::errors::Result::Ok(())
//! ```

pub mod analyze;
pub mod args;
pub mod dag;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod pool;
pub mod session;
pub mod state;
pub mod task;

pub use args::{RunArgs, RunArgsBuilder};
pub use errors::{
    AbortError, AggregateError, DependencyFailed, Error, Result, SharedCause, TaskFailure,
    TaskResult,
};
pub use events::{EventHub, LogObserver, Observer, OutputCapture, Phase, TaskTransition};
pub use pool::context::{TaskContext, current_task};
pub use session::{Session, SessionBuilder, default_worker_count};
pub use task::{
    ExportValue, Outputs, RegisteredSection, RegisteredTask, Task, TaskId, TaskRef, TaskState,
};

/// The imports a task-defining module usually wants.
pub mod prelude {
    pub use async_trait::async_trait;

    pub use crate::args::{RunArgs, RunArgsBuilder};
    pub use crate::errors::{AbortError, Error, Result, TaskResult};
    pub use crate::events::{Observer, Phase};
    pub use crate::pool::context::TaskContext;
    pub use crate::session::{Session, SessionBuilder};
    pub use crate::task::{
        Outputs, RegisteredSection, RegisteredTask, Task, TaskId, TaskRef, TaskState,
    };
    pub use crate::{register_section, register_task};
}
