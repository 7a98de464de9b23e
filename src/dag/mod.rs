// src/dag/mod.rs

//! Dependency graph and scheduling.
//!
//! - [`graph`] builds forward/reverse adjacency by BFS from the root,
//!   resolving section references along the way.
//! - [`cycles`] runs the pre-flight strongly-connected-component check.
//! - [`scheduler`] holds the per-invocation run/clean state machines and
//!   computes ready sets.

pub mod cycles;
pub mod graph;
pub mod scheduler;

pub use cycles::{cyclic_components, ensure_acyclic};
pub use graph::DepGraph;
pub use scheduler::Scheduler;
