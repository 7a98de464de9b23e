// src/dag/cycles.rs

//! Cycle detection over the built graph.
//!
//! Strongly connected components of size >= 2, plus self-loops, computed
//! with petgraph before any task runs. Cycles are never silently broken:
//! one diagnostic per component, listing every participating task.

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::dag::DepGraph;
use crate::errors::{Error, Result};
use crate::task::TaskId;

/// All cyclic components in the graph, each sorted for stable diagnostics.
pub fn cyclic_components(graph: &DepGraph) -> Vec<Vec<TaskId>> {
    // Edge direction dep -> task, matching execution order.
    let mut digraph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for task in graph.tasks() {
        digraph.add_node(task.as_str());
    }
    for task in graph.tasks() {
        if let Some(deps) = graph.dependencies_of(task) {
            for dep in deps {
                digraph.add_edge(dep.as_str(), task.as_str(), ());
            }
        }
    }

    let mut cycles = Vec::new();
    for component in tarjan_scc(&digraph) {
        let is_self_loop =
            component.len() == 1 && digraph.contains_edge(component[0], component[0]);
        if component.len() >= 2 || is_self_loop {
            let mut members: Vec<TaskId> =
                component.iter().map(|name| name.to_string()).collect();
            members.sort();
            cycles.push(members);
        }
    }
    cycles.sort();
    cycles
}

/// Fail fast if the graph contains any cycle.
pub fn ensure_acyclic(graph: &DepGraph) -> Result<()> {
    let cycles = cyclic_components(graph);
    if cycles.is_empty() {
        Ok(())
    } else {
        Err(Error::Cycle { cycles })
    }
}
