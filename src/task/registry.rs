// src/task/registry.rs

//! Descriptor registry and wrapper store.
//!
//! The [`Registry`] is the static universe of task types the session knows
//! about; the analyzer resolves source references against it. The
//! [`WrapperStore`] creates one [`TaskWrapper`] per task the executor
//! observes and is cleared between top-level invocations (and by `reset`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::{Error, Result};
use crate::task::{TaskId, TaskNode, TaskWrapper};

/// Immutable after session build: every task and section the session can
/// schedule, keyed by fully-qualified id.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    nodes: HashMap<TaskId, TaskNode>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: TaskNode) {
        self.nodes.insert(node.id().clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Lazily creates and caches wrappers, one per task per invocation.
pub struct WrapperStore {
    registry: Arc<Registry>,
    wrappers: Mutex<HashMap<TaskId, Arc<TaskWrapper>>>,
}

impl WrapperStore {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            wrappers: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapper for `id`, instantiating the task on first observation.
    ///
    /// Sections have no wrapper of their own; callers resolve a section to
    /// its selected implementation first.
    pub fn get_or_create(&self, id: &TaskId) -> Result<Arc<TaskWrapper>> {
        let mut wrappers = self.wrappers.lock().unwrap();
        if let Some(wrapper) = wrappers.get(id) {
            return Ok(Arc::clone(wrapper));
        }

        let descriptor = match self.registry.get(id) {
            Some(TaskNode::Task(d)) => d,
            Some(TaskNode::Section(_)) | None => {
                return Err(Error::UnknownTask(id.clone()));
            }
        };

        let wrapper = Arc::new(TaskWrapper::new(
            id.clone(),
            descriptor.instantiate(),
            descriptor.exports().to_vec(),
        ));
        wrappers.insert(id.clone(), Arc::clone(&wrapper));
        Ok(wrapper)
    }

    pub fn get(&self, id: &str) -> Option<Arc<TaskWrapper>> {
        self.wrappers.lock().unwrap().get(id).cloned()
    }

    /// Every wrapper created so far, sorted by task id for deterministic
    /// iteration.
    pub fn all(&self) -> Vec<Arc<TaskWrapper>> {
        let mut wrappers: Vec<Arc<TaskWrapper>> =
            self.wrappers.lock().unwrap().values().cloned().collect();
        wrappers.sort_by(|a, b| a.id().cmp(b.id()));
        wrappers
    }

    /// Drop every wrapper; the next invocation starts from scratch.
    pub fn clear(&self) {
        self.wrappers.lock().unwrap().clear();
    }
}
