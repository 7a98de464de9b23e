// src/analyze/mod.rs

//! Static dependency analyzer.
//!
//! Discovers the dependency set of a task by parsing its source file and
//! walking the `run` body (plus private helpers transitively called through
//! `self`) for references that resolve to registered tasks. No user code
//! runs. Analysis degrades rather than aborts: I/O and parse failures are
//! logged and yield an empty set, unless the session opted into strict
//! mode, where they surface as build errors.

mod parser;
mod resolve;
mod visitor;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::task::{Registry, TaskDescriptor, TaskId};

use syn::visit::Visit;

use parser::methods_of_type;
use resolve::resolve_reference;
use visitor::ReferenceCollector;

/// Analyzer with a per-task result cache. Results are pure functions of
/// source text, so the cache is valid until explicitly invalidated.
#[derive(Debug, Default)]
pub struct DependencyAnalyzer {
    strict: bool,
    cache: Mutex<HashMap<TaskId, HashSet<TaskId>>>,
}

impl DependencyAnalyzer {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The dependency set of one task: analyzed references unioned with the
    /// descriptor's explicitly declared dependencies.
    pub fn dependencies_of(
        &self,
        registry: &Registry,
        descriptor: &TaskDescriptor,
    ) -> Result<HashSet<TaskId>> {
        let id = descriptor.id().clone();

        if let Some(cached) = self.cache.lock().unwrap().get(&id) {
            return Ok(cached.clone());
        }

        let mut deps = match self.analyze_source(registry, descriptor) {
            Ok(deps) => deps,
            Err(error) if self.strict => {
                return Err(Error::Build {
                    task: id,
                    message: error.to_string(),
                });
            }
            Err(error) => {
                warn!(task = %id, %error, "dependency analysis failed; assuming no dependencies");
                HashSet::new()
            }
        };

        deps.extend(descriptor.declared_deps().iter().cloned());

        debug!(task = %id, count = deps.len(), "analyzed dependencies");
        self.cache.lock().unwrap().insert(id, deps.clone());
        Ok(deps)
    }

    /// Drop all cached analysis results.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap().clear();
    }

    fn analyze_source(
        &self,
        registry: &Registry,
        descriptor: &TaskDescriptor,
    ) -> anyhow::Result<HashSet<TaskId>> {
        let source = std::fs::read_to_string(descriptor.source_file())?;
        let file = syn::parse_file(&source)?;

        let methods = methods_of_type(&file, descriptor.type_name());

        // Fixed point over `run` and every same-type helper it reaches.
        let mut collector = ReferenceCollector::new();
        let mut analyzed: HashSet<String> = HashSet::new();
        let mut queue = vec!["run".to_string()];

        while let Some(method_name) = queue.pop() {
            if !analyzed.insert(method_name.clone()) {
                continue;
            }
            let Some(block) = methods.get(&method_name) else {
                // `run` may be the trait default, and helper names that
                // match no same-type definition are not followed.
                continue;
            };
            collector.visit_block(block);
            for helper in &collector.helper_calls {
                if !analyzed.contains(helper) {
                    queue.push(helper.clone());
                }
            }
        }

        // Self-references are kept: a self-loop is the cycle check's job to
        // report, not the analyzer's to hide.
        let context_module = descriptor.module_path();
        let mut deps = HashSet::new();
        for reference in &collector.refs {
            if let Some(resolved) = resolve_reference(registry, context_module, reference) {
                deps.insert(resolved);
            }
        }

        Ok(deps)
    }
}
