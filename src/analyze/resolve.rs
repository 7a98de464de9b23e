// src/analyze/resolve.rs

//! Resolution of collected path strings against the registry.
//!
//! A reference is tried first as an absolute identifier, then relative to
//! the referencing task's module: each ancestor module is prefixed, from
//! most specific down to the empty prefix. Only names that resolve to a
//! registered task or section are admitted; everything else (locals, std
//! types, trait names) simply fails to resolve and is dropped.

use crate::task::{Registry, TaskId};

/// Resolve `raw` as seen from a task defined in `context_module`.
pub(crate) fn resolve_reference(
    registry: &Registry,
    context_module: &str,
    raw: &str,
) -> Option<TaskId> {
    let normalized = normalize(context_module, raw)?;

    if registry.contains(&normalized) {
        return Some(normalized);
    }

    let mut ancestor = context_module;
    loop {
        let candidate = if ancestor.is_empty() {
            normalized.clone()
        } else {
            format!("{ancestor}::{normalized}")
        };
        if registry.contains(&candidate) {
            return Some(candidate);
        }
        match ancestor.rfind("::") {
            Some(idx) => ancestor = &ancestor[..idx],
            None if !ancestor.is_empty() => ancestor = "",
            None => return None,
        }
    }
}

/// Strip `self::` and rewrite a leading `crate::` to the context's crate
/// root. Paths through `Self` can never name another task.
fn normalize(context_module: &str, raw: &str) -> Option<String> {
    if raw == "self" || raw == "Self" || raw.starts_with("Self::") {
        return None;
    }

    if let Some(rest) = raw.strip_prefix("self::") {
        return Some(rest.to_string());
    }

    if let Some(rest) = raw.strip_prefix("crate::") {
        let crate_root = context_module
            .split("::")
            .next()
            .unwrap_or(context_module);
        return Some(format!("{crate_root}::{rest}"));
    }

    Some(raw.to_string())
}
