// src/analyze/visitor.rs

//! AST walk collecting candidate task references and same-type helper
//! calls.
//!
//! Three reference positions are collected: bare identifiers, qualified
//! paths, and path arguments in turbofish position (`ctx.need::<Dep>(..)`).
//! Helper calls are recorded only when the receiver is implicit: `self.f()`
//! or `Self::f()`. Explicit receivers are never followed.

use std::collections::HashSet;

use syn::visit::{self, Visit};
use syn::{Expr, ExprCall, ExprMethodCall, Path};

#[derive(Default)]
pub(crate) struct ReferenceCollector {
    /// Path strings as written, joined with `::`. Resolution filters out
    /// everything that is not a registered task.
    pub refs: HashSet<String>,
    /// Names of same-type methods called without an explicit receiver.
    pub helper_calls: HashSet<String>,
}

impl ReferenceCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'ast> Visit<'ast> for ReferenceCollector {
    fn visit_path(&mut self, node: &'ast Path) {
        let joined = node
            .segments
            .iter()
            .map(|segment| segment.ident.to_string())
            .collect::<Vec<_>>()
            .join("::");
        if !joined.is_empty() {
            self.refs.insert(joined);
        }
        // Recurse into generic arguments so turbofish references are seen.
        visit::visit_path(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        if let Expr::Path(receiver) = &*node.receiver
            && receiver.path.is_ident("self")
        {
            self.helper_calls.insert(node.method.to_string());
        }
        visit::visit_expr_method_call(self, node);
    }

    fn visit_expr_call(&mut self, node: &'ast ExprCall) {
        if let Expr::Path(func) = &*node.func {
            let segments: Vec<_> = func.path.segments.iter().collect();
            if segments.len() == 2 && segments[0].ident == "Self" {
                self.helper_calls.insert(segments[1].ident.to_string());
            }
        }
        visit::visit_expr_call(self, node);
    }
}
