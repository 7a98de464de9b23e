// src/analyze/parser.rs

//! Locating a task type's methods inside a parsed source file.
//!
//! The analyzer does not need spans or line ranges: it finds every `impl`
//! block (inherent or trait) whose self type names the task, and indexes
//! the method bodies by name. Nested inline modules are searched too, since
//! test files routinely wrap task definitions in a `mod tasks { ... }`.

use std::collections::HashMap;

use syn::{ImplItem, Item, Type};

/// All method bodies defined on `type_name` in this file, keyed by method
/// name. Later definitions win on duplicate names, which only happens with
/// cfg-gated impls we cannot distinguish anyway.
pub(crate) fn methods_of_type(file: &syn::File, type_name: &str) -> HashMap<String, syn::Block> {
    let mut methods = HashMap::new();
    collect_from_items(&file.items, type_name, &mut methods);
    methods
}

fn collect_from_items(
    items: &[Item],
    type_name: &str,
    methods: &mut HashMap<String, syn::Block>,
) {
    for item in items {
        match item {
            Item::Impl(item_impl) => {
                if self_type_is(&item_impl.self_ty, type_name) {
                    for impl_item in &item_impl.items {
                        if let ImplItem::Fn(method) = impl_item {
                            methods
                                .insert(method.sig.ident.to_string(), method.block.clone());
                        }
                    }
                }
            }
            Item::Mod(item_mod) => {
                if let Some((_, nested)) = &item_mod.content {
                    collect_from_items(nested, type_name, methods);
                }
            }
            _ => {}
        }
    }
}

fn self_type_is(self_ty: &Type, type_name: &str) -> bool {
    match self_ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == type_name),
        _ => false,
    }
}
