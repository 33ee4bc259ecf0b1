// SPDX-License-Identifier: Apache-2.0

//! Checks that fire on nodes inside `.fc` files: context-type placement,
//! the `gen_context` range, unescaped regex metacharacters in paths, and
//! existence of the referenced user/role/type.

use crate::ast::{DeclFlavor, FcContext, NodeFlavor, NodeId, Payload};
use crate::loader::module_stem;

use super::{CheckContext, CheckDescriptor};

pub static CHECKS: &[CheckDescriptor] = &[
    CheckDescriptor { id: "S-002", flavors: &[NodeFlavor::FcEntry], func: check_file_context_types_in_mod },
    CheckDescriptor { id: "S-007", flavors: &[NodeFlavor::FcEntry], func: check_gen_context_no_range },
    CheckDescriptor { id: "W-004", flavors: &[NodeFlavor::FcEntry], func: check_file_context_regex },
    CheckDescriptor { id: "E-002", flavors: &[NodeFlavor::Error], func: check_file_context_error_nodes },
    CheckDescriptor { id: "E-003", flavors: &[NodeFlavor::FcEntry], func: check_file_context_users },
    CheckDescriptor { id: "E-004", flavors: &[NodeFlavor::FcEntry], func: check_file_context_roles },
    CheckDescriptor { id: "E-005", flavors: &[NodeFlavor::FcEntry], func: check_file_context_types_exist },
];

/// Pulls the context out of an `.fc` entry node, if it has one. Entries
/// without an explicit context (bare path + object class) are exempt
/// from every check in this file.
fn fc_context(ctx: &CheckContext, id: NodeId) -> Option<(String, FcContext)> {
    let Payload::FcEntry(data) = &ctx.tree.get(id).payload else { return None };
    let context = data.context.clone()?;
    if matches!(context, FcContext::None) {
        return None;
    }
    Some((data.path.clone(), context))
}

fn context_parts(context: &FcContext) -> Option<(&str, &str, &str, &Option<String>)> {
    match context {
        FcContext::Raw { user, role, type_name, range } => Some((user, role, type_name, range)),
        FcContext::GenContext { user, role, type_name, range } => Some((user, role, type_name, range)),
        FcContext::None => None,
    }
}

fn check_file_context_types_in_mod(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    if ctx.config.files.skip_checking_generated_fcs {
        let filename = &ctx.tree.filename;
        if filename.ends_with("base.fc") || filename.ends_with("all_mods.fc") || filename.ends_with(".mod.fc") {
            return Vec::new();
        }
    }

    let Some((_, context)) = fc_context(ctx, id) else { return Vec::new() };
    let Some((_, _, type_name, _)) = context_parts(&context) else { return Vec::new() };

    let Some(owner) = ctx.tables.lookup_declaration(DeclFlavor::Type, type_name) else { return Vec::new() };
    let current_module = module_stem(&ctx.tree.filename);

    if owner != current_module {
        vec![format!("Type {type_name} is declared in module {owner}, but used in file context here.")]
    } else {
        Vec::new()
    }
}

fn check_gen_context_no_range(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Some((_, context)) = fc_context(ctx, id) else { return Vec::new() };
    if let FcContext::GenContext { range: None, .. } = context {
        vec!["No mls levels specified in gen_context".to_string()]
    } else {
        Vec::new()
    }
}

fn check_file_context_regex(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::FcEntry(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    if data.context.is_none() || matches!(data.context, Some(FcContext::None)) {
        return Vec::new();
    }

    let path = data.path.as_bytes();
    let mut prev = 0u8;
    let mut i = 0usize;

    while i < path.len() {
        let cur = path[i];
        let next = path.get(i + 1).copied().unwrap_or(0);

        if cur == b'[' && prev != b'\\' {
            while i < path.len() && (path[i] != b']' || prev == b'\\') {
                prev = path[i];
                i += 1;
            }
            i += 1;
            continue;
        }

        let bad = match cur {
            b'.' => prev != b'\\' && next != b'*' && next != b'+' && next != b'?',
            b'+' | b'*' => prev != b'\\' && prev != b'.' && prev != b']' && prev != b')',
            _ => false,
        };

        if bad {
            return vec![format!(
                "File context path contains a potentially unescaped regex character '{}' at position {}: {}",
                cur as char,
                i + 1,
                data.path
            )];
        }

        prev = cur;
        i += 1;
    }

    Vec::new()
}

fn check_file_context_error_nodes(_ctx: &CheckContext, _id: NodeId) -> Vec<String> {
    vec!["Bad file context format".to_string()]
}

fn check_file_context_users(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Some((_, context)) = fc_context(ctx, id) else { return Vec::new() };
    let Some((user, _, _, _)) = context_parts(&context) else { return Vec::new() };

    if ctx.tables.lookup_declaration(DeclFlavor::User, user).is_none() {
        vec![format!("Nonexistent user ({user}) listed in fc_entry")]
    } else {
        Vec::new()
    }
}

fn check_file_context_roles(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Some((_, context)) = fc_context(ctx, id) else { return Vec::new() };
    let Some((_, role, _, _)) = context_parts(&context) else { return Vec::new() };

    if ctx.tables.lookup_declaration(DeclFlavor::Role, role).is_none() {
        vec![format!("Nonexistent role ({role}) listed in fc_entry")]
    } else {
        Vec::new()
    }
}

fn check_file_context_types_exist(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Some((_, context)) = fc_context(ctx, id) else { return Vec::new() };
    let Some((_, _, type_name, _)) = context_parts(&context) else { return Vec::new() };

    if ctx.tables.lookup_declaration(DeclFlavor::Type, type_name).is_none() {
        vec![format!("Nonexistent type ({type_name}) listed in fc_entry")]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FileTree;
    use crate::permmacro::PermMacroTable;
    use crate::symtab::SymbolTables;
    use selint_config::Config;

    fn fc_tree(type_name: &str) -> (FileTree, NodeId) {
        let mut tree = FileTree::new("foo.fc", NodeFlavor::FcFile);
        let id = tree.insert_child(
            tree.root,
            NodeFlavor::FcEntry,
            Payload::FcEntry(crate::ast::FcEntryData {
                path: "/etc/foo".to_string(),
                object_class: None,
                context: Some(FcContext::Raw {
                    user: "system_u".to_string(),
                    role: "object_r".to_string(),
                    type_name: type_name.to_string(),
                    range: None,
                }),
            }),
            1,
        );
        (tree, id)
    }

    #[test]
    fn unknown_type_is_flagged() {
        let (tree, id) = fc_tree("bar_t");
        let tables = SymbolTables::new();
        let config = Config::default();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert_eq!(
            check_file_context_types_exist(&ctx, id),
            vec!["Nonexistent type (bar_t) listed in fc_entry".to_string()]
        );
    }

    #[test]
    fn known_type_passes() {
        let (tree, id) = fc_tree("bar_t");
        let mut tables = SymbolTables::new();
        tables.insert_declaration(DeclFlavor::Type, "bar_t", "bar");
        let config = Config::default();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert!(check_file_context_types_exist(&ctx, id).is_empty());
    }

    #[test]
    fn unescaped_dot_is_flagged() {
        let mut tree = FileTree::new("foo.fc", NodeFlavor::FcFile);
        let id = tree.insert_child(
            tree.root,
            NodeFlavor::FcEntry,
            Payload::FcEntry(crate::ast::FcEntryData {
                path: "/etc/foo.conf".to_string(),
                object_class: None,
                context: Some(FcContext::Raw {
                    user: "system_u".to_string(),
                    role: "object_r".to_string(),
                    type_name: "bar_t".to_string(),
                    range: None,
                }),
            }),
            1,
        );
        let tables = SymbolTables::new();
        let config = Config::default();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert_eq!(check_file_context_regex(&ctx, id).len(), 1);
    }
}
