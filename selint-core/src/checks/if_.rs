// SPDX-License-Identifier: Apache-2.0

//! Checks that fire on nodes inside `.if` files: interface/template
//! documentation and body hygiene, require-block ordering and
//! completeness, and declaration ownership.

use selint_config::DeclKind;

use crate::ast::{DeclFlavor, NodeFlavor, NodeId, Payload};

use super::{has_require, referenced_names, CheckContext, CheckDescriptor};

pub static CHECKS: &[CheckDescriptor] = &[
    CheckDescriptor { id: "C-004", flavors: &[NodeFlavor::InterfaceDef, NodeFlavor::TempDef], func: check_interface_definitions_have_comment },
    CheckDescriptor { id: "C-006", flavors: &[NodeFlavor::Require, NodeFlavor::GenReq], func: check_unordered_declaration_in_require },
    CheckDescriptor { id: "S-004", flavors: &[NodeFlavor::IfCall], func: check_if_calls_template },
    CheckDescriptor { id: "S-005", flavors: &[NodeFlavor::Decl], func: check_decl_in_if },
    CheckDescriptor { id: "S-008", flavors: &[NodeFlavor::GenReq], func: check_unquoted_gen_require_block },
    CheckDescriptor { id: "W-002", flavors: &[NodeFlavor::AvRule, NodeFlavor::TtRule, NodeFlavor::RtRule], func: check_name_used_but_not_required_in_if },
    CheckDescriptor { id: "W-003", flavors: &[NodeFlavor::Decl], func: check_name_required_but_not_used_in_if },
    CheckDescriptor { id: "W-011", flavors: &[NodeFlavor::Decl], func: check_required_declaration_own },
];

fn check_interface_definitions_have_comment(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::InterfaceDef(data) = &ctx.tree.get(id).payload else { return Vec::new() };

    let has_leading_comment = ctx
        .tree
        .get(id)
        .prev
        .is_some_and(|prev| matches!(ctx.tree.get(prev).payload, Payload::Comment(_)));

    if has_leading_comment {
        Vec::new()
    } else {
        vec![format!("No comment before interface definition for {}", data.name)]
    }
}

fn titled_label(flavor: DeclFlavor) -> Option<&'static str> {
    match flavor {
        DeclFlavor::Type => Some("Type"),
        DeclFlavor::TypeAttribute => Some("Attribute"),
        DeclFlavor::Role => Some("Role"),
        DeclFlavor::RoleAttribute => Some("Role Attribute"),
        _ => None,
    }
}

fn lower_label(flavor: DeclFlavor) -> &'static str {
    match flavor {
        DeclFlavor::Type => "type",
        DeclFlavor::TypeAttribute => "attribute",
        DeclFlavor::Role => "role",
        DeclFlavor::RoleAttribute => "role attribute",
        DeclFlavor::User => "user",
        DeclFlavor::Class => "class",
        DeclFlavor::Permission => "permission",
        DeclFlavor::Bool => "bool",
    }
}

fn decl_kind(flavor: DeclFlavor) -> Option<DeclKind> {
    match flavor {
        DeclFlavor::Bool => Some(DeclKind::Bool),
        DeclFlavor::Class => Some(DeclKind::Class),
        DeclFlavor::Role => Some(DeclKind::Role),
        DeclFlavor::RoleAttribute => Some(DeclKind::RoleAttribute),
        DeclFlavor::TypeAttribute => Some(DeclKind::Attribute),
        DeclFlavor::Type => Some(DeclKind::Type),
        DeclFlavor::User | DeclFlavor::Permission => None,
    }
}

fn compare_flavors(a: DeclFlavor, b: DeclFlavor, order_requires: &[DeclKind]) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    if a == b {
        return Ordering::Equal;
    }
    for kind in order_requires {
        if decl_kind(a) == Some(*kind) {
            return Ordering::Less;
        }
        if decl_kind(b) == Some(*kind) {
            return Ordering::Greater;
        }
    }
    Ordering::Equal
}

/// Index within `s` where the tail comparison should start: the first
/// byte after the longest common prefix with the sibling name, with a
/// trailing standalone `_t` folded back in so `ssh_t` sorts with `ssh_exec_t`.
fn tail_index(s: &str, common: usize) -> usize {
    let bytes = s.as_bytes();
    if common < bytes.len()
        && common + 1 == bytes.len()
        && bytes[common] == b't'
        && common > 0
        && bytes[common - 1] == b'_'
    {
        common - 1
    } else {
        common
    }
}

fn compare_names_ignoring_t_suffix(a: &str, b: &str) -> std::cmp::Ordering {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    let mut common = 0;
    while common < ab.len() && common < bb.len() && ab[common] == bb[common] {
        common += 1;
    }
    let pa = tail_index(a, common);
    let pb = tail_index(b, common);
    ab.get(pa).cmp(&bb.get(pb))
}

fn compare_declarations(
    a: (DeclFlavor, &str),
    b: (DeclFlavor, &str),
    order_requires: &[DeclKind],
    same_flavor_ordered: bool,
) -> std::cmp::Ordering {
    let by_flavor = compare_flavors(a.0, b.0, order_requires);
    if by_flavor != std::cmp::Ordering::Equal {
        return by_flavor;
    }
    if !same_flavor_ordered {
        return std::cmp::Ordering::Less;
    }
    compare_names_ignoring_t_suffix(a.1, b.1)
}

fn check_unordered_declaration_in_require(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let decls: Vec<(DeclFlavor, &str)> = ctx
        .tree
        .children(id)
        .filter_map(|child| match &ctx.tree.get(child).payload {
            Payload::Decl(decl) => Some((decl.flavor, decl.name.as_str())),
            _ => None,
        })
        .collect();

    if decls.is_empty() {
        return vec!["Empty require block".to_string()];
    }

    for pair in decls.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        match compare_declarations(
            prev,
            cur,
            &ctx.config.ordering.order_requires,
            ctx.config.ordering.ordering_requires_same_flavor,
        ) {
            std::cmp::Ordering::Greater => {
                return vec![format!(
                    "Unordered declaration in require block ({} {} before {} {})",
                    lower_label(prev.0),
                    prev.1,
                    lower_label(cur.0),
                    cur.1
                )]
            }
            std::cmp::Ordering::Equal => {
                return vec![format!("Repeated declaration in require block ({} {})", lower_label(cur.0), cur.1)]
            }
            std::cmp::Ordering::Less => {}
        }
    }

    Vec::new()
}

fn is_if_file(tree: &crate::ast::FileTree) -> bool {
    tree.get(tree.root).flavor == NodeFlavor::IfFile
}

fn check_if_calls_template(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    if !is_if_file(ctx.tree) {
        return Vec::new();
    }
    let Payload::IfCall(data) = &ctx.tree.get(id).payload else { return Vec::new() };

    for ancestor in ctx.tree.ancestors(id) {
        let anc_node = ctx.tree.get(ancestor);
        match (&anc_node.flavor, &anc_node.payload) {
            (NodeFlavor::InterfaceDef, Payload::InterfaceDef(if_data)) => {
                if ctx.tables.is_template(&data.callee) {
                    return vec![format!("interface {} calls template {}", if_data.name, data.callee)];
                }
                return Vec::new();
            }
            (NodeFlavor::TempDef, _) => return Vec::new(),
            _ => {}
        }
    }

    Vec::new()
}

fn check_decl_in_if(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    if !is_if_file(ctx.tree) {
        return Vec::new();
    }
    let Payload::Decl(decl) = &ctx.tree.get(id).payload else { return Vec::new() };

    for ancestor in ctx.tree.ancestors(id) {
        let flavor = ctx.tree.get(ancestor).flavor;
        if matches!(flavor, NodeFlavor::Require | NodeFlavor::GenReq) {
            return Vec::new();
        }
        if flavor == NodeFlavor::InterfaceDef {
            return vec![format!("Declaration of {} in interface", decl.name)];
        }
        if flavor == NodeFlavor::TempDef {
            return Vec::new();
        }
    }

    Vec::new()
}

fn check_unquoted_gen_require_block(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::GenReq(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    if data.unquoted {
        vec!["Gen require block unquoted".to_string()]
    } else {
        Vec::new()
    }
}

/// Finds the nearest interface/template definition enclosing `id`, if any.
fn enclosing_definition(tree: &crate::ast::FileTree, id: NodeId) -> Option<NodeId> {
    tree.ancestors(id)
        .find(|anc| matches!(tree.get(*anc).flavor, NodeFlavor::InterfaceDef | NodeFlavor::TempDef))
}

fn check_name_used_but_not_required_in_if(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    if !is_if_file(ctx.tree) {
        return Vec::new();
    }
    let names = referenced_names(ctx.tree.get(id));
    if names.is_empty() {
        return Vec::new();
    }

    let Some(_definition) = enclosing_definition(ctx.tree, id) else { return Vec::new() };

    for name in names {
        if name == "system_r" {
            continue;
        }

        let flavor = [DeclFlavor::Type, DeclFlavor::TypeAttribute, DeclFlavor::RoleAttribute, DeclFlavor::Role]
            .into_iter()
            .find(|f| ctx.tables.lookup_declaration(*f, name).is_some());

        let Some(flavor) = flavor else { continue };

        if !has_require(ctx.tree, id, name, flavor) {
            let label = titled_label(flavor).unwrap_or("Name");
            return vec![format!("{label} {name} is used in interface but not required")];
        }
    }

    Vec::new()
}

fn check_name_required_but_not_used_in_if(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    if !is_if_file(ctx.tree) {
        return Vec::new();
    }
    let Payload::Decl(decl) = &ctx.tree.get(id).payload else { return Vec::new() };
    let Some(label) = titled_label(decl.flavor) else { return Vec::new() };

    if !ctx.tree.is_in_require(id) {
        return Vec::new();
    }
    let Some(definition) = enclosing_definition(ctx.tree, id) else { return Vec::new() };

    if let Payload::InterfaceDef(if_data) = &ctx.tree.get(definition).payload {
        if if_data.name.ends_with("_stub") {
            return Vec::new();
        }
    }

    let used = ctx.tree.iter_dfs().any(|candidate| {
        let in_scope = ctx
            .tree
            .ancestors(candidate)
            .any(|anc| anc == definition);
        in_scope && referenced_names(ctx.tree.get(candidate)).contains(&decl.name.as_str())
    });

    if used {
        Vec::new()
    } else {
        vec![format!("{label} {} is listed in require block but not used in interface", decl.name)]
    }
}

fn check_required_declaration_own(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    if !is_if_file(ctx.tree) {
        return Vec::new();
    }
    let Payload::Decl(decl) = &ctx.tree.get(id).payload else { return Vec::new() };

    if matches!(decl.flavor, DeclFlavor::Class | DeclFlavor::Permission | DeclFlavor::User) {
        return Vec::new();
    }
    if decl.name.starts_with('$') {
        return Vec::new();
    }
    if !ctx.tree.is_in_require(id) {
        return Vec::new();
    }

    let label = lower_label(decl.flavor);
    let current_module = crate::loader::module_stem(&ctx.tree.filename);

    match ctx.tables.lookup_declaration(decl.flavor, &decl.name) {
        None => vec![format!("Definition of declared {label} {} not found in any module", decl.name)],
        Some(owner) if owner == current_module => Vec::new(),
        Some(owner) if decl.flavor == DeclFlavor::Role && owner == "kernel" => Vec::new(),
        Some(owner) => {
            vec![format!(
                "Definition of declared {label} {} not found in own module, but in module {owner}",
                decl.name
            )]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclData, FileTree};
    use crate::permmacro::PermMacroTable;
    use crate::string_list::StringList;
    use crate::symtab::SymbolTables;
    use selint_config::Config;

    #[test]
    fn missing_comment_before_interface_is_reported() {
        let mut tree = FileTree::new("foo.if", NodeFlavor::IfFile);
        let id = tree.insert_child(
            tree.root,
            NodeFlavor::InterfaceDef,
            Payload::InterfaceDef(crate::ast::InterfaceDefData { name: "foo_domtrans".to_string() }),
            1,
        );
        let tables = SymbolTables::new();
        let config = Config::default();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert_eq!(
            check_interface_definitions_have_comment(&ctx, id),
            vec!["No comment before interface definition for foo_domtrans".to_string()]
        );
    }

    #[test]
    fn comment_before_interface_suppresses_the_finding() {
        let mut tree = FileTree::new("foo.if", NodeFlavor::IfFile);
        let comment_id = tree.insert_child(tree.root, NodeFlavor::Comment, Payload::Comment("## <summary>foo</summary>".to_string()), 1);
        let id = tree.insert_next(
            comment_id,
            NodeFlavor::InterfaceDef,
            Payload::InterfaceDef(crate::ast::InterfaceDefData { name: "foo_domtrans".to_string() }),
            2,
        );
        let tables = SymbolTables::new();
        let config = Config::default();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert!(check_interface_definitions_have_comment(&ctx, id).is_empty());
    }

    #[test]
    fn required_declaration_flags_unknown_owner() {
        let mut tree = FileTree::new("foo.if", NodeFlavor::IfFile);
        let req = tree.insert_child(tree.root, NodeFlavor::Require, Payload::None, 1);
        let id = tree.insert_child(
            req,
            NodeFlavor::Decl,
            Payload::Decl(DeclData { flavor: DeclFlavor::Type, name: "bar_t".to_string(), attrs_or_perms: StringList::new() }),
            2,
        );
        let tables = SymbolTables::new();
        let config = Config::default();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        let findings = check_required_declaration_own(&ctx, id);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("not found in any module"));
    }
}
