// SPDX-License-Identifier: Apache-2.0

//! Checks that fire on nodes inside `.te` files: rule and declaration
//! ordering, permission-list hygiene, interface-call hygiene, and the
//! handful of style checks specific to type-enforcement syntax.

use crate::ast::{AvRuleFlavor, DeclFlavor, NodeFlavor, NodeId, Payload};
use crate::loader::module_stem;

use super::{has_require, referenced_names, CheckContext, CheckDescriptor};

pub static CHECKS: &[CheckDescriptor] = &[
    CheckDescriptor { id: "C-001", flavors: &[
        NodeFlavor::AvRule, NodeFlavor::TtRule, NodeFlavor::RtRule, NodeFlavor::Decl,
        NodeFlavor::IfCall, NodeFlavor::RoleAllow, NodeFlavor::RoleTypes,
    ], func: check_te_order },
    CheckDescriptor { id: "C-005", flavors: &[NodeFlavor::AvRule, NodeFlavor::XavRule], func: check_unordered_perms },
    CheckDescriptor { id: "C-007", flavors: &[NodeFlavor::AvRule, NodeFlavor::XavRule], func: check_no_self },
    CheckDescriptor { id: "S-001", flavors: &[NodeFlavor::Require], func: check_require_block },
    CheckDescriptor { id: "S-003", flavors: &[NodeFlavor::Semicolon], func: check_useless_semicolon },
    CheckDescriptor { id: "S-006", flavors: &[NodeFlavor::Header], func: check_bare_module_statement },
    CheckDescriptor { id: "S-009", flavors: &[NodeFlavor::AvRule], func: check_perm_macro_class_mismatch },
    CheckDescriptor { id: "S-010", flavors: &[NodeFlavor::AvRule], func: check_perm_macro_available },
    CheckDescriptor { id: "W-001", flavors: &[NodeFlavor::AvRule, NodeFlavor::TtRule, NodeFlavor::RtRule], func: check_no_explicit_declaration },
    CheckDescriptor { id: "W-005", flavors: &[NodeFlavor::IfCall], func: check_module_if_call_in_optional },
    CheckDescriptor { id: "W-006", flavors: &[NodeFlavor::IfCall], func: check_empty_if_call_arg },
    CheckDescriptor { id: "W-007", flavors: &[NodeFlavor::IfCall], func: check_space_if_call_arg },
    CheckDescriptor { id: "W-008", flavors: &[NodeFlavor::AvRule], func: check_risky_allow_perm },
    CheckDescriptor { id: "W-009", flavors: &[NodeFlavor::Header], func: check_module_file_name_mismatch },
    CheckDescriptor { id: "W-010", flavors: &[NodeFlavor::IfCall], func: check_unknown_interface_call },
    CheckDescriptor { id: "W-012", flavors: &[NodeFlavor::BooleanPolicy, NodeFlavor::TunablePolicy], func: check_unknown_cond_id },
    CheckDescriptor { id: "C-008", flavors: &[NodeFlavor::BooleanPolicy, NodeFlavor::TunablePolicy], func: check_foreign_cond_id },
    CheckDescriptor { id: "E-006", flavors: &[NodeFlavor::Decl], func: check_declaration_interface_nameclash },
    CheckDescriptor { id: "E-007", flavors: &[NodeFlavor::AvRule], func: check_unknown_permission },
    CheckDescriptor { id: "E-008", flavors: &[NodeFlavor::AvRule, NodeFlavor::TtRule, NodeFlavor::RtRule], func: check_unknown_class },
    CheckDescriptor { id: "E-009", flavors: &[
        NodeFlavor::OptionalPolicy, NodeFlavor::BooleanPolicy, NodeFlavor::TunablePolicy, NodeFlavor::Ifdef,
    ], func: check_empty_block },
    CheckDescriptor { id: "E-010", flavors: &[NodeFlavor::M4SimpleMacro], func: check_stray_word },
];

fn check_te_order(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Some(ordering) = ctx.ordering else { return Vec::new() };
    match ordering.explain_node(id) {
        Some(reason) => vec![format!("Line out of order: {reason}")],
        None => Vec::new(),
    }
}

fn check_unordered_perms(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let node = ctx.tree.get(id);
    let (perms, flavor_name) = match &node.payload {
        Payload::AvRule(data) => (&data.perms, "av rule"),
        Payload::XavRule(data) => (&data.perms, "xav rule"),
        _ => return Vec::new(),
    };

    let mut prev: Option<&str> = None;
    for item in perms.iter() {
        if let Some(prev_str) = prev {
            if prev_str != "~" && item.text != "-" {
                match prev_str.cmp(item.text.as_str()) {
                    std::cmp::Ordering::Greater => {
                        return vec![format!(
                            "Permissions in {flavor_name} not ordered ({prev_str} before {})",
                            item.text
                        )]
                    }
                    std::cmp::Ordering::Equal => {
                        return vec![format!("Permissions in {flavor_name} repeated ({})", item.text)]
                    }
                    std::cmp::Ordering::Less => {}
                }
            }
        }
        prev = Some(&item.text);
    }

    Vec::new()
}

fn check_no_self(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let node = ctx.tree.get(id);
    let Payload::AvRule(data) = &node.payload else { return Vec::new() };

    if data.sources.len() != 1 || data.targets.len() != 1 {
        return Vec::new();
    }
    let source = &data.sources.first().unwrap().text;
    let target = &data.targets.first().unwrap().text;

    if target == "self" || source != target {
        return Vec::new();
    }

    if let Some(var) = source.strip_prefix('$') {
        let _ = var;
        if !source.ends_with("_t") {
            return Vec::new();
        }
    } else if ctx.tables.lookup_declaration(DeclFlavor::Type, source).is_none() {
        return Vec::new();
    }

    vec!["Recommend use of self keyword instead of redundant type".to_string()]
}

fn check_require_block(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    for child in ctx.tree.children(id) {
        let Payload::Decl(decl) = &ctx.tree.get(child).payload else { continue };
        if !matches!(decl.flavor, DeclFlavor::Class | DeclFlavor::Permission) {
            return vec!["Require block used in te file (use an interface call instead)".to_string()];
        }
    }
    Vec::new()
}

fn check_useless_semicolon(_ctx: &CheckContext, _id: NodeId) -> Vec<String> {
    vec!["Unnecessary semicolon".to_string()]
}

fn check_bare_module_statement(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::Header(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    if !data.is_macro_form {
        vec!["Bare module statement (use `policy_module()` instead)".to_string()]
    } else {
        Vec::new()
    }
}

fn check_perm_macro_available(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::AvRule(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    if data.flavor != AvRuleFlavor::Allow {
        return Vec::new();
    }
    if data.classes.len() != 1 {
        return Vec::new();
    }
    let class = &data.classes.first().unwrap().text;
    if class.ends_with("_class_set") {
        return Vec::new();
    }

    let perms: Vec<String> = data.perms.iter().map(|item| item.text.clone()).collect();
    match ctx.perm_macros.suggest(class, &perms) {
        Some(suggestion) => vec![format!(
            "Suggesting permission macro: {} (replacing {{ {} }}, would add {{ {} }})",
            suggestion.macro_name,
            suggestion.replaces.join(" "),
            suggestion.adds.join(" ")
        )],
        None => Vec::new(),
    }
}

/// Flags a permission that's actually the name of a class-specific
/// permission macro whose implied class doesn't match the av rule's own
/// class, e.g. `allow foo_t bar_t:dir read_file_perms;`.
fn check_perm_macro_class_mismatch(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::AvRule(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    if data.classes.len() != 1 {
        return Vec::new();
    }
    let class = &data.classes.first().unwrap().text;
    let Some(rule_class) = crate::permmacro::macro_class_for_class_name(class) else { return Vec::new() };

    for item in data.perms.iter() {
        let Some(macro_class) = crate::permmacro::macro_class_for_name(&item.text) else { continue };
        if macro_class != rule_class {
            return vec![format!(
                "Permission macro {} does not match class {class}",
                item.text
            )];
        }
    }

    Vec::new()
}

fn check_empty_if_call_arg(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::IfCall(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    if data.args.iter().any(|arg| arg.is_empty()) {
        vec![format!("Call to interface {} with empty argument", data.callee)]
    } else {
        Vec::new()
    }
}

fn check_space_if_call_arg(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::IfCall(data) = &ctx.tree.get(id).payload else { return Vec::new() };

    for (index, arg) in data.args.iter().enumerate() {
        for item in arg.iter() {
            if item.has_incorrect_space {
                return vec![format!(
                    "Argument no. {} '{}' of call to interface {} contains unquoted space",
                    index + 1,
                    item.text,
                    data.callee
                )];
            }
        }
    }

    Vec::new()
}

fn check_foreign_cond_id(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::CondDecl(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    let current_module = module_stem(&ctx.tree.filename);

    for item in data.identifiers.iter() {
        let name = item.text.as_str();
        let Some(owner) = ctx.tables.lookup_declaration(DeclFlavor::Bool, name) else { continue };
        if owner != current_module && !has_require(ctx.tree, id, name, DeclFlavor::Bool) {
            return vec![format!(
                "Boolean {name} is declared in module {owner}, but used in conditional expression here."
            )];
        }
    }

    Vec::new()
}

fn check_unknown_cond_id(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::CondDecl(data) = &ctx.tree.get(id).payload else { return Vec::new() };

    for item in data.identifiers.iter() {
        let name = item.text.as_str();
        if ctx.tables.lookup_declaration(DeclFlavor::Bool, name).is_none() {
            return vec![format!("Unknown boolean or tunable {name} used in conditional expression")];
        }
    }

    Vec::new()
}

fn check_no_explicit_declaration(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let current_module = module_stem(&ctx.tree.filename);
    let node = ctx.tree.get(id);

    for name in referenced_names(node) {
        let (mod_name, flavor) = match ctx
            .tables
            .lookup_declaration(DeclFlavor::Type, name)
            .map(|m| (m, DeclFlavor::Type))
            .or_else(|| {
                ctx.tables
                    .lookup_declaration(DeclFlavor::TypeAttribute, name)
                    .map(|m| (m, DeclFlavor::TypeAttribute))
            }) {
            Some(found) => found,
            None => continue,
        };

        if mod_name != current_module && !has_require(ctx.tree, id, name, flavor) {
            return vec![format!(
                "No explicit declaration for {name} from module {mod_name}. You should access it via interface call or use a require block."
            )];
        }
    }

    Vec::new()
}

fn check_module_if_call_in_optional(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::IfCall(data) = &ctx.tree.get(id).payload else { return Vec::new() };

    let Some(if_mod_name) = ctx.tables.interface_module(&data.callee) else { return Vec::new() };
    let current_module = module_stem(&ctx.tree.filename);
    if if_mod_name == current_module {
        return Vec::new();
    }

    let Some(mod_type) = ctx.tables.module_status(if_mod_name) else { return Vec::new() };
    if mod_type == crate::symtab::ModuleStatus::Base {
        return Vec::new();
    }

    if ctx.tree.nearest_ancestor_of_flavor(id, NodeFlavor::OptionalPolicy).is_some() {
        return Vec::new();
    }

    vec![format!(
        "Call to interface {} defined in module {if_mod_name} should be in optional_policy block",
        data.callee
    )]
}

fn check_risky_allow_perm(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::AvRule(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    if data.flavor != AvRuleFlavor::Allow {
        return Vec::new();
    }
    if data.perms.iter().any(|item| item.text == "*" || item.text == "~") {
        vec!["Allow rule with complement or wildcard permission".to_string()]
    } else {
        Vec::new()
    }
}

fn check_module_file_name_mismatch(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::Header(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    let file_stem = module_stem(&ctx.tree.filename);
    if data.module_name != file_stem {
        vec![format!(
            "Module name {} does not match file name {file_stem}",
            data.module_name
        )]
    } else {
        Vec::new()
    }
}

fn check_unknown_interface_call(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::IfCall(data) = &ctx.tree.get(id).payload else { return Vec::new() };
    let name = &data.callee;

    // Calls that don't look like `<module>_...` are assumed to be plain
    // m4 macros rather than refpolicy interfaces.
    let Some(prefix_end) = name.find('_') else { return Vec::new() };
    let prefix = &name[..prefix_end];
    if ctx.tables.module_status(prefix).is_none() {
        return Vec::new();
    }

    if ctx.tables.interface_module(name).is_some() {
        return Vec::new();
    }

    vec![format!("Call to {name} can not be referenced to any interface")]
}

fn check_declaration_interface_nameclash(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::Decl(decl) = &ctx.tree.get(id).payload else { return Vec::new() };
    if ctx.tables.interface_module(&decl.name).is_some() {
        vec![format!(
            "Declaration with name {} clashes with same named interface",
            decl.name
        )]
    } else {
        Vec::new()
    }
}

fn check_unknown_permission(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let Payload::AvRule(data) = &ctx.tree.get(id).payload else { return Vec::new() };

    for item in data.perms.iter() {
        let perm = item.text.as_str();
        if perm == "*" || perm == "~" {
            continue;
        }
        if perm.starts_with("all_") && perm.ends_with("_perms") {
            continue;
        }
        if ctx.tables.lookup_declaration(DeclFlavor::Permission, perm).is_some() {
            continue;
        }
        if ctx.tables.permission_macro(perm).is_some() {
            continue;
        }
        return vec![format!("Unknown permission {perm} used")];
    }

    Vec::new()
}

fn check_unknown_class(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    let node = ctx.tree.get(id);
    let classes = match &node.payload {
        Payload::AvRule(data) => &data.classes,
        Payload::TtRule(data) => &data.classes,
        Payload::RtRule(data) => &data.classes,
        _ => return Vec::new(),
    };

    for item in classes.iter() {
        let class = item.text.as_str();
        if class.starts_with('$') && class[1..].chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        if class.ends_with("_class_set") {
            continue;
        }
        if ctx.tables.lookup_declaration(DeclFlavor::Class, class).is_some() {
            continue;
        }
        return vec![format!("Unknown class {class} used")];
    }

    Vec::new()
}

fn check_empty_block(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    for child in ctx.tree.children(id) {
        if !matches!(
            ctx.tree.get(child).flavor,
            NodeFlavor::StartBlock | NodeFlavor::Comment | NodeFlavor::Semicolon
        ) {
            return Vec::new();
        }
    }
    vec!["Empty block found".to_string()]
}

fn check_stray_word(ctx: &CheckContext, id: NodeId) -> Vec<String> {
    // M4SimpleMacro nodes carry their bare word in the generic text slot.
    let Payload::Comment(macro_name) = &ctx.tree.get(id).payload else { return Vec::new() };

    if ctx.config.files.custom_te_simple_macros.iter().any(|m| m == macro_name) {
        return Vec::new();
    }

    vec![format!(
        "Found stray word {macro_name}. If it is a simple m4 macro please add an selint-disable comment or ignore in the SELint configuration file."
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AvRuleData, FileTree};
    use crate::permmacro::PermMacroTable;
    use crate::string_list::StringList;
    use crate::symtab::SymbolTables;
    use selint_config::Config;

    fn default_config() -> Config {
        Config::default()
    }

    fn av_rule_tree(perms: &[&str]) -> (FileTree, NodeId) {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        let id = tree.insert_child(
            tree.root,
            NodeFlavor::AvRule,
            Payload::AvRule(AvRuleData {
                flavor: AvRuleFlavor::Allow,
                sources: StringList::single("foo_t"),
                targets: StringList::single("bar_t"),
                classes: StringList::single("file"),
                perms: StringList::from_strs(perms.iter().copied()),
            }),
            1,
        );
        (tree, id)
    }

    #[test]
    fn unordered_perms_reports_the_offending_pair() {
        let (tree, id) = av_rule_tree(&["write", "read"]);
        let tables = SymbolTables::new();
        let config = default_config();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        let findings = check_unordered_perms(&ctx, id);
        assert_eq!(findings, vec!["Permissions in av rule not ordered (write before read)".to_string()]);
    }

    #[test]
    fn ordered_perms_report_nothing() {
        let (tree, id) = av_rule_tree(&["read", "write"]);
        let tables = SymbolTables::new();
        let config = default_config();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert!(check_unordered_perms(&ctx, id).is_empty());
    }

    #[test]
    fn repeated_perm_is_reported() {
        let (tree, id) = av_rule_tree(&["read", "read"]);
        let tables = SymbolTables::new();
        let config = default_config();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert_eq!(check_unordered_perms(&ctx, id), vec!["Permissions in av rule repeated (read)".to_string()]);
    }

    #[test]
    fn self_keyword_suggested_for_redundant_same_type() {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        let id = tree.insert_child(
            tree.root,
            NodeFlavor::AvRule,
            Payload::AvRule(AvRuleData {
                flavor: AvRuleFlavor::Allow,
                sources: StringList::single("foo_t"),
                targets: StringList::single("foo_t"),
                classes: StringList::single("file"),
                perms: StringList::single("read"),
            }),
            1,
        );
        let mut tables = SymbolTables::new();
        tables.insert_declaration(DeclFlavor::Type, "foo_t", "foo");
        let config = default_config();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert_eq!(
            check_no_self(&ctx, id),
            vec!["Recommend use of self keyword instead of redundant type".to_string()]
        );
    }

    #[test]
    fn no_explicit_declaration_flags_unrequired_foreign_type() {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        let id = tree.insert_child(
            tree.root,
            NodeFlavor::AvRule,
            Payload::AvRule(AvRuleData {
                flavor: AvRuleFlavor::Allow,
                sources: StringList::single("foo_t"),
                targets: StringList::single("bar_t"),
                classes: StringList::single("file"),
                perms: StringList::single("read"),
            }),
            1,
        );
        let mut tables = SymbolTables::new();
        tables.insert_declaration(DeclFlavor::Type, "foo_t", "foo");
        tables.insert_declaration(DeclFlavor::Type, "bar_t", "bar");
        let config = default_config();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        let findings = check_no_explicit_declaration(&ctx, id);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("bar_t"));
        assert!(findings[0].contains("bar"));
    }

    #[test]
    fn empty_if_call_arg_is_reported() {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        let id = tree.insert_child(
            tree.root,
            NodeFlavor::IfCall,
            Payload::IfCall(crate::ast::IfCallData {
                callee: "foo_domtrans".to_string(),
                args: vec![StringList::new()],
            }),
            1,
        );
        let tables = SymbolTables::new();
        let config = default_config();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert_eq!(
            check_empty_if_call_arg(&ctx, id),
            vec!["Call to interface foo_domtrans with empty argument".to_string()]
        );
    }

    #[test]
    fn unknown_cond_id_is_reported() {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        let id = tree.insert_child(
            tree.root,
            NodeFlavor::BooleanPolicy,
            Payload::CondDecl(crate::ast::CondDeclData { identifiers: StringList::single("httpd_can_network_connect") }),
            1,
        );
        let tables = SymbolTables::new();
        let config = default_config();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext { tree: &tree, tables: &tables, config: &config, perm_macros: &perm_macros, ordering: None };
        assert_eq!(
            check_unknown_cond_id(&ctx, id),
            vec!["Unknown boolean or tunable httpd_can_network_connect used in conditional expression".to_string()]
        );
    }
}
