// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios built directly as in-memory `FileTree`s, driving
//! the pipeline from `AnalysisContext::build`/`analyze` (or, where the
//! pipeline is only pure data, `loader::load` directly) without going
//! through the parser.

use std::collections::HashMap;

use selint_config::Config;
use selint_core::ast::{
    AttributeStmtData, AvRuleData, AvRuleFlavor, DeclData, DeclFlavor, FileTree, InterfaceDefData, NodeFlavor, Payload,
};
use selint_core::infer::ParamFlavor;
use selint_core::string_list::StringList;
use selint_core::{loader, module_of_path, AnalysisContext};

fn no_layer(_: &str) -> String {
    String::new()
}

#[test]
fn unordered_permissions_on_an_allow_rule_are_reported() {
    let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
    tree.insert_child(
        tree.root,
        NodeFlavor::AvRule,
        Payload::AvRule(AvRuleData {
            flavor: AvRuleFlavor::Allow,
            sources: StringList::single("foo_t"),
            targets: StringList::single("bar_t"),
            classes: StringList::single("file"),
            perms: StringList::from_strs(["write", "read"]),
        }),
        1,
    );

    let mut trees = HashMap::new();
    trees.insert("foo.te".to_string(), tree);

    let config = Config::default();
    let ctx = AnalysisContext::build(trees, module_of_path, no_layer, &HashMap::new(), &config).unwrap();
    let report = ctx.analyze(&config).unwrap();

    assert!(report
        .findings
        .iter()
        .any(|f| f.check_id.as_str() == "C-005"
            && f.message == "Permissions in av rule not ordered (write before read)"));
}

#[test]
fn a_registered_permission_macro_is_suggested_for_a_matching_rule() {
    let mut macro_tree = FileTree::new("obj_perm_sets.spt", NodeFlavor::IfFile);
    macro_tree.insert_child(
        macro_tree.root,
        NodeFlavor::Define,
        Payload::AttributeStmt(AttributeStmtData {
            name: "read_file_perms".to_string(),
            attrs: StringList::from_strs(["open", "read", "getattr", "ioctl", "lock"]),
        }),
        1,
    );

    let mut te_tree = FileTree::new("foo.te", NodeFlavor::TeFile);
    te_tree.insert_child(
        te_tree.root,
        NodeFlavor::AvRule,
        Payload::AvRule(AvRuleData {
            flavor: AvRuleFlavor::Allow,
            sources: StringList::single("foo_t"),
            targets: StringList::single("bar_t"),
            classes: StringList::single("file"),
            perms: StringList::from_strs(["open", "read", "lock"]),
        }),
        1,
    );

    let mut trees = HashMap::new();
    trees.insert("obj_perm_sets.spt".to_string(), macro_tree);
    trees.insert("foo.te".to_string(), te_tree);

    let config = Config::default();
    let ctx = AnalysisContext::build(trees, module_of_path, no_layer, &HashMap::new(), &config).unwrap();
    let report = ctx.analyze(&config).unwrap();

    assert!(report.findings.iter().any(|f| {
        f.check_id.as_str() == "S-010"
            && f.message
                == "Suggesting permission macro: read_file_perms (replacing { open read lock }, would add { getattr ioctl })"
    }));
}

#[test]
fn a_type_used_from_another_module_without_a_require_is_flagged() {
    let mut foo_tree = FileTree::new("foo.te", NodeFlavor::TeFile);
    foo_tree.insert_child(
        foo_tree.root,
        NodeFlavor::Decl,
        Payload::Decl(DeclData {
            flavor: DeclFlavor::Type,
            name: "foo_t".to_string(),
            attrs_or_perms: StringList::new(),
        }),
        1,
    );

    let mut bar_tree = FileTree::new("bar.te", NodeFlavor::TeFile);
    bar_tree.insert_child(
        bar_tree.root,
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

    let mut trees = HashMap::new();
    trees.insert("foo.te".to_string(), foo_tree);
    trees.insert("bar.te".to_string(), bar_tree);

    let config = Config::default();
    let ctx = AnalysisContext::build(trees, module_of_path, no_layer, &HashMap::new(), &config).unwrap();
    let report = ctx.analyze(&config).unwrap();

    assert!(report.findings.iter().any(|f| {
        f.check_id.as_str() == "W-001"
            && f.message
                == "No explicit declaration for foo_t from module foo. You should access it via interface call or use a require block."
    }));
}

#[test]
fn a_rule_preceding_its_own_types_declaration_is_out_of_order() {
    let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
    let rule_id = tree.insert_child(
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
    tree.insert_next(
        rule_id,
        NodeFlavor::Decl,
        Payload::Decl(DeclData {
            flavor: DeclFlavor::Type,
            name: "foo_t".to_string(),
            attrs_or_perms: StringList::new(),
        }),
        2,
    );

    let mut trees = HashMap::new();
    trees.insert("foo.te".to_string(), tree);

    let config = Config::default();
    let ctx = AnalysisContext::build(trees, module_of_path, no_layer, &HashMap::new(), &config).unwrap();
    let report = ctx.analyze(&config).unwrap();

    assert!(report.findings.iter().any(|f| {
        f.check_id.as_str() == "C-001"
            && f.message == "Line out of order: section 'foo_t' (avg line 1.0) should come after section '_declarations' (avg line 2.0)"
    }));
}

#[test]
fn an_undeclared_bare_word_is_reported_as_a_stray_macro() {
    let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
    tree.insert_child(
        tree.root,
        NodeFlavor::M4SimpleMacro,
        Payload::Comment("undeclared_macro_name".to_string()),
        1,
    );

    let mut trees = HashMap::new();
    trees.insert("foo.te".to_string(), tree);

    let config = Config::default();
    let ctx = AnalysisContext::build(trees, module_of_path, no_layer, &HashMap::new(), &config).unwrap();
    let report = ctx.analyze(&config).unwrap();

    assert!(report.findings.iter().any(|f| {
        f.check_id.as_str() == "E-010"
            && f.message
                == "Found stray word undeclared_macro_name. If it is a simple m4 macro please add an selint-disable comment or ignore in the SELint configuration file."
    }));
}

#[test]
fn an_interface_parameter_used_as_a_type_is_inferred_as_type_or_attribute() {
    let mut tree = FileTree::new("foo.if", NodeFlavor::IfFile);
    let if_id = tree.insert_child(
        tree.root,
        NodeFlavor::InterfaceDef,
        Payload::InterfaceDef(InterfaceDefData { name: "foo".to_string() }),
        1,
    );
    tree.insert_child(
        if_id,
        NodeFlavor::AvRule,
        Payload::AvRule(AvRuleData {
            flavor: AvRuleFlavor::Allow,
            sources: StringList::single("$1"),
            targets: StringList::single("self"),
            classes: StringList::single("file"),
            perms: StringList::single("read_file_perms"),
        }),
        2,
    );

    let mut trees = HashMap::new();
    trees.insert("foo.if".to_string(), tree);

    let loaded = loader::load(trees, module_of_path, no_layer, &HashMap::new()).unwrap();
    let foo = loaded.tables.interface_trait("foo").unwrap();

    assert!(foo.inferred);
    assert_eq!(foo.parameters[0], ParamFlavor::TypeOrAttribute);
}
