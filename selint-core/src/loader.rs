// SPDX-License-Identifier: Apache-2.0

//! Populates a fresh [`SymbolTables`] from a set of already-parsed
//! [`FileTree`]s: declarations, module status/layer, interfaces and
//! templates, the transform/filetrans/role interface flag sets, and
//! finally parameter-flavor inference.
//!
//! This module does not parse files itself (see the parser boundary);
//! it only walks trees that already exist, so it can be driven directly
//! by tests that build a [`FileTree`] in memory as well as by the
//! command-line front-end once it has files to read.

use std::collections::HashMap;
use std::path::Path;

use selint_error::Result;

use crate::ast::{FileTree, NodeFlavor, Payload};
use crate::infer;
use crate::symtab::{InterfaceTrait, ModuleStatus, SymbolTables, TemplateBody, TraitKind};

/// A loaded set of trees plus the symbol tables built from them.
pub struct LoadedPolicy {
    pub trees: HashMap<String, FileTree>,
    pub tables: SymbolTables,
}

/// Load declarations, interfaces, and templates from `trees` into a new
/// [`SymbolTables`], then run inference. `module_of` maps a source
/// filename to the module it belongs to, and `layer_of` a module to its
/// layer; both default to "unknown"/"" when the caller has no better
/// information (e.g. for a single loose file passed on the command
/// line).
pub fn load(
    trees: HashMap<String, FileTree>,
    module_of: impl Fn(&str) -> String,
    layer_of: impl Fn(&str) -> String,
    module_statuses: &HashMap<String, ModuleStatus>,
) -> Result<LoadedPolicy> {
    let mut tables = SymbolTables::new();

    register_modules(&trees, &module_of, &layer_of, module_statuses, &mut tables);
    register_declarations(&trees, &module_of, &mut tables);
    register_interfaces_and_templates(&trees, &mut tables);
    register_permission_macros(&trees, &mut tables);
    mark_transform_interfaces(&trees, &tables.interface_trait_names().cloned().collect::<Vec<_>>(), &mut tables);

    infer::infer_all(&mut tables, &trees)?;

    Ok(LoadedPolicy { trees, tables })
}

fn register_modules(
    trees: &HashMap<String, FileTree>,
    module_of: &impl Fn(&str) -> String,
    layer_of: &impl Fn(&str) -> String,
    module_statuses: &HashMap<String, ModuleStatus>,
    tables: &mut SymbolTables,
) {
    for (filename, tree) in trees {
        let module = module_of(filename);
        let status = module_statuses.get(&module).copied().unwrap_or_else(|| {
            let header = tree
                .children(tree.root)
                .find(|id| tree.get(*id).flavor == NodeFlavor::Header);
            match header {
                Some(_) => ModuleStatus::Module,
                None => ModuleStatus::Base,
            }
        });
        tables.insert_module(&module, status);
        tables.insert_mod_layer(&module, &layer_of(&module));
    }
}

/// Parse a `modules.conf`-style source into a flat module-name -> status
/// map. Blank lines and whole-line `#` comments are skipped; each other
/// line is `name = base|module|off`, and the first entry for a given
/// module name wins on a duplicate, matching `insert_into_mods_map`'s
/// `HASH_FIND`-before-`HASH_ADD` semantics.
pub fn parse_modules_conf(source: &str) -> HashMap<String, ModuleStatus> {
    let mut statuses = HashMap::new();

    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, status)) = line.split_once('=') else {
            continue;
        };
        let status = match status.trim() {
            "base" => ModuleStatus::Base,
            "module" => ModuleStatus::Module,
            "off" => ModuleStatus::Off,
            other => {
                log::debug!("modules.conf: ignoring unrecognized status '{other}'");
                continue;
            }
        };
        statuses.entry(name.trim().to_string()).or_insert(status);
    }

    statuses
}

fn register_declarations(
    trees: &HashMap<String, FileTree>,
    module_of: &impl Fn(&str) -> String,
    tables: &mut SymbolTables,
) {
    for (filename, tree) in trees {
        let module = module_of(filename);
        for id in tree.iter_dfs() {
            if let Payload::Decl(decl) = &tree.get(id).payload {
                tables.insert_declaration(decl.flavor, &decl.name, &module);
            }
        }
    }
}

fn register_interfaces_and_templates(trees: &HashMap<String, FileTree>, tables: &mut SymbolTables) {
    for (filename, tree) in trees {
        let module = module_stem(filename);
        for id in tree.iter_dfs() {
            let node = tree.get(id);
            match (&node.flavor, &node.payload) {
                (NodeFlavor::InterfaceDef, Payload::InterfaceDef(data)) => {
                    tables.insert_interface(&data.name, &module);
                    tables.insert_interface_trait(
                        &data.name,
                        InterfaceTrait::new(TraitKind::Interface, Some((filename.clone(), id))),
                    );
                }
                (NodeFlavor::TempDef, Payload::InterfaceDef(data)) => {
                    tables.insert_interface(&data.name, &module);
                    tables.insert_interface_trait(
                        &data.name,
                        InterfaceTrait::new(TraitKind::Template, Some((filename.clone(), id))),
                    );

                    let mut body = TemplateBody::default();
                    for child in tree.children(id) {
                        match &tree.get(child).payload {
                            Payload::Decl(_) => body.declarations.push(child),
                            Payload::IfCall(_) => body.if_calls.push(child),
                            _ => {}
                        }
                    }
                    tables.insert_template(&data.name, body);
                }
                _ => {}
            }
        }
    }
}

/// `define(name, { perm1 perm2 ... })` calls, found in `.if` files and
/// `obj_perm_sets.spt` (parsed with the same grammar), populate the
/// permission-macro catalog consumed by `PermMacroTable`.
fn register_permission_macros(trees: &HashMap<String, FileTree>, tables: &mut SymbolTables) {
    for tree in trees.values() {
        for id in tree.iter_dfs() {
            let node = tree.get(id);
            if let (NodeFlavor::Define, Payload::AttributeStmt(data)) = (&node.flavor, &node.payload) {
                let perms = data.attrs.iter().map(|item| item.text.clone()).collect();
                tables.insert_permission_macro(&data.name, perms);
            }
        }
    }
}

pub(crate) fn module_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

/// Fixpoint over the interface bodies: an interface is a "transform"
/// interface if it declares a type/attribute/role of its own, or if it
/// calls another transform interface. Iterates to a fixpoint since the
/// call graph isn't necessarily in dependency order.
fn mark_transform_interfaces(trees: &HashMap<String, FileTree>, names: &[String], tables: &mut SymbolTables) {
    let mut changed = true;
    while changed {
        changed = false;
        for name in names {
            if tables.is_transform_if(name) {
                continue;
            }
            let Some(trait_data) = tables.interface_trait(name) else {
                continue;
            };
            let Some((file, node_id)) = &trait_data.defining_node else {
                continue;
            };
            let Some(tree) = trees.get(file) else {
                continue;
            };

            let is_transform = tree.children(*node_id).any(|child| {
                let child_node = tree.get(child);
                match &child_node.payload {
                    Payload::Decl(_) => true,
                    Payload::IfCall(call) => tables.is_transform_if(&call.callee),
                    _ => false,
                }
            });

            if is_transform {
                tables.mark_transform_if(name);
                changed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclData, DeclFlavor};
    use crate::string_list::StringList;

    fn single_type_decl_tree() -> FileTree {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        tree.insert_child(
            tree.root,
            NodeFlavor::Decl,
            Payload::Decl(DeclData {
                flavor: DeclFlavor::Type,
                name: "foo_t".to_string(),
                attrs_or_perms: StringList::new(),
            }),
            1,
        );
        tree
    }

    #[test]
    fn loads_declarations_under_their_module() {
        let mut trees = HashMap::new();
        trees.insert("foo.te".to_string(), single_type_decl_tree());

        let loaded = load(trees, |_| "foo".to_string(), |_| "".to_string(), &HashMap::new()).unwrap();
        assert_eq!(
            loaded.tables.lookup_declaration(DeclFlavor::Type, "foo_t"),
            Some("foo")
        );
    }

    #[test]
    fn registers_permission_macros_from_define_nodes() {
        use crate::ast::AttributeStmtData;

        let mut tree = FileTree::new("obj_perm_sets.spt", NodeFlavor::IfFile);
        tree.insert_child(
            tree.root,
            NodeFlavor::Define,
            Payload::AttributeStmt(AttributeStmtData {
                name: "foo_read".to_string(),
                attrs: StringList::from_strs(["read", "getattr", "open"]),
            }),
            1,
        );

        let mut trees = HashMap::new();
        trees.insert("obj_perm_sets.spt".to_string(), tree);

        let loaded = load(trees, |_| "obj_perm_sets".to_string(), |_| "".to_string(), &HashMap::new()).unwrap();
        let expected = vec!["read".to_string(), "getattr".to_string(), "open".to_string()];
        assert_eq!(loaded.tables.permission_macro("foo_read"), Some(expected.as_slice()));
    }

    #[test]
    fn modules_without_a_header_are_base() {
        let mut trees = HashMap::new();
        trees.insert("foo.te".to_string(), single_type_decl_tree());

        let loaded = load(trees, |_| "foo".to_string(), |_| "".to_string(), &HashMap::new()).unwrap();
        assert_eq!(loaded.tables.module_status("foo"), Some(ModuleStatus::Base));
    }

    #[test]
    fn modules_conf_off_entry_overrides_the_header_heuristic() {
        let mut trees = HashMap::new();
        trees.insert("foo.te".to_string(), single_type_decl_tree());

        let mut statuses = HashMap::new();
        statuses.insert("foo".to_string(), ModuleStatus::Off);

        let loaded = load(trees, |_| "foo".to_string(), |_| "".to_string(), &statuses).unwrap();
        assert_eq!(loaded.tables.module_status("foo"), Some(ModuleStatus::Off));
    }

    #[test]
    fn parse_modules_conf_reads_name_equals_status_lines() {
        let source = "# a comment\n\nbase_mod = base\nmy_module = module\ndisabled_mod = off\n";
        let statuses = parse_modules_conf(source);
        assert_eq!(statuses.get("base_mod"), Some(&ModuleStatus::Base));
        assert_eq!(statuses.get("my_module"), Some(&ModuleStatus::Module));
        assert_eq!(statuses.get("disabled_mod"), Some(&ModuleStatus::Off));
    }

    #[test]
    fn parse_modules_conf_first_entry_wins_on_duplicate() {
        let source = "dup = base\ndup = off\n";
        let statuses = parse_modules_conf(source);
        assert_eq!(statuses.get("dup"), Some(&ModuleStatus::Base));
    }
}
