// SPDX-License-Identifier: Apache-2.0

//! Process-wide symbol tables: declarations by kind, module status and
//! layer, interfaces, interface traits, template bodies, permission
//! macros, and the three boolean interface-flag sets.

use std::collections::HashMap;

use crate::ast::{DeclFlavor, NodeId};
use crate::infer::ParamFlavor;

pub const ASSUMED_MODULE: &str = "__assumed__";

/// A module's declared participation status from `modules.conf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Base,
    Module,
    Off,
}

/// The kind of thing `name` was found to be when `interface_traits` was
/// populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraitKind {
    Interface,
    Template,
    Macro,
}

pub const TRAIT_MAX_PARAMETERS: usize = 10;

/// An interface or template's inferred (or not-yet-inferred) parameter
/// flavors, plus the node that defines it.
#[derive(Debug, Clone)]
pub struct InterfaceTrait {
    pub kind: TraitKind,
    pub inferred: bool,
    pub parameters: [ParamFlavor; TRAIT_MAX_PARAMETERS],
    /// The file and node the interface/template/macro is defined at.
    /// `None` for the built-in macros, which have no body to scan.
    pub defining_node: Option<(String, NodeId)>,
}

impl InterfaceTrait {
    pub fn new(kind: TraitKind, defining_node: Option<(String, NodeId)>) -> InterfaceTrait {
        InterfaceTrait {
            kind,
            inferred: false,
            parameters: [ParamFlavor::Initial; TRAIT_MAX_PARAMETERS],
            defining_node,
        }
    }

    pub fn already_inferred(kind: TraitKind, parameters: [ParamFlavor; TRAIT_MAX_PARAMETERS]) -> InterfaceTrait {
        InterfaceTrait {
            kind,
            inferred: true,
            parameters,
            defining_node: None,
        }
    }
}

/// A template's recorded body, used to replay macro-expansion for template
/// calls: the declarations it would synthesize and the interface calls it
/// issues.
#[derive(Debug, Clone, Default)]
pub struct TemplateBody {
    pub declarations: Vec<NodeId>,
    pub if_calls: Vec<NodeId>,
}

fn insert_if_absent<V>(map: &mut HashMap<String, V>, key: String, value: V) -> bool {
    if map.contains_key(&key) {
        false
    } else {
        map.insert(key, value);
        true
    }
}

/// The full set of process-wide indexes, owned by one run.
#[derive(Debug, Default)]
pub struct SymbolTables {
    declarations: HashMap<(DeclFlavor, String), String>,
    modules: HashMap<String, ModuleStatus>,
    mod_layers: HashMap<String, String>,
    interfaces: HashMap<String, String>,
    interface_traits: HashMap<String, InterfaceTrait>,
    templates: HashMap<String, TemplateBody>,
    permission_macros: HashMap<String, Vec<String>>,
    transform_if: std::collections::HashSet<String>,
    filetrans_if: std::collections::HashSet<String>,
    role_if: std::collections::HashSet<String>,
}

impl SymbolTables {
    pub fn new() -> SymbolTables {
        SymbolTables::default()
    }

    /// First writer wins: a second insertion for the same `(name, kind)`
    /// is a no-op.
    pub fn insert_declaration(&mut self, flavor: DeclFlavor, name: &str, module: &str) -> bool {
        insert_if_absent(&mut self.declarations, (flavor, name.to_string()), module.to_string())
    }

    pub fn lookup_declaration(&self, flavor: DeclFlavor, name: &str) -> Option<&str> {
        self.declarations
            .get(&(flavor, name.to_string()))
            .map(String::as_str)
    }

    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    pub fn insert_module(&mut self, name: &str, status: ModuleStatus) -> bool {
        insert_if_absent(&mut self.modules, name.to_string(), status)
    }

    pub fn module_status(&self, name: &str) -> Option<ModuleStatus> {
        self.modules.get(name).copied()
    }

    pub fn insert_mod_layer(&mut self, module: &str, layer: &str) -> bool {
        insert_if_absent(&mut self.mod_layers, module.to_string(), layer.to_string())
    }

    pub fn mod_layer(&self, module: &str) -> Option<&str> {
        self.mod_layers.get(module).map(String::as_str)
    }

    pub fn insert_interface(&mut self, name: &str, module: &str) -> bool {
        insert_if_absent(&mut self.interfaces, name.to_string(), module.to_string())
    }

    pub fn interface_module(&self, name: &str) -> Option<&str> {
        self.interfaces.get(name).map(String::as_str)
    }

    /// A duplicate insertion replaces the existing value (first-wins is
    /// realized by the caller checking `contains_interface_trait` first,
    /// matching "a duplicate insertion frees the incoming value").
    pub fn insert_interface_trait(&mut self, name: &str, trait_data: InterfaceTrait) -> bool {
        if self.interface_traits.contains_key(name) {
            return false;
        }
        self.interface_traits.insert(name.to_string(), trait_data);
        true
    }

    pub fn interface_trait(&self, name: &str) -> Option<&InterfaceTrait> {
        self.interface_traits.get(name)
    }

    pub fn interface_trait_mut(&mut self, name: &str) -> Option<&mut InterfaceTrait> {
        self.interface_traits.get_mut(name)
    }

    pub fn interface_trait_names(&self) -> impl Iterator<Item = &String> {
        self.interface_traits.keys()
    }

    pub fn insert_template(&mut self, name: &str, body: TemplateBody) -> bool {
        insert_if_absent(&mut self.templates, name.to_string(), body)
    }

    pub fn template(&self, name: &str) -> Option<&TemplateBody> {
        self.templates.get(name)
    }

    pub fn is_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn insert_permission_macro(&mut self, name: &str, perms: Vec<String>) -> bool {
        insert_if_absent(&mut self.permission_macros, name.to_string(), perms)
    }

    pub fn permission_macro(&self, name: &str) -> Option<&[String]> {
        self.permission_macros.get(name).map(Vec::as_slice)
    }

    pub fn permission_macro_names(&self) -> impl Iterator<Item = &String> {
        self.permission_macros.keys()
    }

    pub fn mark_transform_if(&mut self, name: &str) -> bool {
        self.transform_if.insert(name.to_string())
    }

    pub fn is_transform_if(&self, name: &str) -> bool {
        self.transform_if.contains(name)
    }

    pub fn mark_filetrans_if(&mut self, name: &str) {
        self.filetrans_if.insert(name.to_string());
    }

    pub fn is_filetrans_if(&self, name: &str) -> bool {
        self.filetrans_if.contains(name)
    }

    pub fn mark_role_if(&mut self, name: &str) {
        self.role_if.insert(name.to_string());
    }

    pub fn is_role_if(&self, name: &str) -> bool {
        self.role_if.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_writer_wins_on_declarations() {
        let mut tables = SymbolTables::new();
        assert!(tables.insert_declaration(DeclFlavor::Type, "foo_t", "foo"));
        assert!(!tables.insert_declaration(DeclFlavor::Type, "foo_t", "bar"));
        assert_eq!(tables.lookup_declaration(DeclFlavor::Type, "foo_t"), Some("foo"));
    }

    #[test]
    fn declarations_are_keyed_by_kind_too() {
        let mut tables = SymbolTables::new();
        tables.insert_declaration(DeclFlavor::Type, "foo_t", "foo");
        tables.insert_declaration(DeclFlavor::TypeAttribute, "foo_t", "foo");
        assert_eq!(tables.declaration_count(), 2);
    }

    #[test]
    fn interface_trait_first_insertion_wins() {
        let mut tables = SymbolTables::new();
        let a = InterfaceTrait::new(TraitKind::Interface, None);
        let mut b = InterfaceTrait::new(TraitKind::Interface, None);
        b.inferred = true;

        assert!(tables.insert_interface_trait("foo_if", a));
        assert!(!tables.insert_interface_trait("foo_if", b));
        assert!(!tables.interface_trait("foo_if").unwrap().inferred);
    }
}
