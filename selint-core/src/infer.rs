// SPDX-License-Identifier: Apache-2.0

//! Interface and template parameter-flavor inference.
//!
//! Each interface's `$1`, `$2`, ... parameters start out completely
//! unconstrained and are refined by looking at how the parameter is used
//! in the interface's own body: as a type name, a role name, an object
//! class, and so on. Inference runs in two passes over every interface
//! and template in the symbol tables: a shallow pass that only looks at
//! direct uses, then a deep pass that also follows calls to other
//! interfaces (which may themselves still be mid-inference, hence the
//! lattice join instead of a flat assignment, and the cycle guard below).

use std::collections::HashMap;

use selint_error::{selint_error, ErrorKind, Result};

use crate::ast::{FileTree, Payload};
use crate::string_list::NameFlavor;
use crate::symtab::{InterfaceTrait, SymbolTables, TraitKind, TRAIT_MAX_PARAMETERS};

/// A parameter's inferred flavor, ordered as a join-semilattice:
/// `Initial < Unknown < Text < {TypeOrAttribute, RoleOrAttribute} <
/// {Type, TypeAttribute, Role, RoleAttribute, Class, ObjectName}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamFlavor {
    Initial,
    Unknown,
    Text,
    TypeOrAttribute,
    RoleOrAttribute,
    Type,
    TypeAttribute,
    Role,
    RoleAttribute,
    Class,
    ObjectName,
}

impl ParamFlavor {
    fn rank(self) -> u8 {
        use ParamFlavor::*;
        match self {
            Initial => 0,
            Unknown => 1,
            Text => 2,
            TypeOrAttribute | RoleOrAttribute => 3,
            Type | TypeAttribute | Role | RoleAttribute | Class | ObjectName => 4,
        }
    }

    /// Join two observations of the same parameter: the more specific one
    /// wins; two incompatible same-rank observations collapse to
    /// `Unknown` rather than one arbitrarily overwriting the other.
    pub fn join(self, other: ParamFlavor) -> ParamFlavor {
        if self == other {
            return self;
        }
        match self.rank().cmp(&other.rank()) {
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Equal => ParamFlavor::Unknown,
        }
    }

    pub fn from_name_flavor(flavor: NameFlavor) -> ParamFlavor {
        match flavor {
            NameFlavor::Type => ParamFlavor::Type,
            NameFlavor::TypeAttribute => ParamFlavor::TypeAttribute,
            NameFlavor::TypeOrAttribute => ParamFlavor::TypeOrAttribute,
            NameFlavor::Role => ParamFlavor::Role,
            NameFlavor::RoleAttribute => ParamFlavor::RoleAttribute,
            NameFlavor::RoleOrAttribute => ParamFlavor::RoleOrAttribute,
            NameFlavor::Class => ParamFlavor::Class,
            NameFlavor::Unknown | NameFlavor::Permission | NameFlavor::User | NameFlavor::Bool => {
                ParamFlavor::Unknown
            }
        }
    }
}

/// Maximum interface-call recursion depth during the deep pass before the
/// call graph is considered cyclic.
const MAX_CALL_DEPTH: usize = 40;

/// The 8 refpolicy macros whose parameter shapes are fixed by convention
/// rather than inferred from a body we have access to.
fn builtin_macro_parameters() -> Vec<(&'static str, [ParamFlavor; TRAIT_MAX_PARAMETERS])> {
    use ParamFlavor::*;
    let pad = |flavors: &[ParamFlavor]| {
        let mut arr = [Initial; TRAIT_MAX_PARAMETERS];
        arr[..flavors.len()].copy_from_slice(flavors);
        arr
    };

    vec![
        ("can_exec", pad(&[TypeOrAttribute, TypeOrAttribute])),
        (
            "filetrans_pattern",
            pad(&[TypeOrAttribute, TypeOrAttribute, Type, Class, ObjectName]),
        ),
        (
            "filetrans_add_pattern",
            pad(&[TypeOrAttribute, TypeOrAttribute, Type, Class, ObjectName]),
        ),
        (
            "domtrans_pattern",
            pad(&[TypeOrAttribute, TypeOrAttribute, Type]),
        ),
        (
            "domain_auto_transition_pattern",
            pad(&[TypeOrAttribute, TypeOrAttribute, Type]),
        ),
        ("admin_pattern", pad(&[TypeOrAttribute, TypeOrAttribute])),
        (
            "stream_connect_pattern",
            pad(&[TypeOrAttribute, TypeOrAttribute, TypeOrAttribute, TypeOrAttribute]),
        ),
        (
            "dgram_send_pattern",
            pad(&[TypeOrAttribute, TypeOrAttribute, TypeOrAttribute, TypeOrAttribute]),
        ),
    ]
}

/// Install the 8 built-in macro signatures as pre-inferred entries so
/// ordinary inference never has to look inside them.
pub fn install_builtin_macros(tables: &mut SymbolTables) {
    for (name, params) in builtin_macro_parameters() {
        if tables.interface_trait(name).is_none() {
            tables.insert_interface_trait(name, InterfaceTrait::already_inferred(TraitKind::Macro, params));
        }
    }
}

/// Observe how `$n` was used at one call site inside an interface body
/// and fold that observation into the running parameter table.
fn observe(params: &mut [ParamFlavor; TRAIT_MAX_PARAMETERS], index: usize, flavor: ParamFlavor) {
    if index < TRAIT_MAX_PARAMETERS {
        params[index] = params[index].join(flavor);
    }
}

/// Parse a leading `$3` style placeholder, allowing it to be embedded in a
/// larger token (e.g. `$1_t` refines parameter 0 just as `$1` alone would).
/// Only the run of digits immediately after `$` is consumed; anything
/// after that is ignored.
fn parameter_index(text: &str) -> Option<usize> {
    let rest = text.strip_prefix('$')?;
    let digit_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digit_len == 0 {
        return None;
    }
    let n: usize = rest[..digit_len].parse().ok()?;
    if n == 0 {
        None
    } else {
        Some(n - 1)
    }
}

/// Shallow pass: scan `tree`'s direct statements for `$n` uses whose
/// surrounding construct pins down a flavor (an av-rule source, a
/// role-allow target, a file-context object class, and so on) without
/// following any interface calls.
fn shallow_scan(tree: &FileTree, params: &mut [ParamFlavor; TRAIT_MAX_PARAMETERS]) {
    for id in tree.iter_dfs() {
        let node = tree.get(id);
        match &node.payload {
            Payload::AvRule(av) => {
                for item in av.sources.iter().chain(av.targets.iter()) {
                    if let Some(idx) = parameter_index(&item.text) {
                        observe(params, idx, ParamFlavor::TypeOrAttribute);
                    }
                }
                for item in av.classes.iter() {
                    if let Some(idx) = parameter_index(&item.text) {
                        observe(params, idx, ParamFlavor::Class);
                    }
                }
            }
            Payload::TtRule(tt) => {
                for item in tt.sources.iter().chain(tt.targets.iter()) {
                    if let Some(idx) = parameter_index(&item.text) {
                        observe(params, idx, ParamFlavor::TypeOrAttribute);
                    }
                }
                if let Some(idx) = parameter_index(&tt.default_type) {
                    observe(params, idx, ParamFlavor::Type);
                }
                if let Some(object_name) = &tt.object_name {
                    if let Some(idx) = parameter_index(object_name) {
                        observe(params, idx, ParamFlavor::ObjectName);
                    }
                }
            }
            Payload::RtRule(rt) => {
                for item in rt.sources.iter() {
                    if let Some(idx) = parameter_index(&item.text) {
                        observe(params, idx, ParamFlavor::RoleOrAttribute);
                    }
                }
                for item in rt.targets.iter() {
                    if let Some(idx) = parameter_index(&item.text) {
                        observe(params, idx, ParamFlavor::TypeOrAttribute);
                    }
                }
            }
            Payload::RoleAllow(ra) => {
                for entry in ra.sources.iter().chain(ra.targets.iter()) {
                    if let Some(idx) = parameter_index(&entry.name) {
                        observe(params, idx, ParamFlavor::RoleOrAttribute);
                    }
                }
            }
            Payload::FcEntry(fc) => {
                if let Some(idx) = parameter_index(&fc.path) {
                    observe(params, idx, ParamFlavor::Text);
                }
            }
            _ => {}
        }
    }
}

/// Deep pass: additionally follow `IfCall` statements, joining in the
/// callee's own (possibly still-being-inferred) parameter flavors at the
/// matching argument position. `depth` guards against `a` calling `b`
/// calling `a`.
fn deep_scan(
    tree: &FileTree,
    tables: &SymbolTables,
    params: &mut [ParamFlavor; TRAIT_MAX_PARAMETERS],
    depth: usize,
) -> Result<()> {
    if depth > MAX_CALL_DEPTH {
        return Err(selint_error!(ErrorKind::IfCallLoop, "interface call graph exceeds depth {MAX_CALL_DEPTH}"));
    }

    for id in tree.iter_dfs() {
        let node = tree.get(id);
        if let Payload::IfCall(call) = &node.payload {
            let Some(callee) = tables.interface_trait(&call.callee) else {
                continue;
            };
            for (arg_index, arg) in call.args.iter().enumerate() {
                let Some(callee_flavor) = callee.parameters.get(arg_index) else {
                    continue;
                };
                for item in arg.iter() {
                    if let Some(idx) = parameter_index(&item.text) {
                        observe(params, idx, *callee_flavor);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Run full two-pass inference over every interface and template
/// registered in `tables`, using `trees` to look up each one's defining
/// body.
pub fn infer_all(tables: &mut SymbolTables, trees: &HashMap<String, FileTree>) -> Result<()> {
    install_builtin_macros(tables);

    let names: Vec<String> = tables.interface_trait_names().cloned().collect();

    for name in &names {
        if tables.interface_trait(name).map(|t| t.inferred).unwrap_or(true) {
            continue;
        }
        let mut params = [ParamFlavor::Initial; TRAIT_MAX_PARAMETERS];
        if let Some(tree) = defining_tree(tables, trees, name) {
            shallow_scan(tree, &mut params);
        }
        if let Some(trait_data) = tables.interface_trait_mut(name) {
            trait_data.parameters = params;
        }
    }

    for name in &names {
        let mut params = tables
            .interface_trait(name)
            .map(|t| t.parameters)
            .unwrap_or([ParamFlavor::Initial; TRAIT_MAX_PARAMETERS]);
        if let Some(tree) = defining_tree(tables, trees, name) {
            deep_scan(tree, tables, &mut params, 0)?;
        }
        if let Some(trait_data) = tables.interface_trait_mut(name) {
            trait_data.parameters = params;
            trait_data.inferred = true;
        }
    }

    Ok(())
}

fn defining_tree<'t>(
    tables: &SymbolTables,
    trees: &'t HashMap<String, FileTree>,
    name: &str,
) -> Option<&'t FileTree> {
    let (file, _) = tables.interface_trait(name)?.defining_node.as_ref()?;
    trees.get(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_prefers_more_specific_flavor() {
        assert_eq!(
            ParamFlavor::Unknown.join(ParamFlavor::Type),
            ParamFlavor::Type
        );
        assert_eq!(
            ParamFlavor::Type.join(ParamFlavor::Unknown),
            ParamFlavor::Type
        );
    }

    #[test]
    fn join_collapses_incompatible_same_rank_to_unknown() {
        assert_eq!(ParamFlavor::Type.join(ParamFlavor::Role), ParamFlavor::Unknown);
    }

    #[test]
    fn parameter_index_parses_dollar_digit() {
        assert_eq!(parameter_index("$1"), Some(0));
        assert_eq!(parameter_index("$3"), Some(2));
        assert_eq!(parameter_index("foo_t"), None);
        assert_eq!(parameter_index("$0"), None);
    }

    #[test]
    fn parameter_index_recognizes_a_leading_dollar_digit_inside_a_larger_token() {
        assert_eq!(parameter_index("$1_t"), Some(0));
        assert_eq!(parameter_index("$12_exec_t"), Some(11));
    }

    #[test]
    fn builtin_macros_are_installed_with_fixed_shapes() {
        let mut tables = SymbolTables::new();
        install_builtin_macros(&mut tables);
        let can_exec = tables.interface_trait("can_exec").unwrap();
        assert!(can_exec.inferred);
        assert_eq!(can_exec.parameters[0], ParamFlavor::TypeOrAttribute);
    }
}
