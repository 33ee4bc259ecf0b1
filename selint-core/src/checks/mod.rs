// SPDX-License-Identifier: Apache-2.0

//! The check registry and dispatch loop: builds a per-node-flavor table
//! of enabled checks from the configuration, then walks a [`FileTree`]
//! in DFS order calling every check registered for each node's flavor.

mod fc;
mod if_;
mod te;

use std::collections::HashSet;

use selint_config::{CheckId, Config, Severity};
use selint_report::Finding;
use strum::EnumCount;

use crate::ast::{FileTree, NodeFlavor, NodeId};
use crate::ordering::OrderingResult;
use crate::permmacro::PermMacroTable;
use crate::symtab::SymbolTables;

/// Everything a check function needs to look at: the tree it's
/// analyzing, the symbol tables built from the whole policy, permission
/// macro suggestions, and (once computed) the ordering pass result.
pub struct CheckContext<'a> {
    pub tree: &'a FileTree,
    pub tables: &'a SymbolTables,
    pub config: &'a Config,
    pub perm_macros: &'a PermMacroTable,
    pub ordering: Option<&'a OrderingResult>,
}

/// A single check function: given the context and one node, return zero
/// or more finding messages for that node.
pub type CheckFn = fn(&CheckContext, NodeId) -> Vec<String>;

struct CheckEntry {
    id: CheckId,
    func: CheckFn,
}

/// Checks bucketed by the node flavor they fire on, built once per run
/// from the active [`Config`].
pub struct Registry {
    buckets: Vec<Vec<CheckEntry>>,
    /// Per-check issue counters, keyed by check id string, so the
    /// end-of-run summary doesn't need to re-scan every finding.
    counts: std::collections::HashMap<String, usize>,
}

impl Registry {
    pub fn build(config: &Config) -> selint_error::Result<Registry> {
        let mut registry = Registry {
            buckets: (0..NodeFlavor::COUNT).map(|_| Vec::new()).collect(),
            counts: std::collections::HashMap::new(),
        };

        let enabled_override: HashSet<String> =
            config.enabled_check_ids()?.into_iter().map(|id| id.to_string()).collect();
        let disabled: HashSet<String> =
            config.disabled_check_ids()?.into_iter().map(|id| id.to_string()).collect();

        for descriptor in te::CHECKS.iter().chain(if_::CHECKS.iter()).chain(fc::CHECKS.iter()) {
            let id = CheckId::new(descriptor.id)?;
            registry.maybe_register(id, descriptor.flavors, descriptor.func, config, &enabled_override, &disabled);
        }

        Ok(registry)
    }

    fn maybe_register(
        &mut self,
        id: CheckId,
        flavors: &[NodeFlavor],
        func: CheckFn,
        config: &Config,
        enabled_override: &HashSet<String>,
        disabled: &HashSet<String>,
    ) {
        let id_str = id.to_string();

        if disabled.contains(&id_str) {
            return;
        }

        let above_threshold = id.severity() >= config.general.severity_threshold;
        let explicitly_enabled = enabled_override.contains(&id_str);

        let active = if config.checks.only_enabled {
            explicitly_enabled
        } else {
            above_threshold || explicitly_enabled
        };

        if !active {
            return;
        }

        self.counts.insert(id_str, 0);
        for flavor in flavors {
            self.buckets[*flavor as usize].push(CheckEntry { id: id.clone(), func });
        }
    }

    /// Run every registered check over `tree` in DFS order, appending
    /// findings to `out`.
    pub fn dispatch(&mut self, ctx: &CheckContext, out: &mut Vec<Finding>) {
        for id in ctx.tree.iter_dfs() {
            let node = ctx.tree.get(id);
            let bucket = &self.buckets[node.flavor as usize];
            if bucket.is_empty() {
                continue;
            }

            for entry in bucket {
                if node.exceptions.iter().any(|exc| exc == entry.id.as_str()) {
                    continue;
                }

                for message in (entry.func)(ctx, id) {
                    *self.counts.entry(entry.id.to_string()).or_insert(0) += 1;
                    out.push(Finding::new(
                        std::path::PathBuf::from(&ctx.tree.filename),
                        node.lineno,
                        entry.id.clone(),
                        message,
                    ));
                }
            }
        }
    }

    pub fn issue_count(&self, id: &str) -> usize {
        self.counts.get(id).copied().unwrap_or(0)
    }
}

/// One check's static registration data: its id, the node flavors it
/// fires on, and the function itself.
pub struct CheckDescriptor {
    pub id: &'static str,
    pub flavors: &'static [NodeFlavor],
    pub func: CheckFn,
}

/// Names a rule references that might need an explicit declaration or a
/// require-block entry: every source and target of an av/transition
/// rule, shared between the te-file and if-file check families.
pub(crate) fn referenced_names(node: &crate::ast::PolicyNode) -> Vec<&str> {
    use crate::ast::Payload;

    match &node.payload {
        Payload::AvRule(data) => data.sources.iter().chain(data.targets.iter()).map(|i| i.text.as_str()).collect(),
        Payload::TtRule(data) => data.sources.iter().chain(data.targets.iter()).map(|i| i.text.as_str()).collect(),
        Payload::RtRule(data) => data.sources.iter().chain(data.targets.iter()).map(|i| i.text.as_str()).collect(),
        _ => Vec::new(),
    }
}

/// Walks backward through preceding siblings and up through ancestors
/// looking for a `require`/`gen_require` block that already covers `name`
/// at the given declaration flavor.
pub(crate) fn has_require(
    tree: &FileTree,
    mut cur: NodeId,
    name: &str,
    flavor: crate::ast::DeclFlavor,
) -> bool {
    use crate::ast::Payload;

    loop {
        let node = tree.get(cur);
        if matches!(node.flavor, NodeFlavor::Require | NodeFlavor::GenReq) {
            for child in tree.children(cur) {
                if let Payload::Decl(decl) = &tree.get(child).payload {
                    if decl.flavor == flavor && (decl.name == name || decl.attrs_or_perms.contains(name)) {
                        return true;
                    }
                }
            }
        }

        let node = tree.get(cur);
        if let Some(prev) = node.prev {
            cur = prev;
        } else if let Some(parent) = node.parent {
            cur = parent;
        } else {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclData, DeclFlavor, Payload};
    use crate::string_list::StringList;

    fn minimal_config() -> Config {
        Config::default()
    }

    #[test]
    fn registry_honors_severity_threshold() {
        let mut config = minimal_config();
        config.general.severity_threshold = Severity::Error;
        let registry = Registry::build(&config).unwrap();
        // C-001 (a convention check) should not be registered above the
        // error threshold.
        assert_eq!(registry.issue_count("C-001"), 0);
        assert!(registry.buckets[NodeFlavor::AvRule as usize]
            .iter()
            .all(|entry| entry.id.severity() >= Severity::Error));
    }

    #[test]
    fn disabled_check_is_never_registered() {
        let mut config = minimal_config();
        config.checks.disabled = vec!["W-009".to_string()];
        let registry = Registry::build(&config).unwrap();
        assert!(registry.buckets[NodeFlavor::TeFile as usize]
            .iter()
            .all(|entry| entry.id.as_str() != "W-009"));
    }

    #[test]
    fn dispatch_skips_nodes_with_a_matching_exception() {
        let mut config = minimal_config();
        config.checks.enabled = vec!["C-007".to_string()];
        config.checks.only_enabled = true;
        let mut registry = Registry::build(&config).unwrap();

        let mut tree = FileTree::new("foo.te", crate::ast::NodeFlavor::TeFile);
        let id = tree.insert_child(
            tree.root,
            crate::ast::NodeFlavor::Decl,
            Payload::Decl(DeclData {
                flavor: DeclFlavor::Type,
                name: "foo_t".to_string(),
                attrs_or_perms: StringList::new(),
            }),
            1,
        );
        tree.get_mut(id).exceptions.push("C-007".to_string());

        let tables = SymbolTables::new();
        let perm_macros = PermMacroTable::new();
        let ctx = CheckContext {
            tree: &tree,
            tables: &tables,
            config: &config,
            perm_macros: &perm_macros,
            ordering: None,
        };

        let mut findings = Vec::new();
        registry.dispatch(&ctx, &mut findings);
        assert!(findings.is_empty());
    }
}
