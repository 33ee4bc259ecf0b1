// SPDX-License-Identifier: Apache-2.0

//! The SELinux reference-policy analysis engine.
//!
//! This crate owns the whole pipeline from `.te`/`.if`/`.fc` source text
//! ([`parser`]) down to a [`selint_report::Report`]: symbol table
//! construction ([`loader`]), interface parameter-flavor inference
//! ([`infer`]), declaration ordering ([`ordering`]), permission-macro
//! suggestions ([`permmacro`]), and the check catalog itself ([`checks`]).

pub mod ast;
pub mod checks;
pub mod infer;
pub mod loader;
pub mod ordering;
pub mod parser;
pub mod permmacro;
pub mod string_list;
pub mod symtab;

use std::collections::HashMap;
use std::path::Path;

use selint_config::{Config, OrderConf};
use selint_report::Report;

use ast::FileTree;
use checks::{CheckContext, Registry};
use loader::LoadedPolicy;
use ordering::OrderingResult;
use permmacro::PermMacroTable;
use symtab::ModuleStatus;

/// A fully analyzed policy: the loaded trees and symbol tables, plus the
/// derived data (permission macros, per-file ordering) every check needs.
pub struct AnalysisContext {
    pub policy: LoadedPolicy,
    pub perm_macros: PermMacroTable,
    orderings: HashMap<String, OrderingResult>,
}

impl AnalysisContext {
    /// Build symbol tables and run inference over `trees`, then compute
    /// the permission-macro table and (for every `.te` file) the
    /// ordering pass.
    pub fn build(
        trees: HashMap<String, FileTree>,
        module_of: impl Fn(&str) -> String,
        layer_of: impl Fn(&str) -> String,
        module_statuses: &HashMap<String, ModuleStatus>,
        config: &Config,
    ) -> selint_error::Result<AnalysisContext> {
        let policy = loader::load(trees, module_of, layer_of, module_statuses)?;

        let mut perm_macros = PermMacroTable::new();
        for name in policy.tables.permission_macro_names().cloned().collect::<Vec<_>>() {
            if let Some(perms) = policy.tables.permission_macro(&name) {
                perm_macros.register(&name, perms.iter().map(String::as_str));
            }
        }

        let mut orderings = HashMap::new();
        for (filename, tree) in &policy.trees {
            if tree.get(tree.root).flavor == ast::NodeFlavor::TeFile {
                orderings.insert(
                    filename.clone(),
                    ordering::run(tree, &policy.tables, config.ordering.order_conf),
                );
            }
        }

        Ok(AnalysisContext { policy, perm_macros, orderings })
    }

    /// Run every enabled check over every loaded file and collect the
    /// findings into a [`Report`].
    pub fn analyze(&self, config: &Config) -> selint_error::Result<Report> {
        let mut registry = Registry::build(config)?;
        let mut findings = Vec::new();

        for (filename, tree) in &self.policy.trees {
            let ctx = CheckContext {
                tree,
                tables: &self.policy.tables,
                config,
                perm_macros: &self.perm_macros,
                ordering: self.orderings.get(filename),
            };
            registry.dispatch(&ctx, &mut findings);
        }

        Ok(Report { findings })
    }
}

/// Resolve a source file's module name from its path: the file stem,
/// lowercased, matching the refpolicy convention that `foo.te`/`foo.if`/
/// `foo.fc` all belong to module `foo`.
pub fn module_of_path(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| path.to_string())
}

/// Resolve a module's layer from its containing directory, matching the
/// refpolicy `policy/modules/<layer>/<module>.te` layout. Files outside
/// that layout (a loose file passed directly on the command line) have
/// no layer.
pub fn layer_of_path(trees_root_relative: &str) -> String {
    let parts: Vec<&str> = Path::new(trees_root_relative)
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();

    // .../modules/<layer>/<module>.te
    parts
        .iter()
        .position(|p| *p == "modules")
        .and_then(|i| parts.get(i + 1))
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// Resolve the order-conf default used when no configuration overrides
/// it, kept here so both the library and its tests share one constant.
pub const DEFAULT_ORDER_CONF: OrderConf = OrderConf::Ref;

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{NodeFlavor, Payload};
    use string_list::StringList;

    #[test]
    fn module_of_path_uses_the_file_stem() {
        assert_eq!(module_of_path("policy/modules/services/sshd.te"), "sshd");
    }

    #[test]
    fn layer_of_path_reads_the_modules_parent_directory() {
        assert_eq!(layer_of_path("policy/modules/services/sshd.te"), "services");
    }

    #[test]
    fn layer_of_path_is_empty_outside_the_refpolicy_layout() {
        assert_eq!(layer_of_path("sshd.te"), "");
    }

    #[test]
    fn analyze_reports_unordered_permissions() {
        let mut trees = HashMap::new();
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        tree.insert_child(
            tree.root,
            NodeFlavor::AvRule,
            Payload::AvRule(ast::AvRuleData {
                flavor: ast::AvRuleFlavor::Allow,
                sources: StringList::single("foo_t"),
                targets: StringList::single("bar_t"),
                classes: StringList::single("file"),
                perms: StringList::from_strs(["write", "read"]),
            }),
            1,
        );
        trees.insert("foo.te".to_string(), tree);

        let config = Config::default();
        let ctx = AnalysisContext::build(trees, module_of_path, |_| String::new(), &HashMap::new(), &config).unwrap();
        let report = ctx.analyze(&config).unwrap();

        assert!(report.findings.iter().any(|f| f.check_id.as_str() == "C-005"));
    }
}
