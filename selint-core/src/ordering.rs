// SPDX-License-Identifier: Apache-2.0

//! The Reference-Policy style ordering engine: section/subsection
//! classification, the longest-increasing-subsequence pass that decides
//! which nodes are "in order", and an explain routine for the rest.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;

use crate::ast::{FileTree, NodeFlavor, NodeId, Payload};
use crate::symtab::SymbolTables;
use selint_config::OrderConf;

pub const DECLARATIONS_SECTION: &str = "_declarations";
pub const NON_ORDERED_SECTION: &str = "_non_ordered";

/// Per-run-of-a-section local refinement, checked only between nodes that
/// share the same section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Subsection {
    Self_,
    Own,
    LssRelated,
    KernelMod,
    Kernel,
    System,
    Other,
    BuildOption,
    Conditional,
    Tunable,
    Optional,
    Unknown,
}

impl Subsection {
    /// Collapse kernel/system/other into one bucket under LIGHT, and
    /// treat every interface-call subsection as equal under LAX.
    fn normalize(self, order_conf: OrderConf) -> Subsection {
        use Subsection::*;
        match order_conf {
            OrderConf::Ref => self,
            OrderConf::Light => match self {
                KernelMod | Kernel | System | Other => Kernel,
                other => other,
            },
            OrderConf::Lax => match self {
                KernelMod | Kernel | System | Other | LssRelated => Own,
                other => other,
            },
        }
    }
}

/// Where a node falls for ordering purposes: either a named section with
/// a refining subsection, or entirely exempt from ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Named { name: String, subsection: Subsection },
    NonOrdered,
}

fn av_rule_has_risky_or_nonordered_perm(perms: &crate::string_list::StringList) -> bool {
    perms.contains("associate") || perms.contains("mounton")
}

/// Classify one node's section per the rules in the component notes:
/// declarations go to `_declarations`, role-allow/role-types/neverallow/
/// auditallow/comments/headers/requires are exempt, AV/TT rules section
/// by their first source, and interface calls section by their first
/// argument unless they're a filetrans marker or a transform/role call
/// outside a conditional (both of which fold into `_declarations`/exempt).
pub fn classify_section(tree: &FileTree, tables: &SymbolTables, id: NodeId) -> Section {
    let node = tree.get(id);

    match &node.payload {
        Payload::Decl(_) | Payload::AttributeStmt(_) | Payload::Alias(_) => {
            if tree.is_in_require(id) {
                Section::NonOrdered
            } else {
                Section::Named {
                    name: DECLARATIONS_SECTION.to_string(),
                    subsection: Subsection::Unknown,
                }
            }
        }
        Payload::RoleAllow(_) | Payload::RoleTypes(_) => Section::NonOrdered,
        Payload::AvRule(av) => {
            use crate::ast::AvRuleFlavor;
            if matches!(av.flavor, AvRuleFlavor::NeverAllow | AvRuleFlavor::AuditAllow)
                || av_rule_has_risky_or_nonordered_perm(&av.perms)
            {
                Section::NonOrdered
            } else {
                let name = av.sources.first().map(|i| i.text.clone()).unwrap_or_default();
                Section::Named {
                    name,
                    subsection: classify_av_subsection(av, tables, tree.filename_module()),
                }
            }
        }
        Payload::TtRule(tt) => {
            let name = tt.sources.first().map(|i| i.text.clone()).unwrap_or_default();
            Section::Named {
                name,
                subsection: Subsection::Unknown,
            }
        }
        Payload::IfCall(call) => classify_if_call_section(tree, tables, id, call),
        Payload::Comment(_) | Payload::None => Section::NonOrdered,
        _ if node.flavor == NodeFlavor::Header
            || node.flavor == NodeFlavor::Require
            || node.flavor == NodeFlavor::GenReq
            || node.flavor == NodeFlavor::M4Call
            || node.flavor == NodeFlavor::Error =>
        {
            Section::NonOrdered
        }
        _ if node.flavor.is_conditional_block() => {
            match tree.first_meaningful_child(id) {
                Some(child) => classify_section(tree, tables, child),
                None => Section::NonOrdered,
            }
        }
        _ if node.flavor == NodeFlavor::StartBlock => match tree.dfs_next(id) {
            Some(next) => classify_section(tree, tables, next),
            None => Section::NonOrdered,
        },
        _ => Section::NonOrdered,
    }
}

/// Whether every type/attribute name an AV rule references belongs to
/// `current_module`, treating a name absent from the declaration table
/// (a permission name like `read_file_perms`, or an unresolved string) as
/// not evidence of a foreign module.
fn is_own_module_rule(av: &crate::ast::AvRuleData, tables: &SymbolTables, current_module: &str) -> bool {
    use crate::ast::DeclFlavor;

    av.sources.iter().chain(av.targets.iter()).all(|item| {
        let owner = tables
            .lookup_declaration(DeclFlavor::Type, &item.text)
            .or_else(|| tables.lookup_declaration(DeclFlavor::TypeAttribute, &item.text));
        match owner {
            Some(module) => module == current_module,
            None => true,
        }
    })
}

fn classify_av_subsection(av: &crate::ast::AvRuleData, tables: &SymbolTables, current_module: &str) -> Subsection {
    let sole_source = av.sources.len() == 1;
    let sole_target = av.targets.len() == 1;
    if sole_source
        && sole_target
        && av
            .sources
            .first()
            .zip(av.targets.first())
            .map(|(s, t)| s.text == t.text || t.text == "self")
            .unwrap_or(false)
    {
        Subsection::Self_
    } else if is_own_module_rule(av, tables, current_module) {
        Subsection::Own
    } else {
        Subsection::Unknown
    }
}

fn classify_if_call_section(
    tree: &FileTree,
    tables: &SymbolTables,
    id: NodeId,
    call: &crate::ast::IfCallData,
) -> Section {
    if tables.is_filetrans_if(&call.callee) {
        return Section::NonOrdered;
    }

    let in_conditional = tree
        .ancestors(id)
        .any(|ancestor| tree.get(ancestor).flavor.is_conditional_block());

    if !in_conditional && (tables.is_transform_if(&call.callee) || tables.is_role_if(&call.callee)) {
        return Section::Named {
            name: DECLARATIONS_SECTION.to_string(),
            subsection: Subsection::Unknown,
        };
    }

    let name = call
        .args
        .first()
        .and_then(|arg| arg.first())
        .map(|item| item.text.clone())
        .unwrap_or_default();

    Section::Named {
        name,
        subsection: local_subsection(tree, tables, id, &call.callee),
    }
}

/// The outermost matching wrapper wins among ifdef/boolean/tunable/
/// optional, letting [`classify_if_call_section`] and the local
/// subsection test agree on which ancestor "owns" the call.
fn local_subsection(tree: &FileTree, tables: &SymbolTables, id: NodeId, callee_module: &str) -> Subsection {
    if tree.nearest_ancestor_of_flavor(id, NodeFlavor::OptionalPolicy).is_some() {
        return Subsection::Optional;
    }
    if tree.nearest_ancestor_of_flavor(id, NodeFlavor::TunablePolicy).is_some() {
        return Subsection::Tunable;
    }
    if tree.nearest_ancestor_of_flavor(id, NodeFlavor::BooleanPolicy).is_some() {
        return Subsection::Conditional;
    }
    if tree.nearest_ancestor_of_flavor(id, NodeFlavor::Ifdef).is_some() {
        return Subsection::BuildOption;
    }

    let module = tables.interface_module(callee_module);
    match module {
        Some(m) if m == tree.filename_module() => Subsection::Own,
        Some(m) if m == "kernel" => Subsection::KernelMod,
        Some(m) => match tables.mod_layer(m) {
            Some("kernel") => Subsection::Kernel,
            Some("system") => Subsection::System,
            Some(_) => Subsection::Other,
            None => Subsection::Unknown,
        },
        None => Subsection::Unknown,
    }
}

impl FileTree {
    /// The module name this tree's own declarations/interfaces belong
    /// to, derived from its filename.
    fn filename_module(&self) -> &str {
        self.filename
            .rsplit('/')
            .next()
            .unwrap_or(&self.filename)
            .split('.')
            .next()
            .unwrap_or(&self.filename)
    }
}

/// Per-section average line number (the section's "center of mass"),
/// built once over every ordered node in a tree.
#[derive(Debug, Default)]
pub struct SectionAverages {
    sums: HashMap<String, (u64, u64)>,
}

impl SectionAverages {
    pub fn build(tree: &FileTree, tables: &SymbolTables) -> SectionAverages {
        let mut averages = SectionAverages::default();
        for id in tree.iter_dfs() {
            if let Section::Named { name, .. } = classify_section(tree, tables, id) {
                let entry = averages.sums.entry(name).or_insert((0, 0));
                entry.0 += tree.get(id).lineno as u64;
                entry.1 += 1;
            }
        }
        averages
    }

    pub fn avg_line(&self, section: &str) -> f64 {
        match self.sums.get(section) {
            Some((sum, count)) if *count > 0 => *sum as f64 / *count as f64,
            _ => 0.0,
        }
    }

    /// `_declarations` always precedes everything else; otherwise order
    /// by center of mass, breaking ties lexically.
    fn compare(&self, a: &str, b: &str) -> CmpOrdering {
        if a == b {
            return CmpOrdering::Equal;
        }
        if a == DECLARATIONS_SECTION {
            return CmpOrdering::Less;
        }
        if b == DECLARATIONS_SECTION {
            return CmpOrdering::Greater;
        }
        // Two raw (non-`_`-prefixed) sections already in ascending
        // alphabetical order are never flagged, even if their centers of
        // mass disagree.
        if !a.starts_with('_') && !b.starts_with('_') && a < b {
            return CmpOrdering::Less;
        }

        self.avg_line(a)
            .partial_cmp(&self.avg_line(b))
            .unwrap_or(CmpOrdering::Equal)
            .then_with(|| a.cmp(b))
    }
}

/// One node flattened for the LIS pass, with its classified section
/// already resolved.
#[derive(Debug, Clone)]
struct OrderNode {
    id: NodeId,
    section: Section,
}

/// Compare two nodes under `order_conf`: section first (by center of
/// mass), subsection second (only meaningful within the same section).
fn compare_nodes(averages: &SectionAverages, order_conf: OrderConf, a: &OrderNode, b: &OrderNode) -> CmpOrdering {
    match (&a.section, &b.section) {
        (Section::Named { name: na, subsection: sa }, Section::Named { name: nb, subsection: sb }) => {
            averages
                .compare(na, nb)
                .then_with(|| sa.normalize(order_conf).cmp(&sb.normalize(order_conf)))
        }
        _ => CmpOrdering::Equal,
    }
}

/// The result of one ordering pass: which nodes are in the longest
/// increasing subsequence ("in order"), in tree iteration order.
pub struct OrderingResult {
    pub in_order: Vec<bool>,
    nodes: Vec<OrderNode>,
    averages: SectionAverages,
    order_conf: OrderConf,
}

impl OrderingResult {
    pub fn node_id(&self, index: usize) -> NodeId {
        self.nodes[index].id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn index_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Whether `id` was ordered, if it was part of this pass at all.
    pub fn is_in_order(&self, id: NodeId) -> Option<bool> {
        self.index_of(id).map(|i| self.in_order[i])
    }

    /// Convenience wrapper around [`explain`](Self::explain) that takes a
    /// [`NodeId`] instead of an index into the internal node list.
    pub fn explain_node(&self, id: NodeId) -> Option<String> {
        self.explain(self.index_of(id)?)
    }

    /// For an out-of-order node at `index`, scan outward for the nearest
    /// in-order neighbor the comparator disagrees with, and describe why.
    pub fn explain(&self, index: usize) -> Option<String> {
        if self.in_order[index] {
            return None;
        }
        let node = &self.nodes[index];

        for radius in 1..self.nodes.len() {
            if index >= radius && self.in_order[index - radius] {
                let neighbor = &self.nodes[index - radius];
                if compare_nodes(&self.averages, self.order_conf, neighbor, node) == CmpOrdering::Greater {
                    return Some(explain_pair(&self.averages, neighbor, node));
                }
            }
            if index + radius < self.nodes.len() && self.in_order[index + radius] {
                let neighbor = &self.nodes[index + radius];
                if compare_nodes(&self.averages, self.order_conf, node, neighbor) == CmpOrdering::Greater {
                    return Some(explain_pair(&self.averages, node, neighbor));
                }
            }
        }

        Some("node is out of order relative to its neighbors".to_string())
    }
}

fn explain_pair(averages: &SectionAverages, earlier: &OrderNode, later: &OrderNode) -> String {
    match (&earlier.section, &later.section) {
        (Section::Named { name: n1, subsection: s1 }, Section::Named { name: n2, subsection: s2 }) => {
            if n1 != n2 {
                format!(
                    "section '{n1}' (avg line {:.1}) should come after section '{n2}' (avg line {:.1})",
                    averages.avg_line(n1),
                    averages.avg_line(n2)
                )
            } else if s1 != s2 {
                format!("subsection {s1:?} should come after subsection {s2:?} within section '{n1}'")
            } else {
                format!("node in section '{n1}' is out of alphabetical order")
            }
        }
        _ => "node is out of order".to_string(),
    }
}

/// Run the full ordering pass over `tree`: classify every node, compute
/// section averages, then find the longest increasing subsequence under
/// `order_conf` via patience sorting (`O(n log n)`).
pub fn run(tree: &FileTree, tables: &SymbolTables, order_conf: OrderConf) -> OrderingResult {
    let averages = SectionAverages::build(tree, tables);

    let nodes: Vec<OrderNode> = tree
        .iter_dfs()
        .filter(|id| tree.get(*id).flavor != NodeFlavor::StartBlock)
        .map(|id| OrderNode {
            section: classify_section(tree, tables, id),
            id,
        })
        .collect();

    let in_order = longest_increasing_subsequence(&nodes, |a, b| compare_nodes(&averages, order_conf, a, b));

    OrderingResult {
        in_order,
        nodes,
        averages,
        order_conf,
    }
}

/// Patience-sorting LIS: `end_of_seq[k]` holds the index (into `items`)
/// of the smallest-ending increasing subsequence of length `k + 1`;
/// `seq_prev[i]` is `i`'s predecessor in whichever subsequence it ends.
/// Non-ordered items (neither side of `compare` ever resolves to
/// `Less`/`Greater`, i.e. `Equal`) are treated as compatible with any
/// neighbor and always marked in order.
fn longest_increasing_subsequence<T>(items: &[T], compare: impl Fn(&T, &T) -> CmpOrdering) -> Vec<bool> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }

    let mut end_of_seq: Vec<usize> = Vec::new();
    let mut seq_prev: Vec<Option<usize>> = vec![None; n];

    for i in 0..n {
        let key = |idx: &usize| compare(&items[*idx], &items[i]);

        let pos = end_of_seq.partition_point(|idx| key(idx) != CmpOrdering::Greater);

        if pos > 0 {
            seq_prev[i] = Some(end_of_seq[pos - 1]);
        }

        if pos == end_of_seq.len() {
            end_of_seq.push(i);
        } else {
            end_of_seq[pos] = i;
        }
    }

    let mut in_order = vec![false; n];
    let mut cur = end_of_seq.last().copied();
    while let Some(i) = cur {
        in_order[i] = true;
        cur = seq_prev[i];
    }

    in_order
}
