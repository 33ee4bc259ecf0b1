// SPDX-License-Identifier: Apache-2.0

//! The AST model: a tagged-variant tree of policy nodes, realized as a
//! single arena per file so that parent/sibling/child links are plain
//! indices rather than pointers.

use crate::string_list::{NameFlavor, NameList, StringList};
use std::fmt;

/// An index into a [`FileTree`]'s node arena. Not valid across trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

/// The ~35 AST node flavors named in the node taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumCount)]
pub enum NodeFlavor {
    TeFile,
    IfFile,
    FcFile,
    SptFile,
    AvFile,
    CondFile,
    AvRule,
    XavRule,
    TtRule,
    RtRule,
    Header,
    RoleAllow,
    RoleTypes,
    Decl,
    Alias,
    TypeAlias,
    TypeAttribute,
    RoleAttribute,
    M4Call,
    M4SimpleMacro,
    Define,
    OptionalPolicy,
    OptionalElse,
    BooleanPolicy,
    TunablePolicy,
    Ifdef,
    Ifelse,
    M4Arg,
    StartBlock,
    InterfaceDef,
    TempDef,
    IfCall,
    Require,
    GenReq,
    Permissive,
    FcEntry,
    Comment,
    Empty,
    Semicolon,
    Cleanup,
    Error,
}

impl NodeFlavor {
    /// The top-level file kinds; a node of one of these flavors is always
    /// the root of a [`FileTree`].
    pub fn is_file_root(self) -> bool {
        matches!(
            self,
            NodeFlavor::TeFile
                | NodeFlavor::IfFile
                | NodeFlavor::FcFile
                | NodeFlavor::SptFile
                | NodeFlavor::AvFile
                | NodeFlavor::CondFile
        )
    }

    pub fn is_conditional_block(self) -> bool {
        matches!(
            self,
            NodeFlavor::OptionalPolicy
                | NodeFlavor::OptionalElse
                | NodeFlavor::BooleanPolicy
                | NodeFlavor::TunablePolicy
                | NodeFlavor::Ifdef
                | NodeFlavor::Ifelse
        )
    }
}

/// The declared kind of a [`Payload::Decl`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclFlavor {
    Type,
    TypeAttribute,
    Role,
    RoleAttribute,
    User,
    Class,
    Permission,
    Bool,
}

impl DeclFlavor {
    pub fn name_flavor(self) -> NameFlavor {
        match self {
            DeclFlavor::Type => NameFlavor::Type,
            DeclFlavor::TypeAttribute => NameFlavor::TypeAttribute,
            DeclFlavor::Role => NameFlavor::Role,
            DeclFlavor::RoleAttribute => NameFlavor::RoleAttribute,
            DeclFlavor::User => NameFlavor::User,
            DeclFlavor::Class => NameFlavor::Class,
            DeclFlavor::Permission => NameFlavor::Permission,
            DeclFlavor::Bool => NameFlavor::Bool,
        }
    }
}

/// AV/extended-AV rule kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvRuleFlavor {
    Allow,
    AuditAllow,
    DontAudit,
    NeverAllow,
}

/// Type-transition kind: `type_transition` / `type_member` /
/// `type_change` / (role) `role_transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Tt,
    Tm,
    Tc,
    Rt,
}

#[derive(Debug, Clone)]
pub struct HeaderData {
    pub module_name: String,
    pub is_macro_form: bool,
}

#[derive(Debug, Clone)]
pub struct DeclData {
    pub flavor: DeclFlavor,
    pub name: String,
    /// `Type` → attribute set; `Class` → permission set.
    pub attrs_or_perms: StringList,
}

#[derive(Debug, Clone)]
pub struct AvRuleData {
    pub flavor: AvRuleFlavor,
    pub sources: StringList,
    pub targets: StringList,
    pub classes: StringList,
    pub perms: StringList,
}

#[derive(Debug, Clone)]
pub struct XavRuleData {
    pub flavor: AvRuleFlavor,
    pub sources: StringList,
    pub targets: StringList,
    pub classes: StringList,
    pub operation: String,
    pub perms: StringList,
}

#[derive(Debug, Clone)]
pub struct TtRuleData {
    pub kind: TransitionKind,
    pub sources: StringList,
    pub targets: StringList,
    pub classes: StringList,
    pub default_type: String,
    pub object_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RtRuleData {
    pub sources: StringList,
    pub targets: StringList,
    pub classes: StringList,
    pub default_role: String,
}

#[derive(Debug, Clone)]
pub struct IfCallData {
    pub callee: String,
    pub args: Vec<StringList>,
}

#[derive(Debug, Clone)]
pub struct RoleAllowData {
    pub sources: NameList,
    pub targets: NameList,
}

#[derive(Debug, Clone)]
pub struct RoleTypesData {
    pub role: String,
    pub types: StringList,
}

#[derive(Debug, Clone)]
pub struct AttributeStmtData {
    pub name: String,
    pub attrs: StringList,
}

#[derive(Debug, Clone)]
pub struct AliasData {
    pub alias_name: String,
    pub target_name: String,
}

#[derive(Debug, Clone)]
pub struct PermissiveData {
    pub type_name: String,
}

/// The object-class character in a `.fc` entry: `b c d f l p s`, or `\0`
/// for "unspecified".
pub type FcObjectClass = Option<char>;

#[derive(Debug, Clone)]
pub enum FcContext {
    None,
    Raw {
        user: String,
        role: String,
        type_name: String,
        range: Option<String>,
    },
    GenContext {
        user: String,
        role: String,
        type_name: String,
        range: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct FcEntryData {
    pub path: String,
    pub object_class: FcObjectClass,
    pub context: Option<FcContext>,
}

#[derive(Debug, Clone)]
pub struct GenReqData {
    pub unquoted: bool,
}

#[derive(Debug, Clone)]
pub struct CondDeclData {
    pub identifiers: StringList,
}

#[derive(Debug, Clone)]
pub struct InterfaceDefData {
    pub name: String,
}

/// The flavor-specific payload carried by an AST node.
#[derive(Debug, Clone)]
pub enum Payload {
    Header(HeaderData),
    Decl(DeclData),
    AvRule(AvRuleData),
    XavRule(XavRuleData),
    TtRule(TtRuleData),
    RtRule(RtRuleData),
    IfCall(IfCallData),
    RoleAllow(RoleAllowData),
    RoleTypes(RoleTypesData),
    AttributeStmt(AttributeStmtData),
    Alias(AliasData),
    Permissive(PermissiveData),
    FcEntry(FcEntryData),
    GenReq(GenReqData),
    CondDecl(CondDeclData),
    InterfaceDef(InterfaceDefData),
    Comment(String),
    ErrorText(String),
    None,
}

/// A node in a [`FileTree`]'s arena.
#[derive(Debug, Clone)]
pub struct PolicyNode {
    pub flavor: NodeFlavor,
    pub lineno: u32,
    pub parent: Option<NodeId>,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    pub first_child: Option<NodeId>,
    /// Check ids disabled on this node by a `selint-disable:<ID>` comment.
    pub exceptions: Vec<String>,
    pub payload: Payload,
}

impl PolicyNode {
    fn leaf(flavor: NodeFlavor, lineno: u32, payload: Payload) -> PolicyNode {
        PolicyNode {
            flavor,
            lineno,
            parent: None,
            prev: None,
            next: None,
            first_child: None,
            exceptions: Vec::new(),
            payload,
        }
    }

    pub fn is_in_template_map_call(&self) -> bool {
        matches!(self.flavor, NodeFlavor::IfCall)
    }
}

/// One parsed file's worth of AST, owned end to end by this struct.
#[derive(Debug, Clone)]
pub struct FileTree {
    pub filename: String,
    nodes: Vec<PolicyNode>,
    pub root: NodeId,
}

impl FileTree {
    /// Start a new tree whose root is the file-kind node itself.
    pub fn new(filename: impl Into<String>, root_flavor: NodeFlavor) -> FileTree {
        let mut nodes = Vec::new();
        nodes.push(PolicyNode::leaf(root_flavor, 0, Payload::None));
        FileTree {
            filename: filename.into(),
            nodes,
            root: NodeId(0),
        }
    }

    pub fn get(&self, id: NodeId) -> &PolicyNode {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut PolicyNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root file node always exists; "empty" means no content below it.
        self.nodes.len() <= 1
    }

    fn alloc(&mut self, node: PolicyNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Append a child to the last child of `parent`.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        flavor: NodeFlavor,
        payload: Payload,
        lineno: u32,
    ) -> NodeId {
        let mut node = PolicyNode::leaf(flavor, lineno, payload);
        node.parent = Some(parent);

        let new_id = match self.get(parent).first_child {
            None => {
                let id = self.alloc(node);
                self.get_mut(parent).first_child = Some(id);
                id
            }
            Some(first) => {
                let last = self.last_sibling(first);
                node.prev = Some(last);
                let id = self.alloc(node);
                self.get_mut(last).next = Some(id);
                id
            }
        };

        new_id
    }

    /// Append a sibling after `prev`, inheriting `prev`'s parent.
    pub fn insert_next(
        &mut self,
        prev: NodeId,
        flavor: NodeFlavor,
        payload: Payload,
        lineno: u32,
    ) -> NodeId {
        let parent = self.get(prev).parent;
        let mut node = PolicyNode::leaf(flavor, lineno, payload);
        node.parent = parent;
        node.prev = Some(prev);
        node.next = self.get(prev).next;

        let new_id = self.alloc(node);
        let existing_next = self.get(prev).next;
        self.get_mut(prev).next = Some(new_id);
        if let Some(next) = existing_next {
            self.get_mut(next).prev = Some(new_id);
        }

        new_id
    }

    fn last_sibling(&self, mut id: NodeId) -> NodeId {
        while let Some(next) = self.get(id).next {
            id = next;
        }
        id
    }

    /// DFS-next: first child, else next sibling, else the next sibling of
    /// the nearest ancestor that has one, else `None`.
    pub fn dfs_next(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id);

        if let Some(child) = node.first_child {
            return Some(child);
        }

        if let Some(next) = node.next {
            return Some(next);
        }

        let mut ancestor = node.parent;
        while let Some(a) = ancestor {
            if let Some(next) = self.get(a).next {
                return Some(next);
            }
            ancestor = self.get(a).parent;
        }

        None
    }

    /// Iterate every node in the tree in DFS order, starting at the root.
    pub fn iter_dfs(&self) -> DfsIter<'_> {
        DfsIter {
            tree: self,
            current: Some(self.root),
        }
    }

    pub fn children(&self, id: NodeId) -> ChildrenIter<'_> {
        ChildrenIter {
            tree: self,
            current: self.get(id).first_child,
        }
    }

    /// Skip start-block/require/gen-require children to find the first
    /// "meaningful" child, per §4.D's transform-marking rule.
    pub fn first_meaningful_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).find(|child| {
            !matches!(
                self.get(*child).flavor,
                NodeFlavor::StartBlock | NodeFlavor::Require | NodeFlavor::GenReq
            )
        })
    }

    pub fn is_in_require(&self, mut id: NodeId) -> bool {
        loop {
            let node = self.get(id);
            if matches!(node.flavor, NodeFlavor::Require | NodeFlavor::GenReq) {
                return true;
            }
            match node.parent {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    pub fn is_in_template(&self, id: NodeId) -> Option<String> {
        let mut cur = self.get(id).parent;
        while let Some(id) = cur {
            let node = self.get(id);
            if node.flavor == NodeFlavor::TempDef {
                if let Payload::InterfaceDef(data) = &node.payload {
                    return Some(data.name.clone());
                }
            }
            cur = node.parent;
        }
        None
    }

    /// Whether any ancestor of `id` (at or above it) matches `flavor`,
    /// returning the nearest one -- used by the ordering engine's
    /// "outermost wrapper wins" rule.
    pub fn nearest_ancestor_of_flavor(&self, id: NodeId, flavor: NodeFlavor) -> Option<NodeId> {
        let mut result = None;
        let mut cur = Some(id);
        while let Some(cur_id) = cur {
            if self.get(cur_id).flavor == flavor {
                result = Some(cur_id);
            }
            cur = self.get(cur_id).parent;
        }
        result
    }

    pub fn ancestors(&self, id: NodeId) -> AncestorIter<'_> {
        AncestorIter {
            tree: self,
            current: self.get(id).parent,
        }
    }
}

pub struct DfsIter<'t> {
    tree: &'t FileTree,
    current: Option<NodeId>,
}

impl<'t> Iterator for DfsIter<'t> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.current?;
        self.current = self.tree.dfs_next(current);
        Some(current)
    }
}

pub struct ChildrenIter<'t> {
    tree: &'t FileTree,
    current: Option<NodeId>,
}

impl<'t> Iterator for ChildrenIter<'t> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.current?;
        self.current = self.tree.get(current).next;
        Some(current)
    }
}

pub struct AncestorIter<'t> {
    tree: &'t FileTree,
    current: Option<NodeId>,
}

impl<'t> Iterator for AncestorIter<'t> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.current?;
        self.current = self.tree.get(current).parent;
        Some(current)
    }
}

/// Extract every identifier a node references, flavor-tagged, per the
/// per-flavor rules in the node taxonomy. Leading `-` (exclusion) is
/// stripped; the result is a reference list, never a declaration list.
pub fn get_names_in_node(tree: &FileTree, id: NodeId) -> NameList {
    use crate::string_list::NameEntry;

    let node = tree.get(id);
    let mut names = NameList::new();

    let strip = |s: &str| s.strip_prefix('-').unwrap_or(s).to_string();

    match &node.payload {
        Payload::AvRule(av) => {
            for s in av.sources.iter().chain(av.targets.iter()) {
                names.push(NameEntry::new(strip(&s.text), NameFlavor::TypeOrAttribute));
            }
            for c in av.classes.iter() {
                names.push(NameEntry::with_traits(strip(&c.text), NameFlavor::Class, av.perms.clone()));
            }
            for p in av.perms.iter() {
                names.push(NameEntry::new(strip(&p.text), NameFlavor::Permission));
            }
        }
        Payload::XavRule(xav) => {
            for s in xav.sources.iter().chain(xav.targets.iter()) {
                names.push(NameEntry::new(strip(&s.text), NameFlavor::TypeOrAttribute));
            }
            for c in xav.classes.iter() {
                names.push(NameEntry::with_traits(strip(&c.text), NameFlavor::Class, xav.perms.clone()));
            }
            for p in xav.perms.iter() {
                names.push(NameEntry::new(strip(&p.text), NameFlavor::Permission));
            }
        }
        Payload::TtRule(tt) => {
            for s in tt.sources.iter().chain(tt.targets.iter()) {
                names.push(NameEntry::new(strip(&s.text), NameFlavor::TypeOrAttribute));
            }
            names.push(NameEntry::new(tt.default_type.clone(), NameFlavor::Type));
            for c in tt.classes.iter() {
                names.push(NameEntry::new(strip(&c.text), NameFlavor::Class));
            }
        }
        Payload::RtRule(rt) => {
            for s in rt.sources.iter() {
                names.push(NameEntry::new(strip(&s.text), NameFlavor::RoleOrAttribute));
            }
            for t in rt.targets.iter() {
                names.push(NameEntry::new(strip(&t.text), NameFlavor::TypeOrAttribute));
            }
            names.push(NameEntry::new(rt.default_role.clone(), NameFlavor::Role));
        }
        Payload::Decl(decl) => {
            names.push(NameEntry::new(decl.name.clone(), decl.flavor.name_flavor()));
            if decl.flavor == DeclFlavor::Type {
                for attr in decl.attrs_or_perms.iter() {
                    names.push(NameEntry::new(attr.text.clone(), NameFlavor::TypeAttribute));
                }
            }
        }
        Payload::IfCall(call) => {
            for arg in &call.args {
                for item in arg.iter() {
                    names.push(NameEntry::new(strip(&item.text), NameFlavor::Unknown));
                }
            }
        }
        Payload::RoleAllow(ra) => {
            for entry in ra.sources.iter().chain(ra.targets.iter()) {
                names.push(entry.clone());
            }
        }
        Payload::RoleTypes(rt) => {
            names.push(NameEntry::new(rt.role.clone(), NameFlavor::Role));
            for t in rt.types.iter() {
                names.push(NameEntry::new(strip(&t.text), NameFlavor::Type));
            }
        }
        Payload::AttributeStmt(stmt) => match node.flavor {
            NodeFlavor::TypeAttribute => {
                names.push(NameEntry::new(stmt.name.clone(), NameFlavor::TypeAttribute));
            }
            NodeFlavor::RoleAttribute => {
                names.push(NameEntry::new(stmt.name.clone(), NameFlavor::RoleAttribute));
            }
            _ => {}
        },
        Payload::Alias(alias) => {
            names.push(NameEntry::new(alias.alias_name.clone(), NameFlavor::Type));
            names.push(NameEntry::new(alias.target_name.clone(), NameFlavor::Type));
        }
        Payload::Permissive(p) => {
            names.push(NameEntry::new(p.type_name.clone(), NameFlavor::Type));
        }
        _ => {}
    }

    names
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dfs_next_visits_every_node_once() {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        let root = tree.root;
        let a = tree.insert_child(root, NodeFlavor::Decl, Payload::None, 1);
        let b = tree.insert_next(a, NodeFlavor::Decl, Payload::None, 2);
        let c = tree.insert_child(b, NodeFlavor::Comment, Payload::None, 3);

        let visited: Vec<NodeId> = tree.iter_dfs().collect();
        assert_eq!(visited, vec![root, a, b, c]);
    }

    #[test]
    fn empty_file_is_a_single_root_node() {
        let tree = FileTree::new("empty.te", NodeFlavor::TeFile);
        assert!(tree.is_empty());
        assert_eq!(tree.iter_dfs().count(), 1);
    }

    #[test]
    fn is_in_require_walks_ancestors() {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        let root = tree.root;
        let req = tree.insert_child(root, NodeFlavor::Require, Payload::None, 1);
        let decl = tree.insert_child(req, NodeFlavor::Decl, Payload::None, 2);
        assert!(tree.is_in_require(decl));
        assert!(!tree.is_in_require(req));
    }

    #[test]
    fn get_names_in_node_strips_exclusion_prefix() {
        let mut tree = FileTree::new("foo.te", NodeFlavor::TeFile);
        let root = tree.root;
        let av = tree.insert_child(
            root,
            NodeFlavor::AvRule,
            Payload::AvRule(AvRuleData {
                flavor: AvRuleFlavor::Allow,
                sources: StringList::from_strs(["foo_t"]),
                targets: StringList::from_strs(["-bar_t"]),
                classes: StringList::from_strs(["file"]),
                perms: StringList::from_strs(["read"]),
            }),
            1,
        );

        let names = get_names_in_node(&tree, av);
        assert!(names.contains_str("bar_t", NameFlavor::TypeOrAttribute));
        assert!(!names.contains_str("-bar_t", NameFlavor::TypeOrAttribute));
    }
}
