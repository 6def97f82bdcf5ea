//! Arena storage for nodes with exclusive ownership of children.
//!
//! The [`Ast`] hands out [`NodeId`]s on allocation. Deleting a node leaves a
//! tombstone so that identities stay unique for the lifetime of the store.

use crate::kind::NodeKind;
use crate::node::{Node, NodeId};
use std::collections::HashSet;
use std::ops::{Index, IndexMut};
use vela_source::{Provenance, SourceDb, Span};

/// The node arena.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    slots: Vec<Option<Node>>,
    live: usize,
}

impl Ast {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `node` and returns its identity.
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId::from_raw(self.slots.len() as u32);
        self.slots.push(Some(node));
        self.live += 1;
        id
    }

    /// Allocates a node of `kind` with `children`, stamped from `prov`.
    pub fn new_node(&mut self, kind: NodeKind, prov: &Provenance, children: Vec<NodeId>) -> NodeId {
        let mut node = Node::new(kind, prov.span());
        node.children = children;
        self.alloc(node)
    }

    /// Allocates a named node of `kind` with `children`.
    pub fn new_named(
        &mut self,
        kind: NodeKind,
        name: impl Into<String>,
        prov: &Provenance,
        children: Vec<NodeId>,
    ) -> NodeId {
        let id = self.new_node(kind, prov, children);
        self[id].name = name.into();
        id
    }

    /// Returns the node, or `None` if it has been deleted.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.as_raw() as usize).and_then(Option::as_ref)
    }

    /// Mutable variant of [`Ast::get`].
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.as_raw() as usize).and_then(Option::as_mut)
    }

    /// True if `id` names a node that has not been deleted.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// The kind of `id`.
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self[id].kind
    }

    /// The children of `id`.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self[id].children
    }

    /// The `index`-th child of `id`, if present.
    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self[id].children.get(index).copied()
    }

    /// Appends `child` to the children of `parent`.
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self[parent].children.push(child);
    }

    /// Detaches and returns the `index`-th child of `parent` without deleting it.
    pub fn take_child(&mut self, parent: NodeId, index: usize) -> NodeId {
        self[parent].children.remove(index)
    }

    /// Replaces the `index`-th child of `parent` with `new`, deleting the old child.
    pub fn replace_child(&mut self, parent: NodeId, index: usize, new: NodeId) {
        let old = std::mem::replace(&mut self[parent].children[index], new);
        if old != new {
            self.delete(old);
        }
    }

    /// Source span of `id`.
    pub fn span(&self, id: NodeId) -> Span {
        self[id].span
    }

    /// `file:line.col-line.col` of `id`, for diagnostics.
    pub fn loc_string(&self, id: NodeId, sources: &SourceDb) -> String {
        sources.loc_string(self[id].span)
    }

    /// Deep copy of the subtree at `id`, including attributes.
    ///
    /// Back-references are cleared in the copy.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let mut node = self[id].clone();
        node.id2ast = None;
        node.children = node.children.iter().map(|&c| self.clone_subtree(c)).collect();
        let attrs = std::mem::take(&mut node.attributes);
        node.attributes = attrs
            .into_iter()
            .map(|(k, v)| (k, self.clone_subtree(v)))
            .collect();
        self.alloc(node)
    }

    /// Overwrites `dst` with a deep copy of `src`, keeping the identity of
    /// `dst`. The previous children and attributes of `dst` are deleted.
    pub fn copy_subtree_into(&mut self, src: NodeId, dst: NodeId) {
        if src == dst {
            return;
        }
        let copy = self.clone_subtree(src);
        self.replace_node(dst, copy);
    }

    /// Moves the contents of `src` into `dst` and retires the `src` identity.
    ///
    /// Children and attributes of `dst` that are not adopted by `src` are
    /// deleted. The location of `dst` is kept when `src` carries none.
    pub fn replace_node(&mut self, dst: NodeId, src: NodeId) {
        if src == dst {
            return;
        }
        let Some(mut node) = self.slots[src.as_raw() as usize].take() else {
            return;
        };
        self.live -= 1;
        let old_span = self[dst].span;
        if node.span.is_dummy() {
            node.span = old_span;
        }
        node.in_lvalue_from_above = self[dst].in_lvalue_from_above;
        node.in_param_from_above = self[dst].in_param_from_above;
        let old = std::mem::replace(&mut self[dst], node);
        let mut adopted = HashSet::new();
        self.collect_subtree(dst, &mut adopted);
        for id in old.children.into_iter().chain(old.attributes.into_values()) {
            if !adopted.contains(&id) {
                self.delete(id);
            }
        }
    }

    /// Deletes `id` and everything it owns.
    pub fn delete(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.slots.get_mut(id.as_raw() as usize).and_then(Option::take) {
                self.live -= 1;
                stack.extend(node.children);
                stack.extend(node.attributes.into_values());
            }
        }
    }

    /// Deletes all children of `id`, leaving it childless.
    pub fn delete_children(&mut self, id: NodeId) {
        for child in std::mem::take(&mut self[id].children) {
            self.delete(child);
        }
    }

    /// Sets the attribute `key` of `id` to `value`, deleting any previous value.
    ///
    /// Attribute expressions are always evaluated as constants, so `value` is
    /// marked as being in a parameter context.
    pub fn set_attribute(&mut self, id: NodeId, key: impl Into<String>, value: NodeId) {
        self.set_in_param_flag(value, true, false);
        if let Some(old) = self[id].attributes.insert(key.into(), value) {
            if old != value {
                self.delete(old);
            }
        }
    }

    /// True if attribute `key` is present and holds a non-zero constant.
    pub fn get_bool_attribute(&self, id: NodeId, key: &str) -> bool {
        match self[id].attributes.get(key) {
            Some(&value) => {
                let node = &self[value];
                node.kind == NodeKind::Constant && node.as_bool()
            }
            None => false,
        }
    }

    /// Structural equality of two subtrees.
    pub fn equal(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let (na, nb) = (&self[a], &self[b]);
        na.payload_eq(nb)
            && na
                .children
                .iter()
                .zip(nb.children.iter())
                .all(|(&x, &y)| self.equal(x, y))
    }

    /// True if a subtree structurally equal to `needle` occurs in `haystack`.
    pub fn contains(&self, haystack: NodeId, needle: NodeId) -> bool {
        self.equal(haystack, needle)
            || self[haystack]
                .children
                .iter()
                .any(|&c| self.contains(c, needle))
    }

    /// Every node of the subtree at `id` (children only, not attributes),
    /// in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self[id].children.iter().rev().copied());
        }
        out
    }

    fn collect_subtree(&self, id: NodeId, out: &mut HashSet<NodeId>) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if out.insert(id) {
                let node = &self[id];
                stack.extend(node.children.iter().copied());
                stack.extend(node.attributes.values().copied());
            }
        }
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    /// # Panics
    ///
    /// Panics if the node has been deleted.
    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("access to deleted node {}", id.as_raw()),
        }
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("access to deleted node {}", id.as_raw()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prov() -> Provenance {
        Provenance::internal()
    }

    fn add(ast: &mut Ast, a: i64, b: i64) -> NodeId {
        let p = prov();
        let x = ast.mkconst_int(a, false, 8, &p);
        let y = ast.mkconst_int(b, false, 8, &p);
        ast.new_node(NodeKind::Add, &p, vec![x, y])
    }

    #[test]
    fn clone_is_deep_and_clears_id2ast() {
        let mut ast = Ast::new();
        let e = add(&mut ast, 1, 2);
        let target = ast.new_named(NodeKind::Wire, "w", &prov(), vec![]);
        let id = ast.new_named(NodeKind::Identifier, "w", &prov(), vec![]);
        ast[id].id2ast = Some(target);
        ast.push_child(e, id);

        let copy = ast.clone_subtree(e);
        assert_ne!(copy, e);
        assert!(ast.equal(copy, e));
        let copied_ident = ast.children(copy)[2];
        assert_ne!(copied_ident, id);
        assert!(ast[copied_ident].id2ast.is_none());
        assert_eq!(ast[id].id2ast, Some(target));
    }

    #[test]
    fn delete_frees_owned_nodes() {
        let mut ast = Ast::new();
        let e = add(&mut ast, 1, 2);
        let attr = ast.mkconst_int(1, false, 1, &prov());
        ast.set_attribute(e, "keep", attr);
        assert_eq!(ast.live_count(), 4);
        ast.delete(e);
        assert_eq!(ast.live_count(), 0);
        assert!(!ast.is_live(attr));
    }

    #[test]
    fn replace_node_keeps_identity_and_adopted_children() {
        let mut ast = Ast::new();
        let e = add(&mut ast, 1, 2);
        let lhs = ast.children(e)[0];
        let rhs = ast.children(e)[1];
        let neg = ast.new_node(NodeKind::Neg, &prov(), vec![lhs]);
        ast.replace_node(e, neg);
        assert_eq!(ast.kind(e), NodeKind::Neg);
        assert_eq!(ast.children(e), &[lhs]);
        assert!(ast.is_live(lhs));
        assert!(!ast.is_live(rhs));
        assert!(!ast.is_live(neg));
    }

    #[test]
    fn copy_subtree_into_overwrites_in_place() {
        let mut ast = Ast::new();
        let a = add(&mut ast, 1, 2);
        let b = add(&mut ast, 3, 4);
        let before = ast.live_count();
        ast.copy_subtree_into(a, b);
        assert!(ast.equal(a, b));
        assert_eq!(ast.live_count(), before);
        assert_eq!(ast.kind(b), NodeKind::Add);
        assert_ne!(ast.children(a), ast.children(b));
    }

    #[test]
    fn structural_equality_ignores_location() {
        let mut ast = Ast::new();
        let a = add(&mut ast, 1, 2);
        let b = add(&mut ast, 1, 2);
        let c = add(&mut ast, 1, 3);
        ast[b].span = Span::line(vela_source::FileId::from_raw(0), 9);
        assert!(ast.equal(a, b));
        assert!(!ast.equal(a, c));
        let three = ast.mkconst_int(3, false, 8, &prov());
        assert!(ast.contains(c, three));
        assert!(!ast.contains(a, three));
    }

    #[test]
    fn bool_attribute() {
        let mut ast = Ast::new();
        let w = ast.new_named(NodeKind::Wire, "w", &prov(), vec![]);
        assert!(!ast.get_bool_attribute(w, "keep"));
        let one = ast.mkconst_int(1, false, 1, &prov());
        ast.set_attribute(w, "keep", one);
        assert!(ast.get_bool_attribute(w, "keep"));
        assert!(ast[one].in_param);
        let zero = ast.mkconst_int(0, false, 1, &prov());
        ast.set_attribute(w, "keep", zero);
        assert!(!ast.get_bool_attribute(w, "keep"));
        assert!(!ast.is_live(one));
    }

    #[test]
    fn descendants_preorder() {
        let mut ast = Ast::new();
        let e = add(&mut ast, 1, 2);
        let d = ast.descendants(e);
        assert_eq!(d.len(), 3);
        assert_eq!(d[0], e);
    }
}
