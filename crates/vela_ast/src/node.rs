//! The tree node and its identity.

use crate::kind::NodeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vela_common::LogicVec;
use vela_source::Span;

/// Stable identity of a node in an [`Ast`](crate::Ast).
///
/// Identities are never reused, so a `NodeId` can key external maps for as
/// long as the tree lives.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates an ID from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// One packed or unpacked dimension of a declaration.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Dimension {
    /// Lowest index of the dimension.
    pub range_right: i32,
    /// Number of elements.
    pub range_width: i32,
    /// True when declared `[low:high]`.
    pub range_swapped: bool,
}

/// A node of the syntax tree.
///
/// Children and attribute values are owned exclusively; `id2ast` is the only
/// non-owning link.
#[derive(Clone, Debug)]
pub struct Node {
    /// What the node represents.
    pub kind: NodeKind,
    /// Ordered owned children.
    pub children: Vec<NodeId>,
    /// Owned attribute expressions, keyed by attribute name.
    pub attributes: BTreeMap<String, NodeId>,
    /// Declared or referenced name; string contents of string literals.
    pub name: String,
    /// Input port.
    pub is_input: bool,
    /// Output port.
    pub is_output: bool,
    /// Declared as a variable.
    pub is_reg: bool,
    /// Declared with `logic`.
    pub is_logic: bool,
    /// Signed value.
    pub is_signed: bool,
    /// String literal.
    pub is_string: bool,
    /// Wired-AND net.
    pub is_wand: bool,
    /// Wired-OR net.
    pub is_wor: bool,
    /// `range_left`/`range_right` are known.
    pub range_valid: bool,
    /// Declared `[low:high]`.
    pub range_swapped: bool,
    /// Declaration has been checked for redefinition.
    pub was_checked: bool,
    /// Unsized literal such as `'1`.
    pub is_unsized: bool,
    /// Declared with a user-defined type.
    pub is_custom_type: bool,
    /// 1-based port position, 0 for non-ports.
    pub port_id: i32,
    /// Most significant index once the range is known.
    pub range_left: i32,
    /// Least significant index once the range is known.
    pub range_right: i32,
    /// Integer payload; the low 32 bits of a constant, or a counter.
    pub integer: i64,
    /// Bits of a constant, least significant first.
    pub bits: LogicVec,
    /// Value of a real literal.
    pub realvalue: f64,
    /// Dimensions, unpacked ones first.
    pub dimensions: Vec<Dimension>,
    /// How many entries of `dimensions` are unpacked.
    pub unpacked_dimensions: usize,

    /// Declaration an identifier resolves to.
    pub id2ast: Option<NodeId>,
    /// Effective lvalue context.
    pub in_lvalue: bool,
    /// Effective constant-parameter context.
    pub in_param: bool,
    /// Lvalue context inherited from the parent.
    pub in_lvalue_from_above: bool,
    /// Parameter context inherited from the parent.
    pub in_param_from_above: bool,
    /// Set once the simplifier has prepared this subtree.
    pub basic_prep: bool,
    /// Marks an identifier whose value is read ahead of its assignment.
    pub lookahead: bool,

    /// Source location.
    pub span: Span,
}

impl Node {
    /// A fresh node of `kind` located at `span`.
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            name: String::new(),
            is_input: false,
            is_output: false,
            is_reg: false,
            is_logic: false,
            is_signed: false,
            is_string: false,
            is_wand: false,
            is_wor: false,
            range_valid: false,
            range_swapped: false,
            was_checked: false,
            is_unsized: false,
            is_custom_type: false,
            port_id: 0,
            range_left: -1,
            range_right: 0,
            integer: 0,
            bits: LogicVec::new(0),
            realvalue: 0.0,
            dimensions: Vec::new(),
            unpacked_dimensions: 0,
            id2ast: None,
            in_lvalue: false,
            in_param: false,
            in_lvalue_from_above: false,
            in_param_from_above: false,
            basic_prep: false,
            lookahead: false,
            span,
        }
    }

    /// Width of the declared range; 1 when no range is known.
    pub fn range_width(&self) -> i32 {
        if self.range_valid {
            (self.range_left - self.range_right).abs() + 1
        } else {
            1
        }
    }

    /// Compares the scalar payload of two nodes, ignoring children,
    /// attributes, resolution state and location.
    pub fn payload_eq(&self, other: &Node) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && self.bits == other.bits
            && self.integer == other.integer
            && self.realvalue.to_bits() == other.realvalue.to_bits()
            && self.is_input == other.is_input
            && self.is_output == other.is_output
            && self.is_reg == other.is_reg
            && self.is_logic == other.is_logic
            && self.is_signed == other.is_signed
            && self.is_string == other.is_string
            && self.is_wand == other.is_wand
            && self.is_wor == other.is_wor
            && self.range_valid == other.range_valid
            && self.range_swapped == other.range_swapped
            && self.range_left == other.range_left
            && self.range_right == other.range_right
            && self.port_id == other.port_id
            && self.children.len() == other.children.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let n = Node::new(NodeKind::Wire, Span::DUMMY);
        assert_eq!(n.range_left, -1);
        assert!(!n.range_valid);
        assert_eq!(n.range_width(), 1);
        assert!(n.id2ast.is_none());
    }

    #[test]
    fn range_width_handles_swapped() {
        let mut n = Node::new(NodeKind::Wire, Span::DUMMY);
        n.range_valid = true;
        n.range_left = 0;
        n.range_right = 7;
        assert_eq!(n.range_width(), 8);
    }

    #[test]
    fn node_id_serde() {
        let id = NodeId::from_raw(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<NodeId>(&json).unwrap(), id);
    }
}
