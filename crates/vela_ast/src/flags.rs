//! Lvalue and parameter context flags.
//!
//! Every node records whether it sits in an lvalue position and whether it
//! is evaluated as a constant (parameter values, ranges, generate
//! conditions). The effective flags combine what is inherited from the parent
//! with what the node's own kind imposes on its children.

use crate::kind::NodeKind;
use crate::node::NodeId;
use crate::tree::Ast;

impl Ast {
    /// Sets the inherited lvalue flag of `id`, re-deriving its subtree when it
    /// changes unless `no_descend` is set.
    pub fn set_in_lvalue_flag(&mut self, id: NodeId, flag: bool, no_descend: bool) {
        if flag != self[id].in_lvalue_from_above {
            self[id].in_lvalue_from_above = flag;
            if !no_descend {
                self.fixup_hierarchy_flags(id, false);
            }
        }
    }

    /// Sets the inherited parameter flag of `id`, re-deriving its subtree
    /// when it changes unless `no_descend` is set.
    pub fn set_in_param_flag(&mut self, id: NodeId, flag: bool, no_descend: bool) {
        if flag != self[id].in_param_from_above {
            self[id].in_param_from_above = flag;
            if !no_descend {
                self.fixup_hierarchy_flags(id, false);
            }
        }
    }

    /// Recomputes the effective flags of `id` and pushes the inherited part
    /// down to its children.
    ///
    /// With `force_descend` every node of the subtree is visited; otherwise
    /// only subtrees whose inherited flags changed are.
    pub fn fixup_hierarchy_flags(&mut self, id: NodeId, force_descend: bool) {
        let kind = self[id].kind;
        let children = self[id].children.clone();
        let attributes: Vec<NodeId> = self[id].attributes.values().copied().collect();
        let no_descend = force_descend;

        let mut in_param = self[id].in_param_from_above;
        match kind {
            NodeKind::Parameter
            | NodeKind::Localparam
            | NodeKind::Defparam
            | NodeKind::Paraset
            | NodeKind::Prefix => {
                in_param = true;
                for &child in &children {
                    self.set_in_param_flag(child, true, no_descend);
                }
            }
            NodeKind::Replicate | NodeKind::Wire | NodeKind::GenIf | NodeKind::GenCase => {
                for &child in &children {
                    self.set_in_param_flag(child, in_param, no_descend);
                }
                if let Some(&first) = children.first() {
                    self.set_in_param_flag(first, true, no_descend);
                }
            }
            NodeKind::GenFor | NodeKind::For => {
                for &child in &children {
                    self.set_in_param_flag(child, in_param, no_descend);
                }
                if let Some(&cond) = children.get(1) {
                    self.set_in_param_flag(cond, true, no_descend);
                }
            }
            _ => {
                for &child in &children {
                    self.set_in_param_flag(child, in_param, no_descend);
                }
            }
        }
        self[id].in_param = in_param;
        for &attr in &attributes {
            self.set_in_param_flag(attr, true, no_descend);
        }

        let in_lvalue = self[id].in_lvalue_from_above;
        self[id].in_lvalue = in_lvalue;
        if kind.is_assignment() {
            if let Some(&lhs) = children.first() {
                self.set_in_lvalue_flag(lhs, true, no_descend);
            }
            if let Some(&rhs) = children.get(1) {
                self.set_in_lvalue_flag(rhs, in_lvalue, no_descend);
            }
        } else {
            for &child in &children {
                self.set_in_lvalue_flag(child, in_lvalue, no_descend);
            }
        }

        if force_descend {
            for child in children.into_iter().chain(attributes) {
                self.fixup_hierarchy_flags(child, true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_source::Provenance;

    #[test]
    fn assignment_lhs_is_lvalue() {
        let mut ast = Ast::new();
        let p = Provenance::internal();
        let lhs = ast.new_named(NodeKind::Identifier, "q", &p, vec![]);
        let rhs = ast.new_named(NodeKind::Identifier, "d", &p, vec![]);
        let assign = ast.new_node(NodeKind::AssignLe, &p, vec![lhs, rhs]);
        ast.fixup_hierarchy_flags(assign, true);
        assert!(ast[lhs].in_lvalue);
        assert!(!ast[rhs].in_lvalue);
    }

    #[test]
    fn parameter_value_is_in_param() {
        let mut ast = Ast::new();
        let p = Provenance::internal();
        let a = ast.new_named(NodeKind::Identifier, "A", &p, vec![]);
        let one = ast.mkconst_int(1, true, 32, &p);
        let sum = ast.new_node(NodeKind::Add, &p, vec![a, one]);
        let param = ast.new_named(NodeKind::Parameter, "P", &p, vec![sum]);
        ast.fixup_hierarchy_flags(param, true);
        assert!(ast[param].in_param);
        assert!(ast[sum].in_param);
        assert!(ast[a].in_param);
    }

    #[test]
    fn for_condition_is_in_param_only() {
        let mut ast = Ast::new();
        let p = Provenance::internal();
        let init = ast.new_node(NodeKind::AssignEq, &p, vec![]);
        let cond = ast.new_named(NodeKind::Identifier, "c", &p, vec![]);
        let step = ast.new_node(NodeKind::AssignEq, &p, vec![]);
        let body = ast.new_node(NodeKind::Block, &p, vec![]);
        let for_loop = ast.new_node(NodeKind::For, &p, vec![init, cond, step, body]);
        ast.fixup_hierarchy_flags(for_loop, true);
        assert!(ast[cond].in_param);
        assert!(!ast[body].in_param);
    }

    #[test]
    fn local_fixup_propagates_changes() {
        let mut ast = Ast::new();
        let p = Provenance::internal();
        let inner = ast.new_named(NodeKind::Identifier, "x", &p, vec![]);
        let neg = ast.new_node(NodeKind::Neg, &p, vec![inner]);
        ast.set_in_param_flag(neg, true, false);
        assert!(ast[neg].in_param);
        assert!(ast[inner].in_param);
    }
}
