//! Unrolling of procedural `for`, `while` and `repeat` loops.
//!
//! A loop is replaced by a block holding one copy of its body per iteration.
//! Loop conditions are evaluated against the values of variables assigned
//! constants earlier in the same block ([`KnownValues`]), and reads of those
//! variables inside the copies are replaced by the constants. The variable of
//! a `for` loop only exists at elaboration time and is never assigned in the
//! unrolled block.

use std::collections::{HashMap, HashSet};

use vela_ast::{NodeId, NodeKind};
use vela_common::{calc, LogicVec};

use super::Simplifier;
use crate::errors::{error_unsupported, fatal, ElabResult, E303};

/// The value of a variable at the current point of a block.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct KnownValue {
    pub bits: LogicVec,
    pub signed: bool,
}

/// Variables with a statically known value, by name.
pub(crate) type KnownValues = HashMap<String, KnownValue>;

impl Simplifier<'_, '_> {
    /// Unrolls every loop in the procedural block `block`.
    pub(crate) fn unroll_loops(&mut self, block: NodeId) -> ElabResult<bool> {
        let mut known = KnownValues::new();
        self.walk_stmt(block, &mut known, false)
    }

    /// Tracks the variables `stmt` assigns and unrolls loops inside it. With
    /// `substitute` set, reads of known variables are replaced by constants.
    fn walk_stmt(&mut self, stmt: NodeId, known: &mut KnownValues, substitute: bool) -> ElabResult<bool> {
        let mut changed = false;
        match self.ast.kind(stmt) {
            NodeKind::Block => {
                let mut i = 0;
                while let Some(child) = self.ast.child(stmt, i) {
                    if matches!(self.ast.kind(child), NodeKind::For | NodeKind::While | NodeKind::Repeat) {
                        let unrolled = self.unroll_loop(child, known)?;
                        self.ast.replace_child(stmt, i, unrolled);
                        self.ast.fixup_hierarchy_flags(unrolled, true);
                        changed = true;
                    } else {
                        changed |= self.walk_stmt(child, known, substitute)?;
                    }
                    i += 1;
                }
            }
            NodeKind::AssignEq => {
                let (Some(lhs), Some(rhs)) = (self.ast.child(stmt, 0), self.ast.child(stmt, 1)) else {
                    return Ok(false);
                };
                if substitute {
                    changed |= self.substitute_lvalue_selects(lhs, known);
                    changed |= self.substitute_reads(rhs, known);
                }
                let plain = self.ast.kind(lhs) == NodeKind::Identifier && self.ast.children(lhs).is_empty();
                if plain {
                    let name = self.ast[lhs].name.clone();
                    match self.assigned_value(lhs, rhs, known)? {
                        Some(value) => {
                            known.insert(name, value);
                        }
                        None => {
                            known.remove(&name);
                        }
                    }
                } else {
                    for name in self.assigned_names(stmt) {
                        known.remove(&name);
                    }
                }
            }
            NodeKind::AssignLe => {
                if substitute {
                    if let (Some(lhs), Some(rhs)) = (self.ast.child(stmt, 0), self.ast.child(stmt, 1)) {
                        changed |= self.substitute_lvalue_selects(lhs, known);
                        changed |= self.substitute_reads(rhs, known);
                    }
                }
            }
            NodeKind::Case => {
                let children = self.ast.children(stmt).to_vec();
                if substitute {
                    changed |= self.substitute_reads(children[0], known);
                }
                for &item in &children[1..] {
                    let parts = self.ast.children(item).to_vec();
                    let Some((&body, labels)) = parts.split_last() else {
                        continue;
                    };
                    if substitute {
                        for &label in labels {
                            changed |= self.substitute_reads(label, known);
                        }
                    }
                    let mut branch = known.clone();
                    changed |= self.walk_stmt(body, &mut branch, substitute)?;
                }
                for name in self.assigned_names(stmt) {
                    known.remove(&name);
                }
            }
            _ => {
                let assigned = self.assigned_names(stmt);
                if substitute {
                    let visible: KnownValues = known
                        .iter()
                        .filter(|(name, _)| !assigned.contains(*name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    for child in self.ast.children(stmt).to_vec() {
                        changed |= self.substitute_reads(child, &visible);
                    }
                }
                for name in assigned {
                    known.remove(&name);
                }
            }
        }
        Ok(changed)
    }

    /// The block replacing `stmt`, one body copy per iteration.
    fn unroll_loop(&mut self, stmt: NodeId, known: &mut KnownValues) -> ElabResult<NodeId> {
        let span = self.ast.span(stmt);
        let children = self.ast.children(stmt).to_vec();
        let limit = self.env.options.max_loop_iterations;
        let mut copies = Vec::new();
        let mut iterations = 0u32;
        let next_iteration = |iterations: &mut u32| -> ElabResult<()> {
            *iterations += 1;
            if *iterations > limit {
                return Err(fatal(E303, format!("loop exceeds {limit} iterations"), span));
            }
            Ok(())
        };

        match (self.ast.kind(stmt), children.as_slice()) {
            (NodeKind::For, &[init, cond, step, body]) => {
                let Some((var, init_lhs, init_rhs)) = self.loop_assignment(init) else {
                    return Err(error_unsupported("for loop initializer", span));
                };
                let Some((step_var, step_lhs, step_rhs)) = self.loop_assignment(step) else {
                    return Err(error_unsupported("for loop step", span));
                };
                if step_var != var {
                    return Err(error_unsupported(
                        &format!("for loop stepping `{step_var}` instead of `{var}`"),
                        span,
                    ));
                }
                let Some(start) = self.assigned_value(init_lhs, init_rhs, known)? else {
                    return Err(fatal(E303, "initial value of for loop is not constant", span));
                };
                known.insert(var.clone(), start);
                loop {
                    if !self.loop_condition(cond, known, "for")? {
                        break;
                    }
                    next_iteration(&mut iterations)?;
                    let index = known
                        .get(&var)
                        .map(|v| i64::from(v.bits.as_int(v.signed)))
                        .unwrap_or_default();
                    copies.push(self.body_copy(body, index, known)?);
                    let Some(next) = self.assigned_value(step_lhs, step_rhs, known)? else {
                        return Err(fatal(E303, "step of for loop is not constant", span));
                    };
                    known.insert(var.clone(), next);
                }
            }
            (NodeKind::While, &[cond, body]) => loop {
                if !self.loop_condition(cond, known, "while")? {
                    break;
                }
                next_iteration(&mut iterations)?;
                let index = i64::from(iterations) - 1;
                copies.push(self.body_copy(body, index, known)?);
            },
            (NodeKind::Repeat, &[count, body]) => {
                let Some(value) = self.eval_with_known(count, known)? else {
                    return Err(fatal(E303, "repeat count is not constant", span));
                };
                let node = &self.ast[value];
                let count = node.as_int(node.is_signed).max(0);
                self.ast.delete(value);
                for index in 0..count {
                    next_iteration(&mut iterations)?;
                    copies.push(self.body_copy(body, index, known)?);
                }
            }
            _ => return Err(error_unsupported("malformed loop", span)),
        }
        log::trace!("unrolled loop at {} into {} copies", self.loc(stmt), copies.len());
        Ok(self.mk_node(NodeKind::Block, copies, span))
    }

    /// Splits `var = expr` into its parts.
    fn loop_assignment(&self, assign: NodeId) -> Option<(String, NodeId, NodeId)> {
        if !self.ast.kind(assign).is_assignment() {
            return None;
        }
        let lhs = self.ast.child(assign, 0)?;
        let rhs = self.ast.child(assign, 1)?;
        let node = &self.ast[lhs];
        (node.kind == NodeKind::Identifier && node.children.is_empty()).then(|| (node.name.clone(), lhs, rhs))
    }

    fn loop_condition(&mut self, cond: NodeId, known: &KnownValues, what: &str) -> ElabResult<bool> {
        let Some(value) = self.eval_with_known(cond, known)? else {
            return Err(fatal(
                E303,
                format!("{what} loop condition is not constant"),
                self.ast.span(cond),
            ));
        };
        let taken = self.ast[value].as_bool();
        self.ast.delete(value);
        Ok(taken)
    }

    /// A copy of the loop body for one iteration, with known values
    /// substituted and nested loops unrolled. A named body is renamed
    /// `name[index]`.
    fn body_copy(&mut self, body: NodeId, index: i64, known: &mut KnownValues) -> ElabResult<NodeId> {
        let copy = self.ast.clone_subtree(body);
        self.ast.fixup_hierarchy_flags(copy, true);
        if !self.ast[copy].name.is_empty() {
            let name = format!("{}[{index}]", self.ast[copy].name);
            self.ast[copy].name = name;
        }
        self.walk_stmt(copy, known, true)?;
        Ok(copy)
    }

    /// The value `lhs = rhs` stores, sized to the variable.
    fn assigned_value(&mut self, lhs: NodeId, rhs: NodeId, known: &KnownValues) -> ElabResult<Option<KnownValue>> {
        let Some(value) = self.eval_with_known(rhs, known)? else {
            return Ok(None);
        };
        let node = &self.ast[value];
        if node.is_const() != 1 {
            self.ast.delete(value);
            return Ok(None);
        }
        let (bits, value_signed) = (node.bits.clone(), node.is_signed);
        self.ast.delete(value);
        let target = match self.lookup(&self.ast[lhs].name) {
            Some(decl) => self.detect_decl(decl, lhs)?,
            None => None,
        };
        Ok(Some(match target {
            Some((width, signed)) => KnownValue {
                bits: calc::extend_u0(&bits, width, value_signed),
                signed,
            },
            None => KnownValue {
                bits,
                signed: value_signed,
            },
        }))
    }

    fn detect_decl(&mut self, decl: NodeId, lhs: NodeId) -> ElabResult<Option<(u32, bool)>> {
        if !matches!(self.ast.kind(decl), NodeKind::Wire | NodeKind::Autowire) {
            return Ok(None);
        }
        self.prepare_decl(decl)?;
        self.ast[lhs].id2ast = Some(decl);
        let sw = self.detect(lhs)?;
        Ok(Some((sw.width, sw.signed)))
    }

    /// Folds a copy of `expr` with the known variables substituted.
    pub(crate) fn eval_with_known(&mut self, expr: NodeId, known: &KnownValues) -> ElabResult<Option<NodeId>> {
        let copy = self.ast.clone_subtree(expr);
        self.ast.fixup_hierarchy_flags(copy, true);
        self.substitute_reads(copy, known);
        let value = self.eval_copy(copy);
        self.ast.delete(copy);
        value
    }

    /// Replaces reads of known variables under `expr` with constants.
    fn substitute_reads(&mut self, expr: NodeId, known: &KnownValues) -> bool {
        if known.is_empty() {
            return false;
        }
        let node = &self.ast[expr];
        if node.kind == NodeKind::Identifier && node.children.is_empty() {
            let span = node.span;
            let Some(value) = known.get(&node.name) else {
                return false;
            };
            let constant = self.mk_bits(value.bits.clone(), value.signed, span);
            self.ast.replace_node(expr, constant);
            return true;
        }
        let mut changed = false;
        for child in self.ast.children(expr).to_vec() {
            changed |= self.substitute_reads(child, known);
        }
        changed
    }

    fn substitute_lvalue_selects(&mut self, lhs: NodeId, known: &KnownValues) -> bool {
        let mut changed = false;
        for child in self.ast.children(lhs).to_vec() {
            changed |= match self.ast.kind(lhs) {
                NodeKind::Concat => self.substitute_lvalue_selects(child, known),
                _ => self.substitute_reads(child, known),
            };
        }
        changed
    }

    /// Names of the variables assigned anywhere under `stmt`.
    pub(crate) fn assigned_names(&self, stmt: NodeId) -> HashSet<String> {
        fn lvalue_names(ast: &vela_ast::Ast, lhs: NodeId, out: &mut HashSet<String>) {
            match ast.kind(lhs) {
                NodeKind::Identifier => {
                    out.insert(ast[lhs].name.clone());
                }
                NodeKind::Concat => {
                    for &part in ast.children(lhs) {
                        lvalue_names(ast, part, out);
                    }
                }
                _ => {}
            }
        }
        let mut names = HashSet::new();
        for id in self.ast.descendants(stmt) {
            if self.ast.kind(id).is_assignment() {
                if let Some(lhs) = self.ast.child(id, 0) {
                    lvalue_names(self.ast, lhs, &mut names);
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use vela_ast::{Ast, Builder, NodeKind};

    use crate::errors::E303;
    use crate::simplify::tests::{simplified, Fixture};

    /// `always @* begin <stmts> end` in a module with `reg [7:0] y`.
    fn module_with(b: &mut Builder, stmts: Vec<vela_ast::NodeId>) -> (vela_ast::NodeId, vela_ast::NodeId) {
        let y = b.reg("y", 8);
        let i = b.reg("i", 32);
        let body = b.block(stmts);
        let proc = b.always(vec![], body);
        let m = b.module("m", vec![y, i, proc]);
        (m, body)
    }

    fn count_kind(ast: &Ast, root: vela_ast::NodeId, kind: NodeKind) -> usize {
        ast.descendants(root).into_iter().filter(|&d| ast.kind(d) == kind).count()
    }

    #[test]
    fn for_loop_is_unrolled_with_constant_indices() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let lhs0 = b.ident("i");
        let zero = b.int(0);
        let init = b.blocking(lhs0, zero);
        let ci = b.ident("i");
        let four = b.int(4);
        let cond = b.binop(NodeKind::Lt, ci, four);
        let si = b.ident("i");
        let si2 = b.ident("i");
        let one = b.int(1);
        let inc = b.binop(NodeKind::Add, si2, one);
        let step = b.blocking(si, inc);
        let bit = b.ident("i");
        let target = b.index("y", bit);
        let value = b.sized(1, 1);
        let assign = b.blocking(target, value);
        let lp = b.for_loop(init, cond, step, assign);
        let (m, body) = module_with(&mut b, vec![lp]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        assert_eq!(count_kind(&ast, body, NodeKind::For), 0);
        assert_eq!(count_kind(&ast, body, NodeKind::AssignEq), 4);
    }

    #[test]
    fn while_condition_uses_earlier_constant_assignments() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let i0 = b.ident("i");
        let zero = b.int(0);
        let init = b.blocking(i0, zero);
        let ci = b.ident("i");
        let three = b.int(3);
        let cond = b.binop(NodeKind::Lt, ci, three);
        let si = b.ident("i");
        let si2 = b.ident("i");
        let one = b.int(1);
        let inc = b.binop(NodeKind::Add, si2, one);
        let step = b.blocking(si, inc);
        let lp = b.while_loop(cond, step);
        let (m, body) = module_with(&mut b, vec![init, lp]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        assert_eq!(count_kind(&ast, body, NodeKind::While), 0);
        // the initial assignment plus one increment per iteration
        assert_eq!(count_kind(&ast, body, NodeKind::AssignEq), 4);
    }

    #[test]
    fn repeat_with_constant_count() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let count = b.int(5);
        let y = b.ident("y");
        let value = b.sized(8, 1);
        let assign = b.blocking(y, value);
        let lp = b.repeat(count, assign);
        let (m, body) = module_with(&mut b, vec![lp]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        assert_eq!(count_kind(&ast, body, NodeKind::AssignEq), 5);
    }

    #[test]
    fn loop_over_a_signal_is_fatal() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let cond = b.ident("y");
        let y = b.ident("y");
        let zero = b.sized(8, 0);
        let assign = b.blocking(y, zero);
        let lp = b.while_loop(cond, assign);
        let (m, _) = module_with(&mut b, vec![lp]);
        let fx = Fixture::new();
        let err = simplified(&mut ast, m, &fx).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, E303);
    }

    #[test]
    fn runaway_loop_hits_the_iteration_limit() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let count = b.int(100);
        let y = b.ident("y");
        let value = b.sized(8, 1);
        let assign = b.blocking(y, value);
        let lp = b.repeat(count, assign);
        let (m, _) = module_with(&mut b, vec![lp]);
        let mut fx = Fixture::new();
        fx.options.max_loop_iterations = 10;
        let err = simplified(&mut ast, m, &fx).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, E303);
    }
}
