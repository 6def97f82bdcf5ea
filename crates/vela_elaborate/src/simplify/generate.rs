//! Generate constructs, gate primitives, `defparam` and instance arrays.
//!
//! Every construct here is replaced by the module items it stands for. Items
//! coming out of a named generate block are renamed `label.name`, and those
//! of a loop iteration `label[index].name`, so that they stay unique in the
//! flat module scope.

use std::collections::HashSet;

use vela_ast::{Ast, NodeId, NodeKind};
use vela_common::{calc, Logic, LogicVec};

use super::Simplifier;
use crate::context::declare_children;
use crate::errors::{
    error_not_const, error_range_not_const, error_unresolved, error_unsupported, fatal, ElabResult,
    E303, E316,
};

/// Names unnamed generate blocks `genblk<n>`, numbering the generate
/// constructs of each scope from 1 and skipping names already in use.
pub(crate) fn label_genblks(ast: &mut Ast, id: NodeId, existing: &mut HashSet<String>, counter: &mut i32) {
    match ast.kind(id) {
        NodeKind::GenIf | NodeKind::GenFor | NodeKind::GenCase => {
            *counter += 1;
            for child in ast.children(id).to_vec() {
                label_genblks(ast, child, existing, counter);
            }
        }
        NodeKind::GenBlock => {
            let mut padding = 0;
            while ast[id].name.is_empty() {
                let candidate = format!("genblk{}{}", "0".repeat(padding), counter);
                if !existing.contains(&candidate) {
                    ast[id].name = candidate;
                }
                padding += 1;
            }
            let mut existing_local = existing.clone();
            let mut counter_local = 0;
            for child in ast.children(id).to_vec() {
                label_genblks(ast, child, &mut existing_local, &mut counter_local);
            }
        }
        _ => {
            if ast[id].name.starts_with("genblk") {
                existing.insert(ast[id].name.clone());
            }
            for child in ast.children(id).to_vec() {
                label_genblks(ast, child, existing, counter);
            }
        }
    }
}

impl Simplifier<'_, '_> {
    /// Renames the declarations of the block at `node` to `prefix + name`
    /// and the references to them, registering the new names in scope.
    /// Named nested blocks only have their own name prefixed; their contents
    /// are renamed when they are expanded.
    pub(crate) fn expand_genblock(&mut self, node: NodeId, prefix: &str) -> ElabResult<()> {
        self.rename_reference(node, prefix);
        let children = self.ast.children(node).to_vec();
        for &child in &children {
            use NodeKind::*;
            match self.ast.kind(child) {
                Wire | Memory | Struct | Union | Parameter | Localparam | Function | Task | Cell
                | Typedef | EnumItem | Genvar => self.prefix_node(child, prefix),
                Block | GenBlock if !self.ast[child].name.is_empty() => self.prefix_node(child, prefix),
                Enum => {
                    for item in self.ast.children(child).to_vec() {
                        self.prefix_node(item, prefix);
                    }
                }
                _ => {}
            }
        }
        for child in children {
            let kind = self.ast.kind(child);
            if matches!(kind, NodeKind::Function | NodeKind::Task) {
                continue;
            }
            if matches!(kind, NodeKind::Block | NodeKind::GenBlock) && !self.ast[child].name.is_empty() {
                continue;
            }
            self.expand_genblock(child, prefix)?;
        }
        Ok(())
    }

    /// Points a reference at the innermost prefixed declaration it names.
    fn rename_reference(&mut self, node: NodeId, prefix: &str) {
        use NodeKind::*;
        if !matches!(self.ast.kind(node), Identifier | FCall | TCall | WireType | Prefix) {
            return;
        }
        let name = self.ast[node].name.clone();
        if name.is_empty() || name.starts_with('$') {
            return;
        }
        let scopes: Vec<usize> = prefix
            .match_indices('.')
            .map(|(i, _)| i)
            .filter(|&i| i > 0)
            .collect();
        for &ppos in scopes.iter().rev() {
            let new_prefix = &prefix[..=ppos];
            let full = format!("{new_prefix}{name}");
            if self.ctx.scope.contains_key(&full) {
                self.set_reference_name(node, full);
                return;
            }
            for (spos, _) in name.rmatch_indices('.') {
                if spos == 0 {
                    continue;
                }
                let candidate = format!("{new_prefix}{}", &name[..spos]);
                if self.ctx.scope.contains_key(&candidate) {
                    let renamed = format!("{candidate}{}", &name[spos..]);
                    self.set_reference_name(node, renamed);
                    return;
                }
            }
        }
    }

    fn set_reference_name(&mut self, node: NodeId, name: String) {
        let n = &mut self.ast[node];
        n.name = name;
        n.id2ast = None;
    }

    fn prefix_node(&mut self, child: NodeId, prefix: &str) {
        let old = self.ast[child].name.clone();
        if old.is_empty() {
            return;
        }
        let new_name = format!("{prefix}{old}");
        if self.ast.kind(child) == NodeKind::Function {
            for id in self.ast.descendants(child) {
                let n = &self.ast[id];
                let is_result = n.kind == NodeKind::Wire && n.name == old;
                let is_ref = n.kind == NodeKind::Identifier && n.name == old;
                if is_result || is_ref {
                    self.ast[id].name = new_name.clone();
                    self.ast[id].id2ast = None;
                }
            }
        }
        self.ast[child].name = new_name.clone();
        self.ctx.declare(new_name, child);
    }

    /// Expands a generate construct into the module items it selects.
    pub(crate) fn expand_generate(&mut self, item: NodeId) -> ElabResult<Vec<NodeId>> {
        match self.ast.kind(item) {
            NodeKind::GenFor => self.expand_genfor(item),
            NodeKind::GenIf => self.expand_genif(item),
            NodeKind::GenCase => self.expand_gencase(item),
            _ => self.genblock_items(item),
        }
    }

    /// Moves the items out of a generate block, renamed after its label.
    fn genblock_items(&mut self, block: NodeId) -> ElabResult<Vec<NodeId>> {
        let name = self.ast[block].name.clone();
        if name.is_empty() {
            declare_children(self.ast, block, &mut self.ctx.scope);
        } else {
            self.expand_genblock(block, &format!("{name}."))?;
        }
        Ok(std::mem::take(&mut self.ast[block].children))
    }

    fn expand_genif(&mut self, item: NodeId) -> ElabResult<Vec<NodeId>> {
        let span = self.ast.span(item);
        let Some(cond) = self.ast.child(item, 0) else {
            return Err(error_unsupported("generate if without a condition", span));
        };
        let Some(value) = self.eval_copy(cond)? else {
            return Err(error_not_const("generate if condition", span));
        };
        let taken = self.ast[value].as_bool();
        self.ast.delete(value);
        match self.ast.child(item, if taken { 1 } else { 2 }) {
            Some(block) => self.genblock_items(block),
            None => Ok(Vec::new()),
        }
    }

    fn expand_gencase(&mut self, item: NodeId) -> ElabResult<Vec<NodeId>> {
        let span = self.ast.span(item);
        let children = self.ast.children(item).to_vec();
        let Some((&subject, arms)) = children.split_first() else {
            return Err(error_unsupported("generate case without a subject", span));
        };
        let Some(subject) = self.eval_copy(subject)? else {
            return Err(error_not_const("generate case subject", span));
        };
        let mut chosen = None;
        let mut default = None;
        'arms: for &arm in arms {
            let parts = self.ast.children(arm).to_vec();
            let Some((&body, labels)) = parts.split_last() else {
                continue;
            };
            for &label in labels {
                if self.ast.kind(label) == NodeKind::Default {
                    default = default.or(Some(body));
                    continue;
                }
                let Some(value) = self.eval_copy(label)? else {
                    self.ast.delete(subject);
                    return Err(error_not_const("generate case label", self.ast.span(label)));
                };
                let (a, b) = (&self.ast[subject], &self.ast[value]);
                let signed = a.is_signed && b.is_signed;
                let width = a.bits.width().max(b.bits.width());
                let eq = calc::const_eq(
                    &a.bits_as_const(Some(width), signed),
                    &b.bits_as_const(Some(width), signed),
                    signed,
                    signed,
                    Some(1),
                );
                self.ast.delete(value);
                if eq.get(0) == Logic::One {
                    chosen = Some(body);
                    break 'arms;
                }
            }
        }
        self.ast.delete(subject);
        match chosen.or(default) {
            Some(block) => self.genblock_items(block),
            None => Ok(Vec::new()),
        }
    }

    fn expand_genfor(&mut self, item: NodeId) -> ElabResult<Vec<NodeId>> {
        let span = self.ast.span(item);
        let children = self.ast.children(item).to_vec();
        let [init, cond, step, body] = children.as_slice() else {
            return Err(error_unsupported("malformed generate loop", span));
        };
        let (var, init_rhs) = match (self.ast.child(*init, 0), self.ast.child(*init, 1)) {
            (Some(lhs), Some(rhs))
                if self.ast.kind(*init).is_assignment() && self.ast.kind(lhs) == NodeKind::Identifier =>
            {
                (self.ast[lhs].name.clone(), rhs)
            }
            _ => return Err(error_unsupported("generate loop initializer", span)),
        };
        let Some(step_rhs) = self.ast.child(*step, 1) else {
            return Err(error_unsupported("generate loop step", span));
        };
        let Some(start) = self.eval_copy(init_rhs)? else {
            return Err(error_not_const("generate loop initializer", span));
        };
        let varbuf = self.mk_named(NodeKind::Localparam, var.clone(), vec![start], span);
        let backup = self.ctx.scope.insert(var.clone(), varbuf);
        let result = self.genfor_iterations(varbuf, &var, *cond, step_rhs, *body);
        match backup {
            Some(prev) => self.ctx.declare(var, prev),
            None => {
                self.ctx.scope.remove(&var);
            }
        }
        self.ast.delete(varbuf);
        result
    }

    fn genfor_iterations(
        &mut self,
        varbuf: NodeId,
        var: &str,
        cond: NodeId,
        step_rhs: NodeId,
        body: NodeId,
    ) -> ElabResult<Vec<NodeId>> {
        let span = self.ast.span(cond);
        let limit = self.env.options.max_loop_iterations;
        let local_name = var.rsplit('.').next().unwrap_or(var).to_string();
        let mut items = Vec::new();
        let mut iterations = 0u32;
        loop {
            let Some(test) = self.eval_copy(cond)? else {
                return Err(fatal(E303, "condition of generate loop is not constant", span));
            };
            let taken = self.ast[test].as_bool();
            self.ast.delete(test);
            if !taken {
                break;
            }
            iterations += 1;
            if iterations > limit {
                return Err(fatal(
                    E303,
                    format!("generate loop exceeds {limit} iterations"),
                    span,
                ));
            }

            let value = self.ast.children(varbuf)[0];
            let index = self.ast[value].as_int(self.ast[value].is_signed);
            let block = self.ast.clone_subtree(body);
            self.ast.fixup_hierarchy_flags(block, true);
            let prefix = format!("{}[{index}].", self.ast[block].name);

            let local = self.ast.clone_subtree(varbuf);
            let local_full = format!("{prefix}{local_name}");
            self.ast[local].name = local_full.clone();
            self.ctx.declare(local_full, local);
            items.push(local);

            self.expand_genblock(block, &prefix)?;
            items.extend(std::mem::take(&mut self.ast[block].children));
            self.ast.delete(block);

            let Some(next) = self.eval_copy(step_rhs)? else {
                return Err(fatal(E303, "step of generate loop is not constant", span));
            };
            self.ast.replace_child(varbuf, 0, next);
        }
        Ok(items)
    }

    /// Replaces a gate primitive with continuous assignments.
    pub(crate) fn expand_primitive(&mut self, item: NodeId) -> ElabResult<Vec<NodeId>> {
        let gate = self.ast[item].name.clone();
        let span = self.ast.span(item);
        let mut terminals = Vec::new();
        for arg in self.ast.children(item).to_vec() {
            if self.ast.children(arg).is_empty() {
                return Err(fatal(E316, format!("unconnected terminal of `{gate}`"), span));
            }
            terminals.push(self.ast.take_child(arg, 0));
        }
        if terminals.len() < 2 {
            return Err(fatal(E316, format!("gate `{gate}` needs at least two terminals"), span));
        }
        let assign = |this: &mut Self, lhs: NodeId, rhs: NodeId| {
            this.ast[lhs].was_checked = true;
            this.mk_node(NodeKind::Assign, vec![lhs, rhs], span)
        };
        match gate.as_str() {
            "bufif0" | "bufif1" | "notif0" | "notif1" => {
                let [out, input, enable] = terminals.as_slice() else {
                    return Err(fatal(E316, format!("gate `{gate}` needs three terminals"), span));
                };
                let input = if gate.starts_with("notif") {
                    self.mk_node(NodeKind::BitNot, vec![*input], span)
                } else {
                    *input
                };
                let z = self.mk_bits(LogicVec::filled(1, Logic::Z), false, span);
                let branches = if gate.ends_with('0') { vec![z, input] } else { vec![input, z] };
                let mut children = vec![*enable];
                children.extend(branches);
                let mux = self.mk_node(NodeKind::Ternary, children, span);
                Ok(vec![assign(self, *out, mux)])
            }
            "buf" | "not" => {
                let Some((&input, outputs)) = terminals.split_last() else {
                    return Ok(Vec::new());
                };
                let input = if gate == "not" {
                    self.mk_node(NodeKind::BitNot, vec![input], span)
                } else {
                    input
                };
                let mut items = Vec::new();
                for &out in outputs {
                    let rhs = self.ast.clone_subtree(input);
                    items.push(assign(self, out, rhs));
                }
                self.ast.delete(input);
                Ok(items)
            }
            "and" | "nand" | "or" | "nor" | "xor" | "xnor" => {
                let op = match gate.trim_start_matches('n') {
                    "and" => NodeKind::BitAnd,
                    "or" => NodeKind::BitOr,
                    _ => NodeKind::BitXor,
                };
                let invert = matches!(gate.as_str(), "nand" | "nor" | "xnor");
                let mut expr = terminals[1];
                for &operand in &terminals[2..] {
                    expr = self.mk_node(op, vec![expr, operand], span);
                }
                if invert {
                    expr = self.mk_node(NodeKind::BitNot, vec![expr], span);
                }
                Ok(vec![assign(self, terminals[0], expr)])
            }
            _ => Err(error_unsupported(&format!("gate primitive `{gate}`"), span)),
        }
    }

    /// Applies `defparam inst.param = value` to the instance in this module.
    pub(crate) fn apply_defparam(&mut self, item: NodeId) -> ElabResult<()> {
        let path = self.ast[item].name.clone();
        let span = self.ast.span(item);
        let Some((inst, param)) = path.rsplit_once('.') else {
            return Err(error_unsupported("defparam without an instance path", span));
        };
        let cell = self
            .lookup(inst)
            .filter(|&c| self.ast.kind(c) == NodeKind::Cell);
        let Some(cell) = cell else {
            if inst.contains('.') {
                return Err(error_unsupported(
                    &format!("hierarchical defparam `{path}`"),
                    span,
                ));
            }
            return Err(error_unresolved(inst, span));
        };
        if self.ast.children(item).is_empty() {
            return Err(error_unsupported("defparam without a value", span));
        }
        let value = self.ast.take_child(item, 0);
        let Some(celltype) = self
            .ast
            .children(cell)
            .iter()
            .copied()
            .find(|&c| self.ast.kind(c) == NodeKind::CellType)
        else {
            return Err(error_unsupported("instance without a module name", span));
        };
        let existing = self
            .ast
            .children(celltype)
            .iter()
            .copied()
            .find(|&p| self.ast[p].name == param);
        match existing {
            Some(paraset) if !self.ast.children(paraset).is_empty() => {
                self.ast.replace_child(paraset, 0, value);
            }
            Some(paraset) => self.ast.push_child(paraset, value),
            None => {
                let paraset = self.mk_named(NodeKind::Paraset, param, vec![value], span);
                self.ast.push_child(celltype, paraset);
            }
        }
        self.ast.fixup_hierarchy_flags(celltype, true);
        Ok(())
    }

    /// Replaces an instance array with one instance per element, named
    /// `name[index]` and tagged with its position in the array.
    pub(crate) fn expand_cell_array(&mut self, item: NodeId) -> ElabResult<Vec<NodeId>> {
        let span = self.ast.span(item);
        let (Some(range), Some(cell)) = (self.ast.child(item, 0), self.ast.child(item, 1)) else {
            return Err(error_unsupported("malformed instance array", span));
        };
        self.simplify_range(range, 1)?;
        let r = &self.ast[range];
        if !r.range_valid {
            return Err(error_range_not_const("instance array", span));
        }
        if self.ast.kind(cell) == NodeKind::Primitive {
            return Err(error_unsupported("arrays of gate primitives", span));
        }
        let (hi, lo, swapped) = (r.range_left, r.range_right, r.range_swapped);
        let num = hi - lo + 1;
        let mut cells = Vec::new();
        for i in 0..num {
            let index = if swapped { hi - i } else { lo + i };
            let copy = self.ast.clone_subtree(cell);
            let name = format!("{}[{index}]", self.ast[copy].name);
            self.ast[copy].name = name.clone();
            let pos = self.mk_int(i64::from(i), true, 32, span);
            let count = self.mk_int(i64::from(num), true, 32, span);
            self.ast.set_attribute(copy, "$array_pos", pos);
            self.ast.set_attribute(copy, "$array_count", count);
            self.ctx.declare(name, copy);
            cells.push(copy);
        }
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use vela_ast::{Ast, Builder, NodeKind};

    use crate::simplify::tests::{simplified, Fixture};

    #[test]
    fn genfor_prefixes_each_iteration() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let gv = b.genvar("i");
        let i0 = b.ident("i");
        let zero = b.int(0);
        let init = b.blocking(i0, zero);
        let i1 = b.ident("i");
        let three = b.int(3);
        let cond = b.binop(NodeKind::Lt, i1, three);
        let i2 = b.ident("i");
        let i3 = b.ident("i");
        let one = b.int(1);
        let inc = b.binop(NodeKind::Add, i3, one);
        let step = b.blocking(i2, inc);
        let q = b.wire("q", 4);
        let lhs = b.ident("q");
        let rhs = b.ident("i");
        let a = b.assign(lhs, rhs);
        let body = b.genblock(Some("r"), vec![q, a]);
        let gen = b.genfor(init, cond, step, body);
        let m = b.module("m", vec![gv, gen]);
        let fx = Fixture::new();
        let ctx = simplified(&mut ast, m, &fx).unwrap();
        for k in 0..3 {
            assert!(ctx.scope.contains_key(&format!("r[{k}].q")));
        }
        assert!(!ctx.scope.contains_key("r[3].q"));
        let assigns: Vec<_> = ast
            .children(m)
            .iter()
            .copied()
            .filter(|&c| ast.kind(c) == NodeKind::Assign)
            .collect();
        assert_eq!(assigns.len(), 3);
        let last_rhs = ast.children(assigns[2])[1];
        assert_eq!(ast[last_rhs].as_int(false), 2);
    }

    #[test]
    fn unnamed_generate_blocks_get_unique_labels() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let one = b.int(1);
        let w1 = b.wire("a", 1);
        let g1 = b.genif(one, w1, None);
        let one2 = b.int(1);
        let w2 = b.wire("a", 1);
        let g2 = b.genif(one2, w2, None);
        let m = b.module("m", vec![g1, g2]);
        let fx = Fixture::new();
        let ctx = simplified(&mut ast, m, &fx).unwrap();
        assert!(ctx.scope.contains_key("genblk1.a"));
        assert!(ctx.scope.contains_key("genblk2.a"));
    }

    #[test]
    fn gencase_falls_back_to_default() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let two = b.int(2);
        let p = b.parameter("MODE", two);
        let subject = b.ident("MODE");
        let zero = b.int(0);
        let wa = b.wire("a", 1);
        let arm0 = b.gencase_item(vec![zero], wa);
        let wb = b.wire("b", 1);
        let arm_default = b.gencase_item(vec![], wb);
        let gen = b.gencase(subject, vec![arm0, arm_default]);
        let m = b.module("m", vec![p, gen]);
        let fx = Fixture::new();
        let ctx = simplified(&mut ast, m, &fx).unwrap();
        assert!(ctx.scope.keys().any(|k| k.ends_with(".b")));
        assert!(!ctx.scope.keys().any(|k| k.ends_with(".a")));
    }

    #[test]
    fn nand_gate_becomes_inverted_and() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let y = b.output("y", 1);
        let a = b.input("a", 1);
        let c = b.input("c", 1);
        let ty = b.ident("y");
        let ta = b.ident("a");
        let tc = b.ident("c");
        let g = b.primitive("nand", vec![ty, ta, tc]);
        let m = b.module("m", vec![y, a, c, g]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        let assign = *ast.children(m).last().unwrap();
        assert_eq!(ast.kind(assign), NodeKind::Assign);
        let rhs = ast.children(assign)[1];
        assert_eq!(ast.kind(rhs), NodeKind::BitNot);
        assert_eq!(ast.kind(ast.children(rhs)[0]), NodeKind::BitAnd);
    }

    #[test]
    fn primitive_with_one_terminal_is_rejected() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let y = b.output("y", 1);
        let ty = b.ident("y");
        let g = b.primitive("and", vec![ty]);
        let m = b.module("m", vec![y, g]);
        let fx = Fixture::new();
        let err = simplified(&mut ast, m, &fx).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, crate::errors::E316);
    }

    #[test]
    fn cell_array_expands_with_positions() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let cell = b.cell("u", "leaf", vec![], vec![]);
        let range = b.range(3, 0);
        let arr = b.cell_array(range, cell);
        let m = b.module("m", vec![arr]);
        let fx = Fixture::new();
        let ctx = simplified(&mut ast, m, &fx).unwrap();
        for k in 0..4 {
            assert!(ctx.scope.contains_key(&format!("u[{k}]")));
        }
        let first = ctx.scope["u[0]"];
        let pos = ast[first].attributes["$array_pos"];
        assert_eq!(ast[pos].as_int(true), 0);
    }

    #[test]
    fn defparam_overrides_instance_parameter() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let four = b.int(4);
        let cell = b.cell("u", "leaf", vec![("W", four)], vec![]);
        let eight = b.int(8);
        let dp = b.defparam("u.W", eight);
        let m = b.module("m", vec![cell, dp]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        let celltype = ast.children(cell)[0];
        let paraset = ast.children(celltype)[0];
        let value = ast.children(paraset)[0];
        assert_eq!(ast[value].as_int(true), 8);
        assert!(!ast.children(m).iter().any(|&c| ast.kind(c) == NodeKind::Defparam));
    }
}
