//! Name resolution inside expressions.
//!
//! Resolution binds every identifier to its declaration and performs the
//! rewrites that change which declaration a reference names: generate block
//! references (`label[i].name`), struct member accesses, selects on packed
//! multi-dimensional signals and `$signed`/`$unsigned` calls. Declarations are
//! prepared on first use, so a parameter is folded before anything reads it.

use vela_ast::{NodeId, NodeKind};
use vela_diagnostics::Diagnostic;

use super::Simplifier;
use crate::errors::{
    error_not_const, error_range_not_const, error_unresolved, error_unsupported, fatal, ElabResult,
    E301, E316, W304,
};

impl Simplifier<'_, '_> {
    /// Resolves every name in the expression at `id`. Returns true if the
    /// shape of the expression changed.
    pub(crate) fn resolve_expr(&mut self, id: NodeId) -> ElabResult<bool> {
        let mut changed = self.resolve_node(id)?;
        for child in self.ast.children(id).to_vec() {
            changed |= self.resolve_expr(child)?;
        }
        Ok(changed)
    }

    /// Resolves `id` alone, without its operands.
    pub(crate) fn resolve_node(&mut self, id: NodeId) -> ElabResult<bool> {
        let mut changed = false;
        match self.ast.kind(id) {
            NodeKind::Prefix => {
                self.rewrite_prefix(id)?;
                changed = true;
            }
            NodeKind::FCall if matches!(self.ast[id].name.as_str(), "$signed" | "$unsigned") => {
                let node = &self.ast[id];
                if node.children.len() != 1 {
                    return Err(fatal(
                        E316,
                        format!("`{}` expects exactly one argument", node.name),
                        node.span,
                    ));
                }
                let kind = if node.name == "$signed" {
                    NodeKind::ToSigned
                } else {
                    NodeKind::ToUnsigned
                };
                let node = &mut self.ast[id];
                node.kind = kind;
                node.name.clear();
                return Ok(true);
            }
            _ => {}
        }
        match self.ast.kind(id) {
            NodeKind::Identifier => changed |= self.resolve_identifier(id)?,
            NodeKind::FCall => self.resolve_call(id)?,
            _ => {}
        }
        Ok(changed)
    }

    fn resolve_identifier(&mut self, id: NodeId) -> ElabResult<bool> {
        let name = self.ast[id].name.clone();
        if name.is_empty() {
            return Ok(false);
        }
        if let Some(decl) = self.lookup(&name) {
            self.ast[id].id2ast = Some(decl);
            self.prepare_decl(decl)?;
            return self.flatten_packed_select(id, decl);
        }
        if self.rewrite_struct_member(id, &name)? {
            return Ok(true);
        }
        if self.env.options.autowire && !self.ast[id].in_param {
            self.declare_autowire(id, &name);
            return Ok(true);
        }
        Err(error_unresolved(&name, self.ast[id].span))
    }

    fn resolve_call(&mut self, id: NodeId) -> ElabResult<()> {
        let name = self.ast[id].name.clone();
        if name.starts_with('$') {
            return Ok(());
        }
        let func = self
            .lookup(&name)
            .filter(|&f| matches!(self.ast.kind(f), NodeKind::Function | NodeKind::DpiFunction));
        let Some(func) = func else {
            return Err(error_unresolved(&name, self.ast[id].span));
        };
        self.ast[id].id2ast = Some(func);
        if let Some(result) = self.ast.child(func, 0) {
            if self.ast.kind(result) == NodeKind::Wire && !self.ast[result].range_valid {
                self.simplify_wire(result, 1)?;
            }
        }
        Ok(())
    }

    /// Folds what a reference to `decl` needs: parameter values and
    /// declared ranges.
    pub(crate) fn prepare_decl(&mut self, decl: NodeId) -> ElabResult<()> {
        let node = &self.ast[decl];
        match node.kind {
            NodeKind::Parameter | NodeKind::Localparam => {
                let done = node.children.first().is_some_and(|&v| self.ast[v].is_const() > 0)
                    && (node.children.len() < 2 || node.range_valid);
                if !done {
                    self.simplify_param(decl)?;
                }
            }
            NodeKind::EnumItem => self.fold_enum_item(decl)?,
            NodeKind::Wire | NodeKind::Autowire if !node.range_valid => {
                self.simplify_wire(decl, 1)?;
            }
            NodeKind::Memory if !node.range_valid => {
                self.simplify_memory(decl, 1)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// `label[index].name` becomes the identifier `label[<value>].name`.
    fn rewrite_prefix(&mut self, id: NodeId) -> ElabResult<()> {
        let span = self.ast[id].span;
        let (Some(index), Some(member)) = (self.ast.child(id, 0), self.ast.child(id, 1)) else {
            return Err(error_unsupported("malformed generate block reference", span));
        };
        self.resolve_expr(index)?;
        self.fold_fully(index, None, false)?;
        let index_node = &self.ast[index];
        if index_node.kind != NodeKind::Constant {
            return Err(error_not_const("generate block index", span));
        }
        let value = index_node.as_int(index_node.is_signed);
        let name = format!("{}[{}].{}", self.ast[id].name, value, self.ast[member].name);
        let member = self.ast.take_child(id, 1);
        self.ast[member].name = name;
        self.ast[member].id2ast = None;
        self.ast.replace_node(id, member);
        Ok(())
    }

    /// Rewrites `s.f` on a packed struct signal `s` into a part select of `s`.
    fn rewrite_struct_member(&mut self, id: NodeId, name: &str) -> ElabResult<bool> {
        let span = self.ast[id].span;
        for (pos, _) in name.rmatch_indices('.') {
            let (base, member) = (&name[..pos], &name[pos + 1..]);
            let Some(&layout) = self.ctx.struct_wires.get(base) else {
                continue;
            };
            let Some(wire) = self.lookup(base) else {
                continue;
            };
            let Some((lsb, width)) = self.struct_member_layout(layout, member)? else {
                return Err(error_unresolved(name, span));
            };
            let selects = self.ast[id].children.clone();
            let range = match selects.as_slice() {
                [] => self.mk_range(lsb + width - 1, lsb, span),
                [select] => {
                    let mut shifted = Vec::new();
                    while !self.ast.children(*select).is_empty() {
                        let bound = self.ast.take_child(*select, 0);
                        let offset = self.mk_int(lsb, true, 32, span);
                        shifted.push(self.mk_node(NodeKind::Add, vec![bound, offset], span));
                    }
                    self.ast.delete(*select);
                    self.mk_node(NodeKind::Range, shifted, span)
                }
                _ => return Err(error_unsupported("multiple selects on a struct member", span)),
            };
            let node = &mut self.ast[id];
            node.name = base.to_string();
            node.id2ast = Some(wire);
            node.children = vec![range];
            self.ast.fixup_hierarchy_flags(id, true);
            return Ok(true);
        }
        Ok(false)
    }

    /// Maps selects on a signal with several packed dimensions onto its
    /// flattened bit range. Dimensions are descending and the innermost
    /// dimension varies fastest.
    fn flatten_packed_select(&mut self, id: NodeId, decl: NodeId) -> ElabResult<bool> {
        let d = &self.ast[decl];
        if d.kind != NodeKind::Wire || d.dimensions.len() < 2 || self.ast[id].basic_prep {
            return Ok(false);
        }
        let dims = d.dimensions.clone();
        let selects = self.ast[id].children.clone();
        let span = self.ast[id].span;
        self.ast[id].basic_prep = true;
        if selects.is_empty() {
            return Ok(false);
        }
        if dims.iter().any(|dim| dim.range_swapped) {
            return Err(error_unsupported("select on ascending packed dimensions", span));
        }
        if selects.len() > dims.len() {
            return Err(fatal(
                E301,
                format!("too many selects on `{}`", self.ast[id].name),
                span,
            ));
        }
        let strides: Vec<i64> = (0..dims.len())
            .map(|k| dims[k + 1..].iter().map(|dim| i64::from(dim.range_width)).product())
            .collect();

        let mut base: Option<NodeId> = None;
        let last = selects.len() - 1;
        for (k, &select) in selects.iter().enumerate().take(last) {
            if self.ast.children(select).len() != 1 {
                return Err(error_unsupported("part select on an outer packed dimension", span));
            }
            let index = self.ast.take_child(select, 0);
            let term = self.scaled_offset(index, i64::from(dims[k].range_right), strides[k], span);
            base = Some(self.sum(base, term, span));
        }
        let select = selects[last];
        let bounds: Vec<NodeId> = std::mem::take(&mut self.ast[select].children);
        let right = i64::from(dims[last].range_right);
        let range = match bounds.as_slice() {
            [index] if last + 1 == dims.len() => {
                let term = self.scaled_offset(*index, right, 1, span);
                let bit = self.sum(base, term, span);
                self.mk_node(NodeKind::Range, vec![bit], span)
            }
            [index] => {
                let term = self.scaled_offset(*index, right, strides[last], span);
                let lsb = self.sum(base, term, span);
                let msb_base = self.ast.clone_subtree(lsb);
                let top = self.mk_int(strides[last] - 1, true, 32, span);
                let msb = self.mk_node(NodeKind::Add, vec![msb_base, top], span);
                self.mk_node(NodeKind::Range, vec![msb, lsb], span)
            }
            [msb, lsb] if last + 1 == dims.len() => {
                let msb_term = self.scaled_offset(*msb, right, 1, span);
                let lsb_term = self.scaled_offset(*lsb, right, 1, span);
                let base_copy = match base {
                    Some(b) => Some(self.ast.clone_subtree(b)),
                    None => None,
                };
                let msb = self.sum(base, msb_term, span);
                let lsb = self.sum(base_copy, lsb_term, span);
                self.mk_node(NodeKind::Range, vec![msb, lsb], span)
            }
            _ => return Err(error_range_not_const("packed select", span)),
        };
        for select in selects {
            self.ast.delete(select);
        }
        self.ast[id].children = vec![range];
        self.ast.fixup_hierarchy_flags(id, true);
        Ok(true)
    }

    /// `(index - right) * stride`.
    fn scaled_offset(&mut self, index: NodeId, right: i64, stride: i64, span: vela_source::Span) -> NodeId {
        let right = self.mk_int(right, true, 32, span);
        let offset = self.mk_node(NodeKind::Sub, vec![index, right], span);
        if stride == 1 {
            return offset;
        }
        let stride = self.mk_int(stride, true, 32, span);
        self.mk_node(NodeKind::Mul, vec![offset, stride], span)
    }

    fn sum(&mut self, base: Option<NodeId>, term: NodeId, span: vela_source::Span) -> NodeId {
        match base {
            Some(base) => self.mk_node(NodeKind::Add, vec![base, term], span),
            None => term,
        }
    }

    fn declare_autowire(&mut self, id: NodeId, name: &str) {
        let span = self.ast[id].span;
        let wire = self.mk_named(NodeKind::Autowire, name, Vec::new(), span);
        let node = &mut self.ast[wire];
        node.range_valid = true;
        node.range_left = 0;
        node.range_right = 0;
        self.add_module_item(wire);
        self.ast[id].id2ast = Some(wire);
        self.warn(Diagnostic::warning(
            W304,
            format!("identifier `{name}` is implicitly declared"),
            span,
        ));
    }
}
