//! Declarations: ranges, signals, memories, parameters and user types.

use vela_ast::{Dimension, NodeId, NodeKind};
use vela_common::{calc, InternalError, LogicVec};

use super::Simplifier;
use crate::context::is_declaration;
use crate::errors::{
    error_not_const, error_range_not_const, error_unresolved, error_unsupported, fatal, ElabResult,
    E301, E302, E312,
};

fn const_bound(ast: &vela_ast::Ast, id: NodeId) -> Option<i64> {
    let node = &ast[id];
    (node.kind == NodeKind::Constant).then(|| node.as_int(node.is_signed))
}

impl Simplifier<'_, '_> {
    /// Folds the bounds of a `Range` and records them once both are known.
    pub(crate) fn simplify_range(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let mut changed = false;
        let children = self.ast.children(id).to_vec();
        for &child in &children {
            changed |= self.simplify(child, true, stage, None, false)?;
        }
        let bounds: Vec<Option<i64>> = children.iter().map(|&c| const_bound(self.ast, c)).collect();
        let (left, right) = match bounds.as_slice() {
            [Some(l)] => (*l, *l),
            [Some(l), Some(r)] => (*l, *r),
            _ => return Ok(changed),
        };
        for bound in [left, right] {
            if i32::try_from(bound).is_err() {
                return Err(fatal(
                    E301,
                    format!("range bound {bound} is out of bounds"),
                    self.ast.span(id),
                ));
            }
        }
        let (hi, lo, swapped) = if right > left {
            (right as i32, left as i32, true)
        } else {
            (left as i32, right as i32, false)
        };
        let node = &mut self.ast[id];
        if !node.range_valid || node.range_left != hi || node.range_right != lo || node.range_swapped != swapped {
            node.range_valid = true;
            node.range_left = hi;
            node.range_right = lo;
            node.range_swapped = swapped;
            changed = true;
        }
        Ok(changed)
    }

    /// Sizes a signal declaration. A signal with an unpacked dimension
    /// becomes a memory.
    pub(crate) fn simplify_wire(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let mut changed = false;
        if self.ast[id].is_custom_type {
            self.resolve_wire_type(id)?;
            changed = true;
        }
        let children = self.ast.children(id).to_vec();
        for &child in &children {
            match self.ast.kind(child) {
                NodeKind::Range => changed |= self.simplify_range(child, stage)?,
                NodeKind::Multirange => {
                    for sub in self.ast.children(child).to_vec() {
                        changed |= self.simplify_range(sub, stage)?;
                    }
                }
                _ => {}
            }
        }

        let name = self.ast[id].name.clone();
        let unpacked_count = self.ast[id].unpacked_dimensions.min(children.len());
        let packed = children.len() - unpacked_count;
        if unpacked_count > 1 {
            return Err(fatal(
                E312,
                format!("multi-dimensional memory `{name}` is not supported"),
                self.ast.span(id),
            ));
        }

        let span = self.ast.span(id);
        let mut dims = self.ast[id].dimensions.clone();
        let (left, right, swapped) = match children.first().filter(|_| packed > 0) {
            None => (0, 0, false),
            Some(&first) if self.ast.kind(first) == NodeKind::Multirange => {
                let mut packed_dims = Vec::new();
                for sub in self.ast.children(first).to_vec() {
                    let r = &self.ast[sub];
                    if !r.range_valid {
                        return Err(error_range_not_const(&format!("signal `{name}`"), span));
                    }
                    packed_dims.push(Dimension {
                        range_right: r.range_right,
                        range_width: r.range_width(),
                        range_swapped: r.range_swapped,
                    });
                }
                let total: i64 = packed_dims.iter().map(|d| i64::from(d.range_width)).product();
                let flat = self.mk_range(total - 1, 0, span);
                self.ast.replace_child(id, 0, flat);
                dims = packed_dims;
                changed = true;
                (total as i32 - 1, 0, false)
            }
            Some(&first) if self.ast.kind(first) == NodeKind::Range => {
                let r = &self.ast[first];
                if !r.range_valid {
                    return Err(error_range_not_const(&format!("signal `{name}`"), span));
                }
                let dim = Dimension {
                    range_right: r.range_right,
                    range_width: r.range_width(),
                    range_swapped: r.range_swapped,
                };
                let fields = (r.range_left, r.range_right, r.range_swapped);
                if dims.len() <= 1 {
                    dims = vec![dim];
                }
                fields
            }
            Some(_) => (0, 0, false),
        };

        if unpacked_count == 1 {
            let addr = self.ast.take_child(id, children.len() - 1);
            let word = if packed > 0 {
                self.ast.take_child(id, 0)
            } else {
                self.mk_range(0, 0, span)
            };
            self.ast.delete_children(id);
            let node = &mut self.ast[id];
            node.kind = NodeKind::Memory;
            node.children = vec![word, addr];
            node.unpacked_dimensions = 0;
            node.dimensions.clear();
            node.is_reg = true;
            node.range_valid = false;
            self.ast.fixup_hierarchy_flags(id, true);
            self.simplify_memory(id, stage)?;
            return Ok(true);
        }

        let node = &mut self.ast[id];
        if !node.range_valid
            || node.range_left != left
            || node.range_right != right
            || node.range_swapped != swapped
            || node.dimensions != dims
        {
            node.range_valid = true;
            node.range_left = left;
            node.range_right = right;
            node.range_swapped = swapped;
            node.dimensions = dims;
            changed = true;
        }
        Ok(changed)
    }

    /// Sizes a memory from its word and address ranges.
    pub(crate) fn simplify_memory(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let name = self.ast[id].name.clone();
        let span = self.ast.span(id);
        let (Some(word), Some(addr)) = (self.ast.child(id, 0), self.ast.child(id, 1)) else {
            return Err(fatal(
                E312,
                format!("memory `{name}` needs a word and an address range"),
                span,
            ));
        };
        let mut changed = self.simplify_range(word, stage)?;
        changed |= self.simplify_range(addr, stage)?;
        if !self.ast[word].range_valid || !self.ast[addr].range_valid {
            return Err(error_range_not_const(&format!("memory `{name}`"), span));
        }
        let dim = |ast: &vela_ast::Ast, r: NodeId| Dimension {
            range_right: ast[r].range_right,
            range_width: ast[r].range_width(),
            range_swapped: ast[r].range_swapped,
        };
        let dims = vec![dim(self.ast, addr), dim(self.ast, word)];
        let (left, right, swapped) = {
            let w = &self.ast[word];
            (w.range_left, w.range_right, w.range_swapped)
        };
        let node = &mut self.ast[id];
        if !node.range_valid || node.dimensions != dims {
            node.range_valid = true;
            node.range_left = left;
            node.range_right = right;
            node.range_swapped = swapped;
            node.dimensions = dims;
            node.unpacked_dimensions = 1;
            changed = true;
        }
        Ok(changed)
    }

    /// Folds the value of a parameter to a constant of its declared width.
    pub(crate) fn simplify_param(&mut self, id: NodeId) -> ElabResult<bool> {
        if !self.folding.insert(id) {
            return Err(fatal(
                E302,
                format!("parameter `{}` depends on itself", self.ast[id].name),
                self.ast.span(id),
            ));
        }
        let result = self.fold_param_value(id);
        self.folding.remove(&id);
        result
    }

    fn fold_param_value(&mut self, id: NodeId) -> ElabResult<bool> {
        let name = self.ast[id].name.clone();
        let span = self.ast.span(id);
        let Some(value) = self.ast.child(id, 0) else {
            return Err(InternalError::new(format!("parameter `{name}` without a value")).into());
        };
        let range = self.ast.child(id, 1).filter(|&r| self.ast.kind(r) == NodeKind::Range);
        let mut changed = false;
        let mut hint = None;
        if let Some(range) = range {
            changed |= self.simplify_range(range, 1)?;
            if !self.ast[range].range_valid {
                return Err(error_range_not_const(&format!("parameter `{name}`"), span));
            }
            hint = Some(self.ast[range].range_width() as u32);
        }
        let signed = self.ast[id].is_signed;
        changed |= self.resolve_expr(value)?;
        changed |= self.fold_fully(value, hint, signed)?;

        let v = &self.ast[value];
        let value_span = v.span;
        match (v.is_const(), hint) {
            (0, _) => return Err(error_not_const(&format!("parameter `{name}`"), span)),
            (2, Some(width)) => {
                let bits = v.real_as_const(width);
                let folded = self.mk_bits(bits, signed, value_span);
                self.ast.replace_node(value, folded);
                changed = true;
            }
            (1, Some(width)) => {
                if v.bits.width() != width || v.is_signed != signed {
                    let bits = calc::extend_u0(&v.bits, width, v.is_signed);
                    let node = &mut self.ast[value];
                    node.integer = i64::from(bits.resized(32, signed).as_int(false));
                    node.range_left = width as i32 - 1;
                    node.range_right = 0;
                    node.bits = bits;
                    node.is_signed = signed;
                    node.is_string = false;
                    changed = true;
                }
            }
            (1, None) => {
                let value_signed = v.is_signed;
                if value_signed != signed {
                    self.ast[id].is_signed = value_signed;
                    changed = true;
                }
            }
            _ => {}
        }
        if let Some(range) = range {
            let (left, right, swapped) = {
                let r = &self.ast[range];
                (r.range_left, r.range_right, r.range_swapped)
            };
            let node = &mut self.ast[id];
            if !node.range_valid {
                node.range_valid = true;
                node.range_left = left;
                node.range_right = right;
                node.range_swapped = swapped;
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Gives every item of an enumeration a constant value. Items without a
    /// value follow their predecessor; the first defaults to 32-bit 0.
    pub(crate) fn simplify_enum(&mut self, id: NodeId) -> ElabResult<bool> {
        let items: Vec<NodeId> = self
            .ast
            .children(id)
            .iter()
            .copied()
            .filter(|&c| self.ast.kind(c) == NodeKind::EnumItem)
            .collect();
        let done = items.iter().all(|&item| {
            self.ast
                .child(item, 0)
                .is_some_and(|v| self.ast[v].kind == NodeKind::Constant)
        });
        if done {
            return Ok(false);
        }
        let mut prev: Option<(LogicVec, bool)> = None;
        for item in items {
            let span = self.ast.span(item);
            let value = match self.ast.child(item, 0) {
                Some(value) => {
                    self.resolve_expr(value)?;
                    self.fold_fully(value, None, false)?;
                    if self.ast[value].kind != NodeKind::Constant {
                        return Err(error_not_const(
                            &format!("value of enum item `{}`", self.ast[item].name),
                            span,
                        ));
                    }
                    value
                }
                None => {
                    let (bits, signed) = match &prev {
                        Some((bits, signed)) => {
                            let one = LogicVec::from_u64(1, 1);
                            (calc::const_add(bits, &one, *signed, false, Some(bits.width())), *signed)
                        }
                        None => (LogicVec::from_i64(0, 32), true),
                    };
                    let value = self.mk_bits(bits, signed, span);
                    self.ast.push_child(item, value);
                    self.ast.fixup_hierarchy_flags(item, true);
                    value
                }
            };
            let v = &self.ast[value];
            prev = Some((v.bits.clone(), v.is_signed));
            self.ast[item].is_signed = prev.as_ref().is_some_and(|p| p.1);
        }
        Ok(true)
    }

    /// Folds the enumeration an item belongs to, if it has not been yet.
    pub(crate) fn fold_enum_item(&mut self, item: NodeId) -> ElabResult<()> {
        if self
            .ast
            .child(item, 0)
            .is_some_and(|v| self.ast[v].kind == NodeKind::Constant)
        {
            return Ok(());
        }
        let module = self.ctx.module;
        let owner = self
            .ast
            .descendants(module)
            .into_iter()
            .find(|&n| self.ast.kind(n) == NodeKind::Enum && self.ast.children(n).contains(&item));
        if let Some(owner) = owner {
            self.simplify_enum(owner)?;
        }
        Ok(())
    }

    pub(crate) fn simplify_typedef(&mut self, id: NodeId) -> ElabResult<bool> {
        match self.ast.child(id, 0) {
            Some(base) if self.ast.kind(base) == NodeKind::Enum => self.simplify_enum(base),
            _ => Ok(false),
        }
    }

    /// Replaces the user type of a signal with the ranges and signedness of
    /// the type definition.
    pub(crate) fn resolve_wire_type(&mut self, id: NodeId) -> ElabResult<()> {
        let Some(type_pos) = self
            .ast
            .children(id)
            .iter()
            .position(|&c| self.ast.kind(c) == NodeKind::WireType)
        else {
            self.ast[id].is_custom_type = false;
            return Ok(());
        };
        let type_node = self.ast.children(id)[type_pos];
        let type_name = self.ast[type_node].name.clone();
        let span = self.ast.span(id);
        let Some(typedef) = self
            .lookup(&type_name)
            .filter(|&t| self.ast.kind(t) == NodeKind::Typedef)
        else {
            return Err(error_unresolved(&type_name, span));
        };
        let Some(base) = self.ast.child(typedef, 0) else {
            return Err(InternalError::new(format!("typedef `{type_name}` without a base type")).into());
        };
        let mut front = Vec::new();
        match self.ast.kind(base) {
            NodeKind::Wire => {
                if self.ast[base].is_custom_type {
                    self.resolve_wire_type(base)?;
                }
                for r in self.ast.children(base).to_vec() {
                    if matches!(self.ast.kind(r), NodeKind::Range | NodeKind::Multirange) {
                        front.push(self.ast.clone_subtree(r));
                    }
                }
                let (unpacked, signed) = (self.ast[base].unpacked_dimensions, self.ast[base].is_signed);
                let node = &mut self.ast[id];
                node.unpacked_dimensions += unpacked;
                node.is_signed |= signed;
                node.is_logic = true;
            }
            NodeKind::Enum => {
                front.push(self.mk_range(31, 0, span));
                self.ast[id].is_signed = true;
            }
            NodeKind::Struct | NodeKind::Union => {
                let width = self.struct_width(base)?;
                front.push(self.mk_range(width - 1, 0, span));
                let name = self.ast[id].name.clone();
                self.ctx.struct_wires.insert(name, base);
            }
            kind => {
                return Err(error_unsupported(&format!("`{kind}` as a data type"), span));
            }
        }
        let removed = self.ast.take_child(id, type_pos);
        self.ast.delete(removed);
        for (i, r) in front.into_iter().enumerate() {
            self.ast[id].children.insert(i, r);
        }
        self.ast[id].is_custom_type = false;
        self.ast.fixup_hierarchy_flags(id, true);
        Ok(())
    }

    /// Total width of a packed struct, or of its widest member for a union.
    pub(crate) fn struct_width(&mut self, id: NodeId) -> ElabResult<i64> {
        let is_union = self.ast.kind(id) == NodeKind::Union;
        let mut width = 0;
        for item in self.ast.children(id).to_vec() {
            let w = self.struct_item_width(item)?;
            width = if is_union { width.max(w) } else { width + w };
        }
        Ok(width)
    }

    fn struct_item_width(&mut self, item: NodeId) -> ElabResult<i64> {
        match self.ast.child(item, 0) {
            Some(r) if self.ast.kind(r) == NodeKind::Range => {
                self.simplify_range(r, 1)?;
                if !self.ast[r].range_valid {
                    return Err(error_range_not_const(
                        &format!("struct member `{}`", self.ast[item].name),
                        self.ast.span(item),
                    ));
                }
                Ok(i64::from(self.ast[r].range_width()))
            }
            Some(s) if matches!(self.ast.kind(s), NodeKind::Struct | NodeKind::Union) => self.struct_width(s),
            _ => Ok(1),
        }
    }

    /// Least significant bit and width of `member`, which may be a dotted
    /// path into nested structs. The first member is the most significant.
    pub(crate) fn struct_member_layout(&mut self, layout: NodeId, member: &str) -> ElabResult<Option<(i64, i64)>> {
        let (head, rest) = match member.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (member, None),
        };
        let is_union = self.ast.kind(layout) == NodeKind::Union;
        let mut lsb = 0;
        for item in self.ast.children(layout).to_vec().into_iter().rev() {
            let width = self.struct_item_width(item)?;
            if self.ast[item].name == head {
                let offset = if is_union { 0 } else { lsb };
                return match rest {
                    None => Ok(Some((offset, width))),
                    Some(rest) => {
                        let nested = self
                            .ast
                            .child(item, 0)
                            .filter(|&s| matches!(self.ast.kind(s), NodeKind::Struct | NodeKind::Union));
                        match nested {
                            Some(nested) => Ok(self
                                .struct_member_layout(nested, rest)?
                                .map(|(inner, w)| (offset + inner, w))),
                            None => Ok(None),
                        }
                    }
                };
            }
            lsb += width;
        }
        Ok(None)
    }

    /// Moves the declarations of a procedural block to the module, renaming
    /// them after the block when it is named.
    pub(crate) fn hoist_block_declarations(&mut self, id: NodeId) -> ElabResult<bool> {
        self.ast[id].basic_prep = true;
        let name = self.ast[id].name.clone();
        if !name.is_empty() {
            self.expand_genblock(id, &format!("{name}."))?;
        }
        let mut changed = false;
        let mut i = 0;
        while let Some(child) = self.ast.child(id, i) {
            let kind = self.ast.kind(child);
            if (is_declaration(kind) && kind != NodeKind::Cell) || kind == NodeKind::Enum {
                let item = self.ast.take_child(id, i);
                self.add_module_item(item);
                if kind == NodeKind::Enum {
                    crate::context::declare_children(self.ast, item, &mut self.ctx.scope);
                }
                changed = true;
            } else {
                i += 1;
            }
        }
        Ok(changed)
    }
}
