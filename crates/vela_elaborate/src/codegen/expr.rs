//! Expressions to operator cells.
//!
//! [`CodeGen::gen_rtl`] returns the signal carrying the value of an
//! expression. Context-determined operators are built at the width of their
//! context; self-determined operands are built at their natural width and
//! extended afterwards.

use vela_ast::{NodeId, NodeKind};
use vela_common::{ConstValue, Logic, LogicVec};
use vela_netlist::{SigBit, SigSpec, WireId};

use super::CodeGen;
use crate::errors::{error_unresolved, error_unsupported, fatal, from_netlist, ElabResult, E302, E312};
use crate::width::{detect_common_sign_width, range_width};

/// Netlist cell type of an operator node.
pub(crate) fn cell_type(kind: NodeKind) -> Option<&'static str> {
    use NodeKind::*;
    Some(match kind {
        BitNot => "$not",
        Pos => "$pos",
        Neg => "$neg",
        BitAnd => "$and",
        BitOr => "$or",
        BitXor => "$xor",
        BitXnor => "$xnor",
        ReduceAnd => "$reduce_and",
        ReduceOr => "$reduce_or",
        ReduceXor => "$reduce_xor",
        ReduceXnor => "$reduce_xnor",
        ReduceBool => "$reduce_bool",
        LogicNot => "$logic_not",
        LogicAnd => "$logic_and",
        LogicOr => "$logic_or",
        ShiftLeft => "$shl",
        ShiftRight => "$shr",
        ShiftSleft => "$sshl",
        ShiftSright => "$sshr",
        Shift => "$shift",
        ShiftX => "$shiftx",
        Lt => "$lt",
        Le => "$le",
        Eq => "$eq",
        Ne => "$ne",
        Eqx => "$eqx",
        Nex => "$nex",
        Ge => "$ge",
        Gt => "$gt",
        Add => "$add",
        Sub => "$sub",
        Mul => "$mul",
        Div => "$div",
        Mod => "$mod",
        Pow => "$pow",
        Ternary => "$mux",
        MemRd => "$memrd",
        MemWr => "$memwr",
        MemInit => "$meminit",
        Assert => "$assert",
        Assume => "$assume",
        Live => "$live",
        Fair => "$fair",
        Cover => "$cover",
        _ => return Option::None,
    })
}

fn flag(value: bool) -> ConstValue {
    ConstValue::bits(LogicVec::from_bool(value))
}

/// `width` bits of `base` starting at `lsb`; bits outside `base` read as `x`.
fn select_bits(base: &SigSpec, lsb: i64, width: u32) -> SigSpec {
    (0..i64::from(width))
        .map(|k| {
            let pos = lsb + k;
            if pos >= 0 && (pos as u64) < u64::from(base.width()) {
                base.bits()[pos as usize]
            } else {
                SigBit::Const(Logic::X)
            }
        })
        .collect()
}

/// Placement of a declared signal inside its bit vector.
#[derive(Clone, Copy)]
struct Layout {
    width: u32,
    start: i64,
    upto: bool,
}

impl Layout {
    /// Bit offset of the least significant bit of `[msb:lsb]`, with bounds
    /// in declared numbering.
    fn lsb_offset(self, left: i64, right: i64) -> i64 {
        if self.upto {
            self.start + i64::from(self.width) - 1 - left.max(right)
        } else {
            left.min(right) - self.start
        }
    }
}

impl CodeGen<'_, '_> {
    /// Width and signedness `id` is built at inside a context of `hint`
    /// bits.
    fn context_of(&self, id: NodeId, hint: Option<u32>, sign_hint: bool) -> ElabResult<(u32, bool)> {
        let sw = self.detect(id)?;
        Ok(match hint {
            Some(h) => (sw.width.max(h), sw.signed && sign_hint),
            None => (sw.width, sw.signed),
        })
    }

    /// Emits the logic computing `id`. With a `hint` the result is at least
    /// `hint` bits wide; without one it has the natural width of `id`.
    pub(crate) fn gen_rtl(&mut self, id: NodeId, hint: Option<u32>, sign_hint: bool) -> ElabResult<SigSpec> {
        let ast = self.ast;
        let node = &ast[id];
        let span = node.span;
        let (width, signed) = self.context_of(id, hint, sign_hint)?;
        let child = |i: usize| {
            node.children
                .get(i)
                .copied()
                .ok_or_else(|| fatal(E302, format!("malformed `{}` expression", node.kind), span))
        };

        let mut sig = match node.kind {
            NodeKind::Constant => SigSpec::constant(&node.bits.resized(width, signed)),
            NodeKind::RealValue => {
                return Err(error_unsupported("real-valued expression outside a constant context", span))
            }
            NodeKind::Identifier => self.gen_identifier(id)?,
            NodeKind::MemRd => self.gen_memrd(id)?,
            NodeKind::ToSigned | NodeKind::ToUnsigned => {
                let mut sig = self.gen_rtl(child(0)?, None, false)?;
                sig.extend_u0(width, node.kind == NodeKind::ToSigned && signed);
                sig
            }
            NodeKind::SelfSz => self.gen_rtl(child(0)?, None, false)?,
            NodeKind::CastSize => {
                let size = ast[child(0)?].as_int(true).max(1) as u32;
                let inner = child(1)?;
                let inner_signed = self.detect(inner)?.signed;
                let mut sig = self.gen_rtl(inner, Some(size), inner_signed)?;
                sig.extend_u0(size, inner_signed);
                sig
            }
            NodeKind::Concat => {
                let mut sig = SigSpec::new();
                for &part in node.children.iter().rev() {
                    let part = self.gen_rtl(part, None, false)?;
                    sig.append(&part);
                }
                sig
            }
            NodeKind::Replicate => {
                let count = ast[child(0)?].as_int(true).max(0) as u32;
                self.gen_rtl(child(1)?, None, false)?.repeat(count)
            }
            NodeKind::Neg | NodeKind::BitNot | NodeKind::Pos => {
                let a = self.gen_rtl(child(0)?, Some(width), signed)?;
                self.unary_cell(cell_name(node.kind), id, a, signed, width)?
            }
            NodeKind::BitAnd
            | NodeKind::BitOr
            | NodeKind::BitXor
            | NodeKind::BitXnor
            | NodeKind::Add
            | NodeKind::Sub
            | NodeKind::Mul
            | NodeKind::Div
            | NodeKind::Mod => {
                let a = self.gen_rtl(child(0)?, Some(width), signed)?;
                let b = self.gen_rtl(child(1)?, Some(width), signed)?;
                self.binary_cell(cell_name(node.kind), id, (a, signed), (b, signed), width)?
            }
            NodeKind::ShiftLeft
            | NodeKind::ShiftRight
            | NodeKind::ShiftSleft
            | NodeKind::ShiftSright
            | NodeKind::Shift
            | NodeKind::ShiftX
            | NodeKind::Pow => {
                let a = self.gen_rtl(child(0)?, Some(width), signed)?;
                let amount = child(1)?;
                let b_signed = matches!(node.kind, NodeKind::Shift | NodeKind::ShiftX | NodeKind::Pow)
                    && self.detect(amount)?.signed;
                let b = self.gen_rtl(amount, None, false)?;
                self.binary_cell(cell_name(node.kind), id, (a, signed), (b, b_signed), width)?
            }
            kind if kind.is_comparison() => {
                let (l, r) = (child(0)?, child(1)?);
                let common = detect_common_sign_width(ast, &self.ctx.scope, &[l, r])?;
                let a = self.gen_rtl(l, Some(common.width), common.signed)?;
                let b = self.gen_rtl(r, Some(common.width), common.signed)?;
                self.binary_cell(cell_name(kind), id, (a, common.signed), (b, common.signed), 1)?
            }
            NodeKind::ReduceAnd
            | NodeKind::ReduceOr
            | NodeKind::ReduceXor
            | NodeKind::ReduceXnor
            | NodeKind::ReduceBool
            | NodeKind::LogicNot => {
                let a = self.gen_rtl(child(0)?, None, false)?;
                self.unary_cell(cell_name(node.kind), id, a, false, 1)?
            }
            NodeKind::LogicAnd | NodeKind::LogicOr => {
                let a = self.gen_rtl(child(0)?, None, false)?;
                let b = self.gen_rtl(child(1)?, None, false)?;
                self.binary_cell(cell_name(node.kind), id, (a, false), (b, false), 1)?
            }
            NodeKind::Ternary => {
                let mut cond = self.gen_rtl(child(0)?, None, false)?;
                if cond.width() != 1 {
                    cond = self.unary_cell("$reduce_bool", id, cond, false, 1)?;
                }
                let then_sig = self.gen_rtl(child(1)?, Some(width), signed)?;
                let else_sig = self.gen_rtl(child(2)?, Some(width), signed)?;
                self.mux(id, cond, else_sig, then_sig, width)?
            }
            NodeKind::FCall => {
                return Err(error_unsupported(
                    &format!("call of `{}` in a non-constant context", node.name),
                    span,
                ))
            }
            kind => {
                return Err(error_unsupported(&format!("`{kind}` expression in a netlist context"), span))
            }
        };
        if sig.width() < width {
            sig.extend_u0(width, signed);
        }
        Ok(sig)
    }

    /// Builds a one-input operator cell and returns its output.
    pub(crate) fn unary_cell(
        &mut self,
        cell_type: &str,
        origin: NodeId,
        a: SigSpec,
        a_signed: bool,
        y_width: u32,
    ) -> ElabResult<SigSpec> {
        let span = self.ast.span(origin);
        let name = self.new_name(cell_type, span);
        let y = self.new_wire(&format!("{name}_Y"), y_width, span)?;
        let (ident, type_ident, src) = (self.ident(&name), self.ident(cell_type), self.src(span));
        let cid = self.module.add_cell(ident, type_ident).map_err(|e| from_netlist(e, span))?;
        let cell = &mut self.module.cells[cid];
        cell.set_param("A_SIGNED", flag(a_signed));
        cell.set_param("A_WIDTH", ConstValue::int(a.width() as i32));
        cell.set_param("Y_WIDTH", ConstValue::int(y_width as i32));
        cell.set_port("A", a);
        cell.set_port("Y", y.clone());
        cell.attributes.insert("src".to_string(), src);
        Ok(y)
    }

    /// Builds a two-input operator cell and returns its output.
    pub(crate) fn binary_cell(
        &mut self,
        cell_type: &str,
        origin: NodeId,
        (a, a_signed): (SigSpec, bool),
        (b, b_signed): (SigSpec, bool),
        y_width: u32,
    ) -> ElabResult<SigSpec> {
        let span = self.ast.span(origin);
        let name = self.new_name(cell_type, span);
        let y = self.new_wire(&format!("{name}_Y"), y_width, span)?;
        let (ident, type_ident, src) = (self.ident(&name), self.ident(cell_type), self.src(span));
        let cid = self.module.add_cell(ident, type_ident).map_err(|e| from_netlist(e, span))?;
        let cell = &mut self.module.cells[cid];
        cell.set_param("A_SIGNED", flag(a_signed));
        cell.set_param("B_SIGNED", flag(b_signed));
        cell.set_param("A_WIDTH", ConstValue::int(a.width() as i32));
        cell.set_param("B_WIDTH", ConstValue::int(b.width() as i32));
        cell.set_param("Y_WIDTH", ConstValue::int(y_width as i32));
        cell.set_port("A", a);
        cell.set_port("B", b);
        cell.set_port("Y", y.clone());
        cell.attributes.insert("src".to_string(), src);
        Ok(y)
    }

    /// `s ? b : a`.
    pub(crate) fn mux(&mut self, origin: NodeId, s: SigSpec, a: SigSpec, b: SigSpec, width: u32) -> ElabResult<SigSpec> {
        let span = self.ast.span(origin);
        let name = self.new_name("$mux", span);
        let y = self.new_wire(&format!("{name}_Y"), width, span)?;
        let (ident, type_ident, src) = (self.ident(&name), self.ident("$mux"), self.src(span));
        let cid = self.module.add_cell(ident, type_ident).map_err(|e| from_netlist(e, span))?;
        let cell = &mut self.module.cells[cid];
        cell.set_param("WIDTH", ConstValue::int(width as i32));
        cell.set_port("A", a);
        cell.set_port("B", b);
        cell.set_port("S", s);
        cell.set_port("Y", y.clone());
        cell.attributes.insert("src".to_string(), src);
        Ok(y)
    }

    /// The declaration an identifier refers to.
    fn decl_of(&self, id: NodeId) -> ElabResult<NodeId> {
        let ast = self.ast;
        let node = &ast[id];
        node.id2ast
            .filter(|&d| ast.is_live(d))
            .or_else(|| self.ctx.lookup(&node.name))
            .ok_or_else(|| error_unresolved(&node.name, node.span))
    }

    /// The netlist wire and bit layout of the signal `id` names.
    fn signal_of(&self, id: NodeId) -> ElabResult<(SigSpec, Layout)> {
        let ast = self.ast;
        let node = &ast[id];
        let decl = self.decl_of(id)?;
        let d = &ast[decl];
        match d.kind {
            NodeKind::Wire | NodeKind::Autowire => {
                let wid: WireId = self
                    .wire_named(&d.name)
                    .ok_or_else(|| error_unresolved(&node.name, node.span))?;
                let wire = &self.module.wires[wid];
                let layout = Layout {
                    width: wire.width,
                    start: i64::from(wire.start_offset),
                    upto: wire.upto,
                };
                Ok((SigSpec::wire(wid, wire.width), layout))
            }
            NodeKind::Parameter | NodeKind::Localparam | NodeKind::EnumItem => {
                let value = d
                    .children
                    .first()
                    .map(|&v| &ast[v])
                    .filter(|v| v.is_const() == 1)
                    .ok_or_else(|| fatal(E302, format!("parameter `{}` has no constant value", d.name), d.span))?;
                let layout = Layout {
                    width: value.bits.width(),
                    start: 0,
                    upto: false,
                };
                Ok((SigSpec::constant(&value.bits), layout))
            }
            NodeKind::Memory => Err(fatal(
                E312,
                format!("memory `{}` used without a word index", d.name),
                node.span,
            )),
            kind => Err(error_unsupported(&format!("reference to a `{kind}` in a netlist context"), node.span)),
        }
    }

    /// Replaces bits assigned earlier in the current process by their
    /// temporaries.
    fn substitute(&self, sig: SigSpec) -> SigSpec {
        if self.rvalue.is_empty() {
            return sig;
        }
        sig.bits()
            .iter()
            .map(|bit| self.rvalue.get(bit).copied().unwrap_or(*bit))
            .collect()
    }

    /// True if the first select of identifier `id` has a non-constant bound.
    pub(crate) fn has_variable_select(&self, id: NodeId) -> bool {
        let ast = self.ast;
        ast.kind(id) == NodeKind::Identifier
            && ast
                .child(id, 0)
                .is_some_and(|r| ast.kind(r) == NodeKind::Range && !ast[r].range_valid)
    }

    fn gen_identifier(&mut self, id: NodeId) -> ElabResult<SigSpec> {
        let ast = self.ast;
        let (base, layout) = self.signal_of(id)?;
        let base = self.substitute(base);
        let selects = ast.children(id);
        if selects.len() > 1 {
            return Err(error_unsupported("multiple selects on a packed signal", ast.span(id)));
        }
        let Some(&range) = selects.first() else {
            return Ok(base);
        };
        let r = &ast[range];
        if r.range_valid {
            let lsb = layout.lsb_offset(i64::from(r.range_left), i64::from(r.range_right));
            return Ok(select_bits(&base, lsb, r.range_width().max(1) as u32));
        }

        // Variable select: shift the signal right by the offset of the
        // selected least significant bit.
        let width = range_width(ast, range)?;
        let Some(&index) = r.children.last() else {
            return Err(fatal(E302, "empty select", r.span));
        };
        let index_signed = self.detect(index)?.signed;
        let index_sig = self.gen_rtl(index, None, false)?;
        let shift_width = index_sig.width().max(32) + 1;
        let (shift, shift_signed) = if layout.upto {
            let top = LogicVec::from_i64(layout.start + i64::from(layout.width) - 1, shift_width);
            let sub = self.binary_cell(
                "$sub",
                range,
                (SigSpec::constant(&top), true),
                (index_sig, index_signed),
                shift_width,
            )?;
            (sub, true)
        } else if layout.start != 0 {
            let start = LogicVec::from_i64(layout.start, shift_width);
            let sub = self.binary_cell(
                "$sub",
                range,
                (index_sig, index_signed),
                (SigSpec::constant(&start), true),
                shift_width,
            )?;
            (sub, true)
        } else {
            (index_sig, index_signed)
        };
        self.binary_cell("$shiftx", id, (base, false), (shift, shift_signed), width)
    }

    /// The bits an assignment to `id` drives.
    pub(crate) fn gen_lvalue(&mut self, id: NodeId) -> ElabResult<SigSpec> {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::Identifier => {
                if self.has_variable_select(id) {
                    return Err(error_unsupported("variable index in an lvalue", ast.span(id)));
                }
                let (base, layout) = self.signal_of(id)?;
                if base.is_fully_const() {
                    return Err(fatal(
                        E302,
                        format!("assignment to constant `{}`", ast[id].name),
                        ast.span(id),
                    ));
                }
                match ast.child(id, 0) {
                    None => Ok(base),
                    Some(range) => {
                        let r = &ast[range];
                        let lsb = layout.lsb_offset(i64::from(r.range_left), i64::from(r.range_right));
                        Ok(select_bits(&base, lsb, r.range_width().max(1) as u32))
                    }
                }
            }
            NodeKind::Concat => {
                let mut sig = SigSpec::new();
                for &part in ast.children(id).iter().rev() {
                    let part = self.gen_lvalue(part)?;
                    sig.append(&part);
                }
                Ok(sig)
            }
            kind => Err(error_unsupported(&format!("`{kind}` as an assignment target"), ast.span(id))),
        }
    }

    /// Declared bit layout of the signal an lvalue identifier names, for
    /// lvalues with a variable index.
    pub(crate) fn lvalue_layout(&self, id: NodeId) -> ElabResult<(SigSpec, i64, u32, bool)> {
        let (base, layout) = self.signal_of(id)?;
        Ok((base, layout.start, layout.width, layout.upto))
    }

    fn gen_memrd(&mut self, id: NodeId) -> ElabResult<SigSpec> {
        let ast = self.ast;
        let node = &ast[id];
        let span = node.span;
        let mem = self.decl_of(id)?;
        if ast.kind(mem) != NodeKind::Memory {
            return Err(fatal(E312, format!("`{}` is not a memory", node.name), span));
        }
        let width = ast[mem].range_width().max(1) as u32;
        let Some(&addr) = node.children.first() else {
            return Err(fatal(E312, format!("read of memory `{}` without an address", node.name), span));
        };
        let addr = self.gen_rtl(addr, None, false)?;
        let name = self.new_name(&format!("$memrd${}", node.name), span);
        let data = self.new_wire(&format!("{name}_DATA"), width, span)?;
        let (ident, type_ident, src) = (self.ident(&name), self.ident("$memrd"), self.src(span));
        let cid = self.module.add_cell(ident, type_ident).map_err(|e| from_netlist(e, span))?;
        let cell = &mut self.module.cells[cid];
        cell.set_param("MEMID", ConstValue::String(node.name.clone()));
        cell.set_param("ABITS", ConstValue::int(addr.width() as i32));
        cell.set_param("WIDTH", ConstValue::int(width as i32));
        cell.set_param("CLK_ENABLE", flag(false));
        cell.set_param("CLK_POLARITY", flag(false));
        cell.set_param("TRANSPARENT", flag(false));
        cell.set_port("CLK", SigSpec::constant(&LogicVec::all_x(1)));
        cell.set_port("EN", SigSpec::constant(&LogicVec::from_bool(true)));
        cell.set_port("ADDR", addr);
        cell.set_port("DATA", data.clone());
        cell.attributes.insert("src".to_string(), src);
        Ok(data)
    }
}

fn cell_name(kind: NodeKind) -> &'static str {
    cell_type(kind).unwrap_or("$pos")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_table() {
        assert_eq!(cell_type(NodeKind::Add), Some("$add"));
        assert_eq!(cell_type(NodeKind::ShiftSright), Some("$sshr"));
        assert_eq!(cell_type(NodeKind::Ternary), Some("$mux"));
        assert_eq!(cell_type(NodeKind::Cover), Some("$cover"));
        assert_eq!(cell_type(NodeKind::Identifier), None);
    }

    #[test]
    fn layout_offsets() {
        let down = Layout {
            width: 8,
            start: 0,
            upto: false,
        };
        assert_eq!(down.lsb_offset(7, 4), 4);
        let up = Layout {
            width: 8,
            start: 0,
            upto: true,
        };
        assert_eq!(up.lsb_offset(0, 0), 7);
        assert_eq!(up.lsb_offset(2, 5), 2);
    }

    #[test]
    fn out_of_range_bits_are_undefined() {
        let base = SigSpec::constant(&LogicVec::from_u64(0b1010, 4));
        let sig = select_bits(&base, 2, 4);
        assert_eq!(sig.bits()[0], SigBit::Const(Logic::Zero));
        assert_eq!(sig.bits()[1], SigBit::Const(Logic::One));
        assert_eq!(sig.bits()[2], SigBit::Const(Logic::X));
        assert_eq!(sig.width(), 4);
    }
}
