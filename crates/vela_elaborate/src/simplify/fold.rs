//! Expression simplification and constant folding.
//!
//! Operands are simplified with the width and signedness their operator
//! imposes: context-determined operands inherit the hint of the enclosing
//! expression, self-determined ones are sized on their own. Folding then
//! evaluates an operator whose operands are all constant, at the hinted
//! width, and replaces the operator node with the result.

use vela_ast::{Node, NodeId, NodeKind};
use vela_common::{calc, Logic, LogicVec};
use vela_source::Provenance;

use super::Simplifier;
use crate::errors::{error_not_const, error_unsupported, fatal, ElabResult, E301, E302};
use crate::width::{check_width_limit, detect_common_sign_width};

type BinaryFn = fn(&LogicVec, &LogicVec, bool, bool, Option<u32>) -> LogicVec;
type UnaryFn = fn(&LogicVec, bool, Option<u32>) -> LogicVec;

fn binary_fn(kind: NodeKind) -> Option<BinaryFn> {
    use NodeKind::*;
    let f: BinaryFn = match kind {
        BitAnd => calc::const_and,
        BitOr => calc::const_or,
        BitXor => calc::const_xor,
        BitXnor => calc::const_xnor,
        Add => calc::const_add,
        Sub => calc::const_sub,
        Mul => calc::const_mul,
        Div => calc::const_div,
        Mod => calc::const_mod,
        Pow => calc::const_pow,
        ShiftLeft => calc::const_shl,
        ShiftRight => calc::const_shr,
        ShiftSleft => calc::const_sshl,
        ShiftSright => calc::const_sshr,
        Shift => calc::const_shift,
        ShiftX => calc::const_shiftx,
        Lt => calc::const_lt,
        Le => calc::const_le,
        Eq => calc::const_eq,
        Ne => calc::const_ne,
        Eqx => calc::const_eqx,
        Nex => calc::const_nex,
        Ge => calc::const_ge,
        Gt => calc::const_gt,
        LogicAnd => calc::const_logic_and,
        LogicOr => calc::const_logic_or,
        _ => return Option::None,
    };
    Some(f)
}

fn reduce_fn(kind: NodeKind) -> Option<UnaryFn> {
    use NodeKind::*;
    let f: UnaryFn = match kind {
        ReduceAnd => calc::const_reduce_and,
        ReduceOr => calc::const_reduce_or,
        ReduceXor => calc::const_reduce_xor,
        ReduceXnor => calc::const_reduce_xnor,
        ReduceBool => calc::const_reduce_bool,
        LogicNot => calc::const_logic_not,
        _ => return Option::None,
    };
    Some(f)
}

fn is_shift_or_pow(kind: NodeKind) -> bool {
    use NodeKind::*;
    matches!(kind, ShiftLeft | ShiftRight | ShiftSleft | ShiftSright | Shift | ShiftX | Pow)
}

fn is_self_determined(kind: NodeKind) -> bool {
    use NodeKind::*;
    matches!(
        kind,
        FCall
            | Concat
            | Replicate
            | ReduceAnd
            | ReduceOr
            | ReduceXor
            | ReduceXnor
            | ReduceBool
            | LogicNot
            | LogicAnd
            | LogicOr
            | ToSigned
            | ToUnsigned
            | SelfSz
            | CastSize
            | MemRd
    )
}

/// A folded replication count or cast size, or `None` when it is negative,
/// undefined or wider than 63 bits.
fn const_count(node: &Node) -> Option<u64> {
    if !node.bits.is_fully_def() || node.bits.iter().skip(63).any(|b| b == Logic::One) {
        return None;
    }
    u64::try_from(node.as_int(node.is_signed)).ok()
}

/// Outcome of a real-valued operation.
enum RealResult {
    Real(f64),
    Bool(bool),
}

fn fold_real(kind: NodeKind, a: f64, b: f64) -> Option<RealResult> {
    use NodeKind::*;
    Some(match kind {
        Add => RealResult::Real(a + b),
        Sub => RealResult::Real(a - b),
        Mul => RealResult::Real(a * b),
        Div => RealResult::Real(a / b),
        Mod => RealResult::Real(a % b),
        Pow => RealResult::Real(a.powf(b)),
        Lt => RealResult::Bool(a < b),
        Le => RealResult::Bool(a <= b),
        Eq | Eqx => RealResult::Bool(a == b),
        Ne | Nex => RealResult::Bool(a != b),
        Ge => RealResult::Bool(a >= b),
        Gt => RealResult::Bool(a > b),
        LogicAnd => RealResult::Bool(a != 0.0 && b != 0.0),
        LogicOr => RealResult::Bool(a != 0.0 || b != 0.0),
        _ => return Option::None,
    })
}

impl Simplifier<'_, '_> {
    pub(crate) fn simplify_expr(
        &mut self,
        id: NodeId,
        const_fold: bool,
        stage: u8,
        width_hint: Option<u32>,
        sign_hint: bool,
    ) -> ElabResult<bool> {
        let mut changed = self.resolve_node(id)?;
        let mut undetected = false;
        let (width_hint, sign_hint) = match width_hint.filter(|&w| w > 0) {
            Some(w) => (Some(w), sign_hint),
            None => {
                changed |= self.resolve_expr(id)?;
                match self.detect(id) {
                    Ok(sw) if sw.width > 0 => (Some(sw.width), sw.signed),
                    Ok(_) => (None, false),
                    Err(_) => {
                        undetected = true;
                        (None, false)
                    }
                }
            }
        };

        let kind = self.ast.kind(id);
        let children = self.ast.children(id).to_vec();
        match kind {
            NodeKind::Identifier => {
                for child in children {
                    if self.ast.kind(child) == NodeKind::Range {
                        changed |= self.simplify_range(child, stage)?;
                    }
                }
            }
            _ if is_self_determined(kind) => {
                for child in children {
                    changed |= self.simplify(child, const_fold, stage, None, false)?;
                }
            }
            _ if kind.is_comparison() => {
                let common = detect_common_sign_width(self.ast, &self.ctx.scope, &children)
                    .ok()
                    .filter(|sw| sw.width > 0);
                let (w, s) = match common {
                    Some(sw) => (Some(sw.width), sw.signed),
                    None => (None, false),
                };
                for child in children {
                    changed |= self.simplify(child, const_fold, stage, w, s)?;
                }
            }
            _ if is_shift_or_pow(kind) => {
                if let [lhs, rhs] = children.as_slice() {
                    changed |= self.simplify(*lhs, const_fold, stage, width_hint, sign_hint)?;
                    changed |= self.simplify(*rhs, const_fold, stage, None, false)?;
                }
            }
            NodeKind::Ternary => {
                if let [cond, a, b] = children.as_slice() {
                    changed |= self.simplify(*cond, const_fold, stage, None, false)?;
                    changed |= self.simplify(*a, const_fold, stage, width_hint, sign_hint)?;
                    changed |= self.simplify(*b, const_fold, stage, width_hint, sign_hint)?;
                }
            }
            _ => {
                for child in children {
                    changed |= self.simplify(child, const_fold, stage, width_hint, sign_hint)?;
                }
            }
        }

        // Once the operands are folded, a detection failure is final.
        let (width_hint, sign_hint) = if undetected && self.only_constants(id) {
            let sw = self.detect(id)?;
            (Some(sw.width).filter(|&w| w > 0), sw.signed)
        } else {
            (width_hint, sign_hint)
        };

        if const_fold {
            changed |= self.fold_node(id, width_hint, sign_hint)?;
        }
        Ok(changed)
    }

    /// True if no node under `id` refers to a declaration or a function.
    fn only_constants(&self, id: NodeId) -> bool {
        self.ast.descendants(id).into_iter().all(|d| {
            let node = &self.ast[d];
            !matches!(node.kind, NodeKind::Identifier | NodeKind::FCall | NodeKind::Prefix | NodeKind::MemRd)
                && (!node.children.is_empty() || node.is_const() > 0)
        })
    }

    /// Evaluates `id` if its operands are constant.
    fn fold_node(&mut self, id: NodeId, width_hint: Option<u32>, sign_hint: bool) -> ElabResult<bool> {
        use NodeKind::{
            BitNot, CastSize, Concat, FCall, Identifier, LogicAnd, LogicNot, LogicOr, Neg, Pos, Pow, RealValue,
            ReduceBool, Replicate, SelfSz, Shift, ShiftX, Ternary, ToSigned, ToUnsigned,
        };
        let kind = self.ast.kind(id);
        let span = self.ast.span(id);
        let children = self.ast.children(id).to_vec();
        let operand = |i: usize| children.get(i).map(|&c| &self.ast[c]);
        let all_const = !children.is_empty() && children.iter().all(|&c| self.ast[c].is_const() > 0);

        let folded = match kind {
            Identifier => self.fold_identifier(id)?,
            FCall => self.fold_call(id)?,
            Ternary => return self.fold_ternary(id, width_hint, sign_hint),
            Concat if all_const => {
                if children.iter().any(|&c| self.ast[c].kind == RealValue) {
                    return Err(error_unsupported("real value in a concatenation", span));
                }
                if children.iter().all(|&c| self.ast[c].is_string) {
                    let text: String = children.iter().map(|&c| self.ast[c].name.as_str()).collect();
                    let id = self.ast.mkconst_str(&text, &Provenance::internal());
                    self.ast[id].span = span;
                    Some(id)
                } else {
                    let parts: Vec<&LogicVec> = children.iter().map(|&c| &self.ast[c].bits).collect();
                    let bits = LogicVec::concat(&parts);
                    Some(self.mk_bits(bits, false, span))
                }
            }
            Replicate if all_const => {
                let (Some(count), Some(inner)) = (operand(0), operand(1)) else {
                    return Ok(false);
                };
                let Some(count) = const_count(count).and_then(|c| u32::try_from(c).ok()) else {
                    return Err(fatal(E302, "replication count is negative, undefined or too large", span));
                };
                let total = u64::from(count) * u64::from(inner.bits.width());
                check_width_limit(total, span)?;
                let bits = inner.bits.repeat(count);
                Some(self.mk_bits(bits, false, span))
            }
            ToSigned | ToUnsigned if all_const => match operand(0) {
                Some(c) if c.kind == RealValue => None,
                Some(c) => {
                    let bits = c.bits.clone();
                    Some(self.mk_bits(bits, kind == ToSigned, span))
                }
                None => None,
            },
            SelfSz if all_const => Some(self.ast.clone_subtree(children[0])),
            CastSize if all_const => {
                let (Some(size), Some(value)) = (operand(0), operand(1)) else {
                    return Ok(false);
                };
                let size = match const_count(size) {
                    Some(0) | None => return Err(fatal(E302, "size cast to a non-positive width", span)),
                    Some(size) => check_width_limit(size, span)?,
                };
                let signed = value.is_signed;
                let bits = value.bits_as_const(Some(size), signed);
                Some(self.mk_bits(bits, signed, span))
            }
            BitNot | Neg | Pos if all_const => {
                let Some(a) = operand(0) else {
                    return Ok(false);
                };
                if a.kind == RealValue {
                    match kind {
                        Neg => Some(self.mk_real(-a.realvalue, span)),
                        Pos => Some(self.mk_real(a.realvalue, span)),
                        _ => return Err(error_unsupported("bitwise operator on a real value", span)),
                    }
                } else {
                    let f: UnaryFn = match kind {
                        BitNot => calc::const_not,
                        Neg => calc::const_neg,
                        _ => calc::const_pos,
                    };
                    let bits = f(&a.bits_as_const(width_hint, sign_hint), sign_hint, width_hint);
                    Some(self.mk_bits(bits, sign_hint, span))
                }
            }
            _ if all_const && reduce_fn(kind).is_some() => {
                let Some(a) = operand(0) else {
                    return Ok(false);
                };
                if a.kind == RealValue {
                    match kind {
                        LogicNot => Some(self.mk_int(i64::from(a.realvalue == 0.0), false, 1, span)),
                        ReduceBool => Some(self.mk_int(i64::from(a.realvalue != 0.0), false, 1, span)),
                        _ => return Err(error_unsupported("reduction of a real value", span)),
                    }
                } else {
                    let f = reduce_fn(kind).unwrap_or(calc::const_reduce_bool);
                    let bits = f(&a.bits, a.is_signed, Some(1));
                    Some(self.mk_bits(bits, false, span))
                }
            }
            _ if all_const && binary_fn(kind).is_some() => {
                let (Some(a), Some(b)) = (operand(0), operand(1)) else {
                    return Ok(false);
                };
                if a.kind == RealValue || b.kind == RealValue {
                    let (x, y) = (a.as_real(a.is_signed), b.as_real(b.is_signed));
                    match fold_real(kind, x, y) {
                        Some(RealResult::Real(v)) => Some(self.mk_real(v, span)),
                        Some(RealResult::Bool(v)) => Some(self.mk_int(i64::from(v), false, 1, span)),
                        None => return Err(error_unsupported("bitwise operator on a real value", span)),
                    }
                } else {
                    let f = binary_fn(kind).unwrap_or(calc::const_add);
                    let (bits, signed) = if kind.is_comparison() {
                        let cmp_width = a.bits.width().max(b.bits.width());
                        let cmp_signed = a.is_signed && b.is_signed;
                        let bits = f(
                            &a.bits_as_const(Some(cmp_width), cmp_signed),
                            &b.bits_as_const(Some(cmp_width), cmp_signed),
                            cmp_signed,
                            cmp_signed,
                            Some(1),
                        );
                        (bits, false)
                    } else if matches!(kind, LogicAnd | LogicOr) {
                        (f(&a.bits, &b.bits, a.is_signed, b.is_signed, Some(1)), false)
                    } else if is_shift_or_pow(kind) {
                        let sb = matches!(kind, Pow | Shift | ShiftX) && b.is_signed;
                        let bits = f(&a.bits_as_const(width_hint, sign_hint), &b.bits, sign_hint, sb, width_hint);
                        (bits, sign_hint)
                    } else {
                        let bits = f(
                            &a.bits_as_const(width_hint, sign_hint),
                            &b.bits_as_const(width_hint, sign_hint),
                            sign_hint,
                            sign_hint,
                            width_hint,
                        );
                        (bits, sign_hint)
                    };
                    Some(self.mk_bits(bits, signed, span))
                }
            }
            _ => None,
        };
        match folded {
            Some(new) => {
                self.ast.replace_node(id, new);
                self.ast.fixup_hierarchy_flags(id, false);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mk_real(&mut self, value: f64, span: vela_source::Span) -> NodeId {
        let id = self.ast.mkconst_real(value, &Provenance::internal());
        self.ast[id].span = span;
        id
    }

    /// Replaces a reference to a parameter or enum item with its value.
    fn fold_identifier(&mut self, id: NodeId) -> ElabResult<Option<NodeId>> {
        let node = &self.ast[id];
        if node.in_lvalue {
            return Ok(None);
        }
        let Some(decl) = node.id2ast.filter(|&d| self.ast.is_live(d)) else {
            return Ok(None);
        };
        let d = &self.ast[decl];
        if !matches!(d.kind, NodeKind::Parameter | NodeKind::Localparam | NodeKind::EnumItem) {
            return Ok(None);
        }
        let Some(value) = d.children.first().copied() else {
            return Ok(None);
        };
        let v = &self.ast[value];
        if v.is_const() == 0 {
            return Ok(None);
        }
        let select = node.children.first().copied();
        let Some(select) = select else {
            let copy = self.ast.clone_subtree(value);
            self.ast[copy].span = self.ast[id].span;
            return Ok(Some(copy));
        };
        let sel = &self.ast[select];
        if sel.kind != NodeKind::Range || !sel.range_valid || v.kind != NodeKind::Constant {
            return Ok(None);
        }
        let param_upto = d.range_valid && d.range_swapped;
        let param_offset = if d.range_valid { d.range_right } else { 0 };
        let param_width = if d.range_valid {
            d.range_left - d.range_right + 1
        } else {
            v.bits.width() as i32
        };
        let (mut left, mut right) = (sel.range_left, sel.range_right);
        if param_upto {
            left = (param_width + 2 * param_offset) - sel.range_right - 1;
            right = (param_width + 2 * param_offset) - sel.range_left - 1;
        }
        let mut bits = LogicVec::new(0);
        for i in right..=left {
            let index = i - param_offset;
            if (0..param_width).contains(&index) {
                bits.push(v.bits.get(index as u32));
            } else {
                bits.push(Logic::X);
            }
        }
        let span = self.ast[id].span;
        Ok(Some(self.mk_bits(bits, false, span)))
    }

    /// Folds system functions with constant arguments and calls of constant
    /// functions.
    fn fold_call(&mut self, id: NodeId) -> ElabResult<Option<NodeId>> {
        let name = self.ast[id].name.clone();
        let span = self.ast.span(id);
        let args = self.ast.children(id).to_vec();
        if !name.starts_with('$') {
            return self.fold_user_call(id);
        }
        let arg_count = |min: usize, max: usize| -> ElabResult<()> {
            if args.len() < min || args.len() > max {
                return Err(fatal(
                    crate::errors::E316,
                    format!("wrong number of arguments to `{name}`"),
                    span,
                ));
            }
            Ok(())
        };
        match name.as_str() {
            "$bits" => {
                arg_count(1, 1)?;
                let width = self.bits_of(args[0])?;
                Ok(width.map(|w| self.mk_int(w, true, 32, span)))
            }
            "$size" | "$left" | "$right" | "$high" | "$low" => {
                arg_count(1, 2)?;
                self.fold_array_query(id, &name, &args)
            }
            _ => {
                let all_const = args.iter().all(|&a| self.ast[a].is_const() > 0);
                if !all_const {
                    return match name.as_str() {
                        "$clog2" | "$countones" | "$onehot" | "$onehot0" | "$isunknown" | "$rtoi"
                        | "$itor" => Ok(None),
                        _ => Err(error_unsupported(&format!("system function `{name}`"), span)),
                    };
                }
                let arg = args.first().map(|&a| self.ast[a].clone());
                let folded = match (name.as_str(), arg) {
                    ("$clog2", Some(a)) => {
                        arg_count(1, 1)?;
                        let Some(v) = calc::clog2(&a.bits) else {
                            return Err(error_not_const("argument of `$clog2`", span));
                        };
                        self.mk_int(i64::from(v), true, 32, span)
                    }
                    ("$countones", Some(a)) => {
                        arg_count(1, 1)?;
                        self.mk_int(i64::from(a.bits.count_ones()), true, 32, span)
                    }
                    ("$onehot", Some(a)) => {
                        arg_count(1, 1)?;
                        self.mk_int(i64::from(a.bits.count_ones() == 1), false, 1, span)
                    }
                    ("$onehot0", Some(a)) => {
                        arg_count(1, 1)?;
                        self.mk_int(i64::from(a.bits.count_ones() <= 1), false, 1, span)
                    }
                    ("$isunknown", Some(a)) => {
                        arg_count(1, 1)?;
                        self.mk_int(i64::from(!a.bits.is_fully_def()), false, 1, span)
                    }
                    ("$rtoi", Some(a)) => {
                        arg_count(1, 1)?;
                        let v = a.as_real(a.is_signed).trunc() as i64;
                        self.mk_int(v, true, 32, span)
                    }
                    ("$itor", Some(a)) => {
                        arg_count(1, 1)?;
                        let v = a.as_real(a.is_signed);
                        self.mk_real(v, span)
                    }
                    _ => return Err(error_unsupported(&format!("system function `{name}`"), span)),
                };
                Ok(Some(folded))
            }
        }
    }

    /// Width of a type name, signal or expression for `$bits`.
    fn bits_of(&mut self, arg: NodeId) -> ElabResult<Option<i64>> {
        if self.ast.kind(arg) == NodeKind::Identifier && self.ast.children(arg).is_empty() {
            let decl = self.ast[arg].id2ast.filter(|&d| self.ast.is_live(d));
            if let Some(decl) = decl {
                match self.ast.kind(decl) {
                    NodeKind::Typedef => {
                        let Some(base) = self.ast.child(decl, 0) else {
                            return Ok(None);
                        };
                        return match self.ast.kind(base) {
                            NodeKind::Struct | NodeKind::Union => Ok(Some(self.struct_width(base)?)),
                            NodeKind::Enum => Ok(Some(32)),
                            NodeKind::Wire => {
                                self.simplify_wire(base, 1)?;
                                let b = &self.ast[base];
                                Ok(Some(self.decl_bits(b)))
                            }
                            _ => Ok(None),
                        };
                    }
                    NodeKind::Wire | NodeKind::Memory | NodeKind::Autowire => {
                        let d = &self.ast[decl];
                        if !d.range_valid {
                            return Ok(None);
                        }
                        return Ok(Some(self.decl_bits(d)));
                    }
                    _ => {}
                }
            }
        }
        match self.detect(arg) {
            Ok(sw) => Ok(Some(i64::from(sw.width))),
            Err(_) => Ok(None),
        }
    }

    fn decl_bits(&self, d: &vela_ast::Node) -> i64 {
        match d.kind {
            NodeKind::Memory => d.dimensions.iter().map(|dim| i64::from(dim.range_width)).product(),
            _ => i64::from(d.range_width()),
        }
    }

    /// `$size`, `$left`, `$right`, `$high` and `$low` over a declared
    /// dimension, the first by default.
    fn fold_array_query(&mut self, id: NodeId, name: &str, args: &[NodeId]) -> ElabResult<Option<NodeId>> {
        let span = self.ast.span(id);
        let target = args[0];
        if self.ast.kind(target) != NodeKind::Identifier {
            return Err(error_unsupported(&format!("`{name}` of an expression"), span));
        }
        let Some(decl) = self.ast[target].id2ast.filter(|&d| self.ast.is_live(d)) else {
            return Ok(None);
        };
        let d = &self.ast[decl];
        if !matches!(d.kind, NodeKind::Wire | NodeKind::Memory | NodeKind::Autowire) || !d.range_valid {
            return Ok(None);
        }
        let dim_index = match args.get(1) {
            Some(&a) if self.ast[a].kind == NodeKind::Constant => self.ast[a].as_int(self.ast[a].is_signed),
            Some(_) => return Ok(None),
            None => 1,
        };
        let dims = if d.dimensions.is_empty() {
            vec![vela_ast::Dimension {
                range_right: d.range_right,
                range_width: d.range_width(),
                range_swapped: d.range_swapped,
            }]
        } else {
            d.dimensions.clone()
        };
        let Some(dim) = usize::try_from(dim_index - 1).ok().and_then(|i| dims.get(i)) else {
            return Err(fatal(
                E301,
                format!("dimension {dim_index} of `{}` is out of range", d.name),
                span,
            ));
        };
        let low = i64::from(dim.range_right);
        let high = low + i64::from(dim.range_width) - 1;
        let (left, right) = if dim.range_swapped { (low, high) } else { (high, low) };
        let value = match name {
            "$size" => i64::from(dim.range_width),
            "$left" => left,
            "$right" => right,
            "$high" => high,
            _ => low,
        };
        Ok(Some(self.mk_int(value, true, 32, span)))
    }

    /// Evaluates a call of a user function whose arguments are constant.
    fn fold_user_call(&mut self, id: NodeId) -> ElabResult<Option<NodeId>> {
        let Some(func) = self.ast[id].id2ast.filter(|&f| self.ast.is_live(f)) else {
            return Ok(None);
        };
        if self.ast.kind(func) != NodeKind::Function {
            return Ok(None);
        }
        let in_param = self.ast[id].in_param;
        let all_const = self.ast.children(id).iter().all(|&a| self.ast[a].is_const() > 0);
        if !all_const {
            if in_param {
                return Err(error_not_const(
                    &format!("call of function `{}`", self.ast[id].name),
                    self.ast.span(id),
                ));
            }
            return Ok(None);
        }
        let must = in_param || self.has_const_only_constructs(func) || self.is_recursive_function(func);
        self.eval_const_function(id, must)
    }

    /// Chooses a branch of a conditional with a constant condition, or merges
    /// two constant branches under an undefined one.
    fn fold_ternary(&mut self, id: NodeId, width_hint: Option<u32>, sign_hint: bool) -> ElabResult<bool> {
        let children = self.ast.children(id).to_vec();
        let [cond, a, b] = children.as_slice() else {
            return Ok(false);
        };
        let span = self.ast.span(id);
        let c = &self.ast[*cond];
        let choice = match c.is_const() {
            0 => return Ok(false),
            2 => Some(if c.realvalue != 0.0 { 1 } else { 2 }),
            _ => {
                let sure_true = c.bits.iter().any(|bit| bit == Logic::One);
                let maybe_true = c.bits.iter().any(|bit| !bit.is_definite());
                if sure_true {
                    Some(1)
                } else if !maybe_true {
                    Some(2)
                } else {
                    None
                }
            }
        };
        let new = match choice {
            Some(index) => {
                let branch = children[index];
                let bn = &self.ast[branch];
                match bn.is_const() {
                    1 => {
                        let bits = bn.bits_as_const(width_hint, sign_hint);
                        if bn.is_string && bits.width() % 8 == 0 && !sign_hint {
                            let text = bits.decode_string();
                            let s = self.ast.mkconst_str(&text, &Provenance::internal());
                            self.ast[s].span = span;
                            s
                        } else {
                            self.mk_bits(bits, sign_hint, span)
                        }
                    }
                    2 => self.ast.take_child(id, index),
                    _ => {
                        let branch_signed = self.detect(branch).map(|sw| sw.signed).unwrap_or(false);
                        let branch = self.ast.take_child(id, index);
                        if branch_signed && !sign_hint {
                            self.mk_node(NodeKind::ToUnsigned, vec![branch], span)
                        } else {
                            branch
                        }
                    }
                }
            }
            None => {
                let (x, y) = (&self.ast[*a], &self.ast[*b]);
                if x.is_const() != 1 || y.is_const() != 1 {
                    return Ok(false);
                }
                let xb = x.bits_as_const(width_hint, sign_hint);
                let yb = y.bits_as_const(width_hint, sign_hint);
                let merged: LogicVec = xb
                    .iter()
                    .zip(yb.iter())
                    .map(|(p, q)| if p == q { p } else { Logic::X })
                    .collect();
                self.mk_bits(merged, sign_hint, span)
            }
        };
        self.ast.replace_node(id, new);
        self.ast.fixup_hierarchy_flags(id, false);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use vela_ast::{Ast, Builder, NodeKind};
    use vela_common::LogicVec;

    use vela_diagnostics::DiagnosticCode;

    use crate::errors::{E301, E302};
    use crate::simplify::tests::{simplified, Fixture};

    fn fold_in_module(build: impl FnOnce(&mut Builder<'_>) -> vela_ast::NodeId) -> (Ast, vela_ast::NodeId) {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let expr = build(&mut b);
        let p = b.localparam("P", expr);
        let m = b.module("m", vec![p]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        let value = ast.children(p)[0];
        (ast, value)
    }

    fn fold_error(build: impl FnOnce(&mut Builder<'_>) -> vela_ast::NodeId) -> DiagnosticCode {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let expr = build(&mut b);
        let p = b.localparam("P", expr);
        let m = b.module("m", vec![p]);
        let fx = Fixture::new();
        let err = simplified(&mut ast, m, &fx).unwrap_err();
        err.diagnostic().unwrap().code
    }

    #[test]
    fn addition_wraps_at_operand_width() {
        let (ast, v) = fold_in_module(|b| {
            let x = b.sized(3, 6);
            let y = b.sized(3, 3);
            b.binop(NodeKind::Add, x, y)
        });
        assert_eq!(ast[v].bits, LogicVec::from_u64(1, 3));
        let (ast, v) = fold_in_module(|b| {
            let x = b.sized(3, 5);
            let y = b.sized(3, 2);
            b.binop(NodeKind::Add, x, y)
        });
        assert_eq!(ast[v].bits, LogicVec::from_u64(7, 3));
    }

    #[test]
    fn comparison_is_one_bit() {
        let (ast, v) = fold_in_module(|b| {
            let x = b.sized_signed(4, -2);
            let y = b.sized_signed(4, 1);
            b.binop(NodeKind::Lt, x, y)
        });
        assert_eq!(ast[v].bits.width(), 1);
        assert!(ast[v].as_bool());
    }

    #[test]
    fn concat_and_replicate() {
        let (ast, v) = fold_in_module(|b| {
            let x = b.sized(2, 0b10);
            let y = b.sized(2, 0b01);
            b.concat(vec![x, y])
        });
        assert_eq!(ast[v].as_int(false), 0b1001);
        let (ast, v) = fold_in_module(|b| {
            let n = b.int(3);
            let x = b.sized(2, 0b10);
            b.replicate(n, vec![x])
        });
        assert_eq!(ast[v].bits.width(), 6);
        assert_eq!(ast[v].as_int(false), 0b101010);
    }

    #[test]
    fn replication_past_the_width_limit_is_fatal() {
        let code = fold_error(|b| {
            let n = b.sized(40, 4_294_967_297);
            let x = b.sized(2, 0b10);
            b.replicate(n, vec![x])
        });
        assert_eq!(code, E301);
        let code = fold_error(|b| {
            let n = b.sized(32, 1 << 24);
            let x = b.sized(1, 1);
            b.replicate(n, vec![x])
        });
        assert_eq!(code, E301);
    }

    #[test]
    fn negative_replication_count_is_fatal() {
        let code = fold_error(|b| {
            let n = b.int(-1);
            let x = b.sized(2, 0b10);
            b.replicate(n, vec![x])
        });
        assert_eq!(code, E302);
    }

    #[test]
    fn size_cast_resizes_and_checks_the_limit() {
        let (ast, v) = fold_in_module(|b| {
            let n = b.int(8);
            let x = b.sized(3, 5);
            b.node(NodeKind::CastSize, vec![n, x])
        });
        assert_eq!(ast[v].bits.width(), 8);
        assert_eq!(ast[v].as_int(false), 5);
        let code = fold_error(|b| {
            let n = b.sized(40, (1 << 32) + 4);
            let x = b.sized(3, 5);
            b.node(NodeKind::CastSize, vec![n, x])
        });
        assert_eq!(code, E301);
    }

    #[test]
    fn clog2_and_ternary() {
        let (ast, v) = fold_in_module(|b| {
            let x = b.int(17);
            b.fcall("$clog2", vec![x])
        });
        assert_eq!(ast[v].as_int(true), 5);
        let (ast, v) = fold_in_module(|b| {
            let c = b.sized(1, 0);
            let x = b.sized(4, 3);
            let y = b.sized(4, 9);
            b.ternary(c, x, y)
        });
        assert_eq!(ast[v].as_int(false), 9);
    }

    #[test]
    fn undefined_condition_merges_branches() {
        let (ast, v) = fold_in_module(|b| {
            let c = b.binary("x");
            let x = b.sized(2, 0b10);
            let y = b.sized(2, 0b11);
            b.ternary(c, x, y)
        });
        let bits = &ast[v].bits;
        assert_eq!(bits.get(1), vela_common::Logic::One);
        assert_eq!(bits.get(0), vela_common::Logic::X);
    }

    #[test]
    fn parameter_bit_select() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let v = b.sized(8, 0xA5);
        let p = b.parameter("P", v);
        let hi = b.int(7);
        let lo = b.int(4);
        let sel = b.part("P", hi, lo);
        let q = b.localparam("Q", sel);
        let m = b.module("m", vec![p, q]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        let value = ast.children(q)[0];
        assert_eq!(ast[value].as_int(false), 0xA);
        assert!(!ast[value].is_signed);
    }

    #[test]
    fn real_arithmetic_folds_in_floating_point() {
        let (ast, v) = fold_in_module(|b| {
            let x = b.real(1.5);
            let y = b.real(2.0);
            b.binop(NodeKind::Mul, x, y)
        });
        assert_eq!(ast[v].kind, NodeKind::RealValue);
        assert_eq!(ast[v].realvalue, 3.0);
    }
}
