//! Width and signedness inference.
//!
//! Verilog sizes an expression from its context: operands of arithmetic and
//! bitwise operators are extended to the width demanded by the enclosing
//! expression, while operands of reductions, logic operators, shift amounts,
//! comparisons and concatenations are sized on their own. [`detect_sign_width`]
//! computes the natural width and signedness of an expression bottom-up; the
//! simplifier and the code generator combine it with the context they know.
//!
//! Inference never mutates the tree. It expects the constant parts it needs
//! (parameter values, replication counts, declared ranges) to have been folded
//! already and reports a fatal error otherwise.

use vela_ast::{Ast, NodeId, NodeKind};
use vela_source::Span;

use crate::context::Scope;
use crate::errors::{error_range_not_const, error_unresolved, fatal, ElabResult, E301, E302};

/// Widest expression the elaborator accepts.
pub const WIDTH_LIMIT: u32 = 1 << 24;

/// The outcome of width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignWidth {
    /// Natural width; 0 when nothing in the expression has a width.
    pub width: u32,
    /// True if every contributing operand is signed.
    pub signed: bool,
    /// True if a real-valued operand takes part.
    pub found_real: bool,
}

/// Natural width and signedness of `id`.
pub fn detect_sign_width(ast: &Ast, scope: &Scope, id: NodeId) -> ElabResult<SignWidth> {
    let mut worker = WidthWorker {
        ast,
        scope,
        found_real: false,
    };
    let mut width = 0;
    let mut signed = true;
    worker.visit(id, &mut width, &mut signed)?;
    if worker.found_real {
        signed = true;
    }
    Ok(SignWidth {
        width: check_width_limit(u64::from(width), ast.span(id))?,
        signed,
        found_real: worker.found_real,
    })
}

/// `width` as a `u32`, or a fatal error if it reaches [`WIDTH_LIMIT`].
pub fn check_width_limit(width: u64, span: Span) -> ElabResult<u32> {
    match u32::try_from(width) {
        Ok(w) if w < WIDTH_LIMIT => Ok(w),
        _ => Err(fatal(
            E301,
            format!("expression width {width} exceeds the limit of {WIDTH_LIMIT}"),
            span,
        )),
    }
}

/// Width and signedness shared by the operands of a comparison or by a case
/// subject and its labels: the maximum width, signed only if all are.
pub fn detect_common_sign_width(ast: &Ast, scope: &Scope, ids: &[NodeId]) -> ElabResult<SignWidth> {
    let mut out = SignWidth {
        width: 0,
        signed: true,
        found_real: false,
    };
    for &id in ids {
        let sw = detect_sign_width(ast, scope, id)?;
        out.width = out.width.max(sw.width);
        out.signed &= sw.signed;
        out.found_real |= sw.found_real;
    }
    Ok(out)
}

/// Width of a `Range` select or declaration.
///
/// A single index selects one bit. Two bounds that have not been folded are
/// evaluated with every identifier taken as zero, which sizes indexed part
/// selects such as `[i*8+7:i*8]`.
pub fn range_width(ast: &Ast, range: NodeId) -> ElabResult<u32> {
    let node = &ast[range];
    if node.children.len() == 1 {
        return Ok(1);
    }
    if node.range_valid {
        return check_width_limit(u64::from(node.range_left.abs_diff(node.range_right)) + 1, node.span);
    }
    let (Some(&msb), Some(&lsb)) = (node.children.first(), node.children.get(1)) else {
        return Err(error_range_not_const("select", node.span));
    };
    match (eval_at_zero(ast, msb), eval_at_zero(ast, lsb)) {
        (Some(l), Some(r)) => check_width_limit(l.abs_diff(r).saturating_add(1), node.span),
        _ => Err(fatal(
            E301,
            "unsupported expression in dynamic range select",
            node.span,
        )),
    }
}

/// Evaluates a simple integer expression with every identifier that is not a
/// folded parameter read as zero.
pub fn eval_at_zero(ast: &Ast, id: NodeId) -> Option<i64> {
    let node = &ast[id];
    let arg = |i: usize| node.children.get(i).and_then(|&c| eval_at_zero(ast, c));
    match node.kind {
        NodeKind::Constant => Some(node.as_int(node.is_signed)),
        NodeKind::Identifier => {
            let decl = node.id2ast.and_then(|d| ast.get(d));
            match decl {
                Some(d) if matches!(d.kind, NodeKind::Parameter | NodeKind::Localparam) => d
                    .children
                    .first()
                    .map(|&v| &ast[v])
                    .filter(|v| v.kind == NodeKind::Constant)
                    .map(|v| v.as_int(v.is_signed)),
                _ => Some(0),
            }
        }
        NodeKind::Add => Some(arg(0)?.wrapping_add(arg(1)?)),
        NodeKind::Sub => Some(arg(0)?.wrapping_sub(arg(1)?)),
        NodeKind::Mul => Some(arg(0)?.wrapping_mul(arg(1)?)),
        NodeKind::Neg => Some(arg(0)?.wrapping_neg()),
        NodeKind::Pos | NodeKind::ToSigned | NodeKind::ToUnsigned | NodeKind::SelfSz => arg(0),
        NodeKind::ShiftLeft => Some(arg(0)?.wrapping_shl(arg(1)? as u32)),
        NodeKind::ShiftRight => Some(arg(0)?.wrapping_shr(arg(1)? as u32)),
        _ => None,
    }
}

/// Width of the value of a parameter, enum item or local parameter.
fn param_width(ast: &Ast, decl: NodeId, found_real: &mut bool) -> ElabResult<u32> {
    let node = &ast[decl];
    if let Some(&range) = node.children.get(1) {
        if ast[range].kind == NodeKind::Range && ast[range].range_valid {
            return range_width(ast, range);
        }
    }
    match node.children.first().map(|&v| &ast[v]) {
        Some(v) if v.kind == NodeKind::Constant => Ok(v.bits.width()),
        Some(v) if v.kind == NodeKind::RealValue => {
            *found_real = true;
            Ok(32)
        }
        _ => Err(fatal(
            E302,
            format!("failed to detect the width of parameter `{}`", node.name),
            node.span,
        )),
    }
}

/// Width of the result variable of function `func`.
fn function_result_width(ast: &Ast, func: NodeId) -> ElabResult<(u32, bool)> {
    let name = &ast[func].name;
    let result = ast
        .children(func)
        .iter()
        .copied()
        .find(|&c| ast[c].kind == NodeKind::Wire && &ast[c].name == name);
    let Some(result) = result else {
        return Ok((1, false));
    };
    let wire = &ast[result];
    if wire.range_valid {
        return Ok((wire.range_left.abs_diff(wire.range_right) + 1, wire.is_signed));
    }
    match wire.children.first() {
        Some(&range) if ast[range].kind == NodeKind::Range => {
            let width = match (
                ast[range].children.first().and_then(|&c| const_int(ast, c)),
                ast[range].children.get(1).and_then(|&c| const_int(ast, c)),
            ) {
                (Some(l), Some(r)) => l.abs_diff(r) as u32 + 1,
                _ => {
                    return Err(fatal(
                        E301,
                        format!("function `{name}` has a non-constant width"),
                        wire.span,
                    ))
                }
            };
            Ok((width, wire.is_signed))
        }
        _ => Ok((1, wire.is_signed)),
    }
}

fn const_int(ast: &Ast, id: NodeId) -> Option<i64> {
    let node = &ast[id];
    (node.kind == NodeKind::Constant).then(|| node.as_int(node.is_signed))
}

struct WidthWorker<'a> {
    ast: &'a Ast,
    scope: &'a Scope,
    found_real: bool,
}

impl WidthWorker<'_> {
    fn decl_of(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.ast[id];
        node.id2ast
            .filter(|&d| self.ast.is_live(d))
            .or_else(|| self.scope.get(&node.name).copied())
    }

    fn visit(&mut self, id: NodeId, width: &mut u32, sign: &mut bool) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let children = &node.children;
        match node.kind {
            NodeKind::None => {}
            NodeKind::Constant => {
                *width = (*width).max(node.bits.width());
                if !node.is_signed {
                    *sign = false;
                }
            }
            NodeKind::RealValue => {
                self.found_real = true;
                *width = (*width).max(32);
            }
            NodeKind::Identifier => self.visit_identifier(id, width, sign)?,
            NodeKind::Prefix => {
                let index = children.first().map(|&c| &ast[c]);
                let member = children.get(1).map(|&c| &ast[c].name);
                match (index, member) {
                    (Some(index), Some(member)) if index.kind == NodeKind::Constant => {
                        let name = format!("{}[{}].{}", node.name, index.as_int(index.is_signed), member);
                        let Some(&decl) = self.scope.get(&name) else {
                            return Err(error_unresolved(&name, node.span));
                        };
                        let (w, s) = self.decl_width(decl, &mut None)?;
                        *width = (*width).max(w);
                        *sign &= s;
                    }
                    _ => return Err(error_range_not_const("generate block index", node.span)),
                }
            }
            NodeKind::ToSigned => {
                let mut sub_sign = true;
                self.visit_child(id, 0, width, &mut sub_sign)?;
            }
            NodeKind::ToUnsigned => {
                let mut sub_sign = true;
                self.visit_child(id, 0, width, &mut sub_sign)?;
                *sign = false;
            }
            NodeKind::SelfSz => {
                let mut sub_width = 0;
                self.visit_child(id, 0, &mut sub_width, sign)?;
                *width = (*width).max(sub_width);
            }
            NodeKind::CastSize => {
                let size = children
                    .first()
                    .and_then(|&c| const_int(ast, c))
                    .filter(|&s| s > 0)
                    .ok_or_else(|| fatal(E302, "size cast with a non-constant or non-positive size", node.span))?;
                self.visit_child(id, 1, width, sign)?;
                *width = (*width).max(check_width_limit(size.unsigned_abs(), node.span)?);
            }
            NodeKind::Concat => {
                let mut total = 0u32;
                for &child in children {
                    let mut sub_width = 0;
                    let mut sub_sign = true;
                    self.visit(child, &mut sub_width, &mut sub_sign)?;
                    total = total.saturating_add(sub_width);
                }
                *width = (*width).max(total);
                *sign = false;
            }
            NodeKind::Replicate => {
                let count = children
                    .first()
                    .and_then(|&c| const_int(ast, c))
                    .ok_or_else(|| fatal(E302, "replication count is not constant", node.span))?;
                let mut sub_width = 0;
                let mut sub_sign = true;
                self.visit_child(id, 1, &mut sub_width, &mut sub_sign)?;
                let total = (count.max(0) as u64).saturating_mul(u64::from(sub_width));
                *width = (*width).max(total.min(u64::from(u32::MAX)) as u32);
                *sign = false;
            }
            NodeKind::Neg | NodeKind::BitNot | NodeKind::Pos => self.visit_child(id, 0, width, sign)?,
            NodeKind::BitAnd
            | NodeKind::BitOr
            | NodeKind::BitXor
            | NodeKind::BitXnor
            | NodeKind::Add
            | NodeKind::Sub
            | NodeKind::Mul
            | NodeKind::Div
            | NodeKind::Mod => {
                for &child in children {
                    self.visit(child, width, sign)?;
                }
            }
            NodeKind::ReduceAnd
            | NodeKind::ReduceOr
            | NodeKind::ReduceXor
            | NodeKind::ReduceXnor
            | NodeKind::ReduceBool
            | NodeKind::LogicAnd
            | NodeKind::LogicOr
            | NodeKind::LogicNot => {
                *width = (*width).max(1);
                *sign = false;
            }
            kind if kind.is_comparison() => {
                *width = (*width).max(1);
                *sign = false;
            }
            NodeKind::ShiftLeft
            | NodeKind::ShiftRight
            | NodeKind::ShiftSleft
            | NodeKind::ShiftSright
            | NodeKind::ShiftX
            | NodeKind::Shift
            | NodeKind::Pow => self.visit_child(id, 0, width, sign)?,
            NodeKind::Ternary => {
                self.visit_child(id, 1, width, sign)?;
                self.visit_child(id, 2, width, sign)?;
            }
            NodeKind::MemRd => {
                let Some(mem) = self.decl_of(id) else {
                    return Err(error_unresolved(&node.name, node.span));
                };
                let (w, s) = self.decl_width(mem, &mut None)?;
                *width = (*width).max(w);
                *sign &= s;
            }
            NodeKind::Case => {
                let mut exprs = vec![children[0]];
                for &item in &children[1..] {
                    for &value in &ast[item].children {
                        if !matches!(ast[value].kind, NodeKind::Default | NodeKind::Block) {
                            exprs.push(value);
                        }
                    }
                }
                let common = detect_common_sign_width(ast, self.scope, &exprs)?;
                *width = common.width;
                *sign = common.signed;
            }
            NodeKind::FCall => self.visit_fcall(id, width, sign)?,
            kind => {
                return Err(fatal(
                    E301,
                    format!("cannot determine the width of a `{kind}` node"),
                    node.span,
                ))
            }
        }
        Ok(())
    }

    fn visit_child(&mut self, id: NodeId, index: usize, width: &mut u32, sign: &mut bool) -> ElabResult<()> {
        match self.ast.child(id, index) {
            Some(child) => self.visit(child, width, sign),
            None => Err(fatal(
                E301,
                format!("malformed `{}` expression", self.ast.kind(id)),
                self.ast.span(id),
            )),
        }
    }

    /// Width and signedness of a declaration, with the select `range` that
    /// applies to it recorded in `select` when the declaration kind has one.
    fn decl_width(&mut self, decl: NodeId, select: &mut Option<usize>) -> ElabResult<(u32, bool)> {
        let ast = self.ast;
        let d = &ast[decl];
        match d.kind {
            NodeKind::Parameter | NodeKind::Localparam | NodeKind::EnumItem => {
                *select = Some(0);
                Ok((param_width(ast, decl, &mut self.found_real)?, d.is_signed || param_is_signed(ast, decl)))
            }
            NodeKind::Wire | NodeKind::Autowire => {
                if !d.range_valid {
                    if d.kind == NodeKind::Autowire {
                        return Ok((1, d.is_signed));
                    }
                    return Err(fatal(
                        E301,
                        format!("failed to detect the width of signal `{}`", d.name),
                        d.span,
                    ));
                }
                *select = Some(0);
                Ok((d.range_left.abs_diff(d.range_right) + 1, d.is_signed))
            }
            NodeKind::Genvar => Ok((32, true)),
            NodeKind::Memory => {
                let word = if d.range_valid {
                    Some(d.range_left.abs_diff(d.range_right) + 1)
                } else {
                    d.children
                        .first()
                        .map(|&r| &ast[r])
                        .filter(|r| r.range_valid)
                        .map(|r| r.range_left.abs_diff(r.range_right) + 1)
                };
                let Some(word) = word else {
                    return Err(fatal(
                        E301,
                        format!("failed to detect the width of memory `{}`", d.name),
                        d.span,
                    ));
                };
                *select = Some(1);
                Ok((word, d.is_signed))
            }
            NodeKind::Function => function_result_width(ast, decl),
            _ => Err(fatal(
                E301,
                format!("failed to detect the width of `{}`", d.name),
                d.span,
            )),
        }
    }

    fn visit_identifier(&mut self, id: NodeId, width: &mut u32, sign: &mut bool) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let Some(decl) = self.decl_of(id) else {
            return Err(error_unresolved(&node.name, node.span));
        };
        let mut select = None;
        let (mut this_width, decl_signed) = self.decl_width(decl, &mut select)?;
        if let Some(range) = select.and_then(|i| node.children.get(i).copied()) {
            if ast[range].kind == NodeKind::Range {
                this_width = range_width(ast, range)?;
                *sign = false;
            }
        }
        *width = (*width).max(this_width);
        if !decl_signed {
            *sign = false;
        }
        Ok(())
    }

    fn visit_fcall(&mut self, id: NodeId, width: &mut u32, sign: &mut bool) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        match node.name.as_str() {
            "$clog2" | "$bits" | "$size" | "$high" | "$low" | "$left" | "$right" | "$countones"
            | "$rtoi" => {
                *width = (*width).max(32);
            }
            "$onehot" | "$onehot0" | "$isunknown" => {
                *width = (*width).max(1);
                *sign = false;
            }
            "$itor" => {
                self.found_real = true;
                *width = (*width).max(32);
            }
            "$signed" => {
                let mut sub_sign = true;
                self.visit_child(id, 0, width, &mut sub_sign)?;
            }
            "$unsigned" => {
                let mut sub_sign = true;
                self.visit_child(id, 0, width, &mut sub_sign)?;
                *sign = false;
            }
            name => {
                let Some(func) = self.decl_of(id) else {
                    return Err(error_unresolved(name, node.span));
                };
                if ast[func].kind != NodeKind::Function {
                    return Err(fatal(
                        E301,
                        format!("call to `{name}` does not name a function"),
                        node.span,
                    ));
                }
                let (w, s) = function_result_width(ast, func)?;
                *width = (*width).max(w);
                *sign &= s;
            }
        }
        Ok(())
    }
}

fn param_is_signed(ast: &Ast, decl: NodeId) -> bool {
    ast.children(decl)
        .first()
        .map(|&v| &ast[v])
        .is_some_and(|v| v.is_signed || v.kind == NodeKind::RealValue)
        && !ast.children(decl).get(1).is_some_and(|&r| ast[r].kind == NodeKind::Range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ast::Builder;

    fn resolve_all(ast: &mut Ast, root: NodeId, scope: &Scope) {
        for id in ast.descendants(root) {
            if ast.kind(id) == NodeKind::Identifier {
                let decl = scope.get(&ast[id].name).copied();
                ast[id].id2ast = decl;
            }
        }
    }

    fn wire_decl(ast: &mut Ast, name: &str, width: u32, signed: bool) -> NodeId {
        let mut b = Builder::new(ast);
        let w = b.wire(name, width);
        ast[w].range_valid = true;
        ast[w].range_left = width as i32 - 1;
        ast[w].range_right = 0;
        ast[w].is_signed = signed;
        w
    }

    #[test]
    fn constants_use_their_own_width() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let a = b.sized(3, 5);
        let c = b.sized(3, 2);
        let sum = b.binop(NodeKind::Add, a, c);
        let sw = detect_sign_width(&ast, &Scope::new(), sum).unwrap();
        assert_eq!(sw.width, 3);
        assert!(!sw.signed);
    }

    #[test]
    fn arithmetic_takes_widest_operand() {
        let mut ast = Ast::new();
        let mut scope = Scope::new();
        let a = wire_decl(&mut ast, "a", 8, true);
        let b_decl = wire_decl(&mut ast, "b", 4, true);
        scope.insert("a".into(), a);
        scope.insert("b".into(), b_decl);
        let mut b = Builder::new(&mut ast);
        let x = b.ident("a");
        let y = b.ident("b");
        let mul = b.binop(NodeKind::Mul, x, y);
        resolve_all(&mut ast, mul, &scope);
        let sw = detect_sign_width(&ast, &scope, mul).unwrap();
        assert_eq!(sw.width, 8);
        assert!(sw.signed);
    }

    #[test]
    fn comparisons_and_reductions_are_one_bit_unsigned() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let a = b.sized_signed(8, -1);
        let c = b.sized_signed(8, 1);
        let lt = b.binop(NodeKind::Lt, a, c);
        let sw = detect_sign_width(&ast, &Scope::new(), lt).unwrap();
        assert_eq!((sw.width, sw.signed), (1, false));
        let mut b = Builder::new(&mut ast);
        let d = b.sized(8, 3);
        let red = b.unop(NodeKind::ReduceXor, d);
        let sw = detect_sign_width(&ast, &Scope::new(), red).unwrap();
        assert_eq!(sw.width, 1);
    }

    #[test]
    fn concat_sums_and_replicate_multiplies() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let a = b.sized(3, 1);
        let c = b.sized_signed(5, 1);
        let cat = b.concat(vec![a, c]);
        assert_eq!(detect_sign_width(&ast, &Scope::new(), cat).unwrap().width, 8);
        let mut b = Builder::new(&mut ast);
        let four = b.int(4);
        let d = b.sized(2, 1);
        let rep = b.replicate(four, vec![d]);
        let sw = detect_sign_width(&ast, &Scope::new(), rep).unwrap();
        assert_eq!((sw.width, sw.signed), (8, false));
    }

    #[test]
    fn selects_are_unsigned_and_sized_by_the_select() {
        let mut ast = Ast::new();
        let mut scope = Scope::new();
        let a = wire_decl(&mut ast, "a", 16, true);
        scope.insert("a".into(), a);
        let mut b = Builder::new(&mut ast);
        let msb = b.int(7);
        let lsb = b.int(4);
        let part = b.part("a", msb, lsb);
        let zero = b.int(0);
        let bit = b.index("a", zero);
        resolve_all(&mut ast, part, &scope);
        resolve_all(&mut ast, bit, &scope);
        let sw = detect_sign_width(&ast, &scope, part).unwrap();
        assert_eq!((sw.width, sw.signed), (4, false));
        assert_eq!(detect_sign_width(&ast, &scope, bit).unwrap().width, 1);
    }

    #[test]
    fn indexed_part_select_is_sized_at_zero() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let i = b.ident("i");
        let eight = b.int(8);
        let base = b.binop(NodeKind::Mul, i, eight);
        let i2 = b.ident("i");
        let eight2 = b.int(8);
        let base2 = b.binop(NodeKind::Mul, i2, eight2);
        let seven = b.int(7);
        let top = b.binop(NodeKind::Add, base2, seven);
        let range = b.range_expr(top, base);
        assert_eq!(range_width(&ast, range).unwrap(), 8);
    }

    #[test]
    fn reals_are_flagged() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let r = b.real(1.5);
        let one = b.sized(4, 1);
        let sum = b.binop(NodeKind::Add, r, one);
        let sw = detect_sign_width(&ast, &Scope::new(), sum).unwrap();
        assert!(sw.found_real);
        assert!(sw.signed);
        assert_eq!(sw.width, 32);
    }

    #[test]
    fn system_functions_have_fixed_widths() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let v = b.sized(4, 9);
        let clog = b.fcall("$clog2", vec![v]);
        let sw = detect_sign_width(&ast, &Scope::new(), clog).unwrap();
        assert_eq!(sw.width, 32);
        let mut b = Builder::new(&mut ast);
        let v = b.sized(4, 9);
        let onehot = b.fcall("$onehot", vec![v]);
        assert_eq!(detect_sign_width(&ast, &Scope::new(), onehot).unwrap().width, 1);
    }

    #[test]
    fn unresolved_identifier_is_fatal() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let x = b.ident("nope");
        let err = detect_sign_width(&ast, &Scope::new(), x).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, crate::errors::E300);
    }

    #[test]
    fn widths_never_shrink_across_simplification() {
        use crate::simplify::tests::{simplified, Fixture};
        use crate::simplify::Simplifier;

        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let a = b.input("a", 8);
        let c = b.input("c", 4);
        let y = b.wire("y", 16);
        let mut rhs = Vec::new();
        let x = b.ident("a");
        let k = b.sized(4, 3);
        rhs.push(b.binop(NodeKind::Add, x, k));
        let x = b.ident("c");
        let k = b.sized(2, 1);
        rhs.push(b.concat(vec![x, k]));
        let two = b.int(2);
        let x = b.ident("c");
        rhs.push(b.replicate(two, vec![x]));
        let x = b.ident("c");
        let k = b.sized(4, 2);
        rhs.push(b.binop(NodeKind::Eq, x, k));
        let k = b.sized(4, 3);
        let l = b.sized(6, 1);
        rhs.push(b.binop(NodeKind::Add, k, l));
        let mut items = vec![a, c, y];
        let mut assigns = Vec::new();
        for &e in &rhs {
            let lhs = b.ident("y");
            let assign = b.assign(lhs, e);
            assigns.push(assign);
            items.push(assign);
        }
        let m = b.module("m", items);

        let measure = |ast: &Ast, scope: &Scope| -> Vec<u32> {
            assigns
                .iter()
                .map(|&s| detect_sign_width(ast, scope, ast.children(s)[1]).map_or(0, |sw| sw.width))
                .collect()
        };
        let mut widths = measure(&ast, &Scope::new());
        assert_eq!(widths[4], 6);
        let fx = Fixture::new();
        let mut ctx = simplified(&mut ast, m, &fx).unwrap();
        for pass in 0..4 {
            if pass > 0 {
                Simplifier::new(&mut ast, &mut ctx, fx.env())
                    .simplify(m, true, 2, None, false)
                    .unwrap();
            }
            let now = measure(&ast, &ctx.scope);
            for (i, (before, after)) in widths.iter().zip(&now).enumerate() {
                assert!(after >= before, "expression {i} shrank from {before} to {after} in pass {pass}");
            }
            widths = now;
        }
        assert_eq!(widths[3], 1);
        assert!(widths[0] >= 8 && widths[2] >= 8);
    }

    #[test]
    fn inferred_width_is_at_least_every_operand() {
        let mut ast = Ast::new();
        for (wa, wb) in [(1u32, 7u32), (9, 3), (16, 16), (2, 33)] {
            let mut b = Builder::new(&mut ast);
            let a = b.sized(wa, 1);
            let c = b.sized(wb, 1);
            for kind in [NodeKind::Add, NodeKind::Sub, NodeKind::BitAnd, NodeKind::Mul] {
                let mut b = Builder::new(&mut ast);
                let a2 = b.ast().clone_subtree(a);
                let c2 = b.ast().clone_subtree(c);
                let e = b.binop(kind, a2, c2);
                let sw = detect_sign_width(&ast, &Scope::new(), e).unwrap();
                assert!(sw.width >= wa && sw.width >= wb);
            }
        }
    }
}
