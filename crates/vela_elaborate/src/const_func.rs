//! Elaboration-time evaluation of user functions.
//!
//! A call whose arguments are constant is run by a small interpreter over
//! the function body. Local variables live in a store keyed by name; every
//! expression is evaluated on a copy with the current variable values
//! substituted and folded by the simplifier. Nested calls go through the same
//! folding, so recursion needs no special handling beyond the call stack
//! kept in the module context.

use std::collections::HashMap;

use vela_ast::{NodeId, NodeKind};
use vela_common::calc::const_eq;
use vela_common::{Logic, LogicVec};
use vela_source::Span;

use crate::errors::{error_not_const, error_unsupported, fatal, ElabError, ElabResult, E303, E304, E305, E316};
use crate::simplify::Simplifier;

/// A local variable of a function being evaluated.
#[derive(Debug, Clone)]
pub struct VarInfo {
    /// Current value, least significant bit first.
    pub value: LogicVec,
    /// Index of the least significant bit.
    pub offset: i32,
    /// True when declared `[low:high]`.
    pub range_swapped: bool,
    /// Signedness of the declaration.
    pub is_signed: bool,
    /// False for an input whose width follows the argument.
    pub explicitly_sized: bool,
}

impl VarInfo {
    /// Bit position of the least significant bit of `[msb:lsb]` (or
    /// `[lsb:msb]` for a swapped declaration) and the number of bits.
    fn slice(&self, left: i64, right: i64) -> (i64, u32) {
        let width = (left - right).unsigned_abs() as u32 + 1;
        let low = if self.range_swapped {
            i64::from(self.offset) + i64::from(self.value.width()) - 1 - left.max(right)
        } else {
            left.min(right) - i64::from(self.offset)
        };
        (low, width)
    }
}

type Vars = HashMap<String, VarInfo>;

/// Why statement execution stopped early.
enum Halt {
    /// A value was not constant and the caller may fall back to runtime
    /// evaluation.
    NotConst,
    Error(ElabError),
}

impl From<ElabError> for Halt {
    fn from(err: ElabError) -> Self {
        Halt::Error(err)
    }
}

type Exec<T> = Result<T, Halt>;

impl Simplifier<'_, '_> {
    /// Evaluates the call `call` of a user function with constant arguments.
    ///
    /// Returns the result constant, owned by the caller. With `must` unset,
    /// `None` means some part of the body was not constant.
    pub(crate) fn eval_const_function(&mut self, call: NodeId, must: bool) -> ElabResult<Option<NodeId>> {
        let span = self.ast.span(call);
        let name = self.ast[call].name.clone();
        let Some(func) = self.ast[call].id2ast.filter(|&f| self.ast.kind(f) == NodeKind::Function) else {
            return Ok(None);
        };
        let args: Vec<(LogicVec, bool)> = self
            .ast
            .children(call)
            .iter()
            .map(|&a| {
                let node = &self.ast[a];
                if node.is_const() == 2 {
                    (node.real_as_const(32), true)
                } else {
                    (node.bits.clone(), node.is_signed)
                }
            })
            .collect();

        let key = (name.clone(), args.iter().map(|(bits, _)| bits.clone()).collect::<Vec<_>>());
        if self.ctx.call_stack.contains(&key) {
            return Err(fatal(
                E305,
                format!("function `{name}` depends on its own value for the same arguments"),
                span,
            ));
        }
        if self.ctx.call_stack.len() as u32 >= self.env.options.max_recursion_depth {
            return Err(fatal(
                E304,
                format!(
                    "recursion of function `{name}` exceeds the limit of {}",
                    self.env.options.max_recursion_depth
                ),
                span,
            ));
        }
        log::trace!("evaluating `{name}` at elaboration time ({} arguments)", args.len());
        self.ctx.call_stack.push(key);
        let result = self.run_function(func, &name, &args, must, span);
        self.ctx.call_stack.pop();

        match result {
            Ok(node) => Ok(Some(node)),
            Err(Halt::Error(err)) => Err(err),
            Err(Halt::NotConst) if must => Err(error_not_const(&format!("constant function `{name}`"), span)),
            Err(Halt::NotConst) => Ok(None),
        }
    }

    fn run_function(
        &mut self,
        func: NodeId,
        name: &str,
        args: &[(LogicVec, bool)],
        must: bool,
        span: Span,
    ) -> Exec<NodeId> {
        let mut vars = Vars::new();
        let mut inputs = args.iter();
        let mut body = Vec::new();
        for child in self.ast.children(func).to_vec() {
            match self.ast.kind(child) {
                NodeKind::Wire => {
                    let is_input = self.ast[child].is_input;
                    let arg = if is_input {
                        let Some(arg) = inputs.next() else {
                            return Err(fatal(E316, format!("too few arguments in call of `{name}`"), span).into());
                        };
                        Some(arg)
                    } else {
                        None
                    };
                    self.declare_var(child, &mut vars, arg, must)?;
                }
                _ => body.push(child),
            }
        }
        if inputs.next().is_some() {
            return Err(fatal(E316, format!("too many arguments in call of `{name}`"), span).into());
        }
        for stmt in body {
            self.exec_stmt(stmt, &mut vars, must)?;
        }
        let Some(result) = vars.get(name) else {
            return Err(error_unsupported(&format!("function `{name}` without a result"), span).into());
        };
        let value = result.value.clone();
        let signed = result.is_signed;
        Ok(self.mk_bits(value, signed, span))
    }

    /// Adds the variable declared by `wire`, set to `arg` for an input and
    /// to all-X otherwise.
    fn declare_var(&mut self, wire: NodeId, vars: &mut Vars, arg: Option<&(LogicVec, bool)>, must: bool) -> Exec<()> {
        let (name, signed) = (self.ast[wire].name.clone(), self.ast[wire].is_signed);
        let range = self
            .ast
            .children(wire)
            .first()
            .copied()
            .filter(|&r| self.ast.kind(r) == NodeKind::Range);
        let (width, offset, swapped, sized) = match range {
            Some(range) => {
                let (left, right) = self.eval_range(range, vars, must)?;
                let width = (left - right).unsigned_abs() as u32 + 1;
                (width, left.min(right) as i32, right > left, true)
            }
            None => match arg {
                Some((bits, _)) => (bits.width().max(1), 0, false, false),
                None => (1, 0, false, false),
            },
        };
        let value = match arg {
            Some((bits, arg_signed)) => bits.resized(width, *arg_signed),
            None => LogicVec::filled(width, Logic::X),
        };
        vars.insert(
            name,
            VarInfo {
                value,
                offset,
                range_swapped: swapped,
                is_signed: signed,
                explicitly_sized: sized,
            },
        );
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: NodeId, vars: &mut Vars, must: bool) -> Exec<()> {
        let span = self.ast.span(stmt);
        match self.ast.kind(stmt) {
            NodeKind::Block => {
                for child in self.ast.children(stmt).to_vec() {
                    self.exec_stmt(child, vars, must)?;
                }
            }
            NodeKind::Wire => self.declare_var(stmt, vars, None, must)?,
            NodeKind::Localparam | NodeKind::Parameter => {
                let Some(&value) = self.ast.children(stmt).first() else {
                    return Ok(());
                };
                let (bits, signed) = self.eval_expr(value, vars, None, must)?;
                vars.insert(
                    self.ast[stmt].name.clone(),
                    VarInfo {
                        value: bits,
                        offset: 0,
                        range_swapped: false,
                        is_signed: signed,
                        explicitly_sized: true,
                    },
                );
            }
            NodeKind::AssignEq => self.exec_assign(stmt, vars, must)?,
            NodeKind::Case => self.exec_case(stmt, vars, must)?,
            NodeKind::For => {
                let parts = self.ast.children(stmt).to_vec();
                let [init, cond, step, body] = parts.as_slice() else {
                    return Err(error_unsupported("malformed for loop", span).into());
                };
                self.exec_assign(*init, vars, must)?;
                let mut iterations = 0;
                while self.eval_cond(*cond, vars, must)? {
                    self.count_iteration(&mut iterations, span)?;
                    self.exec_stmt(*body, vars, must)?;
                    self.exec_assign(*step, vars, must)?;
                }
            }
            NodeKind::While => {
                let parts = self.ast.children(stmt).to_vec();
                let [cond, body] = parts.as_slice() else {
                    return Err(error_unsupported("malformed while loop", span).into());
                };
                let mut iterations = 0;
                while self.eval_cond(*cond, vars, must)? {
                    self.count_iteration(&mut iterations, span)?;
                    self.exec_stmt(*body, vars, must)?;
                }
            }
            NodeKind::Repeat => {
                let parts = self.ast.children(stmt).to_vec();
                let [count, body] = parts.as_slice() else {
                    return Err(error_unsupported("malformed repeat loop", span).into());
                };
                let (bits, signed) = self.eval_expr(*count, vars, None, must)?;
                let Some(count) = vela_common::calc::to_bigint(&bits, signed) else {
                    return Err(Halt::NotConst);
                };
                let count = i64::try_from(count).unwrap_or(i64::MAX).max(0);
                let mut iterations = 0;
                for _ in 0..count {
                    self.count_iteration(&mut iterations, span)?;
                    self.exec_stmt(*body, vars, must)?;
                }
            }
            NodeKind::TCall if self.ast[stmt].name.starts_with('$') => {
                log::debug!(
                    "{}: system task `{}` ignored in constant function",
                    self.loc(stmt),
                    self.ast[stmt].name
                );
            }
            kind => {
                if must {
                    return Err(error_unsupported(&format!("`{kind}` in a constant function"), span).into());
                }
                return Err(Halt::NotConst);
            }
        }
        Ok(())
    }

    fn count_iteration(&self, iterations: &mut u32, span: Span) -> Exec<()> {
        *iterations += 1;
        if *iterations > self.env.options.max_loop_iterations {
            return Err(fatal(
                E303,
                format!(
                    "loop in constant function exceeds {} iterations",
                    self.env.options.max_loop_iterations
                ),
                span,
            )
            .into());
        }
        Ok(())
    }

    fn exec_assign(&mut self, stmt: NodeId, vars: &mut Vars, must: bool) -> Exec<()> {
        let span = self.ast.span(stmt);
        let (Some(lhs), Some(rhs)) = (self.ast.child(stmt, 0), self.ast.child(stmt, 1)) else {
            return Err(error_unsupported("malformed assignment", span).into());
        };
        if self.ast.kind(stmt) != NodeKind::AssignEq || self.ast.kind(lhs) != NodeKind::Identifier {
            return Err(error_unsupported("assignment target in a constant function", span).into());
        }
        let name = self.ast[lhs].name.clone();
        let Some(var) = vars.get(&name).cloned() else {
            return Err(error_unsupported(
                &format!("assignment to `{name}`, which is not a local variable of the function"),
                span,
            )
            .into());
        };
        let select = match self.ast.children(lhs).first().copied() {
            None => None,
            Some(range) => Some(self.eval_range(range, vars, must)?),
        };
        let (low, width) = match select {
            Some((left, right)) => var.slice(left, right),
            None => (0, var.value.width()),
        };
        let (bits, signed) = self.eval_expr(rhs, vars, Some(width), must)?;
        let bits = bits.resized(width, signed);
        let Some(var) = vars.get_mut(&name) else {
            return Ok(());
        };
        if var.explicitly_sized || select.is_some() {
            for i in 0..width {
                let pos = low + i64::from(i);
                if (0..i64::from(var.value.width())).contains(&pos) {
                    var.value.set(pos as u32, bits.get(i));
                }
            }
        } else {
            var.value = bits;
        }
        Ok(())
    }

    fn exec_case(&mut self, stmt: NodeId, vars: &mut Vars, must: bool) -> Exec<()> {
        let children = self.ast.children(stmt).to_vec();
        let Some((&subject, items)) = children.split_first() else {
            return Ok(());
        };
        let (subject, subject_signed) = self.eval_expr(subject, vars, None, must)?;
        let mut default = None;
        for &item in items {
            let kind = self.ast.kind(item);
            let parts = self.ast.children(item).to_vec();
            let Some((&body, labels)) = parts.split_last() else {
                continue;
            };
            for &label in labels {
                if self.ast.kind(label) == NodeKind::Default {
                    default = Some(body);
                    continue;
                }
                let (value, signed) = self.eval_expr(label, vars, None, must)?;
                let width = subject.width().max(value.width());
                let a = subject.resized(width, subject_signed && signed);
                let b = value.resized(width, subject_signed && signed);
                let hit = match kind {
                    NodeKind::CondZ => a.iter().zip(b.iter()).all(|(x, y)| x.matches_casez(y)),
                    NodeKind::CondX => a.iter().zip(b.iter()).all(|(x, y)| x.matches_casex(y)),
                    _ => const_eq(&a, &b, false, false, None).get(0) == Logic::One,
                };
                if hit {
                    return self.exec_stmt(body, vars, must);
                }
            }
        }
        if let Some(body) = default {
            self.exec_stmt(body, vars, must)?;
        }
        Ok(())
    }

    fn eval_cond(&mut self, cond: NodeId, vars: &Vars, must: bool) -> Exec<bool> {
        let (bits, _) = self.eval_expr(cond, vars, None, must)?;
        if bits.iter().any(|b| !b.is_definite()) {
            return Err(fatal(
                E303,
                "loop condition in constant function is undefined",
                self.ast.span(cond),
            )
            .into());
        }
        let taken = bits.iter().any(|b| b == Logic::One);
        Ok(taken)
    }

    fn eval_range(&mut self, range: NodeId, vars: &Vars, must: bool) -> Exec<(i64, i64)> {
        let bounds = self.ast.children(range).to_vec();
        let mut values = Vec::with_capacity(bounds.len());
        for bound in bounds {
            let (bits, signed) = self.eval_expr(bound, vars, None, must)?;
            let Some(value) = vela_common::calc::to_bigint(&bits, signed).and_then(|v| i64::try_from(v).ok()) else {
                return Err(Halt::NotConst);
            };
            values.push(value);
        }
        match values.as_slice() {
            [index] => Ok((*index, *index)),
            [left, right] => Ok((*left, *right)),
            _ => Err(error_unsupported("range in a constant function", self.ast.span(range)).into()),
        }
    }

    /// Evaluates `expr` with the variables substituted. `width` is the
    /// width of the assignment target, if any.
    fn eval_expr(&mut self, expr: NodeId, vars: &Vars, width: Option<u32>, must: bool) -> Exec<(LogicVec, bool)> {
        let copy = self.ast.clone_subtree(expr);
        self.ast.set_in_param_flag(copy, must, false);
        self.ast.fixup_hierarchy_flags(copy, true);
        let result = self.eval_copy_with_vars(copy, vars, width, must);
        self.ast.delete(copy);
        result
    }

    fn eval_copy_with_vars(&mut self, copy: NodeId, vars: &Vars, width: Option<u32>, must: bool) -> Exec<(LogicVec, bool)> {
        self.replace_variables(copy, vars, must)?;
        self.resolve_expr(copy)?;
        let natural = self.detect(copy)?;
        let hint = width.map_or(natural.width, |w| w.max(natural.width));
        self.fold_fully(copy, Some(hint), natural.signed)?;
        let node = &self.ast[copy];
        match node.is_const() {
            1 => Ok((node.bits_as_const(Some(hint.max(1)), natural.signed), natural.signed)),
            2 => Ok((node.real_as_const(width.unwrap_or(32)), true)),
            _ => Err(Halt::NotConst),
        }
    }

    /// Replaces the reads of function variables under `id` with constants.
    fn replace_variables(&mut self, id: NodeId, vars: &Vars, must: bool) -> Exec<()> {
        let node = &self.ast[id];
        let span = node.span;
        if node.kind == NodeKind::Identifier {
            if let Some(var) = vars.get(&node.name) {
                let var = var.clone();
                let select = node.children.first().copied();
                let bits = match select {
                    None => var.value.clone(),
                    Some(range) => {
                        self.replace_variables(range, vars, must)?;
                        let (left, right) = self.eval_range(range, vars, must)?;
                        let (low, width) = var.slice(left, right);
                        let mut bits = LogicVec::new(0);
                        for i in 0..width {
                            let pos = low + i64::from(i);
                            let bit = if (0..i64::from(var.value.width())).contains(&pos) {
                                var.value.get(pos as u32)
                            } else {
                                Logic::X
                            };
                            bits.push(bit);
                        }
                        bits
                    }
                };
                let signed = var.is_signed && select.is_none();
                let constant = self.mk_bits(bits, signed, span);
                self.ast.replace_node(id, constant);
                return Ok(());
            }
        }
        for child in self.ast.children(id).to_vec() {
            self.replace_variables(child, vars, must)?;
        }
        Ok(())
    }

    /// True if `func` contains a loop that only the constant evaluator can
    /// run.
    pub(crate) fn has_const_only_constructs(&self, func: NodeId) -> bool {
        self.ast
            .descendants(func)
            .into_iter()
            .any(|d| matches!(self.ast.kind(d), NodeKind::While | NodeKind::Repeat))
    }

    /// True if `func` calls itself.
    pub(crate) fn is_recursive_function(&self, func: NodeId) -> bool {
        let name = &self.ast[func].name;
        self.ast
            .descendants(func)
            .into_iter()
            .any(|d| self.ast.kind(d) == NodeKind::FCall && self.ast[d].name == *name)
    }
}

#[cfg(test)]
mod tests {
    use vela_ast::{Ast, Builder, NodeId, NodeKind};

    use crate::errors::{E304, E305};
    use crate::simplify::tests::{simplified, Fixture};

    /// `function [31:0] fact(input [31:0] n)` computed with a loop.
    fn factorial(b: &mut Builder<'_>) -> NodeId {
        let n = b.input("n", 32);
        let i = b.reg("i", 32);
        let one = b.int(1);
        let res = b.ident("fact");
        let init_res = b.blocking(res, one);
        let iv = b.ident("i");
        let two = b.int(2);
        let init = b.blocking(iv, two);
        let iv = b.ident("i");
        let nv = b.ident("n");
        let cond = b.binop(NodeKind::Le, iv, nv);
        let iv = b.ident("i");
        let iv2 = b.ident("i");
        let one = b.int(1);
        let inc = b.binop(NodeKind::Add, iv2, one);
        let step = b.blocking(iv, inc);
        let res = b.ident("fact");
        let res2 = b.ident("fact");
        let iv = b.ident("i");
        let mul = b.binop(NodeKind::Mul, res2, iv);
        let body = b.blocking(res, mul);
        let body = b.block(vec![body]);
        let lp = b.for_loop(init, cond, step, body);
        let block = b.block(vec![init_res, lp]);
        b.function("fact", 32, vec![n, i, block])
    }

    #[test]
    fn loop_in_function_folds_parameter() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let f = factorial(&mut b);
        let five = b.int(5);
        let call = b.fcall("fact", vec![five]);
        let p = b.localparam("P", call);
        let m = b.module("m", vec![f, p]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        let value = ast.children(p)[0];
        assert_eq!(ast[value].as_int(false), 120);
    }

    /// `function integer fib(input integer n)`, recursive.
    fn fibonacci(b: &mut Builder<'_>) -> NodeId {
        let n = b.input("n", 32);
        let nv = b.ident("n");
        let two = b.int(2);
        let cond = b.binop(NodeKind::Lt, nv, two);
        let res = b.ident("fib");
        let nv = b.ident("n");
        let base = b.blocking(res, nv);
        let nv = b.ident("n");
        let one = b.int(1);
        let a = b.binop(NodeKind::Sub, nv, one);
        let fa = b.fcall("fib", vec![a]);
        let nv = b.ident("n");
        let two = b.int(2);
        let c = b.binop(NodeKind::Sub, nv, two);
        let fc = b.fcall("fib", vec![c]);
        let sum = b.binop(NodeKind::Add, fa, fc);
        let res = b.ident("fib");
        let rec = b.blocking(res, sum);
        let stmt = b.if_else(cond, base, Some(rec));
        let body = b.block(vec![stmt]);
        b.function("fib", 32, vec![n, body])
    }

    #[test]
    fn recursive_function_evaluates() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let f = fibonacci(&mut b);
        let ten = b.int(10);
        let call = b.fcall("fib", vec![ten]);
        let p = b.localparam("P", call);
        let m = b.module("m", vec![f, p]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        let value = ast.children(p)[0];
        assert_eq!(ast[value].as_int(false), 55);
    }

    #[test]
    fn recursion_limit_is_enforced() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let f = fibonacci(&mut b);
        let n = b.int(12);
        let call = b.fcall("fib", vec![n]);
        let p = b.localparam("P", call);
        let m = b.module("m", vec![f, p]);
        let mut fx = Fixture::new();
        fx.options.max_recursion_depth = 4;
        let err = simplified(&mut ast, m, &fx).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, E304);
    }

    #[test]
    fn call_with_same_arguments_is_circular() {
        // function f(input [7:0] x); f = f(x); endfunction
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let x = b.input("x", 8);
        let xv = b.ident("x");
        let again = b.fcall("f", vec![xv]);
        let res = b.ident("f");
        let stmt = b.blocking(res, again);
        let body = b.block(vec![stmt]);
        let f = b.function("f", 8, vec![x, body]);
        let three = b.sized(8, 3);
        let call = b.fcall("f", vec![three]);
        let p = b.localparam("P", call);
        let m = b.module("m", vec![f, p]);
        let fx = Fixture::new();
        let err = simplified(&mut ast, m, &fx).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, E305);
    }
}
