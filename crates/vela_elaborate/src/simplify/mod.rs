//! Fixed-point simplification of module bodies.
//!
//! [`Simplifier::simplify`] rewrites one node and its subtree in place and
//! reports whether anything changed; callers repeat it until it reports no
//! change. Stage 1 expands generate constructs, folds constants, unrolls
//! loops and inlines functions. Memory promotion runs between the stages and
//! stage 2 lowers what is left of memory accesses and cleans up.
//!
//! Node identities are stable across rewrites: a node that folds to a
//! constant keeps its [`NodeId`] and only its content is replaced.

mod decl;
mod fold;
mod generate;
mod inline;
mod loops;
mod memory;
mod resolve;

use std::collections::HashSet;

use vela_ast::{Ast, NodeId, NodeKind};
use vela_common::{InternalError, LogicVec};
use vela_diagnostics::Diagnostic;
use vela_source::{Provenance, Span};

use crate::context::{declare_children, ElabEnv, ModuleContext};
use crate::errors::{error_unsupported, fatal, ElabResult, E303};
use crate::width::{detect_common_sign_width, detect_sign_width, SignWidth};

/// Rewrites the working copy of one module.
pub struct Simplifier<'s, 'a> {
    /// The tree the module lives in.
    pub ast: &'s mut Ast,
    /// The module being simplified.
    pub ctx: &'s mut ModuleContext,
    /// Options and shared read-only state.
    pub env: ElabEnv<'a>,
    /// Parameters whose value is being folded; a repeated entry is a cycle.
    folding: HashSet<NodeId>,
}

impl<'s, 'a> Simplifier<'s, 'a> {
    /// A simplifier over the module of `ctx`.
    pub fn new(ast: &'s mut Ast, ctx: &'s mut ModuleContext, env: ElabEnv<'a>) -> Self {
        Self {
            ast,
            ctx,
            env,
            folding: HashSet::new(),
        }
    }

    /// Runs the whole pipeline on the module: both stages with memory
    /// promotion and memory lowering in between.
    pub fn simplify_module(&mut self) -> ElabResult<()> {
        let module = self.ctx.module;
        self.prepare_module(module)?;
        self.run_stage(module, 1)?;
        if self.env.options.dump_ast1 {
            log::debug!(
                "tree of `{}` after stage 1:\n{}",
                self.ctx.name,
                self.ast.dump_ast(module)
            );
        }
        if !self.ctx.mem2reg_done {
            self.mem2reg(module)?;
            self.ctx.mem2reg_done = true;
        }
        if !self.ctx.memories_lowered {
            self.lower_memories(module)?;
            self.ctx.memories_lowered = true;
        }
        self.run_stage(module, 2)?;
        if self.env.options.dump_ast2 {
            log::debug!(
                "tree of `{}` after stage 2:\n{}",
                self.ctx.name,
                self.ast.dump_ast(module)
            );
        }
        Ok(())
    }

    fn run_stage(&mut self, module: NodeId, stage: u8) -> ElabResult<()> {
        let limit = self.env.options.max_loop_iterations.max(16);
        for _ in 0..limit {
            if !self.simplify(module, true, stage, None, false)? {
                return Ok(());
            }
        }
        Err(fatal(
            E303,
            format!("simplification of `{}` does not converge", self.ctx.name),
            self.ast.span(module),
        ))
    }

    /// Labels unnamed generate blocks, registers the module's declarations
    /// and numbers its enumerations. Runs once per module copy.
    pub fn prepare_module(&mut self, module: NodeId) -> ElabResult<()> {
        if self.ast[module].basic_prep {
            return Ok(());
        }
        let mut existing = HashSet::new();
        let mut counter = 0;
        for child in self.ast.children(module).to_vec() {
            generate::label_genblks(self.ast, child, &mut existing, &mut counter);
        }
        declare_children(self.ast, module, &mut self.ctx.scope);
        for child in self.ast.children(module).to_vec() {
            match self.ast.kind(child) {
                NodeKind::Enum => {
                    self.simplify_enum(child)?;
                }
                NodeKind::Typedef => {
                    if let Some(base) = self.ast.child(child, 0) {
                        if self.ast.kind(base) == NodeKind::Enum {
                            self.simplify_enum(base)?;
                        }
                    }
                }
                _ => {}
            }
        }
        // Interface instances first, then the connections that use them.
        for _ in 0..2 {
            for child in self.ast.children(module).to_vec() {
                if self.ast.kind(child) == NodeKind::Cell && self.is_interface_instance(child) {
                    self.explode_interface_instance(child)?;
                }
            }
        }
        self.ast[module].basic_prep = true;
        Ok(())
    }

    /// Simplifies the subtree at `id`.
    ///
    /// Expressions are evaluated in a context of `width_hint` bits and
    /// signedness `sign_hint`; `None` sizes them on their own. With
    /// `const_fold` unset, operators are not evaluated even when their
    /// operands are constant.
    pub fn simplify(
        &mut self,
        id: NodeId,
        const_fold: bool,
        stage: u8,
        width_hint: Option<u32>,
        sign_hint: bool,
    ) -> ElabResult<bool> {
        use NodeKind::*;
        let kind = self.ast.kind(id);
        match kind {
            Module | Interface | Package => self.simplify_items(id, stage),
            Wire | Autowire => self.simplify_wire(id, stage),
            Memory => self.simplify_memory(id, stage),
            Parameter | Localparam => self.simplify_param(id),
            Enum => self.simplify_enum(id),
            Typedef => self.simplify_typedef(id),
            Range => self.simplify_range(id, stage),
            Assign | AssignEq | AssignLe => self.simplify_assign(id, stage),
            Always | Initial => self.simplify_process(id, stage),
            Block => self.simplify_block(id, stage),
            Case => self.simplify_case(id, stage),
            Cell => self.simplify_cell(id, stage),
            MemWr | MemInit => self.simplify_operands(id, stage),
            _ if kind.is_property() => self.simplify_operands(id, stage),
            GenFor | GenIf | GenCase | GenBlock | Primitive | CellArray | Defparam => Err(
                error_unsupported(&format!("`{kind}` outside of a module body"), self.ast.span(id)),
            ),
            NodeKind::None | Design | Function | Task | DpiFunction | Genvar | Modport | ModportMember
            | InterfacePort | InterfacePortType | Struct | Union | StructItem | EnumItem
            | WireType | Bind | Default | TCall | TeCall | Posedge | Negedge | Edge | For | While
            | Repeat | Argument | CellType | Paraset | Cond | CondX | CondZ | Multirange => {
                Ok(false)
            }
            _ => self.simplify_expr(id, const_fold, stage, width_hint, sign_hint),
        }
    }

    fn simplify_items(&mut self, parent: NodeId, stage: u8) -> ElabResult<bool> {
        let mut changed = false;
        let mut i = 0;
        while let Some(item) = self.ast.child(parent, i) {
            let kind = self.ast.kind(item);
            let expansion = match kind {
                NodeKind::GenFor | NodeKind::GenIf | NodeKind::GenCase | NodeKind::GenBlock => {
                    Some(self.expand_generate(item)?)
                }
                NodeKind::Primitive => Some(self.expand_primitive(item)?),
                NodeKind::Defparam => {
                    self.apply_defparam(item)?;
                    Some(Vec::new())
                }
                NodeKind::CellArray => Some(self.expand_cell_array(item)?),
                _ => None,
            };
            if let Some(items) = expansion {
                self.splice(parent, i, items);
                changed = true;
                continue;
            }
            changed |= self.simplify(item, true, stage, None, false)?;
            if stage == 1 && matches!(kind, NodeKind::Assign | NodeKind::Cell) {
                changed |= self.inline_continuous_calls(item)?;
            }
            i += 1;
        }
        Ok(changed)
    }

    /// Replaces the `index`-th child of `parent` with `items`.
    pub(crate) fn splice(&mut self, parent: NodeId, index: usize, items: Vec<NodeId>) {
        let old = self.ast.take_child(parent, index);
        self.ast.delete(old);
        for (offset, item) in items.into_iter().enumerate() {
            self.ast[parent].children.insert(index + offset, item);
            self.ast.fixup_hierarchy_flags(item, true);
        }
    }

    fn simplify_process(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let is_initial = self.ast.kind(id) == NodeKind::Initial;
        let mut changed = false;
        for child in self.ast.children(id).to_vec() {
            match self.ast.kind(child) {
                NodeKind::Posedge | NodeKind::Negedge | NodeKind::Edge => {
                    if let Some(signal) = self.ast.child(child, 0) {
                        changed |= self.resolve_expr(signal)?;
                    }
                }
                NodeKind::Block => {
                    if stage == 1 {
                        changed |= self.unroll_loops(child)?;
                        changed |= self.lower_task_calls(child, is_initial)?;
                    }
                    changed |= self.simplify(child, true, stage, None, false)?;
                    if stage == 1 {
                        changed |= self.inline_procedural_calls(child)?;
                    }
                }
                _ => changed |= self.simplify(child, true, stage, None, false)?,
            }
        }
        Ok(changed)
    }

    fn simplify_block(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let mut changed = false;
        if stage == 1 && !self.ast[id].basic_prep {
            changed |= self.hoist_block_declarations(id)?;
        }
        let mut i = 0;
        while let Some(stmt) = self.ast.child(id, i) {
            changed |= self.simplify(stmt, true, stage, None, false)?;
            i += 1;
        }
        Ok(changed)
    }

    fn simplify_case(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let children = self.ast.children(id).to_vec();
        let mut exprs = vec![children[0]];
        let mut bodies = Vec::new();
        for &item in &children[1..] {
            let parts = self.ast.children(item).to_vec();
            if let Some((&body, labels)) = parts.split_last() {
                exprs.extend(
                    labels
                        .iter()
                        .copied()
                        .filter(|&l| self.ast.kind(l) != NodeKind::Default),
                );
                bodies.push(body);
            }
        }
        let mut changed = false;
        for &expr in &exprs {
            changed |= self.resolve_expr(expr)?;
        }
        let common = detect_common_sign_width(self.ast, &self.ctx.scope, &exprs)?;
        for &expr in &exprs {
            changed |= self.simplify(expr, true, stage, Some(common.width), common.signed)?;
        }
        for body in bodies {
            changed |= self.simplify(body, true, stage, None, false)?;
        }
        Ok(changed)
    }

    fn simplify_assign(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let (Some(lhs), Some(rhs)) = (self.ast.child(id, 0), self.ast.child(id, 1)) else {
            return Err(InternalError::new(format!("assignment without operands at {}", self.loc(id))).into());
        };
        let mut changed = self.resolve_expr(lhs)?;
        changed |= self.resolve_expr(rhs)?;
        changed |= self.simplify_lvalue(lhs, stage)?;
        let lhs_sw = self.detect(lhs)?;
        let rhs_sw = self.detect(rhs)?;
        let width = lhs_sw.width.max(rhs_sw.width);
        changed |= self.simplify(rhs, true, stage, Some(width), rhs_sw.signed)?;

        let continuous = self.ast.kind(id) == NodeKind::Assign;
        for decl in self.lvalue_decls(lhs) {
            let node = &mut self.ast[decl];
            if node.kind != NodeKind::Wire {
                continue;
            }
            if !continuous && node.is_logic {
                node.is_reg = true;
            } else if continuous && node.is_reg && !node.is_logic && !self.ast[id].was_checked {
                log::warn!(
                    "{}: continuous assignment to register `{}`",
                    self.env.sources.loc_string(self.ast[id].span),
                    self.ast[decl].name
                );
            }
        }
        if continuous {
            self.ast[id].was_checked = true;
        }
        Ok(changed)
    }

    /// Simplifies the select expressions of an lvalue.
    fn simplify_lvalue(&mut self, lhs: NodeId, stage: u8) -> ElabResult<bool> {
        let mut changed = false;
        match self.ast.kind(lhs) {
            NodeKind::Identifier => {
                for range in self.ast.children(lhs).to_vec() {
                    changed |= self.simplify_range(range, stage)?;
                }
            }
            NodeKind::Concat => {
                for part in self.ast.children(lhs).to_vec() {
                    changed |= self.simplify_lvalue(part, stage)?;
                }
            }
            _ => {}
        }
        Ok(changed)
    }

    /// Declarations written by the lvalue `lhs`.
    pub(crate) fn lvalue_decls(&self, lhs: NodeId) -> Vec<NodeId> {
        match self.ast.kind(lhs) {
            NodeKind::Identifier => self.ast[lhs]
                .id2ast
                .filter(|&d| self.ast.is_live(d))
                .into_iter()
                .collect(),
            NodeKind::Concat => self
                .ast
                .children(lhs)
                .iter()
                .flat_map(|&p| self.lvalue_decls(p))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn simplify_cell(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let mut changed = false;
        if stage == 1 && self.is_interface_instance(id) {
            return self.explode_interface_instance(id);
        }
        for child in self.ast.children(id).to_vec() {
            match self.ast.kind(child) {
                NodeKind::CellType => {
                    for paraset in self.ast.children(child).to_vec() {
                        if let Some(value) = self.ast.child(paraset, 0) {
                            changed |= self.resolve_expr(value)?;
                            changed |= self.fold_fully(value, None, false)?;
                        }
                    }
                }
                NodeKind::Argument => {
                    if let Some(expr) = self.ast.child(child, 0) {
                        changed |= self.resolve_expr(expr)?;
                        changed |= self.simplify(expr, true, stage, None, false)?;
                    }
                }
                _ => {}
            }
        }
        Ok(changed)
    }

    /// Simplifies every child of `id` as a self-determined expression.
    fn simplify_operands(&mut self, id: NodeId, stage: u8) -> ElabResult<bool> {
        let mut changed = false;
        for child in self.ast.children(id).to_vec() {
            changed |= self.resolve_expr(child)?;
            changed |= self.simplify(child, true, stage, None, false)?;
        }
        Ok(changed)
    }

    /// Simplifies `id` until nothing changes.
    pub(crate) fn fold_fully(&mut self, id: NodeId, width_hint: Option<u32>, sign_hint: bool) -> ElabResult<bool> {
        let mut changed = false;
        let (width_hint, sign_hint) = match width_hint {
            Some(w) => (Some(w), sign_hint),
            None => match self.detect(id) {
                Ok(sw) => (Some(sw.width), sw.signed),
                Err(_) => (None, false),
            },
        };
        for _ in 0..64 {
            if !self.simplify(id, true, 1, width_hint, sign_hint)? {
                break;
            }
            changed = true;
        }
        Ok(changed)
    }

    /// Folds a copy of `expr` to a constant, leaving `expr` untouched.
    /// The caller owns the returned node.
    pub(crate) fn eval_copy(&mut self, expr: NodeId) -> ElabResult<Option<NodeId>> {
        let copy = self.ast.clone_subtree(expr);
        self.ast.fixup_hierarchy_flags(copy, true);
        self.resolve_expr(copy)?;
        self.fold_fully(copy, None, false)?;
        if self.ast[copy].is_const() > 0 {
            Ok(Some(copy))
        } else {
            self.ast.delete(copy);
            Ok(None)
        }
    }

    // Construction helpers

    pub(crate) fn mk_node(&mut self, kind: NodeKind, children: Vec<NodeId>, span: Span) -> NodeId {
        let id = self.ast.new_node(kind, &Provenance::internal(), children);
        self.ast[id].span = span;
        id
    }

    pub(crate) fn mk_named(
        &mut self,
        kind: NodeKind,
        name: impl Into<String>,
        children: Vec<NodeId>,
        span: Span,
    ) -> NodeId {
        let id = self.mk_node(kind, children, span);
        self.ast[id].name = name.into();
        id
    }

    pub(crate) fn mk_int(&mut self, value: i64, signed: bool, width: u32, span: Span) -> NodeId {
        let id = self.ast.mkconst_int(value, signed, width, &Provenance::internal());
        self.ast[id].span = span;
        id
    }

    pub(crate) fn mk_bits(&mut self, bits: LogicVec, signed: bool, span: Span) -> NodeId {
        let id = self.ast.mkconst_bits(bits, signed, &Provenance::internal());
        self.ast[id].span = span;
        id
    }

    /// `[left:right]` with its bounds already folded.
    pub(crate) fn mk_range(&mut self, left: i64, right: i64, span: Span) -> NodeId {
        let l = self.mk_int(left, true, 32, span);
        let r = self.mk_int(right, true, 32, span);
        let id = self.mk_node(NodeKind::Range, vec![l, r], span);
        let node = &mut self.ast[id];
        node.range_valid = true;
        node.range_swapped = right > left;
        node.range_left = left.max(right) as i32;
        node.range_right = left.min(right) as i32;
        id
    }

    /// A reference to `name`, resolved when the name is declared.
    pub(crate) fn mk_ident(&mut self, name: &str, span: Span) -> NodeId {
        let id = self.mk_named(NodeKind::Identifier, name, Vec::new(), span);
        self.ast[id].id2ast = self.lookup(name);
        id
    }

    /// A `width`-bit variable declaration, not yet part of the module.
    pub(crate) fn mk_wire(&mut self, name: &str, width: u32, signed: bool, span: Span) -> NodeId {
        let range = self.mk_range(i64::from(width.max(1)) - 1, 0, span);
        let id = self.mk_named(NodeKind::Wire, name, vec![range], span);
        let node = &mut self.ast[id];
        node.is_reg = true;
        node.is_signed = signed;
        node.range_valid = true;
        node.range_left = width.max(1) as i32 - 1;
        node.range_right = 0;
        id
    }

    /// Appends `item` to the module and makes it visible.
    pub(crate) fn add_module_item(&mut self, item: NodeId) {
        let module = self.ctx.module;
        self.ast.push_child(module, item);
        self.ast.fixup_hierarchy_flags(item, true);
        let name = self.ast[item].name.clone();
        if !name.is_empty() && crate::context::is_declaration(self.ast.kind(item)) {
            self.ctx.declare(name, item);
        }
    }

    /// `$kind$base$line$n`, unique within the module.
    pub(crate) fn temp_name(&mut self, kind: &str, base: &str, span: Span) -> String {
        let n = self.ctx.next_id();
        format!("${kind}${base}${}${n}", span.first_line)
    }

    // Queries

    /// The declaration `name` refers to in the module or in a package.
    pub(crate) fn lookup(&self, name: &str) -> Option<NodeId> {
        self.ctx
            .lookup(name)
            .or_else(|| self.env.globals.get(name).copied())
            .filter(|&d| self.ast.is_live(d))
    }

    pub(crate) fn detect(&self, id: NodeId) -> ElabResult<SignWidth> {
        detect_sign_width(self.ast, &self.ctx.scope, id)
    }

    pub(crate) fn loc(&self, id: NodeId) -> String {
        self.env.sources.loc_string(self.ast[id].span)
    }

    /// Emits a warning to the sink and the log.
    pub(crate) fn warn(&self, diag: Diagnostic) {
        log::warn!("{}: {}", self.env.sources.loc_string(diag.primary_span), diag.message);
        self.env.sink.emit(diag);
    }
}

#[cfg(test)]
pub(crate) mod tests;
