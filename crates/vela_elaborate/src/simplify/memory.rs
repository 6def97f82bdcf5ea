//! Lowering of the memory accesses left after register promotion.
//!
//! Reads become `MemRd` nodes. A procedural write `mem[addr] = data` becomes
//! assignments to three per-write temporaries, `<base>_ADDR`, `<base>_DATA`
//! and `<base>_EN`, plus a `MemWr` port appended to the process (a `MemInit`
//! item for initial blocks). The temporaries are `nosync`: they default to
//! X (and zero enable) at the top of the process and are never registered.

use std::collections::HashMap;

use vela_ast::{NodeId, NodeKind};
use vela_common::{Logic, LogicVec};
use vela_source::Span;

use super::Simplifier;
use crate::errors::{fatal, ElabResult, E312};

/// Write ports handed out so far, per memory.
type PortCounter = HashMap<String, i64>;

impl Simplifier<'_, '_> {
    /// Rewrites every remaining memory access of `module`.
    pub(crate) fn lower_memories(&mut self, module: NodeId) -> ElabResult<()> {
        let mut ports = PortCounter::new();
        let mut i = 0;
        while let Some(item) = self.ast.child(module, i) {
            match self.ast.kind(item) {
                NodeKind::Always | NodeKind::Initial => self.lower_process_memories(item, &mut ports)?,
                NodeKind::Assign => {
                    for expr in self.ast.children(item).to_vec() {
                        let roots = self.read_roots(expr);
                        for root in roots {
                            self.lower_reads(root, false)?;
                        }
                    }
                }
                NodeKind::Cell => {
                    for arg in self.ast.children(item).to_vec() {
                        if self.ast.kind(arg) == NodeKind::Argument {
                            self.lower_reads(arg, false)?;
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }

    /// The parts of `expr` that are read: all of it, or only the selects
    /// when it is an assignment target.
    fn read_roots(&self, expr: NodeId) -> Vec<NodeId> {
        let node = &self.ast[expr];
        if !node.in_lvalue {
            return vec![expr];
        }
        match node.kind {
            NodeKind::Identifier => node
                .children
                .iter()
                .flat_map(|&select| self.ast.children(select).to_vec())
                .collect(),
            NodeKind::Concat => node.children.iter().flat_map(|&part| self.read_roots(part)).collect(),
            _ => Vec::new(),
        }
    }

    fn lower_process_memories(&mut self, process: NodeId, ports: &mut PortCounter) -> ElabResult<()> {
        let Some(body) = self
            .ast
            .children(process)
            .iter()
            .copied()
            .find(|&c| self.ast.kind(c) == NodeKind::Block)
        else {
            return Ok(());
        };
        let mut defaults = Vec::new();
        self.lower_block_memories(body, process, ports, &mut defaults)?;
        if !defaults.is_empty() {
            let span = self.ast.span(body);
            let block = self.mk_node(NodeKind::Block, defaults, span);
            self.ast[body].children.insert(0, block);
            self.ast.fixup_hierarchy_flags(block, true);
        }
        Ok(())
    }

    fn lower_block_memories(
        &mut self,
        block: NodeId,
        process: NodeId,
        ports: &mut PortCounter,
        defaults: &mut Vec<NodeId>,
    ) -> ElabResult<()> {
        let mut i = 0;
        while let Some(stmt) = self.ast.child(block, i) {
            let mut before = Vec::new();
            let mut replacement = None;
            match self.ast.kind(stmt) {
                NodeKind::Block => self.lower_block_memories(stmt, process, ports, defaults)?,
                NodeKind::Case => {
                    let items = self.ast.children(stmt).to_vec();
                    before.extend(self.lower_reads(items[0], true)?);
                    for &item in &items[1..] {
                        let parts = self.ast.children(item).to_vec();
                        let Some((&body, labels)) = parts.split_last() else {
                            continue;
                        };
                        for &label in labels {
                            before.extend(self.lower_reads(label, true)?);
                        }
                        if self.ast.kind(body) == NodeKind::Block {
                            self.lower_block_memories(body, process, ports, defaults)?;
                        } else {
                            let index = parts.len() - 1;
                            let body = self.ast.take_child(item, index);
                            let wrapped = self.mk_node(NodeKind::Block, vec![body], self.ast.span(body));
                            self.ast.push_child(item, wrapped);
                            self.ast.fixup_hierarchy_flags(wrapped, true);
                            self.lower_block_memories(wrapped, process, ports, defaults)?;
                        }
                    }
                }
                NodeKind::AssignEq | NodeKind::AssignLe => {
                    let (lhs, rhs) = (self.ast.children(stmt)[0], self.ast.children(stmt)[1]);
                    before.extend(self.lower_reads(rhs, true)?);
                    for root in self.read_roots(lhs) {
                        before.extend(self.lower_reads(root, true)?);
                    }
                    if self.memory_of(lhs).is_some() {
                        replacement = Some(self.lower_memory_write(stmt, process, ports, defaults)?);
                    } else if self.contains_memory_word(lhs) {
                        return Err(fatal(
                            E312,
                            "memory word inside a concatenated assignment target",
                            self.ast.span(stmt),
                        ));
                    }
                }
                _ => {
                    for child in self.ast.children(stmt).to_vec() {
                        before.extend(self.lower_reads(child, true)?);
                    }
                }
            }
            let inserted = before.len();
            for (offset, pre) in before.into_iter().enumerate() {
                self.ast[block].children.insert(i + offset, pre);
                self.ast.fixup_hierarchy_flags(pre, true);
            }
            i += inserted;
            match replacement {
                Some(stmts) => {
                    let count = stmts.len();
                    self.splice(block, i, stmts);
                    i += count;
                }
                None => i += 1,
            }
        }
        Ok(())
    }

    /// The memory `id` names, if it is a reference to a live memory.
    fn memory_of(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.ast[id];
        if node.kind != NodeKind::Identifier {
            return None;
        }
        node.id2ast
            .filter(|&m| self.ast.is_live(m) && self.ast.kind(m) == NodeKind::Memory)
    }

    fn contains_memory_word(&self, lhs: NodeId) -> bool {
        self.ast.descendants(lhs).into_iter().any(|d| self.memory_of(d).is_some())
    }

    /// Rewrites the memory reads under `expr` into `MemRd` nodes. A read
    /// with a select on the word goes through a `$mem2bits$` temporary; the
    /// assignments of such temporaries are returned for procedural code and
    /// added to the module otherwise.
    fn lower_reads(&mut self, expr: NodeId, procedural: bool) -> ElabResult<Vec<NodeId>> {
        let Some(memory) = self.memory_of(expr) else {
            let mut pre = Vec::new();
            for child in self.ast.children(expr).to_vec() {
                pre.extend(self.lower_reads(child, procedural)?);
            }
            return Ok(pre);
        };
        let span = self.ast.span(expr);
        let name = self.ast[expr].name.clone();
        let selects = self.ast.children(expr).to_vec();
        let address_select = selects
            .first()
            .copied()
            .filter(|&s| self.ast.kind(s) == NodeKind::Range && self.ast.children(s).len() == 1);
        let Some(address_select) = address_select else {
            return Err(fatal(E312, format!("memory `{name}` is read without a word index"), span));
        };
        if selects.len() > 2 {
            return Err(fatal(E312, format!("too many selects on memory `{name}`"), span));
        }
        let addr = self.ast.take_child(address_select, 0);
        let mut pre = self.lower_reads(addr, procedural)?;
        let read = self.mk_named(NodeKind::MemRd, name.clone(), vec![addr], span);
        self.ast[read].id2ast = Some(memory);

        if selects.len() == 1 {
            self.ast.replace_node(expr, read);
            self.ast.fixup_hierarchy_flags(expr, true);
            return Ok(pre);
        }

        let (width, signed) = {
            let m = &self.ast[memory];
            (m.range_width().max(1) as u32, m.is_signed)
        };
        let temp = self.temp_name("mem2bits", &name, span);
        let wire = self.mk_wire(&temp, width, signed, span);
        self.ast[wire].is_reg = procedural;
        self.add_module_item(wire);
        let lhs = self.mk_ident(&temp, span);
        self.ast[lhs].was_checked = true;
        if procedural {
            pre.push(self.mk_node(NodeKind::AssignEq, vec![lhs, read], span));
        } else {
            let assign = self.mk_node(NodeKind::Assign, vec![lhs, read], span);
            self.add_module_item(assign);
        }
        let old = self.ast.take_child(expr, 0);
        self.ast.delete(old);
        let node = &mut self.ast[expr];
        node.name = temp;
        node.id2ast = Some(wire);
        Ok(pre)
    }

    /// The statements replacing the memory write `stmt`.
    fn lower_memory_write(
        &mut self,
        stmt: NodeId,
        process: NodeId,
        ports: &mut PortCounter,
        defaults: &mut Vec<NodeId>,
    ) -> ElabResult<Vec<NodeId>> {
        let span = self.ast.span(stmt);
        let (lhs, rhs) = (self.ast.children(stmt)[0], self.ast.children(stmt)[1]);
        let Some(memory) = self.memory_of(lhs) else {
            return Ok(Vec::new());
        };
        let name = self.ast[lhs].name.clone();
        let selects = self.ast.children(lhs).to_vec();
        let address_select = selects
            .first()
            .copied()
            .filter(|&s| self.ast.kind(s) == NodeKind::Range && self.ast.children(s).len() == 1);
        let Some(address_select) = address_select else {
            return Err(fatal(E312, format!("memory `{name}` is written without a word index"), span));
        };
        if selects.len() > 2 {
            return Err(fatal(E312, format!("too many selects on memory `{name}`"), span));
        }
        let (word_width, word_right, signed, addr_bits) = {
            let m = &self.ast[memory];
            let depth = m.dimensions.first().map_or(1, |d| d.range_width.max(1) as u64);
            let addr_bits = (64 - (depth.saturating_sub(1)).leading_zeros()).max(1);
            (m.range_width().max(1) as u32, m.range_right, m.is_signed, addr_bits)
        };
        let addr_expr = self.ast.children(address_select)[0];
        let addr_bits = addr_bits.max(self.detect(addr_expr).map_or(0, |sw| sw.width));
        let base = self.temp_name("memwr", &name, span);
        let mut stmts = Vec::new();

        let node_addr = if self.ast[addr_expr].is_const() == 1 {
            self.ast.clone_subtree(addr_expr)
        } else {
            let id = format!("{base}_ADDR");
            self.add_write_temp(&id, addr_bits, false, span);
            let undef = self.mk_bits(LogicVec::all_x(addr_bits), false, span);
            defaults.push(self.temp_assign(NodeKind::AssignEq, &id, None, undef, span));
            let value = self.ast.clone_subtree(addr_expr);
            stmts.push(self.temp_assign(NodeKind::AssignEq, &id, None, value, span));
            self.mk_ident(&id, span)
        };

        let word_select = match selects.get(1) {
            None => None,
            Some(&select) => {
                let r = &self.ast[select];
                if !r.range_valid {
                    return Err(fatal(
                        E312,
                        format!("part select on a word of memory `{name}` is not constant"),
                        span,
                    ));
                }
                Some((
                    i64::from(r.range_left - word_right),
                    i64::from(r.range_right - word_right),
                ))
            }
        };

        let data_is_const = word_select.is_none() && self.ast[rhs].is_const() == 1;
        let node_data = if data_is_const {
            self.ast.clone_subtree(rhs)
        } else {
            let id = format!("{base}_DATA");
            self.add_write_temp(&id, word_width, signed, span);
            let undef = self.mk_bits(LogicVec::all_x(word_width), false, span);
            defaults.push(self.temp_assign(NodeKind::AssignEq, &id, None, undef, span));
            let value = self.ast.clone_subtree(rhs);
            stmts.push(self.temp_assign(NodeKind::AssignLe, &id, word_select, value, span));
            self.mk_ident(&id, span)
        };

        let en = format!("{base}_EN");
        self.add_write_temp(&en, word_width, false, span);
        let zero = self.mk_bits(LogicVec::all_zero(word_width), false, span);
        defaults.push(self.temp_assign(NodeKind::AssignEq, &en, None, zero, span));
        let enabled_width = word_select.map_or(word_width, |(msb, lsb)| (msb - lsb + 1).max(1) as u32);
        let ones = self.mk_bits(LogicVec::filled(enabled_width, Logic::One), false, span);
        stmts.push(self.temp_assign(NodeKind::AssignLe, &en, word_select, ones, span));
        let node_en = self.mk_ident(&en, span);

        if self.ast.kind(process) == NodeKind::Initial {
            let words = self.mk_int(1, false, 32, span);
            let init = self.mk_named(NodeKind::MemInit, name, vec![node_addr, node_data, node_en, words], span);
            self.ast[init].id2ast = Some(memory);
            self.add_module_item(init);
        } else {
            let port = ports.entry(name.clone()).or_insert(0);
            let port_id = self.mk_int(*port, false, 32, span);
            *port += 1;
            let write = self.mk_named(NodeKind::MemWr, name, vec![node_addr, node_data, node_en, port_id], span);
            self.ast[write].id2ast = Some(memory);
            self.ast.push_child(process, write);
            self.ast.fixup_hierarchy_flags(write, true);
        }
        Ok(stmts)
    }

    fn add_write_temp(&mut self, name: &str, width: u32, signed: bool, span: Span) {
        let wire = self.mk_wire(name, width, signed, span);
        self.ast[wire].was_checked = true;
        let one = self.mk_int(1, false, 1, span);
        self.ast.set_attribute(wire, "nosync", one);
        self.add_module_item(wire);
    }

    /// `name[msb:lsb] = value`, or `name = value` without a select.
    fn temp_assign(
        &mut self,
        kind: NodeKind,
        name: &str,
        select: Option<(i64, i64)>,
        value: NodeId,
        span: Span,
    ) -> NodeId {
        let lhs = self.mk_ident(name, span);
        if let Some((msb, lsb)) = select {
            let range = self.mk_range(msb, lsb, span);
            self.ast.push_child(lhs, range);
        }
        self.ast[lhs].was_checked = true;
        self.mk_node(kind, vec![lhs, value], span)
    }
}

#[cfg(test)]
mod tests {
    use vela_ast::{Ast, Builder, NodeKind};

    use crate::simplify::tests::{simplified, Fixture};

    fn kinds(ast: &Ast, root: vela_ast::NodeId, kind: NodeKind) -> usize {
        ast.descendants(root).into_iter().filter(|&d| ast.kind(d) == kind).count()
    }

    #[test]
    fn variable_write_gets_port_and_temporaries() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let mem = b.memory("mem", 8, 16);
        let clk = b.input("clk", 1);
        let addr = b.input("addr", 4);
        let data = b.input("data", 8);
        let q = b.output("q", 8);
        let a = b.ident("addr");
        let target = b.index("mem", a);
        let d = b.ident("data");
        let write = b.nonblocking(target, d);
        let body = b.block(vec![write]);
        let edge = b.posedge("clk");
        let proc = b.always(vec![edge], body);
        let qi = b.ident("q");
        let ra = b.ident("addr");
        let read = b.index("mem", ra);
        let assign = b.assign(qi, read);
        let m = b.module("m", vec![mem, clk, addr, data, q, proc, assign]);
        let mut fx = Fixture::new();
        fx.options.nomem2reg = true;
        let ctx = simplified(&mut ast, m, &fx).unwrap();

        assert_eq!(kinds(&ast, proc, NodeKind::MemWr), 1);
        assert_eq!(ast.kind(ast.children(assign)[1]), NodeKind::MemRd);
        let temps: Vec<_> = ctx.scope.keys().filter(|k| k.starts_with("$memwr$mem$")).collect();
        assert_eq!(temps.len(), 3);
        let en = ctx.scope.iter().find(|(k, _)| k.ends_with("_EN")).map(|(_, &v)| v).unwrap();
        assert!(ast.get_bool_attribute(en, "nosync"));
    }

    #[test]
    fn initial_write_becomes_meminit() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let mem = b.memory("mem", 8, 4);
        let two = b.int(2);
        let target = b.index("mem", two);
        let value = b.sized(8, 0x5a);
        let write = b.blocking(target, value);
        let body = b.block(vec![write]);
        let init = b.initial(body);
        let m = b.module("m", vec![mem, init]);
        let mut fx = Fixture::new();
        fx.options.nomem2reg = true;
        simplified(&mut ast, m, &fx).unwrap();
        let meminit = ast
            .children(m)
            .iter()
            .copied()
            .find(|&c| ast.kind(c) == NodeKind::MemInit)
            .unwrap();
        let data = ast.children(meminit)[1];
        assert_eq!(ast[data].as_int(false), 0x5a);
    }
}
