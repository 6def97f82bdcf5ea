//! Procedural blocks to netlist processes.
//!
//! Every bit a process assigns gets a temporary `$0\name[msb:lsb]` that is
//! initialized with the bit's current value in the root case. Statements
//! drive the temporaries through nested switch rules, and the sync rules
//! copy the temporaries back into the real signals.

use std::collections::{BTreeMap, HashMap, HashSet};

use vela_ast::{NodeId, NodeKind};
use vela_common::{ConstValue, Logic, LogicVec};
use vela_netlist::{Action, CaseRule, Process, SigBit, SigSpec, SwitchRule, SyncKind, SyncRule, WireId};

use super::CodeGen;
use crate::errors::{error_unsupported, fatal, from_netlist, warning_latch, ElabResult, E302, E312};
use crate::latch::detect_latch;
use crate::width::{detect_common_sign_width, range_width};

/// A contiguous run of assigned bits of one wire.
struct Chunk {
    wire: WireId,
    original: SigSpec,
    temp: SigSpec,
    nosync: bool,
}

/// Per-process lowering state.
#[derive(Default)]
struct ProcState {
    /// Original bit to its process temporary.
    targets: HashMap<SigBit, SigBit>,
    /// Actions prepended to the root case.
    init: Vec<Action>,
}

impl ProcState {
    fn target(&self, sig: &SigSpec) -> SigSpec {
        sig.bits()
            .iter()
            .map(|bit| self.targets.get(bit).copied().unwrap_or(*bit))
            .collect()
    }
}

fn flag(value: bool) -> ConstValue {
    ConstValue::bits(LogicVec::from_bool(value))
}

/// Turns `x` (and for `casex` also `z`) bits of a constant case label into
/// `z` wildcards.
fn wildcard(sig: SigSpec, kind: NodeKind) -> SigSpec {
    sig.bits()
        .iter()
        .map(|&bit| match (kind, bit) {
            (NodeKind::CondX, SigBit::Const(Logic::X | Logic::Z)) => SigBit::Const(Logic::Z),
            (NodeKind::CondZ, SigBit::Const(Logic::Z)) => SigBit::Const(Logic::Z),
            _ => bit,
        })
        .collect()
}

impl CodeGen<'_, '_> {
    /// Lowers an `Always` or `Initial` item.
    pub(crate) fn gen_process(&mut self, id: NodeId) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let span = node.span;
        let children = node.children.clone();
        let events: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| matches!(ast.kind(c), NodeKind::Posedge | NodeKind::Negedge | NodeKind::Edge))
            .collect();
        let Some(body) = children.iter().copied().find(|&c| ast.kind(c) == NodeKind::Block) else {
            return Err(fatal(E302, "process without a body", span));
        };
        let combinational = node.kind == NodeKind::Always && events.is_empty();

        let name = self.new_name("$proc", span);
        let mut process = Process::new(self.ident(&name));
        process.attributes = self.attributes_of(id);

        // Temporaries for everything the body assigns.
        let mut assigned = Vec::new();
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        self.collect_lvalues(body, false, &mut assigned, &mut seen, &mut names)?;
        let chunks = self.make_chunks(&assigned, span)?;
        let mut state = ProcState::default();
        for chunk in &chunks {
            for (o, t) in chunk.original.bits().iter().zip(chunk.temp.bits()) {
                state.targets.insert(*o, *t);
            }
            let initial = if combinational && self.env.options.nolatches && !chunk.nosync {
                SigSpec::constant(&LogicVec::all_x(chunk.original.width()))
            } else {
                chunk.original.clone()
            };
            process.root_case.actions.push((chunk.temp.clone(), initial));
        }

        self.rvalue.clear();
        let mut root = CaseRule::default();
        let result = self.gen_stmt(body, &mut root, &mut state);
        self.rvalue.clear();
        result?;
        process.root_case.actions.append(&mut state.init);
        process.root_case.actions.append(&mut root.actions);
        process.root_case.switches = root.switches;

        let mut syncs = Vec::new();
        for &event in &events {
            let kind = match ast.kind(event) {
                NodeKind::Posedge => SyncKind::Posedge,
                NodeKind::Negedge => SyncKind::Negedge,
                _ => SyncKind::Edge,
            };
            let Some(&signal) = ast.children(event).first() else {
                return Err(fatal(E302, "event without a signal", ast.span(event)));
            };
            let signal = self.gen_rtl(signal, None, false)?.extract(0, 1);
            syncs.push(SyncRule::new(kind, signal));
        }
        if syncs.is_empty() {
            let kind = if node.kind == NodeKind::Initial { SyncKind::Init } else { SyncKind::Always };
            syncs.push(SyncRule::new(kind, SigSpec::new()));
        }
        for chunk in &chunks {
            if chunk.nosync {
                self.module.connect(chunk.original.clone(), chunk.temp.clone());
                continue;
            }
            for sync in &mut syncs {
                sync.actions.push((chunk.original.clone(), chunk.temp.clone()));
            }
        }
        process.syncs = syncs;
        self.module.add_process(process);

        let clock = match events.as_slice() {
            [event] => Some(*event),
            _ => None,
        };
        for &write in children.iter().filter(|&&c| ast.kind(c) == NodeKind::MemWr) {
            self.rvalue = state.targets.clone();
            let result = self.gen_memwr(write, clock);
            self.rvalue.clear();
            result?;
        }

        if combinational && !self.env.options.nolatches {
            for name in &names {
                let nosync = self
                    .wire_named(name)
                    .is_some_and(|w| self.module.wires[w].attributes.contains_key("nosync"));
                if !nosync && detect_latch(ast, id, name) {
                    let diag = warning_latch(name, span);
                    log::warn!("{}: {}", self.env.sources.loc_string(span), diag.message);
                    self.env.sink.emit(diag);
                }
            }
        }
        Ok(())
    }

    /// Collects the bits assigned under `stmt` in first-assignment order.
    /// A variable index assigns its whole signal.
    fn collect_lvalues(
        &mut self,
        stmt: NodeId,
        blocking_only: bool,
        out: &mut Vec<SigBit>,
        seen: &mut HashSet<SigBit>,
        names: &mut Vec<String>,
    ) -> ElabResult<()> {
        let ast = self.ast;
        match ast.kind(stmt) {
            NodeKind::Block => {
                for &c in ast.children(stmt) {
                    self.collect_lvalues(c, blocking_only, out, seen, names)?;
                }
            }
            NodeKind::Case => {
                for &item in &ast.children(stmt)[1..] {
                    if let Some(&body) = ast.children(item).last() {
                        self.collect_lvalues(body, blocking_only, out, seen, names)?;
                    }
                }
            }
            kind @ (NodeKind::AssignEq | NodeKind::AssignLe) => {
                if blocking_only && kind != NodeKind::AssignEq {
                    return Ok(());
                }
                let lhs = ast.children(stmt)[0];
                let sig = self.lvalue_bits(lhs, names)?;
                for bit in sig.bits() {
                    if seen.insert(*bit) {
                        out.push(*bit);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn lvalue_bits(&mut self, lhs: NodeId, names: &mut Vec<String>) -> ElabResult<SigSpec> {
        let ast = self.ast;
        match ast.kind(lhs) {
            NodeKind::Identifier => {
                let name = &ast[lhs].name;
                if !names.contains(name) {
                    names.push(name.clone());
                }
                if self.has_variable_select(lhs) {
                    Ok(self.lvalue_layout(lhs)?.0)
                } else {
                    self.gen_lvalue(lhs)
                }
            }
            NodeKind::Concat => {
                let mut sig = SigSpec::new();
                for &part in ast.children(lhs).iter().rev() {
                    let part = self.lvalue_bits(part, names)?;
                    sig.append(&part);
                }
                Ok(sig)
            }
            _ => self.gen_lvalue(lhs),
        }
    }

    /// Groups assigned bits into per-wire runs, each with a fresh
    /// temporary.
    fn make_chunks(&mut self, bits: &[SigBit], span: vela_source::Span) -> ElabResult<Vec<Chunk>> {
        let mut by_wire: BTreeMap<WireId, Vec<u32>> = BTreeMap::new();
        for bit in bits {
            if let SigBit::Wire { wire, offset } = *bit {
                by_wire.entry(wire).or_default().push(offset);
            }
        }
        let mut chunks = Vec::new();
        for (wire, mut offsets) in by_wire {
            offsets.sort_unstable();
            offsets.dedup();
            let mut runs: Vec<(u32, u32)> = Vec::new();
            for offset in offsets {
                match runs.last_mut() {
                    Some((start, len)) if *start + *len == offset => *len += 1,
                    _ => runs.push((offset, 1)),
                }
            }
            let (name, start_offset, nosync) = {
                let w = &self.module.wires[wire];
                (
                    self.env.design.interner.resolve(w.name).to_string(),
                    w.start_offset,
                    w.attributes.contains_key("nosync"),
                )
            };
            for (offset, len) in runs {
                let lsb = offset as i32 + start_offset;
                let msb = lsb + len as i32 - 1;
                let base = format!("$0\\{name}[{msb}:{lsb}]");
                let mut temp_name = base.clone();
                while self.wire_named(&temp_name).is_some() {
                    temp_name = format!("{base}${}", self.ctx.next_id());
                }
                let temp = self.new_wire(&temp_name, len, span)?;
                chunks.push(Chunk {
                    wire,
                    original: SigSpec::wire_slice(wire, offset, len),
                    temp,
                    nosync,
                });
            }
        }
        chunks.sort_by_key(|c| c.wire);
        Ok(chunks)
    }

    fn gen_stmt(&mut self, stmt: NodeId, case: &mut CaseRule, state: &mut ProcState) -> ElabResult<()> {
        let ast = self.ast;
        let span = ast.span(stmt);
        match ast.kind(stmt) {
            NodeKind::Block => {
                for &c in ast.children(stmt) {
                    self.gen_stmt(c, case, state)?;
                }
            }
            kind @ (NodeKind::AssignEq | NodeKind::AssignLe) => {
                let (lhs, rhs) = (ast.children(stmt)[0], ast.children(stmt)[1]);
                if self.has_variable_select(lhs) {
                    return self.gen_indexed_assign(stmt, case, state);
                }
                let lvalue = self.gen_lvalue(lhs)?;
                let value = self.gen_rhs(rhs, lvalue.width())?;
                case.actions.push((state.target(&lvalue), value.clone()));
                if kind == NodeKind::AssignEq {
                    for (l, v) in lvalue.bits().iter().zip(value.bits()) {
                        self.rvalue.insert(*l, *v);
                    }
                }
            }
            NodeKind::Case => self.gen_case(stmt, case, state)?,
            NodeKind::TCall => {
                log::debug!("ignoring system task `{}` in a process", ast[stmt].name);
            }
            kind if kind.is_property() => {
                let en = {
                    let name = self.new_name(&format!("${}_EN", kind.type_name()), span);
                    self.new_wire(&name, 1, span)?
                };
                state
                    .init
                    .push((en.clone(), SigSpec::constant(&LogicVec::from_bool(false))));
                case.actions
                    .push((en.clone(), SigSpec::constant(&LogicVec::from_bool(true))));
                self.gen_property(stmt, en)?;
            }
            NodeKind::For | NodeKind::While | NodeKind::Repeat => {
                return Err(error_unsupported("loop that was not unrolled", span));
            }
            NodeKind::None => {}
            kind => return Err(error_unsupported(&format!("`{kind}` statement in a process"), span)),
        }
        Ok(())
    }

    /// Bits assigned with `=` under `stmt`, with a temporary that carries
    /// their values out of a switch.
    fn switch_scope(&mut self, stmts: &[NodeId], case: &mut CaseRule) -> ElabResult<(SigSpec, SigSpec)> {
        let mut bits = Vec::new();
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for &stmt in stmts {
            self.collect_lvalues(stmt, true, &mut bits, &mut seen, &mut names)?;
        }
        let blocking = SigSpec::from_bits(bits);
        if blocking.is_empty() {
            return Ok((blocking, SigSpec::new()));
        }
        let span = self.ast.span(stmts[0]);
        let name = self.new_name("$case_tmp", span);
        let temp = self.new_wire(&name, blocking.width(), span)?;
        let current = self.current_value(&blocking);
        case.actions.push((temp.clone(), current));
        Ok((blocking, temp))
    }

    fn current_value(&self, sig: &SigSpec) -> SigSpec {
        sig.bits()
            .iter()
            .map(|bit| self.rvalue.get(bit).copied().unwrap_or(*bit))
            .collect()
    }

    /// Ends one branch of a switch: records the branch's values of the
    /// blocking bits and restores the values seen before the switch.
    fn close_branch(
        &mut self,
        rule: &mut CaseRule,
        blocking: &SigSpec,
        temp: &SigSpec,
        saved: &HashMap<SigBit, SigBit>,
    ) {
        if !blocking.is_empty() {
            let value = self.current_value(blocking);
            rule.actions.push((temp.clone(), value));
        }
        self.rvalue = saved.clone();
    }

    fn close_switch(&mut self, blocking: &SigSpec, temp: &SigSpec) {
        for (b, t) in blocking.bits().iter().zip(temp.bits()) {
            self.rvalue.insert(*b, *t);
        }
    }

    fn gen_case(&mut self, stmt: NodeId, case: &mut CaseRule, state: &mut ProcState) -> ElabResult<()> {
        let ast = self.ast;
        let children = ast.children(stmt).to_vec();
        let Some((&expr, items)) = children.split_first() else {
            return Err(fatal(E302, "case without an expression", ast.span(stmt)));
        };
        let mut operands = vec![expr];
        for &item in items {
            let labels = ast.children(item);
            if let Some((_, values)) = labels.split_last() {
                operands.extend(values.iter().copied().filter(|&v| ast.kind(v) != NodeKind::Default));
            }
        }
        let common = detect_common_sign_width(ast, &self.ctx.scope, &operands)?;
        let signal = self.gen_rtl(expr, Some(common.width), common.signed)?;

        let (blocking, temp) = self.switch_scope(&[stmt], case)?;
        let saved = self.rvalue.clone();
        let mut switch = SwitchRule {
            signal,
            cases: Vec::new(),
            attributes: self.attributes_of(stmt),
        };
        let mut default = None;
        for &item in items {
            let item_kind = ast.kind(item);
            let Some((&body, values)) = ast.children(item).split_last() else {
                continue;
            };
            let mut rule = CaseRule {
                attributes: self.attributes_of(item),
                ..CaseRule::default()
            };
            let is_default = values.first().is_some_and(|&v| ast.kind(v) == NodeKind::Default);
            if !is_default {
                for &value in values {
                    let sig = self.gen_rtl(value, Some(common.width), common.signed)?;
                    rule.compare.push(wildcard(sig, item_kind));
                }
            }
            self.gen_stmt(body, &mut rule, state)?;
            self.close_branch(&mut rule, &blocking, &temp, &saved);
            if is_default {
                default = Some(rule);
            } else {
                switch.cases.push(rule);
            }
        }
        if let Some(rule) = default {
            switch.cases.push(rule);
        } else if !blocking.is_empty() {
            // Paths that match no item keep the values from before the case.
            let mut rule = CaseRule::default();
            self.close_branch(&mut rule, &blocking, &temp, &saved);
            switch.cases.push(rule);
        }
        case.switches.push(switch);
        self.close_switch(&blocking, &temp);
        Ok(())
    }

    /// `sig[i] = value` with a non-constant `i`: a switch over every
    /// position the index can select.
    fn gen_indexed_assign(&mut self, stmt: NodeId, case: &mut CaseRule, state: &mut ProcState) -> ElabResult<()> {
        let ast = self.ast;
        let span = ast.span(stmt);
        let (lhs, rhs) = (ast.children(stmt)[0], ast.children(stmt)[1]);
        let Some(range) = ast.child(lhs, 0) else {
            return Err(fatal(E302, "indexed assignment without a select", span));
        };
        let Some(&index) = ast.children(range).last() else {
            return Err(fatal(E302, "empty select", span));
        };
        let width = range_width(ast, range)?.max(1);
        let (base, start, total, upto) = self.lvalue_layout(lhs)?;
        let value = self.gen_rhs(rhs, width)?;
        let index_signed = self.detect(index)?.signed;
        let index_sig = self.gen_rtl(index, None, index_signed)?;
        let index_width = index_sig.width().max(1);

        let (blocking, temp) = if ast.kind(stmt) == NodeKind::AssignEq {
            self.switch_scope(&[stmt], case)?
        } else {
            (SigSpec::new(), SigSpec::new())
        };
        let saved = self.rvalue.clone();
        let mut switch = SwitchRule {
            signal: index_sig,
            cases: Vec::new(),
            attributes: self.attributes_of(stmt),
        };
        for offset in 0..total.saturating_sub(width - 1) {
            let position = if upto {
                start + i64::from(total) - i64::from(width) - i64::from(offset)
            } else {
                start + i64::from(offset)
            };
            let fits = if index_signed {
                index_width >= 64 || (-(1i64 << (index_width - 1))..(1i64 << (index_width - 1))).contains(&position)
            } else {
                position >= 0 && (index_width >= 64 || position < (1i64 << index_width))
            };
            if !fits {
                continue;
            }
            let target = base.extract(offset, width);
            let mut rule = CaseRule {
                compare: vec![SigSpec::constant(&LogicVec::from_i64(position, index_width))],
                ..CaseRule::default()
            };
            rule.actions.push((state.target(&target), value.clone()));
            for (l, v) in target.bits().iter().zip(value.bits()) {
                self.rvalue.insert(*l, *v);
            }
            self.close_branch(&mut rule, &blocking, &temp, &saved);
            switch.cases.push(rule);
        }
        if !blocking.is_empty() {
            let mut rule = CaseRule::default();
            self.close_branch(&mut rule, &blocking, &temp, &saved);
            switch.cases.push(rule);
        }
        case.switches.push(switch);
        self.close_switch(&blocking, &temp);
        Ok(())
    }

    /// Emits the `$memwr` cell of a write port appended to a process.
    fn gen_memwr(&mut self, id: NodeId, clock: Option<NodeId>) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let span = node.span;
        let Some(mem) = node.id2ast.filter(|&m| ast.kind(m) == NodeKind::Memory) else {
            return Err(fatal(E312, format!("write to unknown memory `{}`", node.name), span));
        };
        let width = ast[mem].range_width().max(1) as u32;
        let parts = node.children.clone();
        if parts.len() < 3 {
            return Err(fatal(E312, format!("malformed write port of memory `{}`", node.name), span));
        }
        let addr = self.gen_rtl(parts[0], None, false)?;
        let mut data = self.gen_rtl(parts[1], None, false)?;
        data.extend_u0(width, false);
        let mut en = self.gen_rtl(parts[2], None, false)?;
        en.extend_u0(width, false);
        let port = parts.get(3).map_or(0, |&p| ast[p].as_int(false));

        let (clk, clk_enable, polarity) = match clock {
            Some(event) => {
                let signal = match ast.children(event).first() {
                    Some(&s) => {
                        self.rvalue.clear();
                        self.gen_rtl(s, None, false)?.extract(0, 1)
                    }
                    None => SigSpec::constant(&LogicVec::all_x(1)),
                };
                (signal, true, ast.kind(event) != NodeKind::Negedge)
            }
            None => (SigSpec::constant(&LogicVec::all_x(1)), false, false),
        };

        let name = self.new_name(&format!("$memwr${}", node.name), span);
        let priority = self.ctx.next_id();
        let src = self.src(span);
        let (ident, type_ident) = (self.ident(&name), self.ident("$memwr"));
        let cid = self.module.add_cell(ident, type_ident).map_err(|e| from_netlist(e, span))?;
        let cell = &mut self.module.cells[cid];
        cell.set_param("MEMID", ConstValue::String(node.name.clone()));
        cell.set_param("ABITS", ConstValue::int(addr.width() as i32));
        cell.set_param("WIDTH", ConstValue::int(width as i32));
        cell.set_param("CLK_ENABLE", flag(clk_enable));
        cell.set_param("CLK_POLARITY", flag(polarity));
        cell.set_param("PORTID", ConstValue::int(port as i32));
        cell.set_param("PRIORITY", ConstValue::int(priority as i32));
        cell.set_port("CLK", clk);
        cell.set_port("EN", en);
        cell.set_port("ADDR", addr);
        cell.set_port("DATA", data);
        cell.attributes.insert("src".to_string(), src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casex_labels_become_wildcards() {
        let label = SigSpec::from_bits(vec![
            SigBit::Const(Logic::One),
            SigBit::Const(Logic::X),
            SigBit::Const(Logic::Z),
        ]);
        let casex = wildcard(label.clone(), NodeKind::CondX);
        assert_eq!(casex.bits()[1], SigBit::Const(Logic::Z));
        assert_eq!(casex.bits()[2], SigBit::Const(Logic::Z));
        let casez = wildcard(label.clone(), NodeKind::CondZ);
        assert_eq!(casez.bits()[1], SigBit::Const(Logic::X));
        assert_eq!(casez.bits()[2], SigBit::Const(Logic::Z));
        assert_eq!(wildcard(label.clone(), NodeKind::Cond), label);
    }
}
