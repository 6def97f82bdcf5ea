//! Promotion of memories to lists of registers.
//!
//! The first pass walks the module once and records how every memory is
//! written and read ([`MemFlags`]). The policy then picks the memories to
//! promote, and the second pass replaces each of them by one register per
//! word (`mem[i]`): constant-index accesses name the register directly,
//! variable-index accesses go through `$mem2reg_wr$`/`$mem2reg_rd$`
//! temporaries and a `case` over all word addresses.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use vela_ast::{NodeId, NodeKind};
use vela_common::{Logic, LogicVec};
use vela_diagnostics::Diagnostic;
use vela_source::Span;

use crate::errors::{error_unsupported, fatal, ElabResult, E312, W301};
use crate::simplify::Simplifier;

/// What the first pass learned about a memory, plus the context bits it
/// carries down the tree.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct MemFlags(u32);

impl MemFlags {
    /// Context: every memory of the module is to be promoted.
    pub const ALL: MemFlags = MemFlags(1 << 0);
    /// Context: inside a process that is not triggered by exactly one edge.
    pub const ASYNC: MemFlags = MemFlags(1 << 1);
    /// Context: inside an initial block.
    pub const INIT: MemFlags = MemFlags(1 << 2);
    /// Promotion requested by attribute or option, or the memory is a net.
    pub const FORCED: MemFlags = MemFlags(1 << 8);
    /// Written in an initial block.
    pub const SET_INIT: MemFlags = MemFlags(1 << 9);
    /// Written outside initial blocks.
    pub const SET_ELSE: MemFlags = MemFlags(1 << 10);
    /// Written in a process without a single clock edge.
    pub const SET_ASYNC: MemFlags = MemFlags(1 << 11);
    /// Read after a blocking write in the same process.
    pub const EQ2: MemFlags = MemFlags(1 << 12);
    /// Word used in a concatenated lvalue or with a select on the word.
    pub const CMPLX_LHS: MemFlags = MemFlags(1 << 13);
    /// Written at a constant address.
    pub const CONST_LHS: MemFlags = MemFlags(1 << 14);
    /// Written at a variable address.
    pub const VAR_LHS: MemFlags = MemFlags(1 << 15);
    /// Per process: written with a blocking assignment.
    pub const EQ1: MemFlags = MemFlags(1 << 24);

    /// True if every flag of `other` is set.
    pub fn contains(self, other: MemFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MemFlags {
    type Output = MemFlags;

    fn bitor(self, rhs: MemFlags) -> MemFlags {
        MemFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for MemFlags {
    fn bitor_assign(&mut self, rhs: MemFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for MemFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemFlags({:#010x})", self.0)
    }
}

/// Word width, number of words and address bits of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    /// Bits per word.
    pub width: u32,
    /// Number of words.
    pub size: u32,
    /// Bits needed to write every address from `low` to `low + size - 1`,
    /// with a sign bit when `low` is negative.
    pub addr_bits: u32,
    /// Lowest address.
    pub low: i64,
}

/// Findings of the first pass, per memory declaration.
#[derive(Default)]
struct Candidates {
    flags: HashMap<NodeId, MemFlags>,
    places: HashMap<NodeId, BTreeSet<String>>,
}

impl Candidates {
    /// Sets `flag` on `mem`, remembering `place` the first time.
    fn mark(&mut self, mem: NodeId, flag: MemFlags, place: impl FnOnce() -> String) {
        let entry = self.flags.entry(mem).or_default();
        if !entry.contains(flag) {
            self.places.entry(mem).or_default().insert(place());
        }
        *entry |= flag;
    }
}

/// Where the second pass puts the statements it creates.
#[derive(Clone, Copy)]
enum Site {
    /// Before the statement at `index` of `block`.
    Block { block: NodeId, index: usize },
    /// As new module items.
    Module,
}

impl Simplifier<'_, '_> {
    /// Promotes the memories of `module` that qualify.
    pub(crate) fn mem2reg(&mut self, module: NodeId) -> ElabResult<()> {
        let mut cand = Candidates::default();
        let mut base = MemFlags::default();
        if self.env.options.mem2reg || self.ast.get_bool_attribute(module, "mem2reg") {
            base |= MemFlags::ALL;
        }
        let mut proc_flags = HashMap::new();
        self.mem2reg_pass1(module, &mut cand, &mut proc_flags, base);

        let mut promoted = HashSet::new();
        let mut order: Vec<NodeId> = cand.flags.keys().copied().collect();
        order.sort();
        for mem in order {
            let flags = cand.flags[&mem];
            if !self.should_promote(module, mem, flags) {
                continue;
            }
            if !flags.contains(MemFlags::FORCED) {
                let places: Vec<&str> = cand
                    .places
                    .get(&mem)
                    .map_or(Vec::new(), |p| p.iter().map(String::as_str).collect());
                let mut message = format!("replacing memory `{}` with a list of registers", self.ast[mem].name);
                if !places.is_empty() {
                    message.push_str(&format!(" (see {})", places.join(", ")));
                }
                self.warn(Diagnostic::warning(W301, message, self.ast.span(mem)));
            }
            log::debug!("promoting memory `{}` in `{}` ({flags:?})", self.ast[mem].name, self.ctx.name);
            promoted.insert(mem);
        }
        if promoted.is_empty() {
            return Ok(());
        }

        let mut mems: Vec<NodeId> = promoted.iter().copied().collect();
        mems.sort();
        for &mem in &mems {
            self.add_word_registers(mem)?;
        }
        self.mem2reg_pass2(module, &promoted)?;
        self.mem2reg_remove(module, &promoted);
        Ok(())
    }

    /// The promotion policy.
    fn should_promote(&self, module: NodeId, mem: NodeId, flags: MemFlags) -> bool {
        if self.env.options.nomem2reg || self.ast.get_bool_attribute(mem, "nomem2reg") {
            return false;
        }
        if flags.contains(MemFlags::SET_ASYNC) {
            log::debug!(
                "memory `{}` is written asynchronously and stays a memory",
                self.ast[mem].name
            );
            return false;
        }
        let nomeminit = self.env.options.nomeminit
            || self.ast.get_bool_attribute(mem, "nomeminit")
            || self.ast.get_bool_attribute(module, "nomeminit");
        flags.contains(MemFlags::FORCED)
            || flags.contains(MemFlags::EQ2)
            || (flags.contains(MemFlags::SET_INIT) && flags.contains(MemFlags::SET_ELSE) && nomeminit)
            || flags.contains(MemFlags::CMPLX_LHS)
            || (flags.contains(MemFlags::CONST_LHS) && !flags.contains(MemFlags::VAR_LHS))
    }

    fn place(&self, id: NodeId) -> String {
        self.env.sources.line_string(self.ast.span(id))
    }

    /// The promoted-or-not memory an identifier refers to.
    fn memory_ref(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.ast[id];
        if node.kind != NodeKind::Identifier {
            return None;
        }
        node.id2ast
            .filter(|&m| self.ast.is_live(m) && self.ast.kind(m) == NodeKind::Memory)
    }

    fn mem2reg_pass1(
        &self,
        id: NodeId,
        cand: &mut Candidates,
        proc_flags: &mut HashMap<NodeId, MemFlags>,
        flags: MemFlags,
    ) {
        let kind = self.ast.kind(id);
        if matches!(kind, NodeKind::Typedef | NodeKind::Function | NodeKind::Task) {
            return;
        }
        let mut lhs_pending = false;
        if kind.is_assignment() {
            let lhs = self.ast.children(id)[0];
            if let Some(mem) = self.memory_ref(lhs) {
                if flags.contains(MemFlags::ASYNC) {
                    cand.mark(mem, MemFlags::SET_ASYNC, || self.place(id));
                }
                if kind == NodeKind::AssignEq {
                    let entry = proc_flags.entry(mem).or_default();
                    *entry |= MemFlags::EQ1;
                }
                // Initializer writes say nothing about how the memory is addressed.
                if !flags.contains(MemFlags::INIT) {
                    let address = self.ast.child(lhs, 0).and_then(|r| self.ast.child(r, 0));
                    if let Some(address) = address {
                        let flag = if self.ast[address].is_const() > 0 {
                            MemFlags::CONST_LHS
                        } else {
                            MemFlags::VAR_LHS
                        };
                        cand.mark(mem, flag, || self.place(id));
                    }
                }
                if self.ast.children(lhs).len() > 1 {
                    cand.mark(mem, MemFlags::CMPLX_LHS, || self.place(id));
                }
                let set = if flags.contains(MemFlags::INIT) {
                    MemFlags::SET_INIT
                } else {
                    MemFlags::SET_ELSE
                };
                cand.mark(mem, set, || self.place(id));
            } else if self.ast.kind(lhs) == NodeKind::Concat {
                for part in self.ast.descendants(lhs) {
                    if let Some(mem) = self.memory_ref(part) {
                        if self.ast[part].in_lvalue {
                            cand.mark(mem, MemFlags::CMPLX_LHS, || self.place(id));
                        }
                    }
                }
            }
            lhs_pending = true;
        }

        if let Some(mem) = self.memory_ref(id) {
            let in_proc = proc_flags.get(&mem).copied().unwrap_or_default();
            if in_proc.contains(MemFlags::EQ1) {
                cand.mark(mem, MemFlags::EQ2, || self.place(id));
            }
        }

        let mut child_flags = MemFlags::default();
        match kind {
            NodeKind::Memory => {
                let node = &self.ast[id];
                if self.ast.get_bool_attribute(id, "mem2reg")
                    || flags.contains(MemFlags::ALL)
                    || !(node.is_reg || node.is_logic)
                {
                    cand.mark(id, MemFlags::FORCED, || self.place(id));
                } else {
                    cand.flags.entry(id).or_default();
                }
            }
            NodeKind::MemInit => {
                if let Some(mem) = self.ast[id].id2ast.filter(|&m| self.ast.is_live(m)) {
                    cand.mark(mem, MemFlags::SET_INIT, || self.place(id));
                }
            }
            NodeKind::Always => {
                let edges = self
                    .ast
                    .children(id)
                    .iter()
                    .filter(|&&c| matches!(self.ast.kind(c), NodeKind::Posedge | NodeKind::Negedge))
                    .count();
                if edges != 1 {
                    child_flags |= MemFlags::ASYNC;
                }
            }
            NodeKind::Initial => child_flags |= MemFlags::INIT,
            _ => {}
        }

        let mut local = HashMap::new();
        let own = matches!(kind, NodeKind::Always | NodeKind::Initial);
        let proc_flags = if own { &mut local } else { proc_flags };
        let flags = flags | child_flags;
        for (i, &child) in self.ast.children(id).iter().enumerate() {
            if lhs_pending && i == 0 {
                // Only the address and bit selects of the target are reads.
                for &select in self.ast.children(child) {
                    for &c in self.ast.children(select) {
                        self.mem2reg_pass1(c, cand, proc_flags, flags);
                    }
                }
                continue;
            }
            self.mem2reg_pass1(child, cand, proc_flags, flags);
        }
    }

    /// Word width, size and address bits of `mem`.
    pub(crate) fn meminfo(&self, mem: NodeId) -> MemInfo {
        let node = &self.ast[mem];
        let width = node.range_width().max(1) as u32;
        let (low, size) = node
            .dimensions
            .first()
            .map_or((0, 1), |d| (i64::from(d.range_right), d.range_width.max(1) as u32));
        let high = low + i64::from(size) - 1;
        let magnitude = low.unsigned_abs().max(high.unsigned_abs());
        let mut addr_bits = (64 - magnitude.leading_zeros()).max(1);
        if low < 0 {
            addr_bits += 1;
        }
        MemInfo {
            width,
            size,
            addr_bits,
            low,
        }
    }

    /// Width of the address temporary for `address`: wide enough for the
    /// address expression and for every address of the memory.
    fn address_width(&self, info: &MemInfo, address: NodeId) -> u32 {
        info.addr_bits.max(self.detect(address).map_or(0, |sw| sw.width))
    }

    /// The promoted memory `id` names, or `None`. An identifier naming a
    /// promoted memory without a word index is an error.
    fn mem2reg_check(&self, id: NodeId, promoted: &HashSet<NodeId>) -> ElabResult<Option<NodeId>> {
        let Some(mem) = self.memory_ref(id).filter(|m| promoted.contains(m)) else {
            return Ok(None);
        };
        let first = self.ast.child(id, 0);
        let valid = first.is_some_and(|r| self.ast.kind(r) == NodeKind::Range && self.ast.children(r).len() == 1);
        if !valid {
            return Err(fatal(
                E312,
                format!("invalid array access of memory `{}`", self.ast[id].name),
                self.ast.span(id),
            ));
        }
        Ok(Some(mem))
    }

    fn add_word_registers(&mut self, mem: NodeId) -> ElabResult<()> {
        let info = self.meminfo(mem);
        let (name, signed, span, left, right) = {
            let m = &self.ast[mem];
            let (l, r) = if m.range_swapped {
                (i64::from(m.range_right), i64::from(m.range_left))
            } else {
                (i64::from(m.range_left), i64::from(m.range_right))
            };
            (m.name.clone(), m.is_signed, m.span, l, r)
        };
        let attributes: Vec<(String, NodeId)> = self.ast[mem]
            .attributes
            .iter()
            .filter(|(k, _)| k.as_str() != "mem2reg")
            .map(|(k, &v)| (k.clone(), v))
            .collect();
        for i in 0..i64::from(info.size) {
            let addr = info.low + i;
            let range = self.mk_range(left, right, span);
            let reg = self.mk_named(NodeKind::Wire, format!("{name}[{addr}]"), vec![range], span);
            let node = &mut self.ast[reg];
            node.is_reg = true;
            node.is_signed = signed;
            node.range_valid = true;
            node.range_left = left.max(right) as i32;
            node.range_right = left.min(right) as i32;
            node.range_swapped = right > left;
            for (key, value) in &attributes {
                let copy = self.ast.clone_subtree(*value);
                self.ast.set_attribute(reg, key.clone(), copy);
            }
            self.add_module_item(reg);
        }
        Ok(())
    }

    fn mem2reg_pass2(&mut self, module: NodeId, promoted: &HashSet<NodeId>) -> ElabResult<()> {
        let mut async_block: Option<NodeId> = None;
        let mut i = 0;
        while let Some(item) = self.ast.child(module, i) {
            match self.ast.kind(item) {
                NodeKind::Assign => {
                    let lhs = self.ast.children(item)[0];
                    if self.mem2reg_check(lhs, promoted)?.is_some() {
                        let body = match async_block {
                            Some(body) => body,
                            None => {
                                let span = self.ast.span(item);
                                let body = self.mk_node(NodeKind::Block, Vec::new(), span);
                                let proc = self.mk_node(NodeKind::Always, vec![body], span);
                                self.add_module_item(proc);
                                async_block = Some(body);
                                body
                            }
                        };
                        let assign = self.ast.take_child(module, i);
                        self.ast[assign].kind = NodeKind::AssignEq;
                        self.ast[lhs].was_checked = true;
                        self.ast.push_child(body, assign);
                        self.ast.fixup_hierarchy_flags(body, true);
                        continue;
                    }
                    let rhs = self.ast.children(item)[1];
                    self.promote_reads(rhs, promoted, Site::Module)?;
                    self.promote_lvalue_selects(lhs, promoted, Site::Module)?;
                }
                NodeKind::Cell => {
                    for arg in self.ast.children(item).to_vec() {
                        if self.ast.kind(arg) == NodeKind::Argument {
                            self.promote_reads(arg, promoted, Site::Module)?;
                        }
                    }
                }
                NodeKind::Always | NodeKind::Initial => {
                    for child in self.ast.children(item).to_vec() {
                        match self.ast.kind(child) {
                            NodeKind::Block => self.promote_in_block(child, promoted)?,
                            NodeKind::Posedge | NodeKind::Negedge | NodeKind::Edge => {
                                self.promote_reads(child, promoted, Site::Module)?;
                            }
                            _ => {}
                        }
                    }
                }
                NodeKind::MemInit => {
                    let mem = self.ast[item].id2ast.filter(|m| promoted.contains(m));
                    if let Some(mem) = mem {
                        let init = self.meminit_to_initial(item, mem)?;
                        self.splice(module, i, vec![init]);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }

    /// Rewrites a `MemInit` of a promoted memory into an initial block
    /// assigning the word registers.
    fn meminit_to_initial(&mut self, init: NodeId, mem: NodeId) -> ElabResult<NodeId> {
        let span = self.ast.span(init);
        let info = self.meminfo(mem);
        let name = self.ast[mem].name.clone();
        let parts: Vec<Option<NodeId>> = (0..4)
            .map(|i| self.ast.child(init, i).filter(|&p| self.ast[p].is_const() == 1))
            .collect();
        let (Some(addr), Some(data)) = (parts[0], parts[1]) else {
            return Err(error_unsupported("memory initialization with non-constant operands", span));
        };
        let addr = self.ast[addr].as_int(false);
        let data = self.ast[data].bits.clone();
        let words = parts[3].map_or(1, |n| self.ast[n].as_int(false).max(1));
        let enable = parts[2].map(|n| self.ast[n].bits.clone());
        let mut stmts = Vec::new();
        for w in 0..words {
            let index = addr + w;
            if index < info.low || index >= info.low + i64::from(info.size) {
                continue;
            }
            let base = (w as u32) * info.width;
            let lhs = self.mk_ident(&format!("{name}[{index}]"), span);
            self.ast[lhs].was_checked = true;
            let all_enabled = enable.as_ref().map_or(true, |en| (0..info.width).all(|b| en.get(b) == Logic::One));
            if all_enabled {
                let value: LogicVec = (0..info.width).map(|b| data.get(base + b)).collect();
                let rhs = self.mk_bits(value, false, span);
                stmts.push(self.mk_node(NodeKind::AssignEq, vec![lhs, rhs], span));
            } else {
                self.ast.delete(lhs);
                for b in 0..info.width {
                    if enable.as_ref().is_some_and(|en| en.get(b) != Logic::One) {
                        continue;
                    }
                    let lhs = self.mk_ident(&format!("{name}[{index}]"), span);
                    let sel = self.mk_range(i64::from(b), i64::from(b), span);
                    self.ast.push_child(lhs, sel);
                    self.ast[lhs].was_checked = true;
                    let rhs = self.mk_bits(LogicVec::from_bits(&[data.get(base + b)]), false, span);
                    stmts.push(self.mk_node(NodeKind::AssignEq, vec![lhs, rhs], span));
                }
            }
        }
        let block = self.mk_node(NodeKind::Block, stmts, span);
        Ok(self.mk_node(NodeKind::Initial, vec![block], span))
    }

    fn promote_in_block(&mut self, block: NodeId, promoted: &HashSet<NodeId>) -> ElabResult<()> {
        let mut i = 0;
        while let Some(stmt) = self.ast.child(block, i) {
            let before = self.ast.children(block).len();
            let site = Site::Block { block, index: i };
            match self.ast.kind(stmt) {
                NodeKind::Block => self.promote_in_block(stmt, promoted)?,
                NodeKind::Case => {
                    let items = self.ast.children(stmt).to_vec();
                    self.promote_reads(items[0], promoted, site)?;
                    for &item in &items[1..] {
                        let parts = self.ast.children(item).to_vec();
                        let Some((&body, labels)) = parts.split_last() else {
                            continue;
                        };
                        for &label in labels {
                            let site = Site::Block {
                                block,
                                index: i + self.ast.children(block).len() - before,
                            };
                            self.promote_reads(label, promoted, site)?;
                        }
                        let body = if self.ast.kind(body) == NodeKind::Block {
                            body
                        } else {
                            let index = parts.len() - 1;
                            let inner = self.ast.take_child(item, index);
                            let wrapped = self.mk_node(NodeKind::Block, vec![inner], self.ast.span(inner));
                            self.ast.push_child(item, wrapped);
                            self.ast.fixup_hierarchy_flags(wrapped, true);
                            wrapped
                        };
                        self.promote_in_block(body, promoted)?;
                    }
                }
                NodeKind::AssignEq | NodeKind::AssignLe => {
                    let (lhs, rhs) = (self.ast.children(stmt)[0], self.ast.children(stmt)[1]);
                    self.promote_reads(rhs, promoted, site)?;
                    let site = Site::Block {
                        block,
                        index: i + self.ast.children(block).len() - before,
                    };
                    self.promote_lvalue_selects(lhs, promoted, site)?;
                    let index = i + self.ast.children(block).len() - before;
                    let inserted = self.promote_write(block, index, promoted)?;
                    i = index + inserted;
                    continue;
                }
                _ => {
                    for child in self.ast.children(stmt).to_vec() {
                        let site = Site::Block {
                            block,
                            index: i + self.ast.children(block).len() - before,
                        };
                        self.promote_reads(child, promoted, site)?;
                    }
                }
            }
            i += 1 + self.ast.children(block).len() - before;
        }
        Ok(())
    }

    /// Reads in the selects of an assignment target, and in the selects of
    /// the parts of a concatenated target.
    fn promote_lvalue_selects(&mut self, lhs: NodeId, promoted: &HashSet<NodeId>, site: Site) -> ElabResult<()> {
        match self.ast.kind(lhs) {
            NodeKind::Identifier => {
                for select in self.ast.children(lhs).to_vec() {
                    for c in self.ast.children(select).to_vec() {
                        self.promote_reads(c, promoted, site)?;
                    }
                }
            }
            NodeKind::Concat => {
                for part in self.ast.children(lhs).to_vec() {
                    self.promote_lvalue_selects(part, promoted, site)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Rewrites the assignment at `index` of `block` if it writes a promoted
    /// memory. Returns how many statements now stand where it stood.
    fn promote_write(&mut self, block: NodeId, index: usize, promoted: &HashSet<NodeId>) -> ElabResult<usize> {
        let stmt = self.ast.children(block)[index];
        let kind = self.ast.kind(stmt);
        let lhs = self.ast.children(stmt)[0];
        if self.ast.kind(lhs) == NodeKind::Concat {
            for part in self.ast.children(lhs).to_vec() {
                if self.mem2reg_check(part, promoted)?.is_some() {
                    if !self.rename_const_access(part)? {
                        return Err(error_unsupported(
                            "memory word with a variable address inside a concatenation",
                            self.ast.span(part),
                        ));
                    }
                }
            }
            return Ok(1);
        }
        let Some(mem) = self.mem2reg_check(lhs, promoted)? else {
            return Ok(1);
        };
        let address = self.ast.children(self.ast.children(lhs)[0])[0];
        if self.ast[address].is_const() > 0 {
            if !self.rename_const_access(lhs)? {
                log::warn!(
                    "{}: write to memory `{}` outside of its address range ignored",
                    self.loc(stmt),
                    self.ast[lhs].name
                );
                self.splice(block, index, Vec::new());
                return Ok(0);
            }
            return Ok(1);
        }

        let span = self.ast.span(stmt);
        let info = self.meminfo(mem);
        let name = self.ast[mem].name.clone();
        let signed = self.ast[mem].is_signed;
        let base = self.temp_name("mem2reg_wr", &name, span);
        let id_addr = format!("{base}_ADDR");
        let id_data = format!("{base}_DATA");
        let addr_bits = self.address_width(&info, address);
        self.add_nosync_temp(&id_addr, addr_bits, false, span);
        self.add_nosync_temp(&id_data, info.width, signed, span);

        let address = self.ast.clone_subtree(address);
        let addr_lhs = self.mk_ident(&id_addr, span);
        self.ast[addr_lhs].was_checked = true;
        let assign_addr = self.mk_node(NodeKind::AssignEq, vec![addr_lhs, address], span);

        let word_select = self.ast.children(lhs).get(1).copied();
        let subject = self.mk_ident(&id_addr, span);
        let mut items = vec![subject];
        for i in 0..i64::from(info.size) {
            let addr = info.low + i;
            let label = self.mk_bits(LogicVec::from_i64(addr, addr_bits), false, span);
            let reg = self.mk_ident(&format!("{name}[{addr}]"), span);
            self.ast[reg].was_checked = true;
            if let Some(select) = word_select {
                let select = self.ast.clone_subtree(select);
                self.ast.push_child(reg, select);
            }
            let data = self.mk_ident(&id_data, span);
            let write = self.mk_node(kind, vec![reg, data], span);
            let body = self.mk_node(NodeKind::Block, vec![write], span);
            items.push(self.mk_node(NodeKind::Cond, vec![label, body], span));
        }
        let case = self.mk_node(NodeKind::Case, items, span);

        // The original statement now assigns the data temporary.
        let data_lhs = self.mk_ident(&id_data, span);
        self.ast[data_lhs].was_checked = true;
        self.ast.replace_child(stmt, 0, data_lhs);
        self.ast[stmt].kind = NodeKind::AssignEq;
        self.ast.fixup_hierarchy_flags(stmt, true);
        for (offset, new) in [assign_addr, case].into_iter().enumerate() {
            self.ast[block].children.insert(index + 1 + offset, new);
            self.ast.fixup_hierarchy_flags(new, true);
        }
        Ok(3)
    }

    /// Renames a constant-address access `mem[c]` to the register `mem[c]`.
    /// Returns false if the address is outside the memory.
    fn rename_const_access(&mut self, id: NodeId) -> ElabResult<bool> {
        let Some(mem) = self.memory_ref(id) else {
            return Ok(true);
        };
        let info = self.meminfo(mem);
        let select = self.ast.children(id)[0];
        let address = self.ast.children(select)[0];
        let addr = {
            let a = &self.ast[address];
            a.as_int(a.is_signed)
        };
        if addr < info.low || addr >= info.low + i64::from(info.size) {
            return Ok(false);
        }
        let old = self.ast.take_child(id, 0);
        self.ast.delete(old);
        let name = format!("{}[{addr}]", self.ast[mem].name);
        let reg = self.lookup(&name);
        let node = &mut self.ast[id];
        node.name = name;
        node.id2ast = reg;
        node.range_valid = false;
        Ok(true)
    }

    fn add_nosync_temp(&mut self, name: &str, width: u32, signed: bool, span: Span) {
        let wire = self.mk_wire(name, width, signed, span);
        self.ast[wire].was_checked = true;
        let one = self.mk_int(1, false, 1, span);
        self.ast.set_attribute(wire, "nosync", one);
        self.add_module_item(wire);
    }

    /// Rewrites reads of promoted memories under `expr`.
    fn promote_reads(&mut self, expr: NodeId, promoted: &HashSet<NodeId>, site: Site) -> ElabResult<()> {
        let Some(mem) = self.mem2reg_check(expr, promoted)? else {
            for child in self.ast.children(expr).to_vec() {
                self.promote_reads(child, promoted, site)?;
            }
            return Ok(());
        };
        let span = self.ast.span(expr);
        let address = self.ast.children(self.ast.children(expr)[0])[0];
        self.promote_reads(address, promoted, site)?;
        let address = self.ast.children(self.ast.children(expr)[0])[0];
        let info = self.meminfo(mem);

        if self.ast[address].is_const() > 0 {
            if !self.rename_const_access(expr)? {
                let width = match self.ast.child(expr, 1) {
                    Some(select) if self.ast[select].range_valid => self.ast[select].range_width().max(1) as u32,
                    Some(_) => 1,
                    None => info.width,
                };
                let undef = self.mk_bits(LogicVec::filled(width, Logic::X), false, span);
                self.ast.replace_node(expr, undef);
            }
            return Ok(());
        }

        let name = self.ast[mem].name.clone();
        let signed = self.ast[mem].is_signed;
        let base = self.temp_name("mem2reg_rd", &name, span);
        let id_addr = format!("{base}_ADDR");
        let id_data = format!("{base}_DATA");
        let in_block = matches!(site, Site::Block { .. });
        let addr_bits = self.address_width(&info, address);
        for (temp, width, sign) in [(&id_addr, addr_bits, false), (&id_data, info.width, signed)] {
            if in_block {
                self.add_nosync_temp(temp, width, sign, span);
            } else {
                let wire = self.mk_wire(temp, width, sign, span);
                self.ast[wire].was_checked = true;
                self.add_module_item(wire);
            }
        }

        let address = self.ast.clone_subtree(address);
        let addr_lhs = self.mk_ident(&id_addr, span);
        self.ast[addr_lhs].was_checked = true;
        let assign_kind = if in_block { NodeKind::AssignEq } else { NodeKind::Assign };
        let assign_addr = self.mk_node(assign_kind, vec![addr_lhs, address], span);

        let subject = self.mk_ident(&id_addr, span);
        let mut items = vec![subject];
        for i in 0..i64::from(info.size) {
            let addr = info.low + i;
            let label = self.mk_bits(LogicVec::from_i64(addr, addr_bits), false, span);
            let data = self.mk_ident(&id_data, span);
            self.ast[data].was_checked = true;
            let reg = self.mk_ident(&format!("{name}[{addr}]"), span);
            let read = self.mk_node(NodeKind::AssignEq, vec![data, reg], span);
            let body = self.mk_node(NodeKind::Block, vec![read], span);
            items.push(self.mk_node(NodeKind::Cond, vec![label, body], span));
        }
        let default = self.mk_node(NodeKind::Default, Vec::new(), span);
        let data = self.mk_ident(&id_data, span);
        self.ast[data].was_checked = true;
        let undef = self.mk_bits(LogicVec::filled(info.width, Logic::X), false, span);
        let read = self.mk_node(NodeKind::AssignEq, vec![data, undef], span);
        let body = self.mk_node(NodeKind::Block, vec![read], span);
        items.push(self.mk_node(NodeKind::Cond, vec![default, body], span));
        let case = self.mk_node(NodeKind::Case, items, span);

        match site {
            Site::Block { block, index } => {
                for (offset, new) in [assign_addr, case].into_iter().enumerate() {
                    self.ast[block].children.insert(index + offset, new);
                    self.ast.fixup_hierarchy_flags(new, true);
                }
            }
            Site::Module => {
                let body = self.mk_node(NodeKind::Block, vec![case], span);
                let proc = self.mk_node(NodeKind::Always, vec![body], span);
                self.add_module_item(proc);
                self.add_module_item(assign_addr);
            }
        }

        let old = self.ast.take_child(expr, 0);
        self.ast.delete(old);
        let data_decl = self.lookup(&id_data);
        let node = &mut self.ast[expr];
        node.name = id_data;
        node.id2ast = data_decl;
        node.range_valid = false;
        Ok(())
    }

    /// Deletes the promoted memory declarations.
    fn mem2reg_remove(&mut self, module: NodeId, promoted: &HashSet<NodeId>) {
        let mut i = 0;
        while let Some(item) = self.ast.child(module, i) {
            if promoted.contains(&item) {
                let name = self.ast[item].name.clone();
                if self.ctx.scope.get(&name) == Some(&item) {
                    self.ctx.scope.remove(&name);
                }
                let old = self.ast.take_child(module, i);
                self.ast.delete(old);
                continue;
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use vela_ast::{Ast, Builder, NodeId, NodeKind};

    use super::MemFlags;
    use crate::errors::W301;
    use crate::simplify::tests::{simplified, Fixture};

    /// A module writing `mem[addr] <= d` from `always` with `events`.
    fn writer(b: &mut Builder<'_>, events: Vec<NodeId>, addr: NodeId) -> (NodeId, NodeId) {
        let mem = b.memory("mem", 4, 4);
        let clk = b.input("clk", 1);
        let d = b.input("d", 4);
        let q = b.output("q", 4);
        let target = b.index("mem", addr);
        let dv = b.ident("d");
        let write = b.nonblocking(target, dv);
        let body = b.block(vec![write]);
        let proc = b.always(events, body);
        let qi = b.ident("q");
        let zero = b.int(0);
        let read = b.index("mem", zero);
        let out = b.assign(qi, read);
        let m = b.module("m", vec![mem, clk, d, q, proc, out]);
        (m, mem)
    }

    fn has_node(ast: &Ast, root: NodeId, kind: NodeKind, name: &str) -> bool {
        ast.descendants(root)
            .into_iter()
            .any(|d| ast.kind(d) == kind && ast[d].name == name)
    }

    #[test]
    fn constant_address_clocked_write_is_promoted() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let clk = b.posedge("clk");
        let two = b.int(2);
        let (m, _) = writer(&mut b, vec![clk], two);
        let fx = Fixture::new();
        let ctx = simplified(&mut ast, m, &fx).unwrap();
        assert!(ctx.scope.contains_key("mem[0]"));
        assert!(ctx.scope.contains_key("mem[3]"));
        assert!(!has_node(&ast, m, NodeKind::Memory, "mem"));
        assert!(has_node(&ast, m, NodeKind::Identifier, "mem[2]"));
        assert!(fx.sink.diagnostics().iter().any(|d| d.code == W301));
    }

    #[test]
    fn combinational_write_is_never_promoted() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let two = b.int(2);
        let (m, _) = writer(&mut b, Vec::new(), two);
        let fx = Fixture::new();
        let ctx = simplified(&mut ast, m, &fx).unwrap();
        assert!(!ctx.scope.contains_key("mem[2]"));
        assert!(has_node(&ast, m, NodeKind::Memory, "mem"));
        assert!(has_node(&ast, m, NodeKind::MemWr, "mem"));
    }

    #[test]
    fn variable_address_write_keeps_memory() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let clk = b.posedge("clk");
        let a = b.ident("d");
        let (m, _) = writer(&mut b, vec![clk], a);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        assert!(has_node(&ast, m, NodeKind::Memory, "mem"));
        assert!(fx.sink.diagnostics().is_empty());
    }

    #[test]
    fn option_forces_promotion_of_variable_writes() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let clk = b.posedge("clk");
        let a = b.ident("d");
        let (m, _) = writer(&mut b, vec![clk], a);
        let mut fx = Fixture::new();
        fx.options.mem2reg = true;
        simplified(&mut ast, m, &fx).unwrap();
        assert!(!has_node(&ast, m, NodeKind::Memory, "mem"));
        let cases = ast
            .descendants(m)
            .into_iter()
            .filter(|&d| ast.kind(d) == NodeKind::Case)
            .count();
        assert_eq!(cases, 1);
        assert!(fx.sink.diagnostics().iter().all(|d| d.code != W301));
    }

    #[test]
    fn offset_memory_labels_cover_the_whole_address() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let word = b.range(3, 0);
        let words = b.range(4, 7);
        let mem = b.named(NodeKind::Memory, "mem", vec![word, words]);
        b.ast()[mem].is_reg = true;
        let clk_in = b.input("clk", 1);
        let a = b.input("a", 4);
        let d = b.input("d", 4);
        let addr = b.ident("a");
        let target = b.index("mem", addr);
        let dv = b.ident("d");
        let write = b.nonblocking(target, dv);
        let body = b.block(vec![write]);
        let clk = b.posedge("clk");
        let proc = b.always(vec![clk], body);
        let m = b.module("m", vec![mem, clk_in, a, d, proc]);
        let mut fx = Fixture::new();
        fx.options.mem2reg = true;
        let ctx = simplified(&mut ast, m, &fx).unwrap();
        assert!(ctx.scope.contains_key("mem[4]"));
        assert!(ctx.scope.contains_key("mem[7]"));
        let labels: Vec<NodeId> = ast
            .descendants(m)
            .into_iter()
            .filter(|&c| ast.kind(c) == NodeKind::Cond)
            .filter_map(|c| ast.child(c, 0))
            .filter(|&l| ast.kind(l) == NodeKind::Constant)
            .collect();
        let values: Vec<i64> = labels.iter().map(|&l| ast[l].as_int(false)).collect();
        // Address 1 is out of range and must not select a word.
        assert_eq!(values, vec![4, 5, 6, 7]);
        assert!(labels.iter().all(|&l| ast[l].bits.width() >= 4));
    }

    #[test]
    fn initial_constant_writes_keep_a_rom() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let mem = b.memory("mem", 4, 4);
        let a = b.input("a", 2);
        let q = b.output("q", 4);
        let mut writes = Vec::new();
        for (addr, value) in [(0, 1), (1, 2)] {
            let index = b.int(addr);
            let target = b.index("mem", index);
            let value = b.sized(4, value);
            writes.push(b.blocking(target, value));
        }
        let body = b.block(writes);
        let init = b.initial(body);
        let qi = b.ident("q");
        let ai = b.ident("a");
        let read = b.index("mem", ai);
        let out = b.assign(qi, read);
        let m = b.module("m", vec![mem, a, q, init, out]);
        let fx = Fixture::new();
        let ctx = simplified(&mut ast, m, &fx).unwrap();
        assert!(!ctx.scope.contains_key("mem[0]"));
        assert!(has_node(&ast, m, NodeKind::Memory, "mem"));
        assert!(fx.sink.diagnostics().iter().all(|d| d.code != W301));
    }

    #[test]
    fn flags_combine() {
        let f = MemFlags::SET_ELSE | MemFlags::CONST_LHS;
        assert!(f.contains(MemFlags::CONST_LHS));
        assert!(!f.contains(MemFlags::VAR_LHS));
        assert!(!f.contains(MemFlags::CONST_LHS | MemFlags::VAR_LHS));
    }
}
