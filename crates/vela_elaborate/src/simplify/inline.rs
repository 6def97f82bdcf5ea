//! Inlining of function and task calls, system tasks and `$readmem`.
//!
//! A call that does not fold to a constant is replaced by the body of the
//! callee. Each call site gets its own copies of the callee's variables,
//! named `$func$<callee>$<line>$<n>.<variable>` and marked `nosync`, so they
//! turn into combinational temporaries. Calls in continuous assignments and
//! port connections first move into a generated `always @*` block.

use std::collections::HashMap;
use std::path::PathBuf;

use vela_ast::{NodeId, NodeKind};
use vela_common::{calc, Logic, LogicVec};
use vela_diagnostics::Diagnostic;
use vela_source::Span;

use super::Simplifier;
use crate::errors::{error_not_const, error_unresolved, error_unsupported, fatal, ElabResult, E304, E312, E316, W305};

/// System tasks that only print or control simulation.
const DISPLAY_TASKS: &[&str] = &[
    "$display", "$displayb", "$displayh", "$displayo", "$write", "$writeb", "$writeh", "$writeo",
    "$strobe", "$monitor", "$info", "$warning", "$error", "$fatal", "$finish", "$stop",
    "$dumpfile", "$dumpvars", "$dumpon", "$dumpoff", "$dumpall", "$monitoron", "$monitoroff",
];

/// Statements standing in for one inlined call.
struct InlinedCall {
    /// Argument copies and the callee's body, in order.
    stmts: Vec<NodeId>,
    /// Name of the variable holding the result of a function.
    result: String,
}

impl Simplifier<'_, '_> {
    /// Replaces task calls in the procedural block `block`: user tasks are
    /// inlined, display tasks dropped and `$readmemh`/`$readmemb` turned
    /// into memory initialisation.
    pub(crate) fn lower_task_calls(&mut self, block: NodeId, is_initial: bool) -> ElabResult<bool> {
        self.lower_tasks_in(block, is_initial, is_initial)
    }

    fn lower_tasks_in(&mut self, block: NodeId, is_initial: bool, top_level: bool) -> ElabResult<bool> {
        let mut changed = false;
        let mut i = 0;
        while let Some(stmt) = self.ast.child(block, i) {
            match self.ast.kind(stmt) {
                NodeKind::Block => {
                    changed |= self.lower_tasks_in(stmt, is_initial, top_level)?;
                }
                NodeKind::Case => {
                    for item in self.ast.children(stmt).to_vec().into_iter().skip(1) {
                        if let Some(&body) = self.ast.children(item).last() {
                            if self.ast.kind(body) == NodeKind::Block {
                                changed |= self.lower_tasks_in(body, is_initial, false)?;
                            }
                        }
                    }
                }
                NodeKind::TCall => {
                    let replacement = self.lower_task_call(stmt, is_initial, top_level)?;
                    // the inlined statements are scanned again for nested calls
                    self.splice(block, i, replacement);
                    changed = true;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        Ok(changed)
    }

    /// The statements replacing the task call `stmt`.
    fn lower_task_call(&mut self, stmt: NodeId, is_initial: bool, top_level: bool) -> ElabResult<Vec<NodeId>> {
        let name = self.ast[stmt].name.clone();
        let span = self.ast.span(stmt);
        if name == "$readmemh" || name == "$readmemb" {
            if !is_initial {
                return Err(error_unsupported(&format!("`{name}` outside of an initial block"), span));
            }
            return self.expand_readmem(stmt, name == "$readmemh", top_level);
        }
        if DISPLAY_TASKS.contains(&name.as_str()) {
            if is_initial && !self.env.options.nodisplay {
                self.display(stmt)?;
            }
            return Ok(Vec::new());
        }
        if name.starts_with('$') {
            self.warn(Diagnostic::warning(
                W305,
                format!("system task `{name}` is ignored"),
                span,
            ));
            return Ok(Vec::new());
        }
        let task = self.lookup(&name).filter(|&t| self.ast.kind(t) == NodeKind::Task);
        let Some(task) = task else {
            return Err(error_unresolved(&name, span));
        };
        Ok(self.expand_call(stmt, task)?.stmts)
    }

    /// Prints a display task issued at elaboration time.
    fn display(&mut self, stmt: NodeId) -> ElabResult<()> {
        let args = self.ast.children(stmt).to_vec();
        for &arg in &args {
            self.resolve_expr(arg)?;
            self.fold_fully(arg, None, false)?;
        }
        let name = self.ast[stmt].name.clone();
        let printer = name.starts_with("$display") || name.starts_with("$write");
        let radix = match name.chars().last().filter(|_| printer) {
            Some('b') => 'b',
            Some('h') => 'h',
            Some('o') => 'o',
            _ => 'd',
        };
        let text = self.format_display(&args, radix);
        match name.as_str() {
            "$warning" => log::warn!("{}: {text}", self.loc(stmt)),
            "$error" | "$fatal" => log::error!("{}: {text}", self.loc(stmt)),
            "$finish" | "$stop" | "$dumpfile" | "$dumpvars" | "$dumpon" | "$dumpoff" | "$dumpall"
            | "$monitoron" | "$monitoroff" => {}
            _ => log::info!("{text}"),
        }
        Ok(())
    }

    /// Renders the arguments of a display task: a leading string is a format
    /// with `%d`, `%h`, `%x`, `%b`, `%o`, `%s`, `%m` and `%%`; other arguments
    /// print in `radix`.
    fn format_display(&self, args: &[NodeId], radix: char) -> String {
        let mut out = String::new();
        let mut rest = args.iter().copied();
        while let Some(arg) = rest.next() {
            let node = &self.ast[arg];
            if node.kind == NodeKind::Constant && node.is_string {
                let format = node.bits.decode_string();
                let mut chars = format.chars();
                while let Some(c) = chars.next() {
                    if c != '%' {
                        out.push(c);
                        continue;
                    }
                    let mut spec = chars.next();
                    while spec.is_some_and(|s| s.is_ascii_digit()) {
                        spec = chars.next();
                    }
                    match spec.map(|s| s.to_ascii_lowercase()) {
                        Some('%') => out.push('%'),
                        Some('m') => out.push_str(&self.ctx.name),
                        Some(s @ ('d' | 'h' | 'x' | 'b' | 'o' | 's' | 't')) => match rest.next() {
                            Some(value) => out.push_str(&self.format_value(value, s)),
                            None => out.push_str("<missing>"),
                        },
                        Some(other) => {
                            out.push('%');
                            out.push(other);
                        }
                        None => out.push('%'),
                    }
                }
            } else {
                out.push_str(&self.format_value(arg, radix));
            }
        }
        out
    }

    fn format_value(&self, id: NodeId, radix: char) -> String {
        let node = &self.ast[id];
        match node.is_const() {
            2 => return format!("{}", node.realvalue),
            1 => {}
            _ => return "<non-constant>".to_string(),
        }
        let bits = &node.bits;
        match radix {
            's' => bits.decode_string(),
            'b' => bits.to_string(),
            'h' | 'x' => radix_digits(bits, 4),
            'o' => radix_digits(bits, 3),
            _ => match calc::to_bigint(bits, node.is_signed) {
                Some(v) => v.to_string(),
                None => "x".to_string(),
            },
        }
    }

    /// Reads the file named by a `$readmemh`/`$readmemb` call. Unconditional
    /// calls become `MemInit` items of the module; conditional ones become
    /// assignments to the memory words.
    pub(crate) fn expand_readmem(&mut self, stmt: NodeId, hex: bool, unconditional: bool) -> ElabResult<Vec<NodeId>> {
        let span = self.ast.span(stmt);
        let task = self.ast[stmt].name.clone();
        let args = self.ast.children(stmt).to_vec();
        if !(2..=4).contains(&args.len()) {
            return Err(fatal(E316, format!("`{task}` expects two to four arguments"), span));
        }
        for &arg in args.iter().skip(2) {
            self.resolve_expr(arg)?;
            self.fold_fully(arg, None, false)?;
        }
        let file = &self.ast[args[0]];
        if file.kind != NodeKind::Constant {
            return Err(error_not_const(&format!("file name of `{task}`"), span));
        }
        let file_name = file.bits.decode_string();
        let mem_name = self.ast[args[1]].name.clone();
        let memory = self
            .lookup(&mem_name)
            .filter(|&m| self.ast.kind(m) == NodeKind::Memory);
        let Some(memory) = memory else {
            return Err(fatal(E312, format!("`{mem_name}` is not a memory"), span));
        };
        self.prepare_decl(memory)?;
        let (word_width, addr_min, addr_max) = {
            let m = &self.ast[memory];
            let addr = m.dimensions[0];
            (
                m.range_width().max(1) as u32,
                i64::from(addr.range_right),
                i64::from(addr.range_right) + i64::from(addr.range_width) - 1,
            )
        };
        let bound = |this: &Self, index: usize| -> ElabResult<Option<i64>> {
            match args.get(index) {
                None => Ok(None),
                Some(&arg) if this.ast[arg].is_const() == 1 => {
                    Ok(Some(this.ast[arg].as_int(this.ast[arg].is_signed)))
                }
                Some(_) => Err(error_not_const(&format!("address of `{task}`"), span)),
            }
        };
        let start = bound(self, 2)?.unwrap_or(addr_min);
        let finish = bound(self, 3)?.unwrap_or(addr_max);

        let text = self.read_memory_file(&file_name, span)?;
        let words = parse_memory_file(&text, hex, word_width, start, finish, addr_min, addr_max)
            .map_err(|token| fatal(E312, format!("cannot parse `{token}` in `{file_name}`"), span))?;
        log::debug!(
            "{}: loaded {} words of `{mem_name}` from `{file_name}`",
            self.loc(stmt),
            words.len()
        );

        if !unconditional {
            let mut stmts = Vec::new();
            for (addr, value) in words {
                let index = self.mk_int(addr, false, 32, span);
                let range = self.mk_node(NodeKind::Range, vec![index], span);
                let lhs = self.mk_named(NodeKind::Identifier, mem_name.clone(), vec![range], span);
                self.ast[lhs].id2ast = Some(memory);
                self.ast[lhs].was_checked = true;
                let rhs = self.mk_bits(value, false, span);
                stmts.push(self.mk_node(NodeKind::AssignEq, vec![lhs, rhs], span));
            }
            return Ok(stmts);
        }

        // consecutive addresses share one MemInit item
        let mut runs: Vec<(i64, Vec<LogicVec>)> = Vec::new();
        for (addr, value) in words {
            match runs.last_mut() {
                Some((first, run)) if *first + run.len() as i64 == addr => run.push(value),
                _ => runs.push((addr, vec![value])),
            }
        }
        for (addr, run) in runs {
            let count = run.len() as i64;
            let mut data = LogicVec::new(0);
            for word in &run {
                for bit in word.iter() {
                    data.push(bit);
                }
            }
            let addr = self.mk_int(addr, false, 32, span);
            let data = self.mk_bits(data, false, span);
            let enable = self.mk_bits(LogicVec::filled(word_width, Logic::One), false, span);
            let words = self.mk_int(count, false, 32, span);
            let init = self.mk_named(NodeKind::MemInit, mem_name.clone(), vec![addr, data, enable, words], span);
            self.ast[init].id2ast = Some(memory);
            self.add_module_item(init);
        }
        Ok(Vec::new())
    }

    /// The contents of `name`, looked up as given and then next to the
    /// source file of the call.
    fn read_memory_file(&self, name: &str, span: Span) -> ElabResult<String> {
        let mut candidates = vec![PathBuf::from(name)];
        if let Some(dir) = self.env.sources.path(span.file).and_then(|p| p.parent()) {
            candidates.push(dir.join(name));
        }
        for path in &candidates {
            if let Ok(text) = std::fs::read_to_string(path) {
                return Ok(text);
            }
        }
        Err(fatal(E312, format!("cannot open memory file `{name}`"), span))
    }

    /// Inlines the remaining function calls of the procedural block `block`
    /// before the statements that use them.
    pub(crate) fn inline_procedural_calls(&mut self, block: NodeId) -> ElabResult<bool> {
        let mut changed = false;
        let mut i = 0;
        while let Some(stmt) = self.ast.child(block, i) {
            let roots = match self.ast.kind(stmt) {
                NodeKind::Block => {
                    changed |= self.inline_procedural_calls(stmt)?;
                    i += 1;
                    continue;
                }
                NodeKind::Case => {
                    let items = self.ast.children(stmt).to_vec();
                    let mut roots = vec![items[0]];
                    for &item in &items[1..] {
                        let parts = self.ast.children(item).to_vec();
                        let Some((&body, labels)) = parts.split_last() else {
                            continue;
                        };
                        roots.extend(labels.iter().copied());
                        if self.ast.kind(body) == NodeKind::Block {
                            changed |= self.inline_procedural_calls(body)?;
                        } else if self.first_call(&[body]).is_some() {
                            let index = self.ast.children(item).len() - 1;
                            let body = self.ast.take_child(item, index);
                            let wrapped = self.mk_node(NodeKind::Block, vec![body], self.ast.span(body));
                            self.ast.push_child(item, wrapped);
                            self.ast.fixup_hierarchy_flags(wrapped, true);
                            changed |= self.inline_procedural_calls(wrapped)?;
                        }
                    }
                    roots
                }
                _ => vec![stmt],
            };
            let Some(call) = self.first_call(&roots) else {
                i += 1;
                continue;
            };
            let func = self.ast[call].id2ast.filter(|&f| self.ast.is_live(f));
            let Some(func) = func else {
                i += 1;
                continue;
            };
            if self.is_recursive_function(func) {
                return Err(fatal(
                    E304,
                    format!(
                        "recursive function `{}` called with non-constant arguments",
                        self.ast[func].name
                    ),
                    self.ast.span(call),
                ));
            }
            let inlined = self.expand_call(call, func)?;
            self.replace_call_with_result(call, inlined.result);
            for (offset, new_stmt) in inlined.stmts.into_iter().enumerate() {
                self.ast[block].children.insert(i + offset, new_stmt);
                self.ast.fixup_hierarchy_flags(new_stmt, true);
            }
            changed = true;
        }
        Ok(changed)
    }

    /// Moves function calls out of a continuous assignment or port
    /// connection into generated `always @*` blocks.
    pub(crate) fn inline_continuous_calls(&mut self, item: NodeId) -> ElabResult<bool> {
        let roots: Vec<NodeId> = match self.ast.kind(item) {
            NodeKind::Assign => self.ast.children(item).to_vec(),
            NodeKind::Cell => self
                .ast
                .children(item)
                .iter()
                .copied()
                .filter(|&c| self.ast.kind(c) == NodeKind::Argument)
                .collect(),
            _ => return Ok(false),
        };
        let mut changed = false;
        while let Some(call) = self.first_call(&roots) {
            let Some(func) = self.ast[call].id2ast else {
                break;
            };
            let span = self.ast.span(call);
            let fname = self.ast[func].name.clone();
            let Some(result) = self.ast.child(func, 0) else {
                return Err(error_unsupported(&format!("function `{fname}` without a result"), span));
            };
            let wire_name = format!("{}.{fname}", self.temp_name("func", &fname, span));
            let wire = self.ast.clone_subtree(result);
            {
                let w = &mut self.ast[wire];
                w.name = wire_name.clone();
                w.is_reg = true;
                w.is_input = false;
                w.is_output = false;
                w.port_id = 0;
            }
            self.add_module_item(wire);

            let call_copy = self.ast.clone_subtree(call);
            let lhs = self.mk_ident(&wire_name, span);
            let assign = self.mk_node(NodeKind::AssignEq, vec![lhs, call_copy], span);
            self.ast[assign].was_checked = true;
            let body = self.mk_node(NodeKind::Block, vec![assign], span);
            let always = self.mk_node(NodeKind::Always, vec![body], span);
            self.add_module_item(always);

            self.replace_call_with_result(call, wire_name);
            changed = true;
        }
        Ok(changed)
    }

    /// The first call of a user function under `roots`, outermost first.
    fn first_call(&self, roots: &[NodeId]) -> Option<NodeId> {
        roots.iter().find_map(|&root| {
            self.ast.descendants(root).into_iter().find(|&id| {
                let node = &self.ast[id];
                node.kind == NodeKind::FCall
                    && !node.name.starts_with('$')
                    && node
                        .id2ast
                        .filter(|&f| self.ast.is_live(f))
                        .is_some_and(|f| self.ast.kind(f) == NodeKind::Function)
            })
        })
    }

    fn replace_call_with_result(&mut self, call: NodeId, result: String) {
        self.ast.delete_children(call);
        let node = &mut self.ast[call];
        node.kind = NodeKind::Identifier;
        node.name = result;
        node.id2ast = None;
        node.basic_prep = false;
    }

    /// Copies the callee's variables into the module and returns the
    /// argument assignments followed by the callee's body.
    fn expand_call(&mut self, call: NodeId, callee: NodeId) -> ElabResult<InlinedCall> {
        let name = self.ast[callee].name.clone();
        let span = self.ast.span(call);
        let prefix = format!("{}.", self.temp_name("func", &name, span));
        let args = self.ast.children(call).to_vec();
        let mut renames: HashMap<String, String> = HashMap::new();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut next_arg = 0;

        for decl in self.ast.children(callee).to_vec() {
            let kind = self.ast.kind(decl);
            if !matches!(kind, NodeKind::Wire | NodeKind::Memory | NodeKind::Parameter | NodeKind::Localparam) {
                continue;
            }
            let local = self.ast[decl].name.clone();
            let renamed = format!("{prefix}{local}");
            renames.insert(local, renamed.clone());
            let (is_input, is_output) = (self.ast[decl].is_input, self.ast[decl].is_output);
            let copy = self.ast.clone_subtree(decl);
            {
                let node = &mut self.ast[copy];
                node.name = renamed.clone();
                node.port_id = 0;
                node.is_input = false;
                node.is_output = false;
                if matches!(kind, NodeKind::Wire | NodeKind::Memory) {
                    node.is_reg = true;
                }
            }
            if matches!(kind, NodeKind::Wire | NodeKind::Memory) {
                let one = self.mk_int(1, false, 1, span);
                self.ast.set_attribute(copy, "nosync", one);
            }
            self.add_module_item(copy);

            if !(is_input || is_output) {
                continue;
            }
            let Some(&arg) = args.get(next_arg) else {
                return Err(fatal(E316, format!("too few arguments in call of `{name}`"), span));
            };
            next_arg += 1;
            let arg = self.ast.clone_subtree(arg);
            let var = self.mk_ident(&renamed, span);
            let assign = if is_input {
                self.mk_node(NodeKind::AssignEq, vec![var, arg], span)
            } else {
                self.mk_node(NodeKind::AssignEq, vec![arg, var], span)
            };
            let lhs = self.ast.children(assign)[0];
            self.ast[lhs].was_checked = true;
            if is_input {
                inputs.push(assign);
            } else {
                outputs.push(assign);
            }
        }
        if next_arg < args.len() {
            return Err(fatal(E316, format!("too many arguments in call of `{name}`"), span));
        }

        let mut stmts = inputs;
        for child in self.ast.children(callee).to_vec() {
            if matches!(
                self.ast.kind(child),
                NodeKind::Wire | NodeKind::Memory | NodeKind::Parameter | NodeKind::Localparam
            ) {
                continue;
            }
            let copy = self.ast.clone_subtree(child);
            self.rename_locals(copy, &prefix, &mut renames);
            stmts.push(copy);
        }
        stmts.extend(outputs);
        log::trace!("inlined call of `{name}` at {}", self.loc(call));
        Ok(InlinedCall {
            stmts,
            result: format!("{prefix}{name}"),
        })
    }

    /// Gives the copied body of a callee its per-call-site names.
    fn rename_locals(&mut self, root: NodeId, prefix: &str, renames: &mut HashMap<String, String>) {
        let nodes = self.ast.descendants(root);
        for &id in &nodes {
            let node = &self.ast[id];
            let nested_decl = crate::context::is_declaration(node.kind) && !node.name.is_empty();
            let named_block = node.kind == NodeKind::Block && !node.name.is_empty();
            if nested_decl || named_block {
                let renamed = format!("{prefix}{}", node.name);
                if nested_decl {
                    renames.insert(node.name.clone(), renamed.clone());
                }
                self.ast[id].name = renamed;
            }
        }
        for id in nodes {
            let node = &self.ast[id];
            if node.kind != NodeKind::Identifier {
                continue;
            }
            if let Some(renamed) = renames.get(&node.name) {
                let node = &mut self.ast[id];
                node.name = renamed.clone();
                node.id2ast = None;
            }
        }
    }
}

/// Digits of `bits` in a power-of-two radix, most significant first. A
/// digit with undefined bits prints as `x` (or `z` if all are floating).
fn radix_digits(bits: &LogicVec, bits_per_digit: u32) -> String {
    let width = bits.width().max(1);
    let digits = width.div_ceil(bits_per_digit);
    let mut out = String::new();
    for d in (0..digits).rev() {
        let chunk: Vec<Logic> = (0..bits_per_digit)
            .map(|k| d * bits_per_digit + k)
            .filter(|&i| i < width)
            .map(|i| bits.get(i))
            .collect();
        if chunk.iter().all(|&b| b == Logic::Z) {
            out.push('z');
        } else if chunk.iter().any(|b| !b.is_definite()) {
            out.push('x');
        } else {
            let value = chunk
                .iter()
                .enumerate()
                .fold(0u32, |acc, (k, &b)| acc | (u32::from(b == Logic::One) << k));
            out.push(char::from_digit(value, 16).unwrap_or('?'));
        }
    }
    out
}

/// Parses the text of a memory file into `(address, word)` pairs. Returns
/// the offending token when one is not a valid word or address.
fn parse_memory_file(
    text: &str,
    hex: bool,
    width: u32,
    start: i64,
    finish: i64,
    addr_min: i64,
    addr_max: i64,
) -> Result<Vec<(i64, LogicVec)>, String> {
    let step = if start <= finish { 1 } else { -1 };
    let done = |cursor: i64| cursor == finish + step || cursor > addr_max || cursor < addr_min;
    let mut words = Vec::new();
    let mut cursor = start;
    let mut in_comment = false;
    for line in text.lines() {
        let mut cleaned = String::with_capacity(line.len());
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if in_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    in_comment = false;
                }
                cleaned.push(' ');
            } else if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                in_comment = true;
                cleaned.push(' ');
            } else {
                cleaned.push(c);
            }
        }
        for token in cleaned.split_whitespace() {
            if token.starts_with("//") {
                break;
            }
            if let Some(addr) = token.strip_prefix('@') {
                cursor = i64::from_str_radix(addr, 16).map_err(|_| token.to_string())?;
                continue;
            }
            let digits: String = token.chars().filter(|&c| c != '_').collect();
            let value = if hex {
                LogicVec::from_hex_str(&digits)
            } else {
                LogicVec::from_binary_str(&digits)
            };
            let Some(value) = value else {
                return Err(token.to_string());
            };
            words.push((cursor, value.resized(width, false)));
            cursor += step;
            if done(cursor) {
                return Ok(words);
            }
        }
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use vela_ast::{Ast, Builder, NodeKind};
    use vela_common::LogicVec;

    use super::{parse_memory_file, radix_digits};
    use crate::errors::E316;
    use crate::simplify::tests::{simplified, Fixture};

    #[test]
    fn memory_file_with_comments_and_addresses() {
        let text = "// header\n01 /* two\nwords */ 02\n@4 ff 0_f\n";
        let words = parse_memory_file(text, true, 8, 0, 7, 0, 7).unwrap();
        let addrs: Vec<i64> = words.iter().map(|(a, _)| *a).collect();
        assert_eq!(addrs, vec![0, 1, 4, 5]);
        assert_eq!(words[2].1.to_u64(), Some(0xff));
        assert_eq!(words[3].1.to_u64(), Some(0x0f));
    }

    #[test]
    fn memory_file_stops_at_the_end_address() {
        let words = parse_memory_file("1 0 1 1", false, 1, 2, 3, 0, 7).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].0, 3);
    }

    #[test]
    fn bad_memory_token_is_reported() {
        assert_eq!(parse_memory_file("12 zq", true, 8, 0, 3, 0, 3).unwrap_err(), "zq");
    }

    #[test]
    fn hex_digits_of_partial_nibble() {
        assert_eq!(radix_digits(&LogicVec::from_u64(0x1ab, 9), 4), "1ab");
        assert_eq!(radix_digits(&LogicVec::from_u64(0o17, 6), 3), "17");
    }

    fn double_function(b: &mut Builder) -> vela_ast::NodeId {
        let x = b.input("x", 4);
        let res = b.ident("double");
        let a = b.ident("x");
        let one = b.int(1);
        let shifted = b.binop(NodeKind::ShiftLeft, a, one);
        let assign = b.blocking(res, shifted);
        let body = b.block(vec![assign]);
        b.function("double", 5, vec![x, body])
    }

    #[test]
    fn continuous_call_moves_into_an_always_block() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let func = double_function(&mut b);
        let y = b.output("y", 5);
        let a = b.input("a", 4);
        let lhs = b.ident("y");
        let arg = b.ident("a");
        let call = b.fcall("double", vec![arg]);
        let assign = b.assign(lhs, call);
        let m = b.module("m", vec![func, y, a, assign]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        let rhs = ast.children(assign)[1];
        assert_eq!(ast.kind(rhs), NodeKind::Identifier);
        assert!(ast[rhs].name.starts_with("$func$double$"));
        assert!(ast.children(m).iter().any(|&c| ast.kind(c) == NodeKind::Always));
        assert!(ast.descendants(m).iter().all(|&d| ast.kind(d) != NodeKind::FCall || ast[d].name.starts_with('$')));
    }

    #[test]
    fn constant_call_is_folded_not_inlined() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let func = double_function(&mut b);
        let three = b.int(3);
        let call = b.fcall("double", vec![three]);
        let p = b.localparam("P", call);
        let m = b.module("m", vec![func, p]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        let value = ast.children(p)[0];
        assert_eq!(ast[value].as_int(false), 6);
        assert!(!ast.children(m).iter().any(|&c| ast.kind(c) == NodeKind::Always));
    }

    #[test]
    fn task_call_with_wrong_arity_is_rejected() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let x = b.input("x", 1);
        let task = b.task("t", vec![x]);
        let call = b.tcall("t", vec![]);
        let body = b.block(vec![call]);
        let proc = b.initial(body);
        let m = b.module("m", vec![task, proc]);
        let fx = Fixture::new();
        let err = simplified(&mut ast, m, &fx).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, E316);
    }

    #[test]
    fn unknown_system_task_is_dropped_with_a_warning() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let call = b.tcall("$frobnicate", vec![]);
        let body = b.block(vec![call]);
        let proc = b.initial(body);
        let m = b.module("m", vec![proc]);
        let fx = Fixture::new();
        simplified(&mut ast, m, &fx).unwrap();
        assert!(ast.children(body).is_empty());
        assert!(fx.sink.diagnostics().iter().any(|d| d.code == crate::errors::W305));
    }
}
