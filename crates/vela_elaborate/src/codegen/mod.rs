//! Netlist generation from a simplified module tree.
//!
//! [`generate_module`] walks the working copy of one module after
//! simplification and memory lowering and builds a netlist [`Module`]:
//! declarations become wires, memories and parameters, continuous
//! assignments become connections, expressions become operator cells
//! (`expr.rs`) and procedural blocks become processes (`process.rs`).
//!
//! The module is built detached from the design; the caller inserts it once
//! generation succeeded, so a failed module never leaves a partial netlist.

mod expr;
mod process;

use std::collections::HashMap;

use vela_ast::{Ast, NodeId, NodeKind};
use vela_common::{ConstValue, Ident, LogicVec};
use vela_netlist::{Attributes, Memory, Module, SigBit, SigSpec, WireId};
use vela_source::Span;

use crate::context::{ElabEnv, ModuleContext};
use crate::errors::{error_unsupported, fatal, from_netlist, ElabResult, E307, E313};
use crate::width::{detect_sign_width, SignWidth};

/// Builds the netlist of the module in `ctx`.
pub fn generate_module(ast: &Ast, ctx: &mut ModuleContext, env: ElabEnv<'_>) -> ElabResult<Module> {
    log::info!("generating netlist for module `{}`", ctx.name);
    let name = env.design.ident(&ctx.name);
    let mut gen = CodeGen {
        ast,
        ctx,
        env,
        module: Module::new(name),
        rvalue: HashMap::new(),
    };
    gen.generate()?;
    Ok(gen.module)
}

/// State of one module's netlist generation.
pub(crate) struct CodeGen<'g, 'a> {
    pub(crate) ast: &'g Ast,
    pub(crate) ctx: &'g mut ModuleContext,
    pub(crate) env: ElabEnv<'a>,
    pub(crate) module: Module,
    /// Bits read through their process temporaries after a blocking
    /// assignment.
    pub(crate) rvalue: HashMap<SigBit, SigBit>,
}

impl CodeGen<'_, '_> {
    fn generate(&mut self) -> ElabResult<()> {
        let ast = self.ast;
        let root = self.ctx.module;
        self.module.attributes = self.attributes_of(root);

        let whitebox = ast.get_bool_attribute(root, "whitebox");
        let ports_only = self.env.options.lib
            || ast.get_bool_attribute(root, "blackbox")
            || (whitebox && self.env.options.nowb)
            || (!self.env.options.noblackbox && self.is_empty_module(root));
        if ports_only {
            self.module.attributes.remove("whitebox");
            self.module
                .attributes
                .insert("blackbox".to_string(), ConstValue::bits(LogicVec::from_bool(true)));
            for &item in ast.children(root) {
                let node = &ast[item];
                if matches!(node.kind, NodeKind::Wire | NodeKind::Autowire) && node.port_id > 0 {
                    self.gen_wire(item)?;
                }
                if node.kind == NodeKind::Parameter {
                    self.gen_parameter(item)?;
                }
            }
            self.module.fixup_ports();
            return Ok(());
        }

        for &item in ast.children(root) {
            match ast.kind(item) {
                NodeKind::Wire | NodeKind::Autowire => self.gen_wire(item)?,
                NodeKind::Memory => self.gen_memory(item)?,
                NodeKind::Parameter | NodeKind::Localparam => self.gen_parameter(item)?,
                _ => {}
            }
        }
        for &item in ast.children(root) {
            match ast.kind(item) {
                NodeKind::Assign => self.gen_assign(item)?,
                NodeKind::Always | NodeKind::Initial => self.gen_process(item)?,
                NodeKind::Cell => self.gen_cell(item)?,
                NodeKind::MemInit => self.gen_meminit(item)?,
                kind if kind.is_property() => {
                    let enable = SigSpec::constant(&LogicVec::from_bool(true));
                    self.gen_property(item, enable)?;
                }
                NodeKind::Primitive | NodeKind::CellArray => {
                    return Err(error_unsupported("unexpanded instance array or primitive", ast.span(item)))
                }
                _ => {}
            }
        }
        self.module.fixup_ports();
        Ok(())
    }

    /// True if the module declares nothing but ports and parameters.
    fn is_empty_module(&self, module: NodeId) -> bool {
        let ast = self.ast;
        ast.children(module).iter().all(|&item| {
            let node = &ast[item];
            match node.kind {
                NodeKind::Wire => node.is_input || node.is_output,
                NodeKind::Parameter | NodeKind::Localparam => true,
                _ => false,
            }
        })
    }

    pub(crate) fn ident(&self, name: &str) -> Ident {
        self.env.design.ident(name)
    }

    pub(crate) fn src(&self, span: Span) -> ConstValue {
        ConstValue::String(self.env.sources.loc_string(span))
    }

    /// The user attributes of `id` plus its `src` location.
    pub(crate) fn attributes_of(&self, id: NodeId) -> Attributes {
        let ast = self.ast;
        let mut attrs = Attributes::new();
        for (key, &value) in &ast[id].attributes {
            let node = &ast[value];
            if node.is_const() == 1 {
                attrs.insert(key.clone(), node.as_attr_const());
            }
        }
        attrs.insert("src".to_string(), self.src(ast.span(id)));
        attrs
    }

    pub(crate) fn detect(&self, id: NodeId) -> ElabResult<SignWidth> {
        let ast = self.ast;
        detect_sign_width(ast, &self.ctx.scope, id)
    }

    /// A fresh internal name `$kind$file:line$n`.
    pub(crate) fn new_name(&mut self, kind: &str, span: Span) -> String {
        let n = self.ctx.next_id();
        format!("{kind}${}${n}", self.env.sources.line_string(span))
    }

    /// A new internal wire of `width` bits.
    pub(crate) fn new_wire(&mut self, name: &str, width: u32, span: Span) -> ElabResult<SigSpec> {
        let ident = self.ident(name);
        let src = self.src(span);
        let id = self.module.add_wire(ident, width).map_err(|e| from_netlist(e, span))?;
        self.module.wires[id].attributes.insert("src".to_string(), src);
        Ok(SigSpec::wire(id, width))
    }

    /// The netlist wire declared as `name`.
    pub(crate) fn wire_named(&self, name: &str) -> Option<WireId> {
        self.env.design.interner.get(name).and_then(|i| self.module.find_wire(i))
    }

    fn gen_wire(&mut self, id: NodeId) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let width = if node.range_valid { node.range_width().max(1) as u32 } else { 1 };
        let ident = self.ident(&node.name);
        let mut attrs = self.attributes_of(id);
        if node.is_wand {
            attrs.insert("wand".to_string(), ConstValue::bits(LogicVec::from_bool(true)));
        }
        if node.is_wor {
            attrs.insert("wor".to_string(), ConstValue::bits(LogicVec::from_bool(true)));
        }
        let wid = self.module.add_wire(ident, width).map_err(|e| from_netlist(e, node.span))?;
        let wire = &mut self.module.wires[wid];
        wire.start_offset = if node.range_valid { node.range_right } else { 0 };
        wire.upto = node.range_swapped;
        wire.is_signed = node.is_signed;
        if node.port_id > 0 {
            wire.port_id = node.port_id as u32;
            wire.port_input = node.is_input;
            wire.port_output = node.is_output;
        }
        wire.attributes = attrs;
        Ok(())
    }

    fn gen_memory(&mut self, id: NodeId) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let width = node.range_width().max(1) as u32;
        let (low, size) = node
            .dimensions
            .first()
            .map_or((0, 1), |d| (d.range_right, d.range_width.max(1) as u32));
        let mut memory = Memory::new(self.ident(&node.name), width, size);
        memory.start_offset = low;
        memory.attributes = self.attributes_of(id);
        self.module.add_memory(memory).map_err(|e| from_netlist(e, node.span))?;
        Ok(())
    }

    fn gen_parameter(&mut self, id: NodeId) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let Some(value) = node.children.first().map(|&v| &ast[v]) else {
            return Ok(());
        };
        if value.is_const() == 0 {
            return Ok(());
        }
        let ident = self.ident(&node.name);
        if node.kind == NodeKind::Parameter {
            self.module.avail_parameters.push(ident);
            self.module.parameter_default_values.insert(ident, value.as_para_const());
        }
        if self.env.options.pwires {
            let bits = if value.is_const() == 2 { value.real_as_const(32) } else { value.bits.clone() };
            let wid = self
                .module
                .add_wire(ident, bits.width().max(1))
                .map_err(|e| from_netlist(e, node.span))?;
            let mut attrs = self.attributes_of(id);
            attrs.insert("parameter".to_string(), ConstValue::bits(LogicVec::from_bool(true)));
            self.module.wires[wid].attributes = attrs;
            self.module.wires[wid].is_signed = value.is_signed;
            let width = self.module.wires[wid].width;
            self.module.connect(SigSpec::wire(wid, width), SigSpec::constant(&bits));
        }
        Ok(())
    }

    fn gen_assign(&mut self, id: NodeId) -> ElabResult<()> {
        let ast = self.ast;
        let (lhs, rhs) = (ast.children(id)[0], ast.children(id)[1]);
        if self.has_variable_select(lhs) {
            return Err(error_unsupported(
                "variable index on the left-hand side of a continuous assignment",
                ast.span(id),
            ));
        }
        let target = self.gen_lvalue(lhs)?;
        let value = self.gen_rhs(rhs, target.width())?;
        self.module.connect(target, value);
        Ok(())
    }

    /// `rhs` evaluated for an assignment to `width` bits.
    pub(crate) fn gen_rhs(&mut self, rhs: NodeId, width: u32) -> ElabResult<SigSpec> {
        let sw = self.detect(rhs)?;
        let mut value = self.gen_rtl(rhs, Some(sw.width.max(width)), sw.signed)?;
        value.extend_u0(width, sw.signed);
        Ok(value)
    }

    fn gen_cell(&mut self, id: NodeId) -> ElabResult<()> {
        let ast = self.ast;
        let span = ast.span(id);
        let children = ast.children(id).to_vec();
        let Some(&celltype) = children.iter().find(|&&c| ast.kind(c) == NodeKind::CellType) else {
            return Err(fatal(E313, "instance without a cell type", span));
        };
        let type_name = ast[celltype].name.clone();
        if type_name.starts_with('$') && !self.env.options.icells {
            return Err(fatal(
                E313,
                format!("instantiation of internal cell type `{type_name}` requires `icells`"),
                span,
            ));
        }
        if !type_name.starts_with('$')
            && !self.env.templates.contains_key(&type_name)
            && !self.env.design.has(&type_name)
        {
            return Err(fatal(E307, format!("module `{type_name}` is not defined"), span));
        }
        let name = match ast[id].name.as_str() {
            "" => self.new_name("$cell", span),
            n => n.to_string(),
        };
        let cell_name = self.ident(&name);
        let cell_type = self.ident(&type_name);
        let cid = self
            .module
            .add_cell(cell_name, cell_type)
            .map_err(|e| from_netlist(e, span))?;
        self.module.cells[cid].attributes = self.attributes_of(id);

        let mut positional = 0;
        for &paraset in ast.children(celltype) {
            let node = &ast[paraset];
            let Some(value) = node.children.first().map(|&v| &ast[v]) else {
                continue;
            };
            if value.is_const() == 0 {
                return Err(fatal(
                    crate::errors::E302,
                    format!("parameter override of instance `{name}` is not constant"),
                    node.span,
                ));
            }
            positional += 1;
            let key = if node.name.is_empty() {
                format!("${positional}")
            } else {
                node.name.clone()
            };
            self.module.cells[cid].set_param(&key, value.as_para_const());
        }

        let mut port = 0;
        for &arg in &children {
            if ast.kind(arg) != NodeKind::Argument {
                continue;
            }
            port += 1;
            let Some(expr) = ast.child(arg, 0) else {
                continue;
            };
            let sig = self.gen_rtl(expr, None, false)?;
            let key = match ast[arg].name.as_str() {
                "" => format!("${port}"),
                n => n.to_string(),
            };
            self.module.cells[cid].set_port(&key, sig);
        }
        Ok(())
    }

    fn gen_meminit(&mut self, id: NodeId) -> ElabResult<()> {
        let ast = self.ast;
        let node = &ast[id];
        let span = node.span;
        let name = node.name.clone();
        let Some(mem) = node.id2ast.filter(|&m| ast.is_live(m)) else {
            return Err(crate::errors::error_unresolved(&name, span));
        };
        let width = ast[mem].range_width().max(1) as u32;
        let parts = ast.children(id).to_vec();
        if parts.len() < 4 {
            return Err(error_unsupported("malformed memory initialization", span));
        }
        let words = {
            let w = &ast[parts[3]];
            if w.is_const() != 1 {
                return Err(error_unsupported("memory initialization with a non-constant word count", span));
            }
            w.as_int(false).max(1) as u32
        };
        let addr = self.gen_rtl(parts[0], None, false)?;
        let mut data = self.gen_rtl(parts[1], None, false)?;
        data.extend_u0(width * words, false);
        let mut en = self.gen_rtl(parts[2], None, false)?;
        en.extend_u0(width, false);

        let cell_name = self.new_name(&format!("$meminit${name}"), span);
        let priority = self.ctx.next_id();
        let src = self.src(span);
        let (cell_name, cell_type) = (self.ident(&cell_name), self.ident("$meminit"));
        let cid = self
            .module
            .add_cell(cell_name, cell_type)
            .map_err(|e| from_netlist(e, span))?;
        let cell = &mut self.module.cells[cid];
        cell.set_param("MEMID", ConstValue::String(name));
        cell.set_param("ABITS", ConstValue::int(addr.width() as i32));
        cell.set_param("WIDTH", ConstValue::int(width as i32));
        cell.set_param("WORDS", ConstValue::int(words as i32));
        cell.set_param("PRIORITY", ConstValue::int(priority as i32));
        cell.set_port("ADDR", addr);
        cell.set_port("DATA", data);
        cell.set_port("EN", en);
        cell.attributes.insert("src".to_string(), src);
        Ok(())
    }

    /// Emits `$assert`, `$assume`, `$live`, `$fair` or `$cover` checking the
    /// expression of `id` while `enable` is high.
    pub(crate) fn gen_property(&mut self, id: NodeId, enable: SigSpec) -> ElabResult<()> {
        let ast = self.ast;
        let span = ast.span(id);
        let cell_type = format!("${}", ast.kind(id).type_name());
        let check = match ast.child(id, 0) {
            Some(expr) => {
                let sig = self.gen_rtl(expr, None, false)?;
                if sig.width() == 1 {
                    sig
                } else {
                    self.unary_cell("$reduce_bool", id, sig, false, 1)?
                }
            }
            None => SigSpec::constant(&LogicVec::from_bool(true)),
        };
        let name = self.new_name(&cell_type, span);
        let (name, cell_type) = (self.ident(&name), self.ident(&cell_type));
        let cid = self
            .module
            .add_cell(name, cell_type)
            .map_err(|e| from_netlist(e, span))?;
        let attrs = self.attributes_of(id);
        let cell = &mut self.module.cells[cid];
        cell.set_port("A", check);
        cell.set_port("EN", enable);
        cell.attributes = attrs;
        Ok(())
    }
}
