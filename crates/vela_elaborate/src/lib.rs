//! Tree-to-netlist elaboration engine.
//!
//! Reduces a parsed design tree (modules, interfaces, packages and bind
//! directives under one `Design` root) to a netlist [`Design`]. Every module
//! is simplified to a fixed point, its memories promoted or lowered, and its
//! netlist generated; instances with parameter overrides or interface
//! connections are derived once per distinct binding through a worklist.
//!
//! # Usage
//!
//! ```ignore
//! let design = elaborate(&mut ast, root, &options, &sources, &sink)?;
//! ```

#![warn(missing_docs)]

pub mod codegen;
pub mod const_func;
pub mod context;
pub mod derive;
pub mod errors;
pub mod latch;
pub mod mem2reg;
pub mod simplify;
pub mod width;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use vela_ast::{Ast, NodeId, NodeKind};
use vela_common::{ConstValue, InternalError, LogicVec, VelaResult};
use vela_config::ElabOptions;
use vela_diagnostics::{Diagnostic, DiagnosticSink};
use vela_netlist::{CellId, Design, SigSpec};
use vela_source::{SourceDb, Span};

use context::{ElabEnv, ModuleContext, Scope};
use derive::{
    bind_parameters, derived_name, explode_interface_port, interface_ports, resolve_bindings, stripped_name,
    Binding, INTERFACE_PORT_ATTR,
};
use errors::{
    error_unsupported, fatal, ElabError, ElabResult, E302, E307, E309, E310, E311, E314, E315, W302, W303,
};
use simplify::Simplifier;

/// Elaborates the design rooted at `root` into a netlist [`Design`].
///
/// User-facing errors are emitted to `sink`; elaboration stops at the first
/// fatal one and the modules emitted so far are returned. Only internal
/// invariant violations return `Err`.
pub fn elaborate(
    ast: &mut Ast,
    root: NodeId,
    options: &ElabOptions,
    sources: &SourceDb,
    sink: &DiagnosticSink,
) -> VelaResult<Design> {
    let mut elab = Elaborator::new(ast, options, sources, sink);
    match elab.run(root) {
        Ok(()) => {}
        Err(ElabError::Fatal(diag)) => sink.emit(*diag),
        Err(ElabError::Internal(err)) => return Err(err),
    }
    Ok(elab.into_design())
}

/// State every module of one elaboration sees.
struct Shared<'a> {
    options: &'a ElabOptions,
    sources: &'a SourceDb,
    sink: &'a DiagnosticSink,
    design: Design,
    globals: Scope,
    templates: BTreeMap<String, NodeId>,
}

impl Shared<'_> {
    fn env(&self) -> ElabEnv<'_> {
        ElabEnv {
            options: self.options,
            sources: self.sources,
            sink: self.sink,
            design: &self.design,
            globals: &self.globals,
            templates: &self.templates,
        }
    }
}

/// An instance found in an emitted module that refers to a template.
struct Instance {
    cell: CellId,
    template: String,
    overrides: Vec<Binding>,
    interfaces: BTreeMap<String, String>,
}

/// Drives the elaboration of one design.
pub struct Elaborator<'a> {
    ast: &'a mut Ast,
    shared: Shared<'a>,
    /// Template every emitted module was built from.
    origins: BTreeMap<String, String>,
    /// Instantiation depth of every emitted module.
    depth: HashMap<String, u32>,
    /// Emitted modules whose instances still have to be derived.
    queue: VecDeque<String>,
    /// Modules with instances waiting for an interface module.
    deferred: BTreeSet<String>,
    binds: Vec<NodeId>,
}

impl<'a> Elaborator<'a> {
    /// An elaborator writing into a fresh netlist design.
    pub fn new(ast: &'a mut Ast, options: &'a ElabOptions, sources: &'a SourceDb, sink: &'a DiagnosticSink) -> Self {
        Self {
            ast,
            shared: Shared {
                options,
                sources,
                sink,
                design: Design::new(),
                globals: Scope::new(),
                templates: BTreeMap::new(),
            },
            origins: BTreeMap::new(),
            depth: HashMap::new(),
            queue: VecDeque::new(),
            deferred: BTreeSet::new(),
            binds: Vec::new(),
        }
    }

    /// The netlist built so far.
    pub fn design(&self) -> &Design {
        &self.shared.design
    }

    /// Consumes the elaborator, returning its netlist.
    pub fn into_design(self) -> Design {
        self.shared.design
    }

    /// Elaborates every declaration under `root`.
    pub fn run(&mut self, root: NodeId) -> ElabResult<()> {
        self.ast.fixup_hierarchy_flags(root, true);
        self.collect(root)?;

        // Interfaces first, so modules find their signals in the netlist.
        let mut roots: Vec<(String, NodeId)> = self
            .shared
            .templates
            .iter()
            .filter(|(_, &node)| !self.is_abstract(node))
            .map(|(name, &node)| (name.clone(), node))
            .collect();
        roots.sort_by_key(|(_, node)| self.ast.kind(*node) != NodeKind::Interface);
        for (name, node) in roots {
            let copy = self.ast.clone_subtree(node);
            self.emit(copy, name.clone(), name, 0)?;
        }

        self.drain()?;
        self.gen_bindings()?;
        self.drain()?;
        self.reprocess_if_necessary()?;
        self.select_top()
    }

    /// Registers module and interface templates, simplifies packages and
    /// remembers bind directives.
    fn collect(&mut self, root: NodeId) -> ElabResult<()> {
        for item in self.ast.children(root).to_vec() {
            match self.ast.kind(item) {
                NodeKind::Module | NodeKind::Interface => self.add_template(item)?,
                NodeKind::Package => self.add_package(item)?,
                NodeKind::Bind => self.binds.push(item),
                kind => {
                    return Err(error_unsupported(
                        &format!("{kind} at the top level of a design"),
                        self.ast.span(item),
                    ))
                }
            }
        }
        Ok(())
    }

    fn add_template(&mut self, node: NodeId) -> ElabResult<()> {
        let name = stripped_name(&self.ast[node].name).to_string();
        let span = self.ast.span(node);
        let Some(&previous) = self.shared.templates.get(&name) else {
            self.shared.templates.insert(name, node);
            return Ok(());
        };
        let options = self.shared.options;
        if options.overwrite {
            self.shared.sink.emit(Diagnostic::warning(
                W303,
                format!("replacing existing module `{name}`"),
                span,
            ));
            self.shared.templates.insert(name, node);
            Ok(())
        } else if options.nooverwrite {
            self.shared.sink.emit(Diagnostic::warning(
                W302,
                format!("ignoring re-definition of module `{name}`"),
                span,
            ));
            Ok(())
        } else {
            Err(Diagnostic::error(E309, format!("re-definition of module `{name}`"), span)
                .with_label(vela_diagnostics::Label::secondary(
                    self.ast.span(previous),
                    "previously defined here",
                ))
                .with_help("enable `overwrite` to replace it or `nooverwrite` to keep the first one")
                .into())
        }
    }

    /// Simplifies a package in place and publishes its members as
    /// `package::name`.
    fn add_package(&mut self, package: NodeId) -> ElabResult<()> {
        let name = self.ast[package].name.clone();
        log::debug!("simplifying package `{name}`");
        let mut ctx = ModuleContext::new(package, name.clone());
        Simplifier::new(&mut *self.ast, &mut ctx, self.shared.env()).simplify_module()?;
        for &item in self.ast.children(package) {
            let node = &self.ast[item];
            if context::is_declaration(node.kind) && !node.name.is_empty() {
                self.shared.globals.insert(format!("{name}::{}", node.name), item);
            }
        }
        Ok(())
    }

    /// Templates only elaborated through derivation.
    fn is_abstract(&self, template: NodeId) -> bool {
        self.ast[template].name.starts_with("$abstract") || !interface_ports(self.ast, template).is_empty()
    }

    /// Simplifies and generates the module copy `node` as `name`, inserts it
    /// into the design and queues it for derivation of its instances.
    fn emit(&mut self, node: NodeId, name: String, origin: String, depth: u32) -> ElabResult<()> {
        self.ast.fixup_hierarchy_flags(node, true);
        let mut ctx = ModuleContext::new(node, name.clone());
        let env = self.shared.env();
        Simplifier::new(&mut *self.ast, &mut ctx, env).simplify_module()?;
        let mut module = codegen::generate_module(&*self.ast, &mut ctx, env)?;
        if self.ast.kind(node) == NodeKind::Interface {
            module
                .attributes
                .insert("is_interface".to_string(), ConstValue::bits(LogicVec::from_bool(true)));
        }
        for missing in &ctx.missing_interfaces {
            log::debug!("`{name}` uses interface `{missing}` before it is emitted");
        }
        self.ast.delete(node);
        self.shared.design.insert_module(module);
        self.origins.insert(name.clone(), origin);
        self.depth.insert(name.clone(), depth);
        self.queue.push_back(name);
        Ok(())
    }

    fn drain(&mut self) -> ElabResult<()> {
        while let Some(name) = self.queue.pop_front() {
            if !self.derive_instances(&name)? {
                self.deferred.insert(name);
            }
        }
        Ok(())
    }

    /// Derives the modules instantiated by `module` and points its cells at
    /// them. Returns false if an instance waits for an interface module that
    /// does not exist yet.
    fn derive_instances(&mut self, module: &str) -> ElabResult<bool> {
        let mut instances = self.instances_of(module);
        // Interface instances first; interface ports need their modules.
        instances.sort_by_key(|inst| {
            let is_interface = self
                .shared
                .templates
                .get(&inst.template)
                .is_some_and(|&t| self.ast.kind(t) == NodeKind::Interface);
            !is_interface
        });
        let depth = self.depth.get(module).copied().unwrap_or(0) + 1;
        let mut complete = true;
        for inst in instances {
            let derived = self.derive_with_interfaces(&inst.template, &inst.overrides, &inst.interfaces, depth)?;
            let Some(derived) = derived else {
                complete = false;
                continue;
            };
            let ident = self.shared.design.ident(&derived);
            if let Some(m) = self.shared.design.module_mut(module) {
                let cell = &mut m.cells[inst.cell];
                cell.cell_type = ident;
                cell.parameters.clear();
            }
        }
        Ok(complete)
    }

    fn instances_of(&self, module: &str) -> Vec<Instance> {
        let design = &self.shared.design;
        let Some(m) = design.module(module) else {
            return Vec::new();
        };
        m.cells
            .iter()
            .filter_map(|(id, cell)| {
                let template = design.name(cell.cell_type);
                if !self.shared.templates.contains_key(template) {
                    return None;
                }
                let interfaces = cell
                    .attributes
                    .iter()
                    .filter_map(|(key, value)| {
                        let port = key.strip_prefix(INTERFACE_PORT_ATTR)?;
                        let name = match value {
                            ConstValue::String(s) => s.clone(),
                            other => other.to_logic_vec().decode_string(),
                        };
                        Some((port.to_string(), name))
                    })
                    .collect();
                Some(Instance {
                    cell: id,
                    template: template.to_string(),
                    overrides: cell.parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    interfaces,
                })
            })
            .collect()
    }

    /// The module `template` specializes to under `overrides`, elaborating
    /// it on first use.
    pub fn derive(&mut self, template: &str, overrides: &[Binding], depth: u32) -> ElabResult<String> {
        match self.derive_with_interfaces(template, overrides, &BTreeMap::new(), depth)? {
            Some(name) => Ok(name),
            None => Err(InternalError::new(format!("derivation of `{template}` deferred without interfaces")).into()),
        }
    }

    /// Like [`Elaborator::derive`], with the interface modules bound to the
    /// template's interface ports by port name. `None` if one of them has
    /// not been emitted yet.
    pub fn derive_with_interfaces(
        &mut self,
        template: &str,
        overrides: &[Binding],
        interfaces: &BTreeMap<String, String>,
        depth: u32,
    ) -> ElabResult<Option<String>> {
        let Some(&node) = self.shared.templates.get(template) else {
            return Err(fatal(E307, format!("module `{template}` is not defined"), Span::DUMMY));
        };
        let span = self.ast.span(node);
        let bindings = resolve_bindings(self.ast, node, overrides, span)?;
        let name = derived_name(&self.ast[node].name, &bindings, interfaces);
        if self.shared.design.has(&name) {
            log::debug!("reusing `{name}` for `{template}`");
            return Ok(Some(name));
        }
        if let Some(missing) = interfaces.values().find(|i| !self.shared.design.has(i)) {
            log::debug!("deriving `{template}` waits for interface `{missing}`");
            return Ok(None);
        }
        let ports = interface_ports(self.ast, node);
        if let Some(&port) = ports.iter().find(|&&p| !interfaces.contains_key(&self.ast[p].name)) {
            return Err(fatal(
                E314,
                format!(
                    "interface port `{}` of module `{template}` is not connected to an interface",
                    self.ast[port].name
                ),
                self.ast.span(port),
            ));
        }
        if depth > self.shared.options.max_recursion_depth {
            return Err(fatal(
                E310,
                format!(
                    "instantiation of `{template}` exceeds the depth limit of {}",
                    self.shared.options.max_recursion_depth
                ),
                span,
            ));
        }

        log::info!("deriving `{name}` from `{template}`");
        let copy = self.ast.clone_subtree(node);
        bind_parameters(self.ast, copy, &bindings);
        for port in interface_ports(self.ast, copy) {
            let port_name = self.ast[port].name.clone();
            let Some(interface) = interfaces.get(&port_name) else {
                continue;
            };
            let design = &self.shared.design;
            let Some(module) = design.module(interface) else {
                continue;
            };
            let Some(&interface_template) = self
                .origins
                .get(interface)
                .and_then(|origin| self.shared.templates.get(origin))
            else {
                return Err(fatal(E314, format!("`{interface}` is not an interface"), span));
            };
            explode_interface_port(self.ast, copy, port, module, interface_template, |i| {
                design.name(i).to_string()
            })?;
        }
        self.emit(copy, name.clone(), template.to_string(), depth)?;
        Ok(Some(name))
    }

    /// Retries the modules whose interface-port instances could not be
    /// derived, until no more progress is made.
    fn reprocess_if_necessary(&mut self) -> ElabResult<()> {
        loop {
            if self.deferred.is_empty() {
                return Ok(());
            }
            let before = self.shared.design.module_count();
            let pending = std::mem::take(&mut self.deferred);
            for name in &pending {
                log::debug!("re-deriving instances of `{name}`");
                if !self.derive_instances(name)? {
                    self.deferred.insert(name.clone());
                }
            }
            self.drain()?;
            if self.shared.design.module_count() == before && self.deferred.len() == pending.len() {
                break;
            }
        }
        let Some(name) = self.deferred.iter().next() else {
            return Ok(());
        };
        let missing = self
            .instances_of(name)
            .into_iter()
            .flat_map(|inst| inst.interfaces.into_values())
            .find(|i| !self.shared.design.has(i))
            .unwrap_or_default();
        Err(fatal(
            E314,
            format!("interface `{missing}` used in `{name}` was never elaborated"),
            Span::DUMMY,
        ))
    }

    /// Instantiates the cell of every bind directive in each module built
    /// from the bind's target template.
    fn gen_bindings(&mut self) -> ElabResult<()> {
        for bind in std::mem::take(&mut self.binds) {
            let target = self.ast[bind].name.clone();
            let span = self.ast.span(bind);
            let Some(cell) = self.ast.child(bind, 0) else {
                continue;
            };
            let targets: Vec<String> = self
                .origins
                .iter()
                .filter(|(_, origin)| **origin == target)
                .map(|(name, _)| name.clone())
                .collect();
            if targets.is_empty() {
                return Err(fatal(E307, format!("bind target `{target}` is not defined"), span));
            }
            for module in targets {
                log::debug!("binding `{}` into `{module}`", self.ast[cell].name);
                self.bind_cell(&module, cell)?;
                self.queue.push_back(module);
            }
        }
        Ok(())
    }

    fn bind_cell(&mut self, module: &str, cell: NodeId) -> ElabResult<()> {
        let ast = &*self.ast;
        let span = ast.span(cell);
        let Some(celltype) = ast
            .children(cell)
            .iter()
            .copied()
            .find(|&c| ast.kind(c) == NodeKind::CellType)
        else {
            return Err(fatal(E307, "bound instance without a cell type", span));
        };
        let design = &self.shared.design;
        let Some(target) = design.module(module) else {
            return Ok(());
        };

        let mut params = Vec::new();
        for (position, &paraset) in ast.children(celltype).iter().enumerate() {
            let Some(&value) = ast[paraset].children.first() else {
                continue;
            };
            if ast[value].is_const() == 0 {
                return Err(fatal(E302, "bound parameter override is not constant", ast.span(value)));
            }
            let key = match ast[paraset].name.as_str() {
                "" => format!("${}", position + 1),
                n => n.to_string(),
            };
            params.push((key, ast[value].as_para_const()));
        }
        let mut ports = Vec::new();
        let mut position = 0;
        for &arg in ast.children(cell) {
            if ast.kind(arg) != NodeKind::Argument {
                continue;
            }
            position += 1;
            let Some(expr) = ast.child(arg, 0) else {
                continue;
            };
            let node = &ast[expr];
            let sig = match node.kind {
                NodeKind::Constant => SigSpec::constant(&node.bits),
                NodeKind::Identifier if node.children.is_empty() => {
                    let wire = target
                        .find_wire(design.ident(&node.name))
                        .ok_or_else(|| errors::error_unresolved(&node.name, node.span))?;
                    SigSpec::wire(wire, target.wires[wire].width)
                }
                _ => return Err(fatal(E311, "bound port connections must be signals or constants", node.span)),
            };
            let key = match ast[arg].name.as_str() {
                "" => format!("${position}"),
                n => n.to_string(),
            };
            ports.push((key, sig));
        }

        let cell_name = design.ident(&ast[cell].name);
        let cell_type = design.ident(&ast[celltype].name);
        let Some(m) = self.shared.design.module_mut(module) else {
            return Ok(());
        };
        let id = m.add_cell(cell_name, cell_type).map_err(|e| errors::from_netlist(e, span))?;
        let cell = &mut m.cells[id];
        cell.attributes
            .insert("src".to_string(), ConstValue::String(self.shared.sources.loc_string(span)));
        for (key, value) in params {
            cell.set_param(&key, value);
        }
        for (key, sig) in ports {
            cell.set_port(&key, sig);
        }
        Ok(())
    }

    /// Rejects recursive hierarchies and marks the top module.
    fn select_top(&mut self) -> ElabResult<()> {
        let design = &mut self.shared.design;
        if let Err(err) = design.check_hierarchy() {
            return Err(fatal(E310, err.to_string(), Span::DUMMY));
        }
        let top = match &self.shared.options.top {
            Some(top) => {
                if !design.has(top) {
                    return Err(fatal(E315, format!("top module `{top}` not found"), Span::DUMMY));
                }
                top.clone()
            }
            None => {
                let candidates = design.top_candidates();
                match candidates.as_slice() {
                    [only] => only.clone(),
                    _ => {
                        log::debug!("no unique top module among {} candidates", candidates.len());
                        return Ok(());
                    }
                }
            }
        };
        log::info!("top module is `{top}`");
        if let Some(m) = design.module_mut(&top) {
            m.attributes
                .insert("top".to_string(), ConstValue::bits(LogicVec::from_bool(true)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ast::Builder;

    fn run(ast: &mut Ast, root: NodeId, options: &ElabOptions) -> (Design, Vec<Diagnostic>) {
        let sources = SourceDb::new();
        let sink = DiagnosticSink::new();
        let design = elaborate(ast, root, options, &sources, &sink).unwrap();
        (design, sink.take_all())
    }

    fn leaf(b: &mut Builder<'_>, name: &str) -> NodeId {
        let four = b.int(4);
        let w = b.parameter("WIDTH", four);
        let a = b.input("a", 8);
        let y = b.output("y", 8);
        let lhs = b.ident("y");
        let rhs = b.ident("a");
        let assign = b.assign(lhs, rhs);
        b.module(name, vec![w, a, y, assign])
    }

    #[test]
    fn single_module_becomes_top() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let m = leaf(&mut b, "leaf");
        let root = b.design(vec![m]);
        let (design, diags) = run(&mut ast, root, &ElabOptions::default());
        assert!(diags.is_empty());
        assert!(design.module("leaf").unwrap().has_attribute("top"));
    }

    #[test]
    fn redefinition_is_fatal_by_default() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let first = leaf(&mut b, "leaf");
        let second = leaf(&mut b, "leaf");
        let root = b.design(vec![first, second]);
        let (design, diags) = run(&mut ast, root, &ElabOptions::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, E309);
        assert_eq!(design.module_count(), 0);
    }

    #[test]
    fn nooverwrite_keeps_the_first_definition() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let first = leaf(&mut b, "leaf");
        let second = leaf(&mut b, "leaf");
        let root = b.design(vec![first, second]);
        let options = ElabOptions {
            nooverwrite: true,
            ..ElabOptions::default()
        };
        let (design, diags) = run(&mut ast, root, &options);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, W302);
        assert!(design.has("leaf"));
    }

    #[test]
    fn missing_top_is_reported() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let m = leaf(&mut b, "leaf");
        let root = b.design(vec![m]);
        let options = ElabOptions {
            top: Some("chip".to_string()),
            ..ElabOptions::default()
        };
        let (_, diags) = run(&mut ast, root, &options);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, E315);
    }

    #[test]
    fn derivation_is_memoized() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let m = leaf(&mut b, "leaf");
        let root = b.design(vec![m]);
        let options = ElabOptions::default();
        let sources = SourceDb::new();
        let sink = DiagnosticSink::new();
        let mut elab = Elaborator::new(&mut ast, &options, &sources, &sink);
        elab.run(root).unwrap();
        let wide = vec![("WIDTH".to_string(), ConstValue::bits(LogicVec::from_u64(8, 32)))];
        let first = elab.derive("leaf", &wide, 1).unwrap();
        let again = elab.derive("leaf", &wide, 1).unwrap();
        assert_eq!(first, again);
        assert!(first.starts_with("$paramod\\leaf\\WIDTH="));
        assert_eq!(elab.derive("leaf", &[], 1).unwrap(), "leaf");
        assert_eq!(elab.design().module_count(), 2);
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn unknown_instance_type_is_reported() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let cell = b.cell("u0", "missing", vec![], vec![]);
        let m = b.module("top", vec![cell]);
        let root = b.design(vec![m]);
        let (_, diags) = run(&mut ast, root, &ElabOptions::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, E307);
    }
}
