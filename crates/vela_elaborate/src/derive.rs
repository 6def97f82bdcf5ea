//! Parametric module derivation and interface expansion.
//!
//! A module instantiated with parameter overrides is elaborated once per
//! distinct binding under a derived name:
//!
//! ```text
//! $paramod\fifo\DEPTH=32'00000000000000000000000000010000
//! ```
//!
//! Parameter text longer than [`MAX_PARAM_INFO`] characters is replaced by a
//! content hash, `$paramod$<hash>\fifo`. Modules with interface ports get
//! `$interfaces$` and the names of the bound interfaces appended.
//!
//! The [`Simplifier`] side of interface handling lives here as well: an
//! instance of an interface becomes one wire per interface signal, named
//! `instance.signal`, and a connection of such an instance to an interface
//! port becomes one connection per signal, named `port.signal`.

use std::collections::BTreeMap;

use vela_ast::{Ast, NodeId, NodeKind};
use vela_common::{ConstValue, ContentHash, Ident};
use vela_netlist::Module;
use vela_source::{Provenance, Span};

use crate::context::ModuleContext;
use crate::errors::{error_not_const, error_unsupported, fatal, ElabResult, E307, E308, E314};
use crate::simplify::Simplifier;

/// Longest parameter description kept verbatim in a derived name.
pub const MAX_PARAM_INFO: usize = 60;

/// Prefix of templates that are only elaborated through derivation.
const ABSTRACT_PREFIX: &str = "$abstract";

/// Attribute on a cell that connects interface port `<port>`; the value is
/// the interface module name.
pub(crate) const INTERFACE_PORT_ATTR: &str = "interface_port:";

/// A parameter value bound by an instance, by declared parameter name.
pub type Binding = (String, ConstValue);

/// Template name with the `$abstract` prefix removed.
pub fn stripped_name(name: &str) -> &str {
    name.strip_prefix(ABSTRACT_PREFIX)
        .map(|rest| rest.trim_start_matches('\\'))
        .unwrap_or(name)
}

fn param_text(value: &ConstValue) -> String {
    match value {
        ConstValue::Bits { value, .. } => format!("{value:?}"),
        ConstValue::String(s) => format!("\"{s}\""),
        ConstValue::Real(r) => format!("{r:?}"),
    }
}

/// Maps the overrides of an instance onto the parameters `template`
/// declares, in declaration order. Overrides are keyed by name or by
/// one-based position `$N`.
pub fn resolve_bindings(
    ast: &Ast,
    template: NodeId,
    overrides: &[Binding],
    span: Span,
) -> ElabResult<Vec<Binding>> {
    let params: Vec<&str> = ast
        .children(template)
        .iter()
        .filter(|&&c| ast.kind(c) == NodeKind::Parameter)
        .map(|&c| ast[c].name.as_str())
        .collect();
    let mut resolved: Vec<Option<ConstValue>> = vec![None; params.len()];
    for (key, value) in overrides {
        let index = match key.strip_prefix('$').and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n >= 1 && n <= params.len() => Some(n - 1),
            _ => params.iter().position(|p| *p == key.as_str()),
        };
        let Some(index) = index else {
            return Err(fatal(
                E308,
                format!("module `{}` has no parameter `{key}`", stripped_name(&ast[template].name)),
                span,
            ));
        };
        resolved[index] = Some(value.clone());
    }
    Ok(params
        .into_iter()
        .zip(resolved)
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
        .collect())
}

/// The name a module derived from `template` with `bindings` and the
/// interfaces bound to its interface ports is emitted under. Without
/// bindings or interfaces this is the template name itself.
pub fn derived_name(template: &str, bindings: &[Binding], interfaces: &BTreeMap<String, String>) -> String {
    let base = stripped_name(template);
    if bindings.is_empty() && interfaces.is_empty() {
        return base.to_string();
    }
    let info: String = bindings
        .iter()
        .map(|(name, value)| format!("\\{name}={}", param_text(value)))
        .collect();
    let mut name = if info.len() > MAX_PARAM_INFO {
        let hash = ContentHash::from_parts([base, info.as_str()]);
        format!("$paramod${}\\{base}", hash.short_hex())
    } else {
        format!("$paramod\\{base}{info}")
    };
    if !interfaces.is_empty() {
        name.push_str("$interfaces$");
        let names: Vec<&str> = interfaces.values().map(String::as_str).collect();
        name.push_str(&names.join("$"));
    }
    name
}

/// Replaces the values of the bound parameters of a template copy by
/// constants.
pub fn bind_parameters(ast: &mut Ast, module: NodeId, bindings: &[Binding]) {
    let prov = Provenance::internal();
    for param in ast.children(module).to_vec() {
        if ast.kind(param) != NodeKind::Parameter {
            continue;
        }
        let Some((_, value)) = bindings.iter().find(|(name, _)| *name == ast[param].name) else {
            continue;
        };
        let span = ast.span(param);
        let constant = ast.mkconst_value(value, &prov);
        ast[constant].span = span;
        if ast.children(param).is_empty() {
            ast.push_child(param, constant);
        } else {
            ast.replace_child(param, 0, constant);
        }
    }
}

/// The modport `name` of an interface template.
pub fn find_modport(ast: &Ast, interface: NodeId, name: &str) -> Option<NodeId> {
    ast.children(interface)
        .iter()
        .copied()
        .find(|&c| ast.kind(c) == NodeKind::Modport && ast[c].name == name)
}

/// Signals of an emitted interface module, in declaration order.
fn interface_signals(module: &Module, names: impl Fn(Ident) -> String) -> Vec<(String, u32, bool)> {
    module
        .wires
        .values()
        .map(|w| (names(w.name), w.width, w.is_signed))
        .filter(|(name, _, _)| !name.starts_with('$'))
        .collect()
}

/// Replaces the interface port `port` of a module copy by one port wire per
/// signal of the emitted interface module `interface`, named
/// `port.signal`. With a modport only its members become ports, in the
/// modport's directions; without one every signal is bidirectional.
pub fn explode_interface_port(
    ast: &mut Ast,
    module: NodeId,
    port: NodeId,
    interface: &Module,
    interface_template: NodeId,
    names: impl Fn(Ident) -> String,
) -> ElabResult<()> {
    let span = ast.span(port);
    let port_name = ast[port].name.clone();
    let kind = ast
        .child(port, 0)
        .map(|t| ast[t].name.clone())
        .unwrap_or_default();
    let modport = match kind.split_once('.') {
        Some((iface, modport)) => match find_modport(ast, interface_template, modport) {
            Some(m) => Some(m),
            None => {
                return Err(fatal(
                    E314,
                    format!("interface `{iface}` has no modport `{modport}`"),
                    span,
                ))
            }
        },
        None => None,
    };

    let mut next_port = ast
        .children(module)
        .iter()
        .map(|&c| ast[c].port_id)
        .max()
        .unwrap_or(0);
    let prov = Provenance::internal();
    let mut wires = Vec::new();
    for (signal, width, signed) in interface_signals(interface, names) {
        let (is_input, is_output) = match modport {
            Some(m) => {
                let member = ast
                    .children(m)
                    .iter()
                    .copied()
                    .find(|&c| ast[c].name == signal);
                match member {
                    Some(member) => (ast[member].is_input, ast[member].is_output),
                    None => continue,
                }
            }
            None => (true, true),
        };
        let msb = ast.mkconst_int(i64::from(width.max(1)) - 1, true, 32, &prov);
        let lsb = ast.mkconst_int(0, true, 32, &prov);
        let range = ast.new_node(NodeKind::Range, &prov, vec![msb, lsb]);
        {
            let r = &mut ast[range];
            r.range_valid = true;
            r.range_left = width.max(1) as i32 - 1;
            r.range_right = 0;
        }
        let wire = ast.new_named(NodeKind::Wire, format!("{port_name}.{signal}"), &prov, vec![range]);
        next_port += 1;
        let w = &mut ast[wire];
        w.span = span;
        w.is_input = is_input;
        w.is_output = is_output;
        w.is_logic = true;
        w.is_signed = signed;
        w.range_valid = true;
        w.range_left = width.max(1) as i32 - 1;
        w.range_right = 0;
        w.port_id = next_port;
        wires.push(wire);
    }

    let Some(index) = ast.children(module).iter().position(|&c| c == port) else {
        return Err(error_unsupported("interface port outside of its module", span));
    };
    let old = ast.take_child(module, index);
    ast.delete(old);
    for (offset, wire) in wires.into_iter().enumerate() {
        ast[module].children.insert(index + offset, wire);
        ast.fixup_hierarchy_flags(wire, true);
    }
    Ok(())
}

/// Interface ports a template declares, by port name.
pub fn interface_ports(ast: &Ast, template: NodeId) -> Vec<NodeId> {
    ast.children(template)
        .iter()
        .copied()
        .filter(|&c| ast.kind(c) == NodeKind::InterfacePort)
        .collect()
}

fn cell_type_of(ast: &Ast, cell: NodeId) -> Option<NodeId> {
    ast.children(cell)
        .iter()
        .copied()
        .find(|&c| ast.kind(c) == NodeKind::CellType)
}

impl Simplifier<'_, '_> {
    fn interface_template(&self, cell: NodeId) -> Option<NodeId> {
        let celltype = cell_type_of(self.ast, cell)?;
        self.env
            .templates
            .get(&self.ast[celltype].name)
            .copied()
            .filter(|&t| self.ast.kind(t) == NodeKind::Interface)
    }

    /// The interface instance a cell argument connects, if the argument is
    /// a bare reference to one.
    fn interface_argument(&self, arg: NodeId) -> Option<NodeId> {
        let ast = &*self.ast;
        if ast.kind(arg) != NodeKind::Argument {
            return None;
        }
        let expr = ast.child(arg, 0)?;
        if ast.kind(expr) != NodeKind::Identifier || !ast.children(expr).is_empty() {
            return None;
        }
        self.lookup(&ast[expr].name)
            .filter(|&d| ast.kind(d) == NodeKind::Cell && ast.get_bool_attribute(d, "is_interface"))
    }

    /// True if `cell` instantiates an interface that has not been expanded
    /// yet, or connects an interface instance to a port.
    pub(crate) fn is_interface_instance(&self, cell: NodeId) -> bool {
        let pending_instance =
            self.interface_template(cell).is_some() && !self.ast.get_bool_attribute(cell, "is_interface");
        pending_instance
            || self
                .ast
                .children(cell)
                .iter()
                .any(|&arg| self.interface_argument(arg).is_some())
    }

    /// Expands an interface instance into its signal wires, and interface
    /// connections into per-signal connections.
    pub(crate) fn explode_interface_instance(&mut self, cell: NodeId) -> ElabResult<bool> {
        let mut changed = false;
        if let Some(template) = self.interface_template(cell) {
            if !self.ast.get_bool_attribute(cell, "is_interface") {
                self.explode_instance_signals(cell, template)?;
                changed = true;
            }
        }

        let mut i = 0;
        while let Some(arg) = self.ast.child(cell, i) {
            let Some(instance) = self.interface_argument(arg) else {
                i += 1;
                continue;
            };
            let span = self.ast.span(arg);
            let port = self.ast[arg].name.clone();
            if port.is_empty() {
                return Err(error_unsupported("positional connection of an interface port", span));
            }
            let inst_name = self.ast[instance].name.clone();
            let interface = self.ast[instance]
                .attributes
                .get("interface_type")
                .map(|&a| self.ast[a].bits.decode_string())
                .unwrap_or_default();
            let prefix = format!("{inst_name}.");
            let mut signals: Vec<(NodeId, String)> = self
                .ctx
                .scope
                .iter()
                .filter(|(name, d)| name.starts_with(&prefix) && self.ast.kind(**d) == NodeKind::Wire)
                .map(|(name, d)| (*d, name[prefix.len()..].to_string()))
                .collect();
            signals.sort();
            let mut args = Vec::with_capacity(signals.len());
            for (_, signal) in &signals {
                let expr = self.mk_ident(&format!("{inst_name}.{signal}"), span);
                args.push(self.mk_named(NodeKind::Argument, format!("{port}.{signal}"), vec![expr], span));
            }
            let count = args.len();
            self.splice(cell, i, args);
            let value = self.ast.mkconst_str(&interface, &Provenance::internal());
            self.ast.set_attribute(cell, format!("{INTERFACE_PORT_ATTR}{port}"), value);
            i += count;
            changed = true;
        }
        Ok(changed)
    }

    fn explode_instance_signals(&mut self, cell: NodeId, template: NodeId) -> ElabResult<()> {
        let span = self.ast.span(cell);
        let inst = self.ast[cell].name.clone();
        let Some(celltype) = cell_type_of(self.ast, cell) else {
            return Err(fatal(E307, "instance without a cell type", span));
        };
        let type_name = self.ast[celltype].name.clone();

        let mut overrides = Vec::new();
        let mut position = 0;
        for paraset in self.ast.children(celltype).to_vec() {
            position += 1;
            let Some(value) = self.ast.child(paraset, 0) else {
                continue;
            };
            self.resolve_expr(value)?;
            self.fold_fully(value, None, false)?;
            let value = self.ast.child(paraset, 0).unwrap_or(value);
            if self.ast[value].is_const() == 0 {
                return Err(error_not_const(&format!("parameter override of interface `{inst}`"), span));
            }
            let key = match self.ast[paraset].name.as_str() {
                "" => format!("${position}"),
                name => name.to_string(),
            };
            overrides.push((key, self.ast[value].as_para_const()));
        }
        let bindings = resolve_bindings(self.ast, template, &overrides, span)?;
        let module_name = derived_name(&type_name, &bindings, &BTreeMap::new());

        let design = self.env.design;
        let signals = match design.module(&module_name) {
            Some(module) => interface_signals(module, |i| design.name(i).to_string()),
            None => {
                log::debug!("interface `{module_name}` of `{inst}` is not emitted yet");
                self.ctx.missing_interfaces.push(module_name.clone());
                self.local_interface_signals(template, &module_name, &bindings)?
            }
        };
        for (signal, width, signed) in signals {
            let wire = self.mk_wire(&format!("{inst}.{signal}"), width, signed, span);
            self.ast[wire].is_reg = false;
            self.ast[wire].is_logic = true;
            self.add_module_item(wire);
        }
        let one = self.mk_int(1, false, 1, span);
        self.ast.set_attribute(cell, "is_interface", one);
        let name = self.ast.mkconst_str(&module_name, &Provenance::internal());
        self.ast.set_attribute(cell, "interface_type", name);
        Ok(())
    }

    /// Simplifies a scratch copy of an interface template to learn the
    /// widths of its signals.
    fn local_interface_signals(
        &mut self,
        template: NodeId,
        name: &str,
        bindings: &[Binding],
    ) -> ElabResult<Vec<(String, u32, bool)>> {
        let copy = self.ast.clone_subtree(template);
        bind_parameters(self.ast, copy, bindings);
        self.ast.fixup_hierarchy_flags(copy, true);
        let mut ctx = ModuleContext::new(copy, name);
        let result = Simplifier::new(&mut *self.ast, &mut ctx, self.env).simplify_module();
        let signals = result.map(|()| {
            self.ast
                .children(copy)
                .iter()
                .map(|&c| &self.ast[c])
                .filter(|n| n.kind == NodeKind::Wire && !n.name.starts_with('$'))
                .map(|n| {
                    let width = if n.range_valid { n.range_width().max(1) as u32 } else { 1 };
                    (n.name.clone(), width, n.is_signed)
                })
                .collect()
        });
        self.ast.delete(copy);
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ast::Builder;
    use vela_common::LogicVec;

    fn bits(value: u64, width: u32) -> ConstValue {
        ConstValue::bits(LogicVec::from_u64(value, width))
    }

    #[test]
    fn name_lists_bound_parameters() {
        let name = derived_name("fifo", &[("DEPTH".to_string(), bits(16, 8))], &BTreeMap::new());
        assert_eq!(name, "$paramod\\fifo\\DEPTH=8'00010000");
    }

    #[test]
    fn unbound_template_keeps_its_name() {
        assert_eq!(derived_name("fifo", &[], &BTreeMap::new()), "fifo");
        assert_eq!(stripped_name("$abstract\\fifo"), "fifo");
    }

    #[test]
    fn long_parameter_text_is_hashed() {
        let bindings = vec![("WIDTH".to_string(), bits(1, 64))];
        let name = derived_name("fifo", &bindings, &BTreeMap::new());
        assert!(name.starts_with("$paramod$"));
        assert!(name.ends_with("\\fifo"));
        assert_eq!(name, derived_name("fifo", &bindings, &BTreeMap::new()));
        let other = vec![("WIDTH".to_string(), bits(2, 64))];
        assert_ne!(name, derived_name("fifo", &other, &BTreeMap::new()));
    }

    #[test]
    fn interfaces_are_appended() {
        let mut ifaces = BTreeMap::new();
        ifaces.insert("bus".to_string(), "simple_bus".to_string());
        let name = derived_name("dev", &[], &ifaces);
        assert_eq!(name, "$paramod\\dev$interfaces$simple_bus");
    }

    #[test]
    fn positional_and_named_overrides() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let one = b.int(1);
        let two = b.int(2);
        let a = b.parameter("A", one);
        let c = b.parameter("B", two);
        let m = b.module("m", vec![a, c]);
        let overrides = vec![("$2".to_string(), bits(5, 4)), ("A".to_string(), bits(3, 4))];
        let resolved = resolve_bindings(&ast, m, &overrides, Span::DUMMY).unwrap();
        let names: Vec<&str> = resolved.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["A", "B"]);

        let unknown = vec![("C".to_string(), bits(0, 1))];
        let err = resolve_bindings(&ast, m, &unknown, Span::DUMMY).unwrap_err();
        assert_eq!(err.diagnostic().map(|d| d.code), Some(E308));
    }

    #[test]
    fn binding_replaces_parameter_value() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let one = b.int(1);
        let p = b.parameter("W", one);
        let m = b.module("m", vec![p]);
        bind_parameters(&mut ast, m, &[("W".to_string(), bits(9, 8))]);
        let value = ast.child(p, 0).unwrap();
        assert_eq!(ast[value].as_int(false), 9);
    }
}
