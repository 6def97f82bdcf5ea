//! Elaboration state scoped to one module.
//!
//! A [`ModuleContext`] is created for every module that is simplified and
//! emitted, including each parametric derivation, so sibling derivations never
//! observe each other's scope tables or counters. [`ElabEnv`] bundles the
//! read-only inputs shared by every module of one elaboration run.

use std::collections::{BTreeMap, HashMap};

use vela_ast::{Ast, NodeId, NodeKind};
use vela_common::LogicVec;
use vela_config::ElabOptions;
use vela_diagnostics::DiagnosticSink;
use vela_netlist::Design;
use vela_source::SourceDb;

/// Flat name table of a module. Generate and named-block members are stored
/// under their prefixed names (`label.name`, `label[i].name`).
pub type Scope = HashMap<String, NodeId>;

/// Read-only inputs shared by every module of an elaboration run.
#[derive(Clone, Copy)]
pub struct ElabEnv<'a> {
    /// Elaboration options.
    pub options: &'a ElabOptions,
    /// Source files, for diagnostics and `$readmem` paths.
    pub sources: &'a SourceDb,
    /// Where warnings go.
    pub sink: &'a DiagnosticSink,
    /// The netlist emitted so far; interface instances read their signals
    /// from it.
    pub design: &'a Design,
    /// Package members keyed `pkg::name`.
    pub globals: &'a Scope,
    /// Module and interface templates by name.
    pub templates: &'a BTreeMap<String, NodeId>,
}

/// Mutable state of the module being elaborated.
#[derive(Debug)]
pub struct ModuleContext {
    /// The working copy of the module.
    pub module: NodeId,
    /// Name the module is emitted under.
    pub name: String,
    /// Declarations visible in the module.
    pub scope: Scope,
    /// Interface modules an interface instance of this module needs but
    /// that have not been emitted yet.
    pub missing_interfaces: Vec<String>,
    /// Set once memory promotion has run.
    pub mem2reg_done: bool,
    /// Set once remaining memory accesses became `MemRd`/`MemWr`.
    pub memories_lowered: bool,
    /// Constant function calls being evaluated, innermost last.
    pub call_stack: Vec<(String, Vec<LogicVec>)>,
    /// Wires of a packed struct or union type, mapped to the type's layout.
    pub struct_wires: HashMap<String, NodeId>,
    autoidx: u32,
}

impl ModuleContext {
    /// A fresh context for `module`, emitted as `name`.
    pub fn new(module: NodeId, name: impl Into<String>) -> Self {
        Self {
            module,
            name: name.into(),
            scope: Scope::new(),
            missing_interfaces: Vec::new(),
            mem2reg_done: false,
            memories_lowered: false,
            call_stack: Vec::new(),
            struct_wires: HashMap::new(),
            autoidx: 0,
        }
    }

    /// Next value of the module-local counter used for temporary names.
    pub fn next_id(&mut self) -> u32 {
        self.autoidx += 1;
        self.autoidx
    }

    /// The declaration named `name`.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.scope.get(name).copied()
    }

    /// Makes `node` visible as `name`, replacing any earlier entry.
    pub fn declare(&mut self, name: impl Into<String>, node: NodeId) {
        self.scope.insert(name.into(), node);
    }
}

/// True for kinds that introduce a name into the enclosing scope.
pub fn is_declaration(kind: NodeKind) -> bool {
    use NodeKind::*;
    matches!(
        kind,
        Wire | Memory
            | Autowire
            | Parameter
            | Localparam
            | Function
            | Task
            | Cell
            | Typedef
            | EnumItem
            | Genvar
            | Struct
            | Union
    )
}

/// Registers every named declaration among the children of `parent`,
/// descending into enums, including enums wrapped in a typedef, for their
/// items.
pub fn declare_children(ast: &Ast, parent: NodeId, scope: &mut Scope) {
    for &child in ast.children(parent) {
        let node = &ast[child];
        if node.kind == NodeKind::Enum {
            declare_enum_items(ast, child, scope);
            continue;
        }
        if is_declaration(node.kind) && !node.name.is_empty() {
            scope.insert(node.name.clone(), child);
        }
        if node.kind == NodeKind::Typedef {
            if let Some(&base) = node.children.first() {
                if ast[base].kind == NodeKind::Enum {
                    declare_enum_items(ast, base, scope);
                }
            }
        }
    }
}

fn declare_enum_items(ast: &Ast, enumeration: NodeId, scope: &mut Scope) {
    for &item in ast.children(enumeration) {
        scope.insert(ast[item].name.clone(), item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ast::Builder;

    #[test]
    fn counter_is_monotonic() {
        let mut ctx = ModuleContext::new(NodeId::from_raw(0), "m");
        assert_eq!(ctx.next_id(), 1);
        assert_eq!(ctx.next_id(), 2);
    }

    #[test]
    fn declarations_are_registered() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let w = b.wire("w", 4);
        let one = b.int(1);
        let e = b.enumeration(vec![("IDLE", None), ("RUN", Some(one))]);
        let lhs = b.ident("w");
        let rhs = b.sized(4, 3);
        let a = b.assign(lhs, rhs);
        let m = b.module("m", vec![w, e, a]);
        let mut scope = Scope::new();
        declare_children(&ast, m, &mut scope);
        assert_eq!(scope.get("w"), Some(&w));
        assert!(scope.contains_key("IDLE"));
        assert!(scope.contains_key("RUN"));
        assert_eq!(scope.len(), 3);
    }

    #[test]
    fn typedef_enum_items_are_registered() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let e = b.enumeration(vec![("A", None), ("B", None)]);
        let t = b.typedef("state_t", e);
        let m = b.module("m", vec![t]);
        let mut scope = Scope::new();
        declare_children(&ast, m, &mut scope);
        assert_eq!(scope.get("state_t"), Some(&t));
        assert!(scope.contains_key("A"));
        assert!(scope.contains_key("B"));
    }
}
