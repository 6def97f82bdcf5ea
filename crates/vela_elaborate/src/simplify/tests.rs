//! Shared setup for the simplifier's unit tests.

use std::collections::BTreeMap;

use vela_ast::{Ast, NodeId};
use vela_config::ElabOptions;
use vela_diagnostics::DiagnosticSink;
use vela_netlist::Design;
use vela_source::SourceDb;

use super::Simplifier;
use crate::context::{ElabEnv, ModuleContext, Scope};
use crate::errors::ElabResult;

/// Everything a [`Simplifier`] borrows, owned by the test.
pub(crate) struct Fixture {
    pub options: ElabOptions,
    pub sources: SourceDb,
    pub sink: DiagnosticSink,
    pub design: Design,
    pub globals: Scope,
    pub templates: BTreeMap<String, NodeId>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self {
            options: ElabOptions::default(),
            sources: SourceDb::new(),
            sink: DiagnosticSink::new(),
            design: Design::new(),
            globals: Scope::new(),
            templates: BTreeMap::new(),
        }
    }

    pub(crate) fn env(&self) -> ElabEnv<'_> {
        ElabEnv {
            options: &self.options,
            sources: &self.sources,
            sink: &self.sink,
            design: &self.design,
            globals: &self.globals,
            templates: &self.templates,
        }
    }
}

/// Runs the whole simplification pipeline on `module`.
pub(crate) fn simplified(ast: &mut Ast, module: NodeId, fx: &Fixture) -> ElabResult<ModuleContext> {
    ast.fixup_hierarchy_flags(module, true);
    let name = ast[module].name.clone();
    let mut ctx = ModuleContext::new(module, name);
    Simplifier::new(ast, &mut ctx, fx.env()).simplify_module()?;
    Ok(ctx)
}

#[test]
fn simplifying_twice_changes_nothing() {
    use vela_ast::{Builder, NodeKind};

    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let four = b.int(4);
    let w = b.parameter("W", four);
    let y = b.wire("y", 8);
    let a = b.input("a", 8);
    let lhs = b.ident("y");
    let ai = b.ident("a");
    let wi = b.ident("W");
    let rhs = b.binop(NodeKind::ShiftLeft, ai, wi);
    let assign = b.assign(lhs, rhs);
    let m = b.module("m", vec![w, y, a, assign]);
    let fx = Fixture::new();
    let mut ctx = simplified(&mut ast, m, &fx).unwrap();
    let before = ast.dump_ast(m);
    let changed = Simplifier::new(&mut ast, &mut ctx, fx.env())
        .simplify(m, true, 2, None, false)
        .unwrap();
    assert!(!changed);
    assert_eq!(ast.dump_ast(m), before);
}

