//! End-to-end elaboration of designs built with the tree builder.

use rstest::rstest;
use vela_ast::{Ast, Builder, NodeId, NodeKind};
use vela_common::LogicVec;
use vela_config::ElabOptions;
use vela_diagnostics::{Diagnostic, DiagnosticSink};
use vela_elaborate::elaborate;
use vela_elaborate::errors::{E308, E310, W300};
use vela_netlist::{Design, SigSpec};
use vela_source::SourceDb;

fn run(ast: &mut Ast, root: NodeId, options: &ElabOptions) -> (Design, Vec<Diagnostic>) {
    let sources = SourceDb::new();
    let sink = DiagnosticSink::new();
    let design = elaborate(ast, root, options, &sources, &sink).unwrap();
    (design, sink.take_all())
}

fn run_default(ast: &mut Ast, root: NodeId) -> (Design, Vec<Diagnostic>) {
    run(ast, root, &ElabOptions::default())
}

fn with_top(top: &str) -> ElabOptions {
    ElabOptions {
        top: Some(top.to_string()),
        ..ElabOptions::default()
    }
}

#[rstest]
#[case(5, 2, 7)]
#[case(6, 3, 1)]
fn sized_addition_wraps_to_its_width(#[case] a: u64, #[case] b: u64, #[case] expected: u64) {
    let mut ast = Ast::new();
    let mut bld = Builder::new(&mut ast);
    let y = bld.output("y", 3);
    let lhs = bld.ident("y");
    let x = bld.sized(3, a);
    let z = bld.sized(3, b);
    let sum = bld.binop(NodeKind::Add, x, z);
    let assign = bld.assign(lhs, sum);
    let m = bld.module("m", vec![y, assign]);
    let root = bld.design(vec![m]);
    let (design, diags) = run_default(&mut ast, root);

    assert!(diags.is_empty());
    let module = design.module("m").unwrap();
    assert_eq!(module.connections.len(), 1);
    let (_, rhs) = &module.connections[0];
    assert_eq!(*rhs, SigSpec::constant(&LogicVec::from_u64(expected, 3)));
    assert_eq!(module.cells.len(), 0);
}

#[test]
fn generate_loop_labels_every_iteration() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let gv = b.genvar("i");
    let i0 = b.ident("i");
    let zero = b.int(0);
    let init = b.blocking(i0, zero);
    let i1 = b.ident("i");
    let three = b.int(3);
    let cond = b.binop(NodeKind::Lt, i1, three);
    let i2 = b.ident("i");
    let i3 = b.ident("i");
    let one = b.int(1);
    let inc = b.binop(NodeKind::Add, i3, one);
    let step = b.blocking(i2, inc);
    let q = b.wire("q", 4);
    let lhs = b.ident("q");
    let rhs = b.ident("i");
    let a = b.assign(lhs, rhs);
    let body = b.genblock(Some("r"), vec![q, a]);
    let gen = b.genfor(init, cond, step, body);
    let m = b.module("m", vec![gv, gen]);
    let root = b.design(vec![m]);
    let (design, diags) = run_default(&mut ast, root);

    assert!(diags.is_empty());
    for k in 0..3 {
        let (_, wire) = design.find_wire("m", &format!("r[{k}].q")).unwrap();
        assert_eq!(wire.width, 4);
    }
    assert!(design.find_wire("m", "r[3].q").is_none());
    assert_eq!(design.module("m").unwrap().connections.len(), 3);
}

/// A module writing `mem[2] <= d` from an `always` block with `events` and
/// reading `mem[0]` continuously.
fn memory_writer(b: &mut Builder<'_>, events: Vec<NodeId>) -> NodeId {
    let mem = b.memory("mem", 4, 4);
    let clk = b.input("clk", 1);
    let d = b.input("d", 4);
    let q = b.output("q", 4);
    let two = b.int(2);
    let target = b.index("mem", two);
    let dv = b.ident("d");
    let write = b.nonblocking(target, dv);
    let body = b.block(vec![write]);
    let proc = b.always(events, body);
    let qi = b.ident("q");
    let zero = b.int(0);
    let read = b.index("mem", zero);
    let out = b.assign(qi, read);
    b.module("m", vec![mem, clk, d, q, proc, out])
}

#[test]
fn clocked_constant_address_memory_becomes_registers() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let clk = b.posedge("clk");
    let m = memory_writer(&mut b, vec![clk]);
    let root = b.design(vec![m]);
    let (design, _) = run_default(&mut ast, root);

    let module = design.module("m").unwrap();
    assert!(module.memories.is_empty());
    for k in 0..4 {
        assert!(design.find_wire("m", &format!("mem[{k}]")).is_some());
    }
}

#[test]
fn combinationally_written_memory_is_kept() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let m = memory_writer(&mut b, Vec::new());
    let root = b.design(vec![m]);
    let (design, _) = run_default(&mut ast, root);

    let module = design.module("m").unwrap();
    assert_eq!(module.memories.len(), 1);
    assert!(design.find_wire("m", "mem[2]").is_none());
}

/// `module leaf #(parameter WIDTH = 4); wire [WIDTH-1:0] w; endmodule`
/// plus two unnamed generate blocks.
fn parametric_leaf(b: &mut Builder<'_>) -> NodeId {
    let four = b.int(4);
    let p = b.parameter("WIDTH", four);
    let wv = b.ident("WIDTH");
    let one = b.int(1);
    let msb = b.binop(NodeKind::Sub, wv, one);
    let lsb = b.int(0);
    let range = b.range_expr(msb, lsb);
    let w = b.wire_ranged("w", range);
    let c1 = b.int(1);
    let a1 = b.wire("a", 1);
    let g1 = b.genif(c1, a1, None);
    let c2 = b.int(1);
    let a2 = b.wire("a", 1);
    let g2 = b.genif(c2, a2, None);
    b.module("leaf", vec![p, w, g1, g2])
}

fn instance(b: &mut Builder<'_>, name: &str, width: i64) -> NodeId {
    let value = b.int(width);
    b.cell(name, "leaf", vec![("WIDTH", value)], vec![])
}

#[test]
fn equal_bindings_share_one_derived_module() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let leaf = parametric_leaf(&mut b);
    let u0 = instance(&mut b, "u0", 8);
    let u1 = instance(&mut b, "u1", 8);
    let u2 = instance(&mut b, "u2", 16);
    let top = b.module("top", vec![u0, u1, u2]);
    let root = b.design(vec![leaf, top]);
    let (design, diags) = run(&mut ast, root, &with_top("top"));

    assert!(diags.is_empty());
    let top = design.module("top").unwrap();
    let type_of = |name: &str| {
        let cell = &top.cells[top.find_cell(design.ident(name)).unwrap()];
        assert!(cell.parameters.is_empty());
        design.name(cell.cell_type).to_string()
    };
    let (t0, t1, t2) = (type_of("u0"), type_of("u1"), type_of("u2"));
    assert_eq!(t0, t1);
    assert_ne!(t0, t2);
    assert!(t0.starts_with("$paramod\\leaf\\WIDTH="));
    assert_eq!(design.module_count(), 4);
    assert_eq!(design.find_wire(&t0, "w").unwrap().1.width, 8);
    assert_eq!(design.find_wire(&t2, "w").unwrap().1.width, 16);
    assert!(design.module("top").unwrap().has_attribute("top"));
}

#[test]
fn generate_labels_repeat_in_every_derivation() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let leaf = parametric_leaf(&mut b);
    let u0 = instance(&mut b, "u0", 2);
    let u1 = instance(&mut b, "u1", 3);
    let top = b.module("top", vec![u0, u1]);
    let root = b.design(vec![leaf, top]);
    let (design, _) = run(&mut ast, root, &with_top("top"));

    for name in design.module_names().iter().filter(|n| n.contains("leaf")) {
        assert!(design.find_wire(name, "genblk1.a").is_some(), "{name}");
        assert!(design.find_wire(name, "genblk2.a").is_some(), "{name}");
    }
}

#[test]
fn unknown_parameter_override_is_reported() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let leaf = parametric_leaf(&mut b);
    let value = b.int(3);
    let cell = b.cell("u0", "leaf", vec![("DEPTH", value)], vec![]);
    let top = b.module("top", vec![cell]);
    let root = b.design(vec![leaf, top]);
    let (_, diags) = run_default(&mut ast, root);

    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, E308);
}

#[test]
fn elaborating_twice_gives_the_same_modules() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let leaf = parametric_leaf(&mut b);
    let u0 = instance(&mut b, "u0", 8);
    let top = b.module("top", vec![u0]);
    let root = b.design(vec![leaf, top]);
    let (first, _) = run(&mut ast, root, &with_top("top"));
    let (second, _) = run(&mut ast, root, &with_top("top"));
    assert_eq!(first.module_names(), second.module_names());
}

#[test]
fn constant_function_sizes_a_wire() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    // function [31:0] twice(input [31:0] n); twice = n + n; endfunction
    let n = b.input("n", 32);
    let res = b.ident("twice");
    let n1 = b.ident("n");
    let n2 = b.ident("n");
    let sum = b.binop(NodeKind::Add, n1, n2);
    let stmt = b.blocking(res, sum);
    let body = b.block(vec![stmt]);
    let f = b.function("twice", 32, vec![n, body]);
    let three = b.int(3);
    let call = b.fcall("twice", vec![three]);
    let p = b.localparam("P", call);
    let pv = b.ident("P");
    let one = b.int(1);
    let msb = b.binop(NodeKind::Sub, pv, one);
    let lsb = b.int(0);
    let range = b.range_expr(msb, lsb);
    let w = b.wire_ranged("w", range);
    let m = b.module("m", vec![f, p, w]);
    let root = b.design(vec![m]);
    let (design, diags) = run_default(&mut ast, root);

    assert!(diags.is_empty());
    assert_eq!(design.find_wire("m", "w").unwrap().1.width, 6);
}

#[test]
fn incomplete_combinational_assignment_warns() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let c = b.input("c", 1);
    let d = b.input("d", 1);
    let q = b.output_reg("q", 1);
    let cond = b.ident("c");
    let lhs = b.ident("q");
    let di = b.ident("d");
    let then_stmt = b.blocking(lhs, di);
    let test = b.if_else(cond, then_stmt, None);
    let body = b.block(vec![test]);
    let proc = b.always(Vec::new(), body);
    let m = b.module("latch", vec![c, d, q, proc]);
    let root = b.design(vec![m]);
    let (design, diags) = run_default(&mut ast, root);

    assert!(design.has("latch"));
    assert_eq!(diags.iter().filter(|d| d.code == W300).count(), 1);
}

#[test]
fn mutual_instantiation_is_rejected() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let ub = b.cell("ub", "b", vec![], vec![]);
    let wa = b.wire("x", 1);
    let a = b.module("a", vec![wa, ub]);
    let ua = b.cell("ua", "a", vec![], vec![]);
    let wb = b.wire("x", 1);
    let bm = b.module("b", vec![wb, ua]);
    let root = b.design(vec![a, bm]);
    let (_, diags) = run_default(&mut ast, root);

    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, E310);
}

#[test]
fn interface_port_is_expanded_per_signal() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let data = b.wire("data", 8);
    let valid = b.wire("valid", 1);
    let dev_port = b.modport("dev", vec![("data", true), ("valid", true)]);
    let bus = b.interface("bus", vec![data, valid, dev_port]);

    let port = b.interface_port("b", "bus.dev");
    let y = b.output("y", 8);
    let lhs = b.ident("y");
    let rhs = b.ident("b.data");
    let assign = b.assign(lhs, rhs);
    let dev = b.module("dev", vec![port, y, assign]);

    let out = b.output("y", 8);
    let inst = b.cell("u_bus", "bus", vec![], vec![]);
    let bus_ref = b.ident("u_bus");
    let y_ref = b.ident("y");
    let user = b.cell("u_dev", "dev", vec![], vec![("b", bus_ref), ("y", y_ref)]);
    let top = b.module("top", vec![out, inst, user]);
    let root = b.design(vec![bus, dev, top]);
    let (design, diags) = run_default(&mut ast, root);

    assert!(diags.is_empty(), "{diags:?}");
    let derived = "$paramod\\dev$interfaces$bus";
    assert!(design.has(derived));
    assert!(!design.has("dev"));
    let (_, data) = design.find_wire(derived, "b.data").unwrap();
    assert!(data.port_input && !data.port_output);
    assert_eq!(data.width, 8);
    assert!(design.find_wire("top", "u_bus.data").is_some());
    assert!(design.module("bus").unwrap().has_attribute("is_interface"));
    assert!(design.module("top").unwrap().has_attribute("top"));
}

#[test]
fn bind_adds_the_cell_to_its_target() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let a = b.input("a", 1);
    let y = b.output("y", 1);
    let lhs = b.ident("y");
    let rhs = b.ident("a");
    let assign = b.assign(lhs, rhs);
    let top = b.module("top", vec![a, y, assign]);
    let x = b.input("x", 1);
    let monitor = b.module("monitor", vec![x]);
    let arg = b.ident("a");
    let cell = b.cell("u_mon", "monitor", vec![], vec![("x", arg)]);
    let bind = b.bind("top", cell);
    let root = b.design(vec![top, monitor, bind]);
    let (design, diags) = run(&mut ast, root, &with_top("top"));

    assert!(diags.is_empty());
    let top = design.module("top").unwrap();
    let cell = &top.cells[top.find_cell(design.ident("u_mon")).unwrap()];
    assert_eq!(design.name(cell.cell_type), "monitor");
    assert_eq!(cell.port("x").map(|s| s.width()), Some(1));
}

#[test]
fn options_from_toml_suppress_latch_warnings() {
    let config = vela_config::load_config_from_str("[elaborate]\nnolatches = true\ntop = \"latch\"\n").unwrap();
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let c = b.input("c", 1);
    let d = b.input("d", 1);
    let q = b.output_reg("q", 1);
    let cond = b.ident("c");
    let lhs = b.ident("q");
    let di = b.ident("d");
    let then_stmt = b.blocking(lhs, di);
    let test = b.if_else(cond, then_stmt, None);
    let body = b.block(vec![test]);
    let proc = b.always(Vec::new(), body);
    let m = b.module("latch", vec![c, d, q, proc]);
    let root = b.design(vec![m]);
    let (design, diags) = run(&mut ast, root, &config.elaborate);

    assert!(diags.is_empty());
    assert!(design.module("latch").unwrap().has_attribute("top"));
}

#[test]
fn diagnostics_serialize_with_their_message() {
    let mut ast = Ast::new();
    let mut b = Builder::new(&mut ast);
    let cell = b.cell("u0", "nowhere", vec![], vec![]);
    let m = b.module("top", vec![cell]);
    let root = b.design(vec![m]);
    let (_, diags) = run_default(&mut ast, root);

    assert_eq!(diags.len(), 1);
    let json = serde_json::to_value(&diags[0]).unwrap();
    let message = json["message"].as_str().unwrap();
    assert!(message.contains("`nowhere`"));
}
