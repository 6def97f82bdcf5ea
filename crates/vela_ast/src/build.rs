//! A small construction DSL for trees.
//!
//! Front ends and tests build trees through [`Builder`], which stamps every
//! node with its current [`Provenance`] and lays children out the way the
//! elaborator expects them.

use crate::kind::NodeKind;
use crate::node::NodeId;
use crate::tree::Ast;
use vela_common::LogicVec;
use vela_source::Provenance;

/// Builds nodes into an [`Ast`].
pub struct Builder<'a> {
    ast: &'a mut Ast,
    prov: Provenance,
}

impl<'a> Builder<'a> {
    /// A builder stamping nodes with internal provenance.
    pub fn new(ast: &'a mut Ast) -> Self {
        Self::with_provenance(ast, Provenance::internal())
    }

    /// A builder stamping nodes with `prov`.
    pub fn with_provenance(ast: &'a mut Ast, prov: Provenance) -> Self {
        Self { ast, prov }
    }

    /// Moves the provenance to `line`.
    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.prov.set_line(line);
        self
    }

    /// The underlying store.
    pub fn ast(&mut self) -> &mut Ast {
        self.ast
    }

    /// A node of `kind` with `children`.
    pub fn node(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        self.ast.new_node(kind, &self.prov, children)
    }

    /// A named node of `kind` with `children`.
    pub fn named(&mut self, kind: NodeKind, name: &str, children: Vec<NodeId>) -> NodeId {
        self.ast.new_named(kind, name, &self.prov, children)
    }

    /// Marks `id` signed.
    pub fn signed(&mut self, id: NodeId) -> NodeId {
        self.ast[id].is_signed = true;
        id
    }

    /// Attaches attribute `key = value` to `id`.
    pub fn attr(&mut self, id: NodeId, key: &str, value: NodeId) -> NodeId {
        self.ast.set_attribute(id, key, value);
        id
    }

    /// Attaches attribute `key = 1` to `id`.
    pub fn flag_attr(&mut self, id: NodeId, key: &str) -> NodeId {
        let one = self.ast.mkconst_int(1, false, 1, &self.prov);
        self.attr(id, key, one)
    }

    // Literals

    /// An unsized decimal literal: 32-bit signed.
    pub fn int(&mut self, value: i64) -> NodeId {
        self.ast.mkconst_int(value, true, 32, &self.prov)
    }

    /// A sized unsigned literal `width'dvalue`.
    pub fn sized(&mut self, width: u32, value: u64) -> NodeId {
        self.ast
            .mkconst_bits(LogicVec::from_u64(value, width), false, &self.prov)
    }

    /// A sized signed literal `width'sdvalue`.
    pub fn sized_signed(&mut self, width: u32, value: i64) -> NodeId {
        self.ast
            .mkconst_bits(LogicVec::from_i64(value, width), true, &self.prov)
    }

    /// A binary literal written most significant digit first; `x`, `z` and
    /// `?` are accepted.
    pub fn binary(&mut self, digits: &str) -> NodeId {
        let bits = LogicVec::from_binary_str(digits).unwrap_or_else(|| LogicVec::all_x(1));
        self.ast.mkconst_bits(bits, false, &self.prov)
    }

    /// A string literal.
    pub fn string(&mut self, value: &str) -> NodeId {
        self.ast.mkconst_str(value, &self.prov)
    }

    /// A real literal.
    pub fn real(&mut self, value: f64) -> NodeId {
        self.ast.mkconst_real(value, &self.prov)
    }

    // Expressions

    /// A reference to `name`.
    pub fn ident(&mut self, name: &str) -> NodeId {
        self.named(NodeKind::Identifier, name, vec![])
    }

    /// `name[index]`.
    pub fn index(&mut self, name: &str, index: NodeId) -> NodeId {
        let range = self.node(NodeKind::Range, vec![index]);
        self.named(NodeKind::Identifier, name, vec![range])
    }

    /// `name[msb:lsb]`.
    pub fn part(&mut self, name: &str, msb: NodeId, lsb: NodeId) -> NodeId {
        let range = self.node(NodeKind::Range, vec![msb, lsb]);
        self.named(NodeKind::Identifier, name, vec![range])
    }

    /// `name[word][bit]` on a memory.
    pub fn word_bit(&mut self, name: &str, word: NodeId, bit: NodeId) -> NodeId {
        let word = self.node(NodeKind::Range, vec![word]);
        let bit = self.node(NodeKind::Range, vec![bit]);
        self.named(NodeKind::Identifier, name, vec![word, bit])
    }

    /// A unary operator.
    pub fn unop(&mut self, kind: NodeKind, a: NodeId) -> NodeId {
        self.node(kind, vec![a])
    }

    /// A binary operator.
    pub fn binop(&mut self, kind: NodeKind, a: NodeId, b: NodeId) -> NodeId {
        self.node(kind, vec![a, b])
    }

    /// `cond ? a : b`.
    pub fn ternary(&mut self, cond: NodeId, a: NodeId, b: NodeId) -> NodeId {
        self.node(NodeKind::Ternary, vec![cond, a, b])
    }

    /// `{parts}`, most significant part first.
    pub fn concat(&mut self, parts: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Concat, parts)
    }

    /// `{count{parts}}`.
    pub fn replicate(&mut self, count: NodeId, parts: Vec<NodeId>) -> NodeId {
        let inner = self.concat(parts);
        self.node(NodeKind::Replicate, vec![count, inner])
    }

    /// A call of function `name`; system functions keep their `$`.
    pub fn fcall(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        self.named(NodeKind::FCall, name, args)
    }

    /// A task call statement.
    pub fn tcall(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        self.named(NodeKind::TCall, name, args)
    }

    // Declarations

    /// `[msb:lsb]` with literal bounds.
    pub fn range(&mut self, msb: i64, lsb: i64) -> NodeId {
        let msb = self.int(msb);
        let lsb = self.int(lsb);
        self.node(NodeKind::Range, vec![msb, lsb])
    }

    /// `[msb:lsb]` with expression bounds.
    pub fn range_expr(&mut self, msb: NodeId, lsb: NodeId) -> NodeId {
        self.node(NodeKind::Range, vec![msb, lsb])
    }

    /// A net of `width` bits, `[width-1:0]`.
    pub fn wire(&mut self, name: &str, width: u32) -> NodeId {
        let children = if width > 1 {
            vec![self.range(i64::from(width) - 1, 0)]
        } else {
            vec![]
        };
        self.named(NodeKind::Wire, name, children)
    }

    /// A net with a range given by expressions.
    pub fn wire_ranged(&mut self, name: &str, range: NodeId) -> NodeId {
        self.named(NodeKind::Wire, name, vec![range])
    }

    /// A variable of `width` bits.
    pub fn reg(&mut self, name: &str, width: u32) -> NodeId {
        let id = self.wire(name, width);
        self.ast[id].is_reg = true;
        id
    }

    /// An input port.
    pub fn input(&mut self, name: &str, width: u32) -> NodeId {
        let id = self.wire(name, width);
        self.ast[id].is_input = true;
        id
    }

    /// An output port.
    pub fn output(&mut self, name: &str, width: u32) -> NodeId {
        let id = self.wire(name, width);
        self.ast[id].is_output = true;
        id
    }

    /// An output variable.
    pub fn output_reg(&mut self, name: &str, width: u32) -> NodeId {
        let id = self.output(name, width);
        self.ast[id].is_reg = true;
        id
    }

    /// `reg [width-1:0] name [0:depth-1]`.
    pub fn memory(&mut self, name: &str, width: u32, depth: u32) -> NodeId {
        let word = self.range(i64::from(width) - 1, 0);
        let addr = self.range(0, i64::from(depth) - 1);
        let id = self.named(NodeKind::Memory, name, vec![word, addr]);
        self.ast[id].is_reg = true;
        id
    }

    /// `parameter name = value`.
    pub fn parameter(&mut self, name: &str, value: NodeId) -> NodeId {
        self.named(NodeKind::Parameter, name, vec![value])
    }

    /// `localparam name = value`.
    pub fn localparam(&mut self, name: &str, value: NodeId) -> NodeId {
        self.named(NodeKind::Localparam, name, vec![value])
    }

    /// `defparam path = value`, where `path` is `instance.parameter`.
    pub fn defparam(&mut self, path: &str, value: NodeId) -> NodeId {
        self.named(NodeKind::Defparam, path, vec![value])
    }

    /// `genvar name`.
    pub fn genvar(&mut self, name: &str) -> NodeId {
        self.named(NodeKind::Genvar, name, vec![])
    }

    /// `enum { items }`; an item without a value follows its predecessor.
    pub fn enumeration(&mut self, items: Vec<(&str, Option<NodeId>)>) -> NodeId {
        let items: Vec<NodeId> = items
            .into_iter()
            .map(|(name, value)| self.named(NodeKind::EnumItem, name, value.into_iter().collect()))
            .collect();
        self.node(NodeKind::Enum, items)
    }

    /// `struct packed { items }`; members are `(name, width)`, first member
    /// most significant.
    pub fn packed_struct(&mut self, items: Vec<(&str, u32)>) -> NodeId {
        let items: Vec<NodeId> = items
            .into_iter()
            .map(|(name, width)| {
                let range = self.range(i64::from(width) - 1, 0);
                self.named(NodeKind::StructItem, name, vec![range])
            })
            .collect();
        self.node(NodeKind::Struct, items)
    }

    /// `typedef base name`.
    pub fn typedef(&mut self, name: &str, base: NodeId) -> NodeId {
        self.named(NodeKind::Typedef, name, vec![base])
    }

    /// A net declared with the user type `type_name`.
    pub fn typed_wire(&mut self, name: &str, type_name: &str) -> NodeId {
        let ty = self.named(NodeKind::WireType, type_name, vec![]);
        let id = self.named(NodeKind::Wire, name, vec![ty]);
        self.ast[id].is_custom_type = true;
        id
    }

    /// `label[index].name`, a reference into a generate block.
    pub fn prefix(&mut self, label: &str, index: NodeId, name: &str) -> NodeId {
        let id = self.ident(name);
        self.named(NodeKind::Prefix, label, vec![index, id])
    }

    // Statements

    /// `assign lhs = rhs`.
    pub fn assign(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.node(NodeKind::Assign, vec![lhs, rhs])
    }

    /// `lhs = rhs`.
    pub fn blocking(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.node(NodeKind::AssignEq, vec![lhs, rhs])
    }

    /// `lhs <= rhs`.
    pub fn nonblocking(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.node(NodeKind::AssignLe, vec![lhs, rhs])
    }

    /// `begin stmts end`.
    pub fn block(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Block, stmts)
    }

    /// `begin : name stmts end`.
    pub fn named_block(&mut self, name: &str, stmts: Vec<NodeId>) -> NodeId {
        self.named(NodeKind::Block, name, stmts)
    }

    fn as_block(&mut self, stmt: NodeId) -> NodeId {
        if self.ast.kind(stmt) == NodeKind::Block {
            stmt
        } else {
            self.block(vec![stmt])
        }
    }

    /// `if (cond) then_stmt else else_stmt`, as a case over the truth value.
    pub fn if_else(&mut self, cond: NodeId, then_stmt: NodeId, else_stmt: Option<NodeId>) -> NodeId {
        let test = self.unop(NodeKind::ReduceBool, cond);
        let one = self.sized(1, 1);
        let then_stmt = self.as_block(then_stmt);
        let mut items = vec![self.node(NodeKind::Cond, vec![one, then_stmt])];
        if let Some(else_stmt) = else_stmt {
            items.push(self.default_item(else_stmt));
        }
        self.case(test, items)
    }

    /// `case (expr) items endcase`.
    pub fn case(&mut self, expr: NodeId, items: Vec<NodeId>) -> NodeId {
        let mut children = vec![expr];
        children.extend(items);
        self.node(NodeKind::Case, children)
    }

    /// `values: body`.
    pub fn case_item(&mut self, values: Vec<NodeId>, body: NodeId) -> NodeId {
        let body = self.as_block(body);
        let mut children = values;
        children.push(body);
        self.node(NodeKind::Cond, children)
    }

    /// `default: body`.
    pub fn default_item(&mut self, body: NodeId) -> NodeId {
        let body = self.as_block(body);
        let default = self.node(NodeKind::Default, vec![]);
        self.node(NodeKind::Cond, vec![default, body])
    }

    /// `for (init; cond; step) body`.
    pub fn for_loop(&mut self, init: NodeId, cond: NodeId, step: NodeId, body: NodeId) -> NodeId {
        let body = self.as_block(body);
        self.node(NodeKind::For, vec![init, cond, step, body])
    }

    /// `while (cond) body`.
    pub fn while_loop(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        let body = self.as_block(body);
        self.node(NodeKind::While, vec![cond, body])
    }

    /// `repeat (count) body`.
    pub fn repeat(&mut self, count: NodeId, body: NodeId) -> NodeId {
        let body = self.as_block(body);
        self.node(NodeKind::Repeat, vec![count, body])
    }

    /// `posedge name`.
    pub fn posedge(&mut self, name: &str) -> NodeId {
        let id = self.ident(name);
        self.node(NodeKind::Posedge, vec![id])
    }

    /// `negedge name`.
    pub fn negedge(&mut self, name: &str) -> NodeId {
        let id = self.ident(name);
        self.node(NodeKind::Negedge, vec![id])
    }

    /// `always @(events) body`; no events means `@*`.
    pub fn always(&mut self, events: Vec<NodeId>, body: NodeId) -> NodeId {
        let body = self.as_block(body);
        let mut children = events;
        children.push(body);
        self.node(NodeKind::Always, children)
    }

    /// `initial body`.
    pub fn initial(&mut self, body: NodeId) -> NodeId {
        let body = self.as_block(body);
        self.node(NodeKind::Initial, vec![body])
    }

    /// An immediate or concurrent property of `kind` over `expr`.
    pub fn property(&mut self, kind: NodeKind, expr: NodeId) -> NodeId {
        self.node(kind, vec![expr])
    }

    // Generate constructs

    /// A generate block, labeled or not.
    pub fn genblock(&mut self, label: Option<&str>, items: Vec<NodeId>) -> NodeId {
        self.named(NodeKind::GenBlock, label.unwrap_or(""), items)
    }

    fn as_genblock(&mut self, item: NodeId) -> NodeId {
        if self.ast.kind(item) == NodeKind::GenBlock {
            item
        } else {
            self.genblock(None, vec![item])
        }
    }

    /// `for (init; cond; step) body` at module level.
    pub fn genfor(&mut self, init: NodeId, cond: NodeId, step: NodeId, body: NodeId) -> NodeId {
        let body = self.as_genblock(body);
        self.node(NodeKind::GenFor, vec![init, cond, step, body])
    }

    /// `if (cond) then_item else else_item` at module level.
    pub fn genif(&mut self, cond: NodeId, then_item: NodeId, else_item: Option<NodeId>) -> NodeId {
        let then_item = self.as_genblock(then_item);
        let mut children = vec![cond, then_item];
        if let Some(else_item) = else_item {
            let else_item = self.as_genblock(else_item);
            children.push(else_item);
        }
        self.node(NodeKind::GenIf, children)
    }

    /// `case (expr) items endcase` at module level; items are built with
    /// [`Builder::gencase_item`].
    pub fn gencase(&mut self, expr: NodeId, items: Vec<NodeId>) -> NodeId {
        let mut children = vec![expr];
        children.extend(items);
        self.node(NodeKind::GenCase, children)
    }

    /// A generate case item; an empty `values` list is the default item.
    pub fn gencase_item(&mut self, values: Vec<NodeId>, body: NodeId) -> NodeId {
        let body = self.as_genblock(body);
        let mut children = if values.is_empty() {
            vec![self.node(NodeKind::Default, vec![])]
        } else {
            values
        };
        children.push(body);
        self.node(NodeKind::Cond, children)
    }

    // Hierarchy

    /// An instance `module #(params) inst (ports)`. An empty name binds
    /// positionally.
    pub fn cell(
        &mut self,
        inst: &str,
        module: &str,
        params: Vec<(&str, NodeId)>,
        ports: Vec<(&str, NodeId)>,
    ) -> NodeId {
        let params: Vec<NodeId> = params
            .into_iter()
            .map(|(name, value)| self.named(NodeKind::Paraset, name, vec![value]))
            .collect();
        let celltype = self.named(NodeKind::CellType, module, params);
        let mut children = vec![celltype];
        for (name, expr) in ports {
            let arg = self.named(NodeKind::Argument, name, vec![expr]);
            children.push(arg);
        }
        self.named(NodeKind::Cell, inst, children)
    }

    /// An array of instances `cell[msb:lsb]`.
    pub fn cell_array(&mut self, range: NodeId, cell: NodeId) -> NodeId {
        self.node(NodeKind::CellArray, vec![range, cell])
    }

    /// A gate primitive such as `and`; the first terminal is the output.
    pub fn primitive(&mut self, gate: &str, terminals: Vec<NodeId>) -> NodeId {
        let args: Vec<NodeId> = terminals
            .into_iter()
            .map(|t| self.node(NodeKind::Argument, vec![t]))
            .collect();
        self.named(NodeKind::Primitive, gate, args)
    }

    /// A function returning `width` bits; `items` holds argument and local
    /// declarations followed by statements.
    pub fn function(&mut self, name: &str, width: u32, items: Vec<NodeId>) -> NodeId {
        let result = self.wire(name, width);
        self.ast[result].is_reg = true;
        let mut children = vec![result];
        children.extend(items);
        self.named(NodeKind::Function, name, children)
    }

    /// A task with declarations followed by statements.
    pub fn task(&mut self, name: &str, items: Vec<NodeId>) -> NodeId {
        self.named(NodeKind::Task, name, items)
    }

    /// A module; port declarations are numbered in order of appearance.
    pub fn module(&mut self, name: &str, items: Vec<NodeId>) -> NodeId {
        let mut port = 0;
        for &item in &items {
            let node = &mut self.ast[item];
            if node.kind == NodeKind::Wire && (node.is_input || node.is_output) && node.port_id == 0 {
                port += 1;
                node.port_id = port;
            }
        }
        self.named(NodeKind::Module, name, items)
    }

    /// An interface with wires and modports.
    pub fn interface(&mut self, name: &str, items: Vec<NodeId>) -> NodeId {
        self.named(NodeKind::Interface, name, items)
    }

    /// `modport name (input a, output b)`; members are `(name, is_input)`.
    pub fn modport(&mut self, name: &str, members: Vec<(&str, bool)>) -> NodeId {
        let members: Vec<NodeId> = members
            .into_iter()
            .map(|(member, is_input)| {
                let id = self.named(NodeKind::ModportMember, member, vec![]);
                self.ast[id].is_input = is_input;
                self.ast[id].is_output = !is_input;
                id
            })
            .collect();
        self.named(NodeKind::Modport, name, members)
    }

    /// An interface port `intf.modport name`; `kind` is `intf` or
    /// `intf.modport`.
    pub fn interface_port(&mut self, name: &str, kind: &str) -> NodeId {
        let ty = self.named(NodeKind::InterfacePortType, kind, vec![]);
        self.named(NodeKind::InterfacePort, name, vec![ty])
    }

    /// A package with parameters, functions and typedefs.
    pub fn package(&mut self, name: &str, items: Vec<NodeId>) -> NodeId {
        self.named(NodeKind::Package, name, items)
    }

    /// `bind target cell`.
    pub fn bind(&mut self, target: &str, cell: NodeId) -> NodeId {
        self.named(NodeKind::Bind, target, vec![cell])
    }

    /// The design root.
    pub fn design(&mut self, items: Vec<NodeId>) -> NodeId {
        let id = self.node(NodeKind::Design, items);
        self.ast.fixup_hierarchy_flags(id, true);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_numbers_ports() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let a = b.input("a", 8);
        let w = b.wire("w", 8);
        let y = b.output("y", 8);
        let m = b.module("top", vec![a, w, y]);
        assert_eq!(ast[a].port_id, 1);
        assert_eq!(ast[w].port_id, 0);
        assert_eq!(ast[y].port_id, 2);
        assert_eq!(ast.children(m).len(), 3);
        assert_eq!(ast.kind(ast.children(a)[0]), NodeKind::Range);
    }

    #[test]
    fn if_else_layout() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let c = b.ident("c");
        let q = b.ident("q");
        let one = b.sized(1, 1);
        let then_stmt = b.blocking(q, one);
        let stmt = b.if_else(c, then_stmt, None);
        assert_eq!(ast.kind(stmt), NodeKind::Case);
        let test = ast.children(stmt)[0];
        assert_eq!(ast.kind(test), NodeKind::ReduceBool);
        let item = ast.children(stmt)[1];
        assert_eq!(ast.kind(ast.children(item)[1]), NodeKind::Block);
    }

    #[test]
    fn cell_layout() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let eight = b.int(8);
        let x = b.ident("x");
        let cell = b.cell("u0", "M", vec![("WIDTH", eight)], vec![("a", x)]);
        let celltype = ast.children(cell)[0];
        assert_eq!(ast[celltype].name, "M");
        assert_eq!(ast[ast.children(celltype)[0]].name, "WIDTH");
        assert_eq!(ast.kind(ast.children(cell)[1]), NodeKind::Argument);
    }

    #[test]
    fn design_fixes_flags() {
        let mut ast = Ast::new();
        let mut b = Builder::new(&mut ast);
        let v = b.int(3);
        let p = b.parameter("P", v);
        let m = b.module("m", vec![p]);
        b.design(vec![m]);
        assert!(ast[v].in_param);
    }
}
