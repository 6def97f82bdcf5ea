//! The syntax tree consumed by elaboration.
//!
//! Nodes live in an [`Ast`] arena and are addressed by [`NodeId`]. A node owns
//! its children and attribute expressions exclusively; the only non-owning
//! link is the `id2ast` back-reference an identifier receives once resolved.
//!
//! Child layout by kind, as produced by [`Builder`]:
//!
//! - `Module`: declarations and items in source order.
//! - `Wire`: optional packed `Range`, then unpacked `Range`s.
//! - `Memory`: word `Range`, address `Range`.
//! - `Parameter`/`Localparam`: value, optional `Range`.
//! - `Identifier`: optional `Range` select; a memory word select may be
//!   followed by a bit select.
//! - `Range`: one index, or `msb` and `lsb`.
//! - `Assign`/`AssignEq`/`AssignLe`: lvalue, value.
//! - `Always`: edge events, then the body `Block`; no events means `@*`.
//! - `Case`: subject, then `Cond` items whose last child is the body and whose
//!   other children are the labels (`Default` for the default item).
//! - `For`/`GenFor`: init, condition, step, body.
//! - `While`: condition, body. `Repeat`: count, body.
//! - `GenIf`: condition, then-block, optional else-block.
//! - `Cell`: `CellType` (holding `Paraset` bindings), then `Argument`s.
//! - `Function`: result `Wire` named after the function, declarations,
//!   statements.
//! - `Concat`: operands, most significant first. `Replicate`: count, `Concat`.
//! - `Prefix`: index, `Identifier`; names `label[index].identifier`.
//! - `CellArray`: `Range`, `Cell`.
//! - `Primitive`: `Argument`s, outputs first; the name is the gate type.
//! - `Defparam`: value; the name is `instance.parameter`.
//! - `Enum`: `EnumItem`s holding an optional value.
//! - `Typedef`: the base `Wire`, `Struct` or `Union`. A wire of a user type
//!   has `is_custom_type` set and a `WireType` child naming the typedef.
//! - `Struct`/`Union`: `StructItem`s with an optional packed `Range`.
//! - `MemRd`: address; `MemWr`: address, data, enable, port number;
//!   `MemInit`: address, data, enable, word count. The name is the memory.
//! - `InterfacePort`: an `InterfacePortType` named `intf` or `intf.modport`.
//! - `Modport`: `ModportMember`s carrying their direction.
//! - `Bind`: the `Cell` to add; the name is the target module.

#![warn(missing_docs)]

mod build;
mod consts;
mod dump;
mod flags;
mod kind;
mod node;
mod tree;

pub use build::Builder;
pub use kind::NodeKind;
pub use node::{Dimension, Node, NodeId};
pub use tree::Ast;
