//! The closed set of node kinds.

use serde::{Deserialize, Serialize};

macro_rules! node_kinds {
    ($($(#[$meta:meta])* $variant:ident => $name:literal,)*) => {
        /// What a [`Node`](crate::Node) represents.
        ///
        /// The child layout of each kind is fixed; see the crate documentation.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
        pub enum NodeKind {
            $($(#[$meta])* $variant,)*
        }

        impl NodeKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [NodeKind] = &[$(NodeKind::$variant,)*];

            /// The printable name of the kind, as used in dumps and diagnostics.
            pub fn type_name(self) -> &'static str {
                match self {
                    $(NodeKind::$variant => $name,)*
                }
            }
        }
    };
}

node_kinds! {
    /// Placeholder left behind by rewrites that empty a node.
    None => "none",
    /// Root of a parsed design.
    Design => "design",
    /// Module declaration.
    Module => "module",
    /// Task declaration.
    Task => "task",
    /// Function declaration.
    Function => "function",
    /// Imported foreign function.
    DpiFunction => "dpi_function",
    /// Interface declaration.
    Interface => "interface",
    /// Package declaration.
    Package => "package",
    /// Net or variable declaration.
    Wire => "wire",
    /// Memory (unpacked array) declaration.
    Memory => "memory",
    /// Implicitly declared net.
    Autowire => "autowire",
    /// Overridable parameter.
    Parameter => "parameter",
    /// Local parameter.
    Localparam => "localparam",
    /// `defparam` override.
    Defparam => "defparam",
    /// Parameter binding on an instance.
    Paraset => "paraset",
    /// Port connection or gate terminal.
    Argument => "argument",
    /// Bit range or index.
    Range => "range",
    /// List of ranges of a multi-dimensional declaration.
    Multirange => "multirange",
    /// Bit-vector literal.
    Constant => "constant",
    /// Real literal.
    RealValue => "realvalue",
    /// Instantiated module type with its parameter bindings.
    CellType => "celltype",
    /// Reference to a declared name.
    Identifier => "identifier",
    /// Hierarchical reference through an indexed generate block.
    Prefix => "prefix",
    /// Assertion.
    Assert => "assert",
    /// Assumption.
    Assume => "assume",
    /// Liveness property.
    Live => "live",
    /// Fairness property.
    Fair => "fair",
    /// Cover property.
    Cover => "cover",
    /// Enumeration declaration.
    Enum => "enum",
    /// Enumeration item.
    EnumItem => "enum_item",
    /// Function call.
    FCall => "fcall",
    /// Cast to an unsigned bit vector.
    ToBits => "to_bits",
    /// `$signed`.
    ToSigned => "to_signed",
    /// `$unsigned`.
    ToUnsigned => "to_unsigned",
    /// Self-determined operand marker.
    SelfSz => "selfsz",
    /// Size cast `N'(expr)`.
    CastSize => "cast_size",
    /// Concatenation, most significant operand first.
    Concat => "concat",
    /// Replication `{n{...}}`.
    Replicate => "replicate",
    /// `~a`.
    BitNot => "bit_not",
    /// `a & b`.
    BitAnd => "bit_and",
    /// `a | b`.
    BitOr => "bit_or",
    /// `a ^ b`.
    BitXor => "bit_xor",
    /// `a ~^ b`.
    BitXnor => "bit_xnor",
    /// `&a`.
    ReduceAnd => "reduce_and",
    /// `|a`.
    ReduceOr => "reduce_or",
    /// `^a`.
    ReduceXor => "reduce_xor",
    /// `~^a`.
    ReduceXnor => "reduce_xnor",
    /// Reduction to a truth value.
    ReduceBool => "reduce_bool",
    /// `a << b`.
    ShiftLeft => "shift_left",
    /// `a >> b`.
    ShiftRight => "shift_right",
    /// `a <<< b`.
    ShiftSleft => "shift_sleft",
    /// `a >>> b`.
    ShiftSright => "shift_sright",
    /// Variable part select, out-of-range bits read as `x`.
    ShiftX => "shiftx",
    /// Signed-amount shift, positive shifts right.
    Shift => "shift",
    /// `a < b`.
    Lt => "lt",
    /// `a <= b`.
    Le => "le",
    /// `a == b`.
    Eq => "eq",
    /// `a != b`.
    Ne => "ne",
    /// `a === b`.
    Eqx => "eqx",
    /// `a !== b`.
    Nex => "nex",
    /// `a >= b`.
    Ge => "ge",
    /// `a > b`.
    Gt => "gt",
    /// `a + b`.
    Add => "add",
    /// `a - b`.
    Sub => "sub",
    /// `a * b`.
    Mul => "mul",
    /// `a / b`.
    Div => "div",
    /// `a % b`.
    Mod => "mod",
    /// `a ** b`.
    Pow => "pow",
    /// `+a`.
    Pos => "pos",
    /// `-a`.
    Neg => "neg",
    /// `a && b`.
    LogicAnd => "logic_and",
    /// `a || b`.
    LogicOr => "logic_or",
    /// `!a`.
    LogicNot => "logic_not",
    /// `c ? a : b`.
    Ternary => "ternary",
    /// Memory read port.
    MemRd => "memrd",
    /// Memory write port.
    MemWr => "memwr",
    /// Memory initialisation.
    MemInit => "meminit",
    /// Task call.
    TCall => "tcall",
    /// Continuous assignment.
    Assign => "assign",
    /// Module instance.
    Cell => "cell",
    /// Gate primitive instance.
    Primitive => "primitive",
    /// Array of instances.
    CellArray => "cellarray",
    /// `always` process.
    Always => "always",
    /// `initial` process.
    Initial => "initial",
    /// Sequential block.
    Block => "block",
    /// Blocking assignment.
    AssignEq => "assign_eq",
    /// Non-blocking assignment.
    AssignLe => "assign_le",
    /// `case` statement.
    Case => "case",
    /// Case item.
    Cond => "cond",
    /// `casex` item.
    CondX => "condx",
    /// `casez` item.
    CondZ => "condz",
    /// `default` label of a case item.
    Default => "default",
    /// Procedural `for` loop.
    For => "for",
    /// Procedural `while` loop.
    While => "while",
    /// Procedural `repeat` loop.
    Repeat => "repeat",
    /// `genvar` declaration.
    Genvar => "genvar",
    /// Generate loop.
    GenFor => "genfor",
    /// Generate conditional.
    GenIf => "genif",
    /// Generate case.
    GenCase => "gencase",
    /// Generate block.
    GenBlock => "genblock",
    /// System task enable inside a function.
    TeCall => "tecall",
    /// `posedge` event.
    Posedge => "posedge",
    /// `negedge` event.
    Negedge => "negedge",
    /// Level event.
    Edge => "edge",
    /// Interface port declaration.
    InterfacePort => "interfaceport",
    /// Type of an interface port: `intf` or `intf.modport`.
    InterfacePortType => "interfaceport_type",
    /// Modport declaration.
    Modport => "modport",
    /// Member of a modport.
    ModportMember => "modport_member",
    /// Reference to a user-defined type.
    WireType => "wiretype",
    /// Type definition.
    Typedef => "typedef",
    /// Packed struct.
    Struct => "struct",
    /// Packed union.
    Union => "union",
    /// Member of a struct or union.
    StructItem => "struct_item",
    /// `bind` directive.
    Bind => "bind",
}

impl NodeKind {
    /// Binary operators that fold with the two-operand constant calculus.
    pub fn is_binary_operator(self) -> bool {
        use NodeKind::*;
        matches!(
            self,
            BitAnd
                | BitOr
                | BitXor
                | BitXnor
                | ShiftLeft
                | ShiftRight
                | ShiftSleft
                | ShiftSright
                | ShiftX
                | Shift
                | Lt
                | Le
                | Eq
                | Ne
                | Eqx
                | Nex
                | Ge
                | Gt
                | Add
                | Sub
                | Mul
                | Div
                | Mod
                | Pow
                | LogicAnd
                | LogicOr
        )
    }

    /// The relational operators.
    pub fn is_comparison(self) -> bool {
        use NodeKind::*;
        matches!(self, Lt | Le | Eq | Ne | Eqx | Nex | Ge | Gt)
    }

    /// Assertion-like statements.
    pub fn is_property(self) -> bool {
        use NodeKind::*;
        matches!(self, Assert | Assume | Live | Fair | Cover)
    }

    /// Case item kinds.
    pub fn is_case_item(self) -> bool {
        matches!(self, NodeKind::Cond | NodeKind::CondX | NodeKind::CondZ)
    }

    /// Assignment kinds whose first child is an lvalue.
    pub fn is_assignment(self) -> bool {
        matches!(self, NodeKind::Assign | NodeKind::AssignEq | NodeKind::AssignLe)
    }

    /// Generate constructs expanded at elaboration time.
    pub fn is_generate(self) -> bool {
        use NodeKind::*;
        matches!(self, GenFor | GenIf | GenCase | GenBlock)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn type_names_are_unique() {
        let names: HashSet<_> = NodeKind::ALL.iter().map(|k| k.type_name()).collect();
        assert_eq!(names.len(), NodeKind::ALL.len());
        assert!(NodeKind::ALL.len() > 100);
    }

    #[test]
    fn classification() {
        assert!(NodeKind::Add.is_binary_operator());
        assert!(!NodeKind::Neg.is_binary_operator());
        assert!(NodeKind::Eqx.is_comparison());
        assert!(NodeKind::Cover.is_property());
        assert!(NodeKind::AssignLe.is_assignment());
        assert_eq!(NodeKind::GenBlock.to_string(), "genblock");
    }
}
