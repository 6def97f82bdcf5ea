//! Constant constructors and accessors.

use crate::kind::NodeKind;
use crate::node::{Node, NodeId};
use crate::tree::Ast;
use vela_common::{calc, ConstValue, Logic, LogicVec};
use vela_source::Provenance;

impl Ast {
    /// A `width`-bit integer constant holding `value`.
    pub fn mkconst_int(&mut self, value: i64, signed: bool, width: u32, prov: &Provenance) -> NodeId {
        let mut node = Node::new(NodeKind::Constant, prov.span());
        node.bits = LogicVec::from_i64(value, width);
        node.integer = value;
        node.is_signed = signed;
        node.range_valid = true;
        node.range_left = width as i32 - 1;
        node.range_right = 0;
        self.alloc(node)
    }

    /// A constant with the given bits.
    pub fn mkconst_bits(&mut self, bits: LogicVec, signed: bool, prov: &Provenance) -> NodeId {
        let node = const_node(bits, signed, false, prov);
        self.alloc(node)
    }

    /// An unsized constant such as `'1`, extended by replicating its top bit.
    pub fn mkconst_unsized(&mut self, bits: LogicVec, prov: &Provenance) -> NodeId {
        let node = const_node(bits, false, true, prov);
        self.alloc(node)
    }

    /// A string literal, eight bits per character, first character most significant.
    pub fn mkconst_str(&mut self, value: &str, prov: &Provenance) -> NodeId {
        let bits = if value.is_empty() {
            LogicVec::all_zero(8)
        } else {
            LogicVec::from_string_bytes(value)
        };
        let mut node = const_node(bits, false, false, prov);
        node.is_string = true;
        node.name = value.to_string();
        self.alloc(node)
    }

    /// A real literal.
    pub fn mkconst_real(&mut self, value: f64, prov: &Provenance) -> NodeId {
        let mut node = Node::new(NodeKind::RealValue, prov.span());
        node.realvalue = value;
        node.is_signed = true;
        self.alloc(node)
    }

    /// A node for a folded parameter value.
    pub fn mkconst_value(&mut self, value: &ConstValue, prov: &Provenance) -> NodeId {
        match value {
            ConstValue::Bits { value, signed } => self.mkconst_bits(value.clone(), *signed, prov),
            ConstValue::String(s) => self.mkconst_str(s, prov),
            ConstValue::Real(r) => self.mkconst_real(*r, prov),
        }
    }
}

fn const_node(bits: LogicVec, signed: bool, is_unsized: bool, prov: &Provenance) -> Node {
    let mut node = Node::new(NodeKind::Constant, prov.span());
    node.integer = i64::from(bits.resized(32, signed).as_int(false));
    node.range_valid = true;
    node.range_left = bits.width() as i32 - 1;
    node.range_right = 0;
    node.bits = bits;
    node.is_signed = signed;
    node.is_unsized = is_unsized;
    node
}

impl Node {
    /// 1 for bit constants, 2 for reals, 0 otherwise.
    pub fn is_const(&self) -> u8 {
        match self.kind {
            NodeKind::Constant => 1,
            NodeKind::RealValue => 2,
            _ => 0,
        }
    }

    /// The constant bits truncated or extended to `width`.
    ///
    /// Extension replicates the top bit for signed or unsized constants and
    /// pads with zeros otherwise.
    pub fn bits_as_const(&self, width: Option<u32>, signed: bool) -> LogicVec {
        match width {
            None => self.bits.clone(),
            Some(width) => {
                let fill = if (signed || self.is_unsized) && !self.bits.is_empty() {
                    self.bits.msb()
                } else {
                    Logic::Zero
                };
                self.bits.extended_with(width, fill)
            }
        }
    }

    /// The constant bits extended to at least `width` by replicating the top bit.
    pub fn bits_as_unsized_const(&self, width: u32) -> LogicVec {
        if self.bits.width() >= width || self.bits.is_empty() {
            return self.bits.clone();
        }
        self.bits.extended_with(width, self.bits.msb())
    }

    /// The value as a 64-bit integer; `x`/`z` bits read as zero.
    pub fn as_int(&self, signed: bool) -> i64 {
        match self.kind {
            NodeKind::RealValue => self.realvalue as i64,
            _ => {
                let v = self.bits_as_const(Some(64), signed);
                (0..64).fold(0u64, |acc, i| {
                    if v.get(i) == Logic::One {
                        acc | (1 << i)
                    } else {
                        acc
                    }
                }) as i64
            }
        }
    }

    /// True if any bit is `1`; reals compare against zero.
    pub fn as_bool(&self) -> bool {
        match self.kind {
            NodeKind::RealValue => self.realvalue != 0.0,
            _ => self.bits.as_bool(),
        }
    }

    /// True if every bit is `0` or `1`.
    pub fn bits_only_01(&self) -> bool {
        self.bits.is_fully_def()
    }

    /// The value as a real number.
    pub fn as_real(&self, signed: bool) -> f64 {
        match self.kind {
            NodeKind::RealValue => self.realvalue,
            _ => calc::to_real(&self.bits, signed),
        }
    }

    /// A real value rounded to a `width`-bit integer.
    pub fn real_as_const(&self, width: u32) -> LogicVec {
        calc::from_real(self.realvalue, width)
    }

    /// The value as an attribute: strings keep their text.
    pub fn as_attr_const(&self) -> ConstValue {
        if self.is_string {
            ConstValue::String(self.bits.decode_string())
        } else {
            ConstValue::bits(self.bits.clone())
        }
    }

    /// The value as a parameter, carrying signedness and realness.
    pub fn as_para_const(&self) -> ConstValue {
        match self.kind {
            NodeKind::RealValue => ConstValue::Real(self.realvalue),
            _ if self.is_string => ConstValue::String(self.bits.decode_string()),
            _ => ConstValue::Bits {
                value: self.bits.clone(),
                signed: self.is_signed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prov() -> Provenance {
        Provenance::internal()
    }

    #[test]
    fn int_constant_layout() {
        let mut ast = Ast::new();
        let c = ast.mkconst_int(5, false, 3, &prov());
        let n = &ast[c];
        assert_eq!(n.bits, LogicVec::from_u64(5, 3));
        assert_eq!(n.range_left, 2);
        assert_eq!(n.range_right, 0);
        assert_eq!(n.is_const(), 1);
    }

    #[test]
    fn bits_as_const_extension() {
        let mut ast = Ast::new();
        let c = ast.mkconst_bits(LogicVec::from_u64(0b101, 3), true, &prov());
        assert_eq!(ast[c].bits_as_const(Some(5), true), LogicVec::from_u64(0b11101, 5));
        assert_eq!(ast[c].bits_as_const(Some(5), false), LogicVec::from_u64(0b00101, 5));
        assert_eq!(ast[c].bits_as_const(Some(2), true), LogicVec::from_u64(0b01, 2));
        assert_eq!(ast[c].as_int(true), -3);
        assert_eq!(ast[c].as_int(false), 5);
    }

    #[test]
    fn unsized_extends_top_bit() {
        let mut ast = Ast::new();
        let c = ast.mkconst_unsized(LogicVec::from_u64(1, 1), &prov());
        assert!(ast[c].bits_as_const(Some(8), false).is_all_one());
        assert!(ast[c].bits_as_unsized_const(4).is_all_one());
    }

    #[test]
    fn string_constant() {
        let mut ast = Ast::new();
        let c = ast.mkconst_str("AB", &prov());
        assert_eq!(ast[c].bits.width(), 16);
        assert_eq!(ast[c].as_int(false), 0x4142);
        assert_eq!(ast[c].as_attr_const(), ConstValue::String("AB".into()));
        let e = ast.mkconst_str("", &prov());
        assert_eq!(ast[e].bits.width(), 8);
    }

    #[test]
    fn real_constant() {
        let mut ast = Ast::new();
        let r = ast.mkconst_real(2.6, &prov());
        assert_eq!(ast[r].is_const(), 2);
        assert_eq!(ast[r].real_as_const(4), LogicVec::from_u64(3, 4));
        assert_eq!(ast[r].as_para_const(), ConstValue::Real(2.6));
    }

    #[test]
    fn para_const_keeps_sign() {
        let mut ast = Ast::new();
        let c = ast.mkconst_int(-1, true, 4, &prov());
        assert_eq!(
            ast[c].as_para_const(),
            ConstValue::Bits {
                value: LogicVec::all_one(4),
                signed: true
            }
        );
        assert!(ast[c].bits_only_01());
    }
}
