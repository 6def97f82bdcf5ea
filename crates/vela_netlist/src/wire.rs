//! Wires, memories and their attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vela_common::{ConstValue, Ident};

/// Attribute map shared by all netlist objects.
pub type Attributes = BTreeMap<String, ConstValue>;

/// A named bundle of bits inside a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wire {
    /// The wire name.
    pub name: Ident,
    /// Number of bits.
    pub width: u32,
    /// Index of the least significant bit as declared.
    pub start_offset: i32,
    /// True for `[low:high]` declarations.
    pub upto: bool,
    /// 1-based port position, 0 for internal wires.
    pub port_id: u32,
    /// Input port.
    pub port_input: bool,
    /// Output port.
    pub port_output: bool,
    /// Signed wire.
    pub is_signed: bool,
    /// Attributes such as `src`, `keep` or `nosync`.
    pub attributes: Attributes,
}

impl Wire {
    /// A `width`-bit internal wire.
    pub fn new(name: Ident, width: u32) -> Self {
        Self {
            name,
            width,
            start_offset: 0,
            upto: false,
            port_id: 0,
            port_input: false,
            port_output: false,
            is_signed: false,
            attributes: Attributes::new(),
        }
    }

    /// True if the wire is a port.
    pub fn is_port(&self) -> bool {
        self.port_id > 0
    }
}

/// A memory that was not promoted to registers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// The memory name.
    pub name: Ident,
    /// Word width in bits.
    pub width: u32,
    /// Lowest address.
    pub start_offset: i32,
    /// Number of words.
    pub size: u32,
    /// Attributes.
    pub attributes: Attributes,
}

impl Memory {
    /// A memory of `size` words of `width` bits.
    pub fn new(name: Ident, width: u32, size: u32) -> Self {
        Self {
            name,
            width,
            start_offset: 0,
            size,
            attributes: Attributes::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_wire_is_internal() {
        let w = Wire::new(Ident::from_raw(3), 8);
        assert!(!w.is_port());
        assert_eq!(w.width, 8);
    }

    #[test]
    fn wire_serde_roundtrip() {
        let mut w = Wire::new(Ident::from_raw(3), 8);
        w.attributes.insert("keep".into(), ConstValue::int(1));
        let json = serde_json::to_string(&w).unwrap();
        let back: Wire = serde_json::from_str(&json).unwrap();
        assert_eq!(back.width, 8);
        assert_eq!(back.attributes.len(), 1);
    }
}
