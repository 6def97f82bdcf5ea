//! Cells: operator instances and module instantiations.
//!
//! The cell type is either an internal operator (`$add`, `$mux`, `$memrd`,
//! ...) or the name of another module.

use crate::sigspec::SigSpec;
use crate::wire::Attributes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vela_common::{ConstValue, Ident};

/// An instance of an operator or a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Instance name.
    pub name: Ident,
    /// Operator or module name.
    pub cell_type: Ident,
    /// Parameter values, by parameter name.
    pub parameters: BTreeMap<String, ConstValue>,
    /// Port connections, by port name.
    pub connections: BTreeMap<String, SigSpec>,
    /// Attributes.
    pub attributes: Attributes,
}

impl Cell {
    /// An unconnected cell.
    pub fn new(name: Ident, cell_type: Ident) -> Self {
        Self {
            name,
            cell_type,
            parameters: BTreeMap::new(),
            connections: BTreeMap::new(),
            attributes: Attributes::new(),
        }
    }

    /// Sets parameter `name`.
    pub fn set_param(&mut self, name: &str, value: ConstValue) {
        self.parameters.insert(name.to_string(), value);
    }

    /// Connects port `port` to `sig`.
    pub fn set_port(&mut self, port: &str, sig: SigSpec) {
        self.connections.insert(port.to_string(), sig);
    }

    /// The signal connected to `port`.
    pub fn port(&self, port: &str) -> Option<&SigSpec> {
        self.connections.get(port)
    }

    /// Parameter `name` read as an integer.
    pub fn param_int(&self, name: &str) -> Option<i64> {
        match self.parameters.get(name)? {
            ConstValue::Bits { value, signed } => Some(i64::from(value.as_int(*signed))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WireId;

    #[test]
    fn params_and_ports() {
        let mut c = Cell::new(Ident::from_raw(1), Ident::from_raw(2));
        c.set_param("Y_WIDTH", ConstValue::int(8));
        c.set_port("Y", SigSpec::wire(WireId::from_raw(0), 8));
        assert_eq!(c.param_int("Y_WIDTH"), Some(8));
        assert_eq!(c.port("Y").map(SigSpec::width), Some(8));
        assert!(c.port("A").is_none());
    }
}
