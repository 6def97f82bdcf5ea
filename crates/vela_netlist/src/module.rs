//! A netlist module: wires, cells, memories, processes and connections.

use crate::arena::Arena;
use crate::cell::Cell;
use crate::error::NetlistError;
use crate::ids::{CellId, MemoryId, ProcessId, WireId};
use crate::process::Process;
use crate::sigspec::SigSpec;
use crate::wire::{Attributes, Memory, Wire};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use vela_common::{ConstValue, Ident};

/// One module of the emitted netlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// The module name.
    pub name: Ident,
    /// All wires.
    pub wires: Arena<WireId, Wire>,
    /// All cells.
    pub cells: Arena<CellId, Cell>,
    /// Memories kept as memories.
    pub memories: Arena<MemoryId, Memory>,
    /// Lowered procedural blocks.
    pub processes: Arena<ProcessId, Process>,
    /// Continuous connections `lhs = rhs`.
    pub connections: Vec<(SigSpec, SigSpec)>,
    /// Parameters that can be overridden, in declaration order.
    pub avail_parameters: Vec<Ident>,
    /// Default value of each overridable parameter.
    pub parameter_default_values: BTreeMap<Ident, ConstValue>,
    /// Port wires ordered by port position; filled by [`Module::fixup_ports`].
    pub ports: Vec<WireId>,
    /// Module attributes such as `blackbox` or `src`.
    pub attributes: Attributes,
    wire_names: HashMap<Ident, WireId>,
    cell_names: HashMap<Ident, CellId>,
    memory_names: HashMap<Ident, MemoryId>,
}

impl Module {
    /// An empty module.
    pub fn new(name: Ident) -> Self {
        Self {
            name,
            wires: Arena::new(),
            cells: Arena::new(),
            memories: Arena::new(),
            processes: Arena::new(),
            connections: Vec::new(),
            avail_parameters: Vec::new(),
            parameter_default_values: BTreeMap::new(),
            ports: Vec::new(),
            attributes: Attributes::new(),
            wire_names: HashMap::new(),
            cell_names: HashMap::new(),
            memory_names: HashMap::new(),
        }
    }

    fn duplicate(&self, kind: &'static str, name: Ident) -> NetlistError {
        NetlistError::DuplicateName {
            kind,
            name: format!("#{}", name.as_raw()),
            module: format!("#{}", self.name.as_raw()),
        }
    }

    /// Adds a `width`-bit wire.
    pub fn add_wire(&mut self, name: Ident, width: u32) -> Result<WireId, NetlistError> {
        if self.wire_names.contains_key(&name) {
            return Err(self.duplicate("wire", name));
        }
        let id = self.wires.alloc(Wire::new(name, width));
        self.wire_names.insert(name, id);
        Ok(id)
    }

    /// Looks a wire up by name.
    pub fn find_wire(&self, name: Ident) -> Option<WireId> {
        self.wire_names.get(&name).copied()
    }

    /// All bits of wire `id`.
    pub fn wire_sig(&self, id: WireId) -> SigSpec {
        SigSpec::wire(id, self.wires[id].width)
    }

    /// Adds an unconnected cell.
    pub fn add_cell(&mut self, name: Ident, cell_type: Ident) -> Result<CellId, NetlistError> {
        if self.cell_names.contains_key(&name) {
            return Err(self.duplicate("cell", name));
        }
        let id = self.cells.alloc(Cell::new(name, cell_type));
        self.cell_names.insert(name, id);
        Ok(id)
    }

    /// Looks a cell up by name.
    pub fn find_cell(&self, name: Ident) -> Option<CellId> {
        self.cell_names.get(&name).copied()
    }

    /// Adds a memory.
    pub fn add_memory(&mut self, memory: Memory) -> Result<MemoryId, NetlistError> {
        if self.memory_names.contains_key(&memory.name) {
            return Err(self.duplicate("memory", memory.name));
        }
        let name = memory.name;
        let id = self.memories.alloc(memory);
        self.memory_names.insert(name, id);
        Ok(id)
    }

    /// Looks a memory up by name.
    pub fn find_memory(&self, name: Ident) -> Option<MemoryId> {
        self.memory_names.get(&name).copied()
    }

    /// Adds a process.
    pub fn add_process(&mut self, process: Process) -> ProcessId {
        self.processes.alloc(process)
    }

    /// Drives `lhs` from `rhs`.
    pub fn connect(&mut self, lhs: SigSpec, rhs: SigSpec) {
        self.connections.push((lhs, rhs));
    }

    /// Rebuilds [`Module::ports`] from the port ids of the wires.
    pub fn fixup_ports(&mut self) {
        let mut ports: Vec<(u32, WireId)> = self
            .wires
            .iter()
            .filter(|(_, w)| w.is_port())
            .map(|(id, w)| (w.port_id, id))
            .collect();
        ports.sort();
        self.ports = ports.into_iter().map(|(_, id)| id).collect();
    }

    /// Cells whose type is `cell_type`.
    pub fn cells_of_type(&self, cell_type: Ident) -> impl Iterator<Item = &Cell> {
        self.cells.values().filter(move |c| c.cell_type == cell_type)
    }

    /// True if the module carries a non-zero attribute `name`.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(ConstValue::as_bool)
    }

    /// True for modules without a body.
    pub fn is_blackbox(&self) -> bool {
        self.has_attribute("blackbox")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_unique() {
        let mut m = Module::new(Ident::from_raw(0));
        let a = m.add_wire(Ident::from_raw(1), 4).unwrap();
        assert_eq!(m.find_wire(Ident::from_raw(1)), Some(a));
        assert!(matches!(
            m.add_wire(Ident::from_raw(1), 4),
            Err(NetlistError::DuplicateName { kind: "wire", .. })
        ));
        assert_eq!(m.wire_sig(a).width(), 4);
    }

    #[test]
    fn ports_sorted_by_position() {
        let mut m = Module::new(Ident::from_raw(0));
        let y = m.add_wire(Ident::from_raw(1), 1).unwrap();
        let a = m.add_wire(Ident::from_raw(2), 1).unwrap();
        m.add_wire(Ident::from_raw(3), 1).unwrap();
        m.wires[y].port_id = 2;
        m.wires[a].port_id = 1;
        m.fixup_ports();
        assert_eq!(m.ports, vec![a, y]);
    }

    #[test]
    fn cells_by_type() {
        let mut m = Module::new(Ident::from_raw(0));
        let add = Ident::from_raw(9);
        m.add_cell(Ident::from_raw(1), add).unwrap();
        m.add_cell(Ident::from_raw(2), Ident::from_raw(8)).unwrap();
        assert_eq!(m.cells_of_type(add).count(), 1);
        assert!(m.find_cell(Ident::from_raw(2)).is_some());
    }

    #[test]
    fn blackbox_attribute() {
        let mut m = Module::new(Ident::from_raw(0));
        assert!(!m.is_blackbox());
        m.attributes.insert("blackbox".into(), ConstValue::int(1));
        assert!(m.is_blackbox());
    }
}
