//! Top-level netlist container.
//!
//! A [`Design`] owns the interner for all netlist names and the modules
//! emitted by elaboration, keyed by name.

use crate::error::NetlistError;
use crate::ids::WireId;
use crate::module::Module;
use crate::wire::Wire;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::collections::BTreeMap;
use vela_common::{Ident, Interner};

/// The emitted netlist.
#[derive(Debug, Default)]
pub struct Design {
    /// Interner for every name in the design.
    pub interner: Interner,
    modules: BTreeMap<Ident, Module>,
}

impl Design {
    /// An empty design.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `name`.
    pub fn ident(&self, name: &str) -> Ident {
        self.interner.get_or_intern(name)
    }

    /// The text of `ident`.
    pub fn name(&self, ident: Ident) -> &str {
        self.interner.resolve(ident)
    }

    /// Adds an empty module named `name`.
    pub fn add_module(&mut self, name: &str) -> Result<&mut Module, NetlistError> {
        let ident = self.ident(name);
        if self.modules.contains_key(&ident) {
            return Err(NetlistError::DuplicateName {
                kind: "module",
                name: name.to_string(),
                module: name.to_string(),
            });
        }
        Ok(self.modules.entry(ident).or_insert_with(|| Module::new(ident)))
    }

    /// Inserts a fully built module, replacing any module of the same name.
    pub fn insert_module(&mut self, module: Module) -> Option<Module> {
        self.modules.insert(module.name, module)
    }

    /// True if a module named `name` exists.
    pub fn has(&self, name: &str) -> bool {
        self.interner
            .get(name)
            .is_some_and(|ident| self.modules.contains_key(&ident))
    }

    /// The module named `name`.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(&self.interner.get(name)?)
    }

    /// The module named `name`, mutably.
    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        let ident = self.interner.get(name)?;
        self.modules.get_mut(&ident)
    }

    /// Removes and returns the module named `name`.
    pub fn remove_module(&mut self, name: &str) -> Option<Module> {
        let ident = self.interner.get(name)?;
        self.modules.remove(&ident)
    }

    /// All modules.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// All modules, mutably.
    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.values_mut()
    }

    /// Number of modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Module names in alphabetical order.
    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .keys()
            .map(|&k| self.name(k).to_string())
            .collect();
        names.sort();
        names
    }

    /// Looks up wire `wire` of module `module` by name.
    pub fn find_wire(&self, module: &str, wire: &str) -> Option<(WireId, &Wire)> {
        let m = self.module(module)?;
        let id = m.find_wire(self.interner.get(wire)?)?;
        Some((id, &m.wires[id]))
    }

    /// The instantiation graph: an edge from each module to every module it
    /// instantiates.
    pub fn hierarchy(&self) -> DiGraphMap<Ident, ()> {
        let mut graph = DiGraphMap::new();
        for (&name, module) in &self.modules {
            graph.add_node(name);
            for cell in module.cells.values() {
                if self.modules.contains_key(&cell.cell_type) {
                    graph.add_edge(name, cell.cell_type, ());
                }
            }
        }
        graph
    }

    /// Modules that no other module instantiates, in alphabetical order.
    pub fn top_candidates(&self) -> Vec<String> {
        let graph = self.hierarchy();
        let mut tops: Vec<String> = graph
            .nodes()
            .filter(|&n| {
                graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter(|n| self.modules.get(n).is_some_and(|m| !m.is_blackbox()))
            .map(|n| self.name(n).to_string())
            .collect();
        tops.sort();
        tops
    }

    /// Fails if a module transitively instantiates itself.
    pub fn check_hierarchy(&self) -> Result<(), NetlistError> {
        toposort(&self.hierarchy(), None)
            .map(|_| ())
            .map_err(|cycle| NetlistError::RecursiveInstantiation(self.name(cycle.node_id()).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design_with_hierarchy() -> Design {
        let mut d = Design::new();
        d.add_module("leaf").unwrap();
        let leaf = d.ident("leaf");
        let u0 = d.ident("u0");
        d.add_module("top").unwrap().add_cell(u0, leaf).unwrap();
        d
    }

    #[test]
    fn modules_by_name() {
        let mut d = design_with_hierarchy();
        assert!(d.has("top"));
        assert!(!d.has("missing"));
        assert!(d.add_module("top").is_err());
        assert_eq!(d.module_names(), vec!["leaf", "top"]);
        assert!(d.remove_module("leaf").is_some());
        assert!(!d.has("leaf"));
    }

    #[test]
    fn top_is_uninstantiated() {
        let d = design_with_hierarchy();
        assert_eq!(d.top_candidates(), vec!["top"]);
        assert!(d.check_hierarchy().is_ok());
    }

    #[test]
    fn recursion_detected() {
        let mut d = design_with_hierarchy();
        let top = d.ident("top");
        let u1 = d.ident("u1");
        d.module_mut("leaf").unwrap().add_cell(u1, top).unwrap();
        assert!(matches!(
            d.check_hierarchy(),
            Err(NetlistError::RecursiveInstantiation(_))
        ));
    }

    #[test]
    fn wire_lookup() {
        let mut d = Design::new();
        let q = d.ident("q");
        d.add_module("m").unwrap().add_wire(q, 3).unwrap();
        let (_, wire) = d.find_wire("m", "q").unwrap();
        assert_eq!(wire.width, 3);
        assert!(d.find_wire("m", "nope").is_none());
    }
}
