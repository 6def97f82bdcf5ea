//! Errors raised by netlist mutations.

use thiserror::Error;

/// A netlist operation that would break an invariant of the design.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetlistError {
    /// An object of that name already exists in the module.
    #[error("duplicate {kind} `{name}` in module `{module}`")]
    DuplicateName {
        /// Object kind (wire, cell, memory, module).
        kind: &'static str,
        /// The clashing name.
        name: String,
        /// The enclosing module.
        module: String,
    },
    /// The instantiation graph contains a cycle through this module.
    #[error("recursive instantiation of module `{0}`")]
    RecursiveInstantiation(String),
}
