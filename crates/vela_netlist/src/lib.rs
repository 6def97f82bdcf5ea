//! The netlist that elaboration emits into.
//!
//! A [`Design`] holds named [`Module`]s made of [`Wire`]s, [`Cell`]s,
//! [`Memory`]s, [`Process`]es and continuous connections between
//! [`SigSpec`]s.

#![warn(missing_docs)]

pub mod arena;
pub mod cell;
pub mod design;
pub mod error;
pub mod ids;
pub mod module;
pub mod process;
pub mod sigspec;
pub mod wire;

pub use cell::Cell;
pub use design::Design;
pub use error::NetlistError;
pub use ids::{CellId, MemoryId, ProcessId, WireId};
pub use module::Module;
pub use process::{Action, CaseRule, Process, SwitchRule, SyncKind, SyncRule};
pub use sigspec::{SigBit, SigSpec};
pub use wire::{Attributes, Memory, Wire};
