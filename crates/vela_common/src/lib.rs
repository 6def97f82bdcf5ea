//! Shared foundational types for the Vela elaboration core.
//!
//! Interned netlist identifiers, content hashing for derived names, four-state
//! constants with their arbitrary-precision calculus, and the internal error
//! type used for bugs rather than user mistakes.

#![warn(missing_docs)]

pub mod calc;
pub mod const_value;
pub mod hash;
pub mod ident;
pub mod logic;
pub mod logic_vec;
pub mod result;

pub use const_value::ConstValue;
pub use hash::ContentHash;
pub use ident::{Ident, Interner};
pub use logic::Logic;
pub use logic_vec::LogicVec;
pub use result::{InternalError, VelaResult};
