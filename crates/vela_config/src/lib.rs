//! Elaboration options read from `vela.toml`.
//!
//! The `[elaborate]` table controls memory promotion, latch handling,
//! blackbox treatment and the evaluation limits of the constant interpreter.
//! Every field is optional; [`ElabOptions::default`] is what an absent table
//! means.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str};
pub use types::*;
