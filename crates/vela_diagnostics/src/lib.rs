//! Diagnostics emitted while elaborating a design.
//!
//! A [`Diagnostic`] carries a severity, a structured code, a message and the
//! span of the node that caused it. Diagnostics accumulate in the thread-safe
//! [`DiagnosticSink`] and are formatted by a [`DiagnosticRenderer`].

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod label;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use label::{Label, LabelStyle};
pub use renderer::{DiagnosticRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::DiagnosticSink;
