//! Source locations for elaborated nodes and diagnostics.
//!
//! Files are registered in a [`SourceDb`] and referred to by [`FileId`].
//! Every node carries a line/column [`Span`]; nodes are stamped from an
//! explicit [`Provenance`] value instead of global "current line" state.

#![warn(missing_docs)]

pub mod file_id;
pub mod provenance;
pub mod source_db;
pub mod span;

pub use file_id::FileId;
pub use provenance::Provenance;
pub use source_db::SourceDb;
pub use span::Span;
