//! Explicit provenance for node construction.

use crate::file_id::FileId;
use crate::span::Span;

/// The location newly constructed nodes are stamped with.
///
/// A front end sets the current file and line as it builds a tree.
/// Elaboration switches to [`Provenance::internal`] while synthesizing nodes
/// so that folded or unrolled nodes do not claim a location they were never
/// written at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Provenance {
    file: FileId,
    line: u32,
    internal: bool,
}

impl Provenance {
    /// Provenance pointing at `line` of `file`.
    pub fn new(file: FileId, line: u32) -> Self {
        Self {
            file,
            line,
            internal: false,
        }
    }

    /// Provenance for synthesized nodes; stamps no location.
    pub fn internal() -> Self {
        Self {
            file: FileId::DUMMY,
            line: 0,
            internal: true,
        }
    }

    /// The current input line.
    pub fn current_line(&self) -> u32 {
        self.line
    }

    /// Moves to another input line.
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    /// The current file.
    pub fn file(&self) -> FileId {
        self.file
    }

    /// True for internal (location-less) provenance.
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// The span a node built now receives.
    pub fn span(&self) -> Span {
        if self.internal {
            Span::DUMMY
        } else {
            Span::line(self.file, self.line)
        }
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self::internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_current_line() {
        let f = FileId::from_raw(0);
        let mut p = Provenance::new(f, 3);
        assert_eq!(p.span(), Span::line(f, 3));
        p.set_line(9);
        assert_eq!(p.current_line(), 9);
        assert_eq!(p.span().first_line, 9);
    }

    #[test]
    fn internal_has_no_location() {
        let p = Provenance::internal();
        assert!(p.is_internal());
        assert!(p.span().is_dummy());
    }
}
