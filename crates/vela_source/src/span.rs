//! Line/column ranges within source files.

use crate::file_id::FileId;
use serde::{Deserialize, Serialize};

/// A range of source text given as first/last line and first/last column.
///
/// Lines and columns are 1-based. A span whose file is [`FileId::DUMMY`]
/// carries no location.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Span {
    /// The source file this span belongs to.
    pub file: FileId,
    /// Line of the first character.
    pub first_line: u32,
    /// Column of the first character.
    pub first_column: u32,
    /// Line of the last character.
    pub last_line: u32,
    /// Column just past the last character.
    pub last_column: u32,
}

impl Span {
    /// A span without location.
    pub const DUMMY: Span = Span {
        file: FileId::DUMMY,
        first_line: 0,
        first_column: 0,
        last_line: 0,
        last_column: 0,
    };

    /// Creates a span from its four coordinates.
    pub fn new(file: FileId, first_line: u32, first_column: u32, last_line: u32, last_column: u32) -> Self {
        Self {
            file,
            first_line,
            first_column,
            last_line,
            last_column,
        }
    }

    /// A span covering a single line with unknown columns.
    pub fn line(file: FileId, line: u32) -> Self {
        Self::new(file, line, 0, line, 0)
    }

    /// Smallest span covering both inputs.
    ///
    /// A dummy span on either side yields the other span unchanged.
    pub fn merge(self, other: Span) -> Span {
        if self.is_dummy() {
            return other;
        }
        if other.is_dummy() || self.file != other.file {
            return self;
        }
        let (first_line, first_column) =
            (self.first_line, self.first_column).min((other.first_line, other.first_column));
        let (last_line, last_column) =
            (self.last_line, self.last_column).max((other.last_line, other.last_column));
        Span::new(self.file, first_line, first_column, last_line, last_column)
    }

    /// Returns `true` if this span carries no location.
    pub fn is_dummy(&self) -> bool {
        self.file.is_dummy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both() {
        let f = FileId::from_raw(0);
        let a = Span::new(f, 3, 5, 3, 9);
        let b = Span::new(f, 2, 1, 3, 7);
        assert_eq!(a.merge(b), Span::new(f, 2, 1, 3, 9));
        assert_eq!(a.merge(b), b.merge(a));
    }

    #[test]
    fn merge_with_dummy() {
        let f = FileId::from_raw(0);
        let a = Span::line(f, 4);
        assert_eq!(a.merge(Span::DUMMY), a);
        assert_eq!(Span::DUMMY.merge(a), a);
    }

    #[test]
    fn default_is_dummy() {
        assert!(Span::default().is_dummy());
        assert_eq!(Span::default(), Span::DUMMY);
    }

    #[test]
    fn serde_roundtrip() {
        let s = Span::new(FileId::from_raw(1), 10, 2, 11, 8);
        let json = serde_json::to_string(&s).unwrap();
        let back: Span = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
