//! Opaque identifier for source files.

use serde::{Deserialize, Serialize};

/// Opaque identifier for a file registered in the [`SourceDb`](crate::SourceDb).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct FileId(u32);

impl FileId {
    /// Marks locations that belong to no file, e.g. nodes synthesized by
    /// elaboration.
    pub const DUMMY: FileId = FileId(u32::MAX);

    /// Creates a `FileId` from a raw `u32` value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` value of this `FileId`.
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns true for [`FileId::DUMMY`].
    pub fn is_dummy(self) -> bool {
        self == Self::DUMMY
    }
}

impl Default for FileId {
    fn default() -> Self {
        FileId::DUMMY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip() {
        assert_eq!(FileId::from_raw(42).as_raw(), 42);
    }

    #[test]
    fn dummy_is_distinct() {
        assert!(FileId::DUMMY.is_dummy());
        assert!(!FileId::from_raw(0).is_dummy());
    }
}
