//! Content hashing for derived module names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit XXH3 digest.
///
/// Derived module names that would grow unreasonably long (many or wide
/// parameter bindings) are shortened to a digest of their parameter text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(data).to_le_bytes())
    }

    /// Hashes a sequence of string parts, separating them so that
    /// `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn from_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut buf = Vec::new();
        for part in parts {
            buf.extend_from_slice(&(part.len() as u64).to_le_bytes());
            buf.extend_from_slice(part.as_bytes());
        }
        Self::from_bytes(&buf)
    }

    /// The first eight bytes as lowercase hex, for use inside identifiers.
    pub fn short_hex(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(
            ContentHash::from_bytes(b"WIDTH=8"),
            ContentHash::from_bytes(b"WIDTH=8")
        );
        assert_ne!(
            ContentHash::from_bytes(b"WIDTH=8"),
            ContentHash::from_bytes(b"WIDTH=16")
        );
    }

    #[test]
    fn parts_are_separated() {
        let a = ContentHash::from_parts(["ab", "c"]);
        let b = ContentHash::from_parts(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn hex_forms() {
        let h = ContentHash::from_bytes(b"test");
        assert_eq!(format!("{h}").len(), 32);
        assert_eq!(h.short_hex().len(), 16);
        assert!(format!("{h}").starts_with(&h.short_hex()));
    }

    #[test]
    fn serde_roundtrip() {
        let h = ContentHash::from_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
