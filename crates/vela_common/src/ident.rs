//! Interned netlist names.

use lasso::ThreadedRodeo;
use serde::{Deserialize, Serialize};

/// An interned name of a netlist object (module, wire, cell, port, parameter).
///
/// Names of user-visible objects are stored as written; names synthesized by
/// elaboration start with `$`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Ident(u32);

impl Ident {
    /// Creates an `Ident` from a raw index. Intended for tests.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this identifier.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

// SAFETY: `Ident` wraps a `u32` which is always a valid `usize` on 32-bit and
// 64-bit platforms. `try_from_usize` rejects values that don't fit in `u32`.
unsafe impl lasso::Key for Ident {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(Ident)
    }
}

/// Thread-safe string interner backed by [`lasso::ThreadedRodeo`].
pub struct Interner {
    rodeo: ThreadedRodeo<Ident>,
}

impl Interner {
    /// Creates a new empty interner.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Interns a string, returning its [`Ident`].
    pub fn get_or_intern(&self, s: &str) -> Ident {
        self.rodeo.get_or_intern(s)
    }

    /// Looks up a string without interning it.
    pub fn get(&self, s: &str) -> Option<Ident> {
        self.rodeo.get(s)
    }

    /// Resolves an [`Ident`] back to its string value.
    ///
    /// # Panics
    ///
    /// Panics if the `Ident` was not created by this interner.
    pub fn resolve(&self, ident: Ident) -> &str {
        self.rodeo.resolve(&ident)
    }

    /// True if the name was synthesized by elaboration (starts with `$`).
    pub fn is_internal(&self, ident: Ident) -> bool {
        self.resolve(ident).starts_with('$')
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    /// True if nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl std::fmt::Debug for Interner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interner").field("len", &self.len()).finish()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_resolve_roundtrip() {
        let interner = Interner::new();
        let id = interner.get_or_intern("clk");
        assert_eq!(interner.resolve(id), "clk");
        assert_eq!(interner.get_or_intern("clk"), id);
        assert_ne!(interner.get_or_intern("rst"), id);
    }

    #[test]
    fn lookup_without_interning() {
        let interner = Interner::new();
        assert_eq!(interner.get("q"), None);
        let q = interner.get_or_intern("q");
        assert_eq!(interner.get("q"), Some(q));
    }

    #[test]
    fn internal_names() {
        let interner = Interner::new();
        let a = interner.get_or_intern("$add$top.v:3$1");
        let b = interner.get_or_intern("data");
        assert!(interner.is_internal(a));
        assert!(!interner.is_internal(b));
    }

    #[test]
    fn serde_roundtrip() {
        let id = Ident(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: Ident = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
