//! Structured diagnostic codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a diagnostic code, shown as its prefix letter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Fatal problems, prefixed with `E`.
    Error,
    /// Suspicious but legal constructs, prefixed with `W`.
    Warning,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Error => 'E',
            Category::Warning => 'W',
        }
    }
}

/// A category plus a number, displayed as e.g. `E301` or `W304`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }

    /// Shorthand for an `E` code.
    pub const fn error(number: u16) -> Self {
        Self::new(Category::Error, number)
    }

    /// Shorthand for a `W` code.
    pub const fn warning(number: u16) -> Self {
        Self::new(Category::Warning, number)
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", DiagnosticCode::error(301)), "E301");
        assert_eq!(format!("{}", DiagnosticCode::warning(7)), "W007");
    }

    #[test]
    fn shorthands_match_new() {
        assert_eq!(
            DiagnosticCode::warning(304),
            DiagnosticCode::new(Category::Warning, 304)
        );
    }

    #[test]
    fn serde_roundtrip() {
        let code = DiagnosticCode::error(312);
        let json = serde_json::to_string(&code).unwrap();
        let back: DiagnosticCode = serde_json::from_str(&json).unwrap();
        assert_eq!(code, back);
    }
}
