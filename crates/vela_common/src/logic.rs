//! Four-state bit values used by elaboration-time constants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// A single bit of a constant: driven low, driven high, unknown, or floating.
///
/// The ordering of the discriminants is relied upon by the packed storage in
/// [`LogicVec`](crate::LogicVec).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum Logic {
    /// Driven low.
    Zero = 0,
    /// Driven high.
    One = 1,
    /// Unknown value.
    X = 2,
    /// High impedance.
    Z = 3,
}

impl Logic {
    /// Parses one literal digit: `0`, `1`, `x`/`X`, `z`/`Z` or `?` (same as `z`).
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Logic::Zero),
            '1' => Some(Logic::One),
            'x' | 'X' => Some(Logic::X),
            'z' | 'Z' | '?' => Some(Logic::Z),
            _ => None,
        }
    }

    /// Maps `true` to [`Logic::One`] and `false` to [`Logic::Zero`].
    pub fn from_bool(value: bool) -> Self {
        if value {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// Returns true for `Zero` and `One`.
    pub fn is_definite(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }

    /// Returns the lowercase literal digit for this value.
    pub fn to_char(self) -> char {
        match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'x',
            Logic::Z => 'z',
        }
    }

    /// Equality under case-equality semantics where `x` and `z` only match
    /// themselves.
    pub fn case_eq(self, other: Logic) -> bool {
        self == other
    }

    /// Wildcard equality used by `casez`: a `z` on either side matches anything.
    pub fn matches_casez(self, other: Logic) -> bool {
        self == Logic::Z || other == Logic::Z || self == other
    }

    /// Wildcard equality used by `casex`: an `x` or `z` on either side matches anything.
    pub fn matches_casex(self, other: Logic) -> bool {
        !self.is_definite() || !other.is_definite() || self == other
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

impl BitAnd for Logic {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        use Logic::*;
        match (self, rhs) {
            (Zero, _) | (_, Zero) => Zero,
            (One, One) => One,
            _ => X,
        }
    }
}

impl BitOr for Logic {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        use Logic::*;
        match (self, rhs) {
            (One, _) | (_, One) => One,
            (Zero, Zero) => Zero,
            _ => X,
        }
    }
}

impl BitXor for Logic {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        use Logic::*;
        match (self, rhs) {
            (Zero, Zero) | (One, One) => Zero,
            (Zero, One) | (One, Zero) => One,
            _ => X,
        }
    }
}

impl Not for Logic {
    type Output = Self;

    fn not(self) -> Self {
        use Logic::*;
        match self {
            Zero => One,
            One => Zero,
            X | Z => X,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Logic::*;
    use super::*;

    #[test]
    fn and_dominated_by_zero() {
        for v in [Zero, One, X, Z] {
            assert_eq!(Zero & v, Zero);
            assert_eq!(v & Zero, Zero);
        }
        assert_eq!(One & One, One);
        assert_eq!(One & Z, X);
        assert_eq!(X & X, X);
    }

    #[test]
    fn or_dominated_by_one() {
        for v in [Zero, One, X, Z] {
            assert_eq!(One | v, One);
            assert_eq!(v | One, One);
        }
        assert_eq!(Zero | Zero, Zero);
        assert_eq!(Zero | Z, X);
    }

    #[test]
    fn xor_unknown_propagates() {
        assert_eq!(Zero ^ One, One);
        assert_eq!(One ^ One, Zero);
        assert_eq!(X ^ Zero, X);
        assert_eq!(Z ^ One, X);
    }

    #[test]
    fn not_values() {
        assert_eq!(!Zero, One);
        assert_eq!(!One, Zero);
        assert_eq!(!X, X);
        assert_eq!(!Z, X);
    }

    #[test]
    fn char_roundtrip() {
        for v in [Zero, One, X, Z] {
            assert_eq!(Logic::from_char(v.to_char()), Some(v));
        }
        assert_eq!(Logic::from_char('?'), Some(Z));
        assert_eq!(Logic::from_char('2'), None);
    }

    #[test]
    fn wildcard_matching() {
        assert!(Z.matches_casez(One));
        assert!(!X.matches_casez(One));
        assert!(X.matches_casex(Zero));
        assert!(!Zero.matches_casex(One));
        assert!(X.case_eq(X));
        assert!(!X.case_eq(Z));
    }
}
