//! Constant values for parameters and attributes.
//!
//! [`ConstValue`] is what a parameter binding or an attribute carries once its
//! expression has been folded.

use crate::logic_vec::LogicVec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A folded compile-time constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    /// A bit vector with its signedness.
    Bits {
        /// The bit pattern.
        value: LogicVec,
        /// Whether the value is interpreted as signed.
        signed: bool,
    },
    /// A string literal.
    String(String),
    /// A real value.
    Real(f64),
}

impl ConstValue {
    /// An unsigned bit-vector constant.
    pub fn bits(value: LogicVec) -> Self {
        ConstValue::Bits {
            value,
            signed: false,
        }
    }

    /// A signed 32-bit integer constant.
    pub fn int(value: i32) -> Self {
        ConstValue::Bits {
            value: LogicVec::from_i64(i64::from(value), 32),
            signed: true,
        }
    }

    /// The bit pattern of this value. Strings use eight bits per character
    /// and reals are rounded to a 64-bit integer.
    pub fn to_logic_vec(&self) -> LogicVec {
        match self {
            ConstValue::Bits { value, .. } => value.clone(),
            ConstValue::String(s) => LogicVec::from_string_bytes(s),
            ConstValue::Real(r) => crate::calc::from_real(*r, 64),
        }
    }

    /// True for signed bit vectors.
    pub fn is_signed(&self) -> bool {
        matches!(self, ConstValue::Bits { signed: true, .. })
    }

    /// The value as a boolean: any `1` bit for vectors, non-empty for strings.
    pub fn as_bool(&self) -> bool {
        match self {
            ConstValue::Bits { value, .. } => value.as_bool(),
            ConstValue::String(s) => !s.is_empty(),
            ConstValue::Real(r) => *r != 0.0,
        }
    }
}

impl fmt::Display for ConstValue {
    /// Formats vectors as `<width>'<bits>`, strings quoted, reals with six
    /// fractional digits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bits { value, .. } => write!(f, "{}'{}", value.width(), value),
            ConstValue::String(s) => write!(f, "\"{s}\""),
            ConstValue::Real(r) => write!(f, "{r:.6}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(ConstValue::bits(LogicVec::from_u64(8, 8)).to_string(), "8'00001000");
        assert_eq!(ConstValue::String("abc".into()).to_string(), "\"abc\"");
        assert_eq!(ConstValue::Real(1.5).to_string(), "1.500000");
    }

    #[test]
    fn int_is_signed_32_bits() {
        let v = ConstValue::int(-1);
        assert!(v.is_signed());
        assert_eq!(v.to_logic_vec().width(), 32);
        assert!(v.to_logic_vec().is_all_one());
    }

    #[test]
    fn serde_roundtrip() {
        let vals = vec![
            ConstValue::int(42),
            ConstValue::Real(9.81),
            ConstValue::String("test".to_string()),
        ];
        for val in vals {
            let json = serde_json::to_string(&val).unwrap();
            let restored: ConstValue = serde_json::from_str(&json).unwrap();
            assert_eq!(val, restored);
        }
    }
}
