//! Packed four-state bit vectors for constant values.

use crate::logic::Logic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};

/// An LSB-first vector of [`Logic`] values packed two bits per value.
///
/// Index 0 is the least significant bit. Every constant flowing through
/// elaboration (literals, parameter values, folded results, attribute values)
/// is a `LogicVec` plus out-of-band signedness.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicVec {
    width: u32,
    /// Packed storage: 2 bits per logic value, 32 values per u64.
    data: Vec<u64>,
}

/// Number of logic values packed per u64 word.
const VALUES_PER_WORD: u32 = 32;

impl LogicVec {
    /// Creates a new `LogicVec` of the given width, initialized to all `Zero`.
    pub fn new(width: u32) -> Self {
        Self {
            width,
            data: vec![0; word_count(width)],
        }
    }

    /// Returns the number of logic values in this vector.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns true if the vector holds no bits.
    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// Gets the logic value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn get(&self, index: u32) -> Logic {
        assert!(
            index < self.width,
            "index {index} out of bounds for width {}",
            self.width
        );
        let word_idx = (index / VALUES_PER_WORD) as usize;
        let bit_offset = (index % VALUES_PER_WORD) * 2;
        match (self.data[word_idx] >> bit_offset) & 0b11 {
            0 => Logic::Zero,
            1 => Logic::One,
            2 => Logic::X,
            _ => Logic::Z,
        }
    }

    /// Sets the logic value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn set(&mut self, index: u32, value: Logic) {
        assert!(
            index < self.width,
            "index {index} out of bounds for width {}",
            self.width
        );
        let word_idx = (index / VALUES_PER_WORD) as usize;
        let bit_offset = (index % VALUES_PER_WORD) * 2;
        let mask = !(0b11u64 << bit_offset);
        self.data[word_idx] = (self.data[word_idx] & mask) | ((value as u64) << bit_offset);
    }

    /// Appends a bit above the current most significant bit.
    pub fn push(&mut self, value: Logic) {
        self.width += 1;
        if self.data.len() < word_count(self.width) {
            self.data.push(0);
        }
        self.set(self.width - 1, value);
    }

    /// Creates a vector with every bit set to `value`.
    pub fn filled(width: u32, value: Logic) -> Self {
        let mut v = Self::new(width);
        if value != Logic::Zero {
            for i in 0..width {
                v.set(i, value);
            }
        }
        v
    }

    /// Creates a `LogicVec` with all bits set to `Zero`.
    pub fn all_zero(width: u32) -> Self {
        Self::new(width)
    }

    /// Creates a `LogicVec` with all bits set to `One`.
    pub fn all_one(width: u32) -> Self {
        Self::filled(width, Logic::One)
    }

    /// Creates a `LogicVec` with all bits set to `X`.
    pub fn all_x(width: u32) -> Self {
        Self::filled(width, Logic::X)
    }

    /// Creates a single-bit `LogicVec` from a boolean value.
    pub fn from_bool(value: bool) -> Self {
        Self::filled(1, Logic::from_bool(value))
    }

    /// Creates a `LogicVec` from a `u64` value with the given width.
    ///
    /// Bits beyond the given width are ignored; bits beyond 64 are zero.
    pub fn from_u64(value: u64, width: u32) -> Self {
        let mut v = Self::new(width);
        for i in 0..width.min(64) {
            if (value >> i) & 1 != 0 {
                v.set(i, Logic::One);
            }
        }
        v
    }

    /// Creates a two's complement `LogicVec` from an `i64`, sign-extending
    /// past bit 63.
    pub fn from_i64(value: i64, width: u32) -> Self {
        let mut v = Self::new(width);
        for i in 0..width {
            let bit = if i < 64 { (value >> i) & 1 != 0 } else { value < 0 };
            if bit {
                v.set(i, Logic::One);
            }
        }
        v
    }

    /// Builds a vector from LSB-first bits.
    pub fn from_bits(bits: &[Logic]) -> Self {
        bits.iter().copied().collect()
    }

    /// Returns the bits LSB first.
    pub fn to_bits(&self) -> Vec<Logic> {
        self.iter().collect()
    }

    /// Iterates over the bits, LSB first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Logic> + '_ {
        (0..self.width).map(move |i| self.get(i))
    }

    /// Converts the `LogicVec` to a `u64`, if all bits are definite (0 or 1).
    ///
    /// Returns `None` if the vector contains X or Z values, or if a set bit
    /// lies beyond bit 63.
    pub fn to_u64(&self) -> Option<u64> {
        let mut result = 0u64;
        for i in 0..self.width {
            match self.get(i) {
                Logic::Zero => {}
                Logic::One if i < 64 => result |= 1 << i,
                _ => return None,
            }
        }
        Some(result)
    }

    /// Interprets the low 32 bits as an integer; unknown bits read as zero.
    ///
    /// When `signed` is set and the vector is narrower than 32 bits, the most
    /// significant bit is sign-extended.
    pub fn as_int(&self, signed: bool) -> i32 {
        let mut value: u32 = 0;
        for i in 0..self.width.min(32) {
            if self.get(i) == Logic::One {
                value |= 1 << i;
            }
        }
        if signed && self.width > 0 && self.width < 32 && self.get(self.width - 1) == Logic::One {
            value |= u32::MAX << self.width;
        }
        value as i32
    }

    /// True if any bit is `One`.
    pub fn as_bool(&self) -> bool {
        self.iter().any(|b| b == Logic::One)
    }

    /// Returns true if all bits are `Logic::Zero`.
    pub fn is_all_zero(&self) -> bool {
        self.iter().all(|b| b == Logic::Zero)
    }

    /// Returns true if all bits are `Logic::One`.
    pub fn is_all_one(&self) -> bool {
        self.iter().all(|b| b == Logic::One)
    }

    /// Returns true if no bit is `X` or `Z`.
    pub fn is_fully_def(&self) -> bool {
        self.iter().all(Logic::is_definite)
    }

    /// Number of bits equal to `One`.
    pub fn count_ones(&self) -> u32 {
        self.iter().filter(|b| *b == Logic::One).count() as u32
    }

    /// The most significant bit, or `Zero` for an empty vector.
    pub fn msb(&self) -> Logic {
        if self.width == 0 {
            Logic::Zero
        } else {
            self.get(self.width - 1)
        }
    }

    /// Returns a copy truncated or extended to `width`.
    ///
    /// Extension replicates the most significant bit when `signed` is set and
    /// fills with zeros otherwise.
    pub fn resized(&self, width: u32, signed: bool) -> Self {
        let fill = if signed { self.msb() } else { Logic::Zero };
        self.extended_with(width, fill)
    }

    /// Returns a copy truncated to `width` or extended with `fill`.
    pub fn extended_with(&self, width: u32, fill: Logic) -> Self {
        (0..width)
            .map(|i| if i < self.width { self.get(i) } else { fill })
            .collect()
    }

    /// Extracts `len` bits starting at `offset`; positions past the end read as `X`.
    pub fn slice(&self, offset: u32, len: u32) -> Self {
        (0..len)
            .map(|i| {
                let idx = offset.saturating_add(i);
                if idx < self.width {
                    self.get(idx)
                } else {
                    Logic::X
                }
            })
            .collect()
    }

    /// Concatenates `parts` given most significant part first.
    pub fn concat(parts: &[&LogicVec]) -> Self {
        let mut out = LogicVec::new(0);
        for part in parts.iter().rev() {
            for bit in part.iter() {
                out.push(bit);
            }
        }
        out
    }

    /// Repeats the vector `count` times.
    pub fn repeat(&self, count: u32) -> Self {
        let mut out = LogicVec::new(0);
        for _ in 0..count {
            for bit in self.iter() {
                out.push(bit);
            }
        }
        out
    }

    /// Encodes a string as 8 bits per character, first character most significant.
    pub fn from_string_bytes(s: &str) -> Self {
        let mut out = LogicVec::new(0);
        for byte in s.bytes().rev() {
            for i in 0..8 {
                out.push(Logic::from_bool((byte >> i) & 1 != 0));
            }
        }
        out
    }

    /// Decodes 8-bit characters from the vector, dropping NUL bytes.
    pub fn decode_string(&self) -> String {
        let mut bytes = Vec::new();
        let n = self.width.div_ceil(8);
        for chunk in (0..n).rev() {
            let mut byte = 0u8;
            for i in 0..8 {
                let idx = chunk * 8 + i;
                if idx < self.width && self.get(idx) == Logic::One {
                    byte |= 1 << i;
                }
            }
            if byte != 0 {
                bytes.push(byte);
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Parses a binary string like `"10xz"` into a `LogicVec`.
    ///
    /// The leftmost character is the most significant bit (highest index).
    /// Returns `None` if the string contains invalid characters.
    pub fn from_binary_str(s: &str) -> Option<Self> {
        let mut v = Self::new(s.len() as u32);
        for (i, c) in s.chars().rev().enumerate() {
            v.set(i as u32, Logic::from_char(c)?);
        }
        Some(v)
    }

    /// Parses a hex string into a `LogicVec`, 4 bits per digit.
    ///
    /// `x` and `z` digits expand to four unknown or floating bits.
    pub fn from_hex_str(s: &str) -> Option<Self> {
        let mut v = Self::new((s.len() as u32) * 4);
        for (hex_idx, c) in s.chars().rev().enumerate() {
            let base = (hex_idx as u32) * 4;
            if let Some(nibble) = c.to_digit(16) {
                for bit in 0..4 {
                    v.set(base + bit, Logic::from_bool(nibble & (1 << bit) != 0));
                }
            } else {
                let fill = match c {
                    'x' | 'X' => Logic::X,
                    'z' | 'Z' | '?' => Logic::Z,
                    _ => return None,
                };
                for bit in 0..4 {
                    v.set(base + bit, fill);
                }
            }
        }
        Some(v)
    }
}

impl FromIterator<Logic> for LogicVec {
    fn from_iter<I: IntoIterator<Item = Logic>>(iter: I) -> Self {
        let mut v = LogicVec::new(0);
        for bit in iter {
            v.push(bit);
        }
        v
    }
}

impl fmt::Display for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.iter().rev() {
            write!(f, "{bit}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'{self}", self.width)
    }
}

impl BitAnd for &LogicVec {
    type Output = LogicVec;

    fn bitand(self, rhs: Self) -> LogicVec {
        assert_eq!(self.width, rhs.width, "LogicVec width mismatch in AND");
        self.iter().zip(rhs.iter()).map(|(a, b)| a & b).collect()
    }
}

impl BitOr for &LogicVec {
    type Output = LogicVec;

    fn bitor(self, rhs: Self) -> LogicVec {
        assert_eq!(self.width, rhs.width, "LogicVec width mismatch in OR");
        self.iter().zip(rhs.iter()).map(|(a, b)| a | b).collect()
    }
}

impl BitXor for &LogicVec {
    type Output = LogicVec;

    fn bitxor(self, rhs: Self) -> LogicVec {
        assert_eq!(self.width, rhs.width, "LogicVec width mismatch in XOR");
        self.iter().zip(rhs.iter()).map(|(a, b)| a ^ b).collect()
    }
}

impl Not for &LogicVec {
    type Output = LogicVec;

    fn not(self) -> LogicVec {
        self.iter().map(|b| !b).collect()
    }
}

/// Returns the number of u64 words needed to store `width` logic values.
fn word_count(width: u32) -> usize {
    width.div_ceil(VALUES_PER_WORD) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(s: &str) -> LogicVec {
        LogicVec::from_binary_str(s).unwrap()
    }

    #[test]
    fn set_get_roundtrip() {
        let mut v = LogicVec::new(4);
        v.set(1, Logic::One);
        v.set(2, Logic::X);
        v.set(3, Logic::Z);
        assert_eq!(v.get(0), Logic::Zero);
        assert_eq!(v.get(1), Logic::One);
        assert_eq!(v.get(2), Logic::X);
        assert_eq!(v.get(3), Logic::Z);
    }

    #[test]
    fn push_crosses_word_boundary() {
        let mut v = LogicVec::new(31);
        v.push(Logic::One);
        v.push(Logic::X);
        assert_eq!(v.width(), 33);
        assert_eq!(v.get(31), Logic::One);
        assert_eq!(v.get(32), Logic::X);
    }

    #[test]
    fn from_binary_str_msb_first() {
        let v = bin("10xz");
        assert_eq!(v.get(3), Logic::One);
        assert_eq!(v.get(0), Logic::Z);
        assert!(LogicVec::from_binary_str("10a1").is_none());
    }

    #[test]
    fn from_hex_str_with_unknowns() {
        assert_eq!(format!("{}", LogicVec::from_hex_str("a5").unwrap()), "10100101");
        assert_eq!(format!("{}", LogicVec::from_hex_str("1x").unwrap()), "0001xxxx");
        assert!(LogicVec::from_hex_str("g").is_none());
    }

    #[test]
    fn signed_conversions() {
        let v = LogicVec::from_i64(-2, 4);
        assert_eq!(format!("{v}"), "1110");
        assert_eq!(v.as_int(true), -2);
        assert_eq!(v.as_int(false), 14);
        assert_eq!(LogicVec::from_i64(-1, 70).count_ones(), 70);
    }

    #[test]
    fn resize_sign_and_zero_extension() {
        let v = bin("101");
        assert_eq!(format!("{}", v.resized(5, true)), "11101");
        assert_eq!(format!("{}", v.resized(5, false)), "00101");
        assert_eq!(format!("{}", v.resized(2, true)), "01");
        assert_eq!(format!("{}", bin("x1").extended_with(4, Logic::X)), "xxx1");
    }

    #[test]
    fn slice_and_concat() {
        let v = bin("110010");
        assert_eq!(format!("{}", v.slice(1, 3)), "001");
        assert_eq!(format!("{}", v.slice(4, 4)), "xx11");
        let c = LogicVec::concat(&[&bin("10"), &bin("011")]);
        assert_eq!(format!("{c}"), "10011");
        assert_eq!(format!("{}", bin("10").repeat(3)), "101010");
    }

    #[test]
    fn to_u64_rejects_unknown() {
        assert_eq!(bin("1010").to_u64(), Some(10));
        assert_eq!(bin("1x10").to_u64(), None);
    }

    #[test]
    fn string_encoding() {
        let v = LogicVec::from_string_bytes("AB");
        assert_eq!(v.width(), 16);
        assert_eq!(v.to_u64(), Some(0x4142));
        assert_eq!(v.resized(24, false).decode_string(), "AB");
    }

    #[test]
    fn bitwise_ops() {
        let a = bin("1100");
        let b = bin("1010");
        assert_eq!(format!("{}", &a & &b), "1000");
        assert_eq!(format!("{}", &a | &b), "1110");
        assert_eq!(format!("{}", &a ^ &b), "0110");
        assert_eq!(format!("{}", !&bin("10xz")), "01xx");
    }

    #[test]
    fn bool_and_definedness() {
        assert!(bin("0x1").as_bool());
        assert!(!bin("0x0").as_bool());
        assert!(!bin("0x0").is_fully_def());
        assert!(bin("0100").is_fully_def());
    }

    #[test]
    fn serde_roundtrip() {
        let v = bin("10xz1010");
        let json = serde_json::to_string(&v).unwrap();
        let back: LogicVec = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
