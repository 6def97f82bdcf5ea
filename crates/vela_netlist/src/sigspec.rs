//! Bit-level signal vectors.
//!
//! A [`SigSpec`] is a sequence of [`SigBit`]s, least significant first. Each
//! bit is either a bit of a wire or a constant.

use crate::ids::WireId;
use serde::{Deserialize, Serialize};
use vela_common::{Logic, LogicVec};

/// One bit of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigBit {
    /// Bit `offset` of `wire`.
    Wire {
        /// The wire.
        wire: WireId,
        /// Bit position inside the wire, from its least significant bit.
        offset: u32,
    },
    /// A constant bit.
    Const(Logic),
}

impl SigBit {
    /// True for constant bits.
    pub fn is_const(self) -> bool {
        matches!(self, SigBit::Const(_))
    }
}

/// A vector of signal bits, least significant first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SigSpec {
    bits: Vec<SigBit>,
}

impl SigSpec {
    /// The empty signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// All `width` bits of `wire`.
    pub fn wire(wire: WireId, width: u32) -> Self {
        Self::wire_slice(wire, 0, width)
    }

    /// `width` bits of `wire` starting at `offset`.
    pub fn wire_slice(wire: WireId, offset: u32, width: u32) -> Self {
        Self {
            bits: (offset..offset + width)
                .map(|offset| SigBit::Wire { wire, offset })
                .collect(),
        }
    }

    /// A constant signal.
    pub fn constant(value: &LogicVec) -> Self {
        Self {
            bits: value.iter().map(SigBit::Const).collect(),
        }
    }

    /// `width` copies of `bit`.
    pub fn repeat_bit(bit: SigBit, width: u32) -> Self {
        Self {
            bits: vec![bit; width as usize],
        }
    }

    /// Builds a signal from bits, least significant first.
    pub fn from_bits(bits: Vec<SigBit>) -> Self {
        Self { bits }
    }

    /// Number of bits.
    pub fn width(&self) -> u32 {
        self.bits.len() as u32
    }

    /// True for the zero-width signal.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The bits, least significant first.
    pub fn bits(&self) -> &[SigBit] {
        &self.bits
    }

    /// The most significant bit, if any.
    pub fn msb(&self) -> Option<SigBit> {
        self.bits.last().copied()
    }

    /// Appends `other` above the current most significant bit.
    pub fn append(&mut self, other: &SigSpec) {
        self.bits.extend_from_slice(&other.bits);
    }

    /// Appends one bit above the current most significant bit.
    pub fn push(&mut self, bit: SigBit) {
        self.bits.push(bit);
    }

    /// `len` bits starting at `offset`; positions past the end read as `x`.
    pub fn extract(&self, offset: u32, len: u32) -> SigSpec {
        Self {
            bits: (offset..offset.saturating_add(len))
                .map(|i| {
                    self.bits
                        .get(i as usize)
                        .copied()
                        .unwrap_or(SigBit::Const(Logic::X))
                })
                .collect(),
        }
    }

    /// Truncates or extends to `width`, replicating the top bit when
    /// `signed` and padding with zeros otherwise.
    pub fn extend_u0(&mut self, width: u32, signed: bool) {
        let width = width as usize;
        if self.bits.len() > width {
            self.bits.truncate(width);
            return;
        }
        let fill = match (signed, self.bits.last()) {
            (true, Some(&bit)) => bit,
            _ => SigBit::Const(Logic::Zero),
        };
        self.bits.resize(width, fill);
    }

    /// `count` concatenated copies of this signal.
    pub fn repeat(&self, count: u32) -> SigSpec {
        let mut out = SigSpec::new();
        for _ in 0..count {
            out.append(self);
        }
        out
    }

    /// True if every bit is a constant.
    pub fn is_fully_const(&self) -> bool {
        self.bits.iter().all(|b| b.is_const())
    }

    /// The value if every bit is a constant.
    pub fn as_const(&self) -> Option<LogicVec> {
        self.bits
            .iter()
            .map(|b| match b {
                SigBit::Const(v) => Some(*v),
                SigBit::Wire { .. } => None,
            })
            .collect::<Option<Vec<Logic>>>()
            .map(|bits| LogicVec::from_bits(&bits))
    }

    /// Replaces every bit that occurs in `pattern` by the bit at the same
    /// position of `with`.
    pub fn replace(&mut self, pattern: &SigSpec, with: &SigSpec) {
        for bit in &mut self.bits {
            if bit.is_const() {
                continue;
            }
            if let Some(pos) = pattern.bits.iter().position(|p| p == bit) {
                if let Some(&new) = with.bits.get(pos) {
                    *bit = new;
                }
            }
        }
    }

    /// The wires this signal touches, in order of first appearance.
    pub fn wires(&self) -> Vec<WireId> {
        let mut out = Vec::new();
        for bit in &self.bits {
            if let SigBit::Wire { wire, .. } = bit {
                if !out.contains(wire) {
                    out.push(*wire);
                }
            }
        }
        out
    }
}

impl FromIterator<SigBit> for SigSpec {
    fn from_iter<T: IntoIterator<Item = SigBit>>(iter: T) -> Self {
        Self {
            bits: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(raw: u32) -> WireId {
        WireId::from_raw(raw)
    }

    #[test]
    fn extract_pads_with_x() {
        let sig = SigSpec::wire(w(0), 4);
        let part = sig.extract(2, 4);
        assert_eq!(part.width(), 4);
        assert_eq!(part.bits()[0], SigBit::Wire { wire: w(0), offset: 2 });
        assert_eq!(part.bits()[3], SigBit::Const(Logic::X));
    }

    #[test]
    fn extension_rules() {
        let mut s = SigSpec::wire(w(1), 2);
        s.extend_u0(4, true);
        assert_eq!(s.bits()[3], SigBit::Wire { wire: w(1), offset: 1 });
        let mut u = SigSpec::wire(w(1), 2);
        u.extend_u0(4, false);
        assert_eq!(u.bits()[3], SigBit::Const(Logic::Zero));
        u.extend_u0(1, false);
        assert_eq!(u.width(), 1);
    }

    #[test]
    fn const_detection() {
        let c = SigSpec::constant(&LogicVec::from_u64(5, 3));
        assert_eq!(c.as_const(), Some(LogicVec::from_u64(5, 3)));
        let mut mixed = c.clone();
        mixed.append(&SigSpec::wire(w(0), 1));
        assert!(mixed.as_const().is_none());
        assert_eq!(mixed.wires(), vec![w(0)]);
    }

    #[test]
    fn replace_substitutes_matching_bits() {
        let mut sig = SigSpec::wire(w(0), 2);
        sig.append(&SigSpec::wire(w(1), 1));
        let pattern = SigSpec::wire(w(1), 1);
        let with = SigSpec::constant(&LogicVec::from_u64(1, 1));
        sig.replace(&pattern, &with);
        assert_eq!(sig.bits()[2], SigBit::Const(Logic::One));
        assert_eq!(sig.bits()[0], SigBit::Wire { wire: w(0), offset: 0 });
    }
}
