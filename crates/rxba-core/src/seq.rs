//! Modular arithmetic over the 12-bit MAC sequence number space.

use core::fmt;

use crate::{RxbaError, RxbaResult, HALF_SEQ_SPACE, SEQ_MASK, SEQ_MODULO};

/// A sequence number in `[0, 4095]`.
///
/// Deliberately not `Ord`: on a circular space "less than" only has meaning
/// relative to a reference point, see [`SeqNum::in_future_half`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqNum(u16);

impl SeqNum {
    pub fn new(raw: u16) -> RxbaResult<Self> {
        if raw < SEQ_MODULO {
            Ok(Self(raw))
        } else {
            Err(RxbaError::InvalidSequence)
        }
    }

    /// Keeps the low 12 bits, as when lifting the field out of a
    /// sequence-control word.
    pub const fn from_masked(raw: u16) -> Self {
        Self(raw & SEQ_MASK)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    pub const fn advance(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n) & SEQ_MASK)
    }

    pub const fn retreat(self, n: u16) -> Self {
        Self(self.0.wrapping_sub(n) & SEQ_MASK)
    }

    /// `(self - other) mod 4096`.
    pub const fn distance(self, other: SeqNum) -> u16 {
        self.0.wrapping_sub(other.0) & SEQ_MASK
    }

    /// True iff `self` lies in `[reference, reference + 2047]`.
    pub const fn in_future_half(self, reference: SeqNum) -> bool {
        self.distance(reference) < HALF_SEQ_SPACE
    }

    /// True iff `self` lies in `[start, start + len - 1]` circularly.
    pub const fn within(self, start: SeqNum, len: u16) -> bool {
        self.distance(start) < len
    }

    /// True iff `self` is ahead of `reference` by 1..=2047.
    pub const fn is_after(self, reference: SeqNum) -> bool {
        self.0 != reference.0 && self.in_future_half(reference)
    }
}

impl TryFrom<u16> for SeqNum {
    type Error = RxbaError;

    fn try_from(raw: u16) -> RxbaResult<Self> {
        Self::new(raw)
    }
}

impl From<SeqNum> for u16 {
    fn from(seq: SeqNum) -> u16 {
        seq.0
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
