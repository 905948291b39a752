//! Chirality: the ±1 orientation tag of an edge within a face, of a face
//! within an element, and of a punctured-face crossing.
//!
//! Chirality forms the two-element group C₂: composition is XOR of the
//! reversal bit and every element is its own inverse.

use core::ops::{BitXor, Neg};

/// Orientation of an entity relative to a canonical reference.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
pub enum Chirality {
    /// Opposite to the canonical reference (−1).
    Negative,
    /// Aligned with the canonical reference (+1).
    #[default]
    Positive,
}

impl Chirality {
    /// Integer sign, `+1` or `-1`.
    #[inline]
    pub const fn sign(self) -> i32 {
        match self {
            Chirality::Positive => 1,
            Chirality::Negative => -1,
        }
    }

    /// Map a signed integer to a chirality. Zero has no orientation.
    #[inline]
    pub const fn from_sign(sign: i32) -> Option<Self> {
        if sign > 0 {
            Some(Chirality::Positive)
        } else if sign < 0 {
            Some(Chirality::Negative)
        } else {
            None
        }
    }

    /// The opposite orientation.
    #[inline]
    pub const fn invert(self) -> Self {
        match self {
            Chirality::Positive => Chirality::Negative,
            Chirality::Negative => Chirality::Positive,
        }
    }

    #[inline]
    pub const fn is_positive(self) -> bool {
        matches!(self, Chirality::Positive)
    }
}

impl BitXor for Chirality {
    type Output = Chirality;

    /// Group composition: equal tags compose to `Positive`.
    #[inline]
    fn bitxor(self, rhs: Chirality) -> Chirality {
        if self == rhs {
            Chirality::Positive
        } else {
            Chirality::Negative
        }
    }
}

impl Neg for Chirality {
    type Output = Chirality;
    #[inline]
    fn neg(self) -> Chirality {
        self.invert()
    }
}

impl From<bool> for Chirality {
    /// `true` is the set high bit of a packed wire field, i.e. `Positive`.
    #[inline]
    fn from(positive: bool) -> Self {
        if positive {
            Chirality::Positive
        } else {
            Chirality::Negative
        }
    }
}

impl From<Chirality> for bool {
    #[inline]
    fn from(c: Chirality) -> bool {
        c.is_positive()
    }
}

#[cfg(test)]
mod tests {
    use super::Chirality::{Negative as N, Positive as P};
    use super::*;

    #[test]
    fn group_ops() {
        assert_eq!(P ^ P, P);
        assert_eq!(P ^ N, N);
        assert_eq!(N ^ P, N);
        assert_eq!(N ^ N, P);
        assert_eq!(-P, N);
        assert_eq!(N.invert(), P);
    }

    #[test]
    fn sign_roundtrip() {
        assert_eq!(P.sign(), 1);
        assert_eq!(N.sign(), -1);
        assert_eq!(Chirality::from_sign(7), Some(P));
        assert_eq!(Chirality::from_sign(-2), Some(N));
        assert_eq!(Chirality::from_sign(0), None);
        assert_eq!(Chirality::from(true), P);
        assert!(!bool::from(N));
    }

    #[test]
    fn serde_roundtrip() {
        let j = serde_json::to_string(&N).unwrap();
        assert!(j.contains("Negative"));
        assert_eq!(serde_json::from_str::<Chirality>(&j).unwrap(), N);
    }
}
