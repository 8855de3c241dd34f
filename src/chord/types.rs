use crate::error::ConfigError;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Identifier is a position on the Chord ring.
///
/// The value is always reduced into the `IdSpace` it was created from.
/// Comparisons only look at the integer value; the ring width is carried by
/// the `IdSpace` that produced it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(u64);

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_be_bytes()))
    }
}

impl Identifier {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// True iff `self` lies strictly inside the clockwise arc `(lower, upper)`.
    /// `lower == upper` denotes the whole ring except that single point.
    pub fn is_between(&self, lower: &Identifier, upper: &Identifier) -> bool {
        let (id, lo, hi) = (self.0, lower.0, upper.0);
        match lo.cmp(&hi) {
            Ordering::Less => lo < id && id < hi,
            Ordering::Greater => id > lo || id < hi,
            Ordering::Equal => id != lo,
        }
    }

    /// True iff `self` lies in the clockwise arc `(lower, upper]`.
    /// `lower == upper` covers the whole ring.
    pub fn is_between_right_inclusive(&self, lower: &Identifier, upper: &Identifier) -> bool {
        self == upper || self.is_between(lower, upper)
    }
}

/// The identifier space `0 .. 2^bits`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdSpace {
    bits: u32,
}

impl IdSpace {
    pub const MAX_BITS: u32 = 64;

    pub fn new(bits: u32) -> Result<Self, ConfigError> {
        if bits == 0 || bits > Self::MAX_BITS {
            return Err(ConfigError::Invalid(format!(
                "ring width must be between 1 and {} bits, got {}",
                Self::MAX_BITS,
                bits
            )));
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of finger table entries for this ring.
    pub fn finger_count(&self) -> usize {
        self.bits as usize
    }

    fn mask(&self) -> u64 {
        if self.bits == Self::MAX_BITS {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// Hashes a name onto the ring. Keys and node names share the same space.
    pub fn identifier_of(&self, name: &str) -> Identifier {
        let digest = Sha256::digest(name.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Identifier(u64::from_be_bytes(prefix) >> (Self::MAX_BITS - self.bits))
    }

    /// Builds an identifier from a raw value, rejecting values outside the ring.
    pub fn identifier(&self, value: u64) -> Option<Identifier> {
        (value & !self.mask() == 0).then_some(Identifier(value))
    }

    /// Clockwise distance from `from` to `to`.
    pub fn distance(&self, from: &Identifier, to: &Identifier) -> u64 {
        to.0.wrapping_sub(from.0) & self.mask()
    }

    /// Start of the `index`th finger interval: `id + 2^index mod 2^bits`.
    pub fn finger_start(&self, id: &Identifier, index: usize) -> Identifier {
        Identifier(id.0.wrapping_add(1u64 << index) & self.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: u64) -> Identifier {
        Identifier(value)
    }

    #[test]
    fn between_without_wraparound() {
        assert!(id(20).is_between(&id(10), &id(40)));
        assert!(!id(10).is_between(&id(10), &id(40)));
        assert!(!id(40).is_between(&id(10), &id(40)));
        assert!(!id(50).is_between(&id(10), &id(40)));
    }

    #[test]
    fn between_with_wraparound() {
        assert!(id(250).is_between(&id(200), &id(10)));
        assert!(id(5).is_between(&id(200), &id(10)));
        assert!(id(0).is_between(&id(200), &id(10)));
        assert!(!id(10).is_between(&id(200), &id(10)));
        assert!(!id(100).is_between(&id(200), &id(10)));
    }

    #[test]
    fn between_equal_bounds_is_ring_minus_point() {
        assert!(id(0).is_between(&id(7), &id(7)));
        assert!(id(255).is_between(&id(7), &id(7)));
        assert!(!id(7).is_between(&id(7), &id(7)));
        assert!(id(7).is_between_right_inclusive(&id(7), &id(7)));
    }

    #[test]
    fn right_inclusive_includes_upper_only() {
        assert!(id(40).is_between_right_inclusive(&id(10), &id(40)));
        assert!(!id(10).is_between_right_inclusive(&id(10), &id(40)));
        assert!(id(10).is_between_right_inclusive(&id(70), &id(10)));
    }

    #[test]
    fn distance_wraps_around() {
        let space = IdSpace::new(8).unwrap();
        assert_eq!(space.distance(&id(10), &id(40)), 30);
        assert_eq!(space.distance(&id(250), &id(4)), 10);
        assert_eq!(space.distance(&id(9), &id(9)), 0);
    }

    #[test]
    fn finger_start_wraps_around() {
        let space = IdSpace::new(8).unwrap();
        assert_eq!(space.finger_start(&id(10), 0), id(11));
        assert_eq!(space.finger_start(&id(10), 7), id(138));
        assert_eq!(space.finger_start(&id(200), 7), id(72));

        let full = IdSpace::new(64).unwrap();
        assert_eq!(full.finger_start(&id(u64::MAX), 0), id(0));
    }

    #[test]
    fn names_hash_deterministically_into_the_ring() {
        let space = IdSpace::new(8).unwrap();
        let a = space.identifier_of("alice");
        assert_eq!(a, space.identifier_of("alice"));
        assert!(a.value() < 256);
        assert!(space.identifier(a.value()).is_some());
        assert!(space.identifier(256).is_none());
    }

    #[test]
    fn rejects_invalid_widths() {
        assert!(IdSpace::new(0).is_err());
        assert!(IdSpace::new(65).is_err());
        assert!(IdSpace::new(64).is_ok());
    }
}
