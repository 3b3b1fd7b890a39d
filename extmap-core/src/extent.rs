//! Extents and the relation between two of them.
//!
//! An extent maps the physical blocks `[physical, physical + length)` one-to-one, in
//! order, onto the logical blocks `[logical, logical + length)`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp;
use std::fmt;

/// A contiguous run of blocks mapped between physical and logical address spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent {
    /// First physical block
    pub physical: u64,
    /// First logical block
    pub logical: u64,
    /// Number of blocks
    pub length: u64,
    /// Opaque payload, carried along but never compared
    pub user_data: u64,
}

impl Extent {
    pub fn new(physical: u64, logical: u64, length: u64) -> Self {
        Self {
            physical,
            logical,
            length,
            user_data: 0,
        }
    }

    /// Create an extent after checking that it is non-empty and does not overflow
    pub fn try_new(physical: u64, logical: u64, length: u64) -> Result<Self> {
        if length == 0 {
            return Err(Error::InvalidArgument("Extent length must be > 0".to_string()));
        }
        if physical.checked_add(length).is_none() {
            return Err(Error::Overflow(format!(
                "physical end of extent {}+{} exceeds u64",
                physical, length
            )));
        }
        if logical.checked_add(length).is_none() {
            return Err(Error::Overflow(format!(
                "logical end of extent {}+{} exceeds u64",
                logical, length
            )));
        }
        Ok(Self::new(physical, logical, length))
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    /// One past the last physical block
    pub fn physical_end(&self) -> u64 {
        self.physical + self.length
    }

    /// One past the last logical block
    pub fn logical_end(&self) -> u64 {
        self.logical + self.length
    }

    /// Whether `physical` falls inside this extent
    pub fn contains_physical(&self, physical: u64) -> bool {
        physical >= self.physical && physical < self.physical_end()
    }

    /// Whether both extents belong to the same linear mapping, i.e. they have the same
    /// logical-minus-physical offset
    pub fn same_offset(&self, other: &Extent) -> bool {
        self.logical.wrapping_sub(self.physical) == other.logical.wrapping_sub(other.physical)
    }

    /// Shift coordinates and length right by `block_size_log2` (zero for shifts of 64
    /// or more)
    pub fn shifted(&self, block_size_log2: u32) -> Extent {
        Extent {
            physical: self.physical.checked_shr(block_size_log2).unwrap_or(0),
            logical: self.logical.checked_shr(block_size_log2).unwrap_or(0),
            length: self.length.checked_shr(block_size_log2).unwrap_or(0),
            user_data: self.user_data,
        }
    }

    /// Relation of `self` to `other`, see [`classify`]
    pub fn relation(&self, other: &Extent) -> ExtentRelation {
        classify(self, other)
    }

    /// Matching intersection of `self` and `other`, see [`intersect`]
    pub fn intersect(&self, other: &Extent) -> Option<Extent> {
        intersect(self, other)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "physical={}..{} logical={}..{}",
            self.physical,
            self.physical_end(),
            self.logical,
            self.logical_end()
        )
    }
}

/// Relative position of two extents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentRelation {
    /// A ends at or before B starts and they are not one contiguous mapping
    Before,
    /// A ends exactly where B starts, physically and logically
    TouchingWithAOnLeft,
    /// B ends exactly where A starts, physically and logically
    TouchingWithBOnLeft,
    /// B ends at or before A starts and they are not one contiguous mapping
    After,
    /// The physical ranges overlap
    Intersecting,
}

impl ExtentRelation {
    pub fn is_touching(self) -> bool {
        matches!(
            self,
            ExtentRelation::TouchingWithAOnLeft | ExtentRelation::TouchingWithBOnLeft
        )
    }

    /// The same relation seen from the other extent
    pub fn reversed(self) -> ExtentRelation {
        match self {
            ExtentRelation::Before => ExtentRelation::After,
            ExtentRelation::TouchingWithAOnLeft => ExtentRelation::TouchingWithBOnLeft,
            ExtentRelation::TouchingWithBOnLeft => ExtentRelation::TouchingWithAOnLeft,
            ExtentRelation::After => ExtentRelation::Before,
            ExtentRelation::Intersecting => ExtentRelation::Intersecting,
        }
    }
}

/// Classify `a` against `b`.
///
/// Total for any argument order: `classify(b, a) == classify(a, b).reversed()`.
/// Touching requires contiguity in both address spaces; extents that are only
/// physically adjacent are `Before`/`After`.
pub fn classify(a: &Extent, b: &Extent) -> ExtentRelation {
    match a.physical.cmp(&b.physical) {
        cmp::Ordering::Less => {
            let end = a.physical_end();
            if end == b.physical && a.logical_end() == b.logical {
                ExtentRelation::TouchingWithAOnLeft
            } else if end <= b.physical {
                ExtentRelation::Before
            } else {
                ExtentRelation::Intersecting
            }
        }
        cmp::Ordering::Equal => ExtentRelation::Intersecting,
        cmp::Ordering::Greater => classify(b, a).reversed(),
    }
}

/// Intersection of two extents that are part of the same linear mapping.
///
/// Returns `None` when the physical ranges do not overlap or when the extents have
/// different physical-to-logical offsets. The result carries `a`'s user data.
pub fn intersect(a: &Extent, b: &Extent) -> Option<Extent> {
    let a_end = a.physical_end();
    let b_end = b.physical_end();

    if a_end > b.physical && a.physical < b_end && a.same_offset(b) {
        let physical = cmp::max(a.physical, b.physical);
        Some(Extent {
            physical,
            logical: cmp::max(a.logical, b.logical),
            length: cmp::min(a_end, b_end) - physical,
            user_data: a.user_data,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_rejects_zero_length() {
        let result = Extent::try_new(10, 10, 0);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_try_new_rejects_overflow() {
        assert!(matches!(
            Extent::try_new(u64::MAX, 0, 1),
            Err(Error::Overflow(_))
        ));
        assert!(matches!(
            Extent::try_new(0, u64::MAX - 1, 2),
            Err(Error::Overflow(_))
        ));
        assert!(Extent::try_new(u64::MAX - 1, 0, 1).is_ok());
    }

    #[test]
    fn test_extent_ends() {
        let e = Extent::new(10, 100, 5);
        assert_eq!(e.physical_end(), 15);
        assert_eq!(e.logical_end(), 105);
        assert!(e.contains_physical(10));
        assert!(e.contains_physical(14));
        assert!(!e.contains_physical(15));
        assert!(!e.contains_physical(9));
    }

    #[test]
    fn test_classify_before() {
        let a = Extent::new(0, 0, 4);
        let b = Extent::new(10, 10, 4);
        assert_eq!(classify(&a, &b), ExtentRelation::Before);
        assert_eq!(classify(&b, &a), ExtentRelation::After);
    }

    #[test]
    fn test_classify_touching() {
        let a = Extent::new(0, 100, 4);
        let b = Extent::new(4, 104, 6);
        assert_eq!(classify(&a, &b), ExtentRelation::TouchingWithAOnLeft);
        assert_eq!(classify(&b, &a), ExtentRelation::TouchingWithBOnLeft);
        assert!(classify(&a, &b).is_touching());
    }

    #[test]
    fn test_classify_physically_adjacent_only() {
        // logical runs are not contiguous, so this is a gap in the mapping
        let a = Extent::new(0, 100, 4);
        let b = Extent::new(4, 200, 6);
        assert_eq!(classify(&a, &b), ExtentRelation::Before);
        assert_eq!(classify(&b, &a), ExtentRelation::After);
    }

    #[test]
    fn test_classify_logically_adjacent_only() {
        let a = Extent::new(0, 100, 4);
        let b = Extent::new(8, 104, 6);
        assert_eq!(classify(&a, &b), ExtentRelation::Before);
    }

    #[test]
    fn test_classify_intersecting() {
        let a = Extent::new(0, 0, 10);
        let b = Extent::new(5, 5, 10);
        assert_eq!(classify(&a, &b), ExtentRelation::Intersecting);
        assert_eq!(classify(&b, &a), ExtentRelation::Intersecting);

        let c = Extent::new(0, 50, 1);
        assert_eq!(classify(&a, &c), ExtentRelation::Intersecting);
    }

    #[test]
    fn test_relation_reversed_roundtrip() {
        for rel in [
            ExtentRelation::Before,
            ExtentRelation::TouchingWithAOnLeft,
            ExtentRelation::TouchingWithBOnLeft,
            ExtentRelation::After,
            ExtentRelation::Intersecting,
        ] {
            assert_eq!(rel.reversed().reversed(), rel);
        }
    }

    #[test]
    fn test_intersect_same_offset() {
        let a = Extent::new(0, 100, 10);
        let b = Extent::new(5, 105, 10);
        let expected = Extent::new(5, 105, 5);
        assert_eq!(intersect(&a, &b), Some(expected));
        assert_eq!(intersect(&b, &a), Some(expected));
    }

    #[test]
    fn test_intersect_contained() {
        let outer = Extent::new(0, 100, 10);
        let inner = Extent::new(3, 103, 2);
        assert_eq!(intersect(&outer, &inner), Some(inner));
    }

    #[test]
    fn test_intersect_different_offset() {
        let a = Extent::new(0, 100, 10);
        let b = Extent::new(5, 5, 10);
        assert_eq!(intersect(&a, &b), None);
    }

    #[test]
    fn test_intersect_disjoint_and_touching() {
        let a = Extent::new(0, 0, 5);
        let b = Extent::new(5, 5, 5);
        let c = Extent::new(20, 20, 5);
        assert_eq!(intersect(&a, &b), None);
        assert_eq!(intersect(&a, &c), None);
    }

    #[test]
    fn test_intersect_keeps_first_user_data() {
        let a = Extent::new(0, 0, 10).with_user_data(7);
        let b = Extent::new(2, 2, 3).with_user_data(9);
        assert_eq!(intersect(&a, &b).map(|e| e.user_data), Some(7));
        assert_eq!(intersect(&b, &a).map(|e| e.user_data), Some(9));
    }

    #[test]
    fn test_shifted() {
        let e = Extent::new(8192, 4096, 16384).with_user_data(3);
        let s = e.shifted(12);
        assert_eq!(s, Extent::new(2, 1, 4).with_user_data(3));
    }

    #[test]
    fn test_serde_shape() {
        let e = Extent::new(1, 2, 3).with_user_data(4);
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"physical":1,"logical":2,"length":3,"user_data":4}"#);
        let back: Extent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_display() {
        let e = Extent::new(0, 100, 10);
        assert_eq!(e.to_string(), "physical=0..10 logical=100..110");
    }
}
