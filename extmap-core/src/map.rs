//! Ordered extent map with automatic coalescing and splitting.
//!
//! Stored extents are keyed by their physical start. Every public mutator except the
//! raw fast paths keeps these invariants:
//! - keys are unique and ascending
//! - no stored extent is empty
//! - stored extents do not overlap physically
//! - no two neighbours are touching (they would have been coalesced)
//!
//! Broken preconditions (merging extents that do not touch, removing a range that is
//! not mapped, inserting over existing content) panic.

use crate::extent::{classify, Extent, ExtentRelation};
use crate::{Error, Result};
use std::borrow::Borrow;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::{debug, trace};

/// Value part of a stored extent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    logical: u64,
    length: u64,
    user_data: u64,
}

impl From<&Extent> for Mapping {
    fn from(extent: &Extent) -> Self {
        Self {
            logical: extent.logical,
            length: extent.length,
            user_data: extent.user_data,
        }
    }
}

fn to_extent(physical: u64, mapping: &Mapping) -> Extent {
    Extent {
        physical,
        logical: mapping.logical,
        length: mapping.length,
        user_data: mapping.user_data,
    }
}

/// Piecewise-linear map from physical to logical blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentMap {
    /// physical start -> (logical start, length, user data)
    extents: BTreeMap<u64, Mapping>,
}

impl ExtentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored extents
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn clear(&mut self) {
        self.extents.clear();
    }

    /// Stored extents in ascending physical order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.extents.iter(),
        }
    }

    pub fn first(&self) -> Option<Extent> {
        self.extents
            .first_key_value()
            .map(|(physical, mapping)| to_extent(*physical, mapping))
    }

    pub fn last(&self) -> Option<Extent> {
        self.extents
            .last_key_value()
            .map(|(physical, mapping)| to_extent(*physical, mapping))
    }

    /// Stored extent starting exactly at `physical`
    pub fn get(&self, physical: u64) -> Option<Extent> {
        self.extents
            .get(&physical)
            .map(|mapping| to_extent(physical, mapping))
    }

    /// Stored extent containing the physical block `physical`
    pub fn find(&self, physical: u64) -> Option<Extent> {
        self.floor(physical)
            .filter(|extent| extent.contains_physical(physical))
    }

    /// Sum of the lengths of all stored extents
    pub fn total_length(&self) -> u64 {
        self.extents.values().map(|mapping| mapping.length).sum()
    }

    /// Lowest physical start and highest physical end, or `(0, 0)` if empty
    pub fn bounds(&self) -> (u64, u64) {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => (first.physical, last.physical_end()),
            _ => (0, 0),
        }
    }

    /// Last stored extent starting at or before `physical`
    fn floor(&self, physical: u64) -> Option<Extent> {
        self.extents
            .range(..=physical)
            .next_back()
            .map(|(key, mapping)| to_extent(*key, mapping))
    }

    fn next_after(&self, physical: u64) -> Option<Extent> {
        self.extents
            .range((Bound::Excluded(physical), Bound::Unbounded))
            .next()
            .map(|(key, mapping)| to_extent(*key, mapping))
    }

    fn prev_before(&self, physical: u64) -> Option<Extent> {
        self.extents
            .range(..physical)
            .next_back()
            .map(|(key, mapping)| to_extent(*key, mapping))
    }

    fn stored(&self, position: u64) -> Extent {
        match self.get(position) {
            Some(extent) => extent,
            None => panic!("no stored extent at physical position {}", position),
        }
    }

    /// Stored extents that may overlap `[start, end)`: the last one starting at or
    /// before `start`, then every one starting before `end`.
    pub(crate) fn candidates(&self, start: u64, end: u64) -> impl Iterator<Item = Extent> + '_ {
        let from = self.floor(start).map_or(start, |extent| extent.physical);
        let to = end.max(from);
        self.extents
            .range(from..to)
            .map(|(key, mapping)| to_extent(*key, mapping))
    }

    /// Add an extent, coalescing it with touching neighbours.
    ///
    /// Returns the stored extent that now contains it. Panics if the extent is empty or
    /// physically overlaps stored content.
    pub fn insert(&mut self, physical: u64, logical: u64, length: u64, user_data: u64) -> Extent {
        self.insert_extent(Extent {
            physical,
            logical,
            length,
            user_data,
        })
    }

    /// Same as [`ExtentMap::insert`], taking an [`Extent`]
    pub fn insert_extent(&mut self, extent: Extent) -> Extent {
        assert!(extent.length > 0, "cannot insert empty extent {}", extent);

        let next = self
            .extents
            .range(extent.physical..)
            .next()
            .map(|(key, mapping)| to_extent(*key, mapping));
        let prev = self.prev_before(extent.physical);

        // both neighbours are checked before anything is merged
        for neighbour in next.iter().chain(prev.iter()) {
            assert!(
                classify(&extent, neighbour) != ExtentRelation::Intersecting,
                "inserted extent {} overlaps stored extent {}",
                extent,
                neighbour
            );
        }

        if let Some(next) = next.filter(|next| classify(&extent, next).is_touching()) {
            return self.merge(next.physical, extent);
        }
        if let Some(prev) = prev.filter(|prev| classify(prev, &extent).is_touching()) {
            return self.merge(prev.physical, extent);
        }

        self.extents.insert(extent.physical, Mapping::from(&extent));
        extent
    }

    /// Merge a new extent into the stored extent at `position`, then keep merging
    /// while the result touches the neighbour on the side it grew towards.
    ///
    /// Panics unless the two extents are touching, or if the new extent overlaps the
    /// stored neighbour on the side it is attached to.
    pub fn merge(&mut self, position: u64, extent: Extent) -> Extent {
        let stored = self.stored(position);
        let rel = classify(&stored, &extent);

        let neighbour = match rel {
            ExtentRelation::TouchingWithAOnLeft => self.next_after(stored.physical),
            ExtentRelation::TouchingWithBOnLeft => self.prev_before(stored.physical),
            _ => None,
        };
        if let Some(neighbour) = neighbour {
            assert!(
                classify(&extent, &neighbour) != ExtentRelation::Intersecting,
                "merged extent {} overlaps stored extent {}",
                extent,
                neighbour
            );
        }

        let merged = self.merge_one(stored, extent);

        if rel == ExtentRelation::TouchingWithAOnLeft {
            // grew at the end
            if let Some(next) = self.next_after(merged.physical) {
                if classify(&merged, &next) == ExtentRelation::TouchingWithAOnLeft {
                    return self.merge_stored(merged.physical, next.physical);
                }
            }
        } else if let Some(prev) = self.prev_before(merged.physical) {
            // grew at the start
            if classify(&prev, &merged) == ExtentRelation::TouchingWithAOnLeft {
                return self.merge_stored(prev.physical, merged.physical);
            }
        }
        merged
    }

    /// Merge two stored extents into one, keeping the key of the left one.
    ///
    /// Panics unless both positions are stored and the extents are touching.
    pub fn merge_stored(&mut self, position1: u64, position2: u64) -> Extent {
        let first = self.stored(position1);
        let second = self.stored(position2);
        let (left, right) = match classify(&first, &second) {
            ExtentRelation::TouchingWithAOnLeft => (first, second),
            ExtentRelation::TouchingWithBOnLeft => (second, first),
            rel => panic!(
                "cannot merge stored extents {} and {}: relation is {:?}",
                first, second, rel
            ),
        };

        self.extents.remove(&right.physical);
        let merged = Extent {
            length: left.length + right.length,
            ..left
        };
        if let Some(mapping) = self.extents.get_mut(&left.physical) {
            mapping.length = merged.length;
        }
        trace!("merged stored {} and {} into {}", left, right, merged);
        merged
    }

    /// Single merge step between a stored extent and a touching extent.
    ///
    /// The merged extent keeps the position and user data of whichever is on the left.
    /// When that is the new extent the stored entry is re-keyed.
    fn merge_one(&mut self, stored: Extent, extent: Extent) -> Extent {
        let (left, right) = match classify(&stored, &extent) {
            ExtentRelation::TouchingWithAOnLeft => (stored, extent),
            ExtentRelation::TouchingWithBOnLeft => (extent, stored),
            rel => panic!(
                "cannot merge {} into stored extent {}: relation is {:?}",
                extent, stored, rel
            ),
        };

        let merged = Extent {
            length: left.length + right.length,
            ..left
        };
        if merged.physical != stored.physical {
            self.extents.remove(&stored.physical);
        }
        self.extents.insert(merged.physical, Mapping::from(&merged));
        trace!("merged {} into {}", extent, merged);
        merged
    }

    /// Remove the part of `extent` that is mapped by this map, splitting stored extents
    /// as needed.
    ///
    /// Only sub-ranges with the same physical-to-logical offset as a stored extent are
    /// removed. Returns the number of blocks removed; zero means nothing matched.
    pub fn remove(&mut self, extent: &Extent) -> u64 {
        if extent.length == 0 || self.is_empty() {
            return 0;
        }
        let pieces: Vec<Extent> = self.intersections(extent).collect();
        pieces.iter().map(|piece| self.remove_exact(piece)).sum()
    }

    /// Remove a sub-range of exactly one stored extent.
    ///
    /// The range must lie entirely inside a single stored extent and share its
    /// physical-to-logical offset; anything else panics. A stored extent yields zero,
    /// one or two remainder pieces. Returns the removed length.
    pub fn remove_exact(&mut self, extent: &Extent) -> u64 {
        assert!(extent.length > 0, "cannot remove empty extent {}", extent);
        let stored = match self.floor(extent.physical) {
            Some(stored) => stored,
            None => panic!("cannot remove {}: no stored extent starts at or before it", extent),
        };
        assert!(
            stored.logical <= extent.logical && stored.same_offset(extent),
            "cannot remove {}: offset does not match stored extent {}",
            extent,
            stored
        );
        assert!(
            stored.physical_end() >= extent.physical_end(),
            "cannot remove {}: not contained in stored extent {}",
            extent,
            stored
        );

        if stored.physical < extent.physical {
            if let Some(mapping) = self.extents.get_mut(&stored.physical) {
                mapping.length = extent.physical - stored.physical;
            }
        } else {
            self.extents.remove(&stored.physical);
        }

        if stored.physical_end() > extent.physical_end() {
            let tail = Extent {
                physical: extent.physical_end(),
                logical: extent.logical_end(),
                length: stored.physical_end() - extent.physical_end(),
                user_data: stored.user_data,
            };
            self.extents.insert(tail.physical, Mapping::from(&tail));
        }

        trace!("removed {} from stored extent {}", extent, stored);
        extent.length
    }

    /// Remove every extent of a sequence, see [`ExtentMap::remove`].
    pub fn remove_all<I>(&mut self, extents: I) -> u64
    where
        I: IntoIterator,
        I::Item: Borrow<Extent>,
    {
        let mut removed = 0;
        let mut count = 0usize;
        for extent in extents {
            removed += self.remove(extent.borrow());
            count += 1;
        }
        debug!("removed {} blocks while processing {} extents", removed, count);
        removed
    }

    /// Remove the content of `other` from this map.
    ///
    /// Only extents of `other` within this map's physical bounds are visited. When
    /// `other` holds exactly the same content the map is simply cleared.
    pub fn remove_map(&mut self, other: &ExtentMap) -> u64 {
        if self.is_empty() || other.is_empty() {
            return 0;
        }
        if self == other {
            let removed = self.total_length();
            self.clear();
            debug!("removed identical map, {} blocks", removed);
            return removed;
        }
        let (lo, hi) = self.bounds();
        self.remove_all(other.candidates(lo, hi))
    }

    /// Store an extent under its physical start, replacing any extent with the same
    /// key. Does not merge or check for overlap.
    pub fn insert_raw(&mut self, physical: u64, logical: u64, length: u64, user_data: u64) {
        self.extents.insert(
            physical,
            Mapping {
                logical,
                length,
                user_data,
            },
        );
    }

    /// Append an extent expected to sort after every stored one. Does not merge and
    /// performs no ordering check.
    pub fn append_raw(&mut self, physical: u64, logical: u64, length: u64, user_data: u64) {
        self.insert_raw(physical, logical, length, user_data);
    }

    /// Verify the map invariants, reporting the first violation found
    pub fn check_invariants(&self) -> Result<()> {
        let mut prev: Option<Extent> = None;
        for extent in self.iter() {
            if extent.length == 0 {
                return Err(Error::Corruption(format!("empty extent at {}", extent.physical)));
            }
            if extent.physical.checked_add(extent.length).is_none()
                || extent.logical.checked_add(extent.length).is_none()
            {
                return Err(Error::Corruption(format!(
                    "extent at {} overflows the address space",
                    extent.physical
                )));
            }
            if let Some(prev) = prev {
                match classify(&prev, &extent) {
                    ExtentRelation::Before => {}
                    ExtentRelation::Intersecting => {
                        return Err(Error::Corruption(format!(
                            "extents {} and {} overlap",
                            prev, extent
                        )))
                    }
                    rel => {
                        return Err(Error::Corruption(format!(
                            "extents {} and {} are not coalesced ({:?})",
                            prev, extent, rel
                        )))
                    }
                }
            }
            prev = Some(extent);
        }
        Ok(())
    }
}

/// Iterator over the stored extents of an [`ExtentMap`]
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, u64, Mapping>,
}

impl Iterator for Iter<'_> {
    type Item = Extent;

    fn next(&mut self) -> Option<Extent> {
        self.inner
            .next()
            .map(|(physical, mapping)| to_extent(*physical, mapping))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Extent> {
        self.inner
            .next_back()
            .map(|(physical, mapping)| to_extent(*physical, mapping))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a ExtentMap {
    type Item = Extent;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl Extend<Extent> for ExtentMap {
    fn extend<I: IntoIterator<Item = Extent>>(&mut self, iter: I) {
        for extent in iter {
            self.insert_extent(extent);
        }
    }
}

impl FromIterator<Extent> for ExtentMap {
    fn from_iter<I: IntoIterator<Item = Extent>>(iter: I) -> Self {
        let mut map = ExtentMap::new();
        map.extend(iter);
        map
    }
}
