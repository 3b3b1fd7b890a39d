//! Builders that accumulate intersections and complements into a receiver map.
//!
//! Intersections go through [`ExtentMap::insert`] and are therefore coalesced.
//! Complements are appended with the raw fast path: holes are separated by used
//! extents, so they never touch each other.

use crate::config::MapGeometry;
use crate::extent::{classify, intersect, Extent, ExtentRelation};
use crate::map::ExtentMap;
use crate::{Error, Result};
use std::borrow::Borrow;
use tracing::debug;

/// Address space scanned by a complement builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Physical,
    Logical,
}

impl Axis {
    fn start(self, extent: &Extent) -> u64 {
        match self {
            Axis::Physical => extent.physical,
            Axis::Logical => extent.logical,
        }
    }

    fn end(self, extent: &Extent) -> u64 {
        match self {
            Axis::Physical => extent.physical_end(),
            Axis::Logical => extent.logical_end(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Axis::Physical => "physical",
            Axis::Logical => "logical",
        }
    }
}

impl ExtentMap {
    /// Matching intersections between `probe` and the stored extents, in physical
    /// order. Each one carries the user data of the stored extent.
    pub(crate) fn intersections<'a>(
        &'a self,
        probe: &'a Extent,
    ) -> impl Iterator<Item = Extent> + 'a {
        self.candidates(probe.physical, probe.physical_end())
            .filter_map(move |stored| intersect(&stored, probe))
    }

    /// Insert the matching intersection of `a` and `b`, if any, into this map.
    pub fn intersect_into(&mut self, a: &Extent, b: &Extent) -> bool {
        match intersect(a, b) {
            Some(extent) => {
                self.insert_extent(extent);
                true
            }
            None => false,
        }
    }

    /// Insert every matching intersection between `map` and `extent` into this map.
    ///
    /// Returns false, leaving this map untouched, if there are none.
    pub fn intersect_all(&mut self, map: &ExtentMap, extent: &Extent) -> bool {
        let mut found = false;
        for piece in map.intersections(extent) {
            self.insert_extent(piece);
            found = true;
        }
        found
    }

    /// Insert the intersection of two whole maps into this map.
    ///
    /// Iterates the map with fewer extents, restricted to the physical bounds of the
    /// other one.
    pub fn intersect_all_all(&mut self, map1: &ExtentMap, map2: &ExtentMap) -> bool {
        if map1.is_empty() || map2.is_empty() {
            return false;
        }
        let (iterate, other) = if map1.len() < map2.len() {
            (map1, map2)
        } else {
            (map2, map1)
        };
        let (lo, hi) = other.bounds();

        let before = self.len();
        let mut found = false;
        for extent in iterate.candidates(lo, hi) {
            found |= self.intersect_all(other, &extent);
        }
        debug!(
            "intersected maps of {} and {} extents, receiver grew from {} to {} extents",
            iterate.len(),
            other.len(),
            before,
            self.len()
        );
        found
    }

    /// Append the physical holes left by `extents` within `[0, device_length)`.
    ///
    /// `extents` must be sorted by physical start and must not overlap; anything else
    /// panics. Holes have `logical == physical`. If this map is not empty the scan
    /// starts at the physical end of its last extent.
    pub fn complement_physical<I>(&mut self, extents: I, device_length: u64)
    where
        I: IntoIterator,
        I::Item: Borrow<Extent>,
    {
        self.complement(Axis::Physical, extents, 0, device_length);
    }

    /// Same as [`ExtentMap::complement_physical`], scanning logical starts instead.
    pub fn complement_logical<I>(&mut self, extents: I, device_length: u64)
    where
        I: IntoIterator,
        I::Item: Borrow<Extent>,
    {
        self.complement(Axis::Logical, extents, 0, device_length);
    }

    /// Physical complement of a raw extent list, shifting coordinates and the device
    /// length by the geometry's block shift.
    pub fn complement_physical_with<I>(&mut self, extents: I, geometry: &MapGeometry)
    where
        I: IntoIterator,
        I::Item: Borrow<Extent>,
    {
        self.complement(
            Axis::Physical,
            extents,
            geometry.block_size_log2,
            geometry.device_length,
        );
    }

    /// Logical complement of a raw extent list, shifting coordinates and the device
    /// length by the geometry's block shift.
    pub fn complement_logical_with<I>(&mut self, extents: I, geometry: &MapGeometry)
    where
        I: IntoIterator,
        I::Item: Borrow<Extent>,
    {
        self.complement(
            Axis::Logical,
            extents,
            geometry.block_size_log2,
            geometry.device_length,
        );
    }

    fn complement<I>(&mut self, axis: Axis, extents: I, block_size_log2: u32, device_length: u64)
    where
        I: IntoIterator,
        I::Item: Borrow<Extent>,
    {
        let mut last = self.last().map_or(0, |extent| axis.end(&extent));
        let mut holes = 0usize;

        for extent in extents {
            let extent = extent.borrow().shifted(block_size_log2);
            let start = axis.start(&extent);
            assert!(
                start >= last,
                "complement input is not sorted by {} start: {} begins before {}",
                axis.name(),
                start,
                last
            );
            if start > last {
                self.append_raw(last, last, start - last, 0);
                holes += 1;
            }
            last = axis.end(&extent);
        }

        let end = device_length.checked_shr(block_size_log2).unwrap_or(0);
        if last < end {
            self.append_raw(last, last, end - last, 0);
            holes += 1;
        }
        debug!("{} complement added {} holes", axis.name(), holes);
    }

    /// Build a coalesced map from raw `(physical, logical, length)` triples expressed in
    /// device units.
    ///
    /// Unlike the `insert` family this never panics on bad input: the geometry is
    /// validated, and every triple must be non-empty, must not overflow, must cover at
    /// least one block after shifting and must not overlap an earlier one. Errors
    /// carry the index of the offending triple.
    pub fn from_raw<I>(raw: I, geometry: &MapGeometry) -> Result<ExtentMap>
    where
        I: IntoIterator<Item = (u64, u64, u64)>,
    {
        geometry
            .validate()
            .map_err(|e| e.with_context("map geometry"))?;

        let mut map = ExtentMap::new();
        for (index, (physical, logical, length)) in raw.into_iter().enumerate() {
            let context = format!("raw extent #{}", index);
            let extent = Extent::try_new(physical, logical, length)
                .map_err(|e| e.with_context(&context))?
                .shifted(geometry.block_size_log2);
            if extent.length == 0 {
                return Err(Error::InvalidArgument(format!(
                    "length {} is shorter than one block",
                    length
                ))
                .with_context(&context));
            }
            if let Some(stored) = map
                .candidates(extent.physical, extent.physical_end())
                .find(|stored| classify(stored, &extent) == ExtentRelation::Intersecting)
            {
                return Err(Error::InvalidArgument(format!(
                    "{} overlaps stored extent {}",
                    extent, stored
                ))
                .with_context(&context));
            }
            map.insert_extent(extent);
        }
        debug!("built map of {} extents from raw input", map.len());
        Ok(map)
    }

    /// Append a raw extent list sorted by physical start, shifting coordinates and
    /// lengths right by `block_size_log2`. Does not merge.
    pub fn append_shifted<I>(&mut self, extents: I, block_size_log2: u32)
    where
        I: IntoIterator,
        I::Item: Borrow<Extent>,
    {
        for extent in extents {
            let extent = extent.borrow().shifted(block_size_log2);
            self.append_raw(extent.physical, extent.logical, extent.length, extent.user_data);
        }
    }
}
