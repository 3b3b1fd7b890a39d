//! Extent map with running block counters.
//!
//! `total_count` is the capacity of the address space being mapped, `used_count` the
//! number of blocks currently mapped. Both are maintained incrementally by the
//! `stat_*` entry points instead of rescanning the map.

use crate::extent::Extent;
use crate::map::ExtentMap;
use std::ops::Deref;
use tracing::warn;

/// [`ExtentMap`] plus total/used block counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentMapStat {
    map: ExtentMap,
    total_count: u64,
    used_count: u64,
}

impl ExtentMapStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing map. Counters start at zero.
    pub fn from_map(map: ExtentMap) -> Self {
        Self {
            map,
            total_count: 0,
            used_count: 0,
        }
    }

    /// Unwrap the underlying map, dropping the counters
    pub fn into_inner(self) -> ExtentMap {
        self.map
    }

    /// Clear the map and reset both counters
    pub fn clear(&mut self) {
        self.map.clear();
        self.total_count = 0;
        self.used_count = 0;
    }

    /// Same as [`ExtentMap::insert`], also adding `length` to the used count
    pub fn stat_insert(&mut self, physical: u64, logical: u64, length: u64, user_data: u64) -> Extent {
        let merged = self.map.insert(physical, logical, length, user_data);
        self.used_count += length;
        merged
    }

    /// Same as [`ExtentMap::insert_extent`], also adding the length to the used count
    pub fn stat_insert_extent(&mut self, extent: Extent) -> Extent {
        self.stat_insert(extent.physical, extent.logical, extent.length, extent.user_data)
    }

    /// Same as [`ExtentMap::remove`], also subtracting the removed blocks from the used
    /// count
    pub fn stat_remove(&mut self, extent: &Extent) -> u64 {
        let removed = self.map.remove(extent);
        self.used_count_sub(removed);
        removed
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn used_count(&self) -> u64 {
        self.used_count
    }

    /// Blocks not in use, zero if the counters are inconsistent
    pub fn free_count(&self) -> u64 {
        self.total_count.saturating_sub(self.used_count)
    }

    pub fn set_total_count(&mut self, count: u64) {
        self.total_count = count;
    }

    pub fn set_used_count(&mut self, count: u64) {
        self.used_count = count;
    }

    pub fn used_count_add(&mut self, count: u64) {
        self.used_count += count;
    }

    pub fn used_count_sub(&mut self, count: u64) {
        if count > self.used_count {
            warn!(
                "used count underflow: subtracting {} from {}",
                count, self.used_count
            );
        }
        self.used_count = self.used_count.saturating_sub(count);
    }
}

impl Deref for ExtentMapStat {
    type Target = ExtentMap;

    fn deref(&self) -> &ExtentMap {
        &self.map
    }
}

impl From<ExtentMap> for ExtentMapStat {
    fn from(map: ExtentMap) -> Self {
        Self::from_map(map)
    }
}
