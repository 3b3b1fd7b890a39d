//! Extent maps: ordered, piecewise-linear correspondences between a physical and a
//! logical block address space.
//!
//! Used to track which physical regions hold which logical content while data is
//! relocated in place. The map keeps its extents sorted, non-overlapping and
//! maximally coalesced; it supports splitting removal, intersection between maps and
//! construction of physical/logical complements.

pub mod config;
pub mod error;
pub mod extent;
pub mod map;
pub mod set_ops;
pub mod stat;

pub use config::MapGeometry;
pub use error::{Error, Result};
pub use extent::{classify, intersect, Extent, ExtentRelation};
pub use map::ExtentMap;
pub use stat::ExtentMapStat;
