//! Test utilities and helpers for extent map testing
//!
//! Fixture builders, a small textual extent format and common assertions.

use anyhow::{anyhow, Context};
use extmap_core::{classify, Extent, ExtentMap, ExtentRelation};
use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber honouring `RUST_LOG` (default: `warn`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Build a map by inserting `(physical, logical, length)` triples in order
pub fn map_of(extents: &[(u64, u64, u64)]) -> ExtentMap {
    extents
        .iter()
        .map(|&(physical, logical, length)| Extent::new(physical, logical, length))
        .collect()
}

/// Stored extents as `(physical, logical, length)` triples
pub fn triples(map: &ExtentMap) -> Vec<(u64, u64, u64)> {
    map.iter()
        .map(|e| (e.physical, e.logical, e.length))
        .collect()
}

/// Parse a comma separated extent list.
///
/// Each item is `physical+length` (identity mapping) or `physical+length@logical`,
/// optionally followed by `#user_data`. Example: `"0+10@100, 20+5, 40+2#7"`.
pub fn parse_extents(text: &str) -> anyhow::Result<Vec<Extent>> {
    let mut extents = Vec::new();
    for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (body, user_data) = match item.split_once('#') {
            Some((body, tag)) => (
                body,
                tag.parse::<u64>()
                    .with_context(|| format!("bad user data in {:?}", item))?,
            ),
            None => (item, 0),
        };
        let (range, logical) = match body.split_once('@') {
            Some((range, logical)) => (range, Some(logical)),
            None => (body, None),
        };
        let (physical, length) = range
            .split_once('+')
            .ok_or_else(|| anyhow!("expected physical+length in {:?}", item))?;
        let physical = physical
            .trim()
            .parse::<u64>()
            .with_context(|| format!("bad physical start in {:?}", item))?;
        let length = length
            .trim()
            .parse::<u64>()
            .with_context(|| format!("bad length in {:?}", item))?;
        let logical = match logical {
            Some(logical) => logical
                .trim()
                .parse::<u64>()
                .with_context(|| format!("bad logical start in {:?}", item))?,
            None => physical,
        };
        extents.push(Extent::try_new(physical, logical, length)?.with_user_data(user_data));
    }
    Ok(extents)
}

/// Parse an extent list and insert it into a fresh map
pub fn parse_map(text: &str) -> anyhow::Result<ExtentMap> {
    Ok(parse_extents(text)?.into_iter().collect())
}

/// Panic if any two neighbouring extents touch or overlap
pub fn assert_coalesced(map: &ExtentMap) {
    let extents: Vec<Extent> = map.iter().collect();
    for pair in extents.windows(2) {
        let rel = classify(&pair[0], &pair[1]);
        assert_eq!(
            rel,
            ExtentRelation::Before,
            "neighbours {} and {} are not coalesced",
            pair[0],
            pair[1]
        );
    }
}

/// Panic unless every physical block of `map` is mapped identically by `other`
pub fn assert_contained_in(map: &ExtentMap, other: &ExtentMap) {
    for extent in map.iter() {
        let mut physical = extent.physical;
        while physical < extent.physical_end() {
            let outer = other
                .find(physical)
                .unwrap_or_else(|| panic!("block {} of {} is not mapped", physical, extent));
            assert!(
                outer.same_offset(&extent),
                "{} maps block {} differently than {}",
                outer,
                physical,
                extent
            );
            physical = outer.physical_end().min(extent.physical_end());
        }
    }
}

/// Deterministic pseudo-random generator for building large fixtures
pub struct FixtureGenerator {
    state: u64,
}

impl FixtureGenerator {
    /// Create a new generator from a seed
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_mul(6364136223846793005).wrapping_add(1),
        }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Value in `[0, bound)`
    pub fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }

    /// `count` sorted, non-overlapping extents. Roughly one neighbour in four is
    /// contiguous with the previous extent in both address spaces.
    pub fn disjoint_extents(&mut self, count: usize) -> Vec<Extent> {
        let mut extents = Vec::with_capacity(count);
        let mut physical = 0u64;
        let mut logical = 1u64 << 32;
        for _ in 0..count {
            let length = 1 + self.below(16);
            if self.below(4) != 0 {
                physical += 1 + self.below(8);
                logical += 1 + self.below(1 << 20);
            }
            extents.push(Extent::new(physical, logical, length));
            physical += length;
            logical += length;
        }
        extents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extents() {
        let extents = parse_extents("0+10@100, 20+5 ,40+2#7").unwrap();
        assert_eq!(
            extents,
            vec![
                Extent::new(0, 100, 10),
                Extent::new(20, 20, 5),
                Extent::new(40, 40, 2).with_user_data(7),
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_extents("10").is_err());
        assert!(parse_extents("x+1").is_err());
        assert!(parse_extents("0+0").is_err());
        assert!(parse_extents("0+1@y").is_err());
        assert!(parse_extents("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_map_coalesces() {
        let map = parse_map("0+5, 5+5").unwrap();
        assert_eq!(triples(&map), vec![(0, 0, 10)]);
    }

    #[test]
    fn test_generator_is_deterministic() {
        let a = FixtureGenerator::new(7).disjoint_extents(50);
        let b = FixtureGenerator::new(7).disjoint_extents(50);
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0].physical_end() <= w[1].physical));
    }

    #[test]
    fn test_assert_contained_in() {
        let outer = map_of(&[(0, 0, 10), (10, 50, 10)]);
        let inner = map_of(&[(2, 2, 3), (12, 52, 2)]);
        assert_contained_in(&inner, &outer);
    }

    #[test]
    #[should_panic(expected = "is not mapped")]
    fn test_assert_contained_in_fails() {
        let outer = map_of(&[(0, 0, 10)]);
        let inner = map_of(&[(8, 8, 4)]);
        assert_contained_in(&inner, &outer);
    }
}
