//! Broken preconditions abort loudly instead of corrupting the map

use extmap_core::{Extent, ExtentMap, ExtentMapStat, MapGeometry};
use extmap_test_utils::parse_map;

#[test]
#[should_panic(expected = "overlaps stored extent")]
fn test_insert_overlapping_extent() {
    let mut map = parse_map("0+10").unwrap();
    map.insert(9, 9, 2, 0);
}

#[test]
#[should_panic(expected = "overlaps stored extent")]
fn test_insert_inside_stored_extent() {
    let mut map = parse_map("0+10").unwrap();
    map.insert(3, 3, 2, 0);
}

#[test]
#[should_panic(expected = "cannot merge")]
fn test_merge_non_touching() {
    let mut map = parse_map("0+10").unwrap();
    map.merge(0, Extent::new(10, 99, 2));
}

#[test]
#[should_panic(expected = "no stored extent at physical position")]
fn test_merge_unknown_position() {
    let mut map = parse_map("0+10").unwrap();
    map.merge(5, Extent::new(10, 10, 2));
}

#[test]
#[should_panic(expected = "overlaps stored extent")]
fn test_merge_grows_over_previous_extent() {
    let mut map = ExtentMap::new();
    map.insert_raw(0, 50, 3, 0);
    map.insert_raw(4, 4, 2, 0);
    map.merge(4, Extent::new(2, 2, 2));
}

#[test]
#[should_panic(expected = "not contained in stored extent")]
fn test_remove_exact_across_gap() {
    let mut map = parse_map("0+10, 12+10").unwrap();
    map.remove_exact(&Extent::new(5, 5, 10));
}

#[test]
#[should_panic(expected = "not sorted by physical")]
fn test_complement_unsorted_input() {
    let mut holes = ExtentMap::new();
    let used = vec![Extent::new(10, 10, 5), Extent::new(2, 2, 1)];
    holes.complement_physical(&used, 100);
}

#[test]
#[should_panic(expected = "overlaps stored extent")]
fn test_stat_insert_overlap() {
    let mut stat = ExtentMapStat::new();
    stat.stat_insert(0, 0, 10, 0);
    stat.stat_insert(5, 5, 10, 0);
}

#[test]
fn test_negative_outcomes_are_values() {
    let mut map = parse_map("0+10").unwrap();
    assert_eq!(map.remove(&Extent::new(50, 50, 5)), 0);
    assert_eq!(map.remove(&Extent::new(0, 1, 5)), 0);
    assert_eq!(map.find(10), None);

    let mut common = ExtentMap::new();
    assert!(!common.intersect_all(&map, &Extent::new(20, 20, 5)));
    assert!(!common.intersect_all_all(&map, &ExtentMap::new()));

    let geometry = MapGeometry::new(64);
    let err = ExtentMap::from_raw(vec![(0, 0, 8), (4, 4, 8)], &geometry).unwrap_err();
    assert_eq!(err.code(), "INTERNAL_ERROR");
}
