use super::*;

#[test]
fn test_level_slots_cover_max_level() {
  assert!(LEVEL_SLOTS > MAX_LEVEL);
  assert!(PATH_INLINE_CAPACITY >= MAX_LEVEL);
}

#[test]
fn test_flags_are_distinct_bits() {
  let flags = [
    FLAG_RICH3D_LEAF,
    FLAG_RICH3D_NODATA,
    FLAG_LEAF,
    FLAG_NODATA,
    FLAG_USE_IMAGERY_EPOCH,
  ];
  let mut seen = 0u32;
  for flag in flags {
    assert_eq!(flag.count_ones(), 1);
    assert_eq!(seen & flag, 0, "flag {flag} overlaps");
    seen |= flag;
  }
}

#[test]
fn test_renderable_layer_within_bounds() {
  assert!(RENDERABLE_LAYER < LAYER_BOUNDS_LEN);
}

#[test]
fn test_store_header_layout() {
  assert_eq!(STORE_HEADER_LEN, 4 + 2 + 1 + 1 + 4 + 4);
}
