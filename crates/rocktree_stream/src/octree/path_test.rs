use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use super::*;

fn p(digits: &str) -> NodePath {
  NodePath::parse(digits).unwrap()
}

// =========================================================================
// Parent / child
// =========================================================================

/// parent(child(p, k)) == p for every octant.
#[test]
fn test_parent_of_child_roundtrip() {
  let paths = [NodePath::root(), p("0"), p("7"), p("0123"), p("76543210765")];
  for path in &paths {
    for k in 0..8u8 {
      let child = path.child(k);
      assert_eq!(child.level(), path.level() + 1);
      assert_eq!(child.last_octant(), Some(k));
      assert_eq!(child.parent().as_ref(), Some(path));
    }
  }
}

#[test]
fn test_root_has_no_parent() {
  assert!(NodePath::root().parent().is_none());
  assert!(NodePath::root().is_root());
  assert_eq!(NodePath::root().level(), 0);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_child_rejects_octant_eight() {
  NodePath::root().child(8);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_from_octants_rejects_invalid() {
  NodePath::from_octants(&[1, 9]);
}

#[test]
fn test_children_in_octant_order() {
  let children: Vec<_> = p("3").children().collect();
  assert_eq!(children.len(), 8);
  for (i, child) in children.iter().enumerate() {
    assert_eq!(child.last_octant(), Some(i as u8));
  }
}

// =========================================================================
// Ancestry
// =========================================================================

#[test]
fn test_is_ancestor_of_is_strict() {
  assert!(NodePath::root().is_ancestor_of(&p("0")));
  assert!(p("01").is_ancestor_of(&p("0123")));
  assert!(!p("01").is_ancestor_of(&p("01")));
  assert!(!p("02").is_ancestor_of(&p("0123")));
  assert!(!p("0123").is_ancestor_of(&p("01")));
}

#[test]
fn test_ancestors_nearest_first() {
  let ancestors: Vec<_> = p("012").ancestors().collect();
  assert_eq!(ancestors, vec![p("01"), p("0"), NodePath::root()]);
  assert_eq!(NodePath::root().ancestors().count(), 0);
}

// =========================================================================
// Ordering / identity
// =========================================================================

#[test]
fn test_order_by_level_then_octants() {
  let set: BTreeSet<_> = [p("7"), p("00"), NodePath::root(), p("1"), p("07")]
    .into_iter()
    .collect();
  let ordered: Vec<_> = set.into_iter().collect();
  assert_eq!(
    ordered,
    vec![NodePath::root(), p("1"), p("7"), p("00"), p("07")]
  );
}

#[test]
fn test_hash_consistency() {
  let hash = |path: &NodePath| {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
  };
  assert_eq!(hash(&p("0246")), hash(&NodePath::from_octants(&[0, 2, 4, 6])));
}

#[test]
fn test_display_and_parse() {
  assert_eq!(p("30604").to_string(), "30604");
  assert_eq!(NodePath::root().to_string(), "");
  assert!(NodePath::parse("18").is_none());
  assert_eq!(format!("{:?}", p("12")), "NodePath(\"12\")");
}

// =========================================================================
// Bulk layout
// =========================================================================

#[test]
fn test_bulk_head_spans_four_levels() {
  assert_eq!(NodePath::root().bulk_head(), NodePath::root());
  assert_eq!(p("0").bulk_head(), NodePath::root());
  assert_eq!(p("0123").bulk_head(), NodePath::root());
  assert_eq!(p("01234").bulk_head(), p("0123"));
  assert_eq!(p("01234567").bulk_head(), p("0123"));
  assert_eq!(p("012345670").bulk_head(), p("01234567"));
}

#[test]
fn test_level_in_bulk() {
  assert_eq!(p("0").level_in_bulk(), 1);
  assert_eq!(p("0123").level_in_bulk(), 4);
  assert_eq!(p("01234").level_in_bulk(), 1);
  assert!(p("0123").is_bulk_head());
  assert!(!p("012").is_bulk_head());
}

#[test]
fn test_join_relative() {
  assert_eq!(p("01").join(&[2, 3]), p("0123"));
  assert_eq!(NodePath::root().join(&[]), NodePath::root());
}
