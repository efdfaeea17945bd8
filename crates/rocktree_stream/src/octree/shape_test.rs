use glam::DVec3;

use super::*;
use crate::constants::FLAG_NODATA;
use crate::decode::decode_bulk;
use crate::test_utils::{bulk_packet, path, NodeSpec};

fn root_meta(epoch: u32) -> NodeMetadata {
  NodeMetadata {
    path: NodePath::root(),
    flags: FLAG_NODATA,
    epoch,
    bulk_epoch: Some(epoch),
    obb: None,
    meters_per_texel: 0.0,
    imagery_epoch: None,
    texture_formats: 0,
  }
}

fn shape_with_root() -> OctreeShape {
  let mut shape = OctreeShape::new();
  shape.insert_root(root_meta(1), BoundingSphere::new(DVec3::ZERO, 1.0e6));
  shape
}

fn bulk(head: &str, nodes: &[NodeSpec]) -> BulkMetadata {
  let head = path(head);
  decode_bulk(&bulk_packet(&head, 1, nodes), &head).unwrap()
}

#[test]
fn test_root_preview_has_unknown_shape() {
  let shape = shape_with_root();
  assert!(shape.contains(&NodePath::root()));
  assert!(!shape.is_shape_known(&NodePath::root()));
  assert!(!shape.has_bulk(&NodePath::root()));
}

#[test]
fn test_root_bulk_sets_masks() {
  let mut shape = shape_with_root();
  let insert = shape.insert_bulk(&bulk(
    "",
    &[NodeSpec::new("2"), NodeSpec::new("5"), NodeSpec::new("7"), NodeSpec::leaf("21")],
  ));
  assert!(insert.inconsistencies.is_empty());
  assert_eq!(insert.shape_known.first(), Some(&NodePath::root()));
  assert_eq!(insert.shape_known.len(), 5);

  assert_eq!(shape.child_mask(&NodePath::root()), Some(0b1010_0100));
  assert_eq!(
    shape.existing_children(&NodePath::root()),
    vec![path("2"), path("5"), path("7")]
  );
  assert_eq!(shape.child_mask(&path("2")), Some(1 << 1));
  assert!(shape.is_known_leaf(&path("5")));
  assert!(shape.is_known_leaf(&path("21")));
}

#[test]
fn test_bottom_level_waits_for_own_bulk() {
  let mut shape = shape_with_root();
  shape.insert_bulk(&bulk(
    "",
    &[
      NodeSpec::new("0"),
      NodeSpec::new("01"),
      NodeSpec::new("012"),
      NodeSpec::new("0123").bulk_epoch(5),
      NodeSpec::leaf("0124"),
    ],
  ));
  assert!(shape.contains(&path("0123")));
  assert!(!shape.is_shape_known(&path("0123")));
  assert_eq!(shape.get(&path("0123")).unwrap().meta.bulk_epoch, Some(5));
  assert!(shape.is_known_leaf(&path("0124")));

  let insert = shape.insert_bulk(&bulk("0123", &[NodeSpec::new("6")]));
  assert_eq!(insert.shape_known, vec![path("0123"), path("01236")]);
  assert_eq!(shape.child_mask(&path("0123")), Some(1 << 6));
  assert!(shape.has_bulk(&path("0123")));
}

#[test]
fn test_reinserting_parent_bulk_keeps_child_bulk_mask() {
  let mut shape = shape_with_root();
  let root_bulk = bulk("", &[
    NodeSpec::new("0"),
    NodeSpec::new("00"),
    NodeSpec::new("000"),
    NodeSpec::new("0000").bulk_epoch(2),
  ]);
  shape.insert_bulk(&root_bulk);
  shape.insert_bulk(&bulk("0000", &[NodeSpec::new("3")]));
  shape.insert_bulk(&root_bulk);
  assert_eq!(shape.child_mask(&path("0000")), Some(1 << 3));
}

#[test]
fn test_leaf_with_children_becomes_leaf_only() {
  let mut shape = shape_with_root();
  let insert = shape.insert_bulk(&bulk("", &[NodeSpec::leaf("3"), NodeSpec::new("34")]));
  assert_eq!(insert.inconsistencies.len(), 1);
  assert_eq!(insert.inconsistencies[0].path, path("3"));
  assert!(shape.is_leaf_only(&path("3")));
  assert!(shape.is_known_leaf(&path("3")));
  assert!(shape.existing_children(&path("3")).is_empty());
}

#[test]
fn test_head_without_bulk_epoch_is_leaf_only() {
  let mut shape = shape_with_root();
  let insert = shape.insert_bulk(&bulk("", &[
    NodeSpec::new("1"),
    NodeSpec::new("11"),
    NodeSpec::new("111"),
    NodeSpec::new("1111"),
  ]));
  assert_eq!(insert.inconsistencies.len(), 1);
  assert!(shape.is_known_leaf(&path("1111")));
}

#[test]
fn test_successful_bulk_clears_leaf_only() {
  let mut shape = shape_with_root();
  shape.insert_bulk(&bulk("", &[
    NodeSpec::new("1"),
    NodeSpec::new("11"),
    NodeSpec::new("111"),
    NodeSpec::new("1111").bulk_epoch(3),
  ]));
  shape.mark_leaf_only(&path("1111"), "bulk failed");
  assert!(shape.is_known_leaf(&path("1111")));

  shape.insert_bulk(&bulk("1111", &[NodeSpec::new("0")]));
  assert!(!shape.is_leaf_only(&path("1111")));
  assert_eq!(shape.child_mask(&path("1111")), Some(1));
}

#[test]
fn test_orphan_record_reported_and_skipped() {
  let mut shape = shape_with_root();
  let insert = shape.insert_bulk(&bulk("", &[NodeSpec::new("6"), NodeSpec::new("45")]));
  assert_eq!(insert.inconsistencies.len(), 1);
  assert_eq!(insert.inconsistencies[0].path, path("45"));
  assert!(!shape.contains(&path("45")));
}

#[test]
fn test_bounds_from_obb() {
  let mut shape = shape_with_root();
  shape.insert_bulk(&bulk("", &[NodeSpec::new("2")]));
  let node = shape.get(&path("2")).unwrap();
  let extent = 128.0 * 64.0;
  assert!((node.bounds.radius - (3.0f64 * extent * extent).sqrt()).abs() < 1e-6);
  assert_eq!(node.bounds.center, DVec3::ZERO);
}
