use glam::DVec3;

use super::*;
use crate::constants::FLAG_NODATA;
use crate::decode::{decode_bulk, NodeMetadata};
use crate::octree::BoundingSphere;
use crate::test_utils::{bulk_packet, path, NodeSpec};

const ROOT_RADIUS: f64 = 30_000.0;

fn root_meta(flags: u32) -> NodeMetadata {
  NodeMetadata {
    path: NodePath::root(),
    flags,
    epoch: 1,
    bulk_epoch: Some(1),
    obb: None,
    meters_per_texel: 0.0,
    imagery_epoch: None,
    texture_formats: 0,
  }
}

fn shape_with_root(flags: u32) -> OctreeShape {
  let mut shape = OctreeShape::new();
  shape.insert_root(root_meta(flags), BoundingSphere::new(DVec3::ZERO, ROOT_RADIUS));
  shape
}

fn add_bulk(shape: &mut OctreeShape, head: &str, nodes: &[NodeSpec]) {
  let head = path(head);
  let bulk = decode_bulk(&bulk_packet(&head, 1, nodes), &head).unwrap();
  shape.insert_bulk(&bulk);
}

/// Root bulk with a chain down to `012`, whose child `0124` heads an
/// unfetched bulk.
fn chain_shape() -> OctreeShape {
  let mut shape = shape_with_root(FLAG_NODATA);
  add_bulk(&mut shape, "", &[
    NodeSpec::new("0"),
    NodeSpec::new("1"),
    NodeSpec::new("01"),
    NodeSpec::new("012"),
    NodeSpec::leaf("0123"),
    NodeSpec::new("0124").bulk_epoch(7),
  ]);
  shape
}

fn camera_at(distance: f64) -> CameraState {
  CameraState::new(DVec3::new(distance, 0.0, 0.0), std::f64::consts::FRAC_PI_2, 1000.0)
}

fn lod(threshold: f64) -> LodConfig {
  LodConfig {
    error_threshold: threshold,
    ..Default::default()
  }
}

fn paths(items: &[&str]) -> BTreeSet<NodePath> {
  items.iter().map(|p| path(p)).collect()
}

/// Every node of `coarse` is in `fine` or is an ancestor of something in it.
fn refines(fine: &BTreeSet<NodePath>, coarse: &BTreeSet<NodePath>) -> bool {
  coarse
    .iter()
    .all(|c| fine.contains(c) || fine.iter().any(|f| c.is_ancestor_of(f)))
}

#[test]
fn test_empty_shape_selects_nothing() {
  let selection = select(&OctreeShape::new(), &camera_at(1.0), &lod(1.0));
  assert!(selection.desired.is_empty());
  assert!(selection.metadata_requests.is_empty());
}

#[test]
fn test_far_camera_selects_root_only() {
  let mut shape = shape_with_root(FLAG_NODATA);
  add_bulk(&mut shape, "", &[NodeSpec::new("2"), NodeSpec::new("5"), NodeSpec::new("7")]);

  let selection = select(&shape, &camera_at(1.0e9), &lod(1.0));
  assert_eq!(selection.desired, paths(&[""]));
  assert!(selection.data_candidates.is_empty(), "root has no data");
  assert!(selection.metadata_requests.is_empty());
}

#[test]
fn test_root_with_data_and_no_children() {
  let mut shape = shape_with_root(0);
  add_bulk(&mut shape, "", &[]);

  let selection = select(&shape, &camera_at(1.0), &lod(1.0));
  assert_eq!(selection.desired, paths(&[""]));
  assert_eq!(selection.data_candidates.len(), 1);
  assert_eq!(selection.data_candidates[0].path, NodePath::root());
}

#[test]
fn test_unknown_root_requests_root_bulk() {
  let shape = shape_with_root(FLAG_NODATA);
  let selection = select(&shape, &camera_at(1.0), &lod(1.0));
  assert_eq!(selection.desired, paths(&[""]));
  assert_eq!(selection.metadata_requests.len(), 1);
  assert_eq!(selection.metadata_requests[0].head, NodePath::root());
  assert_eq!(selection.metadata_requests[0].epoch, 1);
}

#[test]
fn test_unknown_child_keeps_parent() {
  let shape = chain_shape();
  let selection = select(&shape, &camera_at(1.0), &lod(1.0));

  assert_eq!(selection.desired, paths(&["1", "012"]));
  assert_eq!(selection.metadata_requests.len(), 1);
  assert_eq!(selection.metadata_requests[0].head, path("0124"));
  assert_eq!(selection.metadata_requests[0].epoch, 7);
  let candidates: Vec<&NodePath> = selection.data_candidates.iter().map(|c| &c.path).collect();
  assert_eq!(candidates, vec![&path("1"), &path("012")]);
  assert_eq!(selection.stats.waiting_on_metadata, 1);
}

#[test]
fn test_children_substituted_once_known() {
  let mut shape = chain_shape();
  add_bulk(&mut shape, "0124", &[NodeSpec::leaf("5")]);

  let selection = select(&shape, &camera_at(1.0), &lod(1.0));
  assert_eq!(selection.desired, paths(&["1", "0123", "01245"]));
  assert!(selection.metadata_requests.is_empty());
}

#[test]
fn test_max_level_stops_descent() {
  let shape = chain_shape();
  let config = LodConfig {
    max_level: 2,
    ..lod(1.0)
  };
  let selection = select(&shape, &camera_at(1.0), &config);
  assert_eq!(selection.desired, paths(&["1", "01"]));
}

#[test]
fn test_closer_camera_never_removes_detail() {
  let mut shape = chain_shape();
  add_bulk(&mut shape, "0124", &[NodeSpec::new("5"), NodeSpec::leaf("56")]);

  let distances = [1.0e9, 1.0e7, 1.0e6, 3.0e5, 1.0e5, 5.0e4, 2.0e4, 1.0e4, 1.0e3, 1.0];
  let mut previous = select(&shape, &camera_at(distances[0]), &lod(100.0)).desired;
  for &distance in &distances[1..] {
    let next = select(&shape, &camera_at(distance), &lod(100.0)).desired;
    assert!(refines(&next, &previous), "detail lost moving to {distance}");
    previous = next;
  }
  assert!(previous.contains(&path("012456")));
}

#[test]
fn test_higher_threshold_never_adds_detail() {
  let mut shape = chain_shape();
  add_bulk(&mut shape, "0124", &[NodeSpec::new("5"), NodeSpec::leaf("56")]);

  let camera = camera_at(5.0e4);
  let thresholds = [0.5, 1.0, 10.0, 100.0, 1_000.0, 1.0e5];
  let mut previous = select(&shape, &camera, &lod(thresholds[0])).desired;
  for &threshold in &thresholds[1..] {
    let next = select(&shape, &camera, &lod(threshold)).desired;
    assert!(refines(&previous, &next), "detail added at threshold {threshold}");
    previous = next;
  }
  assert_eq!(previous, paths(&[""]));
}

#[test]
fn test_selection_is_deterministic() {
  let shape = chain_shape();
  let a = select(&shape, &camera_at(2.0e4), &lod(50.0));
  let b = select(&shape, &camera_at(2.0e4), &lod(50.0));
  assert_eq!(a.desired, b.desired);
  assert_eq!(a.metadata_requests, b.metadata_requests);
  assert_eq!(a.data_candidates, b.data_candidates);
}
