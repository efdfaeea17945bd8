//! NodePath - immutable address of a node in the rocktree octree.
//!
//! A path is the sequence of octants (0-7) walked from the root. The empty
//! path is the root and the path length is the node's level: deeper = finer.

use std::cmp::Ordering;
use std::fmt;

use smallvec::SmallVec;

use crate::constants::{BULK_LEVELS, PATH_INLINE_CAPACITY};

/// Octree node address.
///
/// Ordered by level first, then lexicographically by octants, so coarser nodes
/// always sort before finer ones.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath {
  octants: SmallVec<[u8; PATH_INLINE_CAPACITY]>,
}

impl NodePath {
  /// The root node (level 0).
  pub fn root() -> Self {
    Self::default()
  }

  /// Build a path from raw octants.
  ///
  /// Panics if any octant is outside 0-7.
  pub fn from_octants(octants: &[u8]) -> Self {
    for &octant in octants {
      assert!(octant < 8, "octant {octant} out of range");
    }
    Self {
      octants: SmallVec::from_slice(octants),
    }
  }

  /// Parse the digit form used in request URLs ("" is the root).
  pub fn parse(digits: &str) -> Option<Self> {
    let mut octants = SmallVec::new();
    for c in digits.chars() {
      let octant = c.to_digit(8)?;
      octants.push(octant as u8);
    }
    Some(Self { octants })
  }

  /// LOD level (number of octants).
  #[inline]
  pub fn level(&self) -> usize {
    self.octants.len()
  }

  #[inline]
  pub fn is_root(&self) -> bool {
    self.octants.is_empty()
  }

  #[inline]
  pub fn octants(&self) -> &[u8] {
    &self.octants
  }

  /// Octant of this node within its parent.
  #[inline]
  pub fn last_octant(&self) -> Option<u8> {
    self.octants.last().copied()
  }

  /// Parent node, or None for the root.
  pub fn parent(&self) -> Option<Self> {
    if self.is_root() {
      return None;
    }
    Some(self.truncated(self.level() - 1))
  }

  /// Child node at the given octant.
  ///
  /// Panics if octant is outside 0-7.
  pub fn child(&self, octant: u8) -> Self {
    assert!(octant < 8, "octant {octant} out of range");
    let mut octants = self.octants.clone();
    octants.push(octant);
    Self { octants }
  }

  /// All eight potential children in octant order.
  pub fn children(&self) -> impl Iterator<Item = NodePath> + '_ {
    (0..8u8).map(move |octant| self.child(octant))
  }

  /// Strict ancestor test: `self` is a proper prefix of `other`.
  pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
    self.level() < other.level() && other.octants.starts_with(&self.octants)
  }

  /// Prefix of this path with the given level.
  pub fn truncated(&self, level: usize) -> Self {
    let level = level.min(self.level());
    Self {
      octants: SmallVec::from_slice(&self.octants[..level]),
    }
  }

  /// Strict ancestors, nearest first (parent, grandparent, ..., root).
  pub fn ancestors(&self) -> impl Iterator<Item = NodePath> + '_ {
    (0..self.level()).rev().map(move |level| self.truncated(level))
  }

  /// Head of the bulk metadata packet that describes this node.
  ///
  /// Bulks span `BULK_LEVELS` levels below their head, so nodes at levels
  /// 1..=4 live in the root bulk, 5..=8 in the bulk at their level-4 prefix.
  pub fn bulk_head(&self) -> Self {
    if self.is_root() {
      return Self::root();
    }
    let head_level = ((self.level() - 1) / BULK_LEVELS) * BULK_LEVELS;
    self.truncated(head_level)
  }

  /// Level relative to the head of the bulk describing this node (1..=4).
  pub fn level_in_bulk(&self) -> usize {
    self.level() - self.bulk_head().level()
  }

  /// True when this node heads a bulk of its own (level is a multiple of 4).
  pub fn is_bulk_head(&self) -> bool {
    self.level() % BULK_LEVELS == 0
  }

  /// Concatenate a relative path below this one.
  pub fn join(&self, relative: &[u8]) -> Self {
    let mut octants = self.octants.clone();
    for &octant in relative {
      assert!(octant < 8, "octant {octant} out of range");
      octants.push(octant);
    }
    Self { octants }
  }
}

impl Ord for NodePath {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .level()
      .cmp(&other.level())
      .then_with(|| self.octants.as_slice().cmp(other.octants.as_slice()))
  }
}

impl PartialOrd for NodePath {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for NodePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for octant in &self.octants {
      write!(f, "{octant}")?;
    }
    Ok(())
  }
}

impl fmt::Debug for NodePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "NodePath(\"{self}\")")
  }
}

#[cfg(test)]
#[path = "path_test.rs"]
mod path_test;
