//! Core CPU-side geometry types produced by the decoder.

/// Decoded mesh vertex, laid out for direct upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
  /// Position relative to the node origin.
  pub position: [f32; 3],

  /// Unit normal, or zero when the node sends no normals.
  pub normal: [f32; 3],

  /// Texture coordinate with the mesh's uv transform already applied.
  pub uv: [f32; 2],

  /// Octant of the parent cell this vertex lies in (0-7). Renderers use it
  /// to hide parts of a parent already covered by resident children.
  pub octant: u8,
}

impl Default for Vertex {
  fn default() -> Self {
    Self {
      position: [0.0; 3],
      normal: [0.0; 3],
      uv: [0.0; 2],
      octant: 0,
    }
  }
}

/// Axis-aligned bounding box in node-local coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinMaxAABB {
  pub min: [f32; 3],
  pub max: [f32; 3],
}

impl MinMaxAABB {
  /// Create AABB with inverted extents (ready for encapsulation).
  pub fn empty() -> Self {
    Self {
      min: [f32::INFINITY; 3],
      max: [f32::NEG_INFINITY; 3],
    }
  }

  /// Expand AABB to include a point.
  #[inline]
  pub fn encapsulate(&mut self, point: [f32; 3]) {
    for i in 0..3 {
      self.min[i] = self.min[i].min(point[i]);
      self.max[i] = self.max[i].max(point[i]);
    }
  }

  pub fn from_vertices(vertices: &[Vertex]) -> Self {
    let mut aabb = Self::empty();
    for vertex in vertices {
      aabb.encapsulate(vertex.position);
    }
    aabb
  }

  /// Check if AABB is valid (min <= max on all axes).
  pub fn is_valid(&self) -> bool {
    self.min[0] <= self.max[0] && self.min[1] <= self.max[1] && self.min[2] <= self.max[2]
  }
}

impl Default for MinMaxAABB {
  fn default() -> Self {
    Self::empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_aabb_is_invalid() {
    assert!(!MinMaxAABB::empty().is_valid());
  }

  #[test]
  fn test_aabb_from_vertices() {
    let vertices = [
      Vertex {
        position: [1.0, -2.0, 3.0],
        ..Default::default()
      },
      Vertex {
        position: [-1.0, 5.0, 0.0],
        ..Default::default()
      },
    ];
    let aabb = MinMaxAABB::from_vertices(&vertices);
    assert!(aabb.is_valid());
    assert_eq!(aabb.min, [-1.0, -2.0, 0.0]);
    assert_eq!(aabb.max, [1.0, 5.0, 3.0]);
  }
}
