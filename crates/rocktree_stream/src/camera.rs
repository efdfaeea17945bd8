//! Camera viewpoint consumed by the LOD selector.
//!
//! The engine never computes view matrices. It only needs the eye position
//! and enough projection parameters to turn a world-space radius into pixels.

use glam::DVec3;

use crate::octree::BoundingSphere;

/// Viewer state for one `sync` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
  /// Eye position in globe (ECEF) coordinates.
  pub position: DVec3,
  /// Vertical field of view in radians.
  pub vertical_fov: f64,
  /// Viewport height in pixels.
  pub viewport_height: f64,
}

impl CameraState {
  pub fn new(position: DVec3, vertical_fov: f64, viewport_height: f64) -> Self {
    Self {
      position,
      vertical_fov,
      viewport_height,
    }
  }

  /// Pixels per world unit at distance 1.
  #[inline]
  pub fn projection_factor(&self) -> f64 {
    self.viewport_height / (2.0 * (self.vertical_fov * 0.5).tan())
  }

  /// Projected size in pixels of the sphere's radius.
  ///
  /// Distance is measured to the sphere surface and clamped to
  /// `min_distance`, so the error never decreases as the camera approaches.
  pub fn projected_error(&self, bounds: &BoundingSphere, min_distance: f64) -> f64 {
    let distance = bounds.distance_to(self.position).max(min_distance);
    bounds.radius * self.projection_factor() / distance
  }
}

impl Default for CameraState {
  fn default() -> Self {
    Self::new(DVec3::ZERO, std::f64::consts::FRAC_PI_3, 720.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_projection_factor_at_90_degrees() {
    let camera = CameraState::new(DVec3::ZERO, std::f64::consts::FRAC_PI_2, 1000.0);
    assert!((camera.projection_factor() - 500.0).abs() < 1e-9);
  }

  #[test]
  fn test_error_decreases_with_distance() {
    let sphere = BoundingSphere::new(DVec3::ZERO, 10.0);
    let mut last = f64::INFINITY;
    for d in [15.0, 50.0, 200.0, 1000.0] {
      let camera = CameraState::new(DVec3::new(d, 0.0, 0.0), 1.0, 720.0);
      let error = camera.projected_error(&sphere, 1.0);
      assert!(error < last);
      last = error;
    }
  }

  #[test]
  fn test_inside_sphere_uses_min_distance() {
    let sphere = BoundingSphere::new(DVec3::ZERO, 10.0);
    let camera = CameraState::new(DVec3::ZERO, std::f64::consts::FRAC_PI_2, 100.0);
    assert!((camera.projected_error(&sphere, 2.0) - 250.0).abs() < 1e-9);
  }
}
