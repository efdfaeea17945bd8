//! Bounding volumes with double precision for planet-scale coordinates.

use glam::{DMat3, DVec3};

/// Double-precision bounding sphere used for screen-space error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
	pub center: DVec3,
	pub radius: f64,
}

impl BoundingSphere {
	pub fn new(center: DVec3, radius: f64) -> Self {
		debug_assert!(radius >= 0.0, "sphere radius must be non-negative");
		Self { center, radius }
	}

	/// Distance from a point to the sphere surface (0 when inside).
	#[inline]
	pub fn distance_to(&self, point: DVec3) -> f64 {
		(point.distance(self.center) - self.radius).max(0.0)
	}

	#[inline]
	pub fn contains_point(&self, point: DVec3) -> bool {
		point.distance_squared(self.center) <= self.radius * self.radius
	}

	/// Smallest sphere around both inputs.
	pub fn union(&self, other: &BoundingSphere) -> BoundingSphere {
		let offset = other.center - self.center;
		let dist = offset.length();
		if dist + other.radius <= self.radius {
			return *self;
		}
		if dist + self.radius <= other.radius {
			return *other;
		}
		let radius = (dist + self.radius + other.radius) * 0.5;
		let center = self.center + offset * ((radius - self.radius) / dist);
		BoundingSphere { center, radius }
	}
}

/// Oriented bounding box unpacked from NodeMetadata.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBoundingBox {
	pub center: DVec3,
	/// Half sizes along the local axes.
	pub extents: DVec3,
	/// Columns are the local axes in world space.
	pub orientation: DMat3,
}

impl OrientedBoundingBox {
	pub fn bounding_sphere(&self) -> BoundingSphere {
		BoundingSphere::new(self.center, self.extents.length())
	}

	/// Corner with the minimum local coordinate on every axis.
	pub fn min_corner(&self) -> DVec3 {
		self.center - self.orientation * self.extents
	}

	pub fn contains_point(&self, point: DVec3) -> bool {
		let local = self.orientation.transpose() * (point - self.center);
		local.x.abs() <= self.extents.x && local.y.abs() <= self.extents.y && local.z.abs() <= self.extents.z
	}
}
