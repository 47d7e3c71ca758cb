// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Geometric helpers: bounding boxes, planes and view frustum corners.

use glam::{Mat4, Vec3, Vec4};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// The corner of the box with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner of the box with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box; extending it by any point yields that point.
    pub const INVALID: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Builds the smallest box containing every point of `points`.
    ///
    /// Returns [`Aabb::INVALID`] for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::INVALID, |aabb, p| aabb.extend(p))
    }

    /// Returns a copy of the box grown to contain `point`.
    #[inline]
    pub fn extend(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Returns `true` if the box contains at least one point.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// The center of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns `true` if `point` lies inside the box, allowing `epsilon` of slack.
    #[inline]
    pub fn contains_point(&self, point: Vec3, epsilon: f32) -> bool {
        point.cmpge(self.min - Vec3::splat(epsilon)).all()
            && point.cmple(self.max + Vec3::splat(epsilon)).all()
    }
}

/// A plane in Hessian normal form: `dot(normal, p) + d = 0`.
///
/// Points with a positive signed distance are on the kept side when the plane
/// is used as a clip plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// The unit normal of the plane.
    pub normal: Vec3,
    /// The signed offset of the plane from the origin.
    pub d: f32,
}

impl Plane {
    /// A plane that keeps every point (used when no clipping is wanted).
    pub const NONE: Self = Self {
        normal: Vec3::ZERO,
        d: 1.0,
    };

    /// Creates a plane from a normal and an offset. The normal is normalized.
    pub fn new(normal: Vec3, d: f32) -> Self {
        let len = normal.length();
        if len <= f32::EPSILON {
            return Self::NONE;
        }
        Self {
            normal: normal / len,
            d: d / len,
        }
    }

    /// Horizontal plane at `height` keeping everything above it.
    pub fn above(height: f32) -> Self {
        Self::new(Vec3::Y, -height)
    }

    /// Horizontal plane at `height` keeping everything below it.
    pub fn below(height: f32) -> Self {
        Self::new(Vec3::NEG_Y, height)
    }

    /// Signed distance from the plane to `point`.
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    /// The plane packed as `(nx, ny, nz, d)` for upload.
    #[inline]
    pub fn to_vec4(&self) -> Vec4 {
        self.normal.extend(self.d)
    }
}

/// Returns the 8 world-space corners of the frustum described by `view_proj`.
///
/// Clip space follows the `[0, 1]` depth convention. Corners are ordered with
/// `x` varying slowest and `z` fastest: near/far pairs for each of the four
/// `(x, y)` edges.
pub fn frustum_corners(view_proj: Mat4) -> [Vec3; 8] {
    let inv = view_proj.inverse();
    let mut corners = [Vec3::ZERO; 8];
    let mut i = 0;
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [0.0, 1.0] {
                let p = inv * Vec4::new(x, y, z, 1.0);
                corners[i] = p.truncate() / p.w;
                i += 1;
            }
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn aabb_from_points() {
        let aabb = Aabb::from_points([Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 4.0, 0.0)]);
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 4.0, 3.0));
        assert!(aabb.contains_point(Vec3::ZERO, 0.0));
        assert!(!Aabb::from_points(std::iter::empty()).is_valid());
    }

    #[test]
    fn water_clip_planes() {
        let above = Plane::above(2.0);
        assert!(above.signed_distance(Vec3::new(0.0, 3.0, 0.0)) > 0.0);
        assert!(above.signed_distance(Vec3::new(0.0, 1.0, 0.0)) < 0.0);

        let below = Plane::below(2.0);
        assert!(below.signed_distance(Vec3::new(0.0, 1.0, 0.0)) > 0.0);
        assert!(below.signed_distance(Vec3::new(0.0, 3.0, 0.0)) < 0.0);
    }

    #[test]
    fn frustum_corners_of_perspective_camera() {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 10.0);
        let corners = frustum_corners(proj);
        // Near plane corners sit at z = -1, far plane corners at z = -10.
        for pair in corners.chunks(2) {
            assert_abs_diff_eq!(pair[0].z, -1.0, epsilon = 1e-4);
            assert_abs_diff_eq!(pair[1].z, -10.0, epsilon = 1e-3);
        }
        // With a 90 degree fov, the half width equals the distance.
        assert_abs_diff_eq!(corners[7].x.abs(), 10.0, epsilon = 1e-3);
    }
}
