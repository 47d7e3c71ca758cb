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

//! The scene snapshot a frame is rendered from.
//!
//! The application owns the scene and hands the orchestrator a read-only
//! snapshot per frame: camera matrices, an ordered light list and the drawable
//! models with their GPU buffers already uploaded.

mod light;
mod model;

pub use self::light::{GpuLight, Light, LightKind, MAX_LIGHT_RADIUS};
pub use self::model::{GpuMaterial, Material, MaterialId, Model, StandardVertex, Submesh};

use crate::math::{Mat4, Vec3};

/// The camera the frame is viewed through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// World to view transform.
    pub view: Mat4,
    /// View to clip transform (depth range 0 to 1).
    pub projection: Mat4,
    /// Camera position in world space.
    pub position: Vec3,
}

impl CameraView {
    /// A right-handed perspective camera looking from `eye` at `target`.
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            position: eye,
        }
    }

    /// `projection * view`.
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    /// The view of a camera mirrored across the horizontal plane `y = height`.
    ///
    /// Returns the mirrored view matrix and the mirrored eye position.
    pub fn mirrored(&self, height: f32) -> (Mat4, Vec3) {
        let reflect = Mat4::from_translation(Vec3::new(0.0, height, 0.0))
            * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
            * Mat4::from_translation(Vec3::new(0.0, -height, 0.0));
        let position = Vec3::new(self.position.x, 2.0 * height - self.position.y, self.position.z);
        (self.view * reflect, position)
    }
}

impl Default for CameraView {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, 2.0, 8.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_3,
            16.0 / 9.0,
            0.1,
            100.0,
        )
    }
}

/// A horizontal water plane rendered with reflection and refraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterPlane {
    /// Height of the surface in world space.
    pub height: f32,
    /// Half the edge length of the square surface.
    pub half_extent: f32,
}

impl Default for WaterPlane {
    fn default() -> Self {
        Self {
            height: 0.0,
            half_extent: 50.0,
        }
    }
}

/// Everything one frame needs to know about the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSnapshot {
    /// The viewing camera.
    pub camera: CameraView,
    /// Ordered lights.
    pub lights: Vec<Light>,
    /// Ordered models.
    pub models: Vec<Model>,
    /// Materials referenced by [`Submesh::material`].
    pub materials: Vec<Material>,
    /// The water plane, if the scene has one.
    pub water: Option<WaterPlane>,
    /// Scene time in seconds.
    pub time: f32,
}

impl SceneSnapshot {
    /// Iterates over directional lights in order.
    pub fn suns(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter().filter(|l| l.kind == LightKind::Sun)
    }

    /// Iterates over point lights in order.
    pub fn point_lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter().filter(|l| l.kind == LightKind::Point)
    }

    /// Number of directional lights.
    pub fn sun_count(&self) -> u32 {
        self.suns().count() as u32
    }

    /// Number of point lights.
    pub fn point_light_count(&self) -> u32 {
        self.point_lights().count() as u32
    }

    /// Direction toward the first sun, or zero without one.
    pub fn primary_sun_direction(&self) -> Vec3 {
        self.suns()
            .next()
            .map(|l| l.direction())
            .unwrap_or(Vec3::ZERO)
    }

    /// Total number of submeshes.
    pub fn submesh_count(&self) -> usize {
        self.models.iter().map(|m| m.submeshes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mirrored_camera_reflects_points() {
        let camera = CameraView::look_at(
            Vec3::new(0.0, 3.0, 5.0),
            Vec3::ZERO,
            1.0,
            1.0,
            0.1,
            50.0,
        );
        let (view, eye) = camera.mirrored(1.0);
        assert_abs_diff_eq!(eye, Vec3::new(0.0, -1.0, 5.0), epsilon = 1e-5);
        // A point above the plane seen by the mirrored view lands where its
        // reflection lands in the original view.
        let p = Vec3::new(0.5, 2.0, -1.0);
        let reflected = Vec3::new(0.5, 0.0, -1.0);
        assert_abs_diff_eq!(
            view.transform_point3(p),
            camera.view.transform_point3(reflected),
            epsilon = 1e-5
        );
    }

    #[test]
    fn light_counts_split_by_kind() {
        let scene = SceneSnapshot {
            lights: vec![
                Light::sun(Vec3::Y, Vec3::ONE),
                Light::point(Vec3::ZERO, Vec3::ONE, Vec3::new(1.0, 0.5, 0.1)),
                Light::point(Vec3::X, Vec3::ONE, Vec3::new(1.0, 0.5, 0.1)),
            ],
            ..Default::default()
        };
        assert_eq!(scene.sun_count(), 1);
        assert_eq!(scene.point_light_count(), 2);
        assert_abs_diff_eq!(scene.primary_sun_direction(), Vec3::Y, epsilon = 1e-6);
    }
}
