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

//! Immutable per-frame parameters shared by every pass.

use crate::math::{Extent2D, Mat4, Plane, Vec3, Vec4};
use crate::renderer::settings::FeatureToggles;

/// The snapshot every pass reads while encoding one frame.
///
/// Built once by the orchestrator. Passes that need a different point of view
/// (the water reflection) derive a copy with [`FrameParams::with_view`] and never
/// touch the shared value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    /// Monotonic frame counter.
    pub frame_index: u64,
    /// World to view transform.
    pub view: Mat4,
    /// View to clip transform.
    pub projection: Mat4,
    /// `projection * view`.
    pub view_proj: Mat4,
    /// Camera position in world space.
    pub camera_position: Vec3,
    /// World to light clip transform used for shadow rendering and lookup.
    pub shadow_view_proj: Mat4,
    /// Direction pointing toward the first sun, or zero without one.
    pub sun_direction: Vec3,
    /// Number of directional lights.
    pub sun_count: u32,
    /// Number of point lights.
    pub point_light_count: u32,
    /// Size of the drawable in pixels.
    pub viewport: Extent2D,
    /// Feature switches in effect for this frame.
    pub features: FeatureToggles,
    /// Scene time in seconds, drives the water animation.
    pub time: f32,
    /// Geometry on the negative side of this plane is clipped.
    pub clip_plane: Plane,
}

impl FrameParams {
    /// Derives the parameters for another view of the same frame.
    pub fn with_view(&self, view: Mat4, camera_position: Vec3, clip_plane: Plane) -> Self {
        Self {
            view,
            view_proj: self.projection * view,
            camera_position,
            clip_plane,
            ..*self
        }
    }

    /// Derives the parameters for a differently sized target.
    pub fn with_viewport(&self, viewport: Extent2D) -> Self {
        Self { viewport, ..*self }
    }

    /// Packs the parameters into the uniform block the shaders read.
    pub fn uniforms(&self) -> FrameUniforms {
        let flags = FrameFlags::from_toggles(&self.features);
        FrameUniforms {
            view: self.view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            view_proj: self.view_proj.to_cols_array_2d(),
            shadow_view_proj: self.shadow_view_proj.to_cols_array_2d(),
            camera_position: self.camera_position.extend(self.time).to_array(),
            sun_direction: self.sun_direction.extend(0.0).to_array(),
            clip_plane: self.clip_plane.to_vec4().to_array(),
            viewport: Vec4::new(
                self.viewport.width as f32,
                self.viewport.height as f32,
                1.0 / self.viewport.width.max(1) as f32,
                1.0 / self.viewport.height.max(1) as f32,
            )
            .to_array(),
            counts: [
                self.sun_count,
                self.point_light_count,
                flags.bits(),
                (self.frame_index & u32::MAX as u64) as u32,
            ],
        }
    }
}

bitflags::bitflags! {
    /// Feature bits visible to shaders.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u32 {
        /// Sample the shadow map.
        const SHADOWS = 1 << 0;
        /// Discard low-alpha fragments.
        const ALPHA_TESTING = 1 << 1;
        /// Apply distance fog.
        const FOG = 1 << 2;
    }
}

impl FrameFlags {
    /// Maps feature toggles to shader-visible bits.
    pub fn from_toggles(features: &FeatureToggles) -> Self {
        let mut flags = FrameFlags::empty();
        flags.set(FrameFlags::SHADOWS, features.shadows);
        flags.set(FrameFlags::ALPHA_TESTING, features.alpha_testing);
        flags.set(FrameFlags::FOG, features.fog);
        flags
    }
}

/// The GPU layout of [`FrameParams`].
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct FrameUniforms {
    /// World to view.
    pub view: [[f32; 4]; 4],
    /// View to clip.
    pub projection: [[f32; 4]; 4],
    /// World to clip.
    pub view_proj: [[f32; 4]; 4],
    /// World to light clip.
    pub shadow_view_proj: [[f32; 4]; 4],
    /// xyz camera position, w scene time.
    pub camera_position: [f32; 4],
    /// xyz direction toward the sun.
    pub sun_direction: [f32; 4],
    /// Clip plane coefficients.
    pub clip_plane: [f32; 4],
    /// Width, height and their reciprocals.
    pub viewport: [f32; 4],
    /// Sun count, point light count, flag bits, frame index.
    pub counts: [u32; 4],
}

impl FrameUniforms {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FrameParams {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        FrameParams {
            frame_index: 7,
            view,
            projection,
            view_proj: projection * view,
            camera_position: Vec3::new(0.0, 2.0, 5.0),
            shadow_view_proj: Mat4::IDENTITY,
            sun_direction: Vec3::Y,
            sun_count: 1,
            point_light_count: 0,
            viewport: Extent2D::new(800, 600),
            features: FeatureToggles::default(),
            time: 1.5,
            clip_plane: Plane::NONE,
        }
    }

    #[test]
    fn derived_view_leaves_original_untouched() {
        let base = params();
        let mirrored = base.with_view(Mat4::IDENTITY, Vec3::ZERO, Plane::above(0.0));
        assert_eq!(base.view, params().view);
        assert_eq!(mirrored.view_proj, base.projection);
        assert_eq!(mirrored.frame_index, base.frame_index);
        assert_eq!(base.clip_plane, Plane::NONE);
    }

    #[test]
    fn uniforms_pack_counts_and_time() {
        let uniforms = params().uniforms();
        assert_eq!(uniforms.counts[0], 1);
        assert_eq!(uniforms.counts[3], 7);
        assert_eq!(uniforms.camera_position[3], 1.5);
        assert_eq!(FrameUniforms::SIZE % 16, 0);
    }
}
