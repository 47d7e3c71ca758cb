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

//! Light sources of a scene snapshot.

use crate::math::Vec3;

/// The kind of a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// A directional light infinitely far away. Its `position` is a point along
    /// the direction toward the light.
    Sun,
    /// A local light radiating in every direction from its `position`.
    Point,
}

/// A light as supplied by the application.
///
/// # Examples
///
/// ```
/// use prism_core::scene::{Light, LightKind};
/// use prism_core::math::Vec3;
///
/// let sun = Light::sun(Vec3::new(1.0, 2.0, -2.0), Vec3::ONE);
/// assert_eq!(sun.kind, LightKind::Sun);
/// assert!((sun.direction().length() - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Sun or point.
    pub kind: LightKind,
    /// World position, or the direction toward the sun for [`LightKind::Sun`].
    pub position: Vec3,
    /// Diffuse color.
    pub color: Vec3,
    /// Specular color.
    pub specular_color: Vec3,
    /// Constant, linear and quadratic attenuation terms.
    pub attenuation: Vec3,
}

impl Light {
    /// A white-specular sun shining from `toward_light`.
    pub fn sun(toward_light: Vec3, color: Vec3) -> Self {
        Self {
            kind: LightKind::Sun,
            position: toward_light,
            color,
            specular_color: Vec3::splat(0.6),
            attenuation: Vec3::new(1.0, 0.0, 0.0),
        }
    }

    /// A point light with the given attenuation terms.
    pub fn point(position: Vec3, color: Vec3, attenuation: Vec3) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            color,
            specular_color: Vec3::splat(0.6),
            attenuation,
        }
    }

    /// The normalized direction toward a sun. Zero if `position` is zero.
    pub fn direction(&self) -> Vec3 {
        self.position.normalize_or_zero()
    }

    /// Distance at which a point light's contribution drops below 1/256.
    ///
    /// Used to scale the light volume. Returns `None` for suns.
    pub fn influence_radius(&self) -> Option<f32> {
        if self.kind != LightKind::Point {
            return None;
        }
        let brightest = self.color.max_element().max(1e-4);
        let threshold = 256.0 * brightest;
        let Vec3 { x: c, y: l, z: q } = self.attenuation;
        let radius = if q > f32::EPSILON {
            let disc = l * l - 4.0 * q * (c - threshold);
            (-l + disc.max(0.0).sqrt()) / (2.0 * q)
        } else if l > f32::EPSILON {
            (threshold - c) / l
        } else {
            MAX_LIGHT_RADIUS
        };
        Some(radius.clamp(0.01, MAX_LIGHT_RADIUS))
    }

    /// Packs the light for upload.
    pub fn to_gpu(&self) -> GpuLight {
        let kind = match self.kind {
            LightKind::Sun => 0.0,
            LightKind::Point => 1.0,
        };
        GpuLight {
            position: self.position.extend(kind).to_array(),
            color: self
                .color
                .extend(self.influence_radius().unwrap_or(0.0))
                .to_array(),
            specular_color: self.specular_color.extend(0.0).to_array(),
            attenuation: self.attenuation.extend(0.0).to_array(),
        }
    }
}

/// Upper bound of a point light's volume radius.
pub const MAX_LIGHT_RADIUS: f32 = 1000.0;

/// The GPU layout of a [`Light`].
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct GpuLight {
    /// xyz position, w kind (0 sun, 1 point).
    pub position: [f32; 4],
    /// rgb color, w volume radius.
    pub color: [f32; 4],
    /// rgb specular color.
    pub specular_color: [f32; 4],
    /// Constant, linear and quadratic terms.
    pub attenuation: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quadratic_radius_reaches_threshold() {
        let light = Light::point(Vec3::ZERO, Vec3::ONE, Vec3::new(1.0, 0.0, 1.0));
        let r = light.influence_radius().unwrap();
        let falloff = 1.0 / (1.0 + r * r);
        assert_relative_eq!(falloff, 1.0 / 256.0, max_relative = 1e-3);
    }

    #[test]
    fn unattenuated_point_uses_max_radius() {
        let light = Light::point(Vec3::ZERO, Vec3::ONE, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(light.influence_radius(), Some(MAX_LIGHT_RADIUS));
    }

    #[test]
    fn suns_have_no_volume() {
        let sun = Light::sun(Vec3::Y, Vec3::ONE);
        assert_eq!(sun.influence_radius(), None);
        assert_eq!(sun.to_gpu().position[3], 0.0);
    }
}
