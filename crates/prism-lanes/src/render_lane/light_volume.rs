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

//! Point light volumes.
//!
//! Every point light is drawn as one instance of a shared icosahedron. The
//! vertex shader scales the unit mesh by the light's influence radius, read
//! from the light buffer at the instance id.

use crate::resources::SceneBuffers;
use prism_core::math::Vec3;
use prism_core::renderer::api::{BufferDescriptor, BufferId, BufferUsage, IndexFormat, RenderPipelineId};
use prism_core::renderer::{DrawCounters, GraphicsDevice, RenderPass, ResourceError};
use prism_core::scene::{SceneSnapshot, StandardVertex};
use std::borrow::Cow;

/// Number of indices of the light volume mesh (20 triangles).
pub const LIGHT_VOLUME_INDEX_COUNT: u32 = 60;

const FACES: [[u16; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];

/// An icosahedron whose faces enclose the unit sphere.
///
/// Scaled past the unit circumradius so that the flat faces never cut into
/// the sphere of influence. Faces wind counter-clockwise seen from outside.
pub fn icosahedron() -> (Vec<StandardVertex>, Vec<u16>) {
    let t = (1.0 + 5.0_f32.sqrt()) / 2.0;
    let corners = [
        Vec3::new(-1.0, t, 0.0),
        Vec3::new(1.0, t, 0.0),
        Vec3::new(-1.0, -t, 0.0),
        Vec3::new(1.0, -t, 0.0),
        Vec3::new(0.0, -1.0, t),
        Vec3::new(0.0, 1.0, t),
        Vec3::new(0.0, -1.0, -t),
        Vec3::new(0.0, 1.0, -t),
        Vec3::new(t, 0.0, -1.0),
        Vec3::new(t, 0.0, 1.0),
        Vec3::new(-t, 0.0, -1.0),
        Vec3::new(-t, 0.0, 1.0),
    ];
    // Inradius of a regular icosahedron with unit circumradius.
    let inradius = t * t / (3.0_f32.sqrt() * (1.0 + t * t).sqrt());
    let scale = 1.0 / inradius;

    let vertices = corners
        .iter()
        .map(|c| {
            let normal = c.normalize();
            StandardVertex {
                position: (normal * scale).to_array(),
                normal: normal.to_array(),
                uv: [0.0, 0.0],
            }
        })
        .collect();
    let indices = FACES.iter().flatten().copied().collect();
    (vertices, indices)
}

/// The uploaded light volume mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightVolume {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
}

impl LightVolume {
    /// Uploads the icosahedron.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        let (vertices, indices) = icosahedron();
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
        let vertex_buffer = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("light_volume_vertices")),
                size: vertex_bytes.len() as u64,
                usage: BufferUsage::VERTEX,
            },
            vertex_bytes,
        )?;
        let index_buffer = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("light_volume_indices")),
                size: index_bytes.len() as u64,
                usage: BufferUsage::INDEX,
            },
            index_bytes,
        )?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
        })
    }

    /// Releases both buffers.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for buffer in [self.vertex_buffer, self.index_buffer] {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("Failed to destroy light volume buffer: {e}");
            }
        }
    }
}

/// Pipelines of the light accumulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LightPipelines {
    pub(crate) sun: RenderPipelineId,
    pub(crate) point: RenderPipelineId,
}

/// Light counts and where the suns start in the light buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LightRange {
    pub(crate) first_sun: u32,
    pub(crate) suns: u32,
    pub(crate) points: u32,
}

impl LightRange {
    pub(crate) fn new(scene: &SceneSnapshot, buffers: &SceneBuffers) -> Self {
        Self {
            first_sun: buffers.sun_light_index(0),
            suns: scene.sun_count(),
            points: scene.point_light_count(),
        }
    }
}

/// Accumulates every light.
///
/// Suns are one full-screen triangle each, with the instance id selecting the
/// light. All point lights share a single instanced volume draw.
pub(crate) fn draw_lights(
    pass: &mut dyn RenderPass,
    pipelines: &LightPipelines,
    volume: &LightVolume,
    lights: LightRange,
    counters: &mut DrawCounters,
) {
    if lights.suns > 0 {
        pass.set_pipeline(pipelines.sun);
        for i in 0..lights.suns {
            let light = lights.first_sun + i;
            pass.draw(0..3, light..light + 1);
            counters.draw_calls += 1;
            counters.fullscreen_draws += 1;
        }
    }
    if lights.points > 0 {
        pass.set_pipeline(pipelines.point);
        pass.set_vertex_buffer(0, volume.vertex_buffer, 0);
        pass.set_index_buffer(volume.index_buffer, 0, IndexFormat::Uint16);
        pass.draw_indexed(0..LIGHT_VOLUME_INDEX_COUNT, 0, 0..lights.points);
        counters.draw_calls += 1;
        counters.instanced_draws += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icosahedron_encloses_unit_sphere() {
        let (vertices, indices) = icosahedron();
        assert_eq!(vertices.len(), 12);
        assert_eq!(indices.len() as u32, LIGHT_VOLUME_INDEX_COUNT);
        for face in indices.chunks(3) {
            let [a, b, c] = [face[0], face[1], face[2]]
                .map(|i| Vec3::from_array(vertices[i as usize].position));
            let normal = (b - a).cross(c - a).normalize();
            let distance = normal.dot(a);
            // Outward winding and the face plane sits on or outside the sphere.
            assert!(distance > 0.0);
            assert!(distance >= 1.0 - 1e-4, "face plane at {distance}");
        }
    }

    #[test]
    fn every_vertex_is_used() {
        let (_, indices) = icosahedron();
        for v in 0..12u16 {
            assert!(indices.contains(&v));
        }
    }
}
