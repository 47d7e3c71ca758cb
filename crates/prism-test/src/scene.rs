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

//! Builders for scene snapshots backed by real device buffers.

use prism_core::math::{LinearRgba, Mat4, Vec3};
use prism_core::renderer::api::{BufferDescriptor, BufferId, BufferUsage, IndexFormat};
use prism_core::renderer::{GraphicsDevice, ResourceError};
use prism_core::scene::{
    CameraView, Light, Material, MaterialId, Model, SceneSnapshot, StandardVertex, Submesh,
    WaterPlane,
};
use std::borrow::Cow;

/// Indices of the unit cube every built model shares.
pub const CUBE_INDEX_COUNT: u32 = 36;

/// Builds a [`SceneSnapshot`] whose models share one uploaded unit cube.
#[derive(Debug)]
pub struct SceneBuilder {
    scene: SceneSnapshot,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
}

impl SceneBuilder {
    /// Uploads the cube geometry and starts an empty scene.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        let (vertices, indices) = unit_cube();
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
        let vertex_buffer = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("cube vertices")),
                size: vertex_bytes.len() as u64,
                usage: BufferUsage::VERTEX,
            },
            vertex_bytes,
        )?;
        let index_buffer = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("cube indices")),
                size: index_bytes.len() as u64,
                usage: BufferUsage::INDEX,
            },
            index_bytes,
        )?;
        let scene = SceneSnapshot {
            materials: vec![Material::default()],
            ..Default::default()
        };
        Ok(Self {
            scene,
            vertex_buffer,
            index_buffer,
        })
    }

    /// Replaces the camera.
    pub fn camera(mut self, camera: CameraView) -> Self {
        self.scene.camera = camera;
        self
    }

    /// Adds a white sun shining from `toward_light`.
    pub fn sun(mut self, toward_light: Vec3) -> Self {
        self.scene.lights.push(Light::sun(toward_light, Vec3::ONE));
        self
    }

    /// Adds a point light.
    pub fn point_light(mut self, position: Vec3) -> Self {
        self.scene.lights.push(Light::point(
            position,
            Vec3::new(1.0, 0.8, 0.6),
            Vec3::new(1.0, 0.7, 1.8),
        ));
        self
    }

    /// Adds a material and returns its id.
    pub fn material(&mut self, base_color: LinearRgba) -> MaterialId {
        self.scene.materials.push(Material {
            base_color,
            ..Default::default()
        });
        MaterialId(self.scene.materials.len() as u32 - 1)
    }

    /// Adds a model with one cube submesh per entry of `transparency`.
    pub fn model(mut self, name: &str, transform: Mat4, transparency: &[bool]) -> Self {
        let submeshes = transparency
            .iter()
            .map(|&is_transparent| Submesh {
                index_buffer: self.index_buffer,
                index_format: IndexFormat::Uint16,
                index_count: CUBE_INDEX_COUNT,
                first_index: 0,
                material: MaterialId(0),
                is_transparent,
            })
            .collect();
        self.scene.models.push(Model {
            name: name.to_string(),
            transform,
            vertex_buffer: self.vertex_buffer,
            submeshes,
            has_skeleton: false,
        });
        self
    }

    /// Adds a single-submesh opaque model at `position`.
    pub fn opaque(self, name: &str, position: Vec3) -> Self {
        self.model(name, Mat4::from_translation(position), &[false])
    }

    /// Adds a single-submesh transparent model at `position`.
    pub fn transparent(self, name: &str, position: Vec3) -> Self {
        self.model(name, Mat4::from_translation(position), &[true])
    }

    /// Adds a water plane at `height`.
    pub fn water(mut self, height: f32) -> Self {
        self.scene.water = Some(WaterPlane {
            height,
            ..Default::default()
        });
        self
    }

    /// Sets the scene time.
    pub fn time(mut self, seconds: f32) -> Self {
        self.scene.time = seconds;
        self
    }

    /// Returns the snapshot.
    pub fn build(self) -> SceneSnapshot {
        self.scene
    }
}

/// A unit cube centered at the origin, 24 vertices and 36 `u16` indices.
pub fn unit_cube() -> (Vec<StandardVertex>, Vec<u16>) {
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X),
        (Vec3::Z, Vec3::Y, Vec3::NEG_X),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, up, right) in faces {
        let base = vertices.len() as u16;
        for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let p = normal * 0.5 + right * (u - 0.5) + up * (v - 0.5);
            vertices.push(StandardVertex {
                position: p.to_array(),
                normal: normal.to_array(),
                uv: [u, v],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}
