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

//! Drawable models, submeshes and materials.

use crate::math::{LinearRgba, Mat4};
use crate::renderer::api::{
    BufferId, IndexFormat, VertexAttributeDescriptor, VertexBufferLayoutDescriptor, VertexFormat,
    VertexStepMode,
};
use std::borrow::Cow;

/// Index of a material in [`crate::scene::SceneSnapshot::materials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MaterialId(pub u32);

/// One indexed draw of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Submesh {
    /// The index buffer.
    pub index_buffer: BufferId,
    /// The format of the indices.
    pub index_format: IndexFormat,
    /// Number of indices to draw.
    pub index_count: u32,
    /// First index inside the buffer.
    pub first_index: u32,
    /// The material binding.
    pub material: MaterialId,
    /// Drawn after every opaque submesh, with blending when enabled.
    pub is_transparent: bool,
}

/// A drawable model: one vertex buffer, a transform and its submeshes.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Debug name.
    pub name: String,
    /// Model to world transform.
    pub transform: Mat4,
    /// Vertex buffer laid out as [`StandardVertex`].
    pub vertex_buffer: BufferId,
    /// The submeshes, drawn in order.
    pub submeshes: Vec<Submesh>,
    /// Selects the skinned pipeline permutation.
    pub has_skeleton: bool,
}

impl Model {
    /// Returns `true` if any submesh is transparent.
    pub fn has_transparency(&self) -> bool {
        self.submeshes.iter().any(|s| s.is_transparent)
    }
}

/// Surface parameters of a submesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Base color; alpha is the opacity.
    pub base_color: LinearRgba,
    /// Specular color.
    pub specular_color: LinearRgba,
    /// Specular exponent.
    pub shininess: f32,
    /// Ambient occlusion factor.
    pub ambient_occlusion: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: LinearRgba::WHITE,
            specular_color: LinearRgba::rgb(0.5, 0.5, 0.5),
            shininess: 32.0,
            ambient_occlusion: 1.0,
        }
    }
}

impl Material {
    /// Packs the material for upload.
    pub fn to_gpu(&self) -> GpuMaterial {
        GpuMaterial {
            base_color: self.base_color.to_array(),
            specular_color: self.specular_color.to_array(),
            params: [self.shininess, self.ambient_occlusion, 0.0, 0.0],
        }
    }
}

/// The GPU layout of a [`Material`].
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct GpuMaterial {
    /// Base color and opacity.
    pub base_color: [f32; 4],
    /// Specular color.
    pub specular_color: [f32; 4],
    /// Shininess, ambient occlusion.
    pub params: [f32; 4],
}

/// The vertex layout every model shares.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct StandardVertex {
    /// Object space position.
    pub position: [f32; 3],
    /// Object space normal.
    pub normal: [f32; 3],
    /// Texture coordinates.
    pub uv: [f32; 2],
}

static STANDARD_ATTRIBUTES: [VertexAttributeDescriptor; 3] = [
    VertexAttributeDescriptor {
        shader_location: 0,
        format: VertexFormat::Float32x3,
        offset: 0,
    },
    VertexAttributeDescriptor {
        shader_location: 1,
        format: VertexFormat::Float32x3,
        offset: 12,
    },
    VertexAttributeDescriptor {
        shader_location: 2,
        format: VertexFormat::Float32x2,
        offset: 24,
    },
];

impl StandardVertex {
    /// Byte stride of one vertex.
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;

    /// The buffer layout pipelines use for model geometry.
    pub fn layout() -> VertexBufferLayoutDescriptor<'static> {
        VertexBufferLayoutDescriptor {
            array_stride: Self::STRIDE,
            step_mode: VertexStepMode::Vertex,
            attributes: Cow::Borrowed(&STANDARD_ATTRIBUTES[..]),
        }
    }

    /// The position-only layout used for light volumes and the water plane.
    pub fn position_layout() -> VertexBufferLayoutDescriptor<'static> {
        VertexBufferLayoutDescriptor {
            array_stride: Self::STRIDE,
            step_mode: VertexStepMode::Vertex,
            attributes: Cow::Borrowed(&STANDARD_ATTRIBUTES[..1]),
        }
    }
}
