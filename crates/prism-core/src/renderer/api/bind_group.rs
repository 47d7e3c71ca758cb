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

//! Defines data structures for bind groups and bind group layouts.
//!
//! Bind groups are the mechanism for binding resources (buffers, textures, samplers)
//! to shaders in a graphics pipeline.

use super::buffer::BufferId;
use super::common::ShaderStages;
use super::texture::{SamplerId, TextureViewId};

/// An opaque handle to a bind group layout resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutId(pub usize);

/// An opaque handle to a bind group resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupId(pub usize);

/// Describes the type of buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferBindingType {
    /// A uniform buffer.
    Uniform,
    /// A storage buffer.
    Storage {
        /// Whether the buffer is read-only in the shader.
        read_only: bool,
    },
}

/// The type of texture sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    /// A floating-point texture sample.
    Float {
        /// Whether the texture can be filtered.
        filterable: bool,
    },
    /// A depth texture sample.
    Depth,
}

/// The type of sampler binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerBindingType {
    /// A filtering sampler.
    Filtering,
    /// A non-filtering sampler.
    NonFiltering,
    /// A comparison sampler.
    Comparison,
}

/// The type of resource bound at a binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// A buffer binding.
    Buffer {
        /// The type of buffer binding.
        ty: BufferBindingType,
    },
    /// A sampled 2D texture binding.
    Texture {
        /// The type of sampler that can sample this texture.
        sample_type: TextureSampleType,
        /// Whether the texture is multisampled.
        multisampled: bool,
    },
    /// A sampler binding.
    Sampler(SamplerBindingType),
}

/// Describes a single binding entry in a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    /// The binding index (e.g., `@binding(0)` in WGSL).
    pub binding: u32,
    /// Which shader stages can access this binding.
    pub visibility: ShaderStages,
    /// The type of resource being bound.
    pub ty: BindingType,
}

impl BindGroupLayoutEntry {
    /// A uniform buffer entry.
    pub fn uniform(binding: u32, visibility: ShaderStages) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
            },
        }
    }

    /// A storage buffer entry.
    pub fn storage(binding: u32, visibility: ShaderStages, read_only: bool) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only },
            },
        }
    }

    /// A 2D texture entry.
    pub fn texture(binding: u32, visibility: ShaderStages, sample_type: TextureSampleType) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Texture {
                sample_type,
                multisampled: false,
            },
        }
    }

    /// A sampler entry.
    pub fn sampler(binding: u32, visibility: ShaderStages, ty: SamplerBindingType) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Sampler(ty),
        }
    }
}

/// Describes a bind group layout to be created.
#[derive(Debug, Clone)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// Optional debug label.
    pub label: Option<&'a str>,
    /// The entries in this bind group layout.
    pub entries: &'a [BindGroupLayoutEntry],
}

/// Describes a buffer binding with offset and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    /// The buffer to bind.
    pub buffer: BufferId,
    /// Offset into the buffer in bytes.
    pub offset: u64,
    /// Size of the binding, or None to bind from offset to end of buffer.
    pub size: Option<std::num::NonZeroU64>,
}

/// Describes a single resource binding in a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    /// Binds a buffer with optional offset and size.
    Buffer(BufferBinding),
    /// Binds a texture view.
    TextureView(TextureViewId),
    /// Binds a sampler.
    Sampler(SamplerId),
}

/// A single entry in a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    /// The binding index.
    pub binding: u32,
    /// The resource to bind.
    pub resource: BindingResource,
}

impl BindGroupEntry {
    /// Binds a whole buffer.
    pub fn buffer(binding: u32, buffer: BufferId) -> Self {
        Self {
            binding,
            resource: BindingResource::Buffer(BufferBinding {
                buffer,
                offset: 0,
                size: None,
            }),
        }
    }

    /// Binds a texture view.
    pub fn texture(binding: u32, view: TextureViewId) -> Self {
        Self {
            binding,
            resource: BindingResource::TextureView(view),
        }
    }

    /// Binds a sampler.
    pub fn sampler(binding: u32, sampler: SamplerId) -> Self {
        Self {
            binding,
            resource: BindingResource::Sampler(sampler),
        }
    }
}

/// Describes a bind group to be created.
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    /// Optional debug label.
    pub label: Option<&'a str>,
    /// The layout this bind group conforms to.
    pub layout: BindGroupLayoutId,
    /// The resources to bind at each binding point.
    pub entries: &'a [BindGroupEntry],
}
