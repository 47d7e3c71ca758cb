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

//! Defines data structures related to GPU texture and sampler resources.

use super::common::{SampleCount, TextureFormat};
use super::pipeline::CompareFunction;
use crate::math::Extent2D;
use std::borrow::Cow;

bitflags::bitflags! {
    /// A set of flags describing the allowed usages of a texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// The texture can be used as the source of a copy operation.
        const COPY_SRC = 1 << 0;
        /// The texture can be used as the destination of a copy operation.
        const COPY_DST = 1 << 1;
        /// The texture can be bound in a shader for sampling.
        const TEXTURE_BINDING = 1 << 2;
        /// The texture can be bound as a storage texture.
        const STORAGE_BINDING = 1 << 3;
        /// The texture can be used as a color or depth/stencil attachment.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// Where the contents of a texture live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageMode {
    /// Regular device memory; contents persist after a pass ends.
    #[default]
    Private,
    /// Tile memory only. Contents exist for the lifetime of a single render pass
    /// and can never be sampled by a later pass.
    Memoryless,
}

/// A descriptor used to create a 2D texture.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The dimensions of the texture.
    pub size: Extent2D,
    /// The number of samples per texel.
    pub sample_count: SampleCount,
    /// The memory format of the texture.
    pub format: TextureFormat,
    /// How the texture will be used.
    pub usage: TextureUsage,
    /// Where the texture contents live.
    pub storage: StorageMode,
}

/// Which aspects of a texture a view exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageAspect {
    /// All aspects.
    #[default]
    All,
    /// The stencil aspect only.
    StencilOnly,
    /// The depth aspect only.
    DepthOnly,
}

/// A descriptor for a texture view.
#[derive(Debug, Clone, Default)]
pub struct TextureViewDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The aspect of the texture this view exposes.
    pub aspect: ImageAspect,
}

/// How texture coordinates outside `[0, 1]` are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Tile the texture.
    Repeat,
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
    /// Tile with mirroring.
    MirrorRepeat,
}

/// Texel filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    #[default]
    Nearest,
    /// Linear interpolation.
    Linear,
}

/// A descriptor for a sampler.
#[derive(Debug, Clone, Default)]
pub struct SamplerDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Address mode for all coordinates.
    pub address_mode: AddressMode,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// If set, creates a comparison sampler (used for shadow maps).
    pub compare: Option<CompareFunction>,
}

/// An opaque handle to a GPU texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);

/// An opaque handle to a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewId(pub usize);

/// An opaque handle to a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(pub usize);
