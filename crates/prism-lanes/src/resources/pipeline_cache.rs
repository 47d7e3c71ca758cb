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

//! The pipeline state cache.
//!
//! Pipelines are compiled lazily on first use and keyed by everything that
//! changes their compiled state: shader variant, attachment formats, blending,
//! sample count and a handful of permutation flags. Toggling a feature back and
//! forth therefore switches between two cached pipelines and never compiles
//! twice.

use prism_core::renderer::api::{
    BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindGroupLayoutId, BlendStateDescriptor,
    ColorTargetStateDescriptor, ColorWrites, CompareFunction, ComputePipelineDescriptor,
    ComputePipelineId, CullMode, DepthBiasState, DepthStencilStateDescriptor, FrontFace,
    MultisampleStateDescriptor, PipelineLayoutDescriptor, PipelineLayoutId, PolygonMode,
    PrimitiveStateDescriptor, RenderPipelineDescriptor, RenderPipelineId, SampleCount,
    SamplerBindingType, ShaderStages, StencilFaceState, StencilOperation, TextureFormat,
    TextureSampleType, VertexBufferLayoutDescriptor,
};
use prism_core::renderer::{FeatureToggles, GpuContext, GraphicsDevice, ResourceError, ShaderVariant};
use prism_core::scene::StandardVertex;
use ahash::AHashMap;
use std::borrow::Cow;

/// Maximum number of color attachments a pipeline key can describe.
pub const MAX_COLOR_TARGETS: usize = 4;

/// Blending applied to the first color target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending, depth writes on.
    #[default]
    Opaque,
    /// "Over" blending, depth writes off.
    Alpha,
    /// Additive accumulation, used by light volumes.
    Additive,
}

impl BlendMode {
    fn state(&self) -> Option<BlendStateDescriptor> {
        match self {
            BlendMode::Opaque => None,
            BlendMode::Alpha => Some(BlendStateDescriptor::ALPHA_BLENDING),
            BlendMode::Additive => Some(BlendStateDescriptor::ADDITIVE),
        }
    }
}

bitflags::bitflags! {
    /// Pipeline permutations beyond variant and attachments.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineFlags: u32 {
        /// Geometry is skinned.
        const HAS_SKELETON = 1 << 0;
        /// Fragments below the alpha threshold are discarded.
        const ALPHA_TESTING = 1 << 1;
        /// Distance fog is applied.
        const FOG = 1 << 2;
        /// Triangles are rasterized as lines.
        const WIREFRAME = 1 << 3;
        /// A user clip plane is active.
        const CLIP_PLANE = 1 << 4;
        /// The view is mirrored, so the front face winding flips.
        const MIRRORED = 1 << 5;
    }
}

impl PipelineFlags {
    /// The permutation bits implied by the frame's feature toggles.
    pub fn from_features(features: &FeatureToggles) -> Self {
        let mut flags = PipelineFlags::empty();
        flags.set(PipelineFlags::ALPHA_TESTING, features.alpha_testing);
        flags.set(PipelineFlags::FOG, features.fog);
        flags.set(PipelineFlags::WIREFRAME, features.wireframe);
        flags
    }
}

/// Everything that identifies a compiled render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// The shader program.
    pub variant: ShaderVariant,
    /// Color attachment formats, in attachment order.
    pub color_formats: [Option<TextureFormat>; MAX_COLOR_TARGETS],
    /// Depth attachment format.
    pub depth_format: Option<TextureFormat>,
    /// Blending of the first color target.
    pub blend: BlendMode,
    /// Samples per pixel of every attachment.
    pub sample_count: SampleCount,
    /// Permutation bits.
    pub flags: PipelineFlags,
}

impl PipelineKey {
    /// A key for `variant` with no attachments yet.
    pub fn new(variant: ShaderVariant) -> Self {
        Self {
            variant,
            color_formats: [None; MAX_COLOR_TARGETS],
            depth_format: None,
            blend: BlendMode::Opaque,
            sample_count: SampleCount::X1,
            flags: PipelineFlags::empty(),
        }
    }

    /// Sets a single color attachment.
    pub fn with_color(self, format: TextureFormat) -> Self {
        self.with_colors(&[format])
    }

    /// Sets the color attachments. Formats past [`MAX_COLOR_TARGETS`] are ignored.
    pub fn with_colors(mut self, formats: &[TextureFormat]) -> Self {
        self.color_formats = [None; MAX_COLOR_TARGETS];
        for (slot, format) in self.color_formats.iter_mut().zip(formats) {
            *slot = Some(*format);
        }
        self
    }

    /// Sets the depth attachment.
    pub fn with_depth(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Sets the blend mode.
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Sets the sample count.
    pub fn with_samples(mut self, sample_count: SampleCount) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// Adds permutation flags.
    pub fn with_flags(mut self, flags: PipelineFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// The color formats in use.
    pub fn color_formats(&self) -> impl Iterator<Item = TextureFormat> + '_ {
        self.color_formats.iter().map_while(|f| *f)
    }

    /// Number of color attachments.
    pub fn color_count(&self) -> usize {
        self.color_formats().count()
    }
}

/// The bind group layouts every pass shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardLayouts {
    /// Group 0: frame uniforms, draw table, materials and lights.
    pub view: BindGroupLayoutId,
    /// Shadow map with its comparison sampler.
    pub shadow_sampling: BindGroupLayoutId,
    /// Sampled G-buffer plus the shadow map.
    pub gbuffer_read: BindGroupLayoutId,
    /// Reflection, refraction and water depth plus the surface uniforms.
    pub water: BindGroupLayoutId,
    /// Indirect encoding sources and argument buffer.
    pub indirect_encode: BindGroupLayoutId,
}

impl StandardLayouts {
    fn create(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        let all = ShaderStages::VERTEX_FRAGMENT;
        let fragment = ShaderStages::FRAGMENT;
        let float = TextureSampleType::Float { filterable: false };
        let view = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("view"),
            entries: &[
                BindGroupLayoutEntry::uniform(0, all),
                BindGroupLayoutEntry::storage(1, all, true),
                BindGroupLayoutEntry::storage(2, all, true),
                BindGroupLayoutEntry::storage(3, all, true),
            ],
        })?;
        let shadow_sampling = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("shadow_sampling"),
            entries: &[
                BindGroupLayoutEntry::texture(0, fragment, TextureSampleType::Depth),
                BindGroupLayoutEntry::sampler(1, fragment, SamplerBindingType::Comparison),
            ],
        })?;
        let gbuffer_read = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("gbuffer_read"),
            entries: &[
                BindGroupLayoutEntry::texture(0, fragment, float),
                BindGroupLayoutEntry::texture(1, fragment, float),
                BindGroupLayoutEntry::texture(2, fragment, float),
                BindGroupLayoutEntry::texture(3, fragment, TextureSampleType::Depth),
                BindGroupLayoutEntry::sampler(4, fragment, SamplerBindingType::Comparison),
            ],
        })?;
        let water = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("water"),
            entries: &[
                BindGroupLayoutEntry::texture(0, fragment, TextureSampleType::Float { filterable: true }),
                BindGroupLayoutEntry::texture(1, fragment, TextureSampleType::Float { filterable: true }),
                BindGroupLayoutEntry::texture(2, fragment, TextureSampleType::Depth),
                BindGroupLayoutEntry::sampler(3, fragment, SamplerBindingType::Filtering),
                BindGroupLayoutEntry::uniform(4, all),
            ],
        })?;
        let indirect_encode = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("indirect_encode"),
            entries: &[
                BindGroupLayoutEntry::storage(0, ShaderStages::COMPUTE, true),
                BindGroupLayoutEntry::storage(1, ShaderStages::COMPUTE, false),
            ],
        })?;
        Ok(Self {
            view,
            shadow_sampling,
            gbuffer_read,
            water,
            indirect_encode,
        })
    }

    fn for_variant(&self, variant: ShaderVariant) -> Vec<BindGroupLayoutId> {
        match variant {
            ShaderVariant::ShadowDepth | ShaderVariant::GBuffer | ShaderVariant::TiledGBuffer => {
                vec![self.view]
            }
            ShaderVariant::DeferredSun | ShaderVariant::DeferredPointLight => {
                vec![self.view, self.gbuffer_read]
            }
            ShaderVariant::TiledSun
            | ShaderVariant::TiledPointLight
            | ShaderVariant::Forward
            | ShaderVariant::IndirectForward => vec![self.view, self.shadow_sampling],
            ShaderVariant::WaterSurface => vec![self.view, self.shadow_sampling, self.water],
            ShaderVariant::IndirectEncode => vec![self.indirect_encode],
        }
    }
}

/// Lazily compiled render and compute pipelines.
#[derive(Debug)]
pub struct PipelineCache {
    layouts: StandardLayouts,
    pipeline_layouts: AHashMap<ShaderVariant, PipelineLayoutId>,
    render: AHashMap<PipelineKey, RenderPipelineId>,
    compute: AHashMap<ShaderVariant, ComputePipelineId>,
}

impl PipelineCache {
    /// Creates the shared bind group layouts. No pipeline is compiled yet.
    pub fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        Ok(Self {
            layouts: StandardLayouts::create(device)?,
            pipeline_layouts: AHashMap::new(),
            render: AHashMap::new(),
            compute: AHashMap::new(),
        })
    }

    /// The shared bind group layouts.
    pub fn layouts(&self) -> &StandardLayouts {
        &self.layouts
    }

    /// Returns the pipeline for `key`, compiling it on first use.
    pub fn get(
        &mut self,
        gpu: &GpuContext,
        key: &PipelineKey,
    ) -> Result<RenderPipelineId, ResourceError> {
        if let Some(id) = self.render.get(key) {
            return Ok(*id);
        }
        let id = self.compile(gpu, key)?;
        self.render.insert(*key, id);
        Ok(id)
    }

    /// Returns the compute pipeline for `variant`, compiling it on first use.
    pub fn get_compute(
        &mut self,
        gpu: &GpuContext,
        variant: ShaderVariant,
    ) -> Result<ComputePipelineId, ResourceError> {
        if let Some(id) = self.compute.get(&variant) {
            return Ok(*id);
        }
        let shader = gpu.shaders().get(variant)?;
        let layout = self.pipeline_layout(gpu.device(), variant)?;
        let id = gpu.device().create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some(Cow::Borrowed(variant.name())),
            layout: Some(layout),
            shader_module: shader.module,
            entry_point: Cow::Borrowed(shader.primary_entry),
        })?;
        log::debug!("Compiled compute pipeline '{}'", variant.name());
        self.compute.insert(variant, id);
        Ok(id)
    }

    /// Returns `true` if `key` was already compiled.
    pub fn contains(&self, key: &PipelineKey) -> bool {
        self.render.contains_key(key)
    }

    /// Number of compiled render and compute pipelines.
    pub fn compiled_count(&self) -> usize {
        self.render.len() + self.compute.len()
    }

    fn pipeline_layout(
        &mut self,
        device: &dyn GraphicsDevice,
        variant: ShaderVariant,
    ) -> Result<PipelineLayoutId, ResourceError> {
        if let Some(id) = self.pipeline_layouts.get(&variant) {
            return Ok(*id);
        }
        let groups = self.layouts.for_variant(variant);
        let id = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(Cow::Borrowed(variant.name())),
            bind_group_layouts: &groups,
        })?;
        self.pipeline_layouts.insert(variant, id);
        Ok(id)
    }

    fn compile(
        &mut self,
        gpu: &GpuContext,
        key: &PipelineKey,
    ) -> Result<RenderPipelineId, ResourceError> {
        let shader = gpu.shaders().get(key.variant)?;
        let layout = self.pipeline_layout(gpu.device(), key.variant)?;
        let label = format!(
            "{}/{}x/{:?}/{:?}",
            key.variant.name(),
            key.sample_count.count(),
            key.blend,
            key.flags
        );

        let color_target_states: Vec<_> = key
            .color_formats()
            .enumerate()
            .map(|(index, format)| ColorTargetStateDescriptor {
                format,
                blend: if index == 0 { key.blend.state() } else { None },
                write_mask: color_write_mask(key.variant, index),
            })
            .collect();

        let id = gpu.device().create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(Cow::Owned(label.clone())),
            vertex_shader_module: shader.module,
            vertex_entry_point: Cow::Borrowed(shader.primary_entry),
            fragment_shader_module: shader.fragment_entry.map(|_| shader.module),
            fragment_entry_point: shader.fragment_entry.map(Cow::Borrowed),
            vertex_buffers_layout: Cow::Owned(vertex_layouts(key.variant)),
            layout: Some(layout),
            primitive_state: primitive_state(key),
            depth_stencil_state: key.depth_format.map(|format| depth_stencil_state(key, format)),
            color_target_states: Cow::Owned(color_target_states),
            multisample_state: MultisampleStateDescriptor {
                count: key.sample_count,
                ..Default::default()
            },
        })?;
        log::debug!("Compiled render pipeline '{label}'");
        Ok(id)
    }
}

fn vertex_layouts(variant: ShaderVariant) -> Vec<VertexBufferLayoutDescriptor<'static>> {
    match variant {
        ShaderVariant::ShadowDepth
        | ShaderVariant::DeferredPointLight
        | ShaderVariant::TiledPointLight
        | ShaderVariant::WaterSurface => vec![StandardVertex::position_layout()],
        ShaderVariant::GBuffer
        | ShaderVariant::TiledGBuffer
        | ShaderVariant::Forward
        | ShaderVariant::IndirectForward => vec![StandardVertex::layout()],
        ShaderVariant::DeferredSun | ShaderVariant::TiledSun | ShaderVariant::IndirectEncode => {
            Vec::new()
        }
    }
}

fn is_geometry(variant: ShaderVariant) -> bool {
    matches!(
        variant,
        ShaderVariant::ShadowDepth
            | ShaderVariant::GBuffer
            | ShaderVariant::TiledGBuffer
            | ShaderVariant::Forward
            | ShaderVariant::IndirectForward
    )
}

fn primitive_state(key: &PipelineKey) -> PrimitiveStateDescriptor {
    let cull_mode = match key.variant {
        // Light volumes are drawn from the inside when the camera enters them.
        ShaderVariant::DeferredPointLight | ShaderVariant::TiledPointLight => Some(CullMode::Front),
        ShaderVariant::DeferredSun | ShaderVariant::TiledSun | ShaderVariant::WaterSurface => None,
        _ => Some(CullMode::Back),
    };
    let front_face = if key.flags.contains(PipelineFlags::MIRRORED) {
        FrontFace::Cw
    } else {
        FrontFace::Ccw
    };
    let polygon_mode = if key.flags.contains(PipelineFlags::WIREFRAME) && is_geometry(key.variant) {
        PolygonMode::Line
    } else {
        PolygonMode::Fill
    };
    PrimitiveStateDescriptor {
        front_face,
        cull_mode,
        polygon_mode,
        ..Default::default()
    }
}

fn depth_stencil_state(key: &PipelineKey, format: TextureFormat) -> DepthStencilStateDescriptor {
    match key.variant {
        ShaderVariant::ShadowDepth => {
            let mut state = DepthStencilStateDescriptor::depth_only(format, true, CompareFunction::Less);
            state.bias = DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            };
            state
        }
        // Every covered pixel gets a non-zero stencil value.
        ShaderVariant::GBuffer | ShaderVariant::TiledGBuffer => {
            DepthStencilStateDescriptor::depth_only(format, true, CompareFunction::Less)
                .with_stencil(
                    StencilFaceState {
                        compare: CompareFunction::Always,
                        fail_op: StencilOperation::Keep,
                        depth_fail_op: StencilOperation::Keep,
                        depth_pass_op: StencilOperation::IncrementClamp,
                    },
                    0xFF,
                    0xFF,
                )
        }
        // Lighting only touches pixels the G-buffer pass wrote.
        ShaderVariant::DeferredSun
        | ShaderVariant::DeferredPointLight
        | ShaderVariant::TiledSun
        | ShaderVariant::TiledPointLight => {
            DepthStencilStateDescriptor::depth_only(format, false, CompareFunction::Always)
                .with_stencil(
                    StencilFaceState {
                        compare: CompareFunction::NotEqual,
                        ..StencilFaceState::IGNORE
                    },
                    0xFF,
                    0x00,
                )
        }
        _ => {
            let opaque = key.blend == BlendMode::Opaque;
            let compare = if opaque {
                CompareFunction::Less
            } else {
                CompareFunction::LessEqual
            };
            DepthStencilStateDescriptor::depth_only(format, opaque, compare)
        }
    }
}

fn color_write_mask(variant: ShaderVariant, index: usize) -> ColorWrites {
    match variant {
        // The fused pass writes the G-buffer to attachments 1..4 and leaves
        // the drawable untouched until lighting.
        ShaderVariant::TiledGBuffer if index == 0 => ColorWrites::empty(),
        ShaderVariant::TiledGBuffer | ShaderVariant::GBuffer => ColorWrites::ALL,
        _ if index == 0 => ColorWrites::ALL,
        _ => ColorWrites::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_test::{test_shader_sources, RecordingDevice};
    use std::sync::Arc;

    fn setup() -> (Arc<RecordingDevice>, GpuContext, PipelineCache) {
        let device = Arc::new(RecordingDevice::new());
        let gpu = GpuContext::new(device.clone(), &test_shader_sources(), 2).unwrap();
        let cache = PipelineCache::new(gpu.device()).unwrap();
        (device, gpu, cache)
    }

    fn forward_key(samples: SampleCount) -> PipelineKey {
        PipelineKey::new(ShaderVariant::Forward)
            .with_color(TextureFormat::Bgra8UnormSrgb)
            .with_depth(TextureFormat::Depth32Float)
            .with_samples(samples)
    }

    #[test]
    fn same_key_compiles_once() {
        let (device, gpu, mut cache) = setup();
        let key = forward_key(SampleCount::X1);
        let first = cache.get(&gpu, &key).unwrap();
        let second = cache.get(&gpu, &key).unwrap();
        assert_eq!(first, second);
        assert_eq!(device.render_pipeline_count(), 1);
    }

    #[test]
    fn sample_count_toggle_reuses_both_pipelines() {
        let (device, gpu, mut cache) = setup();
        let single = cache.get(&gpu, &forward_key(SampleCount::X1)).unwrap();
        let msaa = cache.get(&gpu, &forward_key(SampleCount::X4)).unwrap();
        assert_ne!(single, msaa);
        for _ in 0..1000 {
            cache.get(&gpu, &forward_key(SampleCount::X4)).unwrap();
            cache.get(&gpu, &forward_key(SampleCount::X1)).unwrap();
        }
        assert_eq!(device.render_pipeline_count(), 2);
        assert_eq!(device.pipeline(msaa).unwrap().sample_count, SampleCount::X4);
    }

    #[test]
    fn transparent_pipelines_blend_without_depth_writes() {
        let (device, gpu, mut cache) = setup();
        let id = cache
            .get(&gpu, &forward_key(SampleCount::X1).with_blend(BlendMode::Alpha))
            .unwrap();
        let record = device.pipeline(id).unwrap();
        assert_eq!(record.blends[0], Some(BlendStateDescriptor::ALPHA_BLENDING));
        let depth = record.depth_stencil.unwrap();
        assert!(!depth.depth_write_enabled);
        assert_eq!(depth.depth_compare, CompareFunction::LessEqual);
    }

    #[test]
    fn shadow_pipeline_is_depth_only_with_bias() {
        let (device, gpu, mut cache) = setup();
        let key = PipelineKey::new(ShaderVariant::ShadowDepth).with_depth(TextureFormat::Depth32Float);
        let record = device.pipeline(cache.get(&gpu, &key).unwrap()).unwrap();
        assert!(!record.has_fragment);
        assert!(record.color_formats.is_empty());
        let depth = record.depth_stencil.unwrap();
        assert_eq!(depth.bias.constant, 2);
        assert_eq!(depth.bias.slope_scale, 2.0);
    }

    #[test]
    fn gbuffer_marks_stencil_and_lighting_tests_it() {
        let (device, gpu, mut cache) = setup();
        let format = TextureFormat::Depth32FloatStencil8;
        let gbuffer = PipelineKey::new(ShaderVariant::GBuffer)
            .with_colors(&[TextureFormat::Bgra8Unorm, TextureFormat::Rgba16Float])
            .with_depth(format);
        let sun = PipelineKey::new(ShaderVariant::DeferredSun)
            .with_color(TextureFormat::Bgra8UnormSrgb)
            .with_depth(format);
        let fill = device.pipeline(cache.get(&gpu, &gbuffer).unwrap()).unwrap();
        let light = device.pipeline(cache.get(&gpu, &sun).unwrap()).unwrap();

        let fill = fill.depth_stencil.unwrap();
        assert_eq!(fill.stencil_front.depth_pass_op, StencilOperation::IncrementClamp);
        assert_eq!(fill.stencil_write_mask, 0xFF);

        let light = light.depth_stencil.unwrap();
        assert_eq!(light.stencil_front.compare, CompareFunction::NotEqual);
        assert_eq!(light.stencil_write_mask, 0);
        assert!(!light.depth_write_enabled);
    }

    #[test]
    fn wireframe_only_affects_geometry() {
        let (device, gpu, mut cache) = setup();
        let wire = forward_key(SampleCount::X1).with_flags(PipelineFlags::WIREFRAME);
        let sun = PipelineKey::new(ShaderVariant::DeferredSun)
            .with_color(TextureFormat::Bgra8UnormSrgb)
            .with_flags(PipelineFlags::WIREFRAME);
        let wire = device.pipeline(cache.get(&gpu, &wire).unwrap()).unwrap();
        let sun = device.pipeline(cache.get(&gpu, &sun).unwrap()).unwrap();
        assert_eq!(wire.polygon_mode, PolygonMode::Line);
        assert_eq!(sun.polygon_mode, PolygonMode::Fill);
    }

    #[test]
    fn missing_shader_variant_is_an_error() {
        let device = Arc::new(RecordingDevice::new());
        let gpu = GpuContext::new(device, &prism_core::renderer::ShaderSources::new(), 1).unwrap();
        let mut cache = PipelineCache::new(gpu.device()).unwrap();
        let err = cache.get(&gpu, &forward_key(SampleCount::X1)).unwrap_err();
        assert!(matches!(err, ResourceError::Shader(_)));
        assert_eq!(cache.compiled_count(), 0);
    }

    #[test]
    fn compute_pipeline_cached() {
        let (device, gpu, mut cache) = setup();
        let a = cache.get_compute(&gpu, ShaderVariant::IndirectEncode).unwrap();
        let b = cache.get_compute(&gpu, ShaderVariant::IndirectEncode).unwrap();
        assert_eq!(a, b);
        assert_eq!(device.compute_pipeline_count(), 1);
    }
}
