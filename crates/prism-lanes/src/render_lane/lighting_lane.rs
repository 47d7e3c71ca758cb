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

//! The lighting pass of deferred shading.

use super::light_volume::{draw_lights, LightPipelines, LightRange};
use super::scene_draw::{draw_geometry, GeometryPipelines, ShadowSampling};
use super::water_surface::WaterSurface;
use super::{require, CachedBindGroup, LightVolume, PassConfig, PassContext, PassState, RenderPassLane};
use crate::error::PassError;
use crate::resources::{BlendMode, PipelineFlags, PipelineKey, RenderTargetPool, ViewSlot};
use prism_core::lane::{Lane, LaneKind};
use prism_core::math::LinearRgba;
use prism_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, Operations, RenderPassColorAttachment,
    RenderPassDepthStencilAttachment, RenderPassDescriptor, TextureFormat, TextureViewId,
};
use prism_core::renderer::{
    FeatureToggles, GpuContext, InputSpec, ResourceSet, ResourceSlot, ShaderVariant,
};
use prism_core::scene::SceneSnapshot;

const PASS: &str = "lighting";

const FULLSCREEN_COST: f32 = 0.5;

const INPUTS: &[InputSpec] = &[
    InputSpec::required(ResourceSlot::GBufferAlbedo),
    InputSpec::required(ResourceSlot::GBufferNormal),
    InputSpec::required(ResourceSlot::GBufferPosition),
    InputSpec::required(ResourceSlot::GBufferDepth),
    InputSpec::optional(ResourceSlot::ShadowMap),
    InputSpec::optional(ResourceSlot::ReflectionColor),
    InputSpec::optional(ResourceSlot::RefractionColor),
    InputSpec::optional(ResourceSlot::WaterDepth),
];

/// The blending of transparent geometry under the current toggles.
pub(crate) fn transparent_blend(features: &FeatureToggles) -> BlendMode {
    if features.alpha_blending {
        BlendMode::Alpha
    } else {
        BlendMode::Opaque
    }
}

/// Shades the G-buffer into the drawable, then draws the water surface and
/// the transparent geometry on top.
///
/// The G-buffer depth stays attached read-only so the stencil mask written by
/// the geometry pass limits lighting to covered pixels.
#[derive(Debug, Default)]
pub struct LightingLane {
    state: PassState,
    volume: Option<LightVolume>,
    gbuffer_group: CachedBindGroup<[TextureViewId; 4]>,
    shadow: ShadowSampling,
    water: WaterSurface,
    clear_color: LinearRgba,
}

impl LightingLane {
    /// Creates the lane. The light volume is uploaded on the first resize.
    pub fn new() -> Self {
        Self::default()
    }

    fn light_key(variant: ShaderVariant, color: TextureFormat, depth: TextureFormat) -> PipelineKey {
        PipelineKey::new(variant)
            .with_color(color)
            .with_depth(depth)
            .with_blend(BlendMode::Additive)
    }

    fn transparent_key(
        color: TextureFormat,
        depth: TextureFormat,
        features: &FeatureToggles,
    ) -> PipelineKey {
        PipelineKey::new(ShaderVariant::Forward)
            .with_color(color)
            .with_depth(depth)
            .with_blend(transparent_blend(features))
            .with_flags(PipelineFlags::from_features(features))
    }

    fn water_key(color: TextureFormat, depth: TextureFormat) -> PipelineKey {
        PipelineKey::new(ShaderVariant::WaterSurface)
            .with_color(color)
            .with_depth(depth)
    }
}

impl Lane for LightingLane {
    fn strategy_name(&self) -> &'static str {
        PASS
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Render
    }

    fn estimate_cost(&self, scene: &SceneSnapshot) -> f32 {
        let volumes = u32::from(scene.point_light_count() > 0);
        (scene.sun_count() + volumes) as f32 * FULLSCREEN_COST
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderPassLane for LightingLane {
    fn state(&self) -> PassState {
        self.state
    }

    fn inputs(&self) -> &'static [InputSpec] {
        INPUTS
    }

    fn resize(&mut self, config: &mut PassConfig<'_>) -> Result<(), PassError> {
        self.state.check_resize(PASS)?;
        let device = config.gpu.device();
        if self.volume.is_none() {
            self.volume = Some(LightVolume::new(device)?);
        }
        ShadowSampling::allocate_fallback(device, config.pool)?;
        self.clear_color = config.settings.clear_color;

        // Lighting draws against the G-buffer's depth-stencil target.
        let (gpu, color) = (config.gpu, config.surface_format);
        let depth = gpu.capabilities().depth_stencil_format();
        for variant in [ShaderVariant::DeferredSun, ShaderVariant::DeferredPointLight] {
            config.pipelines.get(gpu, &Self::light_key(variant, color, depth))?;
        }
        let transparent = Self::transparent_key(color, depth, &config.settings.features);
        GeometryPipelines::warm(config.pipelines, gpu, transparent)?;
        if config.settings.water {
            config.pipelines.get(gpu, &Self::water_key(color, depth))?;
        }
        self.state = PassState::Resized;
        Ok(())
    }

    fn encode(
        &mut self,
        ctx: &mut PassContext<'_>,
        inputs: &ResourceSet,
    ) -> Result<ResourceSet, PassError> {
        self.state.check_encode(PASS)?;
        let volume = self.volume.ok_or(PassError::NotResized { pass: PASS })?;
        let (gpu, pool) = (ctx.gpu, ctx.pool);
        let albedo = pool.view(require(inputs, PASS, ResourceSlot::GBufferAlbedo)?)?;
        let normal = pool.view(require(inputs, PASS, ResourceSlot::GBufferNormal)?)?;
        let position = pool.view(require(inputs, PASS, ResourceSlot::GBufferPosition)?)?;
        let depth = pool.get(require(inputs, PASS, ResourceSlot::GBufferDepth)?)?;
        let shadow_view = self.shadow.view(pool, inputs, PASS)?;

        let device = gpu.device();
        let layouts = *ctx.pipelines.layouts();
        let shadow_sampler = ctx.buffers.shadow_sampler();
        let views = [albedo, normal, position, shadow_view];
        let gbuffer_group = self.gbuffer_group.get_or_create(device, views, || {
            device.create_bind_group(&BindGroupDescriptor {
                label: Some("gbuffer_read"),
                layout: layouts.gbuffer_read,
                entries: &[
                    BindGroupEntry::texture(0, albedo),
                    BindGroupEntry::texture(1, normal),
                    BindGroupEntry::texture(2, position),
                    BindGroupEntry::texture(3, shadow_view),
                    BindGroupEntry::sampler(4, shadow_sampler),
                ],
            })
        })?;
        let shadow_group = self
            .shadow
            .bind(device, pool, &layouts, ctx.buffers, inputs, PASS)?;

        let color = ctx.frame_target.format;
        let lights = LightPipelines {
            sun: ctx.pipelines.get(
                ctx.gpu,
                &Self::light_key(ShaderVariant::DeferredSun, color, depth.format),
            )?,
            point: ctx.pipelines.get(
                ctx.gpu,
                &Self::light_key(ShaderVariant::DeferredPointLight, color, depth.format),
            )?,
        };
        let transparent = if ctx.draws.transparent().next().is_some() {
            let key = Self::transparent_key(color, depth.format, &ctx.params.features);
            Some(GeometryPipelines::resolve(ctx.pipelines, ctx.gpu, key, ctx.draws)?)
        } else {
            None
        };
        let water_key = Self::water_key(color, depth.format);
        let water = self.water.prepare_frame(ctx, inputs, water_key)?;
        let range = LightRange::new(ctx.scene, ctx.buffers);

        let color_attachments = [RenderPassColorAttachment {
            view: ctx.frame_target.view,
            resolve_target: None,
            ops: Operations::clear(self.clear_color),
        }];
        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("lighting"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: depth.view,
                    depth_ops: Some(Operations::load()),
                    stencil_ops: Some(Operations::load()),
                }),
            });
            pass.set_bind_group(0, ctx.buffers.view_bind_group(ViewSlot::Main));
            pass.set_bind_group(1, gbuffer_group);
            pass.set_stencil_reference(0);
            draw_lights(pass.as_mut(), &lights, &volume, range, &mut ctx.counters);

            pass.set_bind_group(1, shadow_group);
            if let Some(water) = water {
                water.draw(pass.as_mut(), &mut ctx.counters);
            }
            if let Some(pipelines) = transparent {
                draw_geometry(pass.as_mut(), ctx.draws.transparent(), &pipelines, &mut ctx.counters);
            }
        }

        self.state = PassState::Ready;
        Ok(ResourceSet::new())
    }

    fn dispose(&mut self, gpu: &GpuContext, _pool: &mut RenderTargetPool) {
        let device = gpu.device();
        if let Some(volume) = self.volume.take() {
            volume.destroy(device);
        }
        self.gbuffer_group.release(device);
        self.shadow.release(device);
        self.water.release(device);
        self.state = PassState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::{count, Encoded, Harness};
    use crate::render_lane::{GBufferLane, LIGHT_VOLUME_INDEX_COUNT};
    use prism_core::math::Vec3;
    use prism_test::{Command, RecordingDevice, SceneBuilder};

    fn render(scene_builder: impl FnOnce(SceneBuilder) -> SceneBuilder) -> Encoded {
        let mut h = Harness::new(RecordingDevice::new());
        let mut gbuffer = GBufferLane::new();
        let mut lighting = LightingLane::new();
        h.resize(&mut gbuffer).unwrap();
        h.resize(&mut lighting).unwrap();
        let scene = scene_builder(SceneBuilder::new(h.gpu.device()).unwrap()).build();
        let gbuffer_out = h.encode(&mut gbuffer, &scene, &ResourceSet::new()).unwrap();
        h.encode(&mut lighting, &scene, &gbuffer_out.outputs).unwrap()
    }

    #[test]
    fn one_sun_is_one_fullscreen_draw() {
        let out = render(|s| s.sun(Vec3::new(0.2, 1.0, 0.1)).opaque("floor", Vec3::ZERO));
        assert_eq!(out.counters.fullscreen_draws, 1);
        assert_eq!(out.counters.instanced_draws, 0);
        assert_eq!(count(&out.commands, |c| matches!(c, Command::Draw { .. })), 1);
        assert_eq!(count(&out.commands, |c| matches!(c, Command::DrawIndexed { .. })), 0);
    }

    #[test]
    fn point_lights_share_one_instanced_draw() {
        let out = render(|s| {
            s.sun(Vec3::Y)
                .point_light(Vec3::new(1.0, 1.0, 0.0))
                .point_light(Vec3::new(-1.0, 1.0, 0.0))
                .point_light(Vec3::new(0.0, 1.0, 2.0))
                .opaque("floor", Vec3::ZERO)
        });
        assert_eq!(out.counters.fullscreen_draws, 1);
        assert_eq!(out.counters.instanced_draws, 1);
        let volume_draws: Vec<_> = out
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { indices, instances, .. } => Some((indices.clone(), instances.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(volume_draws, vec![(0..LIGHT_VOLUME_INDEX_COUNT, 0..3)]);
        // Suns follow the point lights in the light buffer.
        assert!(out
            .commands
            .iter()
            .any(|c| matches!(c, Command::Draw { instances, .. } if *instances == (3..4))));
    }

    #[test]
    fn transparent_geometry_draws_after_lighting() {
        let out = render(|s| s.sun(Vec3::Y).opaque("wall", Vec3::ZERO).transparent("glass", Vec3::X));
        let light = out.commands.iter().position(|c| matches!(c, Command::Draw { .. })).unwrap();
        let glass = out
            .commands
            .iter()
            .position(|c| matches!(c, Command::DrawIndexed { .. }))
            .unwrap();
        assert!(light < glass);
        assert_eq!(count(&out.commands, |c| matches!(c, Command::DrawIndexed { .. })), 1);
    }

    #[test]
    fn resize_compiles_every_pipeline_a_frame_uses() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut gbuffer = GBufferLane::new();
        let mut lighting = LightingLane::new();
        h.resize(&mut gbuffer).unwrap();
        h.resize(&mut lighting).unwrap();
        let created = h.device.render_pipeline_count();

        let scene = SceneBuilder::new(h.gpu.device())
            .unwrap()
            .sun(Vec3::Y)
            .point_light(Vec3::ONE)
            .opaque("wall", Vec3::ZERO)
            .transparent("glass", Vec3::X)
            .build();
        let gbuffer_out = h.encode(&mut gbuffer, &scene, &ResourceSet::new()).unwrap();
        h.encode(&mut lighting, &scene, &gbuffer_out.outputs).unwrap();
        assert_eq!(h.device.render_pipeline_count(), created);
    }

    #[test]
    fn missing_gbuffer_is_an_error() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lighting = LightingLane::new();
        h.resize(&mut lighting).unwrap();
        let scene = SceneBuilder::new(h.gpu.device()).unwrap().sun(Vec3::Y).build();
        assert!(matches!(
            h.encode(&mut lighting, &scene, &ResourceSet::new()),
            Err(PassError::MissingInput {
                slot: ResourceSlot::GBufferAlbedo,
                ..
            })
        ));
    }
}
