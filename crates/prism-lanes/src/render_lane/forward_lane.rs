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

//! Single-pass forward shading.

use super::lighting_lane::transparent_blend;
use super::scene_draw::{draw_geometry, GeometryPipelines, ShadowSampling};
use super::water_surface::WaterSurface;
use super::{PassConfig, PassContext, PassState, RenderPassLane};
use crate::error::PassError;
use crate::resources::{
    PipelineFlags, PipelineKey, RenderTargetPool, TargetDesc, TargetPurpose, TargetSize, ViewSlot,
};
use prism_core::lane::{Lane, LaneKind};
use prism_core::math::LinearRgba;
use prism_core::renderer::api::{
    Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    SampleCount, ScissorRect, TextureFormat,
};
use prism_core::renderer::{
    FeatureToggles, GpuContext, InputSpec, ResourceSet, ResourceSlot, ShaderVariant, TargetHandle,
};
use prism_core::scene::SceneSnapshot;

const PASS: &str = "forward";

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const TRIANGLE_COST: f32 = 0.001;
const DRAW_CALL_COST: f32 = 0.1;
/// Extra cost per light, since every fragment loops over all of them.
const LIGHT_COST: f32 = 0.05;

const INPUTS: &[InputSpec] = &[
    InputSpec::optional(ResourceSlot::ShadowMap),
    InputSpec::optional(ResourceSlot::ReflectionColor),
    InputSpec::optional(ResourceSlot::RefractionColor),
    InputSpec::optional(ResourceSlot::WaterDepth),
];

fn geometry_key(color: TextureFormat, samples: SampleCount, features: &FeatureToggles) -> PipelineKey {
    PipelineKey::new(ShaderVariant::Forward)
        .with_color(color)
        .with_depth(DEPTH_FORMAT)
        .with_samples(samples)
        .with_flags(PipelineFlags::from_features(features))
}

fn water_key(color: TextureFormat, samples: SampleCount) -> PipelineKey {
    PipelineKey::new(ShaderVariant::WaterSurface)
        .with_color(color)
        .with_depth(DEPTH_FORMAT)
        .with_samples(samples)
}

#[derive(Debug, Clone, Copy)]
struct ForwardTargets {
    /// Multisampled color, resolved into the drawable. `None` without MSAA.
    color: Option<TargetHandle>,
    depth: TargetHandle,
    sample_count: SampleCount,
}

/// Shades every light per fragment in one pass over the scene.
///
/// Opaque geometry is drawn first, then the water surface, then transparent
/// geometry in submission order. With antialiasing enabled the pass renders
/// into a multisampled color target and resolves into the drawable.
#[derive(Debug, Default)]
pub struct ForwardLane {
    state: PassState,
    targets: Option<ForwardTargets>,
    shadow: ShadowSampling,
    water: WaterSurface,
    clear_color: LinearRgba,
}

impl ForwardLane {
    /// Creates a lane without targets. Call `resize` before encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// The sample count of the current targets, once resized.
    pub fn sample_count(&self) -> Option<SampleCount> {
        self.targets.map(|t| t.sample_count)
    }
}

impl Lane for ForwardLane {
    fn strategy_name(&self) -> &'static str {
        PASS
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Render
    }

    fn estimate_cost(&self, scene: &SceneSnapshot) -> f32 {
        let triangles: u32 = scene
            .models
            .iter()
            .flat_map(|m| &m.submeshes)
            .map(|s| s.index_count / 3)
            .sum();
        let lights = scene.lights.len() as f32;
        triangles as f32 * TRIANGLE_COST
            + scene.submesh_count() as f32 * DRAW_CALL_COST * (1.0 + lights * LIGHT_COST)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderPassLane for ForwardLane {
    fn state(&self) -> PassState {
        self.state
    }

    fn inputs(&self) -> &'static [InputSpec] {
        INPUTS
    }

    fn resize(&mut self, config: &mut PassConfig<'_>) -> Result<(), PassError> {
        self.state.check_resize(PASS)?;
        let device = config.gpu.device();
        let sample_count = config
            .gpu
            .capabilities()
            .clamp_sample_count(config.settings.effective_sample_count());

        let color = if sample_count.is_multisampled() {
            let desc = TargetDesc::new(TargetSize::Viewport, config.surface_format)
                .multisampled(sample_count);
            Some(config.pool.allocate(device, TargetPurpose::SceneColorMsaa, desc)?)
        } else {
            config.pool.release(device, TargetPurpose::SceneColorMsaa);
            None
        };
        let depth_desc = TargetDesc::new(TargetSize::Viewport, DEPTH_FORMAT).multisampled(sample_count);
        let depth = config.pool.allocate(device, TargetPurpose::SceneDepth, depth_desc)?;
        ShadowSampling::allocate_fallback(device, config.pool)?;

        if self.sample_count() != Some(sample_count) {
            log::debug!("Forward pass renders with {}x MSAA", sample_count.count());
        }
        self.targets = Some(ForwardTargets {
            color,
            depth,
            sample_count,
        });
        self.clear_color = config.settings.clear_color;

        let (gpu, features) = (config.gpu, config.settings.features);
        let base = geometry_key(config.surface_format, sample_count, &features);
        GeometryPipelines::warm(config.pipelines, gpu, base)?;
        GeometryPipelines::warm(
            config.pipelines,
            gpu,
            base.with_blend(transparent_blend(&features)),
        )?;
        if config.settings.water {
            config
                .pipelines
                .get(gpu, &water_key(config.surface_format, sample_count))?;
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
        let targets = self.targets.ok_or(PassError::NotResized { pass: PASS })?;
        let (gpu, pool) = (ctx.gpu, ctx.pool);
        let depth_view = pool.view(targets.depth)?;
        let frame = ctx.frame_target;
        let color_attachment = match targets.color {
            Some(handle) => RenderPassColorAttachment {
                view: pool.view(handle)?,
                resolve_target: Some(frame.view),
                ops: Operations::clear_discard(self.clear_color),
            },
            None => RenderPassColorAttachment {
                view: frame.view,
                resolve_target: None,
                ops: Operations::clear(self.clear_color),
            },
        };

        let layouts = *ctx.pipelines.layouts();
        let shadow_group = self
            .shadow
            .bind(gpu.device(), pool, &layouts, ctx.buffers, inputs, PASS)?;

        let features = ctx.params.features;
        let base = geometry_key(frame.format, targets.sample_count, &features);
        let opaque = GeometryPipelines::resolve(ctx.pipelines, gpu, base, ctx.draws)?;
        let transparent = GeometryPipelines::resolve(
            ctx.pipelines,
            gpu,
            base.with_blend(transparent_blend(&features)),
            ctx.draws,
        )?;
        let water_key = water_key(frame.format, targets.sample_count);
        let water = self.water.prepare_frame(ctx, inputs, water_key)?;

        let color_attachments = [color_attachment];
        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("forward"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(Operations::clear_discard(1.0)),
                    stencil_ops: None,
                }),
            });
            if features.scissor_testing {
                pass.set_scissor_rect(ScissorRect::centered_half(frame.size.width, frame.size.height));
            }
            pass.set_bind_group(0, ctx.buffers.view_bind_group(ViewSlot::Main));
            pass.set_bind_group(1, shadow_group);
            draw_geometry(pass.as_mut(), ctx.draws.opaque(), &opaque, &mut ctx.counters);
            if let Some(water) = water {
                water.draw(pass.as_mut(), &mut ctx.counters);
            }
            draw_geometry(pass.as_mut(), ctx.draws.transparent(), &transparent, &mut ctx.counters);
        }
        ctx.counters.scene_traversals += 1;

        self.state = PassState::Ready;
        Ok(ResourceSet::new())
    }

    fn dispose(&mut self, gpu: &GpuContext, pool: &mut RenderTargetPool) {
        let device = gpu.device();
        pool.release(device, TargetPurpose::SceneColorMsaa);
        pool.release(device, TargetPurpose::SceneDepth);
        self.shadow.release(device);
        self.water.release(device);
        self.targets = None;
        self.state = PassState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::Harness;
    use prism_core::math::Vec3;
    use prism_core::renderer::api::BlendStateDescriptor;
    use prism_test::{Command, RecordingDevice, SceneBuilder};

    fn scene(h: &Harness) -> SceneSnapshot {
        SceneBuilder::new(h.gpu.device())
            .unwrap()
            .sun(Vec3::Y)
            .transparent("glass", Vec3::X)
            .opaque("wall", Vec3::ZERO)
            .build()
    }

    #[test]
    fn opaque_draws_precede_transparent_draws() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = ForwardLane::new();
        h.resize(&mut lane).unwrap();
        let scene = scene(&h);
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();

        // Draw ids follow model order, so the glass is draw 0 and the wall draw 1.
        let order: Vec<_> = out
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { instances, .. } => Some(instances.start),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![1, 0]);
        assert_eq!(out.counters.scene_traversals, 1);
    }

    #[test]
    fn transparent_geometry_blends_by_default() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = ForwardLane::new();
        h.resize(&mut lane).unwrap();
        let created = h.device.render_pipeline_count();
        let scene = scene(&h);
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        assert_eq!(h.device.render_pipeline_count(), created);

        let bound: Vec<_> = out
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::SetPipeline(id) => h.device.pipeline(*id),
                _ => None,
            })
            .collect();
        assert_eq!(bound.len(), 2);
        let (opaque, transparent) = (&bound[0], &bound[1]);
        assert_eq!(opaque.blends[0], None);
        assert!(opaque.depth_stencil.as_ref().unwrap().depth_write_enabled);
        assert_eq!(transparent.blends[0], Some(BlendStateDescriptor::ALPHA_BLENDING));
        assert!(!transparent.depth_stencil.as_ref().unwrap().depth_write_enabled);
    }

    #[test]
    fn antialiasing_resolves_into_the_drawable() {
        let mut h = Harness::new(RecordingDevice::new());
        h.settings.features.antialiasing = true;
        let mut lane = ForwardLane::new();
        h.resize(&mut lane).unwrap();
        assert_eq!(lane.sample_count(), Some(SampleCount::X4));

        let scene = scene(&h);
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        let (color, _) = out
            .commands
            .iter()
            .find_map(|c| match c {
                Command::BeginRenderPass { color, depth, .. } => Some((color[0], *depth)),
                _ => None,
            })
            .unwrap();
        assert_eq!(color.1, h.device.surface_view());
        let msaa = h.device.texture_of_view(color.0).unwrap();
        assert_eq!(msaa.sample_count, SampleCount::X4);

        h.settings.features.antialiasing = false;
        h.resize(&mut lane).unwrap();
        assert_eq!(lane.sample_count(), Some(SampleCount::X1));
        assert!(h.pool.target_for(TargetPurpose::SceneColorMsaa).is_none());
        assert!(!h.device.texture(msaa.id).is_some_and(|t| t.alive));
    }

    #[test]
    fn scissor_covers_the_center() {
        let mut h = Harness::new(RecordingDevice::new());
        h.settings.features.scissor_testing = true;
        let mut lane = ForwardLane::new();
        h.resize(&mut lane).unwrap();
        let scene = scene(&h);
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        assert!(out.commands.contains(&Command::SetScissorRect(ScissorRect {
            x: 200,
            y: 150,
            width: 400,
            height: 300,
        })));
    }

    #[test]
    fn runs_unshadowed_without_a_shadow_map() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = ForwardLane::new();
        h.resize(&mut lane).unwrap();
        let scene = scene(&h);
        assert!(h.encode(&mut lane, &scene, &ResourceSet::new()).is_ok());
        assert!(h.pool.target_for(TargetPurpose::FallbackShadow).is_some());
    }
}
