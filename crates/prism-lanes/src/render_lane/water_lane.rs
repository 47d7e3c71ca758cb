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

//! Reflection and refraction views of the water plane.

use super::scene_draw::{draw_geometry, GeometryPipelines, ShadowSampling};
use super::{PassConfig, PassContext, PassState, RenderPassLane};
use crate::error::PassError;
use crate::resources::{
    PipelineFlags, PipelineKey, RenderTargetPool, TargetDesc, TargetPurpose, TargetSize, ViewSlot,
};
use prism_core::lane::{Lane, LaneKind};
use prism_core::math::{LinearRgba, Plane};
use prism_core::renderer::api::{
    Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    TextureFormat, TextureViewId,
};
use prism_core::renderer::{
    FeatureToggles, FrameParams, GpuContext, InputSpec, ResourceSet, ResourceSlot, ShaderVariant, TargetHandle,
};
use prism_core::scene::SceneSnapshot;

const PASS: &str = "water";

const COLOR_FORMAT: TextureFormat = TextureFormat::Bgra8Unorm;
const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const DRAW_CALL_COST: f32 = 0.1;

const INPUTS: &[InputSpec] = &[InputSpec::optional(ResourceSlot::ShadowMap)];

/// Clip flags of the reflection and refraction views.
const VIEW_FLAGS: [PipelineFlags; 2] = [
    PipelineFlags::CLIP_PLANE.union(PipelineFlags::MIRRORED),
    PipelineFlags::CLIP_PLANE,
];

fn geometry_key(features: &FeatureToggles) -> PipelineKey {
    PipelineKey::new(ShaderVariant::Forward)
        .with_color(COLOR_FORMAT)
        .with_depth(DEPTH_FORMAT)
        .with_flags(PipelineFlags::from_features(features))
}

#[derive(Debug, Clone, Copy)]
struct WaterTargets {
    reflection: TargetHandle,
    refraction: TargetHandle,
    depth: TargetHandle,
}

/// One of the two extra views.
struct View {
    slot: ViewSlot,
    label: &'static str,
    color: TextureViewId,
    flags: PipelineFlags,
    params: FrameParams,
}

/// Renders the opaque scene twice at half resolution: mirrored above the
/// water plane for reflections, and clipped below it for refractions.
///
/// The depth target is shared between both views and ends up holding the
/// refraction depth, which the water surface samples for its thickness.
#[derive(Debug, Default)]
pub struct WaterLane {
    state: PassState,
    targets: Option<WaterTargets>,
    shadow: ShadowSampling,
    clear_color: LinearRgba,
}

impl WaterLane {
    /// Creates a lane without targets. Call `resize` before encoding.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lane for WaterLane {
    fn strategy_name(&self) -> &'static str {
        PASS
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::View
    }

    fn estimate_cost(&self, scene: &SceneSnapshot) -> f32 {
        if scene.water.is_none() {
            return 0.0;
        }
        2.0 * scene.submesh_count() as f32 * DRAW_CALL_COST
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderPassLane for WaterLane {
    fn state(&self) -> PassState {
        self.state
    }

    fn inputs(&self) -> &'static [InputSpec] {
        INPUTS
    }

    fn resize(&mut self, config: &mut PassConfig<'_>) -> Result<(), PassError> {
        self.state.check_resize(PASS)?;
        let device = config.gpu.device();
        let pool = &mut *config.pool;
        let half = |format| TargetDesc::new(TargetSize::HalfViewport, format);
        self.targets = Some(WaterTargets {
            reflection: pool.allocate(device, TargetPurpose::ReflectionColor, half(COLOR_FORMAT))?,
            refraction: pool.allocate(device, TargetPurpose::RefractionColor, half(COLOR_FORMAT))?,
            depth: pool.allocate(device, TargetPurpose::WaterDepth, half(DEPTH_FORMAT))?,
        });
        ShadowSampling::allocate_fallback(device, pool)?;
        self.clear_color = config.settings.clear_color;
        let base = geometry_key(&config.settings.features);
        for flags in VIEW_FLAGS {
            GeometryPipelines::warm(config.pipelines, config.gpu, base.with_flags(flags))?;
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
        let Some(plane) = ctx.scene.water else {
            log::trace!("No water plane in the scene; skipping reflection and refraction");
            return Ok(ResourceSet::new());
        };
        let (gpu, pool) = (ctx.gpu, ctx.pool);
        let device = gpu.device();
        let reflection = pool.get(targets.reflection)?;
        let refraction = pool.view(targets.refraction)?;
        let depth = pool.view(targets.depth)?;

        let half = reflection.size;
        let params = ctx.params;
        let (mirrored, mirrored_eye) = ctx.scene.camera.mirrored(plane.height);
        let views = [
            View {
                slot: ViewSlot::Reflection,
                label: "water_reflection",
                color: reflection.view,
                flags: VIEW_FLAGS[0],
                params: params
                    .with_view(mirrored, mirrored_eye, Plane::above(plane.height))
                    .with_viewport(half),
            },
            View {
                slot: ViewSlot::Refraction,
                label: "water_refraction",
                color: refraction,
                flags: VIEW_FLAGS[1],
                params: params
                    .with_view(params.view, params.camera_position, Plane::below(plane.height))
                    .with_viewport(half),
            },
        ];

        let layouts = *ctx.pipelines.layouts();
        let shadow_group = self
            .shadow
            .bind(device, pool, &layouts, ctx.buffers, inputs, PASS)?;
        let base = geometry_key(&params.features);

        for view in &views {
            ctx.buffers.write_view(device, view.slot, &view.params)?;
            let key = base.with_flags(view.flags);
            let pipelines = GeometryPipelines::resolve(ctx.pipelines, gpu, key, ctx.draws)?;
            let color_attachments = [RenderPassColorAttachment {
                view: view.color,
                resolve_target: None,
                ops: Operations::clear(self.clear_color),
            }];
            {
                let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                    label: Some(view.label),
                    color_attachments: &color_attachments,
                    depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                        view: depth,
                        depth_ops: Some(Operations::clear(1.0)),
                        stencil_ops: None,
                    }),
                });
                pass.set_bind_group(0, ctx.buffers.view_bind_group(view.slot));
                pass.set_bind_group(1, shadow_group);
                draw_geometry(pass.as_mut(), ctx.draws.opaque(), &pipelines, &mut ctx.counters);
            }
            ctx.counters.scene_traversals += 1;
        }

        self.state = PassState::Ready;
        Ok(ResourceSet::new()
            .with(ResourceSlot::ReflectionColor, targets.reflection)
            .with(ResourceSlot::RefractionColor, targets.refraction)
            .with(ResourceSlot::WaterDepth, targets.depth))
    }

    fn dispose(&mut self, gpu: &GpuContext, pool: &mut RenderTargetPool) {
        let device = gpu.device();
        for purpose in [
            TargetPurpose::ReflectionColor,
            TargetPurpose::RefractionColor,
            TargetPurpose::WaterDepth,
        ] {
            pool.release(device, purpose);
        }
        self.shadow.release(device);
        self.targets = None;
        self.state = PassState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::{count, Harness};
    use crate::render_lane::ForwardLane;
    use prism_core::math::{Extent2D, Vec3};
    use prism_core::renderer::FrameUniforms;
    use prism_test::{Command, RecordingDevice, SceneBuilder};

    #[test]
    fn renders_two_half_resolution_views() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = WaterLane::new();
        h.resize(&mut lane).unwrap();
        let scene = SceneBuilder::new(h.gpu.device())
            .unwrap()
            .sun(Vec3::Y)
            .opaque("rock", Vec3::ZERO)
            .transparent("glass", Vec3::X)
            .water(0.5)
            .build();
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();

        assert_eq!(out.counters.scene_traversals, 2);
        assert_eq!(count(&out.commands, |c| matches!(c, Command::BeginRenderPass { .. })), 2);
        // Only the rock, once per view.
        assert_eq!(count(&out.commands, |c| matches!(c, Command::DrawIndexed { .. })), 2);
        for slot in [ResourceSlot::ReflectionColor, ResourceSlot::RefractionColor] {
            let target = h.pool.get(out.outputs.get(slot).unwrap()).unwrap();
            assert_eq!(target.size, Extent2D::new(400, 300));
            assert_eq!(target.format, TextureFormat::Bgra8Unorm);
        }
        assert!(out.outputs.contains(ResourceSlot::WaterDepth));

        let reflection = h.device.buffer_data(h.buffers.view_uniforms(ViewSlot::Reflection)).unwrap();
        let uniforms: FrameUniforms =
            bytemuck::pod_read_unaligned(&reflection[..std::mem::size_of::<FrameUniforms>()]);
        assert_eq!(uniforms.clip_plane, [0.0, 1.0, 0.0, -0.5]);
        assert_eq!(uniforms.viewport[0], 400.0);
    }

    #[test]
    fn mirrored_pipeline_flips_the_winding() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = WaterLane::new();
        h.resize(&mut lane).unwrap();
        let created = h.device.render_pipeline_count();
        let scene = SceneBuilder::new(h.gpu.device())
            .unwrap()
            .opaque("rock", Vec3::ZERO)
            .water(0.0)
            .build();
        h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        let key = PipelineKey::new(ShaderVariant::Forward)
            .with_color(COLOR_FORMAT)
            .with_depth(DEPTH_FORMAT)
            .with_flags(PipelineFlags::CLIP_PLANE | PipelineFlags::MIRRORED);
        assert!(h.pipelines.contains(&key));
        assert!(h.pipelines.contains(&PipelineKey { flags: PipelineFlags::CLIP_PLANE, ..key }));
        // Both views were compiled on resize.
        assert_eq!(h.device.render_pipeline_count(), created);
    }

    #[test]
    fn scene_without_water_is_skipped() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = WaterLane::new();
        h.resize(&mut lane).unwrap();
        let scene = SceneBuilder::new(h.gpu.device()).unwrap().opaque("rock", Vec3::ZERO).build();
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        assert!(out.outputs.is_empty());
        assert!(out.commands.is_empty());
    }

    #[test]
    fn forward_pass_draws_the_surface() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut water = WaterLane::new();
        let mut forward = ForwardLane::new();
        h.resize(&mut water).unwrap();
        h.resize(&mut forward).unwrap();
        let scene = SceneBuilder::new(h.gpu.device())
            .unwrap()
            .sun(Vec3::Y)
            .opaque("rock", Vec3::ZERO)
            .water(0.5)
            .build();
        let views = h.encode(&mut water, &scene, &ResourceSet::new()).unwrap();
        let out = h.encode(&mut forward, &scene, &views.outputs).unwrap();
        // Rock plus the six-index water quad.
        let quads = count(&out.commands, |c| {
            matches!(c, Command::DrawIndexed { indices, .. } if *indices == (0..6))
        });
        assert_eq!(quads, 1);
        assert!(out
            .commands
            .iter()
            .any(|c| matches!(c, Command::SetBindGroup { index: 2, .. })));
    }
}
