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

//! The geometry pass of deferred shading.

use super::scene_draw::{draw_geometry, GeometryPipelines};
use super::{PassConfig, PassContext, PassState, RenderPassLane};
use crate::error::PassError;
use crate::resources::{
    PipelineFlags, PipelineKey, RenderTargetPool, TargetDesc, TargetPurpose, TargetSize, ViewSlot,
};
use prism_core::lane::{Lane, LaneKind};
use prism_core::math::LinearRgba;
use prism_core::renderer::api::{
    Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    TextureFormat,
};
use prism_core::renderer::{
    FeatureToggles, GpuContext, InputSpec, ResourceSet, ResourceSlot, ShaderVariant, TargetHandle,
};
use prism_core::scene::SceneSnapshot;

const PASS: &str = "gbuffer";

/// Albedo format of the G-buffer.
pub(crate) const ALBEDO_FORMAT: TextureFormat = TextureFormat::Bgra8Unorm;
/// Normal and position format of the G-buffer.
pub(crate) const GEOMETRY_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

const DRAW_CALL_COST: f32 = 0.1;

fn geometry_key(depth_format: TextureFormat, features: &FeatureToggles) -> PipelineKey {
    PipelineKey::new(ShaderVariant::GBuffer)
        .with_colors(&[ALBEDO_FORMAT, GEOMETRY_FORMAT, GEOMETRY_FORMAT])
        .with_depth(depth_format)
        .with_flags(PipelineFlags::from_features(features))
}

#[derive(Debug, Clone, Copy)]
struct GBufferTargets {
    albedo: TargetHandle,
    normal: TargetHandle,
    position: TargetHandle,
    depth: TargetHandle,
}

/// Writes albedo, normals, positions and a stencil coverage mask for the
/// opaque geometry.
///
/// Transparent geometry is left to the lighting pass, which draws it forward
/// on top of the lit result.
#[derive(Debug, Default)]
pub struct GBufferLane {
    state: PassState,
    targets: Option<GBufferTargets>,
    depth_format: Option<TextureFormat>,
    clear_color: LinearRgba,
}

impl GBufferLane {
    /// Creates a lane without targets. Call `resize` before encoding.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lane for GBufferLane {
    fn strategy_name(&self) -> &'static str {
        PASS
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Render
    }

    fn estimate_cost(&self, scene: &SceneSnapshot) -> f32 {
        scene.submesh_count() as f32 * DRAW_CALL_COST
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderPassLane for GBufferLane {
    fn state(&self) -> PassState {
        self.state
    }

    fn inputs(&self) -> &'static [InputSpec] {
        &[]
    }

    fn resize(&mut self, config: &mut PassConfig<'_>) -> Result<(), PassError> {
        self.state.check_resize(PASS)?;
        let device = config.gpu.device();
        let depth_format = config.gpu.capabilities().depth_stencil_format();
        let pool = &mut *config.pool;
        let color = |format| TargetDesc::new(TargetSize::Viewport, format);
        self.targets = Some(GBufferTargets {
            albedo: pool.allocate(device, TargetPurpose::GBufferAlbedo, color(ALBEDO_FORMAT))?,
            normal: pool.allocate(device, TargetPurpose::GBufferNormal, color(GEOMETRY_FORMAT))?,
            position: pool.allocate(device, TargetPurpose::GBufferPosition, color(GEOMETRY_FORMAT))?,
            depth: pool.allocate(device, TargetPurpose::GBufferDepth, color(depth_format))?,
        });
        self.depth_format = Some(depth_format);
        self.clear_color = config.settings.gbuffer_clear_color;
        GeometryPipelines::warm(
            config.pipelines,
            config.gpu,
            geometry_key(depth_format, &config.settings.features),
        )?;
        self.state = PassState::Resized;
        Ok(())
    }

    fn encode(
        &mut self,
        ctx: &mut PassContext<'_>,
        _inputs: &ResourceSet,
    ) -> Result<ResourceSet, PassError> {
        self.state.check_encode(PASS)?;
        let (Some(targets), Some(depth_format)) = (self.targets, self.depth_format) else {
            return Err(PassError::NotResized { pass: PASS });
        };
        let albedo = ctx.pool.view(targets.albedo)?;
        let normal = ctx.pool.view(targets.normal)?;
        let position = ctx.pool.view(targets.position)?;
        let depth = ctx.pool.view(targets.depth)?;

        let key = geometry_key(depth_format, &ctx.params.features);
        let pipelines = GeometryPipelines::resolve(ctx.pipelines, ctx.gpu, key, ctx.draws)?;

        let cleared = |view| RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: Operations::clear(LinearRgba::TRANSPARENT),
        };
        let color_attachments = [
            RenderPassColorAttachment {
                view: albedo,
                resolve_target: None,
                ops: Operations::clear(self.clear_color),
            },
            cleared(normal),
            cleared(position),
        ];
        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("gbuffer"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(Operations::clear(1.0)),
                    stencil_ops: Some(Operations::clear(0)),
                }),
            });
            pass.set_bind_group(0, ctx.buffers.view_bind_group(ViewSlot::Main));
            pass.set_stencil_reference(0);
            draw_geometry(pass.as_mut(), ctx.draws.opaque(), &pipelines, &mut ctx.counters);
        }
        ctx.counters.scene_traversals += 1;

        self.state = PassState::Ready;
        Ok(ResourceSet::new()
            .with(ResourceSlot::GBufferAlbedo, targets.albedo)
            .with(ResourceSlot::GBufferNormal, targets.normal)
            .with(ResourceSlot::GBufferPosition, targets.position)
            .with(ResourceSlot::GBufferDepth, targets.depth))
    }

    fn dispose(&mut self, gpu: &GpuContext, pool: &mut RenderTargetPool) {
        for purpose in [
            TargetPurpose::GBufferAlbedo,
            TargetPurpose::GBufferNormal,
            TargetPurpose::GBufferPosition,
            TargetPurpose::GBufferDepth,
        ] {
            pool.release(gpu.device(), purpose);
        }
        self.targets = None;
        self.state = PassState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::{count, Harness};
    use prism_core::math::{Extent2D, Vec3};
    use prism_core::renderer::api::{DeviceCapabilities, LoadOp};
    use prism_test::{Command, RecordingDevice, SceneBuilder};

    #[test]
    fn targets_use_the_gbuffer_formats() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = GBufferLane::new();
        h.resize(&mut lane).unwrap();

        let format = |purpose| h.pool.target_for(purpose).unwrap().format;
        assert_eq!(format(TargetPurpose::GBufferAlbedo), TextureFormat::Bgra8Unorm);
        assert_eq!(format(TargetPurpose::GBufferNormal), TextureFormat::Rgba16Float);
        assert_eq!(format(TargetPurpose::GBufferPosition), TextureFormat::Rgba16Float);
        assert_eq!(format(TargetPurpose::GBufferDepth), TextureFormat::Depth32FloatStencil8);
        assert_eq!(
            h.pool.target_for(TargetPurpose::GBufferAlbedo).unwrap().size,
            Extent2D::new(800, 600)
        );
    }

    #[test]
    fn depth_falls_back_without_depth32_stencil() {
        let caps = DeviceCapabilities {
            depth32_float_stencil8: false,
            ..Default::default()
        };
        let mut h = Harness::new(RecordingDevice::with_capabilities(caps));
        let mut lane = GBufferLane::new();
        h.resize(&mut lane).unwrap();
        let depth = h.pool.target_for(TargetPurpose::GBufferDepth).unwrap();
        assert_eq!(depth.format, caps.depth_stencil_format());
        assert!(depth.format.has_stencil());
    }

    #[test]
    fn draws_only_opaque_geometry() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = GBufferLane::new();
        h.resize(&mut lane).unwrap();
        let scene = SceneBuilder::new(h.gpu.device())
            .unwrap()
            .sun(Vec3::Y)
            .opaque("wall", Vec3::ZERO)
            .transparent("glass", Vec3::X)
            .build();
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();

        assert_eq!(count(&out.commands, |c| matches!(c, Command::DrawIndexed { .. })), 1);
        assert_eq!(out.counters.scene_traversals, 1);
        assert_eq!(out.outputs.len(), 4);
        for slot in [
            ResourceSlot::GBufferAlbedo,
            ResourceSlot::GBufferNormal,
            ResourceSlot::GBufferPosition,
            ResourceSlot::GBufferDepth,
        ] {
            assert!(out.outputs.contains(slot), "missing {slot}");
        }

        let loads = out
            .commands
            .iter()
            .find_map(|c| match c {
                Command::BeginRenderPass { color_loads, .. } => Some(color_loads.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(loads.len(), 3);
        assert_eq!(loads[0], LoadOp::Clear(h.settings.gbuffer_clear_color));
    }

    #[test]
    fn resize_reissues_handles() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = GBufferLane::new();
        h.resize(&mut lane).unwrap();
        let before = h.pool.handle_for(TargetPurpose::GBufferAlbedo).unwrap();
        h.viewport = Extent2D::new(1024, 768);
        h.resize(&mut lane).unwrap();
        let after = h.pool.handle_for(TargetPurpose::GBufferAlbedo).unwrap();
        assert_ne!(before, after);
        assert!(h.pool.get(before).is_err());
    }
}
