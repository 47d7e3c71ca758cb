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

//! Deferred shading fused into a single pass over tile memory.

use super::gbuffer_lane::{ALBEDO_FORMAT, GEOMETRY_FORMAT};
use super::light_volume::{draw_lights, LightPipelines, LightRange};
use super::lighting_lane::transparent_blend;
use super::scene_draw::{draw_geometry, GeometryPipelines, ShadowSampling};
use super::water_surface::WaterSurface;
use super::{LightVolume, PassConfig, PassContext, PassState, RenderPassLane};
use crate::error::PassError;
use crate::resources::{
    BlendMode, PipelineFlags, PipelineKey, RenderTargetPool, TargetDesc, TargetPurpose,
    TargetSize, ViewSlot,
};
use prism_core::lane::{Lane, LaneKind};
use prism_core::math::LinearRgba;
use prism_core::renderer::api::{
    Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    TextureFormat,
};
use prism_core::renderer::{
    GpuContext, InputSpec, ResourceSet, ResourceSlot, ShaderVariant, TargetHandle,
};
use prism_core::scene::SceneSnapshot;

const PASS: &str = "tiled_deferred";

const DRAW_CALL_COST: f32 = 0.1;
const FULLSCREEN_COST: f32 = 0.2;

const INPUTS: &[InputSpec] = &[
    InputSpec::optional(ResourceSlot::ShadowMap),
    InputSpec::optional(ResourceSlot::ReflectionColor),
    InputSpec::optional(ResourceSlot::RefractionColor),
    InputSpec::optional(ResourceSlot::WaterDepth),
];

const TILE_TARGETS: [TargetPurpose; 4] = [
    TargetPurpose::TileAlbedo,
    TargetPurpose::TileNormal,
    TargetPurpose::TilePosition,
    TargetPurpose::TileDepth,
];

/// A pipeline writing the drawable plus the three tile G-buffer attachments.
fn tile_key(variant: ShaderVariant, color: TextureFormat, depth: TextureFormat) -> PipelineKey {
    PipelineKey::new(variant)
        .with_colors(&[color, ALBEDO_FORMAT, GEOMETRY_FORMAT, GEOMETRY_FORMAT])
        .with_depth(depth)
}

#[derive(Debug, Clone, Copy)]
struct TileTargets {
    albedo: TargetHandle,
    normal: TargetHandle,
    position: TargetHandle,
    depth: TargetHandle,
    depth_format: TextureFormat,
}

/// Writes the G-buffer, accumulates lights and draws transparent geometry in
/// one render pass.
///
/// The G-buffer lives in memoryless attachments that the lighting shaders
/// read back from tile memory, so nothing but the drawable ever reaches
/// device memory. Only devices with tile memory can run this lane; resizing
/// it elsewhere fails with [`PassError::Unsupported`].
#[derive(Debug, Default)]
pub struct TiledDeferredLane {
    state: PassState,
    targets: Option<TileTargets>,
    volume: Option<LightVolume>,
    shadow: ShadowSampling,
    water: WaterSurface,
    clear_color: LinearRgba,
    gbuffer_clear_color: LinearRgba,
}

impl TiledDeferredLane {
    /// Creates a lane without targets. Call `resize` before encoding.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lane for TiledDeferredLane {
    fn strategy_name(&self) -> &'static str {
        PASS
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Render
    }

    fn estimate_cost(&self, scene: &SceneSnapshot) -> f32 {
        let volumes = u32::from(scene.point_light_count() > 0);
        scene.submesh_count() as f32 * DRAW_CALL_COST
            + (scene.sun_count() + volumes) as f32 * FULLSCREEN_COST
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderPassLane for TiledDeferredLane {
    fn state(&self) -> PassState {
        self.state
    }

    fn inputs(&self) -> &'static [InputSpec] {
        INPUTS
    }

    fn resize(&mut self, config: &mut PassConfig<'_>) -> Result<(), PassError> {
        self.state.check_resize(PASS)?;
        let caps = config.gpu.capabilities();
        if !caps.tile_memory {
            return Err(PassError::Unsupported {
                pass: PASS,
                reason: "the device has no tile memory".to_string(),
            });
        }
        let device = config.gpu.device();
        let depth_format = caps.depth_stencil_format();
        let pool = &mut *config.pool;
        let tile = |format| TargetDesc::new(TargetSize::Viewport, format).memoryless();
        self.targets = Some(TileTargets {
            albedo: pool.allocate(device, TargetPurpose::TileAlbedo, tile(ALBEDO_FORMAT))?,
            normal: pool.allocate(device, TargetPurpose::TileNormal, tile(GEOMETRY_FORMAT))?,
            position: pool.allocate(device, TargetPurpose::TilePosition, tile(GEOMETRY_FORMAT))?,
            depth: pool.allocate(device, TargetPurpose::TileDepth, tile(depth_format))?,
            depth_format,
        });
        if self.volume.is_none() {
            self.volume = Some(LightVolume::new(device)?);
        }
        ShadowSampling::allocate_fallback(device, pool)?;
        self.clear_color = config.settings.clear_color;
        self.gbuffer_clear_color = config.settings.gbuffer_clear_color;

        let (gpu, features, color) = (config.gpu, config.settings.features, config.surface_format);
        let key = |variant| tile_key(variant, color, depth_format);
        let flags = PipelineFlags::from_features(&features);
        let gbuffer = key(ShaderVariant::TiledGBuffer).with_flags(flags);
        GeometryPipelines::warm(config.pipelines, gpu, gbuffer)?;
        for variant in [ShaderVariant::TiledSun, ShaderVariant::TiledPointLight] {
            config
                .pipelines
                .get(gpu, &key(variant).with_blend(BlendMode::Additive))?;
        }
        GeometryPipelines::warm(
            config.pipelines,
            gpu,
            key(ShaderVariant::Forward)
                .with_blend(transparent_blend(&features))
                .with_flags(flags),
        )?;
        if config.settings.water {
            config.pipelines.get(gpu, &key(ShaderVariant::WaterSurface))?;
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
        let (Some(targets), Some(volume)) = (self.targets, self.volume) else {
            return Err(PassError::NotResized { pass: PASS });
        };
        let (gpu, pool) = (ctx.gpu, ctx.pool);
        let frame = ctx.frame_target;

        let layouts = *ctx.pipelines.layouts();
        let shadow_group = self
            .shadow
            .bind(gpu.device(), pool, &layouts, ctx.buffers, inputs, PASS)?;

        let features = ctx.params.features;
        let key = |variant| tile_key(variant, frame.format, targets.depth_format);
        let flags = PipelineFlags::from_features(&features);
        let gbuffer = GeometryPipelines::resolve(
            ctx.pipelines,
            gpu,
            key(ShaderVariant::TiledGBuffer).with_flags(flags),
            ctx.draws,
        )?;
        let lights = LightPipelines {
            sun: ctx.pipelines.get(gpu, &key(ShaderVariant::TiledSun).with_blend(BlendMode::Additive))?,
            point: ctx
                .pipelines
                .get(gpu, &key(ShaderVariant::TiledPointLight).with_blend(BlendMode::Additive))?,
        };
        let transparent = GeometryPipelines::resolve(
            ctx.pipelines,
            gpu,
            key(ShaderVariant::Forward)
                .with_blend(transparent_blend(&features))
                .with_flags(flags),
            ctx.draws,
        )?;
        let water = self
            .water
            .prepare_frame(ctx, inputs, key(ShaderVariant::WaterSurface))?;
        let range = LightRange::new(ctx.scene, ctx.buffers);

        let tile = |view, clear| RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: Operations::clear_discard(clear),
        };
        let color_attachments = [
            RenderPassColorAttachment {
                view: frame.view,
                resolve_target: None,
                ops: Operations::clear(self.clear_color),
            },
            tile(pool.view(targets.albedo)?, self.gbuffer_clear_color),
            tile(pool.view(targets.normal)?, LinearRgba::TRANSPARENT),
            tile(pool.view(targets.position)?, LinearRgba::TRANSPARENT),
        ];
        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("tiled_deferred"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: pool.view(targets.depth)?,
                    depth_ops: Some(Operations::clear_discard(1.0)),
                    stencil_ops: Some(Operations::clear_discard(0)),
                }),
            });
            pass.set_bind_group(0, ctx.buffers.view_bind_group(ViewSlot::Main));
            pass.set_bind_group(1, shadow_group);
            pass.set_stencil_reference(0);
            draw_geometry(pass.as_mut(), ctx.draws.opaque(), &gbuffer, &mut ctx.counters);
            draw_lights(pass.as_mut(), &lights, &volume, range, &mut ctx.counters);
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
        for purpose in TILE_TARGETS {
            pool.release(device, purpose);
        }
        if let Some(volume) = self.volume.take() {
            volume.destroy(device);
        }
        self.shadow.release(device);
        self.water.release(device);
        self.targets = None;
        self.state = PassState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::{count, Harness};
    use crate::render_lane::LIGHT_VOLUME_INDEX_COUNT;
    use prism_core::math::Vec3;
    use prism_core::renderer::api::StorageMode;
    use prism_test::{Command, RecordingDevice, SceneBuilder};

    #[test]
    fn refuses_devices_without_tile_memory() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = TiledDeferredLane::new();
        assert!(matches!(h.resize(&mut lane), Err(PassError::Unsupported { .. })));
        assert_eq!(h.device.memoryless_allocations(), 0);
        assert_eq!(lane.state(), PassState::Uninitialized);
    }

    #[test]
    fn gbuffer_stays_in_tile_memory() {
        let mut h = Harness::new(RecordingDevice::with_tile_memory());
        let mut lane = TiledDeferredLane::new();
        h.resize(&mut lane).unwrap();
        assert_eq!(h.device.memoryless_allocations(), 4);
        for purpose in TILE_TARGETS {
            assert_eq!(h.pool.target_for(purpose).unwrap().storage, StorageMode::Memoryless);
        }
    }

    #[test]
    fn resize_compiles_every_pipeline_a_frame_uses() {
        let mut h = Harness::new(RecordingDevice::with_tile_memory());
        let mut lane = TiledDeferredLane::new();
        h.resize(&mut lane).unwrap();
        let created = h.device.render_pipeline_count();
        let scene = SceneBuilder::new(h.gpu.device())
            .unwrap()
            .sun(Vec3::Y)
            .point_light(Vec3::ONE)
            .opaque("wall", Vec3::ZERO)
            .transparent("glass", Vec3::X)
            .build();
        h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        assert_eq!(h.device.render_pipeline_count(), created);
    }

    #[test]
    fn everything_happens_in_one_pass() {
        let mut h = Harness::new(RecordingDevice::with_tile_memory());
        let mut lane = TiledDeferredLane::new();
        h.resize(&mut lane).unwrap();
        let scene = SceneBuilder::new(h.gpu.device())
            .unwrap()
            .sun(Vec3::Y)
            .point_light(Vec3::ONE)
            .opaque("wall", Vec3::ZERO)
            .transparent("glass", Vec3::X)
            .build();
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();

        assert_eq!(count(&out.commands, |c| matches!(c, Command::BeginRenderPass { .. })), 1);
        assert_eq!(out.counters.fullscreen_draws, 1);
        assert_eq!(out.counters.instanced_draws, 1);
        assert_eq!(out.counters.scene_traversals, 1);

        let draws: Vec<_> = out.commands.iter().filter(|c| c.is_draw()).collect();
        assert_eq!(draws.len(), 4);
        // Wall, sun, light volume, glass.
        assert!(matches!(draws[0], Command::DrawIndexed { instances, .. } if *instances == (0..1)));
        assert!(matches!(draws[1], Command::Draw { .. }));
        assert!(matches!(
            draws[2],
            Command::DrawIndexed { indices, .. } if *indices == (0..LIGHT_VOLUME_INDEX_COUNT)
        ));
        assert!(matches!(draws[3], Command::DrawIndexed { instances, .. } if *instances == (1..2)));
    }
}
