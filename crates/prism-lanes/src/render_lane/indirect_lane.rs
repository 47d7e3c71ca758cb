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

//! Forward shading driven by indirect draw arguments built on the GPU.

use super::lighting_lane::transparent_blend;
use super::scene_draw::{GeometryPipelines, ShadowSampling};
use super::water_surface::WaterSurface;
use super::{CachedBindGroup, PassConfig, PassContext, PassState, RenderPassLane};
use crate::error::PassError;
use crate::resources::{
    DrawItem, DrawList, PipelineFlags, PipelineKey, RenderTargetPool, TargetDesc, TargetPurpose,
    TargetSize, ViewSlot,
};
use ahash::AHasher;
use prism_core::lane::{Lane, LaneKind};
use prism_core::math::LinearRgba;
use prism_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, BufferDescriptor, BufferId, BufferUsage,
    ComputePassDescriptor, DrawIndexedIndirectArgs, IndexFormat, Operations,
    RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
    RenderPipelineId, TextureFormat,
};
use prism_core::renderer::{
    DrawCounters, FeatureToggles, GpuContext, GraphicsDevice, InputSpec, RenderPass, ResourceError, ResourceSet,
    ResourceSlot, ShaderVariant, TargetHandle,
};
use prism_core::scene::SceneSnapshot;
use std::borrow::Cow;
use std::hash::{Hash, Hasher};

const PASS: &str = "indirect";

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Threads per workgroup of the encoding shader.
const WORKGROUP_SIZE: u32 = 64;

const DRAW_CALL_COST: f32 = 0.02;

const INPUTS: &[InputSpec] = &[
    InputSpec::optional(ResourceSlot::ShadowMap),
    InputSpec::optional(ResourceSlot::ReflectionColor),
    InputSpec::optional(ResourceSlot::RefractionColor),
    InputSpec::optional(ResourceSlot::WaterDepth),
];

/// What the encoding shader expands into one [`DrawIndexedIndirectArgs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct IndirectSource {
    /// Indices of the submesh.
    pub index_count: u32,
    /// First index of the submesh.
    pub first_index: u32,
    /// Added to every index.
    pub base_vertex: i32,
    /// Becomes the instance id, which indexes the draw table.
    pub draw_id: u32,
}

impl IndirectSource {
    fn from_item(item: &DrawItem) -> Self {
        Self {
            index_count: item.submesh.index_count,
            first_index: item.submesh.first_index,
            base_vertex: 0,
            draw_id: item.draw_id,
        }
    }
}

/// Hashes everything the argument buffer depends on.
///
/// Transforms are not part of it: they live in the draw table, which is
/// uploaded every frame anyway.
fn signature(draws: &DrawList) -> u64 {
    let mut hasher = AHasher::default();
    draws.len().hash(&mut hasher);
    for item in draws.items() {
        item.vertex_buffer.hash(&mut hasher);
        item.submesh.index_buffer.hash(&mut hasher);
        matches!(item.submesh.index_format, IndexFormat::Uint32).hash(&mut hasher);
        item.submesh.index_count.hash(&mut hasher);
        item.submesh.first_index.hash(&mut hasher);
        item.submesh.material.hash(&mut hasher);
        item.submesh.is_transparent.hash(&mut hasher);
        item.has_skeleton.hash(&mut hasher);
    }
    hasher.finish()
}

fn geometry_key(color: TextureFormat, features: &FeatureToggles) -> PipelineKey {
    PipelineKey::new(ShaderVariant::IndirectForward)
        .with_color(color)
        .with_depth(DEPTH_FORMAT)
        .with_flags(PipelineFlags::from_features(features))
}

fn water_key(color: TextureFormat) -> PipelineKey {
    PipelineKey::new(ShaderVariant::WaterSurface)
        .with_color(color)
        .with_depth(DEPTH_FORMAT)
}

#[derive(Debug, Clone, Copy)]
struct ArgumentBuffers {
    sources: BufferId,
    args: BufferId,
    // Set once a frame that dispatched the encoding pass was fully recorded.
    // Until then the arguments may never have been written.
    signature: Option<u64>,
}

/// Forward shading where every draw reads its arguments from a GPU buffer.
///
/// The argument buffer is rebuilt by a compute pass only when the scene's
/// geometry list changes. Frames with the same geometry reuse it as is.
#[derive(Debug, Default)]
pub struct IndirectLane {
    state: PassState,
    depth: Option<TargetHandle>,
    buffers: Option<ArgumentBuffers>,
    encode_group: CachedBindGroup<(BufferId, BufferId)>,
    shadow: ShadowSampling,
    water: WaterSurface,
    clear_color: LinearRgba,
    rebuilds: u64,
}

impl IndirectLane {
    /// Creates a lane without targets. Call `resize` before encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the argument buffer was rebuilt.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// The current argument buffer, once built.
    pub fn argument_buffer(&self) -> Option<BufferId> {
        self.buffers.map(|b| b.args)
    }

    /// Recreates the source and argument buffers for `draws`.
    fn rebuild(
        &mut self,
        device: &dyn GraphicsDevice,
        draws: &DrawList,
    ) -> Result<ArgumentBuffers, ResourceError> {
        self.release_buffers(device);
        let sources: Vec<_> = draws.items().iter().map(IndirectSource::from_item).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&sources);
        let sources = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("indirect_sources")),
                size: bytes.len() as u64,
                usage: BufferUsage::STORAGE,
            },
            bytes,
        )?;
        let args = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed("indirect_args")),
            size: draws.len() as u64 * DrawIndexedIndirectArgs::SIZE,
            usage: BufferUsage::STORAGE | BufferUsage::INDIRECT,
        })?;
        let buffers = ArgumentBuffers {
            sources,
            args,
            signature: None,
        };
        self.buffers = Some(buffers);
        self.rebuilds += 1;
        log::debug!("Rebuilding indirect arguments for {} draws", draws.len());
        Ok(buffers)
    }

    fn release_buffers(&mut self, device: &dyn GraphicsDevice) {
        self.encode_group.release(device);
        if let Some(old) = self.buffers.take() {
            for buffer in [old.sources, old.args] {
                if let Err(e) = device.destroy_buffer(buffer) {
                    log::warn!("Failed to destroy indirect buffer: {e}");
                }
            }
        }
    }
}

/// Issues one indirect draw per item, reading the arguments at its draw id.
fn draw_indirect<'i>(
    pass: &mut dyn RenderPass,
    items: impl IntoIterator<Item = &'i DrawItem>,
    pipelines: &GeometryPipelines,
    args: BufferId,
    counters: &mut DrawCounters,
) {
    let mut pipeline: Option<RenderPipelineId> = None;
    for item in items {
        let wanted = if item.has_skeleton {
            pipelines.skinned
        } else {
            pipelines.standard
        };
        if pipeline != Some(wanted) {
            pass.set_pipeline(wanted);
            pipeline = Some(wanted);
        }
        pass.set_vertex_buffer(0, item.vertex_buffer, 0);
        pass.set_index_buffer(item.submesh.index_buffer, 0, item.submesh.index_format);
        pass.draw_indexed_indirect(args, u64::from(item.draw_id) * DrawIndexedIndirectArgs::SIZE);
        counters.draw_calls += 1;
        counters.indirect_draws += 1;
    }
}

impl Lane for IndirectLane {
    fn strategy_name(&self) -> &'static str {
        PASS
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Compute
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

impl RenderPassLane for IndirectLane {
    fn state(&self) -> PassState {
        self.state
    }

    fn inputs(&self) -> &'static [InputSpec] {
        INPUTS
    }

    fn resize(&mut self, config: &mut PassConfig<'_>) -> Result<(), PassError> {
        self.state.check_resize(PASS)?;
        let caps = config.gpu.capabilities();
        if !(caps.indirect_execution && caps.compute) {
            return Err(PassError::Unsupported {
                pass: PASS,
                reason: "the device cannot execute GPU-built indirect draws".to_string(),
            });
        }
        let device = config.gpu.device();
        let desc = TargetDesc::new(TargetSize::Viewport, DEPTH_FORMAT);
        self.depth = Some(config.pool.allocate(device, TargetPurpose::IndirectDepth, desc)?);
        ShadowSampling::allocate_fallback(device, config.pool)?;
        self.clear_color = config.settings.clear_color;

        let (gpu, features) = (config.gpu, config.settings.features);
        let base = geometry_key(config.surface_format, &features);
        config.pipelines.get_compute(gpu, ShaderVariant::IndirectEncode)?;
        GeometryPipelines::warm(config.pipelines, gpu, base)?;
        GeometryPipelines::warm(
            config.pipelines,
            gpu,
            base.with_blend(transparent_blend(&features)),
        )?;
        if config.settings.water {
            config.pipelines.get(gpu, &water_key(config.surface_format))?;
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
        let depth = self.depth.ok_or(PassError::NotResized { pass: PASS })?;
        let (gpu, pool) = (ctx.gpu, ctx.pool);
        let device = gpu.device();
        let depth_view = pool.view(depth)?;
        let frame = ctx.frame_target;
        let layouts = *ctx.pipelines.layouts();

        let content = (!ctx.draws.is_empty()).then(|| signature(ctx.draws));
        let args = if let Some(content) = content {
            let current = self.buffers.filter(|b| b.signature == Some(content));
            let (buffers, stale) = match current {
                Some(buffers) => (buffers, false),
                None => (self.rebuild(device, ctx.draws)?, true),
            };
            if stale {
                let pipeline = ctx.pipelines.get_compute(gpu, ShaderVariant::IndirectEncode)?;
                let group = self.encode_group.get_or_create(
                    device,
                    (buffers.sources, buffers.args),
                    || {
                        device.create_bind_group(&BindGroupDescriptor {
                            label: Some("indirect_encode"),
                            layout: layouts.indirect_encode,
                            entries: &[
                                BindGroupEntry::buffer(0, buffers.sources),
                                BindGroupEntry::buffer(1, buffers.args),
                            ],
                        })
                    },
                )?;
                let mut pass = ctx.encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some("indirect_encode"),
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, group);
                pass.dispatch_workgroups((ctx.draws.len() as u32).div_ceil(WORKGROUP_SIZE), 1, 1);
                ctx.counters.dispatches += 1;
            }
            Some(buffers.args)
        } else {
            None
        };

        let shadow_group = self
            .shadow
            .bind(device, pool, &layouts, ctx.buffers, inputs, PASS)?;
        let features = ctx.params.features;
        let base = geometry_key(frame.format, &features);
        let opaque = GeometryPipelines::resolve(ctx.pipelines, gpu, base, ctx.draws)?;
        let transparent = GeometryPipelines::resolve(
            ctx.pipelines,
            gpu,
            base.with_blend(transparent_blend(&features)),
            ctx.draws,
        )?;
        let water = self.water.prepare_frame(ctx, inputs, water_key(frame.format))?;

        let color_attachments = [RenderPassColorAttachment {
            view: frame.view,
            resolve_target: None,
            ops: Operations::clear(self.clear_color),
        }];
        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("indirect"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(Operations::clear_discard(1.0)),
                    stencil_ops: None,
                }),
            });
            pass.set_bind_group(0, ctx.buffers.view_bind_group(ViewSlot::Main));
            pass.set_bind_group(1, shadow_group);
            if let Some(args) = args {
                draw_indirect(pass.as_mut(), ctx.draws.opaque(), &opaque, args, &mut ctx.counters);
            }
            if let Some(water) = water {
                water.draw(pass.as_mut(), &mut ctx.counters);
            }
            if let Some(args) = args {
                draw_indirect(
                    pass.as_mut(),
                    ctx.draws.transparent(),
                    &transparent,
                    args,
                    &mut ctx.counters,
                );
            }
        }
        ctx.counters.scene_traversals += 1;

        if let (Some(buffers), Some(content)) = (self.buffers.as_mut(), content) {
            buffers.signature = Some(content);
        }
        self.state = PassState::Ready;
        Ok(ResourceSet::new())
    }

    fn dispose(&mut self, gpu: &GpuContext, pool: &mut RenderTargetPool) {
        let device = gpu.device();
        pool.release(device, TargetPurpose::IndirectDepth);
        self.release_buffers(device);
        self.shadow.release(device);
        self.water.release(device);
        self.depth = None;
        self.state = PassState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::{count, Harness};
    use prism_core::math::Vec3;
    use prism_core::renderer::api::DeviceCapabilities;
    use prism_test::{Command, RecordingDevice, SceneBuilder};

    fn scene(h: &Harness, models: usize) -> SceneSnapshot {
        let mut builder = SceneBuilder::new(h.gpu.device()).unwrap().sun(Vec3::Y);
        for i in 0..models {
            builder = builder.opaque(&format!("crate{i}"), Vec3::new(i as f32, 0.0, 0.0));
        }
        builder.transparent("glass", Vec3::Z).build()
    }

    #[test]
    fn arguments_are_rebuilt_only_when_geometry_changes() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = IndirectLane::new();
        h.resize(&mut lane).unwrap();

        let first = scene(&h, 2);
        let out = h.encode(&mut lane, &first, &ResourceSet::new()).unwrap();
        assert_eq!(lane.rebuild_count(), 1);
        assert_eq!(out.counters.dispatches, 1);
        assert!(out.commands.contains(&Command::Dispatch { groups: [1, 1, 1] }));

        let mut moved = first.clone();
        moved.models[0].transform = prism_core::math::Mat4::from_translation(Vec3::Y);
        let out = h.encode(&mut lane, &moved, &ResourceSet::new()).unwrap();
        assert_eq!(lane.rebuild_count(), 1);
        assert_eq!(out.counters.dispatches, 0);

        let larger = scene(&h, 3);
        h.encode(&mut lane, &larger, &ResourceSet::new()).unwrap();
        assert_eq!(lane.rebuild_count(), 2);
    }

    #[test]
    fn failed_frame_does_not_skip_the_next_dispatch() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = IndirectLane::new();
        h.resize(&mut lane).unwrap();
        let scene = scene(&h, 2);

        h.device.fail_next_bind_group("indirect_encode");
        assert!(h.encode(&mut lane, &scene, &ResourceSet::new()).is_err());

        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        assert_eq!(out.counters.dispatches, 1);
        assert!(out.commands.contains(&Command::Dispatch { groups: [1, 1, 1] }));

        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        assert_eq!(out.counters.dispatches, 0);
    }

    #[test]
    fn resize_compiles_every_pipeline_a_frame_uses() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = IndirectLane::new();
        h.resize(&mut lane).unwrap();
        let render = h.device.render_pipeline_count();
        assert_eq!(h.device.compute_pipeline_count(), 1);

        let scene = scene(&h, 2);
        h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();
        assert_eq!(h.device.render_pipeline_count(), render);
        assert_eq!(h.device.compute_pipeline_count(), 1);
    }

    #[test]
    fn every_item_is_one_indirect_draw() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = IndirectLane::new();
        h.resize(&mut lane).unwrap();
        let scene = scene(&h, 2);
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();

        let args = lane.argument_buffer().unwrap();
        let offsets: Vec<_> = out
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexedIndirect { buffer, offset } if *buffer == args => Some(*offset),
                _ => None,
            })
            .collect();
        let size = DrawIndexedIndirectArgs::SIZE;
        assert_eq!(offsets, vec![0, size, 2 * size]);
        assert_eq!(out.counters.indirect_draws, 3);
        assert_eq!(count(&out.commands, |c| matches!(c, Command::DrawIndexed { .. })), 0);
        // The compute pass runs before the render pass in the same submission.
        let dispatch = out.commands.iter().position(|c| matches!(c, Command::Dispatch { .. }));
        let render = out.commands.iter().position(|c| matches!(c, Command::BeginRenderPass { .. }));
        assert!(dispatch < render);
    }

    #[test]
    fn sources_carry_the_draw_ids() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = IndirectLane::new();
        h.resize(&mut lane).unwrap();
        let scene = scene(&h, 1);
        h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();

        let sources = lane.buffers.unwrap().sources;
        let bytes = h.device.buffer_data(sources).unwrap();
        let stride = std::mem::size_of::<IndirectSource>();
        let second: IndirectSource = bytemuck::pod_read_unaligned(&bytes[stride..2 * stride]);
        assert_eq!(second.draw_id, 1);
        assert_eq!(second.index_count, prism_test::CUBE_INDEX_COUNT);
    }

    #[test]
    fn refuses_devices_without_indirect_execution() {
        let caps = DeviceCapabilities {
            indirect_execution: false,
            ..Default::default()
        };
        let mut h = Harness::new(RecordingDevice::with_capabilities(caps));
        let mut lane = IndirectLane::new();
        assert!(matches!(h.resize(&mut lane), Err(PassError::Unsupported { .. })));
    }
}
