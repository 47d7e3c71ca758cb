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

//! Helpers shared by the passes that walk the scene.

use super::CachedBindGroup;
use crate::error::PassError;
use crate::resources::{
    DrawItem, DrawList, PipelineCache, PipelineFlags, PipelineKey, RenderTargetPool,
    SceneBuffers, StandardLayouts, TargetDesc, TargetPurpose, TargetSize,
};
use prism_core::math::Extent2D;
use prism_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BufferId, RenderPipelineId, TextureFormat,
    TextureViewId,
};
use prism_core::renderer::{
    DrawCounters, GpuContext, GraphicsDevice, RenderPass, ResourceError, ResourceSet,
    ResourceSlot, TargetHandle,
};

/// The standard and skinned permutations of one geometry pipeline.
///
/// Resolved before a render pass is opened, since the cache needs mutable
/// access while the pass borrows the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GeometryPipelines {
    pub(crate) standard: RenderPipelineId,
    pub(crate) skinned: RenderPipelineId,
}

impl GeometryPipelines {
    /// Compiles both permutations of `key` so no frame has to.
    pub(crate) fn warm(
        cache: &mut PipelineCache,
        gpu: &GpuContext,
        key: PipelineKey,
    ) -> Result<(), ResourceError> {
        cache.get(gpu, &key)?;
        cache.get(gpu, &key.with_flags(PipelineFlags::HAS_SKELETON))?;
        Ok(())
    }

    pub(crate) fn resolve(
        cache: &mut PipelineCache,
        gpu: &GpuContext,
        key: PipelineKey,
        draws: &DrawList,
    ) -> Result<Self, ResourceError> {
        let standard = cache.get(gpu, &key)?;
        let skinned = if draws.has_skeleton() {
            cache.get(gpu, &key.with_flags(PipelineFlags::HAS_SKELETON))?
        } else {
            standard
        };
        Ok(Self { standard, skinned })
    }

    fn for_item(&self, item: &DrawItem) -> RenderPipelineId {
        if item.has_skeleton {
            self.skinned
        } else {
            self.standard
        }
    }
}

/// Draws `items` in order, skipping redundant pipeline and buffer binds.
///
/// The instance id of every draw is its draw id, which the shaders use to
/// index the per-draw table.
pub(crate) fn draw_geometry<'i>(
    pass: &mut dyn RenderPass,
    items: impl IntoIterator<Item = &'i DrawItem>,
    pipelines: &GeometryPipelines,
    counters: &mut DrawCounters,
) {
    let mut pipeline = None;
    let mut vertex_buffer = None;
    let mut index_buffer: Option<BufferId> = None;
    for item in items {
        let wanted = pipelines.for_item(item);
        if pipeline != Some(wanted) {
            pass.set_pipeline(wanted);
            pipeline = Some(wanted);
        }
        if vertex_buffer != Some(item.vertex_buffer) {
            pass.set_vertex_buffer(0, item.vertex_buffer, 0);
            vertex_buffer = Some(item.vertex_buffer);
        }
        if index_buffer != Some(item.submesh.index_buffer) {
            pass.set_index_buffer(item.submesh.index_buffer, 0, item.submesh.index_format);
            index_buffer = Some(item.submesh.index_buffer);
        }
        pass.draw_indexed(item.index_range(), 0, item.instance_range());
        counters.draw_calls += 1;
    }
}

/// The shadow map binding of passes that shade with shadows.
///
/// Without a shadow map this frame, a 1x1 fallback depth target is bound so
/// the same pipelines keep working. Shading then reads as unshadowed.
#[derive(Debug, Default)]
pub(crate) struct ShadowSampling {
    group: CachedBindGroup<TextureViewId>,
    warned: bool,
}

impl ShadowSampling {
    pub(crate) fn allocate_fallback(
        device: &dyn GraphicsDevice,
        pool: &mut RenderTargetPool,
    ) -> Result<TargetHandle, PassError> {
        let desc = TargetDesc::new(TargetSize::Fixed(Extent2D::square(1)), TextureFormat::Depth32Float);
        Ok(pool.allocate(device, TargetPurpose::FallbackShadow, desc)?)
    }

    /// Returns this frame's shadow map view, or the fallback when no shadow
    /// map was produced.
    pub(crate) fn view(
        &mut self,
        pool: &RenderTargetPool,
        inputs: &ResourceSet,
        pass: &'static str,
    ) -> Result<TextureViewId, PassError> {
        match inputs.get(ResourceSlot::ShadowMap) {
            Some(handle) => {
                self.warned = false;
                Ok(pool.view(handle)?)
            }
            None => {
                if !self.warned {
                    log::warn!("Pass '{pass}' has no shadow map this frame; rendering unshadowed");
                    self.warned = true;
                }
                Ok(pool
                    .target_for(TargetPurpose::FallbackShadow)
                    .ok_or(PassError::NotResized { pass })?
                    .view)
            }
        }
    }

    /// Returns the group 1 bind group for this frame's shadow map.
    pub(crate) fn bind(
        &mut self,
        device: &dyn GraphicsDevice,
        pool: &RenderTargetPool,
        layouts: &StandardLayouts,
        buffers: &SceneBuffers,
        inputs: &ResourceSet,
        pass: &'static str,
    ) -> Result<BindGroupId, PassError> {
        let view = self.view(pool, inputs, pass)?;
        let sampler = buffers.shadow_sampler();
        let layout = layouts.shadow_sampling;
        let group = self.group.get_or_create(device, view, || {
            device.create_bind_group(&BindGroupDescriptor {
                label: Some("shadow_sampling"),
                layout,
                entries: &[BindGroupEntry::texture(0, view), BindGroupEntry::sampler(1, sampler)],
            })
        })?;
        Ok(group)
    }

    pub(crate) fn release(&mut self, device: &dyn GraphicsDevice) {
        self.group.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::math::{Mat4, Vec3};
    use prism_core::renderer::api::RenderPassDescriptor;
    use prism_test::{Command, RecordingDevice, SceneBuilder};

    #[test]
    fn redundant_binds_are_skipped() {
        let device = RecordingDevice::new();
        let scene = SceneBuilder::new(&device)
            .unwrap()
            .opaque("a", Vec3::ZERO)
            .model("b", Mat4::IDENTITY, &[false, false])
            .build();
        let draws = DrawList::from_scene(&scene);
        let pipelines = GeometryPipelines {
            standard: RenderPipelineId(7),
            skinned: RenderPipelineId(8),
        };
        let mut counters = DrawCounters::default();
        let mut encoder = device.create_command_encoder(None);
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::default());
            draw_geometry(pass.as_mut(), draws.items(), &pipelines, &mut counters);
        }
        device.submit(encoder.finish()).unwrap();

        let commands = device.last_submission();
        let count = |f: fn(&Command) -> bool| commands.iter().filter(|c| f(c)).count();
        assert_eq!(count(|c| matches!(c, Command::SetPipeline(_))), 1);
        assert_eq!(count(|c| matches!(c, Command::SetVertexBuffer { .. })), 1);
        assert_eq!(count(|c| matches!(c, Command::DrawIndexed { .. })), 3);
        assert_eq!(counters.draw_calls, 3);
        let instances: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { instances, .. } => Some(instances.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(instances, vec![0..1, 1..2, 2..3]);
    }
}
