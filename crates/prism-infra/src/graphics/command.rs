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

use prism_core::renderer::api::{
    BindGroupId, BufferId, CommandBufferId, ComputePassDescriptor, ComputePipelineId,
    IndexFormat, RenderPassDescriptor, RenderPipelineId, ScissorRect,
};
use prism_core::renderer::traits::{CommandEncoder, ComputePass, RenderPass};
use std::ops::Range;

use super::conversions::{plain_operations, IntoWgpu};
use super::device::WgpuDevice;

/// A render pass recording into a wgpu encoder.
///
/// Ids are resolved against the device's resource maps as commands are recorded.
/// Unknown ids are logged and the command is skipped.
pub struct WgpuRenderPass<'a> {
    pub(crate) pass: wgpu::RenderPass<'a>,
    pub(crate) device: &'a WgpuDevice,
}

impl RenderPass for WgpuRenderPass<'_> {
    fn set_pipeline(&mut self, pipeline_id: RenderPipelineId) {
        if let Some(pipeline) = self.device.get_wgpu_render_pipeline(pipeline_id) {
            self.pass.set_pipeline(&pipeline);
        } else {
            log::warn!("WgpuRenderPass: RenderPipelineId {pipeline_id:?} not found.");
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group_id: BindGroupId) {
        if let Some(bind_group) = self.device.get_wgpu_bind_group(bind_group_id) {
            self.pass.set_bind_group(index, bind_group.as_ref(), &[]);
        } else {
            log::warn!("WgpuRenderPass: BindGroupId {bind_group_id:?} not found.");
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer_id: BufferId, offset: u64) {
        if let Some(buffer) = self.device.get_wgpu_buffer(buffer_id) {
            self.pass.set_vertex_buffer(slot, buffer.slice(offset..));
        } else {
            log::warn!("WgpuRenderPass: Vertex BufferId {buffer_id:?} not found.");
        }
    }

    fn set_index_buffer(&mut self, buffer_id: BufferId, offset: u64, index_format: IndexFormat) {
        if let Some(buffer) = self.device.get_wgpu_buffer(buffer_id) {
            self.pass
                .set_index_buffer(buffer.slice(offset..), index_format.into_wgpu());
        } else {
            log::warn!("WgpuRenderPass: Index BufferId {buffer_id:?} not found.");
        }
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.pass.set_stencil_reference(reference);
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.pass
            .set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.pass.draw(vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pass.draw_indexed(indices, base_vertex, instances);
    }

    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, indirect_offset: u64) {
        if let Some(buffer) = self.device.get_wgpu_buffer(indirect_buffer) {
            self.pass.draw_indexed_indirect(&buffer, indirect_offset);
        } else {
            log::warn!("WgpuRenderPass: Indirect BufferId {indirect_buffer:?} not found.");
        }
    }
}

pub struct WgpuComputePass<'a> {
    pub(crate) pass: wgpu::ComputePass<'a>,
    pub(crate) device: &'a WgpuDevice,
}

impl ComputePass for WgpuComputePass<'_> {
    fn set_pipeline(&mut self, pipeline_id: ComputePipelineId) {
        if let Some(pipeline) = self.device.get_wgpu_compute_pipeline(pipeline_id) {
            self.pass.set_pipeline(&pipeline);
        } else {
            log::warn!("WgpuComputePass: ComputePipelineId {pipeline_id:?} not found.");
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group_id: BindGroupId) {
        if let Some(bind_group) = self.device.get_wgpu_bind_group(bind_group_id) {
            self.pass.set_bind_group(index, bind_group.as_ref(), &[]);
        } else {
            log::warn!("WgpuComputePass: BindGroupId {bind_group_id:?} not found.");
        }
    }

    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) {
        self.pass.dispatch_workgroups(x, y, z);
    }
}

pub struct WgpuCommandEncoder {
    pub(crate) encoder: wgpu::CommandEncoder,
    pub(crate) device: WgpuDevice,
}

impl CommandEncoder for WgpuCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder> {
        // Resolve every view up front so the attachments can borrow them.
        let mut colors = Vec::with_capacity(descriptor.color_attachments.len());
        for attachment in descriptor.color_attachments {
            let Some(view) = self.device.get_wgpu_texture_view(attachment.view) else {
                log::warn!(
                    "WgpuCommandEncoder: color attachment view {:?} not found, skipping.",
                    attachment.view
                );
                continue;
            };
            let resolve = attachment
                .resolve_target
                .and_then(|id| self.device.get_wgpu_texture_view(id));
            colors.push((view, resolve, attachment.ops));
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = colors
            .iter()
            .map(|(view, resolve, ops)| {
                Some(wgpu::RenderPassColorAttachment {
                    view: view.as_ref(),
                    resolve_target: resolve.as_deref(),
                    ops: (*ops).into_wgpu(),
                    depth_slice: None,
                })
            })
            .collect();

        let depth = descriptor.depth_stencil_attachment.and_then(|attachment| {
            self.device
                .get_wgpu_texture_view(attachment.view)
                .map(|view| (view, attachment))
        });
        let depth_stencil_attachment =
            depth
                .as_ref()
                .map(|(view, attachment)| wgpu::RenderPassDepthStencilAttachment {
                    view: view.as_ref(),
                    depth_ops: attachment.depth_ops.map(plain_operations),
                    stencil_ops: attachment.stencil_ops.map(plain_operations),
                });

        let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: descriptor.label,
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        Box::new(WgpuRenderPass {
            pass,
            device: &self.device,
        })
    }

    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass + 'encoder> {
        let pass = self
            .encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: descriptor.label,
                timestamp_writes: None,
            });

        Box::new(WgpuComputePass {
            pass,
            device: &self.device,
        })
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        let (Some(src), Some(dst)) = (
            self.device.get_wgpu_buffer(source),
            self.device.get_wgpu_buffer(destination),
        ) else {
            log::warn!(
                "WgpuCommandEncoder: copy between {source:?} and {destination:?} skipped, buffer not found."
            );
            return;
        };
        self.encoder
            .copy_buffer_to_buffer(&src, source_offset, &dst, destination_offset, size);
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let WgpuCommandEncoder { encoder, device } = *self;
        device.register_command_buffer(encoder.finish())
    }
}
