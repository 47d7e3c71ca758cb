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

use crate::renderer::api::{
    BindGroupId, BufferId, CommandBufferId, ComputePassDescriptor, ComputePipelineId,
    IndexFormat, RenderPassDescriptor, RenderPipelineId, ScissorRect,
};
use std::ops::Range;

/// Records draw commands into an open render pass.
pub trait RenderPass {
    /// Sets the active render pipeline.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Binds a bind group at the given group index.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId);

    /// Binds a vertex buffer to a slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds the index buffer.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Sets the reference value used by stencil tests.
    fn set_stencil_reference(&mut self, reference: u32);

    /// Restricts rasterization to a rectangle.
    fn set_scissor_rect(&mut self, rect: ScissorRect);

    /// Draws non-indexed primitives.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Draws indexed primitives.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Draws indexed primitives with arguments read from a GPU buffer.
    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, indirect_offset: u64);

    /// Issues `count` consecutive indirect draws starting at `indirect_offset`.
    fn multi_draw_indexed_indirect(
        &mut self,
        indirect_buffer: BufferId,
        indirect_offset: u64,
        count: u32,
    ) {
        let stride = crate::renderer::api::DrawIndexedIndirectArgs::SIZE;
        for i in 0..count as u64 {
            self.draw_indexed_indirect(indirect_buffer, indirect_offset + i * stride);
        }
    }
}

/// Records dispatches into an open compute pass.
pub trait ComputePass {
    /// Sets the active compute pipeline.
    fn set_pipeline(&mut self, pipeline: ComputePipelineId);

    /// Binds a bind group at the given group index.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId);

    /// Dispatches compute work.
    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32);
}

/// Records GPU commands into a command buffer.
///
/// Passes borrow the encoder mutably, so only one pass can be open at a time.
pub trait CommandEncoder {
    /// Begins a render pass.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder>;

    /// Begins a compute pass.
    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass + 'encoder>;

    /// Copies bytes between two buffers.
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Finishes recording and returns a submittable command buffer.
    fn finish(self: Box<Self>) -> CommandBufferId;
}
