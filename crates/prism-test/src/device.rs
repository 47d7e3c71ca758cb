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

//! A simulated graphics device that records everything it is asked to do.
//!
//! No GPU is involved. Resources get sequential ids, command buffers are kept as
//! plain command lists, and tests inspect the log afterwards.

use prism_core::math::Extent2D;
use prism_core::renderer::api::*;
use prism_core::renderer::traits::{
    CommandEncoder, ComputePass, FrameTarget, GraphicsDevice, RenderPass,
};
use prism_core::renderer::{RenderError, ResourceError, ShaderError};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A render pass was opened.
    BeginRenderPass {
        /// The pass label.
        label: Option<String>,
        /// Color attachment views with their resolve targets.
        color: Vec<(TextureViewId, Option<TextureViewId>)>,
        /// Color load operations, in attachment order.
        color_loads: Vec<LoadOp<prism_core::math::LinearRgba>>,
        /// The depth/stencil view.
        depth: Option<TextureViewId>,
    },
    /// The open render pass ended.
    EndRenderPass,
    /// A compute pass was opened.
    BeginComputePass {
        /// The pass label.
        label: Option<String>,
    },
    /// The open compute pass ended.
    EndComputePass,
    /// A render pipeline was bound.
    SetPipeline(RenderPipelineId),
    /// A compute pipeline was bound.
    SetComputePipeline(ComputePipelineId),
    /// A bind group was bound.
    SetBindGroup {
        /// Group index.
        index: u32,
        /// The group.
        group: BindGroupId,
    },
    /// A vertex buffer was bound.
    SetVertexBuffer {
        /// Slot.
        slot: u32,
        /// Buffer.
        buffer: BufferId,
    },
    /// The index buffer was bound.
    SetIndexBuffer {
        /// Buffer.
        buffer: BufferId,
        /// Index format.
        format: IndexFormat,
    },
    /// The stencil reference changed.
    SetStencilReference(u32),
    /// The scissor rectangle changed.
    SetScissorRect(ScissorRect),
    /// A non-indexed draw.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// An indexed draw.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Base vertex.
        base_vertex: i32,
        /// Instance range.
        instances: Range<u32>,
    },
    /// An indexed draw with GPU-side arguments.
    DrawIndexedIndirect {
        /// The argument buffer.
        buffer: BufferId,
        /// Byte offset of the arguments.
        offset: u64,
    },
    /// A compute dispatch.
    Dispatch {
        /// Workgroup counts.
        groups: [u32; 3],
    },
    /// A buffer copy.
    CopyBufferToBuffer {
        /// Source buffer.
        source: BufferId,
        /// Destination buffer.
        destination: BufferId,
        /// Bytes copied.
        size: u64,
    },
}

impl Command {
    /// Returns `true` for any draw command.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Command::Draw { .. } | Command::DrawIndexed { .. } | Command::DrawIndexedIndirect { .. }
        )
    }
}

/// What the device remembers about a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRecord {
    /// The texture id.
    pub id: TextureId,
    /// Debug label.
    pub label: Option<String>,
    /// Size in pixels.
    pub size: Extent2D,
    /// Pixel format.
    pub format: TextureFormat,
    /// Samples per pixel.
    pub sample_count: SampleCount,
    /// Storage mode.
    pub storage: StorageMode,
    /// Usage flags.
    pub usage: TextureUsage,
    /// `false` once destroyed.
    pub alive: bool,
}

/// What the device remembers about a render pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRecord {
    /// The pipeline id.
    pub id: RenderPipelineId,
    /// Debug label.
    pub label: Option<String>,
    /// Color target formats.
    pub color_formats: Vec<TextureFormat>,
    /// Color blend states.
    pub blends: Vec<Option<BlendStateDescriptor>>,
    /// Depth/stencil state.
    pub depth_stencil: Option<DepthStencilStateDescriptor>,
    /// Samples per pixel.
    pub sample_count: SampleCount,
    /// Polygon fill mode.
    pub polygon_mode: PolygonMode,
    /// Whether a fragment stage is present.
    pub has_fragment: bool,
}

/// A submitted command buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Submission index.
    pub index: SubmissionIndex,
    /// Label of the encoder.
    pub label: Option<String>,
    /// The recorded commands.
    pub commands: Vec<Command>,
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    shaders: usize,
    fail_shader_marker: Option<String>,
    fail_next_bind_group: Option<String>,
    fail_next_texture_view: bool,
    textures: HashMap<TextureId, TextureRecord>,
    views: HashMap<TextureViewId, TextureId>,
    buffers: HashMap<BufferId, Vec<u8>>,
    pipelines: Vec<PipelineRecord>,
    compute_pipelines: usize,
    bind_groups: usize,
    finished: HashMap<u64, (Option<String>, Vec<Command>)>,
    next_command_buffer: u64,
    submissions: Vec<Submission>,
    waits: Vec<SubmissionIndex>,
    device_lost: bool,
    surface_size: Extent2D,
    surface: Option<(TextureId, TextureViewId)>,
    presents: usize,
    memoryless_allocations: usize,
}

impl State {
    fn next(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn alive(&self) -> Result<(), ResourceError> {
        if self.device_lost {
            return Err(ResourceError::DeviceLost);
        }
        Ok(())
    }
}

/// A [`GraphicsDevice`] that records instead of rendering.
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    capabilities: DeviceCapabilities,
    state: Arc<Mutex<State>>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    /// A device with default capabilities (no tile memory, indirect support).
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    /// A device reporting the given capabilities.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        let state = State {
            surface_size: Extent2D::new(800, 600),
            ..Default::default()
        };
        Self {
            capabilities,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A device with tile memory, like an Apple GPU.
    pub fn with_tile_memory() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            tile_memory: true,
            ..Default::default()
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later shader compilation fail if its source contains `marker`.
    pub fn fail_shaders_containing(&self, marker: &str) {
        self.state().fail_shader_marker = Some(marker.to_string());
    }

    /// Simulates a device loss; every later submission, wait, acquire and
    /// resource creation fails.
    pub fn lose_device(&self) {
        self.state().device_lost = true;
    }

    /// Makes the next creation of a bind group labeled `label` fail with
    /// `ResourceError::BackendError`.
    pub fn fail_next_bind_group(&self, label: &str) {
        self.state().fail_next_bind_group = Some(label.to_string());
    }

    /// Makes the next texture view creation fail with `ResourceError::BackendError`.
    pub fn fail_next_texture_view(&self) {
        self.state().fail_next_texture_view = true;
    }

    /// All submissions so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Number of submissions so far.
    pub fn submission_count(&self) -> usize {
        self.state().submissions.len()
    }

    /// The commands of the most recent submission.
    pub fn last_submission(&self) -> Vec<Command> {
        self.state()
            .submissions
            .last()
            .map(|s| s.commands.clone())
            .unwrap_or_default()
    }

    /// Forgets every recorded submission.
    pub fn clear_submissions(&self) {
        self.state().submissions.clear();
    }

    /// Submissions waited on, in order.
    pub fn waits(&self) -> Vec<SubmissionIndex> {
        self.state().waits.clone()
    }

    /// Number of presented frames.
    pub fn present_count(&self) -> usize {
        self.state().presents
    }

    /// Number of compiled shader modules.
    pub fn shader_count(&self) -> usize {
        self.state().shaders
    }

    /// Every render pipeline created so far.
    pub fn pipelines(&self) -> Vec<PipelineRecord> {
        self.state().pipelines.clone()
    }

    /// Number of render pipelines created so far.
    pub fn render_pipeline_count(&self) -> usize {
        self.state().pipelines.len()
    }

    /// Number of compute pipelines created so far.
    pub fn compute_pipeline_count(&self) -> usize {
        self.state().compute_pipelines
    }

    /// Looks up a render pipeline by id.
    pub fn pipeline(&self, id: RenderPipelineId) -> Option<PipelineRecord> {
        self.state().pipelines.iter().find(|p| p.id == id).cloned()
    }

    /// Textures that have not been destroyed, in id order.
    pub fn live_textures(&self) -> Vec<TextureRecord> {
        let state = self.state();
        let mut textures: Vec<_> = state.textures.values().filter(|t| t.alive).cloned().collect();
        textures.sort_by_key(|t| t.id.0);
        textures
    }

    /// Looks up a texture by id, including destroyed ones.
    pub fn texture(&self, id: TextureId) -> Option<TextureRecord> {
        self.state().textures.get(&id).cloned()
    }

    /// The texture a view was created from.
    pub fn texture_of_view(&self, view: TextureViewId) -> Option<TextureRecord> {
        let state = self.state();
        let id = state.views.get(&view)?;
        state.textures.get(id).cloned()
    }

    /// Number of memoryless textures ever created.
    pub fn memoryless_allocations(&self) -> usize {
        self.state().memoryless_allocations
    }

    /// The current contents of a buffer.
    pub fn buffer_data(&self, id: BufferId) -> Option<Vec<u8>> {
        self.state().buffers.get(&id).cloned()
    }

    /// The view of the simulated drawable, once acquired.
    pub fn surface_view(&self) -> Option<TextureViewId> {
        self.state().surface.map(|(_, view)| view)
    }
}

impl GraphicsDevice for RecordingDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: "Recording Device".to_string(),
            backend: GraphicsBackendType::Simulated,
        }
    }

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let mut state = self.state();
        let ShaderSourceData::Wgsl(source) = &descriptor.source;
        if let Some(marker) = &state.fail_shader_marker {
            if source.contains(marker.as_str()) {
                return Err(ShaderError::CompilationError {
                    label: descriptor.label.unwrap_or("unnamed").to_string(),
                    details: format!("source contains '{marker}'"),
                }
                .into());
            }
        }
        state.shaders += 1;
        Ok(ShaderModuleId(state.next()))
    }

    fn create_bind_group_layout(
        &self,
        _descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        Ok(BindGroupLayoutId(self.state().next()))
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let mut state = self.state();
        state.alive()?;
        if state.fail_next_bind_group.is_some()
            && state.fail_next_bind_group.as_deref() == descriptor.label
        {
            state.fail_next_bind_group = None;
            return Err(ResourceError::BackendError("injected bind group failure".to_string()));
        }
        for entry in descriptor.entries {
            let known = match entry.resource {
                BindingResource::Buffer(binding) => state.buffers.contains_key(&binding.buffer),
                BindingResource::TextureView(view) => state
                    .views
                    .get(&view)
                    .and_then(|t| state.textures.get(t))
                    .is_some_and(|t| t.alive && t.storage != StorageMode::Memoryless),
                BindingResource::Sampler(_) => true,
            };
            if !known {
                return Err(ResourceError::NotFound);
            }
        }
        state.bind_groups += 1;
        Ok(BindGroupId(state.next()))
    }

    fn destroy_bind_group(&self, _id: BindGroupId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_pipeline_layout(
        &self,
        _descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        Ok(PipelineLayoutId(self.state().next()))
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let mut state = self.state();
        state.alive()?;
        let id = RenderPipelineId(state.next());
        state.pipelines.push(PipelineRecord {
            id,
            label: descriptor.label.as_ref().map(|l| l.to_string()),
            color_formats: descriptor.color_target_states.iter().map(|c| c.format).collect(),
            blends: descriptor.color_target_states.iter().map(|c| c.blend).collect(),
            depth_stencil: descriptor.depth_stencil_state.clone(),
            sample_count: descriptor.multisample_state.count,
            polygon_mode: descriptor.primitive_state.polygon_mode,
            has_fragment: descriptor.fragment_shader_module.is_some(),
        });
        Ok(id)
    }

    fn create_compute_pipeline(
        &self,
        _descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        let mut state = self.state();
        state.alive()?;
        state.compute_pipelines += 1;
        Ok(ComputePipelineId(state.next()))
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let mut state = self.state();
        state.alive()?;
        let id = BufferId(state.next());
        state.buffers.insert(id, vec![0; descriptor.size as usize]);
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let mut state = self.state();
        state.alive()?;
        let id = BufferId(state.next());
        let mut contents = data.to_vec();
        contents.resize((descriptor.size as usize).max(data.len()), 0);
        state.buffers.insert(id, contents);
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state();
        state.alive()?;
        let buffer = state.buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            return Err(ResourceError::OutOfBounds);
        }
        buffer[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.state()
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let mut state = self.state();
        state.alive()?;
        if descriptor.storage == StorageMode::Memoryless {
            if !self.capabilities.tile_memory {
                return Err(ResourceError::Unsupported(
                    "memoryless textures need tile memory".to_string(),
                ));
            }
            state.memoryless_allocations += 1;
        }
        if descriptor.size.is_empty() {
            return Err(ResourceError::BackendError("zero-sized texture".to_string()));
        }
        let id = TextureId(state.next());
        state.textures.insert(
            id,
            TextureRecord {
                id,
                label: descriptor.label.as_ref().map(|l| l.to_string()),
                size: descriptor.size,
                format: descriptor.format,
                sample_count: descriptor.sample_count,
                storage: descriptor.storage,
                usage: descriptor.usage,
                alive: true,
            },
        );
        Ok(id)
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        _descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let mut state = self.state();
        state.alive()?;
        if std::mem::take(&mut state.fail_next_texture_view) {
            return Err(ResourceError::BackendError("injected view failure".to_string()));
        }
        if !state.textures.get(&texture_id).is_some_and(|t| t.alive) {
            return Err(ResourceError::NotFound);
        }
        let id = TextureViewId(state.next());
        state.views.insert(id, texture_id);
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let mut state = self.state();
        let texture = state.textures.get_mut(&id).ok_or(ResourceError::NotFound)?;
        texture.alive = false;
        Ok(())
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        self.state()
            .views
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_sampler(&self, _descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        Ok(SamplerId(self.state().next()))
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(RecordingEncoder {
            label: label.map(str::to_string),
            commands: Vec::new(),
            state: Arc::clone(&self.state),
        })
    }

    fn submit(&self, command_buffer: CommandBufferId) -> Result<SubmissionIndex, RenderError> {
        let mut state = self.state();
        if state.device_lost {
            return Err(RenderError::DeviceLost);
        }
        let (label, commands) = state
            .finished
            .remove(&command_buffer.0)
            .ok_or_else(|| RenderError::Internal("unknown command buffer".to_string()))?;
        let index = SubmissionIndex(state.submissions.len() as u64 + 1);
        state.submissions.push(Submission {
            index,
            label,
            commands,
        });
        Ok(index)
    }

    fn wait_for_submission(&self, index: SubmissionIndex) -> Result<(), RenderError> {
        let mut state = self.state();
        if state.device_lost {
            return Err(RenderError::DeviceLost);
        }
        state.waits.push(index);
        Ok(())
    }

    fn acquire_frame(&self) -> Result<FrameTarget, RenderError> {
        let mut state = self.state();
        if state.device_lost {
            return Err(RenderError::DeviceLost);
        }
        let size = state.surface_size;
        let existing = state.surface;
        let (_, view) = match existing {
            Some(surface) => surface,
            None => {
                let texture = TextureId(state.next());
                state.textures.insert(
                    texture,
                    TextureRecord {
                        id: texture,
                        label: Some("surface".to_string()),
                        size,
                        format: TextureFormat::Bgra8UnormSrgb,
                        sample_count: SampleCount::X1,
                        storage: StorageMode::Private,
                        usage: TextureUsage::RENDER_ATTACHMENT,
                        alive: true,
                    },
                );
                let view = TextureViewId(state.next());
                state.views.insert(view, texture);
                state.surface = Some((texture, view));
                (texture, view)
            }
        };
        Ok(FrameTarget {
            view,
            format: TextureFormat::Bgra8UnormSrgb,
            size,
        })
    }

    fn present(&self) -> Result<(), RenderError> {
        self.state().presents += 1;
        Ok(())
    }

    fn resize_surface(&self, size: Extent2D) -> Result<(), RenderError> {
        let mut state = self.state();
        state.surface_size = size;
        if let Some((texture, view)) = state.surface.take() {
            state.views.remove(&view);
            if let Some(record) = state.textures.get_mut(&texture) {
                record.alive = false;
            }
        }
        Ok(())
    }

    fn surface_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }
}

struct RecordingEncoder {
    label: Option<String>,
    commands: Vec<Command>,
    state: Arc<Mutex<State>>,
}

struct RecordingRenderPass<'a> {
    commands: &'a mut Vec<Command>,
}

struct RecordingComputePass<'a> {
    commands: &'a mut Vec<Command>,
}

impl Drop for RecordingRenderPass<'_> {
    fn drop(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }
}

impl Drop for RecordingComputePass<'_> {
    fn drop(&mut self) {
        self.commands.push(Command::EndComputePass);
    }
}

impl RenderPass for RecordingRenderPass<'_> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, group: BindGroupId) {
        self.commands.push(Command::SetBindGroup { index, group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, _offset: u64) {
        self.commands.push(Command::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, format: IndexFormat) {
        self.commands.push(Command::SetIndexBuffer { buffer, format });
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.commands.push(Command::SetStencilReference(reference));
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.commands.push(Command::SetScissorRect(rect));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(Command::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn draw_indexed_indirect(&mut self, buffer: BufferId, offset: u64) {
        self.commands
            .push(Command::DrawIndexedIndirect { buffer, offset });
    }
}

impl ComputePass for RecordingComputePass<'_> {
    fn set_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.commands.push(Command::SetComputePipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, group: BindGroupId) {
        self.commands.push(Command::SetBindGroup { index, group });
    }

    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(Command::Dispatch { groups: [x, y, z] });
    }
}

impl CommandEncoder for RecordingEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder> {
        self.commands.push(Command::BeginRenderPass {
            label: descriptor.label.map(str::to_string),
            color: descriptor
                .color_attachments
                .iter()
                .map(|c| (c.view, c.resolve_target))
                .collect(),
            color_loads: descriptor
                .color_attachments
                .iter()
                .map(|c| c.ops.load)
                .collect(),
            depth: descriptor.depth_stencil_attachment.map(|d| d.view),
        });
        Box::new(RecordingRenderPass {
            commands: &mut self.commands,
        })
    }

    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass + 'encoder> {
        self.commands.push(Command::BeginComputePass {
            label: descriptor.label.map(str::to_string),
        });
        Box::new(RecordingComputePass {
            commands: &mut self.commands,
        })
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        _source_offset: u64,
        destination: BufferId,
        _destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::CopyBufferToBuffer {
            source,
            destination,
            size,
        });
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let RecordingEncoder {
            label,
            commands,
            state,
        } = *self;
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next_command_buffer += 1;
        let id = state.next_command_buffer;
        state.finished.insert(id, (label, commands));
        CommandBufferId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn render_pass_commands_are_bracketed() {
        let device = RecordingDevice::new();
        let mut encoder = device.create_command_encoder(Some("test"));
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::default());
            pass.draw(0..3, 0..1);
        }
        let cb = encoder.finish();
        device.submit(cb).unwrap();
        let commands = device.last_submission();
        assert!(matches!(commands[0], Command::BeginRenderPass { .. }));
        assert_eq!(commands[1], Command::Draw { vertices: 0..3, instances: 0..1 });
        assert_eq!(commands[2], Command::EndRenderPass);
    }

    #[test]
    fn memoryless_textures_need_tile_memory() {
        let descriptor = TextureDescriptor {
            label: Some(Cow::Borrowed("tile")),
            size: Extent2D::new(4, 4),
            sample_count: SampleCount::X1,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::RENDER_ATTACHMENT,
            storage: StorageMode::Memoryless,
        };
        let plain = RecordingDevice::new();
        assert!(matches!(
            plain.create_texture(&descriptor),
            Err(ResourceError::Unsupported(_))
        ));
        assert_eq!(plain.memoryless_allocations(), 0);
        let tiled = RecordingDevice::with_tile_memory();
        assert!(tiled.create_texture(&descriptor).is_ok());
        assert_eq!(tiled.memoryless_allocations(), 1);
    }

    #[test]
    fn lost_device_rejects_submissions() {
        let device = RecordingDevice::new();
        device.lose_device();
        let cb = device.create_command_encoder(None).finish();
        assert!(matches!(device.submit(cb), Err(RenderError::DeviceLost)));
    }

    #[test]
    fn lost_device_rejects_resource_creation() {
        let device = RecordingDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: BufferUsage::UNIFORM,
            })
            .unwrap();
        device.lose_device();
        assert!(matches!(
            device.write_buffer(buffer, 0, &[0; 4]),
            Err(ResourceError::DeviceLost)
        ));
        let descriptor = TextureDescriptor {
            label: None,
            size: Extent2D::new(4, 4),
            sample_count: SampleCount::X1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT,
            storage: StorageMode::Private,
        };
        assert!(matches!(
            device.create_texture(&descriptor),
            Err(ResourceError::DeviceLost)
        ));
    }

    #[test]
    fn injected_failures_hit_only_the_next_call() {
        let device = RecordingDevice::new();
        let texture = device
            .create_texture(&TextureDescriptor {
                label: None,
                size: Extent2D::new(4, 4),
                sample_count: SampleCount::X1,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsage::RENDER_ATTACHMENT,
                storage: StorageMode::Private,
            })
            .unwrap();
        device.fail_next_texture_view();
        let view = TextureViewDescriptor::default();
        assert!(device.create_texture_view(texture, &view).is_err());
        assert!(device.create_texture_view(texture, &view).is_ok());
    }
}
