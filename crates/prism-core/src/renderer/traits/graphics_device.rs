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

use crate::math::Extent2D;
use crate::renderer::api::*;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;

/// The drawable acquired for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTarget {
    /// The view the final pass renders (or resolves) into.
    pub view: TextureViewId,
    /// The format of the drawable.
    pub format: TextureFormat,
    /// The size of the drawable in pixels.
    pub size: Extent2D,
}

/// The main interface to a graphics device.
///
/// Every GPU object is created through this trait and referred to by an opaque id.
/// Implementations own the real objects and must be usable from several threads.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Returns what this device can do.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Returns information about the adapter behind this device.
    fn adapter_info(&self) -> AdapterInfo;

    /// Compiles a shader module.
    /// ## Arguments
    /// * `descriptor` - The module label and source.
    /// ## Returns
    /// The id of the compiled module.
    /// ## Errors
    /// * `ResourceError::Shader` - If the source fails to compile.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Creates a bind group layout.
    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError>;

    /// Creates a bind group matching a layout.
    /// ## Errors
    /// * `ResourceError::NotFound` - If the layout or a bound resource is unknown.
    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError>;

    /// Destroys a bind group.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError>;

    /// Creates a pipeline layout from a list of bind group layouts.
    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError>;

    /// Creates a render pipeline from the provided descriptor.
    /// ## Arguments
    /// * `descriptor` - The complete pipeline state.
    /// ## Returns
    /// The id of the compiled pipeline.
    /// ## Errors
    /// * `ResourceError::Pipeline` - If the backend rejects the state.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Creates a compute pipeline from the provided descriptor.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError>;

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - The size and usage of the buffer.
    /// ## Returns
    /// The id of the created buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a new GPU buffer initialized with `data`.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Writes data to a GPU buffer.
    /// ## Arguments
    /// * `id` - The buffer to write to.
    /// * `offset` - The byte offset of the write.
    /// * `data` - The bytes to write.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If the write does not fit.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Creates a new 2D texture.
    /// ## Errors
    /// * `ResourceError::Unsupported` - If the storage mode is not available.
    /// * `ResourceError::OutOfMemory` - If the allocation fails.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Creates a view of a texture.
    fn create_texture_view(
        &self,
        texture_id: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    /// Creates a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError>;

    /// Starts recording a new command buffer.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a finished command buffer to the queue.
    /// ## Returns
    /// The index of this submission, to be used with [`GraphicsDevice::wait_for_submission`].
    /// ## Errors
    /// * `RenderError::DeviceLost` - If the device has been lost.
    fn submit(&self, command_buffer: CommandBufferId) -> Result<SubmissionIndex, RenderError>;

    /// Blocks until the GPU has completed the given submission.
    fn wait_for_submission(&self, index: SubmissionIndex) -> Result<(), RenderError>;

    /// Acquires the drawable for the next frame.
    fn acquire_frame(&self) -> Result<FrameTarget, RenderError>;

    /// Presents the drawable acquired by the last [`GraphicsDevice::acquire_frame`].
    fn present(&self) -> Result<(), RenderError>;

    /// Reconfigures the drawable to a new size.
    fn resize_surface(&self, size: Extent2D) -> Result<(), RenderError>;

    /// The format of the drawable.
    fn surface_format(&self) -> TextureFormat;
}
