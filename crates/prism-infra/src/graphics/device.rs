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

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use wgpu::util::DeviceExt;

use prism_core::math::Extent2D;
use prism_core::renderer::api::*;
use prism_core::renderer::traits::{CommandEncoder, FrameTarget, GraphicsDevice};
use prism_core::renderer::{PipelineError, RenderError, ResourceError, ShaderError};

use super::command::WgpuCommandEncoder;
use super::context::WgpuGraphicsContext;
use super::conversions::{backend_type, from_wgpu_texture_format, IntoWgpu};

#[derive(Debug)]
pub(crate) struct WgpuBufferEntry {
    pub(crate) wgpu_buffer: Arc<wgpu::Buffer>,
    pub(crate) size: u64,
}

/// The drawable handed out by `acquire_frame` and not yet presented.
#[derive(Debug)]
struct AcquiredFrame {
    surface_texture: Option<wgpu::SurfaceTexture>,
    view: TextureViewId,
}

/// The texture standing in for the swapchain when rendering headless.
#[derive(Debug)]
struct OffscreenTarget {
    _texture: wgpu::Texture,
    view: TextureViewId,
    size: Extent2D,
}

#[derive(Debug, Default)]
struct FrameState {
    acquired: Option<AcquiredFrame>,
    offscreen: Option<OffscreenTarget>,
}

/// The internal, non-clonable state of the WgpuDevice.
#[derive(Debug)]
pub struct WgpuDeviceInternal {
    context: Mutex<WgpuGraphicsContext>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: DeviceCapabilities,
    adapter_info: AdapterInfo,
    surface_format: TextureFormat,

    shader_modules: Mutex<HashMap<ShaderModuleId, Arc<wgpu::ShaderModule>>>,
    bind_group_layouts: Mutex<HashMap<BindGroupLayoutId, Arc<wgpu::BindGroupLayout>>>,
    bind_groups: Mutex<HashMap<BindGroupId, Arc<wgpu::BindGroup>>>,
    pipeline_layouts: Mutex<HashMap<PipelineLayoutId, Arc<wgpu::PipelineLayout>>>,
    render_pipelines: Mutex<HashMap<RenderPipelineId, Arc<wgpu::RenderPipeline>>>,
    compute_pipelines: Mutex<HashMap<ComputePipelineId, Arc<wgpu::ComputePipeline>>>,
    buffers: Mutex<HashMap<BufferId, WgpuBufferEntry>>,
    textures: Mutex<HashMap<TextureId, Arc<wgpu::Texture>>>,
    texture_views: Mutex<HashMap<TextureViewId, Arc<wgpu::TextureView>>>,
    samplers: Mutex<HashMap<SamplerId, Arc<wgpu::Sampler>>>,

    next_id: AtomicUsize,

    /// Command buffers that have been finished but not yet submitted.
    pending_command_buffers: Mutex<HashMap<CommandBufferId, wgpu::CommandBuffer>>,
    command_buffer_id_counter: AtomicU64,

    /// Index of the latest submission handed out.
    last_submitted: AtomicU64,
    /// Index of the latest submission the GPU reported as done.
    completed: Arc<AtomicU64>,
    /// Queue indices of submissions that may still be running, oldest first.
    in_flight: Mutex<VecDeque<(u64, wgpu::SubmissionIndex)>>,

    frame: Mutex<FrameState>,
}

/// A clonable, thread-safe handle to the wgpu graphics device.
///
/// Command encoders hold a clone to resolve ids while recording.
#[derive(Clone, Debug)]
pub struct WgpuDevice {
    internal: Arc<WgpuDeviceInternal>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ResourceError> {
    mutex
        .lock()
        .map_err(|e| ResourceError::BackendError(format!("Mutex poisoned ({what}): {e}")))
}

fn label_of<'a>(label: &'a Option<std::borrow::Cow<'_, str>>) -> &'a str {
    label.as_deref().unwrap_or_default()
}

impl WgpuDevice {
    pub fn new(context: WgpuGraphicsContext) -> Self {
        let adapter_info = AdapterInfo {
            name: context.adapter_name.clone(),
            backend: backend_type(context.adapter_backend),
        };
        let surface_format = from_wgpu_texture_format(context.surface_config.format)
            .unwrap_or(TextureFormat::Bgra8UnormSrgb);

        Self {
            internal: Arc::new(WgpuDeviceInternal {
                device: context.device.clone(),
                queue: context.queue.clone(),
                capabilities: context.capabilities,
                adapter_info,
                surface_format,
                context: Mutex::new(context),
                shader_modules: Mutex::new(HashMap::new()),
                bind_group_layouts: Mutex::new(HashMap::new()),
                bind_groups: Mutex::new(HashMap::new()),
                pipeline_layouts: Mutex::new(HashMap::new()),
                render_pipelines: Mutex::new(HashMap::new()),
                compute_pipelines: Mutex::new(HashMap::new()),
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                texture_views: Mutex::new(HashMap::new()),
                samplers: Mutex::new(HashMap::new()),
                next_id: AtomicUsize::new(0),
                pending_command_buffers: Mutex::new(HashMap::new()),
                command_buffer_id_counter: AtomicU64::new(0),
                last_submitted: AtomicU64::new(0),
                completed: Arc::new(AtomicU64::new(0)),
                in_flight: Mutex::new(VecDeque::new()),
                frame: Mutex::new(FrameState::default()),
            }),
        }
    }

    /// Ids are unique across every resource kind.
    fn generate_id(&self) -> usize {
        self.internal.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_device_lost(&self) -> bool {
        self.internal
            .context
            .lock()
            .map(|context| context.is_device_lost())
            .unwrap_or(true)
    }

    fn ensure_alive(&self) -> Result<(), ResourceError> {
        if self.is_device_lost() {
            Err(ResourceError::DeviceLost)
        } else {
            Ok(())
        }
    }

    pub(crate) fn get_wgpu_render_pipeline(
        &self,
        id: RenderPipelineId,
    ) -> Option<Arc<wgpu::RenderPipeline>> {
        let pipelines = self.internal.render_pipelines.lock().ok()?;
        pipelines.get(&id).cloned()
    }

    pub(crate) fn get_wgpu_compute_pipeline(
        &self,
        id: ComputePipelineId,
    ) -> Option<Arc<wgpu::ComputePipeline>> {
        let pipelines = self.internal.compute_pipelines.lock().ok()?;
        pipelines.get(&id).cloned()
    }

    pub(crate) fn get_wgpu_bind_group(&self, id: BindGroupId) -> Option<Arc<wgpu::BindGroup>> {
        let groups = self.internal.bind_groups.lock().ok()?;
        groups.get(&id).cloned()
    }

    pub(crate) fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        let buffers = self.internal.buffers.lock().ok()?;
        buffers.get(&id).map(|entry| Arc::clone(&entry.wgpu_buffer))
    }

    pub(crate) fn get_wgpu_texture_view(&self, id: TextureViewId) -> Option<Arc<wgpu::TextureView>> {
        let views = self.internal.texture_views.lock().ok()?;
        views.get(&id).cloned()
    }

    fn get_shader_module(
        &self,
        id: ShaderModuleId,
    ) -> Result<Arc<wgpu::ShaderModule>, ResourceError> {
        lock(&self.internal.shader_modules, "shader_modules")?
            .get(&id)
            .cloned()
            .ok_or_else(|| ShaderError::NotFound { id }.into())
    }

    fn get_pipeline_layout(
        &self,
        id: Option<PipelineLayoutId>,
    ) -> Result<Option<Arc<wgpu::PipelineLayout>>, ResourceError> {
        match id {
            Some(id) => lock(&self.internal.pipeline_layouts, "pipeline_layouts")?
                .get(&id)
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    PipelineError::LayoutCreationFailed(format!("unknown layout {id:?}")).into()
                }),
            None => Ok(None),
        }
    }

    /// Registers a view so passes can refer to it by id.
    fn register_view(&self, view: wgpu::TextureView) -> Result<TextureViewId, ResourceError> {
        let id = TextureViewId(self.generate_id());
        lock(&self.internal.texture_views, "texture_views")?.insert(id, Arc::new(view));
        Ok(id)
    }

    /// Registers a finished wgpu::CommandBuffer, returning an abstract id for it.
    pub(crate) fn register_command_buffer(&self, buffer: wgpu::CommandBuffer) -> CommandBufferId {
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::SeqCst),
        );
        match self.internal.pending_command_buffers.lock() {
            Ok(mut pending) => {
                pending.insert(id, buffer);
            }
            Err(e) => log::error!("WgpuDevice: dropping command buffer {id:?}: {e}"),
        }
        id
    }

    /// Returns the offscreen drawable, recreating it when the configured size changed.
    fn offscreen_target(
        &self,
        frame: &mut FrameState,
        size: Extent2D,
    ) -> Result<TextureViewId, ResourceError> {
        if let Some(target) = &frame.offscreen {
            if target.size == size {
                return Ok(target.view);
            }
        }
        if let Some(old) = frame.offscreen.take() {
            lock(&self.internal.texture_views, "texture_views")?.remove(&old.view);
        }

        let texture = self.internal.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Drawable"),
            size: size.into_wgpu(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.internal.surface_format.into_wgpu(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = self.register_view(texture.create_view(&wgpu::TextureViewDescriptor::default()))?;
        log::debug!(
            "WgpuDevice: Created offscreen drawable {}x{}",
            size.width,
            size.height
        );
        frame.offscreen = Some(OffscreenTarget {
            _texture: texture,
            view,
            size,
        });
        Ok(view)
    }

    /// Blocks until every submitted command buffer has finished executing.
    pub fn poll_device_blocking(&self) {
        if let Err(e) = self.internal.device.poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!("Failed to poll device: {e:?}");
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.internal.capabilities
    }

    fn adapter_info(&self) -> AdapterInfo {
        self.internal.adapter_info.clone()
    }

    // --- Shader Module Operations ---

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let source = match &descriptor.source {
            ShaderSourceData::Wgsl(source) => wgpu::ShaderSource::Wgsl(source.clone()),
        };
        let label = descriptor.label;
        log::debug!("WgpuDevice: Creating wgpu::ShaderModule with label: {label:?}");

        let module = self
            .internal
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor { label, source });

        let info = pollster::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(ShaderError::CompilationError {
                label: label.unwrap_or("unnamed").to_string(),
                details: errors.join("\n"),
            }
            .into());
        }

        let id = ShaderModuleId(self.generate_id());
        lock(&self.internal.shader_modules, "shader_modules")?.insert(id, Arc::new(module));

        log::info!(
            "WgpuDevice: Successfully created shader module '{}' with ID: {id:?}",
            label.unwrap_or_default()
        );
        Ok(id)
    }

    // --- Bind Group Operations ---

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> =
            descriptor.entries.iter().map(IntoWgpu::into_wgpu).collect();
        let layout = self
            .internal
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: descriptor.label,
                entries: &entries,
            });

        let id = BindGroupLayoutId(self.generate_id());
        lock(&self.internal.bind_group_layouts, "bind_group_layouts")?.insert(id, Arc::new(layout));
        log::debug!(
            "WgpuDevice: Created bind group layout '{}' with ID: {id:?}",
            descriptor.label.unwrap_or_default()
        );
        Ok(id)
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        self.ensure_alive()?;
        enum Resolved {
            Buffer(Arc<wgpu::Buffer>, u64, Option<std::num::NonZeroU64>),
            View(Arc<wgpu::TextureView>),
            Sampler(Arc<wgpu::Sampler>),
        }

        let layout = lock(&self.internal.bind_group_layouts, "bind_group_layouts")?
            .get(&descriptor.layout)
            .cloned()
            .ok_or(ResourceError::NotFound)?;

        let mut resolved = Vec::with_capacity(descriptor.entries.len());
        for entry in descriptor.entries {
            let resource = match entry.resource {
                BindingResource::Buffer(binding) => {
                    let buffer = self
                        .get_wgpu_buffer(binding.buffer)
                        .ok_or(ResourceError::NotFound)?;
                    Resolved::Buffer(buffer, binding.offset, binding.size)
                }
                BindingResource::TextureView(view) => Resolved::View(
                    self.get_wgpu_texture_view(view)
                        .ok_or(ResourceError::NotFound)?,
                ),
                BindingResource::Sampler(sampler) => Resolved::Sampler(
                    lock(&self.internal.samplers, "samplers")?
                        .get(&sampler)
                        .cloned()
                        .ok_or(ResourceError::NotFound)?,
                ),
            };
            resolved.push((entry.binding, resource));
        }

        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    Resolved::Buffer(buffer, offset, size) => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: *offset,
                            size: *size,
                        })
                    }
                    Resolved::View(view) => wgpu::BindingResource::TextureView(view),
                    Resolved::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();

        let group = self
            .internal
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: descriptor.label,
                layout: &layout,
                entries: &entries,
            });

        let id = BindGroupId(self.generate_id());
        lock(&self.internal.bind_groups, "bind_groups")?.insert(id, Arc::new(group));
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        lock(&self.internal.bind_groups, "bind_groups")?
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    // --- Pipeline Operations ---

    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        let layouts = {
            let map = lock(&self.internal.bind_group_layouts, "bind_group_layouts")?;
            descriptor
                .bind_group_layouts
                .iter()
                .map(|id| {
                    map.get(id).cloned().ok_or_else(|| {
                        PipelineError::LayoutCreationFailed(format!(
                            "unknown bind group layout {id:?}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        let layout_refs: Vec<Option<&wgpu::BindGroupLayout>> =
            layouts.iter().map(|layout| Some(layout.as_ref())).collect();

        let layout = self
            .internal
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: descriptor.label.as_deref(),
                bind_group_layouts: &layout_refs,
                immediate_size: 0,
            });

        let id = PipelineLayoutId(self.generate_id());
        lock(&self.internal.pipeline_layouts, "pipeline_layouts")?.insert(id, Arc::new(layout));
        log::debug!(
            "WgpuDevice: Created pipeline layout '{}' with ID: {id:?}",
            label_of(&descriptor.label)
        );
        Ok(id)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        self.ensure_alive()?;
        log::debug!(
            "WgpuDevice: Creating render pipeline with label: {:?}",
            descriptor.label
        );

        let vertex_module = self.get_shader_module(descriptor.vertex_shader_module)?;
        let fragment = match (
            descriptor.fragment_shader_module,
            descriptor.fragment_entry_point.as_deref(),
        ) {
            (Some(module), Some(entry)) => Some((self.get_shader_module(module)?, entry)),
            (Some(_), None) => {
                return Err(PipelineError::CompilationFailed {
                    label: descriptor.label.as_deref().map(String::from),
                    details: "fragment module without an entry point".to_string(),
                }
                .into())
            }
            (None, _) => None,
        };
        let layout = self.get_pipeline_layout(descriptor.layout)?;

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers_layout
            .iter()
            .map(|layout| layout.attributes.iter().map(IntoWgpu::into_wgpu).collect())
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_buffers_layout
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode.into_wgpu(),
                attributes,
            })
            .collect();
        let targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .color_target_states
            .iter()
            .map(|target| Some(target.into_wgpu()))
            .collect();

        let pipeline = self
            .internal
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: descriptor.label.as_deref(),
                layout: layout.as_deref(),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(descriptor.vertex_entry_point.as_ref()),
                    compilation_options: Default::default(),
                    buffers: &vertex_buffers,
                },
                fragment: fragment
                    .as_ref()
                    .map(|(module, entry)| wgpu::FragmentState {
                        module,
                        entry_point: Some(*entry),
                        compilation_options: Default::default(),
                        targets: &targets,
                    }),
                primitive: descriptor.primitive_state.into_wgpu(),
                depth_stencil: descriptor.depth_stencil_state.as_ref().map(IntoWgpu::into_wgpu),
                multisample: descriptor.multisample_state.into_wgpu(),
                multiview_mask: None,
                cache: None,
            });

        let id = RenderPipelineId(self.generate_id());
        lock(&self.internal.render_pipelines, "render_pipelines")?.insert(id, Arc::new(pipeline));
        log::info!(
            "WgpuDevice: Successfully created render pipeline '{}' with ID: {id:?}",
            label_of(&descriptor.label)
        );
        Ok(id)
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        self.ensure_alive()?;
        let module = self.get_shader_module(descriptor.shader_module)?;
        let layout = self.get_pipeline_layout(descriptor.layout)?;

        let pipeline = self
            .internal
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: descriptor.label.as_deref(),
                layout: layout.as_deref(),
                module: &module,
                entry_point: Some(descriptor.entry_point.as_ref()),
                compilation_options: Default::default(),
                cache: None,
            });

        let id = ComputePipelineId(self.generate_id());
        lock(&self.internal.compute_pipelines, "compute_pipelines")?.insert(id, Arc::new(pipeline));
        log::info!(
            "WgpuDevice: Successfully created compute pipeline '{}' with ID: {id:?}",
            label_of(&descriptor.label)
        );
        Ok(id)
    }

    // --- Buffer Operations ---

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        self.ensure_alive()?;
        let buffer = self.internal.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            usage: descriptor.usage.into_wgpu(),
            mapped_at_creation: false,
        });

        let id = BufferId(self.generate_id());
        lock(&self.internal.buffers, "buffers")?.insert(
            id,
            WgpuBufferEntry {
                wgpu_buffer: Arc::new(buffer),
                size: descriptor.size,
            },
        );
        log::debug!(
            "WgpuDevice: Created buffer '{}' with ID: {id:?}, size: {} bytes",
            label_of(&descriptor.label),
            descriptor.size
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        self.ensure_alive()?;
        let buffer = self
            .internal
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: descriptor.label.as_deref(),
                contents: data,
                usage: descriptor.usage.into_wgpu(),
            });

        let id = BufferId(self.generate_id());
        lock(&self.internal.buffers, "buffers")?.insert(
            id,
            WgpuBufferEntry {
                wgpu_buffer: Arc::new(buffer),
                size: data.len() as u64,
            },
        );
        log::debug!(
            "WgpuDevice: Created buffer '{}' with initial data. ID: {id:?}, size: {} bytes",
            label_of(&descriptor.label),
            data.len()
        );
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.ensure_alive()?;
        let buffer = {
            let buffers = lock(&self.internal.buffers, "buffers")?;
            let entry = buffers.get(&id).ok_or(ResourceError::NotFound)?;
            if offset + data.len() as u64 > entry.size {
                return Err(ResourceError::OutOfBounds);
            }
            Arc::clone(&entry.wgpu_buffer)
        };
        self.internal.queue.write_buffer(&buffer, offset, data);
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        if lock(&self.internal.buffers, "buffers")?.remove(&id).is_some() {
            log::debug!("WgpuDevice: Destroyed buffer with ID: {id:?}");
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    // --- Texture Operations ---

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        self.ensure_alive()?;
        if descriptor.storage == StorageMode::Memoryless {
            return Err(ResourceError::Unsupported(
                "memoryless storage is not available on wgpu".to_string(),
            ));
        }
        if descriptor.size.is_empty() {
            return Err(ResourceError::BackendError(format!(
                "texture '{}' has a zero-sized extent",
                label_of(&descriptor.label)
            )));
        }
        let max = self.internal.capabilities.max_texture_dimension;
        if descriptor.size.width > max || descriptor.size.height > max {
            return Err(ResourceError::OutOfMemory);
        }

        let texture = self.internal.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size.into_wgpu(),
            mip_level_count: 1,
            sample_count: descriptor.sample_count.count(),
            dimension: wgpu::TextureDimension::D2,
            format: descriptor.format.into_wgpu(),
            usage: descriptor.usage.into_wgpu(),
            view_formats: &[],
        });

        let id = TextureId(self.generate_id());
        lock(&self.internal.textures, "textures")?.insert(id, Arc::new(texture));
        log::debug!(
            "WgpuDevice: Created texture '{}' with ID: {id:?} ({}x{}, {:?})",
            label_of(&descriptor.label),
            descriptor.size.width,
            descriptor.size.height,
            descriptor.format
        );
        Ok(id)
    }

    fn create_texture_view(
        &self,
        texture_id: TextureId,
        descriptor: &TextureViewDescriptor,
    ) -> Result<TextureViewId, ResourceError> {
        let texture = lock(&self.internal.textures, "textures")?
            .get(&texture_id)
            .cloned()
            .ok_or(ResourceError::NotFound)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: descriptor.label.as_deref(),
            aspect: descriptor.aspect.into_wgpu(),
            ..Default::default()
        });
        self.register_view(view)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        if lock(&self.internal.textures, "textures")?.remove(&id).is_some() {
            log::debug!("WgpuDevice: Destroyed texture with ID: {id:?}");
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        lock(&self.internal.texture_views, "texture_views")?
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let address_mode = descriptor.address_mode.into_wgpu();
        let sampler = self.internal.device.create_sampler(&wgpu::SamplerDescriptor {
            label: descriptor.label.as_deref(),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: descriptor.mag_filter.into_wgpu(),
            min_filter: descriptor.min_filter.into_wgpu(),
            compare: descriptor.compare.map(IntoWgpu::into_wgpu),
            ..Default::default()
        });

        let id = SamplerId(self.generate_id());
        lock(&self.internal.samplers, "samplers")?.insert(id, Arc::new(sampler));
        Ok(id)
    }

    // --- Command Submission ---

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        let encoder = self
            .internal
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label });
        Box::new(WgpuCommandEncoder {
            encoder,
            device: self.clone(),
        })
    }

    fn submit(&self, command_buffer: CommandBufferId) -> Result<SubmissionIndex, RenderError> {
        self.ensure_alive()?;
        let buffer = lock(&self.internal.pending_command_buffers, "pending_command_buffers")?
            .remove(&command_buffer)
            .ok_or(ResourceError::NotFound)?;

        // Held across the submit so queue order and index order agree.
        let mut in_flight = lock(&self.internal.in_flight, "in_flight")?;
        let queue_index = self.internal.queue.submit(std::iter::once(buffer));
        let index = self.internal.last_submitted.fetch_add(1, Ordering::SeqCst) + 1;

        let completed = Arc::clone(&self.internal.completed);
        self.internal.queue.on_submitted_work_done(move || {
            completed.fetch_max(index, Ordering::AcqRel);
        });
        let done = self.internal.completed.load(Ordering::Acquire);
        in_flight.retain(|(i, _)| *i > done);
        in_flight.push_back((index, queue_index));
        Ok(SubmissionIndex(index))
    }

    fn wait_for_submission(&self, index: SubmissionIndex) -> Result<(), RenderError> {
        self.ensure_alive()?;
        if self.internal.completed.load(Ordering::Acquire) >= index.0 {
            return Ok(());
        }
        let queue_index = lock(&self.internal.in_flight, "in_flight")?
            .iter()
            .find(|(i, _)| *i == index.0)
            .map(|(_, queue_index)| queue_index.clone());
        let Some(queue_index) = queue_index else {
            if index.0 > self.internal.last_submitted.load(Ordering::Acquire) {
                return Err(RenderError::Internal(format!(
                    "submission {} was never made",
                    index.0
                )));
            }
            // Pruned entries belong to submissions already reported done.
            return Ok(());
        };
        self.internal
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(queue_index),
                timeout: None,
            })
            .map_err(|e| RenderError::RenderingFailed(format!("device poll failed: {e:?}")))?;
        self.ensure_alive()?;
        // The queue runs in order, so every earlier submission is done too.
        self.internal.completed.fetch_max(index.0, Ordering::AcqRel);
        lock(&self.internal.in_flight, "in_flight")?.retain(|(i, _)| *i > index.0);
        Ok(())
    }

    fn acquire_frame(&self) -> Result<FrameTarget, RenderError> {
        self.ensure_alive()?;
        let context = lock(&self.internal.context, "context")?;
        let mut frame = lock(&self.internal.frame, "frame")?;
        let size = context.size();
        let format = self.internal.surface_format;

        if let Some(acquired) = &frame.acquired {
            return Ok(FrameTarget {
                view: acquired.view,
                format,
                size,
            });
        }

        let Some(surface) = &context.surface else {
            let view = self.offscreen_target(&mut frame, size)?;
            frame.acquired = Some(AcquiredFrame {
                surface_texture: None,
                view,
            });
            return Ok(FrameTarget { view, format, size });
        };

        let surface_texture = match surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::warn!("WgpuDevice: surface outdated, reconfiguring.");
                context.reconfigure();
                surface.get_current_texture().map_err(|e| {
                    RenderError::SurfaceAcquisitionFailed(format!("after reconfigure: {e}"))
                })?
            }
            Err(e) => return Err(RenderError::SurfaceAcquisitionFailed(e.to_string())),
        };

        let view = self.register_view(
            surface_texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Drawable View"),
                    ..Default::default()
                }),
        )?;
        frame.acquired = Some(AcquiredFrame {
            surface_texture: Some(surface_texture),
            view,
        });
        Ok(FrameTarget { view, format, size })
    }

    fn present(&self) -> Result<(), RenderError> {
        let acquired = lock(&self.internal.frame, "frame")?.acquired.take();
        let Some(acquired) = acquired else {
            log::warn!("WgpuDevice: present called without an acquired frame.");
            return Ok(());
        };
        if let Some(surface_texture) = acquired.surface_texture {
            lock(&self.internal.texture_views, "texture_views")?.remove(&acquired.view);
            surface_texture.present();
        }
        Ok(())
    }

    fn resize_surface(&self, size: Extent2D) -> Result<(), RenderError> {
        lock(&self.internal.context, "context")?.resize(size.width, size.height);
        Ok(())
    }

    fn surface_format(&self) -> TextureFormat {
        self.internal.surface_format
    }
}
