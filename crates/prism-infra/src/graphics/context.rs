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

use anyhow::{anyhow, Result};
use prism_core::math::Extent2D;
use prism_core::renderer::api::{DeviceCapabilities, SampleCount};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The format of the offscreen drawable when no surface is attached.
const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Holds the core wgpu state objects required for rendering.
///
/// The surface is optional. Without one the device renders into an offscreen
/// drawable whose size and format are tracked in `surface_config`.
#[derive(Debug)]
pub struct WgpuGraphicsContext {
    pub surface: Option<wgpu::Surface<'static>>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,

    // Configuration for the drawable, offscreen or not
    pub surface_config: wgpu::SurfaceConfiguration,

    pub adapter_name: String,
    pub adapter_backend: wgpu::Backend,
    pub capabilities: DeviceCapabilities,
    pub device_lost: Arc<AtomicBool>,
}

impl WgpuGraphicsContext {
    /// Asynchronously picks an adapter and creates the logical device.
    ///
    /// ## Arguments
    /// * `instance` - The shared `wgpu::Instance`.
    /// * `surface` - The window surface to present to, or `None` for headless rendering.
    /// * `size` - The initial drawable size in pixels.
    pub async fn new(
        instance: &wgpu::Instance,
        surface: Option<wgpu::Surface<'static>>,
        size: Extent2D,
    ) -> Result<Self> {
        log::info!("Initializing wgpu graphics context...");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| anyhow!("No suitable graphics adapter: {e}"))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using graphics adapter: \"{}\" (Backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let wanted = wgpu::Features::DEPTH32FLOAT_STENCIL8 | wgpu::Features::INDIRECT_FIRST_INSTANCE;
        let required_features = adapter.features() & wanted;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Prism Logical Device"),
                required_features,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {e}"))?;
        log::info!("Logical device and command queue created.");

        device.on_uncaptured_error(Arc::new(|e| {
            log::error!("wgpu uncaptured error: {e:?}");
        }));

        let device_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&device_lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("Graphics device lost ({reason:?}): {message}");
            lost_flag.store(true, Ordering::Release);
        });

        let surface_config = match &surface {
            Some(surface) => {
                let caps = surface.get_capabilities(&adapter);
                let format = caps
                    .formats
                    .iter()
                    .copied()
                    .find(|f| f.is_srgb())
                    .or_else(|| caps.formats.first().copied())
                    .ok_or_else(|| anyhow!("Surface is not supported by the adapter"))?;
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width: size.width.max(1),
                    height: size.height.max(1),
                    present_mode: caps
                        .present_modes
                        .iter()
                        .copied()
                        .find(|m| *m == wgpu::PresentMode::Mailbox)
                        .unwrap_or(wgpu::PresentMode::Fifo), // Fifo is guaranteed to be supported
                    alpha_mode: caps
                        .alpha_modes
                        .first()
                        .copied()
                        .unwrap_or(wgpu::CompositeAlphaMode::Auto),
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                surface.configure(&device, &config);
                config
            }
            None => wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                format: HEADLESS_FORMAT,
                width: size.width.max(1),
                height: size.height.max(1),
                present_mode: wgpu::PresentMode::Fifo,
                alpha_mode: wgpu::CompositeAlphaMode::Auto,
                view_formats: vec![],
                desired_maximum_frame_latency: 2,
            },
        };

        let capabilities = query_capabilities(&adapter, &device, surface_config.format);
        log::info!("Device capabilities: {capabilities:?}");

        Ok(Self {
            surface,
            adapter,
            device,
            queue,
            surface_config,
            adapter_name: adapter_info.name,
            adapter_backend: adapter_info.backend,
            capabilities,
            device_lost,
        })
    }

    /// Reconfigures the drawable for a new size. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            log::info!("WgpuGraphicsContext: Resizing drawable to {width}x{height}");
            self.surface_config.width = width;
            self.surface_config.height = height;
            if let Some(surface) = &self.surface {
                surface.configure(&self.device, &self.surface_config);
            }
        } else {
            log::warn!(
                "WgpuGraphicsContext: Ignoring resize request to zero dimensions: {width}x{height}"
            );
        }
    }

    /// Reapplies the current configuration after the surface became outdated.
    pub fn reconfigure(&self) {
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.surface_config);
        }
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    /// Returns the size of the drawable.
    pub fn size(&self) -> Extent2D {
        Extent2D::new(self.surface_config.width, self.surface_config.height)
    }
}

/// Derives what the device can do from the adapter's features, limits and downlevel flags.
///
/// wgpu does not expose tile memory, so memoryless attachments are never available.
fn query_capabilities(
    adapter: &wgpu::Adapter,
    device: &wgpu::Device,
    drawable_format: wgpu::TextureFormat,
) -> DeviceCapabilities {
    let downlevel = adapter.get_downlevel_capabilities();
    let features = device.features();
    let limits = device.limits();

    let compute = downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
    let indirect_execution = downlevel
        .flags
        .contains(wgpu::DownlevelFlags::INDIRECT_EXECUTION)
        && features.contains(wgpu::Features::INDIRECT_FIRST_INSTANCE);

    let supports = |count: u32| {
        [wgpu::TextureFormat::Rgba16Float, drawable_format]
            .into_iter()
            .all(|format| {
                adapter
                    .get_texture_format_features(format)
                    .flags
                    .sample_count_supported(count)
            })
    };
    let max_sample_count = [SampleCount::X8, SampleCount::X4, SampleCount::X2]
        .into_iter()
        .find(|samples| supports(samples.count()))
        .unwrap_or(SampleCount::X1);

    DeviceCapabilities {
        tile_memory: false,
        indirect_execution,
        max_sample_count,
        max_texture_dimension: limits.max_texture_dimension_2d,
        compute,
        depth32_float_stencil8: features.contains(wgpu::Features::DEPTH32FLOAT_STENCIL8),
    }
}
