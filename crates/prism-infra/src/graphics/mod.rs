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

//! wgpu implementation of [`prism_core::renderer::GraphicsDevice`].

mod command;
mod context;
pub mod conversions;
mod device;

pub use self::command::{WgpuCommandEncoder, WgpuComputePass, WgpuRenderPass};
pub use self::context::WgpuGraphicsContext;
pub use self::device::WgpuDevice;

use anyhow::Result;
use prism_core::math::Extent2D;

/// Initializes `env_logger`, honoring `RUST_LOG` and defaulting to `info`.
///
/// wgpu's HAL layer is noisy, so it is capped at errors.
pub fn init_logging() {
    use env_logger::{Builder, Env};

    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .try_init();
}

/// Creates a device that presents to `window`.
///
/// Blocks the calling thread until the adapter and device are ready.
pub fn bootstrap<W>(window: W, size: Extent2D) -> Result<WgpuDevice>
where
    W: Into<wgpu::SurfaceTarget<'static>>,
{
    let instance = wgpu::Instance::default();
    let surface = instance.create_surface(window)?;
    let context = pollster::block_on(WgpuGraphicsContext::new(&instance, Some(surface), size))?;
    Ok(WgpuDevice::new(context))
}

/// Creates a device that renders into an offscreen drawable of `size`.
pub fn bootstrap_headless(size: Extent2D) -> Result<WgpuDevice> {
    let instance = wgpu::Instance::default();
    let context = pollster::block_on(WgpuGraphicsContext::new(&instance, None, size))?;
    Ok(WgpuDevice::new(context))
}
