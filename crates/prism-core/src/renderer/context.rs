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

//! The GPU context: device, serialized submission queue and shader library.

use crate::renderer::api::{AdapterInfo, CommandBufferId, DeviceCapabilities, SubmissionIndex};
use crate::renderer::error::RenderError;
use crate::renderer::shader_library::{ShaderLibrary, ShaderSources};
use crate::renderer::traits::{CommandEncoder, GraphicsDevice};
use std::collections::VecDeque;
use std::sync::Arc;

/// Owns the device handle, the frame-in-flight window and every compiled shader.
///
/// There is exactly one context per device. It is created once and handed by
/// reference to whatever needs GPU access; nothing reaches it through a global.
#[derive(Debug)]
pub struct GpuContext {
    device: Arc<dyn GraphicsDevice>,
    shaders: ShaderLibrary,
    capabilities: DeviceCapabilities,
    adapter: AdapterInfo,
    max_frames_in_flight: usize,
    in_flight: VecDeque<SubmissionIndex>,
    device_lost: bool,
}

impl GpuContext {
    /// Creates the context and compiles the shader library.
    ///
    /// ## Errors
    /// * `RenderError::ResourceError` - If any shader fails to compile.
    /// * `RenderError::InitializationFailed` - If `max_frames_in_flight` is zero.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        sources: &ShaderSources,
        max_frames_in_flight: usize,
    ) -> Result<Self, RenderError> {
        if max_frames_in_flight == 0 {
            return Err(RenderError::InitializationFailed(
                "at least one frame in flight is required".to_string(),
            ));
        }
        let shaders = ShaderLibrary::compile(device.as_ref(), sources)?;
        let capabilities = device.capabilities();
        let adapter = device.adapter_info();
        log::info!(
            "GPU context created on '{}' ({:?}), {} frames in flight",
            adapter.name,
            adapter.backend,
            max_frames_in_flight
        );
        Ok(Self {
            device,
            shaders,
            capabilities,
            adapter,
            max_frames_in_flight,
            in_flight: VecDeque::with_capacity(max_frames_in_flight),
            device_lost: false,
        })
    }

    /// The graphics device.
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// The compiled shader library.
    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    /// What the device can do.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// The adapter behind the device.
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// The maximum number of outstanding submissions.
    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    /// Number of submissions the GPU may still be working on.
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns `true` once the device has been lost.
    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    /// Waits for a free frame slot.
    ///
    /// Only the oldest submission is waited on, and only when the window is full.
    ///
    /// ## Errors
    /// * `RenderError::DeviceLost` - If the device was lost, now or earlier.
    pub fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.device_lost {
            return Err(RenderError::DeviceLost);
        }
        while self.in_flight.len() >= self.max_frames_in_flight {
            let Some(oldest) = self.in_flight.pop_front() else {
                break;
            };
            let result = self.device.wait_for_submission(oldest);
            self.check(result)?;
        }
        Ok(())
    }

    /// Starts a command encoder.
    pub fn create_encoder(&self, label: &str) -> Box<dyn CommandEncoder> {
        self.device.create_command_encoder(Some(label))
    }

    /// Submits a command buffer and records it in the in-flight window.
    pub fn submit(&mut self, command_buffer: CommandBufferId) -> Result<SubmissionIndex, RenderError> {
        if self.device_lost {
            return Err(RenderError::DeviceLost);
        }
        let result = self.device.submit(command_buffer);
        let index = self.check(result)?;
        self.in_flight.push_back(index);
        Ok(index)
    }

    /// Blocks until every outstanding submission has completed.
    pub fn wait_idle(&mut self) -> Result<(), RenderError> {
        while let Some(index) = self.in_flight.pop_front() {
            let result = self.device.wait_for_submission(index);
            self.check(result)?;
        }
        Ok(())
    }

    /// Marks the context as lost and returns [`RenderError::DeviceLost`].
    pub fn mark_device_lost(&mut self) -> RenderError {
        if !self.device_lost {
            log::error!("Graphics device lost; all further frames will fail");
        }
        self.device_lost = true;
        self.in_flight.clear();
        RenderError::DeviceLost
    }

    fn check<T>(&mut self, result: Result<T, RenderError>) -> Result<T, RenderError> {
        match result {
            Err(err) if err.is_device_lost() => Err(self.mark_device_lost()),
            other => other,
        }
    }
}
