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

//! A harness driving a single lane against the recording device.

use super::{fit_light_space, PassConfig, PassContext, RenderPassLane};
use crate::error::PassError;
use crate::resources::{PipelineCache, RenderTargetPool, SceneBuffers, ViewSlot};
use prism_core::math::{Extent2D, Plane};
use prism_core::renderer::{
    DrawCounters, FrameParams, GpuContext, GraphicsDevice, RenderSettings, ResourceSet,
};
use prism_core::scene::SceneSnapshot;
use prism_test::{test_shader_sources, Command, RecordingDevice};
use std::sync::Arc;

pub(crate) struct Encoded {
    pub(crate) outputs: ResourceSet,
    pub(crate) counters: DrawCounters,
    pub(crate) commands: Vec<Command>,
}

pub(crate) struct Harness {
    pub(crate) device: Arc<RecordingDevice>,
    pub(crate) gpu: GpuContext,
    pub(crate) pool: RenderTargetPool,
    pub(crate) pipelines: PipelineCache,
    pub(crate) buffers: SceneBuffers,
    pub(crate) settings: RenderSettings,
    pub(crate) viewport: Extent2D,
}

impl Harness {
    pub(crate) fn new(device: RecordingDevice) -> Self {
        prism_test::init_logging();
        let device = Arc::new(device);
        let gpu = GpuContext::new(device.clone(), &test_shader_sources(), 2).unwrap();
        let mut pool = RenderTargetPool::new(gpu.capabilities());
        let viewport = Extent2D::new(800, 600);
        pool.resize(gpu.device(), viewport).unwrap();
        let pipelines = PipelineCache::new(gpu.device()).unwrap();
        let buffers = SceneBuffers::new(gpu.device(), pipelines.layouts()).unwrap();
        Self {
            device,
            gpu,
            pool,
            pipelines,
            buffers,
            settings: RenderSettings::default(),
            viewport,
        }
    }

    pub(crate) fn resize(&mut self, lane: &mut dyn RenderPassLane) -> Result<(), PassError> {
        self.pool.resize(self.gpu.device(), self.viewport)?;
        let mut config = PassConfig {
            gpu: &self.gpu,
            pool: &mut self.pool,
            pipelines: &mut self.pipelines,
            settings: &self.settings,
            viewport: self.viewport,
            surface_format: self.device.surface_format(),
        };
        lane.resize(&mut config)
    }

    pub(crate) fn params(&self, scene: &SceneSnapshot) -> FrameParams {
        let view_proj = scene.camera.view_proj();
        FrameParams {
            frame_index: 0,
            view: scene.camera.view,
            projection: scene.camera.projection,
            view_proj,
            camera_position: scene.camera.position,
            shadow_view_proj: fit_light_space(view_proj, scene.primary_sun_direction()),
            sun_direction: scene.primary_sun_direction(),
            sun_count: scene.sun_count(),
            point_light_count: scene.point_light_count(),
            viewport: self.viewport,
            features: self.settings.features,
            time: scene.time,
            clip_plane: Plane::NONE,
        }
    }

    pub(crate) fn encode(
        &mut self,
        lane: &mut dyn RenderPassLane,
        scene: &SceneSnapshot,
        inputs: &ResourceSet,
    ) -> Result<Encoded, PassError> {
        let device = self.gpu.device();
        let draws = self.buffers.upload(device, scene)?;
        let params = self.params(scene);
        self.buffers.write_view(device, ViewSlot::Main, &params)?;
        let frame_target = device.acquire_frame().unwrap();
        let mut encoder = self.gpu.create_encoder("lane test");
        let mut ctx = PassContext {
            gpu: &self.gpu,
            encoder: encoder.as_mut(),
            params: &params,
            scene,
            draws: &draws,
            pool: &self.pool,
            pipelines: &mut self.pipelines,
            buffers: &self.buffers,
            frame_target,
            counters: DrawCounters::default(),
        };
        let outputs = lane.encode(&mut ctx, inputs)?;
        let counters = ctx.counters;
        self.device.submit(encoder.finish()).unwrap();
        Ok(Encoded {
            outputs,
            counters,
            commands: self.device.last_submission(),
        })
    }
}

/// Number of commands matching `pred`.
pub(crate) fn count(commands: &[Command], pred: impl Fn(&Command) -> bool) -> usize {
    commands.iter().filter(|c| pred(c)).count()
}
