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

//! Defines the RenderAgent, the frame orchestrator of the rendering subsystem.

use super::frame::{build_frame_params, pass_sequence, resolve_strategy, strategy_lanes};
use prism_core::math::Extent2D;
use prism_core::renderer::{
    DrawCounters, FeatureToggles, FrameStats, GpuContext, GraphicsDevice, PassRecord,
    RenderError, RenderSettings, RenderStrategy, ResourceSet, ShaderSources,
};
use prism_core::scene::SceneSnapshot;
use prism_lanes::render_lane::{
    ForwardLane, GBufferLane, IndirectLane, LightingLane, PassConfig, PassContext,
    RenderPassLane, ShadowPassLane, TiledDeferredLane, WaterLane,
};
use prism_lanes::resources::{PipelineCache, RenderTargetPool, SceneBuffers, ViewSlot};
use prism_lanes::PassError;
use std::sync::Arc;

/// The agent responsible for turning scene snapshots into presented frames.
///
/// It owns the GPU context, the shared target pool, the pipeline cache, the
/// uploaded scene data and one lane per pass kind. `configure` picks the main
/// strategy once, with capability fallback; `render_frame` then runs the fixed
/// pass sequence, threading each pass's outputs into the inputs of the next.
pub struct RenderAgent {
    gpu: GpuContext,
    // Requested strategy and toggles, as supplied by the application.
    settings: RenderSettings,
    // The strategy actually running after capability fallback.
    strategy: RenderStrategy,
    pool: RenderTargetPool,
    pipelines: PipelineCache,
    buffers: SceneBuffers,
    // Every pass lane. Not destroyed on strategy change.
    lanes: Vec<Box<dyn RenderPassLane>>,
    viewport: Option<Extent2D>,
    frame_index: u64,
}

impl RenderAgent {
    /// Creates the agent and compiles every shader.
    ///
    /// The agent renders nothing until the first [`RenderAgent::resize`].
    ///
    /// ## Errors
    /// * `RenderError::InitializationFailed` - If the settings are invalid.
    /// * `RenderError::ResourceError` - If a shader fails to compile or a shared
    ///   resource cannot be created.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        shaders: &ShaderSources,
        settings: RenderSettings,
    ) -> Result<Self, RenderError> {
        settings
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let gpu = GpuContext::new(device, shaders, settings.frames_in_flight)?;
        let pool = RenderTargetPool::new(gpu.capabilities());
        let pipelines = PipelineCache::new(gpu.device())?;
        let buffers = SceneBuffers::new(gpu.device(), pipelines.layouts())?;
        let lanes: Vec<Box<dyn RenderPassLane>> = vec![
            Box::new(ShadowPassLane::new()),
            Box::new(WaterLane::new()),
            Box::new(ForwardLane::new()),
            Box::new(GBufferLane::new()),
            Box::new(LightingLane::new()),
            Box::new(TiledDeferredLane::new()),
            Box::new(IndirectLane::new()),
        ];

        let mut agent = Self {
            gpu,
            strategy: RenderStrategy::Forward,
            settings,
            pool,
            pipelines,
            buffers,
            lanes,
            viewport: None,
            frame_index: 0,
        };
        let requested = agent.settings.strategy;
        agent.configure(requested)?;
        Ok(agent)
    }

    /// Selects the main strategy.
    ///
    /// A strategy the device cannot run falls back to forward here, once, and
    /// the returned value is the strategy that will actually render. When a
    /// viewport is known the lanes of the new strategy are sized immediately.
    pub fn configure(&mut self, requested: RenderStrategy) -> Result<RenderStrategy, RenderError> {
        let strategy = resolve_strategy(requested, self.gpu.capabilities());
        if strategy != requested {
            log::info!(
                "RenderAgent: '{}' is not supported by '{}', using '{}'",
                requested.name(),
                self.gpu.adapter_info().name,
                strategy.name()
            );
        }
        if strategy != self.strategy {
            log::info!(
                "RenderAgent: Strategy update from '{}' to '{}'",
                self.strategy.name(),
                strategy.name()
            );
        }
        self.settings.strategy = requested;
        self.strategy = strategy;
        let result = self.resize_active_lanes();
        self.latch_device_loss(result)?;
        Ok(strategy)
    }

    /// Resizes the drawable, the pool and every active pass.
    ///
    /// An empty size (a minimized window) is ignored.
    pub fn resize(&mut self, size: Extent2D) -> Result<(), RenderError> {
        if size.is_empty() {
            log::warn!(
                "RenderAgent: Ignoring resize to {}x{}",
                size.width,
                size.height
            );
            return Ok(());
        }
        let result = self.resize_all(size);
        self.latch_device_loss(result)?;
        log::info!("RenderAgent: Resized to {}x{}", size.width, size.height);
        Ok(())
    }

    fn resize_all(&mut self, size: Extent2D) -> Result<(), RenderError> {
        self.gpu.device().resize_surface(size)?;
        self.pool.resize(self.gpu.device(), size)?;
        self.viewport = Some(size);
        self.resize_active_lanes()
    }

    /// Replaces the feature toggles and resizes the affected passes.
    ///
    /// Turning antialiasing on or off re-runs the forward resize, which
    /// allocates or releases its multisampled targets.
    pub fn set_features(&mut self, features: FeatureToggles) -> Result<(), RenderError> {
        if features == self.settings.features {
            return Ok(());
        }
        log::debug!("RenderAgent: Feature toggles changed to {:?}", features);
        self.settings.features = features;
        let result = self.resize_active_lanes();
        self.latch_device_loss(result)
    }

    /// Enables or disables the reflection and refraction views.
    pub fn set_water_enabled(&mut self, enabled: bool) -> Result<(), RenderError> {
        if enabled == self.settings.water {
            return Ok(());
        }
        self.settings.water = enabled;
        let result = self.resize_active_lanes();
        self.latch_device_loss(result)
    }

    /// Renders and presents one frame.
    ///
    /// ## Errors
    /// * `RenderError::NotInitialized` - Before the first resize.
    /// * `RenderError::DeviceLost` - If the device was lost, during this frame
    ///   or any earlier one.
    pub fn render_frame(&mut self, scene: &SceneSnapshot) -> Result<FrameStats, RenderError> {
        let Some(viewport) = self.viewport else {
            return Err(RenderError::NotInitialized);
        };
        let result = self.encode_frame(scene, viewport);
        self.latch_device_loss(result)
    }

    // A loss reported from inside a pass or the pool arrives wrapped; any of
    // them makes every later frame fail.
    fn latch_device_loss<T>(&mut self, result: Result<T, RenderError>) -> Result<T, RenderError> {
        match result {
            Err(err) if err.is_device_lost() => Err(self.gpu.mark_device_lost()),
            other => other,
        }
    }

    fn encode_frame(
        &mut self,
        scene: &SceneSnapshot,
        viewport: Extent2D,
    ) -> Result<FrameStats, RenderError> {
        self.gpu.begin_frame()?;

        let draws = self.buffers.upload(self.gpu.device(), scene)?;
        let params =
            build_frame_params(self.frame_index, scene, viewport, self.settings.features);
        self.buffers
            .write_view(self.gpu.device(), ViewSlot::Main, &params)?;
        let frame_target = self.gpu.device().acquire_frame()?;

        let mut stats = FrameStats {
            frame_index: self.frame_index,
            strategy: self.strategy,
            ..Default::default()
        };
        let mut produced = ResourceSet::new();
        let mut encoder = self.gpu.create_encoder("Frame Encoder");

        for name in pass_sequence(self.strategy, &self.settings, scene.water.is_some()) {
            let lane = self
                .lanes
                .iter_mut()
                .find(|lane| lane.strategy_name() == name)
                .ok_or_else(|| RenderError::Internal(format!("No pass lane named '{name}'")))?;

            let mut inputs = ResourceSet::new();
            let mut bound = Vec::with_capacity(lane.inputs().len());
            for spec in lane.inputs() {
                let handle = produced.get(spec.slot);
                match handle {
                    Some(handle) => inputs.insert(spec.slot, handle),
                    None if spec.required => {
                        return Err(PassError::MissingInput {
                            pass: name,
                            slot: spec.slot,
                        }
                        .into())
                    }
                    None => {}
                }
                bound.push((spec.slot, handle));
            }

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
            let outputs = lane.encode(&mut ctx, &inputs)?;
            let counters = ctx.counters;

            produced.merge(&outputs);
            stats.record(PassRecord {
                name,
                inputs: bound,
                outputs,
                counters,
            });
        }

        self.gpu.submit(encoder.finish())?;
        self.gpu.device().present()?;
        log::trace!(
            "RenderAgent: Frame {} presented with {} draw calls",
            self.frame_index,
            stats.totals.draw_calls
        );
        self.frame_index += 1;
        Ok(stats)
    }

    fn resize_active_lanes(&mut self) -> Result<(), RenderError> {
        let Some(viewport) = self.viewport else {
            return Ok(());
        };
        let surface_format = self.gpu.device().surface_format();
        for name in strategy_lanes(self.strategy, &self.settings) {
            let Some(lane) = self.lanes.iter_mut().find(|lane| lane.strategy_name() == name)
            else {
                continue;
            };
            let mut config = PassConfig {
                gpu: &self.gpu,
                pool: &mut self.pool,
                pipelines: &mut self.pipelines,
                settings: &self.settings,
                viewport,
                surface_format,
            };
            lane.resize(&mut config)?;
        }
        Ok(())
    }

    /// Sums the cost estimates of the passes that would render `scene`.
    pub fn estimate_frame_cost(&self, scene: &SceneSnapshot) -> f32 {
        pass_sequence(self.strategy, &self.settings, scene.water.is_some())
            .into_iter()
            .filter_map(|name| self.lane(name))
            .map(|lane| lane.estimate_cost(scene))
            .sum()
    }

    /// Waits for the GPU and releases every target and buffer.
    pub fn shutdown(&mut self) -> Result<(), RenderError> {
        let idle = self.gpu.wait_idle();
        for lane in &mut self.lanes {
            lane.dispose(&self.gpu, &mut self.pool);
        }
        self.pool.release_all(self.gpu.device());
        self.buffers.destroy(self.gpu.device());
        self.viewport = None;
        log::info!("RenderAgent: Shut down after {} frames", self.frame_index);
        idle
    }

    /// The GPU context.
    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// The settings as last requested.
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// The strategy that renders, after capability fallback.
    pub fn strategy(&self) -> RenderStrategy {
        self.strategy
    }

    /// The shared target pool.
    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    /// The pipeline cache.
    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    /// The current viewport, once resized.
    pub fn viewport(&self) -> Option<Extent2D> {
        self.viewport
    }

    /// Number of frames presented so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Finds a lane by its strategy name.
    pub fn lane(&self, name: &str) -> Option<&dyn RenderPassLane> {
        self.lanes
            .iter()
            .find(|lane| lane.strategy_name() == name)
            .map(|lane| lane.as_ref())
    }
}
