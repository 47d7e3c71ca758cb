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

//! Render pass lanes.
//!
//! A pass lane owns the targets it writes (allocated through the
//! [`RenderTargetPool`] on resize) and encodes exactly one scope per frame. The
//! water lane is the one exception and encodes two. Every pass declares the
//! slots it reads, receives them as generation-checked handles and returns the
//! slots it produced.

use crate::error::PassError;
use crate::resources::{DrawList, PipelineCache, RenderTargetPool, SceneBuffers};
use prism_core::lane::Lane;
use prism_core::math::Extent2D;
use prism_core::renderer::api::{BindGroupId, TextureFormat};
use prism_core::renderer::{
    CommandEncoder, DrawCounters, FrameParams, FrameTarget, GpuContext, GraphicsDevice,
    InputSpec, RenderSettings, ResourceError, ResourceSet, ResourceSlot, TargetHandle,
};
use prism_core::scene::SceneSnapshot;

mod forward_lane;
mod gbuffer_lane;
mod indirect_lane;
mod light_volume;
mod lighting_lane;
mod scene_draw;
mod shadow_pass_lane;
#[cfg(test)]
mod test_support;
mod tiled_deferred_lane;
mod water_lane;
mod water_surface;

pub use forward_lane::ForwardLane;
pub use gbuffer_lane::GBufferLane;
pub use indirect_lane::{IndirectLane, IndirectSource};
pub use light_volume::{icosahedron, LightVolume, LIGHT_VOLUME_INDEX_COUNT};
pub use lighting_lane::LightingLane;
pub use shadow_pass_lane::{fit_light_space, ShadowPassLane};
pub use tiled_deferred_lane::TiledDeferredLane;
pub use water_lane::WaterLane;
pub use water_surface::WaterUniforms;

/// Lifecycle of a pass lane.
///
/// `Uninitialized -> Resized -> Ready -> Resized -> Ready ... -> Disposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassState {
    /// Created, no targets yet.
    #[default]
    Uninitialized,
    /// Targets match the current viewport; nothing encoded since.
    Resized,
    /// At least one frame was encoded with the current targets.
    Ready,
    /// Targets were released. The lane cannot be used again.
    Disposed,
}

impl PassState {
    /// Checks that a pass in this state may encode.
    pub fn check_encode(self, pass: &'static str) -> Result<(), PassError> {
        match self {
            PassState::Uninitialized => Err(PassError::NotResized { pass }),
            PassState::Disposed => Err(PassError::Disposed { pass }),
            PassState::Resized | PassState::Ready => Ok(()),
        }
    }

    /// Checks that a pass in this state may be resized.
    pub fn check_resize(self, pass: &'static str) -> Result<(), PassError> {
        match self {
            PassState::Disposed => Err(PassError::Disposed { pass }),
            _ => Ok(()),
        }
    }
}

/// What a pass needs to (re)allocate its targets.
pub struct PassConfig<'a> {
    /// The GPU context.
    pub gpu: &'a GpuContext,
    /// The shared target pool, already resized to `viewport`.
    pub pool: &'a mut RenderTargetPool,
    /// The pipeline cache, for passes that warm their pipelines up front.
    pub pipelines: &'a mut PipelineCache,
    /// The active settings.
    pub settings: &'a RenderSettings,
    /// The drawable size.
    pub viewport: Extent2D,
    /// The drawable format.
    pub surface_format: TextureFormat,
}

/// Everything a pass reads or writes while encoding one frame.
pub struct PassContext<'a> {
    /// The GPU context.
    pub gpu: &'a GpuContext,
    /// The frame's command encoder.
    pub encoder: &'a mut dyn CommandEncoder,
    /// The frame parameters of the main view.
    pub params: &'a FrameParams,
    /// The scene being rendered.
    pub scene: &'a SceneSnapshot,
    /// The scene flattened into draws.
    pub draws: &'a DrawList,
    /// The target pool.
    pub pool: &'a RenderTargetPool,
    /// The pipeline cache.
    pub pipelines: &'a mut PipelineCache,
    /// The uploaded scene data.
    pub buffers: &'a SceneBuffers,
    /// The drawable of this frame.
    pub frame_target: FrameTarget,
    /// Counters of the pass currently encoding. Reset by the caller.
    pub counters: DrawCounters,
}

/// The contract every render pass lane implements.
pub trait RenderPassLane: Lane {
    /// The current lifecycle state.
    fn state(&self) -> PassState;

    /// The slots this pass reads.
    fn inputs(&self) -> &'static [InputSpec];

    /// Allocates or resizes the pass's targets. Idempotent for an unchanged
    /// configuration.
    fn resize(&mut self, config: &mut PassConfig<'_>) -> Result<(), PassError>;

    /// Encodes the pass and returns the slots it produced.
    fn encode(
        &mut self,
        ctx: &mut PassContext<'_>,
        inputs: &ResourceSet,
    ) -> Result<ResourceSet, PassError>;

    /// Releases the pass's targets and bind groups.
    fn dispose(&mut self, gpu: &GpuContext, pool: &mut RenderTargetPool);
}

/// Returns the handle bound to a required slot.
pub(crate) fn require(
    inputs: &ResourceSet,
    pass: &'static str,
    slot: ResourceSlot,
) -> Result<TargetHandle, PassError> {
    inputs.get(slot).ok_or(PassError::MissingInput { pass, slot })
}

/// A bind group recreated only when the resources it references change.
#[derive(Debug)]
pub(crate) struct CachedBindGroup<K> {
    entry: Option<(K, BindGroupId)>,
}

impl<K> Default for CachedBindGroup<K> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<K: PartialEq + Copy> CachedBindGroup<K> {
    pub(crate) fn get_or_create(
        &mut self,
        device: &dyn GraphicsDevice,
        key: K,
        create: impl FnOnce() -> Result<BindGroupId, ResourceError>,
    ) -> Result<BindGroupId, ResourceError> {
        if let Some((cached, group)) = self.entry {
            if cached == key {
                return Ok(group);
            }
        }
        let group = create()?;
        if let Some((_, old)) = self.entry.replace((key, group)) {
            if let Err(e) = device.destroy_bind_group(old) {
                log::warn!("Failed to destroy stale bind group: {e}");
            }
        }
        Ok(group)
    }

    pub(crate) fn release(&mut self, device: &dyn GraphicsDevice) {
        if let Some((_, group)) = self.entry.take() {
            if let Err(e) = device.destroy_bind_group(group) {
                log::warn!("Failed to destroy bind group: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_requires_a_resize() {
        assert!(matches!(
            PassState::Uninitialized.check_encode("forward"),
            Err(PassError::NotResized { pass: "forward" })
        ));
        assert!(PassState::Resized.check_encode("forward").is_ok());
        assert!(PassState::Ready.check_encode("forward").is_ok());
        assert!(matches!(
            PassState::Disposed.check_resize("forward"),
            Err(PassError::Disposed { .. })
        ));
    }

    #[test]
    fn missing_required_input_is_reported() {
        let err = require(&ResourceSet::new(), "lighting", ResourceSlot::GBufferAlbedo).unwrap_err();
        assert!(matches!(
            err,
            PassError::MissingInput {
                slot: ResourceSlot::GBufferAlbedo,
                ..
            }
        ));
    }
}
