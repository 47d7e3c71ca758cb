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

//! The render target pool.
//!
//! Every intermediate texture of a frame is owned here, keyed by its logical
//! [`TargetPurpose`]. Passes allocate the targets they write during `resize`
//! and hand generation-checked [`TargetHandle`]s to the passes that read them.
//! A viewport change recreates every viewport-derived target, which bumps its
//! generation and invalidates every handle issued before.

use crate::error::PoolError;
use prism_core::math::Extent2D;
use prism_core::renderer::api::{
    DeviceCapabilities, SampleCount, StorageMode, TextureDescriptor, TextureFormat, TextureId,
    TextureUsage, TextureViewDescriptor, TextureViewId,
};
use prism_core::renderer::{GraphicsDevice, TargetHandle};
use std::borrow::Cow;
use std::fmt;

/// The logical role of a pooled target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetPurpose {
    /// Light-space depth.
    ShadowMap,
    /// G-buffer albedo.
    GBufferAlbedo,
    /// G-buffer normals.
    GBufferNormal,
    /// G-buffer world positions.
    GBufferPosition,
    /// G-buffer depth and stencil.
    GBufferDepth,
    /// Tile-memory albedo of the fused deferred pass.
    TileAlbedo,
    /// Tile-memory normals of the fused deferred pass.
    TileNormal,
    /// Tile-memory positions of the fused deferred pass.
    TilePosition,
    /// Tile-memory depth and stencil of the fused deferred pass.
    TileDepth,
    /// Multisampled color the forward pass resolves from.
    SceneColorMsaa,
    /// Depth of the forward pass.
    SceneDepth,
    /// Depth of the indirect pass.
    IndirectDepth,
    /// Half resolution reflection color.
    ReflectionColor,
    /// Half resolution refraction color.
    RefractionColor,
    /// Half resolution depth of the water views.
    WaterDepth,
    /// A 1x1 depth target bound when no shadow map was produced.
    FallbackShadow,
}

impl TargetPurpose {
    /// A stable name used as texture label and in logs.
    pub fn name(&self) -> &'static str {
        match self {
            TargetPurpose::ShadowMap => "shadow_map",
            TargetPurpose::GBufferAlbedo => "gbuffer_albedo",
            TargetPurpose::GBufferNormal => "gbuffer_normal",
            TargetPurpose::GBufferPosition => "gbuffer_position",
            TargetPurpose::GBufferDepth => "gbuffer_depth",
            TargetPurpose::TileAlbedo => "tile_albedo",
            TargetPurpose::TileNormal => "tile_normal",
            TargetPurpose::TilePosition => "tile_position",
            TargetPurpose::TileDepth => "tile_depth",
            TargetPurpose::SceneColorMsaa => "scene_color_msaa",
            TargetPurpose::SceneDepth => "scene_depth",
            TargetPurpose::IndirectDepth => "indirect_depth",
            TargetPurpose::ReflectionColor => "reflection_color",
            TargetPurpose::RefractionColor => "refraction_color",
            TargetPurpose::WaterDepth => "water_depth",
            TargetPurpose::FallbackShadow => "fallback_shadow",
        }
    }
}

impl fmt::Display for TargetPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the size of a target is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSize {
    /// Exactly the viewport.
    Viewport,
    /// Half the viewport in each dimension.
    HalfViewport,
    /// A fixed size that ignores viewport changes.
    Fixed(Extent2D),
}

impl TargetSize {
    /// The pixel size for a given viewport.
    pub fn resolve(&self, viewport: Extent2D) -> Extent2D {
        match self {
            TargetSize::Viewport => viewport,
            TargetSize::HalfViewport if viewport.is_empty() => viewport,
            TargetSize::HalfViewport => viewport.half(),
            TargetSize::Fixed(size) => *size,
        }
    }

    /// Returns `true` if the target must be recreated on viewport changes.
    pub fn follows_viewport(&self) -> bool {
        !matches!(self, TargetSize::Fixed(_))
    }
}

/// Everything that defines a pooled target apart from its purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetDesc {
    /// Size policy.
    pub size: TargetSize,
    /// Pixel format.
    pub format: TextureFormat,
    /// Samples per pixel.
    pub sample_count: SampleCount,
    /// Allowed usages.
    pub usage: TextureUsage,
    /// Persistent or tile-only storage.
    pub storage: StorageMode,
}

impl TargetDesc {
    /// A single-sampled target that can be rendered to and sampled.
    pub fn new(size: TargetSize, format: TextureFormat) -> Self {
        Self {
            size,
            format,
            sample_count: SampleCount::X1,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            storage: StorageMode::Private,
        }
    }

    /// Stores the target in tile memory only. It can no longer be sampled.
    pub fn memoryless(mut self) -> Self {
        self.storage = StorageMode::Memoryless;
        self.usage = TextureUsage::RENDER_ATTACHMENT;
        self
    }

    /// Sets the sample count. Multisampled targets are attachment-only.
    pub fn multisampled(mut self, count: SampleCount) -> Self {
        self.sample_count = count;
        if count.is_multisampled() {
            self.usage = TextureUsage::RENDER_ATTACHMENT;
        }
        self
    }
}

/// A resolved pooled target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    /// The handle this target was resolved from.
    pub handle: TargetHandle,
    /// Its purpose.
    pub purpose: TargetPurpose,
    /// The texture.
    pub texture: TextureId,
    /// The default view of the texture.
    pub view: TextureViewId,
    /// Actual size in pixels.
    pub size: Extent2D,
    /// Pixel format.
    pub format: TextureFormat,
    /// Samples per pixel.
    pub sample_count: SampleCount,
    /// Storage mode.
    pub storage: StorageMode,
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    texture: TextureId,
    view: TextureViewId,
    size: Extent2D,
}

#[derive(Debug)]
struct Slot {
    purpose: TargetPurpose,
    desc: TargetDesc,
    generation: u32,
    allocation: Option<Allocation>,
}

impl Slot {
    fn handle(&self, index: usize) -> TargetHandle {
        TargetHandle {
            index: index as u32,
            generation: self.generation,
        }
    }
}

/// Owns every intermediate render target.
#[derive(Debug)]
pub struct RenderTargetPool {
    tile_memory: bool,
    viewport: Extent2D,
    slots: Vec<Slot>,
    allocations: usize,
}

impl RenderTargetPool {
    /// Creates an empty pool for a device with the given capabilities.
    pub fn new(capabilities: &DeviceCapabilities) -> Self {
        Self {
            tile_memory: capabilities.tile_memory,
            viewport: Extent2D::default(),
            slots: Vec::new(),
            allocations: 0,
        }
    }

    /// The viewport viewport-derived targets are sized against.
    pub fn viewport(&self) -> Extent2D {
        self.viewport
    }

    /// Allocates the target for `purpose`, or returns the existing one.
    ///
    /// Calling this again with the same description is free and returns the
    /// same handle. A different description recreates the target under a new
    /// generation.
    ///
    /// ## Errors
    /// * `PoolError::MemorylessUnsupported` - Memoryless storage without tile
    ///   memory. Nothing is asked of the device in that case.
    /// * `PoolError::EmptySize` - The resolved size is empty.
    /// * `PoolError::Allocation` - The device refused the texture.
    pub fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        purpose: TargetPurpose,
        desc: TargetDesc,
    ) -> Result<TargetHandle, PoolError> {
        if desc.storage == StorageMode::Memoryless && !self.tile_memory {
            return Err(PoolError::MemorylessUnsupported { purpose });
        }
        let index = match self.slots.iter().position(|s| s.purpose == purpose) {
            Some(index) => {
                let slot = &self.slots[index];
                if slot.desc == desc && slot.allocation.is_some() {
                    return Ok(slot.handle(index));
                }
                index
            }
            None => {
                self.slots.push(Slot {
                    purpose,
                    desc,
                    generation: 0,
                    allocation: None,
                });
                self.slots.len() - 1
            }
        };
        self.slots[index].desc = desc;
        self.recreate(device, index)?;
        Ok(self.slots[index].handle(index))
    }

    /// Resizes every viewport-derived target.
    ///
    /// A call with the current viewport does nothing. Fixed-size targets keep
    /// both their texture and their handle.
    pub fn resize(
        &mut self,
        device: &dyn GraphicsDevice,
        viewport: Extent2D,
    ) -> Result<(), PoolError> {
        if viewport.is_empty() {
            return Err(PoolError::EmptyViewport);
        }
        if viewport == self.viewport {
            return Ok(());
        }
        self.viewport = viewport;
        for index in 0..self.slots.len() {
            let slot = &self.slots[index];
            if slot.desc.size.follows_viewport() && slot.allocation.is_some() {
                self.recreate(device, index)?;
            }
        }
        log::info!(
            "Render target pool resized to {}x{}",
            viewport.width,
            viewport.height
        );
        Ok(())
    }

    /// Resolves a handle.
    ///
    /// ## Errors
    /// * `PoolError::StaleHandle` - The target was recreated or released since
    ///   the handle was issued.
    pub fn get(&self, handle: TargetHandle) -> Result<RenderTarget, PoolError> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .ok_or(PoolError::StaleHandle(handle))?;
        let allocation = slot.allocation.ok_or(PoolError::StaleHandle(handle))?;
        Ok(RenderTarget {
            handle,
            purpose: slot.purpose,
            texture: allocation.texture,
            view: allocation.view,
            size: allocation.size,
            format: slot.desc.format,
            sample_count: slot.desc.sample_count,
            storage: slot.desc.storage,
        })
    }

    /// Resolves a handle to its texture view.
    pub fn view(&self, handle: TargetHandle) -> Result<TextureViewId, PoolError> {
        self.get(handle).map(|t| t.view)
    }

    /// The current handle of the live target for `purpose`.
    pub fn handle_for(&self, purpose: TargetPurpose) -> Option<TargetHandle> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.purpose == purpose && s.allocation.is_some())
            .map(|(index, s)| s.handle(index))
    }

    /// The live target for `purpose`.
    pub fn target_for(&self, purpose: TargetPurpose) -> Option<RenderTarget> {
        self.handle_for(purpose).and_then(|h| self.get(h).ok())
    }

    /// Every live target, in allocation slot order.
    pub fn targets(&self) -> Vec<RenderTarget> {
        (0..self.slots.len())
            .filter_map(|index| self.get(self.slots[index].handle(index)).ok())
            .collect()
    }

    /// Destroys the target for `purpose`. Outstanding handles become stale.
    pub fn release(&mut self, device: &dyn GraphicsDevice, purpose: TargetPurpose) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.purpose == purpose) {
            if let Some(allocation) = slot.allocation.take() {
                destroy(device, purpose, allocation);
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
    }

    /// Destroys every target.
    pub fn release_all(&mut self, device: &dyn GraphicsDevice) {
        let purposes: Vec<_> = self.slots.iter().map(|s| s.purpose).collect();
        for purpose in purposes {
            self.release(device, purpose);
        }
    }

    /// Number of textures created over the pool's lifetime.
    pub fn allocation_count(&self) -> usize {
        self.allocations
    }

    /// Number of live targets.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.allocation.is_some()).count()
    }

    fn recreate(&mut self, device: &dyn GraphicsDevice, index: usize) -> Result<(), PoolError> {
        let viewport = self.viewport;
        let slot = &mut self.slots[index];
        let purpose = slot.purpose;
        if let Some(old) = slot.allocation.take() {
            destroy(device, purpose, old);
            slot.generation = slot.generation.wrapping_add(1);
        }

        let size = slot.desc.size.resolve(viewport);
        if size.is_empty() {
            return Err(PoolError::EmptySize { purpose });
        }
        let texture = device
            .create_texture(&TextureDescriptor {
                label: Some(Cow::Borrowed(purpose.name())),
                size,
                sample_count: slot.desc.sample_count,
                format: slot.desc.format,
                usage: slot.desc.usage,
                storage: slot.desc.storage,
            })
            .map_err(|source| PoolError::Allocation { purpose, source })?;
        let view = match device.create_texture_view(texture, &TextureViewDescriptor::default()) {
            Ok(view) => view,
            Err(source) => {
                if let Err(e) = device.destroy_texture(texture) {
                    log::warn!("Failed to destroy orphaned texture of target '{purpose}': {e}");
                }
                return Err(PoolError::Allocation { purpose, source });
            }
        };
        slot.allocation = Some(Allocation {
            texture,
            view,
            size,
        });
        log::debug!(
            "Allocated target '{}' {}x{} {:?} x{} (generation {})",
            purpose,
            size.width,
            size.height,
            slot.desc.format,
            slot.desc.sample_count.count(),
            slot.generation
        );
        self.allocations += 1;
        Ok(())
    }
}

fn destroy(device: &dyn GraphicsDevice, purpose: TargetPurpose, allocation: Allocation) {
    if let Err(e) = device.destroy_texture_view(allocation.view) {
        log::warn!("Failed to destroy view of target '{purpose}': {e}");
    }
    if let Err(e) = device.destroy_texture(allocation.texture) {
        log::warn!("Failed to destroy target '{purpose}': {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_test::RecordingDevice;

    fn pool_for(device: &RecordingDevice) -> RenderTargetPool {
        RenderTargetPool::new(&device.capabilities())
    }

    fn color(size: TargetSize) -> TargetDesc {
        TargetDesc::new(size, TextureFormat::Rgba16Float)
    }

    #[test]
    fn allocate_is_idempotent() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        pool.resize(&device, Extent2D::new(640, 480)).unwrap();
        let first = pool
            .allocate(&device, TargetPurpose::GBufferNormal, color(TargetSize::Viewport))
            .unwrap();
        let second = pool
            .allocate(&device, TargetPurpose::GBufferNormal, color(TargetSize::Viewport))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.allocation_count(), 1);
        assert_eq!(device.live_textures().len(), 1);
    }

    #[test]
    fn resize_round_trip_ends_at_first_size() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        let s1 = Extent2D::new(800, 600);
        let s2 = Extent2D::new(1920, 1080);
        pool.resize(&device, s1).unwrap();
        pool.allocate(&device, TargetPurpose::GBufferAlbedo, color(TargetSize::Viewport))
            .unwrap();
        pool.allocate(&device, TargetPurpose::ReflectionColor, color(TargetSize::HalfViewport))
            .unwrap();

        pool.resize(&device, s2).unwrap();
        pool.resize(&device, s1).unwrap();

        let albedo = pool.target_for(TargetPurpose::GBufferAlbedo).unwrap();
        let reflection = pool.target_for(TargetPurpose::ReflectionColor).unwrap();
        assert_eq!(albedo.size, s1);
        assert_eq!(reflection.size, Extent2D::new(400, 300));
        // Only the current textures are alive on the device.
        assert_eq!(device.live_textures().len(), 2);
        assert!(device.live_textures().iter().any(|t| t.size == s1));
    }

    #[test]
    fn resize_invalidates_viewport_handles_only() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        pool.resize(&device, Extent2D::new(100, 100)).unwrap();
        let scene = pool
            .allocate(&device, TargetPurpose::SceneDepth, color(TargetSize::Viewport))
            .unwrap();
        let shadow = pool
            .allocate(
                &device,
                TargetPurpose::ShadowMap,
                TargetDesc::new(
                    TargetSize::Fixed(Extent2D::square(256)),
                    TextureFormat::Depth32Float,
                ),
            )
            .unwrap();

        pool.resize(&device, Extent2D::new(200, 100)).unwrap();

        assert!(matches!(pool.get(scene), Err(PoolError::StaleHandle(_))));
        assert_eq!(pool.get(shadow).unwrap().size, Extent2D::square(256));
        let fresh = pool.handle_for(TargetPurpose::SceneDepth).unwrap();
        assert_eq!(fresh.generation, scene.generation + 1);
    }

    #[test]
    fn same_viewport_is_a_no_op() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        let size = Extent2D::new(64, 64);
        pool.resize(&device, size).unwrap();
        pool.allocate(&device, TargetPurpose::SceneDepth, color(TargetSize::Viewport))
            .unwrap();
        pool.resize(&device, size).unwrap();
        assert_eq!(pool.allocation_count(), 1);
    }

    #[test]
    fn memoryless_refused_without_tile_memory() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        pool.resize(&device, Extent2D::new(64, 64)).unwrap();
        let err = pool
            .allocate(
                &device,
                TargetPurpose::TileAlbedo,
                color(TargetSize::Viewport).memoryless(),
            )
            .unwrap_err();
        assert!(matches!(err, PoolError::MemorylessUnsupported { .. }));
        assert_eq!(device.memoryless_allocations(), 0);
        assert!(device.live_textures().is_empty());
    }

    #[test]
    fn memoryless_allowed_with_tile_memory() {
        let device = RecordingDevice::with_tile_memory();
        let mut pool = pool_for(&device);
        pool.resize(&device, Extent2D::new(64, 64)).unwrap();
        let handle = pool
            .allocate(
                &device,
                TargetPurpose::TileAlbedo,
                color(TargetSize::Viewport).memoryless(),
            )
            .unwrap();
        assert_eq!(pool.get(handle).unwrap().storage, StorageMode::Memoryless);
        assert_eq!(device.memoryless_allocations(), 1);
    }

    #[test]
    fn changed_description_recreates_target() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        pool.resize(&device, Extent2D::new(64, 64)).unwrap();
        let single = pool
            .allocate(&device, TargetPurpose::SceneDepth, color(TargetSize::Viewport))
            .unwrap();
        let msaa = pool
            .allocate(
                &device,
                TargetPurpose::SceneDepth,
                color(TargetSize::Viewport).multisampled(SampleCount::X4),
            )
            .unwrap();
        assert_ne!(single, msaa);
        assert_eq!(pool.get(msaa).unwrap().sample_count, SampleCount::X4);
        assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn release_makes_handles_stale() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        pool.resize(&device, Extent2D::new(32, 32)).unwrap();
        let handle = pool
            .allocate(&device, TargetPurpose::SceneColorMsaa, color(TargetSize::Viewport))
            .unwrap();
        pool.release(&device, TargetPurpose::SceneColorMsaa);
        assert!(pool.get(handle).is_err());
        assert!(pool.handle_for(TargetPurpose::SceneColorMsaa).is_none());
        assert!(device.live_textures().is_empty());
    }

    #[test]
    fn empty_viewport_is_rejected() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        assert!(matches!(
            pool.resize(&device, Extent2D::new(0, 10)),
            Err(PoolError::EmptyViewport)
        ));
        let err = pool
            .allocate(&device, TargetPurpose::SceneDepth, color(TargetSize::Viewport))
            .unwrap_err();
        assert!(matches!(err, PoolError::EmptySize { .. }));
    }

    #[test]
    fn failed_view_does_not_leak_the_texture() {
        let device = RecordingDevice::new();
        let mut pool = pool_for(&device);
        pool.resize(&device, Extent2D::new(64, 64)).unwrap();
        device.fail_next_texture_view();
        let err = pool
            .allocate(&device, TargetPurpose::GBufferNormal, color(TargetSize::Viewport))
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::Allocation {
                purpose: TargetPurpose::GBufferNormal,
                ..
            }
        ));
        assert!(device.live_textures().is_empty());
        assert_eq!(pool.live_count(), 0);

        pool.allocate(&device, TargetPurpose::GBufferNormal, color(TargetSize::Viewport))
            .unwrap();
        assert_eq!(device.live_textures().len(), 1);
    }
}
