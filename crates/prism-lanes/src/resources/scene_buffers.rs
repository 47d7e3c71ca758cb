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

//! Per-frame scene data on the GPU.
//!
//! Each frame the scene snapshot is flattened into three storage buffers (the
//! per-draw table, materials and lights) and one uniform block per view. The
//! storage buffers only grow, so a scene that keeps its size uploads in place.

use crate::resources::draw_list::DrawList;
use crate::resources::pipeline_cache::StandardLayouts;
use prism_core::math::{Mat3, Mat4, EPSILON};
use prism_core::renderer::api::{
    AddressMode, BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutId,
    BufferDescriptor, BufferId, BufferUsage, CompareFunction, FilterMode, SamplerDescriptor,
    SamplerId,
};
use prism_core::renderer::{FrameParams, FrameUniforms, GraphicsDevice, ResourceError};
use prism_core::scene::{GpuLight, GpuMaterial, LightKind, Material, SceneSnapshot};
use std::borrow::Cow;

/// The views a frame can render the scene from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewSlot {
    /// The camera.
    Main,
    /// The camera mirrored across the water plane.
    Reflection,
    /// The camera clipped below the water plane.
    Refraction,
}

impl ViewSlot {
    const ALL: [ViewSlot; 3] = [ViewSlot::Main, ViewSlot::Reflection, ViewSlot::Refraction];

    fn index(self) -> usize {
        match self {
            ViewSlot::Main => 0,
            ViewSlot::Reflection => 1,
            ViewSlot::Refraction => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ViewSlot::Main => "view_main",
            ViewSlot::Reflection => "view_reflection",
            ViewSlot::Refraction => "view_refraction",
        }
    }
}

/// One entry of the per-draw table, indexed by the instance id.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct GpuDraw {
    /// Model to world.
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of the model matrix.
    pub normal_matrix: [[f32; 4]; 4],
    /// Index into the material buffer.
    pub material: u32,
    /// Bit 0: transparent, bit 1: skinned.
    pub flags: u32,
    /// Index of the owning model.
    pub model_index: u32,
    _pad: u32,
}

impl GpuDraw {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    fn new(transform: Mat4, material: u32, transparent: bool, skinned: bool, model_index: u32) -> Self {
        let linear = Mat3::from_mat4(transform);
        let normal = if linear.determinant().abs() > EPSILON {
            Mat4::from_mat3(linear.inverse().transpose())
        } else {
            Mat4::IDENTITY
        };
        Self {
            model: transform.to_cols_array_2d(),
            normal_matrix: normal.to_cols_array_2d(),
            material,
            flags: transparent as u32 | (skinned as u32) << 1,
            model_index,
            _pad: 0,
        }
    }
}

#[derive(Debug)]
struct StorageBuffer {
    label: &'static str,
    id: BufferId,
    capacity: u64,
}

impl StorageBuffer {
    fn new(device: &dyn GraphicsDevice, label: &'static str, capacity: u64) -> Result<Self, ResourceError> {
        let id = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed(label)),
            size: capacity,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })?;
        Ok(Self { label, id, capacity })
    }

    /// Writes `data`, growing the buffer first if needed. Returns `true` on growth.
    fn write(&mut self, device: &dyn GraphicsDevice, data: &[u8]) -> Result<bool, ResourceError> {
        let needed = data.len() as u64;
        let grown = needed > self.capacity;
        if grown {
            let capacity = needed.next_power_of_two();
            let replacement = Self::new(device, self.label, capacity)?;
            if let Err(e) = device.destroy_buffer(self.id) {
                log::warn!("Failed to destroy buffer '{}': {e}", self.label);
            }
            log::debug!("Grew '{}' from {} to {} bytes", self.label, self.capacity, capacity);
            *self = replacement;
        }
        if !data.is_empty() {
            device.write_buffer(self.id, 0, data)?;
        }
        Ok(grown)
    }
}

/// GPU copies of the scene and the per-view uniforms.
#[derive(Debug)]
pub struct SceneBuffers {
    view_layout: BindGroupLayoutId,
    uniforms: [BufferId; 3],
    view_groups: [BindGroupId; 3],
    draws: StorageBuffer,
    materials: StorageBuffer,
    lights: StorageBuffer,
    shadow_sampler: SamplerId,
    linear_sampler: SamplerId,
    point_light_count: u32,
}

impl SceneBuffers {
    /// Creates the buffers with room for one element each and the shared samplers.
    pub fn new(device: &dyn GraphicsDevice, layouts: &StandardLayouts) -> Result<Self, ResourceError> {
        let mut uniforms = [BufferId(0); 3];
        for slot in ViewSlot::ALL {
            uniforms[slot.index()] = device.create_buffer(&BufferDescriptor {
                label: Some(Cow::Borrowed(slot.label())),
                size: FrameUniforms::SIZE,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })?;
        }
        let draws = StorageBuffer::new(device, "draw_table", GpuDraw::SIZE)?;
        let materials = StorageBuffer::new(device, "materials", stride_of::<GpuMaterial>())?;
        let lights = StorageBuffer::new(device, "lights", stride_of::<GpuLight>())?;

        let shadow_sampler = device.create_sampler(&SamplerDescriptor {
            label: Some(Cow::Borrowed("shadow_comparison")),
            address_mode: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            compare: Some(CompareFunction::LessEqual),
        })?;
        let linear_sampler = device.create_sampler(&SamplerDescriptor {
            label: Some(Cow::Borrowed("linear_clamp")),
            address_mode: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            compare: None,
        })?;

        let mut buffers = Self {
            view_layout: layouts.view,
            uniforms,
            view_groups: [BindGroupId(0); 3],
            draws,
            materials,
            lights,
            shadow_sampler,
            linear_sampler,
            point_light_count: 0,
        };
        buffers.rebuild_view_groups(device, false)?;
        Ok(buffers)
    }

    /// Uploads the draw table, materials and lights of `scene`.
    ///
    /// Lights are packed point lights first, then suns, so a point light's
    /// instance id is its index and a sun's index starts after them.
    pub fn upload(&mut self, device: &dyn GraphicsDevice, scene: &SceneSnapshot) -> Result<DrawList, ResourceError> {
        let list = DrawList::from_scene(scene);
        let draws: Vec<GpuDraw> = list
            .items()
            .iter()
            .map(|item| {
                let transform = scene
                    .models
                    .get(item.model as usize)
                    .map_or(Mat4::IDENTITY, |m| m.transform);
                GpuDraw::new(
                    transform,
                    item.submesh.material.0,
                    item.submesh.is_transparent,
                    item.has_skeleton,
                    item.model,
                )
            })
            .collect();

        let mut materials: Vec<GpuMaterial> = scene.materials.iter().map(Material::to_gpu).collect();
        if materials.is_empty() {
            materials.push(Material::default().to_gpu());
        }

        let lights: Vec<GpuLight> = scene
            .point_lights()
            .chain(scene.suns())
            .map(|l| l.to_gpu())
            .collect();
        self.point_light_count = scene.lights.iter().filter(|l| l.kind == LightKind::Point).count() as u32;

        let mut grown = self.draws.write(device, bytemuck::cast_slice(&draws))?;
        grown |= self.materials.write(device, bytemuck::cast_slice(&materials))?;
        grown |= self.lights.write(device, bytemuck::cast_slice(&lights))?;
        if grown {
            self.rebuild_view_groups(device, true)?;
        }
        Ok(list)
    }

    /// Writes the uniform block of one view.
    pub fn write_view(&self, device: &dyn GraphicsDevice, slot: ViewSlot, params: &FrameParams) -> Result<(), ResourceError> {
        let uniforms = params.uniforms();
        device.write_buffer(self.uniforms[slot.index()], 0, bytemuck::bytes_of(&uniforms))
    }

    /// The uniform buffer of a view.
    pub fn view_uniforms(&self, slot: ViewSlot) -> BufferId {
        self.uniforms[slot.index()]
    }

    /// The group 0 bind group of a view.
    pub fn view_bind_group(&self, slot: ViewSlot) -> BindGroupId {
        self.view_groups[slot.index()]
    }

    /// Index of the `i`th sun in the light buffer.
    pub fn sun_light_index(&self, i: u32) -> u32 {
        self.point_light_count + i
    }

    /// The comparison sampler used for shadow lookups.
    pub fn shadow_sampler(&self) -> SamplerId {
        self.shadow_sampler
    }

    /// A bilinear clamping sampler.
    pub fn linear_sampler(&self) -> SamplerId {
        self.linear_sampler
    }

    /// The per-draw table.
    pub fn draw_buffer(&self) -> BufferId {
        self.draws.id
    }

    /// The packed lights.
    pub fn light_buffer(&self) -> BufferId {
        self.lights.id
    }

    /// Releases every buffer and bind group.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for group in self.view_groups {
            if let Err(e) = device.destroy_bind_group(group) {
                log::warn!("Failed to destroy view bind group: {e}");
            }
        }
        let buffers = self
            .uniforms
            .iter()
            .copied()
            .chain([self.draws.id, self.materials.id, self.lights.id]);
        for buffer in buffers {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("Failed to destroy scene buffer {buffer:?}: {e}");
            }
        }
    }

    fn rebuild_view_groups(&mut self, device: &dyn GraphicsDevice, replace: bool) -> Result<(), ResourceError> {
        for slot in ViewSlot::ALL {
            let group = device.create_bind_group(&BindGroupDescriptor {
                label: Some(slot.label()),
                layout: self.view_layout,
                entries: &[
                    BindGroupEntry::buffer(0, self.uniforms[slot.index()]),
                    BindGroupEntry::buffer(1, self.draws.id),
                    BindGroupEntry::buffer(2, self.materials.id),
                    BindGroupEntry::buffer(3, self.lights.id),
                ],
            })?;
            let old = std::mem::replace(&mut self.view_groups[slot.index()], group);
            if replace {
                if let Err(e) = device.destroy_bind_group(old) {
                    log::warn!("Failed to destroy view bind group: {e}");
                }
            }
        }
        Ok(())
    }
}

fn stride_of<T>() -> u64 {
    std::mem::size_of::<T>() as u64
}
