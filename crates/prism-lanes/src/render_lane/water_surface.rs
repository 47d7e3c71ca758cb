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

//! The water surface drawn by the main passes.
//!
//! The surface is a single quad scaled to the water plane. Its fragment stage
//! samples the reflection and refraction colors and the refraction depth that
//! the water lane rendered earlier in the frame.

use super::{CachedBindGroup, PassContext};
use crate::error::PassError;
use crate::resources::{PipelineKey, RenderTargetPool, SceneBuffers, StandardLayouts};
use prism_core::math::{Mat4, Vec3};
use prism_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BufferDescriptor, BufferId, BufferUsage,
    IndexFormat, RenderPipelineId, TextureViewId,
};
use prism_core::renderer::{
    DrawCounters, GraphicsDevice, RenderPass, ResourceError, ResourceSet, ResourceSlot,
};
use prism_core::scene::{StandardVertex, WaterPlane};
use std::borrow::Cow;

/// Uniforms of the water surface.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct WaterUniforms {
    /// Unit quad to world.
    pub model: [[f32; 4]; 4],
    /// Height, half extent, scene time, unused.
    pub params: [f32; 4],
}

impl WaterUniforms {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Uniforms for `plane` at scene time `time`.
    pub fn new(plane: &WaterPlane, time: f32) -> Self {
        let model = Mat4::from_translation(Vec3::new(0.0, plane.height, 0.0))
            * Mat4::from_scale(Vec3::new(plane.half_extent, 1.0, plane.half_extent));
        Self {
            model: model.to_cols_array_2d(),
            params: [plane.height, plane.half_extent, time, 0.0],
        }
    }
}

const QUAD_INDICES: [u16; 6] = [0, 3, 2, 0, 2, 1];

fn quad() -> [StandardVertex; 4] {
    [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)].map(|(x, z)| StandardVertex {
        position: [x, 0.0, z],
        normal: [0.0, 1.0, 0.0],
        uv: [(x + 1.0) * 0.5, (z + 1.0) * 0.5],
    })
}

/// Views sampled by the surface: reflection, refraction and refraction depth.
pub(crate) type WaterViews = [TextureViewId; 3];

#[derive(Debug, Clone, Copy)]
struct Mesh {
    vertices: BufferId,
    indices: BufferId,
    uniforms: BufferId,
}

/// GPU state of the water surface, created on first use.
#[derive(Debug, Default)]
pub(crate) struct WaterSurface {
    mesh: Option<Mesh>,
    group: CachedBindGroup<WaterViews>,
}

/// Everything needed to draw the surface inside an open pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PreparedWater {
    pub(crate) pipeline: RenderPipelineId,
    pub(crate) group: BindGroupId,
    vertices: BufferId,
    indices: BufferId,
}

impl WaterSurface {
    /// Resolves the water views of this frame.
    ///
    /// Returns `None` unless the water lane produced all three targets.
    pub(crate) fn views(
        pool: &RenderTargetPool,
        inputs: &ResourceSet,
    ) -> Result<Option<WaterViews>, PassError> {
        let slots = [
            ResourceSlot::ReflectionColor,
            ResourceSlot::RefractionColor,
            ResourceSlot::WaterDepth,
        ];
        let mut views = [TextureViewId(0); 3];
        for (view, slot) in views.iter_mut().zip(slots) {
            match inputs.get(slot) {
                Some(handle) => *view = pool.view(handle)?,
                None => return Ok(None),
            }
        }
        Ok(Some(views))
    }

    /// Uploads this frame's uniforms and returns the bind group for `views`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn prepare(
        &mut self,
        device: &dyn GraphicsDevice,
        layouts: &StandardLayouts,
        buffers: &SceneBuffers,
        pipeline: RenderPipelineId,
        views: WaterViews,
        plane: &WaterPlane,
        time: f32,
    ) -> Result<PreparedWater, ResourceError> {
        let mesh = match self.mesh {
            Some(mesh) => mesh,
            None => {
                let mesh = create_mesh(device)?;
                self.mesh = Some(mesh);
                mesh
            }
        };
        let uniforms = WaterUniforms::new(plane, time);
        device.write_buffer(mesh.uniforms, 0, bytemuck::bytes_of(&uniforms))?;

        let sampler = buffers.linear_sampler();
        let layout = layouts.water;
        let group = self.group.get_or_create(device, views, || {
            device.create_bind_group(&BindGroupDescriptor {
                label: Some("water_surface"),
                layout,
                entries: &[
                    BindGroupEntry::texture(0, views[0]),
                    BindGroupEntry::texture(1, views[1]),
                    BindGroupEntry::texture(2, views[2]),
                    BindGroupEntry::sampler(3, sampler),
                    BindGroupEntry::buffer(4, mesh.uniforms),
                ],
            })
        })?;
        Ok(PreparedWater {
            pipeline,
            group,
            vertices: mesh.vertices,
            indices: mesh.indices,
        })
    }

    /// Prepares the surface for a pass drawing with `key`.
    ///
    /// Returns `None` when the scene has no water or the water views were not
    /// produced this frame.
    pub(crate) fn prepare_frame(
        &mut self,
        ctx: &mut PassContext<'_>,
        inputs: &ResourceSet,
        key: PipelineKey,
    ) -> Result<Option<PreparedWater>, PassError> {
        let Some(plane) = ctx.scene.water.as_ref() else {
            return Ok(None);
        };
        let Some(views) = Self::views(ctx.pool, inputs)? else {
            return Ok(None);
        };
        let pipeline = ctx.pipelines.get(ctx.gpu, &key)?;
        let prepared = self.prepare(
            ctx.gpu.device(),
            ctx.pipelines.layouts(),
            ctx.buffers,
            pipeline,
            views,
            plane,
            ctx.scene.time,
        )?;
        Ok(Some(prepared))
    }

    pub(crate) fn release(&mut self, device: &dyn GraphicsDevice) {
        self.group.release(device);
        if let Some(mesh) = self.mesh.take() {
            for buffer in [mesh.vertices, mesh.indices, mesh.uniforms] {
                if let Err(e) = device.destroy_buffer(buffer) {
                    log::warn!("Failed to destroy water surface buffer: {e}");
                }
            }
        }
    }
}

impl PreparedWater {
    /// Draws the surface. Expects group 0 (view) and group 1 (shadow) bound.
    pub(crate) fn draw(&self, pass: &mut dyn RenderPass, counters: &mut DrawCounters) {
        pass.set_pipeline(self.pipeline);
        pass.set_bind_group(2, self.group);
        pass.set_vertex_buffer(0, self.vertices, 0);
        pass.set_index_buffer(self.indices, 0, IndexFormat::Uint16);
        pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        counters.draw_calls += 1;
    }
}

fn create_mesh(device: &dyn GraphicsDevice) -> Result<Mesh, ResourceError> {
    let vertices = quad();
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&QUAD_INDICES);
    let vertices = device.create_buffer_with_data(
        &BufferDescriptor {
            label: Some(Cow::Borrowed("water_vertices")),
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::VERTEX,
        },
        vertex_bytes,
    )?;
    let indices = device.create_buffer_with_data(
        &BufferDescriptor {
            label: Some(Cow::Borrowed("water_indices")),
            size: index_bytes.len() as u64,
            usage: BufferUsage::INDEX,
        },
        index_bytes,
    )?;
    let uniforms = device.create_buffer(&BufferDescriptor {
        label: Some(Cow::Borrowed("water_uniforms")),
        size: WaterUniforms::SIZE,
        usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
    })?;
    Ok(Mesh {
        vertices,
        indices,
        uniforms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn uniforms_place_quad_on_the_plane() {
        let plane = WaterPlane {
            height: 1.5,
            half_extent: 10.0,
        };
        let uniforms = WaterUniforms::new(&plane, 3.0);
        let model = Mat4::from_cols_array_2d(&uniforms.model);
        let corner = model.transform_point3(Vec3::new(1.0, 0.0, -1.0));
        assert_abs_diff_eq!(corner, Vec3::new(10.0, 1.5, -10.0), epsilon = 1e-5);
        assert_eq!(uniforms.params, [1.5, 10.0, 3.0, 0.0]);
    }

    #[test]
    fn views_need_every_water_target() {
        let device = prism_test::RecordingDevice::new();
        let pool = RenderTargetPool::new(&device.capabilities());
        assert!(WaterSurface::views(&pool, &ResourceSet::new()).unwrap().is_none());
    }
}
