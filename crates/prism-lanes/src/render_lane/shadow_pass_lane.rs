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

//! Renders the scene's depth from the primary sun into the shadow map.

use super::scene_draw::{draw_geometry, GeometryPipelines};
use super::{PassConfig, PassContext, PassState, RenderPassLane};
use crate::error::PassError;
use crate::resources::{
    PipelineKey, RenderTargetPool, TargetDesc, TargetPurpose, TargetSize, ViewSlot,
};
use prism_core::lane::{Lane, LaneKind};
use prism_core::math::{frustum_corners, Aabb, Extent2D, Mat4, Vec3};
use prism_core::renderer::api::{
    Operations, RenderPassDepthStencilAttachment, RenderPassDescriptor, TextureFormat,
};
use prism_core::renderer::{
    GpuContext, InputSpec, ResourceSet, ResourceSlot, ShaderVariant, TargetHandle,
};
use prism_core::scene::SceneSnapshot;

const PASS: &str = "shadow";

/// Depth slack added in front of and behind the fitted volume, so casters
/// outside the camera frustum still land in the map.
const Z_PADDING: f32 = 100.0;

const SHADOW_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Cost of one depth-only draw, relative to a full shaded draw.
const DEPTH_DRAW_COST: f32 = 0.05;

fn depth_key() -> PipelineKey {
    PipelineKey::new(ShaderVariant::ShadowDepth).with_depth(SHADOW_FORMAT)
}

/// Fits an orthographic light projection around the camera frustum.
///
/// `toward_sun` points from the scene toward the light. The result maps every
/// corner of `view_proj`'s frustum inside the `[-1, 1] x [-1, 1] x [0, 1]`
/// clip volume.
pub fn fit_light_space(view_proj: Mat4, toward_sun: Vec3) -> Mat4 {
    let corners = frustum_corners(view_proj);
    let center = corners.iter().sum::<Vec3>() / corners.len() as f32;

    let toward = toward_sun.try_normalize().unwrap_or(Vec3::Y);
    // Avoid a degenerate basis when looking straight down.
    let up = if toward.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let light_view = Mat4::look_at_rh(center, center - toward, up);

    let bounds = Aabb::from_points(corners.iter().map(|c| light_view.transform_point3(*c)));

    // The light looks down -Z, so view depth is -z.
    let light_proj = Mat4::orthographic_rh(
        bounds.min.x,
        bounds.max.x,
        bounds.min.y,
        bounds.max.y,
        -bounds.max.z - Z_PADDING,
        -bounds.min.z + Z_PADDING,
    );
    light_proj * light_view
}

/// A lane that renders the shadow map of the primary sun.
///
/// The light projection itself is fitted by the orchestrator (see
/// [`fit_light_space`]) and travels in the main view's uniforms.
#[derive(Debug, Default)]
pub struct ShadowPassLane {
    state: PassState,
    shadow_map: Option<TargetHandle>,
}

impl ShadowPassLane {
    /// Creates a lane without a shadow map. Call `resize` before encoding.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lane for ShadowPassLane {
    fn strategy_name(&self) -> &'static str {
        PASS
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Shadow
    }

    fn estimate_cost(&self, scene: &SceneSnapshot) -> f32 {
        scene.submesh_count() as f32 * DEPTH_DRAW_COST
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderPassLane for ShadowPassLane {
    fn state(&self) -> PassState {
        self.state
    }

    fn inputs(&self) -> &'static [InputSpec] {
        &[]
    }

    fn resize(&mut self, config: &mut PassConfig<'_>) -> Result<(), PassError> {
        self.state.check_resize(PASS)?;
        let max = config.gpu.capabilities().max_texture_dimension;
        let size = config.settings.shadow_map_size.min(max);
        let desc = TargetDesc::new(TargetSize::Fixed(Extent2D::square(size)), SHADOW_FORMAT);
        self.shadow_map = Some(config.pool.allocate(
            config.gpu.device(),
            TargetPurpose::ShadowMap,
            desc,
        )?);
        GeometryPipelines::warm(config.pipelines, config.gpu, depth_key())?;
        self.state = PassState::Resized;
        Ok(())
    }

    fn encode(
        &mut self,
        ctx: &mut PassContext<'_>,
        _inputs: &ResourceSet,
    ) -> Result<ResourceSet, PassError> {
        self.state.check_encode(PASS)?;
        let handle = self.shadow_map.ok_or(PassError::NotResized { pass: PASS })?;
        let depth_view = ctx.pool.view(handle)?;

        let pipelines = GeometryPipelines::resolve(ctx.pipelines, ctx.gpu, depth_key(), ctx.draws)?;

        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("shadow"),
                color_attachments: &[],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(Operations::clear(1.0)),
                    stencil_ops: None,
                }),
            });
            pass.set_bind_group(0, ctx.buffers.view_bind_group(ViewSlot::Main));
            draw_geometry(pass.as_mut(), ctx.draws.ordered(), &pipelines, &mut ctx.counters);
        }
        ctx.counters.depth_traversals += 1;

        self.state = PassState::Ready;
        Ok(ResourceSet::new().with(ResourceSlot::ShadowMap, handle))
    }

    fn dispose(&mut self, gpu: &GpuContext, pool: &mut RenderTargetPool) {
        pool.release(gpu.device(), TargetPurpose::ShadowMap);
        self.shadow_map = None;
        self.state = PassState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::test_support::{count, Harness};
    use prism_core::math::Vec4;
    use prism_core::scene::CameraView;
    use prism_test::{Command, RecordingDevice, SceneBuilder};

    fn assert_inside(light: Mat4, view_proj: Mat4) {
        for corner in frustum_corners(view_proj) {
            let clip = light * Vec4::new(corner.x, corner.y, corner.z, 1.0);
            let ndc = clip.truncate() / clip.w;
            let eps = 1e-3;
            assert!(ndc.x.abs() <= 1.0 + eps, "x out of range: {ndc}");
            assert!(ndc.y.abs() <= 1.0 + eps, "y out of range: {ndc}");
            assert!(ndc.z >= -eps && ndc.z <= 1.0 + eps, "z out of range: {ndc}");
        }
    }

    #[test]
    fn fitted_projection_contains_the_frustum() {
        let cameras = [
            CameraView::default(),
            CameraView::look_at(Vec3::new(30.0, 5.0, -12.0), Vec3::new(0.0, 0.0, 4.0), 1.2, 1.5, 0.5, 250.0),
        ];
        let suns = [
            Vec3::new(0.3, 1.0, 0.2),
            Vec3::new(-1.0, 0.2, 0.0),
            Vec3::Y,
            Vec3::new(0.0, -1.0, 0.001),
        ];
        for camera in cameras {
            for sun in suns {
                let view_proj = camera.view_proj();
                assert_inside(fit_light_space(view_proj, sun), view_proj);
            }
        }
    }

    #[test]
    fn zero_direction_falls_back_to_overhead() {
        let view_proj = CameraView::default().view_proj();
        assert_eq!(
            fit_light_space(view_proj, Vec3::ZERO),
            fit_light_space(view_proj, Vec3::Y)
        );
    }

    #[test]
    fn renders_depth_only_into_the_shadow_map() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = ShadowPassLane::new();
        let empty = SceneBuilder::new(h.gpu.device()).unwrap().build();
        assert!(matches!(
            h.encode(&mut lane, &empty, &ResourceSet::new()),
            Err(PassError::NotResized { .. })
        ));

        h.resize(&mut lane).unwrap();
        let scene = SceneBuilder::new(h.gpu.device())
            .unwrap()
            .sun(Vec3::Y)
            .opaque("a", Vec3::ZERO)
            .transparent("b", Vec3::X)
            .build();
        let out = h.encode(&mut lane, &scene, &ResourceSet::new()).unwrap();

        let handle = out.outputs.get(ResourceSlot::ShadowMap).unwrap();
        let target = h.pool.get(handle).unwrap();
        assert_eq!(target.size, Extent2D::square(h.settings.shadow_map_size));
        assert_eq!(target.format, TextureFormat::Depth32Float);

        let passes: Vec<_> = out
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginRenderPass { color, depth, .. } => Some((color.len(), *depth)),
                _ => None,
            })
            .collect();
        assert_eq!(passes, vec![(0, Some(target.view))]);
        assert_eq!(count(&out.commands, |c| matches!(c, Command::DrawIndexed { .. })), 2);
        assert_eq!(out.counters.depth_traversals, 1);
        assert_eq!(out.counters.scene_traversals, 0);
        assert_eq!(lane.state(), PassState::Ready);
    }

    #[test]
    fn dispose_releases_the_map() {
        let mut h = Harness::new(RecordingDevice::new());
        let mut lane = ShadowPassLane::new();
        h.resize(&mut lane).unwrap();
        assert!(h.pool.target_for(TargetPurpose::ShadowMap).is_some());
        lane.dispose(&h.gpu, &mut h.pool);
        assert!(h.pool.target_for(TargetPurpose::ShadowMap).is_none());
        assert!(matches!(h.resize(&mut lane), Err(PassError::Disposed { .. })));
    }
}
