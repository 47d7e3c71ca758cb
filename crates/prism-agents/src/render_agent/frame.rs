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

//! Strategy resolution, pass sequencing and frame parameter construction.

use prism_core::math::{Extent2D, Plane};
use prism_core::renderer::api::DeviceCapabilities;
use prism_core::renderer::{FeatureToggles, FrameParams, RenderSettings, RenderStrategy};
use prism_core::scene::SceneSnapshot;
use prism_lanes::render_lane::fit_light_space;

/// Picks the strategy the device can actually run.
///
/// Tiled deferred needs tile memory; indirect needs GPU-written indirect
/// arguments and compute. Anything else falls back to forward.
pub fn resolve_strategy(requested: RenderStrategy, caps: &DeviceCapabilities) -> RenderStrategy {
    match requested {
        RenderStrategy::TiledDeferred if !caps.tile_memory => RenderStrategy::Forward,
        RenderStrategy::Indirect if !(caps.indirect_execution && caps.compute) => {
            RenderStrategy::Forward
        }
        other => other,
    }
}

/// The lanes that encode a frame, in execution order.
///
/// The shadow pass comes first, then the water views (sampled by the main
/// pass when it draws the water surface), then the main strategy.
pub fn pass_sequence(
    strategy: RenderStrategy,
    settings: &RenderSettings,
    scene_has_water: bool,
) -> Vec<&'static str> {
    let mut names = Vec::with_capacity(4);
    if settings.features.shadows {
        names.push("shadow");
    }
    if settings.water && scene_has_water {
        names.push("water");
    }
    match strategy {
        RenderStrategy::Forward => names.push("forward"),
        RenderStrategy::Deferred => names.extend(["gbuffer", "lighting"]),
        RenderStrategy::TiledDeferred => names.push("tiled_deferred"),
        RenderStrategy::Indirect => names.push("indirect"),
    }
    names
}

/// Lanes a strategy can run, whether or not the scene asks for them.
pub(crate) fn strategy_lanes(strategy: RenderStrategy, settings: &RenderSettings) -> Vec<&'static str> {
    pass_sequence(strategy, settings, true)
}

/// Snapshots everything the passes read about the frame.
pub fn build_frame_params(
    frame_index: u64,
    scene: &SceneSnapshot,
    viewport: Extent2D,
    features: FeatureToggles,
) -> FrameParams {
    let view_proj = scene.camera.view_proj();
    let sun_direction = scene.primary_sun_direction();
    FrameParams {
        frame_index,
        view: scene.camera.view,
        projection: scene.camera.projection,
        view_proj,
        camera_position: scene.camera.position,
        shadow_view_proj: fit_light_space(view_proj, sun_direction),
        sun_direction,
        sun_count: scene.sun_count(),
        point_light_count: scene.point_light_count(),
        viewport,
        features,
        time: scene.time,
        clip_plane: Plane::NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::math::Vec3;
    use prism_core::scene::Light;

    #[test]
    fn unsupported_strategies_fall_back_to_forward() {
        let plain = DeviceCapabilities::default();
        assert_eq!(
            resolve_strategy(RenderStrategy::TiledDeferred, &plain),
            RenderStrategy::Forward
        );
        assert_eq!(resolve_strategy(RenderStrategy::Indirect, &plain), RenderStrategy::Indirect);
        assert_eq!(resolve_strategy(RenderStrategy::Deferred, &plain), RenderStrategy::Deferred);

        let tiled = DeviceCapabilities {
            tile_memory: true,
            compute: false,
            ..Default::default()
        };
        assert_eq!(
            resolve_strategy(RenderStrategy::TiledDeferred, &tiled),
            RenderStrategy::TiledDeferred
        );
        assert_eq!(resolve_strategy(RenderStrategy::Indirect, &tiled), RenderStrategy::Forward);
    }

    #[test]
    fn water_runs_between_shadow_and_main() {
        let settings = RenderSettings {
            water: true,
            ..Default::default()
        };
        assert_eq!(
            pass_sequence(RenderStrategy::Deferred, &settings, true),
            vec!["shadow", "water", "gbuffer", "lighting"]
        );
        assert_eq!(
            pass_sequence(RenderStrategy::Deferred, &settings, false),
            vec!["shadow", "gbuffer", "lighting"]
        );

        let mut no_shadows = RenderSettings::default();
        no_shadows.features.shadows = false;
        assert_eq!(pass_sequence(RenderStrategy::Forward, &no_shadows, true), vec!["forward"]);
    }

    #[test]
    fn params_carry_the_primary_sun() {
        let mut scene = SceneSnapshot::default();
        scene.lights.push(Light::sun(Vec3::new(0.0, 10.0, 0.0), Vec3::ONE));
        let params = build_frame_params(7, &scene, Extent2D::new(640, 480), FeatureToggles::default());
        assert_eq!(params.frame_index, 7);
        assert_eq!(params.sun_count, 1);
        assert_eq!(params.point_light_count, 0);
        assert_eq!(params.clip_plane, Plane::NONE);
        assert!(params.sun_direction.y > 0.99);
        assert_ne!(params.shadow_view_proj, params.view_proj);
    }
}
