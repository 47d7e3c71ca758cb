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

use prism_agents::RenderAgent;
use prism_core::math::{frustum_corners, Extent2D, Vec3};
use prism_core::renderer::api::{DeviceCapabilities, SampleCount, ScissorRect, SubmissionIndex};
use prism_core::renderer::{
    FeatureToggles, RenderError, RenderSettings, RenderStrategy, ResourceError, ResourceSlot,
    ShaderError,
};
use prism_core::scene::SceneSnapshot;
use prism_lanes::render_lane::IndirectLane;
use prism_lanes::resources::TargetPurpose;
use prism_test::{init_logging, test_shader_sources, Command, RecordingDevice, SceneBuilder};
use std::sync::Arc;

const VIEWPORT: Extent2D = Extent2D::new(800, 600);

fn settings(strategy: RenderStrategy) -> RenderSettings {
    RenderSettings {
        strategy,
        ..Default::default()
    }
}

fn agent_on(device: RecordingDevice, settings: RenderSettings) -> (Arc<RecordingDevice>, RenderAgent) {
    init_logging();
    let device = Arc::new(device);
    let mut agent = RenderAgent::new(device.clone(), &test_shader_sources(), settings).unwrap();
    agent.resize(VIEWPORT).unwrap();
    (device, agent)
}

fn lit_scene(device: &RecordingDevice) -> SceneSnapshot {
    SceneBuilder::new(device)
        .unwrap()
        .sun(Vec3::new(1.0, 3.0, 2.0))
        .opaque("ground", Vec3::new(0.0, -1.0, 0.0))
        .opaque("crate", Vec3::new(1.0, 0.5, 0.0))
        .build()
}

fn draw_instances(commands: &[Command]) -> Vec<u32> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::DrawIndexed { instances, .. } => Some(instances.start),
            _ => None,
        })
        .collect()
}

#[test]
fn resize_back_and_forth_restores_target_sizes() {
    let mut s = settings(RenderStrategy::Deferred);
    s.water = true;
    let (device, mut agent) = agent_on(RecordingDevice::new(), s);
    let sizes = |agent: &RenderAgent| {
        let mut sizes: Vec<_> = agent
            .pool()
            .targets()
            .into_iter()
            .map(|t| (t.purpose, t.size))
            .collect();
        sizes.sort_by_key(|(purpose, _)| purpose.name());
        sizes
    };
    let first = sizes(&agent);

    agent.resize(Extent2D::new(1280, 720)).unwrap();
    let albedo = agent.pool().target_for(TargetPurpose::GBufferAlbedo).unwrap();
    assert_eq!(albedo.size, Extent2D::new(1280, 720));

    agent.resize(VIEWPORT).unwrap();
    assert_eq!(sizes(&agent), first);

    let shadow = agent.pool().target_for(TargetPurpose::ShadowMap).unwrap();
    assert_eq!(shadow.size, Extent2D::new(2048, 2048));
    let reflection = agent.pool().target_for(TargetPurpose::ReflectionColor).unwrap();
    assert_eq!(reflection.size, Extent2D::new(400, 300));

    let scene = lit_scene(&device);
    agent.render_frame(&scene).unwrap();
}

#[test]
fn antialiasing_toggle_compiles_each_key_once() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Forward));
    let scene = SceneBuilder::new(device.as_ref())
        .unwrap()
        .sun(Vec3::new(0.0, 1.0, 1.0))
        .opaque("wall", Vec3::ZERO)
        .transparent("glass", Vec3::new(0.0, 0.0, 1.0))
        .build();

    agent.render_frame(&scene).unwrap();
    let without_aa = agent.pipelines().compiled_count();

    let aa = FeatureToggles {
        antialiasing: true,
        ..agent.settings().features
    };
    let plain = agent.settings().features;
    agent.set_features(aa).unwrap();
    agent.render_frame(&scene).unwrap();
    let with_aa = agent.pipelines().compiled_count();
    assert!(with_aa > without_aa);
    assert!(device.pipelines().iter().any(|p| p.sample_count == SampleCount::X4));
    assert!(device
        .pipelines()
        .iter()
        .any(|p| p.sample_count == SampleCount::X1 && p.has_fragment));

    let created = device.render_pipeline_count();
    for frame in 0..1000 {
        if frame % 100 == 0 {
            let features = if (frame / 100) % 2 == 0 { plain } else { aa };
            agent.set_features(features).unwrap();
        }
        agent.render_frame(&scene).unwrap();
    }
    assert_eq!(device.render_pipeline_count(), created);
    assert_eq!(agent.pipelines().compiled_count(), with_aa);
}

#[test]
fn antialiasing_resolves_into_the_drawable() {
    let mut s = settings(RenderStrategy::Forward);
    s.features.antialiasing = true;
    let (device, mut agent) = agent_on(RecordingDevice::new(), s);
    let scene = lit_scene(&device);
    agent.render_frame(&scene).unwrap();

    let msaa = agent.pool().target_for(TargetPurpose::SceneColorMsaa).unwrap();
    assert_eq!(msaa.sample_count, SampleCount::X4);
    let surface = device.surface_view().unwrap();
    let resolved = device.last_submission().iter().any(|c| {
        matches!(c, Command::BeginRenderPass { color, .. }
            if color.first() == Some(&(msaa.view, Some(surface))))
    });
    assert!(resolved);

    let mut off = agent.settings().features;
    off.antialiasing = false;
    agent.set_features(off).unwrap();
    assert!(agent.pool().target_for(TargetPurpose::SceneColorMsaa).is_none());
}

#[test]
fn one_sun_without_point_lights_is_one_fullscreen_draw() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Deferred));
    let stats = agent.render_frame(&lit_scene(&device)).unwrap();

    assert_eq!(stats.pass_names(), vec!["shadow", "gbuffer", "lighting"]);
    let lighting = stats.pass("lighting").unwrap();
    assert_eq!(lighting.counters.fullscreen_draws, 1);
    assert_eq!(lighting.counters.instanced_draws, 0);
    assert_eq!(stats.totals.fullscreen_draws, 1);
    assert_eq!(stats.totals.instanced_draws, 0);
}

#[test]
fn point_lights_share_one_instanced_draw() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Deferred));
    let scene = SceneBuilder::new(device.as_ref())
        .unwrap()
        .sun(Vec3::Y)
        .point_light(Vec3::new(1.0, 1.0, 0.0))
        .point_light(Vec3::new(-1.0, 1.0, 0.0))
        .point_light(Vec3::new(0.0, 1.0, 2.0))
        .opaque("floor", Vec3::ZERO)
        .build();
    let stats = agent.render_frame(&scene).unwrap();
    let lighting = stats.pass("lighting").unwrap();
    assert_eq!(lighting.counters.fullscreen_draws, 1);
    assert_eq!(lighting.counters.instanced_draws, 1);
}

#[test]
fn shadow_projection_contains_the_camera_frustum() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Forward));
    for toward_sun in [
        Vec3::new(1.0, 3.0, 2.0),
        Vec3::Y,
        Vec3::new(-4.0, 0.5, 0.0),
        Vec3::new(0.0, 1.0, -0.01),
    ] {
        let scene = SceneBuilder::new(device.as_ref())
            .unwrap()
            .sun(toward_sun)
            .opaque("box", Vec3::ZERO)
            .build();
        let params = prism_agents::render_agent::build_frame_params(
            agent.frame_index(),
            &scene,
            VIEWPORT,
            agent.settings().features,
        );
        for corner in frustum_corners(params.view_proj) {
            let p = params.shadow_view_proj.project_point3(corner);
            assert!(p.x.abs() <= 1.0 + 1e-3, "{toward_sun:?}: x {}", p.x);
            assert!(p.y.abs() <= 1.0 + 1e-3, "{toward_sun:?}: y {}", p.y);
            assert!((-1e-3..=1.0 + 1e-3).contains(&p.z), "{toward_sun:?}: z {}", p.z);
        }
        agent.render_frame(&scene).unwrap();
    }
}

#[test]
fn opaque_draws_precede_transparent_ones() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Forward));
    let scene = SceneBuilder::new(device.as_ref())
        .unwrap()
        .sun(Vec3::Y)
        .transparent("glass", Vec3::new(0.0, 0.0, 1.0))
        .opaque("wall", Vec3::ZERO)
        .transparent("window", Vec3::new(1.0, 0.0, 1.0))
        .opaque("floor", Vec3::new(0.0, -1.0, 0.0))
        .build();
    agent.render_frame(&scene).unwrap();

    // Shadow pass, then forward pass: opaque in list order, then transparent.
    assert_eq!(
        draw_instances(&device.last_submission()),
        vec![1, 3, 0, 2, 1, 3, 0, 2]
    );
}

#[test]
fn forward_reads_the_shadow_pass_output() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Forward));
    let stats = agent.render_frame(&lit_scene(&device)).unwrap();

    assert_eq!(stats.pass_names(), vec!["shadow", "forward"]);
    let produced = stats
        .pass("shadow")
        .unwrap()
        .outputs
        .get(ResourceSlot::ShadowMap)
        .unwrap();
    let forward = stats.pass("forward").unwrap();
    assert!(forward
        .inputs
        .contains(&(ResourceSlot::ShadowMap, Some(produced))));
    assert!(agent.pool().get(produced).is_ok());
}

#[test]
fn disabled_shadows_leave_the_input_unbound() {
    let mut s = settings(RenderStrategy::Deferred);
    s.features.shadows = false;
    let (device, mut agent) = agent_on(RecordingDevice::new(), s);
    let stats = agent.render_frame(&lit_scene(&device)).unwrap();

    assert_eq!(stats.pass_names(), vec!["gbuffer", "lighting"]);
    let lighting = stats.pass("lighting").unwrap();
    assert!(lighting.inputs.contains(&(ResourceSlot::ShadowMap, None)));
    assert_eq!(lighting.counters.fullscreen_draws, 1);
}

#[test]
fn tiled_deferred_falls_back_without_tile_memory() {
    let (device, mut agent) =
        agent_on(RecordingDevice::new(), settings(RenderStrategy::TiledDeferred));
    assert_eq!(agent.strategy(), RenderStrategy::Forward);
    assert_eq!(agent.settings().strategy, RenderStrategy::TiledDeferred);

    let stats = agent.render_frame(&lit_scene(&device)).unwrap();
    assert_eq!(stats.strategy, RenderStrategy::Forward);
    assert_eq!(stats.pass_names(), vec!["shadow", "forward"]);
    assert_eq!(device.memoryless_allocations(), 0);
}

#[test]
fn tiled_deferred_runs_on_tile_memory() {
    let (device, mut agent) = agent_on(
        RecordingDevice::with_tile_memory(),
        settings(RenderStrategy::TiledDeferred),
    );
    assert_eq!(agent.strategy(), RenderStrategy::TiledDeferred);
    let stats = agent.render_frame(&lit_scene(&device)).unwrap();
    assert_eq!(stats.pass_names(), vec!["shadow", "tiled_deferred"]);
    assert_eq!(device.memoryless_allocations(), 4);
    assert_eq!(stats.totals.fullscreen_draws, 1);
}

#[test]
fn indirect_falls_back_without_compute() {
    let device = RecordingDevice::with_capabilities(DeviceCapabilities {
        compute: false,
        ..Default::default()
    });
    let (_, mut agent) = agent_on(device, settings(RenderStrategy::Forward));
    assert_eq!(
        agent.configure(RenderStrategy::Indirect).unwrap(),
        RenderStrategy::Forward
    );
    assert_eq!(
        agent.configure(RenderStrategy::Deferred).unwrap(),
        RenderStrategy::Deferred
    );
}

#[test]
fn water_adds_two_traversals_and_two_half_resolution_targets() {
    let mut s = settings(RenderStrategy::Forward);
    s.water = true;
    let (device, mut agent) = agent_on(RecordingDevice::new(), s);
    let scene = SceneBuilder::new(device.as_ref())
        .unwrap()
        .sun(Vec3::new(0.0, 2.0, 1.0))
        .opaque("rock", Vec3::new(0.0, 1.0, 0.0))
        .opaque("seabed", Vec3::new(0.0, -2.0, 0.0))
        .water(0.0)
        .time(1.5)
        .build();
    let stats = agent.render_frame(&scene).unwrap();

    assert_eq!(stats.pass_names(), vec!["shadow", "water", "forward"]);
    assert_eq!(stats.totals.scene_traversals, 3);
    assert_eq!(stats.pass("water").unwrap().counters.scene_traversals, 2);

    let half: Vec<_> = agent
        .pool()
        .targets()
        .into_iter()
        .filter(|t| t.size == Extent2D::new(400, 300))
        .filter(|t| t.purpose != TargetPurpose::WaterDepth)
        .map(|t| t.purpose)
        .collect();
    assert_eq!(half.len(), 2);
    assert!(half.contains(&TargetPurpose::ReflectionColor));
    assert!(half.contains(&TargetPurpose::RefractionColor));

    let forward = stats.pass("forward").unwrap();
    assert!(forward
        .inputs
        .iter()
        .any(|(slot, handle)| *slot == ResourceSlot::ReflectionColor && handle.is_some()));
}

#[test]
fn water_can_be_disabled() {
    let mut s = settings(RenderStrategy::Forward);
    s.water = true;
    let (device, mut agent) = agent_on(RecordingDevice::new(), s);
    let scene = SceneBuilder::new(device.as_ref())
        .unwrap()
        .opaque("rock", Vec3::ZERO)
        .water(0.0)
        .build();

    agent.set_water_enabled(false).unwrap();
    let stats = agent.render_frame(&scene).unwrap();
    assert_eq!(stats.pass_names(), vec!["shadow", "forward"]);
    assert_eq!(stats.totals.scene_traversals, 1);
}

#[test]
fn scissor_restricts_the_forward_pass() {
    let mut s = settings(RenderStrategy::Forward);
    s.features.scissor_testing = true;
    let (device, mut agent) = agent_on(RecordingDevice::new(), s);
    agent.render_frame(&lit_scene(&device)).unwrap();

    let expected = ScissorRect {
        x: 200,
        y: 150,
        width: 400,
        height: 300,
    };
    assert!(device
        .last_submission()
        .contains(&Command::SetScissorRect(expected)));
}

#[test]
fn indirect_arguments_rebuild_only_on_content_change() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Indirect));
    assert_eq!(agent.strategy(), RenderStrategy::Indirect);
    let builder = || {
        SceneBuilder::new(device.as_ref())
            .unwrap()
            .sun(Vec3::Y)
            .opaque("a", Vec3::ZERO)
            .transparent("b", Vec3::X)
    };
    let rebuilds = |agent: &RenderAgent| {
        agent
            .lane("indirect")
            .and_then(|lane| lane.as_any().downcast_ref::<IndirectLane>())
            .map(IndirectLane::rebuild_count)
            .unwrap()
    };

    let scene = builder().build();
    let first = agent.render_frame(&scene).unwrap();
    assert_eq!(first.totals.dispatches, 1);
    assert_eq!(first.pass("indirect").unwrap().counters.indirect_draws, 2);
    let second = agent.render_frame(&scene).unwrap();
    assert_eq!(second.totals.dispatches, 0);
    assert_eq!(rebuilds(&agent), 1);

    let mut moved = scene.clone();
    moved.models[0].transform = prism_core::math::Mat4::from_translation(Vec3::Y);
    agent.render_frame(&moved).unwrap();
    assert_eq!(rebuilds(&agent), 1);

    let grown = builder().opaque("c", Vec3::Z).build();
    let stats = agent.render_frame(&grown).unwrap();
    assert_eq!(rebuilds(&agent), 2);
    assert_eq!(stats.totals.indirect_draws, 3);
}

#[test]
fn device_loss_fails_this_and_every_later_frame() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Forward));
    let scene = lit_scene(&device);
    agent.render_frame(&scene).unwrap();

    device.lose_device();
    assert!(matches!(agent.render_frame(&scene), Err(RenderError::DeviceLost)));
    assert!(agent.gpu().is_device_lost());
    assert!(matches!(agent.render_frame(&scene), Err(RenderError::DeviceLost)));
    assert_eq!(device.present_count(), 1);
    assert_eq!(agent.frame_index(), 1);
}

#[test]
fn device_loss_during_resize_is_latched() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Forward));
    let scene = lit_scene(&device);
    agent.render_frame(&scene).unwrap();

    device.lose_device();
    assert!(matches!(
        agent.resize(Extent2D::new(1024, 768)),
        Err(RenderError::DeviceLost)
    ));
    assert!(agent.gpu().is_device_lost());
    assert!(matches!(agent.render_frame(&scene), Err(RenderError::DeviceLost)));
}

#[test]
fn device_loss_inside_a_pass_resize_is_latched() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Forward));
    device.lose_device();
    let aa = FeatureToggles {
        antialiasing: true,
        ..agent.settings().features
    };
    assert!(matches!(agent.set_features(aa), Err(RenderError::DeviceLost)));
    assert!(agent.gpu().is_device_lost());
}

#[test]
fn frames_after_resize_compile_no_pipelines() {
    let devices = [
        (RenderStrategy::Forward, RecordingDevice::new()),
        (RenderStrategy::Deferred, RecordingDevice::new()),
        (RenderStrategy::TiledDeferred, RecordingDevice::with_tile_memory()),
        (RenderStrategy::Indirect, RecordingDevice::new()),
    ];
    for (strategy, device) in devices {
        let mut s = settings(strategy);
        s.water = true;
        let (device, mut agent) = agent_on(device, s);
        let compiled = device.render_pipeline_count();
        assert!(compiled > 0);

        let scene = SceneBuilder::new(device.as_ref())
            .unwrap()
            .sun(Vec3::new(0.0, 2.0, 1.0))
            .point_light(Vec3::new(1.0, 1.0, 0.0))
            .opaque("rock", Vec3::new(0.0, 1.0, 0.0))
            .transparent("glass", Vec3::new(1.0, 1.0, 0.0))
            .water(0.0)
            .build();
        agent.render_frame(&scene).unwrap();
        agent.render_frame(&scene).unwrap();
        assert_eq!(device.render_pipeline_count(), compiled, "{}", strategy.name());
    }
}

#[test]
fn shader_failure_is_fatal_at_startup() {
    init_logging();
    let device = Arc::new(RecordingDevice::new());
    device.fail_shaders_containing("water_surface");
    let result = RenderAgent::new(
        device,
        &test_shader_sources(),
        settings(RenderStrategy::Forward),
    );
    match result {
        Err(RenderError::ResourceError(ResourceError::Shader(ShaderError::CompilationError {
            label,
            ..
        }))) => assert_eq!(label, "water_surface"),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("agent created with a broken shader"),
    }
}

#[test]
fn invalid_settings_are_rejected() {
    init_logging();
    let mut s = settings(RenderStrategy::Forward);
    s.frames_in_flight = 0;
    let result = RenderAgent::new(Arc::new(RecordingDevice::new()), &test_shader_sources(), s);
    assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
}

#[test]
fn frames_in_flight_bound_outstanding_submissions() {
    let mut s = settings(RenderStrategy::Forward);
    s.frames_in_flight = 2;
    let (device, mut agent) = agent_on(RecordingDevice::new(), s);
    let scene = lit_scene(&device);
    for _ in 0..4 {
        agent.render_frame(&scene).unwrap();
        assert_eq!(agent.gpu().max_frames_in_flight(), 2);
        assert!(agent.gpu().frames_in_flight() <= agent.gpu().max_frames_in_flight());
    }
    assert_eq!(device.waits(), vec![SubmissionIndex(1), SubmissionIndex(2)]);
    assert_eq!(device.present_count(), 4);
    assert_eq!(device.submission_count(), 4);
}

#[test]
fn rendering_requires_a_viewport() {
    init_logging();
    let device = Arc::new(RecordingDevice::new());
    let mut agent = RenderAgent::new(
        device.clone(),
        &test_shader_sources(),
        settings(RenderStrategy::Forward),
    )
    .unwrap();
    let scene = lit_scene(&device);
    assert!(matches!(agent.render_frame(&scene), Err(RenderError::NotInitialized)));

    agent.resize(Extent2D::new(0, 600)).unwrap();
    assert_eq!(agent.viewport(), None);
    agent.resize(VIEWPORT).unwrap();
    let stats = agent.render_frame(&scene).unwrap();
    assert_eq!(stats.frame_index, 0);
    assert_eq!(agent.frame_index(), 1);
}

#[test]
fn shutdown_releases_every_target() {
    let (device, mut agent) = agent_on(RecordingDevice::new(), settings(RenderStrategy::Deferred));
    agent.render_frame(&lit_scene(&device)).unwrap();
    assert!(agent.pool().live_count() > 0);
    assert!(agent.estimate_frame_cost(&lit_scene(&device)) > 0.0);

    agent.shutdown().unwrap();
    assert_eq!(agent.pool().live_count(), 0);
    assert!(matches!(
        agent.render_frame(&SceneSnapshot::default()),
        Err(RenderError::NotInitialized)
    ));
}
