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

//! Exercises the wgpu device headless. Machines without any adapter skip
//! every test.

use prism_core::math::Extent2D;
use prism_core::renderer::api::*;
use prism_core::renderer::{GraphicsDevice, RenderError, ResourceError};
use prism_infra::graphics::bootstrap_headless;
use prism_infra::WgpuDevice;
use std::borrow::Cow;

fn headless_device() -> Option<WgpuDevice> {
    prism_infra::init_logging();
    match bootstrap_headless(Extent2D::new(64, 32)) {
        Ok(device) => Some(device),
        Err(e) => {
            log::warn!("No graphics adapter available, skipping: {e}");
            None
        }
    }
}

fn buffer_descriptor(size: u64) -> BufferDescriptor<'static> {
    BufferDescriptor {
        label: Some(Cow::Borrowed("test buffer")),
        size,
        usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
    }
}

#[test]
fn writes_past_the_end_are_rejected() {
    let Some(device) = headless_device() else {
        return;
    };
    let buffer = device.create_buffer(&buffer_descriptor(16)).unwrap();
    device.write_buffer(buffer, 0, &[0u8; 16]).unwrap();
    assert!(matches!(
        device.write_buffer(buffer, 8, &[0u8; 16]),
        Err(ResourceError::OutOfBounds)
    ));
    device.destroy_buffer(buffer).unwrap();
    assert!(matches!(
        device.destroy_buffer(buffer),
        Err(ResourceError::NotFound)
    ));
}

#[test]
fn memoryless_textures_are_unsupported() {
    let Some(device) = headless_device() else {
        return;
    };
    assert!(!device.capabilities().tile_memory);
    let result = device.create_texture(&TextureDescriptor {
        label: Some(Cow::Borrowed("tile")),
        size: Extent2D::new(16, 16),
        sample_count: SampleCount::X1,
        format: TextureFormat::Rgba16Float,
        usage: TextureUsage::RENDER_ATTACHMENT,
        storage: StorageMode::Memoryless,
    });
    assert!(matches!(result, Err(ResourceError::Unsupported(_))));
}

#[test]
fn offscreen_frames_follow_the_drawable_size() {
    let Some(device) = headless_device() else {
        return;
    };
    let frame = device.acquire_frame().unwrap();
    assert_eq!(frame.size, Extent2D::new(64, 32));
    assert_eq!(frame.format, device.surface_format());

    let mut encoder = device.create_command_encoder(Some("clear"));
    {
        let attachments = [RenderPassColorAttachment {
            view: frame.view,
            resolve_target: None,
            ops: Operations::clear(prism_core::math::LinearRgba::new(0.0, 0.0, 0.0, 1.0)),
        }];
        let _pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("clear"),
            color_attachments: &attachments,
            depth_stencil_attachment: None,
        });
    }
    let index = device.submit(encoder.finish()).unwrap();
    device.wait_for_submission(index).unwrap();
    device.present().unwrap();

    device.resize_surface(Extent2D::new(32, 16)).unwrap();
    let resized = device.acquire_frame().unwrap();
    assert_eq!(resized.size, Extent2D::new(32, 16));
    device.present().unwrap();
}

#[test]
fn submissions_are_numbered_in_order() {
    let Some(device) = headless_device() else {
        return;
    };
    let first = device
        .submit(device.create_command_encoder(None).finish())
        .unwrap();
    let second = device
        .submit(device.create_command_encoder(None).finish())
        .unwrap();
    assert!(second > first);
    device.wait_for_submission(second).unwrap();
    device.wait_for_submission(first).unwrap();

    // A command buffer can only be submitted once.
    let buffer = device.create_command_encoder(None).finish();
    device.submit(buffer).unwrap();
    assert!(matches!(
        device.submit(buffer),
        Err(RenderError::ResourceError(ResourceError::NotFound))
    ));
}

#[test]
fn waits_target_one_submission() {
    let Some(device) = headless_device() else {
        return;
    };
    let indices: Vec<_> = (0..3)
        .map(|_| device.submit(device.create_command_encoder(None).finish()).unwrap())
        .collect();
    device.wait_for_submission(indices[0]).unwrap();
    device.wait_for_submission(indices[2]).unwrap();
    // Already complete.
    device.wait_for_submission(indices[1]).unwrap();
    assert!(matches!(
        device.wait_for_submission(SubmissionIndex(indices[2].0 + 10)),
        Err(RenderError::Internal(_))
    ));
}
