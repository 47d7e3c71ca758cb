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

//! Descriptors and types for render and compute passes.

use super::texture::TextureViewId;
use crate::math::LinearRgba;

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment will be loaded into the pass.
    Load,
    /// The attachment will be cleared to the specified value before the pass begins.
    Clear(V),
}

/// Describes the operation to perform on an attachment at the end of a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// The results of the render pass will be stored to the attachment's memory.
    Store,
    /// The results are discarded. Required for memoryless attachments.
    Discard,
}

/// Defines the load and store operations for a single render pass attachment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operations<V> {
    /// The operation to perform at the beginning of the pass.
    pub load: LoadOp<V>,
    /// The operation to perform at the end of the pass.
    pub store: StoreOp,
}

impl<V> Operations<V> {
    /// Clears on load and stores on end.
    pub fn clear(value: V) -> Self {
        Self {
            load: LoadOp::Clear(value),
            store: StoreOp::Store,
        }
    }

    /// Clears on load and discards on end.
    pub fn clear_discard(value: V) -> Self {
        Self {
            load: LoadOp::Clear(value),
            store: StoreOp::Discard,
        }
    }

    /// Keeps the previous contents and stores on end.
    pub fn load() -> Self {
        Self {
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }
}

/// A description of a single color attachment for a render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassColorAttachment {
    /// The view that will be rendered to.
    pub view: TextureViewId,
    /// If multisampling is used, the view that receives the resolved output.
    /// Must be `None` if `view` is not multisampled.
    pub resolve_target: Option<TextureViewId>,
    /// The load and store operations for this color attachment.
    pub ops: Operations<LinearRgba>,
}

/// A description of a depth/stencil attachment for a render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassDepthStencilAttachment {
    /// The view for the depth/stencil texture.
    pub view: TextureViewId,
    /// The load and store operations for the depth aspect.
    pub depth_ops: Option<Operations<f32>>,
    /// The load and store operations for the stencil aspect.
    pub stencil_ops: Option<Operations<u32>>,
}

/// A descriptor for a render pass.
#[derive(Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// The color attachments to be used in the pass.
    pub color_attachments: &'a [RenderPassColorAttachment],
    /// An optional depth/stencil attachment for this pass.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment>,
}

/// A descriptor for a compute pass.
#[derive(Debug, Default)]
pub struct ComputePassDescriptor<'a> {
    /// An optional debug label for the compute pass.
    pub label: Option<&'a str>,
}

/// A rectangle in framebuffer pixels limiting rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl ScissorRect {
    /// The centered rectangle covering the middle half of a viewport in each axis.
    pub fn centered_half(width: u32, height: u32) -> Self {
        Self {
            x: width / 4,
            y: height / 4,
            width: (width / 2).max(1),
            height: (height / 2).max(1),
        }
    }
}

/// An opaque handle to a finished, submittable command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// A monotonically increasing index identifying a queue submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionIndex(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_scissor_covers_middle_half() {
        let rect = ScissorRect::centered_half(800, 600);
        assert_eq!(rect, ScissorRect { x: 200, y: 150, width: 400, height: 300 });
    }

    #[test]
    fn centered_scissor_never_empty() {
        let rect = ScissorRect::centered_half(1, 1);
        assert_eq!(rect.width, 1);
        assert_eq!(rect.height, 1);
    }
}
