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

//! Error types of the pass lanes and the render target pool.

use crate::resources::TargetPurpose;
use prism_core::renderer::{RenderError, ResourceError, ResourceSlot, ShaderError, TargetHandle};
use thiserror::Error;

/// An error raised by the [`crate::resources::RenderTargetPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// A memoryless target was requested on a device without tile memory.
    #[error("Target '{purpose}' needs memoryless storage, which this device does not support")]
    MemorylessUnsupported {
        /// The purpose of the refused target.
        purpose: TargetPurpose,
    },
    /// The device failed to create the texture or its view.
    #[error("Failed to allocate target '{purpose}'")]
    Allocation {
        /// The purpose of the target.
        purpose: TargetPurpose,
        /// The device error.
        #[source]
        source: ResourceError,
    },
    /// The handle refers to a target that was recreated or released.
    #[error("Stale or unknown render target handle {0}")]
    StaleHandle(TargetHandle),
    /// The target would have a zero-sized dimension.
    #[error("Target '{purpose}' would have an empty size")]
    EmptySize {
        /// The purpose of the target.
        purpose: TargetPurpose,
    },
    /// The pool was resized to an empty viewport.
    #[error("Cannot resize the render target pool to an empty viewport")]
    EmptyViewport,
}

/// An error raised while resizing or encoding a render pass lane.
#[derive(Debug, Error)]
pub enum PassError {
    /// The pass was asked to encode before its first resize.
    #[error("Pass '{pass}' was encoded before its first resize")]
    NotResized {
        /// The pass name.
        pass: &'static str,
    },
    /// The pass was used after [`crate::render_lane::RenderPassLane::dispose`].
    #[error("Pass '{pass}' was used after being disposed")]
    Disposed {
        /// The pass name.
        pass: &'static str,
    },
    /// A required input was not produced by an earlier pass this frame.
    #[error("Pass '{pass}' is missing required input '{slot}'")]
    MissingInput {
        /// The pass name.
        pass: &'static str,
        /// The missing slot.
        slot: ResourceSlot,
    },
    /// The pass cannot run on this device.
    #[error("Pass '{pass}' cannot run on this device: {reason}")]
    Unsupported {
        /// The pass name.
        pass: &'static str,
        /// Why the device is not suitable.
        reason: String,
    },
    /// A render target could not be allocated or resolved.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// A GPU resource could not be created.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// A shader variant is missing from the library.
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

impl From<PoolError> for RenderError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Allocation { source, .. } => source.into(),
            other => RenderError::RenderingFailed(other.to_string()),
        }
    }
}

impl From<PassError> for RenderError {
    fn from(err: PassError) -> Self {
        match err {
            PassError::Pool(err) => err.into(),
            PassError::Resource(err) => err.into(),
            PassError::Shader(err) => err.into(),
            PassError::NotResized { .. } => RenderError::NotInitialized,
            other => RenderError::RenderingFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_names_the_slot() {
        let err = PassError::MissingInput {
            pass: "lighting",
            slot: ResourceSlot::GBufferNormal,
        };
        assert_eq!(
            err.to_string(),
            "Pass 'lighting' is missing required input 'gbuffer_normal'"
        );
    }

    #[test]
    fn allocation_failures_keep_the_device_error() {
        let err = PassError::from(PoolError::Allocation {
            purpose: TargetPurpose::ShadowMap,
            source: ResourceError::OutOfMemory,
        });
        assert!(matches!(RenderError::from(err), RenderError::RenderingFailed(_)));

        let err = PassError::NotResized { pass: "forward" };
        assert!(matches!(RenderError::from(err), RenderError::NotInitialized));
    }

    #[test]
    fn wrapped_device_loss_surfaces_as_device_loss() {
        let err = PassError::from(PoolError::Allocation {
            purpose: TargetPurpose::SceneDepth,
            source: ResourceError::DeviceLost,
        });
        assert!(matches!(RenderError::from(err), RenderError::DeviceLost));
        let err = PassError::Resource(ResourceError::DeviceLost);
        assert!(matches!(RenderError::from(err), RenderError::DeviceLost));
    }
}
