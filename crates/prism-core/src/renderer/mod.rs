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

//! Provides the public, backend-agnostic rendering contracts.
//!
//! This module defines the "common language" for all rendering operations: the
//! abstract traits (like [`GraphicsDevice`]), descriptors (like [`BufferDescriptor`]),
//! error types and the frame-level vocabulary passes exchange. The 'how' is
//! handled by a concrete backend in `prism-infra`, while `prism-lanes` and
//! `prism-agents` build the frame on top of these contracts.

pub mod api;
pub mod context;
pub mod error;
pub mod frame;
pub mod handoff;
pub mod settings;
pub mod shader_library;
pub mod stats;
pub mod traits;

pub use self::api::*;
pub use self::context::GpuContext;
pub use self::error::{ConfigError, PipelineError, RenderError, ResourceError, ShaderError};
pub use self::frame::{FrameFlags, FrameParams, FrameUniforms};
pub use self::handoff::{InputSpec, ResourceSet, ResourceSlot, TargetHandle};
pub use self::settings::{FeatureToggles, RenderSettings, RenderStrategy};
pub use self::shader_library::{CompiledShader, ShaderLibrary, ShaderSources, ShaderVariant};
pub use self::stats::{DrawCounters, FrameStats, PassRecord};
pub use self::traits::{
    CommandEncoder, ComputePass, FrameTarget, GraphicsDevice, RenderPass,
};
