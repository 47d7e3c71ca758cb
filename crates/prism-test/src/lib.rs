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

//! # Prism Test
//!
//! Test tooling shared by the prism crates: a recording graphics device that
//! needs no GPU, scene builders and placeholder shader sources.

pub mod device;
pub mod scene;

pub use device::{Command, PipelineRecord, RecordingDevice, Submission, TextureRecord};
pub use scene::{unit_cube, SceneBuilder, CUBE_INDEX_COUNT};

use prism_core::renderer::{ShaderSources, ShaderVariant};

/// Placeholder sources for every shader variant.
///
/// The recording device accepts any text, so each source is just a comment
/// naming its variant.
pub fn test_shader_sources() -> ShaderSources {
    ShaderVariant::ALL
        .iter()
        .fold(ShaderSources::new(), |sources, variant| {
            sources.with(*variant, format!("// {}\n", variant.name()))
        })
}

/// Initializes `env_logger` for tests. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
