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

//! GPU resources shared by every pass lane.

mod draw_list;
mod pipeline_cache;
mod scene_buffers;
mod target_pool;

pub use draw_list::{DrawItem, DrawList};
pub use pipeline_cache::{
    BlendMode, PipelineCache, PipelineFlags, PipelineKey, StandardLayouts, MAX_COLOR_TARGETS,
};
pub use scene_buffers::{GpuDraw, SceneBuffers, ViewSlot};
pub use target_pool::{RenderTarget, RenderTargetPool, TargetDesc, TargetPurpose, TargetSize};
