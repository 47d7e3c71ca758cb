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

//! # Prism Lanes
//!
//! The hot path of the renderer: the render target pool, the pipeline state
//! cache, the per-frame scene buffers and the seven render pass lanes the
//! render agent composes into a frame.

pub mod error;
pub mod render_lane;
pub mod resources;

pub use error::{PassError, PoolError};
