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

//! Acts as the **[A]gent** for the rendering subsystem.
//!
//! This module decides *which* passes run and in what order, but delegates the
//! GPU command generation to the render pass lanes of `prism-lanes`:
//! - Resolving the requested strategy against the device capabilities, once,
//!   when it is configured.
//! - Building the immutable frame parameters every frame.
//! - Running the shadow, water and main strategy passes in dependency order,
//!   handing generation-checked target handles from producers to consumers.

mod agent;
mod frame;

pub use agent::RenderAgent;
pub use frame::{build_frame_params, pass_sequence, resolve_strategy};
