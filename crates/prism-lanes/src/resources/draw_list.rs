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

//! The flat list of submesh draws built from a scene snapshot.

use prism_core::renderer::api::BufferId;
use prism_core::scene::{SceneSnapshot, Submesh};
use std::ops::Range;

/// One submesh draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawItem {
    /// Index into the per-draw table, also used as the instance id.
    pub draw_id: u32,
    /// Index of the owning model in the snapshot.
    pub model: u32,
    /// The model's vertex buffer.
    pub vertex_buffer: BufferId,
    /// The submesh to draw.
    pub submesh: Submesh,
    /// The model is skinned.
    pub has_skeleton: bool,
}

impl DrawItem {
    /// The index range handed to `draw_indexed`.
    pub fn index_range(&self) -> Range<u32> {
        self.submesh.first_index..self.submesh.first_index + self.submesh.index_count
    }

    /// The single instance whose id selects this draw's table entry.
    pub fn instance_range(&self) -> Range<u32> {
        self.draw_id..self.draw_id + 1
    }
}

/// Every draw of a frame in scene order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawList {
    items: Vec<DrawItem>,
}

impl DrawList {
    /// Flattens the models of `scene` into draws. Ids follow scene order.
    pub fn from_scene(scene: &SceneSnapshot) -> Self {
        let items = scene
            .models
            .iter()
            .enumerate()
            .flat_map(|(model_index, model)| {
                model.submeshes.iter().map(move |submesh| (model_index, model, submesh))
            })
            .enumerate()
            .map(|(draw_id, (model_index, model, submesh))| DrawItem {
                draw_id: draw_id as u32,
                model: model_index as u32,
                vertex_buffer: model.vertex_buffer,
                submesh: *submesh,
                has_skeleton: model.has_skeleton,
            })
            .collect();
        Self { items }
    }

    /// All draws in scene order.
    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    /// Opaque draws in scene order.
    pub fn opaque(&self) -> impl Iterator<Item = &DrawItem> + '_ {
        self.items.iter().filter(|i| !i.submesh.is_transparent)
    }

    /// Transparent draws in scene order.
    pub fn transparent(&self) -> impl Iterator<Item = &DrawItem> + '_ {
        self.items.iter().filter(|i| i.submesh.is_transparent)
    }

    /// Every opaque draw followed by every transparent draw.
    ///
    /// Transparent draws keep their scene order; no depth sort is applied.
    pub fn ordered(&self) -> impl Iterator<Item = &DrawItem> + '_ {
        self.opaque().chain(self.transparent())
    }

    /// Number of draws.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the scene has nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if any draw needs the skinned permutation.
    pub fn has_skeleton(&self) -> bool {
        self.items.iter().any(|i| i.has_skeleton)
    }
}
