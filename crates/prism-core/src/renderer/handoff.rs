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

//! Vocabulary for handing targets from one pass to the next.

use std::fmt;

/// A generation-checked reference to a render target owned by the target pool.
///
/// A handle stays valid until the pool recreates or releases the target; after
/// that the generation no longer matches and lookups fail. Handles are cheap to
/// copy and never keep the target alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetHandle {
    /// Slot index inside the pool.
    pub index: u32,
    /// Generation of the slot when the handle was issued.
    pub generation: u32,
}

impl fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// The logical role of a resource exchanged between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceSlot {
    /// Light-space depth written by the shadow pass.
    ShadowMap,
    /// G-buffer albedo.
    GBufferAlbedo,
    /// G-buffer normals.
    GBufferNormal,
    /// G-buffer world positions.
    GBufferPosition,
    /// G-buffer depth and stencil.
    GBufferDepth,
    /// Half resolution reflection color.
    ReflectionColor,
    /// Half resolution refraction color.
    RefractionColor,
    /// Half resolution depth shared by the water views.
    WaterDepth,
}

impl ResourceSlot {
    /// A stable name used in logs and statistics.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceSlot::ShadowMap => "shadow_map",
            ResourceSlot::GBufferAlbedo => "gbuffer_albedo",
            ResourceSlot::GBufferNormal => "gbuffer_normal",
            ResourceSlot::GBufferPosition => "gbuffer_position",
            ResourceSlot::GBufferDepth => "gbuffer_depth",
            ResourceSlot::ReflectionColor => "reflection_color",
            ResourceSlot::RefractionColor => "refraction_color",
            ResourceSlot::WaterDepth => "water_depth",
        }
    }
}

impl fmt::Display for ResourceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One declared input of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
    /// The slot the pass reads.
    pub slot: ResourceSlot,
    /// Whether encoding must fail without it. Optional inputs degrade gracefully.
    pub required: bool,
}

impl InputSpec {
    /// A required input.
    pub const fn required(slot: ResourceSlot) -> Self {
        Self {
            slot,
            required: true,
        }
    }

    /// An optional input.
    pub const fn optional(slot: ResourceSlot) -> Self {
        Self {
            slot,
            required: false,
        }
    }
}

/// The set of handles flowing between passes in one frame.
///
/// Rebuilt every frame from the producers' outputs, so a stale handle from an
/// earlier frame cannot leak into a later one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSet {
    entries: Vec<(ResourceSlot, TargetHandle)>,
}

impl ResourceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the handle for `slot`.
    pub fn insert(&mut self, slot: ResourceSlot, handle: TargetHandle) {
        match self.entries.iter_mut().find(|(s, _)| *s == slot) {
            Some(entry) => entry.1 = handle,
            None => self.entries.push((slot, handle)),
        }
    }

    /// Builder form of [`ResourceSet::insert`].
    pub fn with(mut self, slot: ResourceSlot, handle: TargetHandle) -> Self {
        self.insert(slot, handle);
        self
    }

    /// Returns the handle for `slot`.
    pub fn get(&self, slot: ResourceSlot) -> Option<TargetHandle> {
        self.entries
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, h)| *h)
    }

    /// Returns `true` if `slot` is present.
    pub fn contains(&self, slot: ResourceSlot) -> bool {
        self.get(slot).is_some()
    }

    /// Adds every entry of `other`, replacing duplicates.
    pub fn merge(&mut self, other: &ResourceSet) {
        for (slot, handle) in &other.entries {
            self.insert(*slot, *handle);
        }
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceSlot, TargetHandle)> + '_ {
        self.entries.iter().copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
