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

//! Per-frame statistics returned by the orchestrator.

use crate::renderer::handoff::{ResourceSet, ResourceSlot, TargetHandle};
use crate::renderer::settings::RenderStrategy;

/// Counters a pass increments while encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawCounters {
    /// Every draw command issued.
    pub draw_calls: u32,
    /// Full-screen triangle draws (one per directional light in deferred lighting).
    pub fullscreen_draws: u32,
    /// Instanced light volume draws.
    pub instanced_draws: u32,
    /// Draws whose arguments come from a GPU buffer.
    pub indirect_draws: u32,
    /// Complete walks over the scene's models into a color view.
    pub scene_traversals: u32,
    /// Walks over the scene's models into a depth-only view (the shadow map).
    pub depth_traversals: u32,
    /// Compute dispatches.
    pub dispatches: u32,
}

impl DrawCounters {
    /// Adds another set of counters into this one.
    pub fn accumulate(&mut self, other: &DrawCounters) {
        self.draw_calls += other.draw_calls;
        self.fullscreen_draws += other.fullscreen_draws;
        self.instanced_draws += other.instanced_draws;
        self.indirect_draws += other.indirect_draws;
        self.scene_traversals += other.scene_traversals;
        self.depth_traversals += other.depth_traversals;
        self.dispatches += other.dispatches;
    }
}

/// What one pass consumed and produced in a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    /// The pass name.
    pub name: &'static str,
    /// Declared inputs with the handle that was bound, `None` for a missing optional input.
    pub inputs: Vec<(ResourceSlot, Option<TargetHandle>)>,
    /// Produced outputs.
    pub outputs: ResourceSet,
    /// Counters of this pass alone.
    pub counters: DrawCounters,
}

/// Summary of one rendered frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// The frame counter.
    pub frame_index: u64,
    /// The strategy that actually rendered the frame.
    pub strategy: RenderStrategy,
    /// Passes in execution order.
    pub passes: Vec<PassRecord>,
    /// Counters summed over every pass.
    pub totals: DrawCounters,
}

impl FrameStats {
    /// Appends a pass record and adds its counters to the totals.
    pub fn record(&mut self, record: PassRecord) {
        self.totals.accumulate(&record.counters);
        self.passes.push(record);
    }

    /// Finds the first record of a pass by name.
    pub fn pass(&self, name: &str) -> Option<&PassRecord> {
        self.passes.iter().find(|p| p.name == name)
    }

    /// Names of the passes in execution order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_totals() {
        let mut stats = FrameStats::default();
        for _ in 0..2 {
            stats.record(PassRecord {
                name: "shadow",
                inputs: Vec::new(),
                outputs: ResourceSet::new(),
                counters: DrawCounters {
                    draw_calls: 3,
                    scene_traversals: 1,
                    ..Default::default()
                },
            });
        }
        assert_eq!(stats.totals.draw_calls, 6);
        assert_eq!(stats.totals.scene_traversals, 2);
        assert_eq!(stats.pass_names(), vec!["shadow", "shadow"]);
    }
}
