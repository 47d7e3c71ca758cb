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

//! # Lane Abstraction
//!
//! A **Lane** is one swappable processing strategy inside an agent. The render
//! agent owns one lane per pass kind and selects among them when it is
//! configured. Every lane shares this identity and classification interface;
//! the rendering behavior lives in the `RenderPassLane` extension trait of
//! `prism-lanes`.

use crate::scene::SceneSnapshot;
use std::any::Any;
use std::fmt;

/// Classification of lanes, used for routing and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKind {
    /// Light-space depth generation.
    Shadow,
    /// Extra scene views (reflection, refraction).
    View,
    /// Main scene rendering (forward, deferred, etc.).
    Render,
    /// GPU-side command generation.
    Compute,
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneKind::Shadow => write!(f, "Shadow"),
            LaneKind::View => write!(f, "View"),
            LaneKind::Render => write!(f, "Render"),
            LaneKind::Compute => write!(f, "Compute"),
        }
    }
}

/// The base trait of every lane.
pub trait Lane: Send + Sync {
    /// A stable, human-readable name for the strategy.
    fn strategy_name(&self) -> &'static str;

    /// The lane's classification.
    fn lane_kind(&self) -> LaneKind;

    /// A relative cost estimate for rendering `scene` with this lane.
    ///
    /// Only the ordering between lanes of the same kind is meaningful.
    fn estimate_cost(&self, scene: &SceneSnapshot) -> f32 {
        let _ = scene;
        1.0
    }

    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl Lane for Dummy {
        fn strategy_name(&self) -> &'static str {
            "Dummy"
        }
        fn lane_kind(&self) -> LaneKind {
            LaneKind::Render
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn default_cost_and_downcast() {
        let mut lane = Dummy;
        assert_eq!(lane.estimate_cost(&SceneSnapshot::default()), 1.0);
        assert!(lane.as_any_mut().downcast_mut::<Dummy>().is_some());
        assert_eq!(LaneKind::Shadow.to_string(), "Shadow");
    }
}
