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

//! Render configuration: strategy, feature toggles and frame-level defaults.

use crate::math::LinearRgba;
use crate::renderer::api::SampleCount;
use crate::renderer::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The main rendering strategy of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderStrategy {
    /// One pass shading every light per fragment.
    #[default]
    Forward,
    /// G-buffer fill followed by light accumulation.
    Deferred,
    /// G-buffer and lighting fused in tile memory. Needs tile memory support.
    TiledDeferred,
    /// Draws issued from a GPU-written argument buffer.
    Indirect,
}

impl RenderStrategy {
    /// A stable name used in logs and statistics.
    pub fn name(&self) -> &'static str {
        match self {
            RenderStrategy::Forward => "forward",
            RenderStrategy::Deferred => "deferred",
            RenderStrategy::TiledDeferred => "tiled_deferred",
            RenderStrategy::Indirect => "indirect",
        }
    }
}

impl std::fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-frame feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    /// Render and sample the shadow map.
    pub shadows: bool,
    /// Multisample the forward pass.
    pub antialiasing: bool,
    /// Draw transparent submeshes with alpha blending.
    pub alpha_blending: bool,
    /// Discard fragments below an alpha threshold.
    pub alpha_testing: bool,
    /// Apply distance fog.
    pub fog: bool,
    /// Restrict the forward pass to the centered half-size rectangle.
    pub scissor_testing: bool,
    /// Rasterize triangle edges only.
    pub wireframe: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            shadows: true,
            antialiasing: false,
            alpha_blending: true,
            alpha_testing: false,
            fog: false,
            scissor_testing: false,
            wireframe: false,
        }
    }
}

/// Everything the frame orchestrator needs to know before the first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// The requested main strategy. May fall back to forward at configure time.
    pub strategy: RenderStrategy,
    /// Feature switches.
    pub features: FeatureToggles,
    /// Render reflection and refraction for the scene's water plane.
    pub water: bool,
    /// Edge length of the square shadow map.
    pub shadow_map_size: u32,
    /// MSAA sample count used when antialiasing is on.
    pub msaa_samples: u32,
    /// Maximum number of submitted frames the GPU may still be working on.
    pub frames_in_flight: usize,
    /// Clear color of the presented image.
    pub clear_color: LinearRgba,
    /// Clear color of the G-buffer albedo target.
    pub gbuffer_clear_color: LinearRgba,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            strategy: RenderStrategy::Forward,
            features: FeatureToggles::default(),
            water: false,
            shadow_map_size: 2048,
            msaa_samples: 4,
            frames_in_flight: 3,
            clear_color: LinearRgba::new(0.93, 0.97, 1.0, 1.0),
            gbuffer_clear_color: LinearRgba::new(0.73, 0.92, 1.0, 1.0),
        }
    }
}

impl RenderSettings {
    /// Parses settings from RON text. Missing fields keep their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and parses a RON settings file.
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::info!("Loading render settings from {}", path.as_ref().display());
        Self::from_ron_str(&text)
    }

    /// Serializes the settings to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if SampleCount::from_count(self.msaa_samples).is_none() {
            return Err(ConfigError::Invalid(format!(
                "msaa_samples must be 1, 2, 4 or 8, got {}",
                self.msaa_samples
            )));
        }
        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.shadow_map_size == 0 {
            return Err(ConfigError::Invalid(
                "shadow_map_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The sample count the forward pass renders with under the current toggles.
    pub fn effective_sample_count(&self) -> SampleCount {
        if self.features.antialiasing {
            SampleCount::from_count(self.msaa_samples).unwrap_or(SampleCount::X1)
        } else {
            SampleCount::X1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let settings = RenderSettings::default();
        assert_eq!(settings.shadow_map_size, 2048);
        assert_eq!(settings.msaa_samples, 4);
        assert_eq!(settings.frames_in_flight, 3);
        assert!(settings.features.shadows);
        assert!(settings.features.alpha_blending);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_ron_keeps_defaults() {
        let settings =
            RenderSettings::from_ron_str("(strategy: Deferred, water: true)").unwrap();
        assert_eq!(settings.strategy, RenderStrategy::Deferred);
        assert!(settings.water);
        assert_eq!(settings.shadow_map_size, 2048);
    }

    #[test]
    fn ron_text_round_trips() {
        let mut settings = RenderSettings::default();
        settings.features.antialiasing = true;
        let text = settings.to_ron_string().unwrap();
        assert_eq!(RenderSettings::from_ron_str(&text).unwrap(), settings);
    }

    #[test]
    fn invalid_sample_count_is_rejected() {
        let err = RenderSettings::from_ron_str("(msaa_samples: 3)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn sample_count_follows_antialiasing_toggle() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.effective_sample_count(), SampleCount::X1);
        settings.features.antialiasing = true;
        assert_eq!(settings.effective_sample_count(), SampleCount::X4);
    }
}
