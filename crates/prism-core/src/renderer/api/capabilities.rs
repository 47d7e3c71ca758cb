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

//! What a graphics device can do.

use super::common::{SampleCount, TextureFormat};

/// Capabilities queried from the device at creation time.
///
/// Strategies consult these before allocating targets. A strategy whose
/// requirements are not met is replaced by the forward strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Whether textures can live only in tile memory (`StorageMode::Memoryless`)
    /// and whether fragment shaders can read the current attachment values.
    pub tile_memory: bool,
    /// Whether the device can execute indirect draws built on the GPU.
    pub indirect_execution: bool,
    /// The highest supported MSAA sample count for color targets.
    pub max_sample_count: SampleCount,
    /// The largest 2D texture dimension.
    pub max_texture_dimension: u32,
    /// Whether compute shaders are available.
    pub compute: bool,
    /// Whether `Depth32FloatStencil8` can be used as an attachment.
    pub depth32_float_stencil8: bool,
}

impl DeviceCapabilities {
    /// Clamps a requested sample count to what the device supports.
    pub fn clamp_sample_count(&self, requested: SampleCount) -> SampleCount {
        requested.min(self.max_sample_count)
    }

    /// The combined depth/stencil format used by the G-buffer.
    ///
    /// Prefers `Depth32FloatStencil8` and falls back to `Depth24PlusStencil8`.
    pub fn depth_stencil_format(&self) -> TextureFormat {
        if self.depth32_float_stencil8 {
            TextureFormat::Depth32FloatStencil8
        } else {
            TextureFormat::Depth24PlusStencil8
        }
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            tile_memory: false,
            indirect_execution: true,
            max_sample_count: SampleCount::X4,
            max_texture_dimension: 8192,
            compute: true,
            depth32_float_stencil8: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_sample_count_uses_device_max() {
        let caps = DeviceCapabilities {
            max_sample_count: SampleCount::X2,
            ..Default::default()
        };
        assert_eq!(caps.clamp_sample_count(SampleCount::X8), SampleCount::X2);
        assert_eq!(caps.clamp_sample_count(SampleCount::X1), SampleCount::X1);
    }

    #[test]
    fn depth_stencil_format_falls_back() {
        let caps = DeviceCapabilities {
            depth32_float_stencil8: false,
            ..Default::default()
        };
        assert_eq!(caps.depth_stencil_format(), TextureFormat::Depth24PlusStencil8);
        assert_eq!(
            DeviceCapabilities::default().depth_stencil_format(),
            TextureFormat::Depth32FloatStencil8
        );
    }
}
