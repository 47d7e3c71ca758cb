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

//! Pixel extents.

use serde::{Deserialize, Serialize};

/// A two-dimensional extent in device pixels.
///
/// Used for the viewport, render target sizes and the shadow map resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent2D {
    /// The width component of the extent.
    pub width: u32,
    /// The height component of the extent.
    pub height: u32,
}

impl Extent2D {
    /// Creates a new extent.
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Creates a square extent.
    #[inline]
    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    /// Returns `true` if either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns half of this extent, rounding down but never below one pixel.
    #[inline]
    pub fn half(&self) -> Self {
        Self::new((self.width / 2).max(1), (self.height / 2).max(1))
    }

    /// Width divided by height. Returns `1.0` for an empty extent.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_never_reaches_zero() {
        assert_eq!(Extent2D::new(1280, 720).half(), Extent2D::new(640, 360));
        assert_eq!(Extent2D::new(1, 3).half(), Extent2D::new(1, 1));
    }

    #[test]
    fn empty_extent() {
        assert!(Extent2D::new(0, 10).is_empty());
        assert!(!Extent2D::square(4).is_empty());
        assert_eq!(Extent2D::default().aspect_ratio(), 1.0);
    }
}
