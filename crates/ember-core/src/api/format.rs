// Copyright 2025 Ember Contributors
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

//! The closed pixel-format enumeration consumed by the core.
//!
//! The core never interprets formats beyond the queries defined here;
//! format-to-native translation is the backend's concern.

/// A pixel or depth format for textures and typed buffer views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceFormat {
    /// No format / not yet determined.
    #[default]
    Unknown,
    /// 8-bit single channel, unsigned normalized.
    R8Unorm,
    /// 32-bit single channel, unsigned integer.
    R32Uint,
    /// 32-bit single channel, float.
    R32Float,
    /// 8-bit RGBA, unsigned normalized.
    RGBA8Unorm,
    /// 8-bit BGRA, unsigned normalized.
    BGRA8Unorm,
    /// 8-bit BGRA, unsigned normalized, sRGB encoded.
    BGRA8UnormSrgb,
    /// 16-bit RGBA, unsigned integer.
    RGBA16Uint,
    /// 16-bit per channel RGBA, float.
    RGBA16Float,
    /// 32-bit per channel RGBA, unsigned integer.
    RGBA32Uint,
    /// 32-bit per channel RGBA, float.
    RGBA32Float,
    /// 32-bit depth, float.
    D32Float,
}

impl ResourceFormat {
    /// Bytes per pixel, or 0 for [`ResourceFormat::Unknown`].
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ResourceFormat::Unknown => 0,
            ResourceFormat::R8Unorm => 1,
            ResourceFormat::R32Uint | ResourceFormat::R32Float | ResourceFormat::D32Float => 4,
            ResourceFormat::RGBA8Unorm
            | ResourceFormat::BGRA8Unorm
            | ResourceFormat::BGRA8UnormSrgb => 4,
            ResourceFormat::RGBA16Uint | ResourceFormat::RGBA16Float => 8,
            ResourceFormat::RGBA32Uint | ResourceFormat::RGBA32Float => 16,
        }
    }

    /// Whether the format stores unsigned integer values (as opposed to
    /// normalized or floating point data).
    ///
    /// Integer sources restrict which blit variants are available.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ResourceFormat::R32Uint | ResourceFormat::RGBA16Uint | ResourceFormat::RGBA32Uint
        )
    }

    /// Whether this is a depth format.
    pub fn is_depth(&self) -> bool {
        matches!(self, ResourceFormat::D32Float)
    }

    /// Whether the format applies sRGB encoding on store.
    pub fn is_srgb(&self) -> bool {
        matches!(self, ResourceFormat::BGRA8UnormSrgb)
    }
}
