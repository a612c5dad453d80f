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

//! Device configuration consumed at construction time.

use crate::api::format::ResourceFormat;

/// The kind of command queue a command list is recorded for.
///
/// The numeric order matters: `cmd_queues` in [`DeviceDesc`] is indexed by
/// it, and the direct queue deliberately sits last so partial initializers
/// read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum QueueKind {
    /// Transfer-only queue.
    Copy = 0,
    /// Compute-capable queue.
    Compute = 1,
    /// Fully capable graphics queue.
    Direct = 2,
}

/// Number of [`QueueKind`] variants.
pub const QUEUE_KIND_COUNT: usize = 3;

impl QueueKind {
    /// All queue kinds, in index order.
    pub const ALL: [QueueKind; QUEUE_KIND_COUNT] =
        [QueueKind::Copy, QueueKind::Compute, QueueKind::Direct];

    /// The array index backing this kind.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Device configuration supplied by the host application.
#[derive(Debug, Clone)]
pub struct DeviceDesc {
    /// The color buffer format.
    pub color_format: ResourceFormat,
    /// The depth buffer format, or [`ResourceFormat::Unknown`] for none.
    pub depth_format: ResourceFormat,
    /// Requested API version as `(major, minor)`. When set, device creation
    /// fails if the adapter cannot satisfy it; when `None`, the highest
    /// supported version is selected automatically.
    pub api_version: Option<(u32, u32)>,
    /// Controls vertical sync.
    pub enable_vsync: bool,
    /// Enable the backend debug layer. Defaults to on for debug builds.
    pub enable_debug_layer: bool,
    /// Command queues to create, indexed by [`QueueKind`]. At least one
    /// direct queue is required for the default render context to exist.
    pub cmd_queues: [u32; QUEUE_KIND_COUNT],
    /// Width of the offscreen framebuffer in headless mode.
    pub width: u32,
    /// Height of the offscreen framebuffer in headless mode.
    pub height: u32,
    /// Render into a window surface rather than an offscreen target.
    pub windowed: bool,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self {
            color_format: ResourceFormat::BGRA8UnormSrgb,
            depth_format: ResourceFormat::D32Float,
            api_version: None,
            enable_vsync: false,
            enable_debug_layer: cfg!(debug_assertions),
            cmd_queues: [0, 0, 1],
            width: 1280,
            height: 720,
            windowed: false,
        }
    }
}

impl DeviceDesc {
    /// Number of queues requested for `kind`.
    pub fn queue_count(&self, kind: QueueKind) -> u32 {
        self.cmd_queues[kind.index()]
    }
}
