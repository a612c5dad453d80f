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

//! Shared value types consumed across the core.
//!
//! - **[`format`]**: the closed pixel-format enumeration and its queries.
//! - **[`config`]**: `Desc`-style configuration consumed at construction.
//! - **[`common`]**: small shared value types (rectangles, clear values).

pub mod common;
pub mod config;
pub mod format;

pub use self::common::{
    ClearValue, FilterMode, Rect, ReductionMode, IDENTITY_CHANNEL_TRANSFORM, STANDARD_REDUCTION,
};
pub use self::config::{DeviceDesc, QueueKind, QUEUE_KIND_COUNT};
pub use self::format::ResourceFormat;
