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

//! The layered command-recording façade.
//!
//! [`LowLevelContextData`] owns the one open command list per queue;
//! [`CopyContext`] adds copies, uploads and barrier tracking;
//! [`ComputeContext`] adds dispatch and the bounded-retry bind contract;
//! [`RenderContext`] adds clears, draws and the blit family. The layers nest
//! by composition and deref, so a `RenderContext` exposes the whole surface.

mod blit;
mod compute;
mod copy;
mod low_level;
mod render;

pub use self::compute::{ComputeBindings, ComputeContext};
pub use self::copy::{BarrierResource, CopyContext};
pub use self::low_level::LowLevelContextData;
pub use self::render::RenderContext;
