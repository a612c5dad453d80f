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

//! # Ember Core
//!
//! Backend-agnostic GPU resource-lifetime and command-submission core.
//!
//! The crate is organized around one central discipline: a resource that the
//! GPU may still be reading is never reused or destroyed until a fence value
//! tagged at release time has been observed as completed. Everything else
//! (the paged transient memory heap, the descriptor slot pools, the command
//! list recycling, the device's deferred-release queue) is an application of
//! that rule to a different kind of resource.
//!
//! Concrete graphics backends implement the traits in [`traits`]; the rest of
//! the crate never touches a native API directly.

#![warn(missing_docs)]

pub mod api;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod fence;
pub mod fenced_pool;
pub mod memory;
pub mod query;
pub mod resource;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{DeviceDesc, QueueKind, ResourceFormat};
pub use context::{ComputeContext, CopyContext, LowLevelContextData, RenderContext};
pub use descriptor::{DescriptorPool, DescriptorPoolDesc, DescriptorSlot, DescriptorType};
pub use device::{Device, DeviceManager, Fbo, SWAP_CHAIN_BUFFER_COUNT};
pub use error::{AllocError, BlitError, DeviceError, FenceError};
pub use fence::GpuFence;
pub use memory::{GpuMemoryHeap, HeapAllocation, MemoryHeapKind};
pub use resource::{Buffer, ResourceState, Texture};
