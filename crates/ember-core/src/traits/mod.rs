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

//! Defines the core architectural traits decoupling the lifetime and
//! submission protocol from any specific graphics backend.
//!
//! - [`GpuInstance`]: adapter enumeration and logical backend creation.
//! - [`GpuBackend`]: the factory for every native object the core manages.
//! - [`NativeFence`] / [`CommandQueue`] / [`CommandList`]: the submission
//!   surface.
//! - [`PageMemory`] / [`DescriptorArena`] / [`SwapChain`]: native storage the
//!   core does bookkeeping over.
//!
//! Concrete implementations live outside this crate (`ember-infra` ships a
//! deterministic software backend); the protocol code in this crate only ever
//! sees these traits.

mod backend;
mod command;

pub use self::backend::{
    AdapterInfo, ApiObject, ApiObjectHandle, BackendCapabilities, DescriptorArena, GpuBackend,
    GpuInstance, PageMemory, SwapChain, SwapChainDesc,
};
pub use self::command::{
    BlitPassParams, BlitToBufferPassParams, CommandList, CommandQueue, NativeFence,
};
