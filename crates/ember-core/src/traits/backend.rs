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

use crate::api::{DeviceDesc, QueueKind, ResourceFormat};
use crate::descriptor::{DescriptorPoolDesc, ShaderVisibility};
use crate::error::{DeviceError, FenceError};
use crate::memory::MemoryHeapKind;
use crate::query::QueryType;
use crate::resource::{BufferDesc, TextureDesc};
use crate::traits::command::{CommandList, CommandQueue, NativeFence};
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// An opaque native object owned by a backend.
///
/// The deferred-release queue stores these handles; dropping the last strong
/// reference destroys the underlying native object, so "reclaim" and "drop"
/// are the same operation.
pub trait ApiObject: Any + Send + Sync + Debug {
    /// The object as [`Any`], for backend-side downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to an opaque native object.
pub type ApiObjectHandle = Arc<dyn ApiObject>;

/// One enumerated physical adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Small integer id the adapter is addressed by.
    pub id: u32,
    /// Human-readable adapter name.
    pub name: String,
}

/// Static capabilities of a backend, queried once at device creation.
#[derive(Debug, Clone)]
pub struct BackendCapabilities {
    /// Whether swap-chain images keep their resource state across a resize.
    ///
    /// When set, the device captures per-buffer state before tearing down
    /// the framebuffers and restores it after the rebuild; when clear, the
    /// rebuilt images start over in the undefined state.
    pub preserves_resource_state_across_resize: bool,
    /// Whether the backend exposes constant-buffer-view descriptor objects.
    pub supports_constant_buffer_views: bool,
    /// Upper bound for each dispatch grid dimension.
    pub max_dispatch_dim: u32,
    /// Highest supported API version as `(major, minor)`.
    pub api_version: (u32, u32),
    /// Timestamp frequency in ticks per second.
    pub timestamp_frequency: f64,
}

/// Adapter enumeration and logical backend creation.
///
/// One instance exists per process; the [`crate::device::DeviceManager`]
/// queries it once at construction and addresses adapters by id thereafter.
pub trait GpuInstance: Send + Sync + Debug {
    /// All adapters visible to this instance.
    fn enumerate_adapters(&self) -> Vec<AdapterInfo>;

    /// Creates a logical backend on the given adapter.
    ///
    /// Creation failure is an expected possibility (unsupported hardware)
    /// that callers handle gracefully; it is reported, never panicked.
    fn create_backend(
        &self,
        adapter_id: u32,
        desc: &DeviceDesc,
    ) -> Result<Arc<dyn GpuBackend>, DeviceError>;
}

/// The factory for every native object the protocol core manages.
///
/// Everything returned here is opaque to the core: fences and queues are
/// driven through their own traits, and storage objects are carried as
/// [`ApiObjectHandle`]s until their deferred release.
pub trait GpuBackend: Send + Sync + Debug {
    /// Static capabilities of this backend.
    fn capabilities(&self) -> &BackendCapabilities;

    /// Name of the physical adapter backing this device.
    fn adapter_name(&self) -> &str;

    /// Creates a native fence. Failure is fatal for the caller.
    fn create_fence(&self) -> Result<Arc<dyn NativeFence>, FenceError>;

    /// Creates (or retrieves) the command queue of the given kind and index.
    fn create_queue(
        &self,
        kind: QueueKind,
        index: u32,
    ) -> Result<Arc<dyn CommandQueue>, DeviceError>;

    /// Creates an empty, open command list recordable for `kind` queues.
    fn create_command_list(&self, kind: QueueKind) -> Result<Box<dyn CommandList>, DeviceError>;

    /// Allocates one CPU-visible memory page of `size` bytes.
    fn create_heap_page(
        &self,
        kind: MemoryHeapKind,
        size: usize,
    ) -> Result<Arc<dyn PageMemory>, DeviceError>;

    /// Creates the native descriptor storage behind a descriptor pool.
    fn create_descriptor_arena(
        &self,
        visibility: ShaderVisibility,
        desc: &DescriptorPoolDesc,
    ) -> Result<Arc<dyn DescriptorArena>, DeviceError>;

    /// Creates a texture resource.
    fn create_texture(&self, desc: &TextureDesc) -> Result<ApiObjectHandle, DeviceError>;

    /// Creates a buffer resource.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<ApiObjectHandle, DeviceError>;

    /// Reads back the contents of a CPU-readable buffer.
    fn read_buffer(
        &self,
        buffer: &ApiObjectHandle,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), DeviceError>;

    /// Creates a swap chain for a window surface.
    fn create_swap_chain(&self, desc: &SwapChainDesc) -> Result<Box<dyn SwapChain>, DeviceError>;

    /// Creates a native query heap of `count` queries.
    fn create_query_heap(
        &self,
        ty: QueryType,
        count: u32,
    ) -> Result<ApiObjectHandle, DeviceError>;
}

/// CPU-visible native memory backing one heap page.
///
/// Stands in for the persistently mapped pointer of the native API; access
/// goes through offset-based reads and writes so page recycling can never
/// observe a stale mapping.
pub trait PageMemory: ApiObject {
    /// Size of the page in bytes.
    fn len(&self) -> usize;

    /// Whether the page is zero-sized.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `data` into the page at `offset`.
    fn write(&self, offset: usize, data: &[u8]);

    /// Copies `out.len()` bytes out of the page at `offset`.
    fn read(&self, offset: usize, out: &mut [u8]);
}

/// Native descriptor storage behind one descriptor pool.
///
/// The pool performs all slot bookkeeping; the arena exists so the backend
/// can bind its heap objects and resolve `(arena, type, index)` to a native
/// descriptor.
pub trait DescriptorArena: Send + Sync + Debug {
    /// The visibility tier this arena was created for.
    fn visibility(&self) -> ShaderVisibility;

    /// The arena as [`Any`], for backend-side downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Swap-chain creation parameters.
#[derive(Debug, Clone)]
pub struct SwapChainDesc {
    /// Width of the images in pixels.
    pub width: u32,
    /// Height of the images in pixels.
    pub height: u32,
    /// Color format of the images.
    pub format: ResourceFormat,
    /// Number of back-buffers.
    pub image_count: u32,
    /// Whether presentation waits for vertical sync.
    pub vsync: bool,
}

/// A native swap chain: the rotating set of presentable images.
pub trait SwapChain: Send + Sync + Debug {
    /// Number of images in the chain.
    fn image_count(&self) -> u32;

    /// The native image at `index`.
    fn image(&self, index: u32) -> ApiObjectHandle;

    /// Hands the current image to the presentation engine.
    fn present(&self) -> Result<(), DeviceError>;

    /// Acquires the next image, returning its index.
    fn acquire_next_image(&self) -> Result<u32, DeviceError>;

    /// Resizes the underlying images. Existing image handles are invalid
    /// afterwards.
    fn resize(&self, width: u32, height: u32) -> Result<(), DeviceError>;

    /// Toggles vertical sync for subsequent presents.
    fn set_vsync(&self, enabled: bool);
}
