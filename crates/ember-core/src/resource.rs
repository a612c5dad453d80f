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

//! GPU resources, views and resource-state tracking.
//!
//! Resources are created by a [`crate::device::Device`] and owned by whoever
//! created them. Each holds a non-owning back-reference to its device used
//! for exactly one thing: enqueueing the native handle on the deferred-
//! release queue when the resource is dropped. Views hold a non-owning
//! back-reference to the resource they view.

use crate::api::ResourceFormat;
use crate::error::DeviceError;
use crate::traits::ApiObjectHandle;
use std::sync::{Arc, Mutex, Weak};

use crate::device::WeakDevice;

/// The usage state a resource (or subresource) is currently in.
///
/// Barrier recording compares the tracked state against the requested one
/// and only emits a transition when they differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceState {
    /// Initial state of freshly created resources.
    #[default]
    Undefined,
    /// Readable by any shader stage.
    ShaderResource,
    /// Writable through unordered access.
    UnorderedAccess,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound as a depth-stencil target.
    DepthStencil,
    /// Bound as a constant buffer.
    ConstantBuffer,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy.
    CopyDest,
    /// Handed to the presentation engine.
    Present,
    /// Catch-all readable state.
    GenericRead,
}

/// How a resource may be bound to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindFlags {
    bits: u32,
}

impl BindFlags {
    /// No binding capability.
    pub const NONE: Self = Self { bits: 0 };
    /// Readable as a shader resource.
    pub const SHADER_RESOURCE: Self = Self { bits: 1 << 0 };
    /// Writable through unordered access.
    pub const UNORDERED_ACCESS: Self = Self { bits: 1 << 1 };
    /// Usable as a color render target.
    pub const RENDER_TARGET: Self = Self { bits: 1 << 2 };
    /// Usable as a depth-stencil target.
    pub const DEPTH_STENCIL: Self = Self { bits: 1 << 3 };
    /// Usable as a vertex buffer.
    pub const VERTEX: Self = Self { bits: 1 << 4 };
    /// Usable as an index buffer.
    pub const INDEX: Self = Self { bits: 1 << 5 };
    /// Usable as a constant buffer.
    pub const CONSTANT: Self = Self { bits: 1 << 6 };

    /// Creates flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    /// The raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Combines two sets of flags.
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Whether every flag in `other` is set in `self`.
    pub const fn contains(&self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    /// Whether no flags are set.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl std::ops::BitOr for BindFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// CPU access granted to a buffer at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuAccess {
    /// Device-local; no CPU access.
    #[default]
    None,
    /// CPU-writable staging memory.
    Write,
    /// CPU-readable readback memory.
    Read,
}

/// Creation parameters of a texture.
///
/// Equality over *all* fields gates the full-resource copy fast path in
/// blit: two textures are copy-compatible exactly when their descriptors
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in pixels of mip 0.
    pub width: u32,
    /// Height in pixels of mip 0.
    pub height: u32,
    /// Number of array slices.
    pub array_size: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Samples per pixel.
    pub sample_count: u32,
    /// Pixel format.
    pub format: ResourceFormat,
    /// Binding capabilities.
    pub bind_flags: BindFlags,
}

impl TextureDesc {
    /// A single-sampled 2D texture descriptor with one mip and one slice.
    pub fn new_2d(width: u32, height: u32, format: ResourceFormat, bind_flags: BindFlags) -> Self {
        Self {
            width,
            height,
            array_size: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
            bind_flags,
        }
    }

    /// Number of subresources (`mip_levels * array_size`).
    pub fn subresource_count(&self) -> u32 {
        self.mip_levels * self.array_size
    }
}

/// Creation parameters of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes.
    pub size: u64,
    /// Binding capabilities.
    pub bind_flags: BindFlags,
    /// CPU access granted at creation.
    pub cpu_access: CpuAccess,
}

#[derive(Debug)]
struct StateTracker {
    global: bool,
    global_state: ResourceState,
    per_subresource: Vec<ResourceState>,
}

impl StateTracker {
    fn new(subresource_count: u32) -> Self {
        Self {
            global: true,
            global_state: ResourceState::Undefined,
            per_subresource: vec![ResourceState::Undefined; subresource_count as usize],
        }
    }
}

#[derive(Debug)]
pub(crate) struct TextureInner {
    device: WeakDevice,
    handle: ApiObjectHandle,
    desc: TextureDesc,
    state: Mutex<StateTracker>,
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            device.release_resource(self.handle.clone());
        }
    }
}

/// A texture resource.
///
/// Cheap to clone; the last clone to drop hands the native handle to the
/// owning device's deferred-release queue.
#[derive(Debug, Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl Texture {
    pub(crate) fn from_parts(device: WeakDevice, handle: ApiObjectHandle, desc: TextureDesc) -> Self {
        let tracker = StateTracker::new(desc.subresource_count());
        Self {
            inner: Arc::new(TextureInner {
                device,
                handle,
                desc,
                state: Mutex::new(tracker),
            }),
        }
    }

    /// The native resource handle.
    pub fn api_handle(&self) -> &ApiObjectHandle {
        &self.inner.handle
    }

    /// The creation descriptor.
    pub fn desc(&self) -> &TextureDesc {
        &self.inner.desc
    }

    /// The pixel format.
    pub fn format(&self) -> ResourceFormat {
        self.inner.desc.format
    }

    /// Width in pixels at `mip`.
    pub fn width(&self, mip: u32) -> u32 {
        (self.inner.desc.width >> mip).max(1)
    }

    /// Height in pixels at `mip`.
    pub fn height(&self, mip: u32) -> u32 {
        (self.inner.desc.height >> mip).max(1)
    }

    /// Number of mip levels.
    pub fn mip_count(&self) -> u32 {
        self.inner.desc.mip_levels
    }

    /// Number of array slices.
    pub fn array_size(&self) -> u32 {
        self.inner.desc.array_size
    }

    /// Samples per pixel.
    pub fn sample_count(&self) -> u32 {
        self.inner.desc.sample_count
    }

    /// Whether the two textures' creation descriptors compare equal in
    /// every field, the precondition for full-resource copies.
    pub fn compare_desc(&self, other: &Texture) -> bool {
        self.inner.desc == other.inner.desc
    }

    /// Whether the texture tracks one state for all subresources.
    pub fn is_state_global(&self) -> bool {
        self.inner.state.lock().unwrap().global
    }

    /// The tracked global state.
    ///
    /// Caller contract: the texture is in global tracking mode.
    pub fn global_state(&self) -> ResourceState {
        let tracker = self.inner.state.lock().unwrap();
        debug_assert!(tracker.global);
        tracker.global_state
    }

    /// The tracked state of one subresource (the global state while in
    /// global tracking mode).
    pub fn subresource_state(&self, array_slice: u32, mip_level: u32) -> ResourceState {
        let tracker = self.inner.state.lock().unwrap();
        if tracker.global {
            tracker.global_state
        } else {
            tracker.per_subresource[self.subresource_index(array_slice, mip_level)]
        }
    }

    /// Index of a subresource in the per-subresource state array.
    pub fn subresource_index(&self, array_slice: u32, mip_level: u32) -> usize {
        (array_slice * self.inner.desc.mip_levels + mip_level) as usize
    }

    pub(crate) fn set_global_state(&self, state: ResourceState) {
        let mut tracker = self.inner.state.lock().unwrap();
        tracker.global = true;
        tracker.global_state = state;
    }

    pub(crate) fn set_subresource_state(
        &self,
        array_slice: u32,
        mip_level: u32,
        state: ResourceState,
    ) {
        let index = self.subresource_index(array_slice, mip_level);
        let mut tracker = self.inner.state.lock().unwrap();
        if tracker.global {
            // Leaving global mode: seed every subresource with the global
            // state before diverging.
            let global_state = tracker.global_state;
            tracker.per_subresource.fill(global_state);
            tracker.global = false;
        }
        tracker.per_subresource[index] = state;
    }

    /// A shader-resource view covering the whole texture.
    pub fn srv(&self) -> ShaderResourceView {
        ShaderResourceView {
            resource: Arc::downgrade(&self.inner),
            info: ResourceViewInfo {
                most_detailed_mip: 0,
                mip_count: self.mip_count(),
                first_array_slice: 0,
                array_size: self.array_size(),
            },
        }
    }

    /// A shader-resource view of a subresource range.
    pub fn srv_range(
        &self,
        most_detailed_mip: u32,
        mip_count: u32,
        first_array_slice: u32,
        array_size: u32,
    ) -> ShaderResourceView {
        ShaderResourceView {
            resource: Arc::downgrade(&self.inner),
            info: ResourceViewInfo {
                most_detailed_mip,
                mip_count,
                first_array_slice,
                array_size,
            },
        }
    }

    /// A render-target view covering the whole texture.
    pub fn rtv(&self) -> RenderTargetView {
        RenderTargetView {
            resource: Arc::downgrade(&self.inner),
            info: ResourceViewInfo {
                most_detailed_mip: 0,
                mip_count: self.mip_count(),
                first_array_slice: 0,
                array_size: self.array_size(),
            },
        }
    }

    /// A render-target view of one mip of a slice range.
    pub fn rtv_range(&self, mip_level: u32, first_array_slice: u32, array_size: u32) -> RenderTargetView {
        RenderTargetView {
            resource: Arc::downgrade(&self.inner),
            info: ResourceViewInfo {
                most_detailed_mip: mip_level,
                mip_count: 1,
                first_array_slice,
                array_size,
            },
        }
    }
}

#[derive(Debug)]
pub(crate) struct BufferInner {
    device: WeakDevice,
    handle: ApiObjectHandle,
    desc: BufferDesc,
    state: Mutex<ResourceState>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            device.release_resource(self.handle.clone());
        }
    }
}

/// A buffer resource. Buffers always track one global state.
#[derive(Debug, Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    pub(crate) fn from_parts(device: WeakDevice, handle: ApiObjectHandle, desc: BufferDesc) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                device,
                handle,
                desc,
                state: Mutex::new(ResourceState::Undefined),
            }),
        }
    }

    /// The native resource handle.
    pub fn api_handle(&self) -> &ApiObjectHandle {
        &self.inner.handle
    }

    /// The creation descriptor.
    pub fn desc(&self) -> &BufferDesc {
        &self.inner.desc
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.desc.size
    }

    /// CPU access granted at creation.
    pub fn cpu_access(&self) -> CpuAccess {
        self.inner.desc.cpu_access
    }

    /// The tracked global state.
    pub fn global_state(&self) -> ResourceState {
        *self.inner.state.lock().unwrap()
    }

    pub(crate) fn set_global_state(&self, state: ResourceState) {
        *self.inner.state.lock().unwrap() = state;
    }

    /// Reads `len` bytes at `offset` out of a CPU-readable buffer.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, DeviceError> {
        if self.cpu_access() != CpuAccess::Read {
            return Err(DeviceError::Unsupported(
                "buffer was not created with CPU read access".to_string(),
            ));
        }
        let device = self.inner.device.upgrade().ok_or(DeviceError::InvalidHandle)?;
        let mut out = vec![0u8; len];
        device.backend().read_buffer(&self.inner.handle, offset, &mut out)?;
        Ok(out)
    }
}

/// The subresource range a view addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceViewInfo {
    /// First (most detailed) mip level addressed.
    pub most_detailed_mip: u32,
    /// Number of mip levels addressed.
    pub mip_count: u32,
    /// First array slice addressed.
    pub first_array_slice: u32,
    /// Number of array slices addressed.
    pub array_size: u32,
}

impl ResourceViewInfo {
    /// Whether the view covers every subresource of `texture`.
    pub fn is_full_view(&self, texture: &Texture) -> bool {
        self.most_detailed_mip == 0
            && self.first_array_slice == 0
            && self.mip_count == texture.mip_count()
            && self.array_size == texture.array_size()
    }
}

/// A read-only shader view of a texture.
///
/// Holds a non-owning back-reference; using a view whose texture has been
/// dropped reports [`DeviceError::InvalidHandle`].
#[derive(Debug, Clone)]
pub struct ShaderResourceView {
    resource: Weak<TextureInner>,
    info: ResourceViewInfo,
}

impl ShaderResourceView {
    /// The subresource range this view addresses.
    pub fn info(&self) -> &ResourceViewInfo {
        &self.info
    }

    /// The texture this view reads, if it is still alive.
    pub fn texture(&self) -> Result<Texture, DeviceError> {
        self.resource
            .upgrade()
            .map(|inner| Texture { inner })
            .ok_or(DeviceError::InvalidHandle)
    }
}

/// A writable render-target view of a texture.
#[derive(Debug, Clone)]
pub struct RenderTargetView {
    resource: Weak<TextureInner>,
    info: ResourceViewInfo,
}

impl RenderTargetView {
    /// The subresource range this view addresses.
    pub fn info(&self) -> &ResourceViewInfo {
        &self.info
    }

    /// The texture this view writes, if it is still alive.
    pub fn texture(&self) -> Result<Texture, DeviceError> {
        self.resource
            .upgrade()
            .map(|inner| Texture { inner })
            .ok_or(DeviceError::InvalidHandle)
    }
}
