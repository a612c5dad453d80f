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

//! Copy-capable command recording: barriers, copies, uploads, readbacks.

use crate::api::QueueKind;
use crate::context::low_level::LowLevelContextData;
use crate::device::{Device, DeviceShared, WeakDevice};
use crate::error::DeviceError;
use crate::resource::{Buffer, BufferDesc, BindFlags, CpuAccess, ResourceState, Texture};
use crate::traits::{CommandQueue, GpuBackend};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Alignment of staged buffer uploads inside the upload heap.
const UPLOAD_BUFFER_ALIGNMENT: u64 = 4;

/// Either kind of resource, for the barrier and copy entry points.
#[derive(Debug, Clone, Copy)]
pub enum BarrierResource<'a> {
    /// A texture resource.
    Texture(&'a Texture),
    /// A buffer resource.
    Buffer(&'a Buffer),
}

impl<'a> From<&'a Texture> for BarrierResource<'a> {
    fn from(texture: &'a Texture) -> Self {
        BarrierResource::Texture(texture)
    }
}

impl<'a> From<&'a Buffer> for BarrierResource<'a> {
    fn from(buffer: &'a Buffer) -> Self {
        BarrierResource::Buffer(buffer)
    }
}

/// The base command-recording layer: resource-state transitions, copies and
/// transfers staged through the upload heap.
#[derive(Debug)]
pub struct CopyContext {
    device: WeakDevice,
    low_level: Arc<LowLevelContextData>,
    commands_pending: AtomicBool,
}

impl CopyContext {
    pub(crate) fn new(
        device: WeakDevice,
        backend: &Arc<dyn GpuBackend>,
        queue_kind: QueueKind,
        queue: Arc<dyn CommandQueue>,
    ) -> Result<Self, DeviceError> {
        let low_level = Arc::new(LowLevelContextData::new(backend, queue_kind, queue)?);
        Ok(Self {
            device,
            low_level,
            commands_pending: AtomicBool::new(false),
        })
    }

    /// The low-level command buffer/queue state behind this context.
    pub fn low_level_data(&self) -> &Arc<LowLevelContextData> {
        &self.low_level
    }

    /// Whether commands were recorded since the last flush.
    pub fn has_pending_commands(&self) -> bool {
        self.commands_pending.load(Ordering::SeqCst)
    }

    pub(crate) fn set_commands_pending(&self) {
        self.commands_pending.store(true, Ordering::SeqCst);
    }

    pub(crate) fn device_shared(&self) -> Result<Arc<DeviceShared>, DeviceError> {
        self.device.upgrade().ok_or(DeviceError::InvalidHandle)
    }

    /// The device this context records for, or
    /// [`DeviceError::InvalidHandle`] once it has been destroyed.
    pub fn device(&self) -> Result<Device, DeviceError> {
        Ok(Device::from_shared(self.device_shared()?))
    }

    /// Submits pending commands; with `wait` set, additionally blocks until
    /// the GPU has executed them.
    pub fn flush(&self, wait: bool) -> Result<(), DeviceError> {
        if self.commands_pending.swap(false, Ordering::SeqCst) {
            self.low_level.flush()?;
        } else {
            log::debug!("flush() - no commands pending");
        }
        if wait {
            self.low_level.fence().sync_cpu(None)?;
        }
        Ok(())
    }

    /// Transitions `resource` to `new_state`, eliding the barrier when the
    /// tracked state already matches. Returns whether a transition was
    /// recorded.
    pub fn resource_barrier<'a>(
        &self,
        resource: impl Into<BarrierResource<'a>>,
        new_state: ResourceState,
    ) -> bool {
        match resource.into() {
            BarrierResource::Texture(texture) => self.texture_barrier(texture, new_state),
            BarrierResource::Buffer(buffer) => self.buffer_barrier(buffer, new_state),
        }
    }

    /// Whole-texture transition; folds per-subresource tracking back into a
    /// single global state.
    pub fn texture_barrier(&self, texture: &Texture, new_state: ResourceState) -> bool {
        let mut recorded = false;
        if texture.is_state_global() {
            let old_state = texture.global_state();
            if old_state != new_state {
                self.low_level.record_resource(|cmd| {
                    cmd.texture_barrier(texture.api_handle(), old_state, new_state)
                });
                recorded = true;
            }
        } else {
            for slice in 0..texture.array_size() {
                for mip in 0..texture.mip_count() {
                    let old_state = texture.subresource_state(slice, mip);
                    if old_state != new_state {
                        self.low_level.record_resource(|cmd| {
                            cmd.texture_subresource_barrier(
                                texture.api_handle(),
                                slice,
                                mip,
                                old_state,
                                new_state,
                            )
                        });
                        recorded = true;
                    }
                }
            }
        }
        texture.set_global_state(new_state);
        if recorded {
            self.set_commands_pending();
        }
        recorded
    }

    /// Single-subresource transition; switches the texture to
    /// per-subresource tracking.
    pub fn subresource_barrier(
        &self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
        new_state: ResourceState,
    ) -> bool {
        let old_state = texture.subresource_state(array_slice, mip_level);
        let mut recorded = false;
        if old_state != new_state {
            self.low_level.record_resource(|cmd| {
                cmd.texture_subresource_barrier(
                    texture.api_handle(),
                    array_slice,
                    mip_level,
                    old_state,
                    new_state,
                )
            });
            self.set_commands_pending();
            recorded = true;
        }
        texture.set_subresource_state(array_slice, mip_level, new_state);
        recorded
    }

    /// Whole-buffer transition. Buffers with CPU access never need
    /// barriers and return `false` unconditionally.
    pub fn buffer_barrier(&self, buffer: &Buffer, new_state: ResourceState) -> bool {
        if buffer.cpu_access() != CpuAccess::None {
            return false;
        }
        let old_state = buffer.global_state();
        if old_state == new_state {
            return false;
        }
        self.low_level
            .record_resource(|cmd| cmd.buffer_barrier(buffer.api_handle(), old_state, new_state));
        buffer.set_global_state(new_state);
        self.set_commands_pending();
        true
    }

    /// Unordered-access hazard barrier. Never elided: back-to-back UAV
    /// writes to the same resource must serialize even in the same state.
    pub fn uav_barrier<'a>(&self, resource: impl Into<BarrierResource<'a>>) {
        let handle = match resource.into() {
            BarrierResource::Texture(texture) => texture.api_handle().clone(),
            BarrierResource::Buffer(buffer) => buffer.api_handle().clone(),
        };
        self.low_level.record_resource(|cmd| cmd.uav_barrier(&handle));
        self.set_commands_pending();
    }

    /// Full-resource copy. Caller contract: the descriptors of `dst` and
    /// `src` compare equal.
    pub fn copy_resource<'a, 'b>(
        &self,
        dst: impl Into<BarrierResource<'a>>,
        src: impl Into<BarrierResource<'b>>,
    ) {
        let dst = dst.into();
        let src = src.into();
        if let (BarrierResource::Texture(d), BarrierResource::Texture(s)) = (&dst, &src) {
            debug_assert!(d.compare_desc(s), "copy_resource requires matching descriptors");
        }
        let dst_handle = match &dst {
            BarrierResource::Texture(t) => {
                self.texture_barrier(t, ResourceState::CopyDest);
                t.api_handle().clone()
            }
            BarrierResource::Buffer(b) => {
                self.buffer_barrier(b, ResourceState::CopyDest);
                b.api_handle().clone()
            }
        };
        let src_handle = match &src {
            BarrierResource::Texture(t) => {
                self.texture_barrier(t, ResourceState::CopySource);
                t.api_handle().clone()
            }
            BarrierResource::Buffer(b) => {
                self.buffer_barrier(b, ResourceState::CopySource);
                b.api_handle().clone()
            }
        };
        self.low_level
            .record_resource(|cmd| cmd.copy_resource(&dst_handle, &src_handle));
        self.set_commands_pending();
    }

    /// Copies a byte range between buffers.
    pub fn copy_buffer_region(
        &self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        num_bytes: u64,
    ) {
        self.buffer_barrier(dst, ResourceState::CopyDest);
        self.buffer_barrier(src, ResourceState::CopySource);
        self.low_level.record_resource(|cmd| {
            cmd.copy_buffer_region(dst.api_handle(), dst_offset, src.api_handle(), src_offset, num_bytes)
        });
        self.set_commands_pending();
    }

    /// Updates a buffer range with CPU data, staged through the upload
    /// heap. Out-of-range requests are logged and skipped.
    pub fn update_buffer(
        &self,
        buffer: &Buffer,
        data: &[u8],
        offset: u64,
    ) -> Result<(), DeviceError> {
        if data.is_empty() {
            log::warn!("update_buffer() - no data to update");
            return Ok(());
        }
        if offset
            .checked_add(data.len() as u64)
            .map_or(true, |end| end > buffer.size())
        {
            log::warn!("update_buffer() - size and offset are invalid; nothing to update");
            return Ok(());
        }

        let device = self.device_shared()?;
        let heap = device.upload_heap();
        let staging = heap.allocate(data.len() as u64, UPLOAD_BUFFER_ALIGNMENT)?;
        staging.write(data);

        self.buffer_barrier(buffer, ResourceState::CopyDest);
        let src_handle = staging.resource_handle();
        let src_offset = staging.offset();
        self.low_level.record_resource(|cmd| {
            cmd.copy_buffer_region(
                buffer.api_handle(),
                offset,
                &src_handle,
                src_offset,
                data.len() as u64,
            )
        });
        self.set_commands_pending();
        heap.release(staging);
        Ok(())
    }

    /// Updates one texture subresource with tightly packed rows of CPU
    /// data, staged through the upload heap.
    ///
    /// Caller contract: `data` holds exactly
    /// `width(mip) * height(mip) * bytes_per_pixel` bytes.
    pub fn update_texture_subresource(
        &self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let expected = texture.width(mip_level) as u64
            * texture.height(mip_level) as u64
            * texture.format().bytes_per_pixel() as u64;
        debug_assert_eq!(data.len() as u64, expected, "subresource data size mismatch");

        let device = self.device_shared()?;
        let heap = device.upload_heap();
        let staging = heap.allocate(data.len() as u64, UPLOAD_BUFFER_ALIGNMENT)?;
        staging.write(data);

        self.texture_barrier(texture, ResourceState::CopyDest);
        let src_handle = staging.resource_handle();
        let src_offset = staging.offset();
        self.low_level.record_resource(|cmd| {
            cmd.copy_buffer_to_texture(texture.api_handle(), mip_level, array_slice, &src_handle, src_offset)
        });
        self.set_commands_pending();
        heap.release(staging);
        Ok(())
    }

    /// Reads a buffer range back to the CPU. Blocking: flushes and waits
    /// before returning the bytes.
    pub fn read_buffer(
        &self,
        buffer: &Buffer,
        offset: u64,
        num_bytes: u64,
    ) -> Result<Vec<u8>, DeviceError> {
        let device = self.device_shared()?;
        let staging_desc = BufferDesc {
            size: num_bytes,
            bind_flags: BindFlags::NONE,
            cpu_access: CpuAccess::Read,
        };
        let staging = device.backend().create_buffer(&staging_desc)?;

        self.buffer_barrier(buffer, ResourceState::CopySource);
        self.low_level.record_resource(|cmd| {
            cmd.copy_buffer_region(&staging, 0, buffer.api_handle(), offset, num_bytes)
        });
        self.set_commands_pending();
        self.flush(true)?;

        let mut out = vec![0u8; num_bytes as usize];
        device.backend().read_buffer(&staging, 0, &mut out)?;
        device.release_resource(staging);
        Ok(out)
    }

    /// Reads one texture subresource back to the CPU as tightly packed
    /// rows. Blocking: flushes and waits before returning the bytes.
    pub fn read_texture_subresource(
        &self,
        texture: &Texture,
        array_slice: u32,
        mip_level: u32,
    ) -> Result<Vec<u8>, DeviceError> {
        let bpp = texture.format().bytes_per_pixel() as u64;
        if bpp == 0 {
            return Err(DeviceError::Unsupported(
                "cannot read back a texture with unknown format".to_string(),
            ));
        }
        let width = texture.width(mip_level) as u64;
        let height = texture.height(mip_level) as u64;
        let num_bytes = width * height * bpp;

        let device = self.device_shared()?;
        let staging_desc = BufferDesc {
            size: num_bytes,
            bind_flags: BindFlags::NONE,
            cpu_access: CpuAccess::Read,
        };
        let staging = device.backend().create_buffer(&staging_desc)?;

        self.texture_barrier(texture, ResourceState::CopySource);
        self.low_level.record_resource(|cmd| {
            cmd.copy_texture_to_buffer(
                &staging,
                0,
                width * bpp,
                texture.api_handle(),
                mip_level,
                array_slice,
            )
        });
        self.set_commands_pending();
        self.flush(true)?;

        let mut out = vec![0u8; num_bytes as usize];
        device.backend().read_buffer(&staging, 0, &mut out)?;
        device.release_resource(staging);
        Ok(out)
    }
}
