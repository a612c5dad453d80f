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

use crate::api::{ClearValue, FilterMode, QueueKind, Rect, ReductionMode, ResourceFormat};
use crate::error::{DeviceError, FenceError};
use crate::resource::ResourceState;
use crate::traits::backend::ApiObjectHandle;
use std::any::Any;
use std::fmt::Debug;

/// A native fence object.
///
/// The protocol-level counter lives in [`crate::fence::GpuFence`]; this trait
/// only exposes what the native object can answer: the highest completed
/// value, and a blocking wait with an infinite timeout.
pub trait NativeFence: Send + Sync + Debug {
    /// The highest value the GPU has completed, polled without blocking.
    fn completed_value(&self) -> u64;

    /// Blocks the calling thread until the fence completes `value`.
    fn wait_cpu(&self, value: u64) -> Result<(), FenceError>;

    /// The fence as [`Any`], for backend-side downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// A native command queue.
pub trait CommandQueue: Send + Sync + Debug {
    /// The kind of work this queue accepts.
    fn kind(&self) -> QueueKind;

    /// Executes a closed command list, then signals `fence` with
    /// `signal_value` once the list's commands complete.
    ///
    /// The list's recorded commands are consumed; the object itself stays
    /// reusable after a [`CommandList::reset`] once the signal has been
    /// observed.
    fn submit(
        &self,
        list: &mut dyn CommandList,
        fence: &dyn NativeFence,
        signal_value: u64,
    ) -> Result<(), DeviceError>;

    /// Signals `fence` with `value` after all prior work on this queue.
    fn signal(&self, fence: &dyn NativeFence, value: u64);

    /// Makes this queue wait, device-side, until `fence` completes `value`.
    /// Non-blocking for the CPU.
    fn wait_for_fence(&self, fence: &dyn NativeFence, value: u64);
}

/// Parameters for a shader-based blit recorded into a command list.
#[derive(Debug, Clone)]
pub struct BlitPassParams {
    /// Source texture.
    pub src: ApiObjectHandle,
    /// Source mip level sampled.
    pub src_mip: u32,
    /// Source array slice sampled.
    pub src_slice: u32,
    /// Source sample count.
    pub sample_count: u32,
    /// Normalized UV offset of the sampled source region.
    pub src_offset: [f32; 2],
    /// Normalized UV scale of the sampled source region.
    pub src_scale: [f32; 2],
    /// Destination texture.
    pub dst: ApiObjectHandle,
    /// Destination mip level written.
    pub dst_mip: u32,
    /// Destination array slice written.
    pub dst_slice: u32,
    /// Destination rectangle written, in pixels of the destination mip.
    pub dst_rect: Rect,
    /// Sampling filter.
    pub filter: FilterMode,
    /// Per-channel reduction modes; all-standard for plain blits.
    pub reductions: [ReductionMode; 4],
    /// Row-major 4×4 channel transform applied to each sampled texel.
    pub transform: [[f32; 4]; 4],
    /// Whether the reduction/transform ("complex") shader variant runs.
    pub complex: bool,
}

/// Parameters for a shader-based blit into a row-strided buffer.
#[derive(Debug, Clone)]
pub struct BlitToBufferPassParams {
    /// Source texture.
    pub src: ApiObjectHandle,
    /// Source mip level sampled.
    pub src_mip: u32,
    /// Source array slice sampled.
    pub src_slice: u32,
    /// Normalized UV offset of the sampled source region.
    pub src_offset: [f32; 2],
    /// Normalized UV scale of the sampled source region.
    pub src_scale: [f32; 2],
    /// Destination buffer.
    pub dst: ApiObjectHandle,
    /// Row stride of the destination, in pixels.
    pub dst_stride_pixels: u32,
    /// Pixel format the destination rows are packed as.
    pub dst_format: ResourceFormat,
    /// Destination rectangle written, in pixel coordinates of the implied
    /// 2D layout of the buffer.
    pub dst_rect: Rect,
    /// Sampling filter.
    pub filter: FilterMode,
    /// Per-channel reduction modes.
    pub reductions: [ReductionMode; 4],
    /// Row-major 4×4 channel transform applied to each sampled texel.
    pub transform: [[f32; 4]; 4],
    /// Whether the reduction/transform shader variant runs.
    pub complex: bool,
}

/// A recordable native command list.
///
/// Encoder-kind sequencing (one of resource/compute/render open at a time)
/// is enforced by [`crate::context::LowLevelContextData`]; implementations
/// may treat the begin/end calls as markers or as real native passes.
pub trait CommandList: Send + Debug {
    /// Clears all recorded commands and reopens the list for recording.
    ///
    /// Only called once the fence value signaled with this list's last
    /// submission has been observed as completed.
    fn reset(&mut self) -> Result<(), DeviceError>;

    /// Closes the list for recording.
    fn close(&mut self);

    /// Opens a resource (copy/barrier) encoder.
    fn begin_resource_encoder(&mut self);

    /// Opens a compute encoder.
    fn begin_compute_encoder(&mut self);

    /// Opens a render encoder targeting the given framebuffer color target.
    fn begin_render_encoder(&mut self, target: &ApiObjectHandle);

    /// Ends the currently open encoder, if any.
    fn end_encoder(&mut self);

    /// Records a whole-texture state transition.
    fn texture_barrier(&mut self, texture: &ApiObjectHandle, from: ResourceState, to: ResourceState);

    /// Records a single-subresource state transition.
    fn texture_subresource_barrier(
        &mut self,
        texture: &ApiObjectHandle,
        array_slice: u32,
        mip_level: u32,
        from: ResourceState,
        to: ResourceState,
    );

    /// Records a whole-buffer state transition.
    fn buffer_barrier(&mut self, buffer: &ApiObjectHandle, from: ResourceState, to: ResourceState);

    /// Records an unordered-access hazard barrier. Never elided.
    fn uav_barrier(&mut self, resource: &ApiObjectHandle);

    /// Records a full-resource copy. Source and destination must have
    /// identical descriptors.
    fn copy_resource(&mut self, dst: &ApiObjectHandle, src: &ApiObjectHandle);

    /// Records a buffer-range copy.
    fn copy_buffer_region(
        &mut self,
        dst: &ApiObjectHandle,
        dst_offset: u64,
        src: &ApiObjectHandle,
        src_offset: u64,
        num_bytes: u64,
    );

    /// Records a buffer-to-texture-subresource copy of tightly packed rows.
    fn copy_buffer_to_texture(
        &mut self,
        dst: &ApiObjectHandle,
        dst_mip: u32,
        dst_slice: u32,
        src: &ApiObjectHandle,
        src_offset: u64,
    );

    /// Records a texture-subresource-to-buffer copy with the given row
    /// stride in bytes.
    fn copy_texture_to_buffer(
        &mut self,
        dst: &ApiObjectHandle,
        dst_offset: u64,
        dst_row_stride: u64,
        src: &ApiObjectHandle,
        src_mip: u32,
        src_slice: u32,
    );

    /// Records a whole-texture clear.
    fn clear_texture(&mut self, texture: &ApiObjectHandle, value: &ClearValue);

    /// Records a compute dispatch.
    fn dispatch(&mut self, groups: [u32; 3]);

    /// Records a non-indexed draw into the open render encoder.
    fn draw(&mut self, vertex_count: u32, instance_count: u32);

    /// Records a shader-based blit pass.
    fn blit_pass(&mut self, params: &BlitPassParams);

    /// Records a shader-based blit into a row-strided buffer.
    fn blit_to_buffer_pass(&mut self, params: &BlitToBufferPassParams);

    /// Records a timestamp write into a query heap slot.
    fn write_timestamp(&mut self, heap: &ApiObjectHandle, index: u32);

    /// The list as [`Any`], for backend-side downcasting at submit time.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
