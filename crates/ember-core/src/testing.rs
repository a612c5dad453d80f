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

//! Minimal backend doubles shared by the unit tests in this crate.
//!
//! The full software backend lives in `ember-infra`; these doubles only model
//! what a single component under test needs: a fence whose completed value
//! the test advances by hand, a queue that drops submissions, a command list
//! that counts what was recorded, and pages whose bytes live in a `Vec`.

use crate::api::{ClearValue, DeviceDesc, QueueKind};
use crate::descriptor::{DescriptorPoolDesc, ShaderVisibility};
use crate::error::{DeviceError, FenceError};
use crate::fence::GpuFence;
use crate::memory::MemoryHeapKind;
use crate::query::QueryType;
use crate::resource::{BufferDesc, ResourceState, TextureDesc};
use crate::traits::{
    AdapterInfo, ApiObject, ApiObjectHandle, BackendCapabilities, BlitPassParams,
    BlitToBufferPassParams, CommandList, CommandQueue, DescriptorArena, GpuBackend, GpuInstance,
    NativeFence, PageMemory, SwapChain, SwapChainDesc,
};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A fence whose completed value is advanced explicitly by the test.
#[derive(Debug, Default)]
pub(crate) struct ManualFence {
    completed: AtomicU64,
    pub(crate) blocking_waits: AtomicU64,
}

impl ManualFence {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks every signal up to `value` as completed by the "GPU".
    pub(crate) fn complete_to(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::SeqCst);
    }
}

impl NativeFence for ManualFence {
    fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    fn wait_cpu(&self, value: u64) -> Result<(), FenceError> {
        self.blocking_waits.fetch_add(1, Ordering::SeqCst);
        // Tests never model a hung GPU; a wait completes the value.
        self.complete_to(value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A queue that accepts everything and executes nothing.
#[derive(Debug)]
pub(crate) struct NullQueue {
    kind: QueueKind,
    pub(crate) submissions: AtomicU64,
}

impl NullQueue {
    pub(crate) fn direct() -> Self {
        Self::new(QueueKind::Direct)
    }

    pub(crate) fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            submissions: AtomicU64::new(0),
        }
    }
}

impl CommandQueue for NullQueue {
    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn submit(
        &self,
        _list: &mut dyn CommandList,
        _fence: &dyn NativeFence,
        _signal_value: u64,
    ) -> Result<(), DeviceError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn signal(&self, _fence: &dyn NativeFence, _value: u64) {}

    fn wait_for_fence(&self, _fence: &dyn NativeFence, _value: u64) {}
}

/// A heap page whose bytes live in a `Vec`.
#[derive(Debug)]
pub(crate) struct VecPage {
    bytes: Mutex<Vec<u8>>,
}

impl VecPage {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; size]),
        }
    }
}

impl ApiObject for VecPage {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl PageMemory for VecPage {
    fn len(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock().unwrap();
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        let bytes = self.bytes.lock().unwrap();
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
    }
}

/// An anonymous native object.
#[derive(Debug)]
pub(crate) struct MockResource;

impl ApiObject for MockResource {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct MockArena {
    visibility: ShaderVisibility,
}

impl DescriptorArena for MockArena {
    fn visibility(&self) -> ShaderVisibility {
        self.visibility
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Counters over everything a [`RecordingList`] records.
#[derive(Debug, Default)]
pub(crate) struct RecordCounters {
    pub(crate) barriers: AtomicU64,
    pub(crate) uav_barriers: AtomicU64,
    pub(crate) copies: AtomicU64,
    pub(crate) clears: AtomicU64,
    pub(crate) dispatches: AtomicU64,
    pub(crate) draws: AtomicU64,
    pub(crate) blit_passes: AtomicU64,
    pub(crate) blit_to_buffer_passes: AtomicU64,
    pub(crate) render_encoder_begins: AtomicU64,
    pub(crate) resets: AtomicU64,
}

/// A command list that counts what was recorded and discards it.
#[derive(Debug)]
pub(crate) struct RecordingList {
    counters: Arc<RecordCounters>,
}

impl CommandList for RecordingList {
    fn reset(&mut self) -> Result<(), DeviceError> {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {}

    fn begin_resource_encoder(&mut self) {}

    fn begin_compute_encoder(&mut self) {}

    fn begin_render_encoder(&mut self, _target: &ApiObjectHandle) {
        self.counters
            .render_encoder_begins
            .fetch_add(1, Ordering::SeqCst);
    }

    fn end_encoder(&mut self) {}

    fn texture_barrier(
        &mut self,
        _texture: &ApiObjectHandle,
        _from: ResourceState,
        _to: ResourceState,
    ) {
        self.counters.barriers.fetch_add(1, Ordering::SeqCst);
    }

    fn texture_subresource_barrier(
        &mut self,
        _texture: &ApiObjectHandle,
        _array_slice: u32,
        _mip_level: u32,
        _from: ResourceState,
        _to: ResourceState,
    ) {
        self.counters.barriers.fetch_add(1, Ordering::SeqCst);
    }

    fn buffer_barrier(
        &mut self,
        _buffer: &ApiObjectHandle,
        _from: ResourceState,
        _to: ResourceState,
    ) {
        self.counters.barriers.fetch_add(1, Ordering::SeqCst);
    }

    fn uav_barrier(&mut self, _resource: &ApiObjectHandle) {
        self.counters.uav_barriers.fetch_add(1, Ordering::SeqCst);
    }

    fn copy_resource(&mut self, _dst: &ApiObjectHandle, _src: &ApiObjectHandle) {
        self.counters.copies.fetch_add(1, Ordering::SeqCst);
    }

    fn copy_buffer_region(
        &mut self,
        _dst: &ApiObjectHandle,
        _dst_offset: u64,
        _src: &ApiObjectHandle,
        _src_offset: u64,
        _num_bytes: u64,
    ) {
        self.counters.copies.fetch_add(1, Ordering::SeqCst);
    }

    fn copy_buffer_to_texture(
        &mut self,
        _dst: &ApiObjectHandle,
        _dst_mip: u32,
        _dst_slice: u32,
        _src: &ApiObjectHandle,
        _src_offset: u64,
    ) {
        self.counters.copies.fetch_add(1, Ordering::SeqCst);
    }

    fn copy_texture_to_buffer(
        &mut self,
        _dst: &ApiObjectHandle,
        _dst_offset: u64,
        _dst_row_stride: u64,
        _src: &ApiObjectHandle,
        _src_mip: u32,
        _src_slice: u32,
    ) {
        self.counters.copies.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_texture(&mut self, _texture: &ApiObjectHandle, _value: &ClearValue) {
        self.counters.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn dispatch(&mut self, _groups: [u32; 3]) {
        self.counters.dispatches.fetch_add(1, Ordering::SeqCst);
    }

    fn draw(&mut self, _vertex_count: u32, _instance_count: u32) {
        self.counters.draws.fetch_add(1, Ordering::SeqCst);
    }

    fn blit_pass(&mut self, _params: &BlitPassParams) {
        self.counters.blit_passes.fetch_add(1, Ordering::SeqCst);
    }

    fn blit_to_buffer_pass(&mut self, _params: &BlitToBufferPassParams) {
        self.counters
            .blit_to_buffer_passes
            .fetch_add(1, Ordering::SeqCst);
    }

    fn write_timestamp(&mut self, _heap: &ApiObjectHandle, _index: u32) {}

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A backend serving every factory call with an inert double.
#[derive(Debug)]
pub(crate) struct MockBackend {
    caps: BackendCapabilities,
    pub(crate) fence: Arc<ManualFence>,
    pub(crate) counters: Arc<RecordCounters>,
    pages: AtomicU64,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            caps: BackendCapabilities {
                preserves_resource_state_across_resize: false,
                supports_constant_buffer_views: true,
                max_dispatch_dim: 65535,
                api_version: (1, 3),
                timestamp_frequency: 1_000_000.0,
            },
            fence: Arc::new(ManualFence::new()),
            counters: Arc::new(RecordCounters::default()),
            pages: AtomicU64::new(0),
        }
    }

    pub(crate) fn pages_created(&self) -> u64 {
        self.pages.load(Ordering::SeqCst)
    }
}

impl GpuBackend for MockBackend {
    fn capabilities(&self) -> &BackendCapabilities {
        &self.caps
    }

    fn adapter_name(&self) -> &str {
        "Mock Adapter"
    }

    fn create_fence(&self) -> Result<Arc<dyn NativeFence>, FenceError> {
        Ok(self.fence.clone())
    }

    fn create_queue(
        &self,
        kind: QueueKind,
        _index: u32,
    ) -> Result<Arc<dyn CommandQueue>, DeviceError> {
        Ok(Arc::new(NullQueue::new(kind)))
    }

    fn create_command_list(&self, _kind: QueueKind) -> Result<Box<dyn CommandList>, DeviceError> {
        Ok(Box::new(RecordingList {
            counters: self.counters.clone(),
        }))
    }

    fn create_heap_page(
        &self,
        _kind: MemoryHeapKind,
        size: usize,
    ) -> Result<Arc<dyn PageMemory>, DeviceError> {
        self.pages.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(VecPage::new(size)))
    }

    fn create_descriptor_arena(
        &self,
        visibility: ShaderVisibility,
        _desc: &DescriptorPoolDesc,
    ) -> Result<Arc<dyn DescriptorArena>, DeviceError> {
        Ok(Arc::new(MockArena { visibility }))
    }

    fn create_texture(&self, _desc: &TextureDesc) -> Result<ApiObjectHandle, DeviceError> {
        Ok(Arc::new(MockResource))
    }

    fn create_buffer(&self, _desc: &BufferDesc) -> Result<ApiObjectHandle, DeviceError> {
        Ok(Arc::new(MockResource))
    }

    fn read_buffer(
        &self,
        _buffer: &ApiObjectHandle,
        _offset: u64,
        _out: &mut [u8],
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(
            "mock backend has no buffer storage".to_string(),
        ))
    }

    fn create_swap_chain(&self, _desc: &SwapChainDesc) -> Result<Box<dyn SwapChain>, DeviceError> {
        Err(DeviceError::Unsupported(
            "mock backend has no presentation engine".to_string(),
        ))
    }

    fn create_query_heap(
        &self,
        _ty: QueryType,
        _count: u32,
    ) -> Result<ApiObjectHandle, DeviceError> {
        Ok(Arc::new(MockResource))
    }
}

/// A [`GpuInstance`] double enumerating a fixed set of mock adapters.
#[derive(Debug)]
pub(crate) struct MockInstance {
    adapter_count: u32,
}

impl MockInstance {
    pub(crate) fn with_adapter_count(adapter_count: u32) -> Self {
        Self { adapter_count }
    }
}

impl GpuInstance for MockInstance {
    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        (0..self.adapter_count)
            .map(|id| AdapterInfo {
                id,
                name: format!("Mock Adapter {id}"),
            })
            .collect()
    }

    fn create_backend(
        &self,
        adapter_id: u32,
        _desc: &DeviceDesc,
    ) -> Result<Arc<dyn GpuBackend>, DeviceError> {
        if adapter_id >= self.adapter_count {
            return Err(DeviceError::AdapterNotEnumerated(adapter_id));
        }
        Ok(Arc::new(MockBackend::new()))
    }
}

/// Builds a [`GpuFence`] over `backend` and returns it together with the
/// shared [`ManualFence`] the test advances.
pub(crate) fn manual_fence_pair(backend: &MockBackend) -> (Arc<GpuFence>, Arc<ManualFence>) {
    let fence = Arc::new(GpuFence::new(backend).expect("mock fence creation"));
    (fence, backend.fence.clone())
}
