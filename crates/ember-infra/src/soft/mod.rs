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

//! The deterministic software backend.

mod command;
mod convert;
mod fence;
mod queue;
mod resource;
mod stats;

pub use self::command::{SoftCommandList, SoftError};
pub use self::fence::SoftFence;
pub use self::queue::SoftQueue;
pub use self::stats::SoftStats;

use self::resource::{SoftArena, SoftBuffer, SoftPage, SoftQueryHeap, SoftSwapChain, SoftTexture};
use ember_core::api::{DeviceDesc, QueueKind};
use ember_core::descriptor::{DescriptorPoolDesc, ShaderVisibility};
use ember_core::error::{DeviceError, FenceError};
use ember_core::memory::MemoryHeapKind;
use ember_core::query::QueryType;
use ember_core::resource::{BufferDesc, TextureDesc};
use ember_core::traits::{
    AdapterInfo, ApiObjectHandle, BackendCapabilities, CommandList, CommandQueue, DescriptorArena,
    GpuBackend, GpuInstance, NativeFence, PageMemory, SwapChain, SwapChainDesc,
};
use std::sync::{Arc, Mutex};

/// Tuning knobs for the software backend, set on the instance before any
/// backend is created.
#[derive(Debug, Clone)]
struct SoftConfig {
    /// Number of fence signals held back to emulate a GPU running behind
    /// the CPU. Zero completes signals at submission.
    gpu_lag: usize,
    /// Reported value of the state-preservation-across-resize capability.
    preserves_resource_state_across_resize: bool,
}

impl Default for SoftConfig {
    fn default() -> Self {
        Self {
            gpu_lag: 0,
            preserves_resource_state_across_resize: false,
        }
    }
}

/// Adapter enumeration for the software backend.
///
/// Enumerates a configurable number of identical virtual adapters; each
/// created backend is independent.
#[derive(Debug)]
pub struct SoftInstance {
    adapter_count: u32,
    config: SoftConfig,
    /// Backends created through this instance, latest last. Lets callers
    /// that go through [`ember_core::device::DeviceManager`] reach the
    /// instrumentation counters.
    backends: Mutex<Vec<Arc<SoftBackend>>>,
}

impl Default for SoftInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftInstance {
    /// An instance enumerating one virtual adapter.
    pub fn new() -> Self {
        Self {
            adapter_count: 1,
            config: SoftConfig::default(),
            backends: Mutex::new(Vec::new()),
        }
    }

    /// Enumerates `count` virtual adapters instead of one.
    pub fn with_adapter_count(mut self, count: u32) -> Self {
        self.adapter_count = count;
        self
    }

    /// Holds back fence completion by `lag` signals, emulating a GPU that
    /// runs behind the CPU.
    pub fn with_gpu_lag(mut self, lag: usize) -> Self {
        self.config.gpu_lag = lag;
        self
    }

    /// Reports the resize-state-preservation capability as set.
    pub fn with_state_preserving_resize(mut self, preserves: bool) -> Self {
        self.config.preserves_resource_state_across_resize = preserves;
        self
    }

    /// The backend most recently created through this instance.
    pub fn last_backend(&self) -> Option<Arc<SoftBackend>> {
        self.backends.lock().unwrap().last().cloned()
    }
}

impl GpuInstance for SoftInstance {
    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        (0..self.adapter_count)
            .map(|id| AdapterInfo {
                id,
                name: format!("Ember Soft Adapter {id}"),
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
        let backend = Arc::new(SoftBackend::with_config(
            format!("Ember Soft Adapter {adapter_id}"),
            self.config.clone(),
        ));
        self.backends.lock().unwrap().push(backend.clone());
        Ok(backend)
    }
}

/// The software device backend: every factory call is served from host
/// memory, and command lists execute synchronously at submission.
#[derive(Debug)]
pub struct SoftBackend {
    name: String,
    caps: BackendCapabilities,
    config: SoftConfig,
    stats: Arc<SoftStats>,
}

impl Default for SoftBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftBackend {
    /// A backend with default configuration (no lag, no state
    /// preservation).
    pub fn new() -> Self {
        Self::with_config("Ember Soft Adapter 0".to_string(), SoftConfig::default())
    }

    /// A backend that holds back fence completion by `lag` signals.
    pub fn with_lag(lag: usize) -> Self {
        let mut config = SoftConfig::default();
        config.gpu_lag = lag;
        Self::with_config("Ember Soft Adapter 0".to_string(), config)
    }

    fn with_config(name: String, config: SoftConfig) -> Self {
        let caps = BackendCapabilities {
            preserves_resource_state_across_resize: config
                .preserves_resource_state_across_resize,
            supports_constant_buffer_views: true,
            max_dispatch_dim: 65_535,
            api_version: (1, 3),
            timestamp_frequency: 1_000_000_000.0,
        };
        Self {
            name,
            caps,
            config,
            stats: Arc::new(SoftStats::default()),
        }
    }

    /// Instrumentation counters for this backend.
    pub fn stats(&self) -> &Arc<SoftStats> {
        &self.stats
    }
}

impl GpuBackend for SoftBackend {
    fn capabilities(&self) -> &BackendCapabilities {
        &self.caps
    }

    fn adapter_name(&self) -> &str {
        &self.name
    }

    fn create_fence(&self) -> Result<Arc<dyn NativeFence>, FenceError> {
        Ok(Arc::new(SoftFence::new(
            self.config.gpu_lag,
            self.stats.clone(),
        )))
    }

    fn create_queue(
        &self,
        kind: QueueKind,
        _index: u32,
    ) -> Result<Arc<dyn CommandQueue>, DeviceError> {
        Ok(Arc::new(SoftQueue::new(kind, self.stats.clone())))
    }

    fn create_command_list(&self, _kind: QueueKind) -> Result<Box<dyn CommandList>, DeviceError> {
        Ok(Box::new(SoftCommandList::new(self.stats.clone())))
    }

    fn create_heap_page(
        &self,
        _kind: MemoryHeapKind,
        size: usize,
    ) -> Result<Arc<dyn PageMemory>, DeviceError> {
        SoftStats::bump(&self.stats.pages_allocated);
        Ok(Arc::new(SoftPage::new(size)))
    }

    fn create_descriptor_arena(
        &self,
        visibility: ShaderVisibility,
        desc: &DescriptorPoolDesc,
    ) -> Result<Arc<dyn DescriptorArena>, DeviceError> {
        Ok(Arc::new(SoftArena::new(visibility, desc)))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<ApiObjectHandle, DeviceError> {
        Ok(Arc::new(SoftTexture::new(desc)))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<ApiObjectHandle, DeviceError> {
        Ok(Arc::new(SoftBuffer::new(desc)))
    }

    fn read_buffer(
        &self,
        buffer: &ApiObjectHandle,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), DeviceError> {
        let soft = buffer
            .as_any()
            .downcast_ref::<SoftBuffer>()
            .ok_or_else(|| DeviceError::Internal("handle is not a software buffer".to_string()))?;
        let data = soft.data.lock().unwrap();
        let start = offset as usize;
        let end = start + out.len();
        if end > data.len() {
            return Err(DeviceError::Internal(
                "buffer readback out of range".to_string(),
            ));
        }
        out.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn create_swap_chain(&self, desc: &SwapChainDesc) -> Result<Box<dyn SwapChain>, DeviceError> {
        Ok(Box::new(SoftSwapChain::new(
            desc.width,
            desc.height,
            desc.format,
            desc.image_count,
            desc.vsync,
            self.stats.clone(),
        )))
    }

    fn create_query_heap(
        &self,
        ty: QueryType,
        count: u32,
    ) -> Result<ApiObjectHandle, DeviceError> {
        Ok(Arc::new(SoftQueryHeap::new(ty, count)))
    }
}
