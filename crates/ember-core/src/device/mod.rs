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

//! The device: owner of the backend handle, queues, descriptor pools,
//! upload heap, frame fence, default render context, surface and the
//! process-wide deferred-release queue that ties all of the above together.

mod manager;
mod surface;

pub use self::manager::DeviceManager;

use crate::api::{DeviceDesc, QueueKind, QUEUE_KIND_COUNT};
use crate::context::RenderContext;
use crate::descriptor::{DescriptorPool, DescriptorPoolDesc, DescriptorType, ShaderVisibility};
use crate::error::DeviceError;
use crate::fence::GpuFence;
use crate::memory::{GpuMemoryHeap, MemoryHeapKind};
use crate::query::{QueryHeap, QueryType};
use crate::resource::{Buffer, BufferDesc, Texture, TextureDesc};
use crate::traits::{ApiObjectHandle, BackendCapabilities, CommandQueue, GpuBackend};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use self::surface::{OffscreenSurface, Surface, SwapChainSurface};

/// Number of back-buffers kept in flight; also the bound on how many frames
/// the CPU may run ahead of the GPU.
pub const SWAP_CHAIN_BUFFER_COUNT: u32 = 5;

/// Page size of the device's upload heap.
const UPLOAD_HEAP_PAGE_SIZE: u64 = 2 * 1024 * 1024;

static NEXT_DEVICE_UID: AtomicU8 = AtomicU8::new(0);

/// Non-owning back-reference from resources to their device, used solely to
/// enqueue native handles on the deferred-release queue at drop time.
pub(crate) type WeakDevice = Weak<DeviceShared>;

/// One framebuffer: a color target plus an optional depth target.
#[derive(Debug, Clone)]
pub struct Fbo {
    color: Texture,
    depth: Option<Texture>,
    width: u32,
    height: u32,
}

impl Fbo {
    pub(crate) fn new(color: Texture, depth: Option<Texture>, width: u32, height: u32) -> Self {
        Self {
            color,
            depth,
            width,
            height,
        }
    }

    /// The color attachment.
    pub fn color_texture(&self) -> &Texture {
        &self.color
    }

    /// The depth-stencil attachment, if one exists.
    pub fn depth_stencil_texture(&self) -> Option<&Texture> {
        self.depth.as_ref()
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }
}

/// A native object queued for release, tagged with the frame-fence CPU
/// value current at release time.
#[derive(Debug)]
struct ResourceRelease {
    frame_value: u64,
    object: ApiObjectHandle,
}

/// The shared device state behind every [`Device`] handle.
#[derive(Debug)]
pub(crate) struct DeviceShared {
    uid: u8,
    desc: DeviceDesc,
    backend: Arc<dyn GpuBackend>,
    queues: [Vec<Arc<dyn CommandQueue>>; QUEUE_KIND_COUNT],
    frame_fence: Arc<GpuFence>,
    upload_heap: Arc<GpuMemoryHeap>,
    cpu_descriptor_pool: Arc<DescriptorPool>,
    gpu_descriptor_pool: Arc<DescriptorPool>,
    render_context: OnceLock<RenderContext>,
    surface: OnceLock<Box<dyn Surface>>,
    /// FIFO of released native objects. Pops stay in order because frame
    /// values are tagged in non-decreasing order.
    deferred_releases: Mutex<VecDeque<ResourceRelease>>,
    query_heaps: Mutex<Vec<Arc<QueryHeap>>>,
    frame_id: AtomicU64,
    vsync: AtomicBool,
    cleaned_up: AtomicBool,
}

impl DeviceShared {
    pub(crate) fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub(crate) fn upload_heap(&self) -> &Arc<GpuMemoryHeap> {
        &self.upload_heap
    }

    pub(crate) fn render_context(&self) -> &RenderContext {
        self.render_context.get().expect("device is initialized")
    }

    fn surface(&self) -> &dyn Surface {
        self.surface.get().expect("device is initialized").as_ref()
    }

    fn direct_queue(&self) -> &Arc<dyn CommandQueue> {
        &self.queues[QueueKind::Direct.index()][0]
    }

    /// Queues a native object for destruction once the GPU passes the
    /// frame fence value current right now.
    pub(crate) fn release_resource(&self, object: ApiObjectHandle) {
        let frame_value = self.frame_fence.cpu_value();
        self.deferred_releases
            .lock()
            .unwrap()
            .push_back(ResourceRelease {
                frame_value,
                object,
            });
    }

    /// The single synchronization point tying the fence, the upload heap,
    /// both descriptor pools and the raw object queue together.
    pub(crate) fn execute_deferred_releases(&self) {
        self.upload_heap.execute_deferred_releases();

        let gpu_value = self.frame_fence.gpu_value();
        {
            let mut queue = self.deferred_releases.lock().unwrap();
            while queue
                .front()
                .map_or(false, |release| release.frame_value <= gpu_value)
            {
                let release = queue.pop_front().expect("front entry");
                // Dropping the last strong reference destroys the native
                // object.
                drop(release.object);
            }
        }

        self.cpu_descriptor_pool.execute_deferred_releases();
        self.gpu_descriptor_pool.execute_deferred_releases();
    }

    /// Blocking flush: submit, wait, signal the frame fence and sweep.
    pub(crate) fn flush_and_sync(&self) -> Result<(), DeviceError> {
        self.render_context().flush(true)?;
        self.frame_fence.gpu_signal(self.direct_queue().as_ref());
        self.execute_deferred_releases();
        Ok(())
    }
}

fn gpu_descriptor_pool_desc(caps: &BackendCapabilities) -> DescriptorPoolDesc {
    let cbv_capacity = if caps.supports_constant_buffer_views {
        65_536
    } else {
        0
    };
    DescriptorPoolDesc::new()
        .set_capacity(DescriptorType::TextureSrv, 1_000_000)
        .set_capacity(DescriptorType::TextureUav, 65_536)
        .set_capacity(DescriptorType::TypedBufferSrv, 65_536)
        .set_capacity(DescriptorType::TypedBufferUav, 65_536)
        .set_capacity(DescriptorType::StructuredBufferSrv, 65_536)
        .set_capacity(DescriptorType::StructuredBufferUav, 65_536)
        .set_capacity(DescriptorType::RawBufferSrv, 65_536)
        .set_capacity(DescriptorType::RawBufferUav, 65_536)
        .set_capacity(DescriptorType::Cbv, cbv_capacity)
        .set_capacity(DescriptorType::Sampler, 2_048)
        .set_capacity(DescriptorType::AccelerationStructureSrv, 65_536)
}

fn cpu_descriptor_pool_desc() -> DescriptorPoolDesc {
    DescriptorPoolDesc::new()
        .set_capacity(DescriptorType::TextureSrv, 16_384)
        .set_capacity(DescriptorType::TextureUav, 16_384)
        .set_capacity(DescriptorType::Cbv, 16_384)
        .set_capacity(DescriptorType::Sampler, 2_048)
        .set_capacity(DescriptorType::Rtv, 16_384)
        .set_capacity(DescriptorType::Dsv, 1_024)
}

/// The logical GPU device.
///
/// Cheap to clone; all clones address the same underlying device. Created
/// through [`DeviceManager`] (or directly from a backend with
/// [`Device::create`]), torn down with [`Device::cleanup`].
#[derive(Debug, Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Device {
    pub(crate) fn from_shared(shared: Arc<DeviceShared>) -> Device {
        Device { shared }
    }

    /// Creates and fully initializes a device over `backend`.
    ///
    /// Fails when the requested API version is unsatisfiable, when no
    /// direct queue was requested (the default render context needs one),
    /// or when any mandatory sub-object cannot be created. A failed create
    /// aborts application startup; there is no partial device.
    pub fn create(backend: Arc<dyn GpuBackend>, desc: DeviceDesc) -> Result<Device, DeviceError> {
        let caps = backend.capabilities().clone();
        if let Some((major, minor)) = desc.api_version {
            if (major, minor) > caps.api_version {
                return Err(DeviceError::UnsupportedApiVersion { major, minor });
            }
        }
        if desc.queue_count(QueueKind::Direct) == 0 {
            return Err(DeviceError::MissingDirectQueue);
        }

        let mut queues: [Vec<Arc<dyn CommandQueue>>; QUEUE_KIND_COUNT] =
            [Vec::new(), Vec::new(), Vec::new()];
        for kind in QueueKind::ALL {
            for index in 0..desc.queue_count(kind) {
                queues[kind.index()].push(backend.create_queue(kind, index)?);
            }
        }

        let frame_fence = Arc::new(GpuFence::new(backend.as_ref())?);
        let gpu_descriptor_pool = Arc::new(DescriptorPool::new(
            backend.as_ref(),
            ShaderVisibility::GpuVisible,
            gpu_descriptor_pool_desc(&caps),
            frame_fence.clone(),
        )?);
        let cpu_descriptor_pool = Arc::new(DescriptorPool::new(
            backend.as_ref(),
            ShaderVisibility::CpuOnly,
            cpu_descriptor_pool_desc(),
            frame_fence.clone(),
        )?);
        let upload_heap = Arc::new(GpuMemoryHeap::new(
            backend.clone(),
            MemoryHeapKind::Upload,
            UPLOAD_HEAP_PAGE_SIZE,
            frame_fence.clone(),
        ));

        let vsync = desc.enable_vsync;
        let shared = Arc::new(DeviceShared {
            uid: NEXT_DEVICE_UID.fetch_add(1, Ordering::SeqCst),
            desc,
            backend,
            queues,
            frame_fence,
            upload_heap,
            cpu_descriptor_pool,
            gpu_descriptor_pool,
            render_context: OnceLock::new(),
            surface: OnceLock::new(),
            deferred_releases: Mutex::new(VecDeque::new()),
            query_heaps: Mutex::new(Vec::new()),
            frame_id: AtomicU64::new(0),
            vsync: AtomicBool::new(vsync),
            cleaned_up: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&shared);
        let render_context = RenderContext::new(
            weak.clone(),
            &shared.backend,
            QueueKind::Direct,
            shared.direct_queue().clone(),
        )?;
        shared
            .render_context
            .set(render_context)
            .map_err(|_| DeviceError::Internal("render context initialized twice".to_string()))?;

        let surface: Box<dyn Surface> = if shared.desc.windowed {
            Box::new(SwapChainSurface::new(weak, &shared.backend, &shared.desc)?)
        } else {
            Box::new(OffscreenSurface::new(weak, &shared.backend, &shared.desc)?)
        };
        shared
            .surface
            .set(surface)
            .map_err(|_| DeviceError::Internal("surface initialized twice".to_string()))?;

        let device = Device { shared };
        // One blocking flush wires the descriptor heaps in before the
        // first frame records anything.
        device.flush_and_sync()?;
        Ok(device)
    }

    /// Small per-process unique id of this device.
    pub fn uid(&self) -> u8 {
        self.shared.uid
    }

    /// Whether `self` and `other` are handles to the same device.
    pub fn is_same(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// The configuration this device was created with.
    pub fn desc(&self) -> &DeviceDesc {
        &self.shared.desc
    }

    /// Static capabilities of the active backend.
    pub fn capabilities(&self) -> &BackendCapabilities {
        self.shared.backend.capabilities()
    }

    /// Name of the physical adapter.
    pub fn physical_device_name(&self) -> &str {
        self.shared.backend.adapter_name()
    }

    /// The default render context. Fully managed by the device: queue
    /// commands into it and the device takes care of submission and
    /// synchronization.
    pub fn render_context(&self) -> &RenderContext {
        self.shared.render_context()
    }

    /// The transient upload heap.
    pub fn upload_heap(&self) -> &Arc<GpuMemoryHeap> {
        self.shared.upload_heap()
    }

    /// The shader-visible descriptor pool.
    pub fn gpu_descriptor_pool(&self) -> &Arc<DescriptorPool> {
        &self.shared.gpu_descriptor_pool
    }

    /// The CPU-side staging descriptor pool.
    pub fn cpu_descriptor_pool(&self) -> &Arc<DescriptorPool> {
        &self.shared.cpu_descriptor_pool
    }

    /// The fence advanced once per presented (or explicitly flushed) frame.
    pub fn frame_fence(&self) -> &Arc<GpuFence> {
        &self.shared.frame_fence
    }

    /// The command queue of the given kind and index.
    pub fn command_queue(&self, kind: QueueKind, index: u32) -> Option<&Arc<dyn CommandQueue>> {
        self.shared.queues[kind.index()].get(index as usize)
    }

    /// Monotonic frame counter, advanced by [`present`](Device::present).
    pub fn frame_id(&self) -> u64 {
        self.shared.frame_id.load(Ordering::SeqCst)
    }

    /// Whether this device renders to a window surface.
    pub fn is_windowed(&self) -> bool {
        self.shared.desc.windowed
    }

    /// Index of the back-buffer currently rendered to.
    pub fn current_back_buffer_index(&self) -> u32 {
        self.shared.surface().current_index()
    }

    /// The framebuffer currently rendered to (the swap-chain image in
    /// windowed mode, the offscreen target otherwise).
    pub fn swap_chain_fbo(&self) -> Fbo {
        self.shared.surface().current_fbo()
    }

    /// GPU timestamp frequency in ticks per second.
    pub fn gpu_timestamp_frequency(&self) -> f64 {
        self.shared.backend.capabilities().timestamp_frequency
    }

    /// Enables or disables vertical sync.
    pub fn toggle_vsync(&self, enabled: bool) {
        self.shared.vsync.store(enabled, Ordering::SeqCst);
        self.shared.surface().set_vsync(enabled);
    }

    /// Whether vertical sync is currently enabled.
    pub fn is_vsync_enabled(&self) -> bool {
        self.shared.vsync.load(Ordering::SeqCst)
    }

    /// Creates a texture owned by the caller. Dropping the last handle
    /// funnels the native object through the deferred-release queue.
    pub fn create_texture(&self, desc: TextureDesc) -> Result<Texture, DeviceError> {
        let handle = self.shared.backend.create_texture(&desc)?;
        Ok(Texture::from_parts(
            Arc::downgrade(&self.shared),
            handle,
            desc,
        ))
    }

    /// Creates a buffer owned by the caller, with the same release
    /// discipline as [`create_texture`](Device::create_texture).
    pub fn create_buffer(&self, desc: BufferDesc) -> Result<Buffer, DeviceError> {
        let handle = self.shared.backend.create_buffer(&desc)?;
        Ok(Buffer::from_parts(
            Arc::downgrade(&self.shared),
            handle,
            desc,
        ))
    }

    /// Creates a query heap. The device keeps the heap alive; callers hold
    /// a weak reference.
    pub fn create_query_heap(
        &self,
        ty: QueryType,
        count: u32,
    ) -> Result<Weak<QueryHeap>, DeviceError> {
        let handle = self.shared.backend.create_query_heap(ty, count)?;
        let heap = Arc::new(QueryHeap::new(handle, ty, count));
        let weak = Arc::downgrade(&heap);
        self.shared.query_heaps.lock().unwrap().push(heap);
        Ok(weak)
    }

    /// Presents the current frame and prepares the next one.
    ///
    /// Transitions the back-buffer for presentation, flushes pending
    /// commands, hands the frame to the presentation engine (a no-op on an
    /// offscreen surface), signals the frame fence, bounds how far the CPU
    /// may run ahead of the GPU to [`SWAP_CHAIN_BUFFER_COUNT`] frames,
    /// sweeps deferred releases and advances the frame counter.
    pub fn present(&self) -> Result<(), DeviceError> {
        debug_assert!(
            !self.shared.cleaned_up.load(Ordering::SeqCst),
            "present() after cleanup()"
        );
        let ctx = self.shared.render_context();
        self.shared.surface().prepare_present(ctx)?;
        ctx.flush(false)?;
        self.shared.surface().present_and_acquire()?;

        let fence = &self.shared.frame_fence;
        fence.gpu_signal(self.shared.direct_queue().as_ref());
        let cpu_value = fence.cpu_value();
        if cpu_value >= SWAP_CHAIN_BUFFER_COUNT as u64 {
            fence.sync_cpu(Some(cpu_value - SWAP_CHAIN_BUFFER_COUNT as u64))?;
        }

        self.shared.execute_deferred_releases();
        self.shared.frame_id.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Flushes the pipeline, blocks until completion and reclaims
    /// everything reclaimable. The blocking variant used outside the
    /// present loop.
    pub fn flush_and_sync(&self) -> Result<(), DeviceError> {
        self.shared.flush_and_sync()
    }

    /// Resizes the presentation surface, rebuilding its framebuffers.
    ///
    /// Resource state across the rebuild is a backend quirk: when the
    /// backend reports `preserves_resource_state_across_resize`, the
    /// tracked per-buffer states are captured and restored; otherwise the
    /// rebuilt images start over as undefined.
    pub fn resize_swap_chain(&self, width: u32, height: u32) -> Result<Fbo, DeviceError> {
        assert!(width > 0 && height > 0, "resize to a zero-area surface");
        self.shared.render_context().flush(true)?;

        let preserve = self
            .shared
            .backend
            .capabilities()
            .preserves_resource_state_across_resize;
        let saved_states = preserve.then(|| self.shared.surface().capture_states());

        self.shared.surface().resize(width, height)?;

        if let Some(states) = saved_states {
            self.shared.surface().restore_states(&states);
        }
        Ok(self.swap_chain_fbo())
    }

    /// Tears the device down: flushes, waits for the GPU to go idle and
    /// drains every deferred release. Must be called before the last
    /// handle drops; afterwards only dropping the handles is legal.
    pub fn cleanup(&self) -> Result<(), DeviceError> {
        if self.shared.cleaned_up.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.render_context().flush(true)?;
        let fence = &self.shared.frame_fence;
        fence.gpu_signal(self.shared.direct_queue().as_ref());
        fence.sync_cpu(None)?;
        self.shared.execute_deferred_releases();
        self.shared.query_heaps.lock().unwrap().clear();
        Ok(())
    }
}
