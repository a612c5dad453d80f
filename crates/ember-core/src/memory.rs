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

//! Paged linear allocator for transient CPU-visible GPU memory.
//!
//! Pages are bump-allocated and recycled only once every allocation carved
//! from them has been released *and* the fence value tagged at release time
//! has been completed by the GPU. Requests larger than the page size get a
//! dedicated "mega" page that is freed outright instead of pooled.

use crate::error::{AllocError, DeviceError};
use crate::fence::GpuFence;
use crate::traits::{ApiObjectHandle, GpuBackend, PageMemory};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

/// The kind of memory a heap serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryHeapKind {
    /// Device-local memory.
    Default,
    /// CPU-write-visible memory for streaming data to the GPU.
    Upload,
    /// CPU-read-visible memory for reading results back.
    Readback,
}

impl fmt::Display for MemoryHeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryHeapKind::Default => write!(f, "Default"),
            MemoryHeapKind::Upload => write!(f, "Upload"),
            MemoryHeapKind::Readback => write!(f, "Readback"),
        }
    }
}

/// Page id of dedicated oversize pages; never enters the recycle pool.
pub const MEGA_PAGE_ID: u64 = u64::MAX;

/// A contiguous byte range inside a heap page.
///
/// Exclusively owned by the caller until [`GpuMemoryHeap::release`], at which
/// point ownership transfers to the heap's deferred-release queue. The
/// allocation is *not* fence-tagged at allocation time; the value that
/// matters is the one current when the caller is done with the memory.
#[derive(Debug)]
pub struct HeapAllocation {
    page_id: u64,
    offset: u64,
    size: u64,
    memory: Arc<dyn PageMemory>,
}

impl HeapAllocation {
    /// Id of the owning page ([`MEGA_PAGE_ID`] for dedicated pages).
    pub fn page_id(&self) -> u64 {
        self.page_id
    }

    /// Byte offset of this range inside its page.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the range in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The native resource backing the owning page, for copy commands
    /// sourcing from (or targeting) this range.
    pub fn resource_handle(&self) -> ApiObjectHandle {
        self.memory.clone()
    }

    /// Writes `data` at the start of the range.
    ///
    /// Caller contract: `data` must fit inside the range.
    pub fn write(&self, data: &[u8]) {
        debug_assert!(data.len() as u64 <= self.size);
        self.memory.write(self.offset as usize, data);
    }

    /// Writes a POD value at the start of the range.
    pub fn write_pod<T: bytemuck::NoUninit>(&self, value: &T) {
        self.write(bytemuck::bytes_of(value));
    }

    /// Reads the first `out.len()` bytes of the range.
    pub fn read(&self, out: &mut [u8]) {
        debug_assert!(out.len() as u64 <= self.size);
        self.memory.read(self.offset as usize, out);
    }
}

/// One fixed-size block served by the bump allocator.
#[derive(Debug)]
struct PageData {
    memory: Arc<dyn PageMemory>,
    current_offset: u64,
    allocations_count: u32,
}

/// A released allocation awaiting its fence value.
#[derive(Debug)]
struct PendingRelease {
    fence_value: u64,
    page_id: u64,
    /// Kept alive until reclamation for mega pages; regular pages are owned
    /// by the page tables.
    memory: Option<Arc<dyn PageMemory>>,
}

impl PartialEq for PendingRelease {
    fn eq(&self, other: &Self) -> bool {
        self.fence_value == other.fence_value
    }
}

impl Eq for PendingRelease {}

impl PartialOrd for PendingRelease {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingRelease {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fence_value.cmp(&other.fence_value)
    }
}

#[derive(Debug)]
struct HeapInner {
    next_page_id: u64,
    active_id: u64,
    active: Option<PageData>,
    used_pages: HashMap<u64, PageData>,
    available_pages: VecDeque<PageData>,
    /// Min-queue keyed by fence value: the soonest-reclaimable allocation is
    /// always at the front.
    deferred_releases: BinaryHeap<Reverse<PendingRelease>>,
}

/// A paged linear allocator for transient CPU-visible GPU memory.
#[derive(Debug)]
pub struct GpuMemoryHeap {
    kind: MemoryHeapKind,
    page_size: u64,
    fence: Arc<GpuFence>,
    backend: Arc<dyn GpuBackend>,
    inner: Mutex<HeapInner>,
}

impl GpuMemoryHeap {
    /// Creates a new heap of the given kind and page size, synchronized by
    /// `fence`.
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        kind: MemoryHeapKind,
        page_size: u64,
        fence: Arc<GpuFence>,
    ) -> Self {
        Self {
            kind,
            page_size,
            fence,
            backend,
            inner: Mutex::new(HeapInner {
                next_page_id: 0,
                active_id: 0,
                active: None,
                used_pages: HashMap::new(),
                available_pages: VecDeque::new(),
                deferred_releases: BinaryHeap::new(),
            }),
        }
    }

    /// The kind of memory this heap serves.
    pub fn kind(&self) -> MemoryHeapKind {
        self.kind
    }

    /// The standard page size in bytes.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// `alignment` must be a power of two, a caller contract checked in
    /// debug builds only. A size of zero is permitted and yields a valid
    /// zero-length slice. Requests above the page size get a dedicated mega
    /// page that bypasses the recycle pool entirely.
    pub fn allocate(&self, size: u64, alignment: u64) -> Result<HeapAllocation, AllocError> {
        debug_assert!(
            alignment.is_power_of_two(),
            "heap alignment must be a power of two, got {alignment}"
        );

        if size > self.page_size {
            let memory = self.new_page_memory(size)?;
            return Ok(HeapAllocation {
                page_id: MEGA_PAGE_ID,
                offset: 0,
                size,
                memory,
            });
        }

        let mut inner = self.inner.lock().unwrap();

        if inner.active.is_none() {
            self.obtain_page(&mut inner)?;
        }

        let mut offset = align_up(
            inner.active.as_ref().map(|p| p.current_offset).unwrap_or(0),
            alignment,
        );
        if offset + size > self.page_size {
            // The active page cannot serve this request; swap it out and
            // start a fresh one.
            let retired = inner.active.take().expect("active page exists");
            let retired_id = inner.active_id;
            inner.used_pages.insert(retired_id, retired);
            self.obtain_page(&mut inner)?;
            offset = 0;
        }

        let page_id = inner.active_id;
        let page = inner.active.as_mut().expect("active page exists");
        page.current_offset = offset + size;
        page.allocations_count += 1;

        Ok(HeapAllocation {
            page_id,
            offset,
            size,
            memory: page.memory.clone(),
        })
    }

    /// Transfers ownership of `allocation` to the deferred-release queue,
    /// tagged with the fence's current CPU value, i.e. safe to reuse once
    /// the GPU reaches the next signaled value.
    pub fn release(&self, allocation: HeapAllocation) {
        let fence_value = self.fence.cpu_value();
        let mut inner = self.inner.lock().unwrap();
        let memory = (allocation.page_id == MEGA_PAGE_ID).then(|| allocation.memory.clone());
        inner.deferred_releases.push(Reverse(PendingRelease {
            fence_value,
            page_id: allocation.page_id,
            memory,
        }));
    }

    /// Reclaims every queued release whose tagged fence value the GPU has
    /// completed. Pages whose outstanding allocation count reaches zero are
    /// reset and returned to the available pool; mega pages are freed
    /// outright.
    pub fn execute_deferred_releases(&self) {
        let gpu_value = self.fence.gpu_value();
        let mut inner = self.inner.lock().unwrap();

        loop {
            let reclaimable = matches!(
                inner.deferred_releases.peek(),
                Some(Reverse(top)) if top.fence_value <= gpu_value
            );
            if !reclaimable {
                break;
            }
            let Reverse(pending) = inner.deferred_releases.pop().expect("peeked entry");

            if pending.page_id == MEGA_PAGE_ID {
                // Dropping the handle frees the dedicated page.
                drop(pending.memory);
                continue;
            }

            if pending.page_id == inner.active_id && inner.active.is_some() {
                let page = inner.active.as_mut().expect("active page exists");
                debug_assert!(page.allocations_count > 0);
                page.allocations_count -= 1;
                continue;
            }

            let fully_reclaimed = {
                let page = inner
                    .used_pages
                    .get_mut(&pending.page_id)
                    .expect("released page is tracked");
                debug_assert!(page.allocations_count > 0);
                page.allocations_count -= 1;
                page.allocations_count == 0
            };
            if fully_reclaimed {
                let mut page = inner
                    .used_pages
                    .remove(&pending.page_id)
                    .expect("page present");
                page.current_offset = 0;
                inner.available_pages.push_back(page);
            }
        }
    }

    fn new_page_memory(&self, size: u64) -> Result<Arc<dyn PageMemory>, AllocError> {
        self.backend
            .create_heap_page(self.kind, size as usize)
            .map_err(|err| match err {
                DeviceError::Alloc(inner) => inner,
                other => AllocError::PageAllocationFailed(other.to_string()),
            })
    }

    /// Installs a fresh active page, recycling an available one when
    /// possible.
    fn obtain_page(&self, inner: &mut HeapInner) -> Result<(), AllocError> {
        let page = match inner.available_pages.pop_front() {
            Some(page) => page,
            None => PageData {
                memory: self.new_page_memory(self.page_size)?,
                current_offset: 0,
                allocations_count: 0,
            },
        };
        inner.active_id = inner.next_page_id;
        inner.next_page_id += 1;
        inner.active = Some(page);
        Ok(())
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
