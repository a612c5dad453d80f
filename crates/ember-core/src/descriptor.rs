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

//! Fixed-capacity descriptor slot pools with deferred release.
//!
//! Slots of different types are not interchangeable, so each type keeps its
//! own bump cursor, free list and deferred-release queue. The pool applies
//! the same fence discipline as the memory heap: a released slot only
//! becomes allocatable again once the fence value tagged at release time has
//! been completed.

use crate::error::AllocError;
use crate::fence::GpuFence;
use crate::traits::{DescriptorArena, GpuBackend};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex};

/// The kind of resource binding a descriptor slot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum DescriptorType {
    /// Texture shader-resource view.
    TextureSrv = 0,
    /// Texture unordered-access view.
    TextureUav,
    /// Raw buffer shader-resource view.
    RawBufferSrv,
    /// Raw buffer unordered-access view.
    RawBufferUav,
    /// Typed buffer shader-resource view.
    TypedBufferSrv,
    /// Typed buffer unordered-access view.
    TypedBufferUav,
    /// Structured buffer shader-resource view.
    StructuredBufferSrv,
    /// Structured buffer unordered-access view.
    StructuredBufferUav,
    /// Constant buffer view.
    Cbv,
    /// Sampler.
    Sampler,
    /// Render target view.
    Rtv,
    /// Depth-stencil view.
    Dsv,
    /// Acceleration structure shader-resource view.
    AccelerationStructureSrv,
}

/// Number of [`DescriptorType`] variants.
pub const DESCRIPTOR_TYPE_COUNT: usize = 13;

impl DescriptorType {
    /// All descriptor types, in index order.
    pub const ALL: [DescriptorType; DESCRIPTOR_TYPE_COUNT] = [
        DescriptorType::TextureSrv,
        DescriptorType::TextureUav,
        DescriptorType::RawBufferSrv,
        DescriptorType::RawBufferUav,
        DescriptorType::TypedBufferSrv,
        DescriptorType::TypedBufferUav,
        DescriptorType::StructuredBufferSrv,
        DescriptorType::StructuredBufferUav,
        DescriptorType::Cbv,
        DescriptorType::Sampler,
        DescriptorType::Rtv,
        DescriptorType::Dsv,
        DescriptorType::AccelerationStructureSrv,
    ];

    /// The array index backing this type.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Which processors can read descriptors out of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVisibility {
    /// Staging pool, CPU-writable only.
    CpuOnly,
    /// Shader-visible pool bound for GPU access.
    GpuVisible,
}

/// Per-type slot capacities for one pool.
#[derive(Debug, Clone, Default)]
pub struct DescriptorPoolDesc {
    capacities: [u32; DESCRIPTOR_TYPE_COUNT],
}

impl DescriptorPoolDesc {
    /// An empty capacity table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity for one descriptor type.
    pub fn set_capacity(mut self, ty: DescriptorType, count: u32) -> Self {
        self.capacities[ty.index()] = count;
        self
    }

    /// The configured capacity for `ty`.
    pub fn capacity(&self, ty: DescriptorType) -> u32 {
        self.capacities[ty.index()]
    }

    /// Total slot count across all types.
    pub fn total_capacity(&self) -> u64 {
        self.capacities.iter().map(|&c| c as u64).sum()
    }
}

/// One allocated descriptor slot.
///
/// Move-only: ownership returns to the pool through
/// [`DescriptorPool::release`].
#[derive(Debug)]
pub struct DescriptorSlot {
    ty: DescriptorType,
    index: u32,
    arena: Arc<dyn DescriptorArena>,
}

impl DescriptorSlot {
    /// The descriptor type of this slot.
    pub fn ty(&self) -> DescriptorType {
        self.ty
    }

    /// The slot index within its type partition.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The native arena the slot lives in.
    pub fn arena(&self) -> &Arc<dyn DescriptorArena> {
        &self.arena
    }
}

#[derive(Debug)]
struct PendingSlot {
    fence_value: u64,
    index: u32,
}

impl PartialEq for PendingSlot {
    fn eq(&self, other: &Self) -> bool {
        self.fence_value == other.fence_value
    }
}

impl Eq for PendingSlot {}

impl PartialOrd for PendingSlot {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingSlot {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fence_value.cmp(&other.fence_value)
    }
}

#[derive(Debug, Default)]
struct TypeState {
    cursor: u32,
    free: VecDeque<u32>,
    deferred: BinaryHeap<Reverse<PendingSlot>>,
}

/// A fixed-capacity arena of descriptor slots, partitioned by type.
#[derive(Debug)]
pub struct DescriptorPool {
    visibility: ShaderVisibility,
    desc: DescriptorPoolDesc,
    arena: Arc<dyn DescriptorArena>,
    fence: Arc<GpuFence>,
    types: Mutex<Vec<TypeState>>,
}

impl DescriptorPool {
    /// Creates a pool with the given capacities, backed by native storage
    /// from `backend` and synchronized by `fence`.
    pub fn new(
        backend: &dyn GpuBackend,
        visibility: ShaderVisibility,
        desc: DescriptorPoolDesc,
        fence: Arc<GpuFence>,
    ) -> Result<Self, crate::error::DeviceError> {
        let arena = backend.create_descriptor_arena(visibility, &desc)?;
        let mut types = Vec::with_capacity(DESCRIPTOR_TYPE_COUNT);
        types.resize_with(DESCRIPTOR_TYPE_COUNT, TypeState::default);
        Ok(Self {
            visibility,
            desc,
            arena,
            fence,
            types: Mutex::new(types),
        })
    }

    /// The visibility tier of this pool.
    pub fn visibility(&self) -> ShaderVisibility {
        self.visibility
    }

    /// The configured capacity for `ty`.
    pub fn capacity(&self, ty: DescriptorType) -> u32 {
        self.desc.capacity(ty)
    }

    /// Allocates one slot of the given type.
    ///
    /// Exhaustion is retriable exactly once after a blocking flush (the
    /// sweep may recycle slots whose fence tags the GPU has passed); see
    /// [`crate::retry::run_with_exhaustion_retry`]. A second failure is a
    /// pool sizing bug.
    pub fn allocate(&self, ty: DescriptorType) -> Result<DescriptorSlot, AllocError> {
        let capacity = self.desc.capacity(ty);
        let mut types = self.types.lock().unwrap();
        let state = &mut types[ty.index()];

        let index = if let Some(index) = state.free.pop_front() {
            index
        } else if state.cursor < capacity {
            let index = state.cursor;
            state.cursor += 1;
            index
        } else {
            return Err(AllocError::DescriptorPoolExhausted { ty, capacity });
        };

        Ok(DescriptorSlot {
            ty,
            index,
            arena: self.arena.clone(),
        })
    }

    /// Queues `slot` for recycling once the fence's current CPU value has
    /// been completed by the GPU.
    pub fn release(&self, slot: DescriptorSlot) {
        let fence_value = self.fence.cpu_value();
        let mut types = self.types.lock().unwrap();
        types[slot.ty.index()].deferred.push(Reverse(PendingSlot {
            fence_value,
            index: slot.index,
        }));
    }

    /// Moves every queued slot whose fence tag has completed back to its
    /// type's free list.
    pub fn execute_deferred_releases(&self) {
        let gpu_value = self.fence.gpu_value();
        let mut types = self.types.lock().unwrap();
        for state in types.iter_mut() {
            loop {
                let reclaimable = matches!(
                    state.deferred.peek(),
                    Some(Reverse(top)) if top.fence_value <= gpu_value
                );
                if !reclaimable {
                    break;
                }
                let Reverse(pending) = state.deferred.pop().expect("peeked entry");
                state.free.push_back(pending.index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{manual_fence_pair, MockBackend};

    fn small_pool(capacity: u32) -> (DescriptorPool, Arc<crate::testing::ManualFence>) {
        let backend = MockBackend::new();
        let (fence, native) = manual_fence_pair(&backend);
        let desc = DescriptorPoolDesc::new()
            .set_capacity(DescriptorType::TextureSrv, capacity)
            .set_capacity(DescriptorType::Sampler, 2);
        let pool = DescriptorPool::new(&backend, ShaderVisibility::GpuVisible, desc, fence).unwrap();
        (pool, native)
    }

    #[test]
    fn typed_partitions_are_independent() {
        let (pool, _native) = small_pool(4);

        let srv = pool.allocate(DescriptorType::TextureSrv).unwrap();
        let sampler = pool.allocate(DescriptorType::Sampler).unwrap();
        assert_eq!(srv.index(), 0);
        assert_eq!(sampler.index(), 0);
        assert_eq!(srv.ty(), DescriptorType::TextureSrv);
    }

    #[test]
    fn exhaustion_reports_the_type_and_capacity() {
        let (pool, _native) = small_pool(1);

        let _held = pool.allocate(DescriptorType::TextureSrv).unwrap();
        let err = pool.allocate(DescriptorType::TextureSrv).unwrap_err();
        match err {
            AllocError::DescriptorPoolExhausted { ty, capacity } => {
                assert_eq!(ty, DescriptorType::TextureSrv);
                assert_eq!(capacity, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_exhaustion());
    }

    #[test]
    fn released_slots_recycle_only_after_the_fence_passes() {
        let (pool, native) = small_pool(1);

        let slot = pool.allocate(DescriptorType::TextureSrv).unwrap();
        pool.release(slot);

        // Tagged with CPU value 1; the GPU has not reached it.
        pool.execute_deferred_releases();
        assert!(pool.allocate(DescriptorType::TextureSrv).is_err());

        native.complete_to(1);
        pool.execute_deferred_releases();
        let again = pool.allocate(DescriptorType::TextureSrv).unwrap();
        assert_eq!(again.index(), 0);
    }

    #[test]
    fn zero_capacity_type_always_exhausts() {
        let (pool, _native) = small_pool(1);
        assert!(pool.allocate(DescriptorType::Cbv).is_err());
    }
}
