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

//! Fixed-count GPU query heaps with a slot free list.

use crate::traits::ApiObjectHandle;
use std::collections::VecDeque;
use std::sync::Mutex;

/// The kind of queries a heap holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// GPU timestamp queries.
    Timestamp,
    /// Occlusion queries.
    Occlusion,
    /// Pipeline statistics queries.
    PipelineStats,
}

/// Returned by [`QueryHeap::allocate`] when no query slot is free.
pub const INVALID_QUERY_INDEX: u32 = u32::MAX;

#[derive(Debug, Default)]
struct QueryHeapState {
    next: u32,
    free: VecDeque<u32>,
}

/// A fixed-count heap of GPU query slots.
#[derive(Debug)]
pub struct QueryHeap {
    handle: ApiObjectHandle,
    ty: QueryType,
    count: u32,
    state: Mutex<QueryHeapState>,
}

impl QueryHeap {
    pub(crate) fn new(handle: ApiObjectHandle, ty: QueryType, count: u32) -> Self {
        Self {
            handle,
            ty,
            count,
            state: Mutex::new(QueryHeapState::default()),
        }
    }

    /// The native heap object.
    pub fn api_handle(&self) -> &ApiObjectHandle {
        &self.handle
    }

    /// The kind of queries in this heap.
    pub fn ty(&self) -> QueryType {
        self.ty
    }

    /// Number of query slots in this heap.
    pub fn query_count(&self) -> u32 {
        self.count
    }

    /// Allocates a query slot, or [`INVALID_QUERY_INDEX`] when the heap is
    /// out of queries.
    pub fn allocate(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.free.pop_front() {
            return slot;
        }
        if state.next < self.count {
            let slot = state.next;
            state.next += 1;
            slot
        } else {
            INVALID_QUERY_INDEX
        }
    }

    /// Returns a query slot to the free list.
    pub fn release(&self, slot: u32) {
        debug_assert!(slot != INVALID_QUERY_INDEX);
        let mut state = self.state.lock().unwrap();
        state.free.push_back(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockResource;
    use std::sync::Arc;

    #[test]
    fn slots_hand_out_then_exhaust_then_recycle() {
        let heap = QueryHeap::new(Arc::new(MockResource), QueryType::Timestamp, 2);
        assert_eq!(heap.allocate(), 0);
        assert_eq!(heap.allocate(), 1);
        assert_eq!(heap.allocate(), INVALID_QUERY_INDEX);

        heap.release(0);
        assert_eq!(heap.allocate(), 0);
    }
}
