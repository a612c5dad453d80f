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

//! A generic pool of reusable objects recycled on fence progress.
//!
//! Used wherever an object may only be reused after the GPU has finished
//! with it but the object itself is cheap to keep around, most prominently
//! for the command lists the low-level context cycles through on flush.

use crate::error::DeviceError;
use crate::fence::GpuFence;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// A pool holding one active object plus retired objects waiting on their
/// fence values.
///
/// Retiring tags the active object with the fence's current CPU value; the
/// oldest retired object is reused as soon as its tag has been completed,
/// otherwise a fresh object is created. The queue stays sorted by
/// construction because CPU values never decrease.
pub struct FencedPool<T> {
    fence: Arc<GpuFence>,
    create: Box<dyn Fn() -> Result<T, DeviceError> + Send>,
    active: Option<T>,
    retired: VecDeque<(u64, T)>,
}

impl<T> fmt::Debug for FencedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FencedPool")
            .field("retired", &self.retired.len())
            .finish()
    }
}

impl<T> FencedPool<T> {
    /// Creates a pool and its first active object.
    pub fn new(
        fence: Arc<GpuFence>,
        create: Box<dyn Fn() -> Result<T, DeviceError> + Send>,
    ) -> Result<Self, DeviceError> {
        let first = create()?;
        Ok(Self {
            fence,
            create,
            active: Some(first),
            retired: VecDeque::new(),
        })
    }

    /// The object currently checked out.
    pub fn active_mut(&mut self) -> &mut T {
        self.active.as_mut().expect("pool holds an active object")
    }

    /// Retires the active object at the fence's current CPU value and
    /// installs the next one: the oldest retired object if its tag has
    /// completed, a freshly created object otherwise.
    pub fn retire_and_next(&mut self) -> Result<&mut T, DeviceError> {
        let retired = self.active.take().expect("pool holds an active object");
        self.retired.push_back((self.fence.cpu_value(), retired));

        let reusable = matches!(
            self.retired.front(),
            Some((timestamp, _)) if *timestamp <= self.fence.gpu_value()
        );
        let next = if reusable {
            self.retired.pop_front().expect("front entry").1
        } else {
            (self.create)()?
        };
        self.active = Some(next);
        Ok(self.active_mut())
    }

    /// Number of retired objects waiting on their fence values.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{manual_fence_pair, MockBackend, NullQueue};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn objects_are_reused_only_after_their_fence_tag_completes() {
        let backend = MockBackend::new();
        let (fence, native) = manual_fence_pair(&backend);
        let queue = NullQueue::direct();

        let created = Arc::new(AtomicU32::new(0));
        let counter = created.clone();
        let mut pool: FencedPool<u32> = FencedPool::new(
            fence.clone(),
            Box::new(move || Ok(counter.fetch_add(1, Ordering::SeqCst))),
        )
        .unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);

        // Retire at CPU value 1 with nothing completed: a new object.
        pool.retire_and_next().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.retired_len(), 1);

        // Signal and complete; the retired object (tagged 1) comes back.
        fence.gpu_signal(&queue);
        native.complete_to(1);
        let reused = *pool.retire_and_next().unwrap();
        assert_eq!(reused, 0);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
