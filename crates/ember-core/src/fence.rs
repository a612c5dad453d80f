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

//! The CPU/GPU progress counter every reclamation decision is based on.

use crate::error::FenceError;
use crate::traits::{CommandQueue, GpuBackend, NativeFence};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A monotonically increasing CPU-to-GPU synchronization counter.
///
/// `cpu_value` is the next value to signal and starts at 1, so the
/// GPU-observed value is always at least one behind any signal still in
/// flight. Resources tagged with the value returned by [`gpu_signal`] are
/// safe to reuse once [`gpu_value`] reaches that tag.
///
/// [`gpu_signal`]: GpuFence::gpu_signal
/// [`gpu_value`]: GpuFence::gpu_value
#[derive(Debug)]
pub struct GpuFence {
    native: Arc<dyn NativeFence>,
    cpu_value: AtomicU64,
}

impl GpuFence {
    /// Creates a new fence on `backend`.
    ///
    /// Every caller unconditionally needs a working fence, so creation
    /// failure is terminal: the error propagates and nothing retries.
    pub fn new(backend: &dyn GpuBackend) -> Result<Self, FenceError> {
        let native = backend.create_fence()?;
        Ok(Self {
            native,
            cpu_value: AtomicU64::new(1),
        })
    }

    /// The next value that will be signaled.
    pub fn cpu_value(&self) -> u64 {
        self.cpu_value.load(Ordering::SeqCst)
    }

    /// The highest value the GPU has completed, polled without blocking.
    pub fn gpu_value(&self) -> u64 {
        self.native.completed_value()
    }

    /// Reserves the current CPU value for a submission and advances the
    /// counter. The caller is responsible for actually signaling the
    /// reserved value on a queue.
    pub(crate) fn begin_signal(&self) -> u64 {
        self.cpu_value.fetch_add(1, Ordering::SeqCst)
    }

    /// Signals the current CPU value on `queue` and advances the counter.
    ///
    /// Returns the value just signaled, so the caller can tag resources
    /// with "the GPU must reach this value before reuse".
    pub fn gpu_signal(&self, queue: &dyn CommandQueue) -> u64 {
        let value = self.begin_signal();
        queue.signal(self.native.as_ref(), value);
        value
    }

    /// Makes `queue` wait, device-side, until the last signaled value has
    /// completed. Does not block the CPU.
    pub fn sync_gpu(&self, queue: &dyn CommandQueue) {
        queue.wait_for_fence(self.native.as_ref(), self.cpu_value() - 1);
    }

    /// Blocks the calling thread until the fence completes `value` (the
    /// last signaled value when `None`). No-op if already satisfied.
    pub fn sync_cpu(&self, value: Option<u64>) -> Result<(), FenceError> {
        let wait_value = value.unwrap_or_else(|| self.cpu_value() - 1);
        if self.native.completed_value() < wait_value {
            self.native.wait_cpu(wait_value)?;
        }
        Ok(())
    }

    /// The native fence, for submission plumbing.
    pub(crate) fn native(&self) -> &dyn NativeFence {
        self.native.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{manual_fence_pair, MockBackend, NullQueue};
    use std::sync::atomic::Ordering;

    #[test]
    fn signal_values_strictly_increase() {
        let backend = MockBackend::new();
        let (fence, _native) = manual_fence_pair(&backend);
        let queue = NullQueue::direct();

        let a = fence.gpu_signal(&queue);
        let b = fence.gpu_signal(&queue);
        let c = fence.gpu_signal(&queue);
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(fence.cpu_value(), 4);
    }

    #[test]
    fn gpu_value_never_exceeds_highest_completed_signal() {
        let backend = MockBackend::new();
        let (fence, native) = manual_fence_pair(&backend);
        let queue = NullQueue::direct();

        fence.gpu_signal(&queue);
        fence.gpu_signal(&queue);

        native.complete_to(1);
        assert_eq!(fence.gpu_value(), 1);
        native.complete_to(2);
        assert_eq!(fence.gpu_value(), 2);
        assert!(fence.gpu_value() <= fence.cpu_value() - 1);
    }

    #[test]
    fn sync_cpu_is_a_noop_when_already_satisfied() {
        let backend = MockBackend::new();
        let (fence, native) = manual_fence_pair(&backend);
        let queue = NullQueue::direct();

        fence.gpu_signal(&queue);
        native.complete_to(1);

        fence.sync_cpu(None).unwrap();
        assert_eq!(native.blocking_waits.load(Ordering::SeqCst), 0);

        // An unsatisfied wait goes through the native blocking path.
        fence.gpu_signal(&queue);
        fence.sync_cpu(None).unwrap();
        assert_eq!(native.blocking_waits.load(Ordering::SeqCst), 1);
    }
}
