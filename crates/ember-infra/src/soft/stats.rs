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

//! Instrumentation counters over everything the software backend does.
//!
//! All counters use relaxed-free `SeqCst` loads/stores through helper
//! methods; tests read them to verify barrier elision, blit path selection
//! and blocking-wait behavior.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters the software backend increments as it records, submits and
/// executes work.
#[derive(Debug, Default)]
pub struct SoftStats {
    /// State-transition barriers recorded (texture, subresource, buffer).
    pub barriers_recorded: AtomicU64,
    /// UAV hazard barriers recorded.
    pub uav_barriers_recorded: AtomicU64,
    /// Copy commands executed.
    pub copies_executed: AtomicU64,
    /// Clear commands executed.
    pub clears_executed: AtomicU64,
    /// Shader-based blit passes recorded.
    pub blit_passes: AtomicU64,
    /// Shader-based blit-to-buffer passes recorded.
    pub blit_to_buffer_passes: AtomicU64,
    /// Compute dispatches executed.
    pub dispatches: AtomicU64,
    /// Draws executed.
    pub draws: AtomicU64,
    /// Command list submissions.
    pub submissions: AtomicU64,
    /// Fence signals issued by queues.
    pub signals: AtomicU64,
    /// CPU-blocking fence waits.
    pub blocking_waits: AtomicU64,
    /// Frames handed to the presentation engine.
    pub presents: AtomicU64,
    /// Heap pages allocated.
    pub pages_allocated: AtomicU64,
}

impl SoftStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Reads one counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }
}
