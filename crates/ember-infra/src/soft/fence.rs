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

//! The software fence.
//!
//! The backend executes commands synchronously at submit, so a real wait
//! can never hang; the configurable lag window holds back signal completion
//! to emulate a GPU running behind the CPU, which is what makes the
//! bounded-frame-lag behavior of `Device::present` observable in tests.

use crate::soft::stats::SoftStats;
use ember_core::error::FenceError;
use ember_core::traits::NativeFence;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct FenceState {
    completed: u64,
    pending: VecDeque<u64>,
}

/// A fence whose completion trails its signals by a configurable number of
/// entries.
#[derive(Debug)]
pub struct SoftFence {
    state: Mutex<FenceState>,
    lag: usize,
    stats: Arc<SoftStats>,
}

impl SoftFence {
    pub(crate) fn new(lag: usize, stats: Arc<SoftStats>) -> Self {
        Self {
            state: Mutex::new(FenceState::default()),
            lag,
            stats,
        }
    }

    /// Queues a signal; completes the oldest pending signals beyond the lag
    /// window.
    pub(crate) fn push_signal(&self, value: u64) {
        let mut state = self.state.lock().unwrap();
        state.pending.push_back(value);
        while state.pending.len() > self.lag {
            let done = state.pending.pop_front().expect("pending entry");
            state.completed = state.completed.max(done);
        }
    }

    /// Completes pending signals until `value` is reached (the emulated GPU
    /// catching up). Returns whether the target was reached.
    pub(crate) fn complete_through(&self, value: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        while state.completed < value {
            match state.pending.pop_front() {
                Some(done) => state.completed = state.completed.max(done),
                None => break,
            }
        }
        state.completed >= value
    }
}

impl NativeFence for SoftFence {
    fn completed_value(&self) -> u64 {
        self.state.lock().unwrap().completed
    }

    fn wait_cpu(&self, value: u64) -> Result<(), FenceError> {
        SoftStats::bump(&self.stats.blocking_waits);
        if self.complete_through(value) {
            Ok(())
        } else {
            Err(FenceError::WaitFailed(format!(
                "no pending signal reaches value {value}"
            )))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
