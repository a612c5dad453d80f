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

//! The software command queue: executes at submit, signals with lag.

use crate::soft::command::{execute_commands, SoftCommandList};
use crate::soft::fence::SoftFence;
use crate::soft::stats::SoftStats;
use ember_core::api::QueueKind;
use ember_core::error::DeviceError;
use ember_core::traits::{CommandList, CommandQueue, NativeFence};
use std::sync::Arc;

/// A queue that interprets command lists synchronously on submission.
///
/// Submission order is execution order, which trivially satisfies the
/// cross-buffer ordering guarantee.
#[derive(Debug)]
pub struct SoftQueue {
    kind: QueueKind,
    stats: Arc<SoftStats>,
}

impl SoftQueue {
    pub(crate) fn new(kind: QueueKind, stats: Arc<SoftStats>) -> Self {
        Self { kind, stats }
    }

    fn soft_fence<'a>(&self, fence: &'a dyn NativeFence) -> Option<&'a SoftFence> {
        fence.as_any().downcast_ref::<SoftFence>()
    }
}

impl CommandQueue for SoftQueue {
    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn submit(
        &self,
        list: &mut dyn CommandList,
        fence: &dyn NativeFence,
        signal_value: u64,
    ) -> Result<(), DeviceError> {
        SoftStats::bump(&self.stats.submissions);
        let soft_list = list
            .as_any_mut()
            .downcast_mut::<SoftCommandList>()
            .ok_or_else(|| {
                DeviceError::Internal("submitted command list is not a software list".to_string())
            })?;
        let commands = soft_list.take_commands();
        execute_commands(commands, &self.stats)?;
        self.signal(fence, signal_value);
        Ok(())
    }

    fn signal(&self, fence: &dyn NativeFence, value: u64) {
        SoftStats::bump(&self.stats.signals);
        if let Some(soft) = self.soft_fence(fence) {
            soft.push_signal(value);
        }
    }

    fn wait_for_fence(&self, fence: &dyn NativeFence, value: u64) {
        // A device-side wait lets the emulated GPU catch up to the value.
        if let Some(soft) = self.soft_fence(fence) {
            soft.complete_through(value);
        }
    }
}
