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

//! Compute-capable command recording: dispatch and the bounded-retry bind
//! contract.

use crate::api::QueueKind;
use crate::context::copy::CopyContext;
use crate::device::WeakDevice;
use crate::error::{AllocError, DeviceError};
use crate::retry::run_with_exhaustion_retry;
use crate::traits::{CommandQueue, GpuBackend};
use std::ops::Deref;
use std::sync::{Arc, Mutex};

/// Shader resource bindings for a dispatch, supplied by the program layer.
///
/// Shader compilation and reflection are outside this core; whatever module
/// owns them implements this trait over the device's descriptor pools.
pub trait ComputeBindings {
    /// A stable identity for the binding set, used to skip full rebinds
    /// when the same set is applied twice in a row.
    fn binding_id(&self) -> usize;

    /// Binds the set for the next dispatch.
    ///
    /// A [`AllocError::DescriptorPoolExhausted`] return is the retriable
    /// signal the bounded-retry contract acts on; any other error is final.
    fn apply(&mut self, ctx: &ComputeContext, full_rebind: bool) -> Result<(), AllocError>;
}

/// Command recording with compute dispatch on top of [`CopyContext`].
#[derive(Debug)]
pub struct ComputeContext {
    copy: CopyContext,
    last_bound_compute_vars: Mutex<Option<usize>>,
}

impl Deref for ComputeContext {
    type Target = CopyContext;

    fn deref(&self) -> &CopyContext {
        &self.copy
    }
}

impl ComputeContext {
    pub(crate) fn new(
        device: WeakDevice,
        backend: &Arc<dyn GpuBackend>,
        queue_kind: QueueKind,
        queue: Arc<dyn CommandQueue>,
    ) -> Result<Self, DeviceError> {
        Ok(Self {
            copy: CopyContext::new(device, backend, queue_kind, queue)?,
            last_bound_compute_vars: Mutex::new(None),
        })
    }

    /// Submits pending commands, clearing the bound-vars cache so the next
    /// dispatch rebinds everything (the GPU-visible descriptor heap may
    /// have been reset by the submission).
    pub fn flush(&self, wait: bool) -> Result<(), DeviceError> {
        *self.last_bound_compute_vars.lock().unwrap() = None;
        self.copy.flush(wait)
    }

    /// Binds shader resources for a dispatch under the bounded-retry
    /// contract: one exhaustion failure triggers one blocking device flush
    /// (which sweeps deferred releases) and one retry; a second failure is
    /// reported as an error, never a panic: out of descriptor space after
    /// a flush is a pool sizing bug, not a transient condition.
    pub fn apply_compute_vars(
        &self,
        vars: &mut dyn ComputeBindings,
    ) -> Result<(), DeviceError> {
        let id = vars.binding_id();
        let full_rebind = {
            let mut last = self.last_bound_compute_vars.lock().unwrap();
            let changed = *last != Some(id);
            *last = Some(id);
            changed
        };

        run_with_exhaustion_retry(
            || vars.apply(self, full_rebind),
            || self.device_shared()?.flush_and_sync(),
        )
    }

    /// Binds `vars` and records a dispatch of the given thread-group grid.
    ///
    /// Caller contract: every grid dimension is within the backend's
    /// dispatch limit.
    pub fn dispatch(
        &self,
        vars: &mut dyn ComputeBindings,
        groups: [u32; 3],
    ) -> Result<(), DeviceError> {
        let device = self.device_shared()?;
        let max_dim = device.backend().capabilities().max_dispatch_dim;
        assert!(
            groups.iter().all(|&g| g <= max_dim),
            "dispatch dimensions {groups:?} exceed the device limit {max_dim}"
        );

        self.apply_compute_vars(vars)?;
        self.low_level_data().record_compute(|cmd| cmd.dispatch(groups));
        self.set_commands_pending();
        Ok(())
    }
}
