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

//! The descriptor-exhaustion retry contract: one blocking flush between the
//! two attempts, then a reported (never panicked) failure.

use ember_core::api::DeviceDesc;
use ember_core::context::{ComputeBindings, ComputeContext};
use ember_core::descriptor::{DescriptorSlot, DescriptorType};
use ember_core::error::{AllocError, DeviceError};
use ember_core::Device;
use ember_infra::{SoftBackend, SoftStats};
use std::sync::Arc;

fn soft_device() -> (Arc<SoftBackend>, Device) {
    let backend = Arc::new(SoftBackend::new());
    let device = Device::create(
        backend.clone(),
        DeviceDesc {
            width: 16,
            height: 16,
            ..DeviceDesc::default()
        },
    )
    .unwrap();
    (backend, device)
}

/// Bindings that fail with descriptor exhaustion a configured number of
/// times before succeeding.
struct FlakyBindings {
    failures_left: u32,
    attempts: u32,
}

impl FlakyBindings {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: times,
            attempts: 0,
        }
    }
}

impl ComputeBindings for FlakyBindings {
    fn binding_id(&self) -> usize {
        1
    }

    fn apply(&mut self, _ctx: &ComputeContext, _full_rebind: bool) -> Result<(), AllocError> {
        self.attempts += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            Err(AllocError::DescriptorPoolExhausted {
                ty: DescriptorType::Sampler,
                capacity: 0,
            })
        } else {
            Ok(())
        }
    }
}

#[test]
fn success_binds_without_flushing() {
    let (backend, device) = soft_device();
    let signals_before = SoftStats::get(&backend.stats().signals);

    let mut vars = FlakyBindings::failing(0);
    device.render_context().apply_compute_vars(&mut vars).unwrap();

    assert_eq!(vars.attempts, 1);
    assert_eq!(SoftStats::get(&backend.stats().signals), signals_before);
}

#[test]
fn one_exhaustion_flushes_once_and_recovers() {
    let (backend, device) = soft_device();
    let signals_before = SoftStats::get(&backend.stats().signals);

    let mut vars = FlakyBindings::failing(1);
    device.render_context().apply_compute_vars(&mut vars).unwrap();

    // Exactly one device flush (one frame-fence signal) between attempts.
    assert_eq!(vars.attempts, 2);
    assert_eq!(SoftStats::get(&backend.stats().signals), signals_before + 1);
}

#[test]
fn second_exhaustion_reports_failure_after_exactly_one_flush() {
    let (backend, device) = soft_device();
    let signals_before = SoftStats::get(&backend.stats().signals);

    let mut vars = FlakyBindings::failing(2);
    let result = device.render_context().apply_compute_vars(&mut vars);

    assert_eq!(vars.attempts, 2);
    assert_eq!(SoftStats::get(&backend.stats().signals), signals_before + 1);
    assert!(matches!(
        result,
        Err(DeviceError::Alloc(AllocError::DescriptorPoolExhausted { .. }))
    ));
}

/// Bindings backed by the real GPU-visible pool: hold slots across frames
/// and release them, so exhaustion genuinely recovers through the flush's
/// deferred-release sweep.
struct SamplerHog {
    attempts: u32,
    slot: Option<DescriptorSlot>,
}

impl ComputeBindings for SamplerHog {
    fn binding_id(&self) -> usize {
        2
    }

    fn apply(&mut self, ctx: &ComputeContext, _full_rebind: bool) -> Result<(), AllocError> {
        self.attempts += 1;
        let device = ctx.device().expect("device alive");
        self.slot = Some(device.gpu_descriptor_pool().allocate(DescriptorType::Sampler)?);
        Ok(())
    }
}

/// Records the `full_rebind` flag of every apply.
struct RebindProbe {
    rebinds: Vec<bool>,
}

impl ComputeBindings for RebindProbe {
    fn binding_id(&self) -> usize {
        3
    }

    fn apply(&mut self, _ctx: &ComputeContext, full_rebind: bool) -> Result<(), AllocError> {
        self.rebinds.push(full_rebind);
        Ok(())
    }
}

#[test]
fn flush_clears_the_bound_vars_cache() {
    let (_backend, device) = soft_device();
    let ctx = device.render_context();
    let mut vars = RebindProbe {
        rebinds: Vec::new(),
    };

    // Same bindings twice: the second apply can skip the full rebind.
    ctx.apply_compute_vars(&mut vars).unwrap();
    ctx.apply_compute_vars(&mut vars).unwrap();
    // A flush may reset the GPU-visible heap, so everything rebinds.
    ctx.flush(false).unwrap();
    ctx.apply_compute_vars(&mut vars).unwrap();

    assert_eq!(vars.rebinds, [true, false, true]);
}

#[test]
fn exhausted_pool_recovers_through_the_flush_sweep() {
    let (_backend, device) = soft_device();
    let pool = device.gpu_descriptor_pool();
    let capacity = pool.capacity(DescriptorType::Sampler);

    // Drain the whole sampler partition, then release every slot. The
    // releases are fence-tagged and not yet reclaimable.
    let slots: Vec<_> = (0..capacity)
        .map(|_| pool.allocate(DescriptorType::Sampler).unwrap())
        .collect();
    for slot in slots {
        pool.release(slot);
    }
    assert!(pool.allocate(DescriptorType::Sampler).is_err());

    // The bind fails once, the device flush sweeps the tagged releases,
    // and the retry succeeds.
    let mut vars = SamplerHog {
        attempts: 0,
        slot: None,
    };
    device.render_context().apply_compute_vars(&mut vars).unwrap();
    assert_eq!(vars.attempts, 2);
    assert!(vars.slot.is_some());
}
