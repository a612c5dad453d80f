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

//! Device lifecycle over the software backend: creation, the present loop
//! with its bounded CPU lead, deferred resource release, resize and
//! cleanup.

use ember_core::api::{DeviceDesc, ResourceFormat};
use ember_core::resource::{BindFlags, BufferDesc, CpuAccess, ResourceState, TextureDesc};
use ember_core::{Device, DeviceManager, SWAP_CHAIN_BUFFER_COUNT};
use ember_infra::{SoftBackend, SoftInstance, SoftStats};
use std::sync::Arc;

fn headless_desc() -> DeviceDesc {
    DeviceDesc {
        width: 64,
        height: 32,
        ..DeviceDesc::default()
    }
}

fn soft_device(lag: usize) -> (Arc<SoftBackend>, Device) {
    let backend = Arc::new(SoftBackend::with_lag(lag));
    let device = Device::create(backend.clone(), headless_desc()).unwrap();
    (backend, device)
}

#[test]
fn creation_initializes_and_flushes_once() {
    let (backend, device) = soft_device(0);
    assert_eq!(device.frame_id(), 0);
    assert!(!device.is_windowed());
    assert_eq!(device.current_back_buffer_index(), 0);
    // Init performs one blocking flush: the frame fence has been signaled
    // and completed once.
    assert_eq!(SoftStats::get(&backend.stats().signals), 1);
    assert_eq!(device.frame_fence().gpu_value(), 1);
}

#[test]
fn present_advances_the_frame_counter_headlessly() {
    let (_backend, device) = soft_device(0);
    for expected in 0..4 {
        assert_eq!(device.frame_id(), expected);
        device.present().unwrap();
    }
    assert_eq!(device.frame_id(), 4);
}

#[test]
fn present_never_blocks_when_the_gpu_keeps_up() {
    let (backend, device) = soft_device(0);
    for _ in 0..12 {
        device.present().unwrap();
    }
    assert_eq!(SoftStats::get(&backend.stats().blocking_waits), 0);
}

#[test]
fn present_bounds_the_cpu_lead_over_a_lagging_gpu() {
    let (backend, device) = soft_device(16);
    let presents = SWAP_CHAIN_BUFFER_COUNT + 3;
    for _ in 0..presents {
        device.present().unwrap();
    }
    // The CPU must have blocked inside present at least once, and the lead
    // stays bounded by the swap-chain depth.
    assert!(SoftStats::get(&backend.stats().blocking_waits) >= 1);
    let fence = device.frame_fence();
    assert!(fence.cpu_value() - fence.gpu_value() <= SWAP_CHAIN_BUFFER_COUNT as u64 + 1);
}

#[test]
fn dropped_resources_release_only_after_the_fence_passes() {
    let (_backend, device) = soft_device(0);
    let texture = device
        .create_texture(TextureDesc::new_2d(
            16,
            16,
            ResourceFormat::RGBA8Unorm,
            BindFlags::SHADER_RESOURCE,
        ))
        .unwrap();
    let native = Arc::downgrade(texture.api_handle());

    drop(texture);
    // The native object sits in the deferred-release queue, still alive.
    assert!(native.upgrade().is_some());

    device.flush_and_sync().unwrap();
    assert!(native.upgrade().is_none());
}

#[test]
fn redundant_barriers_are_elided() {
    let (backend, device) = soft_device(0);
    let texture = device
        .create_texture(TextureDesc::new_2d(
            8,
            8,
            ResourceFormat::RGBA8Unorm,
            BindFlags::SHADER_RESOURCE,
        ))
        .unwrap();
    let ctx = device.render_context();
    let before = SoftStats::get(&backend.stats().barriers_recorded);

    assert!(ctx.texture_barrier(&texture, ResourceState::ShaderResource));
    assert!(!ctx.texture_barrier(&texture, ResourceState::ShaderResource));
    assert!(!ctx.texture_barrier(&texture, ResourceState::ShaderResource));
    assert_eq!(SoftStats::get(&backend.stats().barriers_recorded), before + 1);

    assert!(ctx.texture_barrier(&texture, ResourceState::CopySource));
    assert_eq!(SoftStats::get(&backend.stats().barriers_recorded), before + 2);
}

#[test]
fn buffer_update_and_readback_round_trip() {
    let (_backend, device) = soft_device(0);
    let buffer = device
        .create_buffer(BufferDesc {
            size: 256,
            bind_flags: BindFlags::NONE,
            cpu_access: CpuAccess::None,
        })
        .unwrap();
    let ctx = device.render_context();

    let data: Vec<u8> = (0..64u8).collect();
    ctx.update_buffer(&buffer, &data, 16).unwrap();
    let read = ctx.read_buffer(&buffer, 16, 64).unwrap();
    assert_eq!(read, data);
}

#[test]
fn clear_and_texture_readback_round_trip() {
    let (_backend, device) = soft_device(0);
    let fbo = device.swap_chain_fbo();
    let ctx = device.render_context();

    ctx.clear_fbo(&fbo, [1.0, 0.0, 0.0, 1.0], 1.0, 0).unwrap();
    let pixels = ctx
        .read_texture_subresource(fbo.color_texture(), 0, 0)
        .unwrap();
    // Default color format is BGRA: red lands in the third byte.
    assert_eq!(&pixels[0..4], &[0, 0, 255, 255]);
    assert_eq!(pixels.len(), 64 * 32 * 4);
}

#[test]
fn offscreen_resize_rebuilds_the_framebuffer() {
    let (_backend, device) = soft_device(0);
    let old_fbo = device.swap_chain_fbo();
    assert_eq!((old_fbo.width(), old_fbo.height()), (64, 32));

    let new_fbo = device.resize_swap_chain(128, 96).unwrap();
    assert_eq!((new_fbo.width(), new_fbo.height()), (128, 96));
    assert!(!Arc::ptr_eq(
        old_fbo.color_texture().api_handle(),
        new_fbo.color_texture().api_handle()
    ));
}

#[test]
fn windowed_resize_resets_state_without_the_capability() {
    let instance = SoftInstance::new();
    let desc = DeviceDesc {
        windowed: true,
        ..headless_desc()
    };
    let backend = ember_core::traits::GpuInstance::create_backend(&instance, 0, &desc).unwrap();
    let device = Device::create(backend, desc).unwrap();

    let ctx = device.render_context();
    let fbo = device.swap_chain_fbo();
    ctx.texture_barrier(fbo.color_texture(), ResourceState::ShaderResource);

    device.resize_swap_chain(80, 60).unwrap();
    let rebuilt = device.swap_chain_fbo();
    assert_eq!(rebuilt.color_texture().global_state(), ResourceState::Undefined);
}

#[test]
fn windowed_resize_restores_state_with_the_capability() {
    let instance = SoftInstance::new().with_state_preserving_resize(true);
    let desc = DeviceDesc {
        windowed: true,
        ..headless_desc()
    };
    let backend = ember_core::traits::GpuInstance::create_backend(&instance, 0, &desc).unwrap();
    let device = Device::create(backend, desc).unwrap();

    let ctx = device.render_context();
    let fbo = device.swap_chain_fbo();
    ctx.texture_barrier(fbo.color_texture(), ResourceState::ShaderResource);

    device.resize_swap_chain(80, 60).unwrap();
    let rebuilt = device.swap_chain_fbo();
    assert_eq!(
        rebuilt.color_texture().global_state(),
        ResourceState::ShaderResource
    );
}

#[test]
fn manager_enumerates_and_caches_soft_devices() {
    let manager = DeviceManager::new(Arc::new(SoftInstance::new().with_adapter_count(2)));
    let listed = manager.list_devices();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[&0], "Ember Soft Adapter 0");

    let desc = headless_desc();
    let first = manager.create_rendering_device(0, &desc).unwrap();
    let again = manager.create_rendering_device(0, &desc).unwrap();
    assert!(first.is_same(&again));
    assert!(manager.create_rendering_device(9, &desc).is_err());
}

#[test]
fn cleanup_drains_everything_and_is_idempotent() {
    let (_backend, device) = soft_device(4);
    let texture = device
        .create_texture(TextureDesc::new_2d(
            8,
            8,
            ResourceFormat::RGBA8Unorm,
            BindFlags::SHADER_RESOURCE,
        ))
        .unwrap();
    let native = Arc::downgrade(texture.api_handle());
    drop(texture);

    device.present().unwrap();
    device.cleanup().unwrap();
    assert!(native.upgrade().is_none());
    device.cleanup().unwrap();
}

#[test]
fn unsatisfiable_api_version_fails_creation() {
    let backend = Arc::new(SoftBackend::new());
    let desc = DeviceDesc {
        api_version: Some((9, 9)),
        ..headless_desc()
    };
    let err = Device::create(backend, desc).unwrap_err();
    assert!(matches!(
        err,
        ember_core::DeviceError::UnsupportedApiVersion { major: 9, minor: 9 }
    ));
}

#[test]
fn missing_direct_queue_fails_creation() {
    let backend = Arc::new(SoftBackend::new());
    let desc = DeviceDesc {
        cmd_queues: [1, 1, 0],
        ..headless_desc()
    };
    let err = Device::create(backend, desc).unwrap_err();
    assert!(matches!(err, ember_core::DeviceError::MissingDirectQueue));
}

#[test]
fn vsync_toggle_round_trips() {
    let (_backend, device) = soft_device(0);
    assert!(!device.is_vsync_enabled());
    device.toggle_vsync(true);
    assert!(device.is_vsync_enabled());
}
