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

//! Blit path selection and results over the software backend.

use ember_core::api::{
    DeviceDesc, FilterMode, Rect, ReductionMode, ResourceFormat, IDENTITY_CHANNEL_TRANSFORM,
    STANDARD_REDUCTION,
};
use ember_core::error::{BlitError, DeviceError};
use ember_core::resource::{BindFlags, BufferDesc, CpuAccess, TextureDesc};
use ember_core::{Device, Texture};
use ember_infra::{SoftBackend, SoftStats};
use std::sync::Arc;

fn soft_device() -> (Arc<SoftBackend>, Device) {
    let backend = Arc::new(SoftBackend::new());
    let device = Device::create(
        backend.clone(),
        DeviceDesc {
            width: 32,
            height: 32,
            ..DeviceDesc::default()
        },
    )
    .unwrap();
    (backend, device)
}

fn blit_texture(device: &Device, width: u32, height: u32, format: ResourceFormat) -> Texture {
    device
        .create_texture(TextureDesc::new_2d(
            width,
            height,
            format,
            BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
        ))
        .unwrap()
}

/// One distinct RGBA8 pixel value per texel position.
fn fill_pattern(device: &Device, texture: &Texture) -> Vec<u8> {
    let bytes: Vec<u8> = (0..texture.width(0) * texture.height(0) * 4)
        .map(|i| (i % 251) as u8)
        .collect();
    device
        .render_context()
        .update_texture_subresource(texture, 0, 0, &bytes)
        .unwrap();
    bytes
}

#[test]
fn full_identical_blit_takes_the_copy_fast_path() {
    let (backend, device) = soft_device();
    let src = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);
    let dst = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);
    let pattern = fill_pattern(&device, &src);

    let ctx = device.render_context();
    ctx.blit(&src.srv(), &dst.rtv(), None, None, FilterMode::Point)
        .unwrap();
    ctx.flush(true).unwrap();

    // The shader pass never ran, and the copy is byte-identical.
    assert_eq!(SoftStats::get(&backend.stats().blit_passes), 0);
    let out = ctx.read_texture_subresource(&dst, 0, 0).unwrap();
    assert_eq!(out, pattern);
}

#[test]
fn mismatched_descriptors_fall_back_to_the_shader_path() {
    let (backend, device) = soft_device();
    let src = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);
    let dst = blit_texture(&device, 4, 4, ResourceFormat::RGBA8Unorm);

    let ctx = device.render_context();
    // A solid color survives point downsampling exactly.
    ctx.clear_texture(&src, ember_core::api::ClearValue::Color([0.0, 1.0, 0.0, 1.0]))
        .unwrap();
    ctx.blit(&src.srv(), &dst.rtv(), None, None, FilterMode::Point)
        .unwrap();
    ctx.flush(true).unwrap();

    assert_eq!(SoftStats::get(&backend.stats().blit_passes), 1);
    let out = ctx.read_texture_subresource(&dst, 0, 0).unwrap();
    for pixel in out.chunks_exact(4) {
        assert_eq!(pixel, [0, 255, 0, 255]);
    }
}

#[test]
fn degenerate_rectangle_is_a_silent_no_op() {
    let (backend, device) = soft_device();
    let src = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);
    let dst = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);
    fill_pattern(&device, &src);
    let dst_before = {
        let ctx = device.render_context();
        ctx.clear_texture(&dst, ember_core::api::ClearValue::Color([1.0, 1.0, 1.0, 1.0]))
            .unwrap();
        ctx.flush(true).unwrap();
        ctx.read_texture_subresource(&dst, 0, 0).unwrap()
    };

    let copies_before = SoftStats::get(&backend.stats().copies_executed);
    let ctx = device.render_context();
    ctx.blit(
        &src.srv(),
        &dst.rtv(),
        Some(Rect::new(10, 10, 10, 10)),
        None,
        FilterMode::Point,
    )
    .unwrap();
    ctx.flush(true).unwrap();

    // Destination untouched, no pass and no copy recorded.
    assert_eq!(SoftStats::get(&backend.stats().blit_passes), 0);
    let readbacks = SoftStats::get(&backend.stats().copies_executed) - copies_before;
    let out = ctx.read_texture_subresource(&dst, 0, 0).unwrap();
    assert_eq!(out, dst_before);
    // Only the readback copy itself ran.
    assert_eq!(readbacks, 0);
}

#[test]
fn out_of_bounds_rectangles_clamp_to_the_view() {
    let (backend, device) = soft_device();
    let src = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);
    let dst = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);

    let ctx = device.render_context();
    ctx.clear_texture(&src, ember_core::api::ClearValue::Color([1.0, 0.0, 0.0, 1.0]))
        .unwrap();
    // Rectangles larger than the views clamp down to the full extent; the
    // clamped full-coverage blit is still eligible for the fast path.
    ctx.blit(
        &src.srv(),
        &dst.rtv(),
        Some(Rect::new(0, 0, 100, 100)),
        Some(Rect::new(0, 0, 100, 100)),
        FilterMode::Point,
    )
    .unwrap();
    ctx.flush(true).unwrap();

    assert_eq!(SoftStats::get(&backend.stats().blit_passes), 0);
    let out = ctx.read_texture_subresource(&dst, 0, 0).unwrap();
    assert_eq!(&out[0..4], &[255, 0, 0, 255]);
}

#[test]
fn channel_transform_forces_the_complex_path() {
    let (backend, device) = soft_device();
    let src = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);
    let dst = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);

    // Swap red and green.
    let mut transform = [[0.0f32; 4]; 4];
    transform[0][1] = 1.0;
    transform[1][0] = 1.0;
    transform[2][2] = 1.0;
    transform[3][3] = 1.0;

    let ctx = device.render_context();
    ctx.clear_texture(&src, ember_core::api::ClearValue::Color([1.0, 0.0, 0.0, 1.0]))
        .unwrap();
    ctx.blit_complex(
        &src.srv(),
        &dst.rtv(),
        None,
        None,
        FilterMode::Point,
        STANDARD_REDUCTION,
        transform,
    )
    .unwrap();
    ctx.flush(true).unwrap();

    assert_eq!(SoftStats::get(&backend.stats().blit_passes), 1);
    let out = ctx.read_texture_subresource(&dst, 0, 0).unwrap();
    assert_eq!(&out[0..4], &[0, 255, 0, 255]);
}

#[test]
fn subresource_views_are_rejected_on_the_shader_path() {
    let (_backend, device) = soft_device();
    let mut desc = TextureDesc::new_2d(
        8,
        8,
        ResourceFormat::RGBA8Unorm,
        BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
    );
    desc.mip_levels = 3;
    let src = device.create_texture(desc).unwrap();
    let dst = blit_texture(&device, 4, 4, ResourceFormat::RGBA8Unorm);

    let result = device.render_context().blit(
        &src.srv(),
        &dst.rtv(),
        None,
        None,
        FilterMode::Point,
    );
    assert!(matches!(
        result,
        Err(DeviceError::Blit(BlitError::SubresourceView))
    ));
}

#[test]
fn min_reduction_requests_the_complex_variant() {
    let (backend, device) = soft_device();
    let src = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);
    let dst = blit_texture(&device, 8, 8, ResourceFormat::RGBA8Unorm);

    let reductions = [
        ReductionMode::Min,
        ReductionMode::Standard,
        ReductionMode::Standard,
        ReductionMode::Standard,
    ];
    let ctx = device.render_context();
    ctx.blit_complex(
        &src.srv(),
        &dst.rtv(),
        None,
        None,
        FilterMode::Point,
        reductions,
        IDENTITY_CHANNEL_TRANSFORM,
    )
    .unwrap();
    assert_eq!(SoftStats::get(&backend.stats().blit_passes), 1);
}

#[test]
fn blit_to_buffer_fast_path_linearizes_exactly() {
    let (backend, device) = soft_device();
    let src = device
        .create_texture(TextureDesc::new_2d(
            4,
            2,
            ResourceFormat::RGBA32Float,
            BindFlags::SHADER_RESOURCE,
        ))
        .unwrap();
    let ctx = device.render_context();

    let texels: Vec<f32> = (0..4 * 2 * 4).map(|i| i as f32 * 0.25).collect();
    ctx.update_texture_subresource(&src, 0, 0, bytemuck::cast_slice(&texels))
        .unwrap();

    let buffer = device
        .create_buffer(BufferDesc {
            size: 4 * 2 * 16,
            bind_flags: BindFlags::UNORDERED_ACCESS,
            cpu_access: CpuAccess::None,
        })
        .unwrap();
    ctx.blit_to_buffer(
        &src.srv(),
        &buffer,
        4,
        ResourceFormat::RGBA32Float,
        None,
        None,
        FilterMode::Point,
        STANDARD_REDUCTION,
        IDENTITY_CHANNEL_TRANSFORM,
    )
    .unwrap();
    ctx.flush(true).unwrap();

    assert_eq!(SoftStats::get(&backend.stats().blit_to_buffer_passes), 0);
    let bytes = ctx.read_buffer(&buffer, 0, 4 * 2 * 16).unwrap();
    assert_eq!(bytes, bytemuck::cast_slice::<f32, u8>(&texels).to_vec());
}

#[test]
fn blit_to_buffer_repacks_float_to_half() {
    let (backend, device) = soft_device();
    let src = device
        .create_texture(TextureDesc::new_2d(
            2,
            2,
            ResourceFormat::RGBA32Float,
            BindFlags::SHADER_RESOURCE,
        ))
        .unwrap();
    let ctx = device.render_context();

    // Values that half-precision represents exactly.
    let texels: [f32; 16] = [
        1.0, 0.5, 0.25, 1.0, //
        2.0, 0.5, 0.25, 1.0, //
        -1.0, 0.5, 0.25, 1.0, //
        4.0, 0.5, 0.25, 1.0, //
    ];
    ctx.update_texture_subresource(&src, 0, 0, bytemuck::cast_slice(&texels))
        .unwrap();

    let buffer = device
        .create_buffer(BufferDesc {
            size: 2 * 2 * 8,
            bind_flags: BindFlags::UNORDERED_ACCESS,
            cpu_access: CpuAccess::None,
        })
        .unwrap();
    ctx.blit_to_buffer(
        &src.srv(),
        &buffer,
        2,
        ResourceFormat::RGBA16Float,
        None,
        None,
        FilterMode::Point,
        STANDARD_REDUCTION,
        IDENTITY_CHANNEL_TRANSFORM,
    )
    .unwrap();
    ctx.flush(true).unwrap();

    // The format repack cannot be a plain copy.
    assert_eq!(SoftStats::get(&backend.stats().blit_to_buffer_passes), 1);

    let bytes = ctx.read_buffer(&buffer, 0, 2 * 2 * 8).unwrap();
    let halves: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    // Spot-check the first texel: 1.0, 0.5, 0.25, 1.0 in half bits.
    assert_eq!(halves[0], 0x3c00);
    assert_eq!(halves[1], 0x3800);
    assert_eq!(halves[2], 0x3400);
    assert_eq!(halves[3], 0x3c00);
    // And the sign/scale of later texels.
    assert_eq!(halves[4], 0x4000); // 2.0
    assert_eq!(halves[8], 0xbc00); // -1.0
    assert_eq!(halves[12], 0x4400); // 4.0
}
