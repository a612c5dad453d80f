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

//! Headless frame loop over the software backend.
//!
//! Walks the whole device lifecycle: enumerate adapters, create a device,
//! render a handful of frames (clear + blit into a capture target), read the
//! last frame back, resize, and tear down.

use anyhow::{Context, Result};
use ember_core::api::{DeviceDesc, FilterMode, ResourceFormat};
use ember_core::resource::{BindFlags, TextureDesc};
use ember_core::DeviceManager;
use ember_infra::SoftInstance;
use std::sync::Arc;

const FRAMES: u64 = 8;

fn main() -> Result<()> {
    env_logger::init();

    let instance = Arc::new(SoftInstance::new());
    let manager = DeviceManager::new(instance);
    for (id, name) in manager.list_devices() {
        log::info!("adapter {id}: {name}");
    }

    let desc = DeviceDesc {
        color_format: ResourceFormat::RGBA8Unorm,
        depth_format: ResourceFormat::D32Float,
        width: 320,
        height: 180,
        ..DeviceDesc::default()
    };
    let device = manager
        .create_rendering_device(0, &desc)
        .context("creating the rendering device")?;
    log::info!(
        "device {} on '{}'",
        device.uid(),
        device.physical_device_name()
    );

    let capture = device.create_texture(TextureDesc::new_2d(
        320,
        180,
        ResourceFormat::RGBA8Unorm,
        BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
    ))?;

    for frame in 0..FRAMES {
        let ctx = device.render_context();
        let fbo = device.swap_chain_fbo();

        let tint = frame as f32 / FRAMES as f32;
        ctx.clear_fbo(&fbo, [tint, 0.25, 1.0 - tint, 1.0], 1.0, 0)?;

        // Keep a copy of the frame in the capture target; identical
        // descriptors make this a fast-path copy.
        ctx.blit(
            &fbo.color_texture().srv(),
            &capture.rtv(),
            None,
            None,
            FilterMode::Point,
        )?;

        device.present()?;
    }
    log::info!("rendered {FRAMES} frames, frame id {}", device.frame_id());

    let pixels = device
        .render_context()
        .read_texture_subresource(&capture, 0, 0)?;
    let checksum: u64 = pixels.iter().map(|&b| b as u64).sum();
    log::info!("capture checksum over {} bytes: {checksum}", pixels.len());

    let fbo = device.resize_swap_chain(640, 360)?;
    log::info!("resized to {}x{}", fbo.width(), fbo.height());

    device.cleanup()?;
    log::info!("clean shutdown");
    Ok(())
}
