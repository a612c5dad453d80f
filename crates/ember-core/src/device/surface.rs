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

//! The presentation surface behind the device.
//!
//! One abstraction, two implementations: a swap chain presenting to a
//! window, and an offscreen target for headless rendering. Both expose the
//! same acquire/present-or-noop/resize contract, so the device never
//! branches on a headless flag.

use crate::api::{DeviceDesc, ResourceFormat};
use crate::context::RenderContext;
use crate::device::{Fbo, WeakDevice, SWAP_CHAIN_BUFFER_COUNT};
use crate::error::DeviceError;
use crate::resource::{BindFlags, ResourceState, Texture, TextureDesc};
use crate::traits::{GpuBackend, SwapChain, SwapChainDesc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Captured resource states of one framebuffer, for backends that preserve
/// state across a resize.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FboStates {
    color: ResourceState,
    depth: Option<ResourceState>,
}

/// The presentation surface contract.
pub(crate) trait Surface: Send + Sync + Debug {
    /// Number of rotating framebuffers.
    fn image_count(&self) -> u32;

    /// Index of the framebuffer currently rendered to.
    fn current_index(&self) -> u32;

    /// The framebuffer currently rendered to.
    fn current_fbo(&self) -> Fbo;

    /// Pre-present work: transitions the current back-buffer to the
    /// present state. No-op for offscreen targets.
    fn prepare_present(&self, ctx: &RenderContext) -> Result<(), DeviceError>;

    /// Hands the frame to the presentation engine and acquires the next
    /// image. No-op for offscreen targets.
    fn present_and_acquire(&self) -> Result<(), DeviceError>;

    /// Rebuilds the framebuffers at a new size. The old attachments are
    /// funneled through the deferred-release queue by their drops.
    fn resize(&self, width: u32, height: u32) -> Result<(), DeviceError>;

    /// Captures per-framebuffer resource states before a resize.
    fn capture_states(&self) -> Vec<FboStates>;

    /// Restores per-framebuffer resource states after a resize.
    fn restore_states(&self, states: &[FboStates]);

    /// Toggles vertical sync, where presentation supports it.
    fn set_vsync(&self, enabled: bool);
}

fn make_color_texture(
    device: &WeakDevice,
    backend: &Arc<dyn GpuBackend>,
    width: u32,
    height: u32,
    format: ResourceFormat,
) -> Result<Texture, DeviceError> {
    let desc = TextureDesc::new_2d(
        width,
        height,
        format,
        BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
    );
    let handle = backend.create_texture(&desc)?;
    Ok(Texture::from_parts(device.clone(), handle, desc))
}

fn make_depth_texture(
    device: &WeakDevice,
    backend: &Arc<dyn GpuBackend>,
    width: u32,
    height: u32,
    format: ResourceFormat,
) -> Result<Option<Texture>, DeviceError> {
    if format == ResourceFormat::Unknown {
        return Ok(None);
    }
    let desc = TextureDesc::new_2d(width, height, format, BindFlags::DEPTH_STENCIL);
    let handle = backend.create_texture(&desc)?;
    Ok(Some(Texture::from_parts(device.clone(), handle, desc)))
}

fn capture_fbo_states(fbos: &[Fbo]) -> Vec<FboStates> {
    fbos.iter()
        .map(|fbo| FboStates {
            color: fbo.color_texture().global_state(),
            depth: fbo.depth_stencil_texture().map(Texture::global_state),
        })
        .collect()
}

fn restore_fbo_states(fbos: &[Fbo], states: &[FboStates]) {
    for (fbo, saved) in fbos.iter().zip(states) {
        fbo.color_texture().set_global_state(saved.color);
        if let (Some(depth), Some(state)) = (fbo.depth_stencil_texture(), saved.depth) {
            depth.set_global_state(state);
        }
    }
}

/// A window-backed surface rotating through swap-chain images.
#[derive(Debug)]
pub(crate) struct SwapChainSurface {
    device: WeakDevice,
    backend: Arc<dyn GpuBackend>,
    swap_chain: Box<dyn SwapChain>,
    fbos: Mutex<Vec<Fbo>>,
    current: AtomicU32,
    color_format: ResourceFormat,
    depth_format: ResourceFormat,
}

impl SwapChainSurface {
    pub(crate) fn new(
        device: WeakDevice,
        backend: &Arc<dyn GpuBackend>,
        desc: &DeviceDesc,
    ) -> Result<Self, DeviceError> {
        let swap_chain = backend.create_swap_chain(&SwapChainDesc {
            width: desc.width,
            height: desc.height,
            format: desc.color_format,
            image_count: SWAP_CHAIN_BUFFER_COUNT,
            vsync: desc.enable_vsync,
        })?;

        let fbos = Self::build_fbos(
            &device,
            backend,
            swap_chain.as_ref(),
            desc.width,
            desc.height,
            desc.color_format,
            desc.depth_format,
        )?;
        let current = swap_chain.acquire_next_image()?;

        Ok(Self {
            device,
            backend: backend.clone(),
            swap_chain,
            fbos: Mutex::new(fbos),
            current: AtomicU32::new(current),
            color_format: desc.color_format,
            depth_format: desc.depth_format,
        })
    }

    fn build_fbos(
        device: &WeakDevice,
        backend: &Arc<dyn GpuBackend>,
        swap_chain: &dyn SwapChain,
        width: u32,
        height: u32,
        color_format: ResourceFormat,
        depth_format: ResourceFormat,
    ) -> Result<Vec<Fbo>, DeviceError> {
        let mut fbos = Vec::with_capacity(swap_chain.image_count() as usize);
        for index in 0..swap_chain.image_count() {
            let color_desc = TextureDesc::new_2d(
                width,
                height,
                color_format,
                BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
            );
            let color = Texture::from_parts(device.clone(), swap_chain.image(index), color_desc);
            let depth = make_depth_texture(device, backend, width, height, depth_format)?;
            fbos.push(Fbo::new(color, depth, width, height));
        }
        Ok(fbos)
    }
}

impl Surface for SwapChainSurface {
    fn image_count(&self) -> u32 {
        self.swap_chain.image_count()
    }

    fn current_index(&self) -> u32 {
        self.current.load(Ordering::SeqCst)
    }

    fn current_fbo(&self) -> Fbo {
        let fbos = self.fbos.lock().unwrap();
        fbos[self.current_index() as usize].clone()
    }

    fn prepare_present(&self, ctx: &RenderContext) -> Result<(), DeviceError> {
        let fbo = self.current_fbo();
        ctx.texture_barrier(fbo.color_texture(), ResourceState::Present);
        Ok(())
    }

    fn present_and_acquire(&self) -> Result<(), DeviceError> {
        self.swap_chain.present()?;
        let next = self.swap_chain.acquire_next_image()?;
        self.current.store(next, Ordering::SeqCst);
        Ok(())
    }

    fn resize(&self, width: u32, height: u32) -> Result<(), DeviceError> {
        let mut fbos = self.fbos.lock().unwrap();
        // Old attachments drop here; their handles go through the
        // deferred-release queue.
        fbos.clear();
        self.swap_chain.resize(width, height)?;
        *fbos = Self::build_fbos(
            &self.device,
            &self.backend,
            self.swap_chain.as_ref(),
            width,
            height,
            self.color_format,
            self.depth_format,
        )?;
        drop(fbos);
        let next = self.swap_chain.acquire_next_image()?;
        self.current.store(next, Ordering::SeqCst);
        Ok(())
    }

    fn capture_states(&self) -> Vec<FboStates> {
        capture_fbo_states(&self.fbos.lock().unwrap())
    }

    fn restore_states(&self, states: &[FboStates]) {
        restore_fbo_states(&self.fbos.lock().unwrap(), states);
    }

    fn set_vsync(&self, enabled: bool) {
        self.swap_chain.set_vsync(enabled);
    }
}

/// A headless surface rendering into one offscreen framebuffer.
#[derive(Debug)]
pub(crate) struct OffscreenSurface {
    device: WeakDevice,
    backend: Arc<dyn GpuBackend>,
    fbo: Mutex<Fbo>,
    color_format: ResourceFormat,
    depth_format: ResourceFormat,
}

impl OffscreenSurface {
    pub(crate) fn new(
        device: WeakDevice,
        backend: &Arc<dyn GpuBackend>,
        desc: &DeviceDesc,
    ) -> Result<Self, DeviceError> {
        let fbo = Self::build_fbo(
            &device,
            backend,
            desc.width,
            desc.height,
            desc.color_format,
            desc.depth_format,
        )?;
        Ok(Self {
            device,
            backend: backend.clone(),
            fbo: Mutex::new(fbo),
            color_format: desc.color_format,
            depth_format: desc.depth_format,
        })
    }

    fn build_fbo(
        device: &WeakDevice,
        backend: &Arc<dyn GpuBackend>,
        width: u32,
        height: u32,
        color_format: ResourceFormat,
        depth_format: ResourceFormat,
    ) -> Result<Fbo, DeviceError> {
        let color = make_color_texture(device, backend, width, height, color_format)?;
        let depth = make_depth_texture(device, backend, width, height, depth_format)?;
        Ok(Fbo::new(color, depth, width, height))
    }
}

impl Surface for OffscreenSurface {
    fn image_count(&self) -> u32 {
        1
    }

    fn current_index(&self) -> u32 {
        0
    }

    fn current_fbo(&self) -> Fbo {
        self.fbo.lock().unwrap().clone()
    }

    fn prepare_present(&self, _ctx: &RenderContext) -> Result<(), DeviceError> {
        Ok(())
    }

    fn present_and_acquire(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn resize(&self, width: u32, height: u32) -> Result<(), DeviceError> {
        let rebuilt = Self::build_fbo(
            &self.device,
            &self.backend,
            width,
            height,
            self.color_format,
            self.depth_format,
        )?;
        // The old framebuffer drops here and releases through the queue.
        *self.fbo.lock().unwrap() = rebuilt;
        Ok(())
    }

    fn capture_states(&self) -> Vec<FboStates> {
        capture_fbo_states(std::slice::from_ref(&*self.fbo.lock().unwrap()))
    }

    fn restore_states(&self, states: &[FboStates]) {
        restore_fbo_states(std::slice::from_ref(&*self.fbo.lock().unwrap()), states);
    }

    fn set_vsync(&self, _enabled: bool) {}
}
