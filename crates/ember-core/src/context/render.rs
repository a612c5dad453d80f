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

//! The full graphics-capable recording layer: clears, draws and blits.

use crate::api::{ClearValue, QueueKind};
use crate::context::compute::ComputeContext;
use crate::device::{Fbo, WeakDevice};
use crate::error::DeviceError;
use crate::resource::{ResourceState, Texture};
use crate::traits::{CommandQueue, GpuBackend};
use std::ops::Deref;
use std::sync::{Arc, Mutex};

/// The top recording layer, adding graphics verbs on top of
/// [`ComputeContext`].
///
/// The device owns one default `RenderContext`; render passes record into it
/// and the device flushes it on present.
#[derive(Debug)]
pub struct RenderContext {
    compute: ComputeContext,
    last_bound_graphics_vars: Mutex<Option<usize>>,
}

impl Deref for RenderContext {
    type Target = ComputeContext;

    fn deref(&self) -> &ComputeContext {
        &self.compute
    }
}

impl RenderContext {
    pub(crate) fn new(
        device: WeakDevice,
        backend: &Arc<dyn GpuBackend>,
        queue_kind: QueueKind,
        queue: Arc<dyn CommandQueue>,
    ) -> Result<Self, DeviceError> {
        Ok(Self {
            compute: ComputeContext::new(device, backend, queue_kind, queue)?,
            last_bound_graphics_vars: Mutex::new(None),
        })
    }

    /// Submits pending commands, additionally clearing the graphics
    /// bound-vars cache so the next draw rebinds everything.
    pub fn flush(&self, wait: bool) -> Result<(), DeviceError> {
        *self.last_bound_graphics_vars.lock().unwrap() = None;
        self.compute.flush(wait)
    }

    /// Clears every attachment of `fbo`: the color target with `color`,
    /// and the depth target (when present) with `depth`/`stencil`.
    pub fn clear_fbo(
        &self,
        fbo: &Fbo,
        color: [f32; 4],
        depth: f32,
        stencil: u8,
    ) -> Result<(), DeviceError> {
        self.clear_texture(fbo.color_texture(), ClearValue::Color(color))?;
        if let Some(depth_texture) = fbo.depth_stencil_texture() {
            self.clear_texture(depth_texture, ClearValue::DepthStencil { depth, stencil })?;
        }
        Ok(())
    }

    /// Clears a whole texture to `value`.
    pub fn clear_texture(&self, texture: &Texture, value: ClearValue) -> Result<(), DeviceError> {
        let is_depth = texture.format().is_depth();
        match value {
            ClearValue::Color(_) if is_depth => {
                return Err(DeviceError::Unsupported(
                    "color clear requested on a depth texture".to_string(),
                ))
            }
            ClearValue::DepthStencil { .. } if !is_depth => {
                return Err(DeviceError::Unsupported(
                    "depth clear requested on a color texture".to_string(),
                ))
            }
            _ => {}
        }

        self.texture_barrier(texture, ResourceState::CopyDest);
        self.low_level_data()
            .record_resource(|cmd| cmd.clear_texture(texture.api_handle(), &value));
        self.set_commands_pending();
        Ok(())
    }

    /// Records a non-indexed draw targeting `fbo`.
    ///
    /// Consecutive draws into the same framebuffer reuse the open render
    /// encoder.
    pub fn draw(&self, fbo: &Fbo, vertex_count: u32, instance_count: u32) -> Result<(), DeviceError> {
        let color = fbo.color_texture();
        self.texture_barrier(color, ResourceState::RenderTarget);
        if let Some(depth) = fbo.depth_stencil_texture() {
            self.texture_barrier(depth, ResourceState::DepthStencil);
        }

        let target = color.api_handle().clone();
        let key = Arc::as_ptr(&target) as *const () as usize;
        self.low_level_data()
            .record_render(key, &target, |cmd| cmd.draw(vertex_count, instance_count));
        self.set_commands_pending();
        Ok(())
    }
}
