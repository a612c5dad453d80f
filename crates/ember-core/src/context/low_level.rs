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

//! Ownership of the one open command list per queue.

use crate::api::QueueKind;
use crate::error::DeviceError;
use crate::fence::GpuFence;
use crate::fenced_pool::FencedPool;
use crate::traits::{ApiObjectHandle, CommandList, CommandQueue, GpuBackend};
use std::sync::{Arc, Mutex};

/// Which encoder kind is currently open on the command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderKind {
    None,
    Resource,
    Compute,
    Render,
}

#[derive(Debug)]
struct LowLevelInner {
    lists: FencedPool<Box<dyn CommandList>>,
    is_open: bool,
    encoder: EncoderKind,
    /// Identity of the framebuffer the open render encoder targets; render
    /// encoders are reused across consecutive draws hitting the same target.
    render_key: Option<usize>,
}

impl LowLevelInner {
    fn end_open_encoder(&mut self) {
        if self.encoder != EncoderKind::None {
            self.lists.active_mut().end_encoder();
            self.encoder = EncoderKind::None;
            self.render_key = None;
        }
    }
}

/// Owns exactly one open command list for a queue of a given kind, plus the
/// per-context fence that tells when that list's commands have completed.
///
/// State machine: the constructor opens a command list; [`flush`] closes it,
/// submits it with a fence signal, retires it into a [`FencedPool`] for
/// later reuse and immediately opens the next list, so the caller can keep
/// recording without waiting for the GPU.
///
/// [`flush`]: LowLevelContextData::flush
#[derive(Debug)]
pub struct LowLevelContextData {
    queue_kind: QueueKind,
    queue: Arc<dyn CommandQueue>,
    fence: Arc<GpuFence>,
    inner: Mutex<LowLevelInner>,
}

impl LowLevelContextData {
    /// Creates the context data for `queue` and opens its first command
    /// list.
    pub fn new(
        backend: &Arc<dyn GpuBackend>,
        queue_kind: QueueKind,
        queue: Arc<dyn CommandQueue>,
    ) -> Result<Self, DeviceError> {
        let fence = Arc::new(GpuFence::new(backend.as_ref())?);
        let pool_backend = backend.clone();
        let lists = FencedPool::new(
            fence.clone(),
            Box::new(move || pool_backend.create_command_list(queue_kind)),
        )?;
        Ok(Self {
            queue_kind,
            queue,
            fence,
            inner: Mutex::new(LowLevelInner {
                lists,
                is_open: true,
                encoder: EncoderKind::None,
                render_key: None,
            }),
        })
    }

    /// The kind of queue this context records for.
    pub fn queue_kind(&self) -> QueueKind {
        self.queue_kind
    }

    /// The queue submissions go to.
    pub fn queue(&self) -> &Arc<dyn CommandQueue> {
        &self.queue
    }

    /// The fence signaled by every submission from this context.
    pub fn fence(&self) -> &Arc<GpuFence> {
        &self.fence
    }

    /// Closes the open command list, ending any active encoder first.
    pub fn close_command_buffer(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_open {
            inner.end_open_encoder();
            inner.lists.active_mut().close();
            inner.is_open = false;
        }
    }

    /// Reopens recording after [`close_command_buffer`].
    ///
    /// [`close_command_buffer`]: LowLevelContextData::close_command_buffer
    pub fn open_command_buffer(&self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.is_open {
            inner.lists.active_mut().reset()?;
            inner.is_open = true;
        }
        Ok(())
    }

    /// Closes the open list, submits it with a signal of the next fence
    /// value, and opens a fresh (possibly recycled) list.
    ///
    /// Synchronous from the recording perspective (the caller can record
    /// into the new list immediately) and asynchronous from the execution
    /// perspective: completion is observed later through the fence.
    pub fn flush(&self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.end_open_encoder();
        inner.lists.active_mut().close();

        let signal_value = self.fence.begin_signal();
        self.queue.submit(
            inner.lists.active_mut().as_mut(),
            self.fence.native(),
            signal_value,
        )?;

        let next = inner.lists.retire_and_next()?;
        next.reset()?;
        inner.is_open = true;
        Ok(())
    }

    /// Records through the resource encoder, opening it (and closing any
    /// other encoder) as needed.
    pub(crate) fn record_resource<R>(&self, f: impl FnOnce(&mut dyn CommandList) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        debug_assert!(inner.is_open, "recording into a closed command buffer");
        if inner.encoder != EncoderKind::Resource {
            inner.end_open_encoder();
            inner.lists.active_mut().begin_resource_encoder();
            inner.encoder = EncoderKind::Resource;
        }
        f(inner.lists.active_mut().as_mut())
    }

    /// Records through the compute encoder.
    pub(crate) fn record_compute<R>(&self, f: impl FnOnce(&mut dyn CommandList) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        debug_assert!(inner.is_open, "recording into a closed command buffer");
        if inner.encoder != EncoderKind::Compute {
            inner.end_open_encoder();
            inner.lists.active_mut().begin_compute_encoder();
            inner.encoder = EncoderKind::Compute;
        }
        f(inner.lists.active_mut().as_mut())
    }

    /// Records through a render encoder targeting `target`.
    ///
    /// The open render encoder is reused when `key` matches the previous
    /// draw's target identity; anything else ends it and begins a new one.
    pub(crate) fn record_render<R>(
        &self,
        key: usize,
        target: &ApiObjectHandle,
        f: impl FnOnce(&mut dyn CommandList) -> R,
    ) -> R {
        let mut inner = self.inner.lock().unwrap();
        debug_assert!(inner.is_open, "recording into a closed command buffer");
        if inner.encoder != EncoderKind::Render || inner.render_key != Some(key) {
            inner.end_open_encoder();
            inner.lists.active_mut().begin_render_encoder(target);
            inner.encoder = EncoderKind::Render;
            inner.render_key = Some(key);
        }
        f(inner.lists.active_mut().as_mut())
    }
}

impl Drop for LowLevelContextData {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_open {
            inner.end_open_encoder();
            inner.lists.active_mut().close();
            inner.is_open = false;
        }
    }
}
