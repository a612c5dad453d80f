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

//! Command recording and execution for the software backend.
//!
//! Recording pushes onto a command vector; submission drains and interprets
//! it against the in-memory storage objects. Barrier commands have no
//! execution effect (there is no real pipeline to synchronize) but are
//! counted, which is what the core's elision tests observe.

use crate::soft::convert::{decode_pixel, encode_pixel};
use crate::soft::resource::{SoftBuffer, SoftPage, SoftQueryHeap, SoftTexture};
use crate::soft::stats::SoftStats;
use ember_core::api::{ClearValue, FilterMode, Rect};
use ember_core::error::DeviceError;
use ember_core::resource::ResourceState;
use ember_core::traits::{
    ApiObjectHandle, BlitPassParams, BlitToBufferPassParams, CommandList,
};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Faults raised while interpreting a command list.
///
/// All of them indicate a protocol bug in the recording layer, so they
/// surface as internal device errors.
#[derive(Debug, Error)]
pub enum SoftError {
    /// A handle did not refer to the expected storage type.
    #[error("handle does not refer to a {0}")]
    WrongHandleType(&'static str),
    /// A copy or clear addressed bytes outside the target storage.
    #[error("{0} access out of range")]
    OutOfRange(&'static str),
}

impl From<SoftError> for DeviceError {
    fn from(err: SoftError) -> Self {
        DeviceError::Internal(err.to_string())
    }
}

fn as_texture(handle: &ApiObjectHandle) -> Result<&SoftTexture, SoftError> {
    handle
        .as_any()
        .downcast_ref::<SoftTexture>()
        .ok_or(SoftError::WrongHandleType("texture"))
}

fn as_query_heap(handle: &ApiObjectHandle) -> Result<&SoftQueryHeap, SoftError> {
    handle
        .as_any()
        .downcast_ref::<SoftQueryHeap>()
        .ok_or(SoftError::WrongHandleType("query heap"))
}

/// Copies out the full contents of any byte-backed storage (buffer or heap
/// page).
fn read_all_bytes(handle: &ApiObjectHandle) -> Result<Vec<u8>, SoftError> {
    if let Some(buffer) = handle.as_any().downcast_ref::<SoftBuffer>() {
        Ok(buffer.data.lock().unwrap().clone())
    } else if let Some(page) = handle.as_any().downcast_ref::<SoftPage>() {
        Ok(page.bytes.lock().unwrap().clone())
    } else {
        Err(SoftError::WrongHandleType("byte storage"))
    }
}

fn with_bytes_mut<R>(
    handle: &ApiObjectHandle,
    f: impl FnOnce(&mut Vec<u8>) -> Result<R, SoftError>,
) -> Result<R, SoftError> {
    if let Some(buffer) = handle.as_any().downcast_ref::<SoftBuffer>() {
        f(&mut buffer.data.lock().unwrap())
    } else if let Some(page) = handle.as_any().downcast_ref::<SoftPage>() {
        f(&mut page.bytes.lock().unwrap())
    } else {
        Err(SoftError::WrongHandleType("byte storage"))
    }
}

#[derive(Debug)]
pub(crate) enum SoftCommand {
    Barrier,
    UavBarrier,
    CopyResource {
        dst: ApiObjectHandle,
        src: ApiObjectHandle,
    },
    CopyBufferRegion {
        dst: ApiObjectHandle,
        dst_offset: u64,
        src: ApiObjectHandle,
        src_offset: u64,
        num_bytes: u64,
    },
    CopyBufferToTexture {
        dst: ApiObjectHandle,
        dst_mip: u32,
        dst_slice: u32,
        src: ApiObjectHandle,
        src_offset: u64,
    },
    CopyTextureToBuffer {
        dst: ApiObjectHandle,
        dst_offset: u64,
        dst_row_stride: u64,
        src: ApiObjectHandle,
        src_mip: u32,
        src_slice: u32,
    },
    ClearTexture {
        texture: ApiObjectHandle,
        value: ClearValue,
    },
    Dispatch,
    Draw,
    BlitPass(BlitPassParams),
    BlitToBufferPass(BlitToBufferPassParams),
    WriteTimestamp {
        heap: ApiObjectHandle,
        index: u32,
    },
}

/// The software command list.
#[derive(Debug)]
pub struct SoftCommandList {
    commands: Vec<SoftCommand>,
    stats: Arc<SoftStats>,
}

impl SoftCommandList {
    pub(crate) fn new(stats: Arc<SoftStats>) -> Self {
        Self {
            commands: Vec::new(),
            stats,
        }
    }

    pub(crate) fn take_commands(&mut self) -> Vec<SoftCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl CommandList for SoftCommandList {
    fn reset(&mut self) -> Result<(), DeviceError> {
        self.commands.clear();
        Ok(())
    }

    fn close(&mut self) {}

    fn begin_resource_encoder(&mut self) {}

    fn begin_compute_encoder(&mut self) {}

    fn begin_render_encoder(&mut self, _target: &ApiObjectHandle) {}

    fn end_encoder(&mut self) {}

    fn texture_barrier(
        &mut self,
        _texture: &ApiObjectHandle,
        _from: ResourceState,
        _to: ResourceState,
    ) {
        SoftStats::bump(&self.stats.barriers_recorded);
        self.commands.push(SoftCommand::Barrier);
    }

    fn texture_subresource_barrier(
        &mut self,
        _texture: &ApiObjectHandle,
        _array_slice: u32,
        _mip_level: u32,
        _from: ResourceState,
        _to: ResourceState,
    ) {
        SoftStats::bump(&self.stats.barriers_recorded);
        self.commands.push(SoftCommand::Barrier);
    }

    fn buffer_barrier(
        &mut self,
        _buffer: &ApiObjectHandle,
        _from: ResourceState,
        _to: ResourceState,
    ) {
        SoftStats::bump(&self.stats.barriers_recorded);
        self.commands.push(SoftCommand::Barrier);
    }

    fn uav_barrier(&mut self, _resource: &ApiObjectHandle) {
        SoftStats::bump(&self.stats.uav_barriers_recorded);
        self.commands.push(SoftCommand::UavBarrier);
    }

    fn copy_resource(&mut self, dst: &ApiObjectHandle, src: &ApiObjectHandle) {
        self.commands.push(SoftCommand::CopyResource {
            dst: dst.clone(),
            src: src.clone(),
        });
    }

    fn copy_buffer_region(
        &mut self,
        dst: &ApiObjectHandle,
        dst_offset: u64,
        src: &ApiObjectHandle,
        src_offset: u64,
        num_bytes: u64,
    ) {
        self.commands.push(SoftCommand::CopyBufferRegion {
            dst: dst.clone(),
            dst_offset,
            src: src.clone(),
            src_offset,
            num_bytes,
        });
    }

    fn copy_buffer_to_texture(
        &mut self,
        dst: &ApiObjectHandle,
        dst_mip: u32,
        dst_slice: u32,
        src: &ApiObjectHandle,
        src_offset: u64,
    ) {
        self.commands.push(SoftCommand::CopyBufferToTexture {
            dst: dst.clone(),
            dst_mip,
            dst_slice,
            src: src.clone(),
            src_offset,
        });
    }

    fn copy_texture_to_buffer(
        &mut self,
        dst: &ApiObjectHandle,
        dst_offset: u64,
        dst_row_stride: u64,
        src: &ApiObjectHandle,
        src_mip: u32,
        src_slice: u32,
    ) {
        self.commands.push(SoftCommand::CopyTextureToBuffer {
            dst: dst.clone(),
            dst_offset,
            dst_row_stride,
            src: src.clone(),
            src_mip,
            src_slice,
        });
    }

    fn clear_texture(&mut self, texture: &ApiObjectHandle, value: &ClearValue) {
        self.commands.push(SoftCommand::ClearTexture {
            texture: texture.clone(),
            value: *value,
        });
    }

    fn dispatch(&mut self, _groups: [u32; 3]) {
        self.commands.push(SoftCommand::Dispatch);
    }

    fn draw(&mut self, _vertex_count: u32, _instance_count: u32) {
        self.commands.push(SoftCommand::Draw);
    }

    fn blit_pass(&mut self, params: &BlitPassParams) {
        SoftStats::bump(&self.stats.blit_passes);
        self.commands.push(SoftCommand::BlitPass(params.clone()));
    }

    fn blit_to_buffer_pass(&mut self, params: &BlitToBufferPassParams) {
        SoftStats::bump(&self.stats.blit_to_buffer_passes);
        self.commands
            .push(SoftCommand::BlitToBufferPass(params.clone()));
    }

    fn write_timestamp(&mut self, heap: &ApiObjectHandle, index: u32) {
        self.commands.push(SoftCommand::WriteTimestamp {
            heap: heap.clone(),
            index,
        });
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

static TIMESTAMP_TICKS: AtomicU64 = AtomicU64::new(1);

/// Interprets a drained command vector against the storage objects.
pub(crate) fn execute_commands(
    commands: Vec<SoftCommand>,
    stats: &SoftStats,
) -> Result<(), SoftError> {
    for command in commands {
        match command {
            SoftCommand::Barrier | SoftCommand::UavBarrier => {}
            SoftCommand::CopyResource { dst, src } => {
                SoftStats::bump(&stats.copies_executed);
                execute_copy_resource(&dst, &src)?;
            }
            SoftCommand::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_offset,
                num_bytes,
            } => {
                SoftStats::bump(&stats.copies_executed);
                let source = read_all_bytes(&src)?;
                let start = src_offset as usize;
                let end = start + num_bytes as usize;
                if end > source.len() {
                    return Err(SoftError::OutOfRange("copy source"));
                }
                with_bytes_mut(&dst, |bytes| {
                    let dst_start = dst_offset as usize;
                    let dst_end = dst_start + num_bytes as usize;
                    if dst_end > bytes.len() {
                        return Err(SoftError::OutOfRange("copy destination"));
                    }
                    bytes[dst_start..dst_end].copy_from_slice(&source[start..end]);
                    Ok(())
                })?;
            }
            SoftCommand::CopyBufferToTexture {
                dst,
                dst_mip,
                dst_slice,
                src,
                src_offset,
            } => {
                SoftStats::bump(&stats.copies_executed);
                let texture = as_texture(&dst)?;
                let (width, height) = texture.mip_extent(dst_mip);
                let bpp = texture.format().bytes_per_pixel() as usize;
                let num_bytes = width * height * bpp;

                let source = read_all_bytes(&src)?;
                let start = src_offset as usize;
                if start + num_bytes > source.len() {
                    return Err(SoftError::OutOfRange("upload source"));
                }
                let index = texture.subresource_index(dst_slice, dst_mip);
                let mut subresources = texture.subresources.lock().unwrap();
                subresources[index].copy_from_slice(&source[start..start + num_bytes]);
            }
            SoftCommand::CopyTextureToBuffer {
                dst,
                dst_offset,
                dst_row_stride,
                src,
                src_mip,
                src_slice,
            } => {
                SoftStats::bump(&stats.copies_executed);
                let texture = as_texture(&src)?;
                let (width, height) = texture.mip_extent(src_mip);
                let bpp = texture.format().bytes_per_pixel() as usize;
                let row_bytes = width * bpp;
                let index = texture.subresource_index(src_slice, src_mip);
                let pixels = texture.subresources.lock().unwrap()[index].clone();

                with_bytes_mut(&dst, |bytes| {
                    for row in 0..height {
                        let src_start = row * row_bytes;
                        let dst_start = dst_offset as usize + row * dst_row_stride as usize;
                        if dst_start + row_bytes > bytes.len() {
                            return Err(SoftError::OutOfRange("readback destination"));
                        }
                        bytes[dst_start..dst_start + row_bytes]
                            .copy_from_slice(&pixels[src_start..src_start + row_bytes]);
                    }
                    Ok(())
                })?;
            }
            SoftCommand::ClearTexture { texture, value } => {
                SoftStats::bump(&stats.clears_executed);
                execute_clear(&texture, &value)?;
            }
            SoftCommand::Dispatch => {
                SoftStats::bump(&stats.dispatches);
            }
            SoftCommand::Draw => {
                SoftStats::bump(&stats.draws);
            }
            SoftCommand::BlitPass(params) => {
                execute_blit_pass(&params)?;
            }
            SoftCommand::BlitToBufferPass(params) => {
                execute_blit_to_buffer_pass(&params)?;
            }
            SoftCommand::WriteTimestamp { heap, index } => {
                let heap = as_query_heap(&heap)?;
                let tick = TIMESTAMP_TICKS.fetch_add(1, Ordering::SeqCst);
                let mut timestamps = heap.timestamps.lock().unwrap();
                if let Some(slot) = timestamps.get_mut(index as usize) {
                    *slot = tick;
                }
            }
        }
    }
    Ok(())
}

fn execute_copy_resource(dst: &ApiObjectHandle, src: &ApiObjectHandle) -> Result<(), SoftError> {
    if let (Ok(dst_tex), Ok(src_tex)) = (as_texture(dst), as_texture(src)) {
        let source = src_tex.subresources.lock().unwrap().clone();
        let mut target = dst_tex.subresources.lock().unwrap();
        if target.len() != source.len() {
            return Err(SoftError::OutOfRange("full-resource copy"));
        }
        for (dst_sub, src_sub) in target.iter_mut().zip(source) {
            if dst_sub.len() != src_sub.len() {
                return Err(SoftError::OutOfRange("full-resource copy"));
            }
            dst_sub.copy_from_slice(&src_sub);
        }
        return Ok(());
    }
    // Byte-storage to byte-storage.
    let source = read_all_bytes(src)?;
    with_bytes_mut(dst, |bytes| {
        if bytes.len() != source.len() {
            return Err(SoftError::OutOfRange("full-resource copy"));
        }
        bytes.copy_from_slice(&source);
        Ok(())
    })
}

fn execute_clear(handle: &ApiObjectHandle, value: &ClearValue) -> Result<(), SoftError> {
    let texture = as_texture(handle)?;
    let format = texture.format();
    let bpp = format.bytes_per_pixel() as usize;
    let rgba = match value {
        ClearValue::Color(color) => *color,
        ClearValue::DepthStencil { depth, .. } => [*depth, 0.0, 0.0, 0.0],
    };
    let mut pixel = vec![0u8; bpp];
    encode_pixel(format, rgba, &mut pixel);

    let mut subresources = texture.subresources.lock().unwrap();
    for subresource in subresources.iter_mut() {
        for chunk in subresource.chunks_exact_mut(bpp) {
            chunk.copy_from_slice(&pixel);
        }
    }
    Ok(())
}

/// Maps a destination pixel to a source texel through the normalized
/// offset/scale window, point-sampled.
fn sample_source(
    pixels: &[u8],
    width: usize,
    height: usize,
    format: ember_core::api::ResourceFormat,
    u: f32,
    v: f32,
) -> [f32; 4] {
    let bpp = format.bytes_per_pixel() as usize;
    let x = ((u * width as f32) as usize).min(width.saturating_sub(1));
    let y = ((v * height as f32) as usize).min(height.saturating_sub(1));
    let start = (y * width + x) * bpp;
    decode_pixel(format, &pixels[start..start + bpp])
}

fn apply_transform(transform: &[[f32; 4]; 4], rgba: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (channel, row) in out.iter_mut().zip(transform.iter()) {
        *channel = row
            .iter()
            .zip(rgba.iter())
            .map(|(weight, value)| weight * value)
            .sum();
    }
    out
}

fn blit_uv(params_offset: [f32; 2], params_scale: [f32; 2], rect: &Rect, x: u32, y: u32) -> (f32, f32) {
    let fx = (x - rect.left) as f32 + 0.5;
    let fy = (y - rect.top) as f32 + 0.5;
    (
        params_offset[0] + params_scale[0] * (fx / rect.width() as f32),
        params_offset[1] + params_scale[1] * (fy / rect.height() as f32),
    )
}

fn execute_blit_pass(params: &BlitPassParams) -> Result<(), SoftError> {
    if params.filter == FilterMode::Linear {
        // Point sampling stands in for linear; exact filtering is not part
        // of what the software backend verifies.
        log::debug!("software blit samples with point filtering");
    }
    let src_tex = as_texture(&params.src)?;
    let dst_tex = as_texture(&params.dst)?;
    let (src_w, src_h) = src_tex.mip_extent(params.src_mip);
    let src_index = src_tex.subresource_index(params.src_slice, params.src_mip);
    let src_pixels = src_tex.subresources.lock().unwrap()[src_index].clone();
    let src_format = src_tex.format();

    let dst_format = dst_tex.format();
    let dst_bpp = dst_format.bytes_per_pixel() as usize;
    let (dst_w, _dst_h) = dst_tex.mip_extent(params.dst_mip);
    let dst_index = dst_tex.subresource_index(params.dst_slice, params.dst_mip);
    let mut subresources = dst_tex.subresources.lock().unwrap();
    let dst_pixels = &mut subresources[dst_index];

    let rect = params.dst_rect;
    for y in rect.top..rect.bottom {
        for x in rect.left..rect.right {
            let (u, v) = blit_uv(params.src_offset, params.src_scale, &rect, x, y);
            let mut rgba = sample_source(&src_pixels, src_w, src_h, src_format, u, v);
            if params.complex {
                rgba = apply_transform(&params.transform, rgba);
            }
            let start = (y as usize * dst_w + x as usize) * dst_bpp;
            if start + dst_bpp > dst_pixels.len() {
                return Err(SoftError::OutOfRange("blit destination"));
            }
            encode_pixel(dst_format, rgba, &mut dst_pixels[start..start + dst_bpp]);
        }
    }
    Ok(())
}

fn execute_blit_to_buffer_pass(params: &BlitToBufferPassParams) -> Result<(), SoftError> {
    let src_tex = as_texture(&params.src)?;
    let (src_w, src_h) = src_tex.mip_extent(params.src_mip);
    let src_index = src_tex.subresource_index(params.src_slice, params.src_mip);
    let src_pixels = src_tex.subresources.lock().unwrap()[src_index].clone();
    let src_format = src_tex.format();

    let dst_bpp = params.dst_format.bytes_per_pixel() as usize;
    let stride_bytes = params.dst_stride_pixels as usize * dst_bpp;

    let rect = params.dst_rect;
    with_bytes_mut(&params.dst, |bytes| {
        for y in rect.top..rect.bottom {
            for x in rect.left..rect.right {
                let (u, v) = blit_uv(params.src_offset, params.src_scale, &rect, x, y);
                let mut rgba = sample_source(&src_pixels, src_w, src_h, src_format, u, v);
                if params.complex {
                    rgba = apply_transform(&params.transform, rgba);
                }
                let start = y as usize * stride_bytes + x as usize * dst_bpp;
                if start + dst_bpp > bytes.len() {
                    return Err(SoftError::OutOfRange("blit-to-buffer destination"));
                }
                encode_pixel(params.dst_format, rgba, &mut bytes[start..start + dst_bpp]);
            }
        }
        Ok(())
    })
}
