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

//! The blit family: texture-to-texture and texture-to-buffer transfers with
//! a full-resource-copy fast path and a shader-based general path.

use crate::api::{
    FilterMode, Rect, ReductionMode, ResourceFormat, IDENTITY_CHANNEL_TRANSFORM,
    STANDARD_REDUCTION,
};
use crate::context::render::RenderContext;
use crate::error::{BlitError, DeviceError};
use crate::resource::{
    BindFlags, Buffer, RenderTargetView, ResourceState, ShaderResourceView, Texture,
};
use crate::traits::{BlitPassParams, BlitToBufferPassParams};
use std::sync::Arc;

/// Clamps `rect` (or the full extent when `None`) to `width` × `height`.
fn resolve_rect(rect: Option<Rect>, width: u32, height: u32) -> Rect {
    let mut rect = rect.unwrap_or_else(|| Rect::new(0, 0, width, height));
    rect.right = rect.right.min(width);
    rect.bottom = rect.bottom.min(height);
    rect
}

fn is_full_rect(rect: &Rect, width: u32, height: u32) -> bool {
    rect.left == 0 && rect.top == 0 && rect.right == width && rect.bottom == height
}

fn uv_mapping(rect: &Rect, width: u32, height: u32) -> ([f32; 2], [f32; 2]) {
    if is_full_rect(rect, width, height) {
        ([0.0, 0.0], [1.0, 1.0])
    } else {
        let size = [width as f32, height as f32];
        (
            [rect.left as f32 / size[0], rect.top as f32 / size[1]],
            [rect.width() as f32 / size[0], rect.height() as f32 / size[1]],
        )
    }
}

fn is_complex(reductions: &[ReductionMode; 4], transform: &[[f32; 4]; 4]) -> bool {
    *reductions != STANDARD_REDUCTION || *transform != IDENTITY_CHANNEL_TRANSFORM
}

fn check_shader_path_limits(
    src_tex: &Texture,
    src: &ShaderResourceView,
    complex: bool,
) -> Result<(), BlitError> {
    let sample_count = src_tex.sample_count();
    if complex && sample_count > 1 {
        return Err(BlitError::MultisampledComplexSource);
    }
    // Only the single-sampled standard blit reads integer sources; every
    // variant may cast to an integer destination.
    if src_tex.format().is_integer() {
        if sample_count > 1 {
            return Err(BlitError::IntegerSourceFormat { complex: false });
        } else if complex {
            return Err(BlitError::IntegerSourceFormat { complex: true });
        }
    }
    // The single-pass shader has no notion of subresource selection beyond
    // the bound view.
    if src.info().array_size != 1 || src.info().mip_count != 1 {
        return Err(BlitError::SubresourceView);
    }
    Ok(())
}

impl RenderContext {
    /// Blits `src` into `dst` with standard filtering and no channel work.
    ///
    /// `None` rectangles cover the whole view extent; out-of-bounds
    /// rectangles are clamped, and a zero-area result is a silent no-op.
    pub fn blit(
        &self,
        src: &ShaderResourceView,
        dst: &RenderTargetView,
        src_rect: Option<Rect>,
        dst_rect: Option<Rect>,
        filter: FilterMode,
    ) -> Result<(), DeviceError> {
        self.blit_complex(
            src,
            dst,
            src_rect,
            dst_rect,
            filter,
            STANDARD_REDUCTION,
            IDENTITY_CHANNEL_TRANSFORM,
        )
    }

    /// Blits `src` into `dst` with per-channel reduction modes and an
    /// arbitrary 4×4 channel transform.
    ///
    /// Takes the full-resource copy fast path when the views and rectangles
    /// cover entire, descriptor-identical resources and no channel work is
    /// requested; otherwise runs the shader-based pass, which rejects
    /// mip-mapped/array views, multi-sampled complex sources and integer
    /// source formats outside the single-sampled standard variant.
    #[allow(clippy::too_many_arguments)]
    pub fn blit_complex(
        &self,
        src: &ShaderResourceView,
        dst: &RenderTargetView,
        src_rect: Option<Rect>,
        dst_rect: Option<Rect>,
        filter: FilterMode,
        reductions: [ReductionMode; 4],
        transform: [[f32; 4]; 4],
    ) -> Result<(), DeviceError> {
        let src_tex = src.texture()?;
        let dst_tex = dst.texture()?;

        let src_mip = src.info().most_detailed_mip;
        let dst_mip = dst.info().most_detailed_mip;
        let (src_w, src_h) = (src_tex.width(src_mip), src_tex.height(src_mip));
        let (dst_w, dst_h) = (dst_tex.width(dst_mip), dst_tex.height(dst_mip));

        let src_rect = resolve_rect(src_rect, src_w, src_h);
        let dst_rect = resolve_rect(dst_rect, dst_w, dst_h);
        if src_rect.is_degenerate() || dst_rect.is_degenerate() {
            log::debug!("blit() called with a zero-area src/dst rectangle after clamping");
            return Ok(());
        }

        let complex = is_complex(&reductions, &transform);
        let src_full_rect = is_full_rect(&src_rect, src_w, src_h);
        let dst_full_rect = is_full_rect(&dst_rect, dst_w, dst_h);

        // Fast path: a full-resource copy. Requires identical descriptors
        // and full coverage on both sides.
        let full_copy = !complex
            && src.info().is_full_view(&src_tex)
            && src_full_rect
            && dst.info().is_full_view(&dst_tex)
            && dst_full_rect
            && src_tex.compare_desc(&dst_tex);
        if full_copy {
            self.copy_resource(&dst_tex, &src_tex);
            return Ok(());
        }

        check_shader_path_limits(&src_tex, src, complex)?;
        if dst.info().array_size != 1 || dst.info().mip_count != 1 {
            return Err(BlitError::SubresourceView.into());
        }

        let (src_offset, src_scale) = uv_mapping(&src_rect, src_w, src_h);

        self.texture_barrier(&src_tex, ResourceState::ShaderResource);
        self.texture_barrier(&dst_tex, ResourceState::RenderTarget);

        let params = BlitPassParams {
            src: src_tex.api_handle().clone(),
            src_mip,
            src_slice: src.info().first_array_slice,
            sample_count: src_tex.sample_count(),
            src_offset,
            src_scale,
            dst: dst_tex.api_handle().clone(),
            dst_mip,
            dst_slice: dst.info().first_array_slice,
            dst_rect,
            filter,
            reductions,
            transform,
            complex,
        };
        let target = dst_tex.api_handle().clone();
        let key = Arc::as_ptr(&target) as *const () as usize;
        self.low_level_data()
            .record_render(key, &target, |cmd| cmd.blit_pass(&params));
        self.set_commands_pending();
        Ok(())
    }

    /// Blits `src` into a row-strided buffer, repacking into `dst_format`
    /// (a different bit-width than the source is allowed, including
    /// float-to-half).
    ///
    /// Shares the rectangle clamp policy and the fast/slow path structure
    /// of [`blit`](RenderContext::blit): when the source view and rectangle
    /// are full, the formats match and the stride equals the source width,
    /// the transfer is a plain texture-to-buffer copy.
    #[allow(clippy::too_many_arguments)]
    pub fn blit_to_buffer(
        &self,
        src: &ShaderResourceView,
        dst: &Buffer,
        dst_stride_pixels: u32,
        dst_format: ResourceFormat,
        src_rect: Option<Rect>,
        dst_rect: Option<Rect>,
        filter: FilterMode,
        reductions: [ReductionMode; 4],
        transform: [[f32; 4]; 4],
    ) -> Result<(), DeviceError> {
        let src_tex = src.texture()?;

        let dst_bpp = dst_format.bytes_per_pixel();
        if dst_bpp == 0 || dst_stride_pixels == 0 {
            return Err(DeviceError::Unsupported(
                "blit_to_buffer() requires a known destination format and stride".to_string(),
            ));
        }

        let src_mip = src.info().most_detailed_mip;
        let (src_w, src_h) = (src_tex.width(src_mip), src_tex.height(src_mip));
        // The buffer is addressed as a 2D grid of `dst_stride_pixels`-wide
        // rows; its height is whatever the byte capacity allows.
        let dst_rows = (dst.size() / (dst_stride_pixels as u64 * dst_bpp as u64)) as u32;

        let src_rect = resolve_rect(src_rect, src_w, src_h);
        let dst_rect = resolve_rect(dst_rect, dst_stride_pixels, dst_rows);
        if src_rect.is_degenerate() || dst_rect.is_degenerate() {
            log::debug!("blit_to_buffer() called with a zero-area src/dst rectangle after clamping");
            return Ok(());
        }

        let complex = is_complex(&reductions, &transform);
        let src_full_rect = is_full_rect(&src_rect, src_w, src_h);

        // Fast path: linearize the subresource with a plain copy.
        let full_copy = !complex
            && src.info().is_full_view(&src_tex)
            && src_full_rect
            && dst_format == src_tex.format()
            && dst_stride_pixels == src_w
            && dst_rect.left == 0
            && dst_rect.top == 0
            && dst_rect.width() == src_w
            && dst_rect.height() >= src_h;
        if full_copy {
            self.texture_barrier(&src_tex, ResourceState::CopySource);
            self.buffer_barrier(dst, ResourceState::CopyDest);
            let row_stride = dst_stride_pixels as u64 * dst_bpp as u64;
            let src_handle = src_tex.api_handle().clone();
            self.low_level_data().record_resource(|cmd| {
                cmd.copy_texture_to_buffer(
                    dst.api_handle(),
                    0,
                    row_stride,
                    &src_handle,
                    src_mip,
                    src.info().first_array_slice,
                )
            });
            self.set_commands_pending();
            return Ok(());
        }

        check_shader_path_limits(&src_tex, src, complex)?;
        if !dst.desc().bind_flags.contains(BindFlags::UNORDERED_ACCESS) {
            return Err(DeviceError::Unsupported(
                "blit_to_buffer() destination requires unordered-access binding".to_string(),
            ));
        }

        let (src_offset, src_scale) = uv_mapping(&src_rect, src_w, src_h);

        self.texture_barrier(&src_tex, ResourceState::ShaderResource);
        self.buffer_barrier(dst, ResourceState::UnorderedAccess);

        let params = BlitToBufferPassParams {
            src: src_tex.api_handle().clone(),
            src_mip,
            src_slice: src.info().first_array_slice,
            src_offset,
            src_scale,
            dst: dst.api_handle().clone(),
            dst_stride_pixels,
            dst_format,
            dst_rect,
            filter,
            reductions,
            transform,
            complex,
        };
        self.low_level_data()
            .record_compute(|cmd| cmd.blit_to_buffer_pass(&params));
        self.set_commands_pending();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rects_clamp_to_the_extent() {
        let clamped = resolve_rect(Some(Rect::new(0, 0, 100, 100)), 8, 16);
        assert_eq!(clamped, Rect::new(0, 0, 8, 16));
        assert!(is_full_rect(&clamped, 8, 16));

        let degenerate = resolve_rect(Some(Rect::new(10, 10, 10, 10)), 8, 16);
        assert!(degenerate.is_degenerate());

        let full = resolve_rect(None, 8, 16);
        assert!(is_full_rect(&full, 8, 16));
    }

    #[test]
    fn uv_mapping_normalizes_subrectangles() {
        let rect = Rect::new(2, 4, 6, 8);
        let (offset, scale) = uv_mapping(&rect, 8, 16);
        assert_relative_eq!(offset[0], 0.25f32);
        assert_relative_eq!(offset[1], 0.25f32);
        assert_relative_eq!(scale[0], 0.5f32);
        assert_relative_eq!(scale[1], 0.25f32);

        let full = Rect::new(0, 0, 8, 16);
        assert_eq!(uv_mapping(&full, 8, 16), ([0.0, 0.0], [1.0, 1.0]));
    }

    #[test]
    fn complex_detection_watches_reductions_and_transform() {
        assert!(!is_complex(
            &STANDARD_REDUCTION,
            &IDENTITY_CHANNEL_TRANSFORM
        ));

        let mut reductions = STANDARD_REDUCTION;
        reductions[2] = ReductionMode::Max;
        assert!(is_complex(&reductions, &IDENTITY_CHANNEL_TRANSFORM));

        let mut transform = IDENTITY_CHANNEL_TRANSFORM;
        transform[0][3] = 0.5;
        assert!(is_complex(&STANDARD_REDUCTION, &transform));
    }
}
