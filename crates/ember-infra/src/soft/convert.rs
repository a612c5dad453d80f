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

//! Pixel packing and unpacking for the software backend.
//!
//! sRGB formats are treated as raw unorm bytes; the software backend does
//! not emulate the encode/decode curve.

use ember_core::api::ResourceFormat;

fn unorm_to_f32(byte: u8) -> f32 {
    byte as f32 / 255.0
}

fn f32_to_unorm(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// IEEE half-precision encode, round-to-nearest-even not required here;
/// truncation of the mantissa is sufficient for the repacking paths.
pub(crate) fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        // Inf / NaN
        let payload = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | payload;
    }
    let unbiased = exponent - 127;
    if unbiased > 15 {
        return sign | 0x7c00; // overflow to infinity
    }
    if unbiased < -24 {
        return sign; // underflow to zero
    }
    if unbiased < -14 {
        // subnormal half
        let shift = -unbiased - 14;
        let sub_mantissa = (mantissa | 0x0080_0000) >> (13 + shift);
        return sign | sub_mantissa as u16;
    }
    sign | (((unbiased + 15) as u16) << 10) | (mantissa >> 13) as u16
}

/// IEEE half-precision decode.
pub(crate) fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = ((bits & 0x8000) as u32) << 16;
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x03ff) as u32;

    let value = match (exponent, mantissa) {
        (0, 0) => sign,
        (0, m) => {
            // subnormal half: normalize
            let mut e = 127 - 15 + 1;
            let mut m = m;
            while m & 0x0400 == 0 {
                m <<= 1;
                e -= 1;
            }
            sign | ((e as u32) << 23) | ((m & 0x03ff) << 13)
        }
        (0x1f, 0) => sign | 0x7f80_0000,
        (0x1f, m) => sign | 0x7f80_0000 | (m << 13),
        (e, m) => sign | ((e + 127 - 15) << 23) | (m << 13),
    };
    f32::from_bits(value)
}

/// Unpacks one pixel into RGBA floats. Integer formats decode to their
/// numeric values cast to float.
pub(crate) fn decode_pixel(format: ResourceFormat, bytes: &[u8]) -> [f32; 4] {
    match format {
        ResourceFormat::R8Unorm => [unorm_to_f32(bytes[0]), 0.0, 0.0, 1.0],
        ResourceFormat::R32Uint => {
            let v = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
            [v as f32, 0.0, 0.0, 1.0]
        }
        ResourceFormat::R32Float | ResourceFormat::D32Float => {
            let v = bytemuck::pod_read_unaligned::<f32>(&bytes[0..4]);
            [v, 0.0, 0.0, 1.0]
        }
        ResourceFormat::RGBA8Unorm => [
            unorm_to_f32(bytes[0]),
            unorm_to_f32(bytes[1]),
            unorm_to_f32(bytes[2]),
            unorm_to_f32(bytes[3]),
        ],
        ResourceFormat::BGRA8Unorm | ResourceFormat::BGRA8UnormSrgb => [
            unorm_to_f32(bytes[2]),
            unorm_to_f32(bytes[1]),
            unorm_to_f32(bytes[0]),
            unorm_to_f32(bytes[3]),
        ],
        ResourceFormat::RGBA16Uint => {
            let mut out = [0.0; 4];
            for (i, chunk) in bytes[0..8].chunks_exact(2).enumerate() {
                out[i] = u16::from_le_bytes(chunk.try_into().unwrap()) as f32;
            }
            out
        }
        ResourceFormat::RGBA16Float => {
            let mut out = [0.0; 4];
            for (i, chunk) in bytes[0..8].chunks_exact(2).enumerate() {
                out[i] = f16_bits_to_f32(u16::from_le_bytes(chunk.try_into().unwrap()));
            }
            out
        }
        ResourceFormat::RGBA32Uint => {
            let mut out = [0.0; 4];
            for (i, chunk) in bytes[0..16].chunks_exact(4).enumerate() {
                out[i] = u32::from_le_bytes(chunk.try_into().unwrap()) as f32;
            }
            out
        }
        ResourceFormat::RGBA32Float => {
            let mut out = [0.0; 4];
            for (i, chunk) in bytes[0..16].chunks_exact(4).enumerate() {
                out[i] = bytemuck::pod_read_unaligned::<f32>(chunk);
            }
            out
        }
        ResourceFormat::Unknown => [0.0; 4],
    }
}

/// Packs RGBA floats into one pixel of `format`.
pub(crate) fn encode_pixel(format: ResourceFormat, rgba: [f32; 4], out: &mut [u8]) {
    match format {
        ResourceFormat::R8Unorm => out[0] = f32_to_unorm(rgba[0]),
        ResourceFormat::R32Uint => {
            out[0..4].copy_from_slice(&(rgba[0].max(0.0) as u32).to_le_bytes())
        }
        ResourceFormat::R32Float | ResourceFormat::D32Float => {
            out[0..4].copy_from_slice(&rgba[0].to_le_bytes())
        }
        ResourceFormat::RGBA8Unorm => {
            for i in 0..4 {
                out[i] = f32_to_unorm(rgba[i]);
            }
        }
        ResourceFormat::BGRA8Unorm | ResourceFormat::BGRA8UnormSrgb => {
            out[0] = f32_to_unorm(rgba[2]);
            out[1] = f32_to_unorm(rgba[1]);
            out[2] = f32_to_unorm(rgba[0]);
            out[3] = f32_to_unorm(rgba[3]);
        }
        ResourceFormat::RGBA16Uint => {
            for i in 0..4 {
                out[i * 2..i * 2 + 2].copy_from_slice(&(rgba[i].max(0.0) as u16).to_le_bytes());
            }
        }
        ResourceFormat::RGBA16Float => {
            for i in 0..4 {
                out[i * 2..i * 2 + 2].copy_from_slice(&f32_to_f16_bits(rgba[i]).to_le_bytes());
            }
        }
        ResourceFormat::RGBA32Uint => {
            for i in 0..4 {
                out[i * 4..i * 4 + 4].copy_from_slice(&(rgba[i].max(0.0) as u32).to_le_bytes());
            }
        }
        ResourceFormat::RGBA32Float => {
            for i in 0..4 {
                out[i * 4..i * 4 + 4].copy_from_slice(&rgba[i].to_le_bytes());
            }
        }
        ResourceFormat::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn half_round_trips_simple_values() {
        for value in [0.0f32, 1.0, -1.0, 0.5, 2.0, 65504.0, -0.25] {
            let bits = f32_to_f16_bits(value);
            assert_eq!(f16_bits_to_f32(bits), value);
        }
    }

    #[test]
    fn half_saturates_to_infinity() {
        let bits = f32_to_f16_bits(1.0e6);
        assert_eq!(bits & 0x7fff, 0x7c00);
        assert!(f16_bits_to_f32(bits).is_infinite());
    }

    #[test]
    fn rgba8_encode_decode_round_trip() {
        let rgba = [0.25, 0.5, 0.75, 1.0];
        let mut bytes = [0u8; 4];
        encode_pixel(ResourceFormat::RGBA8Unorm, rgba, &mut bytes);
        let decoded = decode_pixel(ResourceFormat::RGBA8Unorm, &bytes);
        for i in 0..4 {
            assert_relative_eq!(decoded[i], rgba[i], epsilon = 1.0 / 255.0);
        }
    }

    #[test]
    fn bgra_swizzles_channels() {
        let mut bytes = [0u8; 4];
        encode_pixel(ResourceFormat::BGRA8Unorm, [1.0, 0.0, 0.0, 1.0], &mut bytes);
        assert_eq!(bytes, [0, 0, 255, 255]);
    }
}
