// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Block conversion between a codec's native sample representation and the caller's
//! requested sample type, built on the rounding, normalization, and bit-extension
//! kernels. Readers stage one block of native samples (`i32` for integer codecs,
//! `f32`/`f64` for float codecs) and convert it here.
//!
//! Integer samples are treated as symmetric: the surplus negative value of the two's
//! complement range is clamped to the negative limit before conversion, so a full
//! scale sample never maps below −1.0 and widened integers never exceed the target
//! range.

use crate::dsp::{extension, normalization, rounding};
use crate::sample::{Sample, SampleFormat};

/// The largest positive value of a symmetric signed integer range of `bits` width.
#[inline]
pub fn symmetric_limit(bits: u32) -> i32 {
    if bits >= 32 {
        i32::MAX
    } else {
        (1i32 << (bits - 1)) - 1
    }
}

#[inline]
fn clamp_symmetric(value: i32, limit: i32) -> i32 {
    value.max(-limit)
}

/// How to widen integers of `from` valid bits to `to` valid bits in one kernel call.
struct Widening {
    pre_shift: u32,
    shift: u32,
    mask: i32,
    triple: bool,
}

impl Widening {
    fn plan(from: u32, to: u32) -> Widening {
        debug_assert!(from < to && to <= 32);

        let pre_shift = to - from;
        if 2 * from >= to {
            // One extra copy of the significant bits covers the padding.
            Widening { pre_shift, shift: from, mask: (1i32 << pre_shift) - 1, triple: false }
        } else {
            // Two extra copies; any remainder below 3 copies stays zero.
            let mask = ((1i32 << from) - 1) << (to - 2 * from);
            Widening { pre_shift, shift: from, mask, triple: true }
        }
    }

    #[inline]
    fn apply(&self, value: i32) -> i32 {
        if self.triple {
            extension::shift_triple_signed(self.pre_shift, value, self.shift, self.mask)
        } else {
            extension::shift_repeat_signed(self.pre_shift, value, self.shift, self.mask)
        }
    }

    #[inline]
    fn apply_x4(&self, values: &[i32; 4]) -> [i32; 4] {
        if self.triple {
            extension::shift_triple_signed_x4(self.pre_shift, values, self.shift, self.mask)
        } else {
            extension::shift_repeat_signed_x4(self.pre_shift, values, self.shift, self.mask)
        }
    }
}

/// Changes the number of valid bits of one integer sample.
#[inline]
fn requantize_i32(value: i32, from: u32, to: u32) -> i32 {
    let clamped = clamp_symmetric(value, symmetric_limit(from));
    if from == to {
        clamped
    } else if from > to {
        clamp_symmetric(clamped >> (from - to), symmetric_limit(to))
    } else {
        Widening::plan(from, to).apply(clamped)
    }
}

fn i32_to_u8(src: &[i32], valid_bits: u32, dst: &mut [u8]) {
    for (value, out) in src.iter().zip(dst.iter_mut()) {
        *out = (requantize_i32(*value, valid_bits, 8) + 128) as u8;
    }
}

fn i32_to_i16(src: &[i32], valid_bits: u32, dst: &mut [i16]) {
    for (value, out) in src.iter().zip(dst.iter_mut()) {
        *out = requantize_i32(*value, valid_bits, 16) as i16;
    }
}

fn i32_to_i32(src: &[i32], valid_bits: u32, dst: &mut [i32]) {
    let limit = symmetric_limit(valid_bits);

    if valid_bits >= 32 {
        for (value, out) in src.iter().zip(dst.iter_mut()) {
            *out = clamp_symmetric(*value, limit);
        }
        return;
    }

    // Widening to the full word is the hot path (it runs for every integer decode at
    // 16 or 24 bits), so the batched kernel does the bulk of the work.
    let widening = Widening::plan(valid_bits, 32);
    let mut chunks = src.chunks_exact(4).zip(dst.chunks_exact_mut(4));
    for (values, out) in &mut chunks {
        let clamped = [
            clamp_symmetric(values[0], limit),
            clamp_symmetric(values[1], limit),
            clamp_symmetric(values[2], limit),
            clamp_symmetric(values[3], limit),
        ];
        out.copy_from_slice(&widening.apply_x4(&clamped));
    }

    let done = src.len() - src.len() % 4;
    for (value, out) in src[done..].iter().zip(dst[done..].iter_mut()) {
        *out = widening.apply(clamp_symmetric(*value, limit));
    }
}

fn i32_to_f32(src: &[i32], valid_bits: u32, dst: &mut [f32]) {
    let limit = symmetric_limit(valid_bits);

    // Quotients up to 2^24 are exact in f32; beyond that the division runs in f64.
    let narrow = valid_bits <= 24;
    let quotient_f32 = limit as f32;
    let quotient_f64 = limit as f64;

    let mut chunks = src.chunks_exact(4).zip(dst.chunks_exact_mut(4));
    for (values, out) in &mut chunks {
        let clamped = [
            clamp_symmetric(values[0], limit),
            clamp_symmetric(values[1], limit),
            clamp_symmetric(values[2], limit),
            clamp_symmetric(values[3], limit),
        ];
        let converted = if narrow {
            normalization::divide_i32_to_f32_x4(&clamped, quotient_f32)
        } else {
            normalization::divide_i32_to_f32_x4_wide(&clamped, quotient_f64)
        };
        out.copy_from_slice(&converted);
    }

    let done = src.len() - src.len() % 4;
    for (value, out) in src[done..].iter().zip(dst[done..].iter_mut()) {
        let clamped = clamp_symmetric(*value, limit);
        *out = if narrow {
            normalization::divide_i32_to_f32(clamped, quotient_f32)
        } else {
            (clamped as f64 / quotient_f64) as f32
        };
    }
}

fn i32_to_f64(src: &[i32], valid_bits: u32, dst: &mut [f64]) {
    let limit = symmetric_limit(valid_bits);
    let quotient = limit as f64;

    let mut chunks = src.chunks_exact(4).zip(dst.chunks_exact_mut(4));
    for (values, out) in &mut chunks {
        let clamped = [
            clamp_symmetric(values[0], limit),
            clamp_symmetric(values[1], limit),
            clamp_symmetric(values[2], limit),
            clamp_symmetric(values[3], limit),
        ];
        out.copy_from_slice(&normalization::divide_i32_to_f64_x4(&clamped, quotient));
    }

    let done = src.len() - src.len() % 4;
    for (value, out) in src[done..].iter().zip(dst[done..].iter_mut()) {
        *out = normalization::divide_i32_to_f64(clamp_symmetric(*value, limit), quotient);
    }
}

/// Converts a block of integer samples with `valid_bits` of signal into any target
/// sample type. `src` and `dst` must have the same length.
pub fn i32_to_samples<S: Sample>(src: &[i32], valid_bits: u32, dst: &mut [S]) {
    assert_eq!(src.len(), dst.len());
    debug_assert!(valid_bits >= 1 && valid_bits <= 32);

    match S::FORMAT {
        SampleFormat::U8 => i32_to_u8(src, valid_bits, bytemuck::cast_slice_mut(dst)),
        SampleFormat::S16 => i32_to_i16(src, valid_bits, bytemuck::cast_slice_mut(dst)),
        SampleFormat::S32 => i32_to_i32(src, valid_bits, bytemuck::cast_slice_mut(dst)),
        SampleFormat::F32 => i32_to_f32(src, valid_bits, bytemuck::cast_slice_mut(dst)),
        SampleFormat::F64 => i32_to_f64(src, valid_bits, bytemuck::cast_slice_mut(dst)),
        _ => unreachable!("sample types map to exactly one format"),
    }
}

fn quantize_f32(src: &[f32], bits: u32, offset: i32, dst: &mut [i32]) {
    let limit = symmetric_limit(bits);
    let wide = bits > 24;
    let factor_f32 = limit as f32;
    let factor_f64 = limit as f64;

    let mut chunks = src.chunks_exact(4).zip(dst.chunks_exact_mut(4));
    for (values, out) in &mut chunks {
        let clamped = [
            values[0].clamp(-1.0, 1.0),
            values[1].clamp(-1.0, 1.0),
            values[2].clamp(-1.0, 1.0),
            values[3].clamp(-1.0, 1.0),
        ];
        let rounded = if wide {
            rounding::multiply_to_nearest_i32_x4_wide(&clamped, factor_f64)
        } else {
            rounding::multiply_to_nearest_i32_x4(&clamped, factor_f32)
        };
        for (value, out) in rounded.iter().zip(out.iter_mut()) {
            *out = value + offset;
        }
    }

    let done = src.len() - src.len() % 4;
    for (value, out) in src[done..].iter().zip(dst[done..].iter_mut()) {
        let clamped = value.clamp(-1.0, 1.0);
        *out = if wide {
            rounding::multiply_to_nearest_i32_wide(clamped, factor_f64)
        } else {
            rounding::multiply_to_nearest_i32(clamped, factor_f32)
        } + offset;
    }
}

fn quantize_f64(src: &[f64], bits: u32, offset: i32, dst: &mut [i32]) {
    let limit = symmetric_limit(bits);
    let factor = limit as f64;

    let mut chunks = src.chunks_exact(4).zip(dst.chunks_exact_mut(4));
    for (values, out) in &mut chunks {
        let clamped = [
            values[0].clamp(-1.0, 1.0),
            values[1].clamp(-1.0, 1.0),
            values[2].clamp(-1.0, 1.0),
            values[3].clamp(-1.0, 1.0),
        ];
        let rounded = rounding::multiply_to_nearest_i32_x4_from_f64(&clamped, factor);
        for (value, out) in rounded.iter().zip(out.iter_mut()) {
            *out = value + offset;
        }
    }

    let done = src.len() - src.len() % 4;
    for (value, out) in src[done..].iter().zip(dst[done..].iter_mut()) {
        let clamped = value.clamp(-1.0, 1.0);
        *out = rounding::multiply_to_nearest_i32_from_f64(clamped, factor) + offset;
    }
}

/// Converts a block of normalized `f32` samples into any target sample type.
pub fn f32_to_samples<S: Sample>(src: &[f32], dst: &mut [S]) {
    assert_eq!(src.len(), dst.len());

    match S::FORMAT {
        SampleFormat::U8 => {
            let dst: &mut [u8] = bytemuck::cast_slice_mut(dst);
            let mut staged = vec![0i32; src.len()];
            quantize_f32(src, 8, 128, &mut staged);
            for (value, out) in staged.iter().zip(dst.iter_mut()) {
                *out = *value as u8;
            }
        }
        SampleFormat::S16 => {
            let dst: &mut [i16] = bytemuck::cast_slice_mut(dst);
            let mut staged = vec![0i32; src.len()];
            quantize_f32(src, 16, 0, &mut staged);
            for (value, out) in staged.iter().zip(dst.iter_mut()) {
                *out = *value as i16;
            }
        }
        SampleFormat::S32 => {
            quantize_f32(src, 32, 0, bytemuck::cast_slice_mut(dst));
        }
        SampleFormat::F32 => {
            bytemuck::cast_slice_mut::<S, f32>(dst).copy_from_slice(src);
        }
        SampleFormat::F64 => {
            let dst: &mut [f64] = bytemuck::cast_slice_mut(dst);
            for (value, out) in src.iter().zip(dst.iter_mut()) {
                *out = *value as f64;
            }
        }
        _ => unreachable!("sample types map to exactly one format"),
    }
}

/// Converts a block of normalized `f64` samples into any target sample type.
pub fn f64_to_samples<S: Sample>(src: &[f64], dst: &mut [S]) {
    assert_eq!(src.len(), dst.len());

    match S::FORMAT {
        SampleFormat::U8 => {
            let dst: &mut [u8] = bytemuck::cast_slice_mut(dst);
            let mut staged = vec![0i32; src.len()];
            quantize_f64(src, 8, 128, &mut staged);
            for (value, out) in staged.iter().zip(dst.iter_mut()) {
                *out = *value as u8;
            }
        }
        SampleFormat::S16 => {
            let dst: &mut [i16] = bytemuck::cast_slice_mut(dst);
            let mut staged = vec![0i32; src.len()];
            quantize_f64(src, 16, 0, &mut staged);
            for (value, out) in staged.iter().zip(dst.iter_mut()) {
                *out = *value as i16;
            }
        }
        SampleFormat::S32 => {
            quantize_f64(src, 32, 0, bytemuck::cast_slice_mut(dst));
        }
        SampleFormat::F32 => {
            let dst: &mut [f32] = bytemuck::cast_slice_mut(dst);
            for (value, out) in src.iter().zip(dst.iter_mut()) {
                *out = *value as f32;
            }
        }
        SampleFormat::F64 => {
            bytemuck::cast_slice_mut::<S, f64>(dst).copy_from_slice(src);
        }
        _ => unreachable!("sample types map to exactly one format"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_fills_the_target_range() {
        for (from, to) in [(8u32, 16u32), (8, 24), (8, 32), (16, 24), (16, 32), (24, 32)] {
            let max_in = symmetric_limit(from) as i64;
            let max_out = symmetric_limit(to) as i64;
            let step = 1i64 << (to - from);

            // Replication reaches full scale to within one source quantization step,
            // where zero padding would fall short by a factor of two at the bottom.
            let widened = requantize_i32(max_in as i32, from, to) as i64;
            assert!(max_out - widened < step, "{} -> {}: {:#x}", from, to, widened);

            let min = requantize_i32(-max_in as i32, from, to) as i64;
            assert!(min < 0 && (min + max_out).abs() < 2 * step, "{} -> {}: {:#x}", from, to, min);
        }
    }

    #[test]
    fn surplus_negative_value_is_clamped() {
        assert_eq!(requantize_i32(-32768, 16, 16), -32767);
        assert_eq!(requantize_i32(-32768, 16, 32), requantize_i32(-32767, 16, 32));

        let mut out = [0.0f32; 1];
        i32_to_samples(&[-32768], 16, &mut out);
        assert_eq!(out[0], -1.0);
    }

    #[test]
    fn full_scale_maps_to_unit_floats() {
        let mut out = [0.0f32; 2];
        i32_to_samples(&[32767, -32767], 16, &mut out);
        assert_eq!(out, [1.0, -1.0]);

        let mut out = [0.0f64; 2];
        i32_to_samples(&[8_388_607, 0], 24, &mut out);
        assert_eq!(out, [1.0, 0.0]);
    }

    #[test]
    fn quantization_is_clamped_and_symmetric() {
        let mut out = [0i16; 3];
        f32_to_samples(&[1.5, -1.5, 1.0], &mut out);
        assert_eq!(out, [32767, -32767, 32767]);

        let mut out = [0u8; 3];
        f32_to_samples(&[1.0, -1.0, 0.0], &mut out);
        assert_eq!(out, [255, 1, 128]);

        let mut out = [0i32; 2];
        f64_to_samples(&[1.0, -1.0], &mut out);
        assert_eq!(out, [i32::MAX, -i32::MAX]);
    }

    #[test]
    fn quantize_then_reconstruct_is_identity_on_grid_points() {
        // Values that sit exactly on the quantization grid of the target width must
        // round-trip bit-exactly through quantize + reconstruct.
        for bits in [8u32, 16, 24] {
            let limit = symmetric_limit(bits);
            for n in [-limit, -limit / 2, -1, 0, 1, limit / 3, limit] {
                let normalized = n as f64 / limit as f64;

                let mut quantized = [0i32; 1];
                quantize_f64(&[normalized], bits, 0, &mut quantized);
                assert_eq!(quantized[0], n, "{} bits, n = {}", bits, n);

                let mut reconstructed = [0.0f64; 1];
                i32_to_samples(&quantized, bits, &mut reconstructed);
                assert_eq!(reconstructed[0], normalized, "{} bits, n = {}", bits, n);
            }
        }
    }

    #[test]
    fn widening_matches_a_float_round_trip_within_one_step() {
        // Bit replication approximates quantize(reconstruct(v)) at the wider width;
        // the two agree to within the widening step.
        for n in [-32767i32, -12345, -1, 0, 1, 77, 32767] {
            let widened = requantize_i32(n, 16, 24);

            let mut as_float = [0.0f64; 1];
            i32_to_samples(&[n], 16, &mut as_float);
            let mut requantized = [0i32; 1];
            quantize_f64(&as_float, 24, 0, &mut requantized);

            assert!(
                (widened - requantized[0]).abs() <= 2 << (24 - 16),
                "n = {}: replication {} vs float round trip {}",
                n,
                widened,
                requantized[0]
            );
        }
    }

    #[test]
    fn interleaved_block_conversion_covers_tails() {
        // Seven samples force both the batched kernels and the scalar tail to run.
        let src = [0i32, 1000, -1000, 32767, -32767, 12345, -12345];
        let mut via_block = [0.0f32; 7];
        i32_to_samples(&src, 16, &mut via_block);

        for (index, value) in src.iter().enumerate() {
            let mut single = [0.0f32; 1];
            i32_to_samples(&src[index..index + 1], 16, &mut single);
            assert_eq!(single[0], via_block[index], "index {}", index);
            let _ = value;
        }
    }
}
