// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rounding of floating-point values to 32-bit integers, plus the multiply-then-round
//! variants used when quantizing normalized samples.
//!
//! Conversions that overflow the `i32` range saturate (the semantics of Rust's `as`
//! cast), in both the scalar and the SIMD paths. Callers quantizing audio clamp their
//! inputs to the normalized range first, so saturation only matters for hostile input.

/// Rounds a floating point value to the nearest 32-bit integer, ties away from zero.
#[inline]
pub fn nearest_i32(value: f32) -> i32 {
    (value + 0.5f32.copysign(value)) as i32
}

/// Rounds a double precision value to the nearest 32-bit integer, ties away from zero.
#[inline]
pub fn nearest_i32_from_f64(value: f64) -> i32 {
    (value + 0.5f64.copysign(value)) as i32
}

/// Multiplies a value by a factor, then rounds to the nearest 32-bit integer.
#[inline]
pub fn multiply_to_nearest_i32(value: f32, factor: f32) -> i32 {
    let product = value * factor;
    (product + 0.5f32.copysign(product)) as i32
}

/// Multiplies a value by a double precision factor, then rounds to the nearest
/// 32-bit integer. Used for target ranges `f32` cannot represent exactly.
#[inline]
pub fn multiply_to_nearest_i32_wide(value: f32, factor: f64) -> i32 {
    let product = value as f64 * factor;
    (product + 0.5f64.copysign(product)) as i32
}

/// Multiplies a double precision value by a factor, then rounds to the nearest
/// 32-bit integer.
#[inline]
pub fn multiply_to_nearest_i32_from_f64(value: f64, factor: f64) -> i32 {
    let product = value * factor;
    (product + 0.5f64.copysign(product)) as i32
}

/// Rounds 4 floating point values to their nearest 32-bit integers.
#[inline]
pub fn nearest_i32_x4(values: &[f32; 4]) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::nearest_i32_x4(values)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(nearest_i32)
    }
}

/// Rounds 4 double precision values to their nearest 32-bit integers.
#[inline]
pub fn nearest_i32_x4_from_f64(values: &[f64; 4]) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::nearest_i32_x4_from_f64(values)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(nearest_i32_from_f64)
    }
}

/// Multiplies 4 values by a factor, then rounds them to the nearest 32-bit integers.
#[inline]
pub fn multiply_to_nearest_i32_x4(values: &[f32; 4], factor: f32) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::multiply_to_nearest_i32_x4(values, factor)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| multiply_to_nearest_i32(value, factor))
    }
}

/// Multiplies 4 values by a double precision factor, then rounds them to the nearest
/// 32-bit integers.
#[inline]
pub fn multiply_to_nearest_i32_x4_wide(values: &[f32; 4], factor: f64) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::multiply_to_nearest_i32_x4_wide(values, factor)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| multiply_to_nearest_i32_wide(value, factor))
    }
}

/// Multiplies 4 double precision values by a factor, then rounds them to the nearest
/// 32-bit integers.
#[inline]
pub fn multiply_to_nearest_i32_x4_from_f64(values: &[f64; 4], factor: f64) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::multiply_to_nearest_i32_x4_from_f64(values, factor)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| multiply_to_nearest_i32_from_f64(value, factor))
    }
}

#[cfg(feature = "opt-simd")]
mod simd {
    use wide::{f32x4, f64x4};

    // The vector lanes go through the same add-half-then-truncate arithmetic as the
    // scalar kernels; the final conversion is done per lane so the saturating cast
    // matches the scalar path on every input.

    #[inline]
    pub fn nearest_i32_x4(values: &[f32; 4]) -> [i32; 4] {
        let v = f32x4::from(*values);
        let half = (v & f32x4::splat(-0.0)) | f32x4::splat(0.5);
        (v + half).to_array().map(|lane| lane as i32)
    }

    #[inline]
    pub fn nearest_i32_x4_from_f64(values: &[f64; 4]) -> [i32; 4] {
        let v = f64x4::from(*values);
        let half = (v & f64x4::splat(-0.0)) | f64x4::splat(0.5);
        (v + half).to_array().map(|lane| lane as i32)
    }

    #[inline]
    pub fn multiply_to_nearest_i32_x4(values: &[f32; 4], factor: f32) -> [i32; 4] {
        let product = f32x4::from(*values) * f32x4::splat(factor);
        let half = (product & f32x4::splat(-0.0)) | f32x4::splat(0.5);
        (product + half).to_array().map(|lane| lane as i32)
    }

    #[inline]
    pub fn multiply_to_nearest_i32_x4_wide(values: &[f32; 4], factor: f64) -> [i32; 4] {
        let widened = values.map(|value| value as f64);
        let product = f64x4::from(widened) * f64x4::splat(factor);
        let half = (product & f64x4::splat(-0.0)) | f64x4::splat(0.5);
        (product + half).to_array().map(|lane| lane as i32)
    }

    #[inline]
    pub fn multiply_to_nearest_i32_x4_from_f64(values: &[f64; 4], factor: f64) -> [i32; 4] {
        let product = f64x4::from(*values) * f64x4::splat(factor);
        let half = (product & f64x4::splat(-0.0)) | f64x4::splat(0.5);
        (product + half).to_array().map(|lane| lane as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_nearest() {
        assert_eq!(nearest_i32(0.4), 0);
        assert_eq!(nearest_i32(0.6), 1);
        assert_eq!(nearest_i32(-0.4), 0);
        assert_eq!(nearest_i32(-0.6), -1);
        assert_eq!(nearest_i32(32766.7), 32767);
    }

    #[test]
    fn ties_round_away_from_zero() {
        assert_eq!(nearest_i32(0.5), 1);
        assert_eq!(nearest_i32(-0.5), -1);
        assert_eq!(nearest_i32(2.5), 3);
        assert_eq!(nearest_i32(-2.5), -3);
        assert_eq!(nearest_i32_from_f64(1.5), 2);
        assert_eq!(nearest_i32_from_f64(-1.5), -2);
    }

    #[test]
    fn multiply_then_round_uses_the_product_sign() {
        assert_eq!(multiply_to_nearest_i32(0.25, 2.0), 1);
        assert_eq!(multiply_to_nearest_i32(-0.25, 2.0), -1);
        assert_eq!(multiply_to_nearest_i32(1.0, 32767.0), 32767);
        assert_eq!(multiply_to_nearest_i32(-1.0, 32767.0), -32767);
        assert_eq!(multiply_to_nearest_i32_wide(1.0, 2147483647.0), 2147483647);
        assert_eq!(multiply_to_nearest_i32_wide(-1.0, 2147483647.0), -2147483647);
    }

    #[test]
    fn batched_kernels_match_the_scalar_kernels() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for _ in 0..1024 {
            let values: [f32; 4] = [
                rng.gen_range(-2.0f32..2.0),
                rng.gen_range(-2.0f32..2.0),
                rng.gen_range(-1.0f32..1.0),
                // Exercise exact ties and whole values as well.
                (rng.gen_range(-8i32..8) as f32) * 0.5,
            ];
            let factor: f32 = rng.gen_range(0.0f32..65536.0);

            assert_eq!(nearest_i32_x4(&values), values.map(nearest_i32));
            assert_eq!(
                multiply_to_nearest_i32_x4(&values, factor),
                values.map(|v| multiply_to_nearest_i32(v, factor))
            );
            assert_eq!(
                multiply_to_nearest_i32_x4_wide(&values, 2147483647.0),
                values.map(|v| multiply_to_nearest_i32_wide(v, 2147483647.0))
            );

            let doubles = values.map(|v| v as f64);
            assert_eq!(nearest_i32_x4_from_f64(&doubles), doubles.map(nearest_i32_from_f64));
            assert_eq!(
                multiply_to_nearest_i32_x4_from_f64(&doubles, factor as f64),
                doubles.map(|v| multiply_to_nearest_i32_from_f64(v, factor as f64))
            );
        }
    }
}
