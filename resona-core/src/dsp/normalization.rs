// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction of normalized floating-point samples from integers by division,
//! including the shift-then-divide variants for packed formats that store their valid
//! bits in the high bits of a 32-bit word.

/// Converts an integer into a normalized float by dividing it.
#[inline]
pub fn divide_i32_to_f32(value: i32, quotient: f32) -> f32 {
    value as f32 / quotient
}

/// Converts an integer into a normalized double by dividing it.
#[inline]
pub fn divide_i32_to_f64(value: i32, quotient: f64) -> f64 {
    value as f64 / quotient
}

/// Shifts an integer to the right, then divides it into a normalized float.
#[inline]
pub fn shift_divide_i32_to_f32(value: i32, shift: u32, quotient: f32) -> f32 {
    (value >> shift) as f32 / quotient
}

/// Shifts an integer to the right, then divides it into a normalized double.
#[inline]
pub fn shift_divide_i32_to_f64(value: i32, shift: u32, quotient: f64) -> f64 {
    (value >> shift) as f64 / quotient
}

/// Converts 4 integers into normalized floats by dividing them.
#[inline]
pub fn divide_i32_to_f32_x4(values: &[i32; 4], quotient: f32) -> [f32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::divide_i32_to_f32_x4(values, quotient)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| divide_i32_to_f32(value, quotient))
    }
}

/// Converts 4 integers into normalized floats with a double precision division.
#[inline]
pub fn divide_i32_to_f32_x4_wide(values: &[i32; 4], quotient: f64) -> [f32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::divide_i32_to_f32_x4_wide(values, quotient)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| (value as f64 / quotient) as f32)
    }
}

/// Converts 4 integers into normalized doubles by dividing them.
#[inline]
pub fn divide_i32_to_f64_x4(values: &[i32; 4], quotient: f64) -> [f64; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::divide_i32_to_f64_x4(values, quotient)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| divide_i32_to_f64(value, quotient))
    }
}

/// Shifts 4 integers to the right, then divides them into normalized floats.
#[inline]
pub fn shift_divide_i32_to_f32_x4(values: &[i32; 4], shift: u32, quotient: f32) -> [f32; 4] {
    let shifted = values.map(|value| value >> shift);
    divide_i32_to_f32_x4(&shifted, quotient)
}

/// Shifts 4 integers to the right, then divides them into normalized doubles.
#[inline]
pub fn shift_divide_i32_to_f64_x4(values: &[i32; 4], shift: u32, quotient: f64) -> [f64; 4] {
    let shifted = values.map(|value| value >> shift);
    divide_i32_to_f64_x4(&shifted, quotient)
}

#[cfg(feature = "opt-simd")]
mod simd {
    use wide::{f32x4, f64x4};

    // Lane conversion from i32 is done on the arrays; the division itself runs wide.
    // That keeps each lane's result bit-identical to the scalar kernel, which performs
    // exactly one rounding (the division) per value too.

    #[inline]
    pub fn divide_i32_to_f32_x4(values: &[i32; 4], quotient: f32) -> [f32; 4] {
        let v = f32x4::from(values.map(|value| value as f32));
        (v / f32x4::splat(quotient)).to_array()
    }

    #[inline]
    pub fn divide_i32_to_f32_x4_wide(values: &[i32; 4], quotient: f64) -> [f32; 4] {
        let v = f64x4::from(values.map(|value| value as f64));
        (v / f64x4::splat(quotient)).to_array().map(|lane| lane as f32)
    }

    #[inline]
    pub fn divide_i32_to_f64_x4(values: &[i32; 4], quotient: f64) -> [f64; 4] {
        let v = f64x4::from(values.map(|value| value as f64));
        (v / f64x4::splat(quotient)).to_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_normalizes_to_unit_range() {
        assert_eq!(divide_i32_to_f32(32767, 32767.0), 1.0);
        assert_eq!(divide_i32_to_f32(-32767, 32767.0), -1.0);
        assert_eq!(divide_i32_to_f32(0, 32767.0), 0.0);
        assert_eq!(divide_i32_to_f64(8_388_607, 8_388_607.0), 1.0);
    }

    #[test]
    fn shift_variant_drops_the_padding_bits() {
        // A 16-bit sample stored in the high half of a 32-bit word.
        let packed = 32767 << 16;
        assert_eq!(shift_divide_i32_to_f32(packed, 16, 32767.0), 1.0);
        assert_eq!(shift_divide_i32_to_f64(-packed, 16, 32767.0), -1.0);
    }

    #[test]
    fn batched_kernels_match_the_scalar_kernels() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(0xd117);
        for _ in 0..1024 {
            let values: [i32; 4] = [rng.gen(), rng.gen(), rng.gen_range(-32768..32768), 0];

            assert_eq!(
                divide_i32_to_f32_x4(&values, 32767.0),
                values.map(|v| divide_i32_to_f32(v, 32767.0))
            );
            assert_eq!(
                divide_i32_to_f32_x4_wide(&values, 2147483647.0),
                values.map(|v| (v as f64 / 2147483647.0) as f32)
            );
            assert_eq!(
                divide_i32_to_f64_x4(&values, 8388607.0),
                values.map(|v| divide_i32_to_f64(v, 8388607.0))
            );
            assert_eq!(
                shift_divide_i32_to_f32_x4(&values, 8, 8388607.0),
                values.map(|v| shift_divide_i32_to_f32(v, 8, 8388607.0))
            );
        }
    }
}
