// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-pattern extension for widening integer samples.
//!
//! Zero-padding a 16-bit sample into a 24- or 32-bit target under-fills the target
//! range: 0x7FFF becomes 0x7FFF0000, not 0x7FFFFFFF. Repeating the significant bits
//! into the padding instead fills the range completely and matches the result of a
//! round trip through floating point. The `repeat` variants append one extra copy of
//! the masked bits, the `triple` variants two; the `shift_*` variants left-align the
//! value first so packed formats can be unpacked and extended in one call.

/// Repeats the masked high bits of a signed integer once.
#[inline]
pub fn repeat_signed(value: i32, shift: u32, mask: i32) -> i32 {
    value | ((value >> shift) & mask)
}

/// Left-shifts a signed integer, then repeats its masked high bits once.
#[inline]
pub fn shift_repeat_signed(pre_shift: u32, value: i32, shift: u32, mask: i32) -> i32 {
    let value = value.wrapping_shl(pre_shift);
    value | ((value >> shift) & mask)
}

/// Repeats the masked high bits of a signed integer twice.
#[inline]
pub fn triple_signed(value: i32, shift: u32, mask: i32) -> i32 {
    let shifted = (value >> shift) & mask;
    value | shifted | (shifted >> shift)
}

/// Left-shifts a signed integer, then repeats its masked high bits twice.
#[inline]
pub fn shift_triple_signed(pre_shift: u32, value: i32, shift: u32, mask: i32) -> i32 {
    let value = value.wrapping_shl(pre_shift);
    let shifted = (value >> shift) & mask;
    value | shifted | (shifted >> shift)
}

/// Repeats the masked high bits of 4 signed integers once.
#[inline]
pub fn repeat_signed_x4(values: &[i32; 4], shift: u32, mask: i32) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::repeat_signed_x4(values, shift, mask)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| repeat_signed(value, shift, mask))
    }
}

/// Left-shifts 4 signed integers, then repeats their masked high bits once.
#[inline]
pub fn shift_repeat_signed_x4(pre_shift: u32, values: &[i32; 4], shift: u32, mask: i32) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::shift_repeat_signed_x4(pre_shift, values, shift, mask)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| shift_repeat_signed(pre_shift, value, shift, mask))
    }
}

/// Repeats the masked high bits of 4 signed integers twice.
#[inline]
pub fn triple_signed_x4(values: &[i32; 4], shift: u32, mask: i32) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::triple_signed_x4(values, shift, mask)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| triple_signed(value, shift, mask))
    }
}

/// Left-shifts 4 signed integers, then repeats their masked high bits twice.
#[inline]
pub fn shift_triple_signed_x4(pre_shift: u32, values: &[i32; 4], shift: u32, mask: i32) -> [i32; 4] {
    #[cfg(feature = "opt-simd")]
    {
        simd::shift_triple_signed_x4(pre_shift, values, shift, mask)
    }
    #[cfg(not(feature = "opt-simd"))]
    {
        values.map(|value| shift_triple_signed(pre_shift, value, shift, mask))
    }
}

#[cfg(feature = "opt-simd")]
mod simd {
    use wide::i32x4;

    #[inline]
    pub fn repeat_signed_x4(values: &[i32; 4], shift: u32, mask: i32) -> [i32; 4] {
        let input = i32x4::from(*values);
        (input | ((input >> shift) & i32x4::splat(mask))).to_array()
    }

    #[inline]
    pub fn shift_repeat_signed_x4(
        pre_shift: u32,
        values: &[i32; 4],
        shift: u32,
        mask: i32,
    ) -> [i32; 4] {
        let input = i32x4::from(*values) << pre_shift;
        (input | ((input >> shift) & i32x4::splat(mask))).to_array()
    }

    #[inline]
    pub fn triple_signed_x4(values: &[i32; 4], shift: u32, mask: i32) -> [i32; 4] {
        let input = i32x4::from(*values);
        let shifted = (input >> shift) & i32x4::splat(mask);
        (input | shifted | (shifted >> shift)).to_array()
    }

    #[inline]
    pub fn shift_triple_signed_x4(
        pre_shift: u32,
        values: &[i32; 4],
        shift: u32,
        mask: i32,
    ) -> [i32; 4] {
        let input = i32x4::from(*values) << pre_shift;
        let shifted = (input >> shift) & i32x4::splat(mask);
        (input | shifted | (shifted >> shift)).to_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeating_appends_one_copy_of_the_pattern() {
        assert_eq!(repeat_signed(0x1230_0000, 12, 0x000F_FF00), 0x1231_2300);
        assert_eq!(repeat_signed(0x8420_0000u32 as i32, 12, 0x000F_FF00), 0x8428_4200u32 as i32);
        // Widening 16 valid bits to 32: full scale in, full scale (to within one
        // 16-bit step) out.
        assert_eq!(shift_repeat_signed(16, 0x7FFF, 16, 0xFFFF), 0x7FFF_7FFF);
        assert_eq!(shift_repeat_signed(16, -0x8000, 16, 0xFFFF), 0x8000_8000u32 as i32);
        // Widening 16 valid bits to 24 in a 32-bit word.
        assert_eq!(repeat_signed(0x7FFF << 8, 16, 0xFF), 0x7FFF7F);
    }

    #[test]
    fn tripling_appends_two_copies_of_the_pattern() {
        assert_eq!(triple_signed(0x1230_0000, 12, 0x000F_FF00), 0x1231_2312);
        assert_eq!(triple_signed(0x8420_0000u32 as i32, 12, 0x000F_FF00), 0x8428_4284u32 as i32);
        // Widening 8 valid bits to 32 replicates the byte into bits 23..8.
        assert_eq!(shift_triple_signed(24, 0x7F, 8, 0x00FF_0000), 0x7F7F_7F00);
    }

    #[test]
    fn extension_preserves_the_sign_bit() {
        for value in [-0x8000i32, -0x4321, -1, 0, 1, 0x1234, 0x7FFF] {
            let widened = shift_repeat_signed(16, value, 16, 0xFFFF);
            assert_eq!(widened < 0, value < 0, "{:#x}", value);
        }
        for value in [-0x80i32, -5, 0, 5, 0x7F] {
            let widened = shift_triple_signed(24, value, 8, 0x00FF_0000);
            assert_eq!(widened < 0, value < 0, "{:#x}", value);
        }
    }

    #[test]
    fn batched_kernels_match_the_scalar_kernels() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(0xb175);
        for _ in 0..1024 {
            let values: [i32; 4] = [rng.gen(), rng.gen(), rng.gen(), rng.gen()];

            assert_eq!(
                repeat_signed_x4(&values, 16, 0xFFFF),
                values.map(|v| repeat_signed(v, 16, 0xFFFF))
            );
            assert_eq!(
                shift_repeat_signed_x4(8, &values, 24, 0xFF),
                values.map(|v| shift_repeat_signed(8, v, 24, 0xFF))
            );
            assert_eq!(
                triple_signed_x4(&values, 8, 0x00FF_0000),
                values.map(|v| triple_signed(v, 8, 0x00FF_0000))
            );
            assert_eq!(
                shift_triple_signed_x4(24, &values, 8, 0x00FF_0000),
                values.map(|v| shift_triple_signed(24, v, 8, 0x00FF_0000))
            );
        }
    }
}
