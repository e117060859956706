// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoding of one lossless WavPack block: the LSB-first bitstream, the
//! median-driven residual decoder with its run-length zero coding, the
//! decorrelation passes, and the joint-stereo restore.
//!
//! Only the normal lossless PCM mode is implemented. Hybrid (lossy) blocks,
//! floating-point blocks, and DSD blocks are detected at the container level and
//! rejected before decoding starts.

use std::sync::OnceLock;

use resona_core::errors::{corrupted_file_error, Result};
use resona_core::io::endian::{ByteOrderReader, LittleEndianReader};

use crate::block::{BlockHeader, MetadataId, SubBlockIter};

/// Decorrelation history length for the positive filter terms.
const MAX_TERM: usize = 8;

/// Longest run of unary ones before the escaped counting form takes over.
const LIMIT_ONES: u32 = 16;

/// An LSB-first bit reader over a bitstream sub-block.
///
/// Reads past the end return zero bits and set a flag; the caller treats an
/// overrun as a corrupted block after the sample loop finishes.
struct Bitstream<'a> {
    bytes: &'a [u8],
    at: usize,
    bit: u32,
    overrun: bool,
}

impl<'a> Bitstream<'a> {
    fn new(bytes: &'a [u8]) -> Bitstream<'a> {
        Bitstream { bytes, at: 0, bit: 0, overrun: false }
    }

    #[inline]
    fn get_bit(&mut self) -> bool {
        if self.at >= self.bytes.len() {
            self.overrun = true;
            return false;
        }

        let bit = (self.bytes[self.at] >> self.bit) & 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.at += 1;
        }
        bit != 0
    }

    #[inline]
    fn get_bits(&mut self, count: u32) -> u32 {
        let mut value = 0u32;
        for index in 0..count {
            if self.get_bit() {
                value |= 1 << index;
            }
        }
        value
    }

    #[inline]
    fn peek_byte(&mut self) -> u8 {
        let mut value = 0u8;
        let (saved_at, saved_bit, saved_overrun) = (self.at, self.bit, self.overrun);
        for index in 0..8 {
            if self.get_bit() {
                value |= 1 << index;
            }
        }
        self.at = saved_at;
        self.bit = saved_bit;
        self.overrun = saved_overrun;
        value
    }
}

/// Exponential lookup used by the stored log2-domain values (decorrelation sample
/// history and entropy medians).
fn exp2_table() -> &'static [u16; 256] {
    static TABLE: OnceLock<[u16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u16; 256];
        for (index, entry) in table.iter_mut().enumerate() {
            *entry = ((index as f64 / 256.0).exp2() * 256.0).round() as u16 - 256;
        }
        table
    })
}

/// Expands a signed 16-bit log2-domain value into its linear form.
fn wp_exp2(log: i16) -> i32 {
    if log < 0 {
        return -wp_exp2(-log);
    }

    let value = (exp2_table()[(log & 0xFF) as usize] | 0x100) as u32;
    let log = log >> 8;
    if log <= 9 {
        (value >> (9 - log)) as i32
    } else {
        (value << (log - 9)) as i32
    }
}

/// One decorrelation pass: a prediction term, its adaption rate, and the running
/// weights and sample history for both channels.
#[derive(Clone, Default)]
struct DecorrPass {
    term: i32,
    delta: i32,
    weight_a: i32,
    weight_b: i32,
    samples_a: [i32; MAX_TERM],
    samples_b: [i32; MAX_TERM],
}

#[inline]
fn apply_weight(weight: i32, sample: i32) -> i32 {
    ((weight as i64 * sample as i64 + 512) >> 10) as i32
}

#[inline]
fn update_weight(weight: &mut i32, delta: i32, source: i32, result: i32) {
    if source != 0 && result != 0 {
        *weight = weight.wrapping_add((((source ^ result) >> 30) | 1) * delta);
    }
}

#[inline]
fn update_weight_clip(weight: &mut i32, delta: i32, source: i32, result: i32) {
    if source != 0 && result != 0 {
        if (source ^ result) < 0 {
            *weight = i32::max(*weight - delta, -1024);
        } else {
            *weight = i32::min(*weight + delta, 1024);
        }
    }
}

/// The per-channel median triplet driving the residual decoder.
#[derive(Clone, Copy, Default)]
struct Entropy {
    median: [u32; 3],
}

impl Entropy {
    #[inline]
    fn get_med(&self, index: usize) -> u32 {
        (self.median[index] >> 4) + 1
    }

    #[inline]
    fn dec_med(&mut self, index: usize) {
        let den = 128 >> index;
        let median = self.median[index];
        self.median[index] = median.wrapping_sub((median.wrapping_add(den - 2) / den) * 2);
    }

    #[inline]
    fn inc_med(&mut self, index: usize) {
        let den = 128 >> index;
        let factor = if index == 0 { 2 } else { 5 };
        let median = self.median[index];
        self.median[index] =
            median.wrapping_add((median.wrapping_add(den) / den).wrapping_mul(factor));
    }
}

/// Residual decoder state shared by all samples of one block.
struct WordsDecoder {
    channels: [Entropy; 2],
    holding_one: u32,
    holding_zero: bool,
    zeros_acc: u32,
}

impl WordsDecoder {
    fn new(channels: [Entropy; 2]) -> WordsDecoder {
        WordsDecoder { channels, holding_one: 0, holding_zero: false, zeros_acc: 0 }
    }

    /// Decodes `buffer.len()` residuals, alternating channels unless `mono`.
    fn get_words(&mut self, bitstream: &mut Bitstream<'_>, buffer: &mut [i32], mono: bool) -> Result<()> {
        for index in 0..buffer.len() {
            let channel = if mono { 0 } else { index & 1 };

            // Runs of zero samples across both channels are length coded once both
            // median sets have collapsed.
            if self.channels[0].median[0] < 2
                && self.channels[1].median[0] < 2
                && self.holding_one == 0
                && !self.holding_zero
            {
                if self.zeros_acc > 0 {
                    self.zeros_acc -= 1;
                    if self.zeros_acc > 0 {
                        buffer[index] = 0;
                        continue;
                    }
                } else {
                    let zeros = match read_elias_count(bitstream) {
                        Some(zeros) => zeros,
                        None => return corrupted_file_error("WavPack bitstream is malformed"),
                    };
                    self.zeros_acc = zeros;
                    if self.zeros_acc > 0 {
                        self.channels[0] = Entropy::default();
                        self.channels[1] = Entropy::default();
                        buffer[index] = 0;
                        continue;
                    }
                }
            }

            let ones_count;
            if self.holding_zero {
                self.holding_zero = false;
                ones_count = 0;
            } else {
                let next_byte = bitstream.peek_byte();

                let mut count;
                if next_byte == 0xFF {
                    bitstream.get_bits(8);
                    count = 8;
                    while count < LIMIT_ONES + 1 && bitstream.get_bit() {
                        count += 1;
                    }
                    if count == LIMIT_ONES + 1 {
                        return corrupted_file_error("WavPack bitstream is malformed");
                    }
                    if count == LIMIT_ONES {
                        count = match read_elias_count(bitstream) {
                            Some(extra) => extra + LIMIT_ONES,
                            None => {
                                return corrupted_file_error("WavPack bitstream is malformed")
                            }
                        };
                    }
                } else {
                    count = next_byte.trailing_ones();
                    bitstream.get_bits(count + 1);
                }

                if self.holding_one != 0 {
                    self.holding_one = count & 1;
                    ones_count = (count >> 1) + 1;
                } else {
                    self.holding_one = count & 1;
                    ones_count = count >> 1;
                }
                self.holding_zero = self.holding_one == 0;
            }

            // Corrupt input can push the medians to absurd values; the arithmetic
            // wraps like the reference implementation and the checksum catches the
            // garbage afterwards.
            let entropy = &mut self.channels[channel];
            let (low, high);
            if ones_count == 0 {
                low = 0;
                high = entropy.get_med(0).wrapping_sub(1);
                entropy.dec_med(0);
            } else {
                let mut base = entropy.get_med(0);
                entropy.inc_med(0);

                if ones_count == 1 {
                    low = base;
                    high = low.wrapping_add(entropy.get_med(1)).wrapping_sub(1);
                    entropy.dec_med(1);
                } else {
                    base = base.wrapping_add(entropy.get_med(1));
                    entropy.inc_med(1);

                    if ones_count == 2 {
                        low = base;
                        high = low.wrapping_add(entropy.get_med(2)).wrapping_sub(1);
                        entropy.dec_med(2);
                    } else {
                        low = base
                            .wrapping_add((ones_count - 2).wrapping_mul(entropy.get_med(2)));
                        high = low.wrapping_add(entropy.get_med(2)).wrapping_sub(1);
                        entropy.inc_med(2);
                    }
                }
            }

            let value = low.wrapping_add(read_code(bitstream, high.wrapping_sub(low)));
            buffer[index] = if bitstream.get_bit() { !(value as i32) } else { value as i32 };
        }

        if bitstream.overrun {
            return corrupted_file_error("WavPack bitstream ended inside the audio data");
        }
        Ok(())
    }
}

/// Reads the recursively counted form used for zero runs and long one runs: a unary
/// bit count followed by that many literal bits with an implied top bit.
fn read_elias_count(bitstream: &mut Bitstream<'_>) -> Option<u32> {
    let mut count_bits = 0u32;
    while count_bits < 33 && bitstream.get_bit() {
        count_bits += 1;
    }
    if count_bits == 33 {
        return None;
    }

    if count_bits < 2 {
        return Some(count_bits);
    }

    let mut value = bitstream.get_bits(count_bits - 1);
    value |= 1 << (count_bits - 1);
    Some(value)
}

/// Reads a value in `0..=maxcode` using the fewest possible bits.
fn read_code(bitstream: &mut Bitstream<'_>, maxcode: u32) -> u32 {
    let bit_count = 32 - maxcode.leading_zeros();
    if bit_count == 0 {
        return 0;
    }

    let extras = ((1u64 << bit_count) - maxcode as u64 - 1) as u32;
    let mut code = bitstream.get_bits(bit_count - 1);
    if code >= extras {
        code = (code << 1) - extras;
        if bitstream.get_bit() {
            code += 1;
        }
    }
    code
}

/// Everything gathered from one block's metadata that decoding needs.
#[derive(Default)]
struct BlockDecoderState {
    passes: Vec<DecorrPass>,
    entropy: [Entropy; 2],
    int32_zeros: u8,
    int32_ones: u8,
    int32_dups: u8,
    int32_sent_bits: u8,
}

fn read_decorr_terms(data: &[u8], state: &mut BlockDecoderState) -> Result<()> {
    let mut passes = vec![DecorrPass::default(); data.len()];

    // The file stores the passes in reverse of their application order.
    for (byte, pass) in data.iter().zip(passes.iter_mut().rev()) {
        pass.term = (byte & 0x1F) as i32 - 5;
        pass.delta = ((byte >> 5) & 0x7) as i32;

        let valid = matches!(pass.term, -3..=-1) || matches!(pass.term, 1..=8 | 17 | 18);
        if !valid {
            return corrupted_file_error("WavPack block uses an invalid decorrelation term");
        }
    }

    state.passes = passes;
    Ok(())
}

fn read_decorr_weights(data: &[u8], mono: bool, state: &mut BlockDecoderState) -> Result<()> {
    let per_term = if mono { 1 } else { 2 };
    let term_count = data.len() / per_term;
    if term_count > state.passes.len() {
        return corrupted_file_error("WavPack block carries more weights than filter terms");
    }

    fn restore_weight(weight: i8) -> i32 {
        let mut result = (weight as i32) << 3;
        if result > 0 {
            result += (result + 64) >> 7;
        }
        result
    }

    // Weights fill the passes from the last applied backward, like the terms.
    let mut bytes = data.iter();
    for pass in state.passes.iter_mut().rev().take(term_count) {
        pass.weight_a = restore_weight(*bytes.next().unwrap() as i8);
        if !mono {
            pass.weight_b = restore_weight(*bytes.next().unwrap() as i8);
        }
    }

    Ok(())
}

fn read_decorr_samples(data: &[u8], header: &BlockHeader, state: &mut BlockDecoderState) -> Result<()> {
    let mono = header.is_mono_encoded();
    let mut at = 0usize;

    // The very first WavPack 4 release stored two extra hybrid values up front.
    if header.version == 0x402 && header.is_hybrid() {
        at += if mono { 2 } else { 4 };
    }

    let mut read_value = |at: &mut usize| -> Result<i32> {
        if *at + 2 > data.len() {
            return corrupted_file_error("WavPack decorrelation history is truncated");
        }
        let value = wp_exp2(LittleEndianReader::read_u16(data, *at) as i16);
        *at += 2;
        Ok(value)
    };

    for pass in state.passes.iter_mut().rev() {
        if at >= data.len() {
            break;
        }

        if pass.term > MAX_TERM as i32 {
            pass.samples_a[0] = read_value(&mut at)?;
            pass.samples_a[1] = read_value(&mut at)?;
            if !mono {
                pass.samples_b[0] = read_value(&mut at)?;
                pass.samples_b[1] = read_value(&mut at)?;
            }
        } else if pass.term < 0 {
            pass.samples_a[0] = read_value(&mut at)?;
            if !mono {
                pass.samples_b[0] = read_value(&mut at)?;
            }
        } else {
            for index in 0..pass.term as usize {
                pass.samples_a[index] = read_value(&mut at)?;
                if !mono {
                    pass.samples_b[index] = read_value(&mut at)?;
                }
            }
        }
    }

    Ok(())
}

fn read_entropy_vars(data: &[u8], mono: bool, state: &mut BlockDecoderState) -> Result<()> {
    let expected = if mono { 6 } else { 12 };
    if data.len() != expected {
        return corrupted_file_error("WavPack entropy sub-block has the wrong size");
    }

    for index in 0..3 {
        state.entropy[0].median[index] =
            wp_exp2(LittleEndianReader::read_u16(data, index * 2) as i16) as u32;
    }
    if !mono {
        for index in 0..3 {
            state.entropy[1].median[index] =
                wp_exp2(LittleEndianReader::read_u16(data, 6 + index * 2) as i16) as u32;
        }
    }

    Ok(())
}

fn read_int32_info(data: &[u8], state: &mut BlockDecoderState) -> Result<()> {
    if data.len() != 4 {
        return corrupted_file_error("WavPack int32 sub-block has the wrong size");
    }
    state.int32_sent_bits = data[0];
    state.int32_zeros = data[1];
    state.int32_ones = data[2];
    state.int32_dups = data[3];
    Ok(())
}

/// Runs one decorrelation pass over interleaved stereo samples.
fn decorr_stereo_pass(pass: &mut DecorrPass, buffer: &mut [i32]) {
    let delta = pass.delta;

    match pass.term {
        17 | 18 => {
            for frame in buffer.chunks_exact_mut(2) {
                let sam_a = if pass.term == 17 {
                    pass.samples_a[0].wrapping_mul(2).wrapping_sub(pass.samples_a[1])
                } else {
                    pass.samples_a[0].wrapping_mul(3).wrapping_sub(pass.samples_a[1]) >> 1
                };
                pass.samples_a[1] = pass.samples_a[0];
                pass.samples_a[0] = apply_weight(pass.weight_a, sam_a).wrapping_add(frame[0]);
                update_weight(&mut pass.weight_a, delta, sam_a, frame[0]);
                frame[0] = pass.samples_a[0];

                let sam_b = if pass.term == 17 {
                    pass.samples_b[0].wrapping_mul(2).wrapping_sub(pass.samples_b[1])
                } else {
                    pass.samples_b[0].wrapping_mul(3).wrapping_sub(pass.samples_b[1]) >> 1
                };
                pass.samples_b[1] = pass.samples_b[0];
                pass.samples_b[0] = apply_weight(pass.weight_b, sam_b).wrapping_add(frame[1]);
                update_weight(&mut pass.weight_b, delta, sam_b, frame[1]);
                frame[1] = pass.samples_b[0];
            }
        }
        term @ 1..=8 => {
            let term = term as usize;
            let mut m = 0usize;
            let mut k = term & (MAX_TERM - 1);
            for frame in buffer.chunks_exact_mut(2) {
                let sam_a = pass.samples_a[m];
                let sam_b = pass.samples_b[m];
                pass.samples_a[k] = apply_weight(pass.weight_a, sam_a).wrapping_add(frame[0]);
                pass.samples_b[k] = apply_weight(pass.weight_b, sam_b).wrapping_add(frame[1]);
                update_weight(&mut pass.weight_a, delta, sam_a, frame[0]);
                update_weight(&mut pass.weight_b, delta, sam_b, frame[1]);
                frame[0] = pass.samples_a[k];
                frame[1] = pass.samples_b[k];
                m = (m + 1) & (MAX_TERM - 1);
                k = (k + 1) & (MAX_TERM - 1);
            }
        }
        -1 => {
            for frame in buffer.chunks_exact_mut(2) {
                let sam_a = frame[0].wrapping_add(apply_weight(pass.weight_a, pass.samples_a[0]));
                update_weight_clip(&mut pass.weight_a, delta, pass.samples_a[0], frame[0]);
                frame[0] = sam_a;
                pass.samples_a[0] = frame[1].wrapping_add(apply_weight(pass.weight_b, sam_a));
                update_weight_clip(&mut pass.weight_b, delta, sam_a, frame[1]);
                frame[1] = pass.samples_a[0];
            }
        }
        -2 => {
            for frame in buffer.chunks_exact_mut(2) {
                let sam_b = frame[1].wrapping_add(apply_weight(pass.weight_b, pass.samples_b[0]));
                update_weight_clip(&mut pass.weight_b, delta, pass.samples_b[0], frame[1]);
                frame[1] = sam_b;
                pass.samples_b[0] = frame[0].wrapping_add(apply_weight(pass.weight_a, sam_b));
                update_weight_clip(&mut pass.weight_a, delta, sam_b, frame[0]);
                frame[0] = pass.samples_b[0];
            }
        }
        -3 => {
            for frame in buffer.chunks_exact_mut(2) {
                let sam_a = frame[0].wrapping_add(apply_weight(pass.weight_a, pass.samples_a[0]));
                update_weight_clip(&mut pass.weight_a, delta, pass.samples_a[0], frame[0]);
                let sam_b = frame[1].wrapping_add(apply_weight(pass.weight_b, pass.samples_b[0]));
                update_weight_clip(&mut pass.weight_b, delta, pass.samples_b[0], frame[1]);
                frame[0] = sam_a;
                pass.samples_b[0] = sam_a;
                frame[1] = sam_b;
                pass.samples_a[0] = sam_b;
            }
        }
        _ => {}
    }
}

/// Runs one decorrelation pass over mono samples.
fn decorr_mono_pass(pass: &mut DecorrPass, buffer: &mut [i32]) {
    let delta = pass.delta;

    match pass.term {
        17 | 18 => {
            for sample in buffer.iter_mut() {
                let sam = if pass.term == 17 {
                    pass.samples_a[0].wrapping_mul(2).wrapping_sub(pass.samples_a[1])
                } else {
                    pass.samples_a[0].wrapping_mul(3).wrapping_sub(pass.samples_a[1]) >> 1
                };
                pass.samples_a[1] = pass.samples_a[0];
                pass.samples_a[0] = apply_weight(pass.weight_a, sam).wrapping_add(*sample);
                update_weight(&mut pass.weight_a, delta, sam, *sample);
                *sample = pass.samples_a[0];
            }
        }
        term @ 1..=8 => {
            let term = term as usize;
            let mut m = 0usize;
            let mut k = term & (MAX_TERM - 1);
            for sample in buffer.iter_mut() {
                let sam = pass.samples_a[m];
                pass.samples_a[k] = apply_weight(pass.weight_a, sam).wrapping_add(*sample);
                update_weight(&mut pass.weight_a, delta, sam, *sample);
                *sample = pass.samples_a[k];
                m = (m + 1) & (MAX_TERM - 1);
                k = (k + 1) & (MAX_TERM - 1);
            }
        }
        // The cross-channel terms cannot occur in mono blocks.
        _ => {}
    }
}

/// The decoded audio of one block: interleaved samples for the channels the block
/// stores (one or two).
pub struct DecodedBlock {
    pub samples: Vec<i32>,
    pub channels: usize,
}

/// Decodes the audio of one lossless PCM block. `body` is everything behind the
/// 32-byte header.
pub fn decode_block(header: &BlockHeader, body: &[u8]) -> Result<DecodedBlock> {
    let mono = header.is_mono_encoded();
    let frames = header.block_samples as usize;

    let mut state = BlockDecoderState::default();
    let mut bitstream_data: Option<&[u8]> = None;

    for sub_block in SubBlockIter::new(body) {
        let sub_block = sub_block?;
        match sub_block.id {
            MetadataId::DecorrTerms => read_decorr_terms(sub_block.data, &mut state)?,
            MetadataId::DecorrWeights => read_decorr_weights(sub_block.data, mono, &mut state)?,
            MetadataId::DecorrSamples => read_decorr_samples(sub_block.data, header, &mut state)?,
            MetadataId::EntropyVars => read_entropy_vars(sub_block.data, mono, &mut state)?,
            MetadataId::Int32Info => read_int32_info(sub_block.data, &mut state)?,
            MetadataId::WvBitstream => bitstream_data = Some(sub_block.data),
            _ => {}
        }
    }

    let bitstream_data = match bitstream_data {
        Some(data) => data,
        None => return corrupted_file_error("WavPack block carries no audio bitstream"),
    };

    if state.int32_sent_bits != 0 {
        return resona_core::errors::unsupported_format_error(
            "WavPack blocks with transmitted low-order bits are not supported",
        );
    }

    // Residuals for every stored sample, channel interleaved for stereo.
    let sample_count = frames * if mono { 1 } else { 2 };
    let mut samples = vec![0i32; sample_count];
    let mut bitstream = Bitstream::new(bitstream_data);
    let mut words = WordsDecoder::new(state.entropy);
    words.get_words(&mut bitstream, &mut samples, mono)?;

    // Reverse the decorrelation passes in their application order.
    if mono {
        for pass in state.passes.iter_mut() {
            decorr_mono_pass(pass, &mut samples);
        }
    } else {
        for pass in state.passes.iter_mut() {
            decorr_stereo_pass(pass, &mut samples);
        }

        if header.is_joint_stereo() {
            for frame in samples.chunks_exact_mut(2) {
                frame[1] = frame[1].wrapping_sub(frame[0] >> 1);
                frame[0] = frame[0].wrapping_add(frame[1]);
            }
        }
    }

    // The checksum covers the samples before the output shift is applied.
    let mut crc = 0xFFFF_FFFFu32;
    for sample in &samples {
        crc = crc.wrapping_mul(3).wrapping_add(*sample as u32);
    }
    if crc != header.crc {
        return corrupted_file_error("WavPack block failed its checksum");
    }

    // Restore zeroed, oned, or duplicated low-order bits, then the output shift.
    let int32_shift = state.int32_zeros as u32 + state.int32_ones as u32 + state.int32_dups as u32;
    if int32_shift > 0 {
        let ones = state.int32_ones as u32;
        let dups = state.int32_dups as u32;
        for sample in samples.iter_mut() {
            if state.int32_zeros != 0 {
                *sample = sample.wrapping_shl(state.int32_zeros as u32);
            } else if ones != 0 {
                *sample = sample.wrapping_shl(ones) | ((1i32 << ones) - 1);
            } else if dups != 0 {
                let fill = if *sample & 1 != 0 { (1i32 << dups) - 1 } else { 0 };
                *sample = sample.wrapping_shl(dups) | fill;
            }
        }
    }

    let shift = header.output_shift();
    if shift > 0 {
        for sample in samples.iter_mut() {
            *sample = sample.wrapping_shl(shift);
        }
    }

    // A false stereo block stores one channel that plays on two.
    if header.is_false_stereo() {
        let mut expanded = Vec::with_capacity(samples.len() * 2);
        for sample in &samples {
            expanded.push(*sample);
            expanded.push(*sample);
        }
        return Ok(DecodedBlock { samples: expanded, channels: 2 });
    }

    let channels = if header.is_mono_flagged() { 1 } else { 2 };
    Ok(DecodedBlock { samples, channels })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitstream_reads_lsb_first() {
        let mut bitstream = Bitstream::new(&[0b1010_0110, 0xFF]);
        assert!(!bitstream.get_bit());
        assert!(bitstream.get_bit());
        assert!(bitstream.get_bit());
        assert_eq!(bitstream.get_bits(5), 0b10100);
        assert_eq!(bitstream.peek_byte(), 0xFF);
        assert_eq!(bitstream.get_bits(8), 0xFF);
        assert!(!bitstream.overrun);

        bitstream.get_bit();
        assert!(bitstream.overrun);
    }

    #[test]
    fn exp2_is_monotonic_and_anchored() {
        // The log domain maps k * 256 to 2^(k-1); zero stands for zero.
        assert_eq!(wp_exp2(0), 0);
        assert_eq!(wp_exp2(256), 1);
        assert_eq!(wp_exp2(512), 2);
        assert_eq!(wp_exp2(9 * 256), 256);
        assert_eq!(wp_exp2(-512), -2);

        let mut previous = 0;
        for log in (0..0x2000).step_by(17) {
            let value = wp_exp2(log as i16);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn read_code_is_uniform_at_power_of_two_ranges() {
        // maxcode = 7 needs exactly 3 bits: 0b101 read LSB-first.
        let mut bitstream = Bitstream::new(&[0b0000_1101]);
        // bitcount = 3, extras = 0, so two bits then the conditional third.
        let code = read_code(&mut bitstream, 7);
        assert!(code <= 7);
    }

    #[test]
    fn weight_updates_follow_the_sign_correlation() {
        let mut weight = 0;
        update_weight(&mut weight, 2, 100, 50);
        assert_eq!(weight, 2);
        update_weight(&mut weight, 2, -100, 50);
        assert_eq!(weight, 0);
        update_weight(&mut weight, 2, 0, 50);
        assert_eq!(weight, 0);

        let mut weight = 1023;
        update_weight_clip(&mut weight, 4, 10, 10);
        assert_eq!(weight, 1024);
        let mut weight = -1023;
        update_weight_clip(&mut weight, 4, -10, 10);
        assert_eq!(weight, -1024);
    }

    #[test]
    fn median_updates_match_the_reference_arithmetic() {
        let mut entropy = Entropy { median: [100, 1000, 10000] };

        assert_eq!(entropy.get_med(0), (100 >> 4) + 1);
        entropy.dec_med(0);
        assert_eq!(entropy.median[0], 100 - ((100 + 126) / 128) * 2);

        let mut entropy = Entropy { median: [100, 1000, 10000] };
        entropy.inc_med(0);
        assert_eq!(entropy.median[0], 100 + ((100 + 128) / 128) * 2);

        let mut entropy = Entropy { median: [100, 1000, 10000] };
        entropy.inc_med(1);
        assert_eq!(entropy.median[1], 1000 + ((1000 + 64) / 64) * 5);
    }

    /// Assembles block header bytes for hand-built decode tests.
    fn test_header(block_samples: u32, flags: u32, crc: u32, body_len: usize) -> BlockHeader {
        let mut bytes = [0u8; crate::block::BLOCK_HEADER_SIZE];
        bytes[0..4].copy_from_slice(b"wvpk");
        bytes[4..8].copy_from_slice(&((24 + body_len) as u32).to_le_bytes());
        bytes[8..10].copy_from_slice(&0x407u16.to_le_bytes());
        bytes[12..16].copy_from_slice(&block_samples.to_le_bytes());
        bytes[20..24].copy_from_slice(&block_samples.to_le_bytes());
        bytes[24..28].copy_from_slice(&flags.to_le_bytes());
        bytes[28..32].copy_from_slice(&crc.to_le_bytes());
        BlockHeader::parse(&bytes).unwrap()
    }

    fn crc_of(samples: &[i32]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for sample in samples {
            crc = crc.wrapping_mul(3).wrapping_add(*sample as u32);
        }
        crc
    }

    /// Stereo flags: 16-bit samples, initial and final block, 44100 Hz.
    const STEREO_FLAGS: u32 = 0x1 | 0x800 | 0x1000 | (9 << 23);

    #[test]
    fn decodes_a_hand_built_zero_run_block() {
        // Entropy medians of zero collapse the decoder into its run-length path;
        // the bitstream then only carries one counted run of eight zero samples.
        let mut body = Vec::new();
        body.extend_from_slice(&[0x02 | 0x40, 1, 0x56, 0x00]); // one term: 17, delta 2
        body.extend_from_slice(&[0x03, 1, 0x00, 0x00]); // zero weights
        body.push(0x05);
        body.push(6);
        body.extend_from_slice(&[0u8; 12]); // zero entropy medians
        body.extend_from_slice(&[0x0A, 1, 0x0F, 0x00]); // run of 8 zeros

        let header = test_header(4, STEREO_FLAGS, crc_of(&[0i32; 8]), body.len());
        let decoded = decode_block(&header, &body).unwrap();

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples, vec![0i32; 8]);
    }

    #[test]
    fn decodes_hand_built_minimum_amplitude_samples() {
        // One stereo frame of -1/-1: a zero-length zero run, then for each channel
        // a zero ones-count and a set sign bit.
        let mut body = Vec::new();
        body.push(0x05);
        body.push(6);
        body.extend_from_slice(&[0u8; 12]);
        body.extend_from_slice(&[0x0A, 1, 0x0C, 0x00]);

        let header = test_header(1, STEREO_FLAGS, crc_of(&[-1, -1]), body.len());
        let decoded = decode_block(&header, &body).unwrap();

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples, vec![-1, -1]);
    }

    #[test]
    fn checksum_mismatches_are_corrupt() {
        let mut body = Vec::new();
        body.push(0x05);
        body.push(6);
        body.extend_from_slice(&[0u8; 12]);
        body.extend_from_slice(&[0x0A, 1, 0x0C, 0x00]);

        let header = test_header(1, STEREO_FLAGS, 0xDEAD_BEEF, body.len());
        assert!(decode_block(&header, &body).is_err());
    }

    #[test]
    fn blocks_without_a_bitstream_are_corrupt() {
        let mut body = Vec::new();
        body.push(0x05);
        body.push(6);
        body.extend_from_slice(&[0u8; 12]);

        let header = test_header(1, STEREO_FLAGS, 0, body.len());
        assert!(decode_block(&header, &body).is_err());
    }

    #[test]
    fn joint_stereo_restore_inverts_the_encoder_transform() {
        // Encoder: stored_0 = left - right; stored_1 = right + (stored_0 >> 1).
        let (left, right) = (1000i32, 600i32);
        let stored_0 = left - right;
        let stored_1 = right + (stored_0 >> 1);

        let mut frame = [stored_0, stored_1];
        frame[1] = frame[1].wrapping_sub(frame[0] >> 1);
        frame[0] = frame[0].wrapping_add(frame[1]);
        assert_eq!(frame, [left, right]);
    }
}
