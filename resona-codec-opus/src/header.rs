// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use resona_core::errors::{corrupted_file_error, Result};
use resona_core::io::endian::{ByteOrderReader, LittleEndianReader};

/// The identification header every Ogg Opus stream opens with.
#[derive(Clone, Debug)]
pub struct OpusHead {
    pub channel_count: usize,
    /// Samples (at 48 kHz) to discard from the start of the decoded stream.
    pub pre_skip: u16,
    /// Sample rate of the audio before it was encoded. Informational: Opus always
    /// decodes at 48 kHz.
    pub input_sample_rate: u32,
    /// Playback gain in Q7.8 dB the decoder is required to apply.
    pub output_gain: i16,
    /// 0 = mono/stereo, 1 = Vorbis-ordered surround, everything else is
    /// application defined.
    pub mapping_family: u8,
}

impl OpusHead {
    /// Size of the fixed part of the header, before any channel mapping table.
    pub const SIZE: usize = 19;

    /// Parses an "OpusHead" packet.
    pub fn parse(packet: &[u8]) -> Result<OpusHead> {
        if packet.len() < OpusHead::SIZE || &packet[0..8] != b"OpusHead" {
            return corrupted_file_error("Opus identification header is missing or truncated");
        }

        // The upper nibble of the version is the incompatible-change counter; only
        // generation zero ("version 1") can be decoded.
        let version = packet[8];
        if version >> 4 != 0 {
            return corrupted_file_error("Opus stream uses an incompatible header version");
        }

        let channel_count = packet[9] as usize;
        if channel_count == 0 {
            return corrupted_file_error("Opus stream declares zero channels");
        }

        Ok(OpusHead {
            channel_count,
            pre_skip: LittleEndianReader::read_u16(packet, 10),
            input_sample_rate: LittleEndianReader::read_u32(packet, 12),
            output_gain: LittleEndianReader::read_u16(packet, 16) as i16,
            mapping_family: packet[18],
        })
    }

    /// The linear gain factor the output must be scaled by.
    pub fn gain_factor(&self) -> f32 {
        if self.output_gain == 0 {
            1.0
        } else {
            10.0f32.powf(self.output_gain as f32 / (20.0 * 256.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn opus_head(channel_count: u8, pre_skip: u16) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(b"OpusHead");
        packet.push(1); // version
        packet.push(channel_count);
        packet.extend_from_slice(&pre_skip.to_le_bytes());
        packet.extend_from_slice(&44100u32.to_le_bytes()); // input sample rate
        packet.extend_from_slice(&0i16.to_le_bytes()); // output gain
        packet.push(0); // mapping family
        packet
    }

    #[test]
    fn parses_the_fixed_fields() {
        let head = OpusHead::parse(&opus_head(2, 312)).unwrap();
        assert_eq!(head.channel_count, 2);
        assert_eq!(head.pre_skip, 312);
        assert_eq!(head.input_sample_rate, 44100);
        assert_eq!(head.mapping_family, 0);
        assert_eq!(head.gain_factor(), 1.0);
    }

    #[test]
    fn rejects_incompatible_versions_and_junk() {
        let mut packet = opus_head(2, 0);
        packet[8] = 0x10;
        assert!(OpusHead::parse(&packet).is_err());

        assert!(OpusHead::parse(b"OpusTags").is_err());
        assert!(OpusHead::parse(&opus_head(0, 0)).is_err());
    }

    #[test]
    fn output_gain_converts_to_a_linear_factor() {
        let mut packet = opus_head(2, 0);
        // +6.0 dB in Q7.8.
        packet[16..18].copy_from_slice(&(6i16 * 256).to_le_bytes());
        let head = OpusHead::parse(&packet).unwrap();
        assert!((head.gain_factor() - 1.9953).abs() < 1e-3);
    }
}
