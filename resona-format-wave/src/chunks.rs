// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Chunk-level parsing of Waveform audio files: the RIFF/RIFX/FFIR/XFIR envelope, the
//! chunk walk, and the four generations of format headers (WAVEFORMAT, PCMWAVEFORMAT,
//! WAVEFORMATEX, WAVEFORMATEXTENSIBLE).

use std::sync::Arc;

use log::warn;

use resona_core::audio::{duration_from_frames, ChannelPlacement, TrackInfo};
use resona_core::errors::{corrupted_file_error, unsupported_format_error, Result};
use resona_core::io::endian::{BigEndianReader, ByteOrderReader, LittleEndianReader};
use resona_core::io::RandomAccessFile;
use resona_core::sample::SampleFormat;

/// A Waveform file can under no circumstances be smaller than this: 12 bytes of RIFF
/// envelope, a 24-byte PCMWAVEFORMAT 'fmt ' chunk, and an empty 'data' chunk.
pub const SMALLEST_POSSIBLE_WAVE_SIZE: u64 = 44;

/// Format tag for integer PCM samples.
const WAVE_FORMAT_PCM: u16 = 1;
/// Format tag for IEEE floating point samples.
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
/// Format tag announcing a WAVEFORMATEXTENSIBLE header.
const WAVE_FORMAT_EXTENSIBLE: u16 = 65534;

/// GUID identifying the integer PCM sub-format of WAVEFORMATEXTENSIBLE.
const SUBTYPE_PCM: [u8; 16] =
    [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71];

/// GUID identifying the IEEE float sub-format of WAVEFORMATEXTENSIBLE.
const SUBTYPE_IEEE_FLOAT: [u8; 16] =
    [0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71];

/// Byte order of every integer and float in a Waveform file, announced by its FourCC.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaveByteOrder {
    /// "RIFF", the standard form, or its byte-reversed "XFIR" variant.
    LittleEndian,
    /// "RIFX", the official big-endian form, or "FFIR" written by an endian-unaware
    /// library running on a big-endian machine.
    BigEndian,
}

/// Classifies the leading FourCC of a file.
fn byte_order_from_four_cc(header: &[u8]) -> Option<WaveByteOrder> {
    match &header[0..4] {
        b"RIFF" | b"XFIR" => Some(WaveByteOrder::LittleEndian),
        b"RIFX" | b"FFIR" => Some(WaveByteOrder::BigEndian),
        _ => None,
    }
}

/// Everything the 'fmt ' chunk describes about the sample data.
#[derive(Clone, Debug)]
pub struct WaveFormat {
    pub channel_count: usize,
    pub sample_rate: u32,
    /// The raw block alignment field; see [`ParsedWave::bytes_per_frame`].
    pub block_alignment: usize,
    /// Bits one sample occupies on disk (rounded up to bytes for storage).
    pub stored_bits_per_sample: u32,
    /// Bits of one sample that carry signal; at most `stored_bits_per_sample`.
    pub valid_bits_per_sample: u32,
    pub sample_format: SampleFormat,
    pub channel_mask: ChannelPlacement,
}

/// The outcome of walking all chunks of a Waveform file.
#[derive(Clone, Debug)]
pub struct ParsedWave {
    pub byte_order: WaveByteOrder,
    pub format: WaveFormat,
    /// Absolute file offset of the first sample byte.
    pub data_offset: u64,
    /// Byte length of the sample data, clamped to the end of the file.
    pub data_length: u64,
}

impl ParsedWave {
    /// Bytes one frame (one sample per channel) occupies.
    ///
    /// The format chunk records a block alignment, but the specification leaves room
    /// for it to mean almost anything, and real files write 0 or 1 to mean "no
    /// blocks". It is honored only when it is at least as large as the storage the
    /// samples themselves need; otherwise the computed size wins.
    pub fn bytes_per_frame(&self) -> usize {
        let computed = (self.format.stored_bits_per_sample as usize + 7) / 8 * self.format.channel_count;
        if self.format.block_alignment >= computed {
            self.format.block_alignment
        } else {
            computed
        }
    }

    /// Total number of frames in the data chunk.
    pub fn frame_count(&self) -> u64 {
        self.data_length / self.bytes_per_frame() as u64
    }

    /// Summarizes the parsed file as a track description.
    pub fn track_info(&self) -> TrackInfo {
        TrackInfo {
            codec_name: "Waveform".to_string(),
            channel_count: self.format.channel_count,
            channel_placements: self.format.channel_mask,
            sample_rate: self.format.sample_rate,
            bits_per_sample: self.format.valid_bits_per_sample,
            sample_format: self.format.sample_format,
            duration: duration_from_frames(self.frame_count(), self.format.sample_rate),
            language: None,
        }
    }
}

/// Guesses speaker placements for files whose header generation predates channel
/// masks. The table follows the de-facto conventions for common channel counts.
pub fn guess_channel_placement(channel_count: usize) -> ChannelPlacement {
    use ChannelPlacement as P;

    match channel_count {
        1 => P::FRONT_CENTER,
        2 => P::FRONT_LEFT | P::FRONT_RIGHT,
        3 => P::FRONT_LEFT | P::FRONT_RIGHT | P::LOW_FREQUENCY_EFFECTS,
        4 => P::FRONT_LEFT | P::FRONT_RIGHT | P::BACK_LEFT | P::BACK_RIGHT,
        5 => P::FRONT_LEFT | P::FRONT_RIGHT | P::BACK_LEFT | P::BACK_RIGHT | P::LOW_FREQUENCY_EFFECTS,
        6 => P::FIVE_POINT_ONE,
        8 => P::SEVEN_POINT_ONE,
        _ => P::empty(),
    }
}

/// Derives the sample format of an integer PCM stream from its bit depth.
fn integer_format_from_bits(bits: u32) -> SampleFormat {
    if bits >= 25 {
        SampleFormat::S32
    } else if bits >= 17 {
        SampleFormat::S24
    } else if bits >= 9 {
        SampleFormat::S16
    } else {
        SampleFormat::U8
    }
}

/// Parses the body of a 'fmt ' chunk in one of its four dialects.
fn parse_format_chunk<R: ByteOrderReader>(body: &[u8]) -> Result<WaveFormat> {
    let format_tag = R::read_u16(body, 0);
    let channel_count = R::read_u16(body, 2) as usize;
    let sample_rate = R::read_u32(body, 4);
    // Bytes 8..12 hold the average bytes per second, which adds no information.
    let block_alignment = R::read_u16(body, 12) as usize;

    if channel_count == 0 || sample_rate == 0 {
        return corrupted_file_error("Waveform metadata chunk declares zero channels or sample rate");
    }

    match format_tag {
        WAVE_FORMAT_PCM | WAVE_FORMAT_IEEE_FLOAT => {
            if body.len() < 16 {
                return corrupted_file_error(
                    "Waveform metadata chunk is too small for its declared header dialect",
                );
            }

            // PCMWAVEFORMAT / WAVEFORMATEX: bits per sample should be a byte
            // multiple, but nonconformant values exist and are parsed as stored.
            let bits_per_sample = R::read_u16(body, 14) as u32;
            let sample_format = if bits_per_sample >= 33 {
                SampleFormat::F64
            } else if format_tag == WAVE_FORMAT_IEEE_FLOAT {
                SampleFormat::F32
            } else {
                integer_format_from_bits(bits_per_sample)
            };

            Ok(WaveFormat {
                channel_count,
                sample_rate,
                block_alignment,
                stored_bits_per_sample: bits_per_sample,
                valid_bits_per_sample: bits_per_sample,
                sample_format,
                channel_mask: guess_channel_placement(channel_count),
            })
        }
        WAVE_FORMAT_EXTENSIBLE => {
            if body.len() < 40 {
                return corrupted_file_error(
                    "Waveform metadata chunk is too small for a WAVEFORMATEXTENSIBLE header",
                );
            }

            let stored_bits_per_sample = R::read_u16(body, 14) as u32;

            // Microsoft: the extra parameter size must be exactly 22 for this dialect.
            let extra_parameter_length = R::read_u16(body, 16);
            if extra_parameter_length != 22 {
                return corrupted_file_error(
                    "WAVEFORMATEXTENSIBLE header has a non-conformant extra parameter size",
                );
            }

            let valid_bits_per_sample = R::read_u16(body, 18) as u32;
            let channel_mask = ChannelPlacement::from_bits_truncate(R::read_u32(body, 20));

            let sub_type: [u8; 16] = body[24..40].try_into().unwrap();
            let sample_format = if sub_type == SUBTYPE_PCM {
                integer_format_from_bits(valid_bits_per_sample)
            } else if sub_type == SUBTYPE_IEEE_FLOAT {
                if valid_bits_per_sample >= 33 {
                    SampleFormat::F64
                } else {
                    SampleFormat::F32
                }
            } else {
                return unsupported_format_error(
                    "Waveform file uses a WAVEFORMATEXTENSIBLE sub-format other than PCM or float",
                );
            };

            Ok(WaveFormat {
                channel_count,
                sample_rate,
                block_alignment,
                stored_bits_per_sample,
                valid_bits_per_sample,
                sample_format,
                channel_mask,
            })
        }
        _ => unsupported_format_error(
            "Waveform file stores compressed audio; only PCM and float PCM are supported",
        ),
    }
}

/// Walks all chunks of the file and collects the 'fmt ', 'fact' and 'data' chunks.
fn walk_chunks<R: ByteOrderReader>(
    file: &Arc<dyn RandomAccessFile>,
    byte_order: WaveByteOrder,
    envelope: &[u8; 12],
) -> Result<Option<ParsedWave>> {
    let file_length = file.len();

    // The size field of the RIFF envelope is advisory. Tools append tagging data
    // without updating it and truncated files understate it, so it only ever bounds
    // the chunk scan and never rejects the file.
    let scan_end = {
        let declared = R::read_u32(envelope, 4) as u64 + 8;
        u64::min(declared.max(SMALLEST_POSSIBLE_WAVE_SIZE), file_length)
    };

    if &envelope[8..12] != b"WAVE" {
        // A RIFF container holding something other than audio (.avi and friends).
        return Ok(None);
    }

    let mut format: Option<WaveFormat> = None;
    let mut fact_seen = false;
    let mut data: Option<(u64, u64)> = None;

    let mut offset = 12u64;
    loop {
        // The walk ends when no further complete chunk header fits the advisory end.
        if offset + 8 > scan_end {
            break;
        }

        let mut header = [0u8; 8];
        file.read_at(offset, &mut header)?;
        let chunk_length = R::read_u32(&header, 4) as u64;
        let body_offset = offset + 8;

        match &header[0..4] {
            b"fmt " => {
                if format.is_some() {
                    return corrupted_file_error(
                        "Waveform audio file contains more than one 'fmt ' (metadata) chunk",
                    );
                }

                // Read the chunk body up to the WAVEFORMATEXTENSIBLE size; anything
                // beyond that is a variable-length WAVEFORMATEX tail with no
                // information for us.
                let body_length = u64::min(chunk_length, 40);
                if body_offset + body_length > file_length {
                    return corrupted_file_error(
                        "Waveform audio file ends in the middle of its 'fmt ' (metadata) chunk",
                    );
                }
                let mut body = vec![0u8; body_length as usize];
                file.read_at(body_offset, &mut body)?;
                format = Some(parse_format_chunk::<R>(&body)?);
            }
            b"fact" => {
                if fact_seen {
                    return corrupted_file_error(
                        "Waveform audio file contains more than one 'fact' (extra metadata) chunk",
                    );
                }
                if chunk_length < 4 || body_offset + 4 > file_length {
                    return corrupted_file_error(
                        "Waveform audio file contains a truncated 'fact' (extra metadata) chunk",
                    );
                }

                // The chunk holds a sample count that became mandatory in 1994 and is
                // respected by almost nobody. The data chunk extent is authoritative
                // for the playable length, so the content is only noted.
                fact_seen = true;
            }
            b"data" => {
                if data.is_some() {
                    return corrupted_file_error(
                        "Waveform audio file contains more than one 'data' (audio data) chunk",
                    );
                }

                let available = scan_end.saturating_sub(body_offset);
                if chunk_length > available {
                    warn!(
                        "data chunk claims {} bytes but only {} remain; treating as truncated",
                        chunk_length, available
                    );
                }
                data = Some((body_offset, u64::min(chunk_length, available)));
            }
            _ => {}
        }

        // Chunks are 16-bit aligned: an odd length is followed by one pad byte that
        // the length field does not include.
        offset = body_offset + chunk_length + (chunk_length & 1);
    }

    // The FourCC identified this as a Waveform file, so from here on structural
    // problems are hard errors rather than a polite "not my format".
    match (format, data) {
        (Some(format), Some((data_offset, data_length))) => Ok(Some(ParsedWave {
            byte_order,
            format,
            data_offset,
            data_length,
        })),
        _ => corrupted_file_error(
            "Waveform audio file is missing one or more mandatory information chunks",
        ),
    }
}

/// Parses a Waveform file from the leading FourCC through all chunks.
///
/// Returns `Ok(None)` if the file is not a Waveform file at all (wrong FourCC, wrong
/// RIFF form, or simply too small). Structural violations behind a valid signature
/// are corrupted-file errors.
pub fn parse(file: &Arc<dyn RandomAccessFile>) -> Result<Option<ParsedWave>> {
    if file.len() < SMALLEST_POSSIBLE_WAVE_SIZE {
        return Ok(None);
    }

    let mut envelope = [0u8; 12];
    file.read_at(0, &mut envelope)?;

    match byte_order_from_four_cc(&envelope) {
        Some(order @ WaveByteOrder::LittleEndian) => {
            walk_chunks::<LittleEndianReader>(file, order, &envelope)
        }
        Some(order @ WaveByteOrder::BigEndian) => {
            walk_chunks::<BigEndianReader>(file, order, &envelope)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{minimal_wave_file, WaveFileBuilder};
    use resona_core::io::MemoryFile;
    use resona_core::errors::Error;

    fn parse_bytes(bytes: Vec<u8>) -> Result<Option<ParsedWave>> {
        let file: Arc<dyn RandomAccessFile> = Arc::new(MemoryFile::from_vec(bytes));
        parse(&file)
    }

    #[test]
    fn minimal_file_parses() {
        let parsed = parse_bytes(minimal_wave_file()).unwrap().unwrap();

        assert_eq!(parsed.byte_order, WaveByteOrder::LittleEndian);
        assert_eq!(parsed.format.channel_count, 2);
        assert_eq!(parsed.format.sample_rate, 44100);
        assert_eq!(parsed.format.valid_bits_per_sample, 16);
        assert_eq!(parsed.format.sample_format, SampleFormat::S16);
        assert_eq!(parsed.frame_count(), 1);

        let info = parsed.track_info();
        assert_eq!(info.duration.as_micros(), 22);
        assert_eq!(
            info.channel_placements,
            ChannelPlacement::FRONT_LEFT | ChannelPlacement::FRONT_RIGHT
        );
    }

    #[test]
    fn non_wave_four_cc_is_not_waveform() {
        let mut bytes = minimal_wave_file();
        bytes[0..4].copy_from_slice(b"OggS");
        assert!(parse_bytes(bytes).unwrap().is_none());
    }

    #[test]
    fn riff_with_other_form_is_not_waveform() {
        let mut bytes = minimal_wave_file();
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(parse_bytes(bytes).unwrap().is_none());
    }

    #[test]
    fn too_small_files_are_not_waveform() {
        let mut bytes = minimal_wave_file();
        bytes.truncate(43);
        assert!(parse_bytes(bytes).unwrap().is_none());
    }

    #[test]
    fn duplicate_format_chunks_are_corrupt() {
        let bytes = WaveFileBuilder::pcm16(2, 44100)
            .chunk(*b"fmt ", &WaveFileBuilder::pcm16_format_body(2, 44100))
            .data_frames(&[[0, 0]])
            .build();

        assert!(matches!(parse_bytes(bytes), Err(Error::CorruptedFile(_))));
    }

    #[test]
    fn duplicate_data_chunks_are_corrupt() {
        let bytes = WaveFileBuilder::pcm16(1, 8000)
            .data_frames(&[[0]])
            .data_frames(&[[0]])
            .build();

        assert!(matches!(parse_bytes(bytes), Err(Error::CorruptedFile(_))));
    }

    #[test]
    fn missing_data_chunk_is_corrupt() {
        // Pad with an unknown chunk so the file clears the minimum size gate.
        let bytes = WaveFileBuilder::pcm16(2, 44100).chunk(*b"pad ", &[0u8; 24]).build();
        assert!(matches!(parse_bytes(bytes), Err(Error::CorruptedFile(_))));
    }

    #[test]
    fn unknown_chunks_are_skipped_with_odd_length_padding() {
        let bytes = WaveFileBuilder::pcm16(2, 44100)
            .chunk(*b"LIST", &[1, 2, 3]) // odd length, forces a pad byte
            .data_frames(&[[1, 2], [3, 4]])
            .build();

        let parsed = parse_bytes(bytes).unwrap().unwrap();
        assert_eq!(parsed.frame_count(), 2);
    }

    #[test]
    fn fact_chunk_is_accepted_once() {
        let ok = WaveFileBuilder::pcm16(1, 8000)
            .chunk(*b"fact", &4u32.to_le_bytes())
            .data_frames(&[[0]])
            .build();
        assert!(parse_bytes(ok).unwrap().is_some());

        let duplicated = WaveFileBuilder::pcm16(1, 8000)
            .chunk(*b"fact", &4u32.to_le_bytes())
            .chunk(*b"fact", &4u32.to_le_bytes())
            .data_frames(&[[0]])
            .build();
        assert!(matches!(parse_bytes(duplicated), Err(Error::CorruptedFile(_))));
    }

    #[test]
    fn big_endian_variants_parse() {
        for four_cc in [*b"RIFX", *b"FFIR"] {
            let bytes = WaveFileBuilder::pcm16_big_endian(2, 48000, four_cc)
                .data_frames_be(&[[100, -100]])
                .build();

            let parsed = parse_bytes(bytes).unwrap().unwrap();
            assert_eq!(parsed.byte_order, WaveByteOrder::BigEndian);
            assert_eq!(parsed.format.sample_rate, 48000);
            assert_eq!(parsed.frame_count(), 1);
        }
    }

    #[test]
    fn extensible_header_parses_mask_and_valid_bits() {
        let bytes = WaveFileBuilder::extensible(
            6,
            48000,
            32,
            24,
            ChannelPlacement::FIVE_POINT_ONE.bits(),
            SUBTYPE_PCM,
        )
        .data_bytes(&[0u8; 4 * 6 * 2])
        .build();

        let parsed = parse_bytes(bytes).unwrap().unwrap();
        assert_eq!(parsed.format.stored_bits_per_sample, 32);
        assert_eq!(parsed.format.valid_bits_per_sample, 24);
        assert_eq!(parsed.format.sample_format, SampleFormat::S24);
        assert_eq!(parsed.format.channel_mask, ChannelPlacement::FIVE_POINT_ONE);
        assert_eq!(parsed.frame_count(), 2);
    }

    #[test]
    fn extensible_with_unknown_subtype_is_unsupported() {
        let mut unknown = SUBTYPE_PCM;
        unknown[0] = 0x77;
        let bytes = WaveFileBuilder::extensible(2, 48000, 16, 16, 0b11, unknown)
            .data_bytes(&[0u8; 8])
            .build();

        assert!(matches!(parse_bytes(bytes), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn extensible_with_wrong_extra_size_is_corrupt() {
        let mut builder =
            WaveFileBuilder::extensible(2, 48000, 16, 16, 0b11, SUBTYPE_PCM).data_bytes(&[0u8; 8]);
        // Patch the cbSize field (offset 16 of the fmt body) to a conforming-looking
        // but wrong value.
        builder.patch_format_body(16, &21u16.to_le_bytes());
        assert!(matches!(parse_bytes(builder.build()), Err(Error::CorruptedFile(_))));
    }

    #[test]
    fn compressed_format_tags_are_unsupported() {
        let mut builder = WaveFileBuilder::pcm16(2, 44100).data_frames(&[[0, 0]]);
        builder.patch_format_body(0, &2u16.to_le_bytes()); // ADPCM
        assert!(matches!(parse_bytes(builder.build()), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn advisory_size_field_bounds_the_scan() {
        // The envelope claims less than the real size: a data chunk that extends
        // beyond the claimed end is clamped to it.
        let mut bytes = WaveFileBuilder::pcm16(1, 8000).data_frames(&[[0], [1], [2], [3]]).build();
        let real_size = bytes.len() as u64;
        let claimed = (real_size - 8 - 4) as u32; // cut off the last two frames
        bytes[4..8].copy_from_slice(&claimed.to_le_bytes());

        let parsed = parse_bytes(bytes).unwrap().unwrap();
        assert_eq!(parsed.frame_count(), 2);
    }

    #[test]
    fn block_alignment_fallback() {
        // Block alignment smaller than the computed frame size is ignored.
        let mut builder = WaveFileBuilder::pcm16(2, 44100).data_frames(&[[0, 0], [1, 1]]);
        builder.patch_format_body(12, &0u16.to_le_bytes());
        let parsed = parse_bytes(builder.build()).unwrap().unwrap();
        assert_eq!(parsed.bytes_per_frame(), 4);
        assert_eq!(parsed.frame_count(), 2);

        // A larger alignment takes precedence (frames padded to 6 bytes).
        let mut builder = WaveFileBuilder::pcm16(2, 44100).data_bytes(&[0u8; 12]);
        builder.patch_format_body(12, &6u16.to_le_bytes());
        let parsed = parse_bytes(builder.build()).unwrap().unwrap();
        assert_eq!(parsed.bytes_per_frame(), 6);
        assert_eq!(parsed.frame_count(), 2);
    }
}
