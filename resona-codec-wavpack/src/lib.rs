// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WavPack support for Resona with a self-contained lossless block decoder: block
//! header and metadata parsing, the median-coded residual bitstream, decorrelation,
//! and multichannel block-row stitching.
//!
//! Lossless PCM content decodes; hybrid (lossy), floating-point, and DSD streams
//! are fully described by `TryReadInfo` but rejected for decoding.

use std::sync::Arc;

use resona_core::audio::ContainerInfo;
use resona_core::codecs::{AudioCodec, AudioTrackDecoder};
use resona_core::errors::{unsupported_format_error, Result};
use resona_core::io::RandomAccessFile;

pub mod block;
mod decode;
mod reader;

pub use reader::WavPackReader;

/// The smallest complete WavPack file observed in the wild: one block header, the
/// mandatory metadata, and a minimal bitstream.
pub const SMALLEST_POSSIBLE_WAVPACK_SIZE: u64 = 118;

/// Checks the signature: the "wvpk" marker, a sane block size, and a decoder
/// version inside the supported window.
fn is_wavpack_header(file: &Arc<dyn RandomAccessFile>) -> Result<bool> {
    if file.len() < SMALLEST_POSSIBLE_WAVPACK_SIZE {
        return Ok(false);
    }

    let mut header = [0u8; 10];
    file.read_at(0, &mut header)?;
    Ok(block::BlockHeader::is_plausible(&header))
}

/// The WavPack audio codec.
#[derive(Default)]
pub struct WavPackCodec;

impl WavPackCodec {
    pub fn new() -> WavPackCodec {
        WavPackCodec
    }
}

impl AudioCodec for WavPackCodec {
    fn name(&self) -> &str {
        "WavPack"
    }

    fn file_extensions(&self) -> &[&str] {
        &["wv"]
    }

    fn try_read_info(
        &self,
        file: &Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
    ) -> Result<Option<ContainerInfo>> {
        if !is_wavpack_header(file)? {
            return Ok(None);
        }

        let reader = WavPackReader::new(Arc::clone(file))?;
        Ok(Some(ContainerInfo::single_track(reader.track_info().clone())))
    }

    fn try_open_decoder(
        &self,
        file: Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
        track_index: usize,
    ) -> Result<Option<Box<dyn AudioTrackDecoder>>> {
        if !is_wavpack_header(&file)? {
            return Ok(None);
        }
        if track_index != 0 {
            return unsupported_format_error("WavPack files hold a single audio track");
        }

        Ok(Some(Box::new(WavPackReader::new(file)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_core::io::MemoryFile;
    use resona_core::sample::SampleFormat;

    /// Builds one stereo 16-bit block of four frames of silence, decodable by the
    /// crate's own block decoder.
    pub(crate) fn silent_stereo_block(block_index: u32, total_samples: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0x02 | 0x40, 1, 0x56, 0x00]); // term 17, delta 2
        body.extend_from_slice(&[0x03, 1, 0x00, 0x00]); // zero weights
        body.push(0x05);
        body.push(6);
        body.extend_from_slice(&[0u8; 12]); // zero entropy medians
        body.push(0x00); // dummy padding sub-block
        body.push(20);
        body.extend_from_slice(&[0u8; 40]);
        body.extend_from_slice(&[0x0A, 1, 0x0F, 0x00]); // counted run of 8 zeros

        // Checksum of eight zero samples.
        let mut crc = 0xFFFF_FFFFu32;
        for _ in 0..8 {
            crc = crc.wrapping_mul(3);
        }

        let flags: i32 = 0x1 | 0x800 | 0x1000 | (9 << 23); // 16-bit stereo at 44100 Hz
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"wvpk");
        bytes.extend_from_slice(&((24 + body.len()) as u32).to_le_bytes());
        bytes.extend_from_slice(&0x407u16.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&total_samples.to_le_bytes());
        bytes.extend_from_slice(&block_index.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes()); // block samples
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&body);
        bytes
    }

    /// Two block rows with marker-teasing junk between them.
    pub(crate) fn silent_two_block_file() -> Vec<u8> {
        let mut bytes = silent_stereo_block(0, 8);
        bytes.extend_from_slice(b"wvwv");
        bytes.extend_from_slice(&silent_stereo_block(4, 8));
        bytes
    }

    fn as_file(bytes: Vec<u8>) -> Arc<dyn RandomAccessFile> {
        Arc::new(MemoryFile::from_vec(bytes))
    }

    #[test]
    fn detection_accepts_the_synthetic_file() {
        assert!(is_wavpack_header(&as_file(silent_two_block_file())).unwrap());
    }

    #[test]
    fn detection_rejects_foreign_and_undersized_files() {
        assert!(!is_wavpack_header(&as_file(vec![0x77; 256])).unwrap());

        // Correct marker, version outside the window.
        let mut bytes = silent_two_block_file();
        bytes[8..10].copy_from_slice(&0x200u16.to_le_bytes());
        assert!(!is_wavpack_header(&as_file(bytes)).unwrap());

        // Too small, however plausible the header.
        let mut bytes = silent_stereo_block(0, 4);
        bytes.truncate(100);
        assert!(!is_wavpack_header(&as_file(bytes)).unwrap());
    }

    #[test]
    fn info_describes_the_synthetic_file() {
        let codec = WavPackCodec::new();
        let info = codec.try_read_info(&as_file(silent_two_block_file()), Some("wv")).unwrap().unwrap();

        let track = info.default_track().unwrap();
        assert_eq!(track.codec_name, "WavPack");
        assert_eq!(track.channel_count, 2);
        assert_eq!(track.sample_rate, 44100);
        assert_eq!(track.bits_per_sample, 16);
        assert_eq!(track.sample_format, SampleFormat::S16);
        assert_eq!(track.frame_count(), 8);
    }

    #[test]
    fn decodes_across_block_rows_and_junk() {
        let codec = WavPackCodec::new();
        let decoder = codec.try_open_decoder(as_file(silent_two_block_file()), None, 0).unwrap().unwrap();

        assert_eq!(decoder.frame_count(), 8);
        assert_eq!(decoder.channel_count(), 2);
        assert!(decoder.is_natively_interleaved());

        let mut samples = [1i16; 16];
        decoder.decode_interleaved(&mut samples, 8).unwrap();
        assert_eq!(samples, [0i16; 16]);
        assert_eq!(decoder.frame_position(), 8);
    }

    #[test]
    fn seeks_land_on_exact_frames() {
        let codec = WavPackCodec::new();
        let decoder = codec.try_open_decoder(as_file(silent_two_block_file()), None, 0).unwrap().unwrap();

        // Seek into the second block row and decode the remainder.
        decoder.seek_to_frame(6).unwrap();
        let mut samples = [1i16; 4];
        decoder.decode_interleaved(&mut samples, 2).unwrap();
        assert_eq!(samples, [0i16; 4]);

        // Back to the start; the full read must still work.
        decoder.seek_to_frame(0).unwrap();
        let mut samples = [1i16; 16];
        decoder.decode_interleaved(&mut samples, 8).unwrap();
        assert_eq!(samples, [0i16; 16]);
    }

    #[test]
    fn cloned_decoders_are_independent() {
        let codec = WavPackCodec::new();
        let decoder = codec.try_open_decoder(as_file(silent_two_block_file()), None, 0).unwrap().unwrap();
        let clone = decoder.clone_decoder().unwrap();

        let mut first = [1i16; 8];
        decoder.decode_interleaved(&mut first, 4).unwrap();

        assert_eq!(clone.frame_position(), 0);
        let mut second = [1i16; 16];
        clone.decode_interleaved(&mut second, 8).unwrap();
        assert_eq!(second, [0i16; 16]);
    }
}
