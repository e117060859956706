// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC support for Resona, wrapping the symphonia FLAC demuxer and decoder behind
//! the uniform codec interface. FLAC decodes to integers and is natively separated;
//! seeking is sample accurate.

use std::sync::Arc;

use resona_core::audio::{ChannelPlacement, ContainerInfo};
use resona_core::codecs::{AudioCodec, AudioTrackDecoder};
use resona_core::errors::{unsupported_format_error, Result};
use resona_core::io::endian::{BigEndianReader, ByteOrderReader};
use resona_core::io::RandomAccessFile;

mod reader;

pub use reader::FlacReader;

/// No valid FLAC file is smaller than the "fLaC" marker plus one streaminfo
/// metadata block.
pub const SMALLEST_POSSIBLE_FLAC_SIZE: u64 = 42;

/// Checks the file signature: the "fLaC" marker followed by a streaminfo block with
/// sane block-size fields.
///
/// The streaminfo block must be the first metadata block; its minimum and maximum
/// block sizes must both lie in the 16..=65535 range with minimum not above maximum.
fn is_flac_header(file: &Arc<dyn RandomAccessFile>) -> Result<bool> {
    if file.len() < SMALLEST_POSSIBLE_FLAC_SIZE {
        return Ok(false);
    }

    let mut header = [0u8; 16];
    file.read_at(0, &mut header)?;

    if &header[0..4] != b"fLaC" {
        return Ok(false);
    }

    // Metadata block header: 1 bit last-block flag, 7 bits type (0 = streaminfo),
    // 24 bits length. The streaminfo body is exactly 34 bytes, but encoders are
    // allowed to pad the block.
    let block_type = header[4] & 0x7F;
    let block_length = BigEndianReader::read_u32(&header, 4) & 0x00FF_FFFF;

    let minimum_block_size = BigEndianReader::read_u16(&header, 8);
    let maximum_block_size = BigEndianReader::read_u16(&header, 10);

    Ok(block_type == 0
        && block_length >= 34
        && minimum_block_size >= 16
        && maximum_block_size >= 16
        && minimum_block_size <= maximum_block_size)
}

/// The channel layouts the FLAC specification fixes per channel count.
pub(crate) fn flac_layout(channel_count: usize) -> Vec<ChannelPlacement> {
    use ChannelPlacement as P;

    match channel_count {
        1 => vec![P::FRONT_CENTER],
        2 => vec![P::FRONT_LEFT, P::FRONT_RIGHT],
        3 => vec![P::FRONT_LEFT, P::FRONT_RIGHT, P::FRONT_CENTER],
        4 => vec![P::FRONT_LEFT, P::FRONT_RIGHT, P::BACK_LEFT, P::BACK_RIGHT],
        5 => vec![P::FRONT_LEFT, P::FRONT_RIGHT, P::FRONT_CENTER, P::BACK_LEFT, P::BACK_RIGHT],
        6 => vec![
            P::FRONT_LEFT,
            P::FRONT_RIGHT,
            P::FRONT_CENTER,
            P::LOW_FREQUENCY_EFFECTS,
            P::BACK_LEFT,
            P::BACK_RIGHT,
        ],
        7 => vec![
            P::FRONT_LEFT,
            P::FRONT_RIGHT,
            P::FRONT_CENTER,
            P::LOW_FREQUENCY_EFFECTS,
            P::BACK_CENTER,
            P::SIDE_LEFT,
            P::SIDE_RIGHT,
        ],
        8 => vec![
            P::FRONT_LEFT,
            P::FRONT_RIGHT,
            P::FRONT_CENTER,
            P::LOW_FREQUENCY_EFFECTS,
            P::BACK_LEFT,
            P::BACK_RIGHT,
            P::SIDE_LEFT,
            P::SIDE_RIGHT,
        ],
        other => vec![P::empty(); other],
    }
}

/// The FLAC audio codec.
#[derive(Default)]
pub struct FlacCodec;

impl FlacCodec {
    pub fn new() -> FlacCodec {
        FlacCodec
    }
}

impl AudioCodec for FlacCodec {
    fn name(&self) -> &str {
        "FLAC"
    }

    fn file_extensions(&self) -> &[&str] {
        &["flac"]
    }

    fn try_read_info(
        &self,
        file: &Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
    ) -> Result<Option<ContainerInfo>> {
        if !is_flac_header(file)? {
            return Ok(None);
        }

        let reader = FlacReader::new(Arc::clone(file))?;
        Ok(Some(ContainerInfo::single_track(reader.track_info().clone())))
    }

    fn try_open_decoder(
        &self,
        file: Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
        track_index: usize,
    ) -> Result<Option<Box<dyn AudioTrackDecoder>>> {
        if !is_flac_header(&file)? {
            return Ok(None);
        }
        if track_index != 0 {
            return unsupported_format_error("FLAC files hold a single audio track");
        }

        Ok(Some(Box::new(FlacReader::new(file)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_core::io::MemoryFile;

    /// The "fLaC" marker plus a plausible streaminfo block header.
    pub(crate) fn plausible_flac_header() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"fLaC");
        bytes.push(0x00); // streaminfo, more blocks follow
        bytes.extend_from_slice(&[0x00, 0x00, 0x22]); // block length 34
        bytes.extend_from_slice(&4096u16.to_be_bytes()); // minimum block size
        bytes.extend_from_slice(&4096u16.to_be_bytes()); // maximum block size
        bytes.resize(64, 0);
        bytes
    }

    fn as_file(bytes: Vec<u8>) -> Arc<dyn RandomAccessFile> {
        Arc::new(MemoryFile::from_vec(bytes))
    }

    #[test]
    fn detection_accepts_a_plausible_header() {
        assert!(is_flac_header(&as_file(plausible_flac_header())).unwrap());
    }

    #[test]
    fn detection_rejects_foreign_and_broken_headers() {
        // Wrong magic.
        let mut bytes = plausible_flac_header();
        bytes[0] = b'g';
        assert!(!is_flac_header(&as_file(bytes)).unwrap());

        // First block is not streaminfo.
        let mut bytes = plausible_flac_header();
        bytes[4] = 0x04; // vorbis comment
        assert!(!is_flac_header(&as_file(bytes)).unwrap());

        // Block sizes below the legal minimum.
        let mut bytes = plausible_flac_header();
        bytes[8..10].copy_from_slice(&8u16.to_be_bytes());
        assert!(!is_flac_header(&as_file(bytes)).unwrap());

        // Minimum above maximum.
        let mut bytes = plausible_flac_header();
        bytes[8..10].copy_from_slice(&8192u16.to_be_bytes());
        bytes[10..12].copy_from_slice(&4096u16.to_be_bytes());
        assert!(!is_flac_header(&as_file(bytes)).unwrap());

        // Too small to be a FLAC file at all.
        assert!(!is_flac_header(&as_file(b"fLaC".to_vec())).unwrap());
    }

    #[test]
    fn codec_declines_foreign_files_without_error() {
        let codec = FlacCodec::new();
        let file = as_file(vec![0x55; 4096]);
        assert!(codec.try_read_info(&file, Some("flac")).unwrap().is_none());
        assert!(codec.try_open_decoder(file, None, 0).unwrap().is_none());
    }

    #[test]
    fn layouts_follow_the_flac_specification() {
        assert_eq!(flac_layout(2), vec![ChannelPlacement::FRONT_LEFT, ChannelPlacement::FRONT_RIGHT]);
        assert_eq!(flac_layout(3)[2], ChannelPlacement::FRONT_CENTER);
        assert_eq!(flac_layout(6)[3], ChannelPlacement::LOW_FREQUENCY_EFFECTS);
        assert_eq!(flac_layout(8).len(), 8);
    }
}
