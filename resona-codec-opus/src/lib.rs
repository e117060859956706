// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ogg Opus support for Resona. The symphonia Ogg demuxer handles paging, duration,
//! and seeking; packets are decoded with libopus through `audiopus`. Opus always
//! resamples to 48 kHz internally, so every track reports that rate regardless of
//! the input rate recorded in its header.
//!
//! Mono and stereo streams decode; surround streams using a channel mapping table
//! are described in metadata but rejected for decode, as libopus would need its
//! multistream API for those.

use std::sync::Arc;

use resona_common::ogg;
use resona_core::audio::ContainerInfo;
use resona_core::codecs::{AudioCodec, AudioTrackDecoder};
use resona_core::errors::{unsupported_format_error, Result};
use resona_core::io::RandomAccessFile;

mod header;
mod reader;

pub use header::OpusHead;
pub use reader::OpusReader;

/// A begin-of-stream page with an OpusHead packet plus the smallest possible
/// follow-up pages; no intact file is smaller.
pub const SMALLEST_POSSIBLE_OPUS_SIZE: u64 = 48;

/// Checks for the first page of an Ogg Opus stream: a begin-of-stream page whose
/// packet opens with the "OpusHead" magic at version 1.
fn is_opus_header(file: &Arc<dyn RandomAccessFile>) -> Result<bool> {
    if file.len() < SMALLEST_POSSIBLE_OPUS_SIZE {
        return Ok(false);
    }

    let mut header = [0u8; 48];
    file.read_at(0, &mut header)?;

    if !ogg::is_first_page(&header) {
        return Ok(false);
    }

    let packet = &header[ogg::FIRST_PACKET_OFFSET..];
    Ok(&packet[0..8] == b"OpusHead" && packet[8] == 1)
}

/// Reads the identification header from the canonical position dictated by the Ogg
/// Opus specification (alone in the first page, single lacing segment).
pub(crate) fn read_opus_head(file: &Arc<dyn RandomAccessFile>) -> Result<OpusHead> {
    let mut packet = [0u8; OpusHead::SIZE];
    file.read_at(ogg::FIRST_PACKET_OFFSET as u64, &mut packet)?;
    OpusHead::parse(&packet)
}

/// The Ogg Opus audio codec.
#[derive(Default)]
pub struct OpusCodec;

impl OpusCodec {
    pub fn new() -> OpusCodec {
        OpusCodec
    }
}

impl AudioCodec for OpusCodec {
    fn name(&self) -> &str {
        "Opus"
    }

    fn file_extensions(&self) -> &[&str] {
        &["opus"]
    }

    fn try_read_info(
        &self,
        file: &Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
    ) -> Result<Option<ContainerInfo>> {
        if !is_opus_header(file)? {
            return Ok(None);
        }

        let info = reader::probe_info(file)?;
        Ok(Some(ContainerInfo::single_track(info)))
    }

    fn try_open_decoder(
        &self,
        file: Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
        track_index: usize,
    ) -> Result<Option<Box<dyn AudioTrackDecoder>>> {
        if !is_opus_header(&file)? {
            return Ok(None);
        }
        if track_index != 0 {
            return unsupported_format_error("Opus files hold a single audio track");
        }

        Ok(Some(Box::new(OpusReader::new(file)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_core::io::MemoryFile;

    fn opus_head_packet() -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(b"OpusHead");
        packet.push(1);
        packet.push(2); // stereo
        packet.extend_from_slice(&312u16.to_le_bytes()); // pre-skip
        packet.extend_from_slice(&48000u32.to_le_bytes());
        packet.extend_from_slice(&0u16.to_le_bytes());
        packet.push(0); // mapping family
        packet
    }

    fn as_file(mut bytes: Vec<u8>) -> Arc<dyn RandomAccessFile> {
        bytes.resize(usize::max(bytes.len(), SMALLEST_POSSIBLE_OPUS_SIZE as usize), 0);
        Arc::new(MemoryFile::from_vec(bytes))
    }

    #[test]
    fn detection_accepts_an_opus_first_page() {
        let page = ogg::first_page_with_packet(&opus_head_packet());
        assert!(is_opus_header(&as_file(page)).unwrap());
    }

    #[test]
    fn detection_rejects_foreign_streams() {
        // A Vorbis stream in the same envelope.
        let mut packet = vec![1u8];
        packet.extend_from_slice(b"vorbis");
        packet.resize(20, 0);
        let page = ogg::first_page_with_packet(&packet);
        assert!(!is_opus_header(&as_file(page)).unwrap());

        // Wrong version byte.
        let mut packet = opus_head_packet();
        packet[8] = 2;
        let page = ogg::first_page_with_packet(&packet);
        assert!(!is_opus_header(&as_file(page)).unwrap());

        // Too small.
        let file: Arc<dyn RandomAccessFile> = Arc::new(MemoryFile::from_vec(vec![0u8; 32]));
        assert!(!is_opus_header(&file).unwrap());
    }

    #[test]
    fn header_is_read_from_the_canonical_offset() {
        let page = ogg::first_page_with_packet(&opus_head_packet());
        let head = read_opus_head(&as_file(page)).unwrap();
        assert_eq!(head.channel_count, 2);
        assert_eq!(head.pre_skip, 312);
    }

    #[test]
    fn codec_declines_foreign_files_without_error() {
        let codec = OpusCodec::new();
        let file = as_file(vec![0x99; 64]);
        assert!(codec.try_read_info(&file, Some("opus")).unwrap().is_none());
        assert!(codec.try_open_decoder(file, None, 0).unwrap().is_none());
    }
}
