// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ogg Vorbis support for Resona, wrapping the symphonia Ogg demuxer and Vorbis
//! decoder. Vorbis decodes to floating point in separated channel buffers; files
//! multiplexing more than one logical stream are rejected as unsupported.

use std::sync::Arc;

use resona_common::ogg;
use resona_core::audio::ContainerInfo;
use resona_core::codecs::{AudioCodec, AudioTrackDecoder};
use resona_core::errors::{unsupported_format_error, Result};
use resona_core::io::RandomAccessFile;

mod reader;

pub use reader::VorbisReader;

/// Vorbis needs its identification, comment, and setup headers before any audio; in
/// practice no intact file undercuts this size.
pub const SMALLEST_POSSIBLE_VORBIS_SIZE: u64 = 4096;

/// Checks for the first page of a logical Vorbis stream: a begin-of-stream Ogg page
/// whose packet is a Vorbis header packet (type 1, 3, or 5) carrying the "vorbis"
/// tag.
fn is_vorbis_header(file: &Arc<dyn RandomAccessFile>) -> Result<bool> {
    if file.len() < SMALLEST_POSSIBLE_VORBIS_SIZE {
        return Ok(false);
    }

    let mut header = [0u8; 48];
    file.read_at(0, &mut header)?;

    if !ogg::is_first_page(&header) {
        return Ok(false);
    }

    let packet = &header[ogg::FIRST_PACKET_OFFSET..];
    let packet_type = packet[0];
    Ok(matches!(packet_type, 1 | 3 | 5) && &packet[1..7] == b"vorbis")
}

/// The Ogg Vorbis audio codec.
#[derive(Default)]
pub struct VorbisCodec;

impl VorbisCodec {
    pub fn new() -> VorbisCodec {
        VorbisCodec
    }
}

impl AudioCodec for VorbisCodec {
    fn name(&self) -> &str {
        "Vorbis"
    }

    fn file_extensions(&self) -> &[&str] {
        &["ogg"]
    }

    fn try_read_info(
        &self,
        file: &Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
    ) -> Result<Option<ContainerInfo>> {
        if !is_vorbis_header(file)? {
            return Ok(None);
        }

        let reader = VorbisReader::new(Arc::clone(file))?;
        Ok(Some(ContainerInfo::single_track(reader.track_info().clone())))
    }

    fn try_open_decoder(
        &self,
        file: Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
        track_index: usize,
    ) -> Result<Option<Box<dyn AudioTrackDecoder>>> {
        if !is_vorbis_header(&file)? {
            return Ok(None);
        }
        if track_index != 0 {
            return unsupported_format_error("only the primary Vorbis stream can be decoded");
        }

        Ok(Some(Box::new(VorbisReader::new(file)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_core::io::MemoryFile;

    fn as_file(mut bytes: Vec<u8>) -> Arc<dyn RandomAccessFile> {
        bytes.resize(usize::max(bytes.len(), SMALLEST_POSSIBLE_VORBIS_SIZE as usize), 0);
        Arc::new(MemoryFile::from_vec(bytes))
    }

    fn vorbis_identification_packet() -> Vec<u8> {
        let mut packet = vec![1u8]; // identification header
        packet.extend_from_slice(b"vorbis");
        packet.extend_from_slice(&[0u8; 23]); // version, channels, rate, ...
        packet
    }

    #[test]
    fn detection_accepts_a_vorbis_first_page() {
        let page = ogg::first_page_with_packet(&vorbis_identification_packet());
        assert!(is_vorbis_header(&as_file(page)).unwrap());
    }

    #[test]
    fn detection_rejects_foreign_streams() {
        // An Ogg page that carries something other than Vorbis.
        let mut packet = vec![0u8; 30];
        packet[..8].copy_from_slice(b"OpusHead");
        let page = ogg::first_page_with_packet(&packet);
        assert!(!is_vorbis_header(&as_file(page)).unwrap());

        // A Vorbis packet with an invalid header type.
        let mut packet = vorbis_identification_packet();
        packet[0] = 2;
        let page = ogg::first_page_with_packet(&packet);
        assert!(!is_vorbis_header(&as_file(page)).unwrap());

        // Not an Ogg page at all.
        assert!(!is_vorbis_header(&as_file(vec![0x11; 64])).unwrap());

        // Too small, however plausible the content.
        let page = ogg::first_page_with_packet(&vorbis_identification_packet());
        let file: Arc<dyn RandomAccessFile> = Arc::new(MemoryFile::from_vec(page));
        assert!(!is_vorbis_header(&file).unwrap());
    }

    #[test]
    fn codec_declines_foreign_files_without_error() {
        let codec = VorbisCodec::new();
        let file = as_file(vec![0x42; 64]);
        assert!(codec.try_read_info(&file, Some("ogg")).unwrap().is_none());
        assert!(codec.try_open_decoder(file, None, 0).unwrap().is_none());
    }
}
