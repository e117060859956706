// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Microsoft Waveform (RIFF/WAVE) support for Resona: container detection, the four
//! header-dialect parser, and a raw PCM track decoder.
//!
//! All four FourCC variants seen in the wild are handled ("RIFF" and "RIFX" per the
//! specification, plus the byte-reversed "FFIR"/"XFIR" files produced by
//! endian-confused writers), along with integer PCM, IEEE float PCM, and
//! WAVEFORMATEXTENSIBLE sample layouts.

use std::sync::Arc;

use resona_core::audio::ContainerInfo;
use resona_core::codecs::{AudioCodec, AudioTrackDecoder};
use resona_core::errors::{unsupported_format_error, Result};
use resona_core::io::RandomAccessFile;

pub mod chunks;
mod reader;

#[doc(hidden)]
pub mod test_support;

pub use reader::WaveformReader;

/// The Waveform audio codec.
#[derive(Default)]
pub struct WaveformCodec;

impl WaveformCodec {
    pub fn new() -> WaveformCodec {
        WaveformCodec
    }
}

impl AudioCodec for WaveformCodec {
    fn name(&self) -> &str {
        "Waveform"
    }

    fn file_extensions(&self) -> &[&str] {
        &["wav", "wave"]
    }

    fn try_read_info(
        &self,
        file: &Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
    ) -> Result<Option<ContainerInfo>> {
        Ok(chunks::parse(file)?.map(|parsed| ContainerInfo::single_track(parsed.track_info())))
    }

    fn try_open_decoder(
        &self,
        file: Arc<dyn RandomAccessFile>,
        _extension_hint: Option<&str>,
        track_index: usize,
    ) -> Result<Option<Box<dyn AudioTrackDecoder>>> {
        let reader = match WaveformReader::try_new(file)? {
            Some(reader) => reader,
            None => return Ok(None),
        };

        if track_index != 0 {
            return unsupported_format_error("Waveform audio files hold a single track");
        }

        Ok(Some(Box::new(reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_core::io::MemoryFile;
    use resona_core::sample::SampleFormat;

    use crate::test_support::minimal_wave_file;

    #[test]
    fn reads_info_of_the_minimal_file() {
        let codec = WaveformCodec::new();
        let file: Arc<dyn RandomAccessFile> =
            Arc::new(MemoryFile::from_vec(minimal_wave_file()));

        let info = codec.try_read_info(&file, Some("wav")).unwrap().unwrap();
        assert_eq!(info.default_track_index, 0);

        let track = info.default_track().unwrap();
        assert_eq!(track.codec_name, "Waveform");
        assert_eq!(track.channel_count, 2);
        assert_eq!(track.sample_rate, 44100);
        assert_eq!(track.bits_per_sample, 16);
        assert_eq!(track.sample_format, SampleFormat::S16);
    }

    #[test]
    fn declines_foreign_files() {
        let codec = WaveformCodec::new();
        let file: Arc<dyn RandomAccessFile> = Arc::new(MemoryFile::from_vec(vec![0u8; 512]));

        assert!(codec.try_read_info(&file, None).unwrap().is_none());
        assert!(codec.try_open_decoder(file, None, 0).unwrap().is_none());
    }

    #[test]
    fn rejects_secondary_track_indices() {
        let codec = WaveformCodec::new();
        let file: Arc<dyn RandomAccessFile> =
            Arc::new(MemoryFile::from_vec(minimal_wave_file()));

        assert!(codec.try_open_decoder(file, None, 1).is_err());
    }

    #[test]
    fn decoder_matches_info() {
        let codec = WaveformCodec::new();
        let file: Arc<dyn RandomAccessFile> =
            Arc::new(MemoryFile::from_vec(minimal_wave_file()));

        let info = codec.try_read_info(&file, None).unwrap().unwrap();
        let decoder = codec.try_open_decoder(file, None, 0).unwrap().unwrap();

        let track = info.default_track().unwrap();
        assert_eq!(decoder.channel_count(), track.channel_count);
        assert_eq!(decoder.channel_order().len(), track.channel_count);
        assert_eq!(decoder.frame_count(), track.frame_count());
    }
}
