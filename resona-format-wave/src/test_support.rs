// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builders that assemble Waveform files byte by byte for the test suites. Hidden
//! from documentation; not part of the supported API.

/// Assembles a Waveform file from an envelope and a list of chunks.
pub struct WaveFileBuilder {
    four_cc: [u8; 4],
    little_endian: bool,
    chunks: Vec<([u8; 4], Vec<u8>)>,
}

impl WaveFileBuilder {
    /// The body of a PCMWAVEFORMAT/WAVEFORMATEX 'fmt ' chunk for 16-bit PCM.
    pub fn pcm16_format_body(channel_count: u16, sample_rate: u32) -> Vec<u8> {
        let block_align = channel_count * 2;
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&1u16.to_le_bytes()); // WAVE_FORMAT_PCM
        body.extend_from_slice(&channel_count.to_le_bytes());
        body.extend_from_slice(&sample_rate.to_le_bytes());
        body.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&16u16.to_le_bytes());
        body
    }

    /// Starts a little-endian "RIFF" file with a 16-bit PCM 'fmt ' chunk.
    pub fn pcm16(channel_count: u16, sample_rate: u32) -> WaveFileBuilder {
        WaveFileBuilder {
            four_cc: *b"RIFF",
            little_endian: true,
            chunks: vec![(*b"fmt ", Self::pcm16_format_body(channel_count, sample_rate))],
        }
    }

    /// Starts a 32-bit float "RIFF" file (format tag 3).
    pub fn float32(channel_count: u16, sample_rate: u32) -> WaveFileBuilder {
        let block_align = channel_count * 4;
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&3u16.to_le_bytes()); // WAVE_FORMAT_IEEE_FLOAT
        body.extend_from_slice(&channel_count.to_le_bytes());
        body.extend_from_slice(&sample_rate.to_le_bytes());
        body.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&32u16.to_le_bytes());

        WaveFileBuilder { four_cc: *b"RIFF", little_endian: true, chunks: vec![(*b"fmt ", body)] }
    }

    /// Starts a big-endian file ("RIFX" or "FFIR") with a 16-bit PCM 'fmt ' chunk.
    pub fn pcm16_big_endian(
        channel_count: u16,
        sample_rate: u32,
        four_cc: [u8; 4],
    ) -> WaveFileBuilder {
        let block_align = channel_count * 2;
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&channel_count.to_be_bytes());
        body.extend_from_slice(&sample_rate.to_be_bytes());
        body.extend_from_slice(&(sample_rate * block_align as u32).to_be_bytes());
        body.extend_from_slice(&block_align.to_be_bytes());
        body.extend_from_slice(&16u16.to_be_bytes());

        WaveFileBuilder { four_cc, little_endian: false, chunks: vec![(*b"fmt ", body)] }
    }

    /// Starts a little-endian WAVEFORMATEXTENSIBLE file.
    pub fn extensible(
        channel_count: u16,
        sample_rate: u32,
        stored_bits: u16,
        valid_bits: u16,
        channel_mask: u32,
        sub_type: [u8; 16],
    ) -> WaveFileBuilder {
        let block_align = channel_count * stored_bits.div_ceil(8);
        let mut body = Vec::with_capacity(40);
        body.extend_from_slice(&65534u16.to_le_bytes()); // WAVE_FORMAT_EXTENSIBLE
        body.extend_from_slice(&channel_count.to_le_bytes());
        body.extend_from_slice(&sample_rate.to_le_bytes());
        body.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&stored_bits.to_le_bytes());
        body.extend_from_slice(&22u16.to_le_bytes());
        body.extend_from_slice(&valid_bits.to_le_bytes());
        body.extend_from_slice(&channel_mask.to_le_bytes());
        body.extend_from_slice(&sub_type);

        WaveFileBuilder { four_cc: *b"RIFF", little_endian: true, chunks: vec![(*b"fmt ", body)] }
    }

    /// Appends an arbitrary chunk.
    pub fn chunk(mut self, tag: [u8; 4], body: &[u8]) -> WaveFileBuilder {
        self.chunks.push((tag, body.to_vec()));
        self
    }

    /// Appends a 'data' chunk holding little-endian 16-bit frames.
    pub fn data_frames<const C: usize>(self, frames: &[[i16; C]]) -> WaveFileBuilder {
        let mut body = Vec::with_capacity(frames.len() * C * 2);
        for frame in frames {
            for sample in frame {
                body.extend_from_slice(&sample.to_le_bytes());
            }
        }
        self.chunk(*b"data", &body)
    }

    /// Appends a 'data' chunk holding big-endian 16-bit frames.
    pub fn data_frames_be<const C: usize>(self, frames: &[[i16; C]]) -> WaveFileBuilder {
        let mut body = Vec::with_capacity(frames.len() * C * 2);
        for frame in frames {
            for sample in frame {
                body.extend_from_slice(&sample.to_be_bytes());
            }
        }
        self.chunk(*b"data", &body)
    }

    /// Appends a 'data' chunk holding little-endian 32-bit float frames.
    pub fn data_frames_f32<const C: usize>(self, frames: &[[f32; C]]) -> WaveFileBuilder {
        let mut body = Vec::with_capacity(frames.len() * C * 4);
        for frame in frames {
            for sample in frame {
                body.extend_from_slice(&sample.to_le_bytes());
            }
        }
        self.chunk(*b"data", &body)
    }

    /// Appends a 'data' chunk with raw bytes.
    pub fn data_bytes(self, bytes: &[u8]) -> WaveFileBuilder {
        self.chunk(*b"data", bytes)
    }

    /// Overwrites bytes of the 'fmt ' chunk body, for corrupting specific fields.
    pub fn patch_format_body(&mut self, offset: usize, bytes: &[u8]) {
        let body = &mut self.chunks.iter_mut().find(|(tag, _)| tag == b"fmt ").unwrap().1;
        body[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Assembles the final file bytes.
    pub fn build(self) -> Vec<u8> {
        let mut chunk_bytes = Vec::new();
        for (tag, body) in &self.chunks {
            chunk_bytes.extend_from_slice(tag);
            let length = body.len() as u32;
            if self.little_endian {
                chunk_bytes.extend_from_slice(&length.to_le_bytes());
            } else {
                chunk_bytes.extend_from_slice(&length.to_be_bytes());
            }
            chunk_bytes.extend_from_slice(body);
            if body.len() % 2 != 0 {
                chunk_bytes.push(0);
            }
        }

        let mut file = Vec::with_capacity(12 + chunk_bytes.len());
        file.extend_from_slice(&self.four_cc);
        let riff_size = (chunk_bytes.len() + 4) as u32;
        if self.little_endian {
            file.extend_from_slice(&riff_size.to_le_bytes());
        } else {
            file.extend_from_slice(&riff_size.to_be_bytes());
        }
        file.extend_from_slice(b"WAVE");
        file.extend_from_slice(&chunk_bytes);
        file
    }
}

/// The smallest useful Waveform file: a 44-byte header followed by one frame of
/// 16-bit stereo silence at 44100 Hz.
pub fn minimal_wave_file() -> Vec<u8> {
    WaveFileBuilder::pcm16(2, 44100).data_frames(&[[0i16, 0i16]]).build()
}
