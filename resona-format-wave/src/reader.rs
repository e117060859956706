// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Mutex};

use resona_core::audio::{layout_from_mask, ChannelPlacement};
use resona_core::codecs::{
    validate_decode_request, validate_separated_request, AudioTrackDecoder,
};
use resona_core::dsp::conv;
use resona_core::errors::{
    corrupted_file_error, invalid_argument_error, unsupported_format_error, Result,
};
use resona_core::io::endian::{BigEndianReader, ByteOrderReader, LittleEndianReader};
use resona_core::io::RandomAccessFile;
use resona_core::sample::{Sample, SampleFormat};
use resona_core::typed_decode_primitives;

use crate::chunks::{self, ParsedWave, WaveByteOrder};

/// Upper bound on the bytes fetched from the file per decode iteration.
const READ_BUFFER_SIZE: usize = 16384;

/// One block of samples in the file's native representation, interleaved.
enum NativeBlock {
    Int { samples: Vec<i32>, valid_bits: u32 },
    Float(Vec<f32>),
    Double(Vec<f64>),
}

/// Decodes the sample data of a Waveform audio file.
///
/// Waveform stores raw PCM, so there is no codec library behind this reader; samples
/// are fetched straight out of the data chunk and only pass through the sample-format
/// conversion kernels. The native topology is interleaved, and seeking is exact
/// offset arithmetic.
pub struct WaveformReader {
    file: Arc<dyn RandomAccessFile>,
    parsed: ParsedWave,
    channel_order: Vec<ChannelPlacement>,
    total_frames: u64,
    bytes_per_frame: usize,
    container_bytes_per_sample: usize,
    cursor: Mutex<u64>,
}

impl WaveformReader {
    /// Parses the file and creates a reader over its data chunk. Returns `Ok(None)`
    /// if the file is not a Waveform file.
    pub fn try_new(file: Arc<dyn RandomAccessFile>) -> Result<Option<WaveformReader>> {
        let parsed = match chunks::parse(&file)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let container_bytes_per_sample = (parsed.format.stored_bits_per_sample as usize + 7) / 8;
        match parsed.format.sample_format {
            SampleFormat::F32 if container_bytes_per_sample != 4 => {
                return corrupted_file_error("Waveform file stores 32-bit floats in a different size")
            }
            SampleFormat::F64 if container_bytes_per_sample != 8 => {
                return corrupted_file_error("Waveform file stores 64-bit floats in a different size")
            }
            SampleFormat::F32 | SampleFormat::F64 => {}
            _ => {
                if container_bytes_per_sample > 4 {
                    return unsupported_format_error(
                        "Waveform file stores integer samples wider than 32 bits",
                    );
                }
                if parsed.format.valid_bits_per_sample as usize > container_bytes_per_sample * 8
                    || parsed.format.valid_bits_per_sample == 0
                {
                    return corrupted_file_error(
                        "Waveform file declares more valid bits than its samples store",
                    );
                }
            }
        }

        let bytes_per_frame = parsed.bytes_per_frame();
        if bytes_per_frame < container_bytes_per_sample * parsed.format.channel_count {
            return corrupted_file_error("Waveform file frames are smaller than their samples");
        }

        let channel_order =
            layout_from_mask(parsed.format.channel_count, parsed.format.channel_mask);
        let total_frames = parsed.frame_count();

        Ok(Some(WaveformReader {
            file,
            parsed,
            channel_order,
            total_frames,
            bytes_per_frame,
            container_bytes_per_sample,
            cursor: Mutex::new(0),
        }))
    }

    /// Reads and unpacks `frames` frames starting at `start_frame`.
    fn read_native_block(&self, start_frame: u64, frames: usize) -> Result<NativeBlock> {
        let stride = self.bytes_per_frame;
        let mut bytes = vec![0u8; frames * stride];
        self.file.read_at(self.parsed.data_offset + start_frame * stride as u64, &mut bytes)?;

        Ok(match self.parsed.byte_order {
            WaveByteOrder::LittleEndian => self.unpack_block::<LittleEndianReader>(&bytes, frames),
            WaveByteOrder::BigEndian => self.unpack_block::<BigEndianReader>(&bytes, frames),
        })
    }

    fn unpack_block<R: ByteOrderReader>(&self, bytes: &[u8], frames: usize) -> NativeBlock {
        let channels = self.parsed.format.channel_count;
        let stride = self.bytes_per_frame;
        let sample_bytes = self.container_bytes_per_sample;

        match self.parsed.format.sample_format {
            SampleFormat::F32 => {
                let mut samples = Vec::with_capacity(frames * channels);
                for frame in 0..frames {
                    for channel in 0..channels {
                        let at = frame * stride + channel * sample_bytes;
                        samples.push(f32::from_bits(R::read_u32(bytes, at)));
                    }
                }
                NativeBlock::Float(samples)
            }
            SampleFormat::F64 => {
                let mut samples = Vec::with_capacity(frames * channels);
                for frame in 0..frames {
                    for channel in 0..channels {
                        let at = frame * stride + channel * sample_bytes;
                        samples.push(f64::from_bits(R::read_u64(bytes, at)));
                    }
                }
                NativeBlock::Double(samples)
            }
            _ => {
                // Integer samples: sign-extend (or de-bias, for 8-bit) the container,
                // then drop any padding bits below the valid bits.
                let valid_bits = self.parsed.format.valid_bits_per_sample;
                let shift = sample_bytes as u32 * 8 - valid_bits;

                let mut samples = Vec::with_capacity(frames * channels);
                for frame in 0..frames {
                    for channel in 0..channels {
                        let at = frame * stride + channel * sample_bytes;
                        let container = match sample_bytes {
                            1 => R::read_u8(bytes, at) as i32 - 128,
                            2 => R::read_u16(bytes, at) as i16 as i32,
                            3 => (R::read_u24(bytes, at) << 8) as i32 >> 8,
                            _ => R::read_u32(bytes, at) as i32,
                        };
                        samples.push(container >> shift);
                    }
                }
                NativeBlock::Int { samples, valid_bits }
            }
        }
    }

    /// Largest frame count fetched per iteration.
    fn frames_per_read(&self) -> usize {
        usize::max(1, READ_BUFFER_SIZE / self.bytes_per_frame)
    }

    fn decode_interleaved_typed<S: Sample>(&self, target: &mut [S], frame_count: usize) -> Result<()> {
        let channels = self.parsed.format.channel_count;
        let mut cursor = self.cursor.lock().unwrap();
        validate_decode_request(frame_count, target.len(), channels, *cursor, self.total_frames)?;

        let mut produced = 0usize;
        while produced < frame_count {
            let step = usize::min(frame_count - produced, self.frames_per_read());
            let block = self.read_native_block(*cursor, step)?;

            let out = &mut target[produced * channels..(produced + step) * channels];
            match block {
                NativeBlock::Int { samples, valid_bits } => {
                    conv::i32_to_samples(&samples, valid_bits, out)
                }
                NativeBlock::Float(samples) => conv::f32_to_samples(&samples, out),
                NativeBlock::Double(samples) => conv::f64_to_samples(&samples, out),
            }

            *cursor += step as u64;
            produced += step;
        }

        Ok(())
    }

    fn decode_separated_typed<S: Sample>(
        &self,
        targets: &mut [&mut [S]],
        frame_count: usize,
    ) -> Result<()> {
        let channels = self.parsed.format.channel_count;
        let mut cursor = self.cursor.lock().unwrap();
        validate_separated_request(targets, frame_count, channels, *cursor, self.total_frames)?;

        let mut produced = 0usize;
        while produced < frame_count {
            let step = usize::min(frame_count - produced, self.frames_per_read());
            let block = self.read_native_block(*cursor, step)?;

            // The file is interleaved; gather each channel into a contiguous run so
            // the conversion kernels can work on it.
            match block {
                NativeBlock::Int { samples, valid_bits } => {
                    let mut gathered = vec![0i32; step];
                    for (channel, target) in targets.iter_mut().enumerate() {
                        for frame in 0..step {
                            gathered[frame] = samples[frame * channels + channel];
                        }
                        conv::i32_to_samples(
                            &gathered,
                            valid_bits,
                            &mut target[produced..produced + step],
                        );
                    }
                }
                NativeBlock::Float(samples) => {
                    let mut gathered = vec![0.0f32; step];
                    for (channel, target) in targets.iter_mut().enumerate() {
                        for frame in 0..step {
                            gathered[frame] = samples[frame * channels + channel];
                        }
                        conv::f32_to_samples(&gathered, &mut target[produced..produced + step]);
                    }
                }
                NativeBlock::Double(samples) => {
                    let mut gathered = vec![0.0f64; step];
                    for (channel, target) in targets.iter_mut().enumerate() {
                        for frame in 0..step {
                            gathered[frame] = samples[frame * channels + channel];
                        }
                        conv::f64_to_samples(&gathered, &mut target[produced..produced + step]);
                    }
                }
            }

            *cursor += step as u64;
            produced += step;
        }

        Ok(())
    }
}

impl AudioTrackDecoder for WaveformReader {
    fn clone_decoder(&self) -> Result<Box<dyn AudioTrackDecoder>> {
        match WaveformReader::try_new(Arc::clone(&self.file))? {
            Some(reader) => Ok(Box::new(reader)),
            None => unsupported_format_error("file is no longer a Waveform audio file"),
        }
    }

    fn channel_count(&self) -> usize {
        self.parsed.format.channel_count
    }

    fn channel_order(&self) -> &[ChannelPlacement] {
        &self.channel_order
    }

    fn frame_count(&self) -> u64 {
        self.total_frames
    }

    fn native_sample_format(&self) -> SampleFormat {
        self.parsed.format.sample_format
    }

    fn is_natively_interleaved(&self) -> bool {
        true
    }

    fn block_size(&self) -> usize {
        self.frames_per_read()
    }

    fn frame_position(&self) -> u64 {
        *self.cursor.lock().unwrap()
    }

    fn seek_to_frame(&self, frame_index: u64) -> Result<()> {
        if frame_index > self.total_frames {
            return invalid_argument_error(format!(
                "seek target {} lies beyond the last frame ({})",
                frame_index, self.total_frames
            ));
        }
        *self.cursor.lock().unwrap() = frame_index;
        Ok(())
    }

    typed_decode_primitives!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::WaveFileBuilder;
    use resona_core::io::MemoryFile;

    fn reader_over(bytes: Vec<u8>) -> WaveformReader {
        let file: Arc<dyn RandomAccessFile> = Arc::new(MemoryFile::from_vec(bytes));
        WaveformReader::try_new(file).unwrap().unwrap()
    }

    fn sawtooth_frames(frames: usize) -> Vec<[i16; 2]> {
        (0..frames).map(|i| [(i as i16).wrapping_mul(211), (i as i16).wrapping_mul(-211)]).collect()
    }

    #[test]
    fn decodes_16_bit_samples_natively() {
        let reader =
            reader_over(WaveFileBuilder::pcm16(2, 44100).data_frames(&[[1000, -1000], [32767, -32767]]).build());

        let mut samples = [0i16; 4];
        let decoder: &dyn AudioTrackDecoder = &reader;
        decoder.decode_interleaved(&mut samples, 2).unwrap();
        assert_eq!(samples, [1000, -1000, 32767, -32767]);
        assert_eq!(reader.frame_position(), 2);
    }

    #[test]
    fn converts_16_bit_to_float() {
        let reader =
            reader_over(WaveFileBuilder::pcm16(1, 44100).data_frames(&[[32767], [-32767], [0]]).build());

        let mut samples = [0.0f32; 3];
        (&reader as &dyn AudioTrackDecoder).decode_interleaved(&mut samples, 3).unwrap();
        assert_eq!(samples, [1.0, -1.0, 0.0]);
    }

    #[test]
    fn decodes_float32_files() {
        let reader = reader_over(
            WaveFileBuilder::float32(2, 48000).data_frames_f32(&[[0.5, -0.5], [1.0, -1.0]]).build(),
        );

        assert_eq!(reader.native_sample_format(), SampleFormat::F32);

        let mut samples = [0.0f32; 4];
        (&reader as &dyn AudioTrackDecoder).decode_interleaved(&mut samples, 2).unwrap();
        assert_eq!(samples, [0.5, -0.5, 1.0, -1.0]);

        // The same file quantized to 16 bits.
        reader.seek_to_frame(0).unwrap();
        let mut samples = [0i16; 4];
        (&reader as &dyn AudioTrackDecoder).decode_interleaved(&mut samples, 2).unwrap();
        assert_eq!(samples, [16384, -16384, 32767, -32767]);
    }

    #[test]
    fn decodes_big_endian_samples() {
        let reader = reader_over(
            WaveFileBuilder::pcm16_big_endian(2, 48000, *b"RIFX")
                .data_frames_be(&[[12345, -12345]])
                .build(),
        );

        let mut samples = [0i16; 2];
        (&reader as &dyn AudioTrackDecoder).decode_interleaved(&mut samples, 1).unwrap();
        assert_eq!(samples, [12345, -12345]);
    }

    #[test]
    fn whole_file_equals_blockwise_decoding() {
        let frames = sawtooth_frames(777);
        let bytes = WaveFileBuilder::pcm16(2, 44100).data_frames(&frames).build();

        let reader = reader_over(bytes.clone());
        let mut at_once = vec![0i16; frames.len() * 2];
        (&reader as &dyn AudioTrackDecoder).decode_interleaved(&mut at_once, frames.len()).unwrap();

        let reader = reader_over(bytes);
        let decoder: &dyn AudioTrackDecoder = &reader;
        let mut blockwise = vec![0i16; frames.len() * 2];
        let mut produced = 0usize;
        for step in [1usize, 2, 3, 5, 8, 100, 300, 1000] {
            let step = usize::min(step, frames.len() - produced);
            decoder
                .decode_interleaved(&mut blockwise[produced * 2..(produced + step) * 2], step)
                .unwrap();
            produced += step;
        }
        assert_eq!(produced, frames.len());
        assert_eq!(at_once, blockwise);
    }

    #[test]
    fn separated_matches_interleaved() {
        let frames = sawtooth_frames(50);
        let bytes = WaveFileBuilder::pcm16(2, 44100).data_frames(&frames).build();

        let reader = reader_over(bytes.clone());
        let mut interleaved = vec![0.0f32; 100];
        (&reader as &dyn AudioTrackDecoder).decode_interleaved(&mut interleaved, 50).unwrap();

        let reader = reader_over(bytes);
        let mut left = vec![0.0f32; 50];
        let mut right = vec![0.0f32; 50];
        {
            let mut targets = [&mut left[..], &mut right[..]];
            (&reader as &dyn AudioTrackDecoder).decode_separated(&mut targets, 50).unwrap();
        }

        for i in 0..50 {
            assert_eq!(left[i], interleaved[i * 2]);
            assert_eq!(right[i], interleaved[i * 2 + 1]);
        }
    }

    #[test]
    fn seeking_back_reproduces_the_first_read() {
        let frames = sawtooth_frames(64);
        let reader = reader_over(WaveFileBuilder::pcm16(2, 44100).data_frames(&frames).build());
        let decoder: &dyn AudioTrackDecoder = &reader;

        let mut first = vec![0i16; 32];
        decoder.decode_interleaved(&mut first, 16).unwrap();

        reader.seek_to_frame(0).unwrap();
        let mut again = vec![0i16; 32];
        decoder.decode_interleaved(&mut again, 16).unwrap();
        assert_eq!(first, again);

        // Seeking into the middle must continue with the right frame.
        reader.seek_to_frame(10).unwrap();
        let mut middle = vec![0i16; 2];
        decoder.decode_interleaved(&mut middle, 1).unwrap();
        assert_eq!(middle[0], frames[10][0]);
    }

    #[test]
    fn cloned_decoders_are_independent() {
        let frames = sawtooth_frames(32);
        let reader = reader_over(WaveFileBuilder::pcm16(2, 44100).data_frames(&frames).build());
        let decoder: &dyn AudioTrackDecoder = &reader;
        let clone = reader.clone_decoder().unwrap();

        // Interleave reads between the original and the clone; both must see the
        // complete sequence.
        let mut from_original = vec![0i16; 64];
        let mut from_clone = vec![0i16; 64];
        for i in 0..32 {
            decoder.decode_interleaved(&mut from_original[i * 2..i * 2 + 2], 1).unwrap();
            clone.decode_interleaved(&mut from_clone[i * 2..i * 2 + 2], 1).unwrap();
        }
        assert_eq!(from_original, from_clone);
    }

    #[test]
    fn decoding_past_the_end_is_rejected() {
        let reader = reader_over(WaveFileBuilder::pcm16(2, 44100).data_frames(&[[0, 0]]).build());
        let decoder: &dyn AudioTrackDecoder = &reader;

        let mut samples = [0i16; 4];
        assert!(decoder.decode_interleaved(&mut samples, 2).is_err());
        // A short buffer is likewise rejected up front.
        assert!(decoder.decode_interleaved(&mut samples[..1], 1).is_err());
        assert!(reader.seek_to_frame(2).is_err());
    }

    #[test]
    fn unpacks_24_bit_packed_samples() {
        // Hand-build a 24-bit PCM file: format tag 1, 24 bits, 3-byte samples.
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes()); // mono
        body.extend_from_slice(&48000u32.to_le_bytes());
        body.extend_from_slice(&(48000u32 * 3).to_le_bytes());
        body.extend_from_slice(&3u16.to_le_bytes());
        body.extend_from_slice(&24u16.to_le_bytes());

        let samples: [i32; 3] = [8_388_607, -8_388_607, -1];
        let mut data = Vec::new();
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes()[..3]);
        }

        let bytes = WaveFileBuilder::pcm16(1, 48000); // placeholder, replaced below
        let mut builder = bytes;
        builder.patch_format_body(0, &body);
        let file_bytes = builder.data_bytes(&data).build();

        let reader = reader_over(file_bytes);
        assert_eq!(reader.native_sample_format(), SampleFormat::S24);

        let mut decoded = [0i32; 3];
        (&reader as &dyn AudioTrackDecoder).decode_interleaved(&mut decoded, 3).unwrap();
        // 24-bit values widened to 32 bits by bit replication.
        assert_eq!(decoded[0], 0x7FFFFF7F);
        assert!(decoded[1] < 0 && decoded[2] < 0);

        let mut as_float = [0.0f64; 3];
        reader.seek_to_frame(0).unwrap();
        (&reader as &dyn AudioTrackDecoder).decode_interleaved(&mut as_float, 3).unwrap();
        assert_eq!(as_float[0], 1.0);
        assert_eq!(as_float[1], -1.0);
    }
}
