// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use symphonia_bundle_flac::{FlacDecoder, FlacReader as FlacFormatReader};
use symphonia_core::audio::{AudioBufferRef, Signal};
use symphonia_core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia_core::errors::Error as SymphoniaError;
use symphonia_core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};

use resona_common::symphonia_bridge::{
    media_source_stream, placements_from_channels, surface_error,
};
use resona_core::audio::{duration_from_frames, ChannelPlacement, TrackInfo};
use resona_core::codecs::{
    validate_decode_request, validate_separated_request, AudioTrackDecoder,
};
use resona_core::dsp::conv;
use resona_core::errors::{corrupted_file_error, invalid_argument_error, Result};
use resona_core::io::{CapturedError, RandomAccessFile};
use resona_core::sample::{Sample, SampleFormat};
use resona_core::typed_decode_primitives;

use crate::flac_layout;

/// Fallback decoding unit when the stream does not declare its block size.
const DEFAULT_BLOCK_SIZE: usize = 4096;

/// One decoded FLAC packet staged as planar integer samples.
#[derive(Default)]
struct PendingBlock {
    channels: Vec<Vec<i32>>,
    consumed: usize,
}

impl PendingBlock {
    fn available(&self) -> usize {
        self.channels.first().map_or(0, |channel| channel.len() - self.consumed)
    }

    fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.clear();
        }
        self.consumed = 0;
    }
}

struct DecodeState {
    format: FlacFormatReader,
    decoder: FlacDecoder,
    pending: PendingBlock,
    /// Frame index of the next frame handed to the caller.
    cursor: u64,
    /// Frames to discard after a seek that landed before the requested frame.
    discard: u64,
}

/// Decodes FLAC files through the symphonia FLAC demuxer and decoder.
///
/// The codec library consumes the shared file through a stream adapter; after every
/// library call the adapter's captured-error slot is checked so that a failing file
/// surfaces as the original file-access error instead of a generic decode failure.
pub struct FlacReader {
    file: Arc<dyn RandomAccessFile>,
    captured: CapturedError,
    track_id: u32,
    track_info: TrackInfo,
    channel_order: Vec<ChannelPlacement>,
    total_frames: u64,
    valid_bits: u32,
    block_frames: usize,
    state: Mutex<DecodeState>,
}

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

impl FlacReader {
    /// Opens a FLAC file whose signature has already been verified.
    pub fn new(file: Arc<dyn RandomAccessFile>) -> Result<FlacReader> {
        let (stream, captured) = media_source_stream(Arc::clone(&file));

        let format = FlacFormatReader::try_new(stream, &FormatOptions::default())
            .map_err(|error| surface_error(error, &captured))?;

        let (track_id, params, language) = {
            let track = match format.default_track() {
                Some(track) => track,
                None => return corrupted_file_error("FLAC file contains no audio track"),
            };
            (track.id, track.codec_params.clone(), track.language.clone())
        };

        let decoder = FlacDecoder::try_new(&params, &DecoderOptions::default())
            .map_err(|error| surface_error(error, &captured))?;

        let channel_count = params.channels.map_or(0, |channels| channels.count());
        if channel_count == 0 || channel_count > 8 {
            return corrupted_file_error("FLAC file declares an invalid channel count");
        }

        let sample_rate = match params.sample_rate {
            Some(rate) if rate > 0 => rate,
            _ => return corrupted_file_error("FLAC file declares no sample rate"),
        };

        let valid_bits = params.bits_per_sample.unwrap_or(16);
        let total_frames = params.n_frames.unwrap_or(0);
        let channel_order = flac_layout(channel_count);

        // The library and this crate agree on the Microsoft channel-mask bit order,
        // so the stream's mask carries over directly.
        let channel_placements = params
            .channels
            .map(placements_from_channels)
            .unwrap_or(ChannelPlacement::empty());

        let track_info = TrackInfo {
            codec_name: "FLAC".to_string(),
            channel_count,
            channel_placements,
            sample_rate,
            bits_per_sample: valid_bits,
            sample_format: integer_format_from_bits(valid_bits),
            duration: duration_from_frames(total_frames, sample_rate),
            language,
        };

        let block_frames = block_frames_of(&params);

        Ok(FlacReader {
            file,
            captured,
            track_id,
            track_info,
            channel_order,
            total_frames,
            valid_bits,
            block_frames,
            state: Mutex::new(DecodeState {
                format,
                decoder,
                pending: PendingBlock::default(),
                cursor: 0,
                discard: 0,
            }),
        })
    }

    /// The metadata of the single track in the file.
    pub fn track_info(&self) -> &TrackInfo {
        &self.track_info
    }

    /// Demuxes and decodes packets until samples are staged or the stream ends.
    fn fill_pending(&self, state: &mut MutexGuard<'_, DecodeState>) -> Result<bool> {
        loop {
            let packet = match state.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::EndOfFile) => {
                    // A file error captured in the adapter also surfaces as a stream
                    // failure inside the library; it must win over a plain EOF.
                    if let Some(root_cause) = self.captured.take() {
                        return Err(root_cause);
                    }
                    return Ok(false);
                }
                Err(error) => return Err(surface_error(error, &self.captured)),
            };

            if packet.track_id() != self.track_id {
                debug!("skipping packet of unknown track {}", packet.track_id());
                continue;
            }

            let state = &mut **state;
            match state.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    stage_planar(&decoded, &mut state.pending)?;
                    return Ok(true);
                }
                Err(error) => return Err(surface_error(error, &self.captured)),
            }
        }
    }

    fn decode_interleaved_typed<S: Sample>(&self, target: &mut [S], frame_count: usize) -> Result<()> {
        let channels = self.track_info.channel_count;
        let mut state = self.state.lock().unwrap();
        validate_decode_request(frame_count, target.len(), channels, state.cursor, self.total_frames)?;

        let mut scratch: Vec<S> = Vec::new();
        let mut produced = 0usize;
        while produced < frame_count {
            let available = match self.next_frames(&mut state)? {
                Some(available) => available,
                None => return corrupted_file_error("FLAC stream ended before its declared length"),
            };

            let take = usize::min(available, frame_count - produced);
            scratch.resize(take, S::MID);

            let consumed = state.pending.consumed;
            for (channel, samples) in state.pending.channels.iter().enumerate() {
                conv::i32_to_samples(&samples[consumed..consumed + take], self.valid_bits, &mut scratch);
                for frame in 0..take {
                    target[(produced + frame) * channels + channel] = scratch[frame];
                }
            }

            state.pending.consumed += take;
            state.cursor += take as u64;
            produced += take;
        }

        Ok(())
    }

    fn decode_separated_typed<S: Sample>(
        &self,
        targets: &mut [&mut [S]],
        frame_count: usize,
    ) -> Result<()> {
        let channels = self.track_info.channel_count;
        let mut state = self.state.lock().unwrap();
        validate_separated_request(targets, frame_count, channels, state.cursor, self.total_frames)?;

        let mut produced = 0usize;
        while produced < frame_count {
            let available = match self.next_frames(&mut state)? {
                Some(available) => available,
                None => return corrupted_file_error("FLAC stream ended before its declared length"),
            };

            let take = usize::min(available, frame_count - produced);
            let consumed = state.pending.consumed;
            for (channel, samples) in state.pending.channels.iter().enumerate() {
                conv::i32_to_samples(
                    &samples[consumed..consumed + take],
                    self.valid_bits,
                    &mut targets[channel][produced..produced + take],
                );
            }

            state.pending.consumed += take;
            state.cursor += take as u64;
            produced += take;
        }

        Ok(())
    }

    /// Ensures staged samples are available, honoring any post-seek discard.
    /// Returns the number of staged frames, or `None` at the end of the stream.
    fn next_frames(&self, state: &mut MutexGuard<'_, DecodeState>) -> Result<Option<usize>> {
        loop {
            if state.pending.available() == 0 && !self.fill_pending(state)? {
                return Ok(None);
            }

            if state.discard > 0 {
                let drop = usize::min(state.discard as usize, state.pending.available());
                state.pending.consumed += drop;
                state.discard -= drop as u64;
                continue;
            }

            return Ok(Some(state.pending.available()));
        }
    }
}

/// Chooses the decoding unit reported as the codec's block size.
fn block_frames_of(params: &CodecParameters) -> usize {
    params
        .max_frames_per_packet
        .map(|frames| frames as usize)
        .filter(|frames| *frames > 0)
        .unwrap_or(DEFAULT_BLOCK_SIZE)
}

/// Copies one decoded buffer into the planar staging area as 32-bit integers
/// holding the stream's valid bits.
fn stage_planar(decoded: &AudioBufferRef<'_>, pending: &mut PendingBlock) -> Result<()> {
    let channel_count = decoded.spec().channels.count();
    if pending.channels.len() != channel_count {
        pending.channels = vec![Vec::new(); channel_count];
    }
    pending.clear();

    match decoded {
        AudioBufferRef::U8(buffer) => {
            for channel in 0..channel_count {
                pending.channels[channel]
                    .extend(buffer.chan(channel).iter().map(|&sample| sample as i32 - 128));
            }
        }
        AudioBufferRef::S8(buffer) => {
            for channel in 0..channel_count {
                pending.channels[channel]
                    .extend(buffer.chan(channel).iter().map(|&sample| sample as i32));
            }
        }
        AudioBufferRef::S16(buffer) => {
            for channel in 0..channel_count {
                pending.channels[channel]
                    .extend(buffer.chan(channel).iter().map(|&sample| sample as i32));
            }
        }
        AudioBufferRef::S24(buffer) => {
            for channel in 0..channel_count {
                pending.channels[channel]
                    .extend(buffer.chan(channel).iter().map(|&sample| sample.inner()));
            }
        }
        AudioBufferRef::S32(buffer) => {
            for channel in 0..channel_count {
                pending.channels[channel].extend_from_slice(buffer.chan(channel));
            }
        }
        _ => {
            return corrupted_file_error("FLAC decoder produced a non-integer sample buffer");
        }
    }

    Ok(())
}

impl AudioTrackDecoder for FlacReader {
    fn clone_decoder(&self) -> Result<Box<dyn AudioTrackDecoder>> {
        Ok(Box::new(FlacReader::new(Arc::clone(&self.file))?))
    }

    fn channel_count(&self) -> usize {
        self.track_info.channel_count
    }

    fn channel_order(&self) -> &[ChannelPlacement] {
        &self.channel_order
    }

    fn frame_count(&self) -> u64 {
        self.total_frames
    }

    fn native_sample_format(&self) -> SampleFormat {
        self.track_info.sample_format
    }

    fn is_natively_interleaved(&self) -> bool {
        false
    }

    fn block_size(&self) -> usize {
        self.block_frames
    }

    fn frame_position(&self) -> u64 {
        self.state.lock().unwrap().cursor
    }

    fn seek_to_frame(&self, frame_index: u64) -> Result<()> {
        if frame_index > self.total_frames {
            return invalid_argument_error(format!(
                "seek target {} lies beyond the last frame ({})",
                frame_index, self.total_frames
            ));
        }

        let mut state = self.state.lock().unwrap();
        state.pending.clear();

        if frame_index == self.total_frames {
            // Nothing decodable remains; the next decode request is rejected by the
            // cursor validation, so the library does not need to be positioned.
            state.cursor = frame_index;
            state.discard = 0;
            return Ok(());
        }

        let seeked = state
            .format
            .seek(SeekMode::Accurate, SeekTo::TimeStamp { ts: frame_index, track_id: self.track_id })
            .map_err(|error| surface_error(error, &self.captured))?;
        state.decoder.reset();

        // An accurate seek lands at or before the requested frame; the remainder is
        // decoded and discarded so the cursor is exact.
        state.discard = frame_index.saturating_sub(seeked.actual_ts);
        state.cursor = frame_index;
        Ok(())
    }

    typed_decode_primitives!();
}
