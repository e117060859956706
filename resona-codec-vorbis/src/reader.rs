// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use symphonia_codec_vorbis::VorbisDecoder;
use symphonia_core::audio::{AudioBufferRef, Signal};
use symphonia_core::codecs::{Decoder, DecoderOptions};
use symphonia_core::errors::Error as SymphoniaError;
use symphonia_core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia_format_ogg::OggReader;

use resona_common::symphonia_bridge::{media_source_stream, surface_error};
use resona_core::audio::{duration_from_frames, vorbis_layout, ChannelPlacement, TrackInfo};
use resona_core::codecs::{
    validate_decode_request, validate_separated_request, AudioTrackDecoder,
};
use resona_core::dsp::conv;
use resona_core::errors::{corrupted_file_error, invalid_argument_error, Result};
use resona_core::io::{CapturedError, RandomAccessFile};
use resona_core::sample::{Sample, SampleFormat};
use resona_core::typed_decode_primitives;

/// Vorbis blocks max out at 8192 samples per channel; staging never exceeds this.
const VORBIS_BLOCK_SIZE: usize = 8192;

/// One decoded Vorbis packet staged as planar float samples.
#[derive(Default)]
struct PendingBlock {
    channels: Vec<Vec<f32>>,
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
    format: OggReader,
    decoder: VorbisDecoder,
    pending: PendingBlock,
    cursor: u64,
    discard: u64,
}

/// Decodes Ogg Vorbis files through the symphonia Ogg demuxer and Vorbis decoder.
///
/// The decoder hands out its own per-channel buffers each packet; those are copied
/// into the staging area and converted into the caller's buffers from there, so the
/// separated topology costs no extra pass and the interleaved one costs exactly one.
pub struct VorbisReader {
    file: Arc<dyn RandomAccessFile>,
    captured: CapturedError,
    track_id: u32,
    track_info: TrackInfo,
    channel_order: Vec<ChannelPlacement>,
    total_frames: u64,
    state: Mutex<DecodeState>,
}

impl VorbisReader {
    /// Opens an Ogg Vorbis file whose signature has already been verified.
    pub fn new(file: Arc<dyn RandomAccessFile>) -> Result<VorbisReader> {
        let (stream, captured) = media_source_stream(Arc::clone(&file));

        let format_options = FormatOptions { enable_gapless: true, ..FormatOptions::default() };
        let format = OggReader::try_new(stream, &format_options)
            .map_err(|error| surface_error(error, &captured))?;

        // The physical stream may multiplex several logical streams; decoding picks
        // one stream's packets apart from the interleaved pages, which this reader
        // does not implement.
        if format.tracks().len() > 1 {
            return resona_core::errors::unsupported_format_error(
                "multiplexed Ogg files with several logical streams are not supported",
            );
        }

        let (track_id, params, language) = {
            let track = match format.default_track() {
                Some(track) => track,
                None => return corrupted_file_error("Ogg file contains no logical stream"),
            };
            (track.id, track.codec_params.clone(), track.language.clone())
        };

        let decoder = VorbisDecoder::try_new(&params, &DecoderOptions::default())
            .map_err(|error| surface_error(error, &captured))?;

        let channel_count = params.channels.map_or(0, |channels| channels.count());
        if channel_count == 0 {
            return corrupted_file_error("Vorbis stream declares no channels");
        }

        let sample_rate = match params.sample_rate {
            Some(rate) if rate > 0 => rate,
            _ => return corrupted_file_error("Vorbis stream declares no sample rate"),
        };

        let total_frames = params.n_frames.unwrap_or(0);
        let channel_order = vorbis_layout(channel_count);

        let track_info = TrackInfo {
            codec_name: "Vorbis".to_string(),
            channel_count,
            channel_placements: channel_order
                .iter()
                .fold(ChannelPlacement::empty(), |mask, placement| mask | *placement),
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::F32,
            duration: duration_from_frames(total_frames, sample_rate),
            language,
        };

        Ok(VorbisReader {
            file,
            captured,
            track_id,
            track_info,
            channel_order,
            total_frames,
            state: Mutex::new(DecodeState {
                format,
                decoder,
                pending: PendingBlock::default(),
                cursor: 0,
                discard: 0,
            }),
        })
    }

    /// The metadata of the single stream in the file.
    pub fn track_info(&self) -> &TrackInfo {
        &self.track_info
    }

    fn fill_pending(&self, state: &mut MutexGuard<'_, DecodeState>) -> Result<bool> {
        loop {
            let packet = match state.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::EndOfFile) => {
                    if let Some(root_cause) = self.captured.take() {
                        return Err(root_cause);
                    }
                    return Ok(false);
                }
                Err(error) => return Err(surface_error(error, &self.captured)),
            };

            if packet.track_id() != self.track_id {
                debug!("skipping packet of logical stream {}", packet.track_id());
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

    fn decode_interleaved_typed<S: Sample>(&self, target: &mut [S], frame_count: usize) -> Result<()> {
        let channels = self.track_info.channel_count;
        let mut state = self.state.lock().unwrap();
        validate_decode_request(frame_count, target.len(), channels, state.cursor, self.total_frames)?;

        let mut scratch: Vec<S> = Vec::new();
        let mut produced = 0usize;
        while produced < frame_count {
            let available = match self.next_frames(&mut state)? {
                Some(available) => available,
                None => return corrupted_file_error("Vorbis stream ended before its declared length"),
            };

            let take = usize::min(available, frame_count - produced);
            scratch.resize(take, S::MID);

            let consumed = state.pending.consumed;
            for (channel, samples) in state.pending.channels.iter().enumerate() {
                conv::f32_to_samples(&samples[consumed..consumed + take], &mut scratch);
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
                None => return corrupted_file_error("Vorbis stream ended before its declared length"),
            };

            let take = usize::min(available, frame_count - produced);
            let consumed = state.pending.consumed;
            for (channel, samples) in state.pending.channels.iter().enumerate() {
                conv::f32_to_samples(
                    &samples[consumed..consumed + take],
                    &mut targets[channel][produced..produced + take],
                );
            }

            state.pending.consumed += take;
            state.cursor += take as u64;
            produced += take;
        }

        Ok(())
    }
}

/// Copies one decoded buffer into the planar staging area as floats.
fn stage_planar(decoded: &AudioBufferRef<'_>, pending: &mut PendingBlock) -> Result<()> {
    let channel_count = decoded.spec().channels.count();
    if pending.channels.len() != channel_count {
        pending.channels = vec![Vec::new(); channel_count];
    }
    pending.clear();

    match decoded {
        AudioBufferRef::F32(buffer) => {
            for channel in 0..channel_count {
                pending.channels[channel].extend_from_slice(buffer.chan(channel));
            }
        }
        AudioBufferRef::F64(buffer) => {
            for channel in 0..channel_count {
                pending.channels[channel]
                    .extend(buffer.chan(channel).iter().map(|&sample| sample as f32));
            }
        }
        _ => {
            return corrupted_file_error("Vorbis decoder produced a non-float sample buffer");
        }
    }

    Ok(())
}

impl AudioTrackDecoder for VorbisReader {
    fn clone_decoder(&self) -> Result<Box<dyn AudioTrackDecoder>> {
        Ok(Box::new(VorbisReader::new(Arc::clone(&self.file))?))
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
        SampleFormat::F32
    }

    fn is_natively_interleaved(&self) -> bool {
        false
    }

    fn block_size(&self) -> usize {
        VORBIS_BLOCK_SIZE
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
            state.cursor = frame_index;
            state.discard = 0;
            return Ok(());
        }

        let seeked = state
            .format
            .seek(SeekMode::Accurate, SeekTo::TimeStamp { ts: frame_index, track_id: self.track_id })
            .map_err(|error| surface_error(error, &self.captured))?;
        state.decoder.reset();

        state.discard = frame_index.saturating_sub(seeked.actual_ts);
        state.cursor = frame_index;
        Ok(())
    }

    typed_decode_primitives!();
}
