// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;

use audiopus::coder::Decoder as OpusDecoder;
use audiopus::{Channels, SampleRate};
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

use crate::{read_opus_head, OpusHead};

/// Opus always decodes at 48 kHz, whatever the input material was sampled at.
const OPUS_SAMPLE_RATE: u32 = 48000;

/// The longest packet libopus can produce: 120 ms at 48 kHz.
const MAX_PACKET_FRAMES: usize = 5760;

/// Staging capacity in frames; comfortably above the largest packet.
const STAGING_FRAMES: usize = 8192;

/// Samples decoded and discarded ahead of a seek target so the predictive decoder
/// state has converged by the time the requested frame is reached (80 ms).
const PREROLL_FRAMES: u64 = 3840;

/// Reads the metadata of an Ogg Opus file without bringing up a packet decoder, so
/// surround files can still be described.
pub fn probe_info(file: &Arc<dyn RandomAccessFile>) -> Result<TrackInfo> {
    let head = read_opus_head(file)?;
    let (raw_frames, language) = ogg_stream_extent(Arc::clone(file))?;
    let total_frames = raw_frames.saturating_sub(head.pre_skip as u64);

    let channel_order = channel_order_of(&head);
    Ok(TrackInfo {
        codec_name: "Opus".to_string(),
        channel_count: head.channel_count,
        channel_placements: channel_order
            .iter()
            .fold(ChannelPlacement::empty(), |mask, placement| mask | *placement),
        sample_rate: OPUS_SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::F32,
        duration: duration_from_frames(total_frames, OPUS_SAMPLE_RATE),
        language,
    })
}

/// Opens the Ogg envelope and reports the stream length in granule units
/// (including the pre-skip region) along with the declared language, if any.
fn ogg_stream_extent(file: Arc<dyn RandomAccessFile>) -> Result<(u64, Option<String>)> {
    let (stream, captured) = media_source_stream(file);
    let format = OggReader::try_new(stream, &FormatOptions::default())
        .map_err(|error| surface_error(error, &captured))?;

    if format.tracks().len() > 1 {
        return resona_core::errors::unsupported_format_error(
            "multiplexed Ogg files with several logical streams are not supported",
        );
    }

    match format.default_track() {
        Some(track) => Ok((track.codec_params.n_frames.unwrap_or(0), track.language.clone())),
        None => corrupted_file_error("Ogg file contains no logical stream"),
    }
}

/// The channel order of an Opus stream. Mapping families 0 and 1 use the orderings
/// inherited from Vorbis; other families are application defined.
fn channel_order_of(head: &OpusHead) -> Vec<ChannelPlacement> {
    match head.mapping_family {
        0 | 1 => vorbis_layout(head.channel_count),
        _ => vec![ChannelPlacement::empty(); head.channel_count],
    }
}

/// Decoded samples staged interleaved, as libopus produces them.
#[derive(Default)]
struct PendingBlock {
    samples: Vec<f32>,
    consumed_frames: usize,
    frames: usize,
}

impl PendingBlock {
    fn available(&self) -> usize {
        self.frames - self.consumed_frames
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.consumed_frames = 0;
        self.frames = 0;
    }
}

struct DecodeState {
    format: OggReader,
    decoder: OpusDecoder,
    pending: PendingBlock,
    cursor: u64,
    /// Granule-unit frames to decode and discard before handing out samples; covers
    /// the pre-skip region on open and the pre-roll plus rounding after seeks.
    discard: u64,
}

/// Decodes Ogg Opus files: symphonia's Ogg reader supplies packets, libopus turns
/// them into interleaved 48 kHz float frames.
pub struct OpusReader {
    file: Arc<dyn RandomAccessFile>,
    captured: CapturedError,
    track_id: u32,
    head: OpusHead,
    gain: f32,
    track_info: TrackInfo,
    channel_order: Vec<ChannelPlacement>,
    total_frames: u64,
    state: Mutex<DecodeState>,
}

fn new_packet_decoder(head: &OpusHead) -> Result<OpusDecoder> {
    let channels = match head.channel_count {
        1 => Channels::Mono,
        2 => Channels::Stereo,
        _ => {
            return resona_core::errors::unsupported_format_error(
                "surround Opus streams require the multistream decoder and are not supported",
            )
        }
    };

    OpusDecoder::new(SampleRate::Hz48000, channels)
        .map_err(|_| resona_core::errors::Error::CorruptedFile("libopus rejected the stream setup"))
}

impl OpusReader {
    /// Opens an Ogg Opus file whose signature has already been verified.
    pub fn new(file: Arc<dyn RandomAccessFile>) -> Result<OpusReader> {
        let head = read_opus_head(&file)?;
        let decoder = new_packet_decoder(&head)?;

        let (stream, captured) = media_source_stream(Arc::clone(&file));
        let format = OggReader::try_new(stream, &FormatOptions::default())
            .map_err(|error| surface_error(error, &captured))?;

        if format.tracks().len() > 1 {
            return resona_core::errors::unsupported_format_error(
                "multiplexed Ogg files with several logical streams are not supported",
            );
        }

        let (track_id, raw_frames, language) = {
            let track = match format.default_track() {
                Some(track) => track,
                None => return corrupted_file_error("Ogg file contains no logical stream"),
            };
            (track.id, track.codec_params.n_frames.unwrap_or(0), track.language.clone())
        };

        let total_frames = raw_frames.saturating_sub(head.pre_skip as u64);
        let channel_order = channel_order_of(&head);

        let track_info = TrackInfo {
            codec_name: "Opus".to_string(),
            channel_count: head.channel_count,
            channel_placements: channel_order
                .iter()
                .fold(ChannelPlacement::empty(), |mask, placement| mask | *placement),
            sample_rate: OPUS_SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: SampleFormat::F32,
            duration: duration_from_frames(total_frames, OPUS_SAMPLE_RATE),
            language,
        };

        let pre_skip = head.pre_skip as u64;
        let gain = head.gain_factor();

        Ok(OpusReader {
            file,
            captured,
            track_id,
            head,
            gain,
            track_info,
            channel_order,
            total_frames,
            state: Mutex::new(DecodeState {
                format,
                decoder,
                pending: PendingBlock::default(),
                cursor: 0,
                discard: pre_skip,
            }),
        })
    }

    /// The metadata of the single stream in the file.
    pub fn track_info(&self) -> &TrackInfo {
        &self.track_info
    }

    fn fill_pending(&self, state: &mut MutexGuard<'_, DecodeState>) -> Result<bool> {
        let channels = self.head.channel_count;

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
                continue;
            }

            let state = &mut **state;
            state.pending.clear();
            state.pending.samples.resize(STAGING_FRAMES * channels, 0.0);

            let frames = match state.decoder.decode_float(
                Some(packet.buf()),
                &mut state.pending.samples,
                false,
            ) {
                Ok(frames) => frames,
                Err(error) => {
                    warn!("libopus failed to decode a packet: {:?}", error);
                    if let Some(root_cause) = self.captured.take() {
                        return Err(root_cause);
                    }
                    return corrupted_file_error("Opus packet could not be decoded");
                }
            };

            if frames == 0 || frames > MAX_PACKET_FRAMES {
                continue;
            }

            state.pending.samples.truncate(frames * channels);
            state.pending.frames = frames;

            if self.gain != 1.0 {
                for sample in &mut state.pending.samples {
                    *sample *= self.gain;
                }
            }

            return Ok(true);
        }
    }

    fn next_frames(&self, state: &mut MutexGuard<'_, DecodeState>) -> Result<Option<usize>> {
        loop {
            if state.pending.available() == 0 && !self.fill_pending(state)? {
                return Ok(None);
            }

            if state.discard > 0 {
                let drop = usize::min(state.discard as usize, state.pending.available());
                state.pending.consumed_frames += drop;
                state.discard -= drop as u64;
                continue;
            }

            return Ok(Some(state.pending.available()));
        }
    }

    fn decode_interleaved_typed<S: Sample>(&self, target: &mut [S], frame_count: usize) -> Result<()> {
        let channels = self.head.channel_count;
        let mut state = self.state.lock().unwrap();
        validate_decode_request(frame_count, target.len(), channels, state.cursor, self.total_frames)?;

        let mut produced = 0usize;
        while produced < frame_count {
            let available = match self.next_frames(&mut state)? {
                Some(available) => available,
                None => return corrupted_file_error("Opus stream ended before its declared length"),
            };

            let take = usize::min(available, frame_count - produced);
            let from = state.pending.consumed_frames * channels;
            conv::f32_to_samples(
                &state.pending.samples[from..from + take * channels],
                &mut target[produced * channels..(produced + take) * channels],
            );

            state.pending.consumed_frames += take;
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
        let channels = self.head.channel_count;
        let mut state = self.state.lock().unwrap();
        validate_separated_request(targets, frame_count, channels, state.cursor, self.total_frames)?;

        let mut gathered: Vec<f32> = Vec::new();
        let mut produced = 0usize;
        while produced < frame_count {
            let available = match self.next_frames(&mut state)? {
                Some(available) => available,
                None => return corrupted_file_error("Opus stream ended before its declared length"),
            };

            let take = usize::min(available, frame_count - produced);
            let from = state.pending.consumed_frames;
            gathered.resize(take, 0.0);
            for (channel, target) in targets.iter_mut().enumerate() {
                for frame in 0..take {
                    gathered[frame] = state.pending.samples[(from + frame) * channels + channel];
                }
                conv::f32_to_samples(&gathered, &mut target[produced..produced + take]);
            }

            state.pending.consumed_frames += take;
            state.cursor += take as u64;
            produced += take;
        }

        Ok(())
    }
}

impl AudioTrackDecoder for OpusReader {
    fn clone_decoder(&self) -> Result<Box<dyn AudioTrackDecoder>> {
        Ok(Box::new(OpusReader::new(Arc::clone(&self.file))?))
    }

    fn channel_count(&self) -> usize {
        self.head.channel_count
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
        true
    }

    fn block_size(&self) -> usize {
        MAX_PACKET_FRAMES
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

        // Granule positions count the pre-skip region; aim the demuxer ahead of the
        // target so the predictive decoder state converges before samples are kept.
        let granule_target = frame_index + self.head.pre_skip as u64;
        let preroll_target = granule_target.saturating_sub(PREROLL_FRAMES);

        let seeked = state
            .format
            .seek(SeekMode::Accurate, SeekTo::TimeStamp { ts: preroll_target, track_id: self.track_id })
            .map_err(|error| surface_error(error, &self.captured))?;

        // libopus keeps prediction state across packets; starting fresh at the new
        // position is what the discarded pre-roll is for.
        state.decoder = new_packet_decoder(&self.head)?;
        state.discard = granule_target.saturating_sub(seeked.actual_ts);
        state.cursor = frame_index;
        Ok(())
    }

    typed_decode_primitives!();
}
