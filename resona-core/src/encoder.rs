// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `encoder` module defines the configuration contract future encoding pipelines
//! build on. No codec in this workspace implements it yet; the traits pin down the
//! builder surface so codecs can grow encoders without changing callers.

use std::sync::Arc;

use crate::audio::ChannelPlacement;
use crate::errors::Result;
use crate::io::RandomAccessFile;
use crate::sample::{Sample, SampleFormat};

/// Fluent configuration for an audio track encoder.
///
/// The builder is also the capability query surface: callers can ask which sample
/// formats and rates a codec accepts before configuring it. Sample rate and channel
/// layout are mandatory; [`AudioTrackEncoderBuilder::build`] fails with an
/// invalid-argument error while either is missing.
pub trait AudioTrackEncoderBuilder: Send {
    /// Sample formats the codec can ingest.
    fn supported_sample_formats(&self) -> &[SampleFormat];

    /// Sample rates the codec accepts. Empty means unrestricted.
    fn supported_sample_rates(&self) -> &[u32];

    /// Sample rates the codec works best at. Empty means the codec has no preference.
    fn preferred_sample_rates(&self) -> &[u32];

    /// The channel order the codec would pick for the given placement set. Feeding
    /// channels in this order avoids reordering inside the encoder.
    fn preferred_channel_order(&self, channels: ChannelPlacement) -> Vec<ChannelPlacement>;

    /// Whether the codec reproduces its input bit-exactly.
    fn is_lossless(&self) -> bool;

    /// Selects the sample format of the input buffers.
    fn set_sample_format(&mut self, format: SampleFormat) -> &mut dyn AudioTrackEncoderBuilder;

    /// Selects the sample rate. Mandatory.
    fn set_sample_rate(&mut self, samples_per_second: u32) -> &mut dyn AudioTrackEncoderBuilder;

    /// Selects the channels and their order in the input buffers. Mandatory.
    fn set_channels(&mut self, ordered_channels: &[ChannelPlacement]) -> &mut dyn AudioTrackEncoderBuilder;

    /// Requests a target bitrate in kilobits per second. Codecs without rate control
    /// ignore this.
    fn set_target_bitrate(&mut self, kilobits_per_second: f32) -> &mut dyn AudioTrackEncoderBuilder;

    /// Trades encoding time for compression, from 0.0 (fastest) to 1.0 (smallest).
    fn set_compression_effort(&mut self, effort: f32) -> &mut dyn AudioTrackEncoderBuilder;

    /// Sets the title tag written into the container, if it supports one.
    fn set_title(&mut self, title: &str) -> &mut dyn AudioTrackEncoderBuilder;

    /// Creates the encoder, writing into the given file.
    fn build(&self, target: Arc<dyn RandomAccessFile>) -> Result<Box<dyn AudioTrackEncoder>>;
}

/// Consumes sample buffers and writes the encoded track. The mirror image of
/// [`crate::codecs::AudioTrackDecoder`].
pub trait AudioTrackEncoder: Send + Sync {
    /// Number of channels in one frame, as configured on the builder.
    fn channel_count(&self) -> usize;

    /// Encodes `frame_count` frames of interleaved samples.
    fn encode_interleaved_u8(&self, source: &[u8], frame_count: usize) -> Result<()>;
    fn encode_interleaved_i16(&self, source: &[i16], frame_count: usize) -> Result<()>;
    fn encode_interleaved_i32(&self, source: &[i32], frame_count: usize) -> Result<()>;
    fn encode_interleaved_f32(&self, source: &[f32], frame_count: usize) -> Result<()>;
    fn encode_interleaved_f64(&self, source: &[f64], frame_count: usize) -> Result<()>;

    /// Flushes any buffered audio and finalizes the container.
    fn finish(&self) -> Result<()>;
}

impl<'encoder> dyn AudioTrackEncoder + 'encoder {
    /// Encodes `frame_count` frames, dispatching on the compile-time sample type.
    pub fn encode_interleaved<S: Sample>(&self, source: &[S], frame_count: usize) -> Result<()> {
        match S::FORMAT {
            SampleFormat::U8 => self.encode_interleaved_u8(bytemuck::cast_slice(source), frame_count),
            SampleFormat::S16 => self.encode_interleaved_i16(bytemuck::cast_slice(source), frame_count),
            SampleFormat::S32 => self.encode_interleaved_i32(bytemuck::cast_slice(source), frame_count),
            SampleFormat::F32 => self.encode_interleaved_f32(bytemuck::cast_slice(source), frame_count),
            SampleFormat::F64 => self.encode_interleaved_f64(bytemuck::cast_slice(source), frame_count),
            _ => unreachable!("sample types map to exactly one format"),
        }
    }
}
