// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codecs` module defines the uniform interface every audio codec plugs into the
//! loader with, and the track decoder interface with its sample-type generic decode
//! front door.

use std::sync::Arc;

use crate::audio::{ChannelPlacement, ContainerInfo};
use crate::errors::Result;
use crate::io::RandomAccessFile;
use crate::sample::{Sample, SampleFormat};

mod loader;

pub use loader::AudioLoader;

/// A codec that can identify and decode one family of audio files.
///
/// Implementations must be cheap to probe: `try_read_info` is called for arbitrary
/// files during format dispatch and should reject foreign files after reading only
/// their header bytes.
pub trait AudioCodec: Send + Sync {
    /// Human-readable name of the codec.
    fn name(&self) -> &str;

    /// File extensions (without dot, lowercase) commonly used by this codec's files.
    fn file_extensions(&self) -> &[&str];

    /// Inspects the file and, if it is of this codec's format, describes its contents.
    ///
    /// Returns `Ok(None)` if the file is some other format (this is not an error).
    /// Returns a corrupted-file error if the file carries this codec's signature but
    /// violates the format's structure.
    fn try_read_info(
        &self,
        file: &Arc<dyn RandomAccessFile>,
        extension_hint: Option<&str>,
    ) -> Result<Option<ContainerInfo>>;

    /// Opens a decoder for one track of the file, if it is of this codec's format.
    ///
    /// Returns `Ok(None)` if the file is some other format so the loader can continue
    /// down its codec chain.
    fn try_open_decoder(
        &self,
        file: Arc<dyn RandomAccessFile>,
        extension_hint: Option<&str>,
        track_index: usize,
    ) -> Result<Option<Box<dyn AudioTrackDecoder>>>;
}

/// Decodes the audio of one track.
///
/// A decoder keeps a cursor in frames (one sample per channel). Every decode call
/// produces the requested number of whole frames starting at the cursor, then
/// advances it. Decoders serialize concurrent calls internally; for parallel
/// decoding, create one decoder per thread with [`AudioTrackDecoder::clone_decoder`]
/// (the clones share the file but nothing else).
///
/// The typed `decode_*` methods are the per-sample-type primitives. Callers usually
/// go through the generic [`decode_interleaved`](dyn AudioTrackDecoder::decode_interleaved)
/// and [`decode_separated`](dyn AudioTrackDecoder::decode_separated) front doors,
/// which dispatch on the compile-time sample type.
pub trait AudioTrackDecoder: Send + Sync {
    /// Creates an independent decoder over the same file, positioned at frame zero.
    fn clone_decoder(&self) -> Result<Box<dyn AudioTrackDecoder>>;

    /// Number of channels in one frame.
    fn channel_count(&self) -> usize;

    /// The placements of the channels in the order their samples appear.
    fn channel_order(&self) -> &[ChannelPlacement];

    /// Total number of frames in the track.
    fn frame_count(&self) -> u64;

    /// The in-memory sample format the codec decodes to without conversion.
    fn native_sample_format(&self) -> SampleFormat;

    /// Whether the codec naturally produces interleaved (rather than separated)
    /// channels. Requesting the native topology avoids one copy per block.
    fn is_natively_interleaved(&self) -> bool;

    /// The codec's natural decoding unit in frames. Reads aligned to this size are
    /// the most efficient, though any read size is accepted.
    fn block_size(&self) -> usize;

    /// Current cursor position in frames.
    fn frame_position(&self) -> u64;

    /// Moves the cursor to the given frame index.
    fn seek_to_frame(&self, frame_index: u64) -> Result<()>;

    fn decode_interleaved_u8(&self, target: &mut [u8], frame_count: usize) -> Result<()>;
    fn decode_interleaved_i16(&self, target: &mut [i16], frame_count: usize) -> Result<()>;
    fn decode_interleaved_i32(&self, target: &mut [i32], frame_count: usize) -> Result<()>;
    fn decode_interleaved_f32(&self, target: &mut [f32], frame_count: usize) -> Result<()>;
    fn decode_interleaved_f64(&self, target: &mut [f64], frame_count: usize) -> Result<()>;

    fn decode_separated_u8(&self, targets: &mut [&mut [u8]], frame_count: usize) -> Result<()>;
    fn decode_separated_i16(&self, targets: &mut [&mut [i16]], frame_count: usize) -> Result<()>;
    fn decode_separated_i32(&self, targets: &mut [&mut [i32]], frame_count: usize) -> Result<()>;
    fn decode_separated_f32(&self, targets: &mut [&mut [f32]], frame_count: usize) -> Result<()>;
    fn decode_separated_f64(&self, targets: &mut [&mut [f64]], frame_count: usize) -> Result<()>;
}

impl<'decoder> dyn AudioTrackDecoder + 'decoder {
    /// Decodes `frame_count` frames in frame-major (interleaved) order into `target`,
    /// which must hold at least `frame_count * channel_count` samples.
    ///
    /// The sample type is selected at compile time from the closed [`Sample`] set; the
    /// codec converts from its native format in blocks where necessary.
    pub fn decode_interleaved<S: Sample>(&self, target: &mut [S], frame_count: usize) -> Result<()> {
        match S::FORMAT {
            SampleFormat::U8 => self.decode_interleaved_u8(bytemuck::cast_slice_mut(target), frame_count),
            SampleFormat::S16 => self.decode_interleaved_i16(bytemuck::cast_slice_mut(target), frame_count),
            SampleFormat::S32 => self.decode_interleaved_i32(bytemuck::cast_slice_mut(target), frame_count),
            SampleFormat::F32 => self.decode_interleaved_f32(bytemuck::cast_slice_mut(target), frame_count),
            SampleFormat::F64 => self.decode_interleaved_f64(bytemuck::cast_slice_mut(target), frame_count),
            _ => unreachable!("sample types map to exactly one format"),
        }
    }

    /// Decodes `frame_count` frames into one buffer per channel. Each buffer must
    /// hold at least `frame_count` samples.
    pub fn decode_separated<S: Sample>(
        &self,
        targets: &mut [&mut [S]],
        frame_count: usize,
    ) -> Result<()> {
        match S::FORMAT {
            SampleFormat::U8 => {
                let mut casted: Vec<&mut [u8]> =
                    targets.iter_mut().map(|t| bytemuck::cast_slice_mut::<S, u8>(t)).collect();
                self.decode_separated_u8(&mut casted, frame_count)
            }
            SampleFormat::S16 => {
                let mut casted: Vec<&mut [i16]> =
                    targets.iter_mut().map(|t| bytemuck::cast_slice_mut::<S, i16>(t)).collect();
                self.decode_separated_i16(&mut casted, frame_count)
            }
            SampleFormat::S32 => {
                let mut casted: Vec<&mut [i32]> =
                    targets.iter_mut().map(|t| bytemuck::cast_slice_mut::<S, i32>(t)).collect();
                self.decode_separated_i32(&mut casted, frame_count)
            }
            SampleFormat::F32 => {
                let mut casted: Vec<&mut [f32]> =
                    targets.iter_mut().map(|t| bytemuck::cast_slice_mut::<S, f32>(t)).collect();
                self.decode_separated_f32(&mut casted, frame_count)
            }
            SampleFormat::F64 => {
                let mut casted: Vec<&mut [f64]> =
                    targets.iter_mut().map(|t| bytemuck::cast_slice_mut::<S, f64>(t)).collect();
                self.decode_separated_f64(&mut casted, frame_count)
            }
            _ => unreachable!("sample types map to exactly one format"),
        }
    }
}

/// Implements the ten typed decode primitives of [`AudioTrackDecoder`] by delegating
/// to two inherent generic methods on the reader:
///
/// ```ignore
/// fn decode_interleaved_typed<S: Sample>(&self, target: &mut [S], frame_count: usize) -> Result<()>;
/// fn decode_separated_typed<S: Sample>(&self, targets: &mut [&mut [S]], frame_count: usize) -> Result<()>;
/// ```
#[macro_export]
macro_rules! typed_decode_primitives {
    () => {
        fn decode_interleaved_u8(&self, target: &mut [u8], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_interleaved_typed::<u8>(target, frame_count)
        }

        fn decode_interleaved_i16(&self, target: &mut [i16], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_interleaved_typed::<i16>(target, frame_count)
        }

        fn decode_interleaved_i32(&self, target: &mut [i32], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_interleaved_typed::<i32>(target, frame_count)
        }

        fn decode_interleaved_f32(&self, target: &mut [f32], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_interleaved_typed::<f32>(target, frame_count)
        }

        fn decode_interleaved_f64(&self, target: &mut [f64], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_interleaved_typed::<f64>(target, frame_count)
        }

        fn decode_separated_u8(&self, targets: &mut [&mut [u8]], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_separated_typed::<u8>(targets, frame_count)
        }

        fn decode_separated_i16(&self, targets: &mut [&mut [i16]], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_separated_typed::<i16>(targets, frame_count)
        }

        fn decode_separated_i32(&self, targets: &mut [&mut [i32]], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_separated_typed::<i32>(targets, frame_count)
        }

        fn decode_separated_f32(&self, targets: &mut [&mut [f32]], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_separated_typed::<f32>(targets, frame_count)
        }

        fn decode_separated_f64(&self, targets: &mut [&mut [f64]], frame_count: usize) -> $crate::errors::Result<()> {
            self.decode_separated_typed::<f64>(targets, frame_count)
        }
    };
}

/// Checks the buffer and cursor preconditions shared by every decode implementation.
///
/// Returns the number of frames actually requested after validation.
pub fn validate_decode_request(
    frame_count: usize,
    sample_capacity: usize,
    channel_count: usize,
    position: u64,
    total_frames: u64,
) -> Result<usize> {
    if sample_capacity < frame_count * channel_count {
        return crate::errors::invalid_argument_error(format!(
            "target buffer holds {} samples, but {} frames of {} channels were requested",
            sample_capacity, frame_count, channel_count
        ));
    }
    if position + frame_count as u64 > total_frames {
        return crate::errors::invalid_argument_error(format!(
            "decoding {} frames at frame {} would read past the end of the track ({} frames)",
            frame_count, position, total_frames
        ));
    }
    Ok(frame_count)
}

/// Checks the per-channel buffer preconditions of a separated decode request.
pub fn validate_separated_request<S>(
    targets: &[&mut [S]],
    frame_count: usize,
    channel_count: usize,
    position: u64,
    total_frames: u64,
) -> Result<usize> {
    if targets.len() != channel_count {
        return crate::errors::invalid_argument_error(format!(
            "{} channel buffers were provided for a track with {} channels",
            targets.len(),
            channel_count
        ));
    }
    for target in targets.iter() {
        if target.len() < frame_count {
            return crate::errors::invalid_argument_error(format!(
                "a channel buffer holds {} samples, but {} frames were requested",
                target.len(),
                frame_count
            ));
        }
    }
    if position + frame_count as u64 > total_frames {
        return crate::errors::invalid_argument_error(format!(
            "decoding {} frames at frame {} would read past the end of the track ({} frames)",
            frame_count, position, total_frames
        ));
    }
    Ok(frame_count)
}
