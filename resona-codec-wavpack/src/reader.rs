// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use resona_core::audio::{
    duration_from_frames, layout_from_mask, ChannelPlacement, TrackInfo,
};
use resona_core::codecs::{
    validate_decode_request, validate_separated_request, AudioTrackDecoder,
};
use resona_core::dsp::conv;
use resona_core::errors::{
    corrupted_file_error, invalid_argument_error, unsupported_format_error, Error, Result,
};
use resona_core::io::{CapturedError, RandomAccessFile, StreamAdapter};
use resona_core::sample::{Sample, SampleFormat};
use resona_core::typed_decode_primitives;

use crate::block::{
    parse_channel_info, parse_custom_sample_rate, BlockHeader, MetadataId, SubBlockIter,
    BLOCK_HEADER_SIZE,
};
use crate::decode::decode_block;

/// One row of blocks covering all channels of a run of frames. Stereo and mono
/// streams have one block per row; multichannel streams chain several.
#[derive(Clone, Copy, Debug)]
struct BlockRow {
    /// Absolute file offset of the row's first block header.
    offset: u64,
    /// Frame index of the row's first frame.
    start_frame: u64,
    /// Frames stored in the row.
    frames: u32,
}

/// Decoded frames of one row, interleaved over all channels.
#[derive(Default)]
struct PendingBlock {
    samples: Vec<i32>,
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
    adapter: StreamAdapter,
    /// Index into `rows` of the next row to decode.
    next_row: usize,
    pending: PendingBlock,
    cursor: u64,
    discard: u64,
}

/// Decodes WavPack files with the crate's own lossless block decoder.
///
/// The file is first scanned block by block to build a seek index of block rows;
/// decoding then loads one row at a time. The scanner consumes the file through the
/// stream adapter and resynchronizes on the "wvpk" marker using the adapter's
/// pushback primitive when a candidate match turns out to be payload bytes.
pub struct WavPackReader {
    file: Arc<dyn RandomAccessFile>,
    captured: CapturedError,
    rows: Vec<BlockRow>,
    track_info: TrackInfo,
    channel_order: Vec<ChannelPlacement>,
    total_frames: u64,
    /// Valid bits of the staged samples (storage bits; low bits may be zero pads).
    storage_bits: u32,
    block_frames: usize,
    is_float: bool,
    is_hybrid: bool,
    state: Mutex<DecodeState>,
}

/// Reads exactly `buffer.len()` bytes from the adapter, surfacing a captured file
/// error over the generic stream failure and mapping a bare end-of-file to a
/// corrupted-file error (the scanner only reads ranges the block headers declare).
fn read_exact_or_corrupt(
    adapter: &mut StreamAdapter,
    captured: &CapturedError,
    buffer: &mut [u8],
) -> Result<()> {
    adapter.read_exact(buffer).map_err(|io| {
        captured.surface(if io.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::CorruptedFile("WavPack file ends in the middle of a block")
        } else {
            Error::FileAccess(io)
        })
    })
}

/// Advances the adapter to the next "wvpk" marker and reads the 32-byte block
/// header starting there. Returns `None` when the rest of the file holds no
/// further marker.
fn read_next_header(
    adapter: &mut StreamAdapter,
    captured: &CapturedError,
) -> Result<Option<[u8; BLOCK_HEADER_SIZE]>> {
    loop {
        let mut first = [0u8; 1];
        match adapter.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(io) => return Err(captured.surface(Error::FileAccess(io))),
        }

        if first[0] != b'w' {
            continue;
        }

        let mut rest = [0u8; 3];
        let got = match adapter.read(&mut rest) {
            Ok(got) => got,
            Err(io) => return Err(captured.surface(Error::FileAccess(io))),
        };
        if got < 3 {
            return Ok(None);
        }

        if &rest != b"vpk" {
            // Not a block header: return the lookahead to the stream so markers
            // overlapping these bytes are still found.
            for byte in rest.iter().rev() {
                adapter.push_back(*byte);
            }
            continue;
        }

        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header[0..4].copy_from_slice(b"wvpk");
        read_exact_or_corrupt(adapter, captured, &mut header[4..])?;
        return Ok(Some(header));
    }
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

impl WavPackReader {
    /// Opens a WavPack file whose signature has already been verified: scans the
    /// block index and derives the track description from the first block row.
    pub fn new(file: Arc<dyn RandomAccessFile>) -> Result<WavPackReader> {
        let mut adapter = StreamAdapter::new(Arc::clone(&file));
        let captured = adapter.captured_error();

        let mut rows: Vec<BlockRow> = Vec::new();
        let mut declared_total: Option<u64> = None;
        let mut first_header: Option<BlockHeader> = None;
        let mut first_row_channels = 0usize;
        let mut channel_info: Option<(usize, ChannelPlacement)> = None;
        let mut custom_rate: Option<u32> = None;
        let mut in_first_row = true;

        loop {
            let header_bytes = match read_next_header(&mut adapter, &captured)? {
                Some(bytes) => bytes,
                None => break,
            };
            let offset = adapter.position() - BLOCK_HEADER_SIZE as u64;

            let header = match BlockHeader::parse(&header_bytes) {
                Ok(header) => header,
                Err(_) => {
                    debug!("skipping implausible block candidate at offset {}", offset);
                    continue;
                }
            };

            if first_header.is_none() {
                first_header = Some(header);
                if header.block_index() == 0 {
                    declared_total = header.total_samples();
                }
            }

            // The sub-blocks of the first row carry the stream-global channel
            // layout and any custom sample rate.
            if in_first_row {
                let body_length = header.block_size as usize + 8 - BLOCK_HEADER_SIZE;
                let mut body = vec![0u8; body_length];
                read_exact_or_corrupt(&mut adapter, &captured, &mut body)?;

                for sub_block in SubBlockIter::new(&body) {
                    let sub_block = sub_block?;
                    match sub_block.id {
                        MetadataId::ChannelInfo => {
                            channel_info = Some(parse_channel_info(sub_block.data)?);
                        }
                        MetadataId::SampleRate => {
                            custom_rate = Some(parse_custom_sample_rate(sub_block.data)?);
                        }
                        _ => {}
                    }
                }

                if header.block_samples > 0 {
                    first_row_channels += if header.is_false_stereo() || !header.is_mono_flagged() {
                        2
                    } else {
                        1
                    };
                }
                if header.is_final_block() {
                    in_first_row = false;
                }
            } else {
                // Skip the block body; only the headers feed the index.
                let body_length = header.block_size as u64 + 8 - BLOCK_HEADER_SIZE as u64;
                adapter
                    .seek(SeekFrom::Current(body_length as i64))
                    .map_err(|_| Error::CorruptedFile("WavPack block overruns the file"))?;
            }

            if header.block_samples > 0 && header.is_initial_block() {
                rows.push(BlockRow {
                    offset,
                    start_frame: header.block_index(),
                    frames: header.block_samples,
                });
            }
        }

        let first_header = match first_header {
            Some(header) => header,
            None => return corrupted_file_error("WavPack file contains no blocks"),
        };
        if rows.is_empty() {
            return corrupted_file_error("WavPack file contains no audio blocks");
        }

        // A file cut out of a longer stream starts at a non-zero block index; the
        // decoder's frame numbering is relative to what is actually present.
        let base_frame = rows[0].start_frame;
        if base_frame > 0 {
            for row in &mut rows {
                row.start_frame -= base_frame;
            }
        }

        if first_header.is_dsd() {
            return unsupported_format_error("WavPack DSD files are not supported");
        }

        let (channel_count, channel_mask) = match channel_info {
            Some(info) => info,
            None => match first_row_channels {
                1 => (1, ChannelPlacement::FRONT_CENTER),
                2 => (2, ChannelPlacement::FRONT_LEFT | ChannelPlacement::FRONT_RIGHT),
                other => (other, ChannelPlacement::empty()),
            },
        };
        if channel_count == 0 {
            return corrupted_file_error("WavPack file declares zero channels");
        }

        let sample_rate = match first_header.sample_rate().or(custom_rate) {
            Some(rate) if rate > 0 => rate,
            _ => return corrupted_file_error("WavPack file declares no sample rate"),
        };

        let total_frames = declared_total.unwrap_or_else(|| {
            let last = rows.last().unwrap();
            last.start_frame + last.frames as u64
        });

        let storage_bits = first_header.bytes_per_sample() * 8;
        let effective_bits = storage_bits.saturating_sub(first_header.output_shift()).max(1);
        let sample_format = if first_header.is_float() {
            SampleFormat::F32
        } else {
            integer_format_from_bits(effective_bits)
        };

        let track_info = TrackInfo {
            codec_name: "WavPack".to_string(),
            channel_count,
            channel_placements: channel_mask,
            sample_rate,
            bits_per_sample: if first_header.is_float() { 32 } else { effective_bits },
            sample_format,
            duration: duration_from_frames(total_frames, sample_rate),
            language: None,
        };

        let channel_order = layout_from_mask(channel_count, channel_mask);
        let block_frames = rows.first().map_or(0, |row| row.frames as usize);

        Ok(WavPackReader {
            file,
            captured,
            rows,
            track_info,
            channel_order,
            total_frames,
            storage_bits,
            block_frames,
            is_float: first_header.is_float(),
            is_hybrid: first_header.is_hybrid(),
            state: Mutex::new(DecodeState {
                adapter,
                next_row: 0,
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

    fn ensure_decodable(&self) -> Result<()> {
        if self.is_float {
            return unsupported_format_error(
                "floating-point WavPack decoding is not supported (metadata only)",
            );
        }
        if self.is_hybrid {
            return unsupported_format_error(
                "hybrid (lossy) WavPack decoding is not supported (metadata only)",
            );
        }
        Ok(())
    }

    /// Decodes the next block row into the staging buffer.
    fn fill_pending(&self, state: &mut MutexGuard<'_, DecodeState>) -> Result<bool> {
        let row = match self.rows.get(state.next_row) {
            Some(row) => *row,
            None => return Ok(false),
        };

        let state = &mut **state;
        state
            .adapter
            .seek(SeekFrom::Start(row.offset))
            .map_err(|io| self.captured.surface(Error::FileAccess(io)))?;

        let channel_count = self.track_info.channel_count;
        let frames = row.frames as usize;
        state.pending.clear();
        state.pending.samples.resize(frames * channel_count, 0);

        let mut channel_at = 0usize;
        loop {
            let mut header_bytes = [0u8; BLOCK_HEADER_SIZE];
            read_exact_or_corrupt(&mut state.adapter, &self.captured, &mut header_bytes)?;
            let header = BlockHeader::parse(&header_bytes)?;

            if header.is_float() || header.is_hybrid() || header.is_dsd() {
                return unsupported_format_error(
                    "WavPack block uses a mode this decoder does not support",
                );
            }

            let body_length = header.block_size as usize + 8 - BLOCK_HEADER_SIZE;
            let mut body = vec![0u8; body_length];
            read_exact_or_corrupt(&mut state.adapter, &self.captured, &mut body)?;

            if header.block_samples == 0 {
                continue; // metadata-only block inside the stream
            }
            if header.block_samples as usize != frames {
                return corrupted_file_error("WavPack blocks of one row disagree on their length");
            }

            let decoded = decode_block(&header, &body)?;
            if channel_at + decoded.channels > channel_count {
                return corrupted_file_error("WavPack row stores more channels than declared");
            }

            // Scatter the block's channels into the row staging.
            for frame in 0..frames {
                for channel in 0..decoded.channels {
                    state.pending.samples[frame * channel_count + channel_at + channel] =
                        decoded.samples[frame * decoded.channels + channel];
                }
            }
            channel_at += decoded.channels;

            if header.is_final_block() {
                break;
            }
        }

        if channel_at != channel_count {
            warn!("WavPack row covers {} of {} channels", channel_at, channel_count);
        }

        state.pending.frames = frames;
        state.next_row += 1;
        Ok(true)
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
        self.ensure_decodable()?;

        let channels = self.track_info.channel_count;
        let mut state = self.state.lock().unwrap();
        validate_decode_request(frame_count, target.len(), channels, state.cursor, self.total_frames)?;

        let mut produced = 0usize;
        while produced < frame_count {
            let available = match self.next_frames(&mut state)? {
                Some(available) => available,
                None => {
                    return corrupted_file_error("WavPack stream ended before its declared length")
                }
            };

            let take = usize::min(available, frame_count - produced);
            let from = state.pending.consumed_frames * channels;
            conv::i32_to_samples(
                &state.pending.samples[from..from + take * channels],
                self.storage_bits,
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
        self.ensure_decodable()?;

        let channels = self.track_info.channel_count;
        let mut state = self.state.lock().unwrap();
        validate_separated_request(targets, frame_count, channels, state.cursor, self.total_frames)?;

        let mut gathered: Vec<i32> = Vec::new();
        let mut produced = 0usize;
        while produced < frame_count {
            let available = match self.next_frames(&mut state)? {
                Some(available) => available,
                None => {
                    return corrupted_file_error("WavPack stream ended before its declared length")
                }
            };

            let take = usize::min(available, frame_count - produced);
            let from = state.pending.consumed_frames;
            gathered.resize(take, 0);
            for (channel, target) in targets.iter_mut().enumerate() {
                for frame in 0..take {
                    gathered[frame] = state.pending.samples[(from + frame) * channels + channel];
                }
                conv::i32_to_samples(
                    &gathered,
                    self.storage_bits,
                    &mut target[produced..produced + take],
                );
            }

            state.pending.consumed_frames += take;
            state.cursor += take as u64;
            produced += take;
        }

        Ok(())
    }
}

impl AudioTrackDecoder for WavPackReader {
    fn clone_decoder(&self) -> Result<Box<dyn AudioTrackDecoder>> {
        Ok(Box::new(WavPackReader::new(Arc::clone(&self.file))?))
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
        true
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

        // Seeking is cheapest at block boundaries: find the row containing the
        // frame and discard the leading remainder after decoding it.
        let row_index = match self
            .rows
            .binary_search_by(|row| row.start_frame.cmp(&frame_index))
        {
            Ok(index) => index,
            Err(0) => 0,
            Err(insert_at) => insert_at - 1,
        };

        state.next_row = row_index;
        state.discard = frame_index - self.rows[row_index].start_frame;
        state.cursor = frame_index;
        Ok(())
    }

    typed_decode_primitives!();
}
