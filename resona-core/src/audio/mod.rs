// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module defines the channel placement model and the track/container
//! descriptions returned by file introspection.

use std::time::Duration;

use crate::sample::SampleFormat;

pub mod channels;

pub use channels::{layout_from_mask, vorbis_layout, ChannelPlacement};

/// Description of a single audio track inside a container.
#[derive(Clone, Debug)]
pub struct TrackInfo {
    /// Name of the codec the track is encoded with.
    pub codec_name: String,
    /// Number of audio channels.
    pub channel_count: usize,
    /// Placements of the channels as an unordered mask. The ordered layout is derived
    /// per codec family (see [`channels::layout_from_mask`] and
    /// [`channels::vorbis_layout`]).
    pub channel_placements: ChannelPlacement,
    /// Samples per second, per channel.
    pub sample_rate: u32,
    /// Effective bits per sample. This counts the bits that carry signal, which for
    /// some containers is fewer than the bits a sample occupies on disk.
    pub bits_per_sample: u32,
    /// In-memory format the track decodes to most naturally.
    pub sample_format: SampleFormat,
    /// Playable length of the track.
    pub duration: Duration,
    /// ISO 639 language code, if the container declares one.
    pub language: Option<String>,
}

impl TrackInfo {
    /// Total number of frames, derived from the duration and sample rate.
    pub fn frame_count(&self) -> u64 {
        self.duration.as_micros() as u64 * self.sample_rate as u64 / 1_000_000
    }
}

impl Default for TrackInfo {
    fn default() -> TrackInfo {
        TrackInfo {
            codec_name: String::new(),
            channel_count: 0,
            channel_placements: ChannelPlacement::empty(),
            sample_rate: 0,
            bits_per_sample: 0,
            sample_format: SampleFormat::Unknown,
            duration: Duration::ZERO,
            language: None,
        }
    }
}

/// Description of an audio container and the tracks inside it.
#[derive(Clone, Debug, Default)]
pub struct ContainerInfo {
    /// Index into `tracks` of the track a player should pick by default.
    pub default_track_index: usize,
    /// All audio tracks in the container, in container order.
    pub tracks: Vec<TrackInfo>,
}

impl ContainerInfo {
    /// Builds the container description of a single-track file.
    pub fn single_track(track: TrackInfo) -> ContainerInfo {
        ContainerInfo { default_track_index: 0, tracks: vec![track] }
    }

    /// The track at the default track index.
    pub fn default_track(&self) -> Option<&TrackInfo> {
        self.tracks.get(self.default_track_index)
    }
}

/// Computes a track duration from a frame count and sample rate.
pub fn duration_from_frames(frame_count: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(frame_count * 1_000_000 / sample_rate as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_frames_over_rate() {
        assert_eq!(duration_from_frames(44100, 44100), Duration::from_secs(1));
        assert_eq!(duration_from_frames(1, 44100), Duration::from_micros(22));
        assert_eq!(duration_from_frames(48000, 0), Duration::ZERO);
    }

    #[test]
    fn frame_count_inverts_duration_within_one_frame() {
        for frames in [0u64, 1, 441, 44100, 96001] {
            let info = TrackInfo {
                sample_rate: 44100,
                duration: duration_from_frames(frames, 44100),
                ..TrackInfo::default()
            };
            assert!(info.frame_count().abs_diff(frames) <= 1);
        }
    }
}
