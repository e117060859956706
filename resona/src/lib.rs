// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resona is a pluggable audio file introspection and decoding library.
//!
//! A [`AudioLoader`](core::codecs::AudioLoader) routes files to the first registered
//! codec that recognizes them, using the caller's file-extension hint and the most
//! recently successful codecs to try the likely candidates first. Codecs answer two
//! questions: "what is in this file?" ([`try_read_info`](core::codecs::AudioLoader::try_read_info))
//! and "give me its samples" ([`open_decoder`](core::codecs::AudioLoader::open_decoder)).
//!
//! Decoders expose the channel layout, the total frame count, frame-accurate
//! seeking, and decoding into any of the five supported in-memory sample types
//! (`u8`, `i16`, `i32`, `f32`, `f64`), interleaved or with one buffer per channel.
//! Sample-format conversion happens inside the codec at block granularity.
//!
//! # Example
//!
//! ```no_run
//! use resona::core::codecs::AudioTrackDecoder;
//!
//! let loader = resona::default::loader();
//!
//! // Describe the file without committing to a codec.
//! if let Some(info) = loader.try_read_info_from_path("music.flac")? {
//!     let track = info.default_track().unwrap();
//!     println!("{}: {} Hz, {} channels", track.codec_name, track.sample_rate, track.channel_count);
//! }
//!
//! // Decode the first seconds as interleaved floats.
//! let decoder = loader.open_decoder_from_path("music.flac", 0)?;
//! let mut samples = vec![0.0f32; 48000 * decoder.channel_count()];
//! decoder.decode_interleaved(&mut samples, 48000)?;
//! # resona::core::errors::Result::Ok(())
//! ```
//!
//! Each enabled codec lives in its own crate; the `resona` crate merely registers
//! them. Applications with special needs can build their own loader and register
//! any mix of bundled and custom codecs.

pub use resona_core as core;

#[cfg(feature = "flac")]
pub use resona_codec_flac as flac;
#[cfg(feature = "opus")]
pub use resona_codec_opus as opus;
#[cfg(feature = "vorbis")]
pub use resona_codec_vorbis as vorbis;
#[cfg(feature = "wavpack")]
pub use resona_codec_wavpack as wavpack;
#[cfg(feature = "wave")]
pub use resona_format_wave as wave;

pub mod default {
    //! A loader with all enabled codecs registered in a fixed order.

    use lazy_static::lazy_static;

    use crate::core::codecs::AudioLoader;

    lazy_static! {
        static ref LOADER: AudioLoader = make_loader();
    }

    /// Builds a fresh loader holding all codecs enabled by feature flags.
    ///
    /// Registration order decides which codec owns a contested file extension and
    /// the fallback probe order, so it is fixed: Waveform, FLAC, Vorbis, Opus,
    /// WavPack.
    pub fn make_loader() -> AudioLoader {
        let mut loader = AudioLoader::new();

        #[cfg(feature = "wave")]
        loader.register(Box::new(crate::wave::WaveformCodec::new()));

        #[cfg(feature = "flac")]
        loader.register(Box::new(crate::flac::FlacCodec::new()));

        #[cfg(feature = "vorbis")]
        loader.register(Box::new(crate::vorbis::VorbisCodec::new()));

        #[cfg(feature = "opus")]
        loader.register(Box::new(crate::opus::OpusCodec::new()));

        #[cfg(feature = "wavpack")]
        loader.register(Box::new(crate::wavpack::WavPackCodec::new()));

        loader
    }

    /// The process-wide default loader.
    ///
    /// Shared across threads; probing and decoding through it concurrently is fine
    /// because dispatch only mutates its most-recently-used hints, which are
    /// atomics.
    pub fn loader() -> &'static AudioLoader {
        &LOADER
    }
}
