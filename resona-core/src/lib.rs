// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resona core provides the shared traits, data structures, and sample-processing
//! kernels every Resona codec builds on: the random-access file contract, the stream
//! adapter that bridges files into codec libraries, the channel-placement model, the
//! codec loader, and the integer/floating-point conversion kernels.
//!
//! Codec implementations live in the `resona-format-*` and `resona-codec-*` crates;
//! applications usually depend on the `resona` meta crate, which registers all
//! enabled codecs into a ready-made [`codecs::AudioLoader`].

pub mod audio;
pub mod codecs;
pub mod dsp;
pub mod encoder;
pub mod errors;
pub mod io;
pub mod sample;
