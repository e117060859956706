// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dsp` module implements the numeric kernels used to move samples between
//! integer and floating-point representations: rounding/quantization, normalization
//! and reconstruction, and bit-pattern extension.
//!
//! Every kernel family exposes a single-value and a 4-wide batched entry point. The
//! batched entry points use SIMD when the `opt-simd` feature is enabled and fall back
//! to the scalar kernels otherwise. Both paths produce bit-identical results for any
//! input; the scalar kernels are the reference semantics.
//!
//! Rounding is to the nearest integer with ties away from zero, computed as
//! `trunc(x + copysign(0.5, x))` in both paths.

pub mod conv;
pub mod decibel;
pub mod extension;
pub mod normalization;
pub mod rounding;
