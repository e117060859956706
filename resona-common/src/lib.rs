// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Helpers shared by the Resona codec implementation crates: the bridge between the
//! core stream adapter and symphonia's `MediaSource` contract, error surfacing that
//! preserves root causes captured inside the adapter, and Ogg page inspection used
//! by the detection routines of the Ogg-carried codecs.

pub mod ogg;
pub mod symphonia_bridge;
