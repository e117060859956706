// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::errors::Error;
use crate::io::RandomAccessFile;

/// A shared handle to the error slot of a [`StreamAdapter`].
///
/// Codec libraries consume the adapter as an anonymous stream and cannot transport a
/// typed error back to the caller. When one of the adapter's operations fails on the
/// underlying file, the original error is parked here and a generic I/O failure is
/// reported to the library instead. Readers must check the slot after every library
/// call and surface the parked error in preference to whatever the library reported,
/// so the root cause is never masked.
#[derive(Clone, Default)]
pub struct CapturedError {
    slot: Arc<Mutex<Option<Error>>>,
}

impl CapturedError {
    /// Removes and returns the captured error, if any. The slot is cleared.
    pub fn take(&self) -> Option<Error> {
        self.slot.lock().unwrap().take()
    }

    /// Returns the captured error, or `fallback` if the slot is empty.
    pub fn surface(&self, fallback: Error) -> Error {
        self.take().unwrap_or(fallback)
    }

    fn capture(&self, error: Error) {
        let mut slot = self.slot.lock().unwrap();
        // The first failure is the root cause. Later failures are usually follow-up
        // reads the library attempts before giving up.
        if slot.is_none() {
            *slot = Some(error);
        }
    }
}

fn captured_io_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "underlying file failed, error captured by adapter")
}

/// Presents a shared [`RandomAccessFile`] as a sequential stream.
///
/// Codec libraries assume stream semantics: a single cursor, relative reads, seeks in
/// three origins, and (for WavPack) an `ungetc`-style pushback of bytes onto the front
/// of the stream. This adapter emulates all of that on top of positional reads.
///
/// One adapter belongs to exactly one decoding session and is dropped with it. The
/// file itself is shared and may be handed to any number of adapters concurrently.
pub struct StreamAdapter {
    file: Arc<dyn RandomAccessFile>,
    position: u64,
    pushback: SmallVec<[u8; 16]>,
    error: CapturedError,
}

impl StreamAdapter {
    pub fn new(file: Arc<dyn RandomAccessFile>) -> StreamAdapter {
        StreamAdapter {
            file,
            position: 0,
            pushback: SmallVec::new(),
            error: CapturedError::default(),
        }
    }

    /// Returns a handle to the captured-error slot that stays valid after the adapter
    /// has been moved into a codec library's stream wrapper.
    pub fn captured_error(&self) -> CapturedError {
        self.error.clone()
    }

    /// The file this adapter reads from.
    pub fn file(&self) -> &Arc<dyn RandomAccessFile> {
        &self.file
    }

    /// Total length of the underlying file in bytes.
    pub fn byte_len(&self) -> u64 {
        self.file.len()
    }

    /// Current emulated stream position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Pushes one byte back onto the stream so that the next read returns it as if it
    /// were file content. Repeated pushbacks stack in last-in-first-out order, exactly
    /// like repeated `ungetc` calls. Any seek discards pushed-back bytes.
    pub fn push_back(&mut self, byte: u8) {
        self.pushback.insert(0, byte);
    }
}

impl io::Read for StreamAdapter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let from_pushback = usize::min(buf.len(), self.pushback.len());
        // Copy out of the pushback buffer without draining it. If the file portion of
        // the request fails the whole read must appear to never have happened.
        buf[..from_pushback].copy_from_slice(&self.pushback[..from_pushback]);

        let from_file = {
            let length = self.file.len();
            let wanted = (buf.len() - from_pushback) as u64;
            let available = length.saturating_sub(self.position);
            u64::min(wanted, available) as usize
        };

        if from_file > 0 {
            let target = &mut buf[from_pushback..from_pushback + from_file];
            if let Err(error) = self.file.read_at(self.position, target) {
                self.error.capture(error);
                return Err(captured_io_error());
            }
            self.position += from_file as u64;
        }

        self.pushback.drain(..from_pushback);
        Ok(from_pushback + from_file)
    }
}

impl io::Seek for StreamAdapter {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let length = self.file.len();
        let target = match pos {
            io::SeekFrom::Start(offset) => Some(offset),
            io::SeekFrom::Current(delta) => {
                if delta < 0 {
                    self.position.checked_sub(delta.unsigned_abs())
                } else {
                    self.position.checked_add(delta as u64)
                }
            }
            io::SeekFrom::End(delta) => {
                if delta < 0 {
                    length.checked_sub(delta.unsigned_abs())
                } else {
                    length.checked_add(delta as u64)
                }
            }
        };

        match target {
            Some(target) if target <= length => {
                // Seeking discards the effects of any pushback, matching ungetc().
                self.pushback.clear();
                self.position = target;
                Ok(target)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek target is outside the file",
            )),
        }
    }
}
