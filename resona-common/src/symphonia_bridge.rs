// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridges the core [`StreamAdapter`] into symphonia's stream model and translates
//! symphonia errors back into the Resona taxonomy without ever masking a file error
//! captured inside the adapter.

use std::error::Error as StdError;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use symphonia_core::errors::Error as SymphoniaError;
use symphonia_core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};

use resona_core::audio::ChannelPlacement;
use resona_core::errors::Error;
use resona_core::io::{CapturedError, RandomAccessFile, StreamAdapter};

/// A [`StreamAdapter`] wrapped up as a symphonia `MediaSource`.
///
/// The wrapped adapter already provides `Read` and `Seek` with the emulated cursor;
/// this newtype only adds the metadata symphonia asks its sources for. A random
/// access file is always seekable and always knows its length.
pub struct AdapterSource {
    inner: StreamAdapter,
}

impl AdapterSource {
    pub fn new(inner: StreamAdapter) -> AdapterSource {
        AdapterSource { inner }
    }
}

impl Read for AdapterSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for AdapterSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl MediaSource for AdapterSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.inner.byte_len())
    }
}

/// Opens a symphonia media source stream over a shared file, returning the stream
/// and a handle to the adapter's captured-error slot.
pub fn media_source_stream(file: Arc<dyn RandomAccessFile>) -> (MediaSourceStream, CapturedError) {
    let adapter = StreamAdapter::new(file);
    let captured = adapter.captured_error();
    let stream = MediaSourceStream::new(
        Box::new(AdapterSource::new(adapter)),
        MediaSourceStreamOptions::default(),
    );
    (stream, captured)
}

/// Rewraps a boxed I/O failure reported by the library as a file-access error.
///
/// The library boxes whatever error its stream produced; when that really is an
/// `std::io::Error` it is recovered whole so the platform error code survives.
fn file_access_from(error: Box<dyn StdError>) -> Error {
    match error.downcast::<std::io::Error>() {
        Ok(io) => Error::FileAccess(*io),
        Err(other) => Error::FileAccess(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Translates a symphonia error into the Resona taxonomy.
///
/// A file error parked in the adapter's captured-error slot always wins: the codec
/// library only ever observed a generic stream failure, and rethrowing its view of
/// events would bury the root cause.
///
/// An unexpected end of file has its own variant on the library side (its
/// `From<std::io::Error>` conversion peels `UnexpectedEof` off before boxing), so
/// hitting it behind a valid signature means the file is cut short, not that the
/// file implementation failed.
pub fn surface_error(error: SymphoniaError, captured: &CapturedError) -> Error {
    if let Some(root_cause) = captured.take() {
        return root_cause;
    }

    match error {
        SymphoniaError::IoError(err) | SymphoniaError::IoInterruptedError(err) => {
            file_access_from(err)
        }
        SymphoniaError::EndOfFile => {
            Error::CorruptedFile("stream ended unexpectedly inside the codec library")
        }
        SymphoniaError::DecodeError(message) => Error::CorruptedFile(message),
        SymphoniaError::Unsupported(feature) => Error::UnsupportedFormat(feature),
        SymphoniaError::LimitError(constraint) => Error::CorruptedFile(constraint),
        SymphoniaError::ResetRequired => {
            Error::UnsupportedFormat("stream changes parameters mid-file")
        }
        SymphoniaError::SeekError(kind) => {
            Error::InvalidArgument(format!("seek failed: {:?}", kind))
        }
        SymphoniaError::Other(message) => Error::CorruptedFile(message),
    }
}

/// Converts a symphonia channel mask into the placement mask, dropping any positions
/// outside the shared Microsoft-ordered first 18 bits.
pub fn placements_from_channels(channels: symphonia_core::audio::Channels) -> ChannelPlacement {
    ChannelPlacement::from_bits_truncate(channels.bits())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_core::io::MemoryFile;

    #[test]
    fn captured_errors_beat_library_errors() {
        let (_, captured) = media_source_stream(Arc::new(MemoryFile::from_vec(vec![0u8; 16])));

        // Nothing captured: the library error is translated.
        let error = surface_error(SymphoniaError::DecodeError("bad bits"), &captured);
        assert!(matches!(error, Error::CorruptedFile("bad bits")));
    }

    #[test]
    fn eof_inside_the_library_is_a_corrupt_stream() {
        let (_, captured) = media_source_stream(Arc::new(MemoryFile::from_vec(vec![])));
        assert!(matches!(
            surface_error(SymphoniaError::EndOfFile, &captured),
            Error::CorruptedFile(_)
        ));
    }

    #[test]
    fn boxed_io_errors_are_recovered_whole() {
        let (_, captured) = media_source_stream(Arc::new(MemoryFile::from_vec(vec![])));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "simulated");
        match surface_error(SymphoniaError::IoError(Box::new(io)), &captured) {
            Error::FileAccess(recovered) => {
                assert_eq!(recovered.kind(), std::io::ErrorKind::PermissionDenied)
            }
            other => panic!("expected a file-access error, got {:?}", other),
        }
    }
}
