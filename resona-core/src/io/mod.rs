// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module defines the random-access file contract all containers are read
//! through, plus the stream adapter that presents such a file to codec libraries
//! expecting sequential stream semantics.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use crate::errors::{Error, Result};

mod adapter;
pub mod endian;

pub use adapter::{CapturedError, StreamAdapter};

/// A byte-addressable view of a file-like object.
///
/// All reads and writes are positioned absolutely; there is no shared cursor, so two
/// decoders holding the same file may read from different offsets without coordinating.
/// Individual implementations are free to serialize access internally and are not
/// required to be efficient under concurrent use.
pub trait RandomAccessFile: Send + Sync {
    /// Returns the current length of the file in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the file holds no data.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fills `buffer` with exactly `buffer.len()` bytes starting at absolute `offset`.
    ///
    /// Fails with a file-access error if any part of the requested range lies beyond the
    /// end of the file or if the underlying I/O fails. A zero-length read at
    /// `offset == len()` succeeds.
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<()>;

    /// Writes `buffer` at absolute `offset`.
    ///
    /// `offset` may equal the current length, in which case the file grows. Offsets past
    /// the current length fail with a file-access error.
    fn write_at(&self, offset: u64, buffer: &[u8]) -> Result<()>;
}

fn out_of_bounds(op: &'static str) -> Error {
    Error::FileAccess(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, op))
}

/// A `RandomAccessFile` backed by a file on the local file system.
///
/// Positioned access is emulated with a seek-then-read under an internal lock, so a
/// single `LocalFile` serializes overlapping requests. Decoder clones sharing one
/// `LocalFile` therefore remain correct, merely not parallel at the I/O level.
pub struct LocalFile {
    inner: Mutex<fs::File>,
    length: RwLock<u64>,
}

impl LocalFile {
    /// Opens an existing file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<LocalFile> {
        let file = fs::File::open(path)?;
        let length = file.metadata()?.len();
        Ok(LocalFile { inner: Mutex::new(file), length: RwLock::new(length) })
    }

    /// Creates a new file (truncating any existing one) for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<LocalFile> {
        let file = fs::OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        Ok(LocalFile { inner: Mutex::new(file), length: RwLock::new(0) })
    }
}

impl RandomAccessFile for LocalFile {
    fn len(&self) -> u64 {
        *self.length.read().unwrap()
    }

    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let length = self.len();
        if offset > length || buffer.len() as u64 > length - offset {
            return Err(out_of_bounds("read crosses the end of the file"));
        }
        if buffer.is_empty() {
            return Ok(());
        }

        let mut file = self.inner.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buffer)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        let mut length = self.length.write().unwrap();
        if offset > *length {
            return Err(out_of_bounds("write starts past the end of the file"));
        }

        let mut file = self.inner.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        std::io::Write::write_all(&mut *file, buffer)?;

        let end = offset + buffer.len() as u64;
        if end > *length {
            *length = end;
        }
        Ok(())
    }
}

/// A `RandomAccessFile` over an in-memory byte buffer.
///
/// Useful for decoding audio that already lives in memory and as the backing store for
/// the test suites.
#[derive(Default)]
pub struct MemoryFile {
    data: RwLock<Vec<u8>>,
}

impl MemoryFile {
    /// Creates an empty, growable memory file.
    pub fn new() -> MemoryFile {
        MemoryFile::default()
    }

    /// Wraps an existing byte buffer.
    pub fn from_vec(data: Vec<u8>) -> MemoryFile {
        MemoryFile { data: RwLock::new(data) }
    }

    /// Returns a copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().unwrap().clone()
    }
}

impl RandomAccessFile for MemoryFile {
    fn len(&self) -> u64 {
        self.data.read().unwrap().len() as u64
    }

    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let data = self.data.read().unwrap();
        let end = offset.checked_add(buffer.len() as u64);
        match end {
            Some(end) if end <= data.len() as u64 => {
                buffer.copy_from_slice(&data[offset as usize..end as usize]);
                Ok(())
            }
            _ => Err(out_of_bounds("read crosses the end of the file")),
        }
    }

    fn write_at(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        let mut data = self.data.write().unwrap();
        if offset > data.len() as u64 {
            return Err(out_of_bounds("write starts past the end of the file"));
        }

        let offset = offset as usize;
        let overlap = usize::min(data.len() - offset, buffer.len());
        data[offset..offset + overlap].copy_from_slice(&buffer[..overlap]);
        data.extend_from_slice(&buffer[overlap..]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_file_reads_within_bounds() {
        let file = MemoryFile::from_vec(vec![1, 2, 3, 4, 5]);

        let mut buffer = [0u8; 3];
        file.read_at(1, &mut buffer).unwrap();
        assert_eq!(buffer, [2, 3, 4]);
    }

    #[test]
    fn zero_length_read_at_end_succeeds() {
        let file = MemoryFile::from_vec(vec![0u8; 16]);
        file.read_at(16, &mut []).unwrap();
    }

    #[test]
    fn read_crossing_end_fails() {
        let file = MemoryFile::from_vec(vec![0u8; 16]);

        let mut buffer = [0u8; 1];
        assert!(matches!(file.read_at(16, &mut buffer), Err(Error::FileAccess(_))));
        assert!(matches!(file.read_at(17, &mut []), Err(Error::FileAccess(_))));
    }

    #[test]
    fn write_at_end_appends() {
        let file = MemoryFile::from_vec(vec![1, 2]);
        file.write_at(2, &[3, 4]).unwrap();
        assert_eq!(file.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn write_past_end_fails() {
        let file = MemoryFile::new();
        assert!(matches!(file.write_at(1, &[0]), Err(Error::FileAccess(_))));
    }

    #[test]
    fn overlapping_write_extends() {
        let file = MemoryFile::from_vec(vec![1, 2, 3]);
        file.write_at(2, &[9, 9]).unwrap();
        assert_eq!(file.to_vec(), vec![1, 2, 9, 9]);
    }
}
