// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Resona.
#[derive(Debug)]
pub enum Error {
    /// The underlying file implementation failed while reading, writing, or querying its
    /// length. The platform error code, if any, is carried by the wrapped I/O error.
    ///
    /// Errors of this kind are never wrapped or translated: when a codec library reports a
    /// generic failure because one of its stream callbacks hit the file, the original file
    /// error is what surfaces to the caller.
    FileAccess(io::Error),
    /// The file was identified as a known format, but uses features this implementation
    /// does not support. Also reported when no registered codec recognizes a file that a
    /// caller has committed to decoding.
    UnsupportedFormat(&'static str),
    /// The file matches a format's detection signature but violates the structural
    /// invariants of that format.
    CorruptedFile(&'static str),
    /// Caller-provided data is malformed.
    InvalidArgument(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::FileAccess(ref err) => {
                write!(f, "file access error: {}", err)
            }
            Error::UnsupportedFormat(msg) => {
                write!(f, "unsupported format: {}", msg)
            }
            Error::CorruptedFile(msg) => {
                write!(f, "corrupted file: {}", msg)
            }
            Error::InvalidArgument(ref msg) => {
                write!(f, "invalid argument: {}", msg)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::FileAccess(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::FileAccess(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create an unsupported-format error.
pub fn unsupported_format_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::UnsupportedFormat(msg))
}

/// Convenience function to create a corrupted-file error.
pub fn corrupted_file_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::CorruptedFile(msg))
}

/// Convenience function to create an invalid-argument error.
pub fn invalid_argument_error<T>(msg: String) -> Result<T> {
    Err(Error::InvalidArgument(msg))
}

/// Convenience function to create a file-access error from a plain message.
pub fn file_access_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::FileAccess(io::Error::new(io::ErrorKind::Other, msg)))
}
