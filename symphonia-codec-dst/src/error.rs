// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use thiserror::Error;

/// Errors raised while decoding or encoding a DST frame.
///
/// Every variant is recoverable: a failed frame leaves the codec ready for the next one.
#[derive(Error, Debug)]
pub enum Error {
    /// The frame ended before a required field could be read.
    #[error("dst: frame data exhausted")]
    OutOfData,

    /// A field of the frame holds a value the format does not allow.
    #[error("{0}")]
    CorruptStream(&'static str),

    /// The channel count, rate class, or an encoder option is outside the supported set.
    #[error("{0}")]
    UnsupportedConfiguration(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(_: io::Error) -> Self {
        // Bit readers over a byte slice only fail when the slice is exhausted. Depending on the
        // reader, that is reported as either an unexpected EOF or an "other" error.
        Error::OutOfData
    }
}

impl From<Error> for symphonia_core::errors::Error {
    fn from(err: Error) -> Self {
        use symphonia_core::errors::Error as CoreError;

        match err {
            Error::OutOfData => CoreError::IoError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "dst: frame data exhausted",
            )),
            Error::CorruptStream(msg) => CoreError::DecodeError(msg),
            Error::UnsupportedConfiguration(msg) => CoreError::Unsupported(msg),
        }
    }
}

/// Convenience function to create a corrupt stream error.
pub fn corrupt_stream<T>(desc: &'static str) -> Result<T> {
    Err(Error::CorruptStream(desc))
}

/// Convenience function to create an unsupported configuration error.
pub fn unsupported_config<T>(desc: &'static str) -> Result<T> {
    Err(Error::UnsupportedConfiguration(desc))
}
