// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Error taxonomy shared by the storage, filesystem and context layers.

use core::fmt;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Failure classes reported by the loader's library layers.
///
/// None of the library layers halt on their own. Escalation to the platform's error handler is
/// done by the outermost boot flow only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A path or image identifier could not be resolved.
    NotFound,
    /// A file was opened while another one was still open.
    TooManyOpenFiles,
    /// An image does not fit into its destination region.
    SizeExceeded,
    /// The filesystem is absent or its boot parameter block is corrupt.
    InvalidSignature,
    /// The underlying storage operation failed.
    IoFailure,
    /// An operation was called in a state where it is not allowed.
    InvalidState,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl Error {
    /// The negative errno value handed to the platform error handler.
    pub const fn errno(self) -> i32 {
        match self {
            Error::NotFound => -2,          // ENOENT
            Error::TooManyOpenFiles => -23, // ENFILE
            Error::SizeExceeded => -27,     // EFBIG
            Error::InvalidSignature => -22, // EINVAL
            Error::IoFailure => -5,         // EIO
            Error::InvalidState => -1,      // EPERM
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::NotFound => "not found",
            Error::TooManyOpenFiles => "too many open files",
            Error::SizeExceeded => "size exceeded",
            Error::InvalidSignature => "invalid signature",
            Error::IoFailure => "I/O failure",
            Error::InvalidState => "invalid state",
        };

        write!(f, "{} ({})", s, self.errno())
    }
}
