// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by the wait set, the pipe endpoints and the config layer.
//!
//! Registration on the multiplexer itself reports refusal as `false`; these
//! errors are what the lower layers hand back so the refusal can be logged
//! with a reason.

use std::io;

/// Errors returned by syncwait operations.
#[derive(Debug)]
pub enum Error {
    /// Item (channel handle or event) is already armed.
    AlreadyExists,
    /// Item is not armed / endpoint peer is gone.
    NotFound,
    /// Argument rejected (empty signal mask, bad config value).
    InvalidArgument(String),
    /// Channel endpoint is closed and can no longer be watched.
    InvalidHandle,
    /// Wait driver has no free slot left (carries the configured maximum).
    CapacityExceeded(usize),
    /// I/O error from the blocking primitive.
    IoError(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AlreadyExists => write!(f, "Item already registered"),
            Error::NotFound => write!(f, "Item not found"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidHandle => write!(f, "Invalid or closed handle"),
            Error::CapacityExceeded(max) => {
                write!(f, "Wait set capacity exceeded (max {} slots)", max)
            }
            Error::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

/// Convenient alias for results using the crate [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;
