#![allow(clippy::uninlined_format_args)]

//! Error related data structures to be shared and used.
//!
//! This module contains the [`Error`] type, used to represent every
//! fallible outcome the core surfaces to a caller: cartridge loading,
//! save-image loading, and internal invariant violations.

use std::fmt::{self, Display, Formatter};

/// Classifies an [`Error`] without the free-form message attached to it.
///
/// Kept separate from the message so callers can match on the kind
/// without string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The cartridge image is truncated, declares an unknown MBC byte,
    /// or its declared size does not match the data provided.
    InvalidCartridge,
    /// A save image's size does not match the cartridge's declared
    /// external-RAM size.
    SaveMismatch,
    /// An internal invariant that should be unreachable was violated.
    /// Reported rather than silently ignored.
    InvariantViolation,
    /// Anything else, carried as a free-form message only.
    CustomError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidCartridge => "invalid cartridge",
            ErrorKind::SaveMismatch => "save size mismatch",
            ErrorKind::InvariantViolation => "invariant violation",
            ErrorKind::CustomError => "error",
        };
        write!(f, "{}", name)
    }
}

/// Top level error type for the emulation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_cartridge(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCartridge, message)
    }

    pub fn save_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SaveMismatch, message)
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolation, message)
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CustomError, message)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = Error::invalid_cartridge("truncated ROM image");
        assert_eq!(err.kind, ErrorKind::InvalidCartridge);
        assert_eq!(err.to_string(), "invalid cartridge: truncated ROM image");
    }
}
