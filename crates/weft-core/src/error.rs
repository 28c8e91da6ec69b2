#![forbid(unsafe_code)]

//! Library error type.
//!
//! One flat enum covers every failure the crate surfaces. Best-effort
//! paths (cursor queries, title, clipboard, beep, colors) swallow OS
//! errors and return `Ok` unless the terminal was opened in strict mode,
//! in which case the original error is propagated as [`Error::Io`].

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// All failures surfaced by the terminal core.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend lacks a capability and strict mode is enabled.
    #[error("operation not supported by this terminal: {what}")]
    NotSupported {
        /// Short name of the missing capability or operation.
        what: &'static str,
    },

    /// An out-of-range position, size, or option value.
    #[error("invalid argument: {what}")]
    InvalidArgument {
        /// Description of the offending argument.
        what: &'static str,
    },

    /// Cooperative cancellation, or the user cancelled a read.
    #[error("operation cancelled")]
    Cancelled,

    /// The event stream has completed and holds no further events.
    #[error("end of input")]
    EndOfInput,

    /// An OS syscall reported failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Construct a [`Error::NotSupported`] value.
    #[must_use]
    pub const fn not_supported(what: &'static str) -> Self {
        Self::NotSupported { what }
    }

    /// Construct an [`Error::InvalidArgument`] value.
    #[must_use]
    pub const fn invalid_argument(what: &'static str) -> Self {
        Self::InvalidArgument { what }
    }

    /// True when the error is the cancellation sentinel.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True when the error marks the end of the event stream.
    #[must_use]
    pub const fn is_end_of_input(&self) -> bool {
        matches!(self, Self::EndOfInput)
    }
}
