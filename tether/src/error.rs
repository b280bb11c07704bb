//! Error types for tether operations.

use std::io;

use crate::invocation::Output;

/// Alias for `Result<T, tether::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by sessions and transfers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The interpreter could not be started, or the handshake failed.
    /// The session never became ready.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A checked command exited with a nonzero code. The session is still
    /// usable.
    #[error("command exited with code {code}: {command}")]
    CommandFailed {
        /// Exit code reported by the remote shell.
        code: i32,
        /// The command line that was sent.
        command: String,
        /// Captured output, if capture was enabled.
        output: Option<Output>,
    },

    /// The output stream ended before the command's control frame arrived.
    ///
    /// Framing is lost at this point; the session has been closed and must
    /// be reconnected before further use.
    #[error("remote shell exited before finishing: {command}")]
    PrematureExit {
        /// The command line that was sent.
        command: String,
        /// Output received before the stream ended, if capture was enabled.
        output: Option<Output>,
    },

    /// An environment variable name is not `[A-Za-z_][A-Za-z0-9_]*`.
    #[error("invalid environment variable name: {0:?}")]
    InvalidName(String),

    /// A raw command contained a NUL byte, which terminates commands on
    /// the wire.
    #[error("interior NUL byte in command")]
    Nul,

    /// The session has no running interpreter.
    #[error("session is not connected")]
    NotConnected,

    /// `connect` was called on a session that is already connected.
    #[error("session is already connected")]
    AlreadyConnected,

    /// Output was requested as strict UTF-8 text and was not valid.
    #[error("output is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// The transfer tool exited unsuccessfully.
    #[error("transfer failed with {}: {stderr}", code.map_or_else(|| "signal".to_owned(), |c| format!("code {c}")))]
    TransferFailed {
        /// Exit code, or `None` if the tool was killed by a signal.
        code: Option<i32>,
        /// Whatever the tool wrote to stderr.
        stderr: String,
    },

    /// An I/O error talking to a child process.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` if the session that produced this error can no
    /// longer be used.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::PrematureExit { .. } | Self::Io(_))
    }

    /// Exit code of a failed command, if this error carries one.
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } => Some(*code),
            Self::TransferFailed { code, .. } => *code,
            _ => None,
        }
    }
}
