//! Error types for the channel abstraction.

use crate::types::PayloadKind;
use thiserror::Error;

/// Errors that can occur while moving frames between peers.
///
/// Every variant is fatal for the step that observed it: the protocol carries
/// no sequence numbers, so a failed send or receive leaves the stream in an
/// unknown position and nothing is retried.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer hung up (queue dropped, socket EOF or reset)
    #[error("Channel closed: {0}")]
    Closed(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame or object bytes could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The received frame carries a different payload kind than requested
    #[error("Unexpected payload: expected {expected}, received {received}")]
    UnexpectedPayload {
        expected: PayloadKind,
        received: PayloadKind,
    },

    /// The received frame belongs to a different database tag
    #[error("dbTag mismatch: expected {expected}, received {received}")]
    DbTagMismatch { expected: i32, received: i32 },

    /// Matrix frame whose entry count disagrees with its shape
    #[error("Malformed matrix frame: {rows}x{cols} with {len} entries")]
    MalformedMatrix { rows: usize, cols: usize, len: usize },

    /// Object frame carrying a different concrete type than the receiver
    #[error("Class tag mismatch: expected {expected}, received {received}")]
    ClassTagMismatch { expected: i32, received: i32 },

    /// Frame larger than the transport accepts
    #[error("Frame of {0} bytes exceeds transport limit")]
    FrameTooLarge(usize),

    /// Read timeout configured on the transport expired
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ChannelError {
    /// Creates a closed-channel error.
    pub fn closed(peer: impl std::fmt::Display) -> Self {
        Self::Closed(peer.to_string())
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Returns true when the error means the peer is gone for good.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<bincode::Error> for ChannelError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
