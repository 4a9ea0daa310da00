//! Transport layer error types.
//!
//! Transport errors are local to one payload connection. A fatal error ends
//! that connection (for datagram sessions: the session is deleted) and never
//! the listener or other sessions sharing its socket.

use std::io;

use thiserror::Error;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading from the transport failed.
    #[error("transport read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing to the transport failed.
    #[error("transport write failed: {0}")]
    Write(#[source] io::Error),

    /// Other I/O error (socket setup, address resolution).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The connection has been closed; no further payloads will arrive.
    #[error("connection closed")]
    ConnectionClosed,

    /// The owning listener has shut down.
    #[error("listener closed")]
    ListenerClosed,

    /// The peer address belongs to a different network than the socket.
    #[error("peer address {peer} cannot be reached from a {socket} socket")]
    AddressMismatch {
        /// Peer address description.
        peer: String,
        /// Socket network description.
        socket: &'static str,
    },

    /// Payload exceeds the maximum frame size of the transport.
    #[error("payload of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Payload size.
        size: usize,
        /// Maximum permitted size.
        max: usize,
    },
}

impl TransportError {
    /// Check if this error ends the affected connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Read(_)
                | TransportError::Write(_)
                | TransportError::ConnectionClosed
                | TransportError::ListenerClosed
        )
    }

    /// Check if this error is an orderly end of stream.
    pub fn is_eof(&self) -> bool {
        match self {
            TransportError::ConnectionClosed => true,
            TransportError::Read(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
