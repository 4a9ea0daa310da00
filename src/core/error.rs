//! Error types for the fabric dataplane.

use thiserror::Error;

/// Errors that can occur when parsing a packet address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The string is not of the form `<network>:<address>`.
    #[error("invalid packet address format: {0:?} (expected <network>:<address>)")]
    InvalidFormat(String),

    /// The network token is not one of `udp`, `udp4`, `udp6`, `unixgram`.
    #[error("unsupported packet network: {0:?}")]
    UnsupportedNetwork(String),
}

/// Top-level dataplane errors.
#[derive(Debug, Error)]
pub enum DataplaneError {
    /// Address error.
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    /// Transport error.
    #[cfg(feature = "transport")]
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Listener construction error.
    #[cfg(feature = "packet")]
    #[error("listener error: {0}")]
    Listener(#[from] crate::packet::ListenerError),

    /// Connect handshake error.
    #[cfg(feature = "packet")]
    #[error("handshake error: {0}")]
    Handshake(#[from] crate::packet::HandshakeError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_error_display() {
        let err = AddressError::UnsupportedNetwork("ftp".into());
        assert_eq!(err.to_string(), "unsupported packet network: \"ftp\"");

        let err = AddressError::InvalidFormat("udp".into());
        assert!(err.to_string().contains("<network>:<address>"));
    }

    #[test]
    fn test_dataplane_error_from_address() {
        let err: DataplaneError = AddressError::InvalidFormat("x".into()).into();
        assert!(matches!(err, DataplaneError::Address(_)));
    }
}
