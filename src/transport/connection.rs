//! The payload connection contract.
//!
//! Every transport adapter presents the same discrete-unit interface to the
//! circuit forwarder: read one payload, write one payload, describe itself.
//! The forwarder never learns whether a datagram session or a stream carried
//! the bytes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::TransportResult;

/// Out-of-band header metadata, keyed by small integers.
///
/// Datagram adapters always read an empty map and ignore headers on write,
/// since the wire format has no header framing.
pub type Headers = BTreeMap<u8, Bytes>;

/// One discrete unit of payload plus its side-channel headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Payload bytes.
    pub data: Bytes,
    /// Header metadata.
    pub headers: Headers,
}

impl Payload {
    /// Create a payload with no headers.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            headers: Headers::new(),
        }
    }

    /// Create a payload carrying headers.
    pub fn with_headers(data: impl Into<Bytes>, headers: Headers) -> Self {
        Self {
            data: data.into(),
            headers,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Split into data and headers.
    pub fn into_parts(self) -> (Bytes, Headers) {
        (self.data, self.headers)
    }
}

/// Uniform read/write/identify contract consumed by the circuit forwarder.
#[async_trait]
pub trait PayloadConnection: Send + Sync {
    /// Read one payload.
    ///
    /// Blocks until a unit arrives or the transport fails. Returns
    /// [`TransportError::ConnectionClosed`](super::TransportError::ConnectionClosed)
    /// once the connection has ended.
    async fn read_payload(&self) -> TransportResult<Payload>;

    /// Write one payload, returning the number of payload bytes written.
    async fn write_payload(&self, data: &[u8], headers: &Headers) -> TransportResult<usize>;

    /// Diagnostic identity of this connection.
    fn log_context(&self) -> String;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_new_has_no_headers() {
        let payload = Payload::new(&b"hello"[..]);
        assert_eq!(payload.len(), 5);
        assert!(!payload.is_empty());
        assert!(payload.headers.is_empty());
    }

    #[test]
    fn test_headers_are_ordered() {
        let mut headers = Headers::new();
        headers.insert(7, Bytes::from_static(b"b"));
        headers.insert(0, Bytes::from_static(b"a"));

        let payload = Payload::with_headers(Bytes::new(), headers);
        let keys: Vec<u8> = payload.headers.keys().copied().collect();
        assert_eq!(keys, vec![0, 7]);
        assert!(payload.is_empty());

        let (data, headers) = payload.into_parts();
        assert!(data.is_empty());
        assert_eq!(headers.len(), 2);
    }
}
