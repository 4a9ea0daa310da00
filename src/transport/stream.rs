//! Payload adapter for connection-oriented transports.
//!
//! A stream needs no session table: the connection itself is the session.
//! Each read returns whatever one bounded read produced (at most
//! [`MAX_STREAM_FRAME_SIZE`] bytes), with no headers.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

use super::connection::{Headers, Payload, PayloadConnection};
use super::error::{TransportError, TransportResult};
use crate::core::MAX_STREAM_FRAME_SIZE;

/// [`PayloadConnection`] over any byte stream.
///
/// The stream is split so a read blocked on the peer never holds up writes.
#[derive(Debug)]
pub struct StreamConnection<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    log_context: String,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a stream, describing its remote endpoint with `log_context`.
    pub fn new(stream: S, log_context: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            log_context: log_context.into(),
        }
    }
}

impl StreamConnection<TcpStream> {
    /// Wrap an accepted or dialed TCP stream.
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self::new(stream, peer.to_string()))
    }

    /// Dial a TCP endpoint.
    pub async fn connect_tcp(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_tcp(stream)
    }
}

#[cfg(unix)]
impl StreamConnection<UnixStream> {
    /// Wrap a unix stream. Unnamed peers are described as `unix:unnamed`.
    pub fn from_unix(stream: UnixStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let log_context = match peer.as_pathname() {
            Some(path) => format!("unix:{}", path.display()),
            None => "unix:unnamed".to_string(),
        };
        Ok(Self::new(stream, log_context))
    }
}

#[async_trait]
impl<S> PayloadConnection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read_payload(&self) -> TransportResult<Payload> {
        let mut buf = BytesMut::zeroed(MAX_STREAM_FRAME_SIZE);
        let n = self
            .reader
            .lock()
            .await
            .read(&mut buf)
            .await
            .map_err(TransportError::Read)?;

        if n == 0 {
            debug!(conn = %self.log_context, "stream reached EOF");
            return Err(TransportError::ConnectionClosed);
        }

        buf.truncate(n);
        Ok(Payload::new(buf.freeze()))
    }

    async fn write_payload(&self, data: &[u8], _headers: &Headers) -> TransportResult<usize> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await.map_err(TransportError::Write)?;
        writer.flush().await.map_err(TransportError::Write)?;
        Ok(data.len())
    }

    fn log_context(&self) -> String {
        self.log_context.clone()
    }

    async fn close(&self) -> TransportResult<()> {
        match self.writer.lock().await.shutdown().await {
            Ok(()) => Ok(()),
            // Already shut down or torn down by the peer.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::Write(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (StreamConnection<TcpStream>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn, accepted) = tokio::join!(StreamConnection::connect_tcp(addr), listener.accept());
        (conn.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_read_returns_bytes_without_headers() {
        let (conn, mut peer) = tcp_pair().await;
        peer.write_all(b"stream payload").await.unwrap();

        let payload = conn.read_payload().await.unwrap();
        assert_eq!(payload.data, Bytes::from_static(b"stream payload"));
        assert!(payload.headers.is_empty());
    }

    #[tokio::test]
    async fn test_read_is_bounded() {
        let (conn, mut peer) = tcp_pair().await;
        let big = vec![0xAB; MAX_STREAM_FRAME_SIZE * 3];
        peer.write_all(&big).await.unwrap();

        let mut total = 0;
        while total < big.len() {
            let payload = conn.read_payload().await.unwrap();
            assert!(payload.len() <= MAX_STREAM_FRAME_SIZE);
            total += payload.len();
        }
        assert_eq!(total, big.len());
    }

    #[tokio::test]
    async fn test_write_ignores_headers() {
        let (conn, mut peer) = tcp_pair().await;
        let mut headers = Headers::new();
        headers.insert(1, Bytes::from_static(b"dropped"));

        let n = conn.write_payload(b"abc", &headers).await.unwrap();
        assert_eq!(n, 3);

        let mut buf = [0u8; 3];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test]
    async fn test_eof_after_peer_close() {
        let (conn, peer) = tcp_pair().await;
        drop(peer);

        let err = conn.read_payload().await.unwrap_err();
        assert!(err.is_eof());
    }

    #[tokio::test]
    async fn test_log_context_is_remote_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn, _accepted) =
            tokio::join!(StreamConnection::connect_tcp(addr), listener.accept());
        assert_eq!(conn.unwrap().log_context(), addr.to_string());
    }

    #[tokio::test]
    async fn test_close_twice() {
        let (conn, mut peer) = tcp_pair().await;
        conn.close().await.unwrap();
        assert!(conn.close().await.is_ok());

        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_generic_duplex_stream() {
        let (a, mut b) = tokio::io::duplex(64);
        let conn = StreamConnection::new(a, "duplex");
        b.write_all(b"hi").await.unwrap();

        let payload = conn.read_payload().await.unwrap();
        assert_eq!(&payload.data[..], b"hi");
        assert_eq!(conn.log_context(), "duplex");
    }
}
