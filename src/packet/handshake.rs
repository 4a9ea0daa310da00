//! Connect handshake for datagram sessions.
//!
//! The first datagram a peer sends is a connect request, newline-terminated
//! JSON:
//!
//! ```text
//! {"id":"<token>","svcId":"<service>"}
//! ```
//!
//! The listener hands the parsed request to a [`ConnectHandler`] and sends
//! its verdict back as a connect response:
//!
//! ```text
//! {"scc":true,"msg":""}
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::event::SessionEvent;
use super::session::PacketSession;
use crate::core::{MAX_PACKET_SIZE, RESPONSE_INVALID_REQUEST_MESSAGE, RESPONSE_TIMEOUT_MESSAGE};
use crate::transport::{PacketSocket, PeerAddr, TransportError};

/// Errors on the dialing side of the connect handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Failed to encode a message.
    #[error("failed to encode handshake message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Failed to decode a message.
    #[error("failed to decode handshake message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Socket error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No response arrived in time.
    #[error("timed out waiting for connect response")]
    Timeout,

    /// The listener refused the connection.
    #[error("connection rejected: {0}")]
    Rejected(String),
}

/// Connect request sent by a peer in its first datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Client token.
    #[serde(rename = "id")]
    pub token: String,

    /// Service the peer wants to reach.
    #[serde(rename = "svcId")]
    pub service_id: String,
}

impl ConnectRequest {
    /// Create a new connect request.
    pub fn new(token: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            service_id: service_id.into(),
        }
    }

    /// Decode from JSON. Trailing whitespace (the line terminator) is accepted.
    pub fn from_json(data: &[u8]) -> Result<Self, HandshakeError> {
        serde_json::from_slice(data).map_err(HandshakeError::Decode)
    }

    /// Encode as a newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, HandshakeError> {
        to_line(self)
    }
}

/// Verdict on a connect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    /// Whether the session was accepted.
    #[serde(rename = "scc")]
    pub success: bool,

    /// Failure reason, empty on success.
    #[serde(rename = "msg", default)]
    pub message: String,
}

impl ConnectResponse {
    /// An accepting response.
    pub fn success() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    /// A rejecting response.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Decode from JSON.
    pub fn from_json(data: &[u8]) -> Result<Self, HandshakeError> {
        serde_json::from_slice(data).map_err(HandshakeError::Decode)
    }

    /// Encode as a newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, HandshakeError> {
        to_line(self)
    }
}

fn to_line<T: Serialize>(message: &T) -> Result<Vec<u8>, HandshakeError> {
    let mut line = serde_json::to_vec(message).map_err(HandshakeError::Encode)?;
    line.push(b'\n');
    Ok(line)
}

/// Decides whether a new datagram session may proceed.
///
/// Called off the listener's event loop, once per new session, with the
/// session still in the `New` state. Typically binds the session into the
/// fabric (it is a [`PayloadConnection`](crate::transport::PayloadConnection))
/// before accepting.
#[async_trait]
pub trait ConnectHandler: Send + Sync + 'static {
    /// Handle a connect request for `session`.
    async fn handle_connect(
        &self,
        session: Arc<PacketSession>,
        request: ConnectRequest,
    ) -> ConnectResponse;
}

#[async_trait]
impl<F> ConnectHandler for F
where
    F: Fn(Arc<PacketSession>, ConnectRequest) -> ConnectResponse + Send + Sync + 'static,
{
    async fn handle_connect(
        &self,
        session: Arc<PacketSession>,
        request: ConnectRequest,
    ) -> ConnectResponse {
        self(session, request)
    }
}

/// Run the connect handshake for a freshly created session and queue the
/// outcome back to its listener.
pub(crate) async fn authenticate(
    handler: Arc<dyn ConnectHandler>,
    session: Arc<PacketSession>,
    initial: Bytes,
    timeout: Duration,
) {
    let response = match ConnectRequest::from_json(&initial) {
        Ok(request) => {
            debug!(session = %session.session_id(), service = %request.service_id, "handling connect request");
            let pending = handler.handle_connect(Arc::clone(&session), request);
            match tokio::time::timeout(timeout, pending).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(session = %session.session_id(), ?timeout, "connect handler timed out");
                    ConnectResponse::failure(RESPONSE_TIMEOUT_MESSAGE)
                }
            }
        }
        Err(e) => {
            warn!(session = %session.session_id(), error = %e, "invalid connect request");
            ConnectResponse::failure(RESPONSE_INVALID_REQUEST_MESSAGE)
        }
    };

    match session.listener() {
        Some(listener) => listener.queue_event(SessionEvent::Respond { session, response }),
        None => debug!(session = %session.session_id(), "listener gone before connect response"),
    }
}

/// Send a connect request to a packet listener and wait for its response.
///
/// Datagrams from other peers are ignored while waiting. A rejecting
/// response is returned as [`HandshakeError::Rejected`].
pub async fn dial(
    socket: &PacketSocket,
    server: &PeerAddr,
    request: &ConnectRequest,
    timeout: Duration,
) -> Result<ConnectResponse, HandshakeError> {
    socket.send_to(&request.to_line()?, server).await?;

    let response = tokio::time::timeout(timeout, recv_response(socket, server))
        .await
        .map_err(|_| HandshakeError::Timeout)??;

    if response.success {
        Ok(response)
    } else {
        Err(HandshakeError::Rejected(response.message))
    }
}

async fn recv_response(
    socket: &PacketSocket,
    server: &PeerAddr,
) -> Result<ConnectResponse, HandshakeError> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    loop {
        let (len, from) = socket
            .recv_from(&mut buf)
            .await
            .map_err(TransportError::Read)?;
        if from.as_ref() != Some(server) {
            debug!(?from, "ignoring datagram from unexpected peer");
            continue;
        }
        return ConnectResponse::from_json(&buf[..len]);
    }
}
