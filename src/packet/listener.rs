//! Packet listener: the datagram session multiplexer.
//!
//! Provides [`PacketListener`], which owns a datagram socket and the session
//! table for every peer talking to it. Three tasks run per listener:
//!
//! - the **reader** receives datagrams and classifies them by peer address,
//!   handing payloads to existing sessions or queuing a create event;
//! - the **event loop** applies [`SessionEvent`]s one at a time, in
//!   submission order, and is the only writer of the session table;
//! - the **reaper** periodically queues expiry events for idle sessions.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::event::SessionEvent;
use super::handshake::ConnectHandler;
use super::session::PacketSession;
use crate::core::{
    AddressError, PacketAddress, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_PENDING_READS,
    DEFAULT_SCAN_INTERVAL, DEFAULT_SESSION_TIMEOUT, MAX_PACKET_SIZE,
};
use crate::transport::{PacketSocket, PeerAddr, TransportError, TransportResult};

/// Errors that can occur when constructing a packet listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listen address did not parse.
    #[error("cannot listen on invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// Failed to bind the socket.
    #[error("bind failed for {address}: {source}")]
    BindFailed {
        /// Address that failed to bind.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Configuration rejected.
    #[error("invalid listener configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub address: PacketAddress,

    /// Idle time after which a session is reaped.
    pub session_timeout: Duration,

    /// Period of the idle-session sweep.
    pub scan_interval: Duration,

    /// Receive buffer size per datagram.
    pub max_packet_size: usize,

    /// Maximum number of concurrent sessions (0 = unlimited).
    pub max_sessions: usize,

    /// Time the connect handler is given before the peer is told `timeout`.
    pub handshake_timeout: Duration,

    /// Datagrams buffered per session; further ones are dropped until the
    /// consumer reads.
    pub max_pending_reads: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: PacketAddress::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            max_packet_size: MAX_PACKET_SIZE,
            max_sessions: 0,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_pending_reads: DEFAULT_MAX_PENDING_READS,
        }
    }
}

impl ListenerConfig {
    fn validate(&self) -> Result<(), ListenerError> {
        if self.scan_interval.is_zero() {
            return Err(ListenerError::InvalidConfig(
                "scan interval must be non-zero".into(),
            ));
        }
        if self.max_packet_size == 0 {
            return Err(ListenerError::InvalidConfig(
                "max packet size must be non-zero".into(),
            ));
        }
        if self.max_pending_reads == 0 {
            return Err(ListenerError::InvalidConfig(
                "max pending reads must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for a [`ListenerConfig`].
#[derive(Debug, Default)]
pub struct ListenerConfigBuilder {
    config: ListenerConfig,
}

impl ListenerConfigBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn address(mut self, address: PacketAddress) -> Self {
        self.config.address = address;
        self
    }

    /// Set the session idle timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Set the reaper sweep period.
    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.config.scan_interval = interval;
        self
    }

    /// Set the receive buffer size per datagram.
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.config.max_packet_size = size;
        self
    }

    /// Set the maximum number of concurrent sessions.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    /// Set the connect handler deadline.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the per-session read queue limit.
    pub fn max_pending_reads(mut self, max: usize) -> Self {
        self.config.max_pending_reads = max;
        self
    }

    /// Build the listener configuration.
    pub fn build(self) -> ListenerConfig {
        self.config
    }
}

/// State shared by the listener handle, its tasks and (weakly) its sessions.
pub(crate) struct ListenerShared {
    log_context: String,
    config: ListenerConfig,
    socket: PacketSocket,
    sessions: DashMap<String, Arc<PacketSession>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    handler: Arc<dyn ConnectHandler>,
}

impl ListenerShared {
    pub(crate) fn log_context(&self) -> &str {
        &self.log_context
    }

    pub(crate) fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub(crate) fn connect_handler(&self) -> Arc<dyn ConnectHandler> {
        Arc::clone(&self.handler)
    }

    pub(crate) fn get_session(&self, session_id: &str) -> Option<Arc<PacketSession>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn contains_session(&self, session: &Arc<PacketSession>) -> bool {
        self.sessions
            .get(session.session_id())
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), session))
    }

    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn queue_event(&self, event: SessionEvent) {
        if let Err(mpsc::error::SendError(event)) = self.events.send(event) {
            debug!(listener = %self.log_context, kind = event.kind(), "event loop stopped, dropping event");
        }
    }

    pub(crate) async fn write_to(&self, data: &[u8], peer: &PeerAddr) -> TransportResult<usize> {
        self.socket.send_to(data, peer).await
    }

    // Table mutation below is reserved to the event loop.

    pub(crate) fn insert_session(&self, session: Arc<PacketSession>) {
        self.sessions
            .insert(session.session_id().to_string(), session);
    }

    pub(crate) fn delete_session(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, session)) => {
                session.release();
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_session(&self, session: &Arc<PacketSession>) -> bool {
        let removed = self
            .sessions
            .remove_if(session.session_id(), |_, current| Arc::ptr_eq(current, session))
            .is_some();
        session.release();
        removed
    }

    fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.delete_session(&id);
        }
    }

    /// Classify one inbound datagram.
    fn dispatch(&self, peer: PeerAddr, data: Bytes) {
        let session_id = peer.to_string();
        match self.get_session(&session_id) {
            Some(session) => {
                debug!(listener = %self.log_context, session = %session_id, len = data.len(), "forwarding data");
                session.mark_activity();
                session.queue_read(data);
            }
            None => self.queue_event(SessionEvent::Create { peer, request: data }),
        }
    }

    /// Queue expiry for every session idle as of `now`.
    fn sweep_idle(&self, now: Instant) -> usize {
        let idle: Vec<Arc<PacketSession>> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle_at(now))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let count = idle.len();
        for session in idle {
            debug!(listener = %self.log_context, session = %session.session_id(), "session idle, queuing expiry");
            self.queue_event(SessionEvent::Expire { session, now });
        }
        count
    }
}

/// A datagram listener multiplexing per-peer sessions over one socket.
///
/// # Example
///
/// ```ignore
/// use fabric_dataplane::packet::{ConnectRequest, ConnectResponse, PacketListener, PacketSession};
/// use std::sync::Arc;
///
/// let listener = PacketListener::listen(
///     "udp:0.0.0.0:9999",
///     |session: Arc<PacketSession>, request: ConnectRequest| {
///         // Bind the session into the fabric here.
///         ConnectResponse::success()
///     },
/// )
/// .await?;
///
/// if let Some(session) = listener.get_session("10.0.0.7:40000") {
///     session.write(b"hello").await?;
/// }
/// ```
pub struct PacketListener {
    shared: Arc<ListenerShared>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PacketListener {
    /// Parse `address` and bind a listener with default options.
    pub async fn listen<H: ConnectHandler>(address: &str, handler: H) -> Result<Self, ListenerError> {
        let address = PacketAddress::parse(address)?;
        let config = ListenerConfigBuilder::new().address(address).build();
        Self::bind(config, handler).await
    }

    /// Bind the socket and start the reader, event loop and reaper tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn bind<H: ConnectHandler>(
        config: ListenerConfig,
        handler: H,
    ) -> Result<Self, ListenerError> {
        config.validate()?;

        info!(address = %config.address, "binding packet listener");
        let socket = PacketSocket::bind(&config.address)
            .await
            .map_err(|source| ListenerError::BindFailed {
                address: config.address.to_string(),
                source,
            })?;

        let log_context = match socket.local_addr() {
            Ok(local) => format!("{}:{}", config.address.network(), local),
            Err(_) => config.address.to_string(),
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(ListenerShared {
            log_context,
            config,
            socket,
            sessions: DashMap::new(),
            events: event_tx,
            handler: Arc::new(handler),
        });

        let tasks = vec![
            tokio::spawn(read_loop(Arc::clone(&shared), shutdown_rx.clone())),
            tokio::spawn(event_loop(Arc::clone(&shared), event_rx, shutdown_rx.clone())),
            tokio::spawn(reap_loop(Arc::clone(&shared), shutdown_rx)),
        ];

        info!(listener = %shared.log_context, "packet listener started");

        Ok(Self {
            shared,
            shutdown_tx,
            tasks,
        })
    }

    /// Write raw bytes to `addr`, bypassing the session table.
    ///
    /// Used for signaling to peers with no established session.
    pub async fn write_to(&self, data: &[u8], addr: &PeerAddr) -> TransportResult<usize> {
        self.shared.write_to(data, addr).await
    }

    /// Look up a session. Never blocks on I/O.
    pub fn get_session(&self, session_id: &str) -> Option<Arc<PacketSession>> {
        self.shared.get_session(session_id)
    }

    /// Request removal of a session. No-op if absent.
    pub fn delete_session(&self, session_id: &str) {
        self.queue_event(SessionEvent::Delete {
            session_id: session_id.to_string(),
        });
    }

    /// Submit an event to the event loop.
    ///
    /// Events are applied in submission order. Never blocks.
    pub fn queue_event(&self, event: SessionEvent) {
        self.shared.queue_event(event);
    }

    /// Diagnostic identity: network and bound local address.
    pub fn log_context(&self) -> &str {
        self.shared.log_context()
    }

    /// Get the bound local address.
    pub fn local_addr(&self) -> io::Result<PeerAddr> {
        self.shared.socket.local_addr()
    }

    /// Get the number of sessions in the table.
    pub fn session_count(&self) -> usize {
        self.shared.session_count()
    }

    /// Get the listener configuration.
    pub fn config(&self) -> &ListenerConfig {
        self.shared.config()
    }

    /// Run one idle sweep as of `now`, returning how many expiry events were
    /// queued. The reaper task calls this every scan interval.
    pub fn reap_idle(&self, now: Instant) -> usize {
        self.shared.sweep_idle(now)
    }

    /// Wait until every event queued before this call has been applied.
    pub async fn flush(&self) -> TransportResult<()> {
        let (tx, rx) = oneshot::channel();
        self.queue_event(SessionEvent::Flush(tx));
        rx.await.map_err(|_| TransportError::ListenerClosed)
    }

    /// Stop all listener tasks and close every session.
    pub async fn shutdown(mut self) {
        info!(listener = %self.shared.log_context, "shutting down packet listener");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for PacketListener {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn read_loop(shared: Arc<ListenerShared>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; shared.config.max_packet_size];

    loop {
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = shared.socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((0, _)) => {}
            Ok((len, Some(peer))) => shared.dispatch(peer, Bytes::copy_from_slice(&buf[..len])),
            Ok((len, None)) => {
                debug!(listener = %shared.log_context, len, "dropping datagram from unnamed peer");
            }
            Err(e) => {
                warn!(listener = %shared.log_context, error = %e, "packet read failed");
            }
        }
    }

    debug!(listener = %shared.log_context, "reader stopped");
}

async fn event_loop(
    shared: Arc<ListenerShared>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        event.apply(&shared).await;
    }

    shared.close_all();
    debug!(listener = %shared.log_context, "event loop stopped");
}

async fn reap_loop(shared: Arc<ListenerShared>, mut shutdown: watch::Receiver<bool>) {
    let period = shared.config.scan_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            now = ticker.tick() => {
                shared.sweep_idle(now);
            }
        }
    }
}
