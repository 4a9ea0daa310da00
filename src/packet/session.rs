//! Datagram session state.
//!
//! A [`PacketSession`] is the pseudo-connection synthesized for one peer of
//! a packet listener. It is owned by the listener's session table; the
//! session only keeps a weak back-reference to the listener, used to queue
//! events and to write through the shared socket.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::event::SessionEvent;
use super::listener::ListenerShared;
use crate::transport::{Headers, Payload, PayloadConnection, PeerAddr, TransportError, TransportResult};

/// Session lifecycle state.
///
/// Transitions only move forward. A session removed from its listener's
/// table is gone; there is no closed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Created, connect request not yet answered.
    New = 0,
    /// Connect request accepted; payloads flow.
    Established = 1,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::New,
            _ => SessionState::Established,
        }
    }
}

/// Payloads handed off from the socket reader to the session consumer.
#[derive(Debug)]
struct ReadQueue {
    items: VecDeque<Bytes>,
    capacity: usize,
    released: bool,
}

/// Per-peer logical connection over a datagram socket.
pub struct PacketSession {
    /// Table key, the peer address in string form.
    id: String,
    peer: PeerAddr,
    state: AtomicU8,

    /// Idle threshold, fixed at creation.
    timeout: Duration,
    /// Reference point for `last_activity_nanos`.
    epoch: Instant,
    last_activity_nanos: AtomicU64,

    pending: Mutex<ReadQueue>,
    readable: Notify,
    /// Set once a close has been requested or the session was removed.
    closed: AtomicBool,

    me: Weak<PacketSession>,
    listener: Weak<ListenerShared>,
}

impl PacketSession {
    pub(crate) fn new(
        peer: PeerAddr,
        timeout: Duration,
        max_pending_reads: usize,
        listener: Weak<ListenerShared>,
    ) -> Arc<Self> {
        let now = Instant::now();
        Arc::new_cyclic(|me| Self {
            id: peer.to_string(),
            peer,
            state: AtomicU8::new(SessionState::New as u8),
            timeout,
            epoch: now,
            last_activity_nanos: AtomicU64::new(0),
            pending: Mutex::new(ReadQueue {
                items: VecDeque::with_capacity(max_pending_reads),
                capacity: max_pending_reads,
                released: false,
            }),
            readable: Notify::new(),
            closed: AtomicBool::new(false),
            me: me.clone(),
            listener,
        })
    }

    /// Stable identifier used as the table key.
    pub fn session_id(&self) -> &str {
        &self.id
    }

    /// Peer address, the classification key of this session.
    pub fn address(&self) -> &PeerAddr {
        &self.peer
    }

    /// Get the session state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Set the session state.
    ///
    /// Regressions are ignored: once `Established`, a session stays
    /// established. Returns `true` if the state changed.
    pub fn set_state(&self, state: SessionState) -> bool {
        let previous = self.state.fetch_max(state as u8, Ordering::AcqRel);
        if previous > state as u8 {
            debug!(session = %self.id, ?state, "ignoring session state regression");
        }
        previous < state as u8
    }

    /// Check if the session is established.
    pub fn is_established(&self) -> bool {
        self.state() == SessionState::Established
    }

    /// Idle timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Idle timeout in nanoseconds.
    pub fn timeout_nanos(&self) -> i64 {
        i64::try_from(self.timeout.as_nanos()).unwrap_or(i64::MAX)
    }

    /// Reset the idle clock to now.
    pub fn mark_activity(&self) {
        let nanos = Instant::now().saturating_duration_since(self.epoch).as_nanos();
        self.last_activity_nanos
            .store(u64::try_from(nanos).unwrap_or(u64::MAX), Ordering::Release);
    }

    /// When the session last saw traffic.
    pub fn last_activity(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last_activity_nanos.load(Ordering::Acquire))
    }

    /// Time since last activity, as of `now`.
    pub fn idle_time_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    /// Whether the idle time as of `now` exceeds the timeout.
    pub fn is_idle_at(&self, now: Instant) -> bool {
        self.idle_time_at(now) > self.timeout
    }

    /// Buffer a payload for the next read.
    ///
    /// Entries are delivered in the order they were queued. Payloads queued
    /// after the session was released, or while the queue is full, are
    /// dropped; this never blocks. Returns `true` if the payload was queued.
    pub fn queue_read(&self, data: Bytes) -> bool {
        {
            let mut queue = self.pending.lock();
            if queue.released {
                debug!(session = %self.id, len = data.len(), "dropping payload for released session");
                return false;
            }
            if queue.items.len() >= queue.capacity {
                warn!(session = %self.id, len = data.len(), capacity = queue.capacity, "read queue full, dropping payload");
                return false;
            }
            queue.items.push_back(data);
        }
        self.readable.notify_one();
        true
    }

    /// Number of payloads waiting to be read.
    pub fn pending_reads(&self) -> usize {
        self.pending.lock().items.len()
    }

    /// Read the next datagram for this session.
    ///
    /// Queued payloads are drained first. Returns
    /// [`TransportError::ConnectionClosed`] once the session has been removed.
    pub async fn read(&self) -> TransportResult<Bytes> {
        loop {
            {
                let mut queue = self.pending.lock();
                if queue.released {
                    return Err(TransportError::ConnectionClosed);
                }
                if let Some(data) = queue.items.pop_front() {
                    drop(queue);
                    self.mark_activity();
                    return Ok(data);
                }
            }
            self.readable.notified().await;
        }
    }

    /// Write one datagram to the peer.
    ///
    /// The activity update is queued to the listener. A failed write closes
    /// the session.
    pub async fn write(&self, data: &[u8]) -> TransportResult<usize> {
        let listener = self.listener.upgrade().ok_or(TransportError::ListenerClosed)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }

        if let Some(me) = self.me.upgrade() {
            listener.queue_event(SessionEvent::Touch { session: me });
        }

        match listener.write_to(data, &self.peer).await {
            Ok(n) => Ok(n),
            Err(e) => {
                debug!(session = %self.id, error = %e, "write failed, closing session");
                if e.is_fatal() {
                    self.request_close();
                }
                Err(e)
            }
        }
    }

    /// Request removal of this session from its listener.
    ///
    /// Idempotent: closing an already closed session returns `Ok(())`
    /// without queuing another removal.
    pub fn close(&self) -> TransportResult<()> {
        self.request_close();
        Ok(())
    }

    fn request_close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        match (self.me.upgrade(), self.listener.upgrade()) {
            (Some(me), Some(listener)) => listener.queue_event(SessionEvent::Close { session: me }),
            _ => self.release(),
        }
    }

    /// Whether a close was requested or the session was removed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn listener(&self) -> Option<Arc<ListenerShared>> {
        self.listener.upgrade()
    }

    /// Drop buffered payloads and wake blocked readers with EOF.
    ///
    /// Called when the session leaves the table.
    pub(crate) fn release(&self) {
        self.closed.store(true, Ordering::Release);
        {
            let mut queue = self.pending.lock();
            queue.released = true;
            queue.items.clear();
        }
        self.readable.notify_waiters();
        self.readable.notify_one();
    }
}

impl fmt::Debug for PacketSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl PayloadConnection for PacketSession {
    /// One datagram per read; datagrams carry no headers.
    async fn read_payload(&self) -> TransportResult<Payload> {
        self.read().await.map(Payload::new)
    }

    /// Headers are ignored: the datagram wire format has no header framing.
    async fn write_payload(&self, data: &[u8], _headers: &Headers) -> TransportResult<usize> {
        self.write(data).await
    }

    fn log_context(&self) -> String {
        self.id.clone()
    }

    async fn close(&self) -> TransportResult<()> {
        PacketSession::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn detached_session(timeout: Duration) -> Arc<PacketSession> {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        PacketSession::new(PeerAddr::Inet(peer), timeout, 10, Weak::new())
    }

    #[test]
    fn test_new_session_state() {
        let session = detached_session(Duration::from_secs(1));
        assert_eq!(session.state(), SessionState::New);
        assert_eq!(session.session_id(), "127.0.0.1:4000");
        assert_eq!(session.address().to_string(), "127.0.0.1:4000");
        assert!(!session.is_closed());
    }

    #[test]
    fn test_state_never_regresses() {
        let session = detached_session(Duration::from_secs(1));
        assert!(session.set_state(SessionState::Established));
        assert!(session.is_established());

        assert!(!session.set_state(SessionState::New));
        assert_eq!(session.state(), SessionState::Established);

        // Re-establishing is a no-op.
        assert!(!session.set_state(SessionState::Established));
    }

    #[test]
    fn test_timeout_nanos() {
        let session = detached_session(Duration::from_secs(1));
        assert_eq!(session.timeout_nanos(), 1_000_000_000);
        assert_eq!(session.timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_idle_detection() {
        let session = detached_session(Duration::from_secs(1));
        session.mark_activity();
        let t0 = session.last_activity();

        assert!(!session.is_idle_at(t0 + Duration::from_millis(500)));
        assert!(session.is_idle_at(t0 + Duration::from_millis(1500)));
        // At the activity instant itself the idle time is zero.
        assert_eq!(session.idle_time_at(t0), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_queued_reads_in_order() {
        let session = detached_session(Duration::from_secs(60));
        session.queue_read(Bytes::from_static(b"D1"));
        session.queue_read(Bytes::from_static(b"D2"));
        assert_eq!(session.pending_reads(), 2);

        assert_eq!(session.read().await.unwrap(), Bytes::from_static(b"D1"));
        assert_eq!(session.read().await.unwrap(), Bytes::from_static(b"D2"));
        assert_eq!(session.pending_reads(), 0);
    }

    #[tokio::test]
    async fn test_read_queue_is_bounded() {
        let session = detached_session(Duration::from_secs(60));
        for i in 0..25u8 {
            let queued = session.queue_read(Bytes::from(vec![i]));
            assert_eq!(queued, i < 10);
        }
        assert_eq!(session.pending_reads(), 10);

        // The oldest ten survive, in arrival order.
        for i in 0..10u8 {
            assert_eq!(session.read().await.unwrap(), Bytes::from(vec![i]));
        }
        assert_eq!(session.pending_reads(), 0);

        // Draining frees room again.
        assert!(session.queue_read(Bytes::from_static(b"again")));
    }

    #[tokio::test]
    async fn test_read_waits_for_queue() {
        let session = detached_session(Duration::from_secs(60));
        let reader = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.read_payload().await })
        };

        tokio::task::yield_now().await;
        session.queue_read(Bytes::from_static(b"late"));

        let payload = reader.await.unwrap().unwrap();
        assert_eq!(&payload.data[..], b"late");
        assert!(payload.headers.is_empty());
    }

    #[tokio::test]
    async fn test_close_detached_releases() {
        let session = detached_session(Duration::from_secs(60));
        session.queue_read(Bytes::from_static(b"stale"));

        assert!(session.close().is_ok());
        assert!(session.close().is_ok());
        assert!(session.is_closed());

        let err = session.read().await.unwrap_err();
        assert!(err.is_eof());

        // Nothing is buffered after release.
        session.queue_read(Bytes::from_static(b"dropped"));
        assert_eq!(session.pending_reads(), 0);
    }

    #[tokio::test]
    async fn test_release_wakes_blocked_reader() {
        let session = detached_session(Duration::from_secs(60));
        let reader = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.read().await })
        };

        tokio::task::yield_now().await;
        session.release();

        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_write_without_listener() {
        let session = detached_session(Duration::from_secs(60));
        let err = session.write(b"x").await.unwrap_err();
        assert!(matches!(err, TransportError::ListenerClosed));
    }
}
