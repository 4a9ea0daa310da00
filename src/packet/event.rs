//! Session table events.
//!
//! Every mutation of a listener's session table is expressed as a
//! [`SessionEvent`] and applied, one at a time and in submission order, by
//! the listener's event loop. Readers may look sessions up concurrently;
//! only the loop writes.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::handshake::{self, ConnectResponse};
use super::listener::ListenerShared;
use super::session::{PacketSession, SessionState};
use crate::core::RESPONSE_TIMEOUT_MESSAGE;
use crate::transport::PeerAddr;

/// A unit of serialized session table work.
#[derive(Debug)]
pub enum SessionEvent {
    /// First datagram from a peer with no session. Creates the session and
    /// starts the connect handshake with `request`; if a session appeared in
    /// the meantime, `request` is delivered to it as a payload instead.
    Create {
        /// Peer address.
        peer: PeerAddr,
        /// The datagram that triggered creation.
        request: Bytes,
    },

    /// Move a session to [`SessionState::Established`].
    Establish {
        /// Session ID.
        session_id: String,
    },

    /// Reset a session's idle clock.
    Touch {
        /// The session.
        session: Arc<PacketSession>,
    },

    /// Remove a session by ID. No-op if absent.
    Delete {
        /// Session ID.
        session_id: String,
    },

    /// Remove this session instance, if it is still in the table.
    Close {
        /// The session.
        session: Arc<PacketSession>,
    },

    /// Remove this session instance if it is still idle as of `now`.
    Expire {
        /// The session.
        session: Arc<PacketSession>,
        /// Time of the sweep that found it idle.
        now: Instant,
    },

    /// Outcome of a connect handshake, to be applied and sent to the peer.
    Respond {
        /// The session the handshake ran for.
        session: Arc<PacketSession>,
        /// The handler's response.
        response: ConnectResponse,
    },

    /// Signals once every event queued before it has been applied.
    Flush(oneshot::Sender<()>),
}

impl SessionEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Create { .. } => "create",
            SessionEvent::Establish { .. } => "establish",
            SessionEvent::Touch { .. } => "touch",
            SessionEvent::Delete { .. } => "delete",
            SessionEvent::Close { .. } => "close",
            SessionEvent::Expire { .. } => "expire",
            SessionEvent::Respond { .. } => "respond",
            SessionEvent::Flush(_) => "flush",
        }
    }

    /// Apply this event to the listener. Only the event loop calls this.
    pub(crate) async fn apply(self, listener: &Arc<ListenerShared>) {
        let ctx = listener.log_context();

        match self {
            SessionEvent::Create { peer, request } => {
                let session_id = peer.to_string();
                if let Some(existing) = listener.get_session(&session_id) {
                    debug!(listener = %ctx, session = %session_id, "session already present, forwarding data");
                    existing.mark_activity();
                    existing.queue_read(request);
                    return;
                }

                let max_sessions = listener.config().max_sessions;
                if max_sessions > 0 && listener.session_count() >= max_sessions {
                    warn!(listener = %ctx, session = %session_id, max_sessions, "session limit reached, dropping datagram");
                    return;
                }

                let session = PacketSession::new(
                    peer,
                    listener.config().session_timeout,
                    listener.config().max_pending_reads,
                    Arc::downgrade(listener),
                );
                listener.insert_session(Arc::clone(&session));
                debug!(listener = %ctx, session = %session_id, "no session present, authenticating");

                tokio::spawn(handshake::authenticate(
                    listener.connect_handler(),
                    session,
                    request,
                    listener.config().handshake_timeout,
                ));
            }

            SessionEvent::Establish { session_id } => match listener.get_session(&session_id) {
                Some(session) => {
                    if session.set_state(SessionState::Established) {
                        debug!(listener = %ctx, session = %session_id, "session established");
                    }
                }
                None => debug!(listener = %ctx, session = %session_id, "cannot establish missing session"),
            },

            SessionEvent::Touch { session } => session.mark_activity(),

            SessionEvent::Delete { session_id } => {
                if listener.delete_session(&session_id) {
                    debug!(listener = %ctx, session = %session_id, "session deleted");
                }
            }

            SessionEvent::Close { session } => {
                if listener.remove_session(&session) {
                    debug!(listener = %ctx, session = %session.session_id(), "session closed");
                }
            }

            SessionEvent::Expire { session, now } => {
                if !session.is_idle_at(now) {
                    return;
                }
                if listener.remove_session(&session) {
                    debug!(
                        listener = %ctx,
                        session = %session.session_id(),
                        idle_ms = session.idle_time_at(now).as_millis() as u64,
                        "idle session reaped"
                    );
                }
            }

            SessionEvent::Respond { session, response } => {
                let session_id = session.session_id().to_string();
                let reply = if !listener.contains_session(&session) {
                    debug!(listener = %ctx, session = %session_id, "session not found for response");
                    ConnectResponse::failure(RESPONSE_TIMEOUT_MESSAGE)
                } else if response.success {
                    debug!(listener = %ctx, session = %session_id, "session found for success response, marking established");
                    session.set_state(SessionState::Established);
                    session.mark_activity();
                    response
                } else {
                    debug!(listener = %ctx, session = %session_id, "session found for failure response, removing session");
                    listener.remove_session(&session);
                    response
                };

                match reply.to_line() {
                    Ok(line) => {
                        if let Err(e) = listener.write_to(&line, session.address()).await {
                            warn!(listener = %ctx, session = %session_id, error = %e, "failure sending response");
                        }
                    }
                    Err(e) => warn!(listener = %ctx, session = %session_id, error = %e, "failure encoding response"),
                }
            }

            SessionEvent::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
