//! Dataplane constants.
//!
//! Defaults for the datagram session multiplexer and the stream adapter.

use std::time::Duration;

// =============================================================================
// PACKET ADDRESS NETWORKS
// =============================================================================

/// Network token for dual-stack UDP.
pub const NETWORK_UDP: &str = "udp";

/// Network token for IPv4-only UDP.
pub const NETWORK_UDP4: &str = "udp4";

/// Network token for IPv6-only UDP.
pub const NETWORK_UDP6: &str = "udp6";

/// Network token for unix datagram sockets.
pub const NETWORK_UNIXGRAM: &str = "unixgram";

// =============================================================================
// FRAME SIZES
// =============================================================================

/// Largest datagram the listener will receive in one read.
pub const MAX_PACKET_SIZE: usize = 65535;

/// Upper bound on a single stream adapter read (10 KiB).
pub const MAX_STREAM_FRAME_SIZE: usize = 10 * 1024;

/// Datagrams buffered per session before new ones are dropped.
pub const DEFAULT_MAX_PENDING_READS: usize = 10;

// =============================================================================
// SESSION TIMING
// =============================================================================

/// Idle time after which a datagram session is reaped.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Period of the idle-session sweep.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Time the connect handler is given to answer a new peer.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// HANDSHAKE MESSAGES
// =============================================================================

/// Failure message sent when a session vanished before its response was ready.
pub const RESPONSE_TIMEOUT_MESSAGE: &str = "timeout";

/// Failure message sent when the first datagram is not a connect request.
pub const RESPONSE_INVALID_REQUEST_MESSAGE: &str = "invalid request";
