//! Fabric Dataplane - Transport Layer
//!
//! Adapts physical transports to the uniform payload connection contract the
//! circuit forwarder consumes:
//!
//! - **Payload contract**: [`PayloadConnection`], [`Payload`], [`Headers`]
//! - **Datagram sockets**: [`PacketSocket`] over UDP or unix datagram sockets,
//!   with peers named by [`PeerAddr`]
//! - **Stream adapter**: [`StreamConnection`] over TCP, unix or any other
//!   byte stream
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Circuit Forwarder              │
//! ├─────────────────────────────────────────┤
//! │        PayloadConnection                │  ← This module
//! ├────────────────────┬────────────────────┤
//! │  Packet sessions   │  StreamConnection  │
//! ├────────────────────┼────────────────────┤
//! │  UDP / unixgram    │  TCP / unix        │
//! └────────────────────┴────────────────────┘
//! ```

mod connection;
mod error;
mod socket;
mod stream;

pub use connection::*;
pub use error::*;
pub use socket::*;
pub use stream::*;
