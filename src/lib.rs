//! # Fabric Dataplane
//!
//! Transport adaptation for an overlay network fabric. Every physical
//! transport a fabric router terminates is adapted to one contract, the
//! [`PayloadConnection`](transport::PayloadConnection), which the circuit
//! forwarder reads payloads from and writes payloads to.
//!
//! - **Datagram sessions**: one UDP or unix datagram socket is demultiplexed
//!   into a logical connection per remote peer, with idle expiry
//! - **Byte streams**: TCP and unix stream sockets are adapted with bounded
//!   reads
//! - **Addressing**: transport endpoints are written as `network:address`
//!
//! ## Feature Flags
//!
//! - `transport` (default): Payload contract, datagram sockets, stream adapter
//! - `packet` (default): Datagram session listener and connect handshake
//!
//! ## Modules
//!
//! - [`core`]: Address codec, constants, and error types (always included)
//! - [`transport`]: Transport layer (requires `transport` feature)
//! - [`packet`]: Datagram session multiplexer (requires `packet` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use fabric_dataplane::prelude::*;
//!
//! let addr: PacketAddress = "udp:0.0.0.0:9999".parse().unwrap();
//! assert_eq!(addr.network(), PacketNetwork::Udp);
//! assert_eq!(addr.address(), "0.0.0.0:9999");
//! assert_eq!(addr.to_string(), "udp:0.0.0.0:9999");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Packet sessions (feature-gated)
#[cfg(feature = "packet")]
#[cfg_attr(docsrs, doc(cfg(feature = "packet")))]
pub mod packet;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Headers, PacketSocket, Payload, PayloadConnection, PeerAddr, StreamConnection,
        TransportError, TransportResult,
    };

    #[cfg(feature = "packet")]
    pub use crate::packet::{
        ConnectHandler, ConnectRequest, ConnectResponse, ListenerConfig, ListenerConfigBuilder,
        ListenerError, PacketListener, PacketSession, SessionEvent, SessionState,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{AddressError, DataplaneError, PacketAddress, PacketNetwork};

#[cfg(feature = "transport")]
pub use transport::{Payload, PayloadConnection, PeerAddr, StreamConnection, TransportError};

#[cfg(feature = "packet")]
pub use packet::{ListenerConfig, PacketListener, PacketSession, SessionEvent};
