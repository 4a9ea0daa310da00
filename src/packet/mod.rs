//! Fabric Dataplane - Packet Sessions
//!
//! Turns one datagram socket into many logical connections, one per remote
//! peer address:
//!
//! - **Listener**: [`PacketListener`] owns the socket and the session table
//! - **Sessions**: [`PacketSession`] implements
//!   [`PayloadConnection`](crate::transport::PayloadConnection)
//! - **Events**: [`SessionEvent`] serializes every table mutation
//! - **Handshake**: [`ConnectHandler`] admits or rejects new peers
//!
//! # Session lifecycle
//!
//! ```text
//!   first datagram        handler accepts
//!  ───────────────▶ New ─────────────────▶ Established
//!                    │                        │
//!                    │ rejected / closed /    │ closed / idle past
//!                    │ idle past timeout      │ timeout / deleted
//!                    ▼                        ▼
//!                 removed                  removed
//! ```

mod event;
mod handshake;
mod listener;
mod session;

pub use event::*;
pub use handshake::*;
pub use listener::*;
pub use session::*;
