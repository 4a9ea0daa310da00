//! Async datagram socket for packet listeners.
//!
//! [`PacketSocket`] hides whether the listener is bound to a UDP socket or a
//! unix datagram socket. Peers are identified by [`PeerAddr`], the
//! transport-native address that also serves as the session classification
//! key.

use std::fmt;
use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;

use tokio::net::UdpSocket;
#[cfg(unix)]
use tokio::net::UnixDatagram;
#[cfg(unix)]
use tracing::debug;

use super::error::{TransportError, TransportResult};
use crate::core::{PacketAddress, PacketNetwork};

/// Transport-native address of a datagram peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerAddr {
    /// UDP peer.
    Inet(SocketAddr),
    /// Named unix datagram peer.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl PeerAddr {
    /// Get the socket address of a UDP peer.
    pub fn as_inet(&self) -> Option<SocketAddr> {
        match self {
            PeerAddr::Inet(addr) => Some(*addr),
            #[cfg(unix)]
            PeerAddr::Unix(_) => None,
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Inet(addr) => write!(f, "{}", addr),
            #[cfg(unix)]
            PeerAddr::Unix(path) => f.write_str(&path.to_string_lossy()),
        }
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        PeerAddr::Inet(addr)
    }
}

#[cfg(unix)]
impl From<PathBuf> for PeerAddr {
    fn from(path: PathBuf) -> Self {
        PeerAddr::Unix(path)
    }
}

#[derive(Debug)]
enum SocketKind {
    Udp(UdpSocket),
    #[cfg(unix)]
    Unix(UnixDatagram),
}

/// Datagram socket bound from a [`PacketAddress`].
///
/// Safe for concurrent sends; a single reader task owns receives.
#[derive(Debug)]
pub struct PacketSocket {
    inner: SocketKind,
    network: PacketNetwork,
}

impl PacketSocket {
    /// Bind a socket for the given packet address.
    ///
    /// For the UDP networks an address with an empty host (`":9999"`) binds
    /// the wildcard address; `udp4`/`udp6` only accept resolved addresses of
    /// their own family.
    pub async fn bind(addr: &PacketAddress) -> io::Result<Self> {
        let inner = match addr.network() {
            PacketNetwork::Unixgram => bind_unix(addr.address())?,
            network => SocketKind::Udp(bind_udp(network, addr.address()).await?),
        };

        Ok(Self {
            inner,
            network: addr.network(),
        })
    }

    /// Wrap an existing UDP socket.
    pub fn from_udp(socket: UdpSocket) -> Self {
        Self {
            inner: SocketKind::Udp(socket),
            network: PacketNetwork::Udp,
        }
    }

    /// Wrap an existing unix datagram socket.
    #[cfg(unix)]
    pub fn from_unix(socket: UnixDatagram) -> Self {
        Self {
            inner: SocketKind::Unix(socket),
            network: PacketNetwork::Unixgram,
        }
    }

    /// Get the network this socket was bound for.
    pub fn network(&self) -> PacketNetwork {
        self.network
    }

    /// Get the local address.
    ///
    /// An unnamed unix socket has no local address and reports `NotFound`.
    pub fn local_addr(&self) -> io::Result<PeerAddr> {
        match &self.inner {
            SocketKind::Udp(socket) => socket.local_addr().map(PeerAddr::Inet),
            #[cfg(unix)]
            SocketKind::Unix(socket) => socket
                .local_addr()?
                .as_pathname()
                .map(|path| PeerAddr::Unix(path.to_path_buf()))
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unnamed unix socket")),
        }
    }

    /// Send one datagram to a peer.
    pub async fn send_to(&self, data: &[u8], peer: &PeerAddr) -> TransportResult<usize> {
        match (&self.inner, peer) {
            (SocketKind::Udp(socket), PeerAddr::Inet(addr)) => {
                socket.send_to(data, *addr).await.map_err(TransportError::Write)
            }
            #[cfg(unix)]
            (SocketKind::Unix(socket), PeerAddr::Unix(path)) => {
                socket.send_to(data, path).await.map_err(TransportError::Write)
            }
            #[cfg(unix)]
            _ => Err(TransportError::AddressMismatch {
                peer: peer.to_string(),
                socket: self.network.as_str(),
            }),
        }
    }

    /// Receive one datagram.
    ///
    /// The peer is `None` when the sender is an unnamed unix socket, which
    /// cannot be replied to, or is bound to a path that is not valid UTF-8.
    /// Such paths have no unique string form to key a session by.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<PeerAddr>)> {
        match &self.inner {
            SocketKind::Udp(socket) => {
                let (len, addr) = socket.recv_from(buf).await?;
                Ok((len, Some(PeerAddr::Inet(addr))))
            }
            #[cfg(unix)]
            SocketKind::Unix(socket) => {
                let (len, addr) = socket.recv_from(buf).await?;
                let peer = match addr.as_pathname() {
                    Some(path) if path.to_str().is_some() => Some(PeerAddr::Unix(path.to_path_buf())),
                    Some(path) => {
                        debug!(peer = %path.to_string_lossy(), "unix peer path is not UTF-8");
                        None
                    }
                    None => None,
                };
                Ok((len, peer))
            }
        }
    }
}

async fn bind_udp(network: PacketNetwork, address: &str) -> io::Result<UdpSocket> {
    let address = if address.starts_with(':') {
        match network {
            PacketNetwork::Udp6 => format!("[::]{}", address),
            _ => format!("0.0.0.0{}", address),
        }
    } else {
        address.to_string()
    };

    let mut last_err = None;
    for candidate in tokio::net::lookup_host(address.as_str()).await? {
        let family_ok = match network {
            PacketNetwork::Udp4 => candidate.is_ipv4(),
            PacketNetwork::Udp6 => candidate.is_ipv6(),
            _ => true,
        };
        if !family_ok {
            continue;
        }

        match UdpSocket::bind(candidate).await {
            Ok(socket) => return Ok(socket),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {} address found for {}", network, address),
        )
    }))
}

#[cfg(unix)]
fn bind_unix(path: &str) -> io::Result<SocketKind> {
    UnixDatagram::bind(path).map(SocketKind::Unix)
}

#[cfg(not(unix))]
fn bind_unix(_path: &str) -> io::Result<SocketKind> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix datagram sockets are not supported on this platform",
    ))
}
