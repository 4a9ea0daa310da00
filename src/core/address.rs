//! Packet transport addresses.
//!
//! A packet address names the datagram network and the endpoint to bind or
//! send to. Its string form is `<network>:<address>`:
//!
//! ```text
//! udp:239.1.2.3:9999
//! udp6:[::1]:9999
//! unixgram:/tmp/sock.sock
//! ```
//!
//! Only the first `:` separates the network token; the remainder is kept
//! verbatim so IPv6 literals and paths containing colons survive a
//! parse/format cycle unchanged.

use std::fmt;
use std::str::FromStr;

use super::constants::{NETWORK_UDP, NETWORK_UDP4, NETWORK_UDP6, NETWORK_UNIXGRAM};
use super::error::AddressError;

/// Datagram network kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketNetwork {
    /// Dual-stack UDP.
    Udp,
    /// IPv4-only UDP.
    Udp4,
    /// IPv6-only UDP.
    Udp6,
    /// Unix domain datagram socket.
    Unixgram,
}

impl PacketNetwork {
    /// Every supported network.
    pub const ALL: [PacketNetwork; 4] = [Self::Udp, Self::Udp4, Self::Udp6, Self::Unixgram];

    /// Parse a network token. Tokens are case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            NETWORK_UDP => Some(Self::Udp),
            NETWORK_UDP4 => Some(Self::Udp4),
            NETWORK_UDP6 => Some(Self::Udp6),
            NETWORK_UNIXGRAM => Some(Self::Unixgram),
            _ => None,
        }
    }

    /// The wire token for this network.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp => NETWORK_UDP,
            Self::Udp4 => NETWORK_UDP4,
            Self::Udp6 => NETWORK_UDP6,
            Self::Unixgram => NETWORK_UNIXGRAM,
        }
    }

    /// Whether this is a unix domain network.
    pub fn is_unix(self) -> bool {
        self == Self::Unixgram
    }
}

impl fmt::Display for PacketNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `<network>:<address>` endpoint identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PacketAddress {
    network: PacketNetwork,
    address: String,
}

impl PacketAddress {
    /// Create an address from its parts.
    pub fn new(network: PacketNetwork, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
        }
    }

    /// Parse the wire string form.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let Some((token, address)) = s.split_once(':') else {
            return Err(AddressError::InvalidFormat(s.to_string()));
        };

        let network = PacketNetwork::from_token(token)
            .ok_or_else(|| AddressError::UnsupportedNetwork(token.to_string()))?;

        Ok(Self::new(network, address))
    }

    /// Get the network kind.
    pub fn network(&self) -> PacketNetwork {
        self.network
    }

    /// Get the network-specific address part.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for PacketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.address)
    }
}

impl FromStr for PacketAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for PacketAddress {
    type Error = AddressError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl Default for PacketAddress {
    fn default() -> Self {
        Self::new(PacketNetwork::Udp, "0.0.0.0:0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_networks() {
        for (input, network, address) in [
            ("udp:239.1.2.3:9999", PacketNetwork::Udp, "239.1.2.3:9999"),
            ("udp4:127.0.0.1:0", PacketNetwork::Udp4, "127.0.0.1:0"),
            ("udp6:[::1]:9999", PacketNetwork::Udp6, "[::1]:9999"),
            ("unixgram:/tmp/sock.sock", PacketNetwork::Unixgram, "/tmp/sock.sock"),
        ] {
            let parsed = PacketAddress::parse(input).unwrap();
            assert_eq!(parsed.network(), network);
            assert_eq!(parsed.address(), address);
            assert_eq!(parsed.to_string(), input);
        }
    }

    #[test]
    fn test_embedded_colons_preserved() {
        let addr: PacketAddress = "udp6:[fe80::1:2:3]:4000".parse().unwrap();
        assert_eq!(addr.address(), "[fe80::1:2:3]:4000");
        assert_eq!(addr.to_string(), "udp6:[fe80::1:2:3]:4000");

        let addr: PacketAddress = "unixgram:/var/run/a:b.sock".parse().unwrap();
        assert_eq!(addr.address(), "/var/run/a:b.sock");
        assert_eq!(addr.to_string(), "unixgram:/var/run/a:b.sock");
    }

    #[test]
    fn test_unsupported_network() {
        assert_eq!(
            PacketAddress::parse("ftp:host"),
            Err(AddressError::UnsupportedNetwork("ftp".into()))
        );
        // Tokens are case-sensitive.
        assert!(matches!(
            PacketAddress::parse("UDP:127.0.0.1:1"),
            Err(AddressError::UnsupportedNetwork(_))
        ));
        assert!(matches!(
            PacketAddress::parse("tcp:127.0.0.1:1"),
            Err(AddressError::UnsupportedNetwork(_))
        ));
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            PacketAddress::parse("udp"),
            Err(AddressError::InvalidFormat("udp".into()))
        );
        assert!(matches!(
            PacketAddress::parse(""),
            Err(AddressError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_network_tokens() {
        for network in PacketNetwork::ALL {
            assert_eq!(PacketNetwork::from_token(network.as_str()), Some(network));
        }
        assert!(PacketNetwork::Unixgram.is_unix());
        assert!(!PacketNetwork::Udp6.is_unix());
    }

    #[test]
    fn test_default_address() {
        let addr = PacketAddress::default();
        assert_eq!(addr.to_string(), "udp:0.0.0.0:0");
    }
}
