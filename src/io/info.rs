//! Endpoint and channel introspection.

use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier of a channel within a node.
///
/// Identifiers are never reused during the lifetime of a process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelId(u64);

impl ChannelId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Configuration identity of an endpoint.
///
/// Two endpoints with equal [`EndpointInfo`] are considered duplicates and
/// rejected at node construction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EndpointInfo {
    /// TCP server.
    TcpServer {
        /// Listen address.
        bind_addr: SocketAddr,
    },
    /// TCP client.
    TcpClient {
        /// Server address.
        remote_addr: SocketAddr,
    },
    /// UDP server.
    UdpServer {
        /// Listen address.
        bind_addr: SocketAddr,
    },
    /// UDP client.
    UdpClient {
        /// Server address.
        remote_addr: SocketAddr,
    },
    /// UDP broadcast link.
    UdpBroadcast {
        /// Address datagrams are broadcast to.
        broadcast_addr: SocketAddr,
        /// Local address datagrams are received on.
        bind_addr: SocketAddr,
    },
    /// Serial port.
    Serial {
        /// Port path.
        path: String,
        /// Baud rate.
        baud_rate: u32,
    },
    /// Application-provided byte stream.
    Custom {
        /// Name of the custom endpoint.
        name: String,
    },
}

/// Details of a channel within a particular endpoint.
///
/// An endpoint may produce several channels: a TCP server spawns one per
/// accepted connection, a UDP server one per observed remote.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelDetails {
    /// Connection accepted by a TCP server.
    TcpServer {
        /// Server address.
        server_addr: SocketAddr,
        /// Peer address.
        peer_addr: SocketAddr,
    },
    /// Connection dialed by a TCP client.
    TcpClient {
        /// Server address.
        remote_addr: SocketAddr,
    },
    /// Remote observed by a UDP server.
    UdpServer {
        /// Server address.
        server_addr: SocketAddr,
        /// Peer address.
        peer_addr: SocketAddr,
    },
    /// Connected UDP client socket.
    UdpClient {
        /// Server address.
        remote_addr: SocketAddr,
        /// Local bind address.
        bind_addr: SocketAddr,
    },
    /// UDP broadcast link.
    UdpBroadcast {
        /// Address datagrams are broadcast to.
        broadcast_addr: SocketAddr,
        /// Local address datagrams are received on.
        bind_addr: SocketAddr,
    },
    /// Serial port.
    Serial {
        /// Port path.
        path: String,
        /// Baud rate.
        baud_rate: u32,
    },
    /// Application-provided byte stream.
    Custom {
        /// Name of the custom endpoint.
        name: String,
    },
}

/// Identity of a single channel.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelInfo {
    id: ChannelId,
    details: ChannelDetails,
}

impl ChannelInfo {
    pub(crate) fn new(details: ChannelDetails) -> Self {
        Self {
            id: ChannelId::next(),
            details,
        }
    }

    /// Channel `ID`.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Transport-level details of this channel.
    pub fn details(&self) -> &ChannelDetails {
        &self.details
    }
}

impl Debug for ChannelInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ", self.id.0)?;
        self.details.fmt(f)
    }
}
