//! # Built-in transports
//!
//! Every transport is an [`Endpoint`](crate::io::Endpoint) implementation:
//! a configuration object the node consumes at construction.
//!
//! * TCP: [`TcpServer`], [`TcpClient`]
//! * UDP: [`UdpServer`], [`UdpClient`], [`UdpBroadcast`]
//! * Serial port: [`Serial`]
//! * Application-provided streams: [`Custom`]

mod custom;
mod serial;
mod tcp;
mod udp;

pub use custom::Custom;
pub use serial::Serial;
pub use tcp::{TcpClient, TcpServer};
pub use udp::{UdpBroadcast, UdpClient, UdpServer};

use std::net::{SocketAddr, ToSocketAddrs};

use crate::prelude::*;

/// Resolves an address, preferring IPv4 when several are available.
pub(crate) fn resolve_socket_addr(addr: impl ToSocketAddrs) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "cannot resolve address").into()
        })
}
