//! UDP transports.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use crate::consts::{CHANNEL_POLL_INTERVAL, READ_BUFFER_SIZE};
use crate::io::endpoint::{backoff_sleep, supervise_channel, Backoff};
use crate::io::transport::resolve_socket_addr;
use crate::io::{ChannelDetails, ChannelFactory, Endpoint, EndpointHandler, EndpointInfo};
use crate::utils::{Closable, Closer, MpscReader, MpscWriter};

use crate::prelude::*;

/// UDP server endpoint.
///
/// A single socket; a channel is created per distinct remote
/// `(address, port)` observed. Channels of remotes that stay silent longer
/// than the node's idle connection timeout are evicted with a
/// `ChannelClose` event.
#[derive(Clone, Debug)]
pub struct UdpServer {
    addr: SocketAddr,
    info: EndpointInfo,
}

impl UdpServer {
    /// Configures a UDP server.
    pub fn new(addr: impl ToSocketAddrs) -> Result<Self> {
        let addr = resolve_socket_addr(addr)?;
        Ok(Self {
            addr,
            info: EndpointInfo::UdpServer { bind_addr: addr },
        })
    }
}

struct UdpPeer {
    bytes: mpsc::Sender<Vec<u8>>,
    last_seen: Instant,
    channel: Closable,
}

impl Endpoint for UdpServer {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn open(self: Box<Self>, factory: ChannelFactory) -> Result<EndpointHandler> {
        let server_addr = self.addr;
        let socket = UdpSocket::bind(server_addr)?;
        socket.set_read_timeout(Some(CHANNEL_POLL_INTERVAL))?;

        let state = Closer::new();
        let endpoint_state = state.to_closable();
        let info = self.info.clone();

        thread::spawn(move || {
            let mut peers: HashMap<SocketAddr, UdpPeer> = HashMap::new();
            let mut buf = [0u8; READ_BUFFER_SIZE];
            let idle_timeout = factory.idle_timeout();

            loop {
                if endpoint_state.is_closed() || factory.is_closed() {
                    break;
                }

                match socket.recv_from(&mut buf) {
                    Ok((len, peer_addr)) => {
                        if !peers.contains_key(&peer_addr) {
                            match spawn_peer(&factory, &socket, server_addr, peer_addr, &info) {
                                Some(peer) => {
                                    peers.insert(peer_addr, peer);
                                }
                                None => continue,
                            }
                        }

                        let peer = peers.get_mut(&peer_addr).unwrap();
                        peer.last_seen = Instant::now();
                        if peer.bytes.send(buf[..len].to_vec()).is_err() {
                            peers.remove(&peer_addr);
                        }
                    }
                    Err(err)
                        if matches!(
                            err.kind(),
                            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                        ) => {}
                    Err(err) => {
                        log::warn!("[{info:?}] socket failed: {err}");
                        break;
                    }
                }

                peers.retain(|peer_addr, peer| {
                    if peer.channel.is_closed() {
                        return false;
                    }
                    if peer.last_seen.elapsed() > idle_timeout {
                        log::debug!("[{info:?}] evicting idle remote {peer_addr}");
                        return false;
                    }
                    true
                });
            }
            // Dropping the peer map ends the byte pipes, which closes every
            // derived channel.
            log::debug!("[{info:?}] server stopped");
        });

        Ok(EndpointHandler::new(self.info, state))
    }
}

/// Builds the byte pipes and the send forwarder for a new remote.
fn spawn_peer(
    factory: &ChannelFactory,
    socket: &UdpSocket,
    server_addr: SocketAddr,
    peer_addr: SocketAddr,
    info: &EndpointInfo,
) -> Option<UdpPeer> {
    let socket = match socket.try_clone() {
        Ok(socket) => socket,
        Err(err) => {
            log::warn!("[{info:?}] cannot clone socket: {err}");
            return None;
        }
    };

    let (reader_tx, reader_rx) = mpsc::channel();
    let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>();

    let channel = factory.spawn(
        ChannelDetails::UdpServer {
            server_addr,
            peer_addr,
        },
        MpscReader::new(reader_rx),
        MpscWriter::new(writer_tx),
    );

    thread::spawn(move || {
        // Ends when the channel's write worker drops its pipe.
        for data in writer_rx {
            if let Err(err) = socket.send_to(&data, peer_addr) {
                log::trace!("send to {peer_addr} failed: {err}");
                break;
            }
        }
    });

    Some(UdpPeer {
        bytes: reader_tx,
        last_seen: Instant::now(),
        channel: channel.to_closable(),
    })
}

/// UDP client endpoint.
///
/// One channel bound to a connected UDP socket. The socket is re-created
/// with back-off if the channel dies (e.g. after a read-idle timeout).
#[derive(Clone, Debug)]
pub struct UdpClient {
    addr: SocketAddr,
    info: EndpointInfo,
}

impl UdpClient {
    /// Configures a UDP client.
    pub fn new(addr: impl ToSocketAddrs) -> Result<Self> {
        let addr = resolve_socket_addr(addr)?;
        Ok(Self {
            addr,
            info: EndpointInfo::UdpClient { remote_addr: addr },
        })
    }

    fn connect(remote_addr: SocketAddr) -> Result<UdpRw> {
        let local: SocketAddr = if remote_addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote_addr)?;
        socket.set_read_timeout(Some(CHANNEL_POLL_INTERVAL))?;
        Ok(UdpRw::connected(socket))
    }
}

impl Endpoint for UdpClient {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn open(self: Box<Self>, factory: ChannelFactory) -> Result<EndpointHandler> {
        let remote_addr = self.addr;
        let writer = Self::connect(remote_addr)?;

        let state = Closer::new();
        let endpoint_state = state.to_closable();
        let info = self.info.clone();

        thread::spawn(move || {
            let mut backoff = Backoff::new();
            let mut next_writer = Some(writer);

            loop {
                if endpoint_state.is_closed() || factory.is_closed() {
                    break;
                }

                let writer = match next_writer.take() {
                    Some(writer) => writer,
                    None => match Self::connect(remote_addr) {
                        Ok(writer) => {
                            backoff.reset();
                            writer
                        }
                        Err(err) => {
                            log::debug!("[{info:?}] reopen failed: {err}");
                            if !backoff_sleep(&endpoint_state, backoff.next()) {
                                break;
                            }
                            continue;
                        }
                    },
                };

                let (reader, bind_addr) = match (writer.try_clone(), writer.local_addr()) {
                    (Ok(reader), Ok(bind_addr)) => (reader, bind_addr),
                    _ => continue,
                };

                let channel = factory.spawn(
                    ChannelDetails::UdpClient {
                        remote_addr,
                        bind_addr,
                    },
                    reader,
                    writer,
                );
                if !supervise_channel(&endpoint_state, &channel.to_closable()) {
                    break;
                }
                if !backoff_sleep(&endpoint_state, backoff.next()) {
                    break;
                }
            }
            log::debug!("[{info:?}] client stopped");
        });

        Ok(EndpointHandler::new(self.info, state))
    }
}

/// UDP broadcast endpoint.
///
/// One channel writing to the broadcast address and reading on the local
/// bind address; inbound datagrams from any source are accepted.
#[derive(Clone, Debug)]
pub struct UdpBroadcast {
    broadcast_addr: SocketAddr,
    bind_addr: SocketAddr,
    info: EndpointInfo,
}

impl UdpBroadcast {
    /// Configures a UDP broadcast link.
    pub fn new(broadcast_addr: impl ToSocketAddrs, local_bind: impl ToSocketAddrs) -> Result<Self> {
        let broadcast_addr = resolve_socket_addr(broadcast_addr)?;
        let bind_addr = resolve_socket_addr(local_bind)?;
        Ok(Self {
            broadcast_addr,
            bind_addr,
            info: EndpointInfo::UdpBroadcast {
                broadcast_addr,
                bind_addr,
            },
        })
    }

    fn bind(&self) -> Result<UdpRw> {
        let socket = UdpSocket::bind(self.bind_addr)?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(CHANNEL_POLL_INTERVAL))?;
        Ok(UdpRw::unconnected(socket, self.broadcast_addr))
    }
}

impl Endpoint for UdpBroadcast {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn open(self: Box<Self>, factory: ChannelFactory) -> Result<EndpointHandler> {
        let writer = self.bind()?;

        let state = Closer::new();
        let endpoint_state = state.to_closable();
        let this = *self;
        let handler_info = this.info.clone();
        let info = this.info.clone();

        thread::spawn(move || {
            let mut backoff = Backoff::new();
            let mut next_writer = Some(writer);

            loop {
                if endpoint_state.is_closed() || factory.is_closed() {
                    break;
                }

                let writer = match next_writer.take() {
                    Some(writer) => writer,
                    None => match this.bind() {
                        Ok(writer) => {
                            backoff.reset();
                            writer
                        }
                        Err(err) => {
                            log::debug!("[{info:?}] reopen failed: {err}");
                            if !backoff_sleep(&endpoint_state, backoff.next()) {
                                break;
                            }
                            continue;
                        }
                    },
                };

                let reader = match writer.try_clone() {
                    Ok(reader) => reader,
                    Err(_) => continue,
                };

                let channel = factory.spawn(
                    ChannelDetails::UdpBroadcast {
                        broadcast_addr: this.broadcast_addr,
                        bind_addr: this.bind_addr,
                    },
                    reader,
                    writer,
                );
                if !supervise_channel(&endpoint_state, &channel.to_closable()) {
                    break;
                }
                if !backoff_sleep(&endpoint_state, backoff.next()) {
                    break;
                }
            }
            log::debug!("[{info:?}] broadcast link stopped");
        });

        Ok(EndpointHandler::new(handler_info, state))
    }
}

/// A wrapper around [`UdpSocket`] that implements [`Read`] and [`Write`].
#[derive(Debug)]
struct UdpRw {
    socket: UdpSocket,
    /// Destination for unconnected sockets; `None` uses the connected peer.
    dest: Option<SocketAddr>,
}

impl UdpRw {
    fn connected(socket: UdpSocket) -> Self {
        Self { socket, dest: None }
    }

    fn unconnected(socket: UdpSocket, dest: SocketAddr) -> Self {
        Self {
            socket,
            dest: Some(dest),
        }
    }

    fn try_clone(&self) -> std::io::Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            dest: self.dest,
        })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Read for UdpRw {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.dest {
            None => self.socket.recv(buf),
            Some(_) => self.socket.recv_from(buf).map(|(len, _)| len),
        }
    }
}

impl Write for UdpRw {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.dest {
            None => self.socket.send(buf),
            Some(dest) => self.socket.send_to(buf, dest),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
