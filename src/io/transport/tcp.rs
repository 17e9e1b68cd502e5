//! TCP transports.

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;

use crate::consts::CHANNEL_POLL_INTERVAL;
use crate::io::endpoint::{backoff_sleep, supervise_channel, Backoff};
use crate::io::transport::resolve_socket_addr;
use crate::io::{ChannelDetails, ChannelFactory, Endpoint, EndpointHandler, EndpointInfo};
use crate::utils::{Closable, Closer};

use crate::prelude::*;

/// TCP server endpoint.
///
/// Binds to an address and turns every accepted connection into a separate
/// channel. Closing the endpoint closes the listener and all derived
/// channels.
#[derive(Clone, Debug)]
pub struct TcpServer {
    addr: SocketAddr,
    info: EndpointInfo,
}

impl TcpServer {
    /// Configures a TCP server.
    ///
    /// Accepts anything that implements [`ToSocketAddrs`], prefers IPv4
    /// addresses if available.
    pub fn new(addr: impl ToSocketAddrs) -> Result<Self> {
        let addr = resolve_socket_addr(addr)?;
        Ok(Self {
            addr,
            info: EndpointInfo::TcpServer { bind_addr: addr },
        })
    }
}

impl Endpoint for TcpServer {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn open(self: Box<Self>, factory: ChannelFactory) -> Result<EndpointHandler> {
        let server_addr = self.addr;
        let listener = TcpListener::bind(server_addr)?;

        let state = Closer::new();
        spawn_hang_up_watchdog(state.to_closable(), server_addr, self.info.clone());

        let endpoint_state = state.to_closable();
        let info = self.info.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                if endpoint_state.is_closed() || factory.is_closed() {
                    break;
                }

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        log::warn!("[{info:?}] accept failed: {err}");
                        continue;
                    }
                };
                let Ok(peer_addr) = stream.peer_addr() else {
                    continue;
                };
                if configure_stream(&stream, &factory).is_err() {
                    continue;
                }
                let reader = match stream.try_clone() {
                    Ok(reader) => reader,
                    Err(err) => {
                        log::warn!("[{info:?}] cannot clone stream: {err}");
                        continue;
                    }
                };

                let _ = factory.spawn(
                    ChannelDetails::TcpServer {
                        server_addr,
                        peer_addr,
                    },
                    reader,
                    stream,
                );
            }
            log::debug!("[{info:?}] listener stopped");
        });

        Ok(EndpointHandler::new(self.info, state))
    }
}

/// TCP client endpoint.
///
/// Dials the server at construction (a failed dial aborts node
/// construction) and yields exactly one channel at a time. After a
/// disconnect the connection is re-established with exponential back-off;
/// every reconnect produces a fresh channel with its own `ChannelOpen`
/// event.
#[derive(Clone, Debug)]
pub struct TcpClient {
    addr: SocketAddr,
    info: EndpointInfo,
}

impl TcpClient {
    /// Configures a TCP client.
    pub fn new(addr: impl ToSocketAddrs) -> Result<Self> {
        let addr = resolve_socket_addr(addr)?;
        Ok(Self {
            addr,
            info: EndpointInfo::TcpClient { remote_addr: addr },
        })
    }
}

impl Endpoint for TcpClient {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn open(self: Box<Self>, factory: ChannelFactory) -> Result<EndpointHandler> {
        let remote_addr = self.addr;

        let stream = TcpStream::connect(remote_addr)?;
        configure_stream(&stream, &factory)?;

        let state = Closer::new();
        let endpoint_state = state.to_closable();
        let info = self.info.clone();

        thread::spawn(move || {
            let mut backoff = Backoff::new();
            let mut next_stream = Some(stream);

            loop {
                if endpoint_state.is_closed() || factory.is_closed() {
                    break;
                }

                let stream = match next_stream.take() {
                    Some(stream) => stream,
                    None => match TcpStream::connect(remote_addr) {
                        Ok(stream) => {
                            if configure_stream(&stream, &factory).is_err() {
                                continue;
                            }
                            backoff.reset();
                            log::debug!("[{info:?}] reconnected");
                            stream
                        }
                        Err(err) => {
                            log::debug!("[{info:?}] reconnect failed: {err}");
                            if !backoff_sleep(&endpoint_state, backoff.next()) {
                                break;
                            }
                            continue;
                        }
                    },
                };

                let reader = match stream.try_clone() {
                    Ok(reader) => reader,
                    Err(err) => {
                        log::warn!("[{info:?}] cannot clone stream: {err}");
                        continue;
                    }
                };

                let channel =
                    factory.spawn(ChannelDetails::TcpClient { remote_addr }, reader, stream);
                if !supervise_channel(&endpoint_state, &channel.to_closable()) {
                    break;
                }

                log::debug!("[{info:?}] connection lost");
                if !backoff_sleep(&endpoint_state, backoff.next()) {
                    break;
                }
            }
            log::debug!("[{info:?}] client stopped");
        });

        Ok(EndpointHandler::new(self.info, state))
    }
}

fn configure_stream(stream: &TcpStream, factory: &ChannelFactory) -> std::io::Result<()> {
    stream.set_read_timeout(Some(CHANNEL_POLL_INTERVAL))?;
    stream.set_write_timeout(Some(factory.write_timeout()))?;
    Ok(())
}

/// Unblocks the listener's accept loop once the endpoint is closed.
fn spawn_hang_up_watchdog(state: Closable, addr: SocketAddr, info: EndpointInfo) {
    thread::spawn(move || {
        state.wait();
        log::debug!("[{info:?}] waking up listener to let it close");
        let _ = TcpStream::connect(addr);
    });
}
