//! Serial port transport.

use std::thread;

use serialport::SerialPort;

use crate::consts::CHANNEL_POLL_INTERVAL;
use crate::io::endpoint::{backoff_sleep, supervise_channel, Backoff};
use crate::io::{ChannelDetails, ChannelFactory, Endpoint, EndpointHandler, EndpointInfo};
use crate::utils::Closer;

use crate::prelude::*;

/// Serial port endpoint.
///
/// One channel over a serial device. When the port fails, it is reopened
/// with exponential back-off and a fresh channel is spawned.
///
/// `serialport` exposes a single timeout covering reads and writes alike.
/// The port is opened with the short read-polling interval so that
/// shutdown stays responsive, which means the node's
/// [`write_timeout`](crate::node::NodeBuilder::write_timeout) does not
/// apply here: a serial write is bounded by that polling interval instead.
#[derive(Clone, Debug)]
pub struct Serial {
    path: String,
    baud_rate: u32,
    info: EndpointInfo,
}

impl Serial {
    /// Configures a serial port endpoint.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        let path = path.into();
        Self {
            info: EndpointInfo::Serial {
                path: path.clone(),
                baud_rate,
            },
            path,
            baud_rate,
        }
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>> {
        let port = serialport::new(self.path.as_str(), self.baud_rate)
            .timeout(CHANNEL_POLL_INTERVAL)
            .open()?;
        Ok(port)
    }
}

impl Endpoint for Serial {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn open(self: Box<Self>, factory: ChannelFactory) -> Result<EndpointHandler> {
        let writer = self.open_port()?;
        let reader = writer.try_clone()?;

        let state = Closer::new();
        let endpoint_state = state.to_closable();
        let this = *self;
        let handler_info = this.info.clone();
        let info = this.info.clone();

        thread::spawn(move || {
            let mut backoff = Backoff::new();
            let mut next_port = Some((reader, writer));

            loop {
                if endpoint_state.is_closed() || factory.is_closed() {
                    break;
                }

                let (reader, writer) = match next_port.take() {
                    Some(port) => port,
                    None => {
                        let reopened = this.open_port().and_then(|writer| {
                            let reader = writer.try_clone()?;
                            Ok((reader, writer))
                        });
                        match reopened {
                            Ok(port) => {
                                backoff.reset();
                                log::debug!("[{info:?}] port reopened");
                                port
                            }
                            Err(err) => {
                                log::debug!("[{info:?}] reopen failed: {err}");
                                if !backoff_sleep(&endpoint_state, backoff.next()) {
                                    break;
                                }
                                continue;
                            }
                        }
                    }
                };

                let channel = factory.spawn(
                    ChannelDetails::Serial {
                        path: this.path.clone(),
                        baud_rate: this.baud_rate,
                    },
                    reader,
                    writer,
                );
                if !supervise_channel(&endpoint_state, &channel.to_closable()) {
                    break;
                }

                log::debug!("[{info:?}] port lost");
                if !backoff_sleep(&endpoint_state, backoff.next()) {
                    break;
                }
            }
            log::debug!("[{info:?}] serial endpoint stopped");
        });

        Ok(EndpointHandler::new(handler_info, state))
    }
}
