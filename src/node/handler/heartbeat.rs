//! Periodic heartbeat emitter.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::io::{ChannelRegistry, WriteRequest};
use crate::protocol::Message;
use crate::utils::Closable;

/// Broadcasts a `HEARTBEAT` message on every open channel at a fixed
/// interval.
///
/// The message is built once at node construction from the dialect's id-0
/// schema. Emission starts immediately; the wait between beats is
/// interruptible so that closing the node stops the emitter at once.
pub(crate) struct HeartbeatEmitter {
    pub(crate) state: Closable,
    pub(crate) registry: ChannelRegistry,
    pub(crate) interval: Duration,
    pub(crate) message: Message,
}

impl HeartbeatEmitter {
    pub fn spawn(self) {
        thread::spawn(move || {
            let message = Arc::new(self.message);
            loop {
                log::trace!("broadcasting heartbeat");
                self.registry.send_all(WriteRequest::Message(message.clone()));

                if self.state.wait_timeout(self.interval) {
                    break;
                }
            }
            log::debug!("heartbeat emitter stopped");
        });
    }
}
