//! Node events.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};

use crate::consts::EVENTS_RECV_POOLING_INTERVAL;
use crate::error::FrameError;
use crate::io::ChannelInfo;
use crate::protocol::{ComponentId, Frame, Message, SystemId};
use crate::utils::Closable;

/// Events published by a [`Node`](crate::node::Node).
///
/// Events preserve the real-time order of arrival at the node; within a
/// single channel, frame order matches transport order.
#[derive(Clone, Debug)]
pub enum Event {
    /// A channel entered the open state.
    ChannelOpen {
        /// The channel that opened.
        channel: ChannelInfo,
    },
    /// A channel closed and was removed from the node.
    ChannelClose {
        /// The channel that closed.
        channel: ChannelInfo,
    },
    /// A frame was received.
    Frame {
        /// The channel the frame arrived on.
        channel: ChannelInfo,
        /// The frame as received (relaying it preserves its identity).
        frame: Frame,
        /// The decoded message; absent without a dialect or when the
        /// message `ID` is unknown.
        message: Option<Message>,
    },
    /// A recoverable decode error occurred; the channel keeps running.
    ParseError {
        /// The channel the error occurred on.
        channel: ChannelInfo,
        /// What went wrong.
        error: FrameError,
    },
    /// The stream-request emitter asked a remote for its data streams.
    StreamRequested {
        /// The channel the request was sent on.
        channel: ChannelInfo,
        /// System `ID` of the remote.
        system_id: SystemId,
        /// Component `ID` of the remote.
        component_id: ComponentId,
    },
}

/// Iterator over node events.
///
/// Returned by [`Node::events`](crate::node::Node::events). Blocks between
/// events and terminates once the node is closed; events already queued at
/// close time are still delivered first.
pub struct Events {
    pub(crate) receiver: Arc<Mutex<mpsc::Receiver<Event>>>,
    pub(crate) state: Closable,
}

impl Iterator for Events {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        let receiver = self.receiver.lock().unwrap();
        while !self.state.is_closed() {
            match receiver.recv_timeout(EVENTS_RECV_POOLING_INTERVAL) {
                Ok(event) => return Some(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
        receiver.try_recv().ok()
    }
}
