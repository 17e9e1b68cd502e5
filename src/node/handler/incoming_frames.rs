//! The event fan-in collector.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::consts::{
    COLLECTOR_RECV_TIMEOUT, EVENTS_RECV_POOLING_INTERVAL, HEARTBEAT_MESSAGE_ID,
    MAV_AUTOPILOT_ARDUPILOTMEGA, STREAM_REQUEST_RESEND_INTERVAL,
};
use crate::io::{ChannelRegistry, WriteRequest};
use crate::node::handler::set_emitter_field;
use crate::node::Event;
use crate::protocol::{ComponentId, Message, MessageSchema, SystemId};
use crate::utils::Closable;

/// What the node knows about a remote `(system_id, component_id)`.
struct RemoteState {
    last_frame: Instant,
    is_ardupilot: bool,
    last_stream_request: Option<Instant>,
}

/// Stream-request behavior, enabled by configuration.
pub(crate) struct StreamRequestConf {
    pub(crate) schema: Arc<MessageSchema>,
    pub(crate) frequency: u16,
}

impl StreamRequestConf {
    /// Builds a `REQUEST_DATA_STREAM` for all streams of a remote.
    fn request_for(&self, system_id: SystemId, component_id: ComponentId) -> Message {
        let mut request = Message::new(self.schema.clone());
        set_emitter_field(&mut request, "target_system", system_id);
        set_emitter_field(&mut request, "target_component", component_id);
        set_emitter_field(&mut request, "req_stream_id", 0u8);
        set_emitter_field(&mut request, "req_message_rate", self.frequency);
        set_emitter_field(&mut request, "start_stop", 1u8);
        request
    }
}

/// Funnels channel events into the application queue.
///
/// The collector is the single consumer of the producers' queue: it keeps
/// the remote bookkeeping, drives stream requests, and forwards every event
/// into the queue the [`Events`](crate::node::Events) iterator reads.
/// Back-pressure propagates naturally: when the application stops
/// consuming, the collector blocks, the producers' queue fills up, and
/// channel read workers stall on publishing.
pub(crate) struct IncomingFramesHandler {
    pub(crate) state: Closable,
    pub(crate) events_in: mpsc::Receiver<Event>,
    pub(crate) events_out: mpsc::SyncSender<Event>,
    pub(crate) registry: ChannelRegistry,
    pub(crate) stream_requests: Option<StreamRequestConf>,
}

impl IncomingFramesHandler {
    pub fn spawn(self) {
        thread::spawn(move || self.run());
    }

    fn run(mut self) {
        let mut remotes: HashMap<(SystemId, ComponentId), RemoteState> = HashMap::new();

        loop {
            match self.events_in.recv_timeout(COLLECTOR_RECV_TIMEOUT) {
                Ok(event) => {
                    let follow_ups = self.inspect(&event, &mut remotes);
                    if !self.forward(event) {
                        return;
                    }
                    for event in follow_ups {
                        if !self.forward(event) {
                            return;
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.state.is_closed() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Deliver what is already queued, then let the iterator terminate.
        while let Ok(event) = self.events_in.try_recv() {
            if self.events_out.try_send(event).is_err() {
                break;
            }
        }
        log::debug!("event collector stopped");
    }

    /// Updates remote bookkeeping and produces follow-up events.
    fn inspect(
        &mut self,
        event: &Event,
        remotes: &mut HashMap<(SystemId, ComponentId), RemoteState>,
    ) -> Vec<Event> {
        let Event::Frame {
            channel,
            frame,
            message,
        } = event
        else {
            return Vec::new();
        };

        let now = Instant::now();
        let remote = remotes
            .entry((frame.system_id(), frame.component_id()))
            .or_insert(RemoteState {
                last_frame: now,
                is_ardupilot: false,
                last_stream_request: None,
            });
        remote.last_frame = now;

        let Some(message) = message else {
            return Vec::new();
        };
        if message.id() != HEARTBEAT_MESSAGE_ID {
            return Vec::new();
        }

        remote.is_ardupilot =
            message.get_unsigned("autopilot") == Some(u64::from(MAV_AUTOPILOT_ARDUPILOTMEGA));

        let Some(conf) = &self.stream_requests else {
            return Vec::new();
        };
        if !remote.is_ardupilot {
            return Vec::new();
        }
        let due = remote
            .last_stream_request
            .map_or(true, |at| at.elapsed() >= STREAM_REQUEST_RESEND_INTERVAL);
        if !due {
            return Vec::new();
        }
        remote.last_stream_request = Some(now);

        let request = conf.request_for(frame.system_id(), frame.component_id());
        log::debug!(
            "[{channel:?}] requesting streams from {}/{}",
            frame.system_id(),
            frame.component_id()
        );
        self.registry
            .send_to(channel.id(), WriteRequest::Message(Arc::new(request)));

        vec![Event::StreamRequested {
            channel: channel.clone(),
            system_id: frame.system_id(),
            component_id: frame.component_id(),
        }]
    }

    /// Forwards an event to the application queue.
    ///
    /// Returns `false` once the queue is gone or the node closed while the
    /// queue was full.
    fn forward(&self, event: Event) -> bool {
        let mut event = event;
        loop {
            match self.events_out.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Full(returned)) => {
                    if self.state.is_closed() {
                        return false;
                    }
                    event = returned;
                    thread::sleep(EVENTS_RECV_POOLING_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}
