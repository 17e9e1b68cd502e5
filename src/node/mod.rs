//! # MAVLink nodes
//!
//! A [`Node`] owns a set of endpoints and the channels they produce, fans
//! their traffic into a single ordered [`Events`] sequence, fans writes out
//! to the open channels, and runs the background emitters (heartbeats,
//! stream requests).

mod conf;
mod event;
mod handler;

pub use conf::NodeBuilder;
pub use event::{Event, Events};

use std::sync::atomic::AtomicU8;
use std::sync::{mpsc, Arc, Mutex};

use crate::consts::{HEARTBEAT_MESSAGE_ID, MAV_STATE_ACTIVE, REQUEST_DATA_STREAM_MESSAGE_ID};
use crate::io::{ChannelFactory, ChannelId, ChannelRegistry, EndpointHandler, WriteRequest};
use crate::node::handler::heartbeat::HeartbeatEmitter;
use crate::node::handler::incoming_frames::{IncomingFramesHandler, StreamRequestConf};
use crate::protocol::{ComponentId, Dialect, MavVersion, SystemId, UniqueMavTimestamp};
use crate::utils::Closer;

use crate::prelude::*;

/// A MAVLink node.
///
/// Create one with [`Node::builder`]. The node starts communicating
/// immediately; consume [`Node::events`] to observe traffic and use the
/// `write_*` family to send. All writes are fan-out enqueues: they never
/// block on slow peers, and they become no-ops once the node is closed.
///
/// Dropping the node closes it.
pub struct Node {
    state: Closer,
    registry: ChannelRegistry,
    endpoints: Vec<EndpointHandler>,
    events: Arc<Mutex<mpsc::Receiver<Event>>>,
    dialect: Option<Arc<Dialect>>,
    version: MavVersion,
    system_id: SystemId,
    component_id: ComponentId,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("endpoints", &self.endpoints)
            .field("dialect", &self.dialect)
            .field("version", &self.version)
            .field("system_id", &self.system_id)
            .field("component_id", &self.component_id)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Creates an empty [`NodeBuilder`].
    pub fn builder() -> NodeBuilder {
        NodeBuilder::new()
    }

    /// Starts a node from a validated configuration.
    pub(crate) fn start(conf: NodeBuilder) -> Result<Self> {
        let state = Closer::new();
        let registry = ChannelRegistry::new();
        let dialect = conf.dialect.map(Arc::new);

        let (events_in_tx, events_in_rx) = mpsc::sync_channel(conf.event_buffer_size);
        let (events_out_tx, events_out_rx) = mpsc::sync_channel(conf.event_buffer_size);

        let stream_requests = conf.stream_requests_enabled.then(|| StreamRequestConf {
            schema: dialect
                .as_ref()
                .and_then(|dialect| dialect.message(REQUEST_DATA_STREAM_MESSAGE_ID))
                .cloned()
                .expect("validated at build time"),
            frequency: conf.stream_request_frequency,
        });
        IncomingFramesHandler {
            state: state.to_closable(),
            events_in: events_in_rx,
            events_out: events_out_tx,
            registry: registry.clone(),
            stream_requests,
        }
        .spawn();

        let factory = ChannelFactory {
            node_state: state.to_closable(),
            events: events_in_tx,
            registry: registry.clone(),
            dialect: dialect.clone(),
            version: conf.version,
            system_id: conf.system_id,
            component_id: conf.component_id,
            in_key: conf.in_key,
            out_key: conf.out_key,
            timestamps: UniqueMavTimestamp::new(),
            link_ids: Arc::new(AtomicU8::new(0)),
            read_timeout: conf.read_timeout,
            write_timeout: conf.write_timeout,
            idle_timeout: conf.idle_connection_timeout,
        };

        let mut endpoints = Vec::with_capacity(conf.endpoints.len());
        for endpoint in conf.endpoints {
            let info = endpoint.info().clone();
            match endpoint.open(factory.clone()) {
                Ok(handler) => {
                    log::debug!("[{info:?}] endpoint started");
                    endpoints.push(handler);
                }
                Err(err) => {
                    log::error!("[{info:?}] endpoint failed to start: {err}");
                    state.close();
                    for handler in &endpoints {
                        handler.close();
                    }
                    registry.close_all();
                    return Err(err);
                }
            }
        }

        if !conf.heartbeat_disabled {
            let schema = dialect
                .as_ref()
                .and_then(|dialect| dialect.message(HEARTBEAT_MESSAGE_ID))
                .cloned()
                .expect("validated at build time");

            let mut message = Message::new(schema);
            handler::set_emitter_field(&mut message, "type", conf.heartbeat_system_type);
            handler::set_emitter_field(&mut message, "autopilot", conf.heartbeat_autopilot_type);
            handler::set_emitter_field(&mut message, "base_mode", 0u8);
            handler::set_emitter_field(&mut message, "custom_mode", 0u32);
            handler::set_emitter_field(&mut message, "system_status", MAV_STATE_ACTIVE);
            if let Some(dialect) = &dialect {
                handler::set_emitter_field(&mut message, "mavlink_version", dialect.version());
            }

            HeartbeatEmitter {
                state: state.to_closable(),
                registry: registry.clone(),
                interval: conf.heartbeat_interval,
                message,
            }
            .spawn();
        }

        Ok(Self {
            state,
            registry,
            endpoints,
            events: Arc::new(Mutex::new(events_out_rx)),
            dialect,
            version: conf.version,
            system_id: conf.system_id,
            component_id: conf.component_id,
        })
    }

    /// Iterator over node events.
    ///
    /// Blocks between events; terminates once the node is closed, after
    /// delivering the events already queued.
    pub fn events(&self) -> Events {
        Events {
            receiver: self.events.clone(),
            state: self.state.to_closable(),
        }
    }

    /// Dialect of this node, if any.
    pub fn dialect(&self) -> Option<&Arc<Dialect>> {
        self.dialect.as_ref()
    }

    /// MAVLink version used for locally originated messages.
    pub fn version(&self) -> MavVersion {
        self.version
    }

    /// System `ID` of this node.
    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    /// Component `ID` of this node.
    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    /// Returns `true` once the node is closed.
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Sends a message on every open channel.
    ///
    /// The message is framed per channel: every frame carries this node's
    /// system and component `ID`s and the channel's own sequence number.
    pub fn write_message_all(&self, message: &Message) {
        self.registry
            .send_all(WriteRequest::Message(Arc::new(message.clone())));
    }

    /// Sends a message on every open channel except `channel`.
    ///
    /// The usual building block for responding without echoing back.
    pub fn write_message_except(&self, channel: ChannelId, message: &Message) {
        self.registry
            .send_except(channel, WriteRequest::Message(Arc::new(message.clone())));
    }

    /// Sends a message on a single channel.
    pub fn write_message_to(&self, channel: ChannelId, message: &Message) {
        self.registry
            .send_to(channel, WriteRequest::Message(Arc::new(message.clone())));
    }

    /// Ships a pre-built frame on every open channel.
    ///
    /// The frame is written as-is, preserving its sequence, identity,
    /// payload and signature.
    pub fn write_frame_all(&self, frame: &Frame) {
        self.registry
            .send_all(WriteRequest::Frame(Arc::new(frame.clone())));
    }

    /// Ships a pre-built frame on every open channel except `channel`.
    ///
    /// The usual building block for relaying: the originator's identity is
    /// preserved across the hop.
    pub fn write_frame_except(&self, channel: ChannelId, frame: &Frame) {
        self.registry
            .send_except(channel, WriteRequest::Frame(Arc::new(frame.clone())));
    }

    /// Ships a pre-built frame on a single channel.
    pub fn write_frame_to(&self, channel: ChannelId, frame: &Frame) {
        self.registry
            .send_to(channel, WriteRequest::Frame(Arc::new(frame.clone())));
    }

    /// Closes the node: all endpoints, all channels, and the event
    /// sequence.
    ///
    /// Idempotent. Subsequent writes are no-ops; the [`Events`] iterator
    /// delivers what is already queued and terminates.
    pub fn close(&self) {
        if self.state.is_closed() {
            return;
        }
        log::debug!("closing node {}/{}", self.system_id, self.component_id);

        self.state.close();
        for endpoint in &self.endpoints {
            endpoint.close();
        }
        self.registry.close_all();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.close();
    }
}
