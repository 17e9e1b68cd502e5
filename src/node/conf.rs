//! Node configuration.

use std::time::Duration;

use crate::consts::{
    DEFAULT_EVENT_BUFFER_SIZE, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_IDLE_CONNECTION_TIMEOUT,
    DEFAULT_READ_TIMEOUT, DEFAULT_STREAM_REQUEST_FREQUENCY, DEFAULT_WRITE_TIMEOUT,
    HEARTBEAT_MESSAGE_ID, MAV_TYPE_GCS, REQUEST_DATA_STREAM_MESSAGE_ID,
};
use crate::error::NodeError;
use crate::io::Endpoint;
use crate::node::Node;
use crate::protocol::{ComponentId, Dialect, MavVersion, SecretKey, SystemId};

use crate::prelude::*;

/// Builder for a [`Node`].
///
/// ```rust,no_run
/// use mavnode::prelude::*;
///
/// # fn main() -> mavnode::error::Result<()> {
/// let node = Node::builder()
///     .version(V2)
///     .system_id(10)
///     .endpoint(UdpServer::new("127.0.0.1:5600")?)
///     .endpoint(TcpClient::new("10.0.0.5:5760")?)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct NodeBuilder {
    pub(crate) endpoints: Vec<Box<dyn Endpoint>>,
    pub(crate) dialect: Option<Dialect>,
    pub(crate) version: MavVersion,
    pub(crate) system_id: SystemId,
    pub(crate) component_id: ComponentId,
    pub(crate) heartbeat_disabled: bool,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) heartbeat_autopilot_type: u8,
    pub(crate) heartbeat_system_type: u8,
    pub(crate) stream_requests_enabled: bool,
    pub(crate) stream_request_frequency: u16,
    pub(crate) in_key: Option<SecretKey>,
    pub(crate) out_key: Option<SecretKey>,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) idle_connection_timeout: Duration,
    pub(crate) event_buffer_size: usize,
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            dialect: None,
            version: MavVersion::V2,
            system_id: 0,
            component_id: 1,
            heartbeat_disabled: false,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_autopilot_type: 0,
            heartbeat_system_type: MAV_TYPE_GCS,
            stream_requests_enabled: false,
            stream_request_frequency: DEFAULT_STREAM_REQUEST_FREQUENCY,
            in_key: None,
            out_key: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_connection_timeout: DEFAULT_IDLE_CONNECTION_TIMEOUT,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }

    /// Adds an endpoint. At least one is required.
    pub fn endpoint(mut self, endpoint: impl Endpoint + 'static) -> Self {
        self.endpoints.push(Box::new(endpoint));
        self
    }

    /// Sets the dialect used to validate and decode traffic.
    ///
    /// Without a dialect, frames are framed and forwarded but never
    /// decoded.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// MAVLink version for locally originated messages. Default: `V2`.
    pub fn version(mut self, version: MavVersion) -> Self {
        self.version = version;
        self
    }

    /// System `ID` of this node, `1..=255`. Required.
    pub fn system_id(mut self, system_id: SystemId) -> Self {
        self.system_id = system_id;
        self
    }

    /// Component `ID` of this node. Default: `1`.
    pub fn component_id(mut self, component_id: ComponentId) -> Self {
        self.component_id = component_id;
        self
    }

    /// Disables the automatic heartbeat emitter.
    pub fn no_heartbeat(mut self) -> Self {
        self.heartbeat_disabled = true;
        self
    }

    /// Interval between automatic heartbeats. Default: 5 s.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// `autopilot` value reported in heartbeats. Default: `0`
    /// (`MAV_AUTOPILOT_GENERIC`).
    pub fn heartbeat_autopilot_type(mut self, autopilot: u8) -> Self {
        self.heartbeat_autopilot_type = autopilot;
        self
    }

    /// `type` value reported in heartbeats. Default: `6` (`MAV_TYPE_GCS`).
    pub fn heartbeat_system_type(mut self, system_type: u8) -> Self {
        self.heartbeat_system_type = system_type;
        self
    }

    /// Enables automatic stream requests towards ArduPilot remotes.
    pub fn stream_requests(mut self) -> Self {
        self.stream_requests_enabled = true;
        self
    }

    /// Rate requested from remotes, in Hz. Default: 4.
    pub fn stream_request_frequency(mut self, frequency: u16) -> Self {
        self.stream_request_frequency = frequency;
        self
    }

    /// Key used to verify incoming signed frames.
    ///
    /// With an in-key set, only correctly signed `MAVLink 2` frames are
    /// accepted.
    pub fn in_key(mut self, key: impl Into<SecretKey>) -> Self {
        self.in_key = Some(key.into());
        self
    }

    /// Key used to sign outgoing `MAVLink 2` messages.
    pub fn out_key(mut self, key: impl Into<SecretKey>) -> Self {
        self.out_key = Some(key.into());
        self
    }

    /// Read-idle timeout after which a channel is closed. Default: 10 s.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Deadline for a single blocking write on a TCP channel.
    /// Default: 5 s.
    ///
    /// Only TCP streams enforce this deadline; a write that exceeds it
    /// closes the channel. UDP writes are non-blocking datagram sends and
    /// need none. Serial ports share one `serialport` timeout between
    /// reads and writes and are paced by the internal read poll instead.
    /// Custom streams apply whatever deadline the supplied writer
    /// enforces.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Idle timeout after which a UDP server evicts a remote.
    /// Default: 30 s.
    pub fn idle_connection_timeout(mut self, timeout: Duration) -> Self {
        self.idle_connection_timeout = timeout;
        self
    }

    /// Capacity of the event queue. Default: 128.
    ///
    /// When the queue is full, channel read workers block until the
    /// application consumes events; nothing is dropped.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Validates the configuration and starts the node.
    pub fn build(self) -> Result<Node> {
        self.validate()?;
        Node::start(self)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(NodeError::NoEndpoints.into());
        }
        if self.system_id == 0 {
            return Err(NodeError::InvalidSystemId(self.system_id).into());
        }

        for (position, endpoint) in self.endpoints.iter().enumerate() {
            for other in &self.endpoints[position + 1..] {
                if endpoint.info() == other.info() {
                    return Err(
                        NodeError::DuplicateEndpoint(format!("{:?}", endpoint.info())).into(),
                    );
                }
            }
        }

        let has_message = |id| {
            self.dialect
                .as_ref()
                .map(|dialect| dialect.message(id).is_some())
                .unwrap_or(false)
        };
        if !self.heartbeat_disabled && !has_message(HEARTBEAT_MESSAGE_ID) {
            return Err(NodeError::HeartbeatUnsupported.into());
        }
        if self.stream_requests_enabled
            && !(has_message(HEARTBEAT_MESSAGE_ID) && has_message(REQUEST_DATA_STREAM_MESSAGE_ID))
        {
            return Err(NodeError::StreamRequestUnsupported.into());
        }

        Ok(())
    }
}
