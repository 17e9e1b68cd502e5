//! # Common constants

use std::time::Duration;

/// `MAVLink 1` packet start marker.
pub const STX_V1: u8 = 0xFE;
/// `MAVLink 2` packet start marker.
pub const STX_V2: u8 = 0xFD;

/// Maximum MAVLink payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 255;
/// Size of a `MAVLink 2` signature block in bytes.
pub const SIGNATURE_SIZE: usize = 13;
/// Incompatibility flag marking a signed `MAVLink 2` frame.
pub const IFLAG_SIGNED: u8 = 0x01;

/// Message `ID` of `HEARTBEAT`.
pub const HEARTBEAT_MESSAGE_ID: u32 = 0;
/// Message `ID` of `REQUEST_DATA_STREAM`.
pub const REQUEST_DATA_STREAM_MESSAGE_ID: u32 = 66;
/// `MAV_AUTOPILOT_ARDUPILOTMEGA` autopilot kind.
pub const MAV_AUTOPILOT_ARDUPILOTMEGA: u8 = 3;
/// `MAV_STATE_ACTIVE` system status reported by the heartbeat emitter.
pub const MAV_STATE_ACTIVE: u8 = 4;
/// `MAV_TYPE_GCS`, the default system type reported by the heartbeat emitter.
pub const MAV_TYPE_GCS: u8 = 6;

/// Offset of the MAVLink signature epoch (2015-01-01 UTC) from the Unix
/// epoch, in seconds.
pub const SIGNATURE_EPOCH_OFFSET: u64 = 1_420_070_400;

/// Default interval between automatic heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Default rate requested by the stream-request emitter, in Hz.
pub const DEFAULT_STREAM_REQUEST_FREQUENCY: u16 = 4;
/// Interval after which a stream request is re-sent to a remote.
pub const STREAM_REQUEST_RESEND_INTERVAL: Duration = Duration::from_secs(30);

/// Default read-idle timeout after which a channel is considered dead.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Default write deadline for TCP channels.
///
/// Other transports have no configurable write deadline, see
/// [`NodeBuilder::write_timeout`](crate::node::NodeBuilder::write_timeout).
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default idle timeout after which a UDP server evicts a remote.
pub const DEFAULT_IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Default capacity of the node event queue.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 128;

/// Base delay for endpoint reconnection back-off.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);
/// Upper bound for endpoint reconnection back-off.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Interval at which blocked I/O workers re-check the shutdown state.
pub(crate) const CHANNEL_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Pooling interval for the event iterator.
pub(crate) const EVENTS_RECV_POOLING_INTERVAL: Duration = Duration::from_millis(1);
/// Pooling interval for the event collector.
pub(crate) const COLLECTOR_RECV_TIMEOUT: Duration = Duration::from_millis(50);
/// Interval at which endpoint supervisors re-check channel state.
pub(crate) const SUPERVISOR_POOLING_INTERVAL: Duration = Duration::from_millis(100);
/// Read buffer size for socket-level reads.
pub(crate) const READ_BUFFER_SIZE: usize = 512;
