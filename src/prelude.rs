//! Commonly used mavnode entities.

pub use crate::error::{DialectError, Error, FrameError, NodeError, Result};
pub use crate::io::transport::{
    Custom, Serial, TcpClient, TcpServer, UdpBroadcast, UdpClient, UdpServer,
};
pub use crate::io::{ChannelId, ChannelInfo, EndpointInfo};
pub use crate::node::{Event, Events, Node, NodeBuilder};
pub use crate::protocol::MavVersion::{V1, V2};
pub use crate::protocol::{
    Dialect, FieldDef, FieldType, Frame, MavVersion, Message, MessageSchema, SecretKey, Value,
};
