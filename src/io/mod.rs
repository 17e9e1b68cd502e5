//! # I/O abstractions
//!
//! This module contains the channel machinery (one parser/writer pair bound
//! to one byte stream), the [`Endpoint`] abstraction producing channels
//! from transport configurations, and the stream-level frame
//! [`Receiver`]/[`Sender`].

pub mod transport;

mod channel;
mod endpoint;
mod frame_io;
mod info;

pub use channel::ChannelFactory;
pub use endpoint::{Endpoint, EndpointHandler};
pub use frame_io::{Receiver, Sender};
pub use info::{ChannelDetails, ChannelId, ChannelInfo, EndpointInfo};

pub(crate) use channel::{ChannelRegistry, WriteRequest};
