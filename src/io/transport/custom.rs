//! Application-provided byte stream transport.

use std::fmt::{Debug, Formatter};
use std::io::{Read, Write};

use crate::io::{ChannelDetails, ChannelFactory, Endpoint, EndpointHandler, EndpointInfo};
use crate::utils::Closer;

use crate::prelude::*;

/// Endpoint around an application-provided reader/writer pair.
///
/// Wraps any byte stream into a single channel. The endpoint makes no
/// assumption about the stream; once the reader reports an error or EOF
/// the channel closes for good.
///
/// Readers that can block forever keep their worker thread alive past
/// [`Node::close`](crate::node::Node::close); supply a reader with a read
/// timeout where that matters.
pub struct Custom<R, W> {
    name: String,
    reader: R,
    writer: W,
    info: EndpointInfo,
}

impl<R, W> Custom<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    /// Wraps a reader/writer pair into an endpoint.
    ///
    /// `name` identifies the endpoint in events and logs and distinguishes
    /// multiple custom endpoints of one node.
    pub fn new(name: impl Into<String>, reader: R, writer: W) -> Self {
        let name = name.into();
        Self {
            info: EndpointInfo::Custom { name: name.clone() },
            name,
            reader,
            writer,
        }
    }
}

impl<R, W> Debug for Custom<R, W> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Custom").field("name", &self.name).finish()
    }
}

impl<R, W> Endpoint for Custom<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn open(self: Box<Self>, factory: ChannelFactory) -> Result<EndpointHandler> {
        let this = *self;
        let _ = factory.spawn(
            ChannelDetails::Custom { name: this.name },
            this.reader,
            this.writer,
        );
        Ok(EndpointHandler::new(this.info, Closer::new()))
    }
}
