//! # Mavnode errors
//!
//! All fallible operations return [`Result`]. Recoverable protocol-level
//! conditions encountered by a running node never surface as [`Error`]:
//! they are reported through [`Event::ParseError`](crate::node::Event) and
//! the affected channel keeps running. [`Error`] is returned only where an
//! operation short-circuits, most notably during node construction.

use std::io;

use thiserror::Error;

/// Result type returned by mavnode operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Input/output error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid frame on the wire or a frame that cannot be encoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Invalid dialect, message schema, or message field access.
    #[error("dialect error: {0}")]
    Dialect(#[from] DialectError),

    /// Invalid node configuration.
    #[error("node error: {0}")]
    Node(#[from] NodeError),
}

impl From<serialport::Error> for Error {
    fn from(value: serialport::Error) -> Self {
        Error::Io(value.into())
    }
}

/// Errors related to an individual MAVLink frame.
///
/// On a running channel these are recoverable: the parser re-synchronizes
/// and the error is published as an [`Event::ParseError`](crate::node::Event).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Message `ID` is not present in the dialect index.
    #[error("unknown message id: {0}")]
    UnknownMessageId(u32),

    /// Checksum validation failed.
    #[error("invalid checksum: expected {expected:#06x}, found {found:#06x}")]
    Checksum {
        /// Checksum calculated from the frame contents.
        expected: u16,
        /// Checksum found on the wire.
        found: u16,
    },

    /// Signature missing, malformed, not verifiable, or replayed.
    #[error("invalid signature")]
    Signature,

    /// Stream ended in the middle of a frame.
    #[error("truncated frame")]
    Truncated,

    /// Leading byte is not a known MAVLink packet start marker.
    #[error("unsupported protocol magic: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Message `ID` does not fit into a `MAVLink 1` frame.
    #[error("message id {0} does not fit into a MAVLink 1 frame")]
    MessageIdOutOfRange(u32),
}

/// Errors related to dialect construction and dynamic message access.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialectError {
    /// Two message schemas share the same `ID`.
    #[error("duplicate message id: {0}")]
    DuplicateMessageId(u32),

    /// Two fields of a message share the same name.
    #[error("duplicate field: {0}")]
    DuplicateField(String),

    /// A base field is declared after an extension field.
    #[error("extension fields must follow base fields: {0}")]
    ExtensionOrder(String),

    /// Array length is zero or exceeds 255 elements.
    #[error("invalid array length for field: {0}")]
    ArrayLength(String),

    /// Total payload size exceeds the MAVLink maximum of 255 bytes.
    #[error("payload of message {0:?} exceeds 255 bytes")]
    PayloadOverflow(String),

    /// Field name not present in the message schema.
    #[error("no such field: {0}")]
    UnknownField(String),

    /// Value kind does not match the declared field type.
    #[error("type mismatch for field: {0}")]
    FieldTypeMismatch(String),
}

/// Errors related to node configuration and lifecycle.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    /// The endpoint list is empty.
    #[error("at least one endpoint is required")]
    NoEndpoints,

    /// System `ID` is outside of `1..=255`.
    #[error("invalid system id: {0}")]
    InvalidSystemId(u8),

    /// Two endpoints share the same configuration.
    #[error("duplicate endpoint: {0}")]
    DuplicateEndpoint(String),

    /// Heartbeats are enabled, but the dialect does not define `HEARTBEAT`.
    #[error("heartbeats are enabled, but the dialect does not define HEARTBEAT")]
    HeartbeatUnsupported,

    /// Stream requests are enabled, but the dialect does not define the
    /// required messages.
    #[error("stream requests are enabled, but the dialect does not define REQUEST_DATA_STREAM")]
    StreamRequestUnsupported,
}
