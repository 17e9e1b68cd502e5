//! # MAVLink protocol entities
//!
//! This module contains the frame codec, the message reflection layer used
//! to derive wire layout and CRC-extra bytes from declarative schemas, and
//! the `MAVLink 2` signing tools.

mod crc;
mod dialect;
mod field;
mod frame;
mod message;
mod schema;
mod signing;

pub(crate) use crc::Checksum;
pub use dialect::Dialect;
pub use field::{FieldDef, FieldType, Value};
pub use frame::{Frame, MavVersion, Signature};
pub use message::Message;
pub use schema::MessageSchema;
pub use signing::{MavTimestamp, SecretKey};
pub(crate) use signing::{FrameSigner, SignatureVerifier, UniqueMavTimestamp};

/// MAVLink message `ID`.
pub type MessageId = u32;
/// MAVLink system `ID`.
pub type SystemId = u8;
/// MAVLink component `ID`.
pub type ComponentId = u8;
