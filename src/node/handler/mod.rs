//! Background workers of a node.

pub(crate) mod heartbeat;
pub(crate) mod incoming_frames;

use crate::protocol::{Message, Value};

/// Sets a field on an emitter-built message.
///
/// Emitters build `HEARTBEAT` and `REQUEST_DATA_STREAM` from whatever
/// schema the application registered under the well-known `ID`; a schema
/// with unexpected field names or types leaves the field at zero, which is
/// worth a warning rather than a hard failure.
pub(crate) fn set_emitter_field(message: &mut Message, field: &str, value: impl Into<Value>) {
    if let Err(err) = message.set(field, value) {
        log::warn!(
            "{} field {field:?} left at zero: {err}",
            message.name()
        );
    }
}
