//! Runtime MAVLink dialects.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DialectError;
use crate::protocol::{Message, MessageId, MessageSchema};

/// A set of message schemas with unique `ID`s.
///
/// A dialect is the unit of protocol knowledge a [`Node`](crate::node::Node)
/// consumes: it maps message `ID`s to [`MessageSchema`]s so that frames can
/// be CRC-validated and decoded. Nodes without a dialect still frame and
/// forward traffic, but never decode it.
#[derive(Clone, Debug)]
pub struct Dialect {
    version: u8,
    messages: Vec<Arc<MessageSchema>>,
    index: HashMap<MessageId, usize>,
    enums: HashMap<String, HashMap<u64, String>>,
}

impl Dialect {
    /// Builds a dialect from message schemas.
    ///
    /// Fails when two schemas share a message `ID`.
    pub fn new(version: u8, messages: Vec<MessageSchema>) -> Result<Self, DialectError> {
        let mut index = HashMap::with_capacity(messages.len());
        for (position, message) in messages.iter().enumerate() {
            if index.insert(message.id(), position).is_some() {
                return Err(DialectError::DuplicateMessageId(message.id()));
            }
        }

        Ok(Self {
            version,
            messages: messages.into_iter().map(Arc::new).collect(),
            index,
            enums: HashMap::new(),
        })
    }

    /// Registers a named enumeration mapping values to entry names.
    ///
    /// Enumerations never affect the wire layout; they are offered back to
    /// the application via [`Dialect::enum_entry`].
    pub fn with_enum(
        mut self,
        name: impl Into<String>,
        entries: impl IntoIterator<Item = (u64, String)>,
    ) -> Self {
        self.enums.insert(name.into(), entries.into_iter().collect());
        self
    }

    /// Dialect version, reported in heartbeats as `mavlink_version`.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Schema of a message by `ID`.
    pub fn message(&self, id: MessageId) -> Option<&Arc<MessageSchema>> {
        self.index.get(&id).map(|&position| &self.messages[position])
    }

    /// Iterator over all schemas of this dialect.
    pub fn messages(&self) -> impl Iterator<Item = &Arc<MessageSchema>> {
        self.messages.iter()
    }

    /// Creates a zero-initialized message for a known `ID`.
    pub fn new_message(&self, id: MessageId) -> Option<Message> {
        self.message(id).cloned().map(Message::new)
    }

    /// Name of an enumeration entry, if the enumeration is registered.
    pub fn enum_entry(&self, enumeration: &str, value: u64) -> Option<&str> {
        self.enums
            .get(enumeration)
            .and_then(|entries| entries.get(&value))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod dialect_tests {
    use super::*;
    use crate::protocol::{FieldDef, FieldType};

    fn minimal_schema(id: MessageId) -> MessageSchema {
        MessageSchema::new(id, format!("MSG_{id}"), vec![FieldDef::new("v", FieldType::UInt8)])
            .unwrap()
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = Dialect::new(3, vec![minimal_schema(1), minimal_schema(1)]);
        assert_eq!(result.unwrap_err(), DialectError::DuplicateMessageId(1));
    }

    #[test]
    fn index_resolves_messages() {
        let dialect = Dialect::new(3, vec![minimal_schema(1), minimal_schema(66)]).unwrap();
        assert_eq!(dialect.message(66).unwrap().id(), 66);
        assert!(dialect.message(2).is_none());
        assert_eq!(dialect.new_message(1).unwrap().id(), 1);
    }

    #[test]
    fn enum_entries_resolve() {
        let dialect = Dialect::new(3, vec![minimal_schema(0)])
            .unwrap()
            .with_enum(
                "MAV_AUTOPILOT",
                [(3u64, "MAV_AUTOPILOT_ARDUPILOTMEGA".to_string())],
            );
        assert_eq!(
            dialect.enum_entry("MAV_AUTOPILOT", 3),
            Some("MAV_AUTOPILOT_ARDUPILOTMEGA")
        );
        assert_eq!(dialect.enum_entry("MAV_AUTOPILOT", 4), None);
    }
}
