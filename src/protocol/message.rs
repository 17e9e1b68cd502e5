//! Dynamic MAVLink messages.

use std::sync::Arc;

use crate::error::DialectError;
use crate::protocol::{MessageId, MessageSchema, Value};

/// A decoded or to-be-encoded MAVLink message.
///
/// A message is a [`MessageSchema`] handle plus one [`Value`] per declared
/// field. Dialects are input data, so there are no generated message
/// structs: fields are accessed by name.
///
/// # Usage
///
/// ```rust
/// # use mavnode::protocol::{FieldDef, FieldType, Message, MessageSchema};
/// # use std::sync::Arc;
/// # fn main() -> Result<(), mavnode::error::DialectError> {
/// let schema = Arc::new(MessageSchema::new(
///     0,
///     "HEARTBEAT",
///     vec![
///         FieldDef::new("type", FieldType::UInt8),
///         FieldDef::new("autopilot", FieldType::UInt8),
///         FieldDef::new("base_mode", FieldType::UInt8),
///         FieldDef::new("custom_mode", FieldType::UInt32),
///         FieldDef::new("system_status", FieldType::UInt8),
///         FieldDef::new("mavlink_version", FieldType::UInt8),
///     ],
/// )?);
///
/// let mut heartbeat = Message::new(schema);
/// heartbeat.set("type", 6u8)?;
/// heartbeat.set("custom_mode", 42u32)?;
/// assert_eq!(heartbeat.get_unsigned("custom_mode"), Some(42));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    schema: Arc<MessageSchema>,
    values: Vec<Value>,
}

impl Message {
    /// Creates a zero-initialized message for a schema.
    pub fn new(schema: Arc<MessageSchema>) -> Self {
        let values = schema.fields().iter().map(Value::zero).collect();
        Self { schema, values }
    }

    pub(crate) fn from_values(schema: Arc<MessageSchema>, values: Vec<Value>) -> Self {
        Self { schema, values }
    }

    /// Message `ID`.
    pub fn id(&self) -> MessageId {
        self.schema.id()
    }

    /// Message name.
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Schema this message was built from.
    pub fn schema(&self) -> &Arc<MessageSchema> {
        &self.schema
    }

    /// Field values in declaration order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Sets a field by name.
    ///
    /// The value kind must match the declared field type. Arrays shorter
    /// than the declared length are zero-padded.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), DialectError> {
        let index = self
            .schema
            .field_index(field)
            .ok_or_else(|| DialectError::UnknownField(field.into()))?;
        let def = &self.schema.fields()[index];

        let mut value = value.into();
        if !value.matches(def) {
            return Err(DialectError::FieldTypeMismatch(field.into()));
        }
        if let Value::Array(items) = &mut value {
            while items.len() < def.array_len() {
                items.push(Value::read_scalar(def.field_type(), &[0u8; 8]));
            }
        }

        self.values[index] = value;
        Ok(())
    }

    /// Returns a field value by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema
            .field_index(field)
            .map(|index| &self.values[index])
    }

    /// Returns an unsigned scalar field by name.
    ///
    /// Convenient for enum-backed fields such as `autopilot`.
    pub fn get_unsigned(&self, field: &str) -> Option<u64> {
        self.get(field).and_then(Value::as_unsigned)
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;
    use crate::protocol::{FieldDef, FieldType};

    fn schema() -> Arc<MessageSchema> {
        Arc::new(
            MessageSchema::new(
                42,
                "TEST",
                vec![
                    FieldDef::new("flags", FieldType::UInt8),
                    FieldDef::new("rate", FieldType::UInt16),
                    FieldDef::new("name", FieldType::Char).array(8),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn set_and_get() {
        let mut message = Message::new(schema());
        message.set("flags", 7u8).unwrap();
        message.set("rate", 400u16).unwrap();

        assert_eq!(message.get("flags"), Some(&Value::UInt8(7)));
        assert_eq!(message.get_unsigned("rate"), Some(400));
    }

    #[test]
    fn set_rejects_unknown_field() {
        let mut message = Message::new(schema());
        assert_eq!(
            message.set("bogus", 1u8).unwrap_err(),
            DialectError::UnknownField("bogus".into())
        );
    }

    #[test]
    fn set_rejects_type_mismatch() {
        let mut message = Message::new(schema());
        assert_eq!(
            message.set("flags", 1u16).unwrap_err(),
            DialectError::FieldTypeMismatch("flags".into())
        );
    }

    #[test]
    fn short_arrays_are_zero_padded() {
        let mut message = Message::new(schema());
        message.set("name", "gcs").unwrap();

        let Some(Value::Array(items)) = message.get("name") else {
            panic!("expected array value");
        };
        assert_eq!(items.len(), 8);
        assert_eq!(items[0], Value::Char(b'g'));
        assert_eq!(items[3], Value::Char(0));
    }
}
