//! Message schemas: wire layout and CRC-extra derivation.

use std::collections::HashSet;

use crate::consts::MAX_PAYLOAD_SIZE;
use crate::error::DialectError;
use crate::protocol::{Checksum, FieldDef, MavVersion, MessageId, Value};

/// Wire-level description of a single message type.
///
/// A schema is built once from the declared field list and precomputes
/// everything the codec needs on the hot path: the wire order of fields,
/// payload sizes, and the CRC-extra byte binding frames to this schema.
///
/// Base fields are serialized in descending order of primitive size (the
/// sort is stable, so equally sized fields keep their declaration order);
/// extension fields follow in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageSchema {
    id: MessageId,
    name: String,
    fields: Vec<FieldDef>,
    /// Indices into `fields` in wire order, base fields first.
    wire_order: Vec<usize>,
    /// Number of leading entries of `wire_order` that are base fields.
    base_count: usize,
    crc_extra: u8,
    payload_len: usize,
    v1_payload_len: usize,
}

impl MessageSchema {
    /// Builds a schema from fields in declaration order.
    ///
    /// Fails when field names repeat, a base field follows an extension
    /// field, an array is empty or longer than 255 elements, or the total
    /// payload exceeds 255 bytes.
    pub fn new(
        id: MessageId,
        name: impl Into<String>,
        fields: Vec<FieldDef>,
    ) -> Result<Self, DialectError> {
        let name = name.into();

        let mut seen = HashSet::new();
        let mut extensions_started = false;
        for field in &fields {
            if !seen.insert(field.name.clone()) {
                return Err(DialectError::DuplicateField(field.name.clone()));
            }
            if field.array_len > 255 {
                return Err(DialectError::ArrayLength(field.name.clone()));
            }
            if field.extension {
                extensions_started = true;
            } else if extensions_started {
                return Err(DialectError::ExtensionOrder(field.name.clone()));
            }
        }

        let wire_order = Self::wire_order_of(&fields);
        let base_count = fields.iter().filter(|f| !f.extension).count();

        let payload_len: usize = fields.iter().map(FieldDef::wire_size).sum();
        let v1_payload_len: usize = fields
            .iter()
            .filter(|f| !f.extension)
            .map(FieldDef::wire_size)
            .sum();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(DialectError::PayloadOverflow(name));
        }

        let crc_extra = Self::crc_extra_of(&name, &fields, &wire_order, base_count);

        Ok(Self {
            id,
            name,
            fields,
            wire_order,
            base_count,
            crc_extra,
            payload_len,
            v1_payload_len,
        })
    }

    /// Message `ID`.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Message name, e.g. `HEARTBEAT`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// The CRC-extra byte of this message.
    pub fn crc_extra(&self) -> u8 {
        self.crc_extra
    }

    /// Full payload length, including extension fields.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// `MAVLink 1` payload length (base fields only).
    pub fn v1_payload_len(&self) -> usize {
        self.v1_payload_len
    }

    /// Index of a field by name, in declaration order.
    pub(crate) fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Serializes field values (declaration order) into a payload.
    ///
    /// `MAVLink 1` payloads carry base fields only. The result is the full
    /// untruncated payload for the requested version.
    pub(crate) fn encode_payload(&self, values: &[Value], version: MavVersion) -> Vec<u8> {
        let len = match version {
            MavVersion::V1 => self.v1_payload_len,
            MavVersion::V2 => self.payload_len,
        };
        let count = match version {
            MavVersion::V1 => self.base_count,
            MavVersion::V2 => self.wire_order.len(),
        };

        let mut payload = vec![0u8; len];
        let mut offset = 0;
        for &index in &self.wire_order[..count] {
            let def = &self.fields[index];
            let size = def.ty.size();
            match &values[index] {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        item.write_scalar(&mut payload[offset + i * size..]);
                    }
                }
                scalar => scalar.write_scalar(&mut payload[offset..]),
            }
            offset += def.wire_size();
        }
        payload
    }

    /// Deserializes a payload padded to [`Self::payload_len`] into field
    /// values in declaration order.
    pub(crate) fn decode_payload(&self, payload: &[u8]) -> Vec<Value> {
        debug_assert_eq!(payload.len(), self.payload_len);

        let mut values = vec![Value::UInt8(0); self.fields.len()];
        let mut offset = 0;
        for &index in &self.wire_order {
            let def = &self.fields[index];
            let size = def.ty.size();
            values[index] = if def.array_len > 0 {
                Value::Array(
                    (0..def.array_len)
                        .map(|i| Value::read_scalar(def.ty, &payload[offset + i * size..]))
                        .collect(),
                )
            } else {
                Value::read_scalar(def.ty, &payload[offset..])
            };
            offset += def.wire_size();
        }
        values
    }

    fn wire_order_of(fields: &[FieldDef]) -> Vec<usize> {
        let mut base: Vec<usize> = (0..fields.len()).filter(|&i| !fields[i].extension).collect();
        base.sort_by_key(|&i| std::cmp::Reverse(fields[i].ty.size()));

        let extensions = (0..fields.len()).filter(|&i| fields[i].extension);
        base.into_iter().chain(extensions).collect()
    }

    /// Derives the CRC-extra byte from the canonical textual signature of
    /// the message: the name and, for each base field in wire order, the C
    /// type name, the field name, and the array length byte if any. The
    /// 16-bit checksum is folded by XOR-ing its halves.
    fn crc_extra_of(
        name: &str,
        fields: &[FieldDef],
        wire_order: &[usize],
        base_count: usize,
    ) -> u8 {
        let mut crc = Checksum::new();
        crc.digest(name.as_bytes());
        crc.digest(b" ");
        for &index in &wire_order[..base_count] {
            let field = &fields[index];
            crc.digest(field.ty.wire_name().as_bytes());
            crc.digest(b" ");
            crc.digest(field.name.as_bytes());
            crc.digest(b" ");
            if field.array_len > 0 {
                crc.digest(&[field.array_len as u8]);
            }
        }
        let value = crc.value();
        ((value & 0xFF) ^ (value >> 8)) as u8
    }
}

#[cfg(test)]
mod schema_tests {
    use super::*;
    use crate::protocol::FieldType;

    fn heartbeat() -> MessageSchema {
        MessageSchema::new(
            0,
            "HEARTBEAT",
            vec![
                FieldDef::new("type", FieldType::UInt8),
                FieldDef::new("autopilot", FieldType::UInt8),
                FieldDef::new("base_mode", FieldType::UInt8),
                FieldDef::new("custom_mode", FieldType::UInt32),
                FieldDef::new("system_status", FieldType::UInt8),
                FieldDef::new("mavlink_version", FieldType::UInt8),
            ],
        )
        .unwrap()
    }

    fn request_data_stream() -> MessageSchema {
        MessageSchema::new(
            66,
            "REQUEST_DATA_STREAM",
            vec![
                FieldDef::new("target_system", FieldType::UInt8),
                FieldDef::new("target_component", FieldType::UInt8),
                FieldDef::new("req_stream_id", FieldType::UInt8),
                FieldDef::new("req_message_rate", FieldType::UInt16),
                FieldDef::new("start_stop", FieldType::UInt8),
            ],
        )
        .unwrap()
    }

    #[test]
    fn heartbeat_crc_extra_matches_published_constant() {
        assert_eq!(heartbeat().crc_extra(), 50);
    }

    #[test]
    fn request_data_stream_crc_extra_matches_published_constant() {
        assert_eq!(request_data_stream().crc_extra(), 148);
    }

    #[test]
    fn wire_order_sorts_by_size_descending() {
        let schema = heartbeat();
        // custom_mode (4 bytes) first, then the single-byte fields in
        // declaration order.
        let names: Vec<&str> = schema
            .wire_order
            .iter()
            .map(|&i| schema.fields[i].name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "custom_mode",
                "type",
                "autopilot",
                "base_mode",
                "system_status",
                "mavlink_version"
            ]
        );
        assert_eq!(schema.payload_len(), 9);
    }

    #[test]
    fn extensions_keep_declaration_order() {
        let schema = MessageSchema::new(
            7000,
            "EXTENDED",
            vec![
                FieldDef::new("a", FieldType::UInt8),
                FieldDef::new("b", FieldType::UInt32),
                FieldDef::new("ext_b", FieldType::UInt64).extension(),
                FieldDef::new("ext_a", FieldType::UInt8).extension(),
            ],
        )
        .unwrap();

        let names: Vec<&str> = schema
            .wire_order
            .iter()
            .map(|&i| schema.fields[i].name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a", "ext_b", "ext_a"]);
        assert_eq!(schema.v1_payload_len(), 5);
        assert_eq!(schema.payload_len(), 14);
    }

    #[test]
    fn base_after_extension_is_rejected() {
        let result = MessageSchema::new(
            7001,
            "BROKEN",
            vec![
                FieldDef::new("ext", FieldType::UInt8).extension(),
                FieldDef::new("base", FieldType::UInt8),
            ],
        );
        assert_eq!(result.unwrap_err(), DialectError::ExtensionOrder("base".into()));
    }

    #[test]
    fn duplicate_field_is_rejected() {
        let result = MessageSchema::new(
            7002,
            "BROKEN",
            vec![
                FieldDef::new("x", FieldType::UInt8),
                FieldDef::new("x", FieldType::UInt16),
            ],
        );
        assert_eq!(result.unwrap_err(), DialectError::DuplicateField("x".into()));
    }

    #[test]
    fn payload_roundtrip_preserves_values() {
        let schema = heartbeat();
        let values = vec![
            Value::UInt8(1),
            Value::UInt8(2),
            Value::UInt8(3),
            Value::UInt32(6),
            Value::UInt8(4),
            Value::UInt8(5),
        ];

        let payload = schema.encode_payload(&values, MavVersion::V2);
        assert_eq!(payload.len(), 9);
        assert_eq!(&payload[..4], &6u32.to_le_bytes());

        let decoded = schema.decode_payload(&payload);
        assert_eq!(decoded, values);
    }
}
