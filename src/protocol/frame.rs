//! MAVLink frames.

use sha2::{Digest, Sha256};

use crate::consts::{IFLAG_SIGNED, SIGNATURE_SIZE, STX_V1, STX_V2};
use crate::error::FrameError;
use crate::protocol::{
    Checksum, ComponentId, Dialect, MavTimestamp, Message, MessageId, SecretKey, SystemId,
};

/// MAVLink protocol version of a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MavVersion {
    /// `MAVLink 1` (magic `0xFE`).
    V1,
    /// `MAVLink 2` (magic `0xFD`).
    V2,
}

/// `MAVLink 2` signature block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// `ID` of the link the frame was signed on.
    pub link_id: u8,
    /// Signing timestamp.
    pub timestamp: MavTimestamp,
    /// Truncated SHA-256 of the frame keyed by the secret.
    pub value: [u8; 6],
}

/// A single MAVLink frame, the on-wire unit.
///
/// The stored payload is the wire payload: for `MAVLink 2` it is truncated
/// (trailing zero bytes stripped). [`Frame::encode`] therefore reproduces
/// the received bytes bit-exactly, which is what makes frame relaying
/// preserve the originator's identity, sequence, and signature.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    version: MavVersion,
    incompat_flags: u8,
    compat_flags: u8,
    sequence: u8,
    system_id: SystemId,
    component_id: ComponentId,
    message_id: MessageId,
    payload: Vec<u8>,
    checksum: u16,
    signature: Option<Signature>,
}

impl Frame {
    /// Builds a frame carrying `message`.
    ///
    /// The payload is serialized in the schema's wire order, truncated for
    /// `MAVLink 2`, and the checksum is computed with the schema's
    /// CRC-extra byte. The frame is returned unsigned; signing is applied
    /// by the owning channel.
    pub fn for_message(
        message: &Message,
        version: MavVersion,
        sequence: u8,
        system_id: SystemId,
        component_id: ComponentId,
    ) -> Result<Self, FrameError> {
        let message_id = message.id();
        if let MavVersion::V1 = version {
            if message_id > 0xFF {
                return Err(FrameError::MessageIdOutOfRange(message_id));
            }
        }

        let mut payload = message.schema().encode_payload(message.values(), version);
        if let MavVersion::V2 = version {
            while payload.len() > 1 && payload.last() == Some(&0) {
                payload.pop();
            }
        }

        let mut frame = Self {
            version,
            incompat_flags: 0,
            compat_flags: 0,
            sequence,
            system_id,
            component_id,
            message_id,
            payload,
            checksum: 0,
            signature: None,
        };
        frame.checksum = frame.compute_checksum(message.schema().crc_extra());
        Ok(frame)
    }

    pub(crate) fn from_wire(
        version: MavVersion,
        incompat_flags: u8,
        compat_flags: u8,
        sequence: u8,
        system_id: SystemId,
        component_id: ComponentId,
        message_id: MessageId,
        payload: Vec<u8>,
        checksum: u16,
        signature: Option<Signature>,
    ) -> Self {
        Self {
            version,
            incompat_flags,
            compat_flags,
            sequence,
            system_id,
            component_id,
            message_id,
            payload,
            checksum,
            signature,
        }
    }

    /// Protocol version.
    pub fn version(&self) -> MavVersion {
        self.version
    }

    /// Incompatibility flags (`0` for `MAVLink 1`).
    pub fn incompat_flags(&self) -> u8 {
        self.incompat_flags
    }

    /// Compatibility flags (`0` for `MAVLink 1`).
    pub fn compat_flags(&self) -> u8 {
        self.compat_flags
    }

    /// Packet sequence number.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// System `ID` of the sender.
    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    /// Component `ID` of the sender.
    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    /// Message `ID`.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Wire payload (truncated for `MAVLink 2`).
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Packet checksum.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Signature block of a signed frame.
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Whether the frame carries a signature.
    pub fn is_signed(&self) -> bool {
        self.incompat_flags & IFLAG_SIGNED != 0 && self.signature.is_some()
    }

    /// Size of the encoded frame in bytes.
    pub fn wire_size(&self) -> usize {
        let header = match self.version {
            MavVersion::V1 => 6,
            MavVersion::V2 => 10,
        };
        let signature = if self.is_signed() { SIGNATURE_SIZE } else { 0 };
        header + self.payload.len() + 2 + signature
    }

    /// Appends the wire representation of this frame to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.write_wire(buf, true);
    }

    /// Decodes the payload into a [`Message`] using `dialect`.
    ///
    /// The payload is zero-padded back to the schema's full size before
    /// field extraction, undoing `MAVLink 2` truncation.
    pub fn decode(&self, dialect: &Dialect) -> Result<Message, FrameError> {
        let schema = dialect
            .message(self.message_id)
            .ok_or(FrameError::UnknownMessageId(self.message_id))?;

        if self.payload.len() > schema.payload_len() {
            return Err(FrameError::Truncated);
        }
        let mut padded = self.payload.clone();
        padded.resize(schema.payload_len(), 0);

        let values = schema.decode_payload(&padded);
        Ok(Message::from_values(schema.clone(), values))
    }

    /// Computes the checksum over `length .. payload` plus `crc_extra`.
    pub(crate) fn compute_checksum(&self, crc_extra: u8) -> u16 {
        let mut crc = Checksum::new();
        let len = self.payload.len() as u8;
        match self.version {
            MavVersion::V1 => {
                crc.digest(&[
                    len,
                    self.sequence,
                    self.system_id,
                    self.component_id,
                    self.message_id as u8,
                ]);
            }
            MavVersion::V2 => {
                let id = self.message_id.to_le_bytes();
                crc.digest(&[
                    len,
                    self.incompat_flags,
                    self.compat_flags,
                    self.sequence,
                    self.system_id,
                    self.component_id,
                    id[0],
                    id[1],
                    id[2],
                ]);
            }
        }
        crc.digest(&self.payload);
        crc.digest(&[crc_extra]);
        crc.value()
    }

    /// Signs this frame.
    ///
    /// Sets the signed incompatibility flag and recomputes the checksum
    /// (the flag is part of the CRC input) before hashing, so the produced
    /// frame verifies on the receiving side.
    pub(crate) fn sign_with(
        &mut self,
        link_id: u8,
        timestamp: MavTimestamp,
        key: &SecretKey,
        crc_extra: u8,
    ) {
        self.incompat_flags |= IFLAG_SIGNED;
        self.checksum = self.compute_checksum(crc_extra);
        let value = self.signature_value(link_id, timestamp, key);
        self.signature = Some(Signature {
            link_id,
            timestamp,
            value,
        });
    }

    /// Verifies the signature of this frame against `key`.
    pub fn verify_signature(&self, key: &SecretKey) -> bool {
        match &self.signature {
            Some(signature) => {
                self.signature_value(signature.link_id, signature.timestamp, key)
                    == signature.value
            }
            None => false,
        }
    }

    /// The 6-byte signature of the frame contents through the checksum,
    /// the link `ID`, and the timestamp, keyed by prepending the secret.
    fn signature_value(&self, link_id: u8, timestamp: MavTimestamp, key: &SecretKey) -> [u8; 6] {
        let mut unsigned = Vec::with_capacity(self.wire_size());
        self.write_wire(&mut unsigned, false);

        let mut hasher = Sha256::new();
        hasher.update(key.value());
        hasher.update(&unsigned);
        hasher.update([link_id]);
        hasher.update(timestamp.to_wire_bytes());
        let digest = hasher.finalize();

        let mut value = [0u8; 6];
        value.copy_from_slice(&digest[..6]);
        value
    }

    fn write_wire(&self, buf: &mut Vec<u8>, include_signature: bool) {
        let len = self.payload.len() as u8;
        match self.version {
            MavVersion::V1 => {
                buf.extend_from_slice(&[
                    STX_V1,
                    len,
                    self.sequence,
                    self.system_id,
                    self.component_id,
                    self.message_id as u8,
                ]);
            }
            MavVersion::V2 => {
                let id = self.message_id.to_le_bytes();
                buf.extend_from_slice(&[
                    STX_V2,
                    len,
                    self.incompat_flags,
                    self.compat_flags,
                    self.sequence,
                    self.system_id,
                    self.component_id,
                    id[0],
                    id[1],
                    id[2],
                ]);
            }
        }
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());

        if include_signature {
            if let Some(signature) = &self.signature {
                buf.push(signature.link_id);
                buf.extend_from_slice(&signature.timestamp.to_wire_bytes());
                buf.extend_from_slice(&signature.value);
            }
        }
    }
}
