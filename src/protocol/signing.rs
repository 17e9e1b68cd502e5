//! `MAVLink 2` [message signing](https://mavlink.io/en/guide/message_signing.html) tools.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::consts::SIGNATURE_EPOCH_OFFSET;
use crate::error::FrameError;
use crate::protocol::{Frame, MavVersion};

/// Length of a signing key in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// A 32-byte secret key used to sign and verify `MAVLink 2` frames.
///
/// Keys are excluded from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; SECRET_KEY_LENGTH]);

impl SecretKey {
    /// Creates a key from raw bytes.
    pub fn new(bytes: [u8; SECRET_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Key material.
    pub fn value(&self) -> &[u8; SECRET_KEY_LENGTH] {
        &self.0
    }
}

impl From<[u8; SECRET_KEY_LENGTH]> for SecretKey {
    fn from(bytes: [u8; SECRET_KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for SecretKey {
    /// Builds a key from an arbitrary byte slice, zero-padded or truncated
    /// to 32 bytes.
    fn from(bytes: &[u8]) -> Self {
        let mut key = [0u8; SECRET_KEY_LENGTH];
        let len = bytes.len().min(SECRET_KEY_LENGTH);
        key[..len].copy_from_slice(&bytes[..len]);
        Self(key)
    }
}

impl From<&str> for SecretKey {
    fn from(value: &str) -> Self {
        Self::from(value.as_bytes())
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&"[redacted]").finish()
    }
}

/// A 48-bit MAVLink signature timestamp.
///
/// Counts 10 µs ticks since 2015-01-01 UTC.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MavTimestamp(u64);

impl MavTimestamp {
    /// Timestamp for the current system time.
    ///
    /// Clocks set before the signature epoch produce a zero timestamp.
    pub fn now() -> Self {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let micros = since_unix
            .as_micros()
            .saturating_sub(u128::from(SIGNATURE_EPOCH_OFFSET) * 1_000_000);
        Self((micros / 10) as u64)
    }

    /// Creates a timestamp from its raw tick count.
    pub fn from_raw_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw tick count.
    pub fn as_raw_u64(&self) -> u64 {
        self.0
    }

    /// Little-endian 48-bit wire representation.
    pub fn to_wire_bytes(self) -> [u8; 6] {
        let bytes = self.0.to_le_bytes();
        [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]]
    }

    /// Reads a timestamp from its 48-bit wire representation.
    pub fn from_wire_bytes(bytes: &[u8; 6]) -> Self {
        let mut raw = [0u8; 8];
        raw[..6].copy_from_slice(bytes);
        Self(u64::from_le_bytes(raw))
    }
}

/// Process-wide monotonic source of signature timestamps.
///
/// Shared by the write workers of all channels; the produced sequence never
/// regresses within a single run even when the wall clock does.
#[derive(Clone)]
pub(crate) struct UniqueMavTimestamp(Arc<AtomicU64>);

impl UniqueMavTimestamp {
    /// Creates a timestamp source seeded from the wall clock.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(
            MavTimestamp::now().as_raw_u64().saturating_sub(1),
        )))
    }

    /// Returns the next timestamp, strictly greater than any previously
    /// returned one.
    pub fn next(&self) -> MavTimestamp {
        let now = MavTimestamp::now().as_raw_u64();
        let mut last = self.0.load(Ordering::Acquire);
        loop {
            let next = now.max(last + 1);
            match self
                .0
                .compare_exchange(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return MavTimestamp::from_raw_u64(next),
                Err(observed) => last = observed,
            }
        }
    }
}

impl Debug for UniqueMavTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UniqueMavTimestamp")
            .field(&self.0.load(Ordering::Acquire))
            .finish()
    }
}

/// Signs outgoing `MAVLink 2` frames on behalf of one channel.
#[derive(Clone, Debug)]
pub(crate) struct FrameSigner {
    key: SecretKey,
    link_id: u8,
    timestamps: UniqueMavTimestamp,
}

impl FrameSigner {
    pub fn new(key: SecretKey, link_id: u8, timestamps: UniqueMavTimestamp) -> Self {
        Self {
            key,
            link_id,
            timestamps,
        }
    }

    /// Signs a frame with this channel's link `ID` and the next timestamp.
    ///
    /// `MAVLink 1` frames are left untouched.
    pub fn sign(&self, frame: &mut Frame, crc_extra: u8) {
        if let MavVersion::V2 = frame.version() {
            frame.sign_with(self.link_id, self.timestamps.next(), &self.key, crc_extra);
        }
    }
}

/// Validates signatures of incoming frames for one channel.
///
/// Owns the per-remote replay table: for every
/// `(system_id, component_id, link_id)` tuple only strictly increasing
/// timestamps are accepted.
#[derive(Debug, Default)]
pub(crate) struct SignatureVerifier {
    key: Option<SecretKey>,
    seen: HashMap<(u8, u8, u8), MavTimestamp>,
}

impl SignatureVerifier {
    pub fn new(key: Option<SecretKey>) -> Self {
        Self {
            key,
            seen: HashMap::new(),
        }
    }

    /// Checks a frame against the key and the replay table.
    ///
    /// With a key configured, only signed `MAVLink 2` frames with a valid
    /// signature pass. Without a key, signed frames are rejected.
    pub fn check(&mut self, frame: &Frame) -> Result<(), FrameError> {
        let Some(key) = &self.key else {
            return if frame.is_signed() {
                Err(FrameError::Signature)
            } else {
                Ok(())
            };
        };

        let Some(signature) = frame.signature() else {
            return Err(FrameError::Signature);
        };

        if !frame.verify_signature(key) {
            return Err(FrameError::Signature);
        }

        let link = (frame.system_id(), frame.component_id(), signature.link_id);
        if let Some(&latest) = self.seen.get(&link) {
            if signature.timestamp <= latest {
                return Err(FrameError::Signature);
            }
        }
        self.seen.insert(link, signature.timestamp);
        Ok(())
    }
}
