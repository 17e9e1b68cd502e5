//! CRC-16/MCRF4XX, the X.25 checksum variant used by MAVLink.

use crc16::{State, MCRF4XX};

/// Incremental MAVLink checksum accumulator.
///
/// Seeded with `0xFFFF`, reflected input and output, no final XOR.
pub(crate) struct Checksum(State<MCRF4XX>);

impl Checksum {
    pub fn new() -> Self {
        Self(State::new())
    }

    /// Feeds `bytes` into the accumulator.
    pub fn digest(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Current checksum value.
    pub fn value(&self) -> u16 {
        self.0.get()
    }
}

#[cfg(test)]
mod crc_tests {
    use super::*;

    #[test]
    fn mcrf4xx_check_value() {
        let mut crc = Checksum::new();
        crc.digest(b"123456789");
        assert_eq!(crc.value(), 0x6F91);
    }

    #[test]
    fn incremental_equals_oneshot() {
        let mut oneshot = Checksum::new();
        oneshot.digest(b"HEARTBEAT uint32_t custom_mode ");

        let mut incremental = Checksum::new();
        incremental.digest(b"HEARTBEAT ");
        incremental.digest(b"uint32_t ");
        incremental.digest(b"custom_mode ");

        assert_eq!(oneshot.value(), incremental.value());
    }
}
