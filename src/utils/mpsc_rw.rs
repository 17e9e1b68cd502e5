//! In-process byte pipes backed by [`mpsc`] channels.
//!
//! A UDP server demultiplexes a single socket into one channel per remote.
//! Each remote gets an [`MpscReader`] fed by the socket loop and an
//! [`MpscWriter`] drained by a per-remote forwarder.

use std::cmp::min;
use std::io::{Read, Write};
use std::sync::mpsc;

/// Wrapper around [`mpsc::Receiver`] that implements [`Read`].
///
/// Returns [`ErrorKind::ConnectionAborted`](std::io::ErrorKind::ConnectionAborted)
/// once the feeding side is gone.
#[derive(Debug)]
pub(crate) struct MpscReader {
    receiver: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl MpscReader {
    pub fn new(receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            receiver,
            pending: Vec::new(),
        }
    }
}

impl Read for MpscReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            let mut received = self.receiver.recv().map_err(|err| {
                std::io::Error::new(std::io::ErrorKind::ConnectionAborted, err)
            })?;
            self.pending.append(&mut received);
        }

        let bytes_read = min(self.pending.len(), buf.len());
        buf[..bytes_read].copy_from_slice(&self.pending[..bytes_read]);
        self.pending.drain(..bytes_read);
        Ok(bytes_read)
    }
}

/// Wrapper around [`mpsc::Sender`] that implements [`Write`].
///
/// Each `write` forwards one buffer, so a frame written with a single call
/// stays one datagram on the far side.
#[derive(Clone, Debug)]
pub(crate) struct MpscWriter {
    sender: mpsc::Sender<Vec<u8>>,
}

impl MpscWriter {
    pub fn new(sender: mpsc::Sender<Vec<u8>>) -> Self {
        Self { sender }
    }
}

impl Write for MpscWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.sender.send(buf.to_vec()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "byte pipe closed")
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
