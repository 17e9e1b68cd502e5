//! Channels: one parser/writer pair bound to one byte stream.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::io::{ChannelDetails, ChannelId, ChannelInfo, Receiver, Sender};
use crate::node::Event;
use crate::protocol::{
    ComponentId, Dialect, FrameSigner, MavVersion, SecretKey, SignatureVerifier, SystemId,
    UniqueMavTimestamp,
};
use crate::utils::{Closable, SharedCloser};

use crate::prelude::*;

/// A write request queued on a channel.
///
/// Messages are framed by the channel's write worker with the channel's own
/// sequence number; frames are shipped as-is, preserving the originator's
/// identity, sequence and signature.
#[derive(Clone, Debug)]
pub(crate) enum WriteRequest {
    Message(Arc<Message>),
    Frame(Arc<Frame>),
}

/// Write-side handle of a running channel.
#[derive(Clone, Debug)]
pub(crate) struct ChannelHandle {
    info: ChannelInfo,
    writer: mpsc::Sender<WriteRequest>,
    state: SharedCloser,
}

/// The set of currently open channels of a node.
///
/// Shared between the node (fan-out writes), endpoints (spawn), and the
/// channels themselves (deregistration on close).
#[derive(Clone, Debug, Default)]
pub(crate) struct ChannelRegistry(Arc<Mutex<HashMap<ChannelId, ChannelHandle>>>);

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, handle: ChannelHandle) {
        self.0.lock().unwrap().insert(handle.info.id(), handle);
    }

    fn remove(&self, id: ChannelId) {
        self.0.lock().unwrap().remove(&id);
    }

    /// Enqueues a request on every open channel.
    pub fn send_all(&self, request: WriteRequest) {
        for handle in self.0.lock().unwrap().values() {
            let _ = handle.writer.send(request.clone());
        }
    }

    /// Enqueues a request on every open channel except `excluded`.
    pub fn send_except(&self, excluded: ChannelId, request: WriteRequest) {
        for handle in self.0.lock().unwrap().values() {
            if handle.info.id() != excluded {
                let _ = handle.writer.send(request.clone());
            }
        }
    }

    /// Enqueues a request on a single channel, if it is still open.
    pub fn send_to(&self, target: ChannelId, request: WriteRequest) {
        if let Some(handle) = self.0.lock().unwrap().get(&target) {
            let _ = handle.writer.send(request);
        }
    }

    /// Closes all channels and drops their write queues.
    pub fn close_all(&self) {
        let mut channels = self.0.lock().unwrap();
        for handle in channels.values() {
            handle.state.close();
        }
        channels.clear();
    }
}

/// Factory that spawns channels publishing into one node.
///
/// A factory is handed to every [`Endpoint`](crate::io::Endpoint) at node
/// construction; endpoints call [`ChannelFactory::spawn`] for every byte
/// stream they produce.
#[derive(Clone, Debug)]
pub struct ChannelFactory {
    pub(crate) node_state: Closable,
    pub(crate) events: SyncSender<Event>,
    pub(crate) registry: ChannelRegistry,
    pub(crate) dialect: Option<Arc<Dialect>>,
    pub(crate) version: MavVersion,
    pub(crate) system_id: SystemId,
    pub(crate) component_id: ComponentId,
    pub(crate) in_key: Option<SecretKey>,
    pub(crate) out_key: Option<SecretKey>,
    pub(crate) timestamps: UniqueMavTimestamp,
    pub(crate) link_ids: Arc<AtomicU8>,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) idle_timeout: Duration,
}

impl ChannelFactory {
    /// Returns `true` if the owning node is closed.
    pub fn is_closed(&self) -> bool {
        self.node_state.is_closed()
    }

    /// Deadline endpoints should apply to blocking writes, where the
    /// transport supports one (currently TCP streams only).
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Idle timeout after which UDP server channels are evicted.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Spawns a channel around a byte stream.
    ///
    /// Registers the channel, publishes
    /// [`Event::ChannelOpen`](crate::node::Event::ChannelOpen), and starts
    /// the read and write workers. The returned state closes when the
    /// channel dies; closing it stops the workers.
    pub(crate) fn spawn<R, W>(&self, details: ChannelDetails, reader: R, writer: W) -> SharedCloser
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let info = ChannelInfo::new(details);
        let state = SharedCloser::new();

        log::debug!("[{info:?}] spawning channel");

        let (write_tx, write_rx) = mpsc::channel();
        self.registry.insert(ChannelHandle {
            info: info.clone(),
            writer: write_tx,
            state: state.clone(),
        });

        if self
            .events
            .send(Event::ChannelOpen {
                channel: info.clone(),
            })
            .is_err()
        {
            // The node is already gone.
            self.registry.remove(info.id());
            state.close();
            return state;
        }

        let write_worker = WriteWorker {
            state: state.clone(),
            node_state: self.node_state.clone(),
            info: info.clone(),
            version: self.version,
            system_id: self.system_id,
            component_id: self.component_id,
            signer: self.out_key.clone().map(|key| {
                let link_id = self.link_ids.fetch_add(1, Ordering::Relaxed);
                FrameSigner::new(key, link_id, self.timestamps.clone())
            }),
        };
        {
            let sender = Sender::new(writer);
            thread::spawn(move || write_worker.run(write_rx, sender));
        }

        let read_worker = ReadWorker {
            state: state.clone(),
            node_state: self.node_state.clone(),
            info,
            dialect: self.dialect.clone(),
            verifier: SignatureVerifier::new(self.in_key.clone()),
            events: self.events.clone(),
            registry: self.registry.clone(),
            read_timeout: self.read_timeout,
        };
        {
            let receiver = Receiver::new(reader, self.dialect.clone());
            thread::spawn(move || read_worker.run(receiver));
        }

        state
    }
}

struct WriteWorker {
    state: SharedCloser,
    node_state: Closable,
    info: ChannelInfo,
    version: MavVersion,
    system_id: SystemId,
    component_id: ComponentId,
    signer: Option<FrameSigner>,
}

impl WriteWorker {
    /// Drains the write queue until the channel dies or the queue closes.
    ///
    /// Writes are serialized here, so concurrent callers never interleave a
    /// frame on the wire, and the queue keeps callers from blocking on slow
    /// peers.
    fn run<W: Write>(self, requests: mpsc::Receiver<WriteRequest>, mut sender: Sender<W>) {
        let mut sequence: u8 = 0;

        for request in requests {
            if self.state.is_closed() || self.node_state.is_closed() {
                break;
            }

            let frame = match request {
                WriteRequest::Message(message) => {
                    match Frame::for_message(
                        &message,
                        self.version,
                        sequence,
                        self.system_id,
                        self.component_id,
                    ) {
                        Ok(mut frame) => {
                            if let Some(signer) = &self.signer {
                                signer.sign(&mut frame, message.schema().crc_extra());
                            }
                            sequence = sequence.wrapping_add(1);
                            frame
                        }
                        Err(err) => {
                            log::warn!("[{:?}] dropping unencodable message: {err}", self.info);
                            continue;
                        }
                    }
                }
                WriteRequest::Frame(frame) => (*frame).clone(),
            };

            if let Err(err) = sender.send(&frame) {
                log::debug!("[{:?}] write failed: {err}", self.info);
                break;
            }
            log::trace!("[{:?}] written frame seq={}", self.info, frame.sequence());
        }

        self.state.close();
        log::trace!("[{:?}] write worker stopped", self.info);
    }
}

struct ReadWorker {
    state: SharedCloser,
    node_state: Closable,
    info: ChannelInfo,
    dialect: Option<Arc<Dialect>>,
    verifier: SignatureVerifier,
    events: SyncSender<Event>,
    registry: ChannelRegistry,
    read_timeout: Duration,
}

impl ReadWorker {
    /// Decodes frames until the stream dies, the read deadline expires, or
    /// the channel is closed. Owns the channel lifecycle: deregisters the
    /// channel and publishes `ChannelClose` on exit.
    fn run<R: Read>(mut self, mut receiver: Receiver<R>) {
        let mut last_data = Instant::now();

        loop {
            if self.state.is_closed() || self.node_state.is_closed() {
                break;
            }

            match receiver.recv() {
                Ok(frame) => {
                    last_data = Instant::now();
                    if !self.process_frame(frame) {
                        break;
                    }
                }
                Err(Error::Frame(err)) => {
                    last_data = Instant::now();
                    log::debug!("[{:?}] parse error: {err}", self.info);
                    if !self.publish(Event::ParseError {
                        channel: self.info.clone(),
                        error: err,
                    }) {
                        break;
                    }
                }
                Err(Error::Io(err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    if last_data.elapsed() > self.read_timeout {
                        log::debug!("[{:?}] read timed out", self.info);
                        break;
                    }
                }
                Err(err) => {
                    log::debug!("[{:?}] read failed: {err}", self.info);
                    break;
                }
            }
        }

        self.state.close();
        self.registry.remove(self.info.id());
        let _ = self.events.send(Event::ChannelClose {
            channel: self.info.clone(),
        });
        log::debug!("[{:?}] channel closed", self.info);
    }

    /// Verifies, decodes, and publishes one received frame.
    ///
    /// Returns `false` once the node stops accepting events.
    fn process_frame(&mut self, frame: Frame) -> bool {
        if let Err(err) = self.verifier.check(&frame) {
            log::debug!("[{:?}] rejected frame: {err}", self.info);
            return self.publish(Event::ParseError {
                channel: self.info.clone(),
                error: err,
            });
        }

        let message = match &self.dialect {
            None => None,
            Some(dialect) => match frame.decode(dialect) {
                Ok(message) => Some(message),
                Err(err) => {
                    // An unknown message is still delivered as a raw frame
                    // below so it can be relayed; other decode failures
                    // drop the frame.
                    let deliver_raw = matches!(err, FrameError::UnknownMessageId(_));
                    let accepted = self.publish(Event::ParseError {
                        channel: self.info.clone(),
                        error: err,
                    });
                    if !deliver_raw || !accepted {
                        return accepted;
                    }
                    None
                }
            },
        };

        log::trace!("[{:?}] received frame seq={}", self.info, frame.sequence());
        self.publish(Event::Frame {
            channel: self.info.clone(),
            frame,
            message,
        })
    }

    fn publish(&self, event: Event) -> bool {
        self.events.send(event).is_ok()
    }
}
