//! The endpoint abstraction: channel factories with a lifetime.

use std::fmt::Debug;
use std::time::Duration;

use crate::consts::{RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY, SUPERVISOR_POOLING_INTERVAL};
use crate::io::{ChannelFactory, EndpointInfo};
use crate::utils::{Closable, Closer};

use crate::prelude::*;

/// A transport configuration that produces channels for a node.
///
/// An endpoint is consumed when the node opens it and turns into a running
/// [`EndpointHandler`]. Errors returned from [`Endpoint::open`] (bind,
/// listen, dial, port open) are fatal at node construction; runtime I/O
/// errors are confined to the channels the endpoint produced.
///
/// The built-in transports live in [`transport`](crate::io::transport).
/// Applications plug their own byte streams in through
/// [`Custom`](crate::io::transport::Custom).
pub trait Endpoint: Debug + Send {
    /// Configuration identity of this endpoint.
    fn info(&self) -> &EndpointInfo;

    /// Starts the endpoint, spawning channels through `factory`.
    fn open(self: Box<Self>, factory: ChannelFactory) -> Result<EndpointHandler>;
}

/// A running endpoint.
///
/// Owns the shutdown state of the endpoint's worker threads; dropping the
/// handler (or closing the owning node) stops them.
#[derive(Debug)]
pub struct EndpointHandler {
    info: EndpointInfo,
    state: Closer,
}

impl EndpointHandler {
    /// Creates a handler around an endpoint's shutdown state.
    pub(crate) fn new(info: EndpointInfo, state: Closer) -> Self {
        Self { info, state }
    }

    /// Configuration identity of the running endpoint.
    pub fn info(&self) -> &EndpointInfo {
        &self.info
    }

    pub(crate) fn close(&self) {
        if !self.state.is_closed() {
            log::debug!("[{:?}] closing endpoint", self.info);
            self.state.close();
        }
    }
}

impl Drop for EndpointHandler {
    fn drop(&mut self) {
        self.close();
    }
}

/// Exponential reconnection back-off: 2 s base, doubling up to 30 s.
#[derive(Debug)]
pub(crate) struct Backoff {
    delay: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            delay: RECONNECT_BASE_DELAY,
        }
    }

    /// Delay to sleep before the next attempt; doubles on every call.
    pub fn next(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay * 2).min(RECONNECT_MAX_DELAY);
        delay
    }

    pub fn reset(&mut self) {
        self.delay = RECONNECT_BASE_DELAY;
    }
}

/// Waits until a channel dies or the endpoint is asked to stop.
///
/// Returns `true` if the endpoint should keep running (and may respawn the
/// channel).
pub(crate) fn supervise_channel(endpoint_state: &Closable, channel_state: &Closable) -> bool {
    loop {
        if endpoint_state.is_closed() {
            return false;
        }
        if channel_state.is_closed() {
            return true;
        }
        endpoint_state.wait_timeout(SUPERVISOR_POOLING_INTERVAL);
    }
}

/// Sleeps a back-off delay, returning early if the endpoint is stopped.
///
/// Returns `false` when the endpoint was stopped during the sleep.
pub(crate) fn backoff_sleep(endpoint_state: &Closable, delay: Duration) -> bool {
    !endpoint_state.wait_timeout(delay)
}
