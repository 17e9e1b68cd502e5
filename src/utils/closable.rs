//! # Shutdown signalling
//!
//! Distributed workers need a way to learn that the resource they serve is
//! gone. Three levels of access are provided:
//!
//! * [`Closer`] owns the state and closes it when dropped.
//! * [`SharedCloser`] is a clonable handle with explicit [`SharedCloser::close`];
//!   dropping a copy does nothing.
//! * [`Closable`] is a read-only observer that can also wait for the closed
//!   state with a deadline.
//!
//! Closing wakes all pending [`Closable::wait_timeout`] calls immediately,
//! which keeps timed workers (emitters, supervisors) responsive to shutdown
//! without busy polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct State {
    closed: AtomicBool,
    lock: Mutex<()>,
    notify: Condvar,
}

impl State {
    fn close(&self) {
        let _guard = self.lock.lock().unwrap();
        self.closed.store(true, Ordering::Release);
        self.notify.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Owning handle to a closable state.
///
/// The state becomes closed when [`Closer::close`] is called or when the
/// owner goes out of scope. Intentionally not [`Clone`]: shared ownership
/// goes through [`Closer::to_shared`].
#[derive(Debug, Default)]
pub(crate) struct Closer(Arc<State>);

impl Closer {
    pub fn new() -> Self {
        Self(Arc::new(State::default()))
    }

    /// Read-only view of this state.
    pub fn to_closable(&self) -> Closable {
        Closable(self.0.clone())
    }

    /// Clonable handle sharing this state.
    pub fn to_shared(&self) -> SharedCloser {
        SharedCloser(self.0.clone())
    }

    pub fn close(&self) {
        self.0.close();
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        self.close()
    }
}

/// Clonable handle to a closable state.
///
/// Unlike [`Closer`], dropping a [`SharedCloser`] leaves the state open:
/// only an explicit [`SharedCloser::close`] (on any copy) closes it.
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedCloser(Arc<State>);

impl SharedCloser {
    pub fn new() -> Self {
        Self(Arc::new(State::default()))
    }

    pub fn to_closable(&self) -> Closable {
        Closable(self.0.clone())
    }

    pub fn close(&self) {
        self.0.close();
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Read-only observer of a closable state.
#[derive(Clone, Debug)]
pub(crate) struct Closable(Arc<State>);

impl Closable {
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    /// Blocks until the state is closed.
    pub fn wait(&self) {
        let mut guard = self.0.lock.lock().unwrap();
        while !self.0.is_closed() {
            guard = self.0.notify.wait(guard).unwrap();
        }
    }

    /// Blocks until the state is closed or `timeout` elapses.
    ///
    /// Returns `true` if the state is closed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.0.lock.lock().unwrap();
        loop {
            if self.0.is_closed() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self.0.notify.wait_timeout(guard, deadline - now).unwrap();
            guard = next;
        }
    }
}
