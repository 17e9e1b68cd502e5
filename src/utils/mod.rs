//! Internal utilities.

pub(crate) mod closable;
pub(crate) mod mpsc_rw;

pub(crate) use closable::{Closable, Closer, SharedCloser};
pub(crate) use mpsc_rw::{MpscReader, MpscWriter};
