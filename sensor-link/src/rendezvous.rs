//! Single-shot rendezvous between a blocked caller and the board's delivery thread
//!
//! Each request gets its own channel, so concurrent requests on different signals
//! or devices never observe each other's replies.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Producer half, moved into the board reply closure
pub struct Promise<T> {
    sender: Sender<T>,
}

/// Consumer half, held by the caller
pub struct Pending<T> {
    receiver: Receiver<T>,
}

/// Why a wait ended without a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// Nothing arrived within the bound
    Timeout,
    /// The promise was dropped without being fulfilled
    Abandoned,
}

/// Create a connected promise/pending pair
pub fn oneshot<T>() -> (Promise<T>, Pending<T>) {
    let (sender, receiver) = bounded(1);
    (Promise { sender }, Pending { receiver })
}

impl<T> Promise<T> {
    /// Deliver the value
    ///
    /// Returns the value back when the caller already gave up waiting, so the
    /// producer can release whatever the value refers to.
    pub fn fulfil(self, value: T) -> Result<(), T> {
        self.sender.try_send(value).map_err(|e| e.into_inner())
    }
}

impl<T> Pending<T> {
    /// Block until the value arrives or `timeout` elapses
    pub fn wait(self, timeout: Duration) -> Result<T, WaitError> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => WaitError::Timeout,
            RecvTimeoutError::Disconnected => WaitError::Abandoned,
        })
    }
}
