//! Notification dispatch
//!
//! Runs on the board's delivery thread. Each subscription owns a [`DispatchSlot`];
//! the trampoline handed to the board only holds a weak reference to it, so a
//! frame racing with an unsubscribe finds the slot gone and is dropped silently.

use crate::board::Trampoline;
use crate::decoder;
use crate::signals::{SignalId, Subscriber};
use crate::types::{DataFrame, Sample, UnknownEntry};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// User callback receiving decoded samples
pub type SampleCallback = Box<dyn FnMut(Sample) + Send>;

/// User callback receiving frames that could not be decoded
pub type UnknownEntryCallback = Box<dyn FnMut(UnknownEntry) + Send>;

/// Longest the delivery thread waits for a concurrent dispatch on the same slot
const CALLBACK_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// Dispatch target of one subscription
pub struct DispatchSlot {
    signal: SignalId,
    on_sample: Mutex<SampleCallback>,
    on_unknown: Option<Mutex<UnknownEntryCallback>>,
    delivered: AtomicU64,
    rejected: AtomicU64,
}

impl DispatchSlot {
    pub fn new(signal: SignalId, subscriber: Subscriber) -> Self {
        Self {
            signal,
            on_sample: Mutex::new(subscriber.on_sample),
            on_unknown: subscriber.on_unknown.map(Mutex::new),
            delivered: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Decode a frame and hand it to the subscriber
    pub fn dispatch(&self, frame: &DataFrame) {
        match decoder::decode_frame(frame) {
            Ok(sample) => {
                log::trace!("[{}] dispatching sample at epoch {}", self.signal, sample.epoch);
                match self.on_sample.try_lock_for(CALLBACK_LOCK_TIMEOUT) {
                    Some(mut callback) => {
                        callback(sample);
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    None => log::warn!(
                        "[{}] callback busy for {:?}, dropping sample at epoch {}",
                        self.signal,
                        CALLBACK_LOCK_TIMEOUT,
                        frame.epoch
                    ),
                }
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                let entry = UnknownEntry {
                    epoch: frame.epoch,
                    id: frame.type_id,
                    data: frame.data.clone(),
                };
                match &self.on_unknown {
                    Some(on_unknown) => match on_unknown.try_lock_for(CALLBACK_LOCK_TIMEOUT) {
                        Some(mut callback) => callback(entry),
                        None => log::warn!("[{}] unknown-entry callback busy: {}", self.signal, e),
                    },
                    None => log::warn!("[{}] dropping frame: {}", self.signal, e),
                }
            }
        }
    }

    pub fn signal(&self) -> SignalId {
        self.signal
    }

    /// Samples handed to the callback so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Frames that failed to decode so far
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Build the board-facing trampoline for a slot
///
/// The trampoline keeps only a weak reference, so it becomes inert as soon as the
/// owning subscription is dropped, even if the board still holds on to it.
pub fn trampoline(slot: &Arc<DispatchSlot>) -> Trampoline {
    let signal = slot.signal;
    let slot = Arc::downgrade(slot);
    Arc::new(move |frame: &DataFrame| match slot.upgrade() {
        Some(slot) => slot.dispatch(frame),
        None => log::trace!(
            "[{}] subscription released, dropping frame at epoch {}",
            signal,
            frame.epoch
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::encode_frame;
    use crate::types::SampleValue;

    type Collected<T> = Arc<Mutex<Vec<T>>>;

    fn collecting_slot() -> (Arc<DispatchSlot>, Collected<Sample>, Collected<UnknownEntry>) {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let unknown = Arc::new(Mutex::new(Vec::new()));
        let s = samples.clone();
        let u = unknown.clone();
        let subscriber = Subscriber::new(move |sample| s.lock().push(sample))
            .with_unknown_entries(move |entry| u.lock().push(entry));
        (
            Arc::new(DispatchSlot::new(SignalId::Switch, subscriber)),
            samples,
            unknown,
        )
    }

    #[test]
    fn test_dispatch_decodes_and_delivers() {
        let (slot, samples, unknown) = collecting_slot();
        slot.dispatch(&encode_frame(10, &SampleValue::Uint32(1)));
        slot.dispatch(&DataFrame::new(11, 0xEE, vec![1, 2]));
        slot.dispatch(&encode_frame(12, &SampleValue::Uint32(0)));

        let samples = samples.lock();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], Sample::new(10, SampleValue::Uint32(1)));
        assert_eq!(samples[1], Sample::new(12, SampleValue::Uint32(0)));

        let unknown = unknown.lock();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].id, 0xEE);
        assert_eq!(unknown[0].data, vec![1, 2]);

        assert_eq!(slot.delivered(), 2);
        assert_eq!(slot.rejected(), 1);
    }

    #[test]
    fn test_trampoline_goes_inert_after_drop() {
        let (slot, samples, _) = collecting_slot();
        let tramp = trampoline(&slot);

        tramp(&encode_frame(1, &SampleValue::Uint32(1)));
        drop(slot);
        tramp(&encode_frame(2, &SampleValue::Uint32(0)));

        assert_eq!(samples.lock().len(), 1);
    }
}
