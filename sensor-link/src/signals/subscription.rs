//! Subscription tokens and the per-device subscription table

use super::SignalId;
use crate::board::Trampoline;
use crate::dispatch::{self, DispatchSlot, SampleCallback, UnknownEntryCallback};
use crate::types::{Error, Result, Sample, SignalHandle, UnknownEntry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Callbacks supplied by the caller for one signal
pub struct Subscriber {
    pub(crate) on_sample: SampleCallback,
    pub(crate) on_unknown: Option<UnknownEntryCallback>,
}

impl Subscriber {
    /// Create a subscriber from a sample callback
    pub fn new(on_sample: impl FnMut(Sample) + Send + 'static) -> Self {
        Self {
            on_sample: Box::new(on_sample),
            on_unknown: None,
        }
    }

    /// Builder method: receive frames whose payload could not be decoded
    pub fn with_unknown_entries(
        mut self,
        on_unknown: impl FnMut(UnknownEntry) + Send + 'static,
    ) -> Self {
        self.on_unknown = Some(Box::new(on_unknown));
        self
    }
}

impl<F> From<F> for Subscriber
where
    F: FnMut(Sample) + Send + 'static,
{
    fn from(on_sample: F) -> Self {
        Subscriber::new(on_sample)
    }
}

/// Live subscription of one signal
///
/// Exclusively owns the dispatch slot (the user callbacks) and the trampoline
/// registered with the board. Dropping the token invalidates the trampoline.
pub struct Subscription {
    signal: SignalId,
    handle: SignalHandle,
    slot: Arc<DispatchSlot>,
    trampoline: Trampoline,
}

impl Subscription {
    pub(crate) fn new(signal: SignalId, handle: SignalHandle, subscriber: Subscriber) -> Self {
        let slot = Arc::new(DispatchSlot::new(signal, subscriber));
        let trampoline = dispatch::trampoline(&slot);
        Self {
            signal,
            handle,
            slot,
            trampoline,
        }
    }

    pub fn signal(&self) -> SignalId {
        self.signal
    }

    /// Board handle the trampoline is registered on
    pub fn handle(&self) -> SignalHandle {
        self.handle
    }

    /// Samples delivered to the callback so far
    pub fn delivered(&self) -> u64 {
        self.slot.delivered()
    }

    /// Frames rejected by the decoder so far
    pub fn rejected(&self) -> u64 {
        self.slot.rejected()
    }

    pub(crate) fn trampoline(&self) -> Trampoline {
        Arc::clone(&self.trampoline)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("signal", &self.signal)
            .field("handle", &self.handle)
            .field("delivered", &self.delivered())
            .finish()
    }
}

/// At most one subscription per signal
#[derive(Default)]
pub struct SubscriptionTable {
    subscriptions: Mutex<HashMap<SignalId, Subscription>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a subscription and register it with the board
    ///
    /// `register` receives the trampoline and performs the board-side registration;
    /// if it fails the subscription is not recorded.
    pub fn insert<F>(
        &self,
        signal: SignalId,
        handle: SignalHandle,
        subscriber: Subscriber,
        register: F,
    ) -> Result<()>
    where
        F: FnOnce(Trampoline) -> Result<()>,
    {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(&signal) {
            return Err(Error::AlreadySubscribed { signal });
        }

        let subscription = Subscription::new(signal, handle, subscriber);
        register(subscription.trampoline())?;
        subscriptions.insert(signal, subscription);
        Ok(())
    }

    /// Take the subscription out of the table, `None` if there was none
    pub fn remove(&self, signal: SignalId) -> Option<Subscription> {
        self.subscriptions.lock().remove(&signal)
    }

    pub fn contains(&self, signal: SignalId) -> bool {
        self.subscriptions.lock().contains_key(&signal)
    }

    /// Samples delivered so far on the signal's subscription
    pub fn delivered(&self, signal: SignalId) -> Option<u64> {
        self.subscriptions.lock().get(&signal).map(Subscription::delivered)
    }

    /// Signals with a live subscription
    pub fn signals(&self) -> Vec<SignalId> {
        let mut signals: Vec<SignalId> = self.subscriptions.lock().keys().copied().collect();
        signals.sort_unstable();
        signals
    }

    /// Drop every subscription, returning them for board-side cleanup
    pub fn drain(&self) -> Vec<Subscription> {
        self.subscriptions.lock().drain().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_subscription_per_signal() {
        let table = SubscriptionTable::new();
        let handle = SignalHandle(1);

        table
            .insert(SignalId::Battery, handle, Subscriber::new(|_| {}), |_| Ok(()))
            .unwrap();
        let err = table
            .insert(SignalId::Battery, handle, Subscriber::new(|_| {}), |_| Ok(()))
            .unwrap_err();
        assert_eq!(
            err,
            Error::AlreadySubscribed {
                signal: SignalId::Battery
            }
        );

        assert!(table.remove(SignalId::Battery).is_some());
        assert!(table.remove(SignalId::Battery).is_none());
        table
            .insert(SignalId::Battery, handle, Subscriber::new(|_| {}), |_| Ok(()))
            .unwrap();
        assert_eq!(table.signals(), vec![SignalId::Battery]);
    }

    #[test]
    fn test_failed_registration_is_not_recorded() {
        let table = SubscriptionTable::new();
        let result = table.insert(
            SignalId::Switch,
            SignalHandle(3),
            Subscriber::new(|_| {}),
            |_| Err(Error::Board("rejected".to_string())),
        );
        assert!(result.is_err());
        assert!(!table.contains(SignalId::Switch));
    }
}
