//! Per-device signal registry
//!
//! Resolves logical signals to board handles once and caches them. The cached
//! entry also tracks which handle is currently active: the raw signal, or a time
//! processor chained in front of it.

use super::SignalId;
use crate::decoder::DataType;
use crate::types::{Error, Result, SignalHandle};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A resolved data signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Logical signal
    pub id: SignalId,
    /// Handle of the raw board signal
    pub raw_handle: SignalHandle,
    /// Time processor chained after the raw signal, if any
    pub processor: Option<SignalHandle>,
    /// Payload type the board emits
    pub data_type: DataType,
    /// True if resolved to the high-frequency streaming variant
    pub high_frequency: bool,
}

impl Signal {
    /// Handle subscribe/log calls must target
    pub fn active_handle(&self) -> SignalHandle {
        self.processor.unwrap_or(self.raw_handle)
    }
}

/// Cache of resolved signals for one device
#[derive(Default)]
pub struct SignalRegistry {
    signals: RwLock<HashMap<SignalId, Signal>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached signal, resolving it through `lookup` on first access
    ///
    /// `lookup` returns `Ok(None)` when the board does not carry the signal.
    pub fn resolve<F>(&self, id: SignalId, high_frequency: bool, lookup: F) -> Result<Signal>
    where
        F: FnOnce(SignalId, bool) -> Result<Option<SignalHandle>>,
    {
        if let Some(signal) = self.signals.read().get(&id) {
            return Ok(signal.clone());
        }

        let mut signals = self.signals.write();
        // Another caller may have resolved it while we waited for the write lock
        if let Some(signal) = signals.get(&id) {
            return Ok(signal.clone());
        }

        let raw_handle =
            lookup(id, high_frequency)?.ok_or(Error::UnsupportedModule { signal: id })?;
        log::debug!("Resolved {} to {}", id, raw_handle);

        let signal = Signal {
            id,
            raw_handle,
            processor: None,
            data_type: id.data_type(),
            high_frequency,
        };
        signals.insert(id, signal.clone());
        Ok(signal)
    }

    /// Cached signal, without resolving
    pub fn get(&self, id: SignalId) -> Option<Signal> {
        self.signals.read().get(&id).cloned()
    }

    /// Make `processor` the active handle, returning the processor it replaces
    pub fn bind_processor(
        &self,
        id: SignalId,
        processor: SignalHandle,
    ) -> Result<Option<SignalHandle>> {
        let mut signals = self.signals.write();
        let signal = signals
            .get_mut(&id)
            .ok_or_else(|| Error::Configuration(format!("{} has not been resolved", id)))?;
        Ok(signal.processor.replace(processor))
    }

    /// Revert to the raw handle, returning the processor that was active
    pub fn clear_processor(&self, id: SignalId) -> Option<SignalHandle> {
        self.signals
            .write()
            .get_mut(&id)
            .and_then(|signal| signal.processor.take())
    }

    /// Forget a signal; the next access resolves it again
    pub fn remove(&self, id: SignalId) -> Option<Signal> {
        self.signals.write().remove(&id)
    }

    /// Number of cached signals
    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_resolve_is_cached() {
        let registry = SignalRegistry::new();
        let lookups = Cell::new(0);

        for _ in 0..3 {
            let signal = registry
                .resolve(SignalId::Gyroscope, false, |_, _| {
                    lookups.set(lookups.get() + 1);
                    Ok(Some(SignalHandle(42)))
                })
                .unwrap();
            assert_eq!(signal.raw_handle, SignalHandle(42));
            assert_eq!(signal.active_handle(), SignalHandle(42));
        }

        assert_eq!(lookups.get(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unsupported_module_is_not_cached() {
        let registry = SignalRegistry::new();
        let err = registry
            .resolve(SignalId::Color, false, |_, _| Ok(None))
            .unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedModule {
                signal: SignalId::Color
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_processor_binding() {
        let registry = SignalRegistry::new();
        registry
            .resolve(SignalId::Quaternion, false, |_, _| Ok(Some(SignalHandle(7))))
            .unwrap();

        assert_eq!(registry.bind_processor(SignalId::Quaternion, SignalHandle(100)).unwrap(), None);
        assert_eq!(
            registry.get(SignalId::Quaternion).unwrap().active_handle(),
            SignalHandle(100)
        );
        assert_eq!(
            registry.bind_processor(SignalId::Quaternion, SignalHandle(101)).unwrap(),
            Some(SignalHandle(100))
        );
        assert_eq!(registry.clear_processor(SignalId::Quaternion), Some(SignalHandle(101)));
        assert_eq!(
            registry.get(SignalId::Quaternion).unwrap().active_handle(),
            SignalHandle(7)
        );

        assert!(registry.bind_processor(SignalId::Battery, SignalHandle(1)).is_err());
    }
}
