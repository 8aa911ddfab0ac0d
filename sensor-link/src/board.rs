//! Board boundary
//!
//! The board's native core is a black box: it accepts configuration commands and
//! answers asynchronously, on a delivery thread of its own, by invoking the closures
//! registered with it. This module defines that boundary as the [`Board`] trait
//! together with the closure types crossing it.

use crate::signals::SignalId;
use crate::types::{DataFrame, LoggerHandle, Result, SignalHandle, UnknownEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bridging callback through which board deliveries reach the dispatcher.
///
/// Invoked on the board's delivery thread; must return promptly.
pub type Trampoline = Arc<dyn Fn(&DataFrame) + Send + Sync>;

/// One-shot reply to a logger request. `None` means the board refused.
pub type LoggerReady = Box<dyn FnOnce(Option<LoggerHandle>) + Send>;

/// One-shot reply to a time processor request. `None` means the board refused.
pub type ProcessorCreated = Box<dyn FnOnce(Option<SignalHandle>) + Send>;

/// Callbacks the board invokes while a log download is running
#[derive(Clone)]
pub struct DownloadHandler {
    /// Progress report: `(entries_left, total_entries)`
    pub on_progress: Arc<dyn Fn(u32, u32) + Send + Sync>,
    /// Entry the board could not attribute to a known logger
    pub on_unknown_entry: Arc<dyn Fn(UnknownEntry) + Send + Sync>,
    /// Entry for a known logger that has no sample sink registered
    pub on_unhandled_entry: Arc<dyn Fn(DataFrame) + Send + Sync>,
}

/// Time processor output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    /// Forward the input value unchanged
    #[default]
    Absolute,
    /// Forward the difference to the previously forwarded value
    Differential,
}

/// Commands accepted by the board's native core
///
/// Every method returns once the command has been queued; replies (logger handles,
/// processor handles, samples, download progress) arrive later through the supplied
/// closures, on the board's delivery thread.
pub trait Board: Send + Sync {
    /// Resolve a logical signal to the board's handle, `None` if the board model
    /// does not carry the module.
    fn lookup_signal(&self, signal: SignalId, high_frequency: bool) -> Result<Option<SignalHandle>>;

    /// Route every sample produced on `signal` to `trampoline`
    fn subscribe(&self, signal: SignalHandle, trampoline: Trampoline) -> Result<()>;

    /// Stop routing samples of `signal`
    fn unsubscribe(&self, signal: SignalHandle) -> Result<()>;

    /// Ask a readable signal to produce one sample
    fn read_signal(&self, signal: SignalHandle) -> Result<()>;

    /// Enable or disable sampling of the module behind `signal`
    fn set_sampling(&self, signal: SignalId, enabled: bool) -> Result<()>;

    /// Switch the module behind `signal` to active mode or standby
    fn set_sensor_active(&self, signal: SignalId, active: bool) -> Result<()>;

    /// Attach an onboard logger to `signal`
    fn create_logger(&self, signal: SignalHandle, ready: LoggerReady) -> Result<()>;

    /// Start the onboard recorder
    fn start_logger(&self, overwrite: bool) -> Result<()>;

    /// Stop the onboard recorder
    fn stop_logger(&self) -> Result<()>;

    /// Route downloaded entries of `logger` to `trampoline`
    fn subscribe_logger(&self, logger: LoggerHandle, trampoline: Trampoline) -> Result<()>;

    /// Stop routing downloaded entries of `logger`
    fn unsubscribe_logger(&self, logger: LoggerHandle) -> Result<()>;

    /// Start the bulk download of `logger`'s buffered entries
    ///
    /// `batch_size` is the number of progress notifications the board sends over
    /// the whole transfer.
    fn download_logger(
        &self,
        logger: LoggerHandle,
        batch_size: u8,
        handler: DownloadHandler,
    ) -> Result<()>;

    /// Release the logger and its board resources
    fn remove_logger(&self, logger: LoggerHandle) -> Result<()>;

    /// Chain a time processor after `source`
    fn create_time_processor(
        &self,
        source: SignalHandle,
        mode: TimeMode,
        delay_ms: u32,
        created: ProcessorCreated,
    ) -> Result<()>;

    /// Release a data processor created by [`Board::create_time_processor`]
    fn remove_processor(&self, processor: SignalHandle) -> Result<()>;
}
