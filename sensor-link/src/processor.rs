//! Time processor binding
//!
//! A time processor limits how often a signal's samples are forwarded. It is
//! always chained directly after the raw signal; installing a new one replaces
//! (and removes) the previous processor.

use crate::board::{Board, TimeMode};
use crate::rendezvous::{self, WaitError};
use crate::signals::{Signal, SignalRegistry};
use crate::types::{Error, Result, SignalHandle};
use std::sync::Arc;
use std::time::Duration;

/// Convert a requested delay to the board's millisecond period
pub fn delay_millis(signal: &Signal, delay: Duration) -> Result<u32> {
    let millis = delay.as_millis();
    if millis == 0 {
        return Err(Error::Configuration(format!(
            "sample delay for {} must be at least 1ms, got {:?}",
            signal.id, delay
        )));
    }
    u32::try_from(millis).map_err(|_| {
        Error::Configuration(format!(
            "sample delay for {} exceeds {}ms",
            signal.id,
            u32::MAX
        ))
    })
}

/// Chain a time processor after `signal`'s raw handle and make it the active handle
pub(crate) fn install(
    board: &Arc<dyn Board>,
    registry: &SignalRegistry,
    signal: &Signal,
    delay: Duration,
    mode: TimeMode,
    timeout: Duration,
) -> Result<SignalHandle> {
    let id = signal.id;
    let delay_ms = delay_millis(signal, delay)?;
    let (promise, pending) = rendezvous::oneshot();

    let late_board = Arc::clone(board);
    board.create_time_processor(
        signal.raw_handle,
        mode,
        delay_ms,
        Box::new(move |reply: Option<SignalHandle>| {
            if let Err(Some(unclaimed)) = promise.fulfil(reply) {
                log::warn!("[{}] time processor {} arrived too late, removing it", id, unclaimed);
                if let Err(e) = late_board.remove_processor(unclaimed) {
                    log::warn!("[{}] failed to remove {}: {}", id, unclaimed, e);
                }
            }
        }),
    )?;

    let processor = match pending.wait(timeout) {
        Ok(Some(processor)) => processor,
        Ok(None) | Err(WaitError::Timeout) | Err(WaitError::Abandoned) => {
            return Err(Error::ProcessorSetupFailed {
                signal: id,
                timeout,
            })
        }
    };

    if let Some(previous) = registry.bind_processor(id, processor)? {
        log::debug!("[{}] replacing time processor {}", id, previous);
        board.remove_processor(previous)?;
    }
    log::info!("[{}] sampling every {}ms ({:?}) via {}", id, delay_ms, mode, processor);
    Ok(processor)
}

/// Revert `signal` to its raw handle, removing the active processor if any
pub(crate) fn uninstall(
    board: &dyn Board,
    registry: &SignalRegistry,
    signal: &Signal,
) -> Result<()> {
    match registry.clear_processor(signal.id) {
        Some(processor) => {
            board.remove_processor(processor)?;
            log::info!("[{}] time processor {} removed", signal.id, processor);
        }
        None => log::debug!("[{}] no time processor installed", signal.id),
    }
    Ok(())
}
