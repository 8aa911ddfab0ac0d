//! Log download engine
//!
//! Pulls a logger's buffered entries off the board. The board reports progress,
//! entries and unattributable entries on its delivery thread; everything is
//! forwarded over a channel so decoding and the caller's sinks run on the thread
//! that called [`crate::Device::download_log`].
//!
//! A transfer either completes or fails as a whole. On a stall no partial result
//! is returned and the logger is left in place so the download can be repeated.

use crate::board::{Board, DownloadHandler};
use crate::decoder;
use crate::signals::SignalId;
use crate::types::{DataFrame, Error, LoggerHandle, Sample, UnknownEntry};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Progress of one download attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadState {
    /// Entries the board reported when the transfer started
    pub total_entries: u32,
    /// Entries still to be transferred; never increases within one attempt
    pub entries_left: u32,
    /// Set once `entries_left` reached zero
    pub done: bool,
    /// Why the attempt did not complete; `None` while running and once done
    pub error: Option<String>,
    reported: bool,
}

impl DownloadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries_transferred(&self) -> u32 {
        self.total_entries.saturating_sub(self.entries_left)
    }

    /// Record a progress report, keeping `entries_left` non-increasing
    pub fn apply_progress(&mut self, entries_left: u32, total_entries: u32) {
        if !self.reported {
            self.reported = true;
            self.total_entries = total_entries;
            self.entries_left = entries_left.min(total_entries);
        } else if entries_left > self.entries_left {
            log::warn!(
                "Progress went backwards ({} -> {} entries left), keeping {}",
                self.entries_left,
                entries_left,
                self.entries_left
            );
        } else {
            self.entries_left = entries_left;
        }
        self.done = self.entries_left == 0;
    }
}

type ProgressSink<'a> = Box<dyn FnMut(u32, u32) + 'a>;
type SampleSink<'a> = Box<dyn FnMut(&Sample) + 'a>;
type UnknownEntrySink<'a> = Box<dyn FnMut(UnknownEntry) + 'a>;
type UnhandledEntrySink<'a> = Box<dyn FnMut(DataFrame) + 'a>;

/// Optional observers of a download, invoked on the calling thread
#[derive(Default)]
pub struct DownloadSinks<'a> {
    on_progress: Option<ProgressSink<'a>>,
    on_sample: Option<SampleSink<'a>>,
    on_unknown_entry: Option<UnknownEntrySink<'a>>,
    on_unhandled_entry: Option<UnhandledEntrySink<'a>>,
}

impl<'a> DownloadSinks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: observe `(entries_left, total_entries)` reports
    pub fn with_progress(mut self, sink: impl FnMut(u32, u32) + 'a) -> Self {
        self.on_progress = Some(Box::new(sink));
        self
    }

    /// Builder method: observe each sample as it is decoded
    pub fn with_samples(mut self, sink: impl FnMut(&Sample) + 'a) -> Self {
        self.on_sample = Some(Box::new(sink));
        self
    }

    /// Builder method: receive entries that could not be decoded or attributed
    pub fn with_unknown_entries(mut self, sink: impl FnMut(UnknownEntry) + 'a) -> Self {
        self.on_unknown_entry = Some(Box::new(sink));
        self
    }

    /// Builder method: receive entries of loggers without a registered sink
    pub fn with_unhandled_entries(mut self, sink: impl FnMut(DataFrame) + 'a) -> Self {
        self.on_unhandled_entry = Some(Box::new(sink));
        self
    }
}

/// What the board reports during a transfer
#[derive(Debug)]
enum DownloadEvent {
    Progress {
        entries_left: u32,
        total_entries: u32,
    },
    Entry(DataFrame),
    Unknown(UnknownEntry),
    Unhandled(DataFrame),
}

/// Result of a completed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    /// Samples in the order the board delivered them
    pub samples: Vec<Sample>,
    /// Final progress, `done` is always set
    pub state: DownloadState,
    /// Entries routed to the unknown-entry sink
    pub unknown_entries: u32,
}

/// A transfer that did not complete
#[derive(Debug)]
pub(crate) struct Aborted {
    pub error: Error,
    /// Progress reached before the failure, with `error` filled in
    pub state: DownloadState,
}

impl Aborted {
    fn new(error: Error, mut state: DownloadState) -> Self {
        state.done = false;
        state.error = Some(error.to_string());
        Self { error, state }
    }
}

/// Transfer `logger`'s entries, giving up after `timeout` without any event
pub(crate) fn run(
    board: &dyn Board,
    signal: SignalId,
    logger: LoggerHandle,
    batch_size: u8,
    timeout: Duration,
    mut sinks: DownloadSinks<'_>,
) -> Result<Download, Aborted> {
    let (events, receiver) = unbounded();

    let entry_tx = events.clone();
    board
        .subscribe_logger(
            logger,
            Arc::new(move |frame: &DataFrame| {
                let _ = entry_tx.send(DownloadEvent::Entry(frame.clone()));
            }),
        )
        .map_err(|e| Aborted::new(e, DownloadState::new()))?;

    let progress_tx = events.clone();
    let unknown_tx = events.clone();
    let unhandled_tx = events;
    let handler = DownloadHandler {
        on_progress: Arc::new(move |entries_left, total_entries| {
            let _ = progress_tx.send(DownloadEvent::Progress {
                entries_left,
                total_entries,
            });
        }),
        on_unknown_entry: Arc::new(move |entry| {
            let _ = unknown_tx.send(DownloadEvent::Unknown(entry));
        }),
        on_unhandled_entry: Arc::new(move |frame| {
            let _ = unhandled_tx.send(DownloadEvent::Unhandled(frame));
        }),
    };

    log::info!("[{}] downloading {} (batch size {})", signal, logger, batch_size);
    if let Err(e) = board.download_logger(logger, batch_size, handler) {
        release(board, signal, logger);
        return Err(Aborted::new(e, DownloadState::new()));
    }

    let mut transfer = Transfer::new(signal, &mut sinks);
    loop {
        match receiver.recv_timeout(timeout) {
            Ok(event) => transfer.handle(event),
            Err(RecvTimeoutError::Timeout) => {
                release(board, signal, logger);
                let state = transfer.state;
                log::warn!(
                    "[{}] download stalled for {:?} after {}/{} entries",
                    signal,
                    timeout,
                    state.entries_transferred(),
                    state.total_entries
                );
                let error = Error::DownloadTimeout {
                    signal,
                    timeout,
                    entries_transferred: state.entries_transferred(),
                    total_entries: state.total_entries,
                };
                return Err(Aborted::new(error, state));
            }
            Err(RecvTimeoutError::Disconnected) => {
                release(board, signal, logger);
                let error = Error::Board(format!(
                    "board dropped the download of {} for {}",
                    logger, signal
                ));
                return Err(Aborted::new(error, transfer.state));
            }
        }
        if transfer.state.done {
            break;
        }
    }

    // Entries queued behind the final progress report still belong to this transfer
    drain(&receiver, &mut transfer);
    release(board, signal, logger);

    log::info!(
        "[{}] download complete: {} samples, {} unknown entries",
        signal,
        transfer.samples.len(),
        transfer.unknown_entries
    );
    Ok(Download {
        samples: transfer.samples,
        state: transfer.state,
        unknown_entries: transfer.unknown_entries,
    })
}

fn drain(receiver: &Receiver<DownloadEvent>, transfer: &mut Transfer<'_, '_>) {
    while let Ok(event) = receiver.try_recv() {
        transfer.handle(event);
    }
}

fn release(board: &dyn Board, signal: SignalId, logger: LoggerHandle) {
    if let Err(e) = board.unsubscribe_logger(logger) {
        log::warn!("[{}] failed to unregister download sink of {}: {}", signal, logger, e);
    }
}

/// Accumulator of one attempt
struct Transfer<'s, 'a> {
    signal: SignalId,
    sinks: &'s mut DownloadSinks<'a>,
    state: DownloadState,
    samples: Vec<Sample>,
    unknown_entries: u32,
}

impl<'s, 'a> Transfer<'s, 'a> {
    fn new(signal: SignalId, sinks: &'s mut DownloadSinks<'a>) -> Self {
        Self {
            signal,
            sinks,
            state: DownloadState::new(),
            samples: Vec::new(),
            unknown_entries: 0,
        }
    }

    fn handle(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Progress {
                entries_left,
                total_entries,
            } => {
                self.state.apply_progress(entries_left, total_entries);
                log::debug!(
                    "[{}] {}/{} entries left",
                    self.signal,
                    self.state.entries_left,
                    self.state.total_entries
                );
                if let Some(sink) = self.sinks.on_progress.as_mut() {
                    sink(self.state.entries_left, self.state.total_entries);
                }
            }
            DownloadEvent::Entry(frame) => match decoder::decode_frame(&frame) {
                Ok(sample) => {
                    if let Some(sink) = self.sinks.on_sample.as_mut() {
                        sink(&sample);
                    }
                    self.samples.push(sample);
                }
                Err(e) => {
                    log::warn!("[{}] undecodable log entry: {}", self.signal, e);
                    self.unknown(UnknownEntry {
                        epoch: frame.epoch,
                        id: frame.type_id,
                        data: frame.data,
                    });
                }
            },
            DownloadEvent::Unknown(entry) => {
                log::debug!("[{}] unknown log entry with id {}", self.signal, entry.id);
                self.unknown(entry);
            }
            DownloadEvent::Unhandled(frame) => match self.sinks.on_unhandled_entry.as_mut() {
                Some(sink) => sink(frame),
                None => log::debug!(
                    "[{}] unhandled log entry at epoch {} ignored",
                    self.signal,
                    frame.epoch
                ),
            },
        }
    }

    fn unknown(&mut self, entry: UnknownEntry) {
        self.unknown_entries += 1;
        if let Some(sink) = self.sinks.on_unknown_entry.as_mut() {
            sink(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_clamped() {
        let mut state = DownloadState::new();
        state.apply_progress(10, 10);
        state.apply_progress(6, 10);
        state.apply_progress(8, 10);
        assert_eq!(state.entries_left, 6);
        assert_eq!(state.entries_transferred(), 4);
        assert!(!state.done);

        state.apply_progress(0, 10);
        assert!(state.done);
        assert_eq!(state.entries_transferred(), 10);
    }

    #[test]
    fn test_empty_log_is_done_immediately() {
        let mut state = DownloadState::new();
        state.apply_progress(0, 0);
        assert!(state.done);
        assert_eq!(state.total_entries, 0);
    }

    #[test]
    fn test_transfer_routes_events_to_sinks() {
        let mut progress = Vec::new();
        let mut seen = 0;
        let mut unknown = Vec::new();
        let mut sinks = DownloadSinks::new()
            .with_progress(|left, total| progress.push((left, total)))
            .with_samples(|_| seen += 1)
            .with_unknown_entries(|entry| unknown.push(entry.id));

        let mut transfer = Transfer::new(SignalId::Switch, &mut sinks);
        transfer.handle(DownloadEvent::Progress {
            entries_left: 3,
            total_entries: 3,
        });
        transfer.handle(DownloadEvent::Entry(decoder::encode_frame(
            1,
            &crate::types::SampleValue::Uint32(1),
        )));
        transfer.handle(DownloadEvent::Entry(DataFrame::new(2, 0x7F, vec![0])));
        transfer.handle(DownloadEvent::Unknown(UnknownEntry {
            epoch: 3,
            id: 9,
            data: vec![],
        }));
        transfer.handle(DownloadEvent::Progress {
            entries_left: 0,
            total_entries: 3,
        });

        assert!(transfer.state.done);
        assert_eq!(transfer.samples.len(), 1);
        assert_eq!(transfer.unknown_entries, 2);
        drop(transfer);
        drop(sinks);

        assert_eq!(progress, vec![(3, 3), (0, 3)]);
        assert_eq!(seen, 1);
        assert_eq!(unknown, vec![0x7F, 9]);
    }
}
