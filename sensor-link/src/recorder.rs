//! Onboard logger sessions
//!
//! Each signal has its own session state machine:
//!
//! ```text
//! Idle -> RequestingLogger -> LoggerReady -> Recording -> Idle
//!                                                  \-> Downloading -> Idle
//! ```
//!
//! A logger that recorded but has not been downloaded yet stays attached to the
//! signal while Idle, so it can be downloaded after `stop` or reused by the next
//! `start`.

use crate::board::Board;
use crate::config::ClientConfig;
use crate::download::DownloadState;
use crate::rendezvous::{self, WaitError};
use crate::signals::{Signal, SignalId};
use crate::types::{Error, LoggerHandle, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Logger session state of one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerState {
    Idle,
    RequestingLogger,
    LoggerReady(LoggerHandle),
    Recording(LoggerHandle),
    Downloading(LoggerHandle),
}

impl fmt::Display for LoggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggerState::Idle => write!(f, "idle"),
            LoggerState::RequestingLogger => write!(f, "requesting a logger"),
            LoggerState::LoggerReady(h) => write!(f, "{} ready", h),
            LoggerState::Recording(h) => write!(f, "recording to {}", h),
            LoggerState::Downloading(h) => write!(f, "downloading {}", h),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Session {
    state: LoggerState,
    /// Logger kept across Idle until it is downloaded and removed
    logger: Option<LoggerHandle>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: LoggerState::Idle,
            logger: None,
        }
    }
}

/// Logger sessions of one device
#[derive(Default)]
pub struct LoggerSessions {
    sessions: Mutex<HashMap<SignalId, Session>>,
    /// Outcome of the most recent download attempt per signal
    downloads: Mutex<HashMap<SignalId, DownloadState>>,
}

impl LoggerSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of the signal's session
    pub fn state(&self, signal: SignalId) -> LoggerState {
        self.sessions
            .lock()
            .get(&signal)
            .map(|s| s.state)
            .unwrap_or(LoggerState::Idle)
    }

    /// Logger attached to the signal, if any
    pub fn logger(&self, signal: SignalId) -> Option<LoggerHandle> {
        self.sessions.lock().get(&signal).and_then(|s| match s.state {
            LoggerState::LoggerReady(h)
            | LoggerState::Recording(h)
            | LoggerState::Downloading(h) => Some(h),
            _ => s.logger,
        })
    }

    pub fn is_recording(&self, signal: SignalId) -> bool {
        matches!(self.state(signal), LoggerState::Recording(_))
    }

    /// True if any signal other than `except` is recording
    fn others_recording(&self, except: SignalId) -> bool {
        self.sessions
            .lock()
            .iter()
            .any(|(id, s)| *id != except && matches!(s.state, LoggerState::Recording(_)))
    }

    fn set(&self, signal: SignalId, state: LoggerState, logger: Option<LoggerHandle>) {
        log::debug!("[{}] logger session -> {}", signal, state);
        self.sessions.lock().insert(signal, Session { state, logger });
    }

    /// Attach a logger to the signal and start recording
    ///
    /// Blocks until the board hands out the logger or the configured timeout
    /// elapses. No lock is held while waiting.
    pub fn start(
        &self,
        board: &Arc<dyn Board>,
        signal: &Signal,
        config: &ClientConfig,
    ) -> Result<LoggerHandle> {
        let id = signal.id;

        let reusable = {
            let mut sessions = self.sessions.lock();
            let session = sessions.entry(id).or_default();
            match session.state {
                LoggerState::Idle => {}
                other => {
                    return Err(Error::InvalidState {
                        signal: id,
                        state: other.to_string(),
                    })
                }
            }
            session.state = match session.logger {
                Some(h) => LoggerState::LoggerReady(h),
                None => LoggerState::RequestingLogger,
            };
            session.logger
        };

        let logger = match reusable {
            Some(h) => {
                log::debug!("[{}] reusing {} that was not downloaded yet", id, h);
                h
            }
            None => match self.request_logger(board, signal, config) {
                Ok(h) => {
                    self.set(id, LoggerState::LoggerReady(h), Some(h));
                    h
                }
                Err(e) => {
                    self.set(id, LoggerState::Idle, None);
                    return Err(e);
                }
            },
        };

        let started = board
            .start_logger(config.overwrite_log)
            .and_then(|_| {
                if id.needs_sensor_control() {
                    board.set_sampling(id, true)?;
                    board.set_sensor_active(id, true)?;
                }
                Ok(())
            });

        match started {
            Ok(()) => {
                self.set(id, LoggerState::Recording(logger), Some(logger));
                log::info!("[{}] recording to {}", id, logger);
                Ok(logger)
            }
            Err(e) => {
                self.set(id, LoggerState::Idle, Some(logger));
                Err(e)
            }
        }
    }

    fn request_logger(
        &self,
        board: &Arc<dyn Board>,
        signal: &Signal,
        config: &ClientConfig,
    ) -> Result<LoggerHandle> {
        let id = signal.id;
        let timeout = config.logger_ready_timeout();
        let (promise, pending) = rendezvous::oneshot();

        let late_board = Arc::clone(board);
        board
            .create_logger(
                signal.active_handle(),
                Box::new(move |reply: Option<LoggerHandle>| {
                    if let Err(Some(unclaimed)) = promise.fulfil(reply) {
                        log::warn!(
                            "[{}] {} arrived after the caller gave up, removing it",
                            id,
                            unclaimed
                        );
                        if let Err(e) = late_board.remove_logger(unclaimed) {
                            log::warn!("[{}] failed to remove {}: {}", id, unclaimed, e);
                        }
                    }
                }),
            )
            .map_err(|e| Error::LoggerSetupFailed {
                signal: id,
                timeout,
                reason: e.to_string(),
            })?;

        match pending.wait(timeout) {
            Ok(Some(logger)) => {
                log::info!("[{}] {} ready", id, logger);
                Ok(logger)
            }
            Ok(None) => Err(Error::LoggerSetupFailed {
                signal: id,
                timeout,
                reason: "board refused to create a logger".to_string(),
            }),
            Err(WaitError::Timeout) => Err(Error::LoggerSetupFailed {
                signal: id,
                timeout,
                reason: "no reply from board".to_string(),
            }),
            Err(WaitError::Abandoned) => Err(Error::LoggerSetupFailed {
                signal: id,
                timeout,
                reason: "board dropped the request".to_string(),
            }),
        }
    }

    /// Stop recording; a no-op unless the signal is recording
    ///
    /// `keep_sensor_running` leaves the sensor sampling, for a signal that is
    /// still streaming to a subscriber. If a board call fails the session goes
    /// back to Recording, so stopping can be retried.
    pub fn stop(
        &self,
        board: &dyn Board,
        signal: SignalId,
        keep_sensor_running: bool,
    ) -> Result<()> {
        let logger = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(&signal) else {
                return Ok(());
            };
            let LoggerState::Recording(logger) = session.state else {
                return Ok(());
            };
            session.state = LoggerState::Idle;
            session.logger = Some(logger);
            logger
        };
        log::debug!("[{}] logger session -> idle", signal);

        if let Err(e) = self.halt(board, signal, keep_sensor_running) {
            let mut sessions = self.sessions.lock();
            if let Some(session) = sessions.get_mut(&signal) {
                if session.state == LoggerState::Idle && session.logger == Some(logger) {
                    session.state = LoggerState::Recording(logger);
                    log::warn!(
                        "[{}] failed to stop recording, still {}: {}",
                        signal,
                        session.state,
                        e
                    );
                }
            }
            return Err(e);
        }
        log::info!("[{}] recording stopped, {} kept for download", signal, logger);
        Ok(())
    }

    fn halt(&self, board: &dyn Board, signal: SignalId, keep_sensor_running: bool) -> Result<()> {
        if signal.needs_sensor_control() && !keep_sensor_running {
            board.set_sensor_active(signal, false)?;
            board.set_sampling(signal, false)?;
        }
        if !self.others_recording(signal) {
            board.stop_logger()?;
        }
        Ok(())
    }

    /// Progress of the signal's most recent download attempt
    pub fn last_download(&self, signal: SignalId) -> Option<DownloadState> {
        self.downloads.lock().get(&signal).cloned()
    }

    /// Move an idle session with a logger into Downloading
    pub fn begin_download(&self, signal: SignalId) -> Result<LoggerHandle> {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(signal).or_default();
        match (session.state, session.logger) {
            (LoggerState::Idle, Some(logger)) => {
                session.state = LoggerState::Downloading(logger);
                log::debug!("[{}] logger session -> {}", signal, session.state);
                Ok(logger)
            }
            (LoggerState::Idle, None) => Err(Error::Configuration(format!(
                "no logger attached to {}; call start_logging first",
                signal
            ))),
            (other, _) => Err(Error::InvalidState {
                signal,
                state: other.to_string(),
            }),
        }
    }

    /// Leave Downloading. A removed logger is forgotten, otherwise it is kept
    /// so the download can be retried.
    pub fn finish_download(&self, signal: SignalId, logger_removed: bool, attempt: DownloadState) {
        self.downloads.lock().insert(signal, attempt);
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&signal) {
            if let LoggerState::Downloading(logger) = session.state {
                session.state = LoggerState::Idle;
                session.logger = if logger_removed { None } else { Some(logger) };
                log::debug!("[{}] logger session -> idle", signal);
            }
        }
    }
}
