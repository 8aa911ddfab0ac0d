//! Main device API
//!
//! [`Device`] is the entry point for everything the host does with one board:
//! streaming notifications, onboard logging, log download and sample rate
//! limiting. Each device owns its own signal registry, subscription table and
//! logger sessions; devices share nothing.

use crate::board::{Board, TimeMode};
use crate::config::ClientConfig;
use crate::download::{self, Download, DownloadSinks, DownloadState};
use crate::processor;
use crate::recorder::{LoggerSessions, LoggerState};
use crate::signals::{Signal, SignalId, SignalRegistry, Subscriber, SubscriptionTable};
use crate::transport::{DeviceInfo, Transport};
use crate::types::{Error, Result, Sample};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A connected (or connectable) sensor board
pub struct Device {
    board: Arc<dyn Board>,
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    registry: SignalRegistry,
    subscriptions: SubscriptionTable,
    sessions: LoggerSessions,
    claims: HandleClaims,
}

/// Who is relying on a signal's active handle right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// Subscribing or logging, registering against the current handle
    Shared(usize),
    /// Changing the sample delay, which replaces the handle
    Exclusive,
}

#[derive(Default)]
struct HandleClaims {
    claims: Mutex<HashMap<SignalId, Claim>>,
}

impl HandleClaims {
    fn shared(&self, id: SignalId) -> Result<ClaimGuard<'_>> {
        let mut claims = self.claims.lock();
        match claims.entry(id).or_insert(Claim::Shared(0)) {
            Claim::Exclusive => Err(Error::Configuration(format!(
                "the sample delay of {} is being changed",
                id
            ))),
            Claim::Shared(users) => {
                *users += 1;
                Ok(ClaimGuard { owner: self, id })
            }
        }
    }

    fn exclusive(&self, id: SignalId) -> Result<ClaimGuard<'_>> {
        let mut claims = self.claims.lock();
        if claims.contains_key(&id) {
            return Err(Error::Configuration(format!(
                "{} is being subscribed or logged, cannot change its sample delay",
                id
            )));
        }
        claims.insert(id, Claim::Exclusive);
        Ok(ClaimGuard { owner: self, id })
    }
}

/// Releases its claim when dropped
struct ClaimGuard<'a> {
    owner: &'a HandleClaims,
    id: SignalId,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        let mut claims = self.owner.claims.lock();
        let last = match claims.get_mut(&self.id) {
            Some(Claim::Shared(users)) if *users > 1 => {
                *users -= 1;
                false
            }
            _ => true,
        };
        if last {
            claims.remove(&self.id);
        }
    }
}

impl Device {
    /// Create a device session on top of a board core and its transport
    ///
    /// # Arguments
    /// * `board` - The board's native core
    /// * `transport` - The wireless link the core talks through
    /// * `config` - Timeouts and transfer parameters, validated here
    ///
    /// # Example
    /// ```
    /// use sensor_link::sim::{SimBoard, SimTransport};
    /// use sensor_link::{ClientConfig, Device};
    /// use std::sync::Arc;
    ///
    /// let device = Device::new(
    ///     Arc::new(SimBoard::new()),
    ///     Arc::new(SimTransport::new()),
    ///     ClientConfig::new(),
    /// )
    /// .unwrap();
    /// device.connect().unwrap();
    /// assert!(device.is_connected());
    /// ```
    pub fn new(
        board: Arc<dyn Board>,
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            board,
            transport,
            config,
            registry: SignalRegistry::new(),
            subscriptions: SubscriptionTable::new(),
            sessions: LoggerSessions::new(),
            claims: HandleClaims::default(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connect(&self) -> Result<()> {
        log::info!("Connecting");
        self.transport.connect()
    }

    /// Drop every subscription and close the link
    ///
    /// Resolved signals and logger sessions survive, so a logger that failed to
    /// download can be downloaded again after reconnecting.
    pub fn disconnect(&self) -> Result<()> {
        for subscription in self.subscriptions.drain() {
            if self.transport.is_connected() {
                if let Err(e) = self.board.unsubscribe(subscription.handle()) {
                    log::warn!("[{}] failed to unsubscribe: {}", subscription.signal(), e);
                }
            }
            log::debug!("[{}] subscription dropped", subscription.signal());
        }
        log::info!("Disconnecting");
        self.transport.disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.transport.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Read the standard device information characteristics
    pub fn info(&self) -> Result<DeviceInfo> {
        self.ensure_connected()?;
        DeviceInfo::read_from(self.transport.as_ref())
    }

    /// Resolve a signal, cached after the first call
    ///
    /// Fails with [`Error::UnsupportedModule`] if the board does not carry it.
    pub fn signal(&self, id: SignalId) -> Result<Signal> {
        self.ensure_connected()?;
        self.registry
            .resolve(id, self.config.is_high_frequency(id), |id, high_frequency| {
                self.board.lookup_signal(id, high_frequency)
            })
    }

    /// Per-signal facade
    pub fn sensor(&self, id: SignalId) -> SensorHandle<'_> {
        SensorHandle { device: self, id }
    }

    /// Install or remove the notification callback of a signal
    ///
    /// `Some` subscribes (failing with [`Error::AlreadySubscribed`] if a callback is
    /// in place), `None` unsubscribes.
    pub fn notifications(&self, id: SignalId, subscriber: Option<Subscriber>) -> Result<()> {
        match subscriber {
            Some(subscriber) => self.subscribe(id, subscriber),
            None => self.unsubscribe(id),
        }
    }

    /// Route the signal's samples to `subscriber` and start the sensor
    ///
    /// # Example
    /// ```
    /// use sensor_link::sim::{SimBoard, SimTransport};
    /// use sensor_link::{ClientConfig, Device, SignalId};
    /// use std::sync::Arc;
    ///
    /// let device = Device::new(
    ///     Arc::new(SimBoard::new()),
    ///     Arc::new(SimTransport::new()),
    ///     ClientConfig::new(),
    /// )
    /// .unwrap();
    /// device.connect().unwrap();
    /// device
    ///     .subscribe(SignalId::Accelerometer, |sample: sensor_link::Sample| {
    ///         println!("{}", sample)
    ///     })
    ///     .unwrap();
    /// device.unsubscribe(SignalId::Accelerometer).unwrap();
    /// ```
    pub fn subscribe(&self, id: SignalId, subscriber: impl Into<Subscriber>) -> Result<()> {
        let _claim = self.claims.shared(id)?;
        let signal = self.signal(id)?;
        let handle = signal.active_handle();
        self.subscriptions
            .insert(id, handle, subscriber.into(), |trampoline| {
                self.board.subscribe(handle, trampoline)
            })?;

        if id.needs_sensor_control() && !self.sessions.is_recording(id) {
            let started = self
                .board
                .set_sampling(id, true)
                .and_then(|_| self.board.set_sensor_active(id, true));
            if let Err(e) = started {
                self.subscriptions.remove(id);
                if let Err(unsub) = self.board.unsubscribe(handle) {
                    log::warn!("[{}] failed to unsubscribe after a failed start: {}", id, unsub);
                }
                return Err(e);
            }
        }
        log::info!("[{}] subscribed on {}", id, handle);
        Ok(())
    }

    /// Stop delivering the signal's samples; a no-op without a subscription
    ///
    /// Frames the board delivers after this returns are silently dropped. A
    /// callback already running on the delivery thread may still finish.
    pub fn unsubscribe(&self, id: SignalId) -> Result<()> {
        let Some(subscription) = self.subscriptions.remove(id) else {
            return Ok(());
        };
        log::info!(
            "[{}] unsubscribed after {} samples",
            id,
            subscription.delivered()
        );
        let handle = subscription.handle();
        drop(subscription);

        if !self.transport.is_connected() {
            return Ok(());
        }
        self.board.unsubscribe(handle)?;
        if id.needs_sensor_control() && !self.sessions.is_recording(id) {
            self.board.set_sensor_active(id, false)?;
            self.board.set_sampling(id, false)?;
        }
        Ok(())
    }

    /// Signals with a live subscription
    pub fn subscribed_signals(&self) -> Vec<SignalId> {
        self.subscriptions.signals()
    }

    /// Trigger a one-shot read; the value arrives through the subscription
    pub fn read(&self, id: SignalId) -> Result<()> {
        if !id.is_readable() {
            return Err(Error::Configuration(format!("{} cannot be read on demand", id)));
        }
        let signal = self.signal(id)?;
        log::debug!("[{}] read requested", id);
        self.board.read_signal(signal.active_handle())
    }

    /// Record the signal into the board's onboard log
    pub fn start_logging(&self, id: SignalId) -> Result<()> {
        let _claim = self.claims.shared(id)?;
        let signal = self.signal(id)?;
        self.sessions.start(&self.board, &signal, &self.config)?;
        Ok(())
    }

    /// Stop recording the signal; idempotent
    pub fn stop_logging(&self, id: SignalId) -> Result<()> {
        self.ensure_connected()?;
        self.sessions
            .stop(self.board.as_ref(), id, self.subscriptions.contains(id))
    }

    pub fn logger_state(&self, id: SignalId) -> LoggerState {
        self.sessions.state(id)
    }

    /// Download everything the signal's logger recorded
    ///
    /// Stops an ongoing recording first. `timeout` bounds the silence between two
    /// board reports, not the whole transfer. On [`Error::DownloadTimeout`] nothing
    /// is returned and the logger is kept: reconnect and call again to restart the
    /// transfer from the beginning.
    ///
    /// # Arguments
    /// * `id` - Signal whose logger to download
    /// * `timeout` - Longest tolerated silence
    /// * `sinks` - Optional progress/sample/unknown-entry observers
    pub fn download_log(
        &self,
        id: SignalId,
        timeout: Duration,
        sinks: DownloadSinks<'_>,
    ) -> Result<Vec<Sample>> {
        self.download_log_with_stats(id, timeout, sinks)
            .map(|download| download.samples)
    }

    /// [`Device::download_log`] with the configured timeout and no sinks
    pub fn download_log_default(&self, id: SignalId) -> Result<Vec<Sample>> {
        self.download_log(id, self.config.download_timeout(), DownloadSinks::default())
    }

    /// [`Device::download_log`], also returning the final progress and unknown entry count
    pub fn download_log_with_stats(
        &self,
        id: SignalId,
        timeout: Duration,
        sinks: DownloadSinks<'_>,
    ) -> Result<Download> {
        self.ensure_connected()?;
        if self.sessions.is_recording(id) {
            log::debug!("[{}] stopping recording before download", id);
            self.stop_logging(id)?;
        }
        let logger = self.sessions.begin_download(id)?;

        let result = download::run(
            self.board.as_ref(),
            id,
            logger,
            self.config.download_batch_size,
            timeout,
            sinks,
        );

        match result {
            Ok(download) => {
                let removed = match self.board.remove_logger(logger) {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("[{}] failed to remove {}: {}", id, logger, e);
                        false
                    }
                };
                self.sessions.finish_download(id, removed, download.state.clone());
                Ok(download)
            }
            Err(aborted) => {
                self.sessions.finish_download(id, false, aborted.state);
                Err(aborted.error)
            }
        }
    }

    /// Progress of the most recent download attempt, including why it failed
    pub fn last_download(&self, id: SignalId) -> Option<DownloadState> {
        self.sessions.last_download(id)
    }

    /// Limit how often the signal forwards samples
    ///
    /// `Some(delay)` chains a time processor after the raw signal, `None` removes it.
    /// Only allowed while the signal is not subscribed and has no logger attached:
    /// a logger records from the handle it was created on, so a kept logger has
    /// to be downloaded first.
    pub fn set_sample_delay(
        &self,
        id: SignalId,
        delay: Option<Duration>,
        mode: TimeMode,
    ) -> Result<()> {
        let _claim = self.claims.exclusive(id)?;
        if self.subscriptions.contains(id) {
            return Err(Error::Configuration(format!(
                "unsubscribe {} before changing its sample delay",
                id
            )));
        }
        let state = self.sessions.state(id);
        if state != LoggerState::Idle {
            return Err(Error::Configuration(format!(
                "cannot change the sample delay of {} while {}",
                id, state
            )));
        }
        if let Some(logger) = self.sessions.logger(id) {
            return Err(Error::Configuration(format!(
                "download the log of {} ({}) before changing its sample delay",
                id, logger
            )));
        }

        let signal = self.signal(id)?;
        match delay {
            Some(delay) => {
                processor::install(
                    &self.board,
                    &self.registry,
                    &signal,
                    delay,
                    mode,
                    self.config.processor_timeout(),
                )?;
            }
            None => processor::uninstall(self.board.as_ref(), &self.registry, &signal)?,
        }
        Ok(())
    }
}

/// Signal-scoped view of a [`Device`]
#[derive(Clone, Copy)]
pub struct SensorHandle<'a> {
    device: &'a Device,
    id: SignalId,
}

impl<'a> SensorHandle<'a> {
    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn signal(&self) -> Result<Signal> {
        self.device.signal(self.id)
    }

    pub fn notifications(&self, subscriber: Option<Subscriber>) -> Result<()> {
        self.device.notifications(self.id, subscriber)
    }

    pub fn read(&self) -> Result<()> {
        self.device.read(self.id)
    }

    pub fn start_logging(&self) -> Result<()> {
        self.device.start_logging(self.id)
    }

    pub fn stop_logging(&self) -> Result<()> {
        self.device.stop_logging(self.id)
    }

    pub fn download_log(&self, timeout: Duration, sinks: DownloadSinks<'_>) -> Result<Vec<Sample>> {
        self.device.download_log(self.id, timeout, sinks)
    }

    pub fn set_sample_delay(&self, delay: Option<Duration>, mode: TimeMode) -> Result<()> {
        self.device.set_sample_delay(self.id, delay, mode)
    }

    pub fn logger_state(&self) -> LoggerState {
        self.device.logger_state(self.id)
    }

    pub fn last_download(&self) -> Option<DownloadState> {
        self.device.last_download(self.id)
    }
}
