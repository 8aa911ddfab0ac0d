//! In-memory board and transport
//!
//! [`SimBoard`] behaves like the board's native core: commands return at once and
//! every reply or sample is delivered later on a delivery thread owned by the
//! board. Used by the test suites and by the CLI when no hardware is attached.

use crate::board::{Board, DownloadHandler, LoggerReady, ProcessorCreated, TimeMode, Trampoline};
use crate::decoder::{self, encode_frame};
use crate::signals::SignalId;
use crate::transport::{Characteristic, CharacteristicCallback, Transport};
use crate::types::{
    BatteryState, ColorAdc, DataFrame, Epoch, Error, LoggerHandle, Result, SampleValue,
    SignalHandle, UnknownEntry,
};
use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send>;

/// Longest [`SimBoard::flush`] waits for the delivery thread
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Entries each logger keeps before it starts dropping (or overwriting)
const DEFAULT_LOG_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    stall_downloads: bool,
    refuse_loggers: bool,
    silent_loggers: bool,
    silent_processors: bool,
    reject_sensor_commands: bool,
}

struct TimeProcessor {
    source: SignalHandle,
    signal: SignalId,
    mode: TimeMode,
    delay_ms: u32,
    last_epoch: Option<Epoch>,
    last_value: Option<SampleValue>,
}

impl TimeProcessor {
    /// Forward `frame` unless it is closer than the delay to the last forwarded one
    fn apply(&mut self, frame: &DataFrame) -> Option<DataFrame> {
        if let Some(last) = self.last_epoch {
            if frame.epoch - last < i64::from(self.delay_ms) {
                return None;
            }
        }
        self.last_epoch = Some(frame.epoch);

        let Ok(sample) = decoder::decode_frame(frame) else {
            return Some(frame.clone());
        };
        let forwarded = match (self.mode, &self.last_value) {
            (TimeMode::Differential, Some(previous)) => difference(previous, &sample.value),
            _ => sample.value.clone(),
        };
        self.last_value = Some(sample.value);
        Some(encode_frame(frame.epoch, &forwarded))
    }
}

fn difference(previous: &SampleValue, current: &SampleValue) -> SampleValue {
    match (previous, current) {
        (SampleValue::Uint32(a), SampleValue::Uint32(b)) => SampleValue::Uint32(b.wrapping_sub(*a)),
        (SampleValue::Int32(a), SampleValue::Int32(b)) => SampleValue::Int32(b.wrapping_sub(*a)),
        (SampleValue::Float(a), SampleValue::Float(b)) => SampleValue::Float(b - a),
        (_, value) => value.clone(),
    }
}

struct SimLogger {
    source: SignalHandle,
    entries: Vec<DataFrame>,
}

#[derive(Clone)]
enum LogItem {
    Entry(DataFrame),
    Unknown(UnknownEntry),
}

#[derive(Default)]
struct State {
    available: HashSet<SignalId>,
    next_handle: u64,
    resolved: HashMap<(SignalId, bool), SignalHandle>,
    raw: HashMap<SignalHandle, SignalId>,
    processors: HashMap<SignalHandle, TimeProcessor>,
    subscribers: HashMap<SignalHandle, Trampoline>,
    sampling: HashSet<SignalId>,
    active: HashSet<SignalId>,
    recording: bool,
    overwrite: bool,
    log_capacity: usize,
    loggers: HashMap<LoggerHandle, SimLogger>,
    logger_sinks: HashMap<LoggerHandle, Trampoline>,
    readings: HashMap<SignalId, SampleValue>,
    clock: Epoch,
    unknown_entries: Vec<UnknownEntry>,
    faults: Faults,
    held_loggers: Vec<(SignalHandle, LoggerReady)>,
    held_processors: Vec<(SignalHandle, TimeMode, u32, ProcessorCreated)>,
}

impl State {
    fn allocate_handle(&mut self) -> SignalHandle {
        self.next_handle += 1;
        SignalHandle(self.next_handle)
    }

    fn allocate_logger(&mut self, source: SignalHandle) -> Option<LoggerHandle> {
        let id = (0..=u8::MAX).find(|id| !self.loggers.contains_key(&LoggerHandle(*id)))?;
        let logger = LoggerHandle(id);
        self.loggers.insert(
            logger,
            SimLogger {
                source,
                entries: Vec::new(),
            },
        );
        Some(logger)
    }

    fn add_processor(
        &mut self,
        source: SignalHandle,
        mode: TimeMode,
        delay_ms: u32,
    ) -> Option<SignalHandle> {
        let signal = self.signal_of(source)?;
        let handle = self.allocate_handle();
        self.processors.insert(
            handle,
            TimeProcessor {
                source,
                signal,
                mode,
                delay_ms,
                last_epoch: None,
                last_value: None,
            },
        );
        Some(handle)
    }

    fn signal_of(&self, handle: SignalHandle) -> Option<SignalId> {
        self.raw
            .get(&handle)
            .copied()
            .or_else(|| self.processors.get(&handle).map(|p| p.signal))
    }

    fn check_handle(&self, handle: SignalHandle) -> Result<SignalId> {
        self.signal_of(handle)
            .ok_or_else(|| Error::Board(format!("unknown signal handle {}", handle)))
    }

    fn is_producing(&self, signal: SignalId) -> bool {
        self.available.contains(&signal)
            && (!signal.needs_sensor_control()
                || (self.sampling.contains(&signal) && self.active.contains(&signal)))
    }

    /// Hand `frame` to the subscriber and loggers attached to `handle`
    fn route(
        &mut self,
        handle: SignalHandle,
        frame: &DataFrame,
        deliveries: &mut Vec<(Trampoline, DataFrame)>,
    ) {
        if let Some(trampoline) = self.subscribers.get(&handle) {
            deliveries.push((trampoline.clone(), frame.clone()));
        }
        if !self.recording {
            return;
        }
        let capacity = self.log_capacity;
        let overwrite = self.overwrite;
        for (logger, sim) in self.loggers.iter_mut().filter(|(_, l)| l.source == handle) {
            if sim.entries.len() >= capacity {
                if !overwrite {
                    log::trace!("{} full, dropping entry at epoch {}", logger, frame.epoch);
                    continue;
                }
                sim.entries.remove(0);
            }
            sim.entries.push(frame.clone());
        }
    }
}

/// Simulated board with its own delivery thread
pub struct SimBoard {
    state: Mutex<State>,
    jobs: Sender<Job>,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    /// Board carrying every known signal
    pub fn new() -> Self {
        Self::with_signals(&SignalId::ALL)
    }

    /// Board carrying only `signals`
    pub fn with_signals(signals: &[SignalId]) -> Self {
        let (jobs, queue) = unbounded::<Job>();
        thread::spawn(move || {
            for job in queue {
                job();
            }
            log::trace!("Simulated board delivery thread stopped");
        });

        let state = State {
            available: signals.iter().copied().collect(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
            jobs,
        }
    }

    /// Builder method: entries each logger can hold
    pub fn with_log_capacity(self, capacity: usize) -> Self {
        self.state.lock().log_capacity = capacity;
        self
    }

    fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if self.jobs.send(Box::new(job)).is_err() {
            log::warn!("Simulated board delivery thread is gone");
        }
    }

    /// Wait until everything queued so far has been delivered
    pub fn flush(&self) {
        let (done, wait) = bounded(1);
        self.submit(move || {
            let _ = done.send(());
        });
        if wait.recv_timeout(FLUSH_TIMEOUT).is_err() {
            log::warn!("Simulated board did not drain within {:?}", FLUSH_TIMEOUT);
        }
    }

    /// Raw handle of `signal`, resolving it if needed
    pub fn lookup(&self, signal: SignalId) -> Option<SignalHandle> {
        self.lookup_signal(signal, false).ok().flatten()
    }

    /// Produce a sample on `signal`. Returns false if the signal is not producing
    /// (unsupported, or its sensor is not sampling).
    pub fn emit(&self, signal: SignalId, epoch: Epoch, value: SampleValue) -> bool {
        self.emit_frame(signal, encode_frame(epoch, &value))
    }

    /// Produce a raw frame on `signal`, which need not decode
    pub fn emit_frame(&self, signal: SignalId, frame: DataFrame) -> bool {
        let mut deliveries = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.is_producing(signal) {
                log::trace!(
                    "{} is not producing, frame at epoch {} discarded",
                    signal,
                    frame.epoch
                );
                return false;
            }
            state.clock = state.clock.max(frame.epoch);

            let sources: Vec<SignalHandle> = state
                .raw
                .iter()
                .filter(|(_, id)| **id == signal)
                .map(|(handle, _)| *handle)
                .collect();
            for source in sources {
                state.route(source, &frame, &mut deliveries);
                let outputs: Vec<(SignalHandle, DataFrame)> = state
                    .processors
                    .iter_mut()
                    .filter(|(_, p)| p.source == source)
                    .filter_map(|(handle, p)| p.apply(&frame).map(|out| (*handle, out)))
                    .collect();
                for (handle, out) in outputs {
                    state.route(handle, &out, &mut deliveries);
                }
            }
        }

        for (trampoline, frame) in deliveries {
            self.submit(move || trampoline(&frame));
        }
        true
    }

    /// Value returned by the next read of a readable signal
    pub fn set_reading(&self, signal: SignalId, value: SampleValue) {
        self.state.lock().readings.insert(signal, value);
    }

    /// Entry reported through the unknown-entry callback of the next download
    pub fn inject_unknown_entry(&self, entry: UnknownEntry) {
        self.state.lock().unknown_entries.push(entry);
    }

    /// Downloads report their size and then go silent
    pub fn set_stall_downloads(&self, enabled: bool) {
        self.state.lock().faults.stall_downloads = enabled;
    }

    /// Logger requests are answered with a refusal
    pub fn set_refuse_loggers(&self, enabled: bool) {
        self.state.lock().faults.refuse_loggers = enabled;
    }

    /// Logger requests are held without reply until [`SimBoard::release_held_replies`]
    pub fn set_silent_loggers(&self, enabled: bool) {
        self.state.lock().faults.silent_loggers = enabled;
    }

    /// Time processor requests are held without reply until [`SimBoard::release_held_replies`]
    pub fn set_silent_processors(&self, enabled: bool) {
        self.state.lock().faults.silent_processors = enabled;
    }

    /// Fail every sampling and sensor power command
    pub fn set_reject_sensor_commands(&self, enabled: bool) {
        self.state.lock().faults.reject_sensor_commands = enabled;
    }

    /// Answer every held logger and processor request
    pub fn release_held_replies(&self) {
        let mut replies: Vec<Job> = Vec::new();
        {
            let mut state = self.state.lock();
            for (source, ready) in std::mem::take(&mut state.held_loggers) {
                let logger = state.allocate_logger(source);
                replies.push(Box::new(move || ready(logger)));
            }
            for (source, mode, delay_ms, created) in std::mem::take(&mut state.held_processors) {
                let processor = state.add_processor(source, mode, delay_ms);
                replies.push(Box::new(move || created(processor)));
            }
        }
        for reply in replies {
            self.submit(reply);
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn is_sampling(&self, signal: SignalId) -> bool {
        let state = self.state.lock();
        state.sampling.contains(&signal) && state.active.contains(&signal)
    }

    pub fn logger_count(&self) -> usize {
        self.state.lock().loggers.len()
    }

    pub fn processor_count(&self) -> usize {
        self.state.lock().processors.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Entries buffered by `logger`
    pub fn logged_entries(&self, logger: LoggerHandle) -> usize {
        self.state
            .lock()
            .loggers
            .get(&logger)
            .map_or(0, |l| l.entries.len())
    }
}

fn default_reading(signal: SignalId) -> Option<SampleValue> {
    match signal {
        SignalId::Temperature => Some(SampleValue::Float(23.875)),
        SignalId::Battery => Some(SampleValue::Battery(BatteryState {
            voltage: 4045,
            charge: 96,
        })),
        SignalId::Color => Some(SampleValue::ColorAdc(ColorAdc {
            clear: 418,
            red: 160,
            green: 141,
            blue: 117,
        })),
        _ => None,
    }
}

impl Board for SimBoard {
    fn lookup_signal(
        &self,
        signal: SignalId,
        high_frequency: bool,
    ) -> Result<Option<SignalHandle>> {
        let mut state = self.state.lock();
        if !state.available.contains(&signal)
            || (high_frequency && !signal.supports_high_frequency())
        {
            return Ok(None);
        }
        if let Some(handle) = state.resolved.get(&(signal, high_frequency)) {
            return Ok(Some(*handle));
        }
        let handle = state.allocate_handle();
        state.resolved.insert((signal, high_frequency), handle);
        state.raw.insert(handle, signal);
        Ok(Some(handle))
    }

    fn subscribe(&self, signal: SignalHandle, trampoline: Trampoline) -> Result<()> {
        let mut state = self.state.lock();
        state.check_handle(signal)?;
        state.subscribers.insert(signal, trampoline);
        Ok(())
    }

    fn unsubscribe(&self, signal: SignalHandle) -> Result<()> {
        self.state.lock().subscribers.remove(&signal);
        Ok(())
    }

    fn read_signal(&self, signal: SignalHandle) -> Result<()> {
        let (id, value, epoch) = {
            let mut state = self.state.lock();
            let id = state.check_handle(signal)?;
            let value = state
                .readings
                .get(&id)
                .cloned()
                .or_else(|| default_reading(id))
                .ok_or_else(|| Error::Board(format!("{} cannot be read", id)))?;
            state.clock += 1;
            (id, value, state.clock)
        };
        self.emit(id, epoch, value);
        Ok(())
    }

    fn set_sampling(&self, signal: SignalId, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.faults.reject_sensor_commands {
            return Err(Error::Board(format!("{} rejected the sampling command", signal)));
        }
        if enabled {
            state.sampling.insert(signal);
        } else {
            state.sampling.remove(&signal);
        }
        Ok(())
    }

    fn set_sensor_active(&self, signal: SignalId, active: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.faults.reject_sensor_commands {
            return Err(Error::Board(format!("{} rejected the power command", signal)));
        }
        if active {
            state.active.insert(signal);
        } else {
            state.active.remove(&signal);
        }
        Ok(())
    }

    fn create_logger(&self, signal: SignalHandle, ready: LoggerReady) -> Result<()> {
        let mut state = self.state.lock();
        state.check_handle(signal)?;
        if state.faults.refuse_loggers {
            drop(state);
            self.submit(move || ready(None));
            return Ok(());
        }
        if state.faults.silent_loggers {
            state.held_loggers.push((signal, ready));
            return Ok(());
        }
        let logger = state.allocate_logger(signal);
        drop(state);
        self.submit(move || ready(logger));
        Ok(())
    }

    fn start_logger(&self, overwrite: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.recording = true;
        state.overwrite = overwrite;
        Ok(())
    }

    fn stop_logger(&self) -> Result<()> {
        self.state.lock().recording = false;
        Ok(())
    }

    fn subscribe_logger(&self, logger: LoggerHandle, trampoline: Trampoline) -> Result<()> {
        let mut state = self.state.lock();
        if !state.loggers.contains_key(&logger) {
            return Err(Error::Board(format!("unknown logger {}", logger)));
        }
        state.logger_sinks.insert(logger, trampoline);
        Ok(())
    }

    fn unsubscribe_logger(&self, logger: LoggerHandle) -> Result<()> {
        self.state.lock().logger_sinks.remove(&logger);
        Ok(())
    }

    fn download_logger(
        &self,
        logger: LoggerHandle,
        batch_size: u8,
        handler: DownloadHandler,
    ) -> Result<()> {
        let (items, sink, stall) = {
            let mut state = self.state.lock();
            let stall = state.faults.stall_downloads;
            let sink = state.logger_sinks.get(&logger).cloned();
            let unknown = if stall {
                state.unknown_entries.clone()
            } else {
                std::mem::take(&mut state.unknown_entries)
            };
            let sim = state
                .loggers
                .get_mut(&logger)
                .ok_or_else(|| Error::Board(format!("unknown logger {}", logger)))?;
            let entries = if stall {
                sim.entries.clone()
            } else {
                std::mem::take(&mut sim.entries)
            };
            let items: Vec<LogItem> = entries
                .into_iter()
                .map(LogItem::Entry)
                .chain(unknown.into_iter().map(LogItem::Unknown))
                .collect();
            (items, sink, stall)
        };

        let total = items.len() as u32;
        let on_progress = handler.on_progress.clone();
        self.submit(move || on_progress(total, total));
        if stall {
            log::debug!("Download of {} stalls after announcing {} entries", logger, total);
            return Ok(());
        }

        let per_batch = items.len().div_ceil(usize::from(batch_size.max(1))).max(1);
        let mut left = total;
        for batch in items.chunks(per_batch) {
            left -= batch.len() as u32;
            let batch = batch.to_vec();
            let sink = sink.clone();
            let handler = handler.clone();
            self.submit(move || {
                for item in batch {
                    match (item, &sink) {
                        (LogItem::Entry(frame), Some(sink)) => sink(&frame),
                        (LogItem::Entry(frame), None) => (handler.on_unhandled_entry)(frame),
                        (LogItem::Unknown(entry), _) => (handler.on_unknown_entry)(entry),
                    }
                }
                (handler.on_progress)(left, total);
            });
        }
        Ok(())
    }

    fn remove_logger(&self, logger: LoggerHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.logger_sinks.remove(&logger);
        state
            .loggers
            .remove(&logger)
            .map(|_| ())
            .ok_or_else(|| Error::Board(format!("unknown logger {}", logger)))
    }

    fn create_time_processor(
        &self,
        source: SignalHandle,
        mode: TimeMode,
        delay_ms: u32,
        created: ProcessorCreated,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check_handle(source)?;
        if state.faults.silent_processors {
            state.held_processors.push((source, mode, delay_ms, created));
            return Ok(());
        }
        let processor = state.add_processor(source, mode, delay_ms);
        drop(state);
        self.submit(move || created(processor));
        Ok(())
    }

    fn remove_processor(&self, processor: SignalHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.subscribers.remove(&processor);
        state
            .processors
            .remove(&processor)
            .map(|_| ())
            .ok_or_else(|| Error::Board(format!("unknown processor {}", processor)))
    }
}

/// Simulated wireless link with the standard device information characteristics
pub struct SimTransport {
    connected: AtomicBool,
    characteristics: Mutex<HashMap<Characteristic, Vec<u8>>>,
    subscribers: Mutex<HashMap<Characteristic, CharacteristicCallback>>,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTransport {
    /// Disconnected link to a MetaMotion R
    pub fn new() -> Self {
        let characteristics: HashMap<Characteristic, Vec<u8>> = [
            (Characteristic::MANUFACTURER_NAME, "MbientLab Inc"),
            (Characteristic::MODEL_NUMBER, "5"),
            (Characteristic::SERIAL_NUMBER, "C4F2A1"),
            (Characteristic::FIRMWARE_REVISION, "1.7.2"),
            (Characteristic::HARDWARE_REVISION, "0.4"),
        ]
        .into_iter()
        .map(|(c, v)| (c, v.as_bytes().to_vec()))
        .collect();

        Self {
            connected: AtomicBool::new(false),
            characteristics: Mutex::new(characteristics),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Builder method: report a different model number
    pub fn with_model_number(self, model_number: &str) -> Self {
        self.set_value(Characteristic::MODEL_NUMBER, model_number.as_bytes());
        self
    }

    pub fn set_value(&self, characteristic: Characteristic, value: &[u8]) {
        self.characteristics.lock().insert(characteristic, value.to_vec());
    }

    /// Lose the link without a disconnect request
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Transport for SimTransport {
    fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn read(&self, characteristic: Characteristic) -> Result<Vec<u8>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.characteristics
            .lock()
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("characteristic {} not found", characteristic)))
    }

    fn write(&self, characteristic: Characteristic, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.set_value(characteristic, data);
        let subscriber = self.subscribers.lock().get(&characteristic).cloned();
        if let Some(on_data) = subscriber {
            on_data(data);
        }
        Ok(())
    }

    fn subscribe(
        &self,
        characteristic: Characteristic,
        on_data: CharacteristicCallback,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.subscribers.lock().insert(characteristic, on_data);
        Ok(())
    }

    fn unsubscribe(&self, characteristic: Characteristic) -> Result<()> {
        self.subscribers.lock().remove(&characteristic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn collector() -> (Trampoline, Arc<Mutex<Vec<DataFrame>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = frames.clone();
        (Arc::new(move |frame: &DataFrame| sink.lock().push(frame.clone())), frames)
    }

    #[test]
    fn test_sensor_must_be_sampling() {
        let sim = SimBoard::new();
        let handle = sim.lookup(SignalId::Accelerometer).unwrap();
        let (trampoline, frames) = collector();
        sim.subscribe(handle, trampoline).unwrap();

        assert!(!sim.emit(SignalId::Accelerometer, 1, SampleValue::Uint32(0)));
        sim.set_sampling(SignalId::Accelerometer, true).unwrap();
        sim.set_sensor_active(SignalId::Accelerometer, true).unwrap();
        assert!(sim.emit(SignalId::Accelerometer, 2, SampleValue::Uint32(0)));
        sim.flush();
        assert_eq!(frames.lock().len(), 1);
    }

    #[test]
    fn test_unavailable_signal() {
        let sim = SimBoard::with_signals(&[SignalId::Battery]);
        assert_eq!(sim.lookup_signal(SignalId::Color, false).unwrap(), None);
        assert_eq!(sim.lookup_signal(SignalId::Battery, true).unwrap(), None);
        assert!(sim.lookup(SignalId::Battery).is_some());
    }

    #[test]
    fn test_time_processor_decimates() {
        let sim = SimBoard::new();
        let raw = sim.lookup(SignalId::Switch).unwrap();
        let (tx, rx) = bounded(1);
        sim.create_time_processor(
            raw,
            TimeMode::Absolute,
            100,
            Box::new(move |p: Option<SignalHandle>| {
                let _ = tx.send(p);
            }),
        )
        .unwrap();
        let processor = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();

        let (trampoline, frames) = collector();
        sim.subscribe(processor, trampoline).unwrap();
        for epoch in (0..500).step_by(20) {
            sim.emit(SignalId::Switch, epoch, SampleValue::Uint32(epoch as u32));
        }
        sim.flush();

        let epochs: Vec<Epoch> = frames.lock().iter().map(|f| f.epoch).collect();
        assert_eq!(epochs, vec![0, 100, 200, 300, 400]);
    }

    #[test]
    fn test_differential_mode() {
        let mut processor = TimeProcessor {
            source: SignalHandle(1),
            signal: SignalId::Switch,
            mode: TimeMode::Differential,
            delay_ms: 10,
            last_epoch: None,
            last_value: None,
        };
        let first = processor.apply(&encode_frame(0, &SampleValue::Uint32(5))).unwrap();
        let second = processor.apply(&encode_frame(10, &SampleValue::Uint32(12))).unwrap();
        assert_eq!(decoder::decode_frame(&first).unwrap().value, SampleValue::Uint32(5));
        assert_eq!(decoder::decode_frame(&second).unwrap().value, SampleValue::Uint32(7));
        assert!(processor.apply(&encode_frame(15, &SampleValue::Uint32(1))).is_none());
    }

    #[test]
    fn test_transport_requires_connection() {
        let transport = SimTransport::new().with_model_number("2");
        assert_eq!(transport.read(Characteristic::MODEL_NUMBER), Err(Error::NotConnected));
        transport.connect().unwrap();
        assert_eq!(transport.read(Characteristic::MODEL_NUMBER).unwrap(), b"2".to_vec());
        assert!(matches!(
            transport.read(Characteristic(0x1234)),
            Err(Error::Transport(_))
        ));
    }
}
