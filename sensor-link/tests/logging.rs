// Integration tests for onboard logging and log download against the simulated board
use sensor_link::sim::{SimBoard, SimTransport};
use sensor_link::{
    CartesianFloat, ClientConfig, Device, DownloadSinks, Error, LoggerState, Sample, SampleValue,
    SignalId, TimeMode, UnknownEntry,
};
use std::sync::Arc;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn connected(sim: &Arc<SimBoard>, config: ClientConfig) -> (Device, Arc<SimTransport>) {
    init_logging();
    let transport = Arc::new(SimTransport::new());
    let device = Device::new(sim.clone(), transport.clone(), config).unwrap();
    device.connect().unwrap();
    (device, transport)
}

fn synthetic(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            Sample::new(
                1000 + 20 * i as i64,
                SampleValue::Cartesian(CartesianFloat {
                    x: i as f32 * 0.01,
                    y: -(i as f32) * 0.02,
                    z: 9.81,
                }),
            )
        })
        .collect()
}

fn record(sim: &SimBoard, device: &Device, signal: SignalId, samples: &[Sample]) {
    device.start_logging(signal).unwrap();
    for sample in samples {
        assert!(sim.emit(signal, sample.epoch, sample.value.clone()));
    }
    device.stop_logging(signal).unwrap();
}

#[test]
fn test_log_stop_download_round() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());
    let expected = synthetic(37);

    record(&sim, &device, SignalId::Accelerometer, &expected);
    assert_eq!(sim.logger_count(), 1);
    assert!(!sim.is_sampling(SignalId::Accelerometer));

    let download = device
        .download_log_with_stats(
            SignalId::Accelerometer,
            Duration::from_secs(2),
            DownloadSinks::new(),
        )
        .unwrap();

    assert_eq!(download.samples, expected);
    assert!(download.state.done);
    assert_eq!(download.state.entries_left, 0);
    assert_eq!(download.state.total_entries, 37);
    assert_eq!(device.logger_state(SignalId::Accelerometer), LoggerState::Idle);
    assert_eq!(sim.logger_count(), 0);
}

#[test]
fn test_empty_download() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());

    record(&sim, &device, SignalId::Switch, &[]);
    let samples = device.download_log_default(SignalId::Switch).unwrap();
    assert!(samples.is_empty());
}

#[test]
fn test_download_without_logger() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());

    let err = device.download_log_default(SignalId::Gyroscope).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_download_stops_recording() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());
    let expected = synthetic(4);

    device.start_logging(SignalId::Gyroscope).unwrap();
    for sample in &expected {
        sim.emit(SignalId::Gyroscope, sample.epoch, sample.value.clone());
    }
    let samples = device.download_log_default(SignalId::Gyroscope).unwrap();

    assert_eq!(samples, expected);
    assert!(!sim.is_recording());
    assert!(!sim.is_sampling(SignalId::Gyroscope));
}

#[test]
fn test_progress_is_reported_per_batch() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new().with_download_batch_size(10));
    device.start_logging(SignalId::Switch).unwrap();
    for epoch in 0..25 {
        sim.emit(SignalId::Switch, epoch, SampleValue::Uint32(1));
    }
    device.stop_logging(SignalId::Switch).unwrap();

    let mut progress = Vec::new();
    let mut streamed = 0;
    let samples = device
        .download_log(
            SignalId::Switch,
            Duration::from_secs(2),
            DownloadSinks::new()
                .with_progress(|left, total| progress.push((left, total)))
                .with_samples(|_| streamed += 1),
        )
        .unwrap();

    assert_eq!(samples.len(), 25);
    assert_eq!(streamed, 25);
    assert_eq!(progress.first(), Some(&(25, 25)));
    assert_eq!(progress.last(), Some(&(0, 25)));
    assert_eq!(progress.len(), 10);
    assert!(progress.windows(2).all(|w| w[1].0 <= w[0].0));
}

#[test]
fn test_unknown_entries_are_reported() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());
    record(&sim, &device, SignalId::Temperature, &[Sample::new(1, SampleValue::Float(21.5))]);
    sim.inject_unknown_entry(UnknownEntry {
        epoch: 2,
        id: 0x1F,
        data: vec![0xAA, 0xBB],
    });

    let mut unknown = Vec::new();
    let download = device
        .download_log_with_stats(
            SignalId::Temperature,
            Duration::from_secs(2),
            DownloadSinks::new().with_unknown_entries(|entry| unknown.push(entry)),
        )
        .unwrap();

    assert_eq!(download.samples, vec![Sample::new(1, SampleValue::Float(21.5))]);
    assert_eq!(download.unknown_entries, 1);
    assert_eq!(download.state.total_entries, 2);
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].id, 0x1F);
}

#[test]
fn test_timeout_then_subscribe_and_retry() {
    let sim = Arc::new(SimBoard::new());
    let (device, transport) = connected(&sim, ClientConfig::new());
    let expected = synthetic(6);
    record(&sim, &device, SignalId::Accelerometer, &expected);

    sim.set_stall_downloads(true);
    let mut samples_seen = 0;
    let err = device
        .download_log(
            SignalId::Accelerometer,
            Duration::from_millis(100),
            DownloadSinks::new().with_samples(|_| samples_seen += 1),
        )
        .unwrap_err();
    assert!(err.suggests_reconnect());
    match err {
        Error::DownloadTimeout {
            signal,
            timeout,
            entries_transferred,
            total_entries,
        } => {
            assert_eq!(signal, SignalId::Accelerometer);
            assert_eq!(timeout, Duration::from_millis(100));
            assert_eq!(entries_transferred, 0);
            assert_eq!(total_entries, 6);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(samples_seen, 0);
    assert_eq!(device.logger_state(SignalId::Accelerometer), LoggerState::Idle);
    assert_eq!(sim.logger_count(), 1);

    let attempt = device.last_download(SignalId::Accelerometer).unwrap();
    assert!(!attempt.done);
    assert_eq!(attempt.entries_left, 6);
    assert!(attempt.error.unwrap().contains("0/6 entries transferred"));

    // No dangling registration is left behind
    device.subscribe(SignalId::Accelerometer, |_: Sample| {}).unwrap();
    device.unsubscribe(SignalId::Accelerometer).unwrap();

    // Reconnect and repeat the whole transfer
    sim.set_stall_downloads(false);
    transport.drop_link();
    assert_eq!(
        device.download_log_default(SignalId::Accelerometer).unwrap_err(),
        Error::NotConnected
    );
    device.connect().unwrap();
    let samples = device.download_log_default(SignalId::Accelerometer).unwrap();
    assert_eq!(samples, expected);
    let attempt = device.last_download(SignalId::Accelerometer).unwrap();
    assert!(attempt.done);
    assert_eq!(attempt.error, None);
}

#[test]
fn test_sample_delay_waits_for_kept_logger() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());
    let sensor = device.sensor(SignalId::Accelerometer);
    let raw = synthetic(5);

    sensor
        .set_sample_delay(Some(Duration::from_millis(50)), TimeMode::Absolute)
        .unwrap();
    record(&sim, &device, SignalId::Accelerometer, &raw[..1]);

    // The kept logger records from the time processor, so the handle must stay
    let err = sensor.set_sample_delay(None, TimeMode::Absolute).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(sim.processor_count(), 1);
    assert_eq!(
        sensor.download_log(Duration::from_secs(2), DownloadSinks::new()).unwrap(),
        raw[..1].to_vec()
    );

    // Once downloaded the delay can go, and a fresh logger records the raw signal
    sensor.set_sample_delay(None, TimeMode::Absolute).unwrap();
    record(&sim, &device, SignalId::Accelerometer, &raw);
    assert_eq!(device.download_log_default(SignalId::Accelerometer).unwrap(), raw);
}

#[test]
fn test_kept_raw_logger_blocks_new_delay() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());
    record(&sim, &device, SignalId::Gyroscope, &synthetic(2));

    let err = device
        .set_sample_delay(SignalId::Gyroscope, Some(Duration::from_millis(100)), TimeMode::Absolute)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(sim.processor_count(), 0);

    // After the download the delay applies to the next recording
    assert_eq!(device.download_log_default(SignalId::Gyroscope).unwrap().len(), 2);
    device
        .set_sample_delay(SignalId::Gyroscope, Some(Duration::from_millis(100)), TimeMode::Absolute)
        .unwrap();
    record(&sim, &device, SignalId::Gyroscope, &synthetic(10));
    let samples = device.download_log_default(SignalId::Gyroscope).unwrap();
    assert_eq!(samples.len(), 2);
}

#[test]
fn test_refused_logger() {
    let sim = Arc::new(SimBoard::new());
    sim.set_refuse_loggers(true);
    let (device, _) = connected(&sim, ClientConfig::new());

    let err = device.start_logging(SignalId::Magnetometer).unwrap_err();
    assert!(matches!(err, Error::LoggerSetupFailed { signal: SignalId::Magnetometer, .. }));
    assert_eq!(device.logger_state(SignalId::Magnetometer), LoggerState::Idle);
    assert!(!sim.is_recording());
}

#[test]
fn test_late_logger_is_removed() {
    let sim = Arc::new(SimBoard::new());
    sim.set_silent_loggers(true);
    let config = ClientConfig::new().with_logger_ready_timeout(Duration::from_millis(40));
    let (device, _) = connected(&sim, config);

    let err = device.start_logging(SignalId::Pressure).unwrap_err();
    assert!(matches!(err, Error::LoggerSetupFailed { .. }));

    sim.release_held_replies();
    sim.flush();
    assert_eq!(sim.logger_count(), 0);

    // A fresh request succeeds once the board answers again
    sim.set_silent_loggers(false);
    device.start_logging(SignalId::Pressure).unwrap();
    assert!(matches!(
        device.logger_state(SignalId::Pressure),
        LoggerState::Recording(_)
    ));
}

#[test]
fn test_undownloaded_logger_is_reused() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());
    let first = synthetic(3);
    let second: Vec<Sample> = synthetic(6).split_off(3);

    record(&sim, &device, SignalId::Accelerometer, &first);
    record(&sim, &device, SignalId::Accelerometer, &second);
    assert_eq!(sim.logger_count(), 1);

    let samples = device.download_log_default(SignalId::Accelerometer).unwrap();
    assert_eq!(samples, synthetic(6));
}

#[test]
fn test_start_while_recording_is_rejected() {
    let sim = Arc::new(SimBoard::new());
    let (device, _) = connected(&sim, ClientConfig::new());
    let sensor = device.sensor(SignalId::Battery);

    sensor.start_logging().unwrap();
    assert!(matches!(
        sensor.start_logging(),
        Err(Error::InvalidState { signal: SignalId::Battery, .. })
    ));
    sensor.stop_logging().unwrap();
    sensor.stop_logging().unwrap();
    assert_eq!(sensor.logger_state(), LoggerState::Idle);
}
