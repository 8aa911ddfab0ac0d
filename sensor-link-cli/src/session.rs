//! Runs the configured signals against a device
//!
//! The device is backed by the simulated board, so this module also plays the
//! role of the physical world: it feeds synthetic readings into the board while
//! the device is streaming or recording.

use crate::config::{Mode, SignalConfig};
use crate::report::{DownloadStats, SignalReport};
use anyhow::{Context, Result};
use sensor_link::sim::SimBoard;
use sensor_link::{
    BatteryState, CartesianFloat, ColorAdc, CorrectedCartesianFloat, Device, DownloadSinks,
    EulerAngles, Quaternion, Sample, SampleValue, SignalId, Subscriber,
};
use std::time::Duration;

/// Spacing of synthetic samples in board epoch milliseconds
const SAMPLE_PERIOD_MS: i64 = 10;

pub struct Session<'a> {
    device: &'a Device,
    board: &'a SimBoard,
    epoch: i64,
}

impl<'a> Session<'a> {
    pub fn new(device: &'a Device, board: &'a SimBoard) -> Self {
        Self {
            device,
            board,
            epoch: 0,
        }
    }

    /// Run one signal to completion
    pub fn run(&mut self, id: SignalId, plan: &SignalConfig) -> Result<SignalReport> {
        let sensor = self.device.sensor(id);
        let delay = plan.delay_ms.map(Duration::from_millis);
        if delay.is_some() {
            sensor
                .set_sample_delay(delay, plan.time_mode)
                .with_context(|| format!("Failed to set sample delay of {}", id))?;
        }

        let mut report = SignalReport::new(id, plan);
        match plan.mode {
            Mode::Stream => report.samples = self.stream(id, plan.samples)?,
            Mode::Log => {
                let (samples, stats) = self.record_and_download(id, plan.samples)?;
                report.samples = samples;
                report.download = Some(stats);
            }
        }

        if delay.is_some() {
            sensor.set_sample_delay(None, plan.time_mode)?;
        }
        Ok(report)
    }

    fn stream(&mut self, id: SignalId, count: usize) -> Result<Vec<Sample>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let subscriber = Subscriber::new(move |sample: Sample| {
            println!("  {:<24} {}", id, sample);
            let _ = tx.send(sample);
        })
        .with_unknown_entries(move |entry| {
            log::warn!("[{}] unknown entry with id {} at epoch {}", id, entry.id, entry.epoch);
        });

        self.device
            .notifications(id, Some(subscriber))
            .with_context(|| format!("Failed to subscribe to {}", id))?;
        self.produce(id, count)?;
        self.board.flush();
        self.device.notifications(id, None)?;

        Ok(rx.try_iter().collect())
    }

    fn record_and_download(
        &mut self,
        id: SignalId,
        count: usize,
    ) -> Result<(Vec<Sample>, DownloadStats)> {
        self.device
            .start_logging(id)
            .with_context(|| format!("Failed to start logging {}", id))?;
        self.produce(id, count)?;
        self.board.flush();
        self.device.stop_logging(id)?;

        let mut progress_reports = 0;
        let download = self
            .device
            .download_log_with_stats(
                id,
                self.device.config().download_timeout(),
                DownloadSinks::new().with_progress(|left, total| {
                    progress_reports += 1;
                    println!("  {:<24} {}/{} entries left", id, left, total);
                }),
            )
            .with_context(|| format!("Failed to download the log of {}", id))?;

        let stats = DownloadStats {
            total_entries: download.state.total_entries,
            unknown_entries: download.unknown_entries,
            progress_reports,
        };
        Ok((download.samples, stats))
    }

    /// Make the board produce `count` readings of `id`
    fn produce(&mut self, id: SignalId, count: usize) -> Result<()> {
        for i in 0..count {
            self.epoch += SAMPLE_PERIOD_MS;
            if id.is_readable() {
                self.board.set_reading(id, synthetic(id, i));
                self.device.read(id)?;
            } else {
                self.board.emit(id, self.epoch, synthetic(id, i));
            }
        }
        Ok(())
    }
}

/// Deterministic waveform for a signal
fn synthetic(id: SignalId, i: usize) -> SampleValue {
    let t = i as f32 * 0.1;
    let (s, c) = t.sin_cos();
    match id {
        SignalId::Accelerometer | SignalId::Gravity => SampleValue::Cartesian(CartesianFloat {
            x: 0.1 * s,
            y: 0.1 * c,
            z: 9.81,
        }),
        SignalId::Gyroscope | SignalId::Magnetometer | SignalId::LinearAcceleration => {
            SampleValue::Cartesian(CartesianFloat {
                x: s,
                y: c,
                z: s * c,
            })
        }
        SignalId::Pressure => SampleValue::Float(101_325.0 + 12.0 * s),
        SignalId::Altitude => SampleValue::Float(42.0 + s),
        SignalId::Temperature => SampleValue::Float(22.5 + 0.5 * s),
        SignalId::AmbientLight => SampleValue::Uint32(400 + (100.0 * c.abs()) as u32),
        SignalId::Switch => SampleValue::Uint32((i / 5 % 2) as u32),
        SignalId::Battery => SampleValue::Battery(BatteryState {
            voltage: 4100u16.saturating_sub(i as u16),
            charge: 100u8.saturating_sub((i / 10).min(100) as u8),
        }),
        SignalId::Color => SampleValue::ColorAdc(ColorAdc {
            clear: 600,
            red: 200 + (i % 50) as u16,
            green: 180,
            blue: 160,
        }),
        SignalId::CorrectedAcceleration
        | SignalId::CorrectedRotation
        | SignalId::CorrectedMagneticField => {
            SampleValue::CorrectedCartesian(CorrectedCartesianFloat {
                x: s,
                y: c,
                z: 1.0,
                accuracy: 3,
            })
        }
        SignalId::Quaternion => SampleValue::Quaternion(Quaternion {
            w: (t / 2.0).cos(),
            x: 0.0,
            y: 0.0,
            z: (t / 2.0).sin(),
        }),
        SignalId::EulerAngles => SampleValue::Euler(EulerAngles {
            heading: (t * 10.0) % 360.0,
            pitch: 5.0 * s,
            roll: 5.0 * c,
            yaw: (t * 10.0) % 360.0,
        }),
    }
}
