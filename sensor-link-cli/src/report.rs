//! Run report generation
//!
//! One JSON document per run: when it ran, which board answered and what every
//! signal produced.

use crate::config::{Mode, OutputConfig, SignalConfig};
use anyhow::{Context, Result};
use chrono::Local;
use sensor_link::{DeviceInfo, Sample, SignalId, TimeMode};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};

#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Local wall-clock time the run started, RFC 3339
    pub generated_at: String,
    pub library_version: &'static str,
    pub device: DeviceSummary,
    pub signals: Vec<SignalReport>,
}

#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    pub model: String,
    #[serde(flatten)]
    pub info: DeviceInfo,
}

#[derive(Debug, Serialize)]
pub struct SignalReport {
    pub signal: SignalId,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    pub time_mode: TimeMode,
    pub sample_count: usize,
    pub samples: Vec<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadStats>,
}

impl SignalReport {
    pub fn new(signal: SignalId, plan: &SignalConfig) -> Self {
        Self {
            signal,
            mode: plan.mode,
            delay_ms: plan.delay_ms,
            time_mode: plan.time_mode,
            sample_count: 0,
            samples: Vec::new(),
            download: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadStats {
    pub total_entries: u32,
    pub unknown_entries: u32,
    pub progress_reports: u32,
}

impl RunReport {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            generated_at: Local::now().to_rfc3339(),
            library_version: sensor_link::VERSION,
            device: DeviceSummary {
                model: info.model().to_string(),
                info,
            },
            signals: Vec::new(),
        }
    }

    pub fn push(&mut self, mut signal: SignalReport) {
        signal.sample_count = signal.samples.len();
        self.signals.push(signal);
    }

    /// Write the report to the configured file, or stdout
    pub fn write(&self, output: &OutputConfig) -> Result<()> {
        match &output.report {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create report file: {:?}", path))?;
                self.write_to(BufWriter::new(file), output.pretty)
                    .with_context(|| format!("Failed to write report file: {:?}", path))?;
                log::info!("Report written to {:?}", path);
            }
            None => self.write_to(io::stdout().lock(), output.pretty)?,
        }
        Ok(())
    }

    fn write_to<W: Write>(&self, mut writer: W, pretty: bool) -> Result<()> {
        if pretty {
            serde_json::to_writer_pretty(&mut writer, self)?;
        } else {
            serde_json::to_writer(&mut writer, self)?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}
