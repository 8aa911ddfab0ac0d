//! Sensor Link Library
//!
//! Host-side client for a wireless sensor board: subscribe to the board's data
//! signals, record them into the onboard log, download the log and limit
//! sample rates with time processors.
//!
//! # Architecture
//!
//! The board's native core is a black box behind the [`Board`] trait. It answers
//! commands asynchronously on a delivery thread of its own. This library:
//! - Decodes raw frames into typed samples
//! - Resolves and caches signals per device
//! - Dispatches samples to at most one callback per signal
//! - Drives onboard logger sessions and log downloads
//! - Binds time processors in front of signals
//!
//! Blocking operations wait on a per-request rendezvous with a timeout; no lock
//! is held while waiting or while user callbacks run.
//!
//! The library does NOT:
//! - Scan for or pair with devices
//! - Configure sensor ranges or output data rates
//! - Drive LEDs or haptics
//!
//! # Example Usage
//!
//! ```
//! use sensor_link::sim::{SimBoard, SimTransport};
//! use sensor_link::{ClientConfig, Device, Sample, SampleValue, SignalId};
//! use std::sync::Arc;
//!
//! let board = Arc::new(SimBoard::new());
//! let transport = Arc::new(SimTransport::new());
//! let device = Device::new(board.clone(), transport, ClientConfig::new()).unwrap();
//! device.connect().unwrap();
//!
//! // Record the switch into the onboard log
//! device.start_logging(SignalId::Switch).unwrap();
//! board.emit(SignalId::Switch, 10, SampleValue::Uint32(1));
//! board.emit(SignalId::Switch, 20, SampleValue::Uint32(0));
//! device.stop_logging(SignalId::Switch).unwrap();
//!
//! // Pull it back
//! let samples: Vec<Sample> = device.download_log_default(SignalId::Switch).unwrap();
//! assert_eq!(samples.len(), 2);
//! ```

// Public modules
pub mod board;
pub mod config;
pub mod decoder;
pub mod device;
pub mod download;
pub mod recorder;
pub mod signals;
pub mod sim;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use board::{Board, DownloadHandler, TimeMode, Trampoline};
pub use config::ClientConfig;
pub use decoder::DataType;
pub use device::{Device, SensorHandle};
pub use download::{Download, DownloadSinks, DownloadState};
pub use recorder::LoggerState;
pub use signals::{Signal, SignalId, Subscriber, Subscription};
pub use transport::{BoardModel, Characteristic, DeviceInfo, Transport};
pub use types::{
    BatteryState, CartesianFloat, ColorAdc, CorrectedCartesianFloat, DataFrame, Epoch, Error,
    EulerAngles, LoggerHandle, Quaternion, Result, Sample, SampleValue, SignalHandle,
    UnknownEntry,
};

// Internal modules (not exposed in public API)
mod dispatch;
mod processor;
mod rendezvous;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        assert!(!VERSION.is_empty());
        assert_eq!(SignalId::ALL.len(), 17);
    }
}
