//! Core types for the sensor link library
//!
//! This module defines the fundamental types that flow between the board and the
//! caller: raw frames as delivered by the board, decoded samples, opaque board
//! handles and the error taxonomy.

use crate::signals::SignalId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Sample timestamp in milliseconds since board boot/reset.
///
/// Monotonic per connection; not wall-clock and not comparable across reconnects.
pub type Epoch = i64;

/// Result type for sensor link operations
pub type Result<T> = std::result::Result<T, Error>;

/// Raw frame as handed over by the board on its delivery thread
///
/// The board owns the wire format; by the time a frame reaches this layer it has
/// been reduced to a type tag, the payload bytes and the board epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Board epoch of the sample
    pub epoch: Epoch,
    /// Board data type id (see [`crate::decoder::DataType`])
    pub type_id: u8,
    /// Payload bytes, little-endian
    pub data: Vec<u8>,
}

impl DataFrame {
    /// Create a new frame
    pub fn new(epoch: Epoch, type_id: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            epoch,
            type_id,
            data: data.into(),
        }
    }
}

/// Opaque board-owned handle to a data signal or a data processor output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalHandle(pub u64);

impl fmt::Display for SignalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig#{}", self.0)
    }
}

/// Opaque board-owned handle to an onboard logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoggerHandle(pub u8);

impl fmt::Display for LoggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "logger#{}", self.0)
    }
}

/// A decoded, timestamped sample. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Board epoch in milliseconds
    pub epoch: Epoch,
    /// Decoded payload
    pub value: SampleValue,
}

impl Sample {
    pub fn new(epoch: Epoch, value: SampleValue) -> Self {
        Self { epoch, value }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.epoch, self.value)
    }
}

/// Decoded payload, one variant per board data type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SampleValue {
    Uint32(u32),
    Int32(i32),
    Float(f32),
    Cartesian(CartesianFloat),
    Battery(BatteryState),
    Bytes(Vec<u8>),
    ColorAdc(ColorAdc),
    Euler(EulerAngles),
    Quaternion(Quaternion),
    CorrectedCartesian(CorrectedCartesianFloat),
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Uint32(v) => write!(f, "{}", v),
            SampleValue::Int32(v) => write!(f, "{}", v),
            SampleValue::Float(v) => write!(f, "{:.3}", v),
            SampleValue::Cartesian(v) => write!(f, "x={:.3}, y={:.3}, z={:.3}", v.x, v.y, v.z),
            SampleValue::Battery(v) => write!(f, "{} mV, {}%", v.voltage, v.charge),
            SampleValue::Bytes(v) => {
                for (i, b) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            SampleValue::ColorAdc(v) => write!(
                f,
                "clear={}, red={}, green={}, blue={}",
                v.clear, v.red, v.green, v.blue
            ),
            SampleValue::Euler(v) => write!(
                f,
                "heading={:.3}, pitch={:.3}, roll={:.3}, yaw={:.3}",
                v.heading, v.pitch, v.roll, v.yaw
            ),
            SampleValue::Quaternion(v) => write!(
                f,
                "w={:.3}, x={:.3}, y={:.3}, z={:.3}",
                v.w, v.x, v.y, v.z
            ),
            SampleValue::CorrectedCartesian(v) => write!(
                f,
                "x={:.3}, y={:.3}, z={:.3}, accuracy={}",
                v.x, v.y, v.z, v.accuracy
            ),
        }
    }
}

/// Three-axis float vector (acceleration in g, rotation in deg/s, field in uT)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianFloat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Battery voltage and charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Voltage in millivolts
    pub voltage: u16,
    /// Charge percentage, 0-100
    pub charge: u8,
}

/// Raw ADC values of the colour detector channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAdc {
    pub clear: u16,
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

/// Sensor fusion Euler angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub heading: f32,
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Sensor fusion orientation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Sensor fusion corrected vector with calibration accuracy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectedCartesianFloat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Calibration accuracy reported by the fusion algorithm (0 = unreliable, 3 = high)
    pub accuracy: u8,
}

/// A log entry (or notification) whose payload could not be turned into a Sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntry {
    /// Board epoch of the entry
    pub epoch: Epoch,
    /// Board-side logger or data type id the entry was tagged with
    pub id: u8,
    /// Raw payload
    pub data: Vec<u8>,
}

/// Errors produced by the sensor link
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Subscription to {signal} signal already in place")]
    AlreadySubscribed { signal: SignalId },

    #[error("Failed to set up logger for {signal} within {timeout:?}: {reason}")]
    LoggerSetupFailed {
        signal: SignalId,
        timeout: Duration,
        reason: String,
    },

    #[error(
        "Log download for {signal} timed out after {timeout:?} \
         ({entries_transferred}/{total_entries} entries transferred)"
    )]
    DownloadTimeout {
        signal: SignalId,
        timeout: Duration,
        entries_transferred: u32,
        total_entries: u32,
    },

    #[error("Unrecognized payload type id {type_id} at epoch {epoch}")]
    UnrecognizedPayloadType { type_id: u8, epoch: Epoch },

    #[error("Malformed {data_type} payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        data_type: String,
        expected: usize,
        actual: usize,
    },

    #[error("There is no {signal} module on this board")]
    UnsupportedModule { signal: SignalId },

    #[error("Failed to create time processor for {signal} within {timeout:?}")]
    ProcessorSetupFailed { signal: SignalId, timeout: Duration },

    #[error("Operation not allowed on {signal} while {state}")]
    InvalidState { signal: SignalId, state: String },

    #[error("Device is not connected")]
    NotConnected,

    #[error("Board error: {0}")]
    Board(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// True for errors that only affect a single sample and never end a
    /// subscription or a download.
    pub fn is_sample_scoped(&self) -> bool {
        matches!(
            self,
            Error::UnrecognizedPayloadType { .. } | Error::MalformedPayload { .. }
        )
    }

    /// True when the caller should re-establish the connection before retrying.
    pub fn suggests_reconnect(&self) -> bool {
        matches!(
            self,
            Error::DownloadTimeout { .. } | Error::NotConnected | Error::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_display() {
        let sample = Sample::new(
            1000,
            SampleValue::Cartesian(CartesianFloat {
                x: 0.1,
                y: 0.2,
                z: 9.8,
            }),
        );
        assert_eq!(format!("{}", sample), "[1000] x=0.100, y=0.200, z=9.800");

        let bytes = SampleValue::Bytes(vec![0x01, 0xAB]);
        assert_eq!(format!("{}", bytes), "01 AB");

        let battery = SampleValue::Battery(BatteryState {
            voltage: 4120,
            charge: 98,
        });
        assert_eq!(format!("{}", battery), "4120 mV, 98%");
    }

    #[test]
    fn test_error_classification() {
        let unknown = Error::UnrecognizedPayloadType {
            type_id: 42,
            epoch: 10,
        };
        assert!(unknown.is_sample_scoped());
        assert!(!unknown.suggests_reconnect());

        let timeout = Error::DownloadTimeout {
            signal: SignalId::Accelerometer,
            timeout: Duration::from_secs(1),
            entries_transferred: 3,
            total_entries: 10,
        };
        assert!(!timeout.is_sample_scoped());
        assert!(timeout.suggests_reconnect());
        let msg = timeout.to_string();
        assert!(msg.contains("accelerometer"));
        assert!(msg.contains("3/10"));
    }

    #[test]
    fn test_sample_serializes_with_kind_tag() {
        let sample = Sample::new(5, SampleValue::Uint32(7));
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"epoch":5,"value":{"kind":"uint32","value":7}}"#);
    }
}
