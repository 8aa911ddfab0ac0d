//! Data signals, the per-device signal registry and the subscription table
//!
//! A [`SignalId`] names a logical data source on the board. The registry resolves it
//! to the board's opaque handle on first use and caches the result; the
//! subscription table enforces the one-callback-per-signal rule.

pub mod registry;
pub mod subscription;

use crate::decoder::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export key types for convenience
pub use registry::{Signal, SignalRegistry};
pub use subscription::{Subscriber, Subscription, SubscriptionTable};

/// Logical data signals exposed by the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalId {
    Accelerometer,
    Gyroscope,
    Magnetometer,
    Pressure,
    Altitude,
    AmbientLight,
    Temperature,
    Battery,
    Switch,
    Color,
    CorrectedAcceleration,
    CorrectedRotation,
    CorrectedMagneticField,
    Quaternion,
    EulerAngles,
    Gravity,
    LinearAcceleration,
}

/// Board module owning a signal; sampling and start/stop are per module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Accelerometer,
    Gyroscope,
    Magnetometer,
    Barometer,
    AmbientLight,
    Temperature,
    Settings,
    Switch,
    ColorDetector,
    SensorFusion,
}

impl SignalId {
    /// Every signal known to this layer
    pub const ALL: [SignalId; 17] = [
        SignalId::Accelerometer,
        SignalId::Gyroscope,
        SignalId::Magnetometer,
        SignalId::Pressure,
        SignalId::Altitude,
        SignalId::AmbientLight,
        SignalId::Temperature,
        SignalId::Battery,
        SignalId::Switch,
        SignalId::Color,
        SignalId::CorrectedAcceleration,
        SignalId::CorrectedRotation,
        SignalId::CorrectedMagneticField,
        SignalId::Quaternion,
        SignalId::EulerAngles,
        SignalId::Gravity,
        SignalId::LinearAcceleration,
    ];

    /// Configuration name of the signal
    pub fn name(self) -> &'static str {
        match self {
            SignalId::Accelerometer => "accelerometer",
            SignalId::Gyroscope => "gyroscope",
            SignalId::Magnetometer => "magnetometer",
            SignalId::Pressure => "pressure",
            SignalId::Altitude => "altitude",
            SignalId::AmbientLight => "ambient_light",
            SignalId::Temperature => "temperature",
            SignalId::Battery => "battery",
            SignalId::Switch => "switch",
            SignalId::Color => "color",
            SignalId::CorrectedAcceleration => "corrected_acceleration",
            SignalId::CorrectedRotation => "corrected_rotation",
            SignalId::CorrectedMagneticField => "corrected_magnetic_field",
            SignalId::Quaternion => "quaternion",
            SignalId::EulerAngles => "euler_angles",
            SignalId::Gravity => "gravity",
            SignalId::LinearAcceleration => "linear_acceleration",
        }
    }

    /// Payload type the board emits for this signal
    pub fn data_type(self) -> DataType {
        match self {
            SignalId::Accelerometer
            | SignalId::Gyroscope
            | SignalId::Magnetometer
            | SignalId::Gravity
            | SignalId::LinearAcceleration => DataType::CartesianFloat,
            SignalId::Pressure | SignalId::Altitude | SignalId::Temperature => DataType::Float,
            SignalId::AmbientLight | SignalId::Switch => DataType::Uint32,
            SignalId::Battery => DataType::BatteryState,
            SignalId::Color => DataType::ColorAdc,
            SignalId::CorrectedAcceleration
            | SignalId::CorrectedRotation
            | SignalId::CorrectedMagneticField => DataType::CorrectedCartesianFloat,
            SignalId::Quaternion => DataType::Quaternion,
            SignalId::EulerAngles => DataType::EulerAngle,
        }
    }

    /// Board module the signal belongs to
    pub fn module(self) -> Module {
        match self {
            SignalId::Accelerometer => Module::Accelerometer,
            SignalId::Gyroscope => Module::Gyroscope,
            SignalId::Magnetometer => Module::Magnetometer,
            SignalId::Pressure | SignalId::Altitude => Module::Barometer,
            SignalId::AmbientLight => Module::AmbientLight,
            SignalId::Temperature => Module::Temperature,
            SignalId::Battery => Module::Settings,
            SignalId::Switch => Module::Switch,
            SignalId::Color => Module::ColorDetector,
            SignalId::CorrectedAcceleration
            | SignalId::CorrectedRotation
            | SignalId::CorrectedMagneticField
            | SignalId::Quaternion
            | SignalId::EulerAngles
            | SignalId::Gravity
            | SignalId::LinearAcceleration => Module::SensorFusion,
        }
    }

    /// True when the module must be told to sample and start before data flows
    pub fn needs_sensor_control(self) -> bool {
        !matches!(
            self.module(),
            Module::Temperature | Module::Settings | Module::Switch | Module::ColorDetector
        )
    }

    /// True for signals that only produce data when explicitly read
    pub fn is_readable(self) -> bool {
        matches!(
            self.module(),
            Module::Temperature | Module::Settings | Module::ColorDetector
        )
    }

    /// True for signals with a packed high-frequency streaming variant
    pub fn supports_high_frequency(self) -> bool {
        matches!(self, SignalId::Accelerometer | SignalId::Gyroscope)
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignalId {
    type Err = crate::types::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        SignalId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == normalized)
            .ok_or_else(|| {
                crate::types::Error::Configuration(format!("Unknown signal name: {:?}", s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names_parse_back() {
        for id in SignalId::ALL {
            assert_eq!(id.name().parse::<SignalId>().unwrap(), id);
        }
        assert_eq!("Ambient-Light".parse::<SignalId>().unwrap(), SignalId::AmbientLight);
        assert!("flux_capacitor".parse::<SignalId>().is_err());
    }

    #[test]
    fn test_signal_properties() {
        assert_eq!(SignalId::Accelerometer.data_type(), DataType::CartesianFloat);
        assert_eq!(SignalId::Battery.data_type(), DataType::BatteryState);
        assert!(SignalId::Accelerometer.needs_sensor_control());
        assert!(!SignalId::Battery.needs_sensor_control());
        assert!(SignalId::Battery.is_readable());
        assert!(SignalId::Gyroscope.supports_high_frequency());
        assert!(!SignalId::Quaternion.supports_high_frequency());
        assert_eq!(SignalId::Altitude.module(), Module::Barometer);
    }
}
