//! Wireless transport boundary
//!
//! The characteristic-based transport adapter is an external collaborator. The
//! device uses it for connection management and to read the standard device
//! information characteristics; everything else goes through the board.

use crate::types::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 16-bit GATT characteristic identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Characteristic(pub u16);

impl Characteristic {
    pub const MANUFACTURER_NAME: Characteristic = Characteristic(0x2A29);
    pub const MODEL_NUMBER: Characteristic = Characteristic(0x2A24);
    pub const SERIAL_NUMBER: Characteristic = Characteristic(0x2A25);
    pub const FIRMWARE_REVISION: Characteristic = Characteristic(0x2A26);
    pub const HARDWARE_REVISION: Characteristic = Characteristic(0x2A27);
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Notification callback for characteristic value changes
pub type CharacteristicCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Connect/read/write/subscribe primitives of the wireless link
pub trait Transport: Send + Sync {
    fn connect(&self) -> Result<()>;
    fn disconnect(&self) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn read(&self, characteristic: Characteristic) -> Result<Vec<u8>>;
    fn write(&self, characteristic: Characteristic, data: &[u8]) -> Result<()>;
    fn subscribe(
        &self,
        characteristic: Characteristic,
        on_data: CharacteristicCallback,
    ) -> Result<()>;
    fn unsubscribe(&self, characteristic: Characteristic) -> Result<()>;
}

/// Board models, by the model number reported in device information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardModel {
    Unknown,
    MetaWearR,
    MetaWearRg,
    MetaWearC,
    MetaHealth,
    MetaTracker,
    MetaMotionR,
    MetaMotionC,
}

impl BoardModel {
    /// Map a model number string to the board model
    ///
    /// Several models share a model number and are only told apart by their module
    /// set; those map to the base model of the family.
    pub fn from_model_number(model_number: &str) -> Self {
        match model_number.trim() {
            "0" => BoardModel::MetaWearR,
            "1" => BoardModel::MetaWearRg,
            "2" => BoardModel::MetaWearC,
            "3" => BoardModel::MetaHealth,
            "4" => BoardModel::MetaTracker,
            "5" => BoardModel::MetaMotionR,
            "6" => BoardModel::MetaMotionC,
            _ => BoardModel::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BoardModel::Unknown => "Unknown",
            BoardModel::MetaWearR => "MetaWear R",
            BoardModel::MetaWearRg => "MetaWear RG",
            BoardModel::MetaWearC => "MetaWear C",
            BoardModel::MetaHealth => "MetaHealth",
            BoardModel::MetaTracker => "MetaTracker",
            BoardModel::MetaMotionR => "MetaMotion R",
            BoardModel::MetaMotionC => "MetaMotion C",
        }
    }
}

impl fmt::Display for BoardModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device information read from the standard characteristics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model_number: String,
    pub serial: String,
    pub firmware: String,
    pub hardware: String,
}

impl DeviceInfo {
    /// Read all device information characteristics
    pub fn read_from(transport: &dyn Transport) -> Result<Self> {
        let read_string = |characteristic: Characteristic| -> Result<String> {
            let raw = transport.read(characteristic)?;
            Ok(String::from_utf8_lossy(&raw)
                .trim_end_matches('\0')
                .to_string())
        };

        Ok(Self {
            manufacturer: read_string(Characteristic::MANUFACTURER_NAME)?,
            model_number: read_string(Characteristic::MODEL_NUMBER)?,
            serial: read_string(Characteristic::SERIAL_NUMBER)?,
            firmware: read_string(Characteristic::FIRMWARE_REVISION)?,
            hardware: read_string(Characteristic::HARDWARE_REVISION)?,
        })
    }

    pub fn model(&self) -> BoardModel {
        BoardModel::from_model_number(&self.model_number)
    }
}
