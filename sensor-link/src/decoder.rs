//! Payload decoding
//!
//! Turns a board frame (type tag + little-endian payload bytes + epoch) into a typed
//! [`Sample`]. The decoder is pure and stateless: the same input always yields the
//! same output, and a bad frame only ever fails that one frame.

use crate::types::{
    BatteryState, CartesianFloat, ColorAdc, CorrectedCartesianFloat, DataFrame, Epoch, Error,
    EulerAngles, Quaternion, Result, Sample, SampleValue,
};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Board data type ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataType {
    Uint32 = 0,
    Float = 1,
    CartesianFloat = 2,
    Int32 = 3,
    ByteArray = 4,
    BatteryState = 5,
    ColorAdc = 6,
    EulerAngle = 7,
    Quaternion = 8,
    CorrectedCartesianFloat = 9,
}

impl DataType {
    /// Board type id of this data type
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Exact payload size in bytes, `None` for variable length payloads
    pub fn payload_size(self) -> Option<usize> {
        match self {
            DataType::Uint32 | DataType::Float | DataType::Int32 => Some(4),
            DataType::CartesianFloat => Some(12),
            DataType::ByteArray => None,
            DataType::BatteryState => Some(3),
            DataType::ColorAdc => Some(8),
            DataType::EulerAngle | DataType::Quaternion => Some(16),
            DataType::CorrectedCartesianFloat => Some(13),
        }
    }
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        Ok(match value {
            0 => DataType::Uint32,
            1 => DataType::Float,
            2 => DataType::CartesianFloat,
            3 => DataType::Int32,
            4 => DataType::ByteArray,
            5 => DataType::BatteryState,
            6 => DataType::ColorAdc,
            7 => DataType::EulerAngle,
            8 => DataType::Quaternion,
            9 => DataType::CorrectedCartesianFloat,
            other => return Err(other),
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Uint32 => "uint32",
            DataType::Float => "float",
            DataType::CartesianFloat => "cartesian float",
            DataType::Int32 => "int32",
            DataType::ByteArray => "byte array",
            DataType::BatteryState => "battery state",
            DataType::ColorAdc => "color adc",
            DataType::EulerAngle => "euler angle",
            DataType::Quaternion => "quaternion",
            DataType::CorrectedCartesianFloat => "corrected cartesian float",
        };
        f.write_str(name)
    }
}

/// Decode a raw payload into a sample
///
/// # Arguments
/// * `type_id` - Board data type id of the payload
/// * `data` - Payload bytes
/// * `epoch` - Board epoch of the sample
///
/// # Returns
/// * `Err(Error::UnrecognizedPayloadType)` for a tag this layer does not know
/// * `Err(Error::MalformedPayload)` when the payload does not fit the tag's layout
pub fn decode(type_id: u8, data: &[u8], epoch: Epoch) -> Result<Sample> {
    let data_type = DataType::try_from(type_id)
        .map_err(|type_id| Error::UnrecognizedPayloadType { type_id, epoch })?;

    if let Some(expected) = data_type.payload_size() {
        if data.len() != expected {
            return Err(Error::MalformedPayload {
                data_type: data_type.to_string(),
                expected,
                actual: data.len(),
            });
        }
    }

    let value = match data_type {
        DataType::Uint32 => SampleValue::Uint32(LittleEndian::read_u32(data)),
        DataType::Float => SampleValue::Float(LittleEndian::read_f32(data)),
        DataType::Int32 => SampleValue::Int32(LittleEndian::read_i32(data)),
        DataType::CartesianFloat => {
            let [x, y, z] = read_f32s::<3>(data);
            SampleValue::Cartesian(CartesianFloat { x, y, z })
        }
        DataType::ByteArray => SampleValue::Bytes(data.to_vec()),
        DataType::BatteryState => {
            let charge = data[2];
            if charge > 100 {
                return Err(Error::MalformedPayload {
                    data_type: format!("{} (charge {}%)", data_type, charge),
                    expected: 3,
                    actual: data.len(),
                });
            }
            SampleValue::Battery(BatteryState {
                voltage: LittleEndian::read_u16(&data[0..2]),
                charge,
            })
        }
        DataType::ColorAdc => SampleValue::ColorAdc(ColorAdc {
            clear: LittleEndian::read_u16(&data[0..2]),
            red: LittleEndian::read_u16(&data[2..4]),
            green: LittleEndian::read_u16(&data[4..6]),
            blue: LittleEndian::read_u16(&data[6..8]),
        }),
        DataType::EulerAngle => {
            let [heading, pitch, roll, yaw] = read_f32s::<4>(data);
            SampleValue::Euler(EulerAngles {
                heading,
                pitch,
                roll,
                yaw,
            })
        }
        DataType::Quaternion => {
            let [w, x, y, z] = read_f32s::<4>(data);
            SampleValue::Quaternion(Quaternion { w, x, y, z })
        }
        DataType::CorrectedCartesianFloat => {
            let [x, y, z] = read_f32s::<3>(&data[..12]);
            SampleValue::CorrectedCartesian(CorrectedCartesianFloat {
                x,
                y,
                z,
                accuracy: data[12],
            })
        }
    };

    Ok(Sample::new(epoch, value))
}

/// Decode a board frame
pub fn decode_frame(frame: &DataFrame) -> Result<Sample> {
    decode(frame.type_id, &frame.data, frame.epoch)
}

/// Encode a sample value back into its board payload
///
/// Used by the simulated board and by tests to build frames; the real board
/// produces these bytes itself.
pub fn encode(value: &SampleValue) -> (DataType, Vec<u8>) {
    match value {
        SampleValue::Uint32(v) => (DataType::Uint32, v.to_le_bytes().to_vec()),
        SampleValue::Float(v) => (DataType::Float, v.to_le_bytes().to_vec()),
        SampleValue::Int32(v) => (DataType::Int32, v.to_le_bytes().to_vec()),
        SampleValue::Cartesian(v) => (DataType::CartesianFloat, write_f32s(&[v.x, v.y, v.z])),
        SampleValue::Bytes(v) => (DataType::ByteArray, v.clone()),
        SampleValue::Battery(v) => {
            let mut out = v.voltage.to_le_bytes().to_vec();
            out.push(v.charge);
            (DataType::BatteryState, out)
        }
        SampleValue::ColorAdc(v) => {
            let mut out = Vec::with_capacity(8);
            for channel in [v.clear, v.red, v.green, v.blue] {
                out.extend_from_slice(&channel.to_le_bytes());
            }
            (DataType::ColorAdc, out)
        }
        SampleValue::Euler(v) => (
            DataType::EulerAngle,
            write_f32s(&[v.heading, v.pitch, v.roll, v.yaw]),
        ),
        SampleValue::Quaternion(v) => (DataType::Quaternion, write_f32s(&[v.w, v.x, v.y, v.z])),
        SampleValue::CorrectedCartesian(v) => {
            let mut out = write_f32s(&[v.x, v.y, v.z]);
            out.push(v.accuracy);
            (DataType::CorrectedCartesianFloat, out)
        }
    }
}

/// Build a board frame for a sample value
pub fn encode_frame(epoch: Epoch, value: &SampleValue) -> DataFrame {
    let (data_type, data) = encode(value);
    DataFrame::new(epoch, data_type.id(), data)
}

fn read_f32s<const N: usize>(data: &[u8]) -> [f32; N] {
    let mut out = [0.0f32; N];
    LittleEndian::read_f32_into(&data[..N * 4], &mut out);
    out
}

fn write_f32s(values: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_cartesian_float() {
        let mut data = Vec::new();
        for v in [0.10f32, 0.20, 9.80] {
            data.extend_from_slice(&v.to_le_bytes());
        }

        let sample = decode(DataType::CartesianFloat.id(), &data, 1000).unwrap();
        assert_eq!(sample.epoch, 1000);
        assert_eq!(
            sample.value,
            SampleValue::Cartesian(CartesianFloat {
                x: 0.10,
                y: 0.20,
                z: 9.80
            })
        );
    }

    #[test]
    fn test_decode_scalars() {
        let sample = decode(0, &42u32.to_le_bytes(), 1).unwrap();
        assert_eq!(sample.value, SampleValue::Uint32(42));

        let sample = decode(3, &(-7i32).to_le_bytes(), 1).unwrap();
        assert_eq!(sample.value, SampleValue::Int32(-7));

        let sample = decode(1, &21.5f32.to_le_bytes(), 1).unwrap();
        assert_eq!(sample.value, SampleValue::Float(21.5));
    }

    #[test]
    fn test_decode_battery_state() {
        // 4100 mV = 0x1004, 87%
        let sample = decode(5, &[0x04, 0x10, 87], 0).unwrap();
        assert_eq!(
            sample.value,
            SampleValue::Battery(BatteryState {
                voltage: 4100,
                charge: 87
            })
        );

        let err = decode(5, &[0x04, 0x10, 101], 0).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_decode_color_adc() {
        let data = [0x10, 0x00, 0x20, 0x00, 0x30, 0x00, 0x40, 0x01];
        let sample = decode(6, &data, 0).unwrap();
        assert_eq!(
            sample.value,
            SampleValue::ColorAdc(ColorAdc {
                clear: 0x10,
                red: 0x20,
                green: 0x30,
                blue: 0x140
            })
        );
    }

    #[test]
    fn test_decode_corrected_cartesian() {
        let mut data = write_f32s(&[1.0, -2.0, 0.5]);
        data.push(3);
        let sample = decode(9, &data, 12).unwrap();
        assert_eq!(
            sample.value,
            SampleValue::CorrectedCartesian(CorrectedCartesianFloat {
                x: 1.0,
                y: -2.0,
                z: 0.5,
                accuracy: 3
            })
        );
    }

    #[test]
    fn test_decode_byte_array_any_length() {
        assert_eq!(decode(4, &[], 0).unwrap().value, SampleValue::Bytes(vec![]));
        assert_eq!(
            decode(4, &[1, 2, 3, 4, 5], 0).unwrap().value,
            SampleValue::Bytes(vec![1, 2, 3, 4, 5])
        );
    }

    #[test]
    fn test_unknown_tag() {
        let err = decode(0x42, &[0, 1, 2], 77).unwrap_err();
        assert_eq!(
            err,
            Error::UnrecognizedPayloadType {
                type_id: 0x42,
                epoch: 77
            }
        );
        assert!(err.is_sample_scoped());
    }

    #[test]
    fn test_wrong_length() {
        let err = decode(DataType::Quaternion.id(), &[0; 12], 0).unwrap_err();
        assert_eq!(
            err,
            Error::MalformedPayload {
                data_type: "quaternion".to_string(),
                expected: 16,
                actual: 12
            }
        );
    }

    #[test]
    fn test_decode_is_deterministic() {
        let values = vec![
            SampleValue::Uint32(u32::MAX),
            SampleValue::Int32(i32::MIN),
            SampleValue::Float(-0.25),
            SampleValue::Cartesian(CartesianFloat {
                x: 0.11,
                y: 0.19,
                z: 9.79,
            }),
            SampleValue::Battery(BatteryState {
                voltage: 3700,
                charge: 50,
            }),
            SampleValue::Bytes(vec![0xde, 0xad]),
            SampleValue::ColorAdc(ColorAdc {
                clear: 1,
                red: 2,
                green: 3,
                blue: 4,
            }),
            SampleValue::Euler(EulerAngles {
                heading: 90.0,
                pitch: 1.0,
                roll: 2.0,
                yaw: 90.0,
            }),
            SampleValue::Quaternion(Quaternion {
                w: 1.0,
                x: 0.0,
                y: 0.0,
                z: 0.0,
            }),
            SampleValue::CorrectedCartesian(CorrectedCartesianFloat {
                x: 0.1,
                y: 0.2,
                z: 0.3,
                accuracy: 2,
            }),
        ];

        for value in values {
            let frame = encode_frame(123, &value);
            let first = decode_frame(&frame).unwrap();
            let second = decode_frame(&frame).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.value, value);
        }
    }

    #[test]
    fn test_data_type_ids_roundtrip() {
        for id in 0u8..=9 {
            let data_type = DataType::try_from(id).unwrap();
            assert_eq!(data_type.id(), id);
        }
        assert_eq!(DataType::try_from(10), Err(10));
    }
}
