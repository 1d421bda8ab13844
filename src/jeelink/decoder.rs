//! JeeLink LaCrosse frame decoding
//!
//! Frame layout (space separated ASCII tokens):
//!
//! ```text
//! OK 9 ID XXX XXX XXX XXX
//! |  | |  |   |   |   |
//! |  | |  |   |   |   |-- Humidity, bit 7 is the low battery flag
//! |  | |  |   |   |------ Temp * 10 + 1000 LSB
//! |  | |  |   |---------- Temp * 10 + 1000 MSB
//! |  | |  |-------------- Sensor type (1 or 2), +128 if new battery
//! |  | |----------------- Sensor ID
//! |  |------------------- Protocol family, always 9 for LaCrosse
//! |---------------------- Literal OK
//! ```
use log::debug;

use crate::error::DecodeError;
use crate::models::{SensorReading, SensorVariant};
use crate::utils::{absolute_humidity, dew_point, round, vapour_pressure};

const FRAME_TOKENS: usize = 7;
const PAYLOAD_BYTES: usize = 5;
const OK_TOKEN: &str = "OK";
const LACROSSE_FAMILY: &str = "9";

const SENSOR_TYPE_MASK: u8 = 0b0000_0011;
const PROTOCOL_TYPE_MASK: u8 = 0b0111_0000;
const NEW_BATTERY_MASK: u8 = 0b1000_0000;
const LOW_BATTERY_MASK: u8 = 0b1000_0000;
const HUMIDITY_MASK: u8 = 0b0111_1111;

const TEMPERATURE_OFFSET: f64 = 1000.0;

/// Behaviour switches for decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Round absolute humidity to one decimal; when false the raw value is kept
    pub round_absolute_humidity: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            round_absolute_humidity: true,
        }
    }
}

/// Decode one receiver line with default options
pub fn decode(line: &[u8]) -> Result<SensorReading, DecodeError> {
    decode_with(line, &DecodeOptions::default())
}

/// Decode one receiver line into a validated sensor reading.
///
/// Either every structural check passes and a complete reading is returned,
/// or the line is rejected as a whole.
pub fn decode_with(line: &[u8], options: &DecodeOptions) -> Result<SensorReading, DecodeError> {
    let text = std::str::from_utf8(line).map_err(|_| DecodeError::NotText)?;
    let text = text.trim_end_matches(['\r', '\n']);

    let tokens: Vec<&str> = text.split(' ').collect();
    if tokens.len() != FRAME_TOKENS {
        return Err(DecodeError::TokenCount(tokens.len()));
    }
    if tokens[0] != OK_TOKEN {
        return Err(DecodeError::NotOk(tokens[0].to_string()));
    }
    if tokens[1] != LACROSSE_FAMILY {
        return Err(DecodeError::UnsupportedFamily(tokens[1].to_string()));
    }

    let mut payload = [0u8; PAYLOAD_BYTES];
    for (index, token) in tokens[2..].iter().enumerate() {
        payload[index] = token.parse::<u8>().map_err(|_| DecodeError::InvalidByte {
            index,
            token: token.to_string(),
        })?;
    }

    decode_payload(&payload, options)
}

fn decode_payload(
    payload: &[u8; PAYLOAD_BYTES],
    options: &DecodeOptions,
) -> Result<SensorReading, DecodeError> {
    let sensor_type = payload[1] & SENSOR_TYPE_MASK;
    let Some(variant) = SensorVariant::from_sensor_type(sensor_type) else {
        debug!(
            "Foreign LaCrosse traffic: sensor ID {} type byte {}",
            payload[0], payload[1]
        );
        return Err(DecodeError::UnsupportedSensorType {
            device_id: payload[0],
            sensor_type,
            type_byte: payload[1],
        });
    };

    let temperature = decode_temperature(payload[2], payload[3]);

    let mut reading = SensorReading {
        device_id: payload[0],
        sensor_type,
        protocol_type: (payload[1] & PROTOCOL_TYPE_MASK) >> 4,
        temperature_primary: temperature,
        temperature_secondary: None,
        humidity: None,
        absolute_humidity: None,
        dew_point: None,
        new_battery: false,
        low_battery: false,
    };

    debug!(
        "Sensor ID {} type {} protocol {} temperature {}",
        reading.device_id, reading.sensor_type, reading.protocol_type, reading.temperature_primary
    );

    match variant {
        SensorVariant::Dth => {
            // Battery flags are only defined for sensor type 1
            reading.new_battery = payload[1] & NEW_BATTERY_MASK != 0;
            reading.low_battery = payload[4] & LOW_BATTERY_MASK != 0;

            let humidity = payload[4] & HUMIDITY_MASK;
            let vp = vapour_pressure(humidity, temperature);
            let abs_humidity = absolute_humidity(vp, temperature);

            reading.humidity = Some(humidity);
            reading.dew_point = dew_point(vp);
            reading.absolute_humidity = Some(if options.round_absolute_humidity {
                round(abs_humidity, 1)
            } else {
                abs_humidity
            });

            debug!(
                "Humidity {} abs {:?} dew point {:?} new battery {} low battery {}",
                humidity,
                reading.absolute_humidity,
                reading.dew_point,
                reading.new_battery,
                reading.low_battery
            );
        }
        SensorVariant::Dtt => {
            // Second channel shares the temperature bytes of the frame
            reading.temperature_secondary = Some(decode_temperature(payload[2], payload[3]));
        }
    }

    Ok(reading)
}

/// Fixed point temperature: (hi * 256 + lo - 1000) / 10
fn decode_temperature(hi: u8, lo: u8) -> f64 {
    let raw = f64::from(u16::from_be_bytes([hi, lo]));
    (raw - TEMPERATURE_OFFSET) / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceIdentity;

    #[test]
    fn decodes_humidity_sensor_frames() {
        let reading = decode(b"OK 9 56 1 4 156 37").unwrap();
        assert_eq!(reading.device_id, 56);
        assert_eq!(reading.sensor_type, 1);
        assert!(!reading.new_battery);
        assert!(!reading.low_battery);
        assert_eq!(reading.temperature_primary, 18.0);
        assert_eq!(reading.humidity, Some(37));
        assert_eq!(reading.dew_point, Some(3.1));
        assert_eq!(reading.absolute_humidity, Some(5.7));
        assert_eq!(reading.temperature_secondary, None);

        let reading = decode(b"OK 9 49 1 4 182 54").unwrap();
        assert_eq!(reading.device_id, 49);
        assert_eq!(reading.temperature_primary, 20.6);
        assert_eq!(reading.humidity, Some(54));
        assert!(!reading.low_battery);
        assert_eq!(reading.dew_point, Some(11.0));
        assert_eq!(reading.absolute_humidity, Some(9.7));
    }

    #[test]
    fn new_battery_flag_is_extracted() {
        let reading = decode(b"OK 9 55 129 4 192 56").unwrap();
        assert_eq!(reading.device_id, 55);
        assert_eq!(reading.sensor_type, 1);
        assert!(reading.new_battery);
        assert_eq!(reading.temperature_primary, 21.6);
        assert_eq!(reading.humidity, Some(56));
        assert_eq!(reading.dew_point, Some(12.5));
        assert_eq!(reading.absolute_humidity, Some(10.6));
    }

    #[test]
    fn low_battery_bit_is_not_part_of_humidity() {
        let reading = decode(b"OK 9 56 1 4 156 165").unwrap();
        assert!(reading.low_battery);
        assert_eq!(reading.humidity, Some(37));
    }

    #[test]
    fn dual_temperature_frame_has_no_humidity() {
        let reading = decode(b"OK 9 30 130 5 18 125").unwrap();
        assert_eq!(reading.sensor_type, 2);
        assert_eq!(reading.temperature_primary, 29.8);
        assert_eq!(reading.temperature_secondary, Some(29.8));
        assert_eq!(reading.humidity, None);
        assert_eq!(reading.dew_point, None);
        assert_eq!(reading.absolute_humidity, None);
        // Battery flags are undefined for type 2
        assert!(!reading.new_battery);
        assert!(!reading.low_battery);
        assert_eq!(
            reading.identity(),
            Some(DeviceIdentity::new(SensorVariant::Dtt, 30))
        );
    }

    #[test]
    fn protocol_type_field_is_diagnostic() {
        let reading = decode(b"OK 9 56 33 4 156 37").unwrap();
        assert_eq!(reading.protocol_type, 2);
        assert_eq!(reading.sensor_type, 1);
    }

    #[test]
    fn negative_temperatures() {
        let reading = decode(b"OK 9 12 1 3 212 50").unwrap();
        assert_eq!(reading.temperature_primary, -2.0);
    }

    #[test]
    fn absolute_humidity_can_stay_unrounded() {
        let options = DecodeOptions {
            round_absolute_humidity: false,
        };
        let reading = decode_with(b"OK 9 56 1 4 156 37", &options).unwrap();
        let abs = reading.absolute_humidity.unwrap();
        assert!((abs - 5.683188733559).abs() < 1e-6);
        assert_ne!(abs, 5.7);
    }

    #[test]
    fn strips_line_terminators() {
        assert!(decode(b"OK 9 56 1 4 156 37\r\n").is_ok());
    }

    #[test]
    fn rejects_wrong_token_count() {
        assert_eq!(decode(b"OK 9 56 1 4 156"), Err(DecodeError::TokenCount(6)));
        assert_eq!(
            decode(b"OK 9 56 1 4 156 37 1"),
            Err(DecodeError::TokenCount(8))
        );
        assert_eq!(decode(b""), Err(DecodeError::TokenCount(1)));
        // Tokens are separated by exactly one space
        assert_eq!(
            decode(b"OK 9  56 1 4 156"),
            Err(DecodeError::InvalidByte {
                index: 0,
                token: String::new()
            })
        );
    }

    #[test]
    fn rejects_foreign_lines() {
        assert_eq!(
            decode(b"ER 9 56 1 4 156 37"),
            Err(DecodeError::NotOk("ER".into()))
        );
        assert_eq!(
            decode(b"OK WS 56 1 4 156 37"),
            Err(DecodeError::UnsupportedFamily("WS".into()))
        );
        assert!(matches!(
            decode(b"[LaCrosseITPlusReader.10.1s (RFM69CW f:868300 r:17241)]"),
            Err(DecodeError::TokenCount(_))
        ));
    }

    #[test]
    fn rejects_unparsable_bytes() {
        assert_eq!(
            decode(b"OK 9 56 1 4 256 37"),
            Err(DecodeError::InvalidByte {
                index: 3,
                token: "256".into()
            })
        );
        assert!(matches!(
            decode(b"OK 9 56 1 -4 156 37"),
            Err(DecodeError::InvalidByte { index: 2, .. })
        ));
        assert_eq!(decode(&[0xff, 0xfe]), Err(DecodeError::NotText));
    }

    #[test]
    fn rejects_unknown_sensor_types() {
        assert_eq!(
            decode(b"OK 9 56 0 4 156 37"),
            Err(DecodeError::UnsupportedSensorType {
                device_id: 56,
                sensor_type: 0,
                type_byte: 0,
            })
        );

        let err = decode(b"OK 9 21 131 4 156 37").unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedSensorType {
                device_id: 21,
                sensor_type: 3,
                type_byte: 131,
            }
        );
        assert_eq!(
            err.to_string(),
            "unsupported sensor type 3 from sensor 21 (type byte 131)"
        );
    }
}
