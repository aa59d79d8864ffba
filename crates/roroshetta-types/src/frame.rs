//! Telemetry frame codec.
//!
//! The sensor notifies a fixed 60-byte frame on
//! [`TELEMETRY_CHARACTERISTIC`](crate::uuid::TELEMETRY_CHARACTERISTIC).
//! All integers are little-endian:
//!
//! | Offset | Width | Field | Conversion |
//! |--------|-------|-------|------------|
//! | 0  | 2 | temperature | `(raw + 10000) / 100 - 150` °C |
//! | 2  | 2 | heat index | `(raw + 10000) / 100 - 150` °C |
//! | 4  | 2 | humidity | `raw / 100` % |
//! | 10 | 2 | AQI | raw |
//! | 13 | 2 | PM2.5 | `raw / 1000` µg/m³ |
//! | 15 | 2 | CO2 | raw ppm |
//! | 17 | 2 | TVOC | raw ppb |
//! | 36 | 3 | uptime | raw seconds |
//! | 44 | 1 | alarm level | raw % |
//! | 45 | 1 | activity level | raw |
//! | 46 | 2 | power | raw W |
//! | 53 | 1 | light step | raw 0-30 |
//! | 56 | 1 | fan step | raw 0-30 |
//! | 59 | 1 | grease filter | raw % |
//!
//! Every other byte is reserved and ignored. Fields with a physical range
//! are clamped to it on decode.

use bytes::{Buf, BufMut};

use crate::error::{ParseError, ParseResult};
use crate::types::{CONTROL_STEPS, Reading};

/// Exact length of a telemetry frame.
pub const FRAME_LEN: usize = 60;

const TEMPERATURE: usize = 0;
const HEAT_INDEX: usize = 2;
const HUMIDITY: usize = 4;
const AQI: usize = 10;
const PM2_5: usize = 13;
const CO2: usize = 15;
const TVOC: usize = 17;
const UPTIME: usize = 36;
const ALARM_LEVEL: usize = 44;
const ACTIVITY_LEVEL: usize = 45;
const POWER: usize = 46;
const LIGHT_LEVEL: usize = 53;
const FAN_SPEED: usize = 56;
const GREASE_FILTER: usize = 59;

const TEMPERATURE_OFFSET: f32 = 10000.0;
const TEMPERATURE_BASE: f32 = 150.0;
const PERCENT_MAX: u8 = 100;

/// Decode a telemetry frame into a [`Reading`].
///
/// # Errors
///
/// Returns [`ParseError::FrameLength`] unless `data` is exactly
/// [`FRAME_LEN`] bytes. Nothing is parsed from a frame of the wrong length.
pub fn decode(data: &[u8]) -> ParseResult<Reading> {
    if data.len() != FRAME_LEN {
        return Err(ParseError::frame_length(FRAME_LEN, data.len()));
    }

    Ok(Reading {
        temperature: temperature_from_raw(u16_at(data, TEMPERATURE)),
        heat_index: temperature_from_raw(u16_at(data, HEAT_INDEX)),
        humidity: (f32::from(u16_at(data, HUMIDITY)) / 100.0).min(100.0),
        aqi: u16_at(data, AQI),
        pm2_5: f32::from(u16_at(data, PM2_5)) / 1000.0,
        co2: u16_at(data, CO2),
        tvoc: u16_at(data, TVOC),
        uptime: (&data[UPTIME..UPTIME + 3]).get_uint_le(3) as u32,
        alarm_level: data[ALARM_LEVEL].min(PERCENT_MAX),
        activity_level: data[ACTIVITY_LEVEL],
        power: u16_at(data, POWER),
        light_level: data[LIGHT_LEVEL].min(CONTROL_STEPS),
        fan_speed: data[FAN_SPEED].min(CONTROL_STEPS),
        grease_filter_status: data[GREASE_FILTER].min(PERCENT_MAX),
    })
}

/// Encode a [`Reading`] into a telemetry frame.
///
/// Inverse of [`decode`] within the precision of each field's scale.
/// Values outside what a field can carry saturate; reserved bytes are zero.
#[must_use]
pub fn encode(reading: &Reading) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];

    put_u16_at(&mut frame, TEMPERATURE, temperature_to_raw(reading.temperature));
    put_u16_at(&mut frame, HEAT_INDEX, temperature_to_raw(reading.heat_index));
    put_u16_at(&mut frame, HUMIDITY, scaled_to_raw(reading.humidity, 100.0));
    put_u16_at(&mut frame, AQI, reading.aqi);
    put_u16_at(&mut frame, PM2_5, scaled_to_raw(reading.pm2_5, 1000.0));
    put_u16_at(&mut frame, CO2, reading.co2);
    put_u16_at(&mut frame, TVOC, reading.tvoc);
    (&mut frame[UPTIME..UPTIME + 3]).put_uint_le(u64::from(reading.uptime.min(0xFF_FFFF)), 3);
    frame[ALARM_LEVEL] = reading.alarm_level;
    frame[ACTIVITY_LEVEL] = reading.activity_level;
    put_u16_at(&mut frame, POWER, reading.power);
    frame[LIGHT_LEVEL] = reading.light_level;
    frame[FAN_SPEED] = reading.fan_speed;
    frame[GREASE_FILTER] = reading.grease_filter_status;

    frame
}

/// Parse a frame written as hex, as captured from a debug dump.
///
/// Whitespace, `:` and `-` separators are ignored.
///
/// # Errors
///
/// Returns [`ParseError::InvalidValue`] for a non-hex digit or an odd
/// number of digits.
pub fn parse_hex(text: &str) -> ParseResult<Vec<u8>> {
    let digits: Vec<u8> = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .map(|c| {
            c.to_digit(16)
                .map(|d| d as u8)
                .ok_or_else(|| ParseError::InvalidValue(format!("'{c}' is not a hex digit")))
        })
        .collect::<ParseResult<_>>()?;

    if digits.len() % 2 != 0 {
        return Err(ParseError::InvalidValue(format!(
            "odd number of hex digits ({})",
            digits.len()
        )));
    }

    Ok(digits.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

fn u16_at(data: &[u8], offset: usize) -> u16 {
    (&data[offset..offset + 2]).get_u16_le()
}

fn put_u16_at(frame: &mut [u8], offset: usize, value: u16) {
    (&mut frame[offset..offset + 2]).put_u16_le(value);
}

fn temperature_from_raw(raw: u16) -> f32 {
    (f32::from(raw) + TEMPERATURE_OFFSET) / 100.0 - TEMPERATURE_BASE
}

fn temperature_to_raw(celsius: f32) -> u16 {
    saturate_u16((celsius + TEMPERATURE_BASE) * 100.0 - TEMPERATURE_OFFSET)
}

fn scaled_to_raw(value: f32, scale: f32) -> u16 {
    saturate_u16(value * scale)
}

fn saturate_u16(value: f32) -> u16 {
    // `as` saturates and maps NaN to 0.
    value.round() as u16
}
