//! Core types for Roroshetta Sense telemetry.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of discrete steps for the hood light and fan controls.
pub const CONTROL_STEPS: u8 = 30;

/// One decoded telemetry frame from a Roroshetta Sense.
///
/// Readings are immutable values; a new frame produces a new `Reading`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Heat index in degrees Celsius.
    pub heat_index: f32,
    /// Relative humidity in percent (0-100).
    pub humidity: f32,
    /// CO2 concentration in ppm.
    pub co2: u16,
    /// Total volatile organic compounds in ppb.
    pub tvoc: u16,
    /// PM2.5 concentration in µg/m³.
    pub pm2_5: f32,
    /// Air quality index.
    pub aqi: u16,
    /// Power draw in watts.
    pub power: u16,
    /// Seconds since the sensor booted (24-bit counter).
    pub uptime: u32,
    /// Hood light step (0-30).
    pub light_level: u8,
    /// Hood fan step (0-30).
    pub fan_speed: u8,
    /// Grease filter condition in percent (0-100).
    pub grease_filter_status: u8,
    /// Cooking activity level reported by the sensor.
    pub activity_level: u8,
    /// Alarm level in percent (0-100).
    pub alarm_level: u8,
}

impl Reading {
    /// Light step as a fraction of full brightness (0.0-1.0).
    #[must_use]
    pub fn light_fraction(&self) -> f32 {
        f32::from(self.light_level) / f32::from(CONTROL_STEPS)
    }

    /// Fan step as a fraction of full speed (0.0-1.0).
    #[must_use]
    pub fn fan_fraction(&self) -> f32 {
        f32::from(self.fan_speed) / f32::from(CONTROL_STEPS)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}°C {:.1}% CO2 {} ppm TVOC {} ppb PM2.5 {:.1} µg/m³ AQI {} light {}/{} fan {}/{} filter {}%",
            self.temperature,
            self.humidity,
            self.co2,
            self.tvoc,
            self.pm2_5,
            self.aqi,
            self.light_level,
            CONTROL_STEPS,
            self.fan_speed,
            CONTROL_STEPS,
            self.grease_filter_status,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_fractions() {
        let reading = Reading {
            light_level: 15,
            fan_speed: 30,
            ..Default::default()
        };
        assert!((reading.light_fraction() - 0.5).abs() < f32::EPSILON);
        assert!((reading.fan_fraction() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_display_contains_key_values() {
        let reading = Reading {
            temperature: 21.5,
            humidity: 45.0,
            co2: 612,
            ..Default::default()
        };
        let text = reading.to_string();
        assert!(text.starts_with("21.5°C 45.0%"));
        assert!(text.contains("CO2 612 ppm"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_reading_serializes_field_names() {
        let reading = Reading {
            pm2_5: 3.25,
            ..Default::default()
        };
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["pm2_5"], 3.25);
        assert_eq!(json["grease_filter_status"], 0);
    }
}
