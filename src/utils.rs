//! Utility functions for physical derivations and formatting
use std::f64::consts::LOG10_E;
use time::{format_description, OffsetDateTime};

// Magnus formula constants over water
const MAGNUS_A: f64 = 7.5;
const MAGNUS_B: f64 = 237.3;
const MAGNUS_VP0: f64 = 6.1078;

// Molar mass of water vapour (kg/kmol) and universal gas constant (J/(kmol*K))
const WATER_MOLAR_MASS: f64 = 18.016;
const GAS_CONSTANT: f64 = 8314.3;
const KELVIN_OFFSET: f64 = 273.15;

/// Temperature units used when rendering readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "C" | "c" => Some(TemperatureUnit::Celsius),
            "F" | "f" => Some(TemperatureUnit::Fahrenheit),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }

    /// Convert a Celsius value into this unit
    pub fn convert(self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

/// Half-up rounding at `digits` decimal places: trunc(x * 10^d + 0.5 * sign(x)) / 10^d
pub fn round(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let shifted = value * factor;
    let half = if shifted > 0.0 {
        0.5
    } else if shifted < 0.0 {
        -0.5
    } else {
        0.0
    };
    (shifted + half).trunc() / factor
}

/// Vapour pressure (hPa) from relative humidity and temperature (°C).
///
/// The base-10 Magnus exponent is divided by log10(e) to turn it into a
/// natural exponent for `exp`.
pub fn vapour_pressure(humidity: u8, temperature: f64) -> f64 {
    let rel = f64::from(humidity) / 100.0;
    rel * MAGNUS_VP0 * ((MAGNUS_A * temperature) / (MAGNUS_B + temperature) / LOG10_E).exp()
}

/// Dew point (°C) rounded to one decimal, `None` when the vapour pressure is zero
pub fn dew_point(vapour_pressure: f64) -> Option<f64> {
    let v = (vapour_pressure / MAGNUS_VP0).ln() * LOG10_E;
    let dew_point = (MAGNUS_B * v) / (MAGNUS_A - v);
    dew_point.is_finite().then(|| round(dew_point, 1))
}

/// Absolute humidity (g/m³), unrounded
pub fn absolute_humidity(vapour_pressure: f64, temperature: f64) -> f64 {
    1000.0 * WATER_MOLAR_MASS / GAS_CONSTANT * 100.0 * vapour_pressure
        / (KELVIN_OFFSET + temperature)
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}
