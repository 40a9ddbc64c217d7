/// Absolute zero offset between the Kelvin and Celsius scales.
const KELVIN_OFFSET: f64 = 273.15;

/// Convert a temperature in Kelvin to Fahrenheit.
pub fn fahrenheit(kelvin: f64) -> f64 {
    (kelvin - KELVIN_OFFSET) * (9.0 / 5.0) + 32.0
}
