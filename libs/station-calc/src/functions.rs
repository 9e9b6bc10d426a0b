//! Decimal formula primitives
//!
//! Every function works on [`Decimal`] so chained conversions (ADC scaling,
//! divider resistance, polynomial or logarithmic temperature curves) never
//! accumulate binary floating point error.

use rust_decimal::prelude::*;
use rust_decimal::MathematicalOps;
use tracing::trace;

use crate::error::{CalcError, Result};

/// Steinhart-Hart coefficients for an NTC thermistor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SteinhartHart {
    pub a: Decimal,
    pub b: Decimal,
    pub c: Decimal,
}

impl Default for SteinhartHart {
    /// Coefficients for the 10k thermistors fitted to the station's shields
    fn default() -> Self {
        Self {
            a: Decimal::new(1_125_308_852_122, 15),
            b: Decimal::new(234_711_863_267, 15),
            c: Decimal::new(85_663_516, 15),
        }
    }
}

fn checked_div(numerator: Decimal, denominator: Decimal, context: &str) -> Result<Decimal> {
    if denominator.is_zero() {
        return Err(CalcError::division_by_zero(context));
    }
    numerator
        .checked_div(denominator)
        .ok_or_else(|| CalcError::overflow(context))
}

fn checked_mul(lhs: Decimal, rhs: Decimal, context: &str) -> Result<Decimal> {
    lhs.checked_mul(rhs)
        .ok_or_else(|| CalcError::overflow(context))
}

fn checked_add(lhs: Decimal, rhs: Decimal, context: &str) -> Result<Decimal> {
    lhs.checked_add(rhs)
        .ok_or_else(|| CalcError::overflow(context))
}

fn checked_sub(lhs: Decimal, rhs: Decimal, context: &str) -> Result<Decimal> {
    lhs.checked_sub(rhs)
        .ok_or_else(|| CalcError::overflow(context))
}

/// Sum of terms, failing on the first overflow
fn checked_sum(terms: &[Decimal], context: &str) -> Result<Decimal> {
    terms
        .iter()
        .try_fold(Decimal::ZERO, |acc, term| checked_add(acc, *term, context))
}

/// `value * multiply / divide + offset`
pub fn affine(value: Decimal, multiply: Decimal, divide: Decimal, offset: Decimal) -> Result<Decimal> {
    let scaled = checked_div(checked_mul(value, multiply, "affine")?, divide, "affine")?;
    checked_add(scaled, offset, "affine")
}

/// Convert ADC counts into volts: `counts / full_scale * vref`
pub fn adc_volts(counts: Decimal, full_scale: Decimal, vref: Decimal) -> Result<Decimal> {
    checked_mul(checked_div(counts, full_scale, "adc full scale")?, vref, "adc volts")
}

/// Resistance of the sensing leg of a divider: `fixed * v / (vref - v)`
pub fn divider_resistance(volts: Decimal, vref: Decimal, fixed_ohms: Decimal) -> Result<Decimal> {
    let headroom = checked_sub(vref, volts, "divider headroom")?;
    checked_div(checked_mul(fixed_ohms, volts, "divider")?, headroom, "divider headroom")
}

/// Platinum RTD curve, resistance in ohms to degrees Celsius
///
/// `t = -247.29 + 2.3992 r + 0.00063962 r^2 + 1.0241e-6 r^3`
pub fn rtd_celsius(ohms: Decimal) -> Result<Decimal> {
    let c0 = Decimal::new(-24_729, 2);
    let c1 = Decimal::new(23_992, 4);
    let c2 = Decimal::new(63_962, 8);
    let c3 = Decimal::new(10_241, 10);

    let r2 = checked_mul(ohms, ohms, "rtd r^2")?;
    let r3 = checked_mul(r2, ohms, "rtd r^3")?;
    let t = checked_sum(
        &[
            c0,
            checked_mul(c1, ohms, "rtd")?,
            checked_mul(c2, r2, "rtd")?,
            checked_mul(c3, r3, "rtd")?,
        ],
        "rtd",
    )?;
    trace!(%ohms, celsius = %t, "rtd");
    Ok(t)
}

/// Steinhart-Hart equation, resistance in ohms to kelvin
pub fn steinhart_hart_kelvin(ohms: Decimal, coefficients: &SteinhartHart) -> Result<Decimal> {
    if ohms <= Decimal::ZERO {
        return Err(CalcError::domain(format!(
            "thermistor resistance must be positive, got {}",
            ohms
        )));
    }
    let ln_r = ohms
        .checked_ln()
        .ok_or_else(|| CalcError::domain(format!("ln({})", ohms)))?;
    let ln_r3 = checked_mul(checked_mul(ln_r, ln_r, "ln^2")?, ln_r, "ln^3")?;
    let denominator = checked_sum(
        &[
            coefficients.a,
            checked_mul(coefficients.b, ln_r, "steinhart-hart")?,
            checked_mul(coefficients.c, ln_r3, "steinhart-hart")?,
        ],
        "steinhart-hart",
    )?;
    checked_div(Decimal::ONE, denominator, "steinhart-hart")
}

/// Degrees Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(celsius: Decimal) -> Result<Decimal> {
    let scaled = checked_mul(celsius, Decimal::new(18, 1), "celsius to fahrenheit")?;
    checked_add(scaled, Decimal::from(32), "celsius to fahrenheit")
}

/// Kelvin to degrees Fahrenheit
pub fn kelvin_to_fahrenheit(kelvin: Decimal) -> Result<Decimal> {
    let scaled = checked_mul(kelvin, Decimal::new(18, 1), "kelvin to fahrenheit")?;
    checked_sub(scaled, Decimal::new(45_967, 2), "kelvin to fahrenheit")
}

/// Combine big-endian byte values into one integer
///
/// Each part must be a single byte. The device splits 24-bit converter
/// readings into three fields.
pub fn combine_bytes(parts: &[u32]) -> Result<Decimal> {
    if parts.is_empty() || parts.len() > 8 {
        return Err(CalcError::invalid_input(format!(
            "expected 1..=8 byte parts, got {}",
            parts.len()
        )));
    }
    let mut combined: u64 = 0;
    for part in parts {
        if *part > 0xFF {
            return Err(CalcError::invalid_input(format!(
                "byte part {} exceeds 0xFF",
                part
            )));
        }
        combined = (combined << 8) | u64::from(*part);
    }
    Ok(Decimal::from(combined))
}

/// Wind chill in degrees Fahrenheit, NWS 2001 model
///
/// Calm air has no wind chill, the air temperature is returned unchanged.
pub fn wind_chill_nws(temperature_f: Decimal, wind_mph: Decimal) -> Result<Decimal> {
    if wind_mph < Decimal::ZERO {
        return Err(CalcError::domain(format!("negative wind speed {}", wind_mph)));
    }
    if wind_mph.is_zero() {
        return Ok(temperature_f);
    }
    let v016 = wind_mph
        .checked_powd(Decimal::new(16, 2))
        .ok_or_else(|| CalcError::overflow("wind^0.16"))?;
    let t_v016 = checked_mul(temperature_f, v016, "wind chill")?;
    checked_sum(
        &[
            Decimal::new(3574, 2),
            checked_mul(Decimal::new(6215, 4), temperature_f, "wind chill")?,
            -checked_mul(Decimal::new(3575, 2), v016, "wind chill")?,
            checked_mul(Decimal::new(4275, 4), t_v016, "wind chill")?,
        ],
        "wind chill",
    )
}

/// Wind chill in degrees Fahrenheit, Siple-Passel 1945 model
pub fn wind_chill_siple(temperature_f: Decimal, wind_mph: Decimal) -> Result<Decimal> {
    let root = wind_mph
        .sqrt()
        .ok_or_else(|| CalcError::domain(format!("sqrt({})", wind_mph)))?;
    let base = Decimal::new(914, 1);
    let factor = checked_sum(
        &[
            Decimal::new(474_677, 6),
            -checked_mul(Decimal::new(20_425, 6), wind_mph, "wind chill")?,
            checked_mul(Decimal::new(303_107, 6), root, "wind chill")?,
        ],
        "wind chill",
    )?;
    let spread = checked_sub(base, temperature_f, "wind chill")?;
    checked_sub(base, checked_mul(factor, spread, "wind chill")?, "wind chill")
}

/// Round to `digits` decimal places, ties to even
pub fn round_half_even(value: Decimal, digits: u32) -> Decimal {
    value.round_dp_with_strategy(digits, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_affine() {
        // geiger high voltage: raw / 1024 * 5 * 250
        assert_eq!(affine(dec!(700), dec!(1250), dec!(1024), dec!(0)).unwrap().round_dp(1), dec!(854.5));
        // geiger temperature: raw * 0.72 - 459.688
        assert_eq!(affine(dec!(1000), dec!(0.72), dec!(1), dec!(-459.688)).unwrap(), dec!(260.312));
        assert!(matches!(
            affine(dec!(1), dec!(1), dec!(0), dec!(0)),
            Err(CalcError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_adc_and_divider() {
        let volts = adc_volts(dec!(65536), dec!(131072), dec!(4.096)).unwrap();
        assert_eq!(volts, dec!(2.048));
        assert_eq!(divider_resistance(volts, dec!(4.096), dec!(20000)).unwrap(), dec!(20000));
        assert!(divider_resistance(dec!(4.096), dec!(4.096), dec!(20000)).is_err());
    }

    #[test]
    fn test_rtd_curve() {
        assert_eq!(rtd_celsius(dec!(100)).unwrap(), dec!(0.0503));
    }

    #[test]
    fn test_steinhart_hart_room_temperature() {
        let kelvin = steinhart_hart_kelvin(dec!(10000), &SteinhartHart::default()).unwrap();
        assert!(kelvin > dec!(298.0) && kelvin < dec!(298.3), "got {}", kelvin);
        assert!(steinhart_hart_kelvin(dec!(0), &SteinhartHart::default()).is_err());
        assert!(steinhart_hart_kelvin(dec!(-5), &SteinhartHart::default()).is_err());
    }

    #[test]
    fn test_temperature_scales() {
        assert_eq!(celsius_to_fahrenheit(dec!(100)).unwrap(), dec!(212));
        assert_eq!(celsius_to_fahrenheit(dec!(-40)).unwrap(), dec!(-40));
        assert_eq!(kelvin_to_fahrenheit(dec!(273.15)).unwrap(), dec!(32));
        assert!(matches!(
            celsius_to_fahrenheit(Decimal::MAX),
            Err(CalcError::Overflow(_))
        ));
        assert!(matches!(
            kelvin_to_fahrenheit(Decimal::MIN),
            Err(CalcError::Overflow(_))
        ));
    }

    #[test]
    fn test_combine_bytes() {
        assert_eq!(combine_bytes(&[1, 2, 3]).unwrap(), dec!(66051));
        assert_eq!(combine_bytes(&[0x80, 0, 0]).unwrap(), dec!(8388608));
        assert!(combine_bytes(&[256, 0, 0]).is_err());
        assert!(combine_bytes(&[]).is_err());
    }

    #[test]
    fn test_wind_chill() {
        let nws = wind_chill_nws(dec!(0), dec!(15)).unwrap();
        assert_eq!(nws.round_dp(0), dec!(-19));
        assert_eq!(wind_chill_nws(dec!(20), dec!(0)).unwrap(), dec!(20));
        assert!(wind_chill_nws(dec!(20), dec!(-1)).is_err());

        let siple = wind_chill_siple(dec!(30), dec!(16)).unwrap();
        assert_eq!(siple.round_dp(4), dec!(7.8773));
    }

    #[test]
    fn test_wind_chill_overflow_is_an_error() {
        // Garbled frames pushed through the vortex and precon affine scaling
        let wind = affine(dec!(3e27), dec!(25), dec!(600), dec!(0)).unwrap();
        let temperature = affine(dec!(2e28), dec!(3.3444748), dec!(2801.00864), dec!(-17.996)).unwrap();

        assert!(matches!(
            wind_chill_nws(temperature, wind),
            Err(CalcError::Overflow(_))
        ));
        assert!(matches!(
            wind_chill_siple(temperature, wind),
            Err(CalcError::Overflow(_))
        ));
        assert!(rtd_celsius(dec!(1e20)).is_err());
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(dec!(2.345), 2), dec!(2.34));
        assert_eq!(round_half_even(dec!(2.355), 2), dec!(2.36));
        assert_eq!(round_half_even(dec!(854.4921875), 1), dec!(854.5));
    }
}
