//! Declarative conversion formulas
//!
//! Each converter in `converters.yaml` names one formula by `kind`. All
//! arithmetic goes through `station_calc` in `Decimal`.

use std::str::FromStr;

use common::serde_helpers::{decimal_one, deserialize_decimal_flexible};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use station_calc::{
    adc_volts, affine, celsius_to_fahrenheit, combine_bytes, divider_resistance,
    kelvin_to_fahrenheit, rtd_celsius, steinhart_hart_kelvin, wind_chill_nws, wind_chill_siple,
    CalcError, SteinhartHart,
};
use thiserror::Error;

use super::value::Value;

/// Formula failures; each one is a process error for the converter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("cannot parse '{0}' as a number")]
    Parse(String),

    #[error("'{0}' is not an integer code")]
    NotInteger(String),

    #[error("no entry for code {0}")]
    UnknownCode(i64),

    #[error("'{0}' is not numeric")]
    NotNumeric(String),

    #[error("expected {expected} raw inputs, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error(transparent)]
    Calc(#[from] CalcError),
}

/// Linear segment of a piecewise curve, applied for `previous < v <= upto`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Segment {
    #[serde(deserialize_with = "deserialize_decimal_flexible")]
    pub upto: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_flexible")]
    pub slope: Decimal,
    #[serde(default, deserialize_with = "deserialize_decimal_flexible")]
    pub intercept: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Coefficients {
    #[serde(deserialize_with = "deserialize_decimal_flexible")]
    pub a: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_flexible")]
    pub b: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_flexible")]
    pub c: Decimal,
}

impl From<&Coefficients> for SteinhartHart {
    fn from(c: &Coefficients) -> Self {
        SteinhartHart {
            a: c.a,
            b: c.b,
            c: c.c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BitLabel {
    pub bit: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateLabel {
    pub code: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LookupEntry {
    pub code: i64,
    #[serde(deserialize_with = "deserialize_decimal_flexible")]
    pub value: Decimal,
}

/// Selector code to the converted label it picks
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RangeChoice {
    pub code: i64,
    pub label: String,
}

/// Token encoding of composite byte parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteEncoding {
    #[default]
    Decimal,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum WindChillModel {
    #[serde(rename = "nws2001")]
    Nws2001,
    #[serde(rename = "siple1945")]
    Siple1945,
}

/// Conversion formula
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formula {
    /// Whole number
    Integer,
    /// Decimal as received
    Decimal,
    /// String passthrough
    Text,
    /// `raw * multiply / divide + offset`
    Affine {
        #[serde(default = "decimal_one", deserialize_with = "deserialize_decimal_flexible")]
        multiply: Decimal,
        #[serde(default = "decimal_one", deserialize_with = "deserialize_decimal_flexible")]
        divide: Decimal,
        #[serde(default, deserialize_with = "deserialize_decimal_flexible")]
        offset: Decimal,
    },
    /// Calibration curve over `raw / divide`; the raw value outside all segments
    Piecewise {
        #[serde(default = "decimal_one", deserialize_with = "deserialize_decimal_flexible")]
        divide: Decimal,
        segments: Vec<Segment>,
    },
    /// NTC thermistor in a divider, result in °F
    Thermistor {
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        full_scale: Decimal,
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        vref: Decimal,
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        fixed_ohms: Decimal,
        #[serde(default)]
        coefficients: Option<Coefficients>,
    },
    /// Platinum RTD in a divider, result in °F
    RtdDivider {
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        full_scale: Decimal,
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        vref: Decimal,
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        fixed_ohms: Decimal,
        #[serde(default = "decimal_one", deserialize_with = "deserialize_decimal_flexible")]
        gain: Decimal,
    },
    /// Platinum RTD on a constant-current source, result in °F
    RtdCurrent {
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        full_scale: Decimal,
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        vref: Decimal,
        #[serde(deserialize_with = "deserialize_decimal_flexible")]
        current_amps: Decimal,
        #[serde(default = "decimal_one", deserialize_with = "deserialize_decimal_flexible")]
        gain: Decimal,
    },
    /// Status byte, set bits described, `OK` when clear
    Bitmask { bits: Vec<BitLabel> },
    /// Code to fixed text
    Enumerated { states: Vec<StateLabel> },
    /// Code to decimal
    Lookup { table: Vec<LookupEntry> },
    /// Big-endian bytes from several raw fields, then `then`
    Composite {
        parts: Vec<String>,
        #[serde(default)]
        encoding: ByteEncoding,
        then: Box<Formula>,
    },
    /// Raw selector code picks one converted label
    RangeSelect { choices: Vec<RangeChoice> },
    /// Derived from converted wind speed (mph) and temperature (°F)
    WindChill {
        wind: String,
        temperature: String,
        model: WindChillModel,
    },
}

impl Formula {
    /// Raw fields read for a converter whose raw field is `raw`
    pub fn raw_fields<'a>(&'a self, raw: &'a str) -> Vec<&'a str> {
        match self {
            Formula::Composite { parts, .. } => parts.iter().map(String::as_str).collect(),
            Formula::WindChill { .. } => Vec::new(),
            _ => vec![raw],
        }
    }

    /// Converted labels this formula reads
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Formula::RangeSelect { choices } => {
                choices.iter().map(|c| c.label.as_str()).collect()
            },
            Formula::WindChill {
                wind, temperature, ..
            } => vec![wind.as_str(), temperature.as_str()],
            _ => Vec::new(),
        }
    }

    /// Computed without any raw field
    pub fn is_derived(&self) -> bool {
        matches!(self, Formula::WindChill { .. })
    }

    pub fn is_status(&self) -> bool {
        matches!(self, Formula::Bitmask { .. })
    }

    /// Formulas that consume exactly one raw token
    pub fn is_single_input(&self) -> bool {
        !matches!(
            self,
            Formula::Composite { .. } | Formula::RangeSelect { .. } | Formula::WindChill { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Formula::Integer => "integer",
            Formula::Decimal => "decimal",
            Formula::Text => "text",
            Formula::Affine { .. } => "affine",
            Formula::Piecewise { .. } => "piecewise",
            Formula::Thermistor { .. } => "thermistor",
            Formula::RtdDivider { .. } => "rtd_divider",
            Formula::RtdCurrent { .. } => "rtd_current",
            Formula::Bitmask { .. } => "bitmask",
            Formula::Enumerated { .. } => "enumerated",
            Formula::Lookup { .. } => "lookup",
            Formula::Composite { .. } => "composite",
            Formula::RangeSelect { .. } => "range_select",
            Formula::WindChill { .. } => "wind_chill",
        }
    }

    /// Apply the formula
    ///
    /// `raw` holds the tokens for [`Formula::raw_fields`], `converted` resolves
    /// dependency labels. An `Error` dependency propagates as `Ok(Value::Error)`.
    pub fn evaluate(
        &self,
        raw: &[&str],
        converted: &dyn Fn(&str) -> Option<Value>,
    ) -> Result<Value, FormulaError> {
        match self {
            Formula::Composite {
                parts,
                encoding,
                then,
            } => {
                expect_arity(raw, parts.len())?;
                let bytes = raw
                    .iter()
                    .map(|token| parse_byte(token, *encoding))
                    .collect::<Result<Vec<_>, _>>()?;
                let combined = combine_bytes(&bytes)?.to_string();
                then.evaluate(&[combined.as_str()], converted)
            },
            Formula::RangeSelect { choices } => {
                expect_arity(raw, 1)?;
                let code = parse_code(raw[0])?;
                let choice = choices
                    .iter()
                    .find(|c| c.code == code)
                    .ok_or(FormulaError::UnknownCode(code))?;
                Ok(converted(choice.label.as_str()).unwrap_or(Value::Error))
            },
            Formula::WindChill {
                wind,
                temperature,
                model,
            } => {
                let (Some(wind), Some(temperature)) =
                    (converted(wind.as_str()), converted(temperature.as_str()))
                else {
                    return Ok(Value::Error);
                };
                if wind.is_error() || temperature.is_error() {
                    return Ok(Value::Error);
                }
                let wind = numeric(&wind)?;
                let temperature = numeric(&temperature)?;
                let chill = match model {
                    WindChillModel::Nws2001 => wind_chill_nws(temperature, wind)?,
                    WindChillModel::Siple1945 => wind_chill_siple(temperature, wind)?,
                };
                Ok(Value::Number(chill))
            },
            single => {
                expect_arity(raw, 1)?;
                single.evaluate_token(raw[0])
            },
        }
    }

    fn evaluate_token(&self, token: &str) -> Result<Value, FormulaError> {
        let token = token.trim();
        let value = match self {
            Formula::Integer => {
                let n = token
                    .parse::<i64>()
                    .map_err(|_| FormulaError::NotInteger(token.to_string()))?;
                Value::Number(Decimal::from(n))
            },
            Formula::Decimal => Value::Number(parse_decimal(token)?),
            Formula::Text => Value::Text(token.to_string()),
            Formula::Affine {
                multiply,
                divide,
                offset,
            } => Value::Number(affine(parse_decimal(token)?, *multiply, *divide, *offset)?),
            Formula::Piecewise { divide, segments } => {
                let raw = parse_decimal(token)?;
                let v = raw
                    .checked_div(*divide)
                    .ok_or_else(|| CalcError::division_by_zero("piecewise divide"))?;
                let mut previous = Decimal::ZERO;
                let mut result = raw;
                for segment in segments {
                    if v > previous && v <= segment.upto {
                        result = segment
                            .slope
                            .checked_mul(v)
                            .and_then(|scaled| scaled.checked_add(segment.intercept))
                            .ok_or_else(|| CalcError::overflow("piecewise segment"))?;
                        break;
                    }
                    previous = segment.upto;
                }
                Value::Number(result)
            },
            Formula::Thermistor {
                full_scale,
                vref,
                fixed_ohms,
                coefficients,
            } => {
                let volts = adc_volts(parse_decimal(token)?, *full_scale, *vref)?;
                let ohms = divider_resistance(volts, *vref, *fixed_ohms)?;
                let curve = coefficients
                    .as_ref()
                    .map(SteinhartHart::from)
                    .unwrap_or_default();
                Value::Number(kelvin_to_fahrenheit(steinhart_hart_kelvin(ohms, &curve)?)?)
            },
            Formula::RtdDivider {
                full_scale,
                vref,
                fixed_ohms,
                gain,
            } => {
                let volts = divide(adc_volts(parse_decimal(token)?, *full_scale, *vref)?, *gain)?;
                let ohms = divider_resistance(volts, *vref, *fixed_ohms)?;
                Value::Number(celsius_to_fahrenheit(rtd_celsius(ohms)?)?)
            },
            Formula::RtdCurrent {
                full_scale,
                vref,
                current_amps,
                gain,
            } => {
                let volts = adc_volts(parse_decimal(token)?, *full_scale, *vref)?;
                let ohms = divide(divide(volts, *current_amps)?, *gain)?;
                Value::Number(celsius_to_fahrenheit(rtd_celsius(ohms)?)?)
            },
            Formula::Bitmask { bits } => Value::Text(describe_bits(parse_code(token)?, bits)),
            Formula::Enumerated { states } => {
                let code = parse_code(token)?;
                let state = states
                    .iter()
                    .find(|s| s.code == code)
                    .ok_or(FormulaError::UnknownCode(code))?;
                Value::Text(state.text.clone())
            },
            Formula::Lookup { table } => {
                let code = parse_code(token)?;
                let entry = table
                    .iter()
                    .find(|e| e.code == code)
                    .ok_or(FormulaError::UnknownCode(code))?;
                Value::Number(entry.value)
            },
            Formula::Composite { .. } | Formula::RangeSelect { .. } | Formula::WindChill { .. } => {
                return Err(FormulaError::Arity {
                    expected: 0,
                    actual: 1,
                })
            },
        };
        Ok(value)
    }
}

fn expect_arity(raw: &[&str], expected: usize) -> Result<(), FormulaError> {
    if raw.len() == expected {
        Ok(())
    } else {
        Err(FormulaError::Arity {
            expected,
            actual: raw.len(),
        })
    }
}

fn divide(numerator: Decimal, denominator: Decimal) -> Result<Decimal, FormulaError> {
    if denominator.is_zero() {
        return Err(CalcError::division_by_zero("formula divisor").into());
    }
    numerator
        .checked_div(denominator)
        .ok_or_else(|| CalcError::overflow("formula division").into())
}

fn numeric(value: &Value) -> Result<Decimal, FormulaError> {
    value
        .as_number()
        .ok_or_else(|| FormulaError::NotNumeric(value.to_string()))
}

/// Parse a decimal token, accepting scientific notation
pub fn parse_decimal(token: &str) -> Result<Decimal, FormulaError> {
    let token = token.trim();
    Decimal::from_str(token)
        .or_else(|_| Decimal::from_scientific(token))
        .map_err(|_| FormulaError::Parse(token.to_string()))
}

/// Parse an integral code such as `2` or `2.0`
pub fn parse_code(token: &str) -> Result<i64, FormulaError> {
    let value = parse_decimal(token)?;
    if !value.fract().is_zero() {
        return Err(FormulaError::NotInteger(token.trim().to_string()));
    }
    value
        .to_i64()
        .ok_or_else(|| FormulaError::NotInteger(token.trim().to_string()))
}

fn parse_byte(token: &str, encoding: ByteEncoding) -> Result<u32, FormulaError> {
    let token = token.trim();
    let parsed = match encoding {
        ByteEncoding::Decimal => token.parse::<u32>().ok(),
        ByteEncoding::Hex => {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u32::from_str_radix(digits, 16).ok()
        },
    };
    parsed.ok_or_else(|| FormulaError::Parse(token.to_string()))
}

fn describe_bits(code: i64, labels: &[BitLabel]) -> String {
    if code < 0 {
        return format!("invalid status {code}");
    }
    let mut described: Vec<String> = Vec::new();
    for bit in 0..63u8 {
        if code & (1i64 << bit) == 0 {
            continue;
        }
        match labels.iter().find(|label| label.bit == bit) {
            Some(label) => described.push(label.text.clone()),
            None => described.push(format!("bit {bit}")),
        }
    }
    if described.is_empty() {
        "OK".to_string()
    } else {
        described.join(", ")
    }
}
