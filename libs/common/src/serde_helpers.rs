//! Shared Serde deserializers
//!
//! Configuration files are hand edited, so numeric fields accept several
//! spellings:
//! - Native number `5` or `0.72`
//! - String number `"0.72"` (preferred for decimals, nothing goes through `f64`)
//! - `""` or `null` → `None` for optional fields

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

// ============================================================================
// Default Value Functions (for serde #[serde(default = "...")] attributes)
// ============================================================================

/// Default value: true
pub fn bool_true() -> bool {
    true
}

/// Default value: false
pub fn bool_false() -> bool {
    false
}

/// Default multiplier or divisor: 1
pub fn decimal_one() -> Decimal {
    Decimal::ONE
}

// ============================================================================
// Custom Deserializers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Int(i64),
    Float(f64),
    String(String),
}

fn decimal_from_repr<E: serde::de::Error>(repr: DecimalRepr) -> Result<Option<Decimal>, E> {
    match repr {
        DecimalRepr::Int(i) => Ok(Some(Decimal::from(i))),
        // Go through the shortest display form so 0.1 stays 0.1
        DecimalRepr::Float(f) => Decimal::from_str(&f.to_string())
            .map(Some)
            .map_err(|e| E::custom(format!("invalid decimal {}: {}", f, e))),
        DecimalRepr::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            Decimal::from_str(t)
                .or_else(|_| Decimal::from_scientific(t))
                .map(Some)
                .map_err(|e| E::custom(format!("invalid decimal '{}': {}", s, e)))
        },
    }
}

/// Deserialize a required decimal from a number or a numeric string
pub fn deserialize_decimal_flexible<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    decimal_from_repr::<D::Error>(DecimalRepr::deserialize(deserializer)?)?
        .ok_or_else(|| D::Error::custom("empty string where a decimal is required"))
}

/// Deserialize an optional decimal
///
/// # Example
/// ```ignore
/// #[derive(Deserialize)]
/// struct Threshold {
///     #[serde(default, deserialize_with = "deserialize_optional_decimal")]
///     below: Option<Decimal>,
/// }
/// ```
pub fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<DecimalRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(repr) => decimal_from_repr::<D::Error>(repr),
    }
}

/// Custom deserializer for boolean fields that supports multiple input formats
///
/// - boolean: true, false
/// - integer: 0 (false), 1 (true)
/// - string: "1"/"0", "true"/"false", "yes"/"no" (case-insensitive)
pub fn deserialize_bool_flexible<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrStringOrInt {
        Bool(bool),
        Int(i64),
        String(String),
    }

    match BoolOrStringOrInt::deserialize(deserializer)? {
        BoolOrStringOrInt::Bool(b) => Ok(b),
        BoolOrStringOrInt::Int(0) => Ok(false),
        BoolOrStringOrInt::Int(1) => Ok(true),
        BoolOrStringOrInt::Int(i) => Err(D::Error::custom(format!(
            "Invalid integer value {}, expected 0 or 1",
            i
        ))),
        BoolOrStringOrInt::String(s) => {
            let t = s.trim();
            if t == "1" || t.eq_ignore_ascii_case("true") || t.eq_ignore_ascii_case("yes") {
                Ok(true)
            } else if t.is_empty()
                || t == "0"
                || t.eq_ignore_ascii_case("false")
                || t.eq_ignore_ascii_case("no")
            {
                Ok(false)
            } else {
                Err(D::Error::custom(format!(
                    "Invalid boolean value '{}', expected: 1/0, true/false, yes/no, or boolean",
                    s
                )))
            }
        },
    }
}
