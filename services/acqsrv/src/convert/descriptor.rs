//! Converter descriptors as read from the converter catalogue

use std::fmt;
use std::str::FromStr;

use common::serde_helpers::{
    bool_false, bool_true, deserialize_bool_flexible, deserialize_optional_decimal,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use super::formula::Formula;

/// One side of a range bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Value(Decimal),
    /// Placeholder awaiting calibration; range check skipped until resolved
    Undetermined,
}

/// Rounding applied to numeric results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Digits(u32),
    /// Symbolic outputs
    NotApplicable,
    /// Placeholder awaiting calibration; the value is not rounded
    Undetermined,
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Digits(4)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Digits(d) => write!(f, "{d} digits"),
            Precision::NotApplicable => write!(f, "n/a"),
            Precision::Undetermined => write!(f, "undetermined"),
        }
    }
}

fn is_undetermined(text: &str) -> bool {
    text.eq_ignore_ascii_case("undetermined") || text.eq_ignore_ascii_case("fix")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarRepr {
    Int(i64),
    Float(f64),
    String(String),
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        match ScalarRepr::deserialize(deserializer)? {
            ScalarRepr::Int(i) => Ok(Limit::Value(Decimal::from(i))),
            ScalarRepr::Float(f) => Decimal::from_str(&f.to_string())
                .map(Limit::Value)
                .map_err(|e| D::Error::custom(format!("invalid bound {f}: {e}"))),
            ScalarRepr::String(s) => {
                let t = s.trim();
                if is_undetermined(t) {
                    return Ok(Limit::Undetermined);
                }
                Decimal::from_str(t)
                    .or_else(|_| Decimal::from_scientific(t))
                    .map(Limit::Value)
                    .map_err(|e| D::Error::custom(format!("invalid bound '{s}': {e}")))
            },
        }
    }
}

impl<'de> Deserialize<'de> for Precision {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let digits = |n: i64| {
            u32::try_from(n)
                .ok()
                .filter(|d| *d <= 28)
                .map(Precision::Digits)
                .ok_or_else(|| D::Error::custom(format!("precision {n} out of range 0..=28")))
        };

        match ScalarRepr::deserialize(deserializer)? {
            ScalarRepr::Int(i) => digits(i),
            ScalarRepr::Float(f) => Err(D::Error::custom(format!(
                "precision must be a whole number of digits, got {f}"
            ))),
            ScalarRepr::String(s) => {
                let t = s.trim();
                if is_undetermined(t) {
                    Ok(Precision::Undetermined)
                } else if t.eq_ignore_ascii_case("n/a") || t.eq_ignore_ascii_case("na") {
                    Ok(Precision::NotApplicable)
                } else {
                    let n = t
                        .parse::<i64>()
                        .map_err(|_| D::Error::custom(format!("invalid precision '{s}'")))?;
                    digits(n)
                }
            },
        }
    }
}

/// Threshold alert fired after a converter emits its value
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Hook {
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub alert_below: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub alert_above: Option<Decimal>,
    /// `{label}` and `{value}` are substituted
    pub message: String,
}

impl Hook {
    pub fn triggered(&self, value: Decimal) -> bool {
        self.alert_below.is_some_and(|below| value < below)
            || self.alert_above.is_some_and(|above| value > above)
    }

    pub fn render(&self, label: &str, value: &Decimal) -> String {
        self.message
            .replace("{label}", label)
            .replace("{value}", &value.to_string())
    }
}

/// Declarative description of one converter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConverterSpec {
    /// Output label
    pub label: String,

    /// Raw field read by single-input formulas, defaults to the label
    #[serde(default)]
    pub raw: Option<String>,

    pub formula: Formula,

    /// Absent means unbounded
    #[serde(default)]
    pub lower: Option<Limit>,
    #[serde(default)]
    pub upper: Option<Limit>,

    #[serde(default)]
    pub precision: Precision,

    /// Forward out-of-range values instead of substituting ERROR
    #[serde(default = "bool_true", deserialize_with = "deserialize_bool_flexible")]
    pub report_out_of_range: bool,

    #[serde(default = "bool_false", deserialize_with = "deserialize_bool_flexible")]
    pub suppress_range_check: bool,

    #[serde(default)]
    pub hook: Option<Hook>,
}

impl ConverterSpec {
    /// Convenience for code-built descriptors
    pub fn new(label: impl Into<String>, formula: Formula) -> Self {
        Self {
            label: label.into(),
            raw: None,
            formula,
            lower: None,
            upper: None,
            precision: Precision::default(),
            report_out_of_range: true,
            suppress_range_check: false,
            hook: None,
        }
    }

    pub fn with_bounds(mut self, lower: Decimal, upper: Decimal) -> Self {
        self.lower = Some(Limit::Value(lower));
        self.upper = Some(Limit::Value(upper));
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    pub fn raw_field(&self) -> &str {
        self.raw.as_deref().unwrap_or(&self.label)
    }

    pub fn raw_fields(&self) -> Vec<&str> {
        self.formula.raw_fields(self.raw_field())
    }

    pub fn dependencies(&self) -> Vec<&str> {
        self.formula.dependencies()
    }

    pub fn has_undetermined_bounds(&self) -> bool {
        matches!(self.lower, Some(Limit::Undetermined))
            || matches!(self.upper, Some(Limit::Undetermined))
    }

    /// Placeholders still awaiting a value, for the startup and daily listing
    pub fn undetermined(&self) -> Vec<&'static str> {
        let mut items = Vec::new();
        if self.precision == Precision::Undetermined {
            items.push("precision");
        }
        if matches!(self.lower, Some(Limit::Undetermined)) {
            items.push("lower bound");
        }
        if matches!(self.upper, Some(Limit::Undetermined)) {
            items.push("upper bound");
        }
        items
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let spec: ConverterSpec =
            serde_yaml::from_str("label: Temperature_Precon\nformula: { kind: decimal }\n").unwrap();
        assert_eq!(spec.raw_field(), "Temperature_Precon");
        assert_eq!(spec.precision, Precision::Digits(4));
        assert!(spec.report_out_of_range);
        assert!(!spec.suppress_range_check);
        assert_eq!(spec.lower, None);
        assert!(spec.undetermined().is_empty());
    }

    #[test]
    fn test_placeholders_and_symbolic_precision() {
        let spec: ConverterSpec = serde_yaml::from_str(
            r#"
label: geiger_status
raw: geiger_status_raw
formula: { kind: integer }
lower: FIX
upper: "2000"
precision: N/A
"#,
        )
        .unwrap();
        assert_eq!(spec.raw_field(), "geiger_status_raw");
        assert_eq!(spec.lower, Some(Limit::Undetermined));
        assert_eq!(spec.upper, Some(Limit::Value(dec!(2000))));
        assert_eq!(spec.precision, Precision::NotApplicable);
        assert_eq!(spec.undetermined(), vec!["lower bound"]);

        let undetermined: Precision = serde_yaml::from_str("undetermined").unwrap();
        assert_eq!(undetermined, Precision::Undetermined);
        assert!(serde_yaml::from_str::<Precision>("1.5").is_err());
        assert!(serde_yaml::from_str::<Precision>("40").is_err());
    }

    #[test]
    fn test_hook_threshold() {
        let hook: Hook = serde_yaml::from_str(
            "alert_below: '-18'\nmessage: 'Frostbite risk: {label} is {value} F'\n",
        )
        .unwrap();
        assert!(hook.triggered(dec!(-20.5)));
        assert!(!hook.triggered(dec!(-18)));
        assert_eq!(
            hook.render("wind_chill", &dec!(-20.5)),
            "Frostbite risk: wind_chill is -20.5 F"
        );
    }
}
