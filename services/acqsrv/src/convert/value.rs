//! Converted values

use std::fmt;

use rust_decimal::Decimal;

/// Output of one converter for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(Decimal),
    Text(String),
    /// No valid data this cycle
    Error,
}

impl Value {
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error)
    }

    /// Record representation, `sentinel` standing in for `Error`
    pub fn render(&self, sentinel: &str) -> String {
        match self {
            Value::Number(n) => n.to_string(),
            Value::Text(text) => text.clone(),
            Value::Error => sentinel.to_string(),
        }
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Number(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(text) => write!(f, "{text}"),
            Value::Error => write!(f, "ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_keeps_scale() {
        assert_eq!(Value::Number(dec!(831.10)).render("-9999"), "831.10");
        assert_eq!(Value::Text("OK".into()).render("-9999"), "OK");
        assert_eq!(Value::Error.render("-9999"), "-9999");
        assert_eq!(Value::Error.to_string(), "ERROR");
    }
}
