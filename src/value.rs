//! Observable values.
//!
//! A `Value` is the datum held by one observable slot of a classification.
//! Values are deliberately small: evidence comparison works on whole values,
//! never on substructure.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed observable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value.
    Boolean(bool),

    /// Integer value.
    Integer(i64),

    /// Floating-point value.
    Number(f64),

    /// String value.
    String(String),
}

impl Value {
    /// Returns the string content, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the numeric content, widening integers.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        assert_eq!(Value::from("Acacia").as_str(), Some("Acacia"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(7i64).as_integer(), Some(7));
        assert_eq!(Value::Number(0.5).as_number(), Some(0.5));
        assert_eq!(Value::from(7i64).as_number(), Some(7.0));
        assert_eq!(Value::from("x").as_bool(), None);
    }

    #[test]
    fn display_is_bare() {
        assert_eq!(Value::from("Plantae").to_string(), "Plantae");
        assert_eq!(Value::from(false).to_string(), "false");
    }

    #[test]
    fn serde_round_trip_untagged() {
        let v = Value::from("Acacia dealbata");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"Acacia dealbata\"");
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);

        let b: Value = serde_json::from_str("true").unwrap();
        assert_eq!(b, Value::Boolean(true));
        let i: Value = serde_json::from_str("42").unwrap();
        assert_eq!(i, Value::Integer(42));
    }
}
