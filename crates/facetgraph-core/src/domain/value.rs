//! Typed facet property values
//!
//! Entities and relationships keep their facet values in a map keyed by
//! [`PropertyId`](super::PropertyId). Each value is one variant of [`Value`],
//! and every variant corresponds to exactly one [`PropertyType`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared type of a facet property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Long,
    Double,
    Decimal,
    Bool,
    Guid,
    DateTime,
}

impl PropertyType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Long => "long",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Bool => "bool",
            Self::Guid => "guid",
            Self::DateTime => "datetime",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" | "str" => Some(Self::String),
            "long" | "int" | "integer" => Some(Self::Long),
            "double" | "float" => Some(Self::Double),
            "decimal" => Some(Self::Decimal),
            "bool" | "boolean" => Some(Self::Bool),
            "guid" | "uuid" => Some(Self::Guid),
            "datetime" | "date" => Some(Self::DateTime),
            _ => None,
        }
    }

    /// Get all property types
    pub fn all() -> &'static [PropertyType] {
        &[
            Self::String,
            Self::Long,
            Self::Double,
            Self::Decimal,
            Self::Bool,
            Self::Guid,
            Self::DateTime,
        ]
    }

    /// Parse a raw string into a value of this type
    ///
    /// Returns `None` when the string has no representation in this type.
    pub fn parse_value(&self, raw: &str) -> Option<Value> {
        let trimmed = raw.trim();
        match self {
            Self::String => Some(Value::Str(raw.to_string())),
            Self::Long => trimmed.parse::<i64>().ok().map(Value::Long),
            // Non-finite doubles have no JSON representation
            Self::Double => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Double),
            Self::Decimal => canonical_decimal(trimmed).map(Value::Decimal),
            Self::Bool => match trimmed.to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            Self::Guid => Uuid::parse_str(trimmed).ok().map(Value::Guid),
            Self::DateTime => parse_date_time(trimmed).map(Value::DateTime),
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A facet property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Str(String),
    Long(i64),
    Double(f64),
    /// Canonical decimal text, e.g. `-12.50`
    Decimal(String),
    Bool(bool),
    Guid(Uuid),
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Whether the value can be stored; false only for NaN and infinite doubles
    pub fn is_storable(&self) -> bool {
        match self {
            Self::Double(v) => v.is_finite(),
            _ => true,
        }
    }

    /// The property type this value belongs to
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Str(_) => PropertyType::String,
            Self::Long(_) => PropertyType::Long,
            Self::Double(_) => PropertyType::Double,
            Self::Decimal(_) => PropertyType::Decimal,
            Self::Bool(_) => PropertyType::Bool,
            Self::Guid(_) => PropertyType::Guid,
            Self::DateTime(_) => PropertyType::DateTime,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) | Self::Decimal(s) => write!(f, "{}", s),
            Self::Long(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Guid(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// Validate decimal text and strip a leading `+`
fn canonical_decimal(s: &str) -> Option<String> {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    let valid = match frac_part {
        Some(frac) => (int_part.is_empty() || digits(int_part)) && digits(frac),
        None => digits(int_part),
    };
    if !valid {
        return None;
    }

    let negative = s.starts_with('-');
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let mut out = String::with_capacity(s.len() + 1);
    if negative {
        out.push('-');
    }
    out.push_str(int_part);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}

fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
