use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{ValueError, ValueResult};

/// The scalar kind of a field, inferred from its default value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    String,
    Number,
    Boolean,
}

impl Kind {
    /// Map a primitive kind name to its kind.
    pub fn from_name(name: &str) -> ValueResult<Self> {
        match name {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            other => Err(ValueError::UnsupportedKind(other.to_string())),
        }
    }

    /// Infer the kind described by a default value.
    pub fn of(value: &Value) -> ValueResult<Self> {
        Self::from_name(json_kind_name(value))
    }

    /// Human-readable name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Convert a primitive into this kind.
    pub fn coerce(&self, value: &Primitive) -> Primitive {
        match (self, value) {
            (Self::String, Primitive::String(s)) => Primitive::String(s.clone()),
            (Self::String, Primitive::Number(n)) => Primitive::String(format_number(*n)),
            (Self::String, Primitive::Bool(b)) => Primitive::String(b.to_string()),
            (Self::Number, Primitive::String(s)) => Primitive::Number(parse_number(s)),
            (Self::Number, Primitive::Number(n)) => Primitive::Number(*n),
            (Self::Number, Primitive::Bool(b)) => Primitive::Number(if *b { 1.0 } else { 0.0 }),
            (Self::Boolean, Primitive::String(s)) => Primitive::Bool(!s.is_empty()),
            (Self::Boolean, Primitive::Number(n)) => Primitive::Bool(*n != 0.0 && !n.is_nan()),
            (Self::Boolean, Primitive::Bool(b)) => Primitive::Bool(*b),
        }
    }

    /// The value an explicit `null` converts into.
    pub fn coerce_null(&self) -> Primitive {
        match self {
            Self::String => Primitive::String("null".into()),
            Self::Number => Primitive::Number(0.0),
            Self::Boolean => Primitive::Bool(false),
        }
    }

    /// Convert a JSON scalar into this kind. Arrays and objects are rejected.
    pub fn coerce_json(&self, value: &Value) -> ValueResult<Primitive> {
        match value {
            Value::Null => Ok(self.coerce_null()),
            other => match Primitive::from_json(other) {
                Some(p) => Ok(self.coerce(&p)),
                None => Err(ValueError::NotCoercible {
                    kind: *self,
                    found: json_kind_name(other).to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    String(String),
    Number(f64),
    Bool(bool),
}

impl Primitive {
    /// Read a JSON scalar. Returns `None` for null, arrays and objects.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::Bool(b) => Some(Self::Bool(*b)),
            _ => None,
        }
    }

    /// The kind this primitive already has.
    pub fn kind(&self) -> Kind {
        match self {
            Self::String(_) => Kind::String,
            Self::Number(_) => Kind::Number,
            Self::Bool(_) => Kind::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// JSON form of this primitive. Integral numbers become JSON integers.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => number_to_json(*n),
            Self::Bool(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Serialize for Primitive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Number(n) if is_integral(*n) => serializer.serialize_i64(*n as i64),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Render a number the way string coercion does: `7.0` is `"7"`, `-0.0` is
/// `"0"`, non-finite values are `NaN` / `Infinity` / `-Infinity`.
///
/// Magnitudes of at least `1e21` or below `1e-6` use exponent notation with
/// an explicit sign, e.g. `"1e+21"` and `"1.5e-7"`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if n == 0.0 {
        return "0".into();
    }
    let magnitude = n.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => formatted,
        };
    }
    n.to_string()
}

/// Parse a string the way number coercion does. Surrounding whitespace is
/// ignored, the empty string is zero and anything unparsable is NaN.
fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust also accepts "inf" and "nan" spellings, which are not numbers here.
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0
}

fn number_to_json(n: f64) -> Value {
    if is_integral(n) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn json_kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}
