//! Snapshot model for values handed to the sandboxed console.
//!
//! Console arguments never leave the isolate as live handles. The sandbox
//! bootstrap walks each argument once and serializes a closed, tagged tree
//! that is decoded here. Every composite node carries the in-isolate
//! `String(value)` coercion so the formatter can reproduce native fallbacks
//! without calling back into JavaScript.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum nesting captured by the in-isolate snapshot walker. Deeper values
/// arrive as [`JsValue::Opaque`].
pub const MAX_SNAPSHOT_DEPTH: usize = 24;
/// Maximum size in bytes of one serialized console payload
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// A JavaScript value as observed by the console at call time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    /// Carried as its `String(n)` form so NaN and ±Infinity survive JSON.
    Number(#[serde(with = "number_repr")] f64),
    /// Decimal digits of the bigint.
    BigInt(String),
    String(String),
    /// `Symbol(description)` text.
    Symbol(String),
    Function(FunctionValue),
    Array(ArrayValue),
    /// Any non-array object; `entries` holds own enumerable keys in order.
    Object(ObjectValue),
    Error(ErrorValue),
    Date(DateValue),
    /// A value the walker could not capture structurally (cycle, depth
    /// limit, throwing getter). Holds its string coercion.
    Opaque(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionValue {
    pub name: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub items: Vec<JsValue>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectValue {
    pub entries: IndexMap<String, JsValue>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    /// `toISOString()`, absent for invalid dates.
    pub iso: Option<String>,
    /// Epoch milliseconds, absent for invalid dates.
    pub time: Option<f64>,
    pub text: String,
}

/// Reasons `JSON.stringify` throws.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JsonError {
    #[error("Do not know how to serialize a BigInt")]
    BigInt,
    #[error("Converting circular structure to JSON")]
    Unserializable,
}

impl JsValue {
    pub fn string(value: impl Into<String>) -> Self {
        JsValue::String(value.into())
    }

    pub fn number(value: f64) -> Self {
        JsValue::Number(value)
    }

    /// Build an array snapshot, deriving its coercion the way
    /// `Array.prototype.join` does.
    pub fn array(items: Vec<JsValue>) -> Self {
        let text = items
            .iter()
            .map(|item| match item {
                JsValue::Undefined | JsValue::Null => String::new(),
                other => other.coerce_to_string(),
            })
            .collect::<Vec<_>>()
            .join(",");
        JsValue::Array(ArrayValue { items, text })
    }

    /// Build a plain object snapshot.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, JsValue)>) -> Self {
        JsValue::Object(ObjectValue {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            text: "[object Object]".to_string(),
        })
    }

    pub fn error(name: &str, message: &str, stack: Option<&str>) -> Self {
        JsValue::Error(ErrorValue {
            name: name.to_string(),
            message: message.to_string(),
            stack: stack.map(str::to_string),
        })
    }

    /// `typeof value === 'object' && value !== null && !Array.isArray(value)`
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            JsValue::Object(_) | JsValue::Error(_) | JsValue::Date(_)
        )
    }

    /// `Object.keys(value)` for object-like values, empty otherwise.
    pub fn own_keys(&self) -> Vec<&str> {
        match self {
            JsValue::Object(object) => object.entries.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Own enumerable property lookup on an object snapshot.
    pub fn property(&self, key: &str) -> Option<&JsValue> {
        match self {
            JsValue::Object(object) => object.entries.get(key),
            _ => None,
        }
    }

    /// JavaScript truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Boolean(value) => *value,
            JsValue::Number(value) => !(value.is_nan() || *value == 0.0),
            JsValue::BigInt(digits) => digits.trim_start_matches('-').trim_start_matches('0') != "",
            JsValue::String(value) => !value.is_empty(),
            _ => true,
        }
    }

    /// `String(value)`.
    pub fn coerce_to_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Boolean(value) => value.to_string(),
            JsValue::Number(value) => number_to_string(*value),
            JsValue::BigInt(digits) => digits.clone(),
            JsValue::String(value) => value.clone(),
            JsValue::Symbol(text) | JsValue::Opaque(text) => text.clone(),
            JsValue::Function(function) => function.text.clone(),
            JsValue::Array(array) => array.text.clone(),
            JsValue::Object(object) => object.text.clone(),
            JsValue::Date(date) => date.text.clone(),
            JsValue::Error(error) => error_to_string(error),
        }
    }

    /// `Number(value)`.
    pub fn to_number(&self) -> f64 {
        match self {
            JsValue::Undefined => f64::NAN,
            JsValue::Null => 0.0,
            JsValue::Boolean(value) => f64::from(u8::from(*value)),
            JsValue::Number(value) => *value,
            JsValue::BigInt(digits) => digits.parse().unwrap_or(f64::NAN),
            JsValue::String(value) => string_to_number(value),
            JsValue::Symbol(_) | JsValue::Function(_) => f64::NAN,
            JsValue::Date(date) => date.time.unwrap_or(f64::NAN),
            other => string_to_number(&other.coerce_to_string()),
        }
    }

    /// `JSON.stringify(value, null, 2)`. `Ok(None)` is the `undefined` result
    /// produced for functions, symbols and `undefined` itself.
    pub fn to_json(&self) -> Result<Option<String>, JsonError> {
        self.json_fragment(0)
    }

    fn json_fragment(&self, indent: usize) -> Result<Option<String>, JsonError> {
        let text = match self {
            JsValue::Undefined | JsValue::Function(_) | JsValue::Symbol(_) => return Ok(None),
            JsValue::Null => "null".to_string(),
            JsValue::Boolean(value) => value.to_string(),
            JsValue::Number(value) if value.is_finite() => number_to_string(*value),
            JsValue::Number(_) => "null".to_string(),
            JsValue::BigInt(_) => return Err(JsonError::BigInt),
            JsValue::Opaque(_) => return Err(JsonError::Unserializable),
            JsValue::String(value) => quote_json(value),
            JsValue::Date(date) => match &date.iso {
                Some(iso) => quote_json(iso),
                None => "null".to_string(),
            },
            // Error properties are not enumerable.
            JsValue::Error(_) => "{}".to_string(),
            JsValue::Array(array) => {
                if array.items.is_empty() {
                    return Ok(Some("[]".to_string()));
                }
                let inner = " ".repeat(indent + 2);
                let mut parts = Vec::with_capacity(array.items.len());
                for item in &array.items {
                    let fragment = item
                        .json_fragment(indent + 2)?
                        .unwrap_or_else(|| "null".to_string());
                    parts.push(format!("{inner}{fragment}"));
                }
                format!("[\n{}\n{}]", parts.join(",\n"), " ".repeat(indent))
            }
            JsValue::Object(object) => {
                let inner = " ".repeat(indent + 2);
                let mut parts = Vec::with_capacity(object.entries.len());
                for (key, value) in &object.entries {
                    if let Some(fragment) = value.json_fragment(indent + 2)? {
                        parts.push(format!("{inner}{}: {fragment}", quote_json(key)));
                    }
                }
                if parts.is_empty() {
                    return Ok(Some("{}".to_string()));
                }
                format!("{{\n{}\n{}}}", parts.join(",\n"), " ".repeat(indent))
            }
        };
        Ok(Some(text))
    }
}

fn quote_json(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// `Error.prototype.toString`.
fn error_to_string(error: &ErrorValue) -> String {
    match (error.name.is_empty(), error.message.is_empty()) {
        (true, _) => error.message.clone(),
        (false, true) => error.name.clone(),
        (false, false) => format!("{}: {}", error.name, error.message),
    }
}

/// `Number.prototype.toString()` for radix 10.
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let sign = if value < 0.0 { "-" } else { "" };
    // Shortest round-trip digits, e.g. "1.2345e2".
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let n = exponent + 1;

    let body = if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        format!("{int_part}.{frac_part}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat((-n) as usize))
    } else {
        let e = n - 1;
        let e_sign = if e >= 0 { "+" } else { "-" };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{e_sign}{}", e.abs())
        } else {
            format!("{first}.{rest}e{e_sign}{}", e.abs())
        }
    };
    format!("{sign}{body}")
}

/// `Number(string)`: JavaScript StringToNumber.
pub fn string_to_number(value: &str) -> f64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        let lower = trimmed.get(..2).map(str::to_ascii_lowercase);
        if lower.as_deref() == Some(prefix) {
            let digits = &trimmed[2..];
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return f64::NAN;
            }
            return digits
                .chars()
                .filter_map(|c| c.to_digit(radix))
                .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
        }
    }

    let unsigned = trimmed.trim_start_matches(['+', '-']);
    if unsigned == "Infinity" && trimmed.len() - unsigned.len() <= 1 {
        return if trimmed.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    if !is_decimal_literal(trimmed) {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

fn is_decimal_literal(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(index) => (&body[..index], Some(&body[index + 1..])),
        None => (body, None),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits_ok = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !digits_ok(int_part) || !digits_ok(frac_part) || (int_part.is_empty() && frac_part.is_empty())
    {
        return false;
    }
    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && digits_ok(exp)
        }
    }
}

/// Serde adapter carrying numbers as their JavaScript string form.
mod number_repr {
    use super::{number_to_string, string_to_number};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&number_to_string(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NumberVisitor;

        impl Visitor<'_> for NumberVisitor {
            type Value = f64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a number or its JavaScript string form")
            }

            fn visit_str<E>(self, value: &str) -> Result<f64, E>
            where
                E: de::Error,
            {
                if value == "NaN" {
                    return Ok(f64::NAN);
                }
                let parsed = string_to_number(value);
                if parsed.is_nan() {
                    return Err(E::custom(format!("invalid number repr '{value}'")));
                }
                Ok(parsed)
            }

            fn visit_f64<E>(self, value: f64) -> Result<f64, E> {
                Ok(value)
            }

            fn visit_i64<E>(self, value: i64) -> Result<f64, E> {
                Ok(value as f64)
            }

            fn visit_u64<E>(self, value: u64) -> Result<f64, E> {
                Ok(value as f64)
            }
        }

        deserializer.deserialize_any(NumberVisitor)
    }
}
