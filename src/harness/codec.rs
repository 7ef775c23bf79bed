//! Output codec shared by the evaluator and the generated harness.
//!
//! Plain JSON cannot carry non-finite floats, so both sides substitute the
//! sentinel strings `"Infinity"`, `"-Infinity"` and `"NaN"` for them when
//! encoding and turn the sentinels back into floats when decoding. The
//! convention is lossy in one direction only: a genuine string equal to a
//! sentinel decodes as the float.
//!
//! Integers outside the `i64` range are kept as their decimal text so they
//! still compare exactly.

use crate::config::types::{EvalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;

pub const POSITIVE_INFINITY: &str = "Infinity";
pub const NEGATIVE_INFINITY: &str = "-Infinity";
pub const NOT_A_NUMBER: &str = "NaN";

/// A value crossing the process boundary.
///
/// Integers and floats are distinct variants so comparison can stay exact
/// for integers while tolerating float noise.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    /// Integer outside the `i64` range, as canonical decimal digits.
    BigInt(String),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl From<serde_json::Value> for Value {
    fn from(raw: serde_json::Value) -> Self {
        decode(raw)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        encode(&value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", encode(self))
    }
}

/// Decode wire JSON, turning sentinel strings into non-finite floats.
pub fn decode(raw: serde_json::Value) -> Value {
    match raw {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => decode_number(&n),
        serde_json::Value::String(s) => match s.as_str() {
            POSITIVE_INFINITY => Value::Float(f64::INFINITY),
            NEGATIVE_INFINITY => Value::Float(f64::NEG_INFINITY),
            NOT_A_NUMBER => Value::Float(f64::NAN),
            _ => Value::Str(s),
        },
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(decode).collect()),
        serde_json::Value::Object(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key, decode(value)))
                .collect(),
        ),
    }
}

fn decode_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Int(i);
    }
    let text = n.to_string();
    if is_integer_literal(&text) {
        Value::BigInt(text)
    } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Encode into wire JSON, substituting sentinels for non-finite floats.
pub fn encode(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::BigInt(digits) => match digits.parse::<Number>() {
            Ok(n) => serde_json::Value::Number(n),
            Err(_) => serde_json::Value::String(digits.clone()),
        },
        Value::Float(f) => encode_float(*f),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(encode).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), encode(value)))
                .collect(),
        ),
    }
}

pub fn encode_float(f: f64) -> serde_json::Value {
    match Number::from_f64(f) {
        Some(n) => serde_json::Value::Number(n),
        None if f.is_nan() => serde_json::Value::String(NOT_A_NUMBER.to_string()),
        None if f > 0.0 => serde_json::Value::String(POSITIVE_INFINITY.to_string()),
        None => serde_json::Value::String(NEGATIVE_INFINITY.to_string()),
    }
}

pub fn decode_float(raw: &serde_json::Value) -> Option<f64> {
    match decode(raw.clone()) {
        Value::Float(f) => Some(f),
        Value::Int(i) => Some(i as f64),
        Value::BigInt(digits) => digits.parse().ok(),
        _ => None,
    }
}

/// Encode a value into one line of wire JSON.
pub fn to_wire_string(value: &Value) -> Result<String> {
    serde_json::to_string(&encode(value))
        .map_err(|e| EvalError::Codec(format!("failed to encode value: {}", e)))
}

/// Decode one line of wire JSON.
pub fn from_wire_str(text: &str) -> Result<Value> {
    let raw: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| EvalError::Codec(format!("failed to decode payload: {}", e)))?;
    Ok(decode(raw))
}

/// Serde adapter for float maps such as `Program::fitness_scores`, where
/// `runtime_ms` starts out as positive infinity.
pub mod float_map {
    use super::{decode_float, encode_float};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, f64>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&String, serde_json::Value> =
            map.iter().map(|(key, value)| (key, encode_float(*value))).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<BTreeMap<String, f64>, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| match decode_float(&value) {
                Some(f) => Ok((key, f)),
                None => Err(D::Error::custom(format!("fitness score '{}' is not a number", key))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_finite_floats_round_trip() {
        for original in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let line = to_wire_string(&Value::Float(original)).unwrap();
            match from_wire_str(&line).unwrap() {
                Value::Float(back) if original.is_nan() => assert!(back.is_nan()),
                Value::Float(back) => assert_eq!(back, original),
                other => panic!("unexpected decoded value: {other:?}"),
            }
        }
    }

    #[test]
    fn sentinels_are_spelled_as_strings_on_the_wire() {
        let value = Value::List(vec![
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(f64::NAN),
        ]);
        assert_eq!(encode(&value), json!(["Infinity", "-Infinity", "NaN"]));
    }

    #[test]
    fn integers_and_floats_stay_distinct() {
        assert!(matches!(decode(json!(3)), Value::Int(3)));
        assert!(matches!(decode(json!(3.0)), Value::Float(f) if f == 3.0));
    }

    #[test]
    fn integers_beyond_i64_keep_every_digit() {
        let two_pow_70 = from_wire_str("1180591620717411303424").unwrap();
        assert!(matches!(&two_pow_70, Value::BigInt(d) if d == "1180591620717411303424"));
        assert_eq!(to_wire_string(&two_pow_70).unwrap(), "1180591620717411303424");

        let negative = from_wire_str("-99999999999999999999").unwrap();
        assert!(matches!(&negative, Value::BigInt(d) if d == "-99999999999999999999"));

        assert!(matches!(from_wire_str("18446744073709551615").unwrap(), Value::BigInt(_)));
        assert!(matches!(from_wire_str("1e+21").unwrap(), Value::Float(_)));
    }

    #[test]
    fn nested_structures_decode() {
        let value = decode(json!({"a": [1, "NaN", null, true], "b": {"c": "x"}}));
        let Value::Map(map) = value else {
            panic!("expected map");
        };
        let Value::List(items) = &map["a"] else {
            panic!("expected list");
        };
        assert!(matches!(items[1], Value::Float(f) if f.is_nan()));
        assert!(matches!(items[2], Value::Null));
        assert!(matches!(items[3], Value::Bool(true)));
    }

    #[test]
    fn serde_goes_through_the_sentinel_convention() {
        let value: Value = serde_json::from_str(r#"["-Infinity", 2]"#).unwrap();
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"["-Infinity",2]"#);
    }

    #[test]
    fn float_map_keeps_infinite_runtime() {
        #[derive(Serialize, Deserialize)]
        struct Scores {
            #[serde(with = "float_map")]
            scores: BTreeMap<String, f64>,
        }

        let mut scores = BTreeMap::new();
        scores.insert("runtime_ms".to_string(), f64::INFINITY);
        scores.insert("correctness".to_string(), 0.5);
        let text = serde_json::to_string(&Scores { scores }).unwrap();
        assert_eq!(text, r#"{"scores":{"correctness":0.5,"runtime_ms":"Infinity"}}"#);

        let back: Scores = serde_json::from_str(&text).unwrap();
        assert_eq!(back.scores["runtime_ms"], f64::INFINITY);
    }

    #[test]
    fn malformed_payload_is_codec_error() {
        assert!(matches!(from_wire_str("{not json"), Err(EvalError::Codec(_))));
    }
}
