//! Per-kind coercion and native/wire conversion.
//!
//! All functions return a plain reason string on failure; the caller wraps
//! it into a `DeflateError`/`InflateError` carrying class and property.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use super::{force_timezone, PropertyKind};
use crate::model::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";

type Conversion = std::result::Result<Value, String>;

/// Bring an arbitrary native value to the native type of `kind`.
pub(super) fn coerce(kind: PropertyKind, value: &Value) -> Conversion {
    match (kind, value) {
        (_, Value::Null) => Ok(Value::Null),

        (PropertyKind::String, Value::String(_)) => Ok(value.clone()),
        (PropertyKind::String, Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            Ok(Value::String(value.to_string()))
        }

        (PropertyKind::Integer, Value::Int(_)) => Ok(value.clone()),
        (PropertyKind::Integer, Value::Float(f)) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        (PropertyKind::Integer, Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        (PropertyKind::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("'{s}' is not an integer")),

        (PropertyKind::Float, Value::Float(_)) => Ok(value.clone()),
        (PropertyKind::Float, Value::Int(i)) => Ok(Value::Float(*i as f64)),
        (PropertyKind::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("'{s}' is not a float")),

        (PropertyKind::Boolean, Value::Bool(_)) => Ok(value.clone()),
        (PropertyKind::Boolean, Value::Int(i)) => Ok(Value::Bool(*i != 0)),
        (PropertyKind::Boolean, Value::Float(f)) => Ok(Value::Bool(*f != 0.0)),
        (PropertyKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' is not a boolean")),
        },

        (PropertyKind::Date, Value::Date(_)) => Ok(value.clone()),
        (PropertyKind::Date, Value::String(s)) => parse_date(s).map(Value::Date),
        (PropertyKind::Date, Value::DateTime(_) | Value::LocalDateTime(_)) => {
            Err("date expected, got datetime".to_string())
        }

        (PropertyKind::DateTime, Value::DateTime(_) | Value::LocalDateTime(_)) => Ok(value.clone()),
        (PropertyKind::DateTime, Value::Int(_) | Value::Float(_)) => epoch_to_datetime(value),
        (PropertyKind::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(Value::DateTime)
            .map_err(|e| format!("'{s}' is not an RFC 3339 datetime: {e}")),

        (PropertyKind::Json, Value::Node(_) | Value::Relationship(_)) => {
            Err(format!("{} is not JSON serialisable", value.type_name()))
        }
        (PropertyKind::Json, _) => value_to_json(value).map(json_to_value),

        (kind, other) => Err(format!("cannot convert {} to {kind}", other.type_name())),
    }
}

/// Native → wire.
pub(super) fn deflate(kind: PropertyKind, value: &Value) -> Conversion {
    let native = coerce(kind, value)?;
    match (kind, native) {
        (PropertyKind::Date, Value::Date(d)) => Ok(Value::String(d.format(DATE_FORMAT).to_string())),
        (PropertyKind::DateTime, Value::DateTime(dt)) => Ok(Value::Float(epoch_seconds(&dt.with_timezone(&Utc)))),
        (PropertyKind::DateTime, Value::LocalDateTime(naive)) => {
            if force_timezone() {
                return Err(format!("naive datetime {naive} has no timezone"));
            }
            warn!(datetime = %naive, "naive datetime assumed to be UTC");
            Ok(Value::Float(epoch_seconds(&naive.and_utc())))
        }
        (PropertyKind::Json, native) => {
            let json = value_to_json(&native)?;
            serde_json::to_string(&json).map(Value::String).map_err(|e| e.to_string())
        }
        (_, native) => Ok(native),
    }
}

/// Wire → native.
pub(super) fn inflate(kind: PropertyKind, value: &Value) -> Conversion {
    match (kind, value) {
        (PropertyKind::Date, Value::String(s)) => parse_date(s).map(Value::Date),
        (PropertyKind::Date, other) => Err(format!("date string expected, got {}", other.type_name())),
        (PropertyKind::DateTime, Value::Int(_) | Value::Float(_)) => epoch_to_datetime(value),
        (PropertyKind::DateTime, other) => Err(format!("timestamp expected, got {}", other.type_name())),
        (PropertyKind::Json, Value::String(s)) => serde_json::from_str::<serde_json::Value>(s)
            .map(json_to_value)
            .map_err(|e| format!("invalid JSON: {e}")),
        (PropertyKind::Json, other) => Err(format!("JSON text expected, got {}", other.type_name())),
        (kind, other) => coerce(kind, other),
    }
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| format!("'{s}' does not match the YYYY-MM-DD date format"))
}

/// Seconds since the epoch, microsecond precision.
fn epoch_seconds(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp_micros() as f64 / 1_000_000.0
}

fn epoch_to_datetime(value: &Value) -> Conversion {
    let secs = value.as_float().ok_or_else(|| format!("{} is not a timestamp", value.type_name()))?;
    if !secs.is_finite() {
        return Err(format!("{secs} is not a valid timestamp"));
    }
    let micros = (secs * 1_000_000.0).round();
    if micros.abs() >= i64::MAX as f64 {
        return Err(format!("timestamp {secs} is out of range"));
    }
    DateTime::<Utc>::from_timestamp_micros(micros as i64)
        .map(|dt| Value::DateTime(dt.fixed_offset()))
        .ok_or_else(|| format!("timestamp {secs} is out of range"))
}

// ============================================================================
// JSON codec
// ============================================================================

/// Native value → `serde_json` tree. Temporal values are written as their
/// ISO strings; graph values are rejected.
pub fn value_to_json(value: &Value) -> std::result::Result<serde_json::Value, String> {
    use serde_json::Value as J;
    Ok(match value {
        Value::Null => J::Null,
        Value::Bool(b) => J::Bool(*b),
        Value::Int(i) => J::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(J::Number)
            .ok_or_else(|| format!("{f} is not representable in JSON"))?,
        Value::String(s) => J::String(s.clone()),
        Value::List(items) => J::Array(items.iter().map(value_to_json).collect::<Result<_, _>>()?),
        Value::Map(m) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in m {
                obj.insert(k.clone(), value_to_json(v)?);
            }
            J::Object(obj)
        }
        Value::Date(d) => J::String(d.format(DATE_FORMAT).to_string()),
        Value::DateTime(dt) => J::String(dt.to_rfc3339()),
        Value::LocalDateTime(dt) => J::String(dt.to_string()),
        Value::Node(_) | Value::Relationship(_) => {
            return Err(format!("{} is not JSON serialisable", value.type_name()));
        }
    })
}

/// `serde_json` tree → native value. Integral numbers become `Int`.
pub fn json_to_value(json: serde_json::Value) -> Value {
    use serde_json::Value as J;
    match json {
        J::Null => Value::Null,
        J::Bool(b) => Value::Bool(b),
        J::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        J::String(s) => Value::String(s),
        J::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        J::Object(obj) => Value::Map(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn roundtrip(kind: PropertyKind, value: Value) -> Value {
        let wire = deflate(kind, &value).unwrap();
        inflate(kind, &wire).unwrap()
    }

    #[test]
    fn test_date_wire_format() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(deflate(PropertyKind::Date, &Value::Date(d)).unwrap(), Value::from("2024-02-29"));
        assert!(inflate(PropertyKind::Date, &Value::from("29/02/2024")).is_err());
    }

    #[test]
    fn test_datetime_normalised_to_utc() {
        let tz = FixedOffset::east_opt(5 * 3600).unwrap();
        let local = tz.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
        let back = roundtrip(PropertyKind::DateTime, Value::from(local));
        match back {
            Value::DateTime(dt) => {
                assert_eq!(dt, local);
                assert_eq!(dt.offset().local_minus_utc(), 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            deflate(PropertyKind::DateTime, &Value::from(local)).unwrap(),
            Value::Float(1_590_994_800.0)
        );
    }

    #[test]
    fn test_naive_datetime_respects_switch() {
        let naive = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        super::super::set_force_timezone(true);
        assert!(deflate(PropertyKind::DateTime, &Value::LocalDateTime(naive)).is_err());
        super::super::set_force_timezone(false);
        assert_eq!(
            deflate(PropertyKind::DateTime, &Value::LocalDateTime(naive)).unwrap(),
            Value::Float(1_577_836_800.0)
        );
    }

    #[test]
    fn test_bad_timestamp() {
        assert!(inflate(PropertyKind::DateTime, &Value::Float(f64::INFINITY)).is_err());
        assert!(inflate(PropertyKind::DateTime, &Value::from("yesterday")).is_err());
    }

    #[test]
    fn test_json_roundtrip_and_parse_error() {
        let mut m = HashMap::new();
        m.insert("tags".to_string(), Value::from(vec!["a", "b"]));
        m.insert("score".to_string(), Value::Float(1.0));
        m.insert("n".to_string(), Value::Int(3));
        let v = Value::Map(m);
        assert_eq!(roundtrip(PropertyKind::Json, v.clone()), v);
        assert!(inflate(PropertyKind::Json, &Value::from("{not json")).is_err());
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(deflate(PropertyKind::String, &Value::Int(5)).unwrap(), Value::from("5"));
        assert!(deflate(PropertyKind::String, &Value::List(vec![])).is_err());
    }

    proptest! {
        #[test]
        fn prop_integer_roundtrip(i in any::<i64>()) {
            prop_assert_eq!(roundtrip(PropertyKind::Integer, Value::Int(i)), Value::Int(i));
        }

        #[test]
        fn prop_float_roundtrip(f in -1.0e12f64..1.0e12) {
            prop_assert_eq!(roundtrip(PropertyKind::Float, Value::Float(f)), Value::Float(f));
        }

        #[test]
        fn prop_bool_roundtrip(b in any::<bool>()) {
            prop_assert_eq!(roundtrip(PropertyKind::Boolean, Value::Bool(b)), Value::Bool(b));
        }

        #[test]
        fn prop_string_roundtrip(s in ".*") {
            prop_assert_eq!(roundtrip(PropertyKind::String, Value::from(s.clone())), Value::from(s));
        }

        #[test]
        fn prop_date_roundtrip(days in 0i64..3_000_000) {
            let d = NaiveDate::from_ymd_opt(1, 1, 1).unwrap() + chrono::Duration::days(days);
            prop_assert_eq!(roundtrip(PropertyKind::Date, Value::Date(d)), Value::Date(d));
        }

        #[test]
        fn prop_datetime_roundtrip(
            secs in -2_000_000_000i64..4_000_000_000,
            millis in 0u32..1000,
            offset_minutes in -720i32..=840,
        ) {
            let tz = FixedOffset::east_opt(offset_minutes * 60).unwrap();
            let utc = DateTime::<Utc>::from_timestamp(secs, millis * 1_000_000).unwrap();
            let local = utc.with_timezone(&tz);
            prop_assert_eq!(roundtrip(PropertyKind::DateTime, Value::from(local)), Value::from(utc));
        }

        #[test]
        fn prop_json_roundtrip(items in proptest::collection::vec((any::<i64>(), "[a-z]{0,8}", any::<bool>()), 0..8)) {
            let list = Value::List(
                items
                    .into_iter()
                    .map(|(i, s, b)| Value::List(vec![Value::Int(i), Value::String(s), Value::Bool(b)]))
                    .collect(),
            );
            prop_assert_eq!(roundtrip(PropertyKind::Json, list.clone()), list);
        }
    }
}
