// Copyright 2025 ScriptGate Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Conversions between terminal data, script values and JSON.

use std::cmp::Ordering;

use rhai::{Array, Dynamic, ImmutableString, Map, INT};
use serde_json::{Number, Value as JsonValue};

use super::errors::{type_error, value_error, ScriptResult};
use super::table::Table;
use super::types::{DateTime, Record, TimeDelta};
use crate::terminal::Datum;

pub fn datum_to_dynamic(datum: &Datum) -> Dynamic {
    match datum {
        Datum::None => Dynamic::UNIT,
        Datum::Bool(b) => Dynamic::from(*b),
        Datum::Int(i) => Dynamic::from(*i),
        Datum::Float(f) => Dynamic::from(*f),
        Datum::Str(s) => s.as_str().into(),
        Datum::List(items) => Dynamic::from_array(items.iter().map(datum_to_dynamic).collect()),
        Datum::Record { kind, fields } => Dynamic::from(Record::new(
            kind.as_str(),
            fields
                .iter()
                .map(|(name, value)| (name.clone(), datum_to_dynamic(value)))
                .collect(),
        )),
    }
}

/// JSON form of terminal data, for callers that bypass the script engine.
pub fn datum_to_json(datum: &Datum) -> JsonValue {
    match datum {
        Datum::None => JsonValue::Null,
        Datum::Bool(b) => JsonValue::Bool(*b),
        Datum::Int(i) => JsonValue::from(*i),
        Datum::Float(f) => float_json(*f),
        Datum::Str(s) => JsonValue::String(s.clone()),
        Datum::List(items) => JsonValue::Array(items.iter().map(datum_to_json).collect()),
        Datum::Record { fields, .. } => JsonValue::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), datum_to_json(value)))
                .collect(),
        ),
    }
}

fn float_json(f: f64) -> JsonValue {
    Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

/// JSON form of a script value. Records keep their field order; maps are
/// key-ordered; tables become `{column: [values...]}`.
pub fn dynamic_to_json(value: &Dynamic) -> JsonValue {
    if value.is_unit() {
        return JsonValue::Null;
    }
    if let Ok(b) = value.as_bool() {
        return JsonValue::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return JsonValue::from(i);
    }
    if let Ok(f) = value.as_float() {
        return float_json(f);
    }
    if let Ok(c) = value.as_char() {
        return JsonValue::String(c.to_string());
    }
    if let Some(s) = value.read_lock::<ImmutableString>() {
        return JsonValue::String(s.to_string());
    }
    if let Some(items) = value.read_lock::<Array>() {
        return JsonValue::Array(items.iter().map(dynamic_to_json).collect());
    }
    if let Some(map) = value.read_lock::<Map>() {
        return JsonValue::Object(
            map.iter()
                .map(|(key, value)| (key.to_string(), dynamic_to_json(value)))
                .collect(),
        );
    }
    if let Some(record) = value.read_lock::<Record>() {
        return JsonValue::Object(
            record
                .fields()
                .iter()
                .map(|(name, value)| (name.clone(), dynamic_to_json(value)))
                .collect(),
        );
    }
    if let Some(table) = value.read_lock::<Table>() {
        return JsonValue::Object(
            table
                .columns()
                .iter()
                .map(|name| {
                    let column = table.column(name).unwrap_or_default();
                    (name.clone(), JsonValue::Array(column.iter().map(dynamic_to_json).collect()))
                })
                .collect(),
        );
    }
    if let Some(dt) = value.read_lock::<DateTime>() {
        return JsonValue::String(dt.isoformat());
    }
    JsonValue::String(value.to_string())
}

/// Type name as scripts see it in error messages.
pub fn type_name(value: &Dynamic) -> &'static str {
    if value.is::<Table>() {
        "Table"
    } else if value.is::<Record>() {
        "Record"
    } else if value.is::<DateTime>() {
        "datetime"
    } else if value.is::<TimeDelta>() {
        "timedelta"
    } else if value.is_unit() {
        "()"
    } else {
        value.type_name()
    }
}

pub fn number(value: &Dynamic) -> Option<f64> {
    value
        .as_int()
        .map(|i| i as f64)
        .or_else(|_| value.as_float())
        .ok()
}

pub fn is_numeric(value: &Dynamic) -> bool {
    value.is_int() || value.is_float()
}

/// Numeric elements of `values`, skipping `()` (indicator warm-up gaps).
pub fn numbers(function: &str, values: &[Dynamic]) -> ScriptResult<Vec<f64>> {
    values
        .iter()
        .filter(|v| !v.is_unit())
        .map(|v| {
            number(v).ok_or_else(|| {
                type_error(format!(
                    "{}() requires numeric data, found {}",
                    function,
                    type_name(v)
                ))
            })
        })
        .collect()
}

/// Numeric argument that may be written as an integer or a float.
pub fn float_arg(function: &str, name: &str, value: &Dynamic) -> ScriptResult<f64> {
    number(value).ok_or_else(|| {
        type_error(format!(
            "{}() argument '{}' must be a number, not {}",
            function,
            name,
            type_name(value)
        ))
    })
}

/// Non-negative integer argument.
pub fn count_arg(function: &str, name: &str, value: INT) -> ScriptResult<usize> {
    usize::try_from(value)
        .map_err(|_| value_error(format!("{}() {} must be non-negative", function, name)))
}

/// Date argument: Unix seconds or a `datetime`, taken as UTC.
pub fn timestamp_arg(function: &str, name: &str, value: &Dynamic) -> ScriptResult<i64> {
    if let Some(dt) = value.read_lock::<DateTime>() {
        return Ok(dt.timestamp());
    }
    if let Ok(i) = value.as_int() {
        return Ok(i);
    }
    match value.as_float() {
        Ok(f) if f.is_finite() && f.abs() < 9.0e15 => Ok(f.floor() as i64),
        Ok(_) => Err(value_error(format!("{}() {} is out of range", function, name))),
        Err(_) => Err(type_error(format!(
            "{}() argument '{}' must be a datetime or Unix seconds, not {}",
            function,
            name,
            type_name(value)
        ))),
    }
}

/// Natural ordering of two values, or `None` when they are not comparable.
pub fn compare(a: &Dynamic, b: &Dynamic) -> Option<Ordering> {
    if let (Ok(x), Ok(y)) = (a.as_int(), b.as_int()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (number(a), number(b)) {
        return x.partial_cmp(&y);
    }
    if let (Ok(x), Ok(y)) = (a.as_bool(), b.as_bool()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.read_lock::<ImmutableString>(), b.read_lock::<ImmutableString>()) {
        return Some(x.as_str().cmp(y.as_str()));
    }
    if let (Some(x), Some(y)) = (a.read_lock::<DateTime>(), b.read_lock::<DateTime>()) {
        return Some((*x).cmp(&*y));
    }
    if let (Some(x), Some(y)) = (a.read_lock::<TimeDelta>(), b.read_lock::<TimeDelta>()) {
        return Some((*x).cmp(&*y));
    }
    None
}

/// Stable sort of `items` by the value `key` picks out of each. Unit
/// values go last in either direction; incomparable values are a `TypeError`.
pub fn sort_by_value<T>(
    items: &mut [T],
    key: impl Fn(&T) -> &Dynamic,
    descending: bool,
) -> ScriptResult<()> {
    let mut mismatch: Option<(&'static str, &'static str)> = None;
    items.sort_by(|x, y| {
        let (a, b) = (key(x), key(y));
        match (a.is_unit(), b.is_unit()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match compare(a, b) {
                Some(ordering) if descending => ordering.reverse(),
                Some(ordering) => ordering,
                None => {
                    mismatch.get_or_insert((type_name(a), type_name(b)));
                    Ordering::Equal
                }
            },
        }
    });
    match mismatch {
        Some((a, b)) => Err(type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a, b
        ))),
        None => Ok(()),
    }
}

pub fn sort_values(values: &mut [Dynamic], descending: bool) -> ScriptResult<()> {
    sort_by_value(values, |v| v, descending)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datum_record_keeps_field_order() {
        let datum = Datum::record(
            "bar",
            vec![("time", Datum::Int(10)), ("close", Datum::Float(1.5)), ("note", Datum::None)],
        );
        let value = datum_to_dynamic(&datum);
        let record = value.read_lock::<Record>().unwrap();
        let names: Vec<&str> = record.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["time", "close", "note"]);
        assert!(record.get("note").unwrap().is_unit());

        assert_eq!(
            dynamic_to_json(&value).to_string(),
            r#"{"time":10,"close":1.5,"note":null}"#
        );
        assert_eq!(datum_to_json(&datum), dynamic_to_json(&value));
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        assert_eq!(dynamic_to_json(&Dynamic::from(f64::NAN)), JsonValue::Null);
        assert_eq!(datum_to_json(&Datum::Float(f64::INFINITY)), JsonValue::Null);
    }

    #[test]
    fn test_numbers_skip_unit() {
        let values = vec![Dynamic::UNIT, Dynamic::from(2_i64), Dynamic::from(4.5)];
        assert_eq!(numbers("mean", &values).unwrap(), vec![2.0, 4.5]);
        assert!(numbers("mean", &["x".into()]).is_err());
    }

    #[test]
    fn test_sort_values() {
        let mut values: Vec<Dynamic> =
            vec![Dynamic::from(3_i64), Dynamic::UNIT, Dynamic::from(1.5), Dynamic::from(2_i64)];
        sort_values(&mut values, false).unwrap();
        let sorted: Vec<Option<f64>> = values.iter().map(number).collect();
        assert_eq!(sorted, vec![Some(1.5), Some(2.0), Some(3.0), None]);

        let mut mixed: Vec<Dynamic> = vec![Dynamic::from(1_i64), "a".into()];
        assert!(sort_values(&mut mixed, true).is_err());
    }

    #[test]
    fn test_timestamp_arguments() {
        assert_eq!(timestamp_arg("f", "date", &Dynamic::from(1_700_000_000_i64)).unwrap(), 1_700_000_000);
        assert_eq!(timestamp_arg("f", "date", &Dynamic::from(10.9)).unwrap(), 10);
        let dt = DateTime::from_timestamp(86_400).unwrap();
        assert_eq!(timestamp_arg("f", "date", &Dynamic::from(dt)).unwrap(), 86_400);
        assert!(timestamp_arg("f", "date", &"2024".into()).is_err());
    }
}
