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

//! Script value types the engine does not provide itself.
//!
//! - [`Record`]: the read-only field set the terminal returns for bars,
//!   ticks, symbols and the account. Fields read as properties
//!   (`bar.close`) or by name (`bar["close"]`).
//! - [`DateTime`] and [`TimeDelta`]: naive UTC timestamps and spans with
//!   the usual arithmetic and comparisons.
//!
//! Raised [`GateError`]s are registered too, so a script that catches one
//! can print it.

use std::fmt;
use std::fmt::Write as _;

use chrono::{Datelike, NaiveDateTime, Timelike};
use rhai::{Array, Dynamic, Engine, ImmutableString, Map, FLOAT, INT};
use scriptgate_common::{ExceptionKind, GateError};

use super::errors::{exception, value_error, ScriptResult};
use super::format::text;

/// Named, ordered, immutable field set.
#[derive(Debug, Clone)]
pub struct Record {
    kind: String,
    fields: Vec<(String, Dynamic)>,
}

impl Record {
    pub fn new(kind: impl Into<String>, fields: Vec<(String, Dynamic)>) -> Self {
        Self {
            kind: kind.into(),
            fields,
        }
    }

    /// What the record describes: `bar`, `tick`, `symbol_info`, ...
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fields(&self) -> &[(String, Dynamic)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// A plain map of the fields. Maps order their keys, so field order is lost.
    pub fn to_map(&self) -> Map {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str().into(), value.clone()))
            .collect()
    }

    fn field(&mut self, name: ImmutableString) -> ScriptResult<Dynamic> {
        self.get(&name).cloned().ok_or_else(|| {
            exception(
                ExceptionKind::AttributeError,
                format!("'{}' record has no field '{}'", self.kind, name),
            )
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, text(value))?;
        }
        f.write_str(")")
    }
}

/// Naive UTC timestamp, displayed as `2024-06-01 12:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(pub NaiveDateTime);

impl DateTime {
    pub fn from_timestamp(seconds: i64) -> Option<Self> {
        chrono::DateTime::from_timestamp(seconds, 0).map(|dt| DateTime(dt.naive_utc()))
    }

    pub fn timestamp(&self) -> i64 {
        self.0.and_utc().timestamp()
    }

    pub fn isoformat(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    fn strftime(&mut self, format: ImmutableString) -> ScriptResult<String> {
        let mut out = String::new();
        write!(out, "{}", self.0.format(&format))
            .map_err(|_| value_error(format!("invalid format string '{}'", format)))?;
        Ok(out)
    }

    fn shifted(self, delta: TimeDelta, forward: bool) -> ScriptResult<DateTime> {
        let moved = if forward {
            self.0.checked_add_signed(delta.0)
        } else {
            self.0.checked_sub_signed(delta.0)
        };
        moved
            .map(DateTime)
            .ok_or_else(|| exception(ExceptionKind::OverflowError, "date value out of range"))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Signed span of time, displayed as `1 day, 2:30:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeDelta(pub chrono::Duration);

impl TimeDelta {
    pub fn total_seconds(&self) -> f64 {
        self.0.num_seconds() as f64 + f64::from(self.0.subsec_nanos()) / 1e9
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.num_seconds();
        let (days, rest) = (total.div_euclid(86_400), total.rem_euclid(86_400));
        if days != 0 {
            let unit = if days.abs() == 1 { "day" } else { "days" };
            write!(f, "{} {}, ", days, unit)?;
        }
        write!(f, "{}:{:02}:{:02}", rest / 3_600, rest % 3_600 / 60, rest % 60)
    }
}

fn checked_delta(delta: Option<chrono::Duration>) -> ScriptResult<TimeDelta> {
    delta
        .map(TimeDelta)
        .ok_or_else(|| exception(ExceptionKind::OverflowError, "timedelta out of range"))
}

pub fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<Record>("Record")
        .register_indexer_get(Record::field)
        .register_fn("len", |r: &mut Record| r.fields.len() as INT)
        .register_fn("keys", |r: &mut Record| -> Array {
            r.fields.iter().map(|(name, _)| name.as_str().into()).collect()
        })
        .register_fn("contains", |r: &mut Record, name: ImmutableString| {
            r.get(&name).is_some()
        })
        .register_fn("to_map", |r: &mut Record| r.to_map())
        .register_fn("to_string", |r: &mut Record| r.to_string())
        .register_fn("to_debug", |r: &mut Record| r.to_string());

    engine
        .register_type_with_name::<DateTime>("datetime")
        .register_get("year", |d: &mut DateTime| INT::from(d.0.year()))
        .register_get("month", |d: &mut DateTime| INT::from(d.0.month()))
        .register_get("day", |d: &mut DateTime| INT::from(d.0.day()))
        .register_get("hour", |d: &mut DateTime| INT::from(d.0.hour()))
        .register_get("minute", |d: &mut DateTime| INT::from(d.0.minute()))
        .register_get("second", |d: &mut DateTime| INT::from(d.0.second()))
        .register_get("weekday", |d: &mut DateTime| {
            INT::from(d.0.weekday().num_days_from_monday())
        })
        .register_fn("timestamp", |d: &mut DateTime| d.timestamp())
        .register_fn("isoformat", |d: &mut DateTime| d.isoformat())
        .register_fn("strftime", DateTime::strftime)
        .register_fn("+", |d: DateTime, delta: TimeDelta| d.shifted(delta, true))
        .register_fn("-", |d: DateTime, delta: TimeDelta| d.shifted(delta, false))
        .register_fn("-", |a: DateTime, b: DateTime| TimeDelta(a.0 - b.0))
        .register_fn("==", |a: DateTime, b: DateTime| a == b)
        .register_fn("!=", |a: DateTime, b: DateTime| a != b)
        .register_fn("<", |a: DateTime, b: DateTime| a < b)
        .register_fn("<=", |a: DateTime, b: DateTime| a <= b)
        .register_fn(">", |a: DateTime, b: DateTime| a > b)
        .register_fn(">=", |a: DateTime, b: DateTime| a >= b)
        .register_fn("to_string", |d: &mut DateTime| d.to_string())
        .register_fn("to_debug", |d: &mut DateTime| d.to_string());

    engine
        .register_type_with_name::<TimeDelta>("timedelta")
        .register_get("days", |d: &mut TimeDelta| d.0.num_seconds().div_euclid(86_400))
        .register_fn("total_seconds", |d: &mut TimeDelta| -> FLOAT { d.total_seconds() })
        .register_fn("+", |a: TimeDelta, b: TimeDelta| checked_delta(a.0.checked_add(&b.0)))
        .register_fn("-", |a: TimeDelta, b: TimeDelta| checked_delta(a.0.checked_sub(&b.0)))
        .register_fn("*", |a: TimeDelta, n: INT| {
            let factor = i32::try_from(n)
                .map_err(|_| exception(ExceptionKind::OverflowError, "timedelta out of range"))?;
            checked_delta(a.0.checked_mul(factor))
        })
        .register_fn("==", |a: TimeDelta, b: TimeDelta| a == b)
        .register_fn("!=", |a: TimeDelta, b: TimeDelta| a != b)
        .register_fn("<", |a: TimeDelta, b: TimeDelta| a < b)
        .register_fn("<=", |a: TimeDelta, b: TimeDelta| a <= b)
        .register_fn(">", |a: TimeDelta, b: TimeDelta| a > b)
        .register_fn(">=", |a: TimeDelta, b: TimeDelta| a >= b)
        .register_fn("to_string", |d: &mut TimeDelta| d.to_string())
        .register_fn("to_debug", |d: &mut TimeDelta| d.to_string());

    engine
        .register_type_with_name::<GateError>("Error")
        .register_get("kind", |e: &mut GateError| e.exception_name().to_string())
        .register_fn("to_string", |e: &mut GateError| e.to_string())
        .register_fn("to_debug", |e: &mut GateError| e.to_string());
}

/// Method and property names registered on the types above.
pub const METHODS: &[&str] = &[
    "len", "keys", "contains", "to_map", "year", "month", "day", "hour", "minute", "second",
    "weekday", "timestamp", "isoformat", "strftime", "days", "total_seconds", "kind",
];
