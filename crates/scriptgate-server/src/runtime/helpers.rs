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

//! Global helpers and the `stats`, `pd` and `datetime` modules.
//!
//! Scripts cannot import anything, so these stand in for the handful of
//! standard and analysis libraries a data script usually reaches for.
//! Arithmetic, string and array basics come from the engine's own packages.

use chrono::{Local, Utc};
use rhai::{Array, Dynamic, Module, FLOAT, INT};
use scriptgate_common::ExceptionKind;

use super::conversions::{compare, number, numbers, sort_values, type_name};
use super::errors::{exception, type_error, value_error, ScriptResult};
use super::table::Table;
use super::types::{DateTime, TimeDelta};
use crate::namespace::Exports;

fn require_points(function: &str, data: &[f64], minimum: usize) -> ScriptResult<()> {
    if data.len() < minimum {
        return Err(value_error(format!(
            "{} requires at least {} data point{}",
            function,
            minimum,
            if minimum == 1 { "" } else { "s" }
        )));
    }
    Ok(())
}

pub fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

pub fn median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample variance (n - 1 denominator).
pub fn variance(data: &[f64]) -> f64 {
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

fn sum(values: Array) -> ScriptResult<Dynamic> {
    if values.iter().all(Dynamic::is_int) {
        let mut total: INT = 0;
        for value in &values {
            total = value
                .as_int()
                .ok()
                .and_then(|i| total.checked_add(i))
                .ok_or_else(|| exception(ExceptionKind::OverflowError, "integer overflow in sum()"))?;
        }
        return Ok(Dynamic::from(total));
    }
    let mut total: FLOAT = 0.0;
    for value in &values {
        total += number(value).ok_or_else(|| {
            type_error(format!(
                "sum() requires numeric data, found {}",
                type_name(value)
            ))
        })?;
    }
    Ok(Dynamic::from(total))
}

fn extreme(function: &str, values: Array, keep: std::cmp::Ordering) -> ScriptResult<Dynamic> {
    let mut items = values.into_iter();
    let mut best = items
        .next()
        .ok_or_else(|| value_error(format!("{}() arg is an empty sequence", function)))?;
    for item in items {
        let replace = match compare(&item, &best) {
            Some(order) => order == keep,
            None => {
                return Err(type_error(format!(
                    "'{}' not supported between {} and {}",
                    function,
                    type_name(&item),
                    type_name(&best)
                )))
            }
        };
        if replace {
            best = item;
        }
    }
    Ok(best)
}

fn sorted(mut values: Array, descending: bool) -> ScriptResult<Array> {
    sort_values(&mut values, descending)?;
    Ok(values)
}

fn round(x: Dynamic, digits: INT) -> ScriptResult<Dynamic> {
    if x.is_int() && digits >= 0 {
        return Ok(x);
    }
    let value = number(&x)
        .ok_or_else(|| type_error(format!("round() requires a number, not {}", type_name(&x))))?;
    let digits = i32::try_from(digits.clamp(-308, 308)).unwrap_or_default();
    let scale = 10f64.powi(digits);
    let rounded = (value * scale).round() / scale;
    Ok(Dynamic::from(if rounded.is_finite() { rounded } else { value }))
}

/// Functions every script can call without a module prefix.
pub fn global_module(exports: &mut Exports<'_>) -> Module {
    let mut module = Module::new();
    export!(exports, module, "table", |data: Dynamic| Table::from_value(&data));
    export!(exports, module, "sum", sum);
    export!(exports, module, "min", |v: Array| extreme("min", v, std::cmp::Ordering::Less));
    export!(exports, module, "max", |v: Array| extreme("max", v, std::cmp::Ordering::Greater));
    export!(exports, module, "sorted", |v: Array| sorted(v, false));
    export!(exports, module, "sorted", sorted);
    export!(exports, module, "round", round);
    module
}

fn statistic(
    name: &'static str,
    minimum: usize,
    f: fn(&[f64]) -> f64,
) -> impl Fn(Array) -> ScriptResult<FLOAT> + Clone + 'static {
    move |values: Array| {
        let data = numbers(name, &values)?;
        require_points(name, &data, minimum)?;
        Ok(f(&data))
    }
}

fn pct_change(values: Array) -> ScriptResult<Array> {
    let data = numbers("pct_change", &values)?;
    Ok(data
        .iter()
        .enumerate()
        .map(|(i, x)| match i.checked_sub(1).map(|p| data[p]) {
            Some(prev) if prev != 0.0 => Dynamic::from(x / prev - 1.0),
            _ => Dynamic::UNIT,
        })
        .collect())
}

fn cumsum(values: Array) -> ScriptResult<Array> {
    let mut total = 0.0;
    Ok(numbers("cumsum", &values)?
        .into_iter()
        .map(|x| {
            total += x;
            Dynamic::from(total)
        })
        .collect())
}

/// Builds the `stats` module.
pub fn stats_module(exports: &mut Exports<'_>) -> Module {
    let mut module = Module::new();
    export!(exports, module, "mean", statistic("mean", 1, mean));
    export!(exports, module, "median", statistic("median", 1, median));
    export!(exports, module, "variance", statistic("variance", 2, variance));
    export!(exports, module, "stdev", statistic("stdev", 2, |d| variance(d).sqrt()));
    export!(exports, module, "pct_change", pct_change);
    export!(exports, module, "cumsum", cumsum);
    module
}

/// Builds the `pd` module.
pub fn pandas_module(exports: &mut Exports<'_>) -> Module {
    let mut module = Module::new();
    export!(exports, module, "DataFrame", |data: Dynamic| Table::from_value(&data));
    export!(exports, module, "DataFrame", || Ok::<_, Box<rhai::EvalAltResult>>(Table::new()));
    module
}

fn component(name: &str, value: INT) -> ScriptResult<u32> {
    u32::try_from(value).map_err(|_| value_error(format!("{} must be non-negative", name)))
}

fn make_datetime(parts: [INT; 6]) -> ScriptResult<DateTime> {
    let [year, month, day, hour, minute, second] = parts;
    let year = i32::try_from(year)
        .ok()
        .filter(|y| (1..=9999).contains(y))
        .ok_or_else(|| value_error(format!("year {} is out of range", year)))?;
    let month = component("month", month)?;
    let date = chrono::NaiveDate::from_ymd_opt(year, month, component("day", day)?).ok_or_else(|| {
        value_error(if (1..=12).contains(&month) {
            "day is out of range for month"
        } else {
            "month must be in 1..12"
        })
    })?;
    date.and_hms_opt(
        component("hour", hour)?,
        component("minute", minute)?,
        component("second", second)?,
    )
    .map(DateTime)
    .ok_or_else(|| value_error("time component out of range"))
}

fn from_timestamp(ts: FLOAT) -> ScriptResult<DateTime> {
    let secs = ts.floor();
    if !secs.is_finite() || secs.abs() > 253_402_300_799.0 {
        return Err(exception(
            ExceptionKind::OverflowError,
            "timestamp out of range for platform time_t",
        ));
    }
    let nanos = (((ts - secs) * 1e9).round() as u32).min(999_999_999);
    chrono::DateTime::from_timestamp(secs as i64, nanos)
        .map(|dt| DateTime(dt.naive_utc()))
        .ok_or_else(|| value_error("timestamp out of range"))
}

/// `timedelta(days, hours, minutes, seconds)`; trailing parts default to zero.
fn make_timedelta(parts: &[Dynamic]) -> ScriptResult<TimeDelta> {
    const UNITS: [(&str, f64); 4] = [
        ("days", 86_400.0),
        ("hours", 3_600.0),
        ("minutes", 60.0),
        ("seconds", 1.0),
    ];
    let mut seconds = 0.0;
    for (value, (name, scale)) in parts.iter().zip(UNITS) {
        seconds += number(value).ok_or_else(|| {
            type_error(format!(
                "timedelta() argument '{}' must be a number, not {}",
                name,
                type_name(value)
            ))
        })? * scale;
    }
    let micros = (seconds * 1e6).round();
    if !micros.is_finite() || micros.abs() > 9.2e18 {
        return Err(exception(ExceptionKind::OverflowError, "timedelta out of range"));
    }
    Ok(TimeDelta(chrono::Duration::microseconds(micros as i64)))
}

/// Builds the `datetime` module.
pub fn datetime_module(exports: &mut Exports<'_>) -> Module {
    let mut module = Module::new();
    export!(exports, module, "datetime", |y: INT, m: INT, d: INT| {
        make_datetime([y, m, d, 0, 0, 0])
    });
    export!(exports, module, "datetime", |y: INT, m: INT, d: INT, h: INT| {
        make_datetime([y, m, d, h, 0, 0])
    });
    export!(exports, module, "datetime", |y: INT, m: INT, d: INT, h: INT, mi: INT| {
        make_datetime([y, m, d, h, mi, 0])
    });
    export!(exports, module, "datetime", |y: INT, m: INT, d: INT, h: INT, mi: INT, s: INT| {
        make_datetime([y, m, d, h, mi, s])
    });
    export!(exports, module, "now", || {
        Ok::<_, Box<rhai::EvalAltResult>>(DateTime(Local::now().naive_local()))
    });
    export!(exports, module, "utcnow", || {
        Ok::<_, Box<rhai::EvalAltResult>>(DateTime(Utc::now().naive_utc()))
    });
    export!(exports, module, "fromtimestamp", |ts: INT| from_timestamp(ts as FLOAT));
    export!(exports, module, "fromtimestamp", from_timestamp);
    export!(exports, module, "timedelta", |d: Dynamic| make_timedelta(&[d]));
    export!(exports, module, "timedelta", |d: Dynamic, h: Dynamic| make_timedelta(&[d, h]));
    export!(exports, module, "timedelta", |d: Dynamic, h: Dynamic, m: Dynamic| {
        make_timedelta(&[d, h, m])
    });
    export!(exports, module, "timedelta", |d: Dynamic, h: Dynamic, m: Dynamic, s: Dynamic| {
        make_timedelta(&[d, h, m, s])
    });
    module
}
