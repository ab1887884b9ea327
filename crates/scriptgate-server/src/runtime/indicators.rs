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

//! Technical indicators (`ta` module).
//!
//! Every series has the same length as its input. Positions that do not yet
//! have enough history are `()`.
//!
//! # Script API
//!
//! - `ta::sma(values)`, `ta::sma(values, period)`; likewise `ema` and `rsi`
//! - `ta::macd(values)`, `ta::macd(values, fast, slow, signal)` returning
//!   `#{macd, signal, histogram}`
//! - `ta::bollinger(values)`, `ta::bollinger(values, period)`,
//!   `ta::bollinger(values, period, num_std)` returning `#{middle, upper, lower}`
//! - `ta::atr(high, low, close)`, `ta::atr(high, low, close, period)`

use rhai::{Array, Dynamic, Map, Module, INT};

use super::conversions::{float_arg, numbers};
use super::errors::{value_error, ScriptResult};
use crate::namespace::Exports;

pub type Series = Vec<Option<f64>>;

/// Simple moving average.
pub fn sma(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);
    for i in period..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = Some(prev);
    }
    out
}

/// EMA over a series with leading gaps; the gaps are carried through.
fn ema_of_series(series: &Series, period: usize) -> Series {
    let first = series.iter().position(Option::is_some).unwrap_or(series.len());
    let defined: Vec<f64> = series[first..].iter().map(|v| v.unwrap_or(0.0)).collect();
    let mut out = vec![None; first];
    out.extend(ema(&defined, period));
    out
}

/// Relative strength index with Wilder smoothing.
pub fn rsi(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }
    let change = |i: usize| values[i] - values[i - 1];
    let (mut gain, mut loss) = (1..=period).fold((0.0, 0.0), |(g, l), i| {
        let d = change(i);
        (g + d.max(0.0), l + (-d).max(0.0))
    });
    gain /= period as f64;
    loss /= period as f64;

    let index = |gain: f64, loss: f64| {
        if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    };
    out[period] = Some(index(gain, loss));
    for i in period + 1..values.len() {
        let d = change(i);
        gain = (gain * (period - 1) as f64 + d.max(0.0)) / period as f64;
        loss = (loss * (period - 1) as f64 + (-d).max(0.0)) / period as f64;
        out[i] = Some(index(gain, loss));
    }
    out
}

pub struct Macd {
    pub macd: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let line: Series = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema_of_series(&line, signal);
    let histogram = line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();
    Macd {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

pub struct Bands {
    pub middle: Series,
    pub upper: Series,
    pub lower: Series,
}

/// Bollinger bands using the population standard deviation of each window.
pub fn bollinger(values: &[f64], period: usize, num_std: f64) -> Bands {
    let middle = sma(values, period);
    let mut upper = vec![None; values.len()];
    let mut lower = vec![None; values.len()];
    for (i, mean) in middle.iter().enumerate() {
        let Some(mean) = mean else { continue };
        let window = &values[i + 1 - period..=i];
        let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let width = num_std * var.sqrt();
        upper[i] = Some(mean + width);
        lower[i] = Some(mean - width);
    }
    Bands {
        middle,
        upper,
        lower,
    }
}

/// Average true range with Wilder smoothing.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Series {
    let n = high.len().min(low.len()).min(close.len());
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    let true_range: Vec<f64> = (0..n)
        .map(|i| {
            let range = high[i] - low[i];
            if i == 0 {
                range
            } else {
                range
                    .max((high[i] - close[i - 1]).abs())
                    .max((low[i] - close[i - 1]).abs())
            }
        })
        .collect();

    let mut prev = true_range[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);
    for i in period..n {
        prev = (prev * (period - 1) as f64 + true_range[i]) / period as f64;
        out[i] = Some(prev);
    }
    out
}

fn to_array(series: Series) -> Array {
    series
        .into_iter()
        .map(|v| v.map_or(Dynamic::UNIT, Dynamic::from))
        .collect()
}

fn period(function: &str, name: &str, value: INT) -> ScriptResult<usize> {
    usize::try_from(value)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| value_error(format!("{}() {} must be a positive integer", function, name)))
}

fn single(
    function: &str,
    values: &Array,
    length: INT,
    f: fn(&[f64], usize) -> Series,
) -> ScriptResult<Array> {
    let values = numbers(function, values)?;
    Ok(to_array(f(&values, period(function, "period", length)?)))
}

fn ta_macd(values: &Array, fast: INT, slow: INT, signal: INT) -> ScriptResult<Map> {
    let values = numbers("macd", values)?;
    let fast = period("macd", "fast", fast)?;
    let slow = period("macd", "slow", slow)?;
    let signal = period("macd", "signal", signal)?;
    if fast >= slow {
        return Err(value_error("macd() fast period must be shorter than slow period"));
    }
    let result = macd(&values, fast, slow, signal);
    let mut map = Map::new();
    map.insert("macd".into(), Dynamic::from_array(to_array(result.macd)));
    map.insert("signal".into(), Dynamic::from_array(to_array(result.signal)));
    map.insert("histogram".into(), Dynamic::from_array(to_array(result.histogram)));
    Ok(map)
}

fn ta_bollinger(values: &Array, length: INT, num_std: &Dynamic) -> ScriptResult<Map> {
    let values = numbers("bollinger", values)?;
    let length = period("bollinger", "period", length)?;
    let num_std = float_arg("bollinger", "num_std", num_std)?;
    let bands = bollinger(&values, length, num_std);
    let mut map = Map::new();
    map.insert("middle".into(), Dynamic::from_array(to_array(bands.middle)));
    map.insert("upper".into(), Dynamic::from_array(to_array(bands.upper)));
    map.insert("lower".into(), Dynamic::from_array(to_array(bands.lower)));
    Ok(map)
}

fn ta_atr(high: &Array, low: &Array, close: &Array, length: INT) -> ScriptResult<Array> {
    let high = numbers("atr", high)?;
    let low = numbers("atr", low)?;
    let close = numbers("atr", close)?;
    if high.len() != low.len() || low.len() != close.len() {
        return Err(value_error("atr() high, low and close must have the same length"));
    }
    Ok(to_array(atr(&high, &low, &close, period("atr", "period", length)?)))
}

/// Builds the `ta` module.
pub fn module(exports: &mut Exports<'_>) -> Module {
    let mut module = Module::new();

    export!(exports, module, "sma", |v: Array| single("sma", &v, 20, sma));
    export!(exports, module, "sma", |v: Array, n: INT| single("sma", &v, n, sma));
    export!(exports, module, "ema", |v: Array| single("ema", &v, 20, ema));
    export!(exports, module, "ema", |v: Array, n: INT| single("ema", &v, n, ema));
    export!(exports, module, "rsi", |v: Array| single("rsi", &v, 14, rsi));
    export!(exports, module, "rsi", |v: Array, n: INT| single("rsi", &v, n, rsi));

    export!(exports, module, "macd", |v: Array| ta_macd(&v, 12, 26, 9));
    export!(exports, module, "macd", |v: Array, fast: INT, slow: INT, signal: INT| {
        ta_macd(&v, fast, slow, signal)
    });

    export!(exports, module, "bollinger", |v: Array| {
        ta_bollinger(&v, 20, &Dynamic::from(2.0))
    });
    export!(exports, module, "bollinger", |v: Array, n: INT| {
        ta_bollinger(&v, n, &Dynamic::from(2.0))
    });
    export!(exports, module, "bollinger", |v: Array, n: INT, k: Dynamic| {
        ta_bollinger(&v, n, &k)
    });

    export!(exports, module, "atr", |h: Array, l: Array, c: Array| ta_atr(&h, &l, &c, 14));
    export!(exports, module, "atr", |h: Array, l: Array, c: Array, n: INT| {
        ta_atr(&h, &l, &c, n)
    });

    module
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_sma() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out[..2], [None, None]);
        assert!(close(out[2], 2.0));
        assert!(close(out[4], 4.0));
        assert_eq!(sma(&[1.0], 3), vec![None]);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let out = ema(&[2.0, 4.0, 6.0, 8.0], 3);
        assert!(out[1].is_none());
        assert!(close(out[2], 4.0));
        // alpha = 0.5
        assert!(close(out[3], 6.0));
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..20).map(f64::from).collect();
        let out = rsi(&rising, 14);
        assert!(out[13].is_none());
        assert!(close(out[14], 100.0));

        let alternating = [1.0, 2.0, 1.0, 2.0, 1.0];
        assert!(close(rsi(&alternating, 2)[2], 50.0));
    }

    #[test]
    fn test_macd_gaps() {
        let values: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin() + 10.0).collect();
        let result = macd(&values, 12, 26, 9);
        assert!(result.macd[24].is_none());
        assert!(result.macd[25].is_some());
        assert!(result.signal[32].is_none());
        assert!(result.signal[33].is_some());
        let (m, s, h) = (result.macd[35], result.signal[35], result.histogram[35]);
        assert!(close(h, m.unwrap() - s.unwrap()));
    }

    #[test]
    fn test_bollinger_constant_series() {
        let bands = bollinger(&[5.0; 4], 2, 2.0);
        assert!(bands.upper[0].is_none());
        assert!(close(bands.upper[3], 5.0));
        assert!(close(bands.lower[3], 5.0));
    }

    #[test]
    fn test_atr() {
        let high = [10.0, 11.0, 12.0];
        let low = [9.0, 10.0, 10.0];
        let closes = [9.5, 10.5, 11.0];
        let out = atr(&high, &low, &closes, 2);
        assert!(out[0].is_none());
        // tr = [1.0, 1.5, 2.0]
        assert!(close(out[1], 1.25));
        assert!(close(out[2], 1.625));
    }
}
