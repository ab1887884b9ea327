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

//! The external trading terminal.
//!
//! The terminal is a single stateful, non-thread-safe connection. Every
//! access goes through [`TerminalGateway`], which owns the only instance.
//!
//! Data operations follow the terminal's own convention: they return `None`
//! when the terminal rejects the call, and [`Terminal::last_error`] explains
//! why. The gateway turns that pair into a `ResourceError`.

mod gateway;
mod simulated;

pub use gateway::TerminalGateway;
pub use simulated::{SimulatedConfig, SimulatedTerminal};

use scriptgate_common::TerminalFault;

/// Error code reported for operations a terminal does not implement.
pub const UNSUPPORTED: i64 = -7;

/// The terminal's `TIMEFRAME_*` codes.
pub const TIMEFRAMES: &[(&str, i64)] = &[
    ("TIMEFRAME_M1", 1),
    ("TIMEFRAME_M2", 2),
    ("TIMEFRAME_M3", 3),
    ("TIMEFRAME_M4", 4),
    ("TIMEFRAME_M5", 5),
    ("TIMEFRAME_M6", 6),
    ("TIMEFRAME_M10", 10),
    ("TIMEFRAME_M12", 12),
    ("TIMEFRAME_M15", 15),
    ("TIMEFRAME_M20", 20),
    ("TIMEFRAME_M30", 30),
    ("TIMEFRAME_H1", 16385),
    ("TIMEFRAME_H2", 16386),
    ("TIMEFRAME_H3", 16387),
    ("TIMEFRAME_H4", 16388),
    ("TIMEFRAME_H6", 16390),
    ("TIMEFRAME_H8", 16392),
    ("TIMEFRAME_H12", 16396),
    ("TIMEFRAME_D1", 16408),
    ("TIMEFRAME_W1", 32769),
    ("TIMEFRAME_MN1", 49153),
];

/// Thread-safe interchange value produced by the terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Datum>),
    /// Named field set such as a tick, a bar or the account summary.
    Record {
        kind: String,
        fields: Vec<(String, Datum)>,
    },
}

impl Datum {
    pub fn record(kind: &str, fields: Vec<(&str, Datum)>) -> Self {
        Datum::Record {
            kind: kind.to_string(),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Datum> {
        match self {
            Datum::Record { fields, .. } => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int(i) => Some(*i as f64),
            Datum::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(*i),
            Datum::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Bool(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Int(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Float(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::Str(value.to_string())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::Str(value)
    }
}

/// Connection to the external terminal.
///
/// Only the lifecycle methods are required. Data operations default to the
/// rejection sentinel and `last_error` defaults to [`UNSUPPORTED`], so test
/// doubles implement just the operations they exercise.
///
/// Times are Unix seconds; `timeframe` uses the terminal's `TIMEFRAME_*` codes.
pub trait Terminal: Send {
    /// Opens the connection. Returns `false` if the terminal refuses.
    fn initialize(&mut self) -> bool;

    fn shutdown(&mut self);

    /// Explains the most recent rejection.
    fn last_error(&self) -> TerminalFault {
        TerminalFault::new(UNSUPPORTED, "Unsupported operation")
    }

    fn version(&mut self) -> Option<Datum> {
        None
    }

    fn terminal_info(&mut self) -> Option<Datum> {
        None
    }

    fn account_info(&mut self) -> Option<Datum> {
        None
    }

    fn symbols_total(&mut self) -> Option<Datum> {
        None
    }

    fn symbols_get(&mut self, _group: Option<&str>) -> Option<Datum> {
        None
    }

    fn symbol_info(&mut self, _symbol: &str) -> Option<Datum> {
        None
    }

    fn symbol_info_tick(&mut self, _symbol: &str) -> Option<Datum> {
        None
    }

    fn symbol_select(&mut self, _symbol: &str, _enable: bool) -> Option<Datum> {
        None
    }

    fn copy_rates_from(
        &mut self,
        _symbol: &str,
        _timeframe: i64,
        _date_from: i64,
        _count: usize,
    ) -> Option<Datum> {
        None
    }

    fn copy_rates_from_pos(
        &mut self,
        _symbol: &str,
        _timeframe: i64,
        _start_pos: usize,
        _count: usize,
    ) -> Option<Datum> {
        None
    }

    fn copy_rates_range(
        &mut self,
        _symbol: &str,
        _timeframe: i64,
        _date_from: i64,
        _date_to: i64,
    ) -> Option<Datum> {
        None
    }

    fn copy_ticks_from(
        &mut self,
        _symbol: &str,
        _date_from: i64,
        _count: usize,
        _flags: i64,
    ) -> Option<Datum> {
        None
    }

    fn copy_ticks_range(
        &mut self,
        _symbol: &str,
        _date_from: i64,
        _date_to: i64,
        _flags: i64,
    ) -> Option<Datum> {
        None
    }

    fn order_calc_margin(
        &mut self,
        _action: i64,
        _symbol: &str,
        _volume: f64,
        _price: f64,
    ) -> Option<Datum> {
        None
    }

    fn order_calc_profit(
        &mut self,
        _action: i64,
        _symbol: &str,
        _volume: f64,
        _price_open: f64,
        _price_close: f64,
    ) -> Option<Datum> {
        None
    }

    /// Places an order. Never exposed to scripts.
    fn order_send(&mut self, _request: &Datum) -> Option<Datum> {
        None
    }
}
